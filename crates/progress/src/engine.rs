//! Progress engine — applies graded outcomes to per-user state.
//!
//! All writes to a user's `GamificationState` funnel through here and
//! serialize on a per-user keyed lock, so concurrent submissions from the
//! same user can never lose an update.

use chrono::Utc;
use std::sync::Arc;
use studykit_core::artifact::StudyArtifact;
use studykit_core::error::Result;
use studykit_core::progress::{GamificationState, GradeReport, ProgressSummary};
use studykit_core::store::ProgressStore;
use studykit_core::sync::KeyedLocks;
use tracing::info;

use crate::grading;

/// XP awarded per logged study minute.
const XP_PER_MINUTE: u64 = 5;

/// Bonus XP for a single logged stretch of an hour or more.
const LONG_SESSION_BONUS: u64 = 20;

/// Grades submissions and owns every mutation of gamification state.
pub struct ProgressEngine {
    store: Arc<dyn ProgressStore>,
    locks: KeyedLocks,
}

impl ProgressEngine {
    pub fn new(store: Arc<dyn ProgressStore>) -> Self {
        Self {
            store,
            locks: KeyedLocks::new(),
        }
    }

    /// Grade a submission and fold the outcome into the user's state.
    ///
    /// Grading runs before the per-user lock is taken; only the
    /// load-mutate-save of the state serializes.
    pub async fn record_outcome(
        &self,
        user_id: &str,
        topic: &str,
        artifact: &StudyArtifact,
        answers: &[String],
    ) -> Result<(GradeReport, GamificationState)> {
        let report = grading::grade(artifact, answers)?;

        let _guard = self.locks.acquire(user_id).await;
        let mut state = self.load_or_new(user_id).await?;

        state.add_score(report.score_delta);
        state.advance_streak(Utc::now().date_naive());
        state.adjust_mastery(topic, report.passed);
        self.store.save_state(&state).await?;

        info!(
            user_id = %user_id,
            topic = %topic,
            correct = report.correct,
            total = report.total,
            score_delta = report.score_delta,
            passed = report.passed,
            streak = state.streak,
            "Recorded quiz outcome"
        );

        Ok((report, state))
    }

    /// Log self-reported study time.
    ///
    /// Awards XP per minute plus a bonus for an hour or more, and advances
    /// the streak. Zero minutes changes nothing.
    pub async fn record_study_time(
        &self,
        user_id: &str,
        minutes: u32,
    ) -> Result<GamificationState> {
        if minutes == 0 {
            return self.state(user_id).await;
        }

        let mut earned = XP_PER_MINUTE * minutes as u64;
        if minutes >= 60 {
            earned += LONG_SESSION_BONUS;
        }

        let _guard = self.locks.acquire(user_id).await;
        let mut state = self.load_or_new(user_id).await?;
        state.add_score(earned);
        state.advance_streak(Utc::now().date_naive());
        self.store.save_state(&state).await?;

        info!(
            user_id = %user_id,
            minutes = minutes,
            earned = earned,
            "Recorded study time"
        );

        Ok(state)
    }

    /// The user's current state; a fresh zeroed state for first-timers.
    pub async fn state(&self, user_id: &str) -> Result<GamificationState> {
        self.load_or_new(user_id).await
    }

    /// The compact view attached to study responses.
    pub async fn summary(&self, user_id: &str, topic: Option<&str>) -> Result<ProgressSummary> {
        let state = self.load_or_new(user_id).await?;
        Ok(ProgressSummary::of(&state, topic))
    }

    /// Wipe a user's progress back to zero.
    pub async fn reset(&self, user_id: &str) -> Result<GamificationState> {
        let _guard = self.locks.acquire(user_id).await;
        let mut state = self.load_or_new(user_id).await?;
        state.reset();
        self.store.save_state(&state).await?;
        info!(user_id = %user_id, "Reset progress");
        Ok(state)
    }

    async fn load_or_new(&self, user_id: &str) -> Result<GamificationState> {
        Ok(self
            .store
            .load_state(user_id)
            .await?
            .unwrap_or_else(|| GamificationState::new(user_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use studykit_core::artifact::{ArtifactItems, Difficulty, QuizItem};
    use studykit_core::error::StoreError;

    /// In-memory store that counts saves, for serialization checks.
    struct RecordingStore {
        states: Mutex<HashMap<String, GamificationState>>,
        saves: Mutex<usize>,
    }

    impl RecordingStore {
        fn new() -> Self {
            Self {
                states: Mutex::new(HashMap::new()),
                saves: Mutex::new(0),
            }
        }

        fn save_count(&self) -> usize {
            *self.saves.lock().unwrap()
        }
    }

    #[async_trait]
    impl ProgressStore for RecordingStore {
        async fn load_state(
            &self,
            user_id: &str,
        ) -> std::result::Result<Option<GamificationState>, StoreError> {
            Ok(self.states.lock().unwrap().get(user_id).cloned())
        }

        async fn save_state(
            &self,
            state: &GamificationState,
        ) -> std::result::Result<(), StoreError> {
            *self.saves.lock().unwrap() += 1;
            self.states
                .lock()
                .unwrap()
                .insert(state.user_id.clone(), state.clone());
            Ok(())
        }
    }

    fn quiz(items: usize) -> StudyArtifact {
        let items = (0..items)
            .map(|i| {
                let options = vec![
                    format!("right-{i}"),
                    format!("wrong-a-{i}"),
                    format!("wrong-b-{i}"),
                    format!("wrong-c-{i}"),
                ];
                QuizItem {
                    question: format!("question {i}"),
                    answer: options[0].clone(),
                    options,
                    difficulty: Difficulty::Medium,
                }
            })
            .collect();
        StudyArtifact::new("session-1", "doc-1", ArtifactItems::Quiz { items })
    }

    fn all_correct(n: usize) -> Vec<String> {
        vec!["A".to_string(); n]
    }

    #[tokio::test]
    async fn outcome_updates_score_streak_and_mastery() {
        let store = Arc::new(RecordingStore::new());
        let engine = ProgressEngine::new(store.clone());

        let (report, state) = engine
            .record_outcome("user-1", "biology", &quiz(4), &all_correct(4))
            .await
            .unwrap();

        assert_eq!(report.correct, 4);
        assert_eq!(state.score, 8); // four medium items at weight 2
        assert_eq!(state.streak, 1);
        assert_eq!(state.mastery_of("biology"), 1);
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn failed_quiz_lowers_mastery_but_not_score() {
        let store = Arc::new(RecordingStore::new());
        let engine = ProgressEngine::new(store);

        engine
            .record_outcome("user-1", "biology", &quiz(4), &all_correct(4))
            .await
            .unwrap();
        engine
            .record_outcome("user-1", "biology", &quiz(4), &all_correct(4))
            .await
            .unwrap();

        let wrong = vec!["B".to_string(); 4];
        let (report, state) = engine
            .record_outcome("user-1", "biology", &quiz(4), &wrong)
            .await
            .unwrap();

        assert!(!report.passed);
        assert_eq!(state.mastery_of("biology"), 1); // 2 passes up, 1 fail down
        assert_eq!(state.score, 16); // the failed quiz added nothing, removed nothing
    }

    #[tokio::test]
    async fn same_day_submissions_keep_streak_at_one() {
        let store = Arc::new(RecordingStore::new());
        let engine = ProgressEngine::new(store);

        engine
            .record_outcome("user-1", "math", &quiz(2), &all_correct(2))
            .await
            .unwrap();
        let (_, state) = engine
            .record_outcome("user-1", "math", &quiz(2), &all_correct(2))
            .await
            .unwrap();

        assert_eq!(state.streak, 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn concurrent_submissions_never_lose_an_update() {
        let store = Arc::new(RecordingStore::new());
        let engine = Arc::new(ProgressEngine::new(store.clone()));

        let mut handles = Vec::new();
        for _ in 0..10 {
            let engine = engine.clone();
            handles.push(tokio::spawn(async move {
                engine
                    .record_outcome("user-1", "math", &quiz(1), &all_correct(1))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let state = engine.state("user-1").await.unwrap();
        assert_eq!(state.score, 20); // 10 submissions of one medium item each
        assert_eq!(store.save_count(), 10);
    }

    #[tokio::test]
    async fn study_time_awards_per_minute_with_hour_bonus() {
        let store = Arc::new(RecordingStore::new());
        let engine = ProgressEngine::new(store);

        let state = engine.record_study_time("user-1", 30).await.unwrap();
        assert_eq!(state.score, 150);
        assert_eq!(state.streak, 1);

        let state = engine.record_study_time("user-1", 60).await.unwrap();
        assert_eq!(state.score, 150 + 300 + 20);
    }

    #[tokio::test]
    async fn zero_minutes_changes_nothing() {
        let store = Arc::new(RecordingStore::new());
        let engine = ProgressEngine::new(store.clone());

        let state = engine.record_study_time("user-1", 0).await.unwrap();
        assert_eq!(state.score, 0);
        assert_eq!(state.streak, 0);
        assert_eq!(store.save_count(), 0);
    }

    #[tokio::test]
    async fn summary_for_new_user_is_zeroed() {
        let store = Arc::new(RecordingStore::new());
        let engine = ProgressEngine::new(store);

        let summary = engine.summary("nobody", Some("physics")).await.unwrap();
        assert_eq!(summary.score, 0);
        assert_eq!(summary.level, 1);
        assert_eq!(summary.streak, 0);
        assert_eq!(summary.topic_mastery, Some(("physics".into(), 0)));
    }

    #[tokio::test]
    async fn reset_zeroes_everything() {
        let store = Arc::new(RecordingStore::new());
        let engine = ProgressEngine::new(store);

        engine
            .record_outcome("user-1", "math", &quiz(3), &all_correct(3))
            .await
            .unwrap();
        let state = engine.reset("user-1").await.unwrap();

        assert_eq!(state.score, 0);
        assert_eq!(state.streak, 0);
        assert_eq!(state.mastery_of("math"), 0);
    }
}
