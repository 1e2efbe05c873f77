//! Gamification state — score, streak, and per-topic mastery.
//!
//! Only the progress engine mutates this; everything else reads it.
//! The invariants (non-decreasing score, mastery clamped to 0..=5,
//! calendar-day streaks) are enforced by the mutators here so no caller
//! can produce an out-of-range state.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mastery levels run from 0 (untouched) to 5 (mastered).
pub const MASTERY_MAX: u8 = 5;

/// Per-user gamification state, persisted durably across sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GamificationState {
    pub user_id: String,

    /// Lifetime score in XP; never decreases except on explicit reset.
    pub score: u64,

    /// Consecutive-days counter.
    pub streak: u32,

    /// UTC date of the last scored activity; drives the streak rule.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_activity: Option<NaiveDate>,

    /// topic → mastery level 0..=5. BTreeMap keeps serialization stable.
    #[serde(default)]
    pub mastery: BTreeMap<String, u8>,

    pub updated_at: DateTime<Utc>,
}

impl GamificationState {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            score: 0,
            streak: 0,
            last_activity: None,
            mastery: BTreeMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Add earned XP. Deltas are unsigned, so the score cannot decrease.
    pub fn add_score(&mut self, delta: u64) {
        self.score += delta;
        self.updated_at = Utc::now();
    }

    /// Apply the calendar-day streak rule for activity on `today`:
    /// same day → unchanged, previous day → +1, gap or first → reset to 1.
    pub fn advance_streak(&mut self, today: NaiveDate) {
        match self.last_activity {
            Some(last) if last == today => {}
            Some(last) if last.succ_opt() == Some(today) => self.streak += 1,
            _ => self.streak = 1,
        }
        self.last_activity = Some(today);
        self.updated_at = Utc::now();
    }

    /// Mastery for a topic, 0 if never studied.
    pub fn mastery_of(&self, topic: &str) -> u8 {
        self.mastery.get(topic).copied().unwrap_or(0)
    }

    /// Bounded mastery update: +1 capped at 5 on a pass, −1 floored at 0
    /// on a fail.
    pub fn adjust_mastery(&mut self, topic: &str, passed: bool) {
        let level = self.mastery.entry(topic.to_string()).or_insert(0);
        if passed {
            *level = (*level + 1).min(MASTERY_MAX);
        } else {
            *level = level.saturating_sub(1);
        }
        self.updated_at = Utc::now();
    }

    /// Level is derived from score, never stored: 100 XP per level.
    pub fn level(&self) -> u32 {
        (self.score / 100) as u32 + 1
    }

    /// Explicit reset; the single sanctioned way score goes down.
    pub fn reset(&mut self) {
        self.score = 0;
        self.streak = 0;
        self.last_activity = None;
        self.mastery.clear();
        self.updated_at = Utc::now();
    }
}

/// The result of grading one answer submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradeReport {
    /// Number of correctly answered items.
    pub correct: usize,

    /// Total gradable items in the artifact.
    pub total: usize,

    /// XP earned (sum of difficulty weights of correct items).
    pub score_delta: u64,

    /// Whether the submission counts as a pass for mastery purposes.
    pub passed: bool,

    /// Per-item correctness, in artifact order.
    pub item_results: Vec<bool>,
}

/// The compact progress view attached to study responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressSummary {
    pub score: u64,
    pub level: u32,
    pub streak: u32,
    /// Mastery of the topic the request touched, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_mastery: Option<(String, u8)>,
}

impl ProgressSummary {
    pub fn of(state: &GamificationState, topic: Option<&str>) -> Self {
        Self {
            score: state.score,
            level: state.level(),
            streak: state.streak,
            topic_mastery: topic.map(|t| (t.to_string(), state.mastery_of(t))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn streak_same_day_unchanged() {
        let mut state = GamificationState::new("user-1");
        state.advance_streak(day(1));
        state.advance_streak(day(1));
        assert_eq!(state.streak, 1);
    }

    #[test]
    fn streak_consecutive_days_increment() {
        let mut state = GamificationState::new("user-1");
        state.advance_streak(day(1));
        state.advance_streak(day(2));
        state.advance_streak(day(3));
        assert_eq!(state.streak, 3);
    }

    #[test]
    fn streak_resets_after_gap() {
        let mut state = GamificationState::new("user-1");
        state.advance_streak(day(1));
        state.advance_streak(day(2));
        state.advance_streak(day(5));
        assert_eq!(state.streak, 1);
    }

    #[test]
    fn mastery_clamped_both_ends() {
        let mut state = GamificationState::new("user-1");
        for _ in 0..10 {
            state.adjust_mastery("algebra", true);
        }
        assert_eq!(state.mastery_of("algebra"), MASTERY_MAX);

        for _ in 0..10 {
            state.adjust_mastery("algebra", false);
        }
        assert_eq!(state.mastery_of("algebra"), 0);
    }

    #[test]
    fn level_derives_from_score() {
        let mut state = GamificationState::new("user-1");
        assert_eq!(state.level(), 1);
        state.add_score(250);
        assert_eq!(state.level(), 3);
        assert_eq!(state.score, 250);
    }

    #[test]
    fn summary_carries_topic_mastery() {
        let mut state = GamificationState::new("user-1");
        state.adjust_mastery("cells", true);
        let summary = ProgressSummary::of(&state, Some("cells"));
        assert_eq!(summary.topic_mastery, Some(("cells".into(), 1)));
        assert_eq!(summary.level, 1);
    }
}
