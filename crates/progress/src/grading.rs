//! Quiz grading — pure functions from artifact plus answers to a report.
//!
//! Grading always runs against the stored artifact's answer key. The
//! client's submitted answers are the only untrusted input.

use studykit_core::artifact::{ArtifactItems, StudyArtifact};
use studykit_core::error::ProgressError;
use studykit_core::progress::GradeReport;

/// Grade a submission against an artifact.
///
/// Only quizzes are gradable. The answer list must line up one-to-one
/// with the quiz items; a pass is at least half the items correct.
pub fn grade(
    artifact: &StudyArtifact,
    answers: &[String],
) -> std::result::Result<GradeReport, ProgressError> {
    let items = match &artifact.items {
        ArtifactItems::Quiz { items } if !items.is_empty() => items,
        _ => return Err(ProgressError::NotGradable(artifact.id.clone())),
    };

    if answers.len() != items.len() {
        return Err(ProgressError::AnswerCountMismatch {
            expected: items.len(),
            got: answers.len(),
        });
    }

    let item_results: Vec<bool> = items
        .iter()
        .zip(answers)
        .map(|(item, answer)| item.is_correct(answer))
        .collect();

    let correct = item_results.iter().filter(|r| **r).count();
    let score_delta: u64 = items
        .iter()
        .zip(&item_results)
        .filter(|(_, ok)| **ok)
        .map(|(item, _)| item.difficulty.weight() as u64)
        .sum();

    Ok(GradeReport {
        correct,
        total: items.len(),
        score_delta,
        passed: correct * 2 >= items.len(),
        item_results,
    })
}
