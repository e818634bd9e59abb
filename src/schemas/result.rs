use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{AnswerRecord, ExamResult};
use crate::db::types::AttemptStatus;

/// One incoming answer mutation, addressed by question reference. Patches for
/// questions not in the exam are silently ignored.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct AnswerPatch {
    #[serde(alias = "questionId")]
    pub(crate) question_id: String,
    #[serde(default)]
    #[serde(alias = "selectedOptions")]
    pub(crate) selected_options: Option<Vec<i32>>,
    #[serde(default)]
    #[serde(alias = "textAnswer")]
    pub(crate) text_answer: Option<String>,
    #[serde(default)]
    #[serde(alias = "timeSpent", alias = "time_spent")]
    pub(crate) time_spent_seconds: Option<i64>,
    #[serde(default)]
    pub(crate) flagged: Option<bool>,
}

impl AnswerPatch {
    pub(crate) fn apply_to(&self, answer: &mut AnswerRecord) {
        if let Some(selected) = &self.selected_options {
            answer.selected_options = selected.clone();
        }
        if let Some(text) = &self.text_answer {
            answer.text_answer = Some(text.clone());
        }
        if let Some(time_spent) = self.time_spent_seconds {
            answer.time_spent_seconds = time_spent.max(0);
        }
        if let Some(flagged) = self.flagged {
            answer.flagged = flagged;
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct GradeRequest {
    #[validate(range(min = 0.0, message = "score must be non-negative"))]
    pub(crate) score: f64,
    #[serde(default)]
    pub(crate) feedback: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Validate)]
pub(crate) struct BulkGradeItem {
    #[serde(alias = "resultId")]
    pub(crate) result_id: String,
    #[validate(range(min = 0.0, message = "score must be non-negative"))]
    pub(crate) score: f64,
    #[serde(default)]
    pub(crate) feedback: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct BulkGradeRequest {
    #[validate(length(min = 1, message = "items must not be empty"))]
    #[validate(nested)]
    pub(crate) items: Vec<BulkGradeItem>,
}

#[derive(Debug, Serialize)]
pub(crate) struct BulkGradeOutcome {
    pub(crate) result_id: String,
    pub(crate) success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) error: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct ScoringSummaryResponse {
    pub(crate) total_marks: f64,
    pub(crate) marks_obtained: f64,
    pub(crate) percentage: f64,
    pub(crate) grade: String,
    pub(crate) passed: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct AttemptStatsResponse {
    pub(crate) attempted: i32,
    pub(crate) correct: i32,
    pub(crate) incorrect: i32,
    pub(crate) skipped: i32,
    pub(crate) time_spent_seconds: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct ResultResponse {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) status: AttemptStatus,
    pub(crate) started_at: String,
    pub(crate) ended_at: Option<String>,
    pub(crate) scoring: ScoringSummaryResponse,
    pub(crate) stats: AttemptStatsResponse,
    pub(crate) reviewed_by: Option<String>,
    pub(crate) reviewed_at: Option<String>,
    pub(crate) feedback: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) answers: Option<Vec<AnswerRecord>>,
}

impl ResultResponse {
    pub(crate) fn from_db(result: ExamResult, include_answers: bool) -> Self {
        Self {
            id: result.id,
            exam_id: result.exam_id,
            student_id: result.student_id,
            attempt_number: result.attempt_number,
            status: result.status,
            started_at: format_primitive(result.started_at),
            ended_at: result.ended_at.map(format_primitive),
            scoring: ScoringSummaryResponse {
                total_marks: result.total_marks,
                marks_obtained: result.marks_obtained,
                percentage: result.percentage,
                grade: result.grade,
                passed: result.passed,
            },
            stats: AttemptStatsResponse {
                attempted: result.attempted_count,
                correct: result.correct_count,
                incorrect: result.incorrect_count,
                skipped: result.skipped_count,
                time_spent_seconds: result.time_spent_seconds,
            },
            reviewed_by: result.reviewed_by,
            reviewed_at: result.reviewed_at.map(format_primitive),
            feedback: result.feedback,
            answers: include_answers.then_some(result.answers.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_merges_only_provided_fields() {
        let mut answer = AnswerRecord::empty("q1".to_string());
        answer.flagged = true;

        let patch: AnswerPatch = serde_json::from_value(serde_json::json!({
            "question_id": "q1",
            "selected_options": [2]
        }))
        .expect("patch");

        patch.apply_to(&mut answer);

        assert_eq!(answer.selected_options, vec![2]);
        // Untouched fields keep their prior values.
        assert!(answer.flagged);
        assert_eq!(answer.text_answer, None);
    }

    #[test]
    fn patch_clamps_negative_time_spent() {
        let mut answer = AnswerRecord::empty("q1".to_string());
        let patch: AnswerPatch = serde_json::from_value(serde_json::json!({
            "question_id": "q1",
            "timeSpent": -30
        }))
        .expect("patch");

        assert_eq!(patch.time_spent_seconds, Some(-30));
        patch.apply_to(&mut answer);
        assert_eq!(answer.time_spent_seconds, 0);
    }
}
