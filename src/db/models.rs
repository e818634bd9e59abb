use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;
use time::PrimitiveDateTime;

use crate::db::types::{
    AttemptStatus, DifficultyLevel, ExamStatus, ExamType, QuestionStatus, QuestionType, UserRole,
};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct User {
    pub(crate) id: String,
    pub(crate) username: String,
    pub(crate) hashed_password: String,
    pub(crate) full_name: String,
    pub(crate) role: UserRole,
    pub(crate) is_active: bool,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Subject {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) code: String,
    pub(crate) description: Option<String>,
    pub(crate) is_archived: bool,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct QuestionOption {
    pub(crate) text: String,
    #[serde(default)]
    pub(crate) is_correct: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Question {
    pub(crate) id: String,
    pub(crate) subject_id: String,
    pub(crate) question_text: String,
    pub(crate) question_type: QuestionType,
    pub(crate) options: Json<Vec<QuestionOption>>,
    pub(crate) reference_answer: Option<String>,
    pub(crate) marks: f64,
    pub(crate) negative_marks: f64,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) topic: Option<String>,
    pub(crate) status: QuestionStatus,
    pub(crate) version: i32,
    pub(crate) created_by: String,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct Exam {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) subject_id: String,
    pub(crate) exam_type: ExamType,
    pub(crate) duration_minutes: i32,
    pub(crate) total_marks: f64,
    pub(crate) total_marks_overridden: bool,
    pub(crate) passing_marks: f64,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: PrimitiveDateTime,
    pub(crate) timezone: String,
    pub(crate) grace_before_minutes: i32,
    pub(crate) grace_after_minutes: i32,
    pub(crate) randomize_questions: bool,
    pub(crate) allow_review: bool,
    pub(crate) auto_submit: bool,
    pub(crate) max_attempts: i32,
    pub(crate) eligible_students: Json<Vec<String>>,
    pub(crate) status: ExamStatus,
    pub(crate) created_by: String,
    pub(crate) updated_by: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// One answer slot inside a result's JSONB answer list. Pre-seeded empty per
/// exam question at start; patched during the attempt; scored at submit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct AnswerRecord {
    pub(crate) question_id: String,
    #[serde(default)]
    pub(crate) selected_options: Vec<i32>,
    #[serde(default)]
    pub(crate) text_answer: Option<String>,
    #[serde(default)]
    pub(crate) marks_obtained: f64,
    #[serde(default)]
    pub(crate) is_correct: Option<bool>,
    #[serde(default)]
    pub(crate) time_spent_seconds: i64,
    #[serde(default)]
    pub(crate) flagged: bool,
}

impl AnswerRecord {
    pub(crate) fn empty(question_id: String) -> Self {
        Self {
            question_id,
            selected_options: Vec::new(),
            text_answer: None,
            marks_obtained: 0.0,
            is_correct: None,
            time_spent_seconds: 0,
            flagged: false,
        }
    }

    pub(crate) fn is_attempted(&self) -> bool {
        !self.selected_options.is_empty()
            || self.text_answer.as_deref().is_some_and(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub(crate) struct ExamResult {
    pub(crate) id: String,
    pub(crate) exam_id: String,
    pub(crate) student_id: String,
    pub(crate) attempt_number: i32,
    pub(crate) answers: Json<Vec<AnswerRecord>>,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) ended_at: Option<PrimitiveDateTime>,
    pub(crate) ip_address: Option<String>,
    pub(crate) user_agent: Option<String>,
    pub(crate) total_marks: f64,
    pub(crate) marks_obtained: f64,
    pub(crate) percentage: f64,
    pub(crate) grade: String,
    pub(crate) passed: bool,
    pub(crate) attempted_count: i32,
    pub(crate) correct_count: i32,
    pub(crate) incorrect_count: i32,
    pub(crate) skipped_count: i32,
    pub(crate) time_spent_seconds: i64,
    pub(crate) status: AttemptStatus,
    pub(crate) reviewed_by: Option<String>,
    pub(crate) reviewed_at: Option<PrimitiveDateTime>,
    pub(crate) feedback: Option<String>,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_answer_is_not_attempted() {
        let answer = AnswerRecord::empty("q1".to_string());
        assert!(!answer.is_attempted());
    }

    #[test]
    fn whitespace_text_is_not_attempted() {
        let mut answer = AnswerRecord::empty("q1".to_string());
        answer.text_answer = Some("   ".to_string());
        assert!(!answer.is_attempted());
    }

    #[test]
    fn selection_counts_as_attempted() {
        let mut answer = AnswerRecord::empty("q1".to_string());
        answer.selected_options = vec![0];
        assert!(answer.is_attempted());
    }
}
