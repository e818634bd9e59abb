use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::{Question, QuestionOption};
use crate::db::types::{DifficultyLevel, QuestionStatus, QuestionType};

#[derive(Debug, Clone, Deserialize, Validate)]
pub(crate) struct OptionCreate {
    #[validate(length(min = 1, message = "option text must not be empty"))]
    pub(crate) text: String,
    #[serde(default)]
    #[serde(alias = "isCorrect")]
    pub(crate) is_correct: bool,
}

impl OptionCreate {
    pub(crate) fn into_db(self) -> QuestionOption {
        QuestionOption { text: self.text, is_correct: self.is_correct }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionCreate {
    #[serde(alias = "subjectId")]
    pub(crate) subject_id: String,
    #[serde(alias = "questionText")]
    #[validate(length(min = 1, message = "question_text must not be empty"))]
    pub(crate) question_text: String,
    #[serde(alias = "questionType")]
    pub(crate) question_type: QuestionType,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) options: Vec<OptionCreate>,
    #[serde(default)]
    #[serde(alias = "referenceAnswer")]
    pub(crate) reference_answer: Option<String>,
    #[validate(range(exclusive_min = 0.0, message = "marks must be positive"))]
    pub(crate) marks: f64,
    #[serde(default)]
    #[serde(alias = "negativeMarks")]
    #[validate(range(min = 0.0, message = "negative_marks must be non-negative"))]
    pub(crate) negative_marks: f64,
    #[serde(default = "default_difficulty")]
    pub(crate) difficulty: DifficultyLevel,
    #[serde(default)]
    pub(crate) topic: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct QuestionUpdate {
    #[serde(default)]
    #[serde(alias = "questionText")]
    #[validate(length(min = 1, message = "question_text must not be empty"))]
    pub(crate) question_text: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) options: Option<Vec<OptionCreate>>,
    #[serde(default)]
    #[serde(alias = "referenceAnswer")]
    pub(crate) reference_answer: Option<String>,
    #[serde(default)]
    #[validate(range(exclusive_min = 0.0, message = "marks must be positive"))]
    pub(crate) marks: Option<f64>,
    #[serde(default)]
    #[serde(alias = "negativeMarks")]
    #[validate(range(min = 0.0, message = "negative_marks must be non-negative"))]
    pub(crate) negative_marks: Option<f64>,
    #[serde(default)]
    pub(crate) difficulty: Option<DifficultyLevel>,
    #[serde(default)]
    pub(crate) topic: Option<String>,
}

#[derive(Debug, Serialize)]
pub(crate) struct OptionResponse {
    pub(crate) text: String,
    pub(crate) is_correct: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct QuestionResponse {
    pub(crate) id: String,
    pub(crate) subject_id: String,
    pub(crate) question_text: String,
    pub(crate) question_type: QuestionType,
    pub(crate) options: Vec<OptionResponse>,
    pub(crate) reference_answer: Option<String>,
    pub(crate) marks: f64,
    pub(crate) negative_marks: f64,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) topic: Option<String>,
    pub(crate) status: QuestionStatus,
    pub(crate) version: i32,
    pub(crate) created_by: String,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
}

impl QuestionResponse {
    pub(crate) fn from_db(question: Question) -> Self {
        Self {
            id: question.id,
            subject_id: question.subject_id,
            question_text: question.question_text,
            question_type: question.question_type,
            options: question
                .options
                .0
                .into_iter()
                .map(|option| OptionResponse { text: option.text, is_correct: option.is_correct })
                .collect(),
            reference_answer: question.reference_answer,
            marks: question.marks,
            negative_marks: question.negative_marks,
            difficulty: question.difficulty,
            topic: question.topic,
            status: question.status,
            version: question.version,
            created_by: question.created_by,
            created_at: format_primitive(question.created_at),
            updated_at: format_primitive(question.updated_at),
        }
    }
}

fn default_difficulty() -> DifficultyLevel {
    DifficultyLevel::Medium
}
