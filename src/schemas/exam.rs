use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};
use validator::Validate;

use crate::core::time::format_primitive;
use crate::db::models::Exam;
use crate::db::types::{DifficultyLevel, ExamStatus, ExamType, QuestionType};
use crate::repositories::exams::ExamQuestionRow;

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamQuestionAttach {
    #[serde(alias = "questionId")]
    pub(crate) question_id: String,
    #[serde(default)]
    #[validate(range(exclusive_min = 0.0, message = "marks must be positive"))]
    pub(crate) marks: Option<f64>,
    #[serde(default)]
    #[serde(alias = "orderIndex")]
    #[validate(range(min = 0, message = "order_index must be non-negative"))]
    pub(crate) order_index: Option<i32>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamCreate {
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: String,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(alias = "subjectId")]
    pub(crate) subject_id: String,
    #[serde(default = "default_exam_type")]
    #[serde(alias = "examType")]
    pub(crate) exam_type: ExamType,
    #[serde(alias = "durationMinutes")]
    #[validate(range(min = 1, message = "duration_minutes must be positive"))]
    pub(crate) duration_minutes: i32,
    #[serde(default)]
    #[serde(alias = "totalMarks")]
    #[validate(range(exclusive_min = 0.0, message = "total_marks must be positive"))]
    pub(crate) total_marks: Option<f64>,
    #[serde(alias = "passingMarks")]
    #[validate(range(min = 0.0, message = "passing_marks must be non-negative"))]
    pub(crate) passing_marks: f64,
    #[serde(alias = "startTime", deserialize_with = "deserialize_offset_datetime_flexible")]
    pub(crate) start_time: OffsetDateTime,
    #[serde(alias = "endTime", deserialize_with = "deserialize_offset_datetime_flexible")]
    pub(crate) end_time: OffsetDateTime,
    #[serde(default = "default_timezone")]
    pub(crate) timezone: String,
    #[serde(default)]
    #[serde(alias = "graceBeforeMinutes")]
    #[validate(range(min = 0, message = "grace_before_minutes must be non-negative"))]
    pub(crate) grace_before_minutes: i32,
    #[serde(default)]
    #[serde(alias = "graceAfterMinutes")]
    #[validate(range(min = 0, message = "grace_after_minutes must be non-negative"))]
    pub(crate) grace_after_minutes: i32,
    #[serde(default)]
    #[serde(alias = "randomizeQuestions")]
    pub(crate) randomize_questions: bool,
    #[serde(default = "default_true")]
    #[serde(alias = "allowReview")]
    pub(crate) allow_review: bool,
    #[serde(default = "default_true")]
    #[serde(alias = "autoSubmit")]
    pub(crate) auto_submit: bool,
    #[serde(default = "default_max_attempts")]
    #[serde(alias = "maxAttempts")]
    #[validate(range(min = 1, message = "max_attempts must be positive"))]
    pub(crate) max_attempts: i32,
    #[serde(default)]
    #[serde(alias = "eligibleStudents")]
    pub(crate) eligible_students: Vec<String>,
    #[serde(default)]
    #[validate(nested)]
    pub(crate) questions: Vec<ExamQuestionAttach>,
}

#[derive(Debug, Deserialize, Validate)]
pub(crate) struct ExamUpdate {
    #[serde(default)]
    #[validate(length(min = 1, message = "title must not be empty"))]
    pub(crate) title: Option<String>,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default)]
    #[serde(alias = "examType")]
    pub(crate) exam_type: Option<ExamType>,
    #[serde(default)]
    #[serde(alias = "durationMinutes")]
    #[validate(range(min = 1, message = "duration_minutes must be positive"))]
    pub(crate) duration_minutes: Option<i32>,
    #[serde(default)]
    #[serde(alias = "totalMarks")]
    #[validate(range(exclusive_min = 0.0, message = "total_marks must be positive"))]
    pub(crate) total_marks: Option<f64>,
    #[serde(default)]
    #[serde(alias = "passingMarks")]
    #[validate(range(min = 0.0, message = "passing_marks must be non-negative"))]
    pub(crate) passing_marks: Option<f64>,
    #[serde(
        default,
        alias = "startTime",
        deserialize_with = "deserialize_option_offset_datetime_flexible"
    )]
    pub(crate) start_time: Option<OffsetDateTime>,
    #[serde(
        default,
        alias = "endTime",
        deserialize_with = "deserialize_option_offset_datetime_flexible"
    )]
    pub(crate) end_time: Option<OffsetDateTime>,
    #[serde(default)]
    pub(crate) timezone: Option<String>,
    #[serde(default)]
    #[serde(alias = "graceBeforeMinutes")]
    #[validate(range(min = 0, message = "grace_before_minutes must be non-negative"))]
    pub(crate) grace_before_minutes: Option<i32>,
    #[serde(default)]
    #[serde(alias = "graceAfterMinutes")]
    #[validate(range(min = 0, message = "grace_after_minutes must be non-negative"))]
    pub(crate) grace_after_minutes: Option<i32>,
    #[serde(default)]
    #[serde(alias = "randomizeQuestions")]
    pub(crate) randomize_questions: Option<bool>,
    #[serde(default)]
    #[serde(alias = "allowReview")]
    pub(crate) allow_review: Option<bool>,
    #[serde(default)]
    #[serde(alias = "autoSubmit")]
    pub(crate) auto_submit: Option<bool>,
    #[serde(default)]
    #[serde(alias = "maxAttempts")]
    #[validate(range(min = 1, message = "max_attempts must be positive"))]
    pub(crate) max_attempts: Option<i32>,
    #[serde(default)]
    #[serde(alias = "eligibleStudents")]
    pub(crate) eligible_students: Option<Vec<String>>,
}

impl ExamUpdate {
    /// True when the patch touches a field frozen after the exam starts.
    pub(crate) fn touches_structure(&self) -> bool {
        self.title.is_some()
            || self.exam_type.is_some()
            || self.duration_minutes.is_some()
            || self.total_marks.is_some()
            || self.passing_marks.is_some()
            || self.start_time.is_some()
            || self.timezone.is_some()
            || self.grace_before_minutes.is_some()
            || self.grace_after_minutes.is_some()
            || self.max_attempts.is_some()
            || self.eligible_students.is_some()
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct ExamStatusUpdate {
    pub(crate) status: ExamStatus,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamQuestionDetail {
    pub(crate) question_id: String,
    pub(crate) question_text: String,
    pub(crate) question_type: QuestionType,
    pub(crate) options: Vec<serde_json::Value>,
    pub(crate) reference_answer: Option<String>,
    pub(crate) marks: f64,
    pub(crate) negative_marks: f64,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) order_index: i32,
}

#[derive(Debug, Serialize)]
pub(crate) struct ExamResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) subject_id: String,
    pub(crate) exam_type: ExamType,
    pub(crate) duration_minutes: i32,
    pub(crate) total_marks: f64,
    pub(crate) passing_marks: f64,
    pub(crate) start_time: String,
    pub(crate) end_time: String,
    pub(crate) timezone: String,
    pub(crate) grace_before_minutes: i32,
    pub(crate) grace_after_minutes: i32,
    pub(crate) randomize_questions: bool,
    pub(crate) allow_review: bool,
    pub(crate) auto_submit: bool,
    pub(crate) max_attempts: i32,
    pub(crate) eligible_students: Vec<String>,
    pub(crate) status: ExamStatus,
    pub(crate) created_by: String,
    pub(crate) updated_by: Option<String>,
    pub(crate) created_at: String,
    pub(crate) updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) questions: Option<Vec<ExamQuestionDetail>>,
}

impl ExamResponse {
    pub(crate) fn from_db(exam: Exam, questions: Option<Vec<ExamQuestionRow>>) -> Self {
        Self {
            id: exam.id,
            title: exam.title,
            description: exam.description,
            subject_id: exam.subject_id,
            exam_type: exam.exam_type,
            duration_minutes: exam.duration_minutes,
            total_marks: exam.total_marks,
            passing_marks: exam.passing_marks,
            start_time: format_primitive(exam.start_time),
            end_time: format_primitive(exam.end_time),
            timezone: exam.timezone,
            grace_before_minutes: exam.grace_before_minutes,
            grace_after_minutes: exam.grace_after_minutes,
            randomize_questions: exam.randomize_questions,
            allow_review: exam.allow_review,
            auto_submit: exam.auto_submit,
            max_attempts: exam.max_attempts,
            eligible_students: exam.eligible_students.0,
            status: exam.status,
            created_by: exam.created_by,
            updated_by: exam.updated_by,
            created_at: format_primitive(exam.created_at),
            updated_at: format_primitive(exam.updated_at),
            questions: questions.map(|rows| {
                rows.into_iter()
                    .map(|row| ExamQuestionDetail {
                        question_id: row.question_id,
                        question_text: row.question_text,
                        question_type: row.question_type,
                        options: row
                            .options
                            .0
                            .iter()
                            .map(|option| {
                                serde_json::json!({
                                    "text": option.text,
                                    "is_correct": option.is_correct,
                                })
                            })
                            .collect(),
                        reference_answer: row.reference_answer,
                        marks: row.marks,
                        negative_marks: row.negative_marks,
                        difficulty: row.difficulty,
                        order_index: row.order_index,
                    })
                    .collect()
            }),
        }
    }
}

/// Question payload for students: option texts only, no correct-answer
/// markers, no reference answers.
#[derive(Debug, Serialize)]
pub(crate) struct SanitizedQuestion {
    pub(crate) question_id: String,
    pub(crate) question_text: String,
    pub(crate) question_type: QuestionType,
    pub(crate) options: Vec<String>,
    pub(crate) marks: f64,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) order_index: i32,
}

impl SanitizedQuestion {
    pub(crate) fn from_row(row: ExamQuestionRow) -> Self {
        Self {
            question_id: row.question_id,
            question_text: row.question_text,
            question_type: row.question_type,
            options: row.options.0.into_iter().map(|option| option.text).collect(),
            marks: row.marks,
            difficulty: row.difficulty,
            order_index: row.order_index,
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct StudentExamResponse {
    pub(crate) id: String,
    pub(crate) title: String,
    pub(crate) description: Option<String>,
    pub(crate) subject_id: String,
    pub(crate) exam_type: ExamType,
    pub(crate) duration_minutes: i32,
    pub(crate) total_marks: f64,
    pub(crate) passing_marks: f64,
    pub(crate) start_time: String,
    pub(crate) end_time: String,
    pub(crate) timezone: String,
    pub(crate) allow_review: bool,
    pub(crate) max_attempts: i32,
    pub(crate) questions: Vec<SanitizedQuestion>,
}

impl StudentExamResponse {
    pub(crate) fn from_db(exam: Exam, questions: Vec<SanitizedQuestion>) -> Self {
        Self {
            id: exam.id,
            title: exam.title,
            description: exam.description,
            subject_id: exam.subject_id,
            exam_type: exam.exam_type,
            duration_minutes: exam.duration_minutes,
            total_marks: exam.total_marks,
            passing_marks: exam.passing_marks,
            start_time: format_primitive(exam.start_time),
            end_time: format_primitive(exam.end_time),
            timezone: exam.timezone,
            allow_review: exam.allow_review,
            max_attempts: exam.max_attempts,
            questions,
        }
    }
}

fn default_exam_type() -> ExamType {
    ExamType::Quiz
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_max_attempts() -> i32 {
    1
}

fn default_true() -> bool {
    true
}

fn parse_offset_datetime_flexible(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(value);
    }

    // datetime-local inputs often arrive without a timezone suffix.
    if raw.len() == 16 && raw.as_bytes().get(10) == Some(&b'T') {
        let candidate = format!("{raw}:00Z");
        if let Ok(value) = OffsetDateTime::parse(&candidate, &Rfc3339) {
            return Some(value);
        }
    }

    if raw.len() == 19 && raw.as_bytes().get(10) == Some(&b'T') {
        let candidate = format!("{raw}Z");
        if let Ok(value) = OffsetDateTime::parse(&candidate, &Rfc3339) {
            return Some(value);
        }
    }

    if let Ok(value) =
        PrimitiveDateTime::parse(raw, &format_description!("[year]-[month]-[day]T[hour]:[minute]"))
    {
        return Some(value.assume_utc());
    }
    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
    ) {
        return Some(value.assume_utc());
    }

    None
}

fn deserialize_offset_datetime_flexible<'de, D>(deserializer: D) -> Result<OffsetDateTime, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_offset_datetime_flexible(&raw)
        .ok_or_else(|| D::Error::custom(format!("invalid datetime: {raw}")))
}

fn deserialize_option_offset_datetime_flexible<'de, D>(
    deserializer: D,
) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        Some(value) => parse_offset_datetime_flexible(&value)
            .ok_or_else(|| D::Error::custom(format!("invalid datetime: {value}")))
            .map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flexible_datetime_accepts_rfc3339() {
        let parsed = parse_offset_datetime_flexible("2025-03-10T10:00:00Z").expect("rfc3339");
        assert_eq!(parsed.hour(), 10);
    }

    #[test]
    fn flexible_datetime_accepts_local_without_zone() {
        assert!(parse_offset_datetime_flexible("2025-03-10T10:00").is_some());
        assert!(parse_offset_datetime_flexible("2025-03-10T10:00:30").is_some());
    }

    #[test]
    fn flexible_datetime_rejects_garbage() {
        assert!(parse_offset_datetime_flexible("next tuesday").is_none());
    }

    #[test]
    fn exam_create_applies_defaults() {
        let payload: ExamCreate = serde_json::from_value(serde_json::json!({
            "title": "Algebra quiz",
            "subject_id": "subject-1",
            "duration_minutes": 30,
            "passing_marks": 4.0,
            "start_time": "2025-03-10T10:00:00Z",
            "end_time": "2025-03-10T12:00:00Z"
        }))
        .expect("payload");

        assert_eq!(payload.max_attempts, 1);
        assert!(payload.allow_review);
        assert!(payload.auto_submit);
        assert!(!payload.randomize_questions);
        assert!(payload.eligible_students.is_empty());
        assert_eq!(payload.timezone, "UTC");
    }

    #[test]
    fn structural_fields_are_detected() {
        let patch: ExamUpdate =
            serde_json::from_value(serde_json::json!({"title": "New"})).expect("patch");
        assert!(patch.touches_structure());

        let patch: ExamUpdate =
            serde_json::from_value(serde_json::json!({"description": "late note"}))
                .expect("patch");
        assert!(!patch.touches_structure());

        let patch: ExamUpdate =
            serde_json::from_value(serde_json::json!({"end_time": "2025-03-10T13:00:00Z"}))
                .expect("patch");
        assert!(!patch.touches_structure());
    }
}
