use serde::{Deserialize, Serialize};
use sqlx::Type;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "userrole", rename_all = "lowercase")]
pub(crate) enum UserRole {
    Admin,
    Instructor,
    Student,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "questiontype", rename_all = "snake_case")]
pub(crate) enum QuestionType {
    SingleSelect,
    MultiSelect,
    TrueFalse,
    FillBlank,
    Essay,
}

impl QuestionType {
    /// Choice types carry an option list with correct-answer flags.
    pub(crate) fn is_selectable(self) -> bool {
        matches!(
            self,
            QuestionType::SingleSelect | QuestionType::MultiSelect | QuestionType::TrueFalse
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "questionstatus", rename_all = "lowercase")]
pub(crate) enum QuestionStatus {
    Active,
    Archived,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "difficultylevel", rename_all = "lowercase")]
pub(crate) enum DifficultyLevel {
    Easy,
    Medium,
    Hard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "examtype", rename_all = "lowercase")]
pub(crate) enum ExamType {
    Quiz,
    Final,
    Practice,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "examstatus", rename_all = "lowercase")]
pub(crate) enum ExamStatus {
    Draft,
    Active,
    Completed,
    Cancelled,
}

impl ExamStatus {
    pub(crate) fn can_transition_to(self, next: ExamStatus) -> bool {
        matches!(
            (self, next),
            (ExamStatus::Draft, ExamStatus::Active)
                | (ExamStatus::Draft, ExamStatus::Cancelled)
                | (ExamStatus::Active, ExamStatus::Completed)
                | (ExamStatus::Active, ExamStatus::Cancelled)
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "attemptstatus", rename_all = "snake_case")]
pub(crate) enum AttemptStatus {
    InProgress,
    Completed,
    AutoSubmitted,
    Graded,
}

impl AttemptStatus {
    /// Student-initiated mutation (save/submit) is only legal while in progress.
    pub(crate) fn is_terminal(self) -> bool {
        !matches!(self, AttemptStatus::InProgress)
    }

    pub(crate) fn can_transition_to(self, next: AttemptStatus) -> bool {
        matches!(
            (self, next),
            (AttemptStatus::InProgress, AttemptStatus::Completed)
                | (AttemptStatus::InProgress, AttemptStatus::AutoSubmitted)
                | (AttemptStatus::Completed, AttemptStatus::Graded)
                | (AttemptStatus::AutoSubmitted, AttemptStatus::Graded)
                | (AttemptStatus::Graded, AttemptStatus::Graded)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exam_status_transitions() {
        assert!(ExamStatus::Draft.can_transition_to(ExamStatus::Active));
        assert!(ExamStatus::Active.can_transition_to(ExamStatus::Completed));
        assert!(ExamStatus::Active.can_transition_to(ExamStatus::Cancelled));
        assert!(!ExamStatus::Completed.can_transition_to(ExamStatus::Active));
        assert!(!ExamStatus::Cancelled.can_transition_to(ExamStatus::Draft));
        assert!(!ExamStatus::Draft.can_transition_to(ExamStatus::Completed));
    }

    #[test]
    fn attempt_status_transitions() {
        assert!(AttemptStatus::InProgress.can_transition_to(AttemptStatus::Completed));
        assert!(AttemptStatus::InProgress.can_transition_to(AttemptStatus::AutoSubmitted));
        assert!(AttemptStatus::Completed.can_transition_to(AttemptStatus::Graded));
        assert!(AttemptStatus::AutoSubmitted.can_transition_to(AttemptStatus::Graded));
        // Re-grading an already-graded attempt is a legal self-transition.
        assert!(AttemptStatus::Graded.can_transition_to(AttemptStatus::Graded));
        assert!(!AttemptStatus::InProgress.can_transition_to(AttemptStatus::Graded));
        assert!(!AttemptStatus::Completed.can_transition_to(AttemptStatus::InProgress));
        assert!(!AttemptStatus::Graded.can_transition_to(AttemptStatus::Completed));
    }

    #[test]
    fn selectable_question_types() {
        assert!(QuestionType::SingleSelect.is_selectable());
        assert!(QuestionType::MultiSelect.is_selectable());
        assert!(QuestionType::TrueFalse.is_selectable());
        assert!(!QuestionType::FillBlank.is_selectable());
        assert!(!QuestionType::Essay.is_selectable());
    }
}
