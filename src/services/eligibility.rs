use time::{Duration, PrimitiveDateTime};

use crate::db::models::{Exam, User};
use crate::db::types::{ExamStatus, UserRole};

/// Why a student may not start an exam right now. Expected business denials,
/// never errors; the message text is surfaced verbatim to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StartDenial {
    NotAvailable,
    NotYetOpen,
    Closed,
    NotEligible,
    AttemptLimitReached,
}

impl StartDenial {
    pub(crate) fn message(self) -> &'static str {
        match self {
            StartDenial::NotAvailable => "Exam is not currently available",
            StartDenial::NotYetOpen => "Exam has not started yet",
            StartDenial::Closed => "Exam has ended",
            StartDenial::NotEligible => "You are not eligible for this exam",
            StartDenial::AttemptLimitReached => "Maximum attempts reached for this exam",
        }
    }
}

/// Gate for starting (or resuming) an attempt. Pure over current state;
/// `completed_attempts` counts this student's non-in-progress results.
pub(crate) fn can_start(
    exam: &Exam,
    student_id: &str,
    completed_attempts: i64,
    now: PrimitiveDateTime,
) -> Result<(), StartDenial> {
    if exam.status != ExamStatus::Active {
        return Err(StartDenial::NotAvailable);
    }

    let opens_at = exam.start_time - Duration::minutes(exam.grace_before_minutes as i64);
    let closes_at = exam.end_time + Duration::minutes(exam.grace_after_minutes as i64);

    if now < opens_at {
        return Err(StartDenial::NotYetOpen);
    }
    if now > closes_at {
        return Err(StartDenial::Closed);
    }

    if !is_on_roster(exam, student_id) {
        return Err(StartDenial::NotEligible);
    }

    if completed_attempts >= exam.max_attempts as i64 {
        return Err(StartDenial::AttemptLimitReached);
    }

    Ok(())
}

/// Management rule: admins always; instructors only for their own exams or
/// exams owned by an admin. The owner's role must be resolved at check time
/// by the caller, never cached, so a demoted owner stops shielding access.
pub(crate) fn can_manage(actor: &User, owner_id: &str, owner_role: UserRole) -> bool {
    match actor.role {
        UserRole::Admin => true,
        UserRole::Instructor => actor.id == owner_id || owner_role == UserRole::Admin,
        UserRole::Student => false,
    }
}

/// View rule: managers may always view; students see an exam only when it is
/// active and the roster (if any) includes them.
pub(crate) fn can_view(actor: &User, exam: &Exam, owner_role: UserRole) -> bool {
    match actor.role {
        UserRole::Admin | UserRole::Instructor => {
            can_manage(actor, &exam.created_by, owner_role)
        }
        UserRole::Student => exam.status == ExamStatus::Active && is_on_roster(exam, &actor.id),
    }
}

/// An empty roster means the exam is open to every student.
fn is_on_roster(exam: &Exam, student_id: &str) -> bool {
    exam.eligible_students.0.is_empty()
        || exam.eligible_students.0.iter().any(|id| id == student_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::types::Json;
    use time::{Date, Time};

    use crate::db::types::ExamType;

    fn at(hour: u8) -> PrimitiveDateTime {
        let date = Date::from_calendar_date(2025, time::Month::March, 10).unwrap();
        PrimitiveDateTime::new(date, Time::from_hms(hour, 0, 0).unwrap())
    }

    fn exam(status: ExamStatus) -> Exam {
        Exam {
            id: "exam-1".to_string(),
            title: "Midterm".to_string(),
            description: None,
            subject_id: "subject-1".to_string(),
            exam_type: ExamType::Quiz,
            duration_minutes: 60,
            total_marks: 10.0,
            total_marks_overridden: false,
            passing_marks: 4.0,
            start_time: at(10),
            end_time: at(12),
            timezone: "UTC".to_string(),
            grace_before_minutes: 0,
            grace_after_minutes: 0,
            randomize_questions: false,
            allow_review: true,
            auto_submit: true,
            max_attempts: 1,
            eligible_students: Json(Vec::new()),
            status,
            created_by: "owner-1".to_string(),
            updated_by: None,
            created_at: at(1),
            updated_at: at(1),
        }
    }

    fn user(id: &str, role: UserRole) -> User {
        User {
            id: id.to_string(),
            username: id.to_string(),
            hashed_password: String::new(),
            full_name: id.to_string(),
            role,
            is_active: true,
            created_at: at(1),
            updated_at: at(1),
        }
    }

    #[test]
    fn start_denied_before_window_opens() {
        // Schedule opens at 10:00; it is currently an hour earlier.
        let exam = exam(ExamStatus::Active);
        let denial = can_start(&exam, "student-1", 0, at(9)).unwrap_err();
        assert_eq!(denial, StartDenial::NotYetOpen);
        assert_eq!(denial.message(), "Exam has not started yet");
    }

    #[test]
    fn start_denied_after_window_closes() {
        let exam = exam(ExamStatus::Active);
        let denial = can_start(&exam, "student-1", 0, at(13)).unwrap_err();
        assert_eq!(denial, StartDenial::Closed);
        assert_eq!(denial.message(), "Exam has ended");
    }

    #[test]
    fn grace_buffers_widen_the_window() {
        let mut exam = exam(ExamStatus::Active);
        exam.grace_before_minutes = 90;
        exam.grace_after_minutes = 90;

        assert!(can_start(&exam, "student-1", 0, at(9)).is_ok());
        assert!(can_start(&exam, "student-1", 0, at(13)).is_ok());
    }

    #[test]
    fn start_denied_when_not_active() {
        for status in [ExamStatus::Draft, ExamStatus::Completed, ExamStatus::Cancelled] {
            let exam = exam(status);
            assert_eq!(
                can_start(&exam, "student-1", 0, at(11)).unwrap_err(),
                StartDenial::NotAvailable
            );
        }
    }

    #[test]
    fn roster_gates_start_when_non_empty() {
        let mut exam = exam(ExamStatus::Active);
        exam.eligible_students = Json(vec!["student-1".to_string()]);

        assert!(can_start(&exam, "student-1", 0, at(11)).is_ok());
        assert_eq!(
            can_start(&exam, "student-2", 0, at(11)).unwrap_err(),
            StartDenial::NotEligible
        );
    }

    #[test]
    fn empty_roster_is_open_enrollment() {
        let exam = exam(ExamStatus::Active);
        assert!(can_start(&exam, "anyone", 0, at(11)).is_ok());
    }

    #[test]
    fn attempt_cap_blocks_further_starts() {
        let exam = exam(ExamStatus::Active);
        assert_eq!(
            can_start(&exam, "student-1", 1, at(11)).unwrap_err(),
            StartDenial::AttemptLimitReached
        );
    }

    #[test]
    fn admin_can_always_manage() {
        let admin = user("admin-1", UserRole::Admin);
        assert!(can_manage(&admin, "owner-1", UserRole::Instructor));
        assert!(can_manage(&admin, "someone-else", UserRole::Student));
    }

    #[test]
    fn instructor_manages_own_and_admin_owned_exams_only() {
        let instructor = user("instructor-1", UserRole::Instructor);

        assert!(can_manage(&instructor, "instructor-1", UserRole::Instructor));
        assert!(can_manage(&instructor, "owner-1", UserRole::Admin));
        // A peer instructor's exam stays off limits even though this
        // instructor owns exams of their own.
        assert!(!can_manage(&instructor, "instructor-2", UserRole::Instructor));
    }

    #[test]
    fn student_never_manages() {
        let student = user("student-1", UserRole::Student);
        assert!(!can_manage(&student, "student-1", UserRole::Student));
        assert!(!can_manage(&student, "owner-1", UserRole::Admin));
    }

    #[test]
    fn student_view_requires_active_status_and_roster() {
        let student = user("student-1", UserRole::Student);

        let open = exam(ExamStatus::Active);
        assert!(can_view(&student, &open, UserRole::Instructor));

        let draft = exam(ExamStatus::Draft);
        assert!(!can_view(&student, &draft, UserRole::Instructor));

        let mut rostered = exam(ExamStatus::Active);
        rostered.eligible_students = Json(vec!["someone-else".to_string()]);
        assert!(!can_view(&student, &rostered, UserRole::Instructor));
    }

    #[test]
    fn instructor_view_follows_manage_rule() {
        let instructor = user("instructor-1", UserRole::Instructor);
        let peer_owned = exam(ExamStatus::Active);
        assert!(!can_view(&instructor, &peer_owned, UserRole::Instructor));
        assert!(can_view(&instructor, &peer_owned, UserRole::Admin));
    }
}
