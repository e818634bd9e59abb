use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::{AnswerRecord, ExamResult};
use crate::db::types::AttemptStatus;

const COLUMNS: &str = "\
    id, exam_id, student_id, attempt_number, answers, started_at, ended_at, \
    ip_address, user_agent, total_marks, marks_obtained, percentage, grade, passed, \
    attempted_count, correct_count, incorrect_count, skipped_count, time_spent_seconds, \
    status, reviewed_by, reviewed_at, feedback, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<ExamResult>, sqlx::Error> {
    sqlx::query_as::<_, ExamResult>(&format!("SELECT {COLUMNS} FROM results WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn find_in_progress(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    student_id: &str,
) -> Result<Option<ExamResult>, sqlx::Error> {
    sqlx::query_as::<_, ExamResult>(&format!(
        "SELECT {COLUMNS} FROM results
         WHERE exam_id = $1 AND student_id = $2 AND status = $3"
    ))
    .bind(exam_id)
    .bind(student_id)
    .bind(AttemptStatus::InProgress)
    .fetch_optional(executor)
    .await
}

/// The most recent finalized attempt, used to answer duplicate submits with
/// the already-persisted summary.
pub(crate) async fn find_latest_terminal(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    student_id: &str,
) -> Result<Option<ExamResult>, sqlx::Error> {
    sqlx::query_as::<_, ExamResult>(&format!(
        "SELECT {COLUMNS} FROM results
         WHERE exam_id = $1 AND student_id = $2 AND status <> $3
         ORDER BY attempt_number DESC
         LIMIT 1"
    ))
    .bind(exam_id)
    .bind(student_id)
    .bind(AttemptStatus::InProgress)
    .fetch_optional(executor)
    .await
}

/// Attempts that count against the cap: everything this student has that is
/// no longer in progress.
pub(crate) async fn count_completed_attempts(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    student_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COUNT(*) FROM results
         WHERE exam_id = $1 AND student_id = $2 AND status <> $3",
    )
    .bind(exam_id)
    .bind(student_id)
    .bind(AttemptStatus::InProgress)
    .fetch_one(executor)
    .await
}

pub(crate) struct CreateResult<'a> {
    pub(crate) id: &'a str,
    pub(crate) exam_id: &'a str,
    pub(crate) student_id: &'a str,
    pub(crate) attempt_number: i32,
    pub(crate) answers: Vec<AnswerRecord>,
    pub(crate) started_at: PrimitiveDateTime,
    pub(crate) ip_address: Option<&'a str>,
    pub(crate) user_agent: Option<&'a str>,
    pub(crate) total_marks: f64,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

/// Create-if-absent: the partial unique index on (exam, student) in-progress
/// rows makes concurrent starts race here; false means another request won
/// and the caller should re-read the surviving row.
pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateResult<'_>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO results (
            id, exam_id, student_id, attempt_number, answers, started_at,
            ip_address, user_agent, total_marks, status, created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12)
        ON CONFLICT DO NOTHING",
    )
    .bind(params.id)
    .bind(params.exam_id)
    .bind(params.student_id)
    .bind(params.attempt_number)
    .bind(Json(params.answers))
    .bind(params.started_at)
    .bind(params.ip_address)
    .bind(params.user_agent)
    .bind(params.total_marks)
    .bind(AttemptStatus::InProgress)
    .bind(params.created_at)
    .bind(params.updated_at)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// Answer-save during an attempt. Guarded on in-progress status so a save
/// racing a submit can never resurrect a finalized attempt.
pub(crate) async fn update_answers(
    pool: &PgPool,
    id: &str,
    answers: &[AnswerRecord],
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE results SET answers = $1, updated_at = $2
         WHERE id = $3 AND status = $4",
    )
    .bind(Json(answers))
    .bind(now)
    .bind(id)
    .bind(AttemptStatus::InProgress)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) struct FinalizeResult<'a> {
    pub(crate) answers: &'a [AnswerRecord],
    pub(crate) ended_at: PrimitiveDateTime,
    pub(crate) total_marks: f64,
    pub(crate) marks_obtained: f64,
    pub(crate) percentage: f64,
    pub(crate) grade: &'a str,
    pub(crate) passed: bool,
    pub(crate) attempted_count: i32,
    pub(crate) correct_count: i32,
    pub(crate) incorrect_count: i32,
    pub(crate) skipped_count: i32,
    pub(crate) time_spent_seconds: i64,
    pub(crate) status: AttemptStatus,
}

/// Compare-and-swap submit: only an in-progress row can be finalized, so of
/// two racing submits exactly one scoring computation is persisted.
pub(crate) async fn finalize(
    pool: &PgPool,
    id: &str,
    params: FinalizeResult<'_>,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE results
         SET answers = $1,
             ended_at = $2,
             total_marks = $3,
             marks_obtained = $4,
             percentage = $5,
             grade = $6,
             passed = $7,
             attempted_count = $8,
             correct_count = $9,
             incorrect_count = $10,
             skipped_count = $11,
             time_spent_seconds = $12,
             status = $13,
             updated_at = $14
         WHERE id = $15 AND status = $16",
    )
    .bind(Json(params.answers))
    .bind(params.ended_at)
    .bind(params.total_marks)
    .bind(params.marks_obtained)
    .bind(params.percentage)
    .bind(params.grade)
    .bind(params.passed)
    .bind(params.attempted_count)
    .bind(params.correct_count)
    .bind(params.incorrect_count)
    .bind(params.skipped_count)
    .bind(params.time_spent_seconds)
    .bind(params.status)
    .bind(now)
    .bind(id)
    .bind(AttemptStatus::InProgress)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

pub(crate) struct ApplyGrade<'a> {
    pub(crate) marks_obtained: f64,
    pub(crate) percentage: f64,
    pub(crate) grade: &'a str,
    pub(crate) passed: bool,
    pub(crate) reviewed_by: &'a str,
    pub(crate) reviewed_at: PrimitiveDateTime,
    pub(crate) feedback: Option<&'a str>,
}

/// Manual grade override; last write wins. Guarded to post-submission rows so
/// an in-progress attempt can never be graded.
pub(crate) async fn apply_grade(
    pool: &PgPool,
    id: &str,
    params: ApplyGrade<'_>,
) -> Result<Option<ExamResult>, sqlx::Error> {
    sqlx::query_as::<_, ExamResult>(&format!(
        "UPDATE results
         SET marks_obtained = $1,
             percentage = $2,
             grade = $3,
             passed = $4,
             reviewed_by = $5,
             reviewed_at = $6,
             feedback = COALESCE($7, feedback),
             status = $8,
             updated_at = $6
         WHERE id = $9 AND status IN ($10, $11, $8)
         RETURNING {COLUMNS}",
    ))
    .bind(params.marks_obtained)
    .bind(params.percentage)
    .bind(params.grade)
    .bind(params.passed)
    .bind(params.reviewed_by)
    .bind(params.reviewed_at)
    .bind(params.feedback)
    .bind(AttemptStatus::Graded)
    .bind(id)
    .bind(AttemptStatus::Completed)
    .bind(AttemptStatus::AutoSubmitted)
    .fetch_optional(pool)
    .await
}

pub(crate) async fn exam_has_results(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM results WHERE exam_id = $1)")
        .bind(exam_id)
        .fetch_one(executor)
        .await
}

pub(crate) async fn list_by_exam(
    pool: &PgPool,
    exam_id: &str,
    status: Option<AttemptStatus>,
    skip: i64,
    limit: i64,
) -> Result<Vec<ExamResult>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM results WHERE exam_id = "));
    builder.push_bind(exam_id);

    if let Some(status) = status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }

    builder.push(" ORDER BY created_at DESC OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<ExamResult>().fetch_all(pool).await
}

pub(crate) async fn count_by_exam(
    pool: &PgPool,
    exam_id: &str,
    status: Option<AttemptStatus>,
) -> Result<i64, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM results WHERE exam_id = ");
    builder.push_bind(exam_id);

    if let Some(status) = status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }

    builder.build_query_scalar::<i64>().fetch_one(pool).await
}

pub(crate) async fn list_by_student(
    pool: &PgPool,
    student_id: &str,
    skip: i64,
    limit: i64,
) -> Result<Vec<ExamResult>, sqlx::Error> {
    sqlx::query_as::<_, ExamResult>(&format!(
        "SELECT {COLUMNS} FROM results WHERE student_id = $1
         ORDER BY created_at DESC OFFSET $2 LIMIT $3"
    ))
    .bind(student_id)
    .bind(skip.max(0))
    .bind(limit.clamp(1, 1000))
    .fetch_all(pool)
    .await
}

pub(crate) async fn count_by_student(
    pool: &PgPool,
    student_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM results WHERE student_id = $1")
        .bind(student_id)
        .fetch_one(pool)
        .await
}
