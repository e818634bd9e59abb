use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::{Exam, QuestionOption};
use crate::db::types::{DifficultyLevel, ExamStatus, ExamType, QuestionType};

pub(crate) const COLUMNS: &str = "\
    id, title, description, subject_id, exam_type, duration_minutes, total_marks, \
    total_marks_overridden, passing_marks, start_time, end_time, timezone, \
    grace_before_minutes, grace_after_minutes, randomize_questions, allow_review, \
    auto_submit, max_attempts, eligible_students, status, created_by, updated_by, \
    created_at, updated_at";

/// One exam question joined with its bank definition, in exam order. Feeds
/// both the sanitized student payload and the scorer.
#[derive(Debug, sqlx::FromRow)]
pub(crate) struct ExamQuestionRow {
    pub(crate) question_id: String,
    pub(crate) marks: f64,
    pub(crate) order_index: i32,
    pub(crate) question_text: String,
    pub(crate) question_type: QuestionType,
    pub(crate) options: Json<Vec<QuestionOption>>,
    pub(crate) reference_answer: Option<String>,
    pub(crate) negative_marks: f64,
    pub(crate) difficulty: DifficultyLevel,
}

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Exam>, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn fetch_one_by_id(pool: &PgPool, id: &str) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!("SELECT {COLUMNS} FROM exams WHERE id = $1"))
        .bind(id)
        .fetch_one(pool)
        .await
}

pub(crate) struct CreateExam<'a> {
    pub(crate) id: &'a str,
    pub(crate) title: &'a str,
    pub(crate) description: Option<&'a str>,
    pub(crate) subject_id: &'a str,
    pub(crate) exam_type: ExamType,
    pub(crate) duration_minutes: i32,
    pub(crate) total_marks: f64,
    pub(crate) total_marks_overridden: bool,
    pub(crate) passing_marks: f64,
    pub(crate) start_time: PrimitiveDateTime,
    pub(crate) end_time: PrimitiveDateTime,
    pub(crate) timezone: &'a str,
    pub(crate) grace_before_minutes: i32,
    pub(crate) grace_after_minutes: i32,
    pub(crate) randomize_questions: bool,
    pub(crate) allow_review: bool,
    pub(crate) auto_submit: bool,
    pub(crate) max_attempts: i32,
    pub(crate) eligible_students: Vec<String>,
    pub(crate) created_by: &'a str,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    executor: impl sqlx::PgExecutor<'_>,
    params: CreateExam<'_>,
) -> Result<Exam, sqlx::Error> {
    sqlx::query_as::<_, Exam>(&format!(
        "INSERT INTO exams (
            id, title, description, subject_id, exam_type, duration_minutes, total_marks,
            total_marks_overridden, passing_marks, start_time, end_time, timezone,
            grace_before_minutes, grace_after_minutes, randomize_questions, allow_review,
            auto_submit, max_attempts, eligible_students, status, created_by,
            created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13,$14,$15,$16,$17,$18,$19,$20,$21,$22,$23)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.title)
    .bind(params.description)
    .bind(params.subject_id)
    .bind(params.exam_type)
    .bind(params.duration_minutes)
    .bind(params.total_marks)
    .bind(params.total_marks_overridden)
    .bind(params.passing_marks)
    .bind(params.start_time)
    .bind(params.end_time)
    .bind(params.timezone)
    .bind(params.grace_before_minutes)
    .bind(params.grace_after_minutes)
    .bind(params.randomize_questions)
    .bind(params.allow_review)
    .bind(params.auto_submit)
    .bind(params.max_attempts)
    .bind(Json(params.eligible_students))
    .bind(ExamStatus::Draft)
    .bind(params.created_by)
    .bind(params.created_at)
    .bind(params.updated_at)
    .fetch_one(executor)
    .await
}

/// Structural fields; only writable while the exam is structurally mutable.
pub(crate) struct UpdateExamStructure<'a> {
    pub(crate) title: Option<&'a str>,
    pub(crate) exam_type: Option<ExamType>,
    pub(crate) duration_minutes: Option<i32>,
    pub(crate) total_marks: Option<f64>,
    pub(crate) total_marks_overridden: Option<bool>,
    pub(crate) passing_marks: Option<f64>,
    pub(crate) start_time: Option<PrimitiveDateTime>,
    pub(crate) timezone: Option<&'a str>,
    pub(crate) grace_before_minutes: Option<i32>,
    pub(crate) grace_after_minutes: Option<i32>,
    pub(crate) max_attempts: Option<i32>,
    pub(crate) eligible_students: Option<Vec<String>>,
}

/// Fields that stay mutable after the structural freeze.
pub(crate) struct UpdateExamSettings<'a> {
    pub(crate) description: Option<&'a str>,
    pub(crate) end_time: Option<PrimitiveDateTime>,
    pub(crate) randomize_questions: Option<bool>,
    pub(crate) allow_review: Option<bool>,
    pub(crate) auto_submit: Option<bool>,
}

pub(crate) async fn update(
    pool: &PgPool,
    id: &str,
    structure: UpdateExamStructure<'_>,
    settings: UpdateExamSettings<'_>,
    updated_by: &str,
    now: PrimitiveDateTime,
) -> Result<Option<Exam>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("UPDATE exams SET updated_at = ");
    builder.push_bind(now);
    builder.push(", updated_by = ");
    builder.push_bind(updated_by);

    if let Some(title) = structure.title {
        builder.push(", title = ");
        builder.push_bind(title.to_string());
    }
    if let Some(exam_type) = structure.exam_type {
        builder.push(", exam_type = ");
        builder.push_bind(exam_type);
    }
    if let Some(duration_minutes) = structure.duration_minutes {
        builder.push(", duration_minutes = ");
        builder.push_bind(duration_minutes);
    }
    if let Some(total_marks) = structure.total_marks {
        builder.push(", total_marks = ");
        builder.push_bind(total_marks);
    }
    if let Some(overridden) = structure.total_marks_overridden {
        builder.push(", total_marks_overridden = ");
        builder.push_bind(overridden);
    }
    if let Some(passing_marks) = structure.passing_marks {
        builder.push(", passing_marks = ");
        builder.push_bind(passing_marks);
    }
    if let Some(start_time) = structure.start_time {
        builder.push(", start_time = ");
        builder.push_bind(start_time);
    }
    if let Some(timezone) = structure.timezone {
        builder.push(", timezone = ");
        builder.push_bind(timezone.to_string());
    }
    if let Some(grace_before) = structure.grace_before_minutes {
        builder.push(", grace_before_minutes = ");
        builder.push_bind(grace_before);
    }
    if let Some(grace_after) = structure.grace_after_minutes {
        builder.push(", grace_after_minutes = ");
        builder.push_bind(grace_after);
    }
    if let Some(max_attempts) = structure.max_attempts {
        builder.push(", max_attempts = ");
        builder.push_bind(max_attempts);
    }
    if let Some(eligible_students) = structure.eligible_students {
        builder.push(", eligible_students = ");
        builder.push_bind(Json(eligible_students));
    }

    if let Some(description) = settings.description {
        builder.push(", description = ");
        builder.push_bind(description.to_string());
    }
    if let Some(end_time) = settings.end_time {
        builder.push(", end_time = ");
        builder.push_bind(end_time);
    }
    if let Some(randomize_questions) = settings.randomize_questions {
        builder.push(", randomize_questions = ");
        builder.push_bind(randomize_questions);
    }
    if let Some(allow_review) = settings.allow_review {
        builder.push(", allow_review = ");
        builder.push_bind(allow_review);
    }
    if let Some(auto_submit) = settings.auto_submit {
        builder.push(", auto_submit = ");
        builder.push_bind(auto_submit);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(format!(" RETURNING {COLUMNS}"));

    builder.build_query_as::<Exam>().fetch_optional(pool).await
}

/// Status-guarded transition; false means the exam was no longer in the
/// expected state and the caller lost the race.
pub(crate) async fn set_status(
    pool: &PgPool,
    id: &str,
    from: ExamStatus,
    to: ExamStatus,
    updated_by: &str,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exams SET status = $1, updated_by = $2, updated_at = $3
         WHERE id = $4 AND status = $5",
    )
    .bind(to)
    .bind(updated_by)
    .bind(now)
    .bind(id)
    .bind(from)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn set_total_marks(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    total_marks: f64,
    now: PrimitiveDateTime,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE exams SET total_marks = $1, updated_at = $2 WHERE id = $3")
        .bind(total_marks)
        .bind(now)
        .bind(id)
        .execute(executor)
        .await?;
    Ok(())
}

pub(crate) async fn delete_by_id(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM exams WHERE id = $1").bind(id).execute(pool).await?;
    Ok(())
}

pub(crate) async fn attach_question(
    executor: impl sqlx::PgExecutor<'_>,
    id: &str,
    exam_id: &str,
    question_id: &str,
    marks: f64,
    order_index: i32,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "INSERT INTO exam_questions (id, exam_id, question_id, marks, order_index)
         VALUES ($1,$2,$3,$4,$5)
         ON CONFLICT DO NOTHING",
    )
    .bind(id)
    .bind(exam_id)
    .bind(question_id)
    .bind(marks)
    .bind(order_index)
    .execute(executor)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn update_question_link(
    pool: &PgPool,
    exam_id: &str,
    question_id: &str,
    marks: Option<f64>,
    order_index: Option<i32>,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE exam_questions
         SET marks = COALESCE($1, marks),
             order_index = COALESCE($2, order_index)
         WHERE exam_id = $3 AND question_id = $4",
    )
    .bind(marks)
    .bind(order_index)
    .bind(exam_id)
    .bind(question_id)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn detach_question(
    pool: &PgPool,
    exam_id: &str,
    question_id: &str,
) -> Result<bool, sqlx::Error> {
    let result =
        sqlx::query("DELETE FROM exam_questions WHERE exam_id = $1 AND question_id = $2")
            .bind(exam_id)
            .bind(question_id)
            .execute(pool)
            .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn list_questions(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<Vec<ExamQuestionRow>, sqlx::Error> {
    sqlx::query_as::<_, ExamQuestionRow>(
        "SELECT eq.question_id,
                eq.marks,
                eq.order_index,
                q.question_text,
                q.question_type,
                q.options,
                q.reference_answer,
                q.negative_marks,
                q.difficulty
         FROM exam_questions eq
         JOIN questions q ON q.id = eq.question_id
         WHERE eq.exam_id = $1
         ORDER BY eq.order_index",
    )
    .bind(exam_id)
    .fetch_all(executor)
    .await
}

pub(crate) async fn count_questions(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM exam_questions WHERE exam_id = $1")
        .bind(exam_id)
        .fetch_one(executor)
        .await
}

pub(crate) async fn sum_question_marks(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<f64, sqlx::Error> {
    sqlx::query_scalar("SELECT COALESCE(SUM(marks), 0) FROM exam_questions WHERE exam_id = $1")
        .bind(exam_id)
        .fetch_one(executor)
        .await
}

pub(crate) async fn next_order_index(
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
) -> Result<i32, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT COALESCE(MAX(order_index), 0) + 1 FROM exam_questions WHERE exam_id = $1",
    )
    .bind(exam_id)
    .fetch_one(executor)
    .await
}

/// Listing scope for the caller's role. The instructor rule is the one place
/// the asymmetric visibility policy is written: own exams plus exams owned
/// by an admin, never a peer instructor's.
pub(crate) enum ExamScope<'a> {
    All,
    Instructor(&'a str),
    Student,
}

pub(crate) struct ExamFilter<'a> {
    pub(crate) scope: ExamScope<'a>,
    pub(crate) status: Option<ExamStatus>,
    pub(crate) subject_id: Option<&'a str>,
}

pub(crate) async fn list(
    pool: &PgPool,
    filter: &ExamFilter<'_>,
    skip: i64,
    limit: i64,
) -> Result<Vec<Exam>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM exams WHERE TRUE"));
    push_filter(&mut builder, filter);

    builder.push(" ORDER BY start_time DESC OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<Exam>().fetch_all(pool).await
}

pub(crate) async fn count(pool: &PgPool, filter: &ExamFilter<'_>) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM exams WHERE TRUE");
    push_filter(&mut builder, filter);

    builder.build_query_scalar::<i64>().fetch_one(pool).await
}

fn push_filter<'a>(builder: &mut QueryBuilder<'a, Postgres>, filter: &ExamFilter<'a>) {
    match filter.scope {
        ExamScope::All => {}
        ExamScope::Instructor(user_id) => {
            builder.push(" AND (created_by = ");
            builder.push_bind(user_id);
            builder.push(" OR created_by IN (SELECT id FROM users WHERE role = 'admin'))");
        }
        ExamScope::Student => {
            builder.push(" AND status = ");
            builder.push_bind(ExamStatus::Active);
        }
    }

    if let Some(status) = filter.status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }
    if let Some(subject_id) = filter.subject_id {
        builder.push(" AND subject_id = ");
        builder.push_bind(subject_id);
    }
}
