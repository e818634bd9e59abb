use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::{Question, QuestionOption};
use crate::db::types::{DifficultyLevel, QuestionStatus, QuestionType};

const COLUMNS: &str = "\
    id, subject_id, question_text, question_type, options, reference_answer, \
    marks, negative_marks, difficulty, topic, status, version, created_by, \
    created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Question>, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!("SELECT {COLUMNS} FROM questions WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) struct CreateQuestion<'a> {
    pub(crate) id: &'a str,
    pub(crate) subject_id: &'a str,
    pub(crate) question_text: &'a str,
    pub(crate) question_type: QuestionType,
    pub(crate) options: Vec<QuestionOption>,
    pub(crate) reference_answer: Option<&'a str>,
    pub(crate) marks: f64,
    pub(crate) negative_marks: f64,
    pub(crate) difficulty: DifficultyLevel,
    pub(crate) topic: Option<&'a str>,
    pub(crate) created_by: &'a str,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateQuestion<'_>,
) -> Result<Question, sqlx::Error> {
    sqlx::query_as::<_, Question>(&format!(
        "INSERT INTO questions (
            id, subject_id, question_text, question_type, options, reference_answer,
            marks, negative_marks, difficulty, topic, status, version, created_by,
            created_at, updated_at
        ) VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,1,$12,$13,$14)
        RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.subject_id)
    .bind(params.question_text)
    .bind(params.question_type)
    .bind(Json(params.options))
    .bind(params.reference_answer)
    .bind(params.marks)
    .bind(params.negative_marks)
    .bind(params.difficulty)
    .bind(params.topic)
    .bind(QuestionStatus::Active)
    .bind(params.created_by)
    .bind(params.created_at)
    .bind(params.updated_at)
    .fetch_one(pool)
    .await
}

pub(crate) struct UpdateQuestion<'a> {
    pub(crate) question_text: Option<&'a str>,
    pub(crate) options: Option<Vec<QuestionOption>>,
    pub(crate) reference_answer: Option<Option<&'a str>>,
    pub(crate) marks: Option<f64>,
    pub(crate) negative_marks: Option<f64>,
    pub(crate) difficulty: Option<DifficultyLevel>,
    pub(crate) topic: Option<Option<&'a str>>,
    pub(crate) bump_version: bool,
}

pub(crate) async fn update(
    pool: &PgPool,
    id: &str,
    params: UpdateQuestion<'_>,
    now: PrimitiveDateTime,
) -> Result<Option<Question>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("UPDATE questions SET updated_at = ");
    builder.push_bind(now);

    if let Some(question_text) = params.question_text {
        builder.push(", question_text = ");
        builder.push_bind(question_text.to_string());
    }
    if let Some(options) = params.options {
        builder.push(", options = ");
        builder.push_bind(Json(options));
    }
    if let Some(reference_answer) = params.reference_answer {
        builder.push(", reference_answer = ");
        builder.push_bind(reference_answer.map(|value| value.to_string()));
    }
    if let Some(marks) = params.marks {
        builder.push(", marks = ");
        builder.push_bind(marks);
    }
    if let Some(negative_marks) = params.negative_marks {
        builder.push(", negative_marks = ");
        builder.push_bind(negative_marks);
    }
    if let Some(difficulty) = params.difficulty {
        builder.push(", difficulty = ");
        builder.push_bind(difficulty);
    }
    if let Some(topic) = params.topic {
        builder.push(", topic = ");
        builder.push_bind(topic.map(|value| value.to_string()));
    }
    if params.bump_version {
        builder.push(", version = version + 1");
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(format!(" RETURNING {COLUMNS}"));

    builder.build_query_as::<Question>().fetch_optional(pool).await
}

pub(crate) async fn set_status(
    pool: &PgPool,
    id: &str,
    status: QuestionStatus,
    now: PrimitiveDateTime,
) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("UPDATE questions SET status = $1, updated_at = $2 WHERE id = $3")
        .bind(status)
        .bind(now)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub(crate) async fn delete_by_id(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM questions WHERE id = $1").bind(id).execute(pool).await?;
    Ok(())
}

/// A question is referenced when any exam lists it or any result holds an
/// answer slot for it. Referenced questions may only be archived.
pub(crate) async fn is_referenced(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    let in_exam: bool =
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM exam_questions WHERE question_id = $1)")
            .bind(id)
            .fetch_one(pool)
            .await?;
    if in_exam {
        return Ok(true);
    }

    sqlx::query_scalar(
        "SELECT EXISTS(
            SELECT 1 FROM results
            WHERE answers @> jsonb_build_array(jsonb_build_object('question_id', $1::text))
        )",
    )
    .bind(id)
    .fetch_one(pool)
    .await
}

/// True when the question is already part of an exam that left draft, which
/// is what forces a version bump on answer-defining edits.
pub(crate) async fn is_published(pool: &PgPool, id: &str) -> Result<bool, sqlx::Error> {
    sqlx::query_scalar(
        "SELECT EXISTS(
            SELECT 1 FROM exam_questions eq
            JOIN exams e ON e.id = eq.exam_id
            WHERE eq.question_id = $1 AND e.status <> 'draft'
        )",
    )
    .bind(id)
    .fetch_one(pool)
    .await
}

pub(crate) struct QuestionFilter<'a> {
    pub(crate) subject_id: Option<&'a str>,
    pub(crate) question_type: Option<QuestionType>,
    pub(crate) difficulty: Option<DifficultyLevel>,
    pub(crate) status: Option<QuestionStatus>,
}

pub(crate) async fn list(
    pool: &PgPool,
    filter: &QuestionFilter<'_>,
    skip: i64,
    limit: i64,
) -> Result<Vec<Question>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM questions WHERE TRUE"));
    push_filter(&mut builder, filter);

    builder.push(" ORDER BY created_at DESC OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<Question>().fetch_all(pool).await
}

pub(crate) async fn count(
    pool: &PgPool,
    filter: &QuestionFilter<'_>,
) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM questions WHERE TRUE");
    push_filter(&mut builder, filter);

    builder.build_query_scalar::<i64>().fetch_one(pool).await
}

fn push_filter<'a>(builder: &mut QueryBuilder<'a, Postgres>, filter: &QuestionFilter<'a>) {
    if let Some(subject_id) = filter.subject_id {
        builder.push(" AND subject_id = ");
        builder.push_bind(subject_id);
    }
    if let Some(question_type) = filter.question_type {
        builder.push(" AND question_type = ");
        builder.push_bind(question_type);
    }
    if let Some(difficulty) = filter.difficulty {
        builder.push(" AND difficulty = ");
        builder.push_bind(difficulty);
    }
    if let Some(status) = filter.status {
        builder.push(" AND status = ");
        builder.push_bind(status);
    }
}
