use sqlx::{PgPool, Postgres, QueryBuilder};
use time::PrimitiveDateTime;

use crate::db::models::Subject;

const COLUMNS: &str =
    "id, name, code, description, is_archived, created_by, created_at, updated_at";

pub(crate) async fn find_by_id(pool: &PgPool, id: &str) -> Result<Option<Subject>, sqlx::Error> {
    sqlx::query_as::<_, Subject>(&format!("SELECT {COLUMNS} FROM subjects WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub(crate) async fn exists_by_code(
    pool: &PgPool,
    code: &str,
) -> Result<Option<String>, sqlx::Error> {
    sqlx::query_scalar::<_, String>("SELECT id FROM subjects WHERE code = $1")
        .bind(code)
        .fetch_optional(pool)
        .await
}

pub(crate) struct CreateSubject<'a> {
    pub(crate) id: &'a str,
    pub(crate) name: &'a str,
    pub(crate) code: &'a str,
    pub(crate) description: Option<&'a str>,
    pub(crate) created_by: &'a str,
    pub(crate) created_at: PrimitiveDateTime,
    pub(crate) updated_at: PrimitiveDateTime,
}

pub(crate) async fn create(
    pool: &PgPool,
    params: CreateSubject<'_>,
) -> Result<Subject, sqlx::Error> {
    sqlx::query_as::<_, Subject>(&format!(
        "INSERT INTO subjects (id, name, code, description, is_archived, created_by, created_at, updated_at)
         VALUES ($1,$2,$3,$4,FALSE,$5,$6,$7)
         RETURNING {COLUMNS}",
    ))
    .bind(params.id)
    .bind(params.name)
    .bind(params.code)
    .bind(params.description)
    .bind(params.created_by)
    .bind(params.created_at)
    .bind(params.updated_at)
    .fetch_one(pool)
    .await
}

#[derive(Default)]
pub(crate) struct UpdateSubject {
    pub(crate) name: Option<String>,
    pub(crate) description: Option<String>,
    pub(crate) is_archived: Option<bool>,
}

pub(crate) async fn update(
    pool: &PgPool,
    id: &str,
    params: UpdateSubject,
    now: PrimitiveDateTime,
) -> Result<Option<Subject>, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("UPDATE subjects SET updated_at = ");
    builder.push_bind(now);

    if let Some(name) = params.name {
        builder.push(", name = ");
        builder.push_bind(name);
    }
    if let Some(description) = params.description {
        builder.push(", description = ");
        builder.push_bind(description);
    }
    if let Some(is_archived) = params.is_archived {
        builder.push(", is_archived = ");
        builder.push_bind(is_archived);
    }

    builder.push(" WHERE id = ");
    builder.push_bind(id);
    builder.push(format!(" RETURNING {COLUMNS}"));

    builder.build_query_as::<Subject>().fetch_optional(pool).await
}

pub(crate) async fn delete_by_id(pool: &PgPool, id: &str) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM subjects WHERE id = $1").bind(id).execute(pool).await?;
    Ok(())
}

pub(crate) async fn count_questions(pool: &PgPool, subject_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM questions WHERE subject_id = $1")
        .bind(subject_id)
        .fetch_one(pool)
        .await
}

pub(crate) async fn count_exams(pool: &PgPool, subject_id: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar("SELECT COUNT(*) FROM exams WHERE subject_id = $1")
        .bind(subject_id)
        .fetch_one(pool)
        .await
}

pub(crate) async fn list(
    pool: &PgPool,
    include_archived: bool,
    skip: i64,
    limit: i64,
) -> Result<Vec<Subject>, sqlx::Error> {
    let mut builder =
        QueryBuilder::<Postgres>::new(format!("SELECT {COLUMNS} FROM subjects WHERE TRUE"));

    if !include_archived {
        builder.push(" AND is_archived = FALSE");
    }

    builder.push(" ORDER BY name OFFSET ");
    builder.push_bind(skip.max(0));
    builder.push(" LIMIT ");
    builder.push_bind(limit.clamp(1, 1000));

    builder.build_query_as::<Subject>().fetch_all(pool).await
}

pub(crate) async fn count(pool: &PgPool, include_archived: bool) -> Result<i64, sqlx::Error> {
    let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM subjects WHERE TRUE");

    if !include_archived {
        builder.push(" AND is_archived = FALSE");
    }

    builder.build_query_scalar::<i64>().fetch_one(pool).await
}
