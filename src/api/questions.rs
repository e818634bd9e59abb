use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{ensure_can_manage_question, require_staff, CurrentUser};
use crate::api::pagination::default_limit;
use crate::api::validation::validate_question_shape;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::{DifficultyLevel, QuestionStatus, QuestionType};
use crate::repositories;
use crate::schemas::question::{QuestionCreate, QuestionResponse, QuestionUpdate};
use crate::schemas::{ApiSuccess, Pagination};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_questions).post(create_question))
        .route("/:question_id", get(get_question).patch(update_question).delete(delete_question))
        .route("/:question_id/archive", post(archive_question))
        .route("/:question_id/restore", post(restore_question))
}

#[derive(Debug, Deserialize)]
struct QuestionListQuery {
    #[serde(default)]
    subject_id: Option<String>,
    #[serde(default)]
    question_type: Option<QuestionType>,
    #[serde(default)]
    difficulty: Option<DifficultyLevel>,
    #[serde(default)]
    status: Option<QuestionStatus>,
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

async fn list_questions(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<QuestionListQuery>,
) -> Result<Json<ApiSuccess<Vec<QuestionResponse>>>, ApiError> {
    require_staff(&user)?;

    let filter = repositories::questions::QuestionFilter {
        subject_id: query.subject_id.as_deref(),
        question_type: query.question_type,
        difficulty: query.difficulty,
        status: query.status,
    };

    let questions = repositories::questions::list(state.db(), &filter, query.skip, query.limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list questions"))?;
    let total_count = repositories::questions::count(state.db(), &filter)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count questions"))?;

    let items = questions.into_iter().map(QuestionResponse::from_db).collect();

    Ok(Json(ApiSuccess::paginated(
        items,
        Pagination { total_count, skip: query.skip, limit: query.limit },
    )))
}

async fn create_question(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<QuestionCreate>,
) -> Result<(StatusCode, Json<ApiSuccess<QuestionResponse>>), ApiError> {
    require_staff(&user)?;
    payload.validate().map_err(ApiError::validation)?;
    validate_question_shape(
        payload.question_type,
        &payload.options,
        payload.reference_answer.as_deref(),
    )?;

    let subject = repositories::subjects::find_by_id(state.db(), &payload.subject_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch subject"))?;

    if subject.is_none() {
        return Err(ApiError::NotFound("Subject not found".to_string()));
    }

    let now = primitive_now_utc();
    let question = repositories::questions::create(
        state.db(),
        repositories::questions::CreateQuestion {
            id: &Uuid::new_v4().to_string(),
            subject_id: &payload.subject_id,
            question_text: &payload.question_text,
            question_type: payload.question_type,
            options: payload.options.into_iter().map(|option| option.into_db()).collect(),
            reference_answer: payload.reference_answer.as_deref(),
            marks: payload.marks,
            negative_marks: payload.negative_marks,
            difficulty: payload.difficulty,
            topic: payload.topic.as_deref(),
            created_by: &user.id,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create question"))?;

    Ok((StatusCode::CREATED, Json(ApiSuccess::new(QuestionResponse::from_db(question)))))
}

async fn get_question(
    Path(question_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ApiSuccess<QuestionResponse>>, ApiError> {
    // The bank view includes correct answers, so students never see it.
    require_staff(&user)?;

    let question = repositories::questions::find_by_id(state.db(), &question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch question"))?
        .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))?;

    Ok(Json(ApiSuccess::new(QuestionResponse::from_db(question))))
}

async fn update_question(
    Path(question_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<QuestionUpdate>,
) -> Result<Json<ApiSuccess<QuestionResponse>>, ApiError> {
    require_staff(&user)?;
    payload.validate().map_err(ApiError::validation)?;

    let question = repositories::questions::find_by_id(state.db(), &question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch question"))?
        .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))?;

    ensure_can_manage_question(&state, &user, &question.created_by).await?;

    if let Some(options) = &payload.options {
        validate_question_shape(
            question.question_type,
            options,
            payload
                .reference_answer
                .as_deref()
                .or(question.reference_answer.as_deref()),
        )?;
    } else if question.question_type == QuestionType::FillBlank {
        if let Some(reference_answer) = &payload.reference_answer {
            if reference_answer.trim().is_empty() {
                return Err(ApiError::BadRequest(
                    "Fill-blank questions need a reference answer".to_string(),
                ));
            }
        }
    }

    // Answer-defining edits to a question that already reached students bump
    // the version so old results stay interpretable.
    let changes_answer = payload.options.is_some() || payload.reference_answer.is_some();
    let bump_version = changes_answer
        && repositories::questions::is_published(state.db(), &question.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to check question references"))?;

    let updated = repositories::questions::update(
        state.db(),
        &question.id,
        repositories::questions::UpdateQuestion {
            question_text: payload.question_text.as_deref(),
            options: payload
                .options
                .map(|options| options.into_iter().map(|option| option.into_db()).collect()),
            reference_answer: payload.reference_answer.as_deref().map(Some),
            marks: payload.marks,
            negative_marks: payload.negative_marks,
            difficulty: payload.difficulty,
            topic: payload.topic.as_deref().map(Some),
            bump_version,
        },
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update question"))?
    .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))?;

    Ok(Json(ApiSuccess::new(QuestionResponse::from_db(updated))))
}

async fn archive_question(
    Path(question_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ApiSuccess<serde_json::Value>>, ApiError> {
    set_question_status(state, user, question_id, QuestionStatus::Archived, "Question archived")
        .await
}

async fn restore_question(
    Path(question_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ApiSuccess<serde_json::Value>>, ApiError> {
    set_question_status(state, user, question_id, QuestionStatus::Active, "Question restored")
        .await
}

async fn set_question_status(
    state: AppState,
    user: crate::db::models::User,
    question_id: String,
    status: QuestionStatus,
    message: &str,
) -> Result<Json<ApiSuccess<serde_json::Value>>, ApiError> {
    require_staff(&user)?;

    let question = repositories::questions::find_by_id(state.db(), &question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch question"))?
        .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))?;

    ensure_can_manage_question(&state, &user, &question.created_by).await?;

    repositories::questions::set_status(state.db(), &question.id, status, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update question status"))?;

    Ok(Json(ApiSuccess::new(serde_json::json!({"message": message}))))
}

async fn delete_question(
    Path(question_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ApiSuccess<serde_json::Value>>, ApiError> {
    require_staff(&user)?;

    let question = repositories::questions::find_by_id(state.db(), &question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch question"))?
        .ok_or_else(|| ApiError::NotFound("Question not found".to_string()))?;

    ensure_can_manage_question(&state, &user, &question.created_by).await?;

    let referenced = repositories::questions::is_referenced(state.db(), &question.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check question references"))?;

    if referenced {
        return Err(ApiError::Conflict(
            "Question is referenced by an exam or result; archive it instead".to_string(),
        ));
    }

    repositories::questions::delete_by_id(state.db(), &question.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete question"))?;

    Ok(Json(ApiSuccess::new(serde_json::json!({"message": "Question deleted"}))))
}
