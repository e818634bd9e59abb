use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::{require_staff, CurrentAdmin, CurrentUser};
use crate::api::pagination::ListQuery;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::types::UserRole;
use crate::repositories;
use crate::schemas::subject::{SubjectCreate, SubjectResponse, SubjectUpdate};
use crate::schemas::{ApiSuccess, Pagination};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_subjects).post(create_subject))
        .route("/:subject_id", get(get_subject).patch(update_subject).delete(delete_subject))
}

async fn list_subjects(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiSuccess<Vec<SubjectResponse>>>, ApiError> {
    // Archived subjects stay visible to admins only.
    let include_archived = user.role == UserRole::Admin;

    let subjects =
        repositories::subjects::list(state.db(), include_archived, query.skip, query.limit)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list subjects"))?;
    let total_count = repositories::subjects::count(state.db(), include_archived)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count subjects"))?;

    let items = subjects.into_iter().map(SubjectResponse::from_db).collect();

    Ok(Json(ApiSuccess::paginated(
        items,
        Pagination { total_count, skip: query.skip, limit: query.limit },
    )))
}

async fn create_subject(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<SubjectCreate>,
) -> Result<(StatusCode, Json<ApiSuccess<SubjectResponse>>), ApiError> {
    require_staff(&user)?;
    payload.validate().map_err(ApiError::validation)?;

    let existing = repositories::subjects::exists_by_code(state.db(), &payload.code)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check subject code"))?;

    if existing.is_some() {
        return Err(ApiError::Conflict("Subject code is already taken".to_string()));
    }

    let now = primitive_now_utc();
    let subject = repositories::subjects::create(
        state.db(),
        repositories::subjects::CreateSubject {
            id: &Uuid::new_v4().to_string(),
            name: &payload.name,
            code: &payload.code,
            description: payload.description.as_deref(),
            created_by: &user.id,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create subject"))?;

    Ok((StatusCode::CREATED, Json(ApiSuccess::new(SubjectResponse::from_db(subject)))))
}

async fn get_subject(
    Path(subject_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ApiSuccess<SubjectResponse>>, ApiError> {
    let subject = repositories::subjects::find_by_id(state.db(), &subject_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch subject"))?
        .ok_or_else(|| ApiError::NotFound("Subject not found".to_string()))?;

    if subject.is_archived && user.role != UserRole::Admin {
        return Err(ApiError::NotFound("Subject not found".to_string()));
    }

    Ok(Json(ApiSuccess::new(SubjectResponse::from_db(subject))))
}

async fn update_subject(
    Path(subject_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<SubjectUpdate>,
) -> Result<Json<ApiSuccess<SubjectResponse>>, ApiError> {
    require_staff(&user)?;
    payload.validate().map_err(ApiError::validation)?;

    let updated = repositories::subjects::update(
        state.db(),
        &subject_id,
        repositories::subjects::UpdateSubject {
            name: payload.name,
            description: payload.description,
            is_archived: payload.is_archived,
        },
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update subject"))?
    .ok_or_else(|| ApiError::NotFound("Subject not found".to_string()))?;

    Ok(Json(ApiSuccess::new(SubjectResponse::from_db(updated))))
}

async fn delete_subject(
    Path(subject_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<ApiSuccess<serde_json::Value>>, ApiError> {
    let subject = repositories::subjects::find_by_id(state.db(), &subject_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch subject"))?
        .ok_or_else(|| ApiError::NotFound("Subject not found".to_string()))?;

    let question_count = repositories::subjects::count_questions(state.db(), &subject.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count subject questions"))?;
    let exam_count = repositories::subjects::count_exams(state.db(), &subject.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count subject exams"))?;

    if question_count > 0 || exam_count > 0 {
        return Err(ApiError::Conflict(
            "Subject is referenced by questions or exams; archive it instead".to_string(),
        ));
    }

    repositories::subjects::delete_by_id(state.db(), &subject.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete subject"))?;

    Ok(Json(ApiSuccess::new(serde_json::json!({"message": "Subject deleted"}))))
}
