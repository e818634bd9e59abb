use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::guards::CurrentAdmin;
use crate::api::pagination::default_limit;
use crate::core::{security, state::AppState};
use crate::core::time::primitive_now_utc;
use crate::db::types::UserRole;
use crate::repositories;
use crate::schemas::user::{UserCreate, UserResponse, UserUpdate};
use crate::schemas::{ApiSuccess, Pagination};

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_users).post(create_user))
        .route("/:user_id", get(get_user).patch(update_user).delete(deactivate_user))
}

#[derive(Debug, Deserialize)]
struct UserListQuery {
    #[serde(default)]
    role: Option<UserRole>,
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

async fn list_users(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<ApiSuccess<Vec<UserResponse>>>, ApiError> {
    let users = repositories::users::list(state.db(), query.role, query.skip, query.limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list users"))?;
    let total_count = repositories::users::count(state.db(), query.role)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count users"))?;

    let items = users.into_iter().map(UserResponse::from_db).collect();

    Ok(Json(ApiSuccess::paginated(
        items,
        Pagination { total_count, skip: query.skip, limit: query.limit },
    )))
}

async fn create_user(
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<UserCreate>,
) -> Result<(StatusCode, Json<ApiSuccess<UserResponse>>), ApiError> {
    payload.validate().map_err(ApiError::validation)?;

    let existing = repositories::users::exists_by_username(state.db(), &payload.username)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check existing user"))?;

    if existing.is_some() {
        return Err(ApiError::Conflict("Username is already taken".to_string()));
    }

    let hashed_password = security::hash_password(&payload.password)
        .map_err(|e| ApiError::internal(e, "Failed to hash password"))?;

    let now = primitive_now_utc();
    let user = repositories::users::create(
        state.db(),
        repositories::users::CreateUser {
            id: &Uuid::new_v4().to_string(),
            username: &payload.username,
            hashed_password,
            full_name: &payload.full_name,
            role: payload.role,
            is_active: payload.is_active,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create user"))?;

    Ok((StatusCode::CREATED, Json(ApiSuccess::new(UserResponse::from_db(user)))))
}

async fn get_user(
    Path(user_id): Path<String>,
    CurrentAdmin(_admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<ApiSuccess<UserResponse>>, ApiError> {
    let user = repositories::users::find_by_id(state.db(), &user_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch user"))?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(ApiSuccess::new(UserResponse::from_db(user))))
}

async fn update_user(
    Path(user_id): Path<String>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
    Json(payload): Json<UserUpdate>,
) -> Result<Json<ApiSuccess<UserResponse>>, ApiError> {
    payload.validate().map_err(ApiError::validation)?;

    if admin.id == user_id && payload.role.is_some_and(|role| role != UserRole::Admin) {
        return Err(ApiError::BadRequest("Admins cannot demote themselves".to_string()));
    }

    let hashed_password = match &payload.password {
        Some(password) => Some(
            security::hash_password(password)
                .map_err(|e| ApiError::internal(e, "Failed to hash password"))?,
        ),
        None => None,
    };

    let updated = repositories::users::update(
        state.db(),
        &user_id,
        repositories::users::UpdateUser {
            full_name: payload.full_name,
            hashed_password,
            role: payload.role,
            is_active: payload.is_active,
        },
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update user"))?
    .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(ApiSuccess::new(UserResponse::from_db(updated))))
}

async fn deactivate_user(
    Path(user_id): Path<String>,
    CurrentAdmin(admin): CurrentAdmin,
    State(state): State<AppState>,
) -> Result<Json<ApiSuccess<serde_json::Value>>, ApiError> {
    if admin.id == user_id {
        return Err(ApiError::BadRequest("Admins cannot deactivate themselves".to_string()));
    }

    let deactivated =
        repositories::users::deactivate(state.db(), &user_id, primitive_now_utc())
            .await
            .map_err(|e| ApiError::internal(e, "Failed to deactivate user"))?;

    if !deactivated {
        return Err(ApiError::NotFound("User not found".to_string()));
    }

    Ok(Json(ApiSuccess::new(serde_json::json!({"message": "User deactivated"}))))
}
