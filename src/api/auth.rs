use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

use crate::api::errors::ApiError;
use crate::api::guards::CurrentUser;
use crate::core::{security, state::AppState};
use crate::schemas::auth::{LoginRequest, TokenResponse};
use crate::schemas::user::UserResponse;
use crate::schemas::ApiSuccess;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/login", post(login)).route("/me", get(me))
}

async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiSuccess<TokenResponse>>, ApiError> {
    let user = crate::repositories::users::find_by_username(state.db(), &payload.username)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to load user"))?;

    let Some(user) = user else {
        return Err(ApiError::Unauthorized("Incorrect username or password"));
    };

    let verified = security::verify_password(&payload.password, &user.hashed_password)
        .map_err(|e| ApiError::internal(e, "Failed to verify password"))?;

    if !verified {
        return Err(ApiError::Unauthorized("Incorrect username or password"));
    }

    if !user.is_active {
        return Err(ApiError::Unauthorized("Account is deactivated"));
    }

    let token = security::create_access_token(&user.id, state.settings(), None)
        .map_err(|e| ApiError::internal(e, "Failed to create access token"))?;

    tracing::info!(user_id = %user.id, "User logged in");

    Ok(Json(ApiSuccess::new(TokenResponse {
        access_token: token,
        token_type: "bearer".to_string(),
        user: UserResponse::from_db(user),
    })))
}

async fn me(CurrentUser(user): CurrentUser) -> Json<ApiSuccess<UserResponse>> {
    Json(ApiSuccess::new(UserResponse::from_db(user)))
}
