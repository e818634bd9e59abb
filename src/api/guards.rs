use async_trait::async_trait;
use axum::extract::{FromRequestParts, State};
use axum::http::{header, request::Parts};

use crate::api::errors::ApiError;
use crate::core::{security, state::AppState};
use crate::db::models::{Exam, User};
use crate::db::types::UserRole;
use crate::repositories;
use crate::services::eligibility;

pub(crate) struct CurrentUser(pub(crate) User);
pub(crate) struct CurrentAdmin(pub(crate) User);

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let State(app_state) = State::<AppState>::from_request_parts(parts, state)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to access application state"))?;

        let auth_header = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or(ApiError::Unauthorized("Invalid authentication credentials"))?;

        let claims = security::verify_token(token, app_state.settings())
            .map_err(|_| ApiError::Unauthorized("Invalid authentication credentials"))?;

        let user = repositories::users::find_by_id(app_state.db(), &claims.sub)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to load user"))?;

        let Some(user) = user else {
            return Err(ApiError::Unauthorized("User not found"));
        };

        if !user.is_active {
            return Err(ApiError::Unauthorized("Invalid authentication credentials"));
        }

        Ok(CurrentUser(user))
    }
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentAdmin {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let CurrentUser(user) = CurrentUser::from_request_parts(parts, state).await?;

        if user.role == UserRole::Admin {
            Ok(CurrentAdmin(user))
        } else {
            Err(ApiError::Forbidden("Admin access required"))
        }
    }
}

/// Instructor-or-admin gate for authoring endpoints.
pub(crate) fn require_staff(user: &User) -> Result<(), ApiError> {
    if matches!(user.role, UserRole::Admin | UserRole::Instructor) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Instructor access required"))
    }
}

pub(crate) fn require_student(user: &User) -> Result<(), ApiError> {
    if user.role == UserRole::Student {
        Ok(())
    } else {
        Err(ApiError::Forbidden("Student access required"))
    }
}

/// Resolve the owner's current role and apply the ownership-or-admin rule.
/// The role lookup happens per check so ownership shields are never stale.
pub(crate) async fn ensure_can_manage(
    state: &AppState,
    actor: &User,
    exam: &Exam,
) -> Result<(), ApiError> {
    let owner_role = owner_role(state, &exam.created_by).await?;

    if eligibility::can_manage(actor, &exam.created_by, owner_role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("You do not have access to this exam"))
    }
}

pub(crate) async fn owner_role(state: &AppState, owner_id: &str) -> Result<UserRole, ApiError> {
    let role = repositories::users::find_role_by_id(state.db(), owner_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to resolve exam owner"))?;

    // A missing owner row never widens access.
    Ok(role.unwrap_or(UserRole::Student))
}

/// Same rule applied to question-bank ownership.
pub(crate) async fn ensure_can_manage_question(
    state: &AppState,
    actor: &User,
    created_by: &str,
) -> Result<(), ApiError> {
    let owner_role = owner_role(state, created_by).await?;

    if eligibility::can_manage(actor, created_by, owner_role) {
        Ok(())
    } else {
        Err(ApiError::Forbidden("You do not have access to this question"))
    }
}
