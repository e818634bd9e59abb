use axum::{
    extract::{Path, State},
    routing::post,
    Json, Router,
};
use validator::Validate;

use crate::api::errors::ApiError;
use crate::api::exams::fetch_exam;
use crate::api::guards::{ensure_can_manage, require_staff, CurrentUser};
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{ExamResult, User};
use crate::db::types::AttemptStatus;
use crate::repositories;
use crate::schemas::result::{BulkGradeOutcome, BulkGradeRequest, GradeRequest, ResultResponse};
use crate::schemas::ApiSuccess;
use crate::services::scoring;

pub(crate) fn router() -> Router<AppState> {
    Router::new().route("/bulk", post(bulk_grade)).route("/:result_id", post(grade_result))
}

async fn grade_result(
    Path(result_id): Path<String>,
    CurrentUser(grader): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<GradeRequest>,
) -> Result<Json<ApiSuccess<ResultResponse>>, ApiError> {
    require_staff(&grader)?;
    payload.validate().map_err(ApiError::validation)?;

    let graded =
        grade_one(&state, &grader, &result_id, payload.score, payload.feedback.as_deref())
            .await?;

    Ok(Json(ApiSuccess::new(ResultResponse::from_db(graded, true))))
}

async fn bulk_grade(
    CurrentUser(grader): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<BulkGradeRequest>,
) -> Result<Json<ApiSuccess<Vec<BulkGradeOutcome>>>, ApiError> {
    require_staff(&grader)?;
    payload.validate().map_err(ApiError::validation)?;

    let mut outcomes = Vec::with_capacity(payload.items.len());

    // One bad entry never fails the batch; every item reports its own outcome.
    for item in payload.items {
        let outcome =
            match grade_one(&state, &grader, &item.result_id, item.score, item.feedback.as_deref())
                .await
            {
                Ok(_) => BulkGradeOutcome {
                    result_id: item.result_id,
                    success: true,
                    error: None,
                },
                Err(error) => BulkGradeOutcome {
                    result_id: item.result_id,
                    success: false,
                    error: Some(grading_error_message(error)),
                },
            };
        outcomes.push(outcome);
    }

    Ok(Json(ApiSuccess::new(outcomes)))
}

/// The single-item grading contract, shared by the single and bulk routes.
async fn grade_one(
    state: &AppState,
    grader: &User,
    result_id: &str,
    score: f64,
    feedback: Option<&str>,
) -> Result<ExamResult, ApiError> {
    let result = repositories::results::find_by_id(state.db(), result_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch result"))?
        .ok_or_else(|| ApiError::NotFound("Result not found".to_string()))?;

    let exam = fetch_exam(state, &result.exam_id).await?;
    ensure_can_manage(state, grader, &exam).await?;

    if !result.status.can_transition_to(AttemptStatus::Graded) {
        return Err(ApiError::Conflict(
            "Cannot grade an attempt that is still in progress".to_string(),
        ));
    }

    if score < 0.0 || score > result.total_marks {
        return Err(ApiError::Validation {
            message: "Validation failed".to_string(),
            errors: vec![format!("score: must be between 0 and {}", result.total_marks)],
        });
    }

    // Same arithmetic as the scorer; the derived fields can never diverge.
    let (percentage, grade, passed) =
        scoring::recompute(result.total_marks, score, exam.passing_marks);

    let graded = repositories::results::apply_grade(
        state.db(),
        &result.id,
        repositories::results::ApplyGrade {
            marks_obtained: score,
            percentage,
            grade,
            passed,
            reviewed_by: &grader.id,
            reviewed_at: primitive_now_utc(),
            feedback,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to apply grade"))?
    .ok_or_else(|| ApiError::Conflict("Result is no longer gradable".to_string()))?;

    tracing::info!(
        result_id = %graded.id,
        grader_id = %grader.id,
        score = score,
        "Manual grade applied"
    );

    Ok(graded)
}

fn grading_error_message(error: ApiError) -> String {
    match error {
        ApiError::NotFound(message)
        | ApiError::Conflict(message)
        | ApiError::BadRequest(message) => message,
        ApiError::Validation { errors, message } => {
            errors.into_iter().next().unwrap_or(message)
        }
        ApiError::Forbidden(message) => message.to_string(),
        ApiError::Unauthorized(message) => message.to_string(),
        ApiError::Internal(_) => "Internal error".to_string(),
    }
}
