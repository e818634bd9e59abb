use axum::{
    extract::{Path, Query, State},
    http::{header, HeaderMap, StatusCode},
    routing::get,
    Json, Router,
};
use rand::seq::SliceRandom;
use serde::Deserialize;
use time::{Duration, PrimitiveDateTime};
use uuid::Uuid;

use crate::api::errors::ApiError;
use crate::api::exams::fetch_exam;
use crate::api::guards::{ensure_can_manage, require_student, CurrentUser};
use crate::api::pagination::default_limit;
use crate::core::state::AppState;
use crate::core::time::primitive_now_utc;
use crate::db::models::{AnswerRecord, Exam, ExamResult};
use crate::db::types::{AttemptStatus, UserRole};
use crate::repositories;
use crate::repositories::exams::ExamQuestionRow;
use crate::schemas::exam::SanitizedQuestion;
use crate::schemas::result::{AnswerPatch, ResultResponse};
use crate::schemas::{ApiSuccess, Pagination};
use crate::services::eligibility;
use crate::services::scoring::{self, ScorableQuestion};

pub(crate) fn results_router() -> Router<AppState> {
    Router::new().route("/mine", get(my_results)).route("/:result_id", get(get_result))
}

/// The attempt deadline: the student's personal duration window, clipped to
/// the exam's closing time plus the after-grace buffer. Submits past it are
/// recorded as auto-submitted.
fn attempt_deadline(exam: &Exam, started_at: PrimitiveDateTime) -> PrimitiveDateTime {
    let duration_deadline = started_at + Duration::minutes(exam.duration_minutes as i64);
    let window_deadline = exam.end_time + Duration::minutes(exam.grace_after_minutes as i64);

    duration_deadline.min(window_deadline)
}

fn client_meta(headers: &HeaderMap) -> (Option<String>, Option<String>) {
    let ip_address = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty());

    let user_agent = headers
        .get(header::USER_AGENT)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_string());

    (ip_address, user_agent)
}

fn merge_patches(answers: &mut [AnswerRecord], patches: &[AnswerPatch]) {
    for patch in patches {
        // Patches addressing questions outside the exam are ignored, not
        // errors: the answer slots were pre-seeded from the exam itself.
        if let Some(slot) =
            answers.iter_mut().find(|answer| answer.question_id == patch.question_id)
        {
            patch.apply_to(slot);
        }
    }
}

fn scorables(rows: Vec<ExamQuestionRow>) -> Vec<ScorableQuestion> {
    rows.into_iter()
        .map(|row| ScorableQuestion {
            id: row.question_id,
            question_type: row.question_type,
            options: row.options.0,
            reference_answer: row.reference_answer,
            marks: row.marks,
            negative_marks: row.negative_marks,
        })
        .collect()
}

pub(in crate::api) async fn start_attempt(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<ApiSuccess<serde_json::Value>>), ApiError> {
    require_student(&user)?;

    let exam = fetch_exam(&state, &exam_id).await?;
    let now = primitive_now_utc();

    let completed_attempts =
        repositories::results::count_completed_attempts(state.db(), &exam.id, &user.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to count attempts"))?;

    if let Err(denial) = eligibility::can_start(&exam, &user.id, completed_attempts, now) {
        return Err(ApiError::Forbidden(denial.message()));
    }

    // Idempotent resume: an existing in-progress attempt is returned as-is.
    let existing = repositories::results::find_in_progress(state.db(), &exam.id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?;

    if let Some(result) = existing {
        let body = start_payload(&state, &exam, result).await?;
        return Ok((StatusCode::OK, Json(ApiSuccess::new(body))));
    }

    let rows = repositories::exams::list_questions(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam questions"))?;

    let answers: Vec<AnswerRecord> =
        rows.iter().map(|row| AnswerRecord::empty(row.question_id.clone())).collect();

    let (ip_address, user_agent) = client_meta(&headers);
    let result_id = Uuid::new_v4().to_string();

    let inserted = repositories::results::create(
        state.db(),
        repositories::results::CreateResult {
            id: &result_id,
            exam_id: &exam.id,
            student_id: &user.id,
            attempt_number: (completed_attempts + 1) as i32,
            answers,
            started_at: now,
            ip_address: ip_address.as_deref(),
            user_agent: user_agent.as_deref(),
            total_marks: exam.total_marks,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create attempt"))?;

    let result = if inserted {
        repositories::results::find_by_id(state.db(), &result_id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?
            .ok_or_else(|| ApiError::Internal("Created attempt is missing".to_string()))?
    } else {
        // Lost the create race; the winner's in-progress row is the attempt.
        repositories::results::find_in_progress(state.db(), &exam.id, &user.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?
            .ok_or_else(|| {
                ApiError::Conflict("Attempt creation raced; please retry".to_string())
            })?
    };

    tracing::info!(
        exam_id = %exam.id,
        student_id = %user.id,
        attempt = result.attempt_number,
        "Attempt started"
    );

    let status = if inserted { StatusCode::CREATED } else { StatusCode::OK };
    let body = start_payload(&state, &exam, result).await?;
    Ok((status, Json(ApiSuccess::new(body))))
}

async fn start_payload(
    state: &AppState,
    exam: &Exam,
    result: ExamResult,
) -> Result<serde_json::Value, ApiError> {
    let rows = repositories::exams::list_questions(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam questions"))?;

    let mut questions: Vec<SanitizedQuestion> =
        rows.into_iter().map(SanitizedQuestion::from_row).collect();

    if exam.randomize_questions {
        questions.shuffle(&mut rand::thread_rng());
    }

    let deadline = attempt_deadline(exam, result.started_at);

    Ok(serde_json::json!({
        "result": ResultResponse::from_db(result, true),
        "questions": questions,
        "deadline": crate::core::time::format_primitive(deadline),
    }))
}

pub(in crate::api) async fn save_progress(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(patches): Json<Vec<AnswerPatch>>,
) -> Result<Json<ApiSuccess<serde_json::Value>>, ApiError> {
    require_student(&user)?;

    let exam = fetch_exam(&state, &exam_id).await?;

    let batch_limit = state.settings().exam().progress_batch_limit as usize;
    if patches.len() > batch_limit {
        return Err(ApiError::BadRequest(format!(
            "At most {batch_limit} answers may be saved per request"
        )));
    }

    let result = repositories::results::find_in_progress(state.db(), &exam.id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?
        .ok_or_else(|| {
            ApiError::NotFound("No in-progress attempt for this exam".to_string())
        })?;

    let mut answers = result.answers.0;
    merge_patches(&mut answers, &patches);

    let now = primitive_now_utc();
    let saved = repositories::results::update_answers(state.db(), &result.id, &answers, now)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to save progress"))?;

    if !saved {
        return Err(ApiError::Conflict("Attempt has already been submitted".to_string()));
    }

    Ok(Json(ApiSuccess::new(serde_json::json!({
        "message": "Progress saved",
        "saved_at": crate::core::time::format_primitive(now),
    }))))
}

pub(in crate::api) async fn submit_attempt(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(patches): Json<Vec<AnswerPatch>>,
) -> Result<Json<ApiSuccess<ResultResponse>>, ApiError> {
    require_student(&user)?;

    let exam = fetch_exam(&state, &exam_id).await?;

    let result = repositories::results::find_in_progress(state.db(), &exam.id, &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?;

    let Some(result) = result else {
        // Duplicate submit: answer with the already-persisted summary instead
        // of re-scoring.
        let latest =
            repositories::results::find_latest_terminal(state.db(), &exam.id, &user.id)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?
                .ok_or_else(|| {
                    ApiError::NotFound("No attempt found for this exam".to_string())
                })?;
        return Ok(Json(ApiSuccess::new(ResultResponse::from_db(latest, exam.allow_review))));
    };

    let mut answers = result.answers.0.clone();
    merge_patches(&mut answers, &patches);

    let rows = repositories::exams::list_questions(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam questions"))?;
    let questions = scorables(rows);

    let (summary, stats) = scoring::score(&questions, &mut answers, exam.passing_marks);

    let now = primitive_now_utc();
    let status = if now > attempt_deadline(&exam, result.started_at) {
        AttemptStatus::AutoSubmitted
    } else {
        AttemptStatus::Completed
    };

    let finalized = repositories::results::finalize(
        state.db(),
        &result.id,
        repositories::results::FinalizeResult {
            answers: &answers,
            ended_at: now,
            total_marks: summary.total_marks,
            marks_obtained: summary.marks_obtained,
            percentage: summary.percentage,
            grade: summary.grade,
            passed: summary.passed,
            attempted_count: stats.attempted,
            correct_count: stats.correct,
            incorrect_count: stats.incorrect,
            skipped_count: stats.skipped,
            time_spent_seconds: stats.time_spent_seconds,
            status,
        },
        now,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to finalize attempt"))?;

    if !finalized {
        // A concurrent submit won the compare-and-swap; return its summary.
        let latest =
            repositories::results::find_latest_terminal(state.db(), &exam.id, &user.id)
                .await
                .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?
                .ok_or_else(|| {
                    ApiError::Conflict("Attempt is no longer in progress".to_string())
                })?;
        return Ok(Json(ApiSuccess::new(ResultResponse::from_db(latest, exam.allow_review))));
    }

    tracing::info!(
        exam_id = %exam.id,
        student_id = %user.id,
        attempt = result.attempt_number,
        status = ?status,
        marks_obtained = summary.marks_obtained,
        "Attempt submitted"
    );
    metrics::counter!("exam_attempts_submitted_total").increment(1);

    let finalized = repositories::results::find_by_id(state.db(), &result.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch attempt"))?
        .ok_or_else(|| ApiError::Internal("Finalized attempt is missing".to_string()))?;

    Ok(Json(ApiSuccess::new(ResultResponse::from_db(finalized, exam.allow_review))))
}

#[derive(Debug, Deserialize)]
pub(in crate::api) struct ResultListQuery {
    #[serde(default)]
    status: Option<AttemptStatus>,
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

pub(in crate::api) async fn list_exam_results(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<ResultListQuery>,
) -> Result<Json<ApiSuccess<Vec<ResultResponse>>>, ApiError> {
    let exam = fetch_exam(&state, &exam_id).await?;
    ensure_can_manage(&state, &user, &exam).await?;

    let results =
        repositories::results::list_by_exam(state.db(), &exam.id, query.status, query.skip, query.limit)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list results"))?;
    let total_count = repositories::results::count_by_exam(state.db(), &exam.id, query.status)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count results"))?;

    let items =
        results.into_iter().map(|result| ResultResponse::from_db(result, false)).collect();

    Ok(Json(ApiSuccess::paginated(
        items,
        Pagination { total_count, skip: query.skip, limit: query.limit },
    )))
}

async fn my_results(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<ResultListQuery>,
) -> Result<Json<ApiSuccess<Vec<ResultResponse>>>, ApiError> {
    require_student(&user)?;

    let results =
        repositories::results::list_by_student(state.db(), &user.id, query.skip, query.limit)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to list results"))?;
    let total_count = repositories::results::count_by_student(state.db(), &user.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count results"))?;

    let items =
        results.into_iter().map(|result| ResultResponse::from_db(result, false)).collect();

    Ok(Json(ApiSuccess::paginated(
        items,
        Pagination { total_count, skip: query.skip, limit: query.limit },
    )))
}

async fn get_result(
    Path(result_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ApiSuccess<ResultResponse>>, ApiError> {
    let result = repositories::results::find_by_id(state.db(), &result_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch result"))?
        .ok_or_else(|| ApiError::NotFound("Result not found".to_string()))?;

    let exam = fetch_exam(&state, &result.exam_id).await?;

    if user.role == UserRole::Student {
        if result.student_id != user.id {
            return Err(ApiError::NotFound("Result not found".to_string()));
        }
        // Students see their answer sheet only when review is allowed and
        // the attempt is finalized.
        let include_answers = exam.allow_review && result.status.is_terminal();
        return Ok(Json(ApiSuccess::new(ResultResponse::from_db(result, include_answers))));
    }

    ensure_can_manage(&state, &user, &exam).await?;

    Ok(Json(ApiSuccess::new(ResultResponse::from_db(result, true))))
}
