use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use rand::seq::SliceRandom;
use serde::Deserialize;
use time::PrimitiveDateTime;
use uuid::Uuid;
use validator::Validate;

use crate::api::attempts;
use crate::api::errors::ApiError;
use crate::api::guards::{ensure_can_manage, owner_role, require_staff, CurrentUser};
use crate::api::pagination::default_limit;
use crate::core::state::AppState;
use crate::core::time::{primitive_now_utc, to_primitive_utc};
use crate::db::models::Exam;
use crate::db::types::{ExamStatus, UserRole};
use crate::repositories;
use crate::schemas::exam::{
    ExamCreate, ExamQuestionAttach, ExamResponse, ExamStatusUpdate, ExamUpdate, SanitizedQuestion,
    StudentExamResponse,
};
use crate::schemas::{ApiSuccess, Pagination};
use crate::services::eligibility;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_exams).post(create_exam))
        .route("/:exam_id", get(get_exam).patch(update_exam).delete(delete_exam))
        .route("/:exam_id/status", post(change_status))
        .route("/:exam_id/questions", post(attach_question))
        .route(
            "/:exam_id/questions/:question_id",
            axum::routing::patch(update_question_link).delete(detach_question),
        )
        .route("/:exam_id/start", post(attempts::start_attempt))
        .route("/:exam_id/progress", axum::routing::put(attempts::save_progress))
        .route("/:exam_id/submit", post(attempts::submit_attempt))
        .route("/:exam_id/results", get(attempts::list_exam_results))
}

/// Structural fields freeze once the exam is active and its window has
/// opened; terminal exams take no edits at all.
fn structurally_frozen(exam: &Exam, now: PrimitiveDateTime) -> bool {
    match exam.status {
        ExamStatus::Draft => false,
        ExamStatus::Active => now >= exam.start_time,
        ExamStatus::Completed | ExamStatus::Cancelled => true,
    }
}

pub(in crate::api) async fn fetch_exam(state: &AppState, exam_id: &str) -> Result<Exam, ApiError> {
    repositories::exams::find_by_id(state.db(), exam_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?
        .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))
}

#[derive(Debug, Deserialize)]
struct ExamListQuery {
    #[serde(default)]
    status: Option<ExamStatus>,
    #[serde(default)]
    subject_id: Option<String>,
    #[serde(default)]
    skip: i64,
    #[serde(default = "default_limit")]
    limit: i64,
}

async fn list_exams(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Query(query): Query<ExamListQuery>,
) -> Result<Json<ApiSuccess<Vec<ExamResponse>>>, ApiError> {
    let scope = match user.role {
        UserRole::Admin => repositories::exams::ExamScope::All,
        UserRole::Instructor => repositories::exams::ExamScope::Instructor(&user.id),
        UserRole::Student => repositories::exams::ExamScope::Student,
    };
    let filter = repositories::exams::ExamFilter {
        scope,
        status: query.status,
        subject_id: query.subject_id.as_deref(),
    };

    let exams = repositories::exams::list(state.db(), &filter, query.skip, query.limit)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to list exams"))?;
    let total_count = repositories::exams::count(state.db(), &filter)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count exams"))?;

    let items = exams
        .into_iter()
        .filter(|exam| {
            // Roster-restricted exams are hidden from students not on them.
            user.role != UserRole::Student
                || exam.eligible_students.0.is_empty()
                || exam.eligible_students.0.iter().any(|id| id == &user.id)
        })
        .map(|exam| ExamResponse::from_db(exam, None))
        .collect();

    Ok(Json(ApiSuccess::paginated(
        items,
        Pagination { total_count, skip: query.skip, limit: query.limit },
    )))
}

async fn create_exam(
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ExamCreate>,
) -> Result<(StatusCode, Json<ApiSuccess<ExamResponse>>), ApiError> {
    require_staff(&user)?;
    payload.validate().map_err(ApiError::validation)?;

    if payload.end_time <= payload.start_time {
        return Err(ApiError::BadRequest("end_time must be after start_time".to_string()));
    }

    let max_questions = state.settings().exam().max_questions_per_exam as usize;
    if payload.questions.len() > max_questions {
        return Err(ApiError::BadRequest(format!(
            "An exam may hold at most {max_questions} questions"
        )));
    }

    let subject = repositories::subjects::find_by_id(state.db(), &payload.subject_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch subject"))?;
    if subject.is_none() {
        return Err(ApiError::NotFound("Subject not found".to_string()));
    }

    let now = primitive_now_utc();
    let exam_id = Uuid::new_v4().to_string();

    let mut tx = state
        .db()
        .begin()
        .await
        .map_err(|e| ApiError::internal(e, "Failed to start transaction"))?;

    let mut exam = repositories::exams::create(
        &mut *tx,
        repositories::exams::CreateExam {
            id: &exam_id,
            title: &payload.title,
            description: payload.description.as_deref(),
            subject_id: &payload.subject_id,
            exam_type: payload.exam_type,
            duration_minutes: payload.duration_minutes,
            total_marks: payload.total_marks.unwrap_or(0.0),
            total_marks_overridden: payload.total_marks.is_some(),
            passing_marks: payload.passing_marks,
            start_time: to_primitive_utc(payload.start_time),
            end_time: to_primitive_utc(payload.end_time),
            timezone: &payload.timezone,
            grace_before_minutes: payload.grace_before_minutes,
            grace_after_minutes: payload.grace_after_minutes,
            randomize_questions: payload.randomize_questions,
            allow_review: payload.allow_review,
            auto_submit: payload.auto_submit,
            max_attempts: payload.max_attempts,
            eligible_students: payload.eligible_students,
            created_by: &user.id,
            created_at: now,
            updated_at: now,
        },
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to create exam"))?;

    for (index, attach) in payload.questions.iter().enumerate() {
        insert_exam_question(&state, &mut *tx, &exam.id, attach, (index + 1) as i32).await?;
    }

    if !exam.total_marks_overridden {
        let sum = repositories::exams::sum_question_marks(&mut *tx, &exam.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to sum question marks"))?;
        repositories::exams::set_total_marks(&mut *tx, &exam.id, sum, now)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to update total marks"))?;
        exam.total_marks = sum;
    }

    tx.commit().await.map_err(|e| ApiError::internal(e, "Failed to commit transaction"))?;

    let questions = repositories::exams::list_questions(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam questions"))?;

    Ok((StatusCode::CREATED, Json(ApiSuccess::new(ExamResponse::from_db(exam, Some(questions))))))
}

async fn get_exam(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<axum::response::Response, ApiError> {
    use axum::response::IntoResponse;

    let exam = fetch_exam(&state, &exam_id).await?;

    if user.role == UserRole::Student {
        let creator_role = owner_role(&state, &exam.created_by).await?;
        if !eligibility::can_view(&user, &exam, creator_role) {
            return Err(ApiError::NotFound("Exam not found".to_string()));
        }

        let rows = repositories::exams::list_questions(state.db(), &exam.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to fetch exam questions"))?;

        let mut questions: Vec<SanitizedQuestion> =
            rows.into_iter().map(SanitizedQuestion::from_row).collect();

        if exam.randomize_questions {
            questions.shuffle(&mut rand::thread_rng());
        }

        let body = ApiSuccess::new(StudentExamResponse::from_db(exam, questions));
        return Ok(Json(body).into_response());
    }

    ensure_can_manage(&state, &user, &exam).await?;

    let questions = repositories::exams::list_questions(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam questions"))?;

    Ok(Json(ApiSuccess::new(ExamResponse::from_db(exam, Some(questions)))).into_response())
}

async fn update_exam(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ExamUpdate>,
) -> Result<Json<ApiSuccess<ExamResponse>>, ApiError> {
    require_staff(&user)?;
    payload.validate().map_err(ApiError::validation)?;

    let exam = fetch_exam(&state, &exam_id).await?;
    ensure_can_manage(&state, &user, &exam).await?;

    if matches!(exam.status, ExamStatus::Completed | ExamStatus::Cancelled) {
        return Err(ApiError::Conflict("Exam is no longer editable".to_string()));
    }

    let now = primitive_now_utc();
    if payload.touches_structure() && structurally_frozen(&exam, now) {
        return Err(ApiError::Conflict(
            "Exam structure is frozen once it is active and started".to_string(),
        ));
    }

    let new_start = payload.start_time.map(to_primitive_utc).unwrap_or(exam.start_time);
    let new_end = payload.end_time.map(to_primitive_utc).unwrap_or(exam.end_time);
    if new_end <= new_start {
        return Err(ApiError::BadRequest("end_time must be after start_time".to_string()));
    }

    let updated = repositories::exams::update(
        state.db(),
        &exam.id,
        repositories::exams::UpdateExamStructure {
            title: payload.title.as_deref(),
            exam_type: payload.exam_type,
            duration_minutes: payload.duration_minutes,
            total_marks: payload.total_marks,
            total_marks_overridden: payload.total_marks.map(|_| true),
            passing_marks: payload.passing_marks,
            start_time: payload.start_time.map(to_primitive_utc),
            timezone: payload.timezone.as_deref(),
            grace_before_minutes: payload.grace_before_minutes,
            grace_after_minutes: payload.grace_after_minutes,
            max_attempts: payload.max_attempts,
            eligible_students: payload.eligible_students,
        },
        repositories::exams::UpdateExamSettings {
            description: payload.description.as_deref(),
            end_time: payload.end_time.map(to_primitive_utc),
            randomize_questions: payload.randomize_questions,
            allow_review: payload.allow_review,
            auto_submit: payload.auto_submit,
        },
        &user.id,
        now,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update exam"))?
    .ok_or_else(|| ApiError::NotFound("Exam not found".to_string()))?;

    let questions = repositories::exams::list_questions(state.db(), &updated.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam questions"))?;

    Ok(Json(ApiSuccess::new(ExamResponse::from_db(updated, Some(questions)))))
}

async fn change_status(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ExamStatusUpdate>,
) -> Result<Json<ApiSuccess<ExamResponse>>, ApiError> {
    require_staff(&user)?;

    let exam = fetch_exam(&state, &exam_id).await?;
    ensure_can_manage(&state, &user, &exam).await?;

    if !exam.status.can_transition_to(payload.status) {
        return Err(ApiError::Conflict(format!(
            "Cannot transition exam from {:?} to {:?}",
            exam.status, payload.status
        )));
    }

    if payload.status == ExamStatus::Active {
        let question_count = repositories::exams::count_questions(state.db(), &exam.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to count exam questions"))?;
        if question_count == 0 {
            return Err(ApiError::BadRequest(
                "Cannot activate an exam with no questions".to_string(),
            ));
        }
        if exam.passing_marks > exam.total_marks {
            return Err(ApiError::BadRequest(
                "passing_marks cannot exceed total_marks".to_string(),
            ));
        }
    }

    let transitioned = repositories::exams::set_status(
        state.db(),
        &exam.id,
        exam.status,
        payload.status,
        &user.id,
        primitive_now_utc(),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update exam status"))?;

    if !transitioned {
        return Err(ApiError::Conflict("Exam status changed concurrently".to_string()));
    }

    tracing::info!(
        exam_id = %exam.id,
        from = ?exam.status,
        to = ?payload.status,
        user_id = %user.id,
        "Exam status changed"
    );

    let exam = repositories::exams::fetch_one_by_id(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam"))?;

    Ok(Json(ApiSuccess::new(ExamResponse::from_db(exam, None))))
}

async fn attach_question(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ExamQuestionAttach>,
) -> Result<(StatusCode, Json<ApiSuccess<ExamResponse>>), ApiError> {
    require_staff(&user)?;
    payload.validate().map_err(ApiError::validation)?;

    let exam = fetch_exam(&state, &exam_id).await?;
    ensure_can_manage(&state, &user, &exam).await?;

    let now = primitive_now_utc();
    if structurally_frozen(&exam, now) {
        return Err(ApiError::Conflict(
            "Exam structure is frozen once it is active and started".to_string(),
        ));
    }

    let question_count = repositories::exams::count_questions(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to count exam questions"))?;
    if question_count >= state.settings().exam().max_questions_per_exam as i64 {
        return Err(ApiError::BadRequest("Exam question limit reached".to_string()));
    }

    let order_index = match payload.order_index {
        Some(order_index) => order_index,
        None => repositories::exams::next_order_index(state.db(), &exam.id)
            .await
            .map_err(|e| ApiError::internal(e, "Failed to compute question order"))?,
    };

    insert_exam_question(
        &state,
        state.db(),
        &exam.id,
        &ExamQuestionAttach {
            question_id: payload.question_id,
            marks: payload.marks,
            order_index: Some(order_index),
        },
        order_index,
    )
    .await?;

    let exam = sync_total_marks(&state, exam).await?;
    let questions = repositories::exams::list_questions(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam questions"))?;

    Ok((StatusCode::CREATED, Json(ApiSuccess::new(ExamResponse::from_db(exam, Some(questions))))))
}

#[derive(Debug, Deserialize)]
struct ExamQuestionLinkUpdate {
    #[serde(default)]
    marks: Option<f64>,
    #[serde(default)]
    #[serde(alias = "orderIndex")]
    order_index: Option<i32>,
}

async fn update_question_link(
    Path((exam_id, question_id)): Path<(String, String)>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
    Json(payload): Json<ExamQuestionLinkUpdate>,
) -> Result<Json<ApiSuccess<ExamResponse>>, ApiError> {
    require_staff(&user)?;

    if payload.marks.is_some_and(|marks| marks <= 0.0) {
        return Err(ApiError::BadRequest("marks must be positive".to_string()));
    }
    if payload.order_index.is_some_and(|order_index| order_index < 0) {
        return Err(ApiError::BadRequest("order_index must be non-negative".to_string()));
    }

    let exam = fetch_exam(&state, &exam_id).await?;
    ensure_can_manage(&state, &user, &exam).await?;

    if structurally_frozen(&exam, primitive_now_utc()) {
        return Err(ApiError::Conflict(
            "Exam structure is frozen once it is active and started".to_string(),
        ));
    }

    let updated = repositories::exams::update_question_link(
        state.db(),
        &exam.id,
        &question_id,
        payload.marks,
        payload.order_index,
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to update exam question"))?;

    if !updated {
        return Err(ApiError::NotFound("Question is not part of this exam".to_string()));
    }

    let exam = sync_total_marks(&state, exam).await?;
    let questions = repositories::exams::list_questions(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch exam questions"))?;

    Ok(Json(ApiSuccess::new(ExamResponse::from_db(exam, Some(questions)))))
}

async fn detach_question(
    Path((exam_id, question_id)): Path<(String, String)>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ApiSuccess<serde_json::Value>>, ApiError> {
    require_staff(&user)?;

    let exam = fetch_exam(&state, &exam_id).await?;
    ensure_can_manage(&state, &user, &exam).await?;

    if structurally_frozen(&exam, primitive_now_utc()) {
        return Err(ApiError::Conflict(
            "Exam structure is frozen once it is active and started".to_string(),
        ));
    }

    let detached = repositories::exams::detach_question(state.db(), &exam.id, &question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to detach question"))?;

    if !detached {
        return Err(ApiError::NotFound("Question is not part of this exam".to_string()));
    }

    sync_total_marks(&state, exam).await?;

    Ok(Json(ApiSuccess::new(serde_json::json!({"message": "Question removed from exam"}))))
}

async fn delete_exam(
    Path(exam_id): Path<String>,
    CurrentUser(user): CurrentUser,
    State(state): State<AppState>,
) -> Result<Json<ApiSuccess<serde_json::Value>>, ApiError> {
    require_staff(&user)?;

    let exam = fetch_exam(&state, &exam_id).await?;
    ensure_can_manage(&state, &user, &exam).await?;

    let has_results = repositories::results::exam_has_results(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to check exam results"))?;

    if has_results {
        return Err(ApiError::Conflict(
            "Exam has recorded attempts and cannot be deleted; cancel it instead".to_string(),
        ));
    }

    repositories::exams::delete_by_id(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to delete exam"))?;

    Ok(Json(ApiSuccess::new(serde_json::json!({"message": "Exam deleted"}))))
}

async fn insert_exam_question(
    state: &AppState,
    executor: impl sqlx::PgExecutor<'_>,
    exam_id: &str,
    attach: &ExamQuestionAttach,
    fallback_order: i32,
) -> Result<(), ApiError> {
    let question = repositories::questions::find_by_id(state.db(), &attach.question_id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to fetch question"))?
        .ok_or_else(|| {
            ApiError::NotFound(format!("Question {} not found", attach.question_id))
        })?;

    if question.status != crate::db::types::QuestionStatus::Active {
        return Err(ApiError::BadRequest(format!(
            "Question {} is archived and cannot be attached",
            question.id
        )));
    }

    let inserted = repositories::exams::attach_question(
        executor,
        &Uuid::new_v4().to_string(),
        exam_id,
        &question.id,
        attach.marks.unwrap_or(question.marks),
        attach.order_index.unwrap_or(fallback_order),
    )
    .await
    .map_err(|e| ApiError::internal(e, "Failed to attach question"))?;

    if !inserted {
        return Err(ApiError::Conflict(format!(
            "Question {} is already part of this exam",
            question.id
        )));
    }

    Ok(())
}

/// Keep exam.total_marks equal to the question-marks sum unless an explicit
/// override is in place.
async fn sync_total_marks(state: &AppState, exam: Exam) -> Result<Exam, ApiError> {
    if exam.total_marks_overridden {
        return Ok(exam);
    }

    let sum = repositories::exams::sum_question_marks(state.db(), &exam.id)
        .await
        .map_err(|e| ApiError::internal(e, "Failed to sum question marks"))?;

    repositories::exams::set_total_marks(state.db(), &exam.id, sum, primitive_now_utc())
        .await
        .map_err(|e| ApiError::internal(e, "Failed to update total marks"))?;

    let mut exam = exam;
    exam.total_marks = sum;
    Ok(exam)
}
