//! Submission REST API Routes
//!
//! Respondents submit answers by survey token; admins list and delete the
//! stored submissions.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::{delete, get, post},
    Json, Router,
};
use chrono::Utc;
use std::sync::Arc;
use tally_core::{validate_submission, EntityId, NewSubmission, Submission, ValidationError};
use tally_storage::Store;

use crate::error::{ApiError, ApiResult};
use crate::routes::{DataResponse, ListResponse, SurveyScopedQuery};
use crate::state::AppState;

/// POST /api/submissions - Submit answers to a survey
#[utoipa::path(
    post,
    path = "/api/submissions",
    tag = "Respondent",
    request_body = NewSubmission,
    responses(
        (status = 201, description = "Submission stored", body = DataResponse<Submission>),
        (status = 400, description = "Answers rejected", body = ApiError),
        (status = 404, description = "Survey not found", body = ApiError),
    ),
)]
pub async fn create_submission(
    State(store): State<Arc<dyn Store>>,
    req: Result<Json<NewSubmission>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = req?;
    let survey = store
        .survey_get_by_token(req.survey_token.trim())
        .await?
        .ok_or(ValidationError::SurveyNotFound)?;

    let responses = validate_submission(&survey, req.responses)?;
    let submission = Submission::new(survey.id, responses, Utc::now());
    store.submission_insert(&submission).await?;

    tracing::info!(
        submission_id = %submission.id,
        survey_id = %survey.id,
        "Submission stored"
    );
    Ok((StatusCode::CREATED, Json(DataResponse::new(submission))))
}

/// GET /api/admin/submissions - List submissions
#[utoipa::path(
    get,
    path = "/api/admin/submissions",
    tag = "Submissions",
    params(SurveyScopedQuery),
    responses(
        (status = 200, description = "One page of submissions", body = ListResponse<Submission>),
        (status = 400, description = "Invalid query", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_submissions(
    State(store): State<Arc<dyn Store>>,
    query: Result<Query<SurveyScopedQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let submissions = store
        .submission_list(query.survey_id, query.page())
        .await?;
    Ok(Json(ListResponse::from(submissions)))
}

/// DELETE /api/admin/submissions/{id} - Delete a submission
#[utoipa::path(
    delete,
    path = "/api/admin/submissions/{id}",
    tag = "Submissions",
    params(("id" = Uuid, Path, description = "Submission ID")),
    responses(
        (status = 204, description = "Submission deleted"),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Submission not found", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_submission(
    State(store): State<Arc<dyn Store>>,
    id: Result<Path<EntityId>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    if !store.submission_delete(id).await? {
        return Err(ApiError::entity_not_found("Submission", id));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Admin routes, nested under `/api/admin/submissions`.
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_submissions))
        .route("/:id", delete(delete_submission))
}

/// Public routes, merged at `/api`.
pub fn public_router() -> Router<AppState> {
    Router::new().route("/submissions", post(create_submission))
}
