//! Survey REST API Routes
//!
//! Admin authoring (create, list, get, delete) and the public lookup by
//! share token.

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use std::sync::Arc;
use tally_core::{
    generate_token, EntityId, NewSurvey, PageRequest, StorageError, Survey, TallyError,
    ValidationError,
};
use tally_storage::Store;

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::routes::{DataResponse, ListResponse};
use crate::state::AppState;

/// Fresh tokens tried before giving up on a collision streak.
const TOKEN_ATTEMPTS: usize = 5;

// ============================================================================
// ROUTE HANDLERS
// ============================================================================

/// POST /api/admin/surveys - Create a survey
#[utoipa::path(
    post,
    path = "/api/admin/surveys",
    tag = "Surveys",
    request_body = NewSurvey,
    responses(
        (status = 201, description = "Survey created", body = DataResponse<Survey>),
        (status = 400, description = "Invalid survey", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 500, description = "No unused share token found", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_survey(
    State(store): State<Arc<dyn Store>>,
    req: Result<Json<NewSurvey>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = req?;
    req.validate()?;

    let survey = insert_with_fresh_token(store.as_ref(), &req, generate_token).await?;
    tracing::info!(
        survey_id = %survey.id,
        questions = survey.questions.len(),
        "Survey created"
    );
    Ok((StatusCode::CREATED, Json(DataResponse::new(survey))))
}

/// Insert `req` under the first token from `next_token` that is not taken.
async fn insert_with_fresh_token(
    store: &dyn Store,
    req: &NewSurvey,
    mut next_token: impl FnMut() -> String,
) -> ApiResult<Survey> {
    for attempt in 1..=TOKEN_ATTEMPTS {
        let survey = req.clone().into_survey(next_token(), Utc::now())?;
        match store.survey_insert(&survey).await {
            Ok(()) => return Ok(survey),
            Err(TallyError::Storage(StorageError::DuplicateToken)) => {
                tracing::warn!(attempt, "Survey token collision, retrying");
            }
            Err(err) => return Err(err.into()),
        }
    }

    tracing::error!(attempts = TOKEN_ATTEMPTS, "Every survey token attempt collided");
    Err(ApiError::generic(ErrorCode::InternalError))
}

/// GET /api/admin/surveys - List surveys, newest first
#[utoipa::path(
    get,
    path = "/api/admin/surveys",
    tag = "Surveys",
    params(PageRequest),
    responses(
        (status = 200, description = "One page of surveys", body = ListResponse<Survey>),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_surveys(
    State(store): State<Arc<dyn Store>>,
    query: Result<Query<PageRequest>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(page) = query?;
    let surveys = store.survey_list(page).await?;
    Ok(Json(ListResponse::from(surveys)))
}

/// GET /api/admin/surveys/{id} - Get survey by ID
#[utoipa::path(
    get,
    path = "/api/admin/surveys/{id}",
    tag = "Surveys",
    params(("id" = Uuid, Path, description = "Survey ID")),
    responses(
        (status = 200, description = "Survey details", body = DataResponse<Survey>),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Survey not found", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_survey(
    State(store): State<Arc<dyn Store>>,
    id: Result<Path<EntityId>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    let survey = store
        .survey_get(id)
        .await?
        .ok_or_else(|| ApiError::entity_not_found("Survey", id))?;
    Ok(Json(DataResponse::new(survey)))
}

/// DELETE /api/admin/surveys/{id} - Delete a survey with its submissions and insights
#[utoipa::path(
    delete,
    path = "/api/admin/surveys/{id}",
    tag = "Surveys",
    params(("id" = Uuid, Path, description = "Survey ID")),
    responses(
        (status = 204, description = "Survey deleted"),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Survey not found", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_survey(
    State(store): State<Arc<dyn Store>>,
    id: Result<Path<EntityId>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path(id) = id?;
    if !store.survey_delete(id).await? {
        return Err(ApiError::entity_not_found("Survey", id));
    }
    tracing::info!(survey_id = %id, "Survey deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/surveys/{token} - Public survey lookup for respondents
#[utoipa::path(
    get,
    path = "/api/surveys/{token}",
    tag = "Respondent",
    params(("token" = String, Path, description = "Survey share token")),
    responses(
        (status = 200, description = "Survey to answer", body = DataResponse<Survey>),
        (status = 404, description = "Survey not found", body = ApiError),
    ),
)]
pub async fn get_survey_by_token(
    State(store): State<Arc<dyn Store>>,
    token: Result<Path<String>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(token) = token?;
    let survey = store
        .survey_get_by_token(token.trim())
        .await?
        .ok_or(ValidationError::SurveyNotFound)?;
    Ok(Json(DataResponse::new(survey)))
}

// ============================================================================
// ROUTERS
// ============================================================================

/// Admin routes, nested under `/api/admin/surveys`.
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_surveys).post(create_survey))
        .route("/:id", get(get_survey).delete(delete_survey))
}

/// Public routes, merged at `/api`.
pub fn public_router() -> Router<AppState> {
    Router::new().route("/surveys/:token", get(get_survey_by_token))
}
