//! Insight REST API Routes
//!
//! Requesting an insight snapshots the survey's submissions into batches,
//! stores a PENDING insight and hands it to the background worker. Callers
//! poll `GET /api/admin/insights/{id}` until it settles.

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
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tally_core::{build_batches, ContextType, EntityId, Insight, ValidationError};
use tally_storage::Store;

use crate::error::{ApiError, ApiResult};
use crate::jobs::InsightQueue;
use crate::routes::{DataResponse, ListResponse, SurveyScopedQuery};
use crate::state::AppState;

/// Request body for `POST /api/admin/insights`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct CreateInsightRequest {
    #[cfg_attr(feature = "openapi", schema(value_type = String, format = Uuid))]
    pub survey_id: EntityId,
    pub context_type: ContextType,
}

/// POST /api/admin/insights - Request an insight
#[utoipa::path(
    post,
    path = "/api/admin/insights",
    tag = "Insights",
    request_body = CreateInsightRequest,
    responses(
        (status = 201, description = "Insight accepted in PENDING state", body = DataResponse<Insight>),
        (status = 400, description = "Invalid request", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Survey not found", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_insight(
    State(store): State<Arc<dyn Store>>,
    State(queue): State<InsightQueue>,
    req: Result<Json<CreateInsightRequest>, JsonRejection>,
) -> ApiResult<impl IntoResponse> {
    let Json(req) = req?;
    let survey = store
        .survey_get(req.survey_id)
        .await?
        .ok_or(ValidationError::SurveyNotFound)?;

    let submissions = store.submission_list_all(survey.id).await?;
    let batches = build_batches(&survey, &submissions);
    let insight = Insight::new(survey.id, req.context_type, batches, Utc::now());
    store.insight_insert(&insight).await?;

    tracing::info!(
        insight_id = %insight.id,
        survey_id = %survey.id,
        context_type = %insight.context_type,
        submissions = submissions.len(),
        batches = insight.batches.len(),
        "Insight requested"
    );

    // The insight is stored either way; the worker's sweep queues it later.
    if let Err(err) = queue.try_enqueue(insight.id) {
        tracing::warn!(insight_id = %insight.id, error = %err.message, "Insight not queued, left for sweep");
    }

    Ok((StatusCode::CREATED, Json(DataResponse::new(insight))))
}

/// GET /api/admin/insights - List insights
#[utoipa::path(
    get,
    path = "/api/admin/insights",
    tag = "Insights",
    params(SurveyScopedQuery),
    responses(
        (status = 200, description = "One page of insights", body = ListResponse<Insight>),
        (status = 400, description = "Invalid query", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_insights(
    State(store): State<Arc<dyn Store>>,
    query: Result<Query<SurveyScopedQuery>, QueryRejection>,
) -> ApiResult<impl IntoResponse> {
    let Query(query) = query?;
    let insights = store.insight_list(query.survey_id, query.page()).await?;
    Ok(Json(ListResponse::from(insights)))
}

/// GET /api/admin/insights/{id} - Get insight by ID
#[utoipa::path(
    get,
    path = "/api/admin/insights/{id}",
    tag = "Insights",
    params(("id" = Uuid, Path, description = "Insight ID")),
    responses(
        (status = 200, description = "Insight details", body = DataResponse<Insight>),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Insight not found", body = ApiError),
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_insight(
    State(store): State<Arc<dyn Store>>,
    id: Result<Path<EntityId>, PathRejection>,
) -> ApiResult<impl IntoResponse> {
    let Path(id) = id?;
    let insight = store
        .insight_get(id)
        .await?
        .ok_or_else(|| ApiError::entity_not_found("Insight", id))?;
    Ok(Json(DataResponse::new(insight)))
}

/// Admin routes, nested under `/api/admin/insights`.
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_insights).post(create_insight))
        .route("/:id", get(get_insight))
}
