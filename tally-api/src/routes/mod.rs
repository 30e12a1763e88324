//! REST API Routes Module
//!
//! Route handlers organized by entity type:
//! - Public respondent routes (`/api/surveys/:token`, `/api/submissions`)
//! - Admin routes under `/api/admin/*`, guarded by the bearer gate
//! - Health, metrics and OpenAPI endpoints
//!
//! Every success body is `{"data": ...}`; lists add `"total"`.

pub mod health;
pub mod insights;
pub mod submissions;
pub mod surveys;

use std::time::Duration;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tally_core::{EntityId, Page, PageRequest};
use tower_http::cors::{Any, CorsLayer};
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;

use crate::config::ApiConfig;
use crate::error::{ApiError, ApiResult};
use crate::middleware::admin_auth_middleware;
use crate::openapi::ApiDoc;
use crate::state::AppState;
use crate::telemetry::{metrics_handler, observability_middleware};

// ============================================================================
// RESPONSE ENVELOPES
// ============================================================================

/// Success envelope for a single payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct DataResponse<T> {
    pub data: T,
}

impl<T> DataResponse<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }
}

/// Success envelope for one page of a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ListResponse<T> {
    pub data: Vec<T>,
    /// Size of the whole filtered set, not just this page.
    pub total: u64,
}

impl<T> From<Page<T>> for ListResponse<T> {
    fn from(page: Page<T>) -> Self {
        Self {
            data: page.items,
            total: page.total,
        }
    }
}

/// Query parameters for lists that can be narrowed to one survey.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::IntoParams))]
#[cfg_attr(feature = "openapi", into_params(parameter_in = Query))]
pub struct SurveyScopedQuery {
    /// Only return entities of this survey
    #[serde(rename = "surveyId", alias = "survey_id")]
    #[cfg_attr(feature = "openapi", param(value_type = Option<String>, format = Uuid))]
    pub survey_id: Option<EntityId>,
    /// Number of entities to skip (default 0)
    pub offset: Option<usize>,
    /// Page size, clamped to 1..=100 (default 10)
    pub limit: Option<usize>,
}

impl SurveyScopedQuery {
    pub fn page(&self) -> PageRequest {
        PageRequest {
            offset: self.offset,
            limit: self.limit,
        }
    }
}

// ============================================================================
// OPENAPI ENDPOINTS
// ============================================================================

/// Handler for /openapi.json endpoint.
async fn openapi_json() -> impl IntoResponse {
    Json(ApiDoc::openapi())
}

// ============================================================================
// ROUTER BUILDER
// ============================================================================

/// Assembles the public and admin surfaces with the shared layer stack.
pub struct RouterBuilder {
    state: AppState,
    api_config: ApiConfig,
}

impl RouterBuilder {
    /// In production, an unset admin token or open CORS is a startup error.
    pub fn new(state: AppState, api_config: ApiConfig) -> ApiResult<Self> {
        if api_config.is_production() {
            validate_api_config_for_production(&state, &api_config)?;
        }
        Ok(Self { state, api_config })
    }

    fn build_public_routes(&self) -> Router<AppState> {
        Router::new()
            .merge(surveys::public_router())
            .merge(submissions::public_router())
    }

    fn build_admin_routes(&self) -> Router<AppState> {
        Router::new()
            .nest("/surveys", surveys::admin_router())
            .nest("/submissions", submissions::admin_router())
            .nest("/insights", insights::admin_router())
            .layer(from_fn_with_state(
                self.state.admin.clone(),
                admin_auth_middleware,
            ))
    }

    /// Build the complete router.
    ///
    /// # Middleware Order (outer to inner)
    /// 1. CORS - answers preflight requests
    /// 2. Request tracing and timeout
    /// 3. Observability - metrics
    /// 4. Admin auth (only on /api/admin/*)
    pub fn build(self) -> Router {
        let api = self
            .build_public_routes()
            .nest("/admin", self.build_admin_routes())
            .nest("/health", health::create_router())
            .route("/metrics", get(metrics_handler));

        #[allow(unused_mut)]
        let mut router = Router::new()
            .nest("/api", api)
            .route("/openapi.json", get(openapi_json));

        #[cfg(feature = "swagger-ui")]
        {
            use utoipa_swagger_ui::SwaggerUi;
            router = router.merge(SwaggerUi::new("/swagger-ui").url("/openapi.json", ApiDoc::openapi()));
        }

        let cors = build_cors_layer(&self.api_config);

        router
            .layer(from_fn(observability_middleware))
            .layer(TimeoutLayer::new(self.api_config.request_timeout))
            .layer(TraceLayer::new_for_http())
            .layer(cors)
            .with_state(self.state)
    }
}

fn validate_api_config_for_production(state: &AppState, config: &ApiConfig) -> ApiResult<()> {
    if !state.admin.is_enabled() {
        return Err(ApiError::invalid_input(
            "Admin token not configured for production. Set TALLY_ROOT_TOKEN.",
        ));
    }
    if config.request_timeout.is_zero() {
        return Err(ApiError::invalid_input(
            "Request timeout must be positive. Set TALLY_REQUEST_TIMEOUT_SECS.",
        ));
    }
    Ok(())
}

// ============================================================================
// CORS LAYER
// ============================================================================

/// Build the CORS layer from ApiConfig.
///
/// Empty origins allow any origin.
fn build_cors_layer(config: &ApiConfig) -> CorsLayer {
    let cors = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    if config.cors_origins.is_empty() {
        tracing::info!("CORS: allowing all origins");
        cors.allow_origin(Any)
    } else {
        tracing::info!(origins = ?config.cors_origins, "CORS: restricting origins");
        let origins: Vec<HeaderValue> = config
            .cors_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        cors.allow_origin(origins)
    }
}

/// Create the complete API router.
///
/// - Public survey fetch and submission under /api
/// - Survey, submission and insight administration under /api/admin/* (bearer token)
/// - Health at /api/health, metrics at /api/metrics
/// - OpenAPI spec at /openapi.json, Swagger UI at /swagger-ui (swagger-ui feature)
pub fn create_api_router(state: AppState, api_config: &ApiConfig) -> ApiResult<Router> {
    RouterBuilder::new(state, api_config.clone()).map(RouterBuilder::build)
}
