//! OpenAPI Specification for the Tally API
//!
//! Generated with utoipa from the route annotations and the `tally-core`
//! types. Served at `/openapi.json`.

use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};

use crate::error::{ApiError, ErrorCode};
use crate::routes::health::HealthResponse;
use crate::routes::insights::CreateInsightRequest;
use crate::routes::{health, insights, submissions, surveys};
use crate::telemetry::metrics;

use tally_core::{
    ContextType, Insight, InsightBatch, InsightStatus, LikertSpec, MultipleChoiceSpec,
    NewSubmission, NewSurvey, QuestionKind, QuestionWire, Submission, SubmissionResponse, Survey,
    TextboxSpec,
};

/// OpenAPI document for the Tally API.
#[derive(OpenApi)]
#[openapi(
    info(
        title = "Tally API",
        version = "0.1.0",
        description = "Survey authoring, anonymous response collection and AI-generated insights",
        license(name = "MIT", url = "https://opensource.org/licenses/MIT"),
        contact(name = "Tally", url = "https://tally.run")
    ),
    servers(
        (url = "http://localhost:8080", description = "Local Development")
    ),
    tags(
        (name = "Surveys", description = "Survey authoring (admin)"),
        (name = "Submissions", description = "Stored responses (admin)"),
        (name = "Insights", description = "Asynchronous AI summaries of a survey's responses (admin)"),
        (name = "Respondent", description = "Public survey lookup and submission"),
        (name = "Health", description = "Liveness"),
        (name = "Monitoring", description = "Prometheus metrics")
    ),
    paths(
        surveys::create_survey,
        surveys::list_surveys,
        surveys::get_survey,
        surveys::delete_survey,
        surveys::get_survey_by_token,
        submissions::create_submission,
        submissions::list_submissions,
        submissions::delete_submission,
        insights::create_insight,
        insights::list_insights,
        insights::get_insight,
        health::health,
        metrics::metrics_handler,
    ),
    components(
        schemas(
            ApiError,
            ErrorCode,
            Survey,
            NewSurvey,
            QuestionWire,
            QuestionKind,
            TextboxSpec,
            MultipleChoiceSpec,
            LikertSpec,
            Submission,
            SubmissionResponse,
            NewSubmission,
            Insight,
            InsightBatch,
            InsightStatus,
            ContextType,
            CreateInsightRequest,
            HealthResponse,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

/// Registers the admin bearer scheme.
struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .description(Some("Static admin token (TALLY_ROOT_TOKEN)"))
                        .build(),
                ),
            );
        }
    }
}

impl ApiDoc {
    /// Generate OpenAPI spec as JSON string.
    pub fn to_json() -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(&Self::openapi())
    }
}
