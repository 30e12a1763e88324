//! Tally Client - Typed Access to the Tally API
//!
//! - [`TallyClient`]: typed calls over the `{data}` envelopes with a
//!   four-way [`ClientError`] taxonomy
//! - [`pages`]: concurrent page loaders that tolerate partial failure
//! - [`gateway`]: the admin proxy that injects the root bearer token

pub mod client;
pub mod error;
pub mod gateway;
pub mod pages;

pub use client::{ClientConfig, HealthStatus, TallyClient};
pub use error::{ClientError, ClientResult};
pub use gateway::{create_gateway_router, GatewayConfig};
pub use pages::{
    load_dashboard, load_survey_insights, load_survey_submissions, DashboardPage,
    SurveyInsightsPage, SurveySubmissionsPage,
};
