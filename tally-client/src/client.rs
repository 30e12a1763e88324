//! Typed HTTP client for the Tally API
//!
//! Decodes the `{data}` and `{data, total}` envelopes into core types and
//! classifies every failure as a [`ClientError`]. Admin calls carry the
//! bearer token when one is configured; without one they are expected to go
//! through the gateway, which injects it.

use std::time::Duration;

use reqwest::{Method, RequestBuilder, Response};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tally_core::{
    validate_submission, ContextType, EntityId, Insight, InsightStatus, NewSubmission, NewSurvey,
    Page, PageRequest, Submission, SubmissionResponse, Survey,
};

use crate::error::{ClientError, ClientResult};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root, e.g. `http://localhost:8080/api`.
    pub base_url: String,

    /// Admin bearer token. Leave unset when talking to the gateway.
    pub admin_token: Option<SecretString>,

    pub timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            admin_token: None,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(SecretString::from(token.into()));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

// ============================================================================
// WIRE ENVELOPES
// ============================================================================

#[derive(Deserialize)]
struct DataEnvelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ListEnvelope<T> {
    data: Vec<T>,
    total: u64,
}

#[derive(Serialize)]
struct InsightRequest {
    survey_id: EntityId,
    context_type: ContextType,
}

/// Liveness report from `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub version: Option<String>,
}

/// Query pairs for list endpoints. Unset values are left to the server's
/// defaults.
fn list_query(survey_id: Option<EntityId>, page: PageRequest) -> Vec<(&'static str, String)> {
    let mut query = Vec::with_capacity(3);
    if let Some(id) = survey_id {
        query.push(("surveyId", id.to_string()));
    }
    if let Some(offset) = page.offset {
        query.push(("offset", offset.to_string()));
    }
    if let Some(limit) = page.limit {
        query.push(("limit", limit.to_string()));
    }
    query
}

// ============================================================================
// CLIENT
// ============================================================================

#[derive(Clone)]
pub struct TallyClient {
    http: reqwest::Client,
    base_url: String,
    admin_token: Option<SecretString>,
}

impl TallyClient {
    pub fn new(config: ClientConfig) -> ClientResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| ClientError::Network {
                message: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            admin_token: config.admin_token,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
    }

    fn admin(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self.request(method, &format!("/admin{}", path));
        match &self.admin_token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }

    // ========================================================================
    // Surveys (admin)
    // ========================================================================

    /// Validate locally, then create. The backend re-validates.
    pub async fn create_survey(&self, survey: &NewSurvey) -> ClientResult<Survey> {
        survey.validate()?;
        data(self.admin(Method::POST, "/surveys").json(survey)).await
    }

    pub async fn get_survey(&self, id: EntityId) -> ClientResult<Survey> {
        data(self.admin(Method::GET, &format!("/surveys/{}", id))).await
    }

    /// Newest first.
    pub async fn list_surveys(&self, page: PageRequest) -> ClientResult<Page<Survey>> {
        list(
            self.admin(Method::GET, "/surveys")
                .query(&list_query(None, page)),
        )
        .await
    }

    pub async fn delete_survey(&self, id: EntityId) -> ClientResult<()> {
        empty(self.admin(Method::DELETE, &format!("/surveys/{}", id))).await
    }

    // ========================================================================
    // Submissions
    // ========================================================================

    pub async fn list_submissions(
        &self,
        survey_id: Option<EntityId>,
        page: PageRequest,
    ) -> ClientResult<Page<Submission>> {
        list(
            self.admin(Method::GET, "/submissions")
                .query(&list_query(survey_id, page)),
        )
        .await
    }

    pub async fn delete_submission(&self, id: EntityId) -> ClientResult<()> {
        empty(self.admin(Method::DELETE, &format!("/submissions/{}", id))).await
    }

    /// Public survey lookup by share token.
    pub async fn fetch_survey_by_token(&self, token: &str) -> ClientResult<Survey> {
        data(self.request(Method::GET, &format!("/surveys/{}", token))).await
    }

    /// Submit answers by token. Only the backend validates.
    pub async fn submit(
        &self,
        token: &str,
        responses: Vec<SubmissionResponse>,
    ) -> ClientResult<Submission> {
        let body = NewSubmission {
            survey_token: token.to_string(),
            responses,
        };
        data(self.request(Method::POST, "/submissions").json(&body)).await
    }

    /// Check every answer against `survey` before submitting, so obvious
    /// mistakes never leave the client.
    pub async fn submit_to(
        &self,
        survey: &Survey,
        responses: Vec<SubmissionResponse>,
    ) -> ClientResult<Submission> {
        let responses = validate_submission(survey, responses)?;
        self.submit(&survey.token, responses).await
    }

    // ========================================================================
    // Insights (admin)
    // ========================================================================

    /// Returns the PENDING insight; processing happens in the background.
    pub async fn request_insight(
        &self,
        survey_id: EntityId,
        context_type: ContextType,
    ) -> ClientResult<Insight> {
        let body = InsightRequest {
            survey_id,
            context_type,
        };
        data(self.admin(Method::POST, "/insights").json(&body)).await
    }

    pub async fn get_insight(&self, id: EntityId) -> ClientResult<Insight> {
        data(self.admin(Method::GET, &format!("/insights/{}", id))).await
    }

    pub async fn list_insights(
        &self,
        survey_id: Option<EntityId>,
        page: PageRequest,
    ) -> ClientResult<Page<Insight>> {
        list(
            self.admin(Method::GET, "/insights")
                .query(&list_query(survey_id, page)),
        )
        .await
    }

    /// Re-fetch an insight every `interval` until it settles or `attempts`
    /// run out.
    ///
    /// A FAILED insight becomes [`ClientError::Upstream`] carrying its error
    /// log. When attempts run out the last observed insight is returned, so
    /// callers must still check its status.
    pub async fn poll_insight(
        &self,
        id: EntityId,
        interval: Duration,
        attempts: usize,
    ) -> ClientResult<Insight> {
        let mut insight = self.get_insight(id).await?;
        for _ in 1..attempts.max(1) {
            if insight.status.is_terminal() {
                break;
            }
            tokio::time::sleep(interval).await;
            insight = self.get_insight(id).await?;
        }

        if insight.status == InsightStatus::Failed {
            let message = insight
                .error_log
                .clone()
                .filter(|log| !log.trim().is_empty())
                .unwrap_or_else(|| "Insight generation failed".to_string());
            tracing::debug!(insight_id = %id, "Insight settled as failed");
            return Err(ClientError::Upstream {
                status: None,
                message,
            });
        }
        Ok(insight)
    }

    pub async fn health(&self) -> ClientResult<HealthStatus> {
        let response = self.request(Method::GET, "/health").send().await?;
        decode(response).await
    }
}

// ============================================================================
// RESPONSE HANDLING
// ============================================================================

async fn data<T: DeserializeOwned>(request: RequestBuilder) -> ClientResult<T> {
    let response = request.send().await?;
    let envelope: DataEnvelope<T> = decode(response).await?;
    Ok(envelope.data)
}

async fn list<T: DeserializeOwned>(request: RequestBuilder) -> ClientResult<Page<T>> {
    let response = request.send().await?;
    let envelope: ListEnvelope<T> = decode(response).await?;
    Ok(Page {
        items: envelope.data,
        total: envelope.total,
    })
}

async fn empty(request: RequestBuilder) -> ClientResult<()> {
    let response = request.send().await?;
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await?;
    Err(failure(status.as_u16(), &body))
}

async fn decode<T: DeserializeOwned>(response: Response) -> ClientResult<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(failure(status.as_u16(), &body));
    }
    serde_json::from_str(&body).map_err(|e| ClientError::Upstream {
        status: Some(status.as_u16()),
        message: format!("Invalid response from server: {}", e),
    })
}

fn failure(status: u16, body: &str) -> ClientError {
    let err = ClientError::from_status(status, body);
    tracing::debug!(status, error = %err, "Request rejected by backend");
    err
}
