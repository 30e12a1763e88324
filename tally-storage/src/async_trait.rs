//! Async storage traits.
//!
//! Each entity gets its own trait so callers can depend on only what they
//! touch; [`Store`] bundles them for the server state.

use crate::CompletionLog;
use ::async_trait::async_trait;
use tally_core::{EntityId, Insight, Page, PageRequest, Submission, Survey, TallyResult};

#[async_trait]
pub trait SurveyStore: Send + Sync {
    /// Insert a new survey. Fails with `StorageError::DuplicateToken` when the
    /// token is taken.
    async fn survey_insert(&self, survey: &Survey) -> TallyResult<()>;

    async fn survey_get(&self, id: EntityId) -> TallyResult<Option<Survey>>;

    async fn survey_get_by_token(&self, token: &str) -> TallyResult<Option<Survey>>;

    /// Newest first.
    async fn survey_list(&self, page: PageRequest) -> TallyResult<Page<Survey>>;

    /// Delete a survey together with its submissions and insights.
    /// Returns `false` when nothing was deleted.
    async fn survey_delete(&self, id: EntityId) -> TallyResult<bool>;
}

#[async_trait]
pub trait SubmissionStore: Send + Sync {
    async fn submission_insert(&self, submission: &Submission) -> TallyResult<()>;

    async fn submission_get(&self, id: EntityId) -> TallyResult<Option<Submission>>;

    /// Most recently updated first, optionally restricted to one survey.
    async fn submission_list(
        &self,
        survey_id: Option<EntityId>,
        page: PageRequest,
    ) -> TallyResult<Page<Submission>>;

    /// Every submission of a survey in creation order.
    async fn submission_list_all(&self, survey_id: EntityId) -> TallyResult<Vec<Submission>>;

    async fn submission_delete(&self, id: EntityId) -> TallyResult<bool>;
}

#[async_trait]
pub trait InsightStore: Send + Sync {
    async fn insight_insert(&self, insight: &Insight) -> TallyResult<()>;

    async fn insight_get(&self, id: EntityId) -> TallyResult<Option<Insight>>;

    /// Replace a stored insight. Terminal insights are immutable, so updating
    /// one fails with a lifecycle error.
    async fn insight_update(&self, insight: &Insight) -> TallyResult<()>;

    /// Sorted by completion, update and creation time, newest first.
    async fn insight_list(
        &self,
        survey_id: Option<EntityId>,
        page: PageRequest,
    ) -> TallyResult<Page<Insight>>;

    /// Insights still PENDING or PROCESSING, oldest first.
    async fn insight_list_unfinished(&self) -> TallyResult<Vec<Insight>>;
}

#[async_trait]
pub trait CompletionLogStore: Send + Sync {
    async fn completion_log_insert(&self, log: &CompletionLog) -> TallyResult<()>;

    async fn completion_log_attach_response(
        &self,
        id: EntityId,
        response: serde_json::Value,
    ) -> TallyResult<()>;
}

/// Everything the server needs from persistence.
pub trait Store: SurveyStore + SubmissionStore + InsightStore + CompletionLogStore {}

impl<T> Store for T where T: SurveyStore + SubmissionStore + InsightStore + CompletionLogStore {}
