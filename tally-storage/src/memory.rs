//! In-memory store used by tests and by the server when no database is
//! configured.

use crate::async_trait::{CompletionLogStore, InsightStore, SubmissionStore, SurveyStore};
use crate::ordering::{insight_order, submission_order, survey_order};
use crate::CompletionLog;
use ::async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tally_core::{
    EntityId, EntityType, Insight, LifecycleError, Page, PageRequest, StorageError, Submission,
    Survey, TallyResult,
};
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct Tables {
    surveys: HashMap<EntityId, Survey>,
    tokens: HashMap<String, EntityId>,
    submissions: HashMap<EntityId, Submission>,
    insights: HashMap<EntityId, Insight>,
    completion_logs: HashMap<EntityId, CompletionLog>,
}

/// Cheap to clone; clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn survey_count(&self) -> usize {
        self.tables.read().await.surveys.len()
    }

    pub async fn submission_count(&self) -> usize {
        self.tables.read().await.submissions.len()
    }

    pub async fn insight_count(&self) -> usize {
        self.tables.read().await.insights.len()
    }

    pub async fn completion_logs(&self) -> Vec<CompletionLog> {
        let mut logs: Vec<CompletionLog> = self
            .tables
            .read()
            .await
            .completion_logs
            .values()
            .cloned()
            .collect();
        logs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        logs
    }
}

#[async_trait]
impl SurveyStore for InMemoryStore {
    async fn survey_insert(&self, survey: &Survey) -> TallyResult<()> {
        let mut tables = self.tables.write().await;
        if tables.tokens.contains_key(&survey.token) {
            return Err(StorageError::DuplicateToken.into());
        }
        if tables.surveys.contains_key(&survey.id) {
            return Err(StorageError::InsertFailed {
                entity_type: EntityType::Survey,
                reason: format!("id {} already exists", survey.id),
            }
            .into());
        }
        tables.tokens.insert(survey.token.clone(), survey.id);
        tables.surveys.insert(survey.id, survey.clone());
        Ok(())
    }

    async fn survey_get(&self, id: EntityId) -> TallyResult<Option<Survey>> {
        Ok(self.tables.read().await.surveys.get(&id).cloned())
    }

    async fn survey_get_by_token(&self, token: &str) -> TallyResult<Option<Survey>> {
        let tables = self.tables.read().await;
        Ok(tables
            .tokens
            .get(token)
            .and_then(|id| tables.surveys.get(id))
            .cloned())
    }

    async fn survey_list(&self, page: PageRequest) -> TallyResult<Page<Survey>> {
        let mut surveys: Vec<Survey> = self.tables.read().await.surveys.values().cloned().collect();
        surveys.sort_by(survey_order);
        Ok(Page::from_sorted(surveys, page))
    }

    async fn survey_delete(&self, id: EntityId) -> TallyResult<bool> {
        let mut tables = self.tables.write().await;
        let Some(survey) = tables.surveys.remove(&id) else {
            return Ok(false);
        };
        tables.tokens.remove(&survey.token);
        tables.submissions.retain(|_, s| s.survey_id != id);
        tables.insights.retain(|_, i| i.survey_id != id);
        Ok(true)
    }
}

#[async_trait]
impl SubmissionStore for InMemoryStore {
    async fn submission_insert(&self, submission: &Submission) -> TallyResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.surveys.contains_key(&submission.survey_id) {
            return Err(StorageError::not_found(EntityType::Survey, submission.survey_id).into());
        }
        tables.submissions.insert(submission.id, submission.clone());
        Ok(())
    }

    async fn submission_get(&self, id: EntityId) -> TallyResult<Option<Submission>> {
        Ok(self.tables.read().await.submissions.get(&id).cloned())
    }

    async fn submission_list(
        &self,
        survey_id: Option<EntityId>,
        page: PageRequest,
    ) -> TallyResult<Page<Submission>> {
        let mut submissions: Vec<Submission> = self
            .tables
            .read()
            .await
            .submissions
            .values()
            .filter(|s| survey_id.is_none_or(|id| s.survey_id == id))
            .cloned()
            .collect();
        submissions.sort_by(submission_order);
        Ok(Page::from_sorted(submissions, page))
    }

    async fn submission_list_all(&self, survey_id: EntityId) -> TallyResult<Vec<Submission>> {
        let mut submissions: Vec<Submission> = self
            .tables
            .read()
            .await
            .submissions
            .values()
            .filter(|s| s.survey_id == survey_id)
            .cloned()
            .collect();
        submissions.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(submissions)
    }

    async fn submission_delete(&self, id: EntityId) -> TallyResult<bool> {
        Ok(self.tables.write().await.submissions.remove(&id).is_some())
    }
}

#[async_trait]
impl InsightStore for InMemoryStore {
    async fn insight_insert(&self, insight: &Insight) -> TallyResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.surveys.contains_key(&insight.survey_id) {
            return Err(StorageError::not_found(EntityType::Survey, insight.survey_id).into());
        }
        tables.insights.insert(insight.id, insight.clone());
        Ok(())
    }

    async fn insight_get(&self, id: EntityId) -> TallyResult<Option<Insight>> {
        Ok(self.tables.read().await.insights.get(&id).cloned())
    }

    async fn insight_update(&self, insight: &Insight) -> TallyResult<()> {
        let mut tables = self.tables.write().await;
        let Some(stored) = tables.insights.get_mut(&insight.id) else {
            return Err(StorageError::not_found(EntityType::Insight, insight.id).into());
        };
        if stored.status.is_terminal() {
            return Err(LifecycleError::InvalidTransition {
                from: stored.status,
                to: insight.status,
            }
            .into());
        }
        *stored = insight.clone();
        Ok(())
    }

    async fn insight_list(
        &self,
        survey_id: Option<EntityId>,
        page: PageRequest,
    ) -> TallyResult<Page<Insight>> {
        let mut insights: Vec<Insight> = self
            .tables
            .read()
            .await
            .insights
            .values()
            .filter(|i| survey_id.is_none_or(|id| i.survey_id == id))
            .cloned()
            .collect();
        insights.sort_by(insight_order);
        Ok(Page::from_sorted(insights, page))
    }

    async fn insight_list_unfinished(&self) -> TallyResult<Vec<Insight>> {
        let mut insights: Vec<Insight> = self
            .tables
            .read()
            .await
            .insights
            .values()
            .filter(|i| !i.status.is_terminal())
            .cloned()
            .collect();
        insights.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(insights)
    }
}

#[async_trait]
impl CompletionLogStore for InMemoryStore {
    async fn completion_log_insert(&self, log: &CompletionLog) -> TallyResult<()> {
        self.tables
            .write()
            .await
            .completion_logs
            .insert(log.id, log.clone());
        Ok(())
    }

    async fn completion_log_attach_response(
        &self,
        id: EntityId,
        response: serde_json::Value,
    ) -> TallyResult<()> {
        let mut tables = self.tables.write().await;
        let log = tables
            .completion_logs
            .get_mut(&id)
            .ok_or_else(|| StorageError::not_found(EntityType::CompletionLog, id))?;
        log.response = Some(response);
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tally_core::{
        ContextType, InsightStatus, NewSurvey, QuestionDraft, QuestionKind, SubmissionResponse,
        TallyError,
    };

    fn survey(token: &str) -> Survey {
        NewSurvey::new(
            "Store test",
            vec![QuestionDraft::new(QuestionKind::Likert, "Score")],
        )
        .into_survey(token.to_string(), Utc::now())
        .unwrap()
    }

    #[tokio::test]
    async fn test_token_uniqueness() {
        let store = InMemoryStore::new();
        store.survey_insert(&survey("same1")).await.unwrap();
        let err = store.survey_insert(&survey("same1")).await.unwrap_err();
        assert!(matches!(
            err,
            TallyError::Storage(StorageError::DuplicateToken)
        ));
        assert_eq!(store.survey_count().await, 1);
    }

    #[tokio::test]
    async fn test_get_by_token() {
        let store = InMemoryStore::new();
        let created = survey("tokA1");
        store.survey_insert(&created).await.unwrap();

        let fetched = store.survey_get_by_token("tokA1").await.unwrap();
        assert_eq!(fetched, Some(created));
        assert!(store.survey_get_by_token("nope0").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_survey_cascades() {
        let store = InMemoryStore::new();
        let target = survey("del01");
        let other = survey("keep1");
        store.survey_insert(&target).await.unwrap();
        store.survey_insert(&other).await.unwrap();

        for s in [&target, &other] {
            let response = SubmissionResponse::new(s.questions[0].id, "3");
            store
                .submission_insert(&Submission::new(s.id, vec![response], Utc::now()))
                .await
                .unwrap();
            store
                .insight_insert(&Insight::new(s.id, ContextType::CourseFeedback, vec![], Utc::now()))
                .await
                .unwrap();
        }

        assert!(store.survey_delete(target.id).await.unwrap());
        assert!(!store.survey_delete(target.id).await.unwrap());
        assert_eq!(store.submission_count().await, 1);
        assert_eq!(store.insight_count().await, 1);
        assert!(store.survey_get_by_token("del01").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_submission_list_filters_and_sorts() {
        let store = InMemoryStore::new();
        let a = survey("subsA");
        let b = survey("subsB");
        store.survey_insert(&a).await.unwrap();
        store.survey_insert(&b).await.unwrap();

        let base = Utc::now();
        let mut ids = Vec::new();
        for offset in 0..3 {
            let mut submission = Submission::new(
                a.id,
                vec![SubmissionResponse::new(a.questions[0].id, "1")],
                base + Duration::seconds(offset),
            );
            submission.updated_at = base + Duration::seconds(offset);
            ids.push(submission.id);
            store.submission_insert(&submission).await.unwrap();
        }
        store
            .submission_insert(&Submission::new(
                b.id,
                vec![SubmissionResponse::new(b.questions[0].id, "2")],
                base,
            ))
            .await
            .unwrap();

        let page = store
            .submission_list(Some(a.id), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(page.total, 3);
        let listed: Vec<EntityId> = page.items.iter().map(|s| s.id).collect();
        ids.reverse();
        assert_eq!(listed, ids);

        let everything = store
            .submission_list(None, PageRequest::new(0, 2))
            .await
            .unwrap();
        assert_eq!(everything.total, 4);
        assert_eq!(everything.items.len(), 2);
    }

    #[tokio::test]
    async fn test_submission_for_unknown_survey_rejected() {
        let store = InMemoryStore::new();
        let orphan = Submission::new(tally_core::new_entity_id(), vec![], Utc::now());
        assert!(store.submission_insert(&orphan).await.is_err());
    }

    #[tokio::test]
    async fn test_terminal_insight_is_immutable() {
        let store = InMemoryStore::new();
        let s = survey("ins01");
        store.survey_insert(&s).await.unwrap();

        let mut insight = Insight::new(s.id, ContextType::EventFeedback, vec![], Utc::now());
        store.insight_insert(&insight).await.unwrap();

        insight.start_processing(Utc::now()).unwrap();
        store.insight_update(&insight).await.unwrap();
        insight.complete("done".to_string(), Utc::now()).unwrap();
        store.insight_update(&insight).await.unwrap();

        let mut rewritten = insight.clone();
        rewritten.analysis = "rewritten".to_string();
        let err = store.insight_update(&rewritten).await.unwrap_err();
        assert!(matches!(err, TallyError::Lifecycle(_)));

        let stored = store.insight_get(insight.id).await.unwrap().unwrap();
        assert_eq!(stored.analysis, "done");
        assert_eq!(stored.status, InsightStatus::Completed);
        assert!(store.insight_list_unfinished().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_completion_log_response_attached() {
        let store = InMemoryStore::new();
        let log = CompletionLog::new(
            serde_json::json!({"model": "m"}),
            Some("insight:x batch:1".to_string()),
            Utc::now(),
        );
        store.completion_log_insert(&log).await.unwrap();
        store
            .completion_log_attach_response(log.id, serde_json::json!({"choices": []}))
            .await
            .unwrap();

        let logs = store.completion_logs().await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].response, Some(serde_json::json!({"choices": []})));

        let missing = store
            .completion_log_attach_response(tally_core::new_entity_id(), serde_json::json!({}))
            .await;
        assert!(missing.is_err());
    }
}
