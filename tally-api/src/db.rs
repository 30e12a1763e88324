//! Database Connection Pool Module
//!
//! PostgreSQL persistence for surveys, submissions, insights and completion
//! logs using deadpool-postgres. Questions, responses and batches are kept
//! as JSONB so their shape stays owned by `tally-core`.

use async_trait::async_trait;
use deadpool_postgres::{Config, ManagerConfig, Pool, PoolConfig, RecyclingMethod, Runtime};
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use tally_core::{
    ContextType, EntityId, EntityType, Insight, InsightStatus, LifecycleError, Page, PageRequest,
    StorageError, Submission, Survey, TallyError, TallyResult,
};
use tally_storage::{
    CompletionLog, CompletionLogStore, InsightStore, SubmissionStore, SurveyStore,
};
use tokio_postgres::error::SqlState;
use tokio_postgres::{NoTls, Row};

use crate::config::ApiConfig;

/// Idempotent schema bootstrap, run on every start.
pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS surveys (
    id          UUID PRIMARY KEY,
    token       TEXT NOT NULL,
    name        TEXT NOT NULL,
    questions   JSONB NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL,
    CONSTRAINT surveys_token_key UNIQUE (token)
);

CREATE TABLE IF NOT EXISTS submissions (
    id          UUID PRIMARY KEY,
    survey_id   UUID NOT NULL REFERENCES surveys(id) ON DELETE CASCADE,
    responses   JSONB NOT NULL,
    created_at  TIMESTAMPTZ NOT NULL,
    updated_at  TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS submissions_survey_id_idx ON submissions (survey_id);

CREATE TABLE IF NOT EXISTS insights (
    id            UUID PRIMARY KEY,
    survey_id     UUID NOT NULL REFERENCES surveys(id) ON DELETE CASCADE,
    context_type  TEXT NOT NULL,
    status        TEXT NOT NULL,
    analysis      TEXT NOT NULL DEFAULT '',
    batches       JSONB NOT NULL,
    error_log     TEXT,
    created_at    TIMESTAMPTZ NOT NULL,
    updated_at    TIMESTAMPTZ NOT NULL,
    completed_at  TIMESTAMPTZ
);
CREATE INDEX IF NOT EXISTS insights_survey_id_idx ON insights (survey_id);
CREATE INDEX IF NOT EXISTS insights_status_idx ON insights (status);

CREATE TABLE IF NOT EXISTS completion_logs (
    id          UUID PRIMARY KEY,
    request     JSONB NOT NULL,
    response    JSONB,
    reference   TEXT,
    created_at  TIMESTAMPTZ NOT NULL
);
"#;

const INSIGHT_COLUMNS: &str = "id, survey_id, context_type, status, analysis, batches, \
     error_log, created_at, updated_at, completed_at";

// ============================================================================
// CONNECTION POOL CONFIGURATION
// ============================================================================

/// Database connection pool configuration.
#[derive(Debug, Clone)]
pub struct DbConfig {
    /// Postgres connection URL
    pub url: SecretString,
    /// Maximum pool size
    pub max_size: usize,
}

impl DbConfig {
    pub fn new(url: SecretString, max_size: usize) -> Self {
        Self { url, max_size }
    }

    /// `None` when no `DATABASE_URL` is configured.
    pub fn from_api_config(config: &ApiConfig) -> Option<Self> {
        config
            .database_url
            .clone()
            .map(|url| Self::new(url, config.db_pool_size))
    }

    /// Create a connection pool from this configuration.
    pub fn create_pool(&self) -> TallyResult<Pool> {
        let mut cfg = Config::new();
        cfg.url = Some(self.url.expose_secret().to_string());
        cfg.pool = Some(PoolConfig::new(self.max_size.max(1)));
        cfg.manager = Some(ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        });

        cfg.create_pool(Some(Runtime::Tokio1), NoTls).map_err(|e| {
            StorageError::ConnectionFailed {
                reason: format!("Failed to create pool: {}", e),
            }
            .into()
        })
    }
}

// ============================================================================
// POSTGRES STORE
// ============================================================================

/// Store implementation over a Postgres connection pool. Cheap to clone.
#[derive(Clone)]
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Create the pool and make sure the schema exists.
    pub async fn connect(config: &DbConfig) -> TallyResult<Self> {
        let store = Self::new(config.create_pool()?);
        store.bootstrap().await?;
        Ok(store)
    }

    pub async fn bootstrap(&self) -> TallyResult<()> {
        let conn = self.get_conn().await?;
        conn.batch_execute(SCHEMA)
            .await
            .map_err(|e| connection_failed(&e))?;
        tracing::info!("Database schema ready");
        Ok(())
    }

    /// Get the current pool size for observability.
    pub fn pool_size(&self) -> usize {
        self.pool.status().size
    }

    async fn get_conn(&self) -> TallyResult<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            StorageError::ConnectionFailed {
                reason: e.to_string(),
            }
            .into()
        })
    }
}

// ============================================================================
// ERROR AND ROW HELPERS
// ============================================================================

fn connection_failed(err: &tokio_postgres::Error) -> TallyError {
    StorageError::ConnectionFailed {
        reason: err.to_string(),
    }
    .into()
}

fn insert_failed(entity_type: EntityType, err: &tokio_postgres::Error) -> TallyError {
    if let Some(db) = err.as_db_error() {
        if *db.code() == SqlState::UNIQUE_VIOLATION
            && db.constraint() == Some("surveys_token_key")
        {
            return StorageError::DuplicateToken.into();
        }
    }
    if err.is_closed() {
        return connection_failed(err);
    }
    StorageError::InsertFailed {
        entity_type,
        reason: err.to_string(),
    }
    .into()
}

fn is_foreign_key_violation(err: &tokio_postgres::Error) -> bool {
    err.code() == Some(&SqlState::FOREIGN_KEY_VIOLATION)
}

fn to_json<T: Serialize>(entity_type: EntityType, value: &T) -> TallyResult<JsonValue> {
    serde_json::to_value(value).map_err(|e| {
        StorageError::InsertFailed {
            entity_type,
            reason: e.to_string(),
        }
        .into()
    })
}

fn column<'a, T>(row: &'a Row, entity_type: EntityType, name: &str) -> TallyResult<T>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get(name).map_err(|e| {
        StorageError::Corrupt {
            entity_type,
            reason: format!("column {}: {}", name, e),
        }
        .into()
    })
}

fn json_column<T: DeserializeOwned>(
    row: &Row,
    entity_type: EntityType,
    name: &str,
) -> TallyResult<T> {
    let value: JsonValue = column(row, entity_type, name)?;
    serde_json::from_value(value).map_err(|e| {
        StorageError::Corrupt {
            entity_type,
            reason: format!("column {}: {}", name, e),
        }
        .into()
    })
}

fn survey_from_row(row: &Row) -> TallyResult<Survey> {
    let et = EntityType::Survey;
    Ok(Survey {
        id: column(row, et, "id")?,
        token: column(row, et, "token")?,
        name: column(row, et, "name")?,
        questions: json_column(row, et, "questions")?,
        created_at: column(row, et, "created_at")?,
        updated_at: column(row, et, "updated_at")?,
    })
}

fn submission_from_row(row: &Row) -> TallyResult<Submission> {
    let et = EntityType::Submission;
    Ok(Submission {
        id: column(row, et, "id")?,
        survey_id: column(row, et, "survey_id")?,
        responses: json_column(row, et, "responses")?,
        created_at: column(row, et, "created_at")?,
        updated_at: column(row, et, "updated_at")?,
    })
}

fn insight_from_row(row: &Row) -> TallyResult<Insight> {
    let et = EntityType::Insight;
    let corrupt = |reason: String| -> TallyError {
        StorageError::Corrupt {
            entity_type: et,
            reason,
        }
        .into()
    };
    let context_type: String = column(row, et, "context_type")?;
    let status: String = column(row, et, "status")?;
    Ok(Insight {
        id: column(row, et, "id")?,
        survey_id: column(row, et, "survey_id")?,
        context_type: ContextType::from_db_str(&context_type)
            .map_err(|e| corrupt(e.to_string()))?,
        status: InsightStatus::from_db_str(&status).map_err(|e| corrupt(e.to_string()))?,
        analysis: column(row, et, "analysis")?,
        batches: json_column(row, et, "batches")?,
        error_log: column(row, et, "error_log")?,
        created_at: column(row, et, "created_at")?,
        updated_at: column(row, et, "updated_at")?,
        completed_at: column(row, et, "completed_at")?,
    })
}

/// Page bounds as SQL parameters.
fn window(page: PageRequest) -> (i64, i64) {
    let to_i64 = |v: usize| i64::try_from(v).unwrap_or(i64::MAX);
    (to_i64(page.limit()), to_i64(page.offset()))
}

fn count_from_row(row: &Row, entity_type: EntityType) -> TallyResult<u64> {
    let total: i64 = column(row, entity_type, "total")?;
    Ok(u64::try_from(total).unwrap_or(0))
}

// ============================================================================
// STORE IMPLEMENTATIONS
// ============================================================================

#[async_trait]
impl SurveyStore for PgStore {
    async fn survey_insert(&self, survey: &Survey) -> TallyResult<()> {
        let conn = self.get_conn().await?;
        let questions = to_json(EntityType::Survey, &survey.questions)?;
        conn.execute(
            "INSERT INTO surveys (id, token, name, questions, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6)",
            &[
                &survey.id,
                &survey.token,
                &survey.name,
                &questions,
                &survey.created_at,
                &survey.updated_at,
            ],
        )
        .await
        .map_err(|e| insert_failed(EntityType::Survey, &e))?;
        Ok(())
    }

    async fn survey_get(&self, id: EntityId) -> TallyResult<Option<Survey>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT id, token, name, questions, created_at, updated_at \
                 FROM surveys WHERE id = $1",
                &[&id],
            )
            .await
            .map_err(|e| connection_failed(&e))?;
        row.as_ref().map(survey_from_row).transpose()
    }

    async fn survey_get_by_token(&self, token: &str) -> TallyResult<Option<Survey>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT id, token, name, questions, created_at, updated_at \
                 FROM surveys WHERE token = $1",
                &[&token],
            )
            .await
            .map_err(|e| connection_failed(&e))?;
        row.as_ref().map(survey_from_row).transpose()
    }

    async fn survey_list(&self, page: PageRequest) -> TallyResult<Page<Survey>> {
        let conn = self.get_conn().await?;
        let (limit, offset) = window(page);
        let rows = conn
            .query(
                "SELECT id, token, name, questions, created_at, updated_at FROM surveys \
                 ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2",
                &[&limit, &offset],
            )
            .await
            .map_err(|e| connection_failed(&e))?;
        let count = conn
            .query_one("SELECT COUNT(*) AS total FROM surveys", &[])
            .await
            .map_err(|e| connection_failed(&e))?;

        Ok(Page {
            items: rows.iter().map(survey_from_row).collect::<TallyResult<_>>()?,
            total: count_from_row(&count, EntityType::Survey)?,
        })
    }

    async fn survey_delete(&self, id: EntityId) -> TallyResult<bool> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute("DELETE FROM surveys WHERE id = $1", &[&id])
            .await
            .map_err(|e| connection_failed(&e))?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl SubmissionStore for PgStore {
    async fn submission_insert(&self, submission: &Submission) -> TallyResult<()> {
        let conn = self.get_conn().await?;
        let responses = to_json(EntityType::Submission, &submission.responses)?;
        conn.execute(
            "INSERT INTO submissions (id, survey_id, responses, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5)",
            &[
                &submission.id,
                &submission.survey_id,
                &responses,
                &submission.created_at,
                &submission.updated_at,
            ],
        )
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StorageError::not_found(EntityType::Survey, submission.survey_id).into()
            } else {
                insert_failed(EntityType::Submission, &e)
            }
        })?;
        Ok(())
    }

    async fn submission_get(&self, id: EntityId) -> TallyResult<Option<Submission>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                "SELECT id, survey_id, responses, created_at, updated_at \
                 FROM submissions WHERE id = $1",
                &[&id],
            )
            .await
            .map_err(|e| connection_failed(&e))?;
        row.as_ref().map(submission_from_row).transpose()
    }

    async fn submission_list(
        &self,
        survey_id: Option<EntityId>,
        page: PageRequest,
    ) -> TallyResult<Page<Submission>> {
        let conn = self.get_conn().await?;
        let (limit, offset) = window(page);
        let rows = conn
            .query(
                "SELECT id, survey_id, responses, created_at, updated_at FROM submissions \
                 WHERE ($1::uuid IS NULL OR survey_id = $1) \
                 ORDER BY updated_at DESC, created_at DESC, id DESC LIMIT $2 OFFSET $3",
                &[&survey_id, &limit, &offset],
            )
            .await
            .map_err(|e| connection_failed(&e))?;
        let count = conn
            .query_one(
                "SELECT COUNT(*) AS total FROM submissions \
                 WHERE ($1::uuid IS NULL OR survey_id = $1)",
                &[&survey_id],
            )
            .await
            .map_err(|e| connection_failed(&e))?;

        Ok(Page {
            items: rows
                .iter()
                .map(submission_from_row)
                .collect::<TallyResult<_>>()?,
            total: count_from_row(&count, EntityType::Submission)?,
        })
    }

    async fn submission_list_all(&self, survey_id: EntityId) -> TallyResult<Vec<Submission>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                "SELECT id, survey_id, responses, created_at, updated_at FROM submissions \
                 WHERE survey_id = $1 ORDER BY created_at ASC, id ASC",
                &[&survey_id],
            )
            .await
            .map_err(|e| connection_failed(&e))?;
        rows.iter().map(submission_from_row).collect()
    }

    async fn submission_delete(&self, id: EntityId) -> TallyResult<bool> {
        let conn = self.get_conn().await?;
        let deleted = conn
            .execute("DELETE FROM submissions WHERE id = $1", &[&id])
            .await
            .map_err(|e| connection_failed(&e))?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl InsightStore for PgStore {
    async fn insight_insert(&self, insight: &Insight) -> TallyResult<()> {
        let conn = self.get_conn().await?;
        let batches = to_json(EntityType::Insight, &insight.batches)?;
        conn.execute(
            &format!(
                "INSERT INTO insights ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
                INSIGHT_COLUMNS
            ),
            &[
                &insight.id,
                &insight.survey_id,
                &insight.context_type.as_db_str(),
                &insight.status.as_db_str(),
                &insight.analysis,
                &batches,
                &insight.error_log,
                &insight.created_at,
                &insight.updated_at,
                &insight.completed_at,
            ],
        )
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                StorageError::not_found(EntityType::Survey, insight.survey_id).into()
            } else {
                insert_failed(EntityType::Insight, &e)
            }
        })?;
        Ok(())
    }

    async fn insight_get(&self, id: EntityId) -> TallyResult<Option<Insight>> {
        let conn = self.get_conn().await?;
        let row = conn
            .query_opt(
                &format!("SELECT {} FROM insights WHERE id = $1", INSIGHT_COLUMNS),
                &[&id],
            )
            .await
            .map_err(|e| connection_failed(&e))?;
        row.as_ref().map(insight_from_row).transpose()
    }

    async fn insight_update(&self, insight: &Insight) -> TallyResult<()> {
        let conn = self.get_conn().await?;
        let batches = to_json(EntityType::Insight, &insight.batches)?;
        // Terminal rows are never rewritten.
        let updated = conn
            .execute(
                "UPDATE insights SET status = $2, analysis = $3, batches = $4, error_log = $5, \
                 updated_at = $6, completed_at = $7 \
                 WHERE id = $1 AND status NOT IN ('COMPLETED', 'FAILED')",
                &[
                    &insight.id,
                    &insight.status.as_db_str(),
                    &insight.analysis,
                    &batches,
                    &insight.error_log,
                    &insight.updated_at,
                    &insight.completed_at,
                ],
            )
            .await
            .map_err(|e| {
                TallyError::from(StorageError::UpdateFailed {
                    entity_type: EntityType::Insight,
                    id: insight.id.to_string(),
                    reason: e.to_string(),
                })
            })?;
        if updated > 0 {
            return Ok(());
        }

        let stored = conn
            .query_opt("SELECT status FROM insights WHERE id = $1", &[&insight.id])
            .await
            .map_err(|e| connection_failed(&e))?;
        match stored {
            None => Err(StorageError::not_found(EntityType::Insight, insight.id).into()),
            Some(row) => {
                let status: String = column(&row, EntityType::Insight, "status")?;
                let from = InsightStatus::from_db_str(&status).map_err(|e| {
                    TallyError::from(StorageError::Corrupt {
                        entity_type: EntityType::Insight,
                        reason: e.to_string(),
                    })
                })?;
                Err(LifecycleError::InvalidTransition {
                    from,
                    to: insight.status,
                }
                .into())
            }
        }
    }

    async fn insight_list(
        &self,
        survey_id: Option<EntityId>,
        page: PageRequest,
    ) -> TallyResult<Page<Insight>> {
        let conn = self.get_conn().await?;
        let (limit, offset) = window(page);
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM insights WHERE ($1::uuid IS NULL OR survey_id = $1) \
                     ORDER BY completed_at DESC NULLS LAST, updated_at DESC, created_at DESC, \
                     id DESC LIMIT $2 OFFSET $3",
                    INSIGHT_COLUMNS
                ),
                &[&survey_id, &limit, &offset],
            )
            .await
            .map_err(|e| connection_failed(&e))?;
        let count = conn
            .query_one(
                "SELECT COUNT(*) AS total FROM insights \
                 WHERE ($1::uuid IS NULL OR survey_id = $1)",
                &[&survey_id],
            )
            .await
            .map_err(|e| connection_failed(&e))?;

        Ok(Page {
            items: rows.iter().map(insight_from_row).collect::<TallyResult<_>>()?,
            total: count_from_row(&count, EntityType::Insight)?,
        })
    }

    async fn insight_list_unfinished(&self) -> TallyResult<Vec<Insight>> {
        let conn = self.get_conn().await?;
        let rows = conn
            .query(
                &format!(
                    "SELECT {} FROM insights WHERE status IN ('PENDING', 'PROCESSING') \
                     ORDER BY created_at ASC, id ASC",
                    INSIGHT_COLUMNS
                ),
                &[],
            )
            .await
            .map_err(|e| connection_failed(&e))?;
        rows.iter().map(insight_from_row).collect()
    }
}

#[async_trait]
impl CompletionLogStore for PgStore {
    async fn completion_log_insert(&self, log: &CompletionLog) -> TallyResult<()> {
        let conn = self.get_conn().await?;
        conn.execute(
            "INSERT INTO completion_logs (id, request, response, reference, created_at) \
             VALUES ($1, $2, $3, $4, $5)",
            &[
                &log.id,
                &log.request,
                &log.response,
                &log.reference,
                &log.created_at,
            ],
        )
        .await
        .map_err(|e| insert_failed(EntityType::CompletionLog, &e))?;
        Ok(())
    }

    async fn completion_log_attach_response(
        &self,
        id: EntityId,
        response: JsonValue,
    ) -> TallyResult<()> {
        let conn = self.get_conn().await?;
        let updated = conn
            .execute(
                "UPDATE completion_logs SET response = $2 WHERE id = $1",
                &[&id, &response],
            )
            .await
            .map_err(|e| connection_failed(&e))?;
        if updated == 0 {
            return Err(StorageError::not_found(EntityType::CompletionLog, id).into());
        }
        Ok(())
    }
}
