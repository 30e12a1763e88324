//! Tally Storage - Storage Traits and In-Memory Implementation
//!
//! Defines the persistence seams for surveys, submissions, insights and
//! completion logs. The Postgres implementation lives in `tally-api`.

pub mod async_trait;
pub mod memory;
pub mod ordering;

pub use async_trait::{
    CompletionLogStore, InsightStore, Store, SubmissionStore, SurveyStore,
};
pub use memory::InMemoryStore;

use serde::{Deserialize, Serialize};
use tally_core::{EntityId, Timestamp};

/// Audit record of one chat-completion call.
///
/// Request and response are kept as raw JSON so the log survives changes to
/// the provider's payload types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionLog {
    pub id: EntityId,
    pub request: serde_json::Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<serde_json::Value>,
    #[serde(default)]
    pub reference: Option<String>,
    pub created_at: Timestamp,
}

impl CompletionLog {
    pub fn new(request: serde_json::Value, reference: Option<String>, now: Timestamp) -> Self {
        Self {
            id: tally_core::new_entity_id(),
            request,
            response: None,
            reference,
            created_at: now,
        }
    }
}
