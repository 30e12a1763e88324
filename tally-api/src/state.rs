//! Shared application state for Axum routers.

use std::sync::Arc;
use std::time::Instant;

use tally_storage::Store;

use crate::jobs::InsightQueue;
use crate::middleware::AdminAuth;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn Store>,
    /// Producer side of the insight worker queue.
    pub insights: InsightQueue,
    pub admin: AdminAuth,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(store: Arc<dyn Store>, insights: InsightQueue, admin: AdminAuth) -> Self {
        Self {
            store,
            insights,
            admin,
            start_time: Instant::now(),
        }
    }
}

crate::impl_from_ref!(Arc<dyn Store>, store);
crate::impl_from_ref!(InsightQueue, insights);
crate::impl_from_ref!(AdminAuth, admin);
crate::impl_from_ref!(Instant, start_time);
