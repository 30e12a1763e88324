//! Background Jobs for the Tally API
//!
//! - `insight_worker`: drives insights from PENDING to a terminal state by
//!   summarizing each batch and folding the summaries into one analysis.
//!
//! # Usage
//!
//! ```ignore
//! use tally_api::jobs::{InsightQueue, InsightWorker, WorkerConfig};
//! use tokio::sync::watch;
//!
//! let config = WorkerConfig::from_env()?;
//! let (queue, receiver) = InsightQueue::channel(config.queue_capacity);
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//!
//! let worker = InsightWorker::new(store, summarizer, queue.clone(), config);
//! tokio::spawn(worker.clone().run(receiver, shutdown_rx));
//! worker.recover_unfinished().await?;
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod insight_worker;

pub use insight_worker::{
    process_insight, InsightJob, InsightQueue, InsightWorker, InsightWorkerMetrics,
    InsightWorkerSnapshot, JobOutcome, WorkerConfig,
};
