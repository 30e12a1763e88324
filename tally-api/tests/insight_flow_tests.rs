//! End-to-end insight processing through the router and the worker.
//!
//! Surveys and submissions go in over HTTP, the worker summarizes with a
//! scripted provider, and the caller polls until the insight settles.

use std::sync::Arc;
use std::time::Duration;

use axum::{http::StatusCode, Router};
use serde_json::{json, Value};
use tally_api::jobs::InsightWorkerMetrics;
use tally_api::{InsightWorker, WorkerConfig};
use tally_core::{Insight, InsightStatus, Survey};
use tally_test_utils::fixtures::{answer_all, demo_survey, feedback_survey};
use tally_test_utils::ScriptedSummarizer;
use tokio::sync::watch;
use tokio::task::JoinHandle;

#[path = "support/app.rs"]
mod app_support;
use app_support::{data, send, test_app, TestApp};

struct Running {
    router: Router,
    shutdown: watch::Sender<bool>,
    worker: JoinHandle<Arc<InsightWorkerMetrics>>,
}

fn start(scripted: &ScriptedSummarizer) -> Result<Running, String> {
    let TestApp {
        router,
        store,
        queue,
        jobs,
    } = test_app()?;
    let worker = InsightWorker::new(
        store,
        scripted.summarizer.clone(),
        queue,
        WorkerConfig::development(),
    );
    let (shutdown, shutdown_rx) = watch::channel(false);
    let worker = tokio::spawn(worker.run(jobs, shutdown_rx));
    Ok(Running {
        router,
        shutdown,
        worker,
    })
}

async fn create_survey(router: &Router, body: Value) -> Result<Survey, String> {
    let (status, created) = send(router, "POST", "/api/admin/surveys", Some(body), true).await?;
    if status != StatusCode::CREATED {
        return Err(format!("create survey: {} {}", status, created));
    }
    data(&created)
}

async fn submit_all(router: &Router, survey: &Survey, times: usize) -> Result<(), String> {
    for _ in 0..times {
        let body = json!({ "survey_token": survey.token, "responses": answer_all(survey) });
        let (status, body) = send(router, "POST", "/api/submissions", Some(body), false).await?;
        if status != StatusCode::CREATED {
            return Err(format!("submit: {} {}", status, body));
        }
    }
    Ok(())
}

/// Request an insight and poll until it reaches a terminal state.
async fn request_and_wait(router: &Router, survey: &Survey) -> Result<Insight, String> {
    let body = json!({ "survey_id": survey.id, "context_type": "PRODUCT_SATISFACTION" });
    let (status, created) = send(router, "POST", "/api/admin/insights", Some(body), true).await?;
    if status != StatusCode::CREATED {
        return Err(format!("request insight: {} {}", status, created));
    }
    let pending: Insight = data(&created)?;
    if pending.status != InsightStatus::Pending {
        return Err(format!("expected PENDING, got {}", pending.status));
    }

    let uri = format!("/api/admin/insights/{}", pending.id);
    for _ in 0..200 {
        let (_, body) = send(router, "GET", &uri, None, true).await?;
        let insight: Insight = data(&body)?;
        if insight.status.is_terminal() {
            return Ok(insight);
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    Err("insight never settled".to_string())
}

async fn stop(running: Running) -> Result<Arc<InsightWorkerMetrics>, String> {
    let _ = running.shutdown.send(true);
    running.worker.await.map_err(|e| e.to_string())
}

#[tokio::test]
async fn insight_completes_with_every_batch_summarized() -> Result<(), String> {
    let scripted = ScriptedSummarizer::new();
    let running = start(&scripted)?;
    let survey = create_survey(
        &running.router,
        serde_json::to_value(feedback_survey()).map_err(|e| e.to_string())?,
    )
    .await?;
    submit_all(&running.router, &survey, 3).await?;

    let insight = request_and_wait(&running.router, &survey).await?;
    assert_eq!(insight.status, InsightStatus::Completed);
    assert!(insight.completed_at.is_some());
    assert_eq!(insight.analysis, format!("Summary of insight:{} meta", insight.id));
    assert_eq!(insight.batches.len(), 3);
    for batch in &insight.batches {
        assert_eq!(
            batch.summary.as_deref(),
            Some(format!("Summary of insight:{} batch:{}", insight.id, batch.batch_number).as_str())
        );
    }
    assert_eq!(scripted.references().len(), 4);

    let metrics = stop(running).await?;
    assert_eq!(metrics.snapshot().completed, 1);
    Ok(())
}

#[tokio::test]
async fn insight_fails_when_the_overall_summary_fails() -> Result<(), String> {
    let scripted = ScriptedSummarizer::failing("meta");
    let running = start(&scripted)?;
    let survey = create_survey(
        &running.router,
        serde_json::to_value(demo_survey()).map_err(|e| e.to_string())?,
    )
    .await?;
    submit_all(&running.router, &survey, 1).await?;

    let insight = request_and_wait(&running.router, &survey).await?;
    assert_eq!(insight.status, InsightStatus::Failed);
    assert!(insight.completed_at.is_some());
    assert!(insight.error_log.as_deref().is_some_and(|e| !e.is_empty()));
    assert!(insight.analysis.is_empty());

    let metrics = stop(running).await?;
    assert_eq!(metrics.snapshot().failed, 1);
    Ok(())
}

#[tokio::test]
async fn batch_failure_is_recorded_and_processing_continues() -> Result<(), String> {
    let scripted = ScriptedSummarizer::failing("batch:2");
    let running = start(&scripted)?;
    let survey = create_survey(
        &running.router,
        serde_json::to_value(feedback_survey()).map_err(|e| e.to_string())?,
    )
    .await?;
    submit_all(&running.router, &survey, 2).await?;

    let insight = request_and_wait(&running.router, &survey).await?;
    assert_eq!(insight.status, InsightStatus::Completed);
    let failed = &insight.batches[1];
    assert!(failed.summary.is_none());
    assert!(failed.error.is_some());
    assert!(insight.batches[0].summary.is_some());
    assert!(insight.batches[2].summary.is_some());

    stop(running).await?;
    Ok(())
}

#[tokio::test]
async fn insight_over_zero_submissions_completes() -> Result<(), String> {
    let scripted = ScriptedSummarizer::new();
    let running = start(&scripted)?;
    let survey = create_survey(
        &running.router,
        serde_json::to_value(demo_survey()).map_err(|e| e.to_string())?,
    )
    .await?;

    let insight = request_and_wait(&running.router, &survey).await?;
    assert_eq!(insight.status, InsightStatus::Completed);
    assert!(insight.batches.iter().all(|b| b.answer_count() == 0));

    stop(running).await?;
    Ok(())
}
