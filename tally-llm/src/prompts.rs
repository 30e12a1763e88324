//! Prompt construction for insight summarization.

use crate::types::ChatMessage;
use std::fmt::Write;
use tally_core::{ContextType, EntityId, InsightBatch};

pub const META_PREAMBLE: &str = "Here are the summaries of different batches of answers:\n";

pub fn batch_system_prompt(context: ContextType) -> String {
    format!(
        "You are a helpful assistant. Summarize the following survey responses in the context of {}.",
        context.label()
    )
}

pub fn overall_system_prompt(context: ContextType) -> String {
    format!(
        "You are a helpful assistant. Analyze survey responses in the context of {}.",
        context.label()
    )
}

/// User payload for one batch: the question followed by either the raw
/// answers or the answer counts, both as JSON.
pub fn batch_payload(batch: &InsightBatch) -> String {
    let question = &batch.question.text;
    match (&batch.aggregated_answer, &batch.textual_answers) {
        (Some(counts), _) => format!(
            "Question: {}\nAggregated answers: {}",
            question,
            serde_json::to_string(counts).unwrap_or_else(|_| "{}".to_string())
        ),
        (None, Some(answers)) => format!(
            "Question: {}\nAnswers: {}",
            question,
            serde_json::to_string(answers).unwrap_or_else(|_| "[]".to_string())
        ),
        (None, None) => format!("Question: {}\nAnswers: []", question),
    }
}

/// User payload for the overall analysis: one line per batch, carrying its
/// summary or the error that prevented one.
pub fn overall_payload(batches: &[InsightBatch]) -> String {
    let mut payload = String::from(META_PREAMBLE);
    for batch in batches {
        let _ = write!(
            payload,
            "Batch {} (Question: {}): ",
            batch.batch_number, batch.question.text
        );
        match (&batch.summary, &batch.error) {
            (Some(summary), _) => payload.push_str(summary),
            (None, Some(error)) => {
                let _ = write!(payload, "Error: {}", error);
            }
            (None, None) => payload.push_str("Error: not summarized"),
        }
        payload.push('\n');
    }
    payload
}

pub fn batch_messages(context: ContextType, batch: &InsightBatch) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(batch_system_prompt(context)),
        ChatMessage::user(batch_payload(batch)),
    ]
}

pub fn overall_messages(context: ContextType, batches: &[InsightBatch]) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(overall_system_prompt(context)),
        ChatMessage::user(overall_payload(batches)),
    ]
}

pub fn batch_reference(insight_id: EntityId, batch_number: u32) -> String {
    format!("insight:{} batch:{}", insight_id, batch_number)
}

pub fn overall_reference(insight_id: EntityId) -> String {
    format!("insight:{} meta", insight_id)
}
