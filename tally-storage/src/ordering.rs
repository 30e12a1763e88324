//! Sort orders for list queries, shared by every store implementation.

use std::cmp::Ordering;
use tally_core::{Insight, Submission, Survey};

/// Newest survey first.
pub fn survey_order(a: &Survey, b: &Survey) -> Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.id.cmp(&a.id))
}

/// Most recently updated submission first.
pub fn submission_order(a: &Submission, b: &Submission) -> Ordering {
    b.updated_at
        .cmp(&a.updated_at)
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| b.id.cmp(&a.id))
}

/// Most recently completed insight first; unfinished ones after all finished
/// ones, then by update and creation time.
pub fn insight_order(a: &Insight, b: &Insight) -> Ordering {
    b.completed_at
        .cmp(&a.completed_at)
        .then_with(|| b.updated_at.cmp(&a.updated_at))
        .then_with(|| b.created_at.cmp(&a.created_at))
        .then_with(|| b.id.cmp(&a.id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use tally_core::{new_entity_id, ContextType};

    #[test]
    fn test_insight_order_puts_completed_first() {
        let now = Utc::now();
        let survey_id = new_entity_id();

        let mut done_early = Insight::new(survey_id, ContextType::EventFeedback, vec![], now);
        done_early.start_processing(now).unwrap();
        done_early.complete("a".into(), now + Duration::seconds(1)).unwrap();

        let mut done_late = Insight::new(survey_id, ContextType::EventFeedback, vec![], now);
        done_late.start_processing(now).unwrap();
        done_late.complete("b".into(), now + Duration::seconds(9)).unwrap();

        let pending = Insight::new(
            survey_id,
            ContextType::EventFeedback,
            vec![],
            now + Duration::seconds(20),
        );

        let mut all = vec![pending.clone(), done_early.clone(), done_late.clone()];
        all.sort_by(insight_order);
        let ids: Vec<_> = all.iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![done_late.id, done_early.id, pending.id]);
    }
}
