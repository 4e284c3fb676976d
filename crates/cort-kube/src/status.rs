//! Component state from the inventory

use chrono::{DateTime, Utc};

use cort_core::{ComponentStatus, ConditionStatus, ConditionType, InventoryItem, State};

pub const REASON_ERROR: &str = "Error";
pub const REASON_DELETING: &str = "Deleting";
pub const REASON_READY: &str = "Ready";
pub const REASON_PROCESSING: &str = "Processing";

/// Inputs of one aggregation besides the status itself
#[derive(Debug, Clone)]
pub struct AggregateInput {
    /// The component is being deleted
    pub deleting: bool,
    /// Fatal error of the current pass
    pub error: Option<String>,
    pub now: DateTime<Utc>,
}

impl AggregateInput {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            deleting: false,
            error: None,
            now,
        }
    }

    pub fn deleting(mut self, deleting: bool) -> Self {
        self.deleting = deleting;
        self
    }

    pub fn error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Derives the component state and Ready condition
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusAggregator;

impl StatusAggregator {
    pub fn new() -> Self {
        Self
    }

    /// Update `state` and the Ready condition of `status`
    ///
    /// Precedence is Error, then Deleting, then Ready, else Processing.
    pub fn aggregate(&self, status: &mut ComponentStatus, input: AggregateInput) -> State {
        let (state, condition, reason, message) = evaluate(status, &input);

        if status.state != state {
            tracing::info!(from = %status.state, to = %state, reason, "component state changed");
        }

        status.state = state;
        status.set_condition(ConditionType::Ready, condition, reason, message, input.now);
        state
    }
}

fn evaluate(
    status: &ComponentStatus,
    input: &AggregateInput,
) -> (State, ConditionStatus, &'static str, String) {
    let inventory = &status.inventory;

    if let Some(error) = &input.error {
        return (State::Error, ConditionStatus::False, REASON_ERROR, error.clone());
    }

    let failed: Vec<String> = inventory
        .iter()
        .filter(|item| item.status.is_some_and(|s| s.is_failure()))
        .map(|item| item.key().to_string())
        .collect();
    if !failed.is_empty() {
        return (
            State::Error,
            ConditionStatus::False,
            REASON_ERROR,
            format!("{} failed: {}", plural(failed.len()), failed.join(", ")),
        );
    }

    if input.deleting
        && inventory
            .iter()
            .all(|item| item.phase.is_removal() || item.phase.is_completion())
    {
        let message = if inventory.is_empty() {
            "all dependent objects removed".to_string()
        } else {
            format!("{} pending removal", plural(inventory.len()))
        };
        return (State::Deleting, ConditionStatus::False, REASON_DELETING, message);
    }

    if !input.deleting && inventory.iter().all(InventoryItem::is_ready) && !status.is_stale() {
        return (
            State::Ready,
            ConditionStatus::True,
            REASON_READY,
            format!("{} ready", plural(inventory.len())),
        );
    }

    let pending = inventory.iter().filter(|item| !item.is_ready()).count();
    let condition = if status.last_applied_at.is_none() {
        ConditionStatus::Unknown
    } else {
        ConditionStatus::False
    };
    let message = if pending == 0 {
        format!("generation {} not yet applied", status.observed_generation)
    } else {
        format!("{} of {} pending", pending, plural(inventory.len()))
    };
    (State::Processing, condition, REASON_PROCESSING, message)
}

fn plural(count: usize) -> String {
    if count == 1 {
        "1 object".to_string()
    } else {
        format!("{} objects", count)
    }
}

/// Record the observed generation as applied once every item is ready
///
/// Returns whether the status was updated.
pub fn mark_applied_if_converged(status: &mut ComponentStatus, now: DateTime<Utc>) -> bool {
    if status.is_stale() && status.inventory.iter().all(InventoryItem::is_ready) {
        status.mark_applied(now);
        return true;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use cort_core::{DecodedObject, ObjectStatus, Phase};
    use serde_json::json;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn item(name: &str, phase: Phase) -> InventoryItem {
        let object = DecodedObject::from_value(json!({
            "apiVersion": "v1",
            "kind": "ConfigMap",
            "metadata": {"name": name, "namespace": "apps"}
        }))
        .unwrap();
        let mut item = InventoryItem::scheduled(&object, "d".into());
        item.phase = phase;
        item
    }

    fn status_with(items: Vec<InventoryItem>) -> ComponentStatus {
        let mut status = ComponentStatus::default();
        status.observe(1, at(1));
        status.inventory = items;
        status
    }

    #[test]
    fn test_processing_before_first_apply() {
        let mut status = status_with(vec![item("a", Phase::ScheduledForApplication)]);
        let state = StatusAggregator::new().aggregate(&mut status, AggregateInput::new(at(2)));

        assert_eq!(state, State::Processing);
        let cond = status.ready_condition().unwrap();
        assert_eq!(cond.status, ConditionStatus::Unknown);
        assert_eq!(cond.reason, "Processing");
        assert_eq!(cond.message, "1 of 1 object pending");
    }

    #[test]
    fn test_ready_requires_applied_generation() {
        let mut status = status_with(vec![item("a", Phase::Ready), item("b", Phase::Ready)]);
        let aggregator = StatusAggregator::new();

        assert_eq!(
            aggregator.aggregate(&mut status, AggregateInput::new(at(2))),
            State::Processing
        );
        assert_eq!(status.ready_condition().unwrap().message, "generation 1 not yet applied");

        assert!(mark_applied_if_converged(&mut status, at(3)));
        assert_eq!(
            aggregator.aggregate(&mut status, AggregateInput::new(at(4))),
            State::Ready
        );
        let cond = status.ready_condition().unwrap();
        assert_eq!(cond.status, ConditionStatus::True);
        assert_eq!(cond.message, "2 objects ready");
        assert_eq!(cond.last_transition_time, Some(at(4)));
    }

    #[test]
    fn test_pass_error_wins() {
        let mut status = status_with(vec![item("a", Phase::Ready)]);
        status.mark_applied(at(1));

        let state = StatusAggregator::new().aggregate(
            &mut status,
            AggregateInput::new(at(2)).error("template 'cm.yaml' failed"),
        );
        assert_eq!(state, State::Error);
        let cond = status.ready_condition().unwrap();
        assert_eq!(cond.status, ConditionStatus::False);
        assert_eq!(cond.reason, "Error");
        assert_eq!(cond.message, "template 'cm.yaml' failed");
    }

    #[test]
    fn test_failed_object_status() {
        let mut failing = item("b", Phase::Ready);
        failing.record_status(ObjectStatus::Failed);
        let mut status = status_with(vec![item("a", Phase::Ready), failing]);

        let state = StatusAggregator::new().aggregate(&mut status, AggregateInput::new(at(2)));
        assert_eq!(state, State::Error);
        assert_eq!(
            status.ready_condition().unwrap().message,
            "1 object failed: v1/ConfigMap apps/b"
        );
    }

    #[test]
    fn test_deleting() {
        let mut status = status_with(vec![
            item("a", Phase::Deleting),
            item("b", Phase::ScheduledForCompletion),
        ]);
        let state = StatusAggregator::new()
            .aggregate(&mut status, AggregateInput::new(at(2)).deleting(true));

        assert_eq!(state, State::Deleting);
        assert_eq!(status.ready_condition().unwrap().reason, "Deleting");
        assert_eq!(status.ready_condition().unwrap().message, "2 objects pending removal");
    }

    #[test]
    fn test_deleting_with_active_items_is_processing() {
        let mut status = status_with(vec![item("a", Phase::Ready)]);
        status.mark_applied(at(1));

        let state = StatusAggregator::new()
            .aggregate(&mut status, AggregateInput::new(at(2)).deleting(true));
        assert_eq!(state, State::Processing);
    }

    #[test]
    fn test_not_converged_is_left_alone() {
        let mut status = status_with(vec![item("a", Phase::Creating)]);
        assert!(!mark_applied_if_converged(&mut status, at(2)));
        assert_eq!(status.applied_generation, 0);
        assert!(status.last_applied_at.is_none());
    }
}
