//! One reconciliation pass over a component
//!
//! A pass observes the spec generation, generates the desired objects,
//! reconciles the inventory and aggregates the status. It never talks to
//! the cluster; the host applies the returned actions and persists the
//! returned status.

use chrono::{DateTime, Utc};

use cort_core::{Component, ComponentStatus, CoreError, DecodedObject};
use cort_engine::Generator;

use crate::error::{KubeError, Result};
use crate::reconcile::{Action, InventoryReconciler};
use crate::status::{AggregateInput, StatusAggregator, mark_applied_if_converged};

/// Result of a pass
#[derive(Debug)]
pub struct PassOutcome {
    /// Next status, to be persisted by the host
    pub status: ComponentStatus,
    /// Desired objects, in generation order
    pub objects: Vec<DecodedObject>,
    pub actions: Vec<Action>,
    /// Per-object failures that did not abort the pass
    pub errors: Vec<CoreError>,
    /// Fatal error; the inventory was left unchanged
    pub error: Option<KubeError>,
}

impl PassOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none() && self.errors.is_empty()
    }
}

/// Drives one pass for a component
#[derive(Debug, Clone, Copy, Default)]
pub struct ComponentPass {
    reconciler: InventoryReconciler,
    aggregator: StatusAggregator,
}

impl ComponentPass {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn run<C: Component + ?Sized>(
        &self,
        generator: &dyn Generator,
        component: &C,
        now: DateTime<Utc>,
    ) -> PassOutcome {
        let mut status = component.status().clone();
        status.observe(component.generation(), now);
        let deleting = component.is_deleting();

        let span = tracing::info_span!(
            "pass",
            namespace = component.deployment_namespace(),
            name = component.deployment_name(),
            generation = component.generation(),
        );
        let _enter = span.enter();

        let reconciled = self
            .desired(generator, component)
            .and_then(|objects| {
                let outcome = self.reconciler.reconcile(&status.inventory, &objects)?;
                Ok((objects, outcome))
            });

        let (objects, outcome) = match reconciled {
            Ok(result) => result,
            Err(error) => {
                tracing::warn!(error = %error, "pass aborted; inventory left unchanged");
                let input = AggregateInput::new(now)
                    .deleting(deleting)
                    .error(error.condition_message());
                self.aggregator.aggregate(&mut status, input);
                return PassOutcome {
                    status,
                    objects: Vec::new(),
                    actions: Vec::new(),
                    errors: Vec::new(),
                    error: Some(error),
                };
            }
        };

        status.inventory = outcome.inventory;

        let mut input = AggregateInput::new(now).deleting(deleting);
        if let Some(first) = outcome.errors.first() {
            input = input.error(first.to_string());
        } else if !deleting {
            mark_applied_if_converged(&mut status, now);
        }
        self.aggregator.aggregate(&mut status, input);

        PassOutcome {
            status,
            objects,
            actions: outcome.actions,
            errors: outcome.errors,
            error: None,
        }
    }

    /// Objects the component should own; none while it is being deleted
    fn desired<C: Component + ?Sized>(
        &self,
        generator: &dyn Generator,
        component: &C,
    ) -> Result<Vec<DecodedObject>> {
        if component.is_deleting() {
            tracing::debug!("component is being deleted; desiring no objects");
            return Ok(Vec::new());
        }

        let parameters = component.parameters()?;
        let objects = generator.generate(
            component.deployment_namespace(),
            component.deployment_name(),
            &parameters,
        )?;
        tracing::debug!(objects = objects.len(), "generated desired objects");
        Ok(objects)
    }
}
