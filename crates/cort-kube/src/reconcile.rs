//! Inventory reconciliation
//!
//! Diffs the freshly generated objects against the inventory of the previous
//! pass. The reconciler is a pure function: it performs no I/O and only
//! schedules work, which the external applier carries out and reports back
//! through [`cort_core::InventoryItem::advance`].

use serde::Serialize;
use std::collections::HashSet;
use std::fmt;

use cort_core::{
    CoreError, DecodedObject, InventoryItem, ObjectKey, Phase, digest_object, ensure_unique,
};

use crate::error::Result;

/// Work the applier has to carry out for one object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ActionKind {
    Create,
    Update,
    Delete,
    Complete,
    /// The item was dropped from the inventory
    Purge,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
            ActionKind::Complete => "complete",
            ActionKind::Purge => "purge",
        };
        f.write_str(s)
    }
}

impl ActionKind {
    /// Action implied by an item's phase; `None` when nothing is pending
    pub fn for_phase(phase: Phase) -> Option<Self> {
        match phase {
            Phase::ScheduledForApplication | Phase::Creating => Some(ActionKind::Create),
            Phase::Updating => Some(ActionKind::Update),
            Phase::ScheduledForDeletion | Phase::Deleting => Some(ActionKind::Delete),
            Phase::ScheduledForCompletion | Phase::Completing => Some(ActionKind::Complete),
            Phase::Ready | Phase::Completed => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Action {
    pub key: ObjectKey,
    pub kind: ActionKind,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind, self.key)
    }
}

/// Result of one reconciliation
#[derive(Debug)]
pub struct ReconcileOutcome {
    /// Next inventory, in stable order
    pub inventory: Vec<InventoryItem>,
    /// Pending work, in inventory order; purges come first
    pub actions: Vec<Action>,
    /// Per-object digest failures; the affected items were left unchanged
    pub errors: Vec<CoreError>,
}

impl ReconcileOutcome {
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Actions of one kind
    pub fn actions_of(&self, kind: ActionKind) -> impl Iterator<Item = &Action> {
        self.actions.iter().filter(move |a| a.kind == kind)
    }
}

/// Computes the next inventory from the previous one and the desired objects
#[derive(Debug, Clone, Copy, Default)]
pub struct InventoryReconciler;

impl InventoryReconciler {
    pub fn new() -> Self {
        Self
    }

    /// Reconcile `previous` against `desired`
    ///
    /// * completed items are purged
    /// * active items whose body changed move to `Updating` with the new digest
    /// * active items no longer desired move to `ScheduledForDeletion`
    /// * items in removal or completion phases keep their phase, even when
    ///   desired again; the object is re-created after the item is purged
    /// * new objects are appended in generation order as
    ///   `ScheduledForApplication`
    ///
    /// Fails only on duplicate identities in `desired`.
    pub fn reconcile(
        &self,
        previous: &[InventoryItem],
        desired: &[DecodedObject],
    ) -> Result<ReconcileOutcome> {
        ensure_unique(desired)?;

        let mut inventory = Vec::with_capacity(previous.len() + desired.len());
        let mut actions = Vec::new();
        let mut errors = Vec::new();
        let mut known: HashSet<ObjectKey> = HashSet::with_capacity(previous.len());

        for item in previous {
            let key = item.key();

            if item.phase.is_terminal() {
                tracing::debug!(object = %key, "purging completed inventory item");
                actions.push(Action {
                    key,
                    kind: ActionKind::Purge,
                });
                continue;
            }

            let mut next = item.clone();
            match desired.iter().find(|object| item.matches(object.key())) {
                Some(object) if next.phase.is_active() => match digest_object(object) {
                    Ok(digest) if digest != next.digest => {
                        next.digest = digest;
                        next.managed_types = cort_core::managed_types_of(object);
                        if next.phase != Phase::ScheduledForApplication {
                            next.phase = Phase::Updating;
                        }
                        tracing::debug!(object = %key, from = %item.phase, to = %next.phase, "object changed");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(object = %key, error = %e, "digest failed; item left unchanged");
                        errors.push(e);
                    }
                },
                Some(_) => {
                    tracing::debug!(object = %key, phase = %next.phase, "object desired again while being removed");
                }
                None if next.phase.is_active() => {
                    next.phase = Phase::ScheduledForDeletion;
                    tracing::debug!(object = %key, from = %item.phase, "object no longer desired");
                }
                None => {}
            }

            known.insert(key);
            inventory.push(next);
        }

        for object in desired {
            if known.contains(object.key()) {
                continue;
            }
            match digest_object(object) {
                Ok(digest) => {
                    tracing::debug!(object = %object.key(), "new object scheduled");
                    inventory.push(InventoryItem::scheduled(object, digest));
                }
                Err(e) => {
                    tracing::warn!(object = %object.key(), error = %e, "digest failed; object not scheduled");
                    errors.push(e);
                }
            }
        }

        actions.extend(inventory.iter().filter_map(|item| {
            ActionKind::for_phase(item.phase).map(|kind| Action {
                key: item.key(),
                kind,
            })
        }));

        tracing::info!(
            desired = desired.len(),
            inventory = inventory.len(),
            actions = actions.len(),
            errors = errors.len(),
            "reconciled inventory"
        );

        Ok(ReconcileOutcome {
            inventory,
            actions,
            errors,
        })
    }
}
