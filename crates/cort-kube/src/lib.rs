//! Cort Kube - Inventory lifecycle for component operators
//!
//! This crate provides:
//! - **Inventory Reconciler**: Diffs generated objects against the previous inventory
//! - **Status Aggregator**: Derives the component state and Ready condition
//! - **Component Pass**: Runs generation, reconciliation and aggregation for one component
//! - **Kube Object Store**: Read-only template lookups against a live cluster

pub mod client;
pub mod error;
pub mod pass;
pub mod reconcile;
pub mod status;

pub use client::KubeObjectStore;
pub use error::{KubeError, Result};
pub use pass::{ComponentPass, PassOutcome};
pub use reconcile::{Action, ActionKind, InventoryReconciler, ReconcileOutcome};
pub use status::{AggregateInput, StatusAggregator, mark_applied_if_converged};
