//! Component status: generations, conditions, state and inventory

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::inventory::InventoryItem;

/// Condition type. Only `Ready` is used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionType {
    Ready,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

/// Component status condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    #[serde(rename = "type")]
    pub condition_type: ConditionType,

    pub status: ConditionStatus,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Overall component state
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum State {
    #[default]
    Processing,
    Deleting,
    Ready,
    Error,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            State::Processing => "Processing",
            State::Deleting => "Deleting",
            State::Ready => "Ready",
            State::Error => "Error",
        };
        f.write_str(s)
    }
}

/// Status of a component
///
/// Missing fields take the values of [`ComponentStatus::default`], so an
/// empty status reads back as a fresh, stale one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ComponentStatus {
    /// Generation of the spec seen by the last pass
    pub observed_generation: i64,

    /// Generation of the spec whose objects were last fully applied
    #[serde(default)]
    pub applied_generation: i64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_observed_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_applied_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    #[serde(default)]
    pub state: State,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inventory: Vec<InventoryItem>,
}

impl Default for ComponentStatus {
    fn default() -> Self {
        Self {
            observed_generation: -1,
            applied_generation: 0,
            last_observed_at: None,
            last_applied_at: None,
            conditions: Vec::new(),
            state: State::Processing,
            inventory: Vec::new(),
        }
    }
}

impl ComponentStatus {
    /// Record the spec generation seen by the current pass
    pub fn observe(&mut self, generation: i64, now: DateTime<Utc>) {
        self.observed_generation = generation;
        self.last_observed_at = Some(now);
    }

    /// Record that every object of the observed generation has been applied
    pub fn mark_applied(&mut self, now: DateTime<Utc>) {
        self.applied_generation = self.observed_generation;
        self.last_applied_at = Some(now);
    }

    /// The observed spec has not been fully applied yet
    pub fn is_stale(&self) -> bool {
        self.applied_generation != self.observed_generation
    }

    pub fn condition(&self, condition_type: ConditionType) -> Option<&Condition> {
        self.conditions
            .iter()
            .find(|c| c.condition_type == condition_type)
    }

    pub fn ready_condition(&self) -> Option<&Condition> {
        self.condition(ConditionType::Ready)
    }

    /// Set a condition; the transition time only moves when the status changes
    pub fn set_condition(
        &mut self,
        condition_type: ConditionType,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) {
        let reason = reason.into();
        let message = message.into();

        match self
            .conditions
            .iter_mut()
            .find(|c| c.condition_type == condition_type)
        {
            Some(existing) => {
                if existing.status != status || existing.last_transition_time.is_none() {
                    existing.status = status;
                    existing.last_transition_time = Some(now);
                }
                existing.reason = reason;
                existing.message = message;
            }
            None => self.conditions.push(Condition {
                condition_type,
                status,
                last_transition_time: Some(now),
                reason,
                message,
            }),
        }
    }
}
