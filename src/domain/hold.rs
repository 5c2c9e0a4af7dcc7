//! Hold reasons
//!
//! Named reasons a task can be paused for. Reasons are display data: the
//! scheduler never consults them for date math, and removing or deactivating
//! one leaves tasks that reference it untouched.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::error::{Result, ScheduleError};
use super::id::HoldReasonId;

/// Default color for new reasons
pub const DEFAULT_COLOR: &str = "#6B7280";

/// A reason a task can be held for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldReason {
    pub id: HoldReasonId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_color")]
    pub color: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
    #[serde(default)]
    pub sequence_order: u32,
}

fn default_color() -> String {
    DEFAULT_COLOR.to_string()
}

fn default_active() -> bool {
    true
}

/// Input for creating a reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewHoldReason {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub sequence_order: Option<u32>,
}

impl NewHoldReason {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            color: None,
            sequence_order: None,
        }
    }
}

/// Partial update of a reason; `None` leaves a field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HoldReasonUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub color: Option<String>,
    pub is_active: Option<bool>,
    pub sequence_order: Option<u32>,
}

/// Starter set used by [`HoldRegistry::seed_defaults`]
const DEFAULT_REASONS: &[(&str, &str, &str)] = &[
    ("Weather", "Work stopped by rain, wind or heat", "#3B82F6"),
    ("Awaiting Finance", "Waiting on client finance or progress payment", "#F59E0B"),
    ("Council Approval", "Waiting on council, certifier or inspection sign-off", "#8B5CF6"),
    ("Supplier Delay", "Materials or trades not available", "#EF4444"),
    ("Client Variation", "Scope change requested by the client", "#10B981"),
    ("Site Access", "Site not accessible or not ready", "#6B7280"),
];

/// Registry of hold reasons for a workspace
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HoldRegistry {
    reasons: BTreeMap<HoldReasonId, HoldReason>,

    /// Highest id ever handed out, deleted reasons included
    last_issued: Option<HoldReasonId>,
}

impl HoldRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from stored reasons
    pub fn from_reasons(reasons: impl IntoIterator<Item = HoldReason>) -> Self {
        let reasons: BTreeMap<_, _> = reasons.into_iter().map(|r| (r.id, r)).collect();
        let last_issued = reasons.keys().next_back().copied();
        Self {
            reasons,
            last_issued,
        }
    }

    /// Records ids that were issued before, so they are never handed out again
    pub fn mark_issued(&mut self, ids: impl IntoIterator<Item = HoldReasonId>) {
        self.last_issued = ids.into_iter().chain(self.last_issued).max();
    }

    /// Returns reasons in display order
    pub fn list(&self) -> Vec<&HoldReason> {
        let mut reasons: Vec<_> = self.reasons.values().collect();
        reasons.sort_by_key(|r| (r.sequence_order, r.id));
        reasons
    }

    pub fn get(&self, id: HoldReasonId) -> Result<&HoldReason> {
        self.reasons
            .get(&id)
            .ok_or(ScheduleError::HoldReasonNotFound(id))
    }

    /// Returns the reason if it exists and may be used for new holds
    pub fn require_active(&self, id: HoldReasonId) -> Result<&HoldReason> {
        let reason = self.get(id)?;
        if !reason.is_active {
            return Err(ScheduleError::HoldReasonInactive(id));
        }
        Ok(reason)
    }

    pub fn len(&self) -> usize {
        self.reasons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reasons.is_empty()
    }

    fn next_id(&self) -> HoldReasonId {
        self.last_issued
            .map(|id| id.next())
            .unwrap_or(HoldReasonId::new(1))
    }

    fn next_sequence(&self) -> u32 {
        self.reasons
            .values()
            .map(|r| r.sequence_order)
            .max()
            .map(|n| n + 1)
            .unwrap_or(1)
    }

    pub fn create(&mut self, new: NewHoldReason) -> HoldReason {
        let reason = HoldReason {
            id: self.next_id(),
            name: new.name.trim().to_string(),
            description: new.description,
            color: new.color.unwrap_or_else(default_color),
            is_active: true,
            sequence_order: new.sequence_order.unwrap_or_else(|| self.next_sequence()),
        };
        self.last_issued = Some(reason.id);
        self.reasons.insert(reason.id, reason.clone());
        reason
    }

    pub fn update(&mut self, id: HoldReasonId, update: HoldReasonUpdate) -> Result<HoldReason> {
        let reason = self
            .reasons
            .get_mut(&id)
            .ok_or(ScheduleError::HoldReasonNotFound(id))?;

        if let Some(name) = update.name {
            reason.name = name.trim().to_string();
        }
        if let Some(description) = update.description {
            reason.description = description;
        }
        if let Some(color) = update.color {
            reason.color = color;
        }
        if let Some(active) = update.is_active {
            reason.is_active = active;
        }
        if let Some(order) = update.sequence_order {
            reason.sequence_order = order;
        }

        Ok(reason.clone())
    }

    /// Removes a reason; tasks referencing it keep the dangling id
    pub fn delete(&mut self, id: HoldReasonId) -> Result<HoldReason> {
        self.reasons
            .remove(&id)
            .ok_or(ScheduleError::HoldReasonNotFound(id))
    }

    /// Populates the starter set if the registry is empty
    ///
    /// Returns the number of reasons created (zero when any already exist).
    pub fn seed_defaults(&mut self) -> usize {
        if !self.reasons.is_empty() {
            return 0;
        }

        for (order, (name, description, color)) in DEFAULT_REASONS.iter().enumerate() {
            self.create(NewHoldReason {
                name: name.to_string(),
                description: description.to_string(),
                color: Some(color.to_string()),
                sequence_order: Some(order as u32 + 1),
            });
        }

        DEFAULT_REASONS.len()
    }

    /// Iterates all reasons by id
    pub fn iter(&self) -> impl Iterator<Item = &HoldReason> {
        self.reasons.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_assigns_ids_and_order() {
        let mut registry = HoldRegistry::new();
        let a = registry.create(NewHoldReason::named("Rain"));
        let b = registry.create(NewHoldReason::named("Finance"));

        assert_eq!(a.id, HoldReasonId::new(1));
        assert_eq!(b.id, HoldReasonId::new(2));
        assert_eq!(b.sequence_order, 2);
        assert_eq!(a.color, DEFAULT_COLOR);
        assert!(a.is_active);
    }

    #[test]
    fn seed_defaults_is_idempotent() {
        let mut registry = HoldRegistry::new();
        let created = registry.seed_defaults();
        assert_eq!(created, DEFAULT_REASONS.len());
        assert_eq!(registry.seed_defaults(), 0);
        assert_eq!(registry.len(), DEFAULT_REASONS.len());
    }

    #[test]
    fn seed_defaults_noop_when_any_exist() {
        let mut registry = HoldRegistry::new();
        registry.create(NewHoldReason::named("Custom"));
        assert_eq!(registry.seed_defaults(), 0);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn list_is_in_sequence_order() {
        let mut registry = HoldRegistry::new();
        let a = registry.create(NewHoldReason::named("Late"));
        let b = registry.create(NewHoldReason::named("Early"));
        registry
            .update(
                b.id,
                HoldReasonUpdate {
                    sequence_order: Some(0),
                    ..Default::default()
                },
            )
            .unwrap();

        let names: Vec<_> = registry.list().iter().map(|r| r.id).collect();
        assert_eq!(names, vec![b.id, a.id]);
    }

    #[test]
    fn inactive_reason_is_rejected_for_new_holds() {
        let mut registry = HoldRegistry::new();
        let reason = registry.create(NewHoldReason::named("Rain"));
        registry
            .update(
                reason.id,
                HoldReasonUpdate {
                    is_active: Some(false),
                    ..Default::default()
                },
            )
            .unwrap();

        assert!(matches!(
            registry.require_active(reason.id),
            Err(ScheduleError::HoldReasonInactive(_))
        ));
        assert!(registry.get(reason.id).is_ok());
    }

    #[test]
    fn delete_unknown_reason_fails() {
        let mut registry = HoldRegistry::new();
        assert!(matches!(
            registry.delete(HoldReasonId::new(9)),
            Err(ScheduleError::HoldReasonNotFound(_))
        ));
    }

    #[test]
    fn ids_are_not_reused_after_delete_of_middle() {
        let mut registry = HoldRegistry::new();
        registry.create(NewHoldReason::named("A"));
        let b = registry.create(NewHoldReason::named("B"));
        registry.create(NewHoldReason::named("C"));
        registry.delete(b.id).unwrap();

        let d = registry.create(NewHoldReason::named("D"));
        assert_eq!(d.id, HoldReasonId::new(4));
    }

    #[test]
    fn ids_are_not_reused_after_delete_of_last() {
        let mut registry = HoldRegistry::new();
        registry.create(NewHoldReason::named("A"));
        let b = registry.create(NewHoldReason::named("B"));
        registry.delete(b.id).unwrap();

        let c = registry.create(NewHoldReason::named("C"));
        assert_eq!(c.id, HoldReasonId::new(3));
        assert!(registry.get(b.id).is_err());
    }

    #[test]
    fn marked_ids_survive_a_reload() {
        let mut registry = HoldRegistry::new();
        registry.create(NewHoldReason::named("A"));
        let b = registry.create(NewHoldReason::named("B"));
        let removed = registry.delete(b.id).unwrap();

        let mut reloaded = HoldRegistry::from_reasons(registry.iter().cloned());
        reloaded.mark_issued([removed.id]);
        let c = reloaded.create(NewHoldReason::named("C"));
        assert_eq!(c.id, HoldReasonId::new(3));
    }
}
