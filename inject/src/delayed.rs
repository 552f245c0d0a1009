//! The delayed-resolution graph.
//!
//! Instances that opt into delayed injection and come up short during
//! resolution are parked here, grouped by instance type, until every
//! dependency their type is waiting on has been registered. The graph is a
//! plain map of maps:
//!
//! - `waiting`: instance type -> entry holding the pending targets and a
//!   `dependency -> satisfied` map.
//! - `awaiting`: dependency -> instance types with that dependency still
//!   unsatisfied.
//!
//! `awaiting` is derived from `waiting` and never holds a pair that is not an
//! unsatisfied dependency of a live entry. Completion is a pure AND over an
//! entry's map, so the order in which dependencies show up does not matter.

use crate::catalog::InjectionPointList;
use crate::core::{ServiceKey, TypeInfo};
use crate::scope::ScopeState;

use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

/// Opt-in capability for instances that should be completed later instead
/// of failing when a dependency is not registered yet.
pub trait DelayedInjection: Send + Sync {
  /// Called once, when the instance first enters a container's waiting graph.
  fn mark_for_delayed_injection(&self);

  /// Called once, after every injection point has been filled.
  ///
  /// No container lock is held while this runs, so the callback may
  /// register into or resolve from any container, on any thread.
  fn on_dependencies_injected(&self);
}

/// One pending instance together with everything needed to finish it.
#[derive(Clone)]
pub(crate) struct WaitingTarget {
  id: usize,
  pub(crate) instance: Arc<dyn Any + Send + Sync>,
  pub(crate) delayed: Arc<dyn DelayedInjection>,
  pub(crate) points: InjectionPointList,
  // The scope the instance was first resolved through, if any.
  scope: Option<Weak<ScopeState>>,
}

impl WaitingTarget {
  pub(crate) fn new(
    instance: Arc<dyn Any + Send + Sync>,
    delayed: Arc<dyn DelayedInjection>,
    points: InjectionPointList,
    scope: Option<&Arc<ScopeState>>,
  ) -> Self {
    Self {
      id: Arc::as_ptr(&instance) as *const () as usize,
      instance,
      delayed,
      points,
      scope: scope.map(Arc::downgrade),
    }
  }

  pub(crate) fn was_scoped(&self) -> bool {
    self.scope.is_some()
  }

  /// The originating scope, while it is still alive and not torn down.
  pub(crate) fn scope(&self) -> Option<Arc<ScopeState>> {
    self
      .scope
      .as_ref()
      .and_then(Weak::upgrade)
      .filter(|scope| !scope.is_disposed())
  }
}

impl fmt::Debug for WaitingTarget {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("WaitingTarget")
      .field("id", &self.id)
      .field("points", &self.points.len())
      .finish()
  }
}

pub(crate) struct WaitingEntry {
  instance_type: TypeInfo,
  targets: Vec<WaitingTarget>,
  dependencies: HashMap<ServiceKey, bool>,
}

impl WaitingEntry {
  fn new(instance_type: TypeInfo) -> Self {
    Self {
      instance_type,
      targets: Vec::new(),
      dependencies: HashMap::new(),
    }
  }

  // Targets are kept in arrival order and deduplicated by identity.
  fn add_target(&mut self, target: WaitingTarget) -> bool {
    if self.targets.iter().any(|existing| existing.id == target.id) {
      return false;
    }
    self.targets.push(target);
    true
  }

  fn is_satisfied(&self) -> bool {
    self.dependencies.values().all(|satisfied| *satisfied)
  }

  pub(crate) fn instance_type(&self) -> TypeInfo {
    self.instance_type
  }

  pub(crate) fn into_targets(self) -> Vec<WaitingTarget> {
    self.targets
  }
}

/// A point-in-time view of one waiting entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingEntryInfo {
  pub instance_type: TypeInfo,
  pub targets: usize,
  /// Tracked dependencies and whether each is currently satisfied, ordered by
  /// type name and then registration name.
  pub dependencies: Vec<(ServiceKey, bool)>,
}

impl WaitingEntryInfo {
  pub fn is_waiting_on(&self, key: &ServiceKey) -> bool {
    self
      .dependencies
      .iter()
      .any(|(dependency, satisfied)| dependency == key && !satisfied)
  }
}

#[derive(Default)]
pub(crate) struct DelayedGraph {
  waiting: HashMap<TypeId, WaitingEntry>,
  awaiting: HashMap<ServiceKey, HashSet<TypeId>>,
}

impl DelayedGraph {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  /// Records that `target` cannot be completed until `missing` is registered.
  ///
  /// `missing` is downgraded to unsatisfied even when the entry had it
  /// marked satisfied. Returns whether `target` was not already waiting.
  pub(crate) fn add_awaiting_target(
    &mut self,
    target: WaitingTarget,
    instance_type: TypeInfo,
    missing: ServiceKey,
  ) -> bool {
    let entry = self
      .waiting
      .entry(instance_type.type_id)
      .or_insert_with(|| WaitingEntry::new(instance_type));
    let added = entry.add_target(target);
    entry.dependencies.insert(missing.clone(), false);
    self
      .awaiting
      .entry(missing)
      .or_default()
      .insert(instance_type.type_id);
    added
  }

  /// Marks `key` satisfied for every entry waiting on it, and removes and
  /// returns the entries that have nothing left to wait for.
  pub(crate) fn on_dependency_registered(&mut self, key: &ServiceKey) -> Vec<WaitingEntry> {
    let Some(types) = self.awaiting.remove(key) else {
      return Vec::new();
    };

    let mut completed = Vec::new();
    for type_id in types {
      let done = match self.waiting.get_mut(&type_id) {
        Some(entry) => {
          if let Some(satisfied) = entry.dependencies.get_mut(key) {
            *satisfied = true;
          }
          entry.is_satisfied()
        }
        None => false,
      };
      if done {
        if let Some(entry) = self.waiting.remove(&type_id) {
          completed.push(entry);
        }
      }
    }
    completed
  }

  /// Regresses `key` to unsatisfied wherever it is tracked as satisfied.
  pub(crate) fn on_dependency_removed(&mut self, key: &ServiceKey) {
    for (type_id, entry) in self.waiting.iter_mut() {
      if let Some(satisfied) = entry.dependencies.get_mut(key) {
        if *satisfied {
          *satisfied = false;
          self.awaiting.entry(key.clone()).or_default().insert(*type_id);
        }
      }
    }
  }

  pub(crate) fn on_all_cleared(&mut self) {
    for (type_id, entry) in self.waiting.iter_mut() {
      for (key, satisfied) in entry.dependencies.iter_mut() {
        if *satisfied {
          *satisfied = false;
          self.awaiting.entry(key.clone()).or_default().insert(*type_id);
        }
      }
    }
  }

  /// Drops every entry without completing any of them.
  pub(crate) fn clear(&mut self) {
    self.waiting.clear();
    self.awaiting.clear();
  }

  /// Every dependency tracked by a live entry, satisfied or not.
  pub(crate) fn tracked_dependencies(&self) -> Vec<ServiceKey> {
    let mut keys: Vec<ServiceKey> = Vec::new();
    for entry in self.waiting.values() {
      for key in entry.dependencies.keys() {
        if !keys.contains(key) {
          keys.push(key.clone());
        }
      }
    }
    keys
  }

  pub(crate) fn len(&self) -> usize {
    self.waiting.len()
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.waiting.is_empty()
  }

  pub(crate) fn snapshot(&self) -> Vec<WaitingEntryInfo> {
    let mut entries: Vec<WaitingEntryInfo> = self
      .waiting
      .values()
      .map(|entry| {
        let mut dependencies: Vec<(ServiceKey, bool)> = entry
          .dependencies
          .iter()
          .map(|(key, satisfied)| (key.clone(), *satisfied))
          .collect();
        dependencies.sort_by(|(a, _), (b, _)| {
          (a.type_name(), a.name()).cmp(&(b.type_name(), b.name()))
        });
        WaitingEntryInfo {
          instance_type: entry.instance_type,
          targets: entry.targets.len(),
          dependencies,
        }
      })
      .collect();
    entries.sort_by(|a, b| a.instance_type.type_name.cmp(b.instance_type.type_name));
    entries
  }

  /// Checks that the reverse index mirrors exactly the unsatisfied
  /// dependencies of live entries, and that no live entry is complete.
  pub(crate) fn is_consistent(&self) -> bool {
    let indexed_pairs_hold = self.awaiting.iter().all(|(key, types)| {
      !types.is_empty()
        && types.iter().all(|type_id| {
          self
            .waiting
            .get(type_id)
            .and_then(|entry| entry.dependencies.get(key))
            .map_or(false, |satisfied| !satisfied)
        })
    });

    let unsatisfied_are_indexed = self.waiting.iter().all(|(type_id, entry)| {
      !entry.is_satisfied()
        && !entry.targets.is_empty()
        && entry
          .dependencies
          .iter()
          .filter(|(_, satisfied)| !**satisfied)
          .all(|(key, _)| {
            self
              .awaiting
              .get(key)
              .map_or(false, |types| types.contains(type_id))
          })
    });

    indexed_pairs_hold && unsatisfied_are_indexed
  }
}
