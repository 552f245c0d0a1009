//! The registration store owned by every container.

use crate::container::ServiceResolver;
use crate::core::{Lifetime, ServiceKey, ServiceRef};
use crate::descriptor::{Implementation, ServiceDescriptor};
use crate::error::{InjectError, Result};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static NEXT_STORE_ID: AtomicUsize = AtomicUsize::new(1);

/// Describes a change made to a container's registrations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
  /// A service was registered.
  Added(ServiceKey),
  /// A registration was replaced by a new one for the same service.
  Updated(ServiceKey),
  /// A registration was removed.
  Removed(ServiceKey),
  /// Every registration was removed at once.
  Cleared,
}

impl fmt::Display for StoreChange {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      StoreChange::Added(key) => write!(f, "added {}", key),
      StoreChange::Updated(key) => write!(f, "updated {}", key),
      StoreChange::Removed(key) => write!(f, "removed {}", key),
      StoreChange::Cleared => write!(f, "cleared"),
    }
  }
}

/// A listener that can be registered with a container to observe changes to
/// its registrations.
///
/// `on_change` is called synchronously, after the container has updated its
/// own delayed-resolution state.
pub trait ChangeListener: Send + Sync {
  fn on_change(&self, container_id: &str, change: &StoreChange);
}

/// Outcome of a single lookup.
#[derive(Debug, Clone)]
pub(crate) enum Lookup {
  Found(ServiceRef),
  /// The service, or one of the services needed to build it, is not available.
  Missing(ServiceKey),
}

pub(crate) struct Registered {
  descriptor: ServiceDescriptor,
  singleton: OnceCell<ServiceRef>,
}

impl Registered {
  fn new(descriptor: ServiceDescriptor) -> Self {
    let singleton = match &descriptor.implementation {
      Implementation::Instance(instance) => OnceCell::with_value(instance.clone()),
      _ => OnceCell::new(),
    };
    Self {
      descriptor,
      singleton,
    }
  }

  fn construct(&self, resolver: &ServiceResolver<'_>) -> Result<ServiceRef> {
    match &self.descriptor.implementation {
      Implementation::Instance(instance) => Ok(instance.clone()),
      Implementation::Factory(factory) | Implementation::Type { factory, .. } => factory(resolver),
    }
  }

  fn dispose_singleton(&self) {
    if let (Some(disposer), Some(instance)) = (&self.descriptor.disposer, self.singleton.get()) {
      disposer(instance);
    }
  }
}

/// Maps service keys to registrations and owns the singletons built from them.
pub(crate) struct RegistrationStore {
  id: usize,
  entries: DashMap<ServiceKey, Arc<Registered>>,
}

impl RegistrationStore {
  pub(crate) fn new() -> Self {
    Self {
      id: NEXT_STORE_ID.fetch_add(1, Ordering::Relaxed),
      entries: DashMap::new(),
    }
  }

  pub(crate) fn add(&self, descriptor: ServiceDescriptor) -> Result<StoreChange> {
    let key = descriptor.key.clone();
    match self.entries.entry(key.clone()) {
      Entry::Occupied(_) => Err(InjectError::AlreadyRegistered(key)),
      Entry::Vacant(vacant) => {
        vacant.insert(Arc::new(Registered::new(descriptor)));
        Ok(StoreChange::Added(key))
      }
    }
  }

  /// Inserts or overwrites the registration for the descriptor's key.
  pub(crate) fn replace(&self, descriptor: ServiceDescriptor) -> StoreChange {
    let key = descriptor.key.clone();
    match self
      .entries
      .insert(key.clone(), Arc::new(Registered::new(descriptor)))
    {
      Some(previous) => {
        previous.dispose_singleton();
        StoreChange::Updated(key)
      }
      None => StoreChange::Added(key),
    }
  }

  pub(crate) fn remove(&self, key: &ServiceKey) -> Option<StoreChange> {
    self
      .entries
      .remove(key)
      .map(|_| StoreChange::Removed(key.clone()))
  }

  /// Removes every registration, disposing the singletons that were built.
  pub(crate) fn clear(&self) -> StoreChange {
    let keys: Vec<ServiceKey> = self.entries.iter().map(|entry| entry.key().clone()).collect();
    for key in keys {
      if let Some((_, registered)) = self.entries.remove(&key) {
        registered.dispose_singleton();
      }
    }
    StoreChange::Cleared
  }

  pub(crate) fn contains(&self, key: &ServiceKey) -> bool {
    self.entries.contains_key(key)
  }

  pub(crate) fn keys(&self) -> Vec<ServiceKey> {
    self.entries.iter().map(|entry| entry.key().clone()).collect()
  }

  pub(crate) fn len(&self) -> usize {
    self.entries.len()
  }

  pub(crate) fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub(crate) fn lifetime_of(&self, key: &ServiceKey) -> Option<Lifetime> {
    self.entries.get(key).map(|entry| entry.descriptor.lifetime)
  }

  pub(crate) fn descriptor(&self, key: &ServiceKey) -> Option<ServiceDescriptor> {
    self.entries.get(key).map(|entry| entry.descriptor.clone())
  }

  /// A new store with the same registrations and no constructed singletons.
  ///
  /// Pre-built instances are shared with this store, which keeps the
  /// responsibility for disposing them.
  pub(crate) fn copied(&self) -> Self {
    let copy = Self::new();
    for entry in self.entries.iter() {
      let mut descriptor = entry.descriptor.clone();
      if matches!(descriptor.implementation, Implementation::Instance(_)) {
        descriptor.disposer = None;
      }
      copy
        .entries
        .insert(entry.key().clone(), Arc::new(Registered::new(descriptor)));
    }
    copy
  }

  /// Looks up `key` in this store only.
  ///
  /// The registration is cloned out of the map before anything is built, so
  /// factories are free to resolve other services from the same store.
  pub(crate) fn try_get(&self, key: &ServiceKey, resolver: &ServiceResolver<'_>) -> Result<Lookup> {
    let registered = match self.entries.get(key) {
      Some(entry) => Arc::clone(entry.value()),
      None => return Ok(Lookup::Missing(key.clone())),
    };

    let built = match registered.descriptor.lifetime {
      Lifetime::Singleton => registered
        .singleton
        .get_or_try_init(|| registered.construct(resolver))
        .cloned(),
      Lifetime::Transient => registered.construct(resolver),
      Lifetime::Scoped => match resolver.scope() {
        Some(scope) => scope.get_or_init(
          self.id,
          key,
          registered.descriptor.disposer.as_ref(),
          || registered.construct(resolver),
        ),
        None => {
          return Err(InjectError::InvalidOperation(format!(
            "cannot resolve scoped service '{}' outside of a scope",
            key
          )))
        }
      },
    };

    match built {
      Ok(service) => Ok(Lookup::Found(service)),
      Err(error) => match error.missing_dependency() {
        Some(missing) => Ok(Lookup::Missing(missing.clone())),
        None => Err(error),
      },
    }
  }
}
