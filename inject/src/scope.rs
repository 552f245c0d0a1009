//! Scopes: a cache of `Scoped` services layered over a container.

use crate::catalog::Injectable;
use crate::container::{Container, Resolution};
use crate::core::{ServiceKey, ServiceRef};
use crate::descriptor::Disposer;
use crate::error::{InjectError, Result};

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

type ScopedCell = Arc<OnceCell<ServiceRef>>;

/// Scope-local instances, keyed by the store that owns the registration so
/// that a container and its fallback parent never share an instance.
#[derive(Default)]
pub(crate) struct ScopeState {
  instances: Mutex<HashMap<(usize, ServiceKey), ScopedCell>>,
  disposers: Mutex<Vec<(Disposer, ServiceRef)>>,
  disposed: AtomicBool,
}

impl ScopeState {
  pub(crate) fn get_or_init(
    &self,
    store: usize,
    key: &ServiceKey,
    disposer: Option<&Disposer>,
    init: impl FnOnce() -> Result<ServiceRef>,
  ) -> Result<ServiceRef> {
    // Clone the cell out so the map lock is not held while `init` runs.
    let cell = self
      .instances
      .lock()
      .entry((store, key.clone()))
      .or_insert_with(|| Arc::new(OnceCell::new()))
      .clone();

    let mut created = false;
    let service = cell
      .get_or_try_init(|| {
        created = true;
        init()
      })?
      .clone();

    if created {
      if let Some(disposer) = disposer {
        self.disposers.lock().push((Arc::clone(disposer), service.clone()));
      }
    }
    Ok(service)
  }

  fn len(&self) -> usize {
    self
      .instances
      .lock()
      .values()
      .filter(|cell| cell.get().is_some())
      .count()
  }

  pub(crate) fn is_disposed(&self) -> bool {
    self.disposed.load(Ordering::Acquire)
  }

  fn dispose(&self) {
    if self.disposed.swap(true, Ordering::AcqRel) {
      return;
    }
    let disposers = std::mem::take(&mut *self.disposers.lock());
    for (disposer, service) in disposers.into_iter().rev() {
      disposer(&service);
    }
    self.instances.lock().clear();
  }
}

/// A resolution scope created with [`Container::create_scope`].
///
/// `Scoped` services resolve to one instance per scope. Dropping the scope
/// disposes the scoped instances that support disposal, most recent first.
pub struct Scope {
  container: Container,
  state: Arc<ScopeState>,
}

impl Scope {
  pub(crate) fn new(container: Container) -> Self {
    tracing::trace!(container = %container.id(), "created scope");
    Self {
      container,
      state: Arc::new(ScopeState::default()),
    }
  }

  pub fn container(&self) -> &Container {
    &self.container
  }

  /// Number of scoped instances built so far.
  pub fn len(&self) -> usize {
    self.state.len()
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn get_service<T: ?Sized + Any + Send + Sync>(&self) -> Option<Arc<T>> {
    match self.try_get_service::<T>() {
      Ok(service) => service,
      Err(error) => {
        tracing::warn!(
          container = %self.container.id(),
          service = %ServiceKey::of::<T>(),
          %error,
          "failed to resolve scoped service"
        );
        None
      }
    }
  }

  pub fn try_get_service<T: ?Sized + Any + Send + Sync>(&self) -> Result<Option<Arc<T>>> {
    self
      .container
      .inner
      .resolve_typed::<T>(&ServiceKey::of::<T>(), Some(&*self.state))
  }

  pub fn get_required_service<T: ?Sized + Any + Send + Sync>(&self) -> Result<Arc<T>> {
    let key = ServiceKey::of::<T>();
    self
      .container
      .inner
      .resolve_typed::<T>(&key, Some(&*self.state))?
      .ok_or(InjectError::ServiceNotFound(key))
  }

  pub fn get_required_named_service<T: ?Sized + Any + Send + Sync>(
    &self,
    name: &str,
  ) -> Result<Arc<T>> {
    let key = ServiceKey::named::<T>(name);
    self
      .container
      .inner
      .resolve_typed::<T>(&key, Some(&*self.state))?
      .ok_or(InjectError::ServiceNotFound(key))
  }

  /// Same as [`Container::resolve_dependencies`], with scoped services
  /// taken from this scope.
  ///
  /// A delayed instance left pending here is completed against this scope
  /// as long as it is alive. If the scope is dropped first, completion fills
  /// only the points that are still empty.
  pub fn resolve_dependencies<T: Injectable>(&self, instance: &Arc<T>) -> Result<Resolution> {
    self
      .container
      .inner
      .resolve_instance(instance, Some(&self.state))
  }
}

impl Drop for Scope {
  fn drop(&mut self) {
    self.state.dispose();
  }
}

impl fmt::Debug for Scope {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Scope")
      .field("container", &self.container.id())
      .field("instances", &self.len())
      .finish()
  }
}
