//! The `Container` struct, its resolver and the notification plumbing that
//! drives delayed injection.

use crate::catalog::{self, Injectable, InjectionPoint};
use crate::core::{Lifetime, ServiceKey, ServiceRef, TypeInfo};
use crate::delayed::{DelayedGraph, DelayedInjection, WaitingEntry, WaitingEntryInfo, WaitingTarget};
use crate::descriptor::{Registration, ServiceDescriptor};
use crate::error::{InjectError, Result};
use crate::scope::{Scope, ScopeState};
use crate::store::{ChangeListener, Lookup, RegistrationStore, StoreChange};

use parking_lot::{Mutex, ReentrantMutex, RwLock};
use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_CONTAINER_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn generate_id() -> String {
  format!("container-{}", NEXT_CONTAINER_ID.fetch_add(1, Ordering::Relaxed))
}

// Instances whose completion callbacks are due once every lock is released.
type Ready = Vec<Arc<dyn DelayedInjection>>;

fn notify_injected(ready: Ready) {
  for delayed in ready {
    delayed.on_dependencies_injected();
  }
}

/// How a delayed instance is being resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Pass {
  /// First resolution; entering the graph marks the instance.
  Initial,
  /// Re-resolution once the graph reports the entry satisfied.
  Completion,
  /// Completion after the originating scope is gone; filled points are kept.
  Orphaned,
}

pub(crate) fn validate_id(id: &str) -> Result<()> {
  if id.trim().is_empty() {
    return Err(InjectError::InvalidId);
  }
  Ok(())
}

/// Outcome of [`Container::resolve_dependencies`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
  /// Every injection point holds a value.
  Complete,
  /// The instance is waiting in the container's graph for `missing`.
  Pending { missing: Vec<ServiceKey> },
}

impl Resolution {
  pub fn is_complete(&self) -> bool {
    matches!(self, Resolution::Complete)
  }
}

/// Handle given to factories for resolving their own dependencies.
///
/// Lookups go through the container that owns the registration being built,
/// including its fallback chain and the current scope, if any.
pub struct ServiceResolver<'a> {
  container: &'a ContainerInner,
  scope: Option<&'a ScopeState>,
}

impl<'a> ServiceResolver<'a> {
  /// Resolves `key`, reporting a miss as [`InjectError::ServiceNotFound`]
  /// naming the key that is actually unregistered.
  pub fn resolve_key(&self, key: &ServiceKey) -> Result<ServiceRef> {
    match self.container.lookup(key, self.scope)? {
      Lookup::Found(service) => Ok(service),
      Lookup::Missing(missing) => Err(InjectError::ServiceNotFound(missing)),
    }
  }

  pub fn get<T: ?Sized + Any + Send + Sync>(&self) -> Result<Arc<T>> {
    let service = self.resolve_key(&ServiceKey::of::<T>())?;
    downcast_service(&service)
  }

  pub fn get_named<T: ?Sized + Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>> {
    let service = self.resolve_key(&ServiceKey::named::<T>(name))?;
    downcast_service(&service)
  }

  /// Like [`ServiceResolver::get`], but an unregistered `T` is `Ok(None)`.
  pub fn try_get<T: ?Sized + Any + Send + Sync>(&self) -> Result<Option<Arc<T>>> {
    self
      .container
      .resolve_typed::<T>(&ServiceKey::of::<T>(), self.scope)
  }

  pub fn container_id(&self) -> &str {
    &self.container.id
  }

  pub(crate) fn scope(&self) -> Option<&'a ScopeState> {
    self.scope
  }
}

pub(crate) struct ContainerInner {
  id: String,
  parent: Option<Weak<ContainerInner>>,
  store: RegistrationStore,
  graph: Mutex<DelayedGraph>,
  children: Mutex<HashMap<String, Container>>,
  dependents: Mutex<Vec<Weak<ContainerInner>>>,
  listeners: RwLock<Vec<Arc<dyn ChangeListener>>>,
  // Serializes mutations, the dispatch that follows them and the recording
  // phase of delayed resolution. Reentrant so completion callbacks can
  // register services on the same thread.
  write_lock: ReentrantMutex<()>,
  read_only: bool,
  disposed: AtomicBool,
}

impl ContainerInner {
  fn new(
    id: String,
    parent: Option<&Arc<ContainerInner>>,
    store: RegistrationStore,
    read_only: bool,
  ) -> Arc<Self> {
    let inner = Arc::new(Self {
      id,
      parent: parent.map(Arc::downgrade),
      store,
      graph: Mutex::new(DelayedGraph::new()),
      children: Mutex::new(HashMap::new()),
      dependents: Mutex::new(Vec::new()),
      listeners: RwLock::new(Vec::new()),
      write_lock: ReentrantMutex::new(()),
      read_only,
      disposed: AtomicBool::new(false),
    });
    if let Some(parent) = parent {
      parent.dependents.lock().push(Arc::downgrade(&inner));
    }
    inner
  }

  pub(crate) fn ensure_live(&self) -> Result<()> {
    if self.disposed.load(Ordering::Acquire) {
      return Err(InjectError::Disposed(self.id.clone()));
    }
    Ok(())
  }

  fn ensure_writable(&self) -> Result<()> {
    self.ensure_live()?;
    if self.read_only {
      return Err(InjectError::InvalidOperation(format!(
        "container '{}' is read-only",
        self.id
      )));
    }
    Ok(())
  }

  fn is_disposed(&self) -> bool {
    self.disposed.load(Ordering::Acquire)
  }

  /// The fallback parent, if configured and still live.
  fn fallback(&self) -> Option<Arc<ContainerInner>> {
    self
      .parent
      .as_ref()
      .and_then(Weak::upgrade)
      .filter(|parent| !parent.is_disposed())
  }

  /// Whether `key` is registered here or anywhere along the fallback chain.
  fn is_resolvable(&self, key: &ServiceKey) -> bool {
    self.store.contains(key) || self.fallback().map_or(false, |parent| parent.is_resolvable(key))
  }

  // --- Lookup ---

  /// Local store first, then the fallback chain.
  ///
  /// When both miss, the reported key is the one that blocks this
  /// container: the local registration's missing dependency if the key is
  /// registered here, the fallback's answer otherwise.
  pub(crate) fn lookup(&self, key: &ServiceKey, scope: Option<&ScopeState>) -> Result<Lookup> {
    self.ensure_live()?;
    let resolver = ServiceResolver {
      container: self,
      scope,
    };
    let local_missing = match self.store.try_get(key, &resolver)? {
      Lookup::Found(service) => return Ok(Lookup::Found(service)),
      Lookup::Missing(missing) => missing,
    };

    match self.fallback() {
      Some(parent) => match parent.lookup(key, scope)? {
        Lookup::Found(service) => Ok(Lookup::Found(service)),
        Lookup::Missing(parent_missing) if !self.store.contains(key) => {
          Ok(Lookup::Missing(parent_missing))
        }
        Lookup::Missing(_) => Ok(Lookup::Missing(local_missing)),
      },
      None => Ok(Lookup::Missing(local_missing)),
    }
  }

  pub(crate) fn resolve_typed<T: ?Sized + Any + Send + Sync>(
    &self,
    key: &ServiceKey,
    scope: Option<&ScopeState>,
  ) -> Result<Option<Arc<T>>> {
    match self.lookup(key, scope)? {
      Lookup::Found(service) => downcast_service(&service).map(Some),
      Lookup::Missing(missing) if &missing == key => Ok(None),
      Lookup::Missing(missing) => Err(InjectError::ServiceNotFound(missing)),
    }
  }

  // --- Dependency resolution ---

  pub(crate) fn resolve_instance<T: Injectable>(
    &self,
    instance: &Arc<T>,
    scope: Option<&Arc<ScopeState>>,
  ) -> Result<Resolution> {
    self.ensure_live()?;
    let points = catalog::injection_points::<T>()?;
    let state = scope.map(|scope| &**scope);
    match Arc::clone(instance).delayed() {
      None => {
        self.inject_points(&**instance, &points, state, true, false)?;
        Ok(Resolution::Complete)
      }
      Some(delayed) => {
        let target = WaitingTarget::new(instance.clone(), delayed, points, scope);
        self.resolve_or_wait(target, TypeInfo::of::<T>(), state, Pass::Initial)
      }
    }
  }

  /// Fills every point it can. With `fail_fast`, the first miss is an error;
  /// otherwise all misses are collected and returned. With `keep_injected`,
  /// points that already hold a value are left alone.
  fn inject_points(
    &self,
    instance: &(dyn Any + Send + Sync),
    points: &[InjectionPoint],
    scope: Option<&ScopeState>,
    fail_fast: bool,
    keep_injected: bool,
  ) -> Result<Vec<ServiceKey>> {
    let mut missing = Vec::new();
    for point in points {
      if keep_injected && point.is_injected(instance) {
        continue;
      }
      match self.lookup(point.dependency(), scope)? {
        Lookup::Found(service) => {
          point.inject(instance, &service)?;
          tracing::trace!(
            container = %self.id,
            owner = %point.owner(),
            member = point.member(),
            "injected dependency"
          );
        }
        Lookup::Missing(key) if fail_fast => {
          return Err(InjectError::DependencyNotRegistered {
            dependency: key,
            required_by: point.owner(),
          });
        }
        Lookup::Missing(key) => {
          if !missing.contains(&key) {
            missing.push(key);
          }
        }
      }
    }
    Ok(missing)
  }

  fn resolve_or_wait(
    &self,
    target: WaitingTarget,
    instance_type: TypeInfo,
    scope: Option<&ScopeState>,
    pass: Pass,
  ) -> Result<Resolution> {
    // Held from the first lookup until the misses are recorded, so a
    // registration cannot slip in between and leave the target stranded.
    let _guard = self.write_lock.lock();
    self.ensure_live()?;
    let keep_injected = pass == Pass::Orphaned;
    let missing =
      self.inject_points(&*target.instance, &target.points, scope, false, keep_injected)?;
    if missing.is_empty() {
      return Ok(Resolution::Complete);
    }

    let newly_added = {
      let mut graph = self.graph.lock();
      let mut added = false;
      for key in &missing {
        added |= graph.add_awaiting_target(target.clone(), instance_type, key.clone());
      }
      added
    };
    tracing::debug!(
      container = %self.id,
      instance = %instance_type,
      missing = missing.len(),
      "instance is waiting for delayed injection"
    );
    if newly_added && pass == Pass::Initial {
      target.delayed.mark_for_delayed_injection();
    }
    Ok(Resolution::Pending { missing })
  }

  // --- Change dispatch ---

  /// Must be called with `write_lock` held. Returns the instances that were
  /// completed here or in a dependent container; the caller notifies them
  /// after releasing the lock.
  fn apply_change(&self, change: &StoreChange) -> Ready {
    let mut ready = Ready::new();
    match change {
      StoreChange::Added(key) | StoreChange::Updated(key) => {
        self.dependency_registered(key, &mut ready)
      }
      StoreChange::Removed(key) => self.dependency_removed(key),
      StoreChange::Cleared => {
        let tracked = {
          let mut graph = self.graph.lock();
          graph.on_all_cleared();
          graph.tracked_dependencies()
        };
        for key in tracked {
          if self.is_resolvable(&key) {
            self.dependency_registered(&key, &mut ready);
          }
        }
      }
    }

    let listeners = self.listeners.read().clone();
    for listener in listeners {
      listener.on_change(&self.id, change);
    }

    self.propagate(change, &mut ready);
    ready
  }

  fn dependency_registered(&self, key: &ServiceKey, ready: &mut Ready) {
    let completed = self.graph.lock().on_dependency_registered(key);
    for entry in completed {
      self.complete(entry, ready);
    }
  }

  fn dependency_removed(&self, key: &ServiceKey) {
    if self.is_resolvable(key) {
      return;
    }
    self.graph.lock().on_dependency_removed(key);
  }

  fn complete(&self, entry: WaitingEntry, ready: &mut Ready) {
    let instance_type = entry.instance_type();
    let targets = entry.into_targets();
    tracing::debug!(
      container = %self.id,
      instance = %instance_type,
      targets = targets.len(),
      "waiting entry satisfied"
    );

    for target in targets {
      let scope = target.scope();
      let pass = if target.was_scoped() && scope.is_none() {
        Pass::Orphaned
      } else {
        Pass::Completion
      };
      match self.resolve_or_wait(target.clone(), instance_type, scope.as_deref(), pass) {
        Ok(Resolution::Complete) => ready.push(Arc::clone(&target.delayed)),
        Ok(Resolution::Pending { missing }) => {
          tracing::warn!(
            container = %self.id,
            instance = %instance_type,
            missing = missing.len(),
            "re-resolution came up short; instance is waiting again"
          );
        }
        Err(error) => {
          tracing::error!(
            container = %self.id,
            instance = %instance_type,
            error = %error,
            "failed to complete delayed injection"
          );
        }
      }
    }
  }

  fn propagate(&self, change: &StoreChange, ready: &mut Ready) {
    let dependents: Vec<Arc<ContainerInner>> = {
      let mut dependents = self.dependents.lock();
      dependents.retain(|dependent| dependent.strong_count() > 0);
      dependents.iter().filter_map(Weak::upgrade).collect()
    };
    for dependent in dependents {
      if !dependent.is_disposed() {
        dependent.on_fallback_change(change, ready);
      }
    }
  }

  /// Re-evaluates keys touched by a change in the fallback parent against
  /// this container's own view.
  fn on_fallback_change(&self, change: &StoreChange, ready: &mut Ready) {
    let _guard = self.write_lock.lock();
    let keys = match change {
      StoreChange::Added(key) | StoreChange::Updated(key) | StoreChange::Removed(key) => {
        vec![key.clone()]
      }
      StoreChange::Cleared => self.graph.lock().tracked_dependencies(),
    };
    for key in keys {
      if self.is_resolvable(&key) {
        self.dependency_registered(&key, ready);
      } else {
        self.dependency_removed(&key);
      }
    }
    self.propagate(change, ready);
  }

  // --- Lifecycle ---

  fn dispose(&self) {
    if self.disposed.swap(true, Ordering::AcqRel) {
      return;
    }
    self.detach_from_parent();
    let _guard = self.write_lock.lock();

    let children: Vec<Container> = self.children.lock().drain().map(|(_, child)| child).collect();
    for child in &children {
      child.inner.dispose();
    }

    let discarded = {
      let mut graph = self.graph.lock();
      let discarded = graph.len();
      graph.clear();
      discarded
    };
    self.store.clear();
    self.listeners.write().clear();
    self.dependents.lock().clear();

    tracing::debug!(
      container = %self.id,
      sub_containers = children.len(),
      discarded_entries = discarded,
      "container disposed"
    );
  }
}

impl ContainerInner {
  /// Drops the parent's handle on this container, if the parent still owns
  /// it as a sub-container.
  fn detach_from_parent(&self) {
    let Some(parent) = self.parent.as_ref().and_then(Weak::upgrade) else {
      return;
    };
    let detached = {
      let mut children = parent.children.lock();
      let owned = children
        .get(&self.id)
        .map_or(false, |child| std::ptr::eq(Arc::as_ptr(&child.inner), self));
      if owned {
        children.remove(&self.id)
      } else {
        None
      }
    };
    // Released outside the parent's lock.
    drop(detached);
  }
}

impl Drop for ContainerInner {
  fn drop(&mut self) {
    self.dispose();
  }
}

/// A container of service registrations.
///
/// Containers are cheap to clone; clones share the same registrations. A
/// container may have a fallback parent that is consulted when a local
/// lookup misses, and owns any sub-containers created from it.
#[derive(Clone)]
pub struct Container {
  pub(crate) inner: Arc<ContainerInner>,
}

impl Container {
  /// Creates a new, empty container with a generated id.
  pub fn new() -> Self {
    Self::detached(generate_id())
  }

  /// Creates a new, empty container with the given id.
  pub fn with_id(id: &str) -> Result<Self> {
    validate_id(id)?;
    Ok(Self::detached(id.to_string()))
  }

  pub(crate) fn detached(id: String) -> Self {
    Self {
      inner: ContainerInner::new(id, None, RegistrationStore::new(), false),
    }
  }

  /// Creates a container that falls back onto `parent`.
  pub(crate) fn with_fallback(id: String, parent: &Container) -> Self {
    Self {
      inner: ContainerInner::new(id, Some(&parent.inner), RegistrationStore::new(), false),
    }
  }

  /// Creates a standalone container holding a copy of this container's
  /// registrations, without its fallback, sub-containers or waiting graph.
  ///
  /// Singletons are built afresh in the copy; pre-built instances are
  /// shared and stay owned by this container. A `read_only` copy rejects
  /// every registration change with [`InjectError::InvalidOperation`].
  pub fn copy_registrations(&self, read_only: bool) -> Result<Container> {
    self.inner.ensure_live()?;
    let store = self.inner.store.copied();
    let copy = Container {
      inner: ContainerInner::new(generate_id(), None, store, read_only),
    };
    tracing::debug!(
      container = %self.inner.id,
      copy = %copy.inner.id,
      registrations = copy.inner.store.len(),
      read_only,
      "copied registrations"
    );
    Ok(copy)
  }

  pub fn is_read_only(&self) -> bool {
    self.inner.read_only
  }

  pub fn id(&self) -> &str {
    &self.inner.id
  }

  /// The fallback parent, if one is configured and still alive.
  pub fn parent(&self) -> Option<Container> {
    self
      .inner
      .parent
      .as_ref()
      .and_then(Weak::upgrade)
      .map(|inner| Container { inner })
  }

  pub fn has_fallback(&self) -> bool {
    self.inner.parent.is_some()
  }

  // --- Registration ---

  /// Registers a service. Fails with [`InjectError::AlreadyRegistered`] if
  /// the key already has a registration in this container.
  pub fn register(&self, registration: impl Into<ServiceDescriptor>) -> Result<()> {
    let descriptor = registration.into();
    let inner = &self.inner;
    let ready = {
      let _guard = inner.write_lock.lock();
      inner.ensure_writable()?;

      let key = descriptor.key.clone();
      let lifetime = descriptor.lifetime;
      let change = inner.store.add(descriptor)?;
      tracing::debug!(container = %inner.id, service = %key, %lifetime, "registered service");
      inner.apply_change(&change)
    };
    notify_injected(ready);
    Ok(())
  }

  /// Registers a service, overwriting any existing registration for its key.
  pub fn replace(&self, registration: impl Into<ServiceDescriptor>) -> Result<()> {
    let descriptor = registration.into();
    let inner = &self.inner;
    let ready = {
      let _guard = inner.write_lock.lock();
      inner.ensure_writable()?;

      let key = descriptor.key.clone();
      let change = inner.store.replace(descriptor);
      tracing::debug!(container = %inner.id, service = %key, %change, "replaced service");
      inner.apply_change(&change)
    };
    notify_injected(ready);
    Ok(())
  }

  pub fn add_instance<T: Any + Send + Sync>(&self, instance: T) -> Result<()> {
    self.register(Registration::instance(instance))
  }

  pub fn add_instance_with_name<T: Any + Send + Sync>(&self, name: &str, instance: T) -> Result<()> {
    self.register(Registration::instance(instance).named(name))
  }

  pub fn add_singleton<T: Any + Send + Sync>(
    &self,
    factory: impl Fn(&ServiceResolver<'_>) -> Result<T> + Send + Sync + 'static,
  ) -> Result<()> {
    self.register(Registration::singleton(factory))
  }

  pub fn add_scoped<T: Any + Send + Sync>(
    &self,
    factory: impl Fn(&ServiceResolver<'_>) -> Result<T> + Send + Sync + 'static,
  ) -> Result<()> {
    self.register(Registration::scoped(factory))
  }

  pub fn add_transient<T: Any + Send + Sync>(
    &self,
    factory: impl Fn(&ServiceResolver<'_>) -> Result<T> + Send + Sync + 'static,
  ) -> Result<()> {
    self.register(Registration::transient(factory))
  }

  /// Registers a singleton resolved as the trait object `I`.
  pub fn add_singleton_trait<I: ?Sized + Any + Send + Sync>(
    &self,
    factory: impl Fn(&ServiceResolver<'_>) -> Result<Arc<I>> + Send + Sync + 'static,
  ) -> Result<()> {
    self.register(Registration::<I>::factory_arc(Lifetime::Singleton, factory))
  }

  /// Removes the unnamed registration of `T`. Returns `false` if there was none.
  pub fn unregister<T: ?Sized + Any>(&self) -> Result<bool> {
    self.unregister_key(&ServiceKey::of::<T>())
  }

  pub fn unregister_key(&self, key: &ServiceKey) -> Result<bool> {
    let inner = &self.inner;
    let ready = {
      let _guard = inner.write_lock.lock();
      inner.ensure_writable()?;

      match inner.store.remove(key) {
        Some(change) => {
          tracing::debug!(container = %inner.id, service = %key, "unregistered service");
          inner.apply_change(&change)
        }
        None => return Ok(false),
      }
    };
    notify_injected(ready);
    Ok(true)
  }

  /// Removes every registration, disposing constructed singletons that
  /// support disposal.
  pub fn clear(&self) -> Result<()> {
    let inner = &self.inner;
    let ready = {
      let _guard = inner.write_lock.lock();
      inner.ensure_writable()?;

      let removed = inner.store.len();
      let change = inner.store.clear();
      tracing::debug!(container = %inner.id, removed, "cleared registrations");
      inner.apply_change(&change)
    };
    notify_injected(ready);
    Ok(())
  }

  /// Whether `T` is registered in this container, ignoring the fallback.
  pub fn is_registered<T: ?Sized + Any>(&self) -> bool {
    self.is_registered_key(&ServiceKey::of::<T>())
  }

  pub fn is_registered_key(&self, key: &ServiceKey) -> bool {
    self.inner.store.contains(key)
  }

  /// Whether `T` is registered here or along the fallback chain.
  pub fn is_service<T: ?Sized + Any>(&self) -> bool {
    self.inner.is_resolvable(&ServiceKey::of::<T>())
  }

  pub fn registered_keys(&self) -> Vec<ServiceKey> {
    self.inner.store.keys()
  }

  pub fn lifetime_of<T: ?Sized + Any>(&self) -> Option<Lifetime> {
    self.inner.store.lifetime_of(&ServiceKey::of::<T>())
  }

  pub fn descriptor(&self, key: &ServiceKey) -> Option<ServiceDescriptor> {
    self.inner.store.descriptor(key)
  }

  pub fn is_empty(&self) -> bool {
    self.inner.store.is_empty()
  }

  // --- Resolution ---

  /// Fills the injection points of `instance`.
  ///
  /// Instances that support delayed injection are parked in this
  /// container's graph when something is missing and completed once every
  /// missing dependency has been registered. Other instances fail with
  /// [`InjectError::DependencyNotRegistered`].
  pub fn resolve_dependencies<T: Injectable>(&self, instance: &Arc<T>) -> Result<Resolution> {
    self.inner.resolve_instance(instance, None)
  }

  /// Resolves `T`, returning `None` on a miss or any error.
  pub fn get_service<T: ?Sized + Any + Send + Sync>(&self) -> Option<Arc<T>> {
    self.get_key(&ServiceKey::of::<T>())
  }

  pub fn get_named_service<T: ?Sized + Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
    self.get_key(&ServiceKey::named::<T>(name))
  }

  /// Resolves `T`. An unregistered `T` is `Ok(None)`; any other failure,
  /// including a missing dependency of `T`'s factory, is an error.
  pub fn try_get_service<T: ?Sized + Any + Send + Sync>(&self) -> Result<Option<Arc<T>>> {
    self.inner.resolve_typed::<T>(&ServiceKey::of::<T>(), None)
  }

  pub fn try_get_named_service<T: ?Sized + Any + Send + Sync>(
    &self,
    name: &str,
  ) -> Result<Option<Arc<T>>> {
    self.inner.resolve_typed::<T>(&ServiceKey::named::<T>(name), None)
  }

  pub fn get_required_service<T: ?Sized + Any + Send + Sync>(&self) -> Result<Arc<T>> {
    let key = ServiceKey::of::<T>();
    self
      .inner
      .resolve_typed::<T>(&key, None)?
      .ok_or(InjectError::ServiceNotFound(key))
  }

  pub fn get_required_named_service<T: ?Sized + Any + Send + Sync>(
    &self,
    name: &str,
  ) -> Result<Arc<T>> {
    let key = ServiceKey::named::<T>(name);
    self
      .inner
      .resolve_typed::<T>(&key, None)?
      .ok_or(InjectError::ServiceNotFound(key))
  }

  pub fn create_scope(&self) -> Result<Scope> {
    self.inner.ensure_live()?;
    Ok(Scope::new(self.clone()))
  }

  fn get_key<T: ?Sized + Any + Send + Sync>(&self, key: &ServiceKey) -> Option<Arc<T>> {
    match self.inner.resolve_typed::<T>(key, None) {
      Ok(service) => service,
      Err(error) => {
        tracing::warn!(container = %self.inner.id, service = %key, %error, "failed to resolve service");
        None
      }
    }
  }

  // --- Sub-containers ---

  /// Creates a sub-container owned by this one that falls back onto it.
  pub fn create_sub_container(&self, id: &str) -> Result<Container> {
    validate_id(id)?;
    self.inner.ensure_live()?;

    let mut children = self.inner.children.lock();
    if children.contains_key(id) {
      return Err(InjectError::DuplicateId(id.to_string()));
    }
    let child = Container::with_fallback(id.to_string(), self);
    children.insert(id.to_string(), child.clone());
    tracing::debug!(container = %self.inner.id, sub_container = id, "created sub-container");
    Ok(child)
  }

  pub fn sub_container(&self, id: &str) -> Option<Container> {
    self.inner.children.lock().get(id).cloned()
  }

  pub fn sub_container_ids(&self) -> Vec<String> {
    let mut ids: Vec<String> = self.inner.children.lock().keys().cloned().collect();
    ids.sort();
    ids
  }

  /// Disposes and removes the sub-container `id`. Returns `false` if there
  /// was no such sub-container.
  pub fn delete_sub_container(&self, id: &str) -> bool {
    let removed = self.inner.children.lock().remove(id);
    match removed {
      Some(child) => {
        child.dispose();
        true
      }
      None => false,
    }
  }

  // --- Lifecycle ---

  /// Disposes this container and all of its sub-containers. A disposed
  /// sub-container is also removed from its parent, freeing its id.
  ///
  /// Constructed singletons that support disposal are disposed, and every
  /// instance still waiting for delayed injection is dropped without its
  /// callback firing. Calling `dispose` again does nothing.
  pub fn dispose(&self) {
    self.inner.dispose();
  }

  pub fn is_disposed(&self) -> bool {
    self.inner.is_disposed()
  }

  // --- Observation ---

  pub fn add_change_listener(&self, listener: Arc<dyn ChangeListener>) -> Result<()> {
    self.inner.ensure_live()?;
    self.inner.listeners.write().push(listener);
    Ok(())
  }

  /// A snapshot of the instances currently waiting for delayed injection.
  pub fn waiting_entries(&self) -> Vec<WaitingEntryInfo> {
    self.inner.graph.lock().snapshot()
  }

  /// Whether any instance is waiting for delayed injection.
  pub fn has_waiting(&self) -> bool {
    !self.inner.graph.lock().is_empty()
  }

  pub fn waiting_index_is_consistent(&self) -> bool {
    self.inner.graph.lock().is_consistent()
  }
}

impl Default for Container {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for Container {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Container")
      .field("id", &self.inner.id)
      .field("registrations", &self.inner.store.len())
      .field("has_fallback", &self.has_fallback())
      .field("disposed", &self.is_disposed())
      .finish()
  }
}

pub(crate) fn downcast_service<T: ?Sized + Any + Send + Sync>(service: &ServiceRef) -> Result<Arc<T>> {
  service
    .downcast::<T>()
    .ok_or_else(|| InjectError::DowncastFailed {
      expected: type_name::<T>(),
      actual: service.type_name(),
    })
}
