//! The `Injector`: an explicitly constructed registry of containers.

use crate::container::{generate_id, validate_id, Container};
use crate::error::{InjectError, Result};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;

/// Id given to the root container unless the builder says otherwise.
pub const DEFAULT_ROOT_ID: &str = "global-scope";

/// A builder for creating an [`Injector`].
#[derive(Debug, Clone)]
pub struct InjectorBuilder {
  root_id: String,
  fallback_to_root: bool,
}

impl Default for InjectorBuilder {
  fn default() -> Self {
    Self {
      root_id: DEFAULT_ROOT_ID.to_string(),
      fallback_to_root: true,
    }
  }
}

impl InjectorBuilder {
  pub fn new() -> Self {
    Self::default()
  }

  /// Sets the id of the root container.
  pub fn root_id(mut self, id: impl Into<String>) -> Self {
    self.root_id = id.into();
    self
  }

  /// Whether containers created with [`Injector::create_container`] fall
  /// back onto the root. Defaults to `true`.
  pub fn fallback_to_root(mut self, enabled: bool) -> Self {
    self.fallback_to_root = enabled;
    self
  }

  pub fn build(self) -> Result<Injector> {
    let root = Container::with_id(&self.root_id)?;
    tracing::debug!(root = %self.root_id, fallback_to_root = self.fallback_to_root, "built injector");
    Ok(Injector {
      root,
      containers: DashMap::new(),
      fallback_to_root: self.fallback_to_root,
    })
  }
}

/// Owns a root container and any number of containers addressed by id.
///
/// Ids are unique within one injector, the root's id included. Independent
/// injectors share nothing but the per-type injection-point catalog.
pub struct Injector {
  root: Container,
  containers: DashMap<String, Container>,
  fallback_to_root: bool,
}

impl Injector {
  /// Creates an injector with the default configuration.
  pub fn new() -> Self {
    Self {
      root: Container::detached(DEFAULT_ROOT_ID.to_string()),
      containers: DashMap::new(),
      fallback_to_root: true,
    }
  }

  pub fn builder() -> InjectorBuilder {
    InjectorBuilder::default()
  }

  pub fn root(&self) -> &Container {
    &self.root
  }

  /// Creates a container, falling back onto the root unless the injector
  /// was built with `fallback_to_root(false)`. A generated id is used when
  /// `id` is `None`.
  pub fn create_container(&self, id: Option<&str>) -> Result<Container> {
    self.create(id, self.fallback_to_root)
  }

  /// Creates a container that never falls back onto the root.
  pub fn create_isolated_container(&self, id: Option<&str>) -> Result<Container> {
    self.create(id, false)
  }

  /// Looks up a container by id. The root is found under its own id.
  pub fn container(&self, id: &str) -> Result<Container> {
    self
      .try_container(id)
      .ok_or_else(|| InjectError::ContainerNotFound(id.to_string()))
  }

  pub fn try_container(&self, id: &str) -> Option<Container> {
    if id == self.root.id() {
      return Some(self.root.clone());
    }
    self.containers.get(id).map(|entry| entry.value().clone())
  }

  /// Disposes and forgets the container `id`. The root cannot be deleted.
  pub fn delete_container(&self, id: &str) -> bool {
    match self.containers.remove(id) {
      Some((_, container)) => {
        container.dispose();
        tracing::debug!(container = id, "deleted container");
        true
      }
      None => false,
    }
  }

  /// Disposes every container and then the root.
  pub fn dispose(&self) {
    let ids = self.container_ids();
    for id in ids {
      self.delete_container(&id);
    }
    self.root.dispose();
  }

  pub fn container_ids(&self) -> Vec<String> {
    let mut ids: Vec<String> = self.containers.iter().map(|entry| entry.key().clone()).collect();
    ids.sort();
    ids
  }

  fn create(&self, id: Option<&str>, fallback: bool) -> Result<Container> {
    let id = match id {
      Some(id) => {
        validate_id(id)?;
        id.to_string()
      }
      None => generate_id(),
    };
    if id == self.root.id() {
      return Err(InjectError::DuplicateId(id));
    }
    self.root.inner.ensure_live()?;

    match self.containers.entry(id.clone()) {
      Entry::Occupied(_) => Err(InjectError::DuplicateId(id)),
      Entry::Vacant(vacant) => {
        let container = if fallback {
          Container::with_fallback(id.clone(), &self.root)
        } else {
          Container::detached(id.clone())
        };
        vacant.insert(container.clone());
        tracing::debug!(container = %id, fallback, "created container");
        Ok(container)
      }
    }
  }
}

impl Default for Injector {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for Injector {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Injector")
      .field("root", &self.root.id())
      .field("containers", &self.containers.len())
      .field("fallback_to_root", &self.fallback_to_root)
      .finish()
  }
}
