//! Core identity and value types shared by every part of the engine.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// The identity under which a service is registered and looked up.
///
/// A key is the `TypeId` of the service type, optionally qualified by a
/// registration name. The type name is carried for diagnostics only and does
/// not take part in equality or hashing.
#[derive(Clone)]
pub struct ServiceKey {
  type_id: TypeId,
  type_name: &'static str,
  name: Option<Arc<str>>,
}

impl ServiceKey {
  /// The key for an unnamed registration of `T`.
  pub fn of<T: ?Sized + Any>() -> Self {
    Self {
      type_id: TypeId::of::<T>(),
      type_name: std::any::type_name::<T>(),
      name: None,
    }
  }

  /// The key for a registration of `T` under `name`.
  pub fn named<T: ?Sized + Any>(name: &str) -> Self {
    Self {
      type_id: TypeId::of::<T>(),
      type_name: std::any::type_name::<T>(),
      name: Some(Arc::from(name)),
    }
  }

  pub(crate) fn with_name(mut self, name: &str) -> Self {
    self.name = Some(Arc::from(name));
    self
  }

  pub fn type_id(&self) -> TypeId {
    self.type_id
  }

  pub fn type_name(&self) -> &'static str {
    self.type_name
  }

  pub fn name(&self) -> Option<&str> {
    self.name.as_deref()
  }
}

impl PartialEq for ServiceKey {
  fn eq(&self, other: &Self) -> bool {
    self.type_id == other.type_id && self.name == other.name
  }
}

impl Eq for ServiceKey {}

impl Hash for ServiceKey {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.type_id.hash(state);
    self.name.hash(state);
  }
}

impl fmt::Debug for ServiceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.name {
      Some(name) => write!(f, "Key({}, Name({}))", self.type_name, name),
      None => write!(f, "Key({})", self.type_name),
    }
  }
}

impl fmt::Display for ServiceKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match &self.name {
      Some(name) => write!(f, "{} (\"{}\")", self.type_name, name),
      None => f.write_str(self.type_name),
    }
  }
}

/// Type name and type id of a concrete instance type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeInfo {
  pub type_name: &'static str,
  pub type_id: TypeId,
}

impl TypeInfo {
  pub fn of<T: ?Sized + Any>() -> Self {
    Self {
      type_name: std::any::type_name::<T>(),
      type_id: TypeId::of::<T>(),
    }
  }
}

impl fmt::Display for TypeInfo {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.type_name)
  }
}

/// How long a constructed service lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifetime {
  /// One instance per container, constructed on first use.
  Singleton,
  /// One instance per [`Scope`](crate::Scope).
  Scoped,
  /// A new instance for every request.
  Transient,
}

impl fmt::Display for Lifetime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Lifetime::Singleton => write!(f, "singleton"),
      Lifetime::Scoped => write!(f, "scoped"),
      Lifetime::Transient => write!(f, "transient"),
    }
  }
}

/// A type-erased handle on a resolved service.
///
/// The erased value is always an `Arc<T>` boxed behind `dyn Any`, which lets
/// trait objects (`T = dyn Trait`) travel through the engine the same way
/// sized types do. Cloning a `ServiceRef` never clones the service itself.
#[derive(Clone)]
pub struct ServiceRef {
  type_name: &'static str,
  value: Arc<dyn Any + Send + Sync>,
}

impl ServiceRef {
  pub fn new<T: ?Sized + Any + Send + Sync>(service: Arc<T>) -> Self {
    Self {
      type_name: std::any::type_name::<T>(),
      value: Arc::new(service),
    }
  }

  /// Recovers the typed service, or `None` if `T` is not the stored type.
  pub fn downcast<T: ?Sized + Any + Send + Sync>(&self) -> Option<Arc<T>> {
    self.value.downcast_ref::<Arc<T>>().cloned()
  }

  /// Name of the type the service was stored as.
  pub fn type_name(&self) -> &'static str {
    self.type_name
  }
}

impl fmt::Debug for ServiceRef {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ServiceRef")
      .field("type_name", &self.type_name)
      .finish_non_exhaustive()
  }
}
