//! The injection-point catalog.
//!
//! Every injectable type declares its injection points once, through
//! [`Injectable::injection_points`]. The catalog runs that discovery the first
//! time a type is resolved and memoizes the result for the lifetime of the
//! process. Since the catalog is purely a function of the type, it is the only
//! process-wide state in the crate.

use crate::core::{ServiceKey, ServiceRef, TypeInfo};
use crate::delayed::DelayedInjection;
use crate::error::{InjectError, Result};

use dashmap::DashMap;
use once_cell::sync::{Lazy, OnceCell};
use parking_lot::RwLock;
use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

type Setter = Arc<dyn Fn(&(dyn Any + Send + Sync), &ServiceRef) -> Result<()> + Send + Sync>;
type SlotCheck = Arc<dyn Fn(&(dyn Any + Send + Sync)) -> bool + Send + Sync>;

/// Memoized injection points of a single type.
pub type InjectionPointList = Arc<[InjectionPoint]>;

// One cell per type; the cell guarantees discovery succeeds at most once even
// when several threads resolve a fresh type at the same time.
static CATALOG: Lazy<DashMap<TypeId, Arc<OnceCell<InjectionPointList>>>> = Lazy::new(DashMap::new);

const PRIMITIVES: &[&str] = &[
  "bool", "char", "str", "u8", "u16", "u32", "u64", "u128", "usize", "i8", "i16", "i32", "i64",
  "i128", "isize", "f32", "f64", "()", "!",
];

/// A type whose instances can have dependencies injected into them.
///
/// Implementations declare their injection points with an
/// [`InjectionPoints`] builder, usually through the [`injectable!`](crate::injectable)
/// macro. Types that want to be completed later instead of failing when a
/// dependency is missing also override [`Injectable::delayed`].
pub trait Injectable: Any + Send + Sync + Sized {
  /// Declares the injection points of `Self`, in injection order.
  fn injection_points(points: &mut InjectionPoints<Self>) -> Result<()>;

  /// Returns the delayed-injection capability of this instance, if it has one.
  fn delayed(self: Arc<Self>) -> Option<Arc<dyn DelayedInjection>> {
    None
  }
}

/// A settable slot holding one injected dependency.
///
/// Slots start empty and are written by the container during resolution.
/// They can be read at any time, including while an instance is still
/// waiting for delayed injection.
pub struct Inject<T: ?Sized> {
  slot: RwLock<Option<Arc<T>>>,
}

impl<T: ?Sized> Inject<T> {
  pub fn new() -> Self {
    Self {
      slot: RwLock::new(None),
    }
  }

  /// The injected value, if one has been set.
  pub fn get(&self) -> Option<Arc<T>> {
    self.slot.read().clone()
  }

  pub fn is_set(&self) -> bool {
    self.slot.read().is_some()
  }

  pub(crate) fn set(&self, value: Arc<T>) {
    *self.slot.write() = Some(value);
  }
}

impl<T: ?Sized + Any> Inject<T> {
  /// The injected value, or [`InjectError::ServiceNotFound`] if the slot is still empty.
  pub fn require(&self) -> Result<Arc<T>> {
    self
      .get()
      .ok_or_else(|| InjectError::ServiceNotFound(ServiceKey::of::<T>()))
  }
}

impl<T: ?Sized> Default for Inject<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T: ?Sized> fmt::Debug for Inject<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Inject")
      .field("type", &type_name::<T>())
      .field("is_set", &self.is_set())
      .finish()
  }
}

/// A single injection point: the dependency it requires and the capability
/// to store a resolved value into an instance.
#[derive(Clone)]
pub struct InjectionPoint {
  owner: TypeInfo,
  member: &'static str,
  dependency: ServiceKey,
  setter: Setter,
  check: SlotCheck,
}

impl InjectionPoint {
  pub fn owner(&self) -> TypeInfo {
    self.owner
  }

  pub fn member(&self) -> &'static str {
    self.member
  }

  pub fn dependency(&self) -> &ServiceKey {
    &self.dependency
  }

  /// Stores `value` into this point's slot on `instance`.
  pub fn inject(&self, instance: &(dyn Any + Send + Sync), value: &ServiceRef) -> Result<()> {
    (self.setter)(instance, value)
  }

  /// Whether this point's slot on `instance` already holds a value.
  pub fn is_injected(&self, instance: &(dyn Any + Send + Sync)) -> bool {
    (self.check)(instance)
  }
}

impl fmt::Debug for InjectionPoint {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("InjectionPoint")
      .field("owner", &self.owner.type_name)
      .field("member", &self.member)
      .field("dependency", &self.dependency)
      .finish()
  }
}

/// Builder handed to [`Injectable::injection_points`].
pub struct InjectionPoints<T> {
  points: Vec<InjectionPoint>,
  _marker: PhantomData<fn(&T)>,
}

impl<T: Injectable> InjectionPoints<T> {
  fn new() -> Self {
    Self {
      points: Vec::new(),
      _marker: PhantomData,
    }
  }

  /// Declares a slot that receives the unnamed registration of `D`.
  pub fn slot<D: ?Sized + Any + Send + Sync>(
    &mut self,
    member: &'static str,
    accessor: fn(&T) -> &Inject<D>,
  ) -> Result<&mut Self> {
    self.push(member, ServiceKey::of::<D>(), accessor)
  }

  /// Declares a slot that receives the registration of `D` named `name`.
  pub fn named_slot<D: ?Sized + Any + Send + Sync>(
    &mut self,
    member: &'static str,
    name: &str,
    accessor: fn(&T) -> &Inject<D>,
  ) -> Result<&mut Self> {
    self.push(member, ServiceKey::named::<D>(name), accessor)
  }

  pub fn len(&self) -> usize {
    self.points.len()
  }

  pub fn is_empty(&self) -> bool {
    self.points.is_empty()
  }

  fn push<D: ?Sized + Any + Send + Sync>(
    &mut self,
    member: &'static str,
    dependency: ServiceKey,
    accessor: fn(&T) -> &Inject<D>,
  ) -> Result<&mut Self> {
    let owner = TypeInfo::of::<T>();
    if let Some(reason) = unsupported_member_shape(type_name::<D>()) {
      return Err(InjectError::UnsupportedMember {
        owner,
        member,
        reason,
      });
    }

    let setter: Setter = Arc::new(move |instance: &(dyn Any + Send + Sync), value: &ServiceRef| -> Result<()> {
      let target = instance
        .downcast_ref::<T>()
        .ok_or(InjectError::DowncastFailed {
          expected: type_name::<T>(),
          actual: "unknown instance type",
        })?;
      let service = value
        .downcast::<D>()
        .ok_or_else(|| InjectError::DowncastFailed {
          expected: type_name::<D>(),
          actual: value.type_name(),
        })?;
      accessor(target).set(service);
      Ok(())
    });

    let check: SlotCheck = Arc::new(move |instance: &(dyn Any + Send + Sync)| -> bool {
      instance
        .downcast_ref::<T>()
        .map_or(false, |target| accessor(target).is_set())
    });

    self.points.push(InjectionPoint {
      owner,
      member,
      dependency,
      setter,
      check,
    });
    Ok(self)
  }
}

/// Returns the injection points of `T`, running discovery on first use.
pub fn injection_points<T: Injectable>() -> Result<InjectionPointList> {
  let owner = TypeInfo::of::<T>();
  let cell = CATALOG
    .entry(owner.type_id)
    .or_insert_with(|| Arc::new(OnceCell::new()))
    .clone();
  cell.get_or_try_init(|| discover::<T>(owner)).cloned()
}

/// Whether discovery for `T` has already run successfully.
pub fn is_cataloged<T: Injectable>() -> bool {
  CATALOG
    .get(&TypeId::of::<T>())
    .map(|cell| cell.get().is_some())
    .unwrap_or(false)
}

fn discover<T: Injectable>(owner: TypeInfo) -> Result<InjectionPointList> {
  if !is_nominal(owner.type_name) {
    return Err(InjectError::UnsupportedType(owner));
  }

  let mut points = InjectionPoints::<T>::new();
  T::injection_points(&mut points)?;
  tracing::trace!(owner = %owner, points = points.len(), "discovered injection points");
  Ok(points.points.into())
}

// Primitives, references, pointers, arrays, slices and tuples have no
// nominal identity to hang injection points on.
fn is_nominal(type_name: &str) -> bool {
  !(PRIMITIVES.contains(&type_name)
    || type_name.starts_with('&')
    || type_name.starts_with('*')
    || type_name.starts_with('[')
    || type_name.starts_with('('))
}

fn unsupported_member_shape(type_name: &str) -> Option<&'static str> {
  if type_name.starts_with('[') {
    Some("array and slice dependencies are not supported")
  } else if type_name.starts_with('(') && type_name != "()" {
    Some("tuple dependencies are not supported")
  } else if type_name.starts_with('&') || type_name.starts_with('*') {
    Some("reference and pointer dependencies are not supported")
  } else if PRIMITIVES.contains(&type_name) {
    Some("primitive dependencies are not supported")
  } else if type_name.contains('<') {
    Some("generic dependencies are not supported")
  } else {
    None
  }
}
