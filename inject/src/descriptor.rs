//! Registration descriptors and the construction strategies behind them.

use crate::catalog::{self, Injectable};
use crate::container::ServiceResolver;
use crate::core::{Lifetime, ServiceKey, ServiceRef, TypeInfo};
use crate::error::{InjectError, Result};

use std::any::{type_name, Any};
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

pub(crate) type FactoryFn = Arc<dyn Fn(&ServiceResolver<'_>) -> Result<ServiceRef> + Send + Sync>;
pub(crate) type Disposer = Arc<dyn Fn(&ServiceRef) + Send + Sync>;

/// Services that release resources when their owning container, store or
/// scope is torn down.
///
/// Disposal is opt-in per registration through [`Registration::disposable`].
pub trait Dispose: Send + Sync {
  fn dispose(&self);
}

/// Constructor injection.
///
/// `parameters` lists the services the constructor needs, in order. The
/// container resolves all of them before calling `construct`; if any one is
/// missing, construction does not start and the missing key is reported.
pub trait Construct: Sized + Send + Sync + 'static {
  fn parameters() -> Vec<ServiceKey>;

  fn construct(args: &mut Arguments) -> Result<Self>;
}

/// Resolved constructor arguments, consumed in declaration order.
pub struct Arguments {
  owner: TypeInfo,
  values: std::vec::IntoIter<ServiceRef>,
}

impl Arguments {
  /// Takes the next argument as `D`.
  pub fn take<D: ?Sized + Any + Send + Sync>(&mut self) -> Result<Arc<D>> {
    let value = self.values.next().ok_or_else(|| {
      InjectError::InvalidOperation(format!(
        "'{}' took more arguments than it declared",
        self.owner
      ))
    })?;
    value
      .downcast::<D>()
      .ok_or_else(|| InjectError::DowncastFailed {
        expected: type_name::<D>(),
        actual: value.type_name(),
      })
  }

  pub fn remaining(&self) -> usize {
    self.values.len()
  }
}

/// What a registration resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImplementationKind {
  /// A pre-built instance.
  Instance,
  /// A user supplied factory function.
  Factory,
  /// A constructible implementation type.
  Type(TypeInfo),
}

#[derive(Clone)]
pub(crate) enum Implementation {
  Instance(ServiceRef),
  Factory(FactoryFn),
  Type {
    implementation: TypeInfo,
    factory: FactoryFn,
  },
}

/// The type-erased form of a [`Registration`], as stored in a container.
#[derive(Clone)]
pub struct ServiceDescriptor {
  pub(crate) key: ServiceKey,
  pub(crate) lifetime: Lifetime,
  pub(crate) implementation: Implementation,
  pub(crate) disposer: Option<Disposer>,
}

impl ServiceDescriptor {
  pub fn key(&self) -> &ServiceKey {
    &self.key
  }

  pub fn lifetime(&self) -> Lifetime {
    self.lifetime
  }

  pub fn implementation_kind(&self) -> ImplementationKind {
    match &self.implementation {
      Implementation::Instance(_) => ImplementationKind::Instance,
      Implementation::Factory(_) => ImplementationKind::Factory,
      Implementation::Type { implementation, .. } => ImplementationKind::Type(*implementation),
    }
  }

  pub fn is_disposable(&self) -> bool {
    self.disposer.is_some()
  }
}

impl fmt::Debug for ServiceDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ServiceDescriptor")
      .field("key", &self.key)
      .field("lifetime", &self.lifetime)
      .field("implementation", &self.implementation_kind())
      .field("disposable", &self.is_disposable())
      .finish()
  }
}

/// A typed registration of service `T`.
///
/// `T` may be a concrete type or a trait object (`dyn Trait`). Registrations
/// convert into [`ServiceDescriptor`]s when handed to a container.
pub struct Registration<T: ?Sized> {
  descriptor: ServiceDescriptor,
  _marker: PhantomData<fn() -> Arc<T>>,
}

impl<T: Any + Send + Sync> Registration<T> {
  /// Registers an existing value as a singleton.
  pub fn instance(value: T) -> Self {
    Self::instance_arc(Arc::new(value))
  }

  pub fn singleton<F>(factory: F) -> Self
  where
    F: Fn(&ServiceResolver<'_>) -> Result<T> + Send + Sync + 'static,
  {
    Self::with_lifetime(Lifetime::Singleton, factory)
  }

  pub fn scoped<F>(factory: F) -> Self
  where
    F: Fn(&ServiceResolver<'_>) -> Result<T> + Send + Sync + 'static,
  {
    Self::with_lifetime(Lifetime::Scoped, factory)
  }

  pub fn transient<F>(factory: F) -> Self
  where
    F: Fn(&ServiceResolver<'_>) -> Result<T> + Send + Sync + 'static,
  {
    Self::with_lifetime(Lifetime::Transient, factory)
  }

  pub fn with_lifetime<F>(lifetime: Lifetime, factory: F) -> Self
  where
    F: Fn(&ServiceResolver<'_>) -> Result<T> + Send + Sync + 'static,
  {
    Self::factory_arc(lifetime, move |resolver| factory(resolver).map(Arc::new))
  }
}

impl<T: Injectable + Default> Registration<T> {
  /// Registers `T` to be built with `Default` and then have its injection
  /// points filled from the container.
  pub fn injected(lifetime: Lifetime) -> Self {
    let factory: FactoryFn = Arc::new(|resolver: &ServiceResolver<'_>| -> Result<ServiceRef> {
      let points = catalog::injection_points::<T>()?;
      let instance = Arc::new(T::default());
      for point in points.iter() {
        let service = resolver.resolve_key(point.dependency())?;
        point.inject(&*instance, &service)?;
      }
      Ok(ServiceRef::new(instance))
    });
    Self::from_type(lifetime, TypeInfo::of::<T>(), factory)
  }
}

impl<T: Construct> Registration<T> {
  /// Registers `T` to be built through its [`Construct`] implementation.
  pub fn constructed(lifetime: Lifetime) -> Self {
    Self::from_type(lifetime, TypeInfo::of::<T>(), constructor_factory::<T, T>(|it| it))
  }
}

impl<T: ?Sized + Any + Send + Sync> Registration<T> {
  /// Registers an existing shared value as a singleton.
  pub fn instance_arc(value: Arc<T>) -> Self {
    Self::from_parts(
      Lifetime::Singleton,
      Implementation::Instance(ServiceRef::new(value)),
    )
  }

  /// Registers a factory producing shared values, typically trait objects.
  pub fn factory_arc<F>(lifetime: Lifetime, factory: F) -> Self
  where
    F: Fn(&ServiceResolver<'_>) -> Result<Arc<T>> + Send + Sync + 'static,
  {
    let factory: FactoryFn =
      Arc::new(move |resolver: &ServiceResolver<'_>| factory(resolver).map(ServiceRef::new));
    Self::from_parts(lifetime, Implementation::Factory(factory))
  }

  /// Registers service `T` as implemented by the constructible type `I`.
  pub fn implemented_by<I: Construct>(lifetime: Lifetime, cast: fn(Arc<I>) -> Arc<T>) -> Self {
    Self::from_type(lifetime, TypeInfo::of::<I>(), constructor_factory::<T, I>(cast))
  }

  /// Qualifies the registration with a name.
  pub fn named(mut self, name: &str) -> Self {
    self.descriptor.key = self.descriptor.key.with_name(name);
    self
  }

  pub fn key(&self) -> &ServiceKey {
    &self.descriptor.key
  }

  pub fn lifetime(&self) -> Lifetime {
    self.descriptor.lifetime
  }

  pub fn into_descriptor(self) -> ServiceDescriptor {
    self.descriptor
  }

  fn from_type(lifetime: Lifetime, implementation: TypeInfo, factory: FactoryFn) -> Self {
    Self::from_parts(
      lifetime,
      Implementation::Type {
        implementation,
        factory,
      },
    )
  }

  fn from_parts(lifetime: Lifetime, implementation: Implementation) -> Self {
    Self {
      descriptor: ServiceDescriptor {
        key: ServiceKey::of::<T>(),
        lifetime,
        implementation,
        disposer: None,
      },
      _marker: PhantomData,
    }
  }
}

impl<T: ?Sized + Dispose + Any + Send + Sync> Registration<T> {
  /// Disposes instances of this registration when their owner is torn down.
  pub fn disposable(mut self) -> Self {
    let disposer: Disposer = Arc::new(|service: &ServiceRef| {
      if let Some(service) = service.downcast::<T>() {
        service.dispose();
      }
    });
    self.descriptor.disposer = Some(disposer);
    self
  }
}

impl<T: ?Sized> From<Registration<T>> for ServiceDescriptor {
  fn from(registration: Registration<T>) -> Self {
    registration.descriptor
  }
}

impl<T: ?Sized> fmt::Debug for Registration<T> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_tuple("Registration").field(&self.descriptor).finish()
  }
}

fn constructor_factory<S, I>(cast: fn(Arc<I>) -> Arc<S>) -> FactoryFn
where
  S: ?Sized + Any + Send + Sync,
  I: Construct,
{
  Arc::new(move |resolver: &ServiceResolver<'_>| -> Result<ServiceRef> {
    let mut values = Vec::new();
    for parameter in I::parameters() {
      values.push(resolver.resolve_key(&parameter)?);
    }
    let mut args = Arguments {
      owner: TypeInfo::of::<I>(),
      values: values.into_iter(),
    };
    let instance = I::construct(&mut args)?;
    Ok(ServiceRef::new(cast(Arc::new(instance))))
  })
}
