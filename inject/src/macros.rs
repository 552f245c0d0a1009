//! Public macros for ergonomic resolution and injectable declarations.

/// Resolves a service from a container, panicking if it cannot be resolved.
///
/// Use this where a missing service is a programming error. For the
/// non-panicking forms, call `get_service` or `get_required_service` on the
/// container directly.
///
/// # Panics
///
/// Panics if the service is not registered, or if building it fails.
///
/// # Examples
///
/// ```
/// use fibre_inject::{resolve, Container};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync { fn greet(&self) -> String; }
/// struct EnglishGreeter;
/// impl Greeter for EnglishGreeter { fn greet(&self) -> String { "Hello!".to_string() } }
///
/// let container = Container::new();
/// container.add_instance(String::from("hello")).unwrap();
/// container
///   .add_singleton_trait::<dyn Greeter>(|_| Ok(Arc::new(EnglishGreeter)))
///   .unwrap();
///
/// let message = resolve!(container, String);
/// assert_eq!(*message, "hello");
///
/// let greeter = resolve!(container, trait Greeter);
/// assert_eq!(greeter.greet(), "Hello!");
/// ```
#[macro_export]
macro_rules! resolve {
  // resolve!(container, trait MyTrait)
  ($container:expr, trait $trait_ident:ident) => {
    $container
      .get_required_service::<dyn $trait_ident>()
      .unwrap_or_else(|error| panic!("Failed to resolve required trait service: {}", error))
  };

  // resolve!(container, trait MyTrait, "name")
  ($container:expr, trait $trait_ident:ident, $name:expr) => {
    $container
      .get_required_named_service::<dyn $trait_ident>($name)
      .unwrap_or_else(|error| {
        panic!(
          "Failed to resolve required trait service with name '{}': {}",
          $name, error
        )
      })
  };

  // resolve!(container, MyService)
  ($container:expr, $type:ty) => {
    $container
      .get_required_service::<$type>()
      .unwrap_or_else(|error| panic!("Failed to resolve required service: {}", error))
  };

  // resolve!(container, MyService, "name")
  ($container:expr, $type:ty, $name:expr) => {
    $container
      .get_required_named_service::<$type>($name)
      .unwrap_or_else(|error| {
        panic!(
          "Failed to resolve required service with name '{}': {}",
          $name, error
        )
      })
  };
}

/// Implements [`Injectable`](crate::Injectable) for a struct whose fields are
/// [`Inject`](crate::Inject) slots.
///
/// Each `field: Type` pair declares an injection point for the unnamed
/// registration of `Type`; `field: Type = "name"` selects a named one. Points
/// are injected in the order they are listed. Prefixing the struct with
/// `delayed` also wires up [`Injectable::delayed`](crate::Injectable::delayed),
/// which requires the struct to implement
/// [`DelayedInjection`](crate::DelayedInjection).
///
/// # Examples
///
/// ```
/// use fibre_inject::{injectable, Container, Inject};
/// use std::sync::Arc;
///
/// struct Database { url: String }
///
/// #[derive(Default)]
/// struct Repository {
///   db: Inject<Database>,
///   replica: Inject<Database>,
/// }
///
/// injectable!(Repository {
///   db: Database,
///   replica: Database = "replica",
/// });
///
/// let container = Container::new();
/// container.add_instance(Database { url: "primary".into() }).unwrap();
/// container
///   .add_instance_with_name("replica", Database { url: "replica".into() })
///   .unwrap();
///
/// let repository = Arc::new(Repository::default());
/// assert!(container.resolve_dependencies(&repository).unwrap().is_complete());
/// assert_eq!(repository.replica.get().unwrap().url, "replica");
/// ```
#[macro_export]
macro_rules! injectable {
  (@impl $owner:ty { $($field:ident : $dep:ty $(= $name:literal)?),* $(,)? } { $($extra:tt)* }) => {
    impl $crate::Injectable for $owner {
      fn injection_points(
        points: &mut $crate::InjectionPoints<Self>,
      ) -> $crate::Result<()> {
        $( $crate::injectable!(@point points, $owner, $field, $dep $(, $name)?); )*
        ::std::result::Result::Ok(())
      }

      $($extra)*
    }
  };

  (@point $points:ident, $owner:ty, $field:ident, $dep:ty) => {{
    fn accessor(this: &$owner) -> &$crate::Inject<$dep> {
      &this.$field
    }
    $points.slot::<$dep>(::std::stringify!($field), accessor)?;
  }};

  (@point $points:ident, $owner:ty, $field:ident, $dep:ty, $name:expr) => {{
    fn accessor(this: &$owner) -> &$crate::Inject<$dep> {
      &this.$field
    }
    $points.named_slot::<$dep>(::std::stringify!($field), $name, accessor)?;
  }};

  (delayed $owner:ty { $($body:tt)* }) => {
    $crate::injectable!(@impl $owner { $($body)* } {
      fn delayed(
        self: ::std::sync::Arc<Self>,
      ) -> ::std::option::Option<::std::sync::Arc<dyn $crate::DelayedInjection>> {
        ::std::option::Option::Some(self)
      }
    });
  };

  ($owner:ty { $($body:tt)* }) => {
    $crate::injectable!(@impl $owner { $($body)* } {});
  };
}
