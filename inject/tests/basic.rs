use fibre_inject::{
  resolve, Arguments, Construct, Container, ImplementationKind, InjectError, Lifetime,
  Registration, ServiceKey,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

// --- Test Fixtures ---

// The trait must be Send + Sync for the container to accept it.
trait Greeter: Send + Sync {
  fn greet(&self) -> String;
}

struct EnglishGreeter;
impl Greeter for EnglishGreeter {
  fn greet(&self) -> String {
    "Hello!".to_string()
  }
}

struct SpanishGreeter;
impl Greeter for SpanishGreeter {
  fn greet(&self) -> String {
    "¡Hola!".to_string()
  }
}

#[derive(Debug, PartialEq, Eq)]
struct SimpleService {
  id: u32,
}

struct Settings {
  url: String,
}

struct Connection {
  url: String,
}

impl Construct for Connection {
  fn parameters() -> Vec<ServiceKey> {
    vec![ServiceKey::of::<Settings>()]
  }

  fn construct(args: &mut Arguments) -> fibre_inject::Result<Self> {
    let settings = args.take::<Settings>()?;
    Ok(Connection {
      url: settings.url.clone(),
    })
  }
}

// --- Registration ---

#[test]
fn test_singleton_factory_returns_same_instance() {
  // Arrange
  let container = Container::new();
  container.add_singleton(|_| Ok(SimpleService { id: 101 })).unwrap();

  // Act
  let r1 = resolve!(container, SimpleService);
  let r2 = resolve!(container, SimpleService);

  // Assert
  assert_eq!(r1.id, 101);
  assert!(Arc::ptr_eq(&r1, &r2));
}

#[test]
fn test_named_instance() {
  // Arrange
  let container = Container::new();
  container
    .add_instance_with_name("named_instance", SimpleService { id: 202 })
    .unwrap();

  // Act
  let r1 = resolve!(container, SimpleService, "named_instance");
  let r2 = resolve!(container, SimpleService, "named_instance");

  // Assert
  assert_eq!(r1.id, 202);
  assert!(Arc::ptr_eq(&r1, &r2));
  assert!(container.get_service::<SimpleService>().is_none());
}

#[test]
fn test_transient_factory_returns_distinct_instances() {
  // Arrange
  let container = Container::new();
  container.add_transient(|_| Ok(SimpleService { id: 303 })).unwrap();

  // Act
  let r1 = resolve!(container, SimpleService);
  let r2 = resolve!(container, SimpleService);

  // Assert
  assert_eq!(*r1, *r2);
  assert!(!Arc::ptr_eq(&r1, &r2));
}

#[test]
fn test_trait_resolution() {
  // Arrange
  let container = Container::new();
  container
    .add_singleton_trait::<dyn Greeter>(|_| Ok(Arc::new(EnglishGreeter)))
    .unwrap();
  container
    .register(Registration::<dyn Greeter>::instance_arc(Arc::new(SpanishGreeter)).named("es"))
    .unwrap();

  // Act
  let english = resolve!(container, trait Greeter);
  let spanish = resolve!(container, trait Greeter, "es");

  // Assert
  assert_eq!(english.greet(), "Hello!");
  assert_eq!(spanish.greet(), "¡Hola!");
}

#[test]
fn test_duplicate_registration_is_rejected() {
  // Arrange
  let container = Container::new();
  container.add_instance(SimpleService { id: 1 }).unwrap();

  // Act
  let result = container.add_instance(SimpleService { id: 2 });

  // Assert
  assert!(matches!(result, Err(InjectError::AlreadyRegistered(key)) if key == ServiceKey::of::<SimpleService>()));
  assert_eq!(resolve!(container, SimpleService).id, 1);
}

#[test]
fn test_replace_overwrites_registration() {
  let container = Container::new();
  container.add_instance(SimpleService { id: 1 }).unwrap();

  container
    .replace(Registration::instance(SimpleService { id: 2 }))
    .unwrap();

  assert_eq!(resolve!(container, SimpleService).id, 2);
}

#[test]
fn test_unregister_reports_whether_anything_was_removed() {
  // Arrange
  let container = Container::new();
  container.add_instance(SimpleService { id: 1 }).unwrap();

  // Act
  let first = container.unregister::<SimpleService>().unwrap();
  let second = container.unregister::<SimpleService>().unwrap();

  // Assert
  assert!(first);
  assert!(!second);
  assert!(!container.is_registered::<SimpleService>());
  assert!(container.get_service::<SimpleService>().is_none());
}

#[test]
fn test_singleton_factory_runs_lazily_and_once() {
  // Arrange
  let calls = Arc::new(AtomicUsize::new(0));
  let container = Container::new();
  let counter = calls.clone();
  container
    .add_singleton(move |_| {
      counter.fetch_add(1, Ordering::SeqCst);
      Ok(SimpleService { id: 7 })
    })
    .unwrap();

  // Assert: nothing is built at registration time.
  assert_eq!(calls.load(Ordering::SeqCst), 0);

  // Act
  for _ in 0..5 {
    resolve!(container, SimpleService);
  }

  // Assert
  assert_eq!(calls.load(Ordering::SeqCst), 1);
}

// --- Resolution ---

#[test]
fn test_factory_resolves_its_own_dependencies() {
  // Arrange
  let container = Container::new();
  container
    .add_instance(Settings {
      url: "postgres://localhost".to_string(),
    })
    .unwrap();
  container
    .add_singleton(|resolver| {
      let settings = resolver.get::<Settings>()?;
      Ok(Connection {
        url: settings.url.clone(),
      })
    })
    .unwrap();

  // Act
  let connection = resolve!(container, Connection);

  // Assert
  assert_eq!(connection.url, "postgres://localhost");
}

#[test]
fn test_constructor_injection() {
  // Arrange
  let container = Container::new();
  container
    .register(Registration::<Connection>::constructed(Lifetime::Singleton))
    .unwrap();
  container
    .add_instance(Settings {
      url: "redis://cache".to_string(),
    })
    .unwrap();

  // Act
  let connection = container.get_required_service::<Connection>().unwrap();

  // Assert
  assert_eq!(connection.url, "redis://cache");
  let descriptor = container.descriptor(&ServiceKey::of::<Connection>()).unwrap();
  assert_eq!(
    descriptor.implementation_kind(),
    ImplementationKind::Type(fibre_inject::TypeInfo::of::<Connection>())
  );
}

#[test]
fn test_constructor_injection_reports_missing_argument() {
  // Arrange
  let container = Container::new();
  container
    .register(Registration::<Connection>::constructed(Lifetime::Transient))
    .unwrap();

  // Act
  let result = container.try_get_service::<Connection>();

  // Assert: the key reported is the argument that is actually missing.
  assert!(matches!(result, Err(InjectError::ServiceNotFound(key)) if key == ServiceKey::of::<Settings>()));
  assert!(container.get_service::<Connection>().is_none());
}

#[test]
fn test_unregistered_service() {
  let container = Container::new();

  assert!(container.get_service::<SimpleService>().is_none());
  assert!(container.try_get_service::<SimpleService>().unwrap().is_none());
  assert!(matches!(
    container.get_required_service::<SimpleService>(),
    Err(InjectError::ServiceNotFound(_))
  ));
}

#[test]
#[should_panic(expected = "Failed to resolve required service")]
fn test_resolve_macro_panics_when_missing() {
  let container = Container::new();
  let _ = resolve!(container, SimpleService);
}

#[test]
fn test_factory_error_is_returned() {
  // Arrange
  let container = Container::new();
  container
    .add_singleton::<SimpleService>(|_| Err(InjectError::construction::<SimpleService>("boom")))
    .unwrap();

  // Act
  let result = container.try_get_service::<SimpleService>();

  // Assert
  assert!(matches!(result, Err(InjectError::ConstructionFailed { .. })));
}

#[test]
fn test_registration_bookkeeping() {
  // Arrange
  let container = Container::new();
  container.add_instance(SimpleService { id: 1 }).unwrap();
  container.add_transient(|_| Ok(Settings { url: String::new() })).unwrap();

  // Act
  let mut names: Vec<&str> = container
    .registered_keys()
    .iter()
    .map(|key| key.type_name())
    .collect();
  names.sort();

  // Assert
  assert_eq!(names.len(), 2);
  assert_eq!(container.lifetime_of::<SimpleService>(), Some(Lifetime::Singleton));
  assert_eq!(container.lifetime_of::<Settings>(), Some(Lifetime::Transient));
  assert_eq!(container.lifetime_of::<Connection>(), None);
}

#[test]
fn test_clear_removes_every_registration() {
  let container = Container::new();
  container.add_instance(SimpleService { id: 1 }).unwrap();
  container.add_instance(Settings { url: String::new() }).unwrap();

  container.clear().unwrap();

  assert!(container.is_empty());
  assert!(container.get_service::<SimpleService>().is_none());
}
