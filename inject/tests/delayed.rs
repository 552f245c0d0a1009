use fibre_inject::{
  injectable, Container, DelayedInjection, Inject, InjectError, Injector, Registration,
  Resolution, ServiceKey,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

// --- Test Fixtures ---

struct Logger {
  prefix: &'static str,
}

struct Database {
  url: &'static str,
}

struct Cache;

#[derive(Default)]
struct Counters {
  marked: AtomicUsize,
  injected: AtomicUsize,
}

impl Counters {
  fn marked(&self) -> usize {
    self.marked.load(Ordering::SeqCst)
  }

  fn injected(&self) -> usize {
    self.injected.load(Ordering::SeqCst)
  }
}

#[derive(Default)]
struct ReportService {
  logger: Inject<Logger>,
  database: Inject<Database>,
  counters: Counters,
}

impl DelayedInjection for ReportService {
  fn mark_for_delayed_injection(&self) {
    self.counters.marked.fetch_add(1, Ordering::SeqCst);
  }

  fn on_dependencies_injected(&self) {
    // Every slot must already be filled when the callback fires.
    assert!(self.logger.is_set() && self.database.is_set());
    self.counters.injected.fetch_add(1, Ordering::SeqCst);
  }
}

injectable!(delayed ReportService {
  logger: Logger,
  database: Database,
});

#[derive(Default)]
struct EagerService {
  logger: Inject<Logger>,
  database: Inject<Database>,
}

injectable!(EagerService {
  logger: Logger,
  database: Database,
});

#[derive(Default)]
struct CacheWarmer {
  cache: Inject<Cache>,
  counters: Counters,
}

impl DelayedInjection for CacheWarmer {
  fn mark_for_delayed_injection(&self) {
    self.counters.marked.fetch_add(1, Ordering::SeqCst);
  }

  fn on_dependencies_injected(&self) {
    self.counters.injected.fetch_add(1, Ordering::SeqCst);
  }
}

injectable!(delayed CacheWarmer { cache: Cache });

fn logger() -> Logger {
  Logger { prefix: "[report]" }
}

fn database() -> Database {
  Database { url: "postgres://db" }
}

// --- Synchronous resolution ---

#[test]
fn test_all_dependencies_present_resolves_synchronously() {
  // Arrange
  let container = Container::new();
  container.add_singleton(|_| Ok(logger())).unwrap();
  container.add_singleton(|_| Ok(database())).unwrap();
  let service = Arc::new(ReportService::default());

  // Act
  let resolution = container.resolve_dependencies(&service).unwrap();

  // Assert
  assert_eq!(resolution, Resolution::Complete);
  assert_eq!(service.logger.get().unwrap().prefix, "[report]");
  assert_eq!(service.database.get().unwrap().url, "postgres://db");
  assert_eq!(service.counters.marked(), 0);
  assert_eq!(service.counters.injected(), 0);
  assert!(container.waiting_entries().is_empty());
}

#[test]
fn test_non_delayed_instance_fails_on_missing_dependency() {
  // Arrange
  let container = Container::new();
  container.add_instance(logger()).unwrap();
  let service = Arc::new(EagerService::default());

  // Act
  let result = container.resolve_dependencies(&service);

  // Assert
  match result {
    Err(InjectError::DependencyNotRegistered {
      dependency,
      required_by,
    }) => {
      assert_eq!(dependency, ServiceKey::of::<Database>());
      assert_eq!(required_by.type_name, std::any::type_name::<EagerService>());
    }
    other => panic!("expected DependencyNotRegistered, got {:?}", other),
  }
  assert!(container.waiting_entries().is_empty());
}

#[test]
fn test_non_delayed_instance_resolves_through_fallback() {
  let parent = Container::new();
  parent.add_instance(logger()).unwrap();
  parent.add_instance(database()).unwrap();
  let child = parent.create_sub_container("child").unwrap();
  let service = Arc::new(EagerService::default());

  let resolution = child.resolve_dependencies(&service).unwrap();

  assert!(resolution.is_complete());
  assert!(service.logger.is_set());
  assert!(service.database.is_set());
}

// --- Delayed resolution ---

#[test]
fn test_partial_registration_waits_then_completes_once() {
  // Arrange
  let container = Container::new();
  container.add_instance(logger()).unwrap();
  let service = Arc::new(ReportService::default());

  // Act
  let resolution = container.resolve_dependencies(&service).unwrap();

  // Assert: waiting on the database only, logger already injected.
  assert_eq!(
    resolution,
    Resolution::Pending {
      missing: vec![ServiceKey::of::<Database>()]
    }
  );
  assert!(service.logger.is_set());
  assert!(!service.database.is_set());
  assert_eq!(service.counters.marked(), 1);
  assert_eq!(service.counters.injected(), 0);

  let entries = container.waiting_entries();
  assert_eq!(entries.len(), 1);
  assert_eq!(
    entries[0].dependencies,
    vec![(ServiceKey::of::<Database>(), false)]
  );
  assert!(container.waiting_index_is_consistent());

  // Act
  container.add_instance(database()).unwrap();

  // Assert
  assert_eq!(service.counters.injected(), 1);
  assert!(service.database.is_set());
  assert!(container.waiting_entries().is_empty());
  assert!(container.waiting_index_is_consistent());
}

#[test]
fn test_whole_missing_set_is_discovered_in_one_pass() {
  // Arrange
  let container = Container::new();
  let service = Arc::new(ReportService::default());

  // Act
  let resolution = container.resolve_dependencies(&service).unwrap();

  // Assert
  assert_eq!(
    resolution,
    Resolution::Pending {
      missing: vec![ServiceKey::of::<Logger>(), ServiceKey::of::<Database>()]
    }
  );
  assert_eq!(service.counters.marked(), 1);
  let entry = &container.waiting_entries()[0];
  assert!(entry.is_waiting_on(&ServiceKey::of::<Logger>()));
  assert!(entry.is_waiting_on(&ServiceKey::of::<Database>()));
}

#[test]
fn test_completion_is_order_independent() {
  for database_first in [false, true] {
    // Arrange
    let container = Container::new();
    let service = Arc::new(ReportService::default());
    container.resolve_dependencies(&service).unwrap();

    // Act
    if database_first {
      container.add_instance(database()).unwrap();
      assert_eq!(service.counters.injected(), 0);
      container.add_instance(logger()).unwrap();
    } else {
      container.add_instance(logger()).unwrap();
      assert_eq!(service.counters.injected(), 0);
      container.add_instance(database()).unwrap();
    }

    // Assert
    assert_eq!(service.counters.injected(), 1);
    assert!(container.waiting_index_is_consistent());
  }
}

#[test]
fn test_unregistering_before_completion_never_fires_early() {
  // Arrange
  let container = Container::new();
  let service = Arc::new(ReportService::default());
  container.resolve_dependencies(&service).unwrap();
  container.add_instance(logger()).unwrap();

  // Act: regress the logger, then supply the database.
  assert!(container.unregister::<Logger>().unwrap());
  container.add_instance(database()).unwrap();

  // Assert
  assert_eq!(service.counters.injected(), 0);
  assert!(container.waiting_entries()[0].is_waiting_on(&ServiceKey::of::<Logger>()));
  assert!(container.waiting_index_is_consistent());

  // Act: registering the logger again still completes.
  container.add_instance(logger()).unwrap();

  // Assert
  assert_eq!(service.counters.injected(), 1);
  assert!(container.waiting_entries().is_empty());
}

#[test]
fn test_clear_regresses_every_dependency() {
  let container = Container::new();
  let service = Arc::new(ReportService::default());
  container.resolve_dependencies(&service).unwrap();
  container.add_instance(logger()).unwrap();

  container.clear().unwrap();
  container.add_instance(database()).unwrap();

  assert_eq!(service.counters.injected(), 0);
  assert!(container.waiting_index_is_consistent());

  container.add_instance(logger()).unwrap();
  assert_eq!(service.counters.injected(), 1);
}

#[test]
fn test_completed_entries_are_one_shot() {
  // Arrange
  let container = Container::new();
  container.add_instance(logger()).unwrap();
  let service = Arc::new(ReportService::default());
  container.resolve_dependencies(&service).unwrap();
  container.add_instance(database()).unwrap();
  assert_eq!(service.counters.injected(), 1);

  // Act: later churn of the same dependency.
  container
    .replace(Registration::instance(Database { url: "other" }))
    .unwrap();
  container.unregister::<Database>().unwrap();
  container.add_instance(database()).unwrap();

  // Assert
  assert_eq!(service.counters.injected(), 1);
  assert_eq!(service.counters.marked(), 1);
}

#[test]
fn test_several_instances_of_one_type_complete_together() {
  // Arrange
  let container = Container::new();
  let first = Arc::new(CacheWarmer::default());
  let second = Arc::new(CacheWarmer::default());
  container.resolve_dependencies(&first).unwrap();
  container.resolve_dependencies(&second).unwrap();
  container.resolve_dependencies(&first).unwrap();

  let entries = container.waiting_entries();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].targets, 2);
  assert_eq!(first.counters.marked(), 1);

  // Act
  container.add_instance(Cache).unwrap();

  // Assert
  assert_eq!(first.counters.injected(), 1);
  assert_eq!(second.counters.injected(), 1);
  assert!(first.cache.is_set() && second.cache.is_set());
}

#[test]
fn test_one_registration_completes_entries_of_different_types() {
  let container = Container::new();
  container.add_instance(logger()).unwrap();
  container.add_instance(database()).unwrap();
  container.unregister::<Database>().unwrap();
  let report = Arc::new(ReportService::default());
  let warmer = Arc::new(CacheWarmer::default());
  container.resolve_dependencies(&report).unwrap();
  container.resolve_dependencies(&warmer).unwrap();
  assert_eq!(container.waiting_entries().len(), 2);

  container.add_instance(Cache).unwrap();
  assert_eq!(warmer.counters.injected(), 1);
  assert_eq!(report.counters.injected(), 0);

  container.add_instance(database()).unwrap();
  assert_eq!(report.counters.injected(), 1);
  assert!(container.waiting_entries().is_empty());
}

#[test]
fn test_registration_in_parent_completes_pending_child_instance() {
  // Arrange
  let injector = Injector::new();
  let tenant = injector.create_container(Some("tenant")).unwrap();
  tenant.add_instance(logger()).unwrap();
  let service = Arc::new(ReportService::default());
  assert!(!tenant.resolve_dependencies(&service).unwrap().is_complete());

  // Act
  injector.root().add_instance(database()).unwrap();

  // Assert
  assert_eq!(service.counters.injected(), 1);
  assert_eq!(service.database.get().unwrap().url, "postgres://db");
  assert!(tenant.waiting_entries().is_empty());
}

#[test]
fn test_parent_removal_is_shadowed_by_local_registration() {
  // Arrange
  let parent = Container::new();
  parent.add_instance(logger()).unwrap();
  let child = parent.create_sub_container("child").unwrap();
  child.add_instance(Logger { prefix: "[child]" }).unwrap();
  let service = Arc::new(ReportService::default());
  child.resolve_dependencies(&service).unwrap();

  // Act
  parent.unregister::<Logger>().unwrap();
  child.add_instance(database()).unwrap();

  // Assert
  assert_eq!(service.counters.injected(), 1);
  assert_eq!(service.logger.get().unwrap().prefix, "[child]");
}

#[test]
fn test_parent_removal_regresses_child_entry() {
  let parent = Container::new();
  let child = parent.create_sub_container("child").unwrap();
  let service = Arc::new(ReportService::default());
  child.resolve_dependencies(&service).unwrap();

  parent.add_instance(logger()).unwrap();
  parent.unregister::<Logger>().unwrap();
  parent.add_instance(database()).unwrap();

  assert_eq!(service.counters.injected(), 0);
  assert!(child.waiting_index_is_consistent());
  assert!(child.waiting_entries()[0].is_waiting_on(&ServiceKey::of::<Logger>()));
}

#[test]
fn test_missing_dependency_of_a_factory_is_tracked() {
  // Arrange: the database factory itself needs a `Cache` that is missing.
  let container = Container::new();
  container.add_instance(logger()).unwrap();
  container
    .add_singleton(|resolver| {
      resolver.get::<Cache>()?;
      Ok(database())
    })
    .unwrap();
  let service = Arc::new(ReportService::default());

  // Act
  let resolution = container.resolve_dependencies(&service).unwrap();

  // Assert
  assert_eq!(
    resolution,
    Resolution::Pending {
      missing: vec![ServiceKey::of::<Cache>()]
    }
  );

  container.add_instance(Cache).unwrap();
  assert_eq!(service.counters.injected(), 1);
}

#[test]
fn test_dispose_discards_waiting_entries_without_firing() {
  // Arrange
  let container = Container::new();
  let service = Arc::new(ReportService::default());
  container.resolve_dependencies(&service).unwrap();

  // Act
  container.dispose();

  // Assert
  assert!(container.waiting_entries().is_empty());
  assert_eq!(service.counters.injected(), 0);
  assert!(matches!(
    container.resolve_dependencies(&service),
    Err(InjectError::Disposed(_))
  ));
}

#[test]
fn test_completion_callback_may_register_services() {
  #[derive(Default)]
  struct Bootstrapper {
    cache: Inject<Cache>,
    container: parking_lot::Mutex<Option<Container>>,
  }

  impl DelayedInjection for Bootstrapper {
    fn mark_for_delayed_injection(&self) {}

    fn on_dependencies_injected(&self) {
      if let Some(container) = self.container.lock().as_ref() {
        container.add_instance(logger()).unwrap();
      }
    }
  }

  injectable!(delayed Bootstrapper { cache: Cache });

  // Arrange
  let container = Container::new();
  let bootstrapper = Arc::new(Bootstrapper::default());
  *bootstrapper.container.lock() = Some(container.clone());
  let service = Arc::new(ReportService::default());
  container.add_instance(database()).unwrap();
  container.resolve_dependencies(&bootstrapper).unwrap();
  container.resolve_dependencies(&service).unwrap();

  // Act
  container.add_instance(Cache).unwrap();

  // Assert: the callback's own registration completed the report.
  assert!(container.is_registered::<Logger>());
  assert_eq!(service.counters.injected(), 1);
  *bootstrapper.container.lock() = None;
}

#[test]
fn test_completion_callback_may_register_into_parent_from_another_thread() {
  #[derive(Default)]
  struct Announcer {
    cache: Inject<Cache>,
    parent: parking_lot::Mutex<Option<Container>>,
  }

  impl DelayedInjection for Announcer {
    fn mark_for_delayed_injection(&self) {}

    fn on_dependencies_injected(&self) {
      let parent = self.parent.lock().clone();
      if let Some(parent) = parent {
        // Joining keeps this thread inside the callback while the parent
        // is written from elsewhere.
        thread::spawn(move || parent.add_instance(logger()).unwrap())
          .join()
          .unwrap();
      }
    }
  }

  injectable!(delayed Announcer { cache: Cache });

  // Arrange
  let parent = Container::new();
  let child = parent.create_sub_container("child").unwrap();
  let announcer = Arc::new(Announcer::default());
  *announcer.parent.lock() = Some(parent.clone());
  child.resolve_dependencies(&announcer).unwrap();

  // Act: the parent registration completes the child's entry.
  parent.add_instance(Cache).unwrap();

  // Assert
  assert!(announcer.cache.is_set());
  assert!(parent.is_registered::<Logger>());
  assert!(!child.has_waiting());
  *announcer.parent.lock() = None;
}

#[test]
fn test_concurrent_registration_completes_every_waiter() {
  // Arrange
  let container = Container::new();
  let services: Vec<Arc<ReportService>> =
    (0..16).map(|_| Arc::new(ReportService::default())).collect();

  // Act
  thread::scope(|scope| {
    for service in &services {
      let container = &container;
      scope.spawn(move || {
        container.resolve_dependencies(service).unwrap();
      });
    }
    scope.spawn(|| container.add_instance(logger()).unwrap());
    scope.spawn(|| container.add_instance(database()).unwrap());
  });

  // Assert
  for service in &services {
    assert!(service.logger.is_set() && service.database.is_set());
    assert!(service.counters.injected() <= 1);
    // Anything that entered the graph completed exactly once.
    assert_eq!(service.counters.injected(), service.counters.marked());
  }
  assert!(container.waiting_entries().is_empty());
  assert!(container.waiting_index_is_consistent());
}
