use fibre_inject::{resolve, Injector};
use tracing_subscriber::EnvFilter;

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

struct AppName(&'static str);

fn main() -> fibre_inject::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let injector = Injector::new();
  let root = injector.root();
  root.add_instance(AppName("fibre"))?;
  root.add_singleton_trait::<dyn Greeter>(|_| Ok(std::sync::Arc::new(EnglishGreeter)))?;

  // A tenant container falls back onto the root, but its own registrations win.
  let spain = injector.create_container(Some("tenant-es"))?;
  spain.add_singleton_trait::<dyn Greeter>(|_| Ok(std::sync::Arc::new(SpanishGreeter)))?;

  // A sub-container is owned by the tenant and falls back onto it.
  let requests = spain.create_sub_container("requests")?;

  println!("root says {}", resolve!(root, trait Greeter).greet());
  println!("tenant says {}", resolve!(spain, trait Greeter).greet());
  println!(
    "requests say {} in {}",
    resolve!(requests, trait Greeter).greet(),
    resolve!(requests, AppName).0
  );

  // An isolated container sees nothing from the root.
  let isolated = injector.create_isolated_container(None)?;
  assert!(isolated.get_service::<AppName>().is_none());

  // Deleting the tenant disposes its sub-containers too.
  injector.delete_container("tenant-es");
  assert!(requests.is_disposed());
  Ok(())
}
