use fibre_inject::{injectable, Container, DelayedInjection, Inject, Resolution};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

struct Clock;

struct Mailer {
  relay: String,
}

#[derive(Default)]
struct NightlyReport {
  clock: Inject<Clock>,
  mailer: Inject<Mailer>,
}

impl DelayedInjection for NightlyReport {
  fn mark_for_delayed_injection(&self) {
    println!("NightlyReport: waiting for dependencies");
  }

  fn on_dependencies_injected(&self) {
    let relay = self.mailer.get().map(|mailer| mailer.relay.clone());
    println!("NightlyReport: ready, mailing through {:?}", relay);
  }
}

injectable!(delayed NightlyReport {
  clock: Clock,
  mailer: Mailer,
});

fn main() -> fibre_inject::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")))
    .init();

  let container = Container::with_id("reports")?;
  container.add_instance(Clock)?;

  // The mailer is not registered yet, so the report is parked.
  let report = Arc::new(NightlyReport::default());
  match container.resolve_dependencies(&report)? {
    Resolution::Complete => println!("resolved immediately"),
    Resolution::Pending { missing } => println!("pending on {} service(s)", missing.len()),
  }
  println!("waiting entries: {:?}", container.waiting_entries());

  // Registering the last missing dependency completes the report.
  container.add_singleton(|_| {
    Ok(Mailer {
      relay: "smtp://localhost".to_string(),
    })
  })?;

  assert!(report.mailer.is_set());
  assert!(container.waiting_entries().is_empty());
  Ok(())
}
