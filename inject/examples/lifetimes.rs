use fibre_inject::{Container, Dispose, Lifetime, Registration};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

struct Connection {
  id: usize,
}

impl Dispose for Connection {
  fn dispose(&self) {
    println!("closing connection #{}", self.id);
  }
}

fn connect() -> fibre_inject::Result<Connection> {
  Ok(Connection {
    id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
  })
}

fn main() -> fibre_inject::Result<()> {
  let container = Container::new();
  container.register(Registration::with_lifetime(Lifetime::Scoped, |_| connect()).disposable())?;
  container.add_transient(|_| Ok(String::from("transient value")))?;

  let a = container.get_required_service::<String>()?;
  let b = container.get_required_service::<String>()?;
  println!("transients are distinct: {}", !Arc::ptr_eq(&a, &b));

  for request in 0..2 {
    let scope = container.create_scope()?;
    let first = scope.get_required_service::<Connection>()?;
    let again = scope.get_required_service::<Connection>()?;
    println!(
      "request {} uses connection #{} (same instance: {})",
      request,
      first.id,
      Arc::ptr_eq(&first, &again)
    );
    // Dropping the scope closes its connection.
  }

  Ok(())
}
