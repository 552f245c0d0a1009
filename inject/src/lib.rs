//! # Fibre Inject
//!
//! A thread-safe dependency registration and resolution engine with
//! hierarchical containers and delayed injection.
//!
//! Services are registered into a [`Container`] keyed by their type (and an
//! optional name) with a [`Lifetime`]. Objects declare the dependencies they
//! want filled as [`Inject`] slots and have them injected with
//! [`Container::resolve_dependencies`]. When a dependency is not registered
//! yet, an object that opts into [`DelayedInjection`] is parked in the
//! container instead of failing, and is completed the moment its last missing
//! dependency shows up.
//!
//! ## Core Concepts
//!
//! - **Container**: stores registrations, resolves lookups locally first and
//!   then through its fallback parent, and owns its sub-containers.
//! - **Injector**: an explicitly constructed registry of containers with a
//!   root container the others can fall back onto. There is no hidden global
//!   container.
//! - **Lifetimes**: singletons are built once per container, scoped services
//!   once per [`Scope`], transients on every request.
//! - **Delayed injection**: a per-container graph tracks waiting instances and
//!   fires `on_dependencies_injected` exactly once per instance.
//!
//! ## Quick Start
//!
//! ```
//! use fibre_inject::{injectable, DelayedInjection, Container, Inject, Resolution};
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//!
//! struct Clock;
//! struct Mailer;
//!
//! #[derive(Default)]
//! struct Report {
//!   clock: Inject<Clock>,
//!   mailer: Inject<Mailer>,
//!   ready: AtomicBool,
//! }
//!
//! impl DelayedInjection for Report {
//!   fn mark_for_delayed_injection(&self) {}
//!
//!   fn on_dependencies_injected(&self) {
//!     self.ready.store(true, Ordering::SeqCst);
//!   }
//! }
//!
//! injectable!(delayed Report { clock: Clock, mailer: Mailer });
//!
//! let container = Container::new();
//! container.add_instance(Clock).unwrap();
//!
//! let report = Arc::new(Report::default());
//! let resolution = container.resolve_dependencies(&report).unwrap();
//! assert!(matches!(resolution, Resolution::Pending { .. }));
//! assert!(report.clock.is_set());
//!
//! container.add_instance(Mailer).unwrap();
//! assert!(report.ready.load(Ordering::SeqCst));
//! assert!(report.mailer.is_set());
//! ```

mod catalog;
mod container;
mod core;
mod delayed;
mod descriptor;
mod error;
mod injector;
mod macros;
mod scope;
mod store;

pub use crate::catalog::{
  injection_points, is_cataloged, Inject, Injectable, InjectionPoint, InjectionPointList,
  InjectionPoints,
};
pub use crate::container::{Container, Resolution, ServiceResolver};
pub use crate::core::{Lifetime, ServiceKey, ServiceRef, TypeInfo};
pub use crate::delayed::{DelayedInjection, WaitingEntryInfo};
pub use crate::descriptor::{
  Arguments, Construct, Dispose, ImplementationKind, Registration, ServiceDescriptor,
};
pub use crate::error::{InjectError, Result};
pub use crate::injector::{Injector, InjectorBuilder, DEFAULT_ROOT_ID};
pub use crate::scope::Scope;
pub use crate::store::{ChangeListener, StoreChange};
