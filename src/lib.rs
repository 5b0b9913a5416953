//! # Singleton Collector
//!
//! Two small lifecycle utilities:
//!
//! - **Singletons**: at most one live instance per type, created explicitly,
//!   read from anywhere, destroyed explicitly. Reentrant construction is
//!   detected, and [`Singleton::post_construction`] hooks run once a whole
//!   chain of nested constructions has finished, so singletons can safely
//!   reach each other.
//! - **Collectors**: a [`Tracked<T>`] registers its value in a
//!   [`Collector<T>`] while it lives, so every live instance of a type can be
//!   enumerated.
//!
//! ## Quick Start
//!
//! ```rust
//! use singleton_collector::{create, destroy, get, Singleton, Tracked, Collector};
//!
//! struct Config { name: String }
//! impl Singleton for Config {}
//!
//! create(|| Config { name: "app".to_string() });
//! assert_eq!(get::<Config>().name, "app");
//! destroy::<Config>();
//!
//! struct Worker { id: u32 }
//! let workers: Vec<_> = (0..4).map(|id| Tracked::new(Worker { id })).collect();
//! assert_eq!(Collector::<Worker>::global().len(), 4);
//! drop(workers);
//! assert!(Collector::<Worker>::global().is_empty());
//! ```
//!
//! ## Contract checks
//!
//! Creating twice, reading before creation, destroying twice and registering
//! twice are defects in the calling code. The plain operations halt with a
//! diagnostic; each has a `try_*` twin returning [`SingletonError`].
//!
//! ## Main Functions
//!
//! - [`create`] / [`try_create`] - Construct the process-wide instance of a type
//! - [`get`] / [`try_get`] - Retrieve it as `Arc<T>`
//! - [`destroy`] / [`try_destroy`] - Destroy it
//! - [`contains`] - Check if it is constructed
//! - [`set_trace_callback`] - Set up tracing for singleton operations
//! - [`define_singletons!`] - Declare an isolated static service
//! - [`Singletons`] - An owned service, for explicit injection and test isolation

mod collector;
pub mod construction;
mod holder;
mod macros;
mod singleton_api;
mod singleton_error;
mod singleton_event;
mod singletons;

// Re-export the main public API
pub use collector::{Collector, MemberContainer, Members, MembersIter, Tracked};
pub use holder::SingletonStorage;
pub use singleton_api::{Singleton, SingletonApi, TraceCallback};
pub use singleton_error::SingletonError;
pub use singleton_event::SingletonEvent;
#[allow(deprecated)]
pub use singletons::{
    clear_trace_callback, contains, create, destroy, get, get_during_construction, get_or_create,
    global, set_trace_callback, try_create, try_destroy, try_get, Global, Singletons,
};
