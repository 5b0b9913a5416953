//! Singleton services.
//!
//! [`Singletons`] is an owned service: construct one, pass it where it is
//! needed, and destroy every instance before dropping it. The crate-level free
//! functions operate on one process-wide service that lives for the whole
//! program.
//!
//! # Examples
//!
//! ```
//! use singleton_collector::{Singleton, SingletonApi, Singletons};
//!
//! struct Config { retries: u32 }
//! impl Singleton for Config {}
//!
//! let services = Singletons::new();
//! services.create(|| Config { retries: 3 });
//! assert_eq!(services.get::<Config>().retries, 3);
//! services.destroy::<Config>();
//! ```

use std::sync::{Arc, LazyLock, Mutex, Weak};

use crate::{Singleton, SingletonApi, SingletonError, SingletonEvent, SingletonStorage, TraceCallback};

/// An owned singleton service with its own storage and trace callback.
///
/// Dropping a service while any of its instances is still initialized is a
/// contract violation and halts, catching a forgotten `destroy`.
#[derive(Debug, Default)]
pub struct Singletons {
    storage: SingletonStorage,
    trace: TraceCallbackSlot,
}

#[derive(Default)]
struct TraceCallbackSlot(TraceCallback);

impl std::fmt::Debug for TraceCallbackSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let set = self.0.lock().map(|cb| cb.is_some()).unwrap_or(false);
        f.debug_struct("TraceCallback").field("set", &set).finish()
    }
}

impl Singletons {
    pub fn new() -> Self {
        Singletons::default()
    }
}

impl SingletonApi for Singletons {
    fn storage(&self) -> &SingletonStorage {
        &self.storage
    }

    fn trace(&self) -> &TraceCallback {
        &self.trace.0
    }
}

impl Drop for Singletons {
    fn drop(&mut self) {
        if std::thread::panicking() {
            return;
        }
        let live = self.storage.initialized_types();
        assert!(
            live.is_empty(),
            "singleton service dropped with live instances, destroy them first: {live:?}"
        );
    }
}

// -------------------------------------------------------------------------------------------------
// Process-wide service
// -------------------------------------------------------------------------------------------------

static GLOBAL_STORAGE: LazyLock<SingletonStorage> = LazyLock::new(SingletonStorage::new);

static GLOBAL_TRACE: TraceCallback = Mutex::new(None);

/// Handle to the process-wide singleton service.
///
/// Statics are never dropped, so the teardown check of [`Singletons`] does not
/// apply here.
#[derive(Debug, Clone, Copy)]
pub struct Global;

impl SingletonApi for Global {
    fn storage(&self) -> &SingletonStorage {
        &GLOBAL_STORAGE
    }

    fn trace(&self) -> &TraceCallback {
        &GLOBAL_TRACE
    }
}

/// The process-wide singleton service.
pub const fn global() -> Global {
    Global
}

/// Constructs the process-wide instance of `T`. Halts if one exists.
///
/// # Examples
///
/// ```
/// use singleton_collector::{create, destroy, get, Singleton};
///
/// struct Greeting(String);
/// impl Singleton for Greeting {}
///
/// create(|| Greeting("Hello, World!".into()));
/// assert_eq!(get::<Greeting>().0, "Hello, World!");
/// destroy::<Greeting>();
/// ```
pub fn create<T: Singleton>(ctor: impl FnOnce() -> T) -> Arc<T> {
    Global.create(ctor)
}

/// Constructs the process-wide instance of `T`.
pub fn try_create<T: Singleton>(ctor: impl FnOnce() -> T) -> Result<Arc<T>, SingletonError> {
    Global.try_create(ctor)
}

/// Returns the process-wide instance of `T`. Halts if it is not constructed.
pub fn get<T: Singleton>() -> Arc<T> {
    Global.get()
}

/// Returns the process-wide instance of `T`.
///
/// # Examples
///
/// ```
/// use singleton_collector::{try_get, Singleton, SingletonError};
///
/// struct Missing;
/// impl Singleton for Missing {}
///
/// assert!(matches!(try_get::<Missing>(), Err(SingletonError::NotCreated { .. })));
/// ```
pub fn try_get<T: Singleton>() -> Result<Arc<T>, SingletonError> {
    Global.try_get()
}

/// Destroys the process-wide instance of `T`. Halts if there is none.
pub fn destroy<T: Singleton>() {
    Global.destroy::<T>()
}

/// Destroys the process-wide instance of `T`.
pub fn try_destroy<T: Singleton>() -> Result<(), SingletonError> {
    Global.try_destroy::<T>()
}

/// Whether the process-wide instance of `T` is constructed.
pub fn contains<T: Singleton>() -> bool {
    Global.contains::<T>()
}

/// Weak pointer to the process-wide instance of `T` while it is being built.
#[deprecated(note = "use `Singleton::post_construction` to reach other singletons safely")]
#[allow(deprecated)]
pub fn get_during_construction<T: Singleton>() -> Weak<T> {
    Global.get_during_construction()
}

/// Returns the process-wide instance of `T`, constructing it if needed.
#[deprecated(note = "separate creation from access: call `create` once, then `get`")]
#[allow(deprecated)]
pub fn get_or_create<T: Singleton>(ctor: impl FnOnce() -> T) -> Arc<T> {
    Global.get_or_create(ctor)
}

/// Sets a tracing callback on the process-wide service.
///
/// # Example
/// ```rust
/// use singleton_collector::{set_trace_callback, clear_trace_callback};
///
/// set_trace_callback(|event| println!("[singleton-trace] {}", event));
/// clear_trace_callback();
/// ```
pub fn set_trace_callback(callback: impl Fn(&SingletonEvent) + Send + Sync + 'static) {
    Global.set_trace_callback(callback)
}

/// Clears the tracing callback of the process-wide service.
pub fn clear_trace_callback() {
    Global.clear_trace_callback()
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
