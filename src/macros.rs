//! Macros for creating singleton services.
//!
//! This module provides a simple macro-based approach to declare isolated,
//! process-wide singleton services backed by statics.

/// Creates a complete static singleton service with a single macro invocation.
///
/// The macro generates a module containing:
/// - Storage static (hidden)
/// - Trace callback static (hidden)
/// - An `Api` struct that implements `SingletonApi`, and its `API` constant
/// - Free functions delegating to `API`
///
/// # Examples
///
/// ```rust
/// use singleton_collector::{define_singletons, Singleton};
///
/// define_singletons!(services);
///
/// struct Config { verbose: bool }
/// impl Singleton for Config {}
///
/// services::create(|| Config { verbose: true });
/// assert!(services::get::<Config>().verbose);
/// services::destroy::<Config>();
/// assert!(services::try_get::<Config>().is_err());
/// ```
///
/// # Multiple Services
///
/// Each service is completely isolated:
///
/// ```rust
/// use singleton_collector::{define_singletons, Singleton};
///
/// define_singletons!(primary);
/// define_singletons!(replica);
///
/// struct Connection(&'static str);
/// impl Singleton for Connection {}
///
/// primary::create(|| Connection("db-1"));
/// assert!(primary::contains::<Connection>());
/// assert!(!replica::contains::<Connection>());
/// primary::destroy::<Connection>();
/// ```
///
/// # Trait-Based Usage
///
/// The `API` constant can be passed wherever a `SingletonApi` is expected:
///
/// ```rust
/// use singleton_collector::{define_singletons, Singleton, SingletonApi};
///
/// define_singletons!(app);
///
/// struct Counter(u32);
/// impl Singleton for Counter {}
///
/// fn boot(api: &impl SingletonApi) {
///     api.create(|| Counter(0));
/// }
///
/// boot(&app::API);
/// assert_eq!(app::API.get::<Counter>().0, 0);
/// app::API.destroy::<Counter>();
/// ```
#[macro_export]
macro_rules! define_singletons {
    ($name:ident) => {
        pub mod $name {
            use std::sync::{Arc, LazyLock, Mutex, Weak};

            // Per-type instance slots (module-private)
            static STORAGE: LazyLock<$crate::SingletonStorage> =
                LazyLock::new($crate::SingletonStorage::new);

            // Trace callback storage (module-private)
            static TRACE: $crate::TraceCallback = Mutex::new(None);

            /// Zero-sized type that implements the singleton API.
            ///
            /// All operations are provided by the `SingletonApi` trait's
            /// default implementations. This struct only provides access to the statics.
            #[derive(Debug, Clone, Copy)]
            pub struct Api;

            impl $crate::SingletonApi for Api {
                fn storage(&self) -> &$crate::SingletonStorage {
                    &STORAGE
                }

                fn trace(&self) -> &$crate::TraceCallback {
                    &TRACE
                }
            }

            /// Convenient constant for accessing the service.
            pub const API: Api = Api;

            // Free functions for ergonomic usage - they delegate to API

            /// Construct the instance of `T`, halting if one exists.
            pub fn create<T: $crate::Singleton>(ctor: impl FnOnce() -> T) -> Arc<T> {
                use $crate::SingletonApi;
                API.create(ctor)
            }

            /// Construct the instance of `T`.
            pub fn try_create<T: $crate::Singleton>(
                ctor: impl FnOnce() -> T,
            ) -> Result<Arc<T>, $crate::SingletonError> {
                use $crate::SingletonApi;
                API.try_create(ctor)
            }

            /// Retrieve the instance of `T`, halting if it is not constructed.
            pub fn get<T: $crate::Singleton>() -> Arc<T> {
                use $crate::SingletonApi;
                API.get()
            }

            /// Retrieve the instance of `T`.
            pub fn try_get<T: $crate::Singleton>() -> Result<Arc<T>, $crate::SingletonError> {
                use $crate::SingletonApi;
                API.try_get()
            }

            /// Destroy the instance of `T`, halting if there is none.
            pub fn destroy<T: $crate::Singleton>() {
                use $crate::SingletonApi;
                API.destroy::<T>()
            }

            /// Destroy the instance of `T`.
            pub fn try_destroy<T: $crate::Singleton>() -> Result<(), $crate::SingletonError> {
                use $crate::SingletonApi;
                API.try_destroy::<T>()
            }

            /// Check if the instance of `T` is constructed.
            pub fn contains<T: $crate::Singleton>() -> bool {
                use $crate::SingletonApi;
                API.contains::<T>()
            }

            /// Weak pointer to the instance of `T` while it is being built.
            #[deprecated(note = "use `Singleton::post_construction` to reach other singletons safely")]
            #[allow(deprecated)]
            pub fn get_during_construction<T: $crate::Singleton>() -> Weak<T> {
                use $crate::SingletonApi;
                API.get_during_construction()
            }

            /// Retrieve the instance of `T`, constructing it if needed.
            #[deprecated(note = "separate creation from access: call `create` once, then `get`")]
            #[allow(deprecated)]
            pub fn get_or_create<T: $crate::Singleton>(ctor: impl FnOnce() -> T) -> Arc<T> {
                use $crate::SingletonApi;
                API.get_or_create(ctor)
            }

            /// Set a tracing callback for this service.
            pub fn set_trace_callback(
                callback: impl Fn(&$crate::SingletonEvent) + Send + Sync + 'static,
            ) {
                use $crate::SingletonApi;
                API.set_trace_callback(callback)
            }

            /// Clear the tracing callback.
            pub fn clear_trace_callback() {
                use $crate::SingletonApi;
                API.clear_trace_callback()
            }
        }
    };
}
