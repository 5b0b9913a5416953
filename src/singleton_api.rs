//! Core traits defining singleton behavior.
//!
//! [`Singleton`] is implemented by the types that want a single live instance
//! per service. [`SingletonApi`] provides the create / get / destroy operations
//! with default implementations, requiring only access to the service's
//! storage and trace callback.
//!
//! Each operation comes in two forms. The `try_*` form returns a
//! [`SingletonError`] describing the contract violation; the plain form halts
//! with that message, since every such violation is a defect in the caller.

use std::sync::{Arc, Mutex, Weak};

use crate::construction::{self, ConstructionFrame, EventSink, PendingHook};
use crate::holder::InstanceHolder;
use crate::{SingletonError, SingletonEvent, SingletonStorage};

/// Storage for the optional trace callback of a service.
///
/// `Mutex::new(None)` is const, so this can back a plain `static`.
pub type TraceCallback = Mutex<Option<Arc<dyn Fn(&SingletonEvent) + Send + Sync>>>;

/// A type with at most one live instance per singleton service.
///
/// # Post construction
///
/// A constructor must not call `get` for its own type: the instance does not
/// exist yet. Constructors may create or read *other* singletons, and the
/// logic that needs the full set should move into
/// [`Singleton::post_construction`], which runs once the outermost `create` of
/// the chain has finished constructing.
///
/// ```rust
/// use singleton_collector::{define_singletons, Singleton};
///
/// define_singletons!(app);
///
/// struct Database { url: String }
/// struct Cache;
///
/// impl Singleton for Database {}
///
/// impl Singleton for Cache {
///     fn post_construction(&self) {
///         // Database is fully constructed here even though it is the one
///         // that created us.
///         assert_eq!(app::get::<Database>().url, "postgres://localhost");
///     }
/// }
///
/// app::create(|| {
///     app::create(|| Cache);
///     Database { url: "postgres://localhost".into() }
/// });
///
/// app::destroy::<Cache>();
/// app::destroy::<Database>();
/// ```
pub trait Singleton: Send + Sync + 'static {
    /// Called once, after the outermost `create` of the construction chain
    /// this instance was built in has returned from its constructor.
    fn post_construction(&self) {}
}

/// Singleton service operations.
///
/// Provides default implementations for all operations, requiring only two
/// accessor methods (`storage` and `trace`) to be implemented.
pub trait SingletonApi {
    // -------------------------------------------------------------------------------------------------
    // Tracing
    // -------------------------------------------------------------------------------------------------

    /// Access the trace callback slot.
    fn trace(&self) -> &TraceCallback;

    /// Set a tracing callback for singleton operations.
    ///
    /// The callback is invoked after the service released its locks, so it may
    /// call back into the service.
    fn set_trace_callback(&self, callback: impl Fn(&SingletonEvent) + Send + Sync + 'static) {
        let mut guard = self.trace().lock().unwrap_or_else(|p| p.into_inner());
        *guard = Some(Arc::new(callback));
    }

    /// Clear the tracing callback.
    fn clear_trace_callback(&self) {
        let mut guard = self.trace().lock().unwrap_or_else(|p| p.into_inner());
        *guard = None;
    }

    /// Emit an event through the current callback, if any.
    fn emit_event(&self, event: &SingletonEvent) {
        if let Some(callback) = current_sink(self) {
            callback(event);
        }
    }

    // -------------------------------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------------------------------

    /// Access the per-type instance slots.
    fn storage(&self) -> &SingletonStorage;

    /// Construct the instance of `T` with `ctor`.
    ///
    /// The slot is marked occupied before `ctor` runs and initialized after it
    /// returns. The guard is not held while `ctor` runs, so it may create or
    /// read other singletons. Hooks queued during the chain run before this
    /// returns when this is the outermost `create` on the thread.
    ///
    /// # Errors
    ///
    /// - [`SingletonError::AlreadyExists`] if an instance of `T` exists or is
    ///   being constructed (including from inside its own constructor).
    ///
    /// If `ctor` panics, the slot goes back to empty and the panic propagates.
    fn try_create<T: Singleton>(&self, ctor: impl FnOnce() -> T) -> Result<Arc<T>, SingletonError> {
        let holder = self.storage().holder::<T>();

        if let Err(err) = holder.reserve() {
            self.emit_event(&SingletonEvent::Create {
                type_name: std::any::type_name::<T>(),
                success: false,
            });
            return Err(err);
        }

        Ok(construct(self, holder, ctor))
    }

    /// Like [`SingletonApi::try_create`], halting on a contract violation.
    fn create<T: Singleton>(&self, ctor: impl FnOnce() -> T) -> Arc<T> {
        self.try_create(ctor).unwrap_or_else(|err| panic!("{err}"))
    }

    /// Retrieve the fully constructed instance of `T`.
    ///
    /// Every call between `create` and `destroy` returns the same allocation.
    ///
    /// # Errors
    ///
    /// - [`SingletonError::NotCreated`] before `create` or after `destroy`
    /// - [`SingletonError::UnderConstruction`] while `T`'s constructor runs,
    ///   mostly a reentrant access from that constructor
    fn try_get<T: Singleton>(&self) -> Result<Arc<T>, SingletonError> {
        let result = match self.storage().existing::<T>() {
            Some(holder) => holder.get::<T>(),
            None => Err(SingletonError::NotCreated {
                type_name: std::any::type_name::<T>(),
            }),
        };

        self.emit_event(&SingletonEvent::Get {
            type_name: std::any::type_name::<T>(),
            found: result.is_ok(),
        });

        result
    }

    /// Like [`SingletonApi::try_get`], halting on a contract violation.
    fn get<T: Singleton>(&self) -> Arc<T> {
        self.try_get().unwrap_or_else(|err| panic!("{err}"))
    }

    /// Whether a fully constructed instance of `T` exists.
    fn contains<T: Singleton>(&self) -> bool {
        self.storage()
            .existing::<T>()
            .is_some_and(|holder| holder.is_initialized())
    }

    /// Whether `T`'s constructor is currently running (on any thread).
    fn is_under_construction<T: Singleton>(&self) -> bool {
        self.storage()
            .existing::<T>()
            .is_some_and(|holder| holder.is_constructing())
    }

    /// Destroy the instance of `T`, leaving the slot empty.
    ///
    /// The service drops its owning pointer; `T`'s destructor runs once the
    /// last `Arc` handed out by `get` is gone.
    ///
    /// # Errors
    ///
    /// - [`SingletonError::NotCreated`] if there is no instance
    /// - [`SingletonError::UnderConstruction`] if the instance is still being built
    fn try_destroy<T: Singleton>(&self) -> Result<(), SingletonError> {
        let result = match self.storage().existing::<T>() {
            Some(holder) => holder.take(),
            None => Err(SingletonError::NotCreated {
                type_name: std::any::type_name::<T>(),
            }),
        };

        self.emit_event(&SingletonEvent::Destroy {
            type_name: std::any::type_name::<T>(),
            success: result.is_ok(),
        });

        let instance = result?;
        tracing::debug!(
            type_name = std::any::type_name::<T>(),
            "destroyed singleton"
        );
        drop(instance);
        Ok(())
    }

    /// Like [`SingletonApi::try_destroy`], halting on a contract violation.
    fn destroy<T: Singleton>(&self) {
        self.try_destroy::<T>().unwrap_or_else(|err| panic!("{err}"))
    }

    // -------------------------------------------------------------------------------------------------
    // Discouraged accessors
    // -------------------------------------------------------------------------------------------------

    /// Weak pointer to the instance of `T` while its constructor is running.
    ///
    /// The pointer cannot be upgraded until the constructor has returned, so
    /// the half-built value is never observable; afterwards it upgrades to the
    /// singleton. Prefer [`Singleton::post_construction`].
    ///
    /// # Errors
    ///
    /// - [`SingletonError::NotUnderConstruction`] if `T` is not being constructed
    #[deprecated(note = "use `Singleton::post_construction` to reach other singletons safely")]
    fn try_get_during_construction<T: Singleton>(&self) -> Result<Weak<T>, SingletonError> {
        match self.storage().existing::<T>() {
            Some(holder) => holder.weak_during_construction::<T>(),
            None => Err(SingletonError::NotUnderConstruction {
                type_name: std::any::type_name::<T>(),
            }),
        }
    }

    /// Like [`SingletonApi::try_get_during_construction`], halting on a
    /// contract violation.
    #[deprecated(note = "use `Singleton::post_construction` to reach other singletons safely")]
    #[allow(deprecated)]
    fn get_during_construction<T: Singleton>(&self) -> Weak<T> {
        self.try_get_during_construction()
            .unwrap_or_else(|err| panic!("{err}"))
    }

    /// Return the instance of `T`, constructing it with `ctor` if needed.
    ///
    /// Double-checked: an existing instance is returned without reserving the
    /// slot. If another thread wins the race to construct, this blocks until
    /// its constructor finishes; if that constructor panics, the next waiter
    /// to get the slot constructs instead.
    ///
    /// # Panics
    ///
    /// When called for `T` from inside `T`'s own constructor.
    #[deprecated(note = "separate creation from access: call `create` once, then `get`")]
    fn get_or_create<T: Singleton>(&self, ctor: impl FnOnce() -> T) -> Arc<T> {
        let holder = self.storage().holder::<T>();
        loop {
            match holder.get::<T>() {
                Ok(instance) => return instance,
                Err(err @ SingletonError::UnderConstruction { .. }) => {
                    if construction::is_constructing(&holder) {
                        panic!("{err}");
                    }
                    holder.wait_until_settled();
                }
                Err(SingletonError::NotCreated { .. }) => {
                    if holder.reserve().is_ok() {
                        return construct(self, holder, ctor);
                    }
                }
                Err(err) => panic!("{err}"),
            }
        }
    }
}

/// Runs `ctor` for a slot that was just reserved and drives it to `Ready`.
fn construct<A, T>(api: &A, holder: Arc<InstanceHolder>, ctor: impl FnOnce() -> T) -> Arc<T>
where
    A: SingletonApi + ?Sized,
    T: Singleton,
{
    let type_name = std::any::type_name::<T>();
    let frame = ConstructionFrame::enter(holder.clone());
    let instance = Arc::new_cyclic(|weak: &Weak<T>| {
        holder.publish_weak(weak.clone());
        ctor()
    });
    holder.complete(instance.clone());

    tracing::debug!(
        type_name,
        address = ?Arc::as_ptr(&instance),
        depth = construction::depth(),
        "constructed singleton"
    );

    let hooks = frame.finish(instance.clone(), current_sink(api));
    api.emit_event(&SingletonEvent::Create {
        type_name,
        success: true,
    });
    run_post_construction(hooks);

    instance
}

fn current_sink<A: SingletonApi + ?Sized>(api: &A) -> EventSink {
    api.trace().lock().unwrap_or_else(|p| p.into_inner()).clone()
}

/// Runs drained hooks, reporting each to the service that built the instance.
fn run_post_construction(hooks: Vec<PendingHook>) {
    for hook in hooks {
        let type_name = hook.holder.type_name();
        if !hook.holder.holds(&hook.instance) {
            tracing::debug!(type_name, "skipping hook of singleton destroyed during its chain");
            continue;
        }

        tracing::trace!(type_name, "running post construction hook");
        if let Some(sink) = &hook.sink {
            sink(&SingletonEvent::PostConstruction { type_name });
        }
        hook.instance.post_construction();
    }
}

// -------------------------------------------------------------------------------------------------
// Tests
// -------------------------------------------------------------------------------------------------
