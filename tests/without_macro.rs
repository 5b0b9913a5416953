//! Integration tests using a singleton service WITHOUT the macro.
//!
//! This shows the manual implementation approach: two statics plus a
//! zero-sized type implementing `SingletonApi`. It is what
//! `define_singletons!` expands to.
//!
//! NOTE: All tests use #[serial] because they share the same static service (MY_SERVICE).
//! Running them in parallel would cause interference and non-deterministic failures.

use serial_test::serial;
use singleton_collector::{
    Singleton, SingletonApi, SingletonError, SingletonEvent, SingletonStorage, TraceCallback,
};
use std::sync::{Arc, LazyLock, Mutex};

// ============================================================================
// Manual Service Implementation (Without Macro)
// ============================================================================

/// Static per-type slots for our service
static MY_STORAGE: LazyLock<SingletonStorage> = LazyLock::new(SingletonStorage::new);

/// Static trace callback storage
static MY_TRACE: TraceCallback = Mutex::new(None);

/// Our custom service implementation
struct MyService;

impl SingletonApi for MyService {
    fn storage(&self) -> &SingletonStorage {
        &MY_STORAGE
    }

    fn trace(&self) -> &TraceCallback {
        &MY_TRACE
    }
}

/// Constant instance of our service
const MY_SERVICE: MyService = MyService;

#[derive(Debug)]
struct Config {
    database_url: String,
    max_connections: u32,
}

impl Singleton for Config {}

fn app_config() -> Config {
    Config {
        database_url: "postgresql://localhost/mydb".to_string(),
        max_connections: 100,
    }
}

// ============================================================================
// Tests Using Manual Implementation
// ============================================================================

#[test]
#[serial]
fn test_get_before_create_fails() {
    assert_eq!(
        MY_SERVICE.try_get::<Config>().unwrap_err(),
        SingletonError::NotCreated {
            type_name: std::any::type_name::<Config>()
        }
    );
}

#[test]
#[serial]
fn test_get_returns_same_instance() {
    let created = MY_SERVICE.create(app_config);

    for _ in 0..3 {
        let fetched = MY_SERVICE.get::<Config>();
        assert!(Arc::ptr_eq(&created, &fetched));
    }
    assert_eq!(created.database_url, "postgresql://localhost/mydb");
    assert_eq!(created.max_connections, 100);

    MY_SERVICE.destroy::<Config>();
}

#[test]
#[serial]
#[should_panic(expected = "Singleton already exists")]
fn test_create_twice_halts() {
    MY_SERVICE.create(app_config);
    // Let the next test start clean even though this one halts.
    let _cleanup = Cleanup;
    MY_SERVICE.create(app_config);
}

#[test]
#[serial]
#[should_panic(expected = "Singleton not created")]
fn test_get_after_destroy_halts() {
    MY_SERVICE.create(app_config);
    MY_SERVICE.destroy::<Config>();
    let _ = MY_SERVICE.get::<Config>();
}

#[test]
#[serial]
#[should_panic(expected = "Singleton not created")]
fn test_destroy_twice_halts() {
    MY_SERVICE.create(app_config);
    MY_SERVICE.destroy::<Config>();
    MY_SERVICE.destroy::<Config>();
}

#[test]
#[serial]
fn test_destroy_drops_value_after_last_handle() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    static DROPS: AtomicUsize = AtomicUsize::new(0);

    struct Resource;
    impl Singleton for Resource {}
    impl Drop for Resource {
        fn drop(&mut self) {
            DROPS.fetch_add(1, Ordering::SeqCst);
        }
    }

    MY_SERVICE.create(|| Resource);
    let handle = MY_SERVICE.get::<Resource>();

    MY_SERVICE.destroy::<Resource>();
    assert!(!MY_SERVICE.contains::<Resource>());
    assert_eq!(DROPS.load(Ordering::SeqCst), 0);

    drop(handle);
    assert_eq!(DROPS.load(Ordering::SeqCst), 1);
}

#[test]
#[serial]
fn test_constructor_arguments_are_captured() {
    struct Pool {
        size: usize,
        name: String,
    }
    impl Singleton for Pool {}

    let size = 8;
    let name = "workers".to_string();
    MY_SERVICE.create(move || Pool { size, name });

    let pool = MY_SERVICE.get::<Pool>();
    assert_eq!(pool.size, 8);
    assert_eq!(pool.name, "workers");
    MY_SERVICE.destroy::<Pool>();
}

#[test]
#[serial]
fn test_manual_trace_callback() {
    let events = Arc::new(Mutex::new(Vec::new()));
    let events_clone = events.clone();

    MY_SERVICE.set_trace_callback(move |e: &SingletonEvent| {
        events_clone.lock().unwrap().push(e.clone());
    });

    MY_SERVICE.create(app_config);
    MY_SERVICE.destroy::<Config>();
    MY_SERVICE.clear_trace_callback();

    let captured = events.lock().unwrap();
    assert_eq!(captured.len(), 3);
    assert!(matches!(
        captured[0],
        SingletonEvent::Create { success: true, .. }
    ));
    assert!(matches!(captured[1], SingletonEvent::PostConstruction { .. }));
    assert!(matches!(
        captured[2],
        SingletonEvent::Destroy { success: true, .. }
    ));
}

#[test]
#[serial]
fn test_thread_safety() {
    use std::sync::{mpsc, Barrier};
    use std::thread;

    struct Shared(u32);
    impl Singleton for Shared {}

    let barrier = Arc::new(Barrier::new(2));
    let (tx, rx) = mpsc::channel();

    let barrier_clone = barrier.clone();
    let handle = thread::spawn(move || {
        MY_SERVICE.create(|| Shared(100));
        tx.send(()).unwrap();

        // Wait for the main thread to read the value
        barrier_clone.wait();
        MY_SERVICE.destroy::<Shared>();
    });

    rx.recv().unwrap();
    let value = MY_SERVICE.get::<Shared>();
    assert_eq!(value.0, 100);
    barrier.wait();

    handle.join().unwrap();
    assert!(!MY_SERVICE.contains::<Shared>());
}

/// Destroys `Config` when the halting test unwinds.
struct Cleanup;

impl Drop for Cleanup {
    fn drop(&mut self) {
        let _ = MY_SERVICE.try_destroy::<Config>();
    }
}
