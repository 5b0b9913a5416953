/// Events emitted by a singleton service during operations.
///
/// These events are passed to the tracing callback set via `set_trace_callback`.
/// The `Clone` derive allows callbacks to store or forward events if needed.
///
/// # Examples
///
/// ```rust
/// use singleton_collector::SingletonEvent;
///
/// let event = SingletonEvent::Create { type_name: "Config", success: true };
/// println!("{:?}", event);
/// ```
#[derive(Debug, Clone)]
pub enum SingletonEvent {
    /// A `create` call finished (successfully or not).
    Create {
        /// The type name of the singleton (e.g., "app::Config")
        type_name: &'static str,
        /// Whether a new instance was constructed
        success: bool,
    },

    /// An instance was requested from the service.
    Get {
        /// The type name that was requested
        type_name: &'static str,
        /// Whether a fully constructed instance was found
        found: bool,
    },

    /// A `destroy` call finished.
    Destroy {
        type_name: &'static str,
        success: bool,
    },

    /// A post-construction hook is about to run.
    PostConstruction { type_name: &'static str },
}

impl std::fmt::Display for SingletonEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SingletonEvent::Create { type_name, success } => {
                write!(f, "create {{ type_name: {}, success: {} }}", type_name, success)
            }
            SingletonEvent::Get { type_name, found } => {
                write!(f, "get {{ type_name: {}, found: {} }}", type_name, found)
            }
            SingletonEvent::Destroy { type_name, success } => {
                write!(
                    f,
                    "destroy {{ type_name: {}, success: {} }}",
                    type_name, success
                )
            }
            SingletonEvent::PostConstruction { type_name } => {
                write!(f, "post_construction {{ type_name: {} }}", type_name)
            }
        }
    }
}
