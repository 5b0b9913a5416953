use thiserror::Error;

/// Contract violations reported by singleton services and collectors.
///
/// Every variant describes a defect in the calling code rather than a runtime
/// condition worth retrying. The `try_*` operations hand these back as values;
/// their plain counterparts halt with the same message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SingletonError {
    #[error("Singleton already exists: {type_name}")]
    AlreadyExists { type_name: &'static str },

    #[error("Singleton not created: {type_name}")]
    NotCreated { type_name: &'static str },

    /// The instance is still being built, mostly a reentrant access from its own
    /// constructor. Move that logic into `Singleton::post_construction`.
    #[error("Singleton is under construction: {type_name}")]
    UnderConstruction { type_name: &'static str },

    #[error("Singleton is not under construction: {type_name}")]
    NotUnderConstruction { type_name: &'static str },

    /// A stored value did not downcast to the type it is keyed by.
    #[error("Type mismatch in singleton storage for type: {type_name}")]
    TypeMismatch { type_name: &'static str },

    #[error("Instance already registered in collector: {type_name}")]
    AlreadyRegistered { type_name: &'static str },

    #[error("Instance not registered in collector: {type_name}")]
    NotRegistered { type_name: &'static str },
}

impl SingletonError {
    /// Name of the type the violation is about.
    pub fn type_name(&self) -> &'static str {
        match self {
            SingletonError::AlreadyExists { type_name }
            | SingletonError::NotCreated { type_name }
            | SingletonError::UnderConstruction { type_name }
            | SingletonError::NotUnderConstruction { type_name }
            | SingletonError::TypeMismatch { type_name }
            | SingletonError::AlreadyRegistered { type_name }
            | SingletonError::NotRegistered { type_name } => type_name,
        }
    }
}
