//! Per-type instance slot.
//!
//! An [`InstanceHolder`] is the storage cell a singleton service keeps for one
//! `TypeId`. It moves through three states under its own mutex:
//!
//! ```text
//! Empty --reserve--> Constructing --complete--> Ready --take--> Empty
//!                         |
//!                         +--abandon--> Empty   (constructor unwound)
//! ```
//!
//! "Occupied" means anything but `Empty`; "initialized" means `Ready`.
//!
//! [`SingletonStorage`] owns one holder per type for a singleton service.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, Weak};

use crate::{Singleton, SingletonError};

/// Type-erased owning pointer to a constructed singleton.
pub(crate) type ErasedInstance = Arc<dyn Any + Send + Sync>;

pub(crate) enum SlotState {
    Empty,
    /// Storage is reserved. Holds a boxed `Weak<T>` once the allocation exists.
    Constructing(Option<Box<dyn Any + Send + Sync>>),
    Ready(ErasedInstance),
}

pub(crate) struct InstanceHolder {
    type_id: TypeId,
    type_name: &'static str,
    state: Mutex<SlotState>,
    /// Signalled when `Constructing` ends, either way.
    settled: Condvar,
}

impl InstanceHolder {
    pub(crate) fn new<T: Any>() -> Self {
        InstanceHolder {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            state: Mutex::new(SlotState::Empty),
            settled: Condvar::new(),
        }
    }

    pub(crate) fn type_name(&self) -> &'static str {
        self.type_name
    }

    // Every transition leaves the state consistent before releasing the guard,
    // so a poisoned lock still holds valid data.
    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    #[cfg(test)]
    pub(crate) fn is_occupied(&self) -> bool {
        !matches!(*self.lock(), SlotState::Empty)
    }

    pub(crate) fn is_initialized(&self) -> bool {
        matches!(*self.lock(), SlotState::Ready(_))
    }

    /// Occupied but not yet initialized.
    pub(crate) fn is_constructing(&self) -> bool {
        matches!(*self.lock(), SlotState::Constructing(_))
    }

    /// `Empty -> Constructing`.
    pub(crate) fn reserve(&self) -> Result<(), SingletonError> {
        let mut state = self.lock();
        match *state {
            SlotState::Empty => {
                *state = SlotState::Constructing(None);
                Ok(())
            }
            _ => Err(SingletonError::AlreadyExists {
                type_name: self.type_name,
            }),
        }
    }

    /// Makes the allocation being built reachable through
    /// [`InstanceHolder::weak_during_construction`].
    pub(crate) fn publish_weak<T: Send + Sync + 'static>(&self, weak: Weak<T>) {
        debug_assert_eq!(self.type_id, TypeId::of::<T>());
        if let SlotState::Constructing(slot) = &mut *self.lock() {
            *slot = Some(Box::new(weak));
        }
    }

    /// `Constructing -> Ready`.
    pub(crate) fn complete(&self, instance: ErasedInstance) {
        let mut state = self.lock();
        debug_assert!(matches!(*state, SlotState::Constructing(_)));
        *state = SlotState::Ready(instance);
        self.settled.notify_all();
    }

    /// `Constructing -> Empty`, used when the constructor panicked.
    pub(crate) fn abandon(&self) {
        let mut state = self.lock();
        if matches!(*state, SlotState::Constructing(_)) {
            *state = SlotState::Empty;
            self.settled.notify_all();
        }
    }

    /// Blocks while the slot is `Constructing`.
    ///
    /// Must not be called by the thread running the constructor.
    pub(crate) fn wait_until_settled(&self) {
        let guard = self.lock();
        let _settled = self
            .settled
            .wait_while(guard, |state| matches!(state, SlotState::Constructing(_)))
            .unwrap_or_else(|p| p.into_inner());
    }

    /// Whether the slot is `Ready` with exactly this allocation.
    pub(crate) fn holds(&self, instance: &Arc<dyn Singleton>) -> bool {
        match &*self.lock() {
            SlotState::Ready(current) => {
                Arc::as_ptr(current).cast::<()>() == Arc::as_ptr(instance).cast::<()>()
            }
            _ => false,
        }
    }

    pub(crate) fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, SingletonError> {
        let instance = match &*self.lock() {
            SlotState::Ready(instance) => instance.clone(),
            SlotState::Constructing(_) => {
                return Err(SingletonError::UnderConstruction {
                    type_name: self.type_name,
                })
            }
            SlotState::Empty => {
                return Err(SingletonError::NotCreated {
                    type_name: self.type_name,
                })
            }
        };

        instance
            .downcast::<T>()
            .map_err(|_| SingletonError::TypeMismatch {
                type_name: self.type_name,
            })
    }

    pub(crate) fn weak_during_construction<T: Send + Sync + 'static>(
        &self,
    ) -> Result<Weak<T>, SingletonError> {
        match &*self.lock() {
            SlotState::Constructing(Some(weak)) => weak
                .downcast_ref::<Weak<T>>()
                .cloned()
                .ok_or(SingletonError::TypeMismatch {
                    type_name: self.type_name,
                }),
            // Reserved but the allocation is not made yet; nothing to point at.
            SlotState::Constructing(None) => Ok(Weak::new()),
            _ => Err(SingletonError::NotUnderConstruction {
                type_name: self.type_name,
            }),
        }
    }

    /// `Ready -> Empty`, handing the owning pointer to the caller so the value
    /// is dropped outside the guard.
    pub(crate) fn take(&self) -> Result<ErasedInstance, SingletonError> {
        let mut state = self.lock();
        match std::mem::replace(&mut *state, SlotState::Empty) {
            SlotState::Ready(instance) => Ok(instance),
            other => {
                let err = match other {
                    SlotState::Constructing(_) => SingletonError::UnderConstruction {
                        type_name: self.type_name,
                    },
                    _ => SingletonError::NotCreated {
                        type_name: self.type_name,
                    },
                };
                *state = other;
                Err(err)
            }
        }
    }
}

/// Per-type instance slots of one singleton service.
///
/// The map itself is only locked to look up or insert a holder; state
/// transitions happen under the holder's own guard, so different types never
/// contend with each other.
#[derive(Default)]
pub struct SingletonStorage {
    holders: Mutex<HashMap<TypeId, Arc<InstanceHolder>>>,
}

impl SingletonStorage {
    pub fn new() -> Self {
        SingletonStorage::default()
    }

    fn holders(&self) -> MutexGuard<'_, HashMap<TypeId, Arc<InstanceHolder>>> {
        self.holders.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// The holder for `T`, created empty on first access.
    pub(crate) fn holder<T: Any>(&self) -> Arc<InstanceHolder> {
        self.holders()
            .entry(TypeId::of::<T>())
            .or_insert_with(|| Arc::new(InstanceHolder::new::<T>()))
            .clone()
    }

    /// The holder for `T`, if one was ever created.
    pub(crate) fn existing<T: Any>(&self) -> Option<Arc<InstanceHolder>> {
        self.holders().get(&TypeId::of::<T>()).cloned()
    }

    /// Names of the types whose instance is currently initialized.
    pub fn initialized_types(&self) -> Vec<&'static str> {
        let holders: Vec<_> = self.holders().values().cloned().collect();
        holders
            .into_iter()
            .filter(|holder| holder.is_initialized())
            .map(|holder| holder.type_name())
            .collect()
    }
}

impl std::fmt::Debug for SingletonStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonStorage")
            .field("initialized", &self.initialized_types())
            .finish()
    }
}
