//! Post-construction coordination.
//!
//! Each thread keeps a stack of the singleton types it is currently
//! constructing. Creating singleton `A` pushes a frame; if `A`'s constructor
//! creates `B`, a second frame goes on top. Finished instances queue up for
//! their [`Singleton::post_construction`] hook, and only when the outermost
//! frame is popped is the queue handed back to run, in the order the
//! constructors completed.
//!
//! By then every singleton of the chain is `Ready`, so hooks may freely call
//! `get` on each other. A singleton destroyed before the drain is skipped.

use std::cell::RefCell;
use std::sync::Arc;

use crate::holder::InstanceHolder;
use crate::{Singleton, SingletonEvent};

/// Event callback of the service that built an instance, taken when it
/// finished constructing.
pub(crate) type EventSink = Option<Arc<dyn Fn(&SingletonEvent) + Send + Sync>>;

/// A constructed singleton waiting for its hook.
pub(crate) struct PendingHook {
    pub(crate) holder: Arc<InstanceHolder>,
    pub(crate) instance: Arc<dyn Singleton>,
    pub(crate) sink: EventSink,
}

#[derive(Default)]
struct ConstructionStack {
    frames: Vec<Arc<InstanceHolder>>,
    pending: Vec<PendingHook>,
}

thread_local! {
    static CONSTRUCTION: RefCell<ConstructionStack> = RefCell::new(ConstructionStack::default());
}

/// Current nesting depth of singleton constructions on this thread.
pub fn depth() -> usize {
    CONSTRUCTION.with(|c| c.borrow().frames.len())
}

/// Type names currently under construction on this thread, outermost first.
pub fn under_construction() -> Vec<&'static str> {
    CONSTRUCTION.with(|c| c.borrow().frames.iter().map(|h| h.type_name()).collect())
}

/// Whether this thread is running the constructor for `holder`'s slot.
pub(crate) fn is_constructing(holder: &Arc<InstanceHolder>) -> bool {
    CONSTRUCTION.with(|c| c.borrow().frames.iter().any(|h| Arc::ptr_eq(h, holder)))
}

/// Guard for one level of construction.
///
/// Dropping it without [`ConstructionFrame::finish`] means the constructor
/// unwound: the holder is reset to `Empty`, and if this was the outermost
/// frame the queued hooks are discarded.
pub(crate) struct ConstructionFrame {
    holder: Arc<InstanceHolder>,
    finished: bool,
}

impl ConstructionFrame {
    pub(crate) fn enter(holder: Arc<InstanceHolder>) -> Self {
        CONSTRUCTION.with(|c| c.borrow_mut().frames.push(holder.clone()));
        ConstructionFrame {
            holder,
            finished: false,
        }
    }

    /// Queues `instance` for its hook and pops the frame.
    ///
    /// Returns the hooks to run now: all of them when this was the outermost
    /// frame, none otherwise.
    pub(crate) fn finish(
        mut self,
        instance: Arc<dyn Singleton>,
        sink: EventSink,
    ) -> Vec<PendingHook> {
        self.finished = true;
        CONSTRUCTION.with(|c| {
            let mut c = c.borrow_mut();
            c.pending.push(PendingHook {
                holder: self.holder.clone(),
                instance,
                sink,
            });
            c.frames.pop();
            if c.frames.is_empty() {
                std::mem::take(&mut c.pending)
            } else {
                Vec::new()
            }
        })
    }
}

impl Drop for ConstructionFrame {
    fn drop(&mut self) {
        if self.finished {
            return;
        }

        self.holder.abandon();
        // Released outside the borrow: dropping an instance may touch the stack.
        let discarded = CONSTRUCTION.with(|c| {
            let mut c = c.borrow_mut();
            c.frames.pop();
            if c.frames.is_empty() {
                std::mem::take(&mut c.pending)
            } else {
                Vec::new()
            }
        });

        tracing::warn!(
            type_name = self.holder.type_name(),
            discarded_hooks = discarded.len(),
            "singleton constructor unwound"
        );
    }
}
