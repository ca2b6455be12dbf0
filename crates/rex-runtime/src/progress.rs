use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::state::{RequestState, StateCell};

/// Cooperative cancellation and retry signalling for long-running builds.
///
/// Nothing is preempted: builders poll `is_canceled` at their own
/// checkpoints and return early.
pub trait Progress: Send + Sync {
    fn is_canceled(&self) -> bool;
    fn cancel(&self);
    fn needs_retry(&self) -> bool;
    /// Marks the result incomplete because of a transient failure.
    fn set_needs_retry(&self);
    fn message(&self) -> Option<String> {
        None
    }
    fn set_message(&self, _msg: &str) {}
}

#[derive(Default)]
struct Flags {
    canceled: AtomicBool,
    retry: AtomicBool,
    message: Mutex<Option<String>>,
}

impl Flags {
    fn message(&self) -> Option<String> {
        self.message
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn set_message(&self, msg: &str) {
        *self.message.lock().unwrap_or_else(PoisonError::into_inner) = Some(msg.to_string());
    }
}

/// Free-standing token; clones share the same flags.
#[derive(Clone, Default)]
pub struct ProgressToken {
    flags: Arc<Flags>,
}

impl ProgressToken {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Progress for ProgressToken {
    fn is_canceled(&self) -> bool {
        self.flags.canceled.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.flags.canceled.store(true, Ordering::Release);
    }

    fn needs_retry(&self) -> bool {
        self.flags.retry.load(Ordering::Acquire)
    }

    fn set_needs_retry(&self) {
        self.flags.retry.store(true, Ordering::Release);
    }

    fn message(&self) -> Option<String> {
        self.flags.message()
    }

    fn set_message(&self, msg: &str) {
        self.flags.set_message(msg);
    }
}

/// Token bound to one invocation of a request. Reports canceled once the
/// engine cancels it or once the request has been put back to `Idle` by
/// someone else. The borrow keeps it from outliving the invocation.
pub struct RequestProgress<'a> {
    state: &'a StateCell,
    flags: Flags,
}

impl<'a> RequestProgress<'a> {
    pub(crate) fn new(state: &'a StateCell) -> Self {
        Self {
            state,
            flags: Flags::default(),
        }
    }
}

impl Progress for RequestProgress<'_> {
    fn is_canceled(&self) -> bool {
        if !self.flags.canceled.load(Ordering::Acquire) && self.state.load() == RequestState::Idle
        {
            self.flags.canceled.store(true, Ordering::Release);
        }
        self.flags.canceled.load(Ordering::Acquire)
    }

    fn cancel(&self) {
        self.flags.canceled.store(true, Ordering::Release);
    }

    fn needs_retry(&self) -> bool {
        self.flags.retry.load(Ordering::Acquire)
    }

    fn set_needs_retry(&self) {
        self.flags.retry.store(true, Ordering::Release);
    }

    fn message(&self) -> Option<String> {
        self.flags.message()
    }

    fn set_message(&self, msg: &str) {
        self.flags.set_message(msg);
    }
}
