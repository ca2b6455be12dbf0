use std::sync::atomic::{AtomicU8, Ordering};

/// Lifecycle of a request. `Idle` is both "not issued" and "done or
/// abandoned"; an idle request may be submitted again.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RequestState {
    Idle = 0,
    Pending = 1,
    Running = 2,
}

impl RequestState {
    #[inline]
    fn from_u8(v: u8) -> Self {
        match v {
            1 => RequestState::Pending,
            2 => RequestState::Running,
            _ => RequestState::Idle,
        }
    }
}

pub(crate) struct StateCell(AtomicU8);

impl StateCell {
    pub(crate) fn new(state: RequestState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    #[inline]
    pub(crate) fn load(&self) -> RequestState {
        RequestState::from_u8(self.0.load(Ordering::Acquire))
    }

    #[inline]
    pub(crate) fn store(&self, state: RequestState) {
        self.0.store(state as u8, Ordering::Release);
    }

    #[inline]
    pub(crate) fn transition(&self, from: RequestState, to: RequestState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}
