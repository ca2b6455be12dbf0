use std::fmt;
use std::sync::{Arc, Weak};

/// Non-owning handle that can be promoted to a strong reference for the
/// duration of one operation. Holding a `SafeRef` never keeps the referent
/// alive; `lock` fails cleanly once it is gone.
pub struct SafeRef<T: ?Sized> {
    inner: Weak<T>,
}

impl<T> SafeRef<T> {
    /// A handle that never locks.
    pub fn empty() -> Self {
        Self { inner: Weak::new() }
    }
}

impl<T: ?Sized> SafeRef<T> {
    pub fn new(target: &Arc<T>) -> Self {
        Self {
            inner: Arc::downgrade(target),
        }
    }

    #[inline]
    pub fn lock(&self) -> Option<Arc<T>> {
        self.inner.upgrade()
    }

    #[inline]
    pub fn expired(&self) -> bool {
        self.inner.strong_count() == 0
    }

    /// Same referent (or both empty).
    pub fn ptr_eq(&self, other: &SafeRef<T>) -> bool {
        Weak::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: ?Sized> Clone for SafeRef<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<T: ?Sized> From<&Arc<T>> for SafeRef<T> {
    fn from(value: &Arc<T>) -> Self {
        Self::new(value)
    }
}

impl<T: ?Sized> fmt::Debug for SafeRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SafeRef")
            .field("expired", &self.expired())
            .finish()
    }
}
