//! Owned native handles.
//!
//! [`NativeHandle`] owns one opaque pointer returned by a native creation
//! call and releases it at most once: either through [`NativeHandle::free`]
//! or on drop, including drops during unwinding. After release the handle is
//! invalid and every accessor returns [`XgbError::Disposed`].
//!
//! Handles are `Send` but not `Sync`. The native library gives no guarantee
//! for concurrent calls on one object, so shared access has to go through the
//! caller's own synchronization.

use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;

use crate::error::{xgb_call, Result, XgbError};
use crate::sys;

/// A kind of native object and the call that releases it.
pub trait HandleKind {
    /// Human-readable object name used in errors and logs.
    const NAME: &'static str;

    /// Release `ptr`. Called at most once per acquired pointer, never with null.
    fn release(ptr: *mut c_void) -> Result<()>;
}

/// Native matrix (`DMatrixHandle`).
#[derive(Debug)]
pub enum MatrixKind {}

impl HandleKind for MatrixKind {
    const NAME: &'static str = "DMatrix";

    fn release(ptr: *mut c_void) -> Result<()> {
        xgb_call!(sys::api()?, XGDMatrixFree(ptr))
    }
}

/// Native booster (`BoosterHandle`).
#[derive(Debug)]
pub enum BoosterKind {}

impl HandleKind for BoosterKind {
    const NAME: &'static str = "Booster";

    fn release(ptr: *mut c_void) -> Result<()> {
        xgb_call!(sys::api()?, XGBoosterFree(ptr))
    }
}

// =============================================================================
// NativeHandle
// =============================================================================

/// Exclusive owner of one native object.
pub struct NativeHandle<K: HandleKind> {
    ptr: *mut c_void,
    _kind: PhantomData<fn() -> K>,
}

// SAFETY: the native objects are not bound to the creating thread. `Sync` is
// deliberately not implemented.
unsafe impl<K: HandleKind> Send for NativeHandle<K> {}

impl<K: HandleKind> NativeHandle<K> {
    /// Take ownership of a pointer returned by a successful creation call.
    ///
    /// A null pointer is reported as a failed native call rather than
    /// producing an invalid-but-usable object.
    ///
    /// # Safety
    ///
    /// `ptr` must be a live object of kind `K` not owned by anything else.
    pub(crate) unsafe fn from_raw(ptr: *mut c_void) -> Result<Self> {
        if ptr.is_null() {
            return Err(XgbError::NativeCall {
                message: format!("{} creation returned a null handle", K::NAME),
            });
        }
        Ok(Self {
            ptr,
            _kind: PhantomData,
        })
    }

    /// True once the handle has been released (or never held an object).
    pub fn is_invalid(&self) -> bool {
        self.ptr.is_null()
    }

    /// The raw pointer, or `Disposed` after release.
    pub(crate) fn as_ptr(&self) -> Result<*mut c_void> {
        if self.ptr.is_null() {
            Err(XgbError::Disposed(K::NAME))
        } else {
            Ok(self.ptr)
        }
    }

    /// Release the native object now.
    ///
    /// The handle is invalid afterwards even if the release call fails.
    /// Calling `free` again is a no-op.
    pub fn free(&mut self) -> Result<()> {
        let ptr = std::mem::replace(&mut self.ptr, std::ptr::null_mut());
        if ptr.is_null() {
            return Ok(());
        }
        tracing::trace!(kind = K::NAME, "releasing native handle");
        K::release(ptr)
    }
}

impl<K: HandleKind> Drop for NativeHandle<K> {
    fn drop(&mut self) {
        if let Err(e) = self.free() {
            tracing::warn!(kind = K::NAME, error = %e, "failed to release native handle");
        }
    }
}

impl<K: HandleKind> fmt::Debug for NativeHandle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeHandle")
            .field("kind", &K::NAME)
            .field("ptr", &self.ptr)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::panic::{self, AssertUnwindSafe};
    use std::sync::atomic::{AtomicUsize, Ordering};

    static RELEASED: AtomicUsize = AtomicUsize::new(0);
    static FAILED: AtomicUsize = AtomicUsize::new(0);

    enum CountingKind {}

    impl HandleKind for CountingKind {
        const NAME: &'static str = "Counting";

        fn release(ptr: *mut c_void) -> Result<()> {
            // SAFETY: test pointers come from Box::into_raw below.
            drop(unsafe { Box::from_raw(ptr as *mut u32) });
            RELEASED.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    enum FailingKind {}

    impl HandleKind for FailingKind {
        const NAME: &'static str = "Failing";

        fn release(ptr: *mut c_void) -> Result<()> {
            drop(unsafe { Box::from_raw(ptr as *mut u32) });
            FAILED.fetch_add(1, Ordering::SeqCst);
            Err(XgbError::NativeCall {
                message: "release refused".into(),
            })
        }
    }

    fn boxed() -> *mut c_void {
        Box::into_raw(Box::new(7u32)) as *mut c_void
    }

    // The counters are shared, so every scenario runs inside one test.
    #[test]
    fn releases_at_most_once() {
        let before = RELEASED.load(Ordering::SeqCst);

        // Drop at end of scope.
        {
            let handle = unsafe { NativeHandle::<CountingKind>::from_raw(boxed()) }.unwrap();
            assert!(!handle.is_invalid());
        }
        assert_eq!(RELEASED.load(Ordering::SeqCst), before + 1);

        // Explicit free, then repeated free, then drop.
        {
            let mut handle = unsafe { NativeHandle::<CountingKind>::from_raw(boxed()) }.unwrap();
            handle.free().unwrap();
            assert!(handle.is_invalid());
            handle.free().unwrap();
            assert!(matches!(handle.as_ptr(), Err(XgbError::Disposed("Counting"))));
        }
        assert_eq!(RELEASED.load(Ordering::SeqCst), before + 2);

        // Unwinding out of the owning scope.
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            let _handle = unsafe { NativeHandle::<CountingKind>::from_raw(boxed()) }.unwrap();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(RELEASED.load(Ordering::SeqCst), before + 3);
    }

    #[test]
    fn failed_release_still_invalidates() {
        let mut handle = unsafe { NativeHandle::<FailingKind>::from_raw(boxed()) }.unwrap();
        let err = handle.free().unwrap_err();
        assert!(matches!(err, XgbError::NativeCall { .. }));
        assert!(handle.is_invalid());
        drop(handle);
        assert_eq!(FAILED.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn null_pointer_is_rejected() {
        let result = unsafe { NativeHandle::<CountingKind>::from_raw(std::ptr::null_mut()) };
        assert!(matches!(result, Err(XgbError::NativeCall { .. })));
    }
}
