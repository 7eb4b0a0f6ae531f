//! Error types and native status checking.
//!
//! Every native entry point returns an integer status. A non-zero status means
//! the call failed and the library has recorded a message in its last-error
//! slot. That slot is shared state: it must be read right after the failing
//! call, before any other native call can overwrite it. [`xgb_call!`] wraps a
//! call together with that read so nothing can be interleaved between them.
//!
//! Callers that drive the library from several threads must serialize their
//! native calls themselves; this crate adds no locking.

use std::ffi::{c_int, CStr};

use crate::sys::NativeApi;

/// Errors produced by this crate.
#[derive(Debug, thiserror::Error)]
pub enum XgbError {
    /// Contradictory or unsupported caller options.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Malformed caller data (non-rectangular rows, wrong lengths, NUL bytes).
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A native call reported failure.
    #[error("native call failed: {message}")]
    NativeCall {
        /// Message taken from the native last-error channel.
        message: String,
    },

    /// A native shape descriptor does not match its buffer.
    #[error("shape mismatch: {0}")]
    Shape(String),

    /// A decoded tensor would exceed the addressable size.
    #[error("tensor with dimensions {dims:?} exceeds the maximum addressable size")]
    Overflow { dims: Vec<u64> },

    /// The native library could not be located or loaded.
    #[error("cannot load native XGBoost library from {path}: {message}")]
    Platform { path: String, message: String },

    /// The handle was already released.
    #[error("{0} handle used after it was freed")]
    Disposed(&'static str),

    /// A native string was not valid UTF-8.
    #[error("native string is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// A JSON document from or for the native library could not be processed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error while staging a temporary file for a native call.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, XgbError>;

// =============================================================================
// Status Checking
// =============================================================================

/// Convert a native status code into a `Result`.
///
/// On failure the last-error message is copied out immediately.
pub(crate) fn check(api: &NativeApi, status: c_int) -> Result<()> {
    if status == 0 {
        Ok(())
    } else {
        Err(XgbError::NativeCall {
            message: last_error(api),
        })
    }
}

/// Copy the native last-error message into an owned string.
pub(crate) fn last_error(api: &NativeApi) -> String {
    // SAFETY: XGBGetLastError takes no arguments and returns either null or a
    // NUL-terminated string owned by the library.
    let ptr = unsafe { (api.XGBGetLastError)() };
    if ptr.is_null() {
        return "unknown native error".to_string();
    }
    // SAFETY: non-null pointer to a NUL-terminated string, copied before return.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Call a native entry point and check its status.
///
/// ```ignore
/// xgb_call!(api, XGBoosterFree(handle))?;
/// ```
macro_rules! xgb_call {
    ($api:expr, $func:ident($($arg:expr),* $(,)?)) => {{
        let api: &$crate::sys::NativeApi = $api;
        ::tracing::trace!(call = stringify!($func));
        #[allow(unused_unsafe)]
        let status = unsafe { (api.$func)($($arg),*) };
        $crate::error::check(api, status)
    }};
}

pub(crate) use xgb_call;
