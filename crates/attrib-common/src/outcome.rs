use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

/// Discriminator carried by an [`ApiError`].
///
/// Negative codes are raised locally, before or instead of a server
/// round trip. Anything else is a raw HTTP status reported by the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// The runtime environment does not allow network access.
    NoNetworkPermission,
    /// The server answered but did not hand back a usable referral code.
    DuplicateReferralCode,
    /// The request timed out.
    RequestTimedOut,
    /// The request never reached the server.
    UnableToReachServers,
    /// No network connectivity.
    NoConnectivity,
    /// Raw status reported by the transport.
    Status(i32),
}

impl ErrorCode {
    /// Numeric value of this code.
    pub const fn code(&self) -> i32 {
        match self {
            Self::NoNetworkPermission => -102,
            Self::DuplicateReferralCode => -106,
            Self::RequestTimedOut => -111,
            Self::UnableToReachServers => -112,
            Self::NoConnectivity => -113,
            Self::Status(status) => *status,
        }
    }

    /// Map a failure status back onto a code, recognising the internal
    /// negative codes.
    pub const fn from_status(status: i32) -> Self {
        match status {
            -102 => Self::NoNetworkPermission,
            -106 => Self::DuplicateReferralCode,
            -111 => Self::RequestTimedOut,
            -112 => Self::UnableToReachServers,
            -113 => Self::NoConnectivity,
            other => Self::Status(other),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoNetworkPermission => f.write_str("no network permission"),
            Self::DuplicateReferralCode => f.write_str("duplicate or unavailable referral code"),
            Self::RequestTimedOut => f.write_str("request timed out"),
            Self::UnableToReachServers => f.write_str("unable to reach servers"),
            Self::NoConnectivity => f.write_str("no connectivity"),
            Self::Status(status) => write!(f, "status {status}"),
        }
    }
}

/// Error object delivered to a request callback.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, miette::Diagnostic)]
#[error("{message} ({code}, code {})", .code.code())]
#[diagnostic(code(attrib::request::failed))]
pub struct ApiError {
    /// Human-readable message.
    pub message: String,
    /// Kind of failure.
    pub code: ErrorCode,
}

impl ApiError {
    /// Create a new error.
    pub fn new(message: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }
}

/// Single-shot outcome receiver for a request.
///
/// Invoked at most once per request with `(payload, error)`. Consuming
/// `self` makes a second invocation impossible. Any
/// `FnOnce(Option<Value>, Option<ApiError>) + Send` closure is a callback.
pub trait ResultCallback: Send {
    /// Deliver the outcome.
    fn on_finished(self: Box<Self>, payload: Option<Value>, error: Option<ApiError>);
}

impl<F> ResultCallback for F
where
    F: FnOnce(Option<Value>, Option<ApiError>) + Send,
{
    fn on_finished(self: Box<Self>, payload: Option<Value>, error: Option<ApiError>) {
        (*self)(payload, error)
    }
}

/// Box a closure as a request callback.
///
/// Helps closure parameter inference at call sites that would otherwise
/// coerce straight to `Box<dyn ResultCallback>`.
pub fn callback<F>(f: F) -> Box<dyn ResultCallback>
where
    F: FnOnce(Option<Value>, Option<ApiError>) + Send + 'static,
{
    Box::new(f)
}

/// Shared, clearable slot holding a request's callback.
///
/// Clones point at the same slot, so an owner can keep a handle and
/// [`clear`](Self::clear) it while the request itself is borrowed by an
/// in-flight send. Whatever outcome arrives afterwards is dropped.
#[derive(Clone, Default)]
pub struct CallbackHandle(Arc<Mutex<Option<Box<dyn ResultCallback>>>>);

impl CallbackHandle {
    /// Slot holding `callback`, or an empty one.
    pub fn new(callback: Option<Box<dyn ResultCallback>>) -> Self {
        Self(Arc::new(Mutex::new(callback)))
    }

    /// Drop the callback. Idempotent.
    pub fn clear(&self) {
        drop(self.take());
    }

    /// Whether a callback is still waiting for an outcome.
    pub fn is_set(&self) -> bool {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Remove the callback, leaving the slot empty.
    pub fn take(&self) -> Option<Box<dyn ResultCallback>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Deliver an outcome if a callback is still attached.
    ///
    /// The lock is released before the callback runs.
    pub fn finish(&self, payload: Option<Value>, error: Option<ApiError>) -> bool {
        match self.take() {
            Some(callback) => {
                callback.on_finished(payload, error);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for CallbackHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CallbackHandle").field(&self.is_set()).finish()
    }
}
