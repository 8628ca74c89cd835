//! Common types for the attrib request layer.
//!
//! This crate holds everything that is not specific to a single endpoint:
//! the raw HTTP transport abstraction, the error hierarchy, session and
//! identity providers, the [`ServerRequest`](request::ServerRequest)
//! capability trait and the executor that drives it.

#![warn(missing_docs)]
pub use url;

pub mod environment;
pub mod error;
/// HTTP client abstraction used by attrib crates.
pub mod http_client;
/// Outcome channel handed to request callbacks.
pub mod outcome;
pub mod request;
/// Session identifiers and pluggable session storage.
pub mod session;
pub mod executor;

pub use environment::{Environment, StaticEnvironment};
pub use executor::{Dispatch, ExecutorOptions, RequestExecutor};
pub use outcome::{ApiError, CallbackHandle, ErrorCode, ResultCallback, callback};
pub use request::{PersistedRequest, ServerRequest, ServerResponse};
pub use session::{NO_STRING_VALUE, SessionData, SessionProvider};
