//! # attrib
//!
//! Request layer for an attribution/referral service: typed request
//! objects that build their payload from the current session, and an
//! executor that sends them and routes the single outcome back through
//! each request's callback.
//!
//! ```ignore
//! use attrib::{BasicExecutor, ReferralCodeRequest, SessionData, callback};
//!
//! let session = SessionData::new("identity", "fingerprint", "session");
//! let mut request = ReferralCodeRequest::fetch(
//!     &session,
//!     Some(callback(|payload, error| match error {
//!         None => println!("code: {}", payload.unwrap()["referral_code"]),
//!         Some(e) => eprintln!("{e}"),
//!     })),
//! );
//! let executor = attrib::basic_executor(Default::default());
//! executor.execute(&mut request).await;
//! ```

#![warn(missing_docs)]

pub use attrib_common as common;
pub use attrib_common::{
    ApiError, CallbackHandle, Dispatch, ErrorCode, ExecutorOptions, NO_STRING_VALUE, PersistedRequest,
    RequestExecutor, ResultCallback, ServerRequest, ServerResponse, SessionData, SessionProvider,
    StaticEnvironment, callback,
};

pub mod referral;

pub use referral::{
    CalculationType, Expiration, ReferralCodeParams, ReferralCodeRequest, RewardLocation,
};

/// Executor over a plain `reqwest` client in an environment with network access.
pub type BasicExecutor = RequestExecutor<reqwest::Client, StaticEnvironment>;

/// Create a [`BasicExecutor`] with the given options.
pub fn basic_executor(opts: ExecutorOptions) -> BasicExecutor {
    RequestExecutor::new(reqwest::Client::new(), StaticEnvironment::online(), opts)
}
