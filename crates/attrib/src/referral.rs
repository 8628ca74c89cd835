//! Referral code requests.
//!
//! [`ReferralCodeRequest`] either asks the server to mint a new referral
//! code ([`ReferralCodeRequest::create`]) or fetches the one already
//! generated for the current identity ([`ReferralCodeRequest::fetch`]).
//! Both post to [`REFERRAL_CODE_PATH`] and report through a single
//! [`ResultCallback`].

use attrib_common::environment::Environment;
use attrib_common::outcome::{ApiError, CallbackHandle, ErrorCode, ResultCallback};
use attrib_common::request::{PersistedRequest, ServerRequest, ServerResponse};
use attrib_common::session::SessionProvider;
use bon::Builder;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use serde_repr::{Deserialize_repr, Serialize_repr};

/// Endpoint path for referral code requests.
pub const REFERRAL_CODE_PATH: &str = "v1/referralcode";
/// Response field holding the referral code.
pub const REFERRAL_CODE: &str = "referral_code";
/// Bucket used when none is given.
pub const REFERRAL_BUCKET_DEFAULT: &str = "default";
/// `type` marker for credit referral codes.
pub const REFERRAL_CODE_TYPE: i32 = 0;
/// `creation_source` marker for codes minted by the SDK.
pub const REFERRAL_CREATION_SOURCE_SDK: i32 = 2;
/// Field added to a success body that carried no referral code.
pub const ERROR_MESSAGE_FIELD: &str = "error_message";

const TROUBLE_RETRIEVING: &str = "Trouble retrieving the referral code.";
const FAILED_TO_GET: &str = "Failed to get referral code";

const SESSION_KEYS: [&str; 3] = ["identity_id", "device_fingerprint_id", "session_id"];

/// How often a referral code may be redeemed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr, clap::ValueEnum,
)]
#[repr(u8)]
pub enum CalculationType {
    /// Each user may redeem the code once.
    Unique = 0,
    /// No redemption limit.
    Unlimited = 1,
}

/// Who is rewarded when a referral code is applied.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr, clap::ValueEnum,
)]
#[repr(u8)]
pub enum RewardLocation {
    /// The user applying the code.
    Referee = 0,
    /// The user who owns the code.
    ReferringUser = 2,
    /// Both parties.
    Both = 3,
}

/// Expiration of a referral code, as sent on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Expiration(String);

impl Expiration {
    /// Wire form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for Expiration {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Expiration {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl From<DateTime<Utc>> for Expiration {
    fn from(value: DateTime<Utc>) -> Self {
        Self(value.to_rfc3339_opts(SecondsFormat::Secs, true))
    }
}

/// Parameters for minting a new referral code.
///
/// ```ignore
/// let params = ReferralCodeParams::new()
///     .prefix("OFFER")
///     .amount(5)
///     .calculation_type(CalculationType::Unlimited)
///     .location(RewardLocation::ReferringUser)
///     .build();
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Builder)]
#[builder(start_fn = new)]
pub struct ReferralCodeParams {
    /// Code prefix, e.g. `OFFER` for `OFFER4867`. Omitted when empty.
    #[builder(into)]
    pub prefix: Option<String>,
    /// Credits attached to the code.
    pub amount: i32,
    /// Optional expiration.
    #[builder(into)]
    pub expiration: Option<Expiration>,
    /// Bucket the code belongs to, [`REFERRAL_BUCKET_DEFAULT`] when absent.
    #[builder(into)]
    pub bucket: Option<String>,
    /// Redemption policy.
    pub calculation_type: CalculationType,
    /// Reward recipient.
    pub location: RewardLocation,
}

#[derive(Serialize)]
struct SessionFields<'a> {
    identity_id: &'a str,
    device_fingerprint_id: &'a str,
    session_id: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    link_click_id: Option<&'a str>,
}

impl<'a> SessionFields<'a> {
    fn read<P: SessionProvider + ?Sized>(session: &'a P) -> Self {
        Self {
            identity_id: session.identity_id(),
            device_fingerprint_id: session.device_fingerprint_id(),
            session_id: session.session_id(),
            link_click_id: session
                .has_link_click_id()
                .then(|| session.link_click_id()),
        }
    }
}

#[derive(Serialize)]
struct CreatePayload<'a> {
    #[serde(flatten)]
    session: SessionFields<'a>,
    calculation_type: CalculationType,
    location: RewardLocation,
    #[serde(rename = "type")]
    kind: i32,
    creation_source: i32,
    amount: i32,
    bucket: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    prefix: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    expiration: Option<&'a Expiration>,
}

/// Request for a referral code.
///
/// The payload is resolved in full at construction. If it cannot be built
/// the request reports [`ServerRequest::is_construct_error`] and executors
/// refuse to send it. Freshly built payloads always serialize; in practice
/// the flag is raised by restored payloads missing the session identifiers.
///
/// The callback fires at most once, and never after it is cleared, either
/// through [`ServerRequest::clear_callback`] or a [`CallbackHandle`] taken
/// with [`ReferralCodeRequest::callback_handle`] while a send is running.
pub struct ReferralCodeRequest {
    path: String,
    post: Option<Map<String, Value>>,
    callback: CallbackHandle,
}

impl ReferralCodeRequest {
    /// Ask the server to mint a referral code.
    pub fn create<P>(
        session: &P,
        params: &ReferralCodeParams,
        callback: Option<Box<dyn ResultCallback>>,
    ) -> Self
    where
        P: SessionProvider + ?Sized,
    {
        let payload = CreatePayload {
            session: SessionFields::read(session),
            calculation_type: params.calculation_type,
            location: params.location,
            kind: REFERRAL_CODE_TYPE,
            creation_source: REFERRAL_CREATION_SOURCE_SDK,
            amount: params.amount,
            bucket: params
                .bucket
                .as_deref()
                .unwrap_or(REFERRAL_BUCKET_DEFAULT),
            prefix: params.prefix.as_deref().filter(|p| !p.is_empty()),
            expiration: params.expiration.as_ref(),
        };
        Self::with_payload(&payload, callback)
    }

    /// Fetch the referral code already generated for this identity.
    pub fn fetch<P>(session: &P, callback: Option<Box<dyn ResultCallback>>) -> Self
    where
        P: SessionProvider + ?Sized,
    {
        Self::with_payload(&SessionFields::read(session), callback)
    }

    /// Restore a request from its persisted form. It has no callback.
    ///
    /// A payload without the session identifiers is a construct error.
    pub fn from_persisted(persisted: PersistedRequest) -> Self {
        let complete = SESSION_KEYS
            .iter()
            .all(|key| persisted.post.get(*key).is_some_and(Value::is_string));
        if !complete {
            #[cfg(feature = "tracing")]
            tracing::warn!(path = %persisted.path, "restored referral code payload lacks session identifiers");
        }
        Self {
            path: persisted.path,
            post: complete.then_some(persisted.post),
            callback: CallbackHandle::default(),
        }
    }

    fn with_payload<T: Serialize>(payload: &T, callback: Option<Box<dyn ResultCallback>>) -> Self {
        let post = match serde_json::to_value(payload) {
            Ok(Value::Object(post)) => Some(post),
            Ok(_) => {
                #[cfg(feature = "tracing")]
                tracing::warn!("referral code payload did not serialize to an object");
                None
            }
            Err(_e) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(error = %_e, "failed to build referral code payload");
                None
            }
        };
        Self {
            path: REFERRAL_CODE_PATH.to_owned(),
            post,
            callback: CallbackHandle::new(callback),
        }
    }

    /// Whether a callback is still attached.
    pub fn has_callback(&self) -> bool {
        self.callback.is_set()
    }

    /// Shared handle to the callback slot.
    ///
    /// Clearing it has the same effect as [`ServerRequest::clear_callback`]
    /// but does not need the request, so it works during a send.
    pub fn callback_handle(&self) -> CallbackHandle {
        self.callback.clone()
    }
}

impl std::fmt::Debug for ReferralCodeRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferralCodeRequest")
            .field("path", &self.path)
            .field("post", &self.post)
            .field("has_callback", &self.callback.is_set())
            .finish()
    }
}

impl ServerRequest for ReferralCodeRequest {
    fn path(&self) -> &str {
        &self.path
    }

    fn post(&self) -> Option<&Map<String, Value>> {
        self.post.as_ref()
    }

    fn is_construct_error(&self) -> bool {
        self.post.is_none()
    }

    fn preflight_check(&mut self, env: &dyn Environment) -> bool {
        if env.has_network_permission() {
            return false;
        }
        self.callback.finish(
            None,
            Some(ApiError::new(
                TROUBLE_RETRIEVING,
                ErrorCode::NoNetworkPermission,
            )),
        );
        true
    }

    fn on_success(&mut self, response: ServerResponse) {
        let Some(callback) = self.callback.take() else {
            return;
        };
        let mut body = response.into_object();
        if body.contains_key(REFERRAL_CODE) {
            callback.on_finished(Some(Value::Object(body)), None);
        } else {
            body.insert(ERROR_MESSAGE_FIELD.into(), FAILED_TO_GET.into());
            callback.on_finished(
                Some(Value::Object(body)),
                Some(ApiError::new(FAILED_TO_GET, ErrorCode::DuplicateReferralCode)),
            );
        }
    }

    fn on_failure(&mut self, status: i32) {
        self.callback.finish(
            None,
            Some(ApiError::new(
                TROUBLE_RETRIEVING,
                ErrorCode::from_status(status),
            )),
        );
    }

    fn is_read_request(&self) -> bool {
        false
    }

    fn clear_callback(&mut self) {
        self.callback.clear();
    }
}
