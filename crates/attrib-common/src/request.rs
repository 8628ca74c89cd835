//! # Server requests and their outcome contract
//!
//! Every endpoint gets its own request type implementing [`ServerRequest`].
//! The [`RequestExecutor`](crate::executor::RequestExecutor) is generic over
//! that trait and drives each request through the same lifecycle:
//!
//! - Rejected without sending when [`ServerRequest::is_construct_error`].
//! - Short-circuited when [`ServerRequest::preflight_check`] returns `true`
//!   (the request has already reported through its callback).
//! - Otherwise sent, then exactly one of [`ServerRequest::on_success`] or
//!   [`ServerRequest::on_failure`] is called.
//!
//! Requests never throw their outcome back at the executor. All of it goes
//! through the request's own callback, and a cleared callback swallows it.

use bytes::Bytes;
use http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::environment::Environment;
use crate::error::DecodeError;

/// Shared capability set of every request type.
pub trait ServerRequest: Send {
    /// Endpoint path, relative to the executor's base URL.
    fn path(&self) -> &str;

    /// Outbound payload. `None` only when construction failed.
    fn post(&self) -> Option<&Map<String, Value>>;

    /// Whether building the payload failed. Such requests must not be sent.
    fn is_construct_error(&self) -> bool;

    /// Check the environment before dispatch.
    ///
    /// Returns `true` when the request has handled the situation itself
    /// (typically by reporting an error through its callback) and must not
    /// be sent.
    fn preflight_check(&mut self, env: &dyn Environment) -> bool;

    /// The server answered with a 2xx status.
    fn on_success(&mut self, response: ServerResponse);

    /// The request failed with an HTTP status or an internal failure code.
    fn on_failure(&mut self, status: i32);

    /// Whether the request only reads server state. Read requests are sent
    /// as `GET` with the payload in the query string.
    fn is_read_request(&self) -> bool;

    /// Drop the callback. Later outcomes are silently discarded.
    fn clear_callback(&mut self);

    /// Snapshot for persisting this request in a queue.
    ///
    /// `None` when construction failed; such requests are never queued.
    fn persist(&self) -> Option<PersistedRequest> {
        if self.is_construct_error() {
            return None;
        }
        Some(PersistedRequest {
            path: self.path().to_owned(),
            post: self.post()?.clone(),
        })
    }
}

impl<R: ServerRequest + ?Sized> ServerRequest for Box<R> {
    fn path(&self) -> &str {
        (**self).path()
    }
    fn post(&self) -> Option<&Map<String, Value>> {
        (**self).post()
    }
    fn is_construct_error(&self) -> bool {
        (**self).is_construct_error()
    }
    fn preflight_check(&mut self, env: &dyn Environment) -> bool {
        (**self).preflight_check(env)
    }
    fn on_success(&mut self, response: ServerResponse) {
        (**self).on_success(response)
    }
    fn on_failure(&mut self, status: i32) {
        (**self).on_failure(status)
    }
    fn is_read_request(&self) -> bool {
        (**self).is_read_request()
    }
    fn clear_callback(&mut self) {
        (**self).clear_callback()
    }
    fn persist(&self) -> Option<PersistedRequest> {
        (**self).persist()
    }
}

/// A successful server response.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerResponse {
    status: StatusCode,
    object: Map<String, Value>,
}

impl ServerResponse {
    /// Wrap an already parsed body.
    pub fn new(status: StatusCode, object: Map<String, Value>) -> Self {
        Self { status, object }
    }

    /// Parse a raw response body into a JSON object.
    ///
    /// An empty body parses as an empty object.
    pub fn parse(status: StatusCode, body: &Bytes) -> Result<Self, DecodeError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Self::new(status, Map::new()));
        }
        match serde_json::from_slice::<Value>(body)? {
            Value::Object(object) => Ok(Self::new(status, object)),
            Value::Null => Err(DecodeError::NotAnObject("null")),
            Value::Bool(_) => Err(DecodeError::NotAnObject("a boolean")),
            Value::Number(_) => Err(DecodeError::NotAnObject("a number")),
            Value::String(_) => Err(DecodeError::NotAnObject("a string")),
            Value::Array(_) => Err(DecodeError::NotAnObject("an array")),
        }
    }

    /// HTTP status code
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Body as a JSON object
    pub fn object(&self) -> &Map<String, Value> {
        &self.object
    }

    /// Take the body
    pub fn into_object(self) -> Map<String, Value> {
        self.object
    }
}

/// Serialized form of a queued request.
///
/// Restored requests carry no callback; whoever replays them only cares
/// that the server sees them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedRequest {
    /// Endpoint path
    #[serde(rename = "REQ_POST_PATH")]
    pub path: String,
    /// Payload
    #[serde(rename = "REQ_POST")]
    pub post: Map<String, Value>,
}

impl PersistedRequest {
    /// Encode for storage.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decode from storage.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_body_is_empty_object() {
        let resp = ServerResponse::parse(StatusCode::OK, &Bytes::new()).unwrap();
        assert!(resp.object().is_empty());
        let resp = ServerResponse::parse(StatusCode::OK, &Bytes::from_static(b" \n")).unwrap();
        assert!(resp.object().is_empty());
    }

    #[test]
    fn non_object_body_is_rejected() {
        let err = ServerResponse::parse(StatusCode::OK, &Bytes::from_static(b"[1,2]")).unwrap_err();
        assert!(matches!(err, DecodeError::NotAnObject("an array")));
        let err = ServerResponse::parse(StatusCode::OK, &Bytes::from_static(b"{oops")).unwrap_err();
        assert!(matches!(err, DecodeError::Json(_)));
    }

    #[test]
    fn persisted_request_keeps_path_and_payload() {
        let mut post = Map::new();
        post.insert("session_id".into(), "s".into());
        post.insert("amount".into(), 5.into());
        let persisted = PersistedRequest {
            path: "v1/referralcode".into(),
            post,
        };
        let json = persisted.to_json().unwrap();
        assert!(json.contains("\"REQ_POST_PATH\":\"v1/referralcode\""));
        assert_eq!(PersistedRequest::from_json(&json).unwrap(), persisted);
    }
}
