use std::collections::VecDeque;
use std::sync::{Arc, Mutex as StdMutex};

use attrib::common::environment::StaticEnvironment;
use attrib::common::error::TransportError;
use attrib::common::http_client::HttpClient;
use attrib::{
    ApiError, CalculationType, Dispatch, ErrorCode, ExecutorOptions, PersistedRequest,
    ReferralCodeParams, ReferralCodeRequest, RequestExecutor, RewardLocation, ServerRequest,
    SessionData, callback,
};
use http::{Method, Response as HttpResponse, StatusCode};
use serde_json::{Value, json};
use tokio::sync::{Mutex, oneshot};
use url::Url;

#[derive(Clone, Default)]
struct MockClient {
    // Queue of outcomes to pop for each send_http call
    queue: Arc<Mutex<VecDeque<Result<HttpResponse<Vec<u8>>, TransportError>>>>,
    // Capture requests for assertions
    log: Arc<Mutex<Vec<http::Request<Vec<u8>>>>>,
}

impl MockClient {
    async fn push(&self, resp: HttpResponse<Vec<u8>>) {
        self.queue.lock().await.push_back(Ok(resp));
    }
    async fn push_err(&self, err: TransportError) {
        self.queue.lock().await.push_back(Err(err));
    }
    async fn take_log(&self) -> Vec<http::Request<Vec<u8>>> {
        std::mem::take(&mut *self.log.lock().await)
    }
}

impl HttpClient for MockClient {
    type Error = TransportError;

    fn send_http(
        &self,
        request: http::Request<Vec<u8>>,
    ) -> impl core::future::Future<
        Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>,
    > + Send {
        let log = self.log.clone();
        let queue = self.queue.clone();
        async move {
            log.lock().await.push(request);
            queue
                .lock()
                .await
                .pop_front()
                .expect("no queued response")
        }
    }
}

type Outcome = Arc<StdMutex<Vec<(Option<Value>, Option<ApiError>)>>>;

fn json_response(status: StatusCode, body: Value) -> HttpResponse<Vec<u8>> {
    let mut resp = HttpResponse::new(serde_json::to_vec(&body).unwrap());
    *resp.status_mut() = status;
    resp
}

fn executor(
    client: MockClient,
    env: StaticEnvironment,
) -> RequestExecutor<MockClient, StaticEnvironment> {
    let opts = ExecutorOptions::new()
        .base_url(Url::parse("https://api.test/").unwrap())
        .api_key("key_test_123")
        .build();
    RequestExecutor::new(client, env, opts)
}

fn create_request() -> (Outcome, ReferralCodeRequest) {
    let outcome: Outcome = Arc::default();
    let sink = outcome.clone();
    let session = SessionData::new("identity", "fingerprint", "session")
        .with_link_click_id(Some("click"));
    let params = ReferralCodeParams::new()
        .prefix("OFFER")
        .amount(5)
        .calculation_type(CalculationType::Unlimited)
        .location(RewardLocation::Both)
        .build();
    let req = ReferralCodeRequest::create(
        &session,
        &params,
        Some(callback(move |payload, error| {
            sink.lock().unwrap().push((payload, error));
        })),
    );
    (outcome, req)
}

#[tokio::test]
async fn posts_payload_and_delivers_code() {
    let client = MockClient::default();
    client
        .push(json_response(
            StatusCode::OK,
            json!({"referral_code": "OFFER1234"}),
        ))
        .await;
    let exec = executor(client.clone(), StaticEnvironment::online());
    let (outcome, mut req) = create_request();

    let dispatch = exec.execute(&mut req).await;
    assert_eq!(dispatch, Dispatch::Completed { status: 200 });

    let log = client.take_log().await;
    assert_eq!(log.len(), 1);
    let sent = &log[0];
    assert_eq!(sent.method(), Method::POST);
    assert_eq!(sent.uri().to_string(), "https://api.test/v1/referralcode");
    assert_eq!(sent.headers()[http::header::CONTENT_TYPE], "application/json");
    let body: Value = serde_json::from_slice(sent.body()).unwrap();
    assert_eq!(body["identity_id"], "identity");
    assert_eq!(body["link_click_id"], "click");
    assert_eq!(body["prefix"], "OFFER");
    assert_eq!(body["amount"], 5);
    assert_eq!(body["api_key"], "key_test_123");

    let outcome = outcome.lock().unwrap();
    assert_eq!(outcome.len(), 1);
    assert!(outcome[0].1.is_none());
    assert_eq!(outcome[0].0.as_ref().unwrap()["referral_code"], "OFFER1234");
}

#[tokio::test]
async fn server_errors_route_to_failure() {
    let client = MockClient::default();
    client
        .push(json_response(
            StatusCode::SERVICE_UNAVAILABLE,
            json!({"error": "busy"}),
        ))
        .await;
    let exec = executor(client.clone(), StaticEnvironment::online());
    let (outcome, mut req) = create_request();

    assert_eq!(
        exec.execute(&mut req).await,
        Dispatch::Completed { status: 503 }
    );
    let outcome = outcome.lock().unwrap();
    assert_eq!(outcome.len(), 1);
    assert!(outcome[0].0.is_none());
    assert_eq!(outcome[0].1.as_ref().unwrap().code, ErrorCode::Status(503));
}

#[tokio::test]
async fn transport_errors_route_to_failure_with_internal_code() {
    let client = MockClient::default();
    client
        .push_err(TransportError::Connect("refused".into()))
        .await;
    let exec = executor(client.clone(), StaticEnvironment::online());
    let (outcome, mut req) = create_request();

    assert_eq!(
        exec.execute(&mut req).await,
        Dispatch::Completed { status: -113 }
    );
    let outcome = outcome.lock().unwrap();
    assert_eq!(
        outcome[0].1.as_ref().unwrap().code,
        ErrorCode::NoConnectivity
    );
}

#[tokio::test]
async fn success_without_code_reports_error() {
    let client = MockClient::default();
    client
        .push(json_response(StatusCode::OK, json!({"something": "else"})))
        .await;
    let exec = executor(client.clone(), StaticEnvironment::online());
    let (outcome, mut req) = create_request();

    exec.execute(&mut req).await;
    let outcome = outcome.lock().unwrap();
    let (payload, error) = &outcome[0];
    assert_eq!(
        payload.as_ref().unwrap()["error_message"],
        "Failed to get referral code"
    );
    assert_eq!(
        error.as_ref().unwrap().code,
        ErrorCode::DuplicateReferralCode
    );
}

#[tokio::test]
async fn offline_requests_are_never_sent() {
    let client = MockClient::default();
    let exec = executor(client.clone(), StaticEnvironment::offline());
    let (outcome, mut req) = create_request();

    assert_eq!(exec.execute(&mut req).await, Dispatch::Handled);
    assert!(client.take_log().await.is_empty());
    let outcome = outcome.lock().unwrap();
    assert_eq!(outcome.len(), 1);
    assert_eq!(
        outcome[0].1.as_ref().unwrap().code,
        ErrorCode::NoNetworkPermission
    );
}

#[tokio::test]
async fn cleared_requests_complete_silently() {
    let client = MockClient::default();
    client
        .push(json_response(StatusCode::OK, json!({"referral_code": "X"})))
        .await;
    let exec = executor(client.clone(), StaticEnvironment::online());
    let (outcome, mut req) = create_request();
    req.clear_callback();

    assert_eq!(
        exec.execute(&mut req).await,
        Dispatch::Completed { status: 200 }
    );
    assert_eq!(client.take_log().await.len(), 1);
    assert!(outcome.lock().unwrap().is_empty());
}

#[tokio::test]
async fn restored_requests_replay_their_payload() {
    let client = MockClient::default();
    client
        .push(json_response(StatusCode::OK, json!({"referral_code": "X"})))
        .await;
    let exec = executor(client.clone(), StaticEnvironment::online());
    let (_outcome, queued) = create_request();

    let stored = queued.persist().unwrap().to_json().unwrap();
    let mut restored = ReferralCodeRequest::from_persisted(
        PersistedRequest::from_json(&stored).unwrap(),
    );
    assert_eq!(
        exec.execute(&mut restored).await,
        Dispatch::Completed { status: 200 }
    );

    let log = client.take_log().await;
    let body: Value = serde_json::from_slice(log[0].body()).unwrap();
    assert_eq!(body["prefix"], "OFFER");
    assert_eq!(body["session_id"], "session");
}

#[tokio::test]
async fn boxed_requests_dispatch_through_the_trait() {
    let client = MockClient::default();
    client
        .push(json_response(StatusCode::OK, json!({"referral_code": "X"})))
        .await;
    let exec = executor(client.clone(), StaticEnvironment::online());
    let (outcome, req) = create_request();
    let mut boxed: Box<dyn ServerRequest> = Box::new(req);

    exec.execute(&mut boxed).await;
    assert_eq!(outcome.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn restored_payloads_without_session_are_never_sent() {
    let client = MockClient::default();
    let exec = executor(client.clone(), StaticEnvironment::online());
    let stored = r#"{"REQ_POST_PATH":"v1/referralcode","REQ_POST":{}}"#;
    let mut restored =
        ReferralCodeRequest::from_persisted(PersistedRequest::from_json(stored).unwrap());

    assert!(restored.is_construct_error());
    assert_eq!(exec.execute(&mut restored).await, Dispatch::Rejected);
    assert!(client.take_log().await.is_empty());
}

// Holds each send until the test releases a response.
#[derive(Clone, Default)]
struct GatedClient {
    started: Arc<Mutex<Option<oneshot::Sender<()>>>>,
    release: Arc<Mutex<Option<oneshot::Receiver<HttpResponse<Vec<u8>>>>>>,
}

impl HttpClient for GatedClient {
    type Error = TransportError;

    fn send_http(
        &self,
        _request: http::Request<Vec<u8>>,
    ) -> impl core::future::Future<
        Output = core::result::Result<http::Response<Vec<u8>>, Self::Error>,
    > + Send {
        let started = self.started.clone();
        let release = self.release.clone();
        async move {
            if let Some(started) = started.lock().await.take() {
                started.send(()).ok();
            }
            let release = release.lock().await.take().expect("no gated response");
            release
                .await
                .map_err(|_| TransportError::Connect("gate dropped".into()))
        }
    }
}

#[tokio::test]
async fn clearing_mid_flight_drops_the_late_response() {
    let (started_tx, started_rx) = oneshot::channel();
    let (release_tx, release_rx) = oneshot::channel();
    let client = GatedClient {
        started: Arc::new(Mutex::new(Some(started_tx))),
        release: Arc::new(Mutex::new(Some(release_rx))),
    };
    let exec = RequestExecutor::new(
        client,
        StaticEnvironment::online(),
        ExecutorOptions::default(),
    );
    let (outcome, mut req) = create_request();
    let handle = req.callback_handle();

    let owner = async {
        started_rx.await.unwrap();
        assert!(handle.is_set());
        handle.clear();
        release_tx
            .send(json_response(StatusCode::OK, json!({"referral_code": "LATE"})))
            .unwrap();
    };
    let (dispatch, ()) = tokio::join!(exec.execute(&mut req), owner);

    assert_eq!(dispatch, Dispatch::Completed { status: 200 });
    assert!(!req.has_callback());
    assert!(outcome.lock().unwrap().is_empty());
}
