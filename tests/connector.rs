use async_trait::async_trait;
use dyn_connector::{
    AuthError, ConfigError, Connector, ConnectorConfig, DebugSink, Error, HandshakeFailure,
    Map, MarshalError, MemoryPersistor, Request, Response, SessionPersistor, SessionState,
    Transport, TransportError, Value,
};
use serde::{Deserialize, Serialize};
use std::{
    io::{self, Write},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

#[derive(Serialize, Deserialize, Debug, PartialEq, Default, Clone)]
#[allow(non_snake_case)]
struct TestData {
    KeyA: i64,
    SubData: TestSubData,
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Default, Clone)]
#[allow(non_snake_case)]
struct TestSubData {
    Key1: i32,
    Key2: bool,
    Key3: String,
}

fn test_data() -> TestData {
    TestData {
        KeyA: 1024,
        SubData: TestSubData {
            Key1: 1,
            Key2: true,
            Key3: "This is a test".into(),
        },
    }
}

/// Scripted service: `auth` grants tokens for uid/master_token "test",
/// `echo` returns its payload, methods ending in `/auth` need the last
/// issued token, `missing` fails remotely, `nothing` answers OK with no
/// payload, `partial` answers with null fields and `down` never answers.
#[derive(Default)]
struct EchoService {
    handshakes: AtomicUsize,
    dispatches: AtomicUsize,
    issued: Mutex<Option<String>>,
    reject_all: bool,
    handshake_delay: Option<Duration>,
}

impl EchoService {
    fn handshakes(&self) -> usize {
        self.handshakes.load(Ordering::SeqCst)
    }

    fn dispatches(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for EchoService {
    async fn round_trip(&self, domain: &str, req: Request) -> Result<Response, TransportError> {
        assert_eq!(domain, "modulo.srl");
        if req.method == "down" {
            return Err(io::Error::from(io::ErrorKind::ConnectionRefused).into());
        }

        if req.method == "auth" {
            self.handshakes.fetch_add(1, Ordering::SeqCst);
            if let Some(delay) = self.handshake_delay {
                tokio::time::sleep(delay).await;
            }
            let uid = req.payload.get("uid").and_then(Value::as_str);
            let master = req.payload.get("master_token").and_then(Value::as_str);
            if uid != Some("test") || master != Some("test") {
                return Ok(Response::remote_error("invalid credentials"));
            }
            let token = format!("tok-{:08x}", rand::random::<u32>());
            *self.issued.lock().unwrap() = Some(token.clone());
            let grant: Value = [("auth", Value::from(true)), ("session_token", token.into())]
                .into_iter()
                .collect();
            return Ok(Response::ok(grant));
        }

        self.dispatches.fetch_add(1, Ordering::SeqCst);
        let method = match req.method.strip_suffix("/auth") {
            Some(method) => {
                let valid = self.issued.lock().unwrap().clone();
                if req.token.is_empty() {
                    return Ok(Response::auth_required());
                }
                if self.reject_all || valid.as_deref() != Some(req.token.as_str()) {
                    return Ok(Response::auth_rejected());
                }
                method
            }
            None => req.method.as_str(),
        };

        Ok(match method {
            "echo" => Response::ok(req.payload),
            "missing" => Response::remote_error("not found"),
            "nothing" => Response::ok(Value::Nil),
            "partial" => Response::ok(
                [
                    ("KeyA", Value::Nil),
                    (
                        "SubData",
                        [
                            ("Key1", Value::Nil),
                            ("Key2", Value::Nil),
                            ("Key3", Value::from("kept")),
                        ]
                        .into_iter()
                        .collect(),
                    ),
                ]
                .into_iter()
                .collect::<Value>(),
            ),
            _ => Response::remote_error("unknown method"),
        })
    }
}

/// Records every token handed to the persistor.
#[derive(Default)]
struct RecordingPersistor {
    inner: MemoryPersistor,
    sets: Mutex<Vec<String>>,
}

impl RecordingPersistor {
    fn with_token(token: &str) -> Self {
        Self {
            inner: MemoryPersistor::with_token(token),
            ..Default::default()
        }
    }

    fn sets(&self) -> Vec<String> {
        self.sets.lock().unwrap().clone()
    }
}

impl SessionPersistor for RecordingPersistor {
    fn session_token(&self) -> String {
        self.inner.session_token()
    }

    fn set_session_token(&self, token: &str) {
        self.sets.lock().unwrap().push(token.to_owned());
        self.inner.set_session_token(token);
    }
}

fn connector(
    service: &Arc<EchoService>,
    persistor: &Arc<RecordingPersistor>,
) -> Connector<Arc<EchoService>> {
    Connector::with_transport(
        ConnectorConfig::new("modulo.srl", "test", "test"),
        persistor.clone(),
        service.clone(),
    )
    .unwrap()
}

#[tokio::test]
async fn typed_echo() {
    let service = Arc::new(EchoService::default());
    let persistor = Arc::new(RecordingPersistor::default());
    let connector = connector(&service, &persistor);

    let mut out = TestData::default();
    connector.send("echo", &test_data(), &mut out).await.unwrap();
    assert_eq!(out, test_data());
}

#[tokio::test]
async fn open_map_echo() {
    let service = Arc::new(EchoService::default());
    let persistor = Arc::new(RecordingPersistor::default());
    let connector = connector(&service, &persistor);

    let sub: Value = [
        ("Key1", Value::from(1)),
        ("Key2", true.into()),
        ("Key3", "This is a test".into()),
    ]
    .into_iter()
    .collect();
    let mut request = Map::new();
    request.insert("KeyA".into(), 1024.into());
    request.insert("SubData".into(), sub);

    let mut out = Map::new();
    connector.send("echo", &request, &mut out).await.unwrap();
    assert_eq!(out, request);

    // Same reply, read back as a fixed-shape record.
    let typed: TestData = connector.call("echo", &request).await.unwrap();
    assert_eq!(typed, test_data());
}

#[tokio::test]
async fn authenticated_connector_does_not_handshake_again() {
    let service = Arc::new(EchoService::default());
    let persistor = Arc::new(RecordingPersistor::default());
    let connector = connector(&service, &persistor);

    for _ in 0..5 {
        let _: TestData = connector.call("echo/auth", &test_data()).await.unwrap();
    }
    assert_eq!(service.handshakes(), 1);
    assert_eq!(service.dispatches(), 5);
    assert_eq!(connector.handshakes(), 1);
    assert_eq!(connector.session_state(), SessionState::Authenticated);
}

#[tokio::test]
async fn first_authenticated_call_handshakes_once() {
    let service = Arc::new(EchoService::default());
    let persistor = Arc::new(RecordingPersistor::default());
    let connector = connector(&service, &persistor);
    assert_eq!(connector.session_state(), SessionState::Unauthenticated);

    let mut out = TestData::default();
    connector
        .send("echo/auth", &test_data(), &mut out)
        .await
        .unwrap();

    assert_eq!(out, test_data());
    assert_eq!(service.handshakes(), 1);
    assert_eq!(service.dispatches(), 1);
    let sets = persistor.sets();
    assert_eq!(sets.len(), 1);
    assert!(!sets[0].is_empty());
    assert_eq!(persistor.session_token(), sets[0]);
}

#[tokio::test]
async fn expired_token_is_refreshed_and_retried_once() {
    let service = Arc::new(EchoService::default());
    let persistor = Arc::new(RecordingPersistor::with_token("expired"));
    let connector = connector(&service, &persistor);

    let out: TestData = connector.call("echo/auth", &test_data()).await.unwrap();
    assert_eq!(out, test_data());
    assert_eq!(service.handshakes(), 1);
    assert_eq!(service.dispatches(), 2);

    let sets = persistor.sets();
    assert_eq!(sets.len(), 2);
    assert_eq!(sets[0], "");
    assert_ne!(sets[1], "expired");
    assert!(!sets[1].is_empty());
}

#[tokio::test]
async fn second_rejection_is_unauthorized() {
    let service = Arc::new(EchoService {
        reject_all: true,
        ..Default::default()
    });
    let persistor = Arc::new(RecordingPersistor::with_token("expired"));
    let connector = connector(&service, &persistor);

    let mut out = test_data();
    let err = connector
        .send("echo/auth", &TestData::default(), &mut out)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Auth(AuthError::Unauthorized)), "{err}");
    assert_eq!(service.handshakes(), 1);
    assert_eq!(service.dispatches(), 2);
    assert_eq!(out, test_data());
}

#[tokio::test]
async fn remote_error_is_surfaced_verbatim() {
    let service = Arc::new(EchoService::default());
    let persistor = Arc::new(RecordingPersistor::default());
    let connector = connector(&service, &persistor);

    let mut out = test_data();
    let err = connector
        .send("missing", &TestData::default(), &mut out)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Remote(_)));
    assert_eq!(err.to_string(), "not found");
    assert_eq!(out, test_data());
    assert_eq!(service.dispatches(), 1);
}

#[tokio::test]
async fn empty_reply_decodes_as_zero_values() {
    let service = Arc::new(EchoService::default());
    let persistor = Arc::new(RecordingPersistor::default());
    let connector = connector(&service, &persistor);

    let mut out = test_data();
    connector.send("nothing/auth", &test_data(), &mut out).await.unwrap();
    assert_eq!(out, TestData::default());

    let mut map = Map::new();
    map.insert("stale".into(), Value::from(1));
    connector.send("nothing", &(), &mut map).await.unwrap();
    assert!(map.is_empty());

    let reply: Option<TestData> = connector.call("nothing", &()).await.unwrap();
    assert_eq!(reply, None);
}

#[tokio::test]
async fn null_fields_in_reply_are_zeroed() {
    let service = Arc::new(EchoService::default());
    let persistor = Arc::new(RecordingPersistor::default());
    let connector = connector(&service, &persistor);

    let mut out = test_data();
    connector.send("partial", &(), &mut out).await.unwrap();
    assert_eq!(out.KeyA, 0);
    assert_eq!(out.SubData.Key1, 0);
    assert!(!out.SubData.Key2);
    assert_eq!(out.SubData.Key3, "kept");

    let open: Map = connector.call("partial", &()).await.unwrap();
    assert_eq!(open["KeyA"], Value::Nil);
}

#[tokio::test]
async fn shape_mismatch_in_reply() {
    let service = Arc::new(EchoService::default());
    let persistor = Arc::new(RecordingPersistor::default());
    let connector = connector(&service, &persistor);

    let mut request = dyn_connector::marshal::to_value(&test_data()).unwrap();
    if let Value::Map(fields) = &mut request {
        if let Some(Value::Map(sub)) = fields.get_mut("SubData") {
            sub.insert("Key2".into(), "true".into());
        }
    }

    let mut out = TestData::default();
    let err = connector
        .send("echo", &request, &mut out)
        .await
        .unwrap_err();
    assert!(
        matches!(err, Error::Marshal(MarshalError::ShapeMismatch(_))),
        "{err}"
    );
    assert_eq!(out, TestData::default());

    let mut open = Map::new();
    connector.send("echo", &request, &mut open).await.unwrap();
    assert_eq!(Value::Map(open), request);
}

#[tokio::test]
async fn bad_credentials_fail_the_handshake() {
    let service = Arc::new(EchoService::default());
    let persistor = Arc::new(RecordingPersistor::default());
    let connector = Connector::with_transport(
        ConnectorConfig::new("modulo.srl", "test", "wrong"),
        persistor.clone(),
        service.clone(),
    )
    .unwrap();

    let err = connector
        .call::<_, Value>("echo/auth", &test_data())
        .await
        .unwrap_err();
    match err {
        Error::Auth(AuthError::HandshakeFailed(HandshakeFailure::Rejected(reason))) => {
            assert_eq!(reason, "invalid credentials")
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(service.handshakes(), 1);
    assert_eq!(service.dispatches(), 0);
    assert!(persistor.sets().is_empty());
    assert_eq!(connector.session_state(), SessionState::Unauthenticated);
}

#[tokio::test]
async fn unreachable_auth_endpoint_keeps_transport_cause() {
    let service = Arc::new(EchoService::default());
    let config = ConnectorConfig {
        auth_method: "down".into(),
        ..ConnectorConfig::new("modulo.srl", "test", "test")
    };
    let connector = Connector::with_transport(
        config,
        Arc::new(MemoryPersistor::new()),
        service.clone(),
    )
    .unwrap();

    let err = connector
        .call::<_, Value>("echo", &())
        .await
        .unwrap_err();
    assert!(
        matches!(
            err,
            Error::Auth(AuthError::HandshakeFailed(HandshakeFailure::Transport(_)))
        ),
        "{err}"
    );
}

#[tokio::test]
async fn transport_failure_is_not_retried() {
    let service = Arc::new(EchoService::default());
    let persistor = Arc::new(RecordingPersistor::default());
    let connector = connector(&service, &persistor);

    let err = connector
        .call::<_, Value>("down", &test_data())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Transport(TransportError::Io(_))), "{err}");
    assert_eq!(service.handshakes(), 1);
    // Still authenticated: a transport failure says nothing about the token.
    assert_eq!(connector.session_state(), SessionState::Authenticated);
}

#[test]
fn empty_domain_or_uid_is_rejected() {
    let persistor = Arc::new(MemoryPersistor::new());
    for (domain, uid) in [("", "test"), ("modulo.srl", "")] {
        let err = Connector::with_transport(
            ConnectorConfig::new(domain, uid, "test"),
            persistor.clone(),
            Arc::new(EchoService::default()),
        )
        .err()
        .unwrap();
        assert!(matches!(
            err,
            Error::Config(ConfigError::InvalidArgument(_))
        ));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_handshake() {
    let service = Arc::new(EchoService {
        handshake_delay: Some(Duration::from_millis(50)),
        ..Default::default()
    });
    let persistor = Arc::new(RecordingPersistor::default());
    let connector = Arc::new(connector(&service, &persistor));

    let calls: Vec<_> = (0..16)
        .map(|i| {
            let connector = connector.clone();
            tokio::spawn(async move {
                let reply: i64 = connector.call("echo/auth", &i).await.unwrap();
                assert_eq!(reply, i);
            })
        })
        .collect();
    for call in calls {
        call.await.unwrap();
    }

    assert_eq!(service.handshakes(), 1);
    assert_eq!(persistor.sets().len(), 1);
}

#[derive(Clone, Default)]
struct SharedBuf(Arc<Mutex<Vec<u8>>>);

impl Write for SharedBuf {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(data)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[tokio::test]
async fn debug_sink_receives_trace_lines() {
    let service = Arc::new(EchoService::default());
    let persistor = Arc::new(RecordingPersistor::default());
    let connector = connector(&service, &persistor);
    let buf = SharedBuf::default();
    connector.set_debug(true, Some(DebugSink::writer(buf.clone())), false);

    let _: TestData = connector.call("echo", &test_data()).await.unwrap();

    let text = String::from_utf8(buf.0.lock().unwrap().clone()).unwrap();
    assert!(text.contains("request \"echo\" token=present payload=Map(2)"), "{text}");
    assert!(text.contains("response \"echo\" status=Ok"), "{text}");

    connector.set_debug(false, None, false);
    let before = buf.0.lock().unwrap().len();
    let _: TestData = connector.call("echo", &test_data()).await.unwrap();
    assert_eq!(buf.0.lock().unwrap().len(), before);
}
