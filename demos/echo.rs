use dyn_connector::{Connector, Map, SessionPersistor, Value};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use tracing_subscriber::EnvFilter;

/// Keeps the session token between calls and reports every access.
#[derive(Default)]
struct Session {
    token: Mutex<String>,
}

impl SessionPersistor for Session {
    fn session_token(&self) -> String {
        let token = self.token.lock().unwrap().clone();
        println!("Connector requires session token (\"{token}\")");
        token
    }

    fn set_session_token(&self, token: &str) {
        *self.token.lock().unwrap() = token.to_owned();
        println!("New session token \"{token}\"");
    }
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[allow(non_snake_case)]
struct TestData {
    KeyA: i64,
    SubData: TestSubData,
}

#[derive(Serialize, Deserialize, Debug, Default)]
#[allow(non_snake_case)]
struct TestSubData {
    Key1: i32,
    Key2: bool,
    Key3: String,
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "debug".into()))
        .init();

    let domain = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:7070".to_owned());
    let connector = Connector::new(domain, "test", "test", Arc::new(Session::default())).unwrap();

    // Enable debugging output (please disable in production)
    connector.set_debug(true, None, false);

    let data_send = TestData {
        KeyA: 1024,
        SubData: TestSubData {
            Key1: 1,
            Key2: true,
            Key3: "This is a test".into(),
        },
    };
    let mut data_receive = TestData::default();

    match connector.send("echo", &data_send, &mut data_receive).await {
        Ok(()) => println!("Server response: {data_receive:?}"),
        Err(err) => {
            println!("Error: {err}");
            return;
        }
    }

    let open: Value = [
        ("KeyA", Value::from(1024)),
        (
            "SubData",
            [
                ("Key1", Value::from(1)),
                ("Key2", true.into()),
                ("Key3", "This is a test".into()),
            ]
            .into_iter()
            .collect(),
        ),
    ]
    .into_iter()
    .collect();
    let mut open_receive = Map::new();
    match connector.send("echo/auth", &open, &mut open_receive).await {
        Ok(()) => println!("Server response: {open_receive:?}"),
        Err(err) => println!("Error: {err}"),
    }
}
