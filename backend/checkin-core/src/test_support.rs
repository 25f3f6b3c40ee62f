// src/test_support.rs
//
// In-process stand-in for the backend, used by the HTTP tests.

use crate::api_client::CheckinClient;
use crate::config::AppConfig;
use crate::context::AppContext;
use crate::i18n::Translations;
use crate::models::UserProfile;
use crate::notify::RecordingNotifier;
use crate::session_store::SessionStore;
use axum::{
    extract::{RawQuery, State},
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub action: String,
    pub params: HashMap<String, String>,
    pub body: Option<Value>,
}

#[derive(Clone, Default)]
struct MockState {
    replies: Arc<Mutex<HashMap<String, Value>>>,
    calls: Arc<Mutex<Vec<RecordedCall>>>,
}

impl MockState {
    fn reply_for(&self, key: &str) -> Option<Value> {
        self.replies.lock().ok()?.get(key).cloned()
    }

    fn record(&self, call: RecordedCall) {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
    }
}

pub struct MockBackend {
    pub base_url: String,
    state: MockState,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = MockState::default();
        let app = Router::new()
            .route("/api", get(handle_get).post(handle_post))
            .fallback(handle_other)
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
        }
    }

    pub fn api_url(&self) -> String {
        format!("{}/api", self.base_url)
    }

    /// Scripts the reply for a backend action, or for a path such as `/ip`.
    pub fn reply(&self, key: &str, body: Value) {
        self.state
            .replies
            .lock()
            .unwrap()
            .insert(key.to_string(), body);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, action: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.action == action)
            .collect()
    }

    pub fn config(&self, session_file: PathBuf) -> AppConfig {
        AppConfig {
            api_url: self.api_url(),
            i18n_base_url: self.base_url.clone(),
            nominatim_url: format!("{}/search", self.base_url),
            ipify_url: format!("{}/ip", self.base_url),
            session_file,
            request_timeout_secs: 5,
            ..AppConfig::default()
        }
    }
}

async fn handle_get(
    State(state): State<MockState>,
    RawQuery(query): RawQuery,
) -> Json<Value> {
    // The first `action` routes; review calls carry a second one as the decision.
    let mut action = None;
    let mut params = HashMap::new();
    for (key, value) in url::form_urlencoded::parse(query.unwrap_or_default().as_bytes()).into_owned() {
        if key == "action" && action.is_none() {
            action = Some(value);
        } else {
            params.insert(key, value);
        }
    }
    let action = action.unwrap_or_default();
    let reply = state
        .reply_for(&action)
        .unwrap_or_else(|| json!({ "ok": false, "code": "UNKNOWN_ACTION" }));
    state.record(RecordedCall {
        action,
        params,
        body: None,
    });
    Json(reply)
}

async fn handle_post(State(state): State<MockState>, Json(body): Json<Value>) -> Json<Value> {
    let action = body
        .get("action")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let reply = state
        .reply_for(&action)
        .unwrap_or_else(|| json!({ "ok": false, "code": "UNKNOWN_ACTION" }));
    state.record(RecordedCall {
        action,
        params: HashMap::new(),
        body: Some(body),
    });
    Json(reply)
}

async fn handle_other(State(state): State<MockState>, uri: Uri) -> Response {
    let path = uri.path().to_string();
    let params: HashMap<String, String> = uri
        .query()
        .map(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default();
    let reply = state.reply_for(&path);
    state.record(RecordedCall {
        action: path,
        params,
        body: None,
    });
    match reply {
        Some(body) => Json(body).into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

pub fn temp_session_path(test_name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "checkin_test_{}_{}.json",
        test_name,
        std::process::id()
    ))
}

pub fn teardown(path: &PathBuf) {
    let _ = std::fs::remove_file(path);
}

pub fn sample_user() -> UserProfile {
    UserProfile {
        user_id: "U100".into(),
        name: "王小明".into(),
        dept: "設計部".into(),
        ..Default::default()
    }
}

/// A context wired to the mock, with a logged-in session for `sample_user`.
pub async fn logged_in_context(
    backend: &MockBackend,
    test_name: &str,
) -> (AppContext, RecordingNotifier, PathBuf) {
    let path = temp_session_path(test_name);
    teardown(&path);
    let mut store = SessionStore::load(path.clone()).unwrap();
    store.store_login("tok-1", &sample_user(), chrono::Utc::now().timestamp_millis());
    let session = store.shared();

    let client = CheckinClient::new(backend.config(path.clone()), session).unwrap();
    let notifier = RecordingNotifier::new();
    let ctx = AppContext::new(
        client,
        Arc::new(notifier.clone()),
        Translations::default(),
    );
    (ctx, notifier, path)
}

/// Same as [`logged_in_context`] but with an empty session.
pub async fn logged_out_context(
    backend: &MockBackend,
    test_name: &str,
) -> (AppContext, RecordingNotifier, PathBuf) {
    let path = temp_session_path(test_name);
    teardown(&path);
    let session = SessionStore::load(path.clone()).unwrap().shared();
    let client = CheckinClient::new(backend.config(path.clone()), session).unwrap();
    let notifier = RecordingNotifier::new();
    let ctx = AppContext::new(
        client,
        Arc::new(notifier.clone()),
        Translations::default(),
    );
    (ctx, notifier, path)
}
