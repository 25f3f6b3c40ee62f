// src/api_client.rs

use crate::config::AppConfig;
use crate::session_store::SharedSession;
use crate::validation::ValidationError;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use url::Url;

pub const USER_AGENT: &str = concat!("checkin-core/", env!("CARGO_PKG_VERSION"));

/// Query parameters for a backend action, in the order they are appended.
pub type ActionParams<'a> = [(&'a str, String)];

#[derive(Error, Debug)]
pub enum CheckinError {
    #[error("HTTP request failed")]
    Request(#[from] reqwest::Error),

    #[error("JSON processing error")]
    Json(#[from] serde_json::Error),

    #[error("File I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    #[error("URL parsing error")]
    UrlParse(#[from] url::ParseError),

    #[error("HTTP error: Status={status}, Body='{body}'")]
    Http { status: StatusCode, body: String },

    #[error("Backend rejected '{action}': code={code}, msg='{msg}'")]
    Backend {
        action: String,
        code: String,
        msg: String,
    },

    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),

    #[error("Not logged in")]
    NotLoggedIn,

    #[error("Permission denied")]
    PermissionDenied,

    #[error("A submission is already in progress")]
    InFlight,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("CSV error")]
    Csv(#[from] csv::Error),
}

impl CheckinError {
    /// Translation key used when the error is surfaced as a notification.
    pub fn message_key(&self) -> String {
        match self {
            CheckinError::Request(_) | CheckinError::Http { .. } => "CONNECTION_FAILED".into(),
            CheckinError::Backend { code, .. } if !code.is_empty() => code.clone(),
            CheckinError::Backend { .. } => "UNKNOWN_ERROR".into(),
            CheckinError::Validation(v) => v.message_key().into(),
            CheckinError::NotLoggedIn => "SUBTITLE_LOGIN".into(),
            CheckinError::PermissionDenied => "ERR_NO_PERMISSION".into(),
            CheckinError::InFlight => "LOADING".into(),
            _ => "UNKNOWN_ERROR".into(),
        }
    }
}

// Helper to create context-aware IO errors
pub(crate) fn io_context<E: Into<std::io::Error>, S: Into<String>>(
    source: E,
    context: S,
) -> CheckinError {
    CheckinError::Io {
        source: source.into(),
        context: context.into(),
    }
}

/// Aliases `success`/`ok` and `data`/`records` in both directions.
/// Keys that are already present are left untouched.
pub fn normalize_response(mut value: Value) -> Value {
    if let Value::Object(map) = &mut value {
        alias_field(map, "success", "ok");
        alias_field(map, "ok", "success");
        alias_field(map, "data", "records");
        alias_field(map, "records", "data");
    }
    value
}

fn alias_field(map: &mut Map<String, Value>, from: &str, to: &str) {
    if map.contains_key(to) {
        return;
    }
    if let Some(v) = map.get(from).cloned() {
        map.insert(to.to_string(), v);
    }
}

/// JavaScript-style truthiness, which is how the backend's flags are meant to be read.
pub(crate) fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

pub(crate) fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// A normalized backend reply.
#[derive(Debug, Clone, Default)]
pub struct ApiResponse {
    body: Map<String, Value>,
}

impl ApiResponse {
    pub fn from_value(value: Value) -> Self {
        match normalize_response(value) {
            Value::Object(body) => Self { body },
            other => {
                warn!("Backend reply is not a JSON object: {}", other);
                Self::default()
            }
        }
    }

    pub fn ok(&self) -> bool {
        self.body.get("ok").map(is_truthy).unwrap_or(false)
    }

    pub fn code(&self) -> Option<&str> {
        self.body
            .get("code")
            .and_then(Value::as_str)
            .filter(|c| !c.is_empty())
    }

    /// The status code for display, `UNKNOWN_ERROR` when the backend sent none.
    pub fn code_or_unknown(&self) -> &str {
        self.code().unwrap_or("UNKNOWN_ERROR")
    }

    pub fn msg(&self) -> Option<&str> {
        self.body
            .get("msg")
            .and_then(Value::as_str)
            .filter(|m| !m.is_empty())
    }

    /// Message parameters, stringified for template substitution.
    pub fn params(&self) -> HashMap<String, String> {
        match self.body.get("params") {
            Some(Value::Object(map)) => map
                .iter()
                .map(|(k, v)| (k.clone(), value_to_string(v)))
                .collect(),
            _ => HashMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.body
    }

    /// Reads a payload field; absent or malformed fields yield `None`.
    pub fn field<T: DeserializeOwned>(&self, name: &str) -> Option<T> {
        let value = self.body.get(name)?;
        if value.is_null() {
            return None;
        }
        match serde_json::from_value::<T>(value.clone()) {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!("Could not read field '{}' from backend reply: {}", name, e);
                None
            }
        }
    }

    /// Reads a list field element by element, skipping entries that do not parse.
    pub fn list<T: DeserializeOwned>(&self, name: &str) -> Vec<T> {
        match self.body.get(name) {
            Some(Value::Array(items)) => items
                .iter()
                .filter_map(|item| match serde_json::from_value::<T>(item.clone()) {
                    Ok(parsed) => Some(parsed),
                    Err(e) => {
                        warn!("Skipping malformed entry in '{}': {}", name, e);
                        None
                    }
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn records<T: DeserializeOwned>(&self) -> Vec<T> {
        self.list("records")
    }

    /// Turns an `ok:false` reply into `CheckinError::Backend`.
    pub fn into_result(self, action: &str) -> Result<Self, CheckinError> {
        if self.ok() {
            return Ok(self);
        }
        Err(CheckinError::Backend {
            action: action.to_string(),
            code: self.code().unwrap_or_default().to_string(),
            msg: self.msg().unwrap_or_default().to_string(),
        })
    }
}

/// Client for the single-endpoint attendance backend.
#[derive(Clone)]
pub struct CheckinClient {
    config: Arc<AppConfig>,
    http_client: Client,
    session: SharedSession,
}

impl CheckinClient {
    pub fn new(config: AppConfig, session: SharedSession) -> Result<Self, CheckinError> {
        let http_client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            config: Arc::new(config),
            http_client,
            session,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn http(&self) -> &Client {
        &self.http_client
    }

    async fn current_token(&self) -> String {
        let session = self.session.lock().await;
        session.token().unwrap_or_default().to_string()
    }

    /// `{apiUrl}?action=..&<params>&token=..`
    pub fn build_action_url(
        &self,
        action: &str,
        params: &ActionParams<'_>,
        token: &str,
    ) -> Result<Url, CheckinError> {
        let mut url = Url::parse(&self.config.api_url)?;
        {
            let mut pairs = url.query_pairs_mut();
            pairs.append_pair("action", action);
            for (key, value) in params {
                pairs.append_pair(key, value);
            }
            pairs.append_pair("token", token);
        }
        Ok(url)
    }

    /// Sends an action as a GET request and normalizes the reply.
    /// `ok:false` is not an error here; callers decide.
    pub async fn call(
        &self,
        action: &str,
        params: &ActionParams<'_>,
    ) -> Result<ApiResponse, CheckinError> {
        let token = self.current_token().await;
        let url = self.build_action_url(action, params, &token)?;
        let request = self.http_client.get(url);
        self.send(request, action).await
    }

    /// Sends `{action, token, ..body}` as a JSON POST.
    pub async fn post_json(&self, action: &str, body: Value) -> Result<ApiResponse, CheckinError> {
        let token = self.current_token().await;
        let mut payload = match body {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                map.insert("payload".to_string(), other);
                map
            }
        };
        payload.insert("action".to_string(), Value::String(action.to_string()));
        payload.insert("token".to_string(), Value::String(token));

        let request = self
            .http_client
            .post(self.config.api_url.as_str())
            .json(&Value::Object(payload));
        self.send(request, action).await
    }

    async fn send(&self, request: RequestBuilder, action: &str) -> Result<ApiResponse, CheckinError> {
        let request = request.build()?;
        debug!("Sending action '{}' to {}", action, self.config.api_url);

        let response = match self.http_client.execute(request).await {
            Ok(resp) => resp,
            Err(e) => {
                error!("HTTP execution failed for action '{}': {}", action, e);
                return Err(CheckinError::Request(e));
            }
        };

        let status = response.status();
        info!("Received response for '{}': Status={}", action, status);

        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|e| format!("Failed to read error body: {}", e));
            error!(
                "Backend HTTP error for '{}': Status={}, Body='{}'",
                action, status, body
            );
            return Err(CheckinError::Http { status, body });
        }

        let bytes = response.bytes().await?;
        let value: Value = match serde_json::from_slice(&bytes) {
            Ok(value) => value,
            Err(e) => {
                error!("JSON deserialization failed for '{}': {}", action, e);
                return Err(CheckinError::Json(e));
            }
        };

        let response = ApiResponse::from_value(value);
        if !response.ok() {
            debug!(
                "Action '{}' answered ok=false (code={:?}, msg={:?})",
                action,
                response.code(),
                response.msg()
            );
        }
        Ok(response)
    }
}
