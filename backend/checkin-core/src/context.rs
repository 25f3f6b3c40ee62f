// src/context.rs

use crate::api_client::{ActionParams, ApiResponse, CheckinClient, CheckinError};
use crate::i18n::Translations;
use crate::notify::{NotificationKind, Notifier};
use std::sync::Arc;
use tracing::error;

/// What every user action needs: the backend client, translations and a
/// place to report outcomes.
#[derive(Clone)]
pub struct AppContext {
    pub client: CheckinClient,
    pub notifier: Arc<dyn Notifier>,
    pub i18n: Arc<Translations>,
}

impl AppContext {
    pub fn new(client: CheckinClient, notifier: Arc<dyn Notifier>, i18n: Translations) -> Self {
        Self {
            client,
            notifier,
            i18n: Arc::new(i18n),
        }
    }

    pub fn t(&self, key: &str) -> String {
        self.i18n.t(key)
    }

    pub fn t_or(&self, key: &str, fallback: &str) -> String {
        self.i18n.t_or(key, fallback)
    }

    /// The backend's status message, with its params substituted.
    pub fn response_message(&self, response: &ApiResponse) -> String {
        self.i18n
            .t_with(response.code_or_unknown(), &response.params())
    }

    /// Success or error notification chosen by the reply's `ok` flag.
    pub fn notify_response(&self, response: &ApiResponse) {
        let kind = if response.ok() {
            NotificationKind::Success
        } else {
            NotificationKind::Error
        };
        self.notifier.notify(&self.response_message(response), kind);
    }

    /// Text for an error, preferring the form's own hint for validation failures.
    pub fn error_message(&self, err: &CheckinError) -> String {
        match err {
            CheckinError::Validation(v) => self.t_or(v.message_key(), v.fallback_text()),
            other => self.t(&other.message_key()),
        }
    }

    /// Logs the failure of `action` and surfaces it as an error notification.
    pub fn report_error(&self, action: &str, err: &CheckinError) {
        error!("{} failed: {}", action, err);
        self.notifier.error(&self.error_message(err));
    }

    /// Sends a state-changing action and notifies its outcome. An `ok:false`
    /// reply is returned as `CheckinError::Backend`.
    pub async fn submit(
        &self,
        action: &str,
        params: &ActionParams<'_>,
    ) -> Result<ApiResponse, CheckinError> {
        let response = match self.client.call(action, params).await {
            Ok(response) => response,
            Err(e) => {
                self.report_error(action, &e);
                return Err(e);
            }
        };
        self.notify_response(&response);
        response.into_result(action)
    }

    /// Reads data; any failure, including `ok:false`, is reported.
    pub async fn fetch(
        &self,
        action: &str,
        params: &ActionParams<'_>,
    ) -> Result<ApiResponse, CheckinError> {
        let result = match self.client.call(action, params).await {
            Ok(response) => response.into_result(action),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            self.report_error(action, e);
        }
        result
    }

    pub async fn session_user_id(&self) -> Option<String> {
        let session = self.client.session().lock().await;
        session.session_user_id().map(str::to_string)
    }

    pub async fn has_token(&self) -> bool {
        self.client.session().lock().await.token().is_some()
    }
}
