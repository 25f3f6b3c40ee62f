// src/config.rs

use crate::api_client::CheckinError;
use serde::Deserialize;
use std::path::PathBuf;

pub const DEFAULT_REDIRECT_URL: &str = "https://cwm-architects.github.io/Diary_CheckIn/";
pub const DEFAULT_I18N_BASE_URL: &str = "https://cwm-architects.github.io/Diary_CheckIn";
pub const DEFAULT_SESSION_FILE: &str = "checkin_session.json";
pub const DEFAULT_CALLBACK_PORT: u16 = 8765;
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_NOMINATIM_URL: &str = "https://nominatim.openstreetmap.org/search";
pub const DEFAULT_IPIFY_URL: &str = "https://api.ipify.org";
pub const ENV_PREFIX: &str = "CHECKIN_";

fn default_redirect_url() -> String {
    DEFAULT_REDIRECT_URL.to_string()
}

fn default_i18n_base_url() -> String {
    DEFAULT_I18N_BASE_URL.to_string()
}

fn default_session_file() -> PathBuf {
    PathBuf::from(DEFAULT_SESSION_FILE)
}

fn default_callback_port() -> u16 {
    DEFAULT_CALLBACK_PORT
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_nominatim_url() -> String {
    DEFAULT_NOMINATIM_URL.to_string()
}

fn default_ipify_url() -> String {
    DEFAULT_IPIFY_URL.to_string()
}

/// Runtime configuration, read from `CHECKIN_*` environment variables
/// (optionally via `.env`).
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// The single backend endpoint every action is sent to.
    pub api_url: String,
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,
    #[serde(default = "default_i18n_base_url")]
    pub i18n_base_url: String,
    #[serde(default = "default_session_file")]
    pub session_file: PathBuf,
    #[serde(default = "default_callback_port")]
    pub callback_port: u16,
    pub cert_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Stand-in for browser geolocation when no coordinates are passed.
    pub default_lat: Option<f64>,
    pub default_lng: Option<f64>,
    #[serde(default = "default_nominatim_url")]
    pub nominatim_url: String,
    #[serde(default = "default_ipify_url")]
    pub ipify_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_url: String::new(),
            redirect_url: default_redirect_url(),
            i18n_base_url: default_i18n_base_url(),
            session_file: default_session_file(),
            callback_port: DEFAULT_CALLBACK_PORT,
            cert_path: None,
            key_path: None,
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            default_lat: None,
            default_lng: None,
            nominatim_url: default_nominatim_url(),
            ipify_url: default_ipify_url(),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, CheckinError> {
        dotenv::dotenv().ok();
        Self::from_iter(std::env::vars())
    }

    /// Builds the config from an explicit variable list.
    pub fn from_iter<I>(vars: I) -> Result<Self, CheckinError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config = envy::prefixed(ENV_PREFIX)
            .from_iter::<_, AppConfig>(vars)
            .map_err(|e| CheckinError::Config(e.to_string()))?;

        if config.api_url.trim().is_empty() {
            return Err(CheckinError::Config(format!(
                "{}API_URL must not be empty",
                ENV_PREFIX
            )));
        }
        Ok(config)
    }

    /// TLS for the callback listener is only enabled when both files are set.
    pub fn tls_paths(&self) -> Option<(PathBuf, PathBuf)> {
        match (&self.cert_path, &self.key_path) {
            (Some(cert), Some(key)) => Some((cert.clone(), key.clone())),
            _ => None,
        }
    }

    pub fn default_coordinates(&self) -> Option<(f64, f64)> {
        self.default_lat.zip(self.default_lng)
    }
}
