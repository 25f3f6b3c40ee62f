// src/session_store.rs

use crate::api_client::{io_context, CheckinError};
use crate::models::UserProfile;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// How long a cached login profile may be used without asking the backend.
pub const LOGIN_CACHE_TTL_MS: i64 = 5 * 60 * 1000;

pub type SharedSession = Arc<Mutex<SessionStore>>;

/// Everything the client keeps between runs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionState {
    pub session_token: Option<String>,
    pub cached_user: Option<UserProfile>,
    /// Unix milliseconds at which `cached_user` was stored.
    pub cache_time: Option<i64>,
    pub lang: Option<String>,
    pub session_user_id: Option<String>,
    pub biometric_credential_id: Option<String>,
    pub biometric_user_id: Option<String>,
}

#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    state: SessionState,
}

impl SessionStore {
    /// Loads the store from `path`; a missing file is an empty store.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, CheckinError> {
        let path = path.into();
        let state = Self::read_state(&path)?;
        Ok(Self { path, state })
    }

    fn read_state(path: &Path) -> Result<SessionState, CheckinError> {
        if !path.exists() {
            return Ok(SessionState::default());
        }

        let json_string = fs::read_to_string(path)
            .map_err(|e| io_context(e, format!("Failed to read session file: {:?}", path)))?;
        match serde_json::from_str::<SessionState>(&json_string) {
            Ok(state) => Ok(state),
            Err(e) => {
                // A corrupt file behaves like a fresh install.
                warn!("Ignoring unreadable session file {:?}: {}", path, e);
                Ok(SessionState::default())
            }
        }
    }

    pub fn save(&self) -> Result<(), CheckinError> {
        let json_string = serde_json::to_string_pretty(&self.state)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    io_context(
                        e,
                        format!("Failed to create directory for session file: {:?}", parent),
                    )
                })?;
            }
        }

        let mut file = File::create(&self.path).map_err(|e| {
            io_context(e, format!("Failed to create session file: {:?}", self.path))
        })?;
        file.write_all(json_string.as_bytes()).map_err(|e| {
            io_context(
                e,
                format!("Failed to write session data to file: {:?}", self.path),
            )
        })?;
        debug!("Session state saved to {:?}", self.path);
        Ok(())
    }

    pub fn shared(self) -> SharedSession {
        Arc::new(Mutex::new(self))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn token(&self) -> Option<&str> {
        self.state
            .session_token
            .as_deref()
            .filter(|t| !t.is_empty())
    }

    pub fn set_token(&mut self, token: impl Into<String>) {
        self.state.session_token = Some(token.into());
    }

    /// The cached profile, if it was stored less than `ttl_ms` before `now_ms`.
    pub fn cached_user_if_fresh(&self, now_ms: i64, ttl_ms: i64) -> Option<&UserProfile> {
        let user = self.state.cached_user.as_ref()?;
        let cached_at = self.state.cache_time?;
        if now_ms - cached_at < ttl_ms {
            Some(user)
        } else {
            None
        }
    }

    /// Caches the profile and remembers whose session this is.
    pub fn cache_user(&mut self, user: &UserProfile, now_ms: i64) {
        self.state.cached_user = Some(user.clone());
        self.state.cache_time = Some(now_ms);
        self.state.session_user_id = Some(user.user_id.clone());
    }

    pub fn store_login(&mut self, token: impl Into<String>, user: &UserProfile, now_ms: i64) {
        self.set_token(token);
        self.cache_user(user, now_ms);
    }

    pub fn clear_user_cache(&mut self) {
        self.state.cached_user = None;
        self.state.cache_time = None;
    }

    /// Forgets the token and cached profile. Language and biometric
    /// binding survive a logout.
    pub fn clear_session(&mut self) {
        self.state.session_token = None;
        self.clear_user_cache();
    }

    pub fn session_user_id(&self) -> Option<&str> {
        self.state
            .session_user_id
            .as_deref()
            .filter(|id| !id.is_empty())
    }

    pub fn lang(&self) -> Option<&str> {
        self.state.lang.as_deref()
    }

    pub fn set_lang(&mut self, lang: impl Into<String>) {
        self.state.lang = Some(lang.into());
    }

    pub fn biometric_binding(&self) -> Option<(&str, &str)> {
        match (
            self.state.biometric_credential_id.as_deref(),
            self.state.biometric_user_id.as_deref(),
        ) {
            (Some(credential), Some(user)) => Some((credential, user)),
            _ => None,
        }
    }

    /// Records a platform credential for `user_id`, replacing any earlier one.
    pub fn bind_biometric(&mut self, credential_id: impl Into<String>, user_id: impl Into<String>) {
        self.state.biometric_credential_id = Some(credential_id.into());
        self.state.biometric_user_id = Some(user_id.into());
    }

    /// A binding only counts for the user it was made for.
    pub fn biometric_ready_for(&self, user_id: &str) -> bool {
        matches!(self.biometric_binding(), Some((_, bound)) if bound == user_id)
    }

    pub fn reset_biometric(&mut self) {
        self.state.biometric_credential_id = None;
        self.state.biometric_user_id = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_path(test_name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "checkin_session_{}_{}.json",
            test_name,
            std::process::id()
        ))
    }

    fn teardown(path: &Path) {
        let _ = fs::remove_file(path);
    }

    fn sample_user() -> UserProfile {
        UserProfile {
            user_id: "U123".into(),
            name: "王小明".into(),
            dept: "設計部".into(),
            picture: "https://example.test/p.png".into(),
            rate: String::new(),
        }
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let path = test_path("missing");
        teardown(&path);
        let store = SessionStore::load(&path).unwrap();
        assert_eq!(store.state(), &SessionState::default());
        assert!(store.token().is_none());
    }

    #[test]
    fn test_save_and_reload_round_trip() {
        let path = test_path("round_trip");
        teardown(&path);

        let mut store = SessionStore::load(&path).unwrap();
        store.store_login("tok-1", &sample_user(), 1_000);
        store.set_lang("ja");
        store.save().unwrap();

        let reloaded = SessionStore::load(&path).unwrap();
        assert_eq!(reloaded.token(), Some("tok-1"));
        assert_eq!(reloaded.session_user_id(), Some("U123"));
        assert_eq!(reloaded.lang(), Some("ja"));
        assert_eq!(reloaded.state().cache_time, Some(1_000));

        teardown(&path);
    }

    #[test]
    fn test_cached_user_freshness_window() {
        let path = test_path("freshness");
        let mut store = SessionStore::load(&path).unwrap();
        store.cache_user(&sample_user(), 10_000);

        assert!(store
            .cached_user_if_fresh(10_000 + LOGIN_CACHE_TTL_MS - 1, LOGIN_CACHE_TTL_MS)
            .is_some());
        assert!(store
            .cached_user_if_fresh(10_000 + LOGIN_CACHE_TTL_MS, LOGIN_CACHE_TTL_MS)
            .is_none());
    }

    #[test]
    fn test_clear_session_keeps_language_and_biometric() {
        let path = test_path("clear");
        let mut store = SessionStore::load(&path).unwrap();
        store.store_login("tok", &sample_user(), 5);
        store.set_lang("vi");
        store.bind_biometric("cred", "U123");

        store.clear_session();
        assert!(store.token().is_none());
        assert!(store.state().cached_user.is_none());
        assert_eq!(store.lang(), Some("vi"));
        assert_eq!(store.biometric_binding(), Some(("cred", "U123")));

        store.reset_biometric();
        assert!(store.biometric_binding().is_none());
    }

    #[test]
    fn test_biometric_binding_is_per_user_and_persisted() {
        let path = test_path("biometric");
        let mut store = SessionStore::load(&path).unwrap();
        assert!(!store.biometric_ready_for("U123"));

        store.bind_biometric("cred-1", "U123");
        store.save().unwrap();

        let reloaded = SessionStore::load(&path).unwrap();
        assert_eq!(reloaded.biometric_binding(), Some(("cred-1", "U123")));
        assert!(reloaded.biometric_ready_for("U123"));
        assert!(!reloaded.biometric_ready_for("U999"));
        let _ = fs::remove_file(&path);
    }

    #[test]
    fn test_corrupt_file_behaves_like_empty_store() {
        let path = test_path("corrupt");
        fs::write(&path, "{not json").unwrap();
        let store = SessionStore::load(&path).unwrap();
        assert!(store.token().is_none());
        teardown(&path);
    }
}
