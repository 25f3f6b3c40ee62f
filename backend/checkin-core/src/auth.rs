// src/auth.rs

use crate::api_client::{io_context, CheckinError};
use crate::config::AppConfig;
use crate::context::AppContext;
use crate::models::{AttendanceRecord, UserProfile};
use crate::session_check::{spawn_session_check, SessionCheckOutcome};
use crate::session_store::LOGIN_CACHE_TTL_MS;
use axum::{
    extract::{Query, State},
    response::Html,
    routing::get,
    Router,
};
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use serde::Deserialize;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoginInfo {
    pub user: UserProfile,
    pub abnormal_records: Vec<AttendanceRecord>,
    /// Served from the local profile cache without asking the backend.
    pub from_cache: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoginState {
    LoggedIn(LoginInfo),
    LoggedOut,
}

impl LoginState {
    pub fn user(&self) -> Option<&UserProfile> {
        match self {
            LoginState::LoggedIn(info) => Some(&info.user),
            LoginState::LoggedOut => None,
        }
    }
}

pub struct EnsureLogin {
    pub state: LoginState,
    /// Set when a cached profile was used; resolves once the backend has
    /// confirmed or rejected the token.
    pub session_check: Option<JoinHandle<SessionCheckOutcome>>,
}

/// Resolves the current user, preferring a fresh cached profile.
pub async fn ensure_login(ctx: &AppContext) -> EnsureLogin {
    {
        let session = ctx.client.session().lock().await;
        if session.token().is_none() {
            info!("No session token stored");
            return EnsureLogin {
                state: LoginState::LoggedOut,
                session_check: None,
            };
        }
        if let Some(user) = session.cached_user_if_fresh(now_ms(), LOGIN_CACHE_TTL_MS) {
            info!("Using cached profile for {}", user.user_id);
            let state = LoginState::LoggedIn(LoginInfo {
                user: user.clone(),
                abnormal_records: Vec::new(),
                from_cache: true,
            });
            drop(session);
            return EnsureLogin {
                state,
                session_check: Some(spawn_session_check(ctx.clone())),
            };
        }
    }

    info!("Profile cache missing or stale, calling initApp...");
    let state = match ctx.client.call("initApp", &[]).await {
        Ok(response) if response.ok() => {
            let user: UserProfile = response.field("user").unwrap_or_default();
            let abnormal_records: Vec<AttendanceRecord> = response.list("abnormalRecords");
            {
                let mut session = ctx.client.session().lock().await;
                session.cache_user(&user, now_ms());
                if let Err(e) = session.save() {
                    error!("Failed to persist profile cache: {}", e);
                }
            }
            ctx.notifier.success(&ctx.t("LOGIN_SUCCESS"));
            LoginState::LoggedIn(LoginInfo {
                user,
                abnormal_records,
                from_cache: false,
            })
        }
        Ok(response) => {
            warn!("initApp rejected (code={:?})", response.code());
            clear_profile_cache(ctx).await;
            ctx.notifier.error(&ctx.t(response.code_or_unknown()));
            LoginState::LoggedOut
        }
        Err(e) => {
            error!("initApp failed: {}", e);
            clear_profile_cache(ctx).await;
            LoginState::LoggedOut
        }
    };

    EnsureLogin {
        state,
        session_check: None,
    }
}

async fn clear_profile_cache(ctx: &AppContext) {
    let mut session = ctx.client.session().lock().await;
    session.clear_user_cache();
    if let Err(e) = session.save() {
        error!("Failed to persist cleared profile cache: {}", e);
    }
}

/// The identity provider's login page.
pub async fn login_url(ctx: &AppContext) -> Result<String, CheckinError> {
    let response = ctx.client.call("getLoginUrl", &[]).await?;
    match response.field::<String>("url").filter(|u| !u.is_empty()) {
        Some(url) => Ok(url),
        None => Err(CheckinError::Backend {
            action: "getLoginUrl".into(),
            code: response.code().unwrap_or("ERROR_LOGIN_FAILED").to_string(),
            msg: response.msg().unwrap_or_default().to_string(),
        }),
    }
}

/// Exchanges the one-time code from the login redirect for a session token.
pub async fn complete_login(ctx: &AppContext, otoken: &str) -> Result<LoginInfo, CheckinError> {
    info!("Exchanging login code for a session token...");
    let response = ctx
        .client
        .call("getProfile", &[("otoken", otoken.to_string())])
        .await?;

    let token = response.field::<String>("sToken").filter(|t| !t.is_empty());
    let token = match token {
        Some(token) if response.ok() => token,
        _ => {
            let msg = response
                .msg()
                .map(str::to_string)
                .unwrap_or_else(|| ctx.t("UNKNOWN_ERROR"));
            ctx.notifier
                .error(&ctx.i18n.t_params("ERROR_LOGIN_FAILED", &[("msg", msg.clone())]));
            return Err(CheckinError::Backend {
                action: "getProfile".into(),
                code: "ERROR_LOGIN_FAILED".into(),
                msg,
            });
        }
    };

    let user: UserProfile = response.field("user").unwrap_or_default();
    let abnormal_records: Vec<AttendanceRecord> = response.list("abnormalRecords");
    {
        let mut session = ctx.client.session().lock().await;
        session.store_login(token, &user, now_ms());
        session.save()?;
    }
    info!("Logged in as {} ({})", user.name, user.user_id);
    ctx.notifier.success(&ctx.t("LOGIN_SUCCESS"));

    Ok(LoginInfo {
        user,
        abnormal_records,
        from_cache: false,
    })
}

/// Drops the session token and the cached profile.
pub async fn logout(ctx: &AppContext) -> Result<(), CheckinError> {
    let mut session = ctx.client.session().lock().await;
    session.clear_session();
    session.save()?;
    info!("Logged out");
    Ok(())
}

/// Admin screens ask the backend for the profile and check the department.
pub async fn require_admin(ctx: &AppContext) -> Result<UserProfile, CheckinError> {
    let response = ctx.client.call("initApp", &[]).await?.into_result("initApp")?;
    let user: UserProfile = response.field("user").unwrap_or_default();
    if user.is_admin() {
        Ok(user)
    } else {
        warn!("User {} is not an admin (dept='{}')", user.user_id, user.dept);
        ctx.notifier.error(&ctx.t("ERR_NO_PERMISSION"));
        Err(CheckinError::PermissionDenied)
    }
}

#[derive(Deserialize, Debug)]
struct LoginCallbackParams {
    code: Option<String>,
    error: Option<String>,
}

type CodeSender = Arc<Mutex<Option<oneshot::Sender<Result<String, String>>>>>;

async fn handle_login_callback(
    State(sender): State<CodeSender>,
    Query(params): Query<LoginCallbackParams>,
) -> Html<String> {
    info!("Received login callback: {:?}", params);
    let (result, page) = match (params.code, params.error) {
        (Some(code), _) if !code.is_empty() => (
            Ok(code),
            "<h1>Login received</h1><p>You can close this window and return to the terminal.</p>"
                .to_string(),
        ),
        (_, Some(error)) => (
            Err(error.clone()),
            format!("<h1>Login failed</h1><p>{}</p>", error),
        ),
        _ => {
            return Html("<h1>Waiting for login</h1><p>No code in this request.</p>".to_string());
        }
    };

    if let Some(tx) = sender.lock().await.take() {
        let _ = tx.send(result);
    }
    Html(page)
}

/// Serves the login redirect target on `callback_port` until a `?code=`
/// arrives, then shuts the listener down.
pub async fn wait_for_login_code(config: &AppConfig) -> Result<String, CheckinError> {
    let (tx, rx) = oneshot::channel();
    let sender: CodeSender = Arc::new(Mutex::new(Some(tx)));

    let app = Router::new()
        .route("/", get(handle_login_callback))
        .route("/callback", get(handle_login_callback))
        .layer(TraceLayer::new_for_http())
        .with_state(sender);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.callback_port));
    let handle = Handle::new();

    let server = match config.tls_paths() {
        Some((cert_path, key_path)) => {
            let tls_config = RustlsConfig::from_pem_file(&cert_path, &key_path)
                .await
                .map_err(|e| io_context(e, "Failed to load TLS cert/key for login callback"))?;
            info!("Waiting for login callback on https://{}", addr);
            tokio::spawn(
                axum_server::bind_rustls(addr, tls_config)
                    .handle(handle.clone())
                    .serve(app.into_make_service()),
            )
        }
        None => {
            info!("Waiting for login callback on http://{}", addr);
            tokio::spawn(
                axum_server::bind(addr)
                    .handle(handle.clone())
                    .serve(app.into_make_service()),
            )
        }
    };

    let received = rx.await;
    handle.graceful_shutdown(Some(Duration::from_secs(1)));
    match server.await {
        Ok(Err(e)) => warn!("Login callback server ended with error: {}", e),
        Err(e) => warn!("Login callback server task failed: {}", e),
        Ok(Ok(())) => {}
    }

    match received {
        Ok(Ok(code)) => Ok(code),
        Ok(Err(error)) => Err(CheckinError::Backend {
            action: "getProfile".into(),
            code: "ERROR_LOGIN_FAILED".into(),
            msg: error,
        }),
        Err(_) => Err(CheckinError::Config(
            "login callback server stopped before a code arrived".into(),
        )),
    }
}
