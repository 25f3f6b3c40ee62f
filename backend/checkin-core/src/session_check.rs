// src/session_check.rs

use crate::context::AppContext;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCheckOutcome {
    Valid,
    /// The backend rejected the token; the local session was cleared.
    Expired,
    /// The check itself failed. Nothing was changed.
    Failed,
}

/// Asks the backend whether the stored token is still accepted.
pub async fn run_session_check(ctx: AppContext) -> SessionCheckOutcome {
    info!("Checking session in background...");
    match ctx.client.call("checkSession", &[]).await {
        Ok(response) if response.ok() => {
            info!("Session is still valid");
            SessionCheckOutcome::Valid
        }
        Ok(response) => {
            warn!(
                "Session rejected by backend (code={:?})",
                response.code()
            );
            {
                let mut session = ctx.client.session().lock().await;
                session.clear_session();
                if let Err(e) = session.save() {
                    error!("Failed to persist cleared session: {}", e);
                }
            }
            ctx.notifier
                .warning(&ctx.t_or("SESSION_EXPIRED", "登入已過期，請重新登入"));
            SessionCheckOutcome::Expired
        }
        Err(e) => {
            error!("Background session check failed: {}", e);
            SessionCheckOutcome::Failed
        }
    }
}

pub fn spawn_session_check(ctx: AppContext) -> JoinHandle<SessionCheckOutcome> {
    tokio::spawn(run_session_check(ctx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::NotificationKind;
    use crate::test_support::{logged_in_context, teardown, MockBackend};
    use serde_json::json;

    #[tokio::test]
    async fn test_rejected_session_is_cleared() {
        let backend = MockBackend::start().await;
        backend.reply("checkSession", json!({ "success": false, "code": "ERR_SESSION_INVALID" }));
        let (ctx, notifier, path) = logged_in_context(&backend, "session_check_rejected").await;

        let outcome = spawn_session_check(ctx.clone()).await.unwrap();
        assert_eq!(outcome, SessionCheckOutcome::Expired);
        assert!(!ctx.has_token().await);
        assert!(notifier.has(NotificationKind::Warning, "登入已過期，請重新登入"));

        let calls = backend.calls_to("checkSession");
        assert_eq!(calls[0].params.get("token").map(String::as_str), Some("tok-1"));
        teardown(&path);
    }

    #[tokio::test]
    async fn test_valid_session_is_kept() {
        let backend = MockBackend::start().await;
        backend.reply("checkSession", json!({ "ok": true }));
        let (ctx, notifier, path) = logged_in_context(&backend, "session_check_valid").await;

        assert_eq!(run_session_check(ctx.clone()).await, SessionCheckOutcome::Valid);
        assert!(ctx.has_token().await);
        assert!(notifier.sent().is_empty());
        teardown(&path);
    }
}
