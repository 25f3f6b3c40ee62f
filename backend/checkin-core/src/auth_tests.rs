// src/auth_tests.rs

#[cfg(test)]
mod tests {
    use crate::api_client::CheckinError;
    use crate::auth::{
        complete_login, ensure_login, logout, now_ms, require_admin, wait_for_login_code,
        LoginState,
    };
    use crate::config::AppConfig;
    use crate::notify::NotificationKind;
    use crate::session_check::SessionCheckOutcome;
    use crate::session_store::SessionStore;
    use crate::test_support::{
        logged_in_context, logged_out_context, sample_user, teardown, MockBackend,
    };
    use serde_json::json;
    use std::time::Duration;

    fn free_port() -> u16 {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[tokio::test]
    async fn test_no_token_is_logged_out() {
        let backend = MockBackend::start().await;
        let (ctx, _notifier, path) = logged_out_context(&backend, "auth_no_token").await;

        let outcome = ensure_login(&ctx).await;
        assert_eq!(outcome.state, LoginState::LoggedOut);
        assert!(outcome.session_check.is_none());
        assert!(backend.calls().is_empty());
        teardown(&path);
    }

    #[tokio::test]
    async fn test_fresh_cache_skips_init_and_checks_in_background() {
        let backend = MockBackend::start().await;
        backend.reply("checkSession", json!({ "ok": true }));
        let (ctx, _notifier, path) = logged_in_context(&backend, "auth_fresh_cache").await;

        let outcome = ensure_login(&ctx).await;
        match &outcome.state {
            LoginState::LoggedIn(info) => {
                assert!(info.from_cache);
                assert_eq!(info.user.user_id, "U100");
            }
            other => panic!("expected logged in, got {:?}", other),
        }
        let check = outcome.session_check.expect("background check spawned");
        assert_eq!(check.await.unwrap(), SessionCheckOutcome::Valid);
        assert!(backend.calls_to("initApp").is_empty());
        teardown(&path);
    }

    #[tokio::test]
    async fn test_stale_cache_calls_init_app() {
        let backend = MockBackend::start().await;
        backend.reply(
            "initApp",
            json!({
                "ok": true,
                "user": { "userId": "U100", "name": "王小明", "dept": "設計部" },
                "abnormalRecords": [{ "date": "2025-03-03", "reason": "STATUS_PUNCH_OUT_MISSING" }]
            }),
        );
        let (ctx, notifier, path) = logged_in_context(&backend, "auth_stale_cache").await;
        {
            let mut session = ctx.client.session().lock().await;
            session.cache_user(&sample_user(), now_ms() - 6 * 60 * 1000);
        }

        let outcome = ensure_login(&ctx).await;
        match &outcome.state {
            LoginState::LoggedIn(info) => {
                assert!(!info.from_cache);
                assert_eq!(info.abnormal_records.len(), 1);
            }
            other => panic!("expected logged in, got {:?}", other),
        }
        assert!(outcome.session_check.is_none());
        assert!(notifier.has(NotificationKind::Success, "LOGIN_SUCCESS"));

        let session = ctx.client.session().lock().await;
        assert!(session.cached_user_if_fresh(now_ms(), 60_000).is_some());
        drop(session);
        teardown(&path);
    }

    #[tokio::test]
    async fn test_init_app_failure_clears_cache_and_notifies_code() {
        let backend = MockBackend::start().await;
        backend.reply("initApp", json!({ "ok": false, "code": "ERR_SESSION_INVALID" }));
        let (ctx, notifier, path) = logged_in_context(&backend, "auth_init_failure").await;
        {
            let mut session = ctx.client.session().lock().await;
            session.cache_user(&sample_user(), 0);
        }

        let outcome = ensure_login(&ctx).await;
        assert_eq!(outcome.state, LoginState::LoggedOut);
        assert!(notifier.has(NotificationKind::Error, "ERR_SESSION_INVALID"));
        assert!(ctx.client.session().lock().await.state().cached_user.is_none());
        teardown(&path);
    }

    #[tokio::test]
    async fn test_complete_login_stores_token() {
        let backend = MockBackend::start().await;
        backend.reply(
            "getProfile",
            json!({
                "ok": true,
                "sToken": "session-xyz",
                "user": { "userId": "U7", "name": "Amy", "dept": "管理員" }
            }),
        );
        let (ctx, _notifier, path) = logged_out_context(&backend, "auth_complete_login").await;

        let info = complete_login(&ctx, "one-time").await.unwrap();
        assert_eq!(info.user.user_id, "U7");
        assert_eq!(
            backend.calls_to("getProfile")[0].params.get("otoken").map(String::as_str),
            Some("one-time")
        );

        let reloaded = SessionStore::load(path.clone()).unwrap();
        assert_eq!(reloaded.token(), Some("session-xyz"));
        assert_eq!(reloaded.session_user_id(), Some("U7"));
        teardown(&path);
    }

    #[tokio::test]
    async fn test_complete_login_without_token_fails() {
        let backend = MockBackend::start().await;
        backend.reply("getProfile", json!({ "ok": true, "msg": "no token" }));
        let (ctx, notifier, path) = logged_out_context(&backend, "auth_login_no_token").await;

        let result = complete_login(&ctx, "bad").await;
        assert!(matches!(result, Err(CheckinError::Backend { ref code, .. }) if code == "ERROR_LOGIN_FAILED"));
        assert!(notifier
            .sent()
            .iter()
            .any(|n| n.kind == NotificationKind::Error));
        assert!(!ctx.has_token().await);
        teardown(&path);
    }

    #[tokio::test]
    async fn test_logout_forgets_token() {
        let backend = MockBackend::start().await;
        let (ctx, _notifier, path) = logged_in_context(&backend, "auth_logout").await;

        logout(&ctx).await.unwrap();
        assert!(!ctx.has_token().await);
        assert!(SessionStore::load(path.clone()).unwrap().token().is_none());
        teardown(&path);
    }

    #[tokio::test]
    async fn test_admin_gate() {
        let backend = MockBackend::start().await;
        backend.reply(
            "initApp",
            json!({ "ok": true, "user": { "userId": "U1", "dept": "設計部" } }),
        );
        let (ctx, notifier, path) = logged_in_context(&backend, "auth_admin_gate").await;

        assert!(matches!(
            require_admin(&ctx).await,
            Err(CheckinError::PermissionDenied)
        ));
        assert!(notifier.has(NotificationKind::Error, "ERR_NO_PERMISSION"));

        backend.reply(
            "initApp",
            json!({ "ok": true, "user": { "userId": "U1", "dept": "管理員" } }),
        );
        assert_eq!(require_admin(&ctx).await.unwrap().user_id, "U1");
        teardown(&path);
    }

    #[tokio::test]
    async fn test_callback_server_returns_code() {
        let port = free_port();
        let config = AppConfig {
            api_url: "http://127.0.0.1:9/api".into(),
            callback_port: port,
            ..AppConfig::default()
        };

        let waiter = tokio::spawn(async move { wait_for_login_code(&config).await });

        let http = reqwest::Client::new();
        let url = format!("http://127.0.0.1:{}/?code=abc123", port);
        let mut delivered = false;
        for _ in 0..50 {
            if http.get(&url).send().await.is_ok() {
                delivered = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        assert!(delivered, "callback server never came up");

        let code = waiter.await.unwrap().unwrap();
        assert_eq!(code, "abc123");
    }
}
