#![allow(clippy::unwrap_used, clippy::expect_used)]

//! End-to-end flows against mock API and SSO servers.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use httpmock::prelude::*;
use serde_json::{Value, json};
use sso_session::{
    FailureHook, FileTokenStorage, SessionError, SsoConfig, SsoSession, TokenPair, TokenStorage,
};

fn jwt(user: &str, n: u32) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let body = URL_SAFE_NO_PAD.encode(
        json!({ "userName": user, "roles": ["md:user"], "n": n }).to_string(),
    );
    format!("{header}.{body}.c2ln")
}

fn config(api: &MockServer, sso: &MockServer, storage: &std::path::Path) -> SsoConfig {
    let mut config = SsoConfig {
        api_url: api.base_url(),
        sso_url: sso.base_url(),
        storage_path: Some(storage.to_path_buf()),
        ..SsoConfig::default()
    };
    config.http.allow_insecure_http = true;
    config
}

fn counting_hook() -> (FailureHook, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    let inner = Arc::clone(&count);
    let hook: FailureHook = Arc::new(move || {
        inner.fetch_add(1, Ordering::SeqCst);
    });
    (hook, count)
}

#[tokio::test]
async fn expired_token_is_refreshed_and_request_replayed() {
    let api = MockServer::start();
    let sso = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tokens.json");

    let old = jwt("alice", 0);
    let new = jwt("alice", 1);
    FileTokenStorage::new(&path)
        .save(&TokenPair::new(old.clone(), "r0"))
        .unwrap();

    let rejected = api.mock(|when, then| {
        when.method(GET)
            .path("/items")
            .header("authorization", format!("Bearer {old}"));
        then.status(401).body("jwt expired");
    });
    let accepted = api.mock(|when, then| {
        when.method(GET)
            .path("/items")
            .header("authorization", format!("Bearer {new}"));
        then.status(200).json_body(json!([{ "id": 1 }]));
    });
    let refresh = sso.mock(|when, then| {
        when.method(PUT)
            .path("/jwt")
            .json_body(json!({ "refreshToken": "r0" }));
        then.status(200)
            .json_body(json!({ "token": new, "refreshToken": "r1" }));
    });

    let (hook, failures) = counting_hook();
    let session = SsoSession::from_config(&config(&api, &sso, &path), Some(hook)).unwrap();
    assert_eq!(session.credentials().user_name().as_deref(), Some("alice"));

    let items: Value = session.executor().get_json("/items").await.unwrap();

    assert_eq!(items, json!([{ "id": 1 }]));
    rejected.assert_calls(1);
    refresh.assert_calls(1);
    accepted.assert_calls(1);
    assert_eq!(failures.load(Ordering::SeqCst), 0);

    // the renewed pair survives a restart
    let persisted = FileTokenStorage::new(&path).load().unwrap().unwrap();
    assert_eq!(persisted, TokenPair::new(new, "r1"));
}

#[tokio::test]
async fn concurrent_requests_refresh_once() {
    let api = MockServer::start();
    let sso = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tokens.json");

    let old = jwt("alice", 0);
    let new = jwt("alice", 1);
    FileTokenStorage::new(&path)
        .save(&TokenPair::new(old.clone(), "r0"))
        .unwrap();

    api.mock(|when, then| {
        when.method(GET)
            .path("/items")
            .header("authorization", format!("Bearer {old}"));
        then.status(401);
    });
    let accepted = api.mock(|when, then| {
        when.method(GET)
            .path("/items")
            .header("authorization", format!("Bearer {new}"));
        then.status(200).json_body(json!({ "ok": true }));
    });
    let refresh = sso.mock(|when, then| {
        when.method(PUT).path("/jwt");
        then.status(200)
            .delay(std::time::Duration::from_millis(100))
            .json_body(json!({ "token": new, "refreshToken": "r1" }));
    });

    let session = SsoSession::from_config(&config(&api, &sso, &path), None).unwrap();
    let calls = (0..5).map(|_| session.executor().get_json::<Value>("/items"));
    let results = futures::future::join_all(calls).await;

    for result in results {
        assert_eq!(result.unwrap(), json!({ "ok": true }));
    }
    refresh.assert_calls(1);
    accepted.assert_calls(5);
}

#[tokio::test]
async fn rejected_refresh_logs_out_and_notifies() {
    let api = MockServer::start();
    let sso = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tokens.json");

    FileTokenStorage::new(&path)
        .save(&TokenPair::new(jwt("alice", 0), "revoked"))
        .unwrap();

    api.mock(|when, then| {
        when.method(GET).path("/items");
        then.status(403);
    });
    let refresh = sso.mock(|when, then| {
        when.method(PUT).path("/jwt");
        then.status(401).body("refresh token revoked");
    });

    let (hook, failures) = counting_hook();
    let session = SsoSession::from_config(&config(&api, &sso, &path), Some(hook)).unwrap();

    let err = session
        .executor()
        .get_json::<Value>("/items")
        .await
        .unwrap_err();

    assert!(matches!(err, SessionError::RefreshRejected { .. }));
    assert!(err.requires_login());
    refresh.assert_calls(1);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
    assert!(!session.credentials().is_present());
    assert!(!path.exists());

    // logged out now: nothing is sent
    let err = session
        .executor()
        .get_json::<Value>("/items")
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NoCredentials));
    refresh.assert_calls(1);
    assert_eq!(failures.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn upstream_errors_keep_status_and_body() {
    let api = MockServer::start();
    let sso = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tokens.json");

    FileTokenStorage::new(&path)
        .save(&TokenPair::new(jwt("alice", 0), "r0"))
        .unwrap();

    api.mock(|when, then| {
        when.method(POST).path("/orders");
        then.status(422).body("quantity must be positive");
    });
    let refresh = sso.mock(|when, then| {
        when.method(PUT).path("/jwt");
        then.status(200);
    });

    let session = SsoSession::from_config(&config(&api, &sso, &path), None).unwrap();
    let err = session
        .executor()
        .post_json::<_, Value>("/orders", &json!({ "quantity": -1 }))
        .await
        .unwrap_err();

    assert_eq!(err.status(), Some(http::StatusCode::UNPROCESSABLE_ENTITY));
    assert!(err.to_string().contains("quantity must be positive"));
    refresh.assert_calls(0);
}

#[tokio::test]
async fn login_then_logout_round_trip() {
    let api = MockServer::start();
    let sso = MockServer::start();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tokens.json");

    let token = jwt("carol", 0);
    let login = sso.mock(|when, then| {
        when.method(POST)
            .path("/jwt")
            .json_body(json!({ "email": "carol@example.com", "password": "pw" }));
        then.status(200)
            .json_body(json!({ "token": token, "refreshToken": "r0" }));
    });
    let revoke = sso.mock(|when, then| {
        when.method(DELETE)
            .path("/jwt")
            .header("authorization", format!("Bearer {token}"));
        then.status(204);
    });

    let session = SsoSession::from_config(&config(&api, &sso, &path), None).unwrap();
    session
        .login("carol@example.com", &"pw".into())
        .await
        .unwrap();
    login.assert();
    assert!(path.exists());
    assert!(
        session
            .credentials()
            .has_role(sso_session::Role::User, "md")
    );

    session.logout().await;
    revoke.assert();
    assert!(!session.credentials().is_present());
    assert!(!path.exists());
}
