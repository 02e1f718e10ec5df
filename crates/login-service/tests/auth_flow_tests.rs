//! End-to-end login flow tests.
//!
//! Drives `/login`, `/callback`, `/logout` and the guarded routes of a real
//! server against a wiremock identity provider.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use anyhow::Result;
use login_test_utils::{
    clears_session_cookie, location, session_cookie, MockProvider, TestLoginServer,
    TEST_CALLBACK_URL, TEST_CLIENT_ID,
};
use std::collections::HashSet;
use std::sync::Arc;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, ResponseTemplate};

async fn error_code(response: reqwest::Response) -> String {
    let body: serde_json::Value = response.json().await.unwrap();
    body["error"]["code"].as_str().unwrap().to_string()
}

// ============================================================================
// Full flow
// ============================================================================

#[tokio::test]
async fn test_full_login_flow() -> Result<()> {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    let server = TestLoginServer::spawn(&provider).await?;

    // BeginLogin
    let redirect = server.begin_login(Some("/dashboard")).await?;
    assert_eq!(redirect.location.path(), "/authorize");
    assert_eq!(redirect.param("client_id").as_deref(), Some(TEST_CLIENT_ID));
    assert_eq!(redirect.param("response_type").as_deref(), Some("code"));
    assert_eq!(redirect.param("scope").as_deref(), Some("openid profile"));
    assert_eq!(redirect.param("redirect_uri").as_deref(), Some(TEST_CALLBACK_URL));
    assert!(redirect.param("audience").is_none());
    assert_eq!(server.state().pending.len().await, 1);

    // Provider issues code XYZ
    let claims = provider
        .claims()
        .for_user("auth0|ada")
        .with_name("Ada Lovelace")
        .with_nonce(&redirect.nonce)
        .build();
    provider
        .mount_token_response("XYZ", &provider.keypair().sign(&claims))
        .await;

    // HandleCallback
    let response = server
        .callback(&[("code", "XYZ"), ("state", &redirect.state)])
        .await?;
    assert_eq!(response.status(), 302);
    assert_eq!(location(&response), Some("/dashboard"));
    let cookie = session_cookie(&response).expect("session cookie should be set");
    assert_eq!(server.state().pending.len().await, 0);
    assert_eq!(server.state().sessions.len().await, 1);

    // Guarded request with the session succeeds
    let response = server.get("/dashboard", Some(&cookie)).await?;
    assert_eq!(response.status(), 200);
    let profile: serde_json::Value = response.json().await?;
    assert_eq!(profile["sub"], "auth0|ada");
    assert_eq!(profile["name"], "Ada Lovelace");
    assert_eq!(profile["picture"], "https://cdn.example/test-user.png");

    let response = server.get("/api/me", Some(&cookie)).await?;
    assert_eq!(response.status(), 200);
    let me: serde_json::Value = response.json().await?;
    assert_eq!(me["sub"], "auth0|ada");
    assert_eq!(me["iss"], provider.issuer());

    // Without the session: browser is redirected, API gets 401
    let response = server.get("/dashboard", None).await?;
    assert_eq!(response.status(), 302);
    assert_eq!(location(&response), Some("/login?return_to=%2Fdashboard"));

    let response = server.get("/api/me", None).await?;
    assert_eq!(response.status(), 401);
    assert!(response.headers().contains_key("www-authenticate"));

    Ok(())
}

#[tokio::test]
async fn test_return_to_outside_the_app_is_ignored() -> Result<()> {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    let server = TestLoginServer::spawn(&provider).await?;

    let redirect = server.begin_login(Some("https://evil.example/")).await?;
    let claims = provider.claims().with_nonce(&redirect.nonce).build();
    provider
        .mount_token_response("CODE", &provider.keypair().sign(&claims))
        .await;

    let response = server
        .callback(&[("code", "CODE"), ("state", &redirect.state)])
        .await?;

    assert_eq!(response.status(), 302);
    assert_eq!(location(&response), Some("/"));
    Ok(())
}

// ============================================================================
// Callback failures
// ============================================================================

#[tokio::test]
async fn test_unknown_state_is_rejected_before_exchange() -> Result<()> {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    // Any call to the token endpoint fails the test
    provider.mount_token_status(200, 0).await;
    let server = TestLoginServer::spawn(&provider).await?;
    server.begin_login(None).await?;

    let response = server
        .callback(&[("code", "VALID-LOOKING-CODE"), ("state", "forged-state")])
        .await?;

    assert_eq!(response.status(), 400);
    assert!(session_cookie(&response).is_none());
    assert_eq!(error_code(response).await, "INVALID_STATE");
    assert_eq!(server.state().sessions.len().await, 0);
    // The genuine pending login is untouched
    assert_eq!(server.state().pending.len().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_callback_replay_is_rejected() -> Result<()> {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    let server = TestLoginServer::spawn(&provider).await?;

    let redirect = server.begin_login(None).await?;
    let claims = provider.claims().with_nonce(&redirect.nonce).build();
    provider
        .mount_token_response("ONCE", &provider.keypair().sign(&claims))
        .await;

    let first = server
        .callback(&[("code", "ONCE"), ("state", &redirect.state)])
        .await?;
    assert_eq!(first.status(), 302);

    let replay = server
        .callback(&[("code", "ONCE"), ("state", &redirect.state)])
        .await?;
    assert_eq!(replay.status(), 400);
    assert_eq!(error_code(replay).await, "INVALID_STATE");
    assert_eq!(server.state().sessions.len().await, 1);
    Ok(())
}

#[tokio::test]
async fn test_provider_denial() -> Result<()> {
    let provider = MockProvider::start().await;
    let server = TestLoginServer::spawn(&provider).await?;
    let redirect = server.begin_login(None).await?;

    let response = server
        .callback(&[
            ("error", "access_denied"),
            ("error_description", "User did not authorize the request"),
            ("state", &redirect.state),
        ])
        .await?;

    assert_eq!(response.status(), 400);
    assert!(session_cookie(&response).is_none());
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "ACCESS_DENIED");
    // Provider text is not echoed back
    assert!(!body.to_string().contains("User did not authorize"));
    Ok(())
}

#[tokio::test]
async fn test_nonce_mismatch_creates_no_session() -> Result<()> {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    let server = TestLoginServer::spawn(&provider).await?;

    let redirect = server.begin_login(None).await?;
    let claims = provider.claims().with_nonce("some-other-nonce").build();
    provider
        .mount_token_response("XYZ", &provider.keypair().sign(&claims))
        .await;

    let response = server
        .callback(&[("code", "XYZ"), ("state", &redirect.state)])
        .await?;

    assert_eq!(response.status(), 400);
    assert!(session_cookie(&response).is_none());
    assert_eq!(error_code(response).await, "INVALID_ID_TOKEN");
    assert_eq!(server.state().sessions.len().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_nonce_check_can_be_disabled() -> Result<()> {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    let server = TestLoginServer::spawn_with(&provider, &[("OIDC_ENFORCE_NONCE", "false")]).await?;

    let redirect = server.begin_login(None).await?;
    let claims = provider.claims().build();
    provider
        .mount_token_response("XYZ", &provider.keypair().sign(&claims))
        .await;

    let response = server
        .callback(&[("code", "XYZ"), ("state", &redirect.state)])
        .await?;

    assert_eq!(response.status(), 302);
    Ok(())
}

#[tokio::test]
async fn test_token_endpoint_rejection_is_bad_gateway() -> Result<()> {
    let provider = MockProvider::start().await;
    provider.mount_token_status(400, 1).await;
    let server = TestLoginServer::spawn(&provider).await?;
    let redirect = server.begin_login(None).await?;

    let response = server
        .callback(&[("code", "EXPIRED"), ("state", &redirect.state)])
        .await?;

    assert_eq!(response.status(), 502);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["error"]["code"], "TOKEN_EXCHANGE_FAILED");
    assert!(!body.to_string().contains("provider-internal detail"));
    Ok(())
}

// ============================================================================
// Concurrency
// ============================================================================

#[tokio::test]
async fn test_concurrent_callbacks_do_not_cross_contaminate() -> Result<()> {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    let server = Arc::new(TestLoginServer::spawn(&provider).await?);

    let mut attempts = Vec::new();
    for i in 0..8 {
        let redirect = server.begin_login(None).await?;
        let code = format!("CODE{i}");
        let subject = format!("auth0|user-{i}");
        let claims = provider
            .claims()
            .for_user(&subject)
            .with_nonce(&redirect.nonce)
            .build();
        provider
            .mount_token_response(&code, &provider.keypair().sign(&claims))
            .await;
        attempts.push((code, redirect.state, subject));
    }

    let states: HashSet<_> = attempts.iter().map(|(_, state, _)| state.clone()).collect();
    assert_eq!(states.len(), attempts.len());

    let handles: Vec<_> = attempts
        .into_iter()
        .map(|(code, state, subject)| {
            let server = Arc::clone(&server);
            tokio::spawn(async move {
                let response = server
                    .callback(&[("code", code.as_str()), ("state", state.as_str())])
                    .await
                    .unwrap();
                assert_eq!(response.status(), 302);
                (session_cookie(&response).unwrap(), subject)
            })
        })
        .collect();

    for handle in handles {
        let (cookie, subject) = handle.await?;
        let me: serde_json::Value = server.get("/api/me", Some(&cookie)).await?.json().await?;
        assert_eq!(me["sub"], subject.as_str());
    }
    assert_eq!(server.state().sessions.len().await, 8);
    Ok(())
}

// ============================================================================
// Logout
// ============================================================================

#[tokio::test]
async fn test_logout_clears_session_without_return_url() -> Result<()> {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    let server = TestLoginServer::spawn(&provider).await?;
    let cookie = server.login_as(&provider, "XYZ", |c| c).await?;

    let response = server.get("/logout", Some(&cookie)).await?;

    assert_eq!(response.status(), 302);
    assert_eq!(
        location(&response),
        Some(format!("{}v2/logout?client_id={}", provider.issuer(), TEST_CLIENT_ID).as_str())
    );
    assert!(clears_session_cookie(&response));
    assert_eq!(server.state().sessions.len().await, 0);

    // The old cookie no longer grants access
    let response = server.get("/api/me", Some(&cookie)).await?;
    assert_eq!(response.status(), 401);
    Ok(())
}

#[tokio::test]
async fn test_relogin_replaces_previous_session() -> Result<()> {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    let server = TestLoginServer::spawn(&provider).await?;
    let first = server.login_as(&provider, "FIRST", |c| c).await?;

    let redirect = server.begin_login(None).await?;
    let claims = provider.claims().with_nonce(&redirect.nonce).build();
    provider
        .mount_token_response("SECOND", &provider.keypair().sign(&claims))
        .await;
    let response = server
        .callback_with_session(&[("code", "SECOND"), ("state", &redirect.state)], &first)
        .await?;

    assert_eq!(response.status(), 302);
    let second = session_cookie(&response).expect("new session cookie");
    assert_ne!(second, first);
    assert_eq!(server.state().sessions.len().await, 1);
    assert_eq!(server.get("/api/me", Some(&first)).await?.status(), 401);
    assert_eq!(server.get("/api/me", Some(&second)).await?.status(), 200);
    Ok(())
}

#[tokio::test]
async fn test_failed_relogin_leaves_no_session() -> Result<()> {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    let server = TestLoginServer::spawn(&provider).await?;
    let first = server.login_as(&provider, "FIRST", |c| c).await?;

    let response = server
        .callback_with_session(&[("code", "SECOND"), ("state", "forged")], &first)
        .await?;

    assert_eq!(response.status(), 400);
    assert_eq!(server.state().sessions.len().await, 0);
    assert_eq!(server.get("/api/me", Some(&first)).await?.status(), 401);
    Ok(())
}

#[tokio::test]
async fn test_logout_with_return_url() -> Result<()> {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    let server =
        TestLoginServer::spawn_with(&provider, &[("OIDC_POST_LOGOUT_URL", "http://127.0.0.1/")])
            .await?;
    let cookie = server.login_as(&provider, "XYZ", |c| c).await?;

    let response = server.get("/logout", Some(&cookie)).await?;

    let target = url::Url::parse(location(&response).unwrap())?;
    let params: Vec<(String, String)> = target.query_pairs().into_owned().collect();
    assert_eq!(
        params,
        vec![
            ("returnTo".to_string(), "http://127.0.0.1/".to_string()),
            ("client_id".to_string(), TEST_CLIENT_ID.to_string()),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_logout_without_session_still_redirects() -> Result<()> {
    let provider = MockProvider::start().await;
    let server = TestLoginServer::spawn(&provider).await?;

    let response = server.get("/logout", None).await?;

    assert_eq!(response.status(), 302);
    assert!(location(&response).unwrap().contains("/v2/logout"));
    Ok(())
}

// ============================================================================
// Optional provider features
// ============================================================================

#[tokio::test]
async fn test_userinfo_profile_attached_to_session() -> Result<()> {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    provider
        .mount_userinfo(
            "XYZ",
            serde_json::json!({
                "sub": "auth0|ada",
                "name": "Ada (UserInfo)",
                "nickname": "ada"
            }),
        )
        .await;
    let server = TestLoginServer::spawn_with(&provider, &[("OIDC_FETCH_USERINFO", "true")]).await?;

    let cookie = server
        .login_as(&provider, "XYZ", |c| c.for_user("auth0|ada"))
        .await?;

    let profile: serde_json::Value = server.get("/dashboard", Some(&cookie)).await?.json().await?;
    assert_eq!(profile["name"], "Ada (UserInfo)");
    assert_eq!(profile["nickname"], "ada");
    Ok(())
}

#[tokio::test]
async fn test_userinfo_subject_mismatch_fails_login() -> Result<()> {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    provider
        .mount_userinfo("XYZ", serde_json::json!({"sub": "auth0|mallory"}))
        .await;
    let server = TestLoginServer::spawn_with(&provider, &[("OIDC_FETCH_USERINFO", "true")]).await?;

    let redirect = server.begin_login(None).await?;
    let claims = provider
        .claims()
        .for_user("auth0|ada")
        .with_nonce(&redirect.nonce)
        .build();
    provider
        .mount_token_response("XYZ", &provider.keypair().sign(&claims))
        .await;

    let response = server
        .callback(&[("code", "XYZ"), ("state", &redirect.state)])
        .await?;

    assert_eq!(response.status(), 400);
    assert_eq!(server.state().sessions.len().await, 0);
    Ok(())
}

#[tokio::test]
async fn test_discovery_endpoints_are_used() -> Result<()> {
    let provider = MockProvider::start().await;
    provider.mount_discovery().await;
    let server = TestLoginServer::spawn_with(&provider, &[("OIDC_USE_DISCOVERY", "true")]).await?;

    let redirect = server.begin_login(None).await?;
    assert_eq!(redirect.location.path(), "/oidc/authorize");

    let response = server.get("/logout", None).await?;
    assert!(location(&response).unwrap().contains("/oidc/logout?"));
    Ok(())
}

#[tokio::test]
async fn test_audience_is_sent_when_configured() -> Result<()> {
    let provider = MockProvider::start().await;
    let server =
        TestLoginServer::spawn_with(&provider, &[("OIDC_AUDIENCE", "https://api.example")])
            .await?;

    let redirect = server.begin_login(None).await?;

    assert_eq!(
        redirect.param("audience").as_deref(),
        Some("https://api.example")
    );
    Ok(())
}

// ============================================================================
// Downstream API
// ============================================================================

#[tokio::test]
async fn test_api_call_forwards_access_token() -> Result<()> {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    Mock::given(method("GET"))
        .and(path("/secured/ping"))
        .and(header("authorization", "Bearer at-XYZ"))
        .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
        .expect(1)
        .mount(provider.server())
        .await;
    let api_url = format!("{}/secured/ping", provider.uri());
    let server = TestLoginServer::spawn_with(&provider, &[("API_URL", &api_url)]).await?;
    let cookie = server.login_as(&provider, "XYZ", |c| c).await?;

    let response = server.post("/api/call", Some(&cookie)).await?;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], 200);
    assert_eq!(body["body"], "pong");
    Ok(())
}

#[tokio::test]
async fn test_api_call_requires_session() -> Result<()> {
    let provider = MockProvider::start().await;
    Mock::given(path("/secured/ping"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(provider.server())
        .await;
    let api_url = format!("{}/secured/ping", provider.uri());
    let server = TestLoginServer::spawn_with(&provider, &[("API_URL", &api_url)]).await?;

    let response = server.post("/api/call", None).await?;

    assert_eq!(response.status(), 401);
    Ok(())
}

#[tokio::test]
async fn test_api_call_with_expired_access_token_is_unauthorized() -> Result<()> {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    Mock::given(path("/secured/ping"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(provider.server())
        .await;
    let api_url = format!("{}/secured/ping", provider.uri());
    let server = TestLoginServer::spawn_with(&provider, &[("API_URL", &api_url)]).await?;

    let redirect = server.begin_login(None).await?;
    let claims = provider.claims().with_nonce(&redirect.nonce).build();
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "at-stale",
            "id_token": provider.keypair().sign(&claims),
            "token_type": "Bearer",
            "expires_in": 0
        })))
        .mount(provider.server())
        .await;
    let response = server
        .callback(&[("code", "STALE"), ("state", &redirect.state)])
        .await?;
    let cookie = session_cookie(&response).expect("session cookie should be set");

    let response = server.post("/api/call", Some(&cookie)).await?;

    assert_eq!(response.status(), 401);
    Ok(())
}

#[tokio::test]
async fn test_api_rejection_is_relayed() -> Result<()> {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    Mock::given(path("/secured/ping"))
        .respond_with(ResponseTemplate::new(403).set_body_string("insufficient scope"))
        .mount(provider.server())
        .await;
    let api_url = format!("{}/secured/ping", provider.uri());
    let server = TestLoginServer::spawn_with(&provider, &[("API_URL", &api_url)]).await?;
    let cookie = server.login_as(&provider, "XYZ", |c| c).await?;

    let response = server.post("/api/call", Some(&cookie)).await?;

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await?;
    assert_eq!(body["status"], 403);
    assert_eq!(body["body"], "insufficient scope");
    Ok(())
}
