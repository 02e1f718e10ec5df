//! ID token verification against a live JWKS endpoint.
//!
//! Covers key lookup, refresh coalescing, key rotation and the claim checks
//! that need a real signed token.

// Test code is allowed to use expect/unwrap for assertions
#![allow(clippy::unwrap_used, clippy::expect_used)]

use login_service::auth::jwks::JwksClient;
use login_service::auth::jwt::IdTokenVerifier;
use login_service::errors::AuthError;
use login_test_utils::{jwks_json, sign_hs256, MockProvider, TestKeypair, TEST_CLIENT_ID};
use std::sync::Arc;
use std::time::Duration;

const CLOCK_SKEW: Duration = Duration::from_secs(300);

fn jwks_client(provider: &MockProvider) -> JwksClient {
    JwksClient::new(
        format!("{}/.well-known/jwks.json", provider.uri()),
        reqwest::Client::new(),
        Duration::from_secs(300),
    )
}

fn verifier(provider: &MockProvider) -> IdTokenVerifier {
    IdTokenVerifier::new(
        Arc::new(jwks_client(provider).with_min_refresh_interval(Duration::ZERO)),
        CLOCK_SKEW,
    )
}

#[tokio::test]
async fn test_valid_token_verifies() {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    let verifier = verifier(&provider);

    let claims = provider
        .claims()
        .for_user("auth0|ada")
        .with_email("ada@example.com")
        .build();
    let token = provider.keypair().sign(&claims);

    let verified = verifier
        .verify(&token, TEST_CLIENT_ID, &provider.issuer())
        .await
        .unwrap();

    assert_eq!(verified.sub, "auth0|ada");
    assert_eq!(verified.email.as_deref(), Some("ada@example.com"));
}

#[tokio::test]
async fn test_unknown_kid_refreshes_once_then_fails() {
    let provider = MockProvider::start().await;
    provider
        .mount_jwks_with(jwks_json(&[provider.keypair()]), Some(1))
        .await;
    let verifier = verifier(&provider);

    let token = provider
        .keypair()
        .sign_with_kid(&provider.claims().build(), Some("rotated-away"));

    let err = verifier
        .verify(&token, TEST_CLIENT_ID, &provider.issuer())
        .await
        .unwrap_err();

    assert_eq!(err, AuthError::KeyNotFound);
}

#[tokio::test]
async fn test_concurrent_lookups_share_one_refresh() {
    let provider = MockProvider::start().await;
    provider
        .mount_jwks_with(jwks_json(&[provider.keypair()]), Some(1))
        .await;
    let client = Arc::new(jwks_client(&provider));

    let lookups: Vec<_> = (0..16)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.get_key("provider-key-1").await })
        })
        .collect();

    for lookup in lookups {
        let jwk = lookup.await.unwrap().unwrap();
        assert_eq!(jwk.kid.as_deref(), Some("provider-key-1"));
    }
}

#[tokio::test]
async fn test_concurrent_misses_share_one_refresh() {
    let provider = MockProvider::start().await;
    provider
        .mount_jwks_with(jwks_json(&[provider.keypair()]), Some(1))
        .await;
    let client = Arc::new(jwks_client(&provider));

    let lookups: Vec<_> = (0..8)
        .map(|_| {
            let client = Arc::clone(&client);
            tokio::spawn(async move { client.get_key("unknown").await })
        })
        .collect();

    for lookup in lookups {
        assert_eq!(lookup.await.unwrap().unwrap_err(), AuthError::KeyNotFound);
    }
}

#[tokio::test]
async fn test_rotated_key_is_picked_up_on_miss() {
    let provider = MockProvider::start().await;
    let old_key = TestKeypair::new(7, "old-key");
    let new_key = TestKeypair::new(8, "new-key");

    // First fetch publishes only the old key, later fetches both
    wiremock::Mock::given(wiremock::matchers::path("/.well-known/jwks.json"))
        .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(jwks_json(&[&old_key])))
        .up_to_n_times(1)
        .mount(provider.server())
        .await;
    provider
        .mount_jwks_with(jwks_json(&[&old_key, &new_key]), Some(1))
        .await;
    let verifier = verifier(&provider);

    let claims = provider.claims().build();
    verifier
        .verify(&old_key.sign(&claims), TEST_CLIENT_ID, &provider.issuer())
        .await
        .unwrap();

    let verified = verifier
        .verify(&new_key.sign(&claims), TEST_CLIENT_ID, &provider.issuer())
        .await
        .unwrap();
    assert_eq!(verified.sub, "auth0|test-user");
}

#[tokio::test]
async fn test_wrong_key_signature_is_invalid() {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    let verifier = verifier(&provider);

    // Signed by another key but claiming the published kid
    let impostor = TestKeypair::new(42, "provider-key-1");
    let token = impostor.sign(&provider.claims().build());

    let err = verifier
        .verify(&token, TEST_CLIENT_ID, &provider.issuer())
        .await
        .unwrap_err();

    assert_eq!(err, AuthError::SignatureInvalid);
}

#[tokio::test]
async fn test_hs256_token_is_rejected() {
    let provider = MockProvider::start().await;
    provider.mount_jwks_with(jwks_json(&[provider.keypair()]), Some(0)).await;
    let verifier = verifier(&provider);

    let token = sign_hs256(
        &provider.claims().build(),
        b"public-value-used-as-secret",
        "provider-key-1",
    );

    let err = verifier
        .verify(&token, TEST_CLIENT_ID, &provider.issuer())
        .await
        .unwrap_err();

    assert_eq!(err, AuthError::SignatureInvalid);
}

#[tokio::test]
async fn test_audience_mismatch() {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    let verifier = verifier(&provider);

    let token = provider
        .keypair()
        .sign(&provider.claims().with_audiences(&["someone-else"]).build());

    let err = verifier
        .verify(&token, TEST_CLIENT_ID, &provider.issuer())
        .await
        .unwrap_err();

    assert_eq!(err, AuthError::ClaimInvalid { claim: "aud" });
}

#[tokio::test]
async fn test_audience_list_containing_client_passes() {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    let verifier = verifier(&provider);

    let token = provider.keypair().sign(
        &provider
            .claims()
            .with_audiences(&["https://api.example", TEST_CLIENT_ID])
            .build(),
    );

    assert!(verifier
        .verify(&token, TEST_CLIENT_ID, &provider.issuer())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_issuer_mismatch() {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    let verifier = verifier(&provider);

    let token = provider
        .keypair()
        .sign(&provider.claims().with_issuer("https://evil.example/").build());

    let err = verifier
        .verify(&token, TEST_CLIENT_ID, &provider.issuer())
        .await
        .unwrap_err();

    assert_eq!(err, AuthError::ClaimInvalid { claim: "iss" });
}

#[tokio::test]
async fn test_expired_token() {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    let verifier = verifier(&provider);

    let token = provider
        .keypair()
        .sign(&provider.claims().issued_in(-7200).expires_in(-60).build());

    let err = verifier
        .verify(&token, TEST_CLIENT_ID, &provider.issuer())
        .await
        .unwrap_err();

    assert_eq!(err, AuthError::ClaimInvalid { claim: "exp" });
}

#[tokio::test]
async fn test_future_iat_beyond_skew() {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    let verifier = verifier(&provider);

    let token = provider.keypair().sign(
        &provider
            .claims()
            .issued_in(3600)
            .expires_in(7200)
            .build(),
    );

    let err = verifier
        .verify(&token, TEST_CLIENT_ID, &provider.issuer())
        .await
        .unwrap_err();

    assert_eq!(err, AuthError::ClockSkew);
}

#[tokio::test]
async fn test_future_iat_within_skew_passes() {
    let provider = MockProvider::start().await;
    provider.mount_jwks().await;
    let verifier = verifier(&provider);

    let token = provider
        .keypair()
        .sign(&provider.claims().issued_in(60).build());

    assert!(verifier
        .verify(&token, TEST_CLIENT_ID, &provider.issuer())
        .await
        .is_ok());
}

#[tokio::test]
async fn test_jwks_outage_is_upstream_unavailable() {
    let provider = MockProvider::start().await;
    wiremock::Mock::given(wiremock::matchers::path("/.well-known/jwks.json"))
        .respond_with(wiremock::ResponseTemplate::new(503))
        .mount(provider.server())
        .await;
    let verifier = verifier(&provider);

    let token = provider.keypair().sign(&provider.claims().build());

    let err = verifier
        .verify(&token, TEST_CLIENT_ID, &provider.issuer())
        .await
        .unwrap_err();

    assert!(matches!(err, AuthError::UpstreamUnavailable { .. }));
}
