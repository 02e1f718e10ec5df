//! Wiremock-backed identity provider.
//!
//! Serves the endpoints the login service derives from its issuer:
//! `/oauth/token`, `/.well-known/jwks.json`, `/userinfo` and, optionally,
//! `/.well-known/openid-configuration`.

use crate::crypto_fixtures::{jwks_json, TestKeypair};
use crate::token_builders::IdTokenBuilder;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Client id the harness registers with the mock provider.
pub const TEST_CLIENT_ID: &str = "abc";

/// Identity provider double with one published signing key.
pub struct MockProvider {
    server: MockServer,
    keypair: TestKeypair,
}

impl MockProvider {
    pub async fn start() -> Self {
        Self {
            server: MockServer::start().await,
            keypair: TestKeypair::new(1, "provider-key-1"),
        }
    }

    /// Base URI without trailing slash.
    pub fn uri(&self) -> String {
        self.server.uri()
    }

    /// Issuer identifier (`{uri}/`).
    pub fn issuer(&self) -> String {
        format!("{}/", self.server.uri())
    }

    pub fn server(&self) -> &MockServer {
        &self.server
    }

    /// The key published by [`mount_jwks`](Self::mount_jwks).
    pub fn keypair(&self) -> &TestKeypair {
        &self.keypair
    }

    /// Valid ID token claims for the test client from this issuer.
    pub fn claims(&self) -> IdTokenBuilder {
        IdTokenBuilder::new(&self.issuer(), TEST_CLIENT_ID)
    }

    /// Publish the provider key.
    pub async fn mount_jwks(&self) {
        self.mount_jwks_with(jwks_json(&[&self.keypair]), None).await;
    }

    /// Publish an arbitrary JWKS document, optionally asserting the fetch count.
    pub async fn mount_jwks_with(&self, jwks: serde_json::Value, expected_calls: Option<u64>) {
        let mock = Mock::given(method("GET"))
            .and(path("/.well-known/jwks.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks));
        match expected_calls {
            Some(n) => mock.expect(n).mount(&self.server).await,
            None => mock.mount(&self.server).await,
        }
    }

    /// Answer the exchange of `code` with `id_token` and access token `at-{code}`.
    pub async fn mount_token_response(&self, code: &str, id_token: &str) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .and(body_string_contains(format!("code={code}")))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "access_token": format!("at-{code}"),
                "id_token": id_token,
                "token_type": "Bearer",
                "expires_in": 86400
            })))
            .mount(&self.server)
            .await;
    }

    /// Answer every exchange with `status`, asserting the attempt count.
    pub async fn mount_token_status(&self, status: u16, expected_calls: u64) {
        Mock::given(method("POST"))
            .and(path("/oauth/token"))
            .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({
                "error": "server_error",
                "error_description": "provider-internal detail"
            })))
            .expect(expected_calls)
            .mount(&self.server)
            .await;
    }

    /// Serve `profile` to the holder of the access token for `code`.
    pub async fn mount_userinfo(&self, code: &str, profile: serde_json::Value) {
        Mock::given(method("GET"))
            .and(path("/userinfo"))
            .and(header("authorization", format!("Bearer at-{code}").as_str()))
            .respond_with(ResponseTemplate::new(200).set_body_json(profile))
            .mount(&self.server)
            .await;
    }

    /// Serve a discovery document pointing at non-default endpoint paths.
    pub async fn mount_discovery(&self) {
        let uri = self.uri();
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": self.issuer(),
                "authorization_endpoint": format!("{uri}/oidc/authorize"),
                "token_endpoint": format!("{uri}/oauth/token"),
                "jwks_uri": format!("{uri}/.well-known/jwks.json"),
                "userinfo_endpoint": format!("{uri}/userinfo"),
                "end_session_endpoint": format!("{uri}/oidc/logout")
            })))
            .mount(&self.server)
            .await;
    }
}
