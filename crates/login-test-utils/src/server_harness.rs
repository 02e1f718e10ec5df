//! Test server harness for E2E testing
//!
//! Provides `TestLoginServer` for spawning real login service instances
//! against a [`MockProvider`].

use crate::mock_provider::{MockProvider, TEST_CLIENT_ID};
use login_service::config::Config;
use login_service::middleware::SESSION_COOKIE_NAME;
use login_service::observability::metrics::init_metrics_recorder;
use login_service::routes::{self, AppState};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::task::JoinHandle;
use url::Url;

/// Callback URL registered for the test client.
pub const TEST_CALLBACK_URL: &str = "http://127.0.0.1/callback";

/// Process-wide metrics handle; the recorder can only be installed once.
static TEST_METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn test_metrics_handle() -> PrometheusHandle {
    TEST_METRICS_HANDLE
        .get_or_init(|| {
            init_metrics_recorder()
                .unwrap_or_else(|_| PrometheusBuilder::new().build_recorder().handle())
        })
        .clone()
}

/// The provider redirect produced by `GET /login`.
#[derive(Debug, Clone)]
pub struct AuthorizeRedirect {
    pub location: Url,
    pub state: String,
    pub nonce: String,
}

impl AuthorizeRedirect {
    /// Query parameter of the authorize URL.
    pub fn param(&self, name: &str) -> Option<String> {
        query_param(&self.location, name)
    }
}

fn query_param(url: &Url, name: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}

/// Test harness for spawning the login service in E2E tests.
///
/// # Example
/// ```rust,ignore
/// let provider = MockProvider::start().await;
/// let server = TestLoginServer::spawn(&provider).await?;
///
/// let response = server.client().get(format!("{}/health", server.url())).send().await?;
/// assert_eq!(response.status(), 200);
/// ```
pub struct TestLoginServer {
    addr: SocketAddr,
    state: AppState,
    _handle: JoinHandle<()>,
}

impl TestLoginServer {
    /// Spawn a server registered with `provider` using default settings.
    pub async fn spawn(provider: &MockProvider) -> Result<Self, anyhow::Error> {
        Self::spawn_with(provider, &[]).await
    }

    /// Spawn a server with extra or overriding environment variables.
    ///
    /// The server binds to 127.0.0.1 on a random port.
    pub async fn spawn_with(
        provider: &MockProvider,
        overrides: &[(&str, &str)],
    ) -> Result<Self, anyhow::Error> {
        let mut vars = HashMap::from([
            ("OIDC_ISSUER".to_string(), provider.issuer()),
            ("OIDC_CLIENT_ID".to_string(), TEST_CLIENT_ID.to_string()),
            ("OIDC_CLIENT_SECRET".to_string(), "test-client-secret".to_string()),
            ("OIDC_CALLBACK_URL".to_string(), TEST_CALLBACK_URL.to_string()),
            ("OIDC_SCOPES".to_string(), "openid profile".to_string()),
            ("SESSION_SECRET".to_string(), "s".repeat(64)),
            ("SESSION_COOKIE_SECURE".to_string(), "false".to_string()),
            ("BIND_ADDRESS".to_string(), "127.0.0.1:0".to_string()),
        ]);
        for (key, value) in overrides {
            vars.insert((*key).to_string(), (*value).to_string());
        }

        let config = Config::from_vars(&vars)
            .map_err(|e| anyhow::anyhow!("Failed to create config: {}", e))?;

        let state = AppState::from_config(config)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to create app state: {}", e))?;

        let app = routes::build_routes(state.clone(), test_metrics_handle());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .map_err(|e| anyhow::anyhow!("Failed to bind test server: {}", e))?;

        let addr = listener
            .local_addr()
            .map_err(|e| anyhow::anyhow!("Failed to get local address: {}", e))?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                eprintln!("Test server error: {}", e);
            }
        });

        Ok(Self {
            addr,
            state,
            _handle: handle,
        })
    }

    /// Get the base URL of the test server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Shared application state, for inspecting the stores.
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// HTTP client that does not follow redirects.
    pub fn client(&self) -> reqwest::Client {
        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to build test client")
    }

    /// `GET /login` and parse the provider redirect.
    pub async fn begin_login(
        &self,
        return_to: Option<&str>,
    ) -> Result<AuthorizeRedirect, anyhow::Error> {
        let mut url = Url::parse(&format!("{}/login", self.url()))?;
        if let Some(path) = return_to {
            url.query_pairs_mut().append_pair("return_to", path);
        }

        let response = self.client().get(url).send().await?;
        anyhow::ensure!(
            response.status() == reqwest::StatusCode::FOUND,
            "Expected 302 from /login, got {}",
            response.status()
        );

        let location = location(&response).ok_or_else(|| anyhow::anyhow!("Missing Location"))?;
        let location = Url::parse(location)?;
        let state = query_param(&location, "state").unwrap_or_default();
        let nonce = query_param(&location, "nonce").unwrap_or_default();

        Ok(AuthorizeRedirect {
            location,
            state,
            nonce,
        })
    }

    /// `GET /callback` with the given query parameters.
    pub async fn callback(
        &self,
        params: &[(&str, &str)],
    ) -> Result<reqwest::Response, anyhow::Error> {
        let mut url = Url::parse(&format!("{}/callback", self.url()))?;
        url.query_pairs_mut().extend_pairs(params);
        Ok(self.client().get(url).send().await?)
    }

    /// `GET /callback` while presenting a `name=value` session cookie.
    pub async fn callback_with_session(
        &self,
        params: &[(&str, &str)],
        cookie: &str,
    ) -> Result<reqwest::Response, anyhow::Error> {
        let mut url = Url::parse(&format!("{}/callback", self.url()))?;
        url.query_pairs_mut().extend_pairs(params);
        Ok(self
            .client()
            .get(url)
            .header(reqwest::header::COOKIE, cookie)
            .send()
            .await?)
    }

    /// `POST path` with an empty body, optionally presenting a session cookie.
    pub async fn post(
        &self,
        path: &str,
        cookie: Option<&str>,
    ) -> Result<reqwest::Response, anyhow::Error> {
        let mut request = self.client().post(format!("{}{}", self.url(), path));
        if let Some(cookie) = cookie {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        Ok(request.send().await?)
    }

    /// `GET path`, optionally presenting a `name=value` session cookie.
    pub async fn get(
        &self,
        path: &str,
        cookie: Option<&str>,
    ) -> Result<reqwest::Response, anyhow::Error> {
        let mut request = self.client().get(format!("{}{}", self.url(), path));
        if let Some(cookie) = cookie {
            request = request.header(reqwest::header::COOKIE, cookie);
        }
        Ok(request.send().await?)
    }

    /// Run a complete login: `/login`, provider token for `code`, `/callback`.
    ///
    /// `customize` adjusts the ID token claims, which already carry the
    /// correct nonce. Returns the session cookie as `name=value`.
    pub async fn login_as(
        &self,
        provider: &MockProvider,
        code: &str,
        customize: impl FnOnce(crate::IdTokenBuilder) -> crate::IdTokenBuilder,
    ) -> Result<String, anyhow::Error> {
        let redirect = self.begin_login(None).await?;
        let claims = customize(provider.claims().with_nonce(&redirect.nonce)).build();
        provider
            .mount_token_response(code, &provider.keypair().sign(&claims))
            .await;

        let response = self
            .callback(&[("code", code), ("state", &redirect.state)])
            .await?;
        anyhow::ensure!(
            response.status() == reqwest::StatusCode::FOUND,
            "Expected 302 from /callback, got {}",
            response.status()
        );

        session_cookie(&response).ok_or_else(|| anyhow::anyhow!("No session cookie set"))
    }
}

impl Drop for TestLoginServer {
    fn drop(&mut self) {
        self._handle.abort();
    }
}

/// The `Location` header of a response.
pub fn location(response: &reqwest::Response) -> Option<&str> {
    response
        .headers()
        .get(reqwest::header::LOCATION)
        .and_then(|v| v.to_str().ok())
}

/// The session cookie set by a response, as `name=value`.
///
/// Returns `None` if the response does not set it or clears it.
pub fn session_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .find(|pair| {
            pair.strip_prefix(SESSION_COOKIE_NAME)
                .and_then(|rest| rest.strip_prefix('='))
                .is_some_and(|value| !value.is_empty())
        })
        .map(str::to_string)
}

/// Whether a response clears the session cookie.
pub fn clears_session_cookie(response: &reqwest::Response) -> bool {
    response
        .headers()
        .get_all(reqwest::header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .any(|pair| pair.strip_prefix(SESSION_COOKIE_NAME) == Some("="))
}
