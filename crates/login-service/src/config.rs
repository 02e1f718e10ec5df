//! Login service configuration.
//!
//! Configuration is loaded once from environment variables and passed to
//! constructors; nothing reads the environment after startup. All sensitive
//! fields are redacted in Debug output.

use common::jwt::{DEFAULT_CLOCK_SKEW, MAX_CLOCK_SKEW};
use common::secret::SecretString;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Default server bind address.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:3000";

/// Default scopes requested at the authorize endpoint.
pub const DEFAULT_SCOPES: &str = "openid profile email";

/// Default timeout for calls to the identity provider.
pub const DEFAULT_HTTP_TIMEOUT_SECONDS: u64 = 5;

/// Upper bound for the identity provider timeout.
pub const MAX_HTTP_TIMEOUT_SECONDS: u64 = 60;

/// Default number of extra attempts for transient token exchange failures.
pub const DEFAULT_MAX_RETRIES: u32 = 2;

/// Upper bound for token exchange retries.
pub const MAX_RETRIES: u32 = 5;

/// Default JWKS cache TTL (5 minutes).
pub const DEFAULT_JWKS_CACHE_TTL_SECONDS: u64 = 300;

/// Default lifetime of a pending login (10 minutes).
pub const DEFAULT_PENDING_LOGIN_TTL_SECONDS: u64 = 600;

/// Default session lifetime (24 hours).
pub const DEFAULT_SESSION_TTL_SECONDS: u64 = 86_400;

/// Upper bound for the JWKS cache TTL (1 day).
pub const MAX_JWKS_CACHE_TTL_SECONDS: u64 = 86_400;

/// Upper bound for the pending login lifetime (1 hour).
pub const MAX_PENDING_LOGIN_TTL_SECONDS: u64 = 3_600;

/// Upper bound for the session lifetime (1 year).
pub const MAX_SESSION_TTL_SECONDS: u64 = 31_536_000;

/// Minimum length of the cookie signing secret.
pub const MIN_SESSION_SECRET_BYTES: usize = 64;

/// Identity provider registration for this relying party.
///
/// Immutable once built. The client secret is only ever exposed to the
/// token exchange request body.
#[derive(Clone)]
pub struct ProviderConfig {
    /// Expected `iss` claim, also the base for default endpoints.
    pub issuer: String,

    /// OAuth client identifier (also the expected `aud`).
    pub client_id: String,

    /// OAuth client secret.
    pub client_secret: SecretString,

    /// Registered redirect URI for the callback.
    pub callback_url: String,

    /// API audience requested at the authorize endpoint.
    pub audience: Option<String>,

    /// Space-separated scopes requested at the authorize endpoint.
    pub scopes: String,

    /// Where the provider should send the browser after logout.
    pub post_logout_redirect_url: Option<String>,

    /// Resolve endpoints from `.well-known/openid-configuration`.
    pub use_discovery: bool,

    /// Reject configuration without an `audience`.
    pub require_audience: bool,

    /// Compare the ID token nonce against the pending login.
    pub enforce_nonce: bool,
}

impl ProviderConfig {
    /// Build a provider registration with default optional settings.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if a required field is empty or a URL is invalid.
    pub fn new(
        issuer: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: SecretString,
        callback_url: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let provider = Self {
            issuer: issuer.into(),
            client_id: client_id.into(),
            client_secret,
            callback_url: callback_url.into(),
            audience: None,
            scopes: DEFAULT_SCOPES.to_string(),
            post_logout_redirect_url: None,
            use_discovery: false,
            require_audience: false,
            enforce_nonce: true,
        };
        provider.validate()?;
        Ok(provider)
    }

    /// Check the invariants of a provider registration.
    ///
    /// # Errors
    ///
    /// Returns the first violated invariant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        use secrecy::ExposeSecret;

        validate_http_url(&self.issuer).map_err(ConfigError::InvalidIssuer)?;
        validate_http_url(&self.callback_url).map_err(ConfigError::InvalidCallbackUrl)?;

        if self.client_id.trim().is_empty() {
            return Err(ConfigError::MissingEnvVar("OIDC_CLIENT_ID".to_string()));
        }
        if self.client_secret.expose_secret().is_empty() {
            return Err(ConfigError::MissingEnvVar("OIDC_CLIENT_SECRET".to_string()));
        }
        if !self.scopes.split_whitespace().any(|s| s == "openid") {
            return Err(ConfigError::InvalidScopes(format!(
                "OIDC_SCOPES must include 'openid', got '{}'",
                self.scopes
            )));
        }
        if self.require_audience && self.audience.is_none() {
            return Err(ConfigError::MissingEnvVar("OIDC_AUDIENCE".to_string()));
        }
        if let Some(url) = &self.post_logout_redirect_url {
            validate_http_url(url).map_err(ConfigError::InvalidPostLogoutUrl)?;
        }
        Ok(())
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("callback_url", &self.callback_url)
            .field("audience", &self.audience)
            .field("scopes", &self.scopes)
            .field("post_logout_redirect_url", &self.post_logout_redirect_url)
            .field("use_discovery", &self.use_discovery)
            .field("require_audience", &self.require_audience)
            .field("enforce_nonce", &self.enforce_nonce)
            .finish()
    }
}

/// Login service configuration.
#[derive(Clone)]
pub struct Config {
    /// Server bind address (default: "0.0.0.0:3000").
    pub bind_address: String,

    /// Identity provider registration.
    pub provider: ProviderConfig,

    /// Timeout for every call to the identity provider.
    pub http_timeout: Duration,

    /// Extra attempts for transient token exchange failures.
    pub max_retries: u32,

    /// How long a fetched key set is trusted.
    pub jwks_cache_ttl: Duration,

    /// Tolerance for `iat` in the future.
    pub jwt_clock_skew: Duration,

    /// Lifetime of an unconsumed pending login.
    pub pending_login_ttl: Duration,

    /// Lifetime of an authenticated session.
    pub session_ttl: Duration,

    /// Cookie signing secret (at least 64 bytes).
    pub session_secret: SecretString,

    /// Set the `Secure` attribute on cookies.
    pub session_cookie_secure: bool,

    /// Keep raw tokens inside the session.
    pub session_retain_tokens: bool,

    /// Attach the `/userinfo` profile to new sessions.
    pub fetch_userinfo: bool,

    /// Downstream API called with the session's access token.
    pub api_url: Option<Url>,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bind_address", &self.bind_address)
            .field("provider", &self.provider)
            .field("http_timeout", &self.http_timeout)
            .field("max_retries", &self.max_retries)
            .field("jwks_cache_ttl", &self.jwks_cache_ttl)
            .field("jwt_clock_skew", &self.jwt_clock_skew)
            .field("pending_login_ttl", &self.pending_login_ttl)
            .field("session_ttl", &self.session_ttl)
            .field("session_secret", &"[REDACTED]")
            .field("session_cookie_secure", &self.session_cookie_secure)
            .field("session_retain_tokens", &self.session_retain_tokens)
            .field("fetch_userinfo", &self.fetch_userinfo)
            .field("api_url", &self.api_url.as_ref().map(Url::as_str))
            .finish()
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid issuer configuration: {0}")]
    InvalidIssuer(String),

    #[error("Invalid callback URL configuration: {0}")]
    InvalidCallbackUrl(String),

    #[error("Invalid post-logout URL configuration: {0}")]
    InvalidPostLogoutUrl(String),

    #[error("Invalid scopes configuration: {0}")]
    InvalidScopes(String),

    #[error("Invalid JWT clock skew configuration: {0}")]
    InvalidJwtClockSkew(String),

    #[error("Invalid duration configuration: {0}")]
    InvalidDuration(String),

    #[error("Invalid retry configuration: {0}")]
    InvalidRetries(String),

    #[error("Invalid API URL configuration: {0}")]
    InvalidApiUrl(String),

    #[error("Invalid session secret: {0}")]
    InvalidSessionSecret(String),

    #[error("Invalid boolean configuration: {0}")]
    InvalidFlag(String),
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let issuer = match (non_empty(vars, "OIDC_ISSUER"), non_empty(vars, "OIDC_DOMAIN")) {
            (Some(issuer), _) => issuer,
            (None, Some(domain)) => format!("https://{}/", domain.trim_end_matches('/')),
            (None, None) => {
                return Err(ConfigError::MissingEnvVar(
                    "OIDC_ISSUER or OIDC_DOMAIN".to_string(),
                ))
            }
        };

        let client_id = required(vars, "OIDC_CLIENT_ID")?;
        let client_secret = SecretString::from(required(vars, "OIDC_CLIENT_SECRET")?);
        let callback_url = required(vars, "OIDC_CALLBACK_URL")?;

        let provider = ProviderConfig {
            issuer,
            client_id,
            client_secret,
            callback_url,
            audience: non_empty(vars, "OIDC_AUDIENCE"),
            scopes: non_empty(vars, "OIDC_SCOPES").unwrap_or_else(|| DEFAULT_SCOPES.to_string()),
            post_logout_redirect_url: non_empty(vars, "OIDC_POST_LOGOUT_URL"),
            use_discovery: parse_flag(vars, "OIDC_USE_DISCOVERY", false)?,
            require_audience: parse_flag(vars, "OIDC_REQUIRE_AUDIENCE", false)?,
            enforce_nonce: parse_flag(vars, "OIDC_ENFORCE_NONCE", true)?,
        };
        provider.validate()?;

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let http_timeout_seconds = parse_seconds(
            vars,
            "OIDC_HTTP_TIMEOUT_SECONDS",
            DEFAULT_HTTP_TIMEOUT_SECONDS,
            MAX_HTTP_TIMEOUT_SECONDS,
        )?;

        let max_retries = if let Some(value_str) = vars.get("OIDC_MAX_RETRIES") {
            let value: u32 = value_str.parse().map_err(|e| {
                ConfigError::InvalidRetries(format!(
                    "OIDC_MAX_RETRIES must be a valid non-negative integer, got '{value_str}': {e}"
                ))
            })?;

            if value > MAX_RETRIES {
                return Err(ConfigError::InvalidRetries(format!(
                    "OIDC_MAX_RETRIES must not exceed {MAX_RETRIES}, got {value}"
                )));
            }

            value
        } else {
            DEFAULT_MAX_RETRIES
        };

        // Parse JWT clock skew tolerance with validation
        let jwt_clock_skew = if let Some(value_str) = vars.get("JWT_CLOCK_SKEW_SECONDS") {
            let value: i64 = value_str.parse().map_err(|e| {
                ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be a valid integer, got '{value_str}': {e}"
                ))
            })?;

            if value <= 0 {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must be positive, got {value}"
                )));
            }

            #[allow(clippy::cast_sign_loss)]
            let value = value as u64;
            if value > MAX_CLOCK_SKEW.as_secs() {
                return Err(ConfigError::InvalidJwtClockSkew(format!(
                    "JWT_CLOCK_SKEW_SECONDS must not exceed {} seconds, got {}",
                    MAX_CLOCK_SKEW.as_secs(),
                    value
                )));
            }

            Duration::from_secs(value)
        } else {
            DEFAULT_CLOCK_SKEW
        };

        let jwks_cache_ttl_seconds = parse_seconds(
            vars,
            "JWKS_CACHE_TTL_SECONDS",
            DEFAULT_JWKS_CACHE_TTL_SECONDS,
            MAX_JWKS_CACHE_TTL_SECONDS,
        )?;
        let pending_login_ttl_seconds = parse_seconds(
            vars,
            "PENDING_LOGIN_TTL_SECONDS",
            DEFAULT_PENDING_LOGIN_TTL_SECONDS,
            MAX_PENDING_LOGIN_TTL_SECONDS,
        )?;
        let session_ttl_seconds = parse_seconds(
            vars,
            "SESSION_TTL_SECONDS",
            DEFAULT_SESSION_TTL_SECONDS,
            MAX_SESSION_TTL_SECONDS,
        )?;

        let session_secret = required(vars, "SESSION_SECRET")?;
        if session_secret.len() < MIN_SESSION_SECRET_BYTES {
            return Err(ConfigError::InvalidSessionSecret(format!(
                "SESSION_SECRET must be at least {} bytes, got {}",
                MIN_SESSION_SECRET_BYTES,
                session_secret.len()
            )));
        }

        let session_retain_tokens = parse_flag(vars, "SESSION_RETAIN_TOKENS", true)?;

        let api_url = match non_empty(vars, "API_URL") {
            Some(value) => {
                validate_http_url(&value).map_err(ConfigError::InvalidApiUrl)?;
                if !session_retain_tokens {
                    return Err(ConfigError::InvalidApiUrl(
                        "API_URL requires SESSION_RETAIN_TOKENS=true".to_string(),
                    ));
                }
                Some(Url::parse(&value).map_err(|e| ConfigError::InvalidApiUrl(e.to_string()))?)
            }
            None => None,
        };

        Ok(Config {
            bind_address,
            provider,
            http_timeout: Duration::from_secs(http_timeout_seconds),
            max_retries,
            jwks_cache_ttl: Duration::from_secs(jwks_cache_ttl_seconds),
            jwt_clock_skew,
            pending_login_ttl: Duration::from_secs(pending_login_ttl_seconds),
            session_ttl: Duration::from_secs(session_ttl_seconds),
            session_secret: SecretString::from(session_secret),
            session_cookie_secure: parse_flag(vars, "SESSION_COOKIE_SECURE", true)?,
            session_retain_tokens,
            fetch_userinfo: parse_flag(vars, "OIDC_FETCH_USERINFO", false)?,
            api_url,
        })
    }
}

fn non_empty(vars: &HashMap<String, String>, key: &str) -> Option<String> {
    vars.get(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(vars: &HashMap<String, String>, key: &str) -> Result<String, ConfigError> {
    non_empty(vars, key).ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

fn parse_flag(
    vars: &HashMap<String, String>,
    key: &str,
    default: bool,
) -> Result<bool, ConfigError> {
    let Some(value_str) = vars.get(key) else {
        return Ok(default);
    };
    match value_str.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidFlag(format!(
            "{key} must be true or false, got '{value_str}'"
        ))),
    }
}

fn parse_seconds(
    vars: &HashMap<String, String>,
    key: &str,
    default: u64,
    max: u64,
) -> Result<u64, ConfigError> {
    let Some(value_str) = vars.get(key) else {
        return Ok(default);
    };

    let value: u64 = value_str.parse().map_err(|e| {
        ConfigError::InvalidDuration(format!(
            "{key} must be a valid positive integer, got '{value_str}': {e}"
        ))
    })?;

    if value == 0 {
        return Err(ConfigError::InvalidDuration(format!(
            "{key} must be greater than 0"
        )));
    }

    if value > max {
        return Err(ConfigError::InvalidDuration(format!(
            "{key} must not exceed {max} seconds, got {value}"
        )));
    }

    Ok(value)
}

fn validate_http_url(value: &str) -> Result<(), String> {
    let url = Url::parse(value).map_err(|e| format!("'{value}' is not a valid URL: {e}"))?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(format!("'{value}' must use http or https, got '{other}'")),
    }
}
