//! Configuration management
//!
//! Loads configuration from:
//! 1. Default values
//! 2. Configuration files (config/default.toml, config/local.toml)
//! 3. Environment variables (AUTHDEMO__*, override)
//! 4. `GITHUB_CLIENT_ID` / `GITHUB_CLIENT_SECRET`

use serde::Deserialize;
use std::{net::IpAddr, path::PathBuf};

/// Minimum signing secret length in bytes
pub const MIN_SECRET_BYTES: usize = 32;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Port number (e.g., 3000)
    pub port: u16,
    /// Public domain, optionally with port (e.g., "localhost:3000")
    pub domain: String,
    /// Protocol ("http" or "https")
    pub protocol: String,
}

impl ServerConfig {
    /// Get the public base URL
    ///
    /// # Returns
    /// Full URL like "https://auth.example.com"
    pub fn base_url(&self) -> String {
        format!("{}://{}", self.protocol, self.domain)
    }
}

/// Database configuration (SQLite only)
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to SQLite database file
    pub path: PathBuf,
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Secret for signing session cookies (32+ bytes).
    ///
    /// Empty means "generate one at startup".
    #[serde(default)]
    pub secret: String,
    /// Prefix for every auth cookie name
    pub cookie_prefix: String,
    /// Extra origins accepted for callback URLs
    #[serde(default)]
    pub trusted_origins: Vec<String>,
    /// Interval of the expired session/state cleanup task
    pub cleanup_interval_seconds: u64,
    pub session: SessionConfig,
    pub github: GitHubOAuthConfig,
}

/// Session lifetime configuration
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session lifetime in seconds (default: 604800 = 7 days)
    pub expires_in: i64,
    /// Extend expiry when the session was last updated longer ago than this
    /// many seconds (default: 86400 = 1 day). 0 refreshes on every read.
    pub update_age: i64,
    pub cookie_cache: CookieCacheConfig,
}

/// Signed session cookie cache
///
/// Lets session reads skip the database while the cookie is fresh.
#[derive(Debug, Clone, Deserialize)]
pub struct CookieCacheConfig {
    pub enabled: bool,
    /// Cache lifetime in seconds (default: 300 = 5 minutes)
    pub max_age: i64,
    pub strategy: CookieCacheStrategy,
}

/// Encoding used for the cached session cookie
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CookieCacheStrategy {
    /// HS256 JWT
    #[default]
    Jwt,
    /// base64url(payload).base64url(hmac_sha256(payload))
    Compact,
}

/// GitHub OAuth configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GitHubOAuthConfig {
    /// OAuth app client ID (empty when unset)
    #[serde(default)]
    pub client_id: String,
    /// OAuth app client secret (empty when unset)
    #[serde(default)]
    pub client_secret: String,
    pub authorize_url: String,
    pub token_url: String,
    /// REST API base, used for `/user` and `/user/emails`
    pub api_base_url: String,
    pub scopes: Vec<String>,
}

impl GitHubOAuthConfig {
    /// Apply `GITHUB_CLIENT_ID` / `GITHUB_CLIENT_SECRET` from `lookup`.
    ///
    /// A variable that is not set leaves the configured value alone
    /// (empty by default). No validation happens here.
    pub fn apply_env_credentials<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(client_id) = lookup("GITHUB_CLIENT_ID") {
            self.client_id = client_id;
        }
        if let Some(client_secret) = lookup("GITHUB_CLIENT_SECRET") {
            self.client_secret = client_secret;
        }
    }

    /// Whether both credentials are present
    pub fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    pub level: String,
    /// Log format: "pretty" or "json"
    pub format: String,
}

impl LoggingConfig {
    /// Filter used when `RUST_LOG` is not set
    pub fn default_filter(&self) -> String {
        format!("authdemo={},tower_http=debug", self.level.trim().to_ascii_lowercase())
    }

    pub fn is_json(&self) -> bool {
        self.format.trim().eq_ignore_ascii_case("json")
    }
}

impl AppConfig {
    /// Load configuration from file and environment
    ///
    /// # Loading Order
    /// 1. Default values
    /// 2. config/default.toml (if exists)
    /// 3. config/local.toml (if exists)
    /// 4. Environment variables (AUTHDEMO__*)
    /// 5. `GITHUB_CLIENT_ID` / `GITHUB_CLIENT_SECRET`
    ///
    /// Call [`AppConfig::prepare`] afterwards, once logging is set up.
    ///
    /// # Errors
    /// Returns error if the sources cannot be read or deserialized
    pub fn load() -> Result<Self, crate::error::AppError> {
        use config::{Config, Environment, File};

        let config = Self::with_defaults(Config::builder())?
            // Load from config/default.toml if it exists
            .add_source(File::with_name("config/default").required(false))
            // Load from config/local.toml if it exists (overrides default)
            .add_source(File::with_name("config/local").required(false))
            // Load from environment variables (AUTHDEMO__*)
            .add_source(
                Environment::with_prefix("AUTHDEMO")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("auth.trusted_origins")
                    .with_list_parse_key("auth.github.scopes")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;

        let mut app_config: Self = config
            .try_deserialize()
            .map_err(|e| crate::error::AppError::Config(e.to_string()))?;
        app_config
            .auth
            .github
            .apply_env_credentials(|key| std::env::var(key).ok());
        Ok(app_config)
    }

    fn with_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, config::ConfigError> {
        builder
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("server.domain", "localhost:3000")?
            .set_default("server.protocol", "http")?
            .set_default("database.path", "data/authdemo.db")?
            .set_default("auth.secret", "")?
            .set_default("auth.cookie_prefix", "authdemo")?
            .set_default("auth.cleanup_interval_seconds", 3600)?
            .set_default("auth.session.expires_in", 604800)?
            .set_default("auth.session.update_age", 86400)?
            .set_default("auth.session.cookie_cache.enabled", true)?
            .set_default("auth.session.cookie_cache.max_age", 300)?
            .set_default("auth.session.cookie_cache.strategy", "jwt")?
            .set_default("auth.github.client_id", "")?
            .set_default("auth.github.client_secret", "")?
            .set_default(
                "auth.github.authorize_url",
                "https://github.com/login/oauth/authorize",
            )?
            .set_default(
                "auth.github.token_url",
                "https://github.com/login/oauth/access_token",
            )?
            .set_default("auth.github.api_base_url", "https://api.github.com")?
            .set_default("auth.github.scopes", vec!["read:user", "user:email"])?
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")
    }

    /// Fill in generated values and validate
    ///
    /// An empty secret is replaced by a random one. Missing GitHub
    /// credentials only produce a warning.
    pub fn prepare(&mut self) -> Result<(), crate::error::AppError> {
        if self.auth.secret.is_empty() {
            tracing::warn!(
                "auth.secret is not set; generated an ephemeral secret, sessions will not survive a restart"
            );
            self.auth.secret = generate_secret();
        }

        if !self.auth.github.is_configured() {
            tracing::warn!(
                client_id_set = !self.auth.github.client_id.is_empty(),
                client_secret_set = !self.auth.github.client_secret.is_empty(),
                "GitHub OAuth credentials are incomplete; sign-in will be rejected by GitHub"
            );
        }

        self.validate()
    }

    pub fn should_use_secure_cookies(&self) -> bool {
        self.server.protocol.eq_ignore_ascii_case("https")
            || !is_local_server_domain(&self.server.domain)
    }

    fn validate(&self) -> Result<(), crate::error::AppError> {
        if self.auth.secret.len() < MIN_SECRET_BYTES {
            return Err(crate::error::AppError::Config(format!(
                "auth.secret must be at least {} bytes",
                MIN_SECRET_BYTES
            )));
        }

        if self.auth.session.expires_in <= 0 {
            return Err(crate::error::AppError::Config(
                "auth.session.expires_in must be greater than 0".to_string(),
            ));
        }

        if self.auth.session.update_age < 0 {
            return Err(crate::error::AppError::Config(
                "auth.session.update_age must not be negative".to_string(),
            ));
        }

        if self.auth.session.cookie_cache.max_age <= 0 {
            return Err(crate::error::AppError::Config(
                "auth.session.cookie_cache.max_age must be greater than 0".to_string(),
            ));
        }

        if !self.should_use_secure_cookies() {
            let host = normalized_server_host(&self.server.domain);
            tracing::warn!(
                host = %host,
                protocol = %self.server.protocol,
                "Using insecure session cookies for local development"
            );
        } else if !self.server.protocol.eq_ignore_ascii_case("https") {
            return Err(crate::error::AppError::Config(
                "server.protocol must be https for non-local server domains".to_string(),
            ));
        }

        Ok(())
    }
}

fn generate_secret() -> String {
    use base64::{Engine as _, engine::general_purpose};
    use rand::RngCore;

    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn normalized_server_host(domain: &str) -> String {
    let trimmed = domain.trim();
    let parsed_host = url::Url::parse(&format!("http://{trimmed}"))
        .ok()
        .and_then(|url| url.host_str().map(|host| host.to_string()));
    let host = parsed_host.unwrap_or_else(|| trimmed.to_string());
    host.trim_end_matches('.').to_ascii_lowercase()
}

fn is_local_server_domain(domain: &str) -> bool {
    let host = normalized_server_host(domain);
    if host == "localhost" || host.ends_with(".localhost") {
        return true;
    }

    let host = host.trim_start_matches('[').trim_end_matches(']');
    if let Ok(ip) = host.parse::<IpAddr>() {
        return ip.is_loopback() || ip.is_unspecified();
    }

    false
}
