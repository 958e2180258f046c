//! Auth cookie naming and construction

use axum_extra::extract::CookieJar;
use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use crate::config::AppConfig;

const SECURE_PREFIX: &str = "__Secure-";

/// Names and attributes of the auth cookies
#[derive(Debug, Clone)]
pub struct CookieSettings {
    session_token_name: String,
    session_data_name: String,
    secure: bool,
    session_max_age: i64,
    cache_max_age: i64,
}

impl CookieSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        let secure = config.should_use_secure_cookies();
        let prefix = if secure {
            format!("{}{}", SECURE_PREFIX, config.auth.cookie_prefix)
        } else {
            config.auth.cookie_prefix.clone()
        };

        Self {
            session_token_name: format!("{prefix}.session_token"),
            session_data_name: format!("{prefix}.session_data"),
            secure,
            session_max_age: config.auth.session.expires_in,
            cache_max_age: config.auth.session.cookie_cache.max_age,
        }
    }

    pub fn session_token_name(&self) -> &str {
        &self.session_token_name
    }

    pub fn session_data_name(&self) -> &str {
        &self.session_data_name
    }

    /// Signed session token cookie, lives as long as the session
    pub fn session_token_cookie(&self, signed_token: String) -> Cookie<'static> {
        self.build(
            self.session_token_name.clone(),
            signed_token,
            Duration::seconds(self.session_max_age),
        )
    }

    /// Session cache cookie, lives for the cache max age
    pub fn session_data_cookie(&self, encoded: String) -> Cookie<'static> {
        self.build(
            self.session_data_name.clone(),
            encoded,
            Duration::seconds(self.cache_max_age),
        )
    }

    fn build(&self, name: String, value: String, max_age: Duration) -> Cookie<'static> {
        Cookie::build((name, value))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(max_age)
            .build()
    }

    /// Expire both auth cookies
    pub fn clear(&self, jar: CookieJar) -> CookieJar {
        jar.add(self.removal(self.session_token_name.clone()))
            .add(self.removal(self.session_data_name.clone()))
    }

    fn removal(&self, name: String) -> Cookie<'static> {
        Cookie::build((name, ""))
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .path("/")
            .max_age(Duration::ZERO)
            .build()
    }
}
