//! Session tokens and the session cookie cache
//!
//! The session cookie carries an opaque token signed with HMAC-SHA256.
//! The optional cache cookie carries the full session payload so reads can
//! skip the database until it expires.

use base64::{Engine as _, engine::general_purpose};
use chrono::Utc;
use hmac::{Hmac, Mac};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::config::{CookieCacheConfig, CookieCacheStrategy};
use crate::data::{Session, User};
use crate::error::AppError;

type HmacSha256 = Hmac<Sha256>;

/// Session as returned to clients by `get-session`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPayload {
    pub session: Session,
    pub user: User,
}

/// Generate a fresh opaque session token
pub fn generate_session_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn signature(value: &str, secret: &str) -> Result<Vec<u8>, AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Encryption(e.to_string()))?;
    mac.update(value.as_bytes());
    Ok(mac.finalize().into_bytes().to_vec())
}

fn verify_signature(value: &str, signature_b64: &str, secret: &str) -> Result<(), AppError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| AppError::Encryption(e.to_string()))?;
    mac.update(value.as_bytes());

    let expected = general_purpose::URL_SAFE_NO_PAD
        .decode(signature_b64)
        .map_err(|_| AppError::InvalidSignature)?;

    mac.verify_slice(&expected)
        .map_err(|_| AppError::InvalidSignature)
}

/// Sign a cookie value
///
/// Format: `{value}.{base64url(hmac_sha256(value))}`
pub fn sign_value(value: &str, secret: &str) -> Result<String, AppError> {
    let signature_b64 = general_purpose::URL_SAFE_NO_PAD.encode(signature(value, secret)?);
    Ok(format!("{}.{}", value, signature_b64))
}

/// Verify a value produced by [`sign_value`] and return the inner value
///
/// # Errors
/// `InvalidSignature` if the value is malformed or the signature does not match
pub fn verify_signed_value(signed: &str, secret: &str) -> Result<String, AppError> {
    let (value, signature_b64) = signed.rsplit_once('.').ok_or(AppError::InvalidSignature)?;
    if value.is_empty() {
        return Err(AppError::InvalidSignature);
    }
    verify_signature(value, signature_b64, secret)?;
    Ok(value.to_string())
}

/// Claims stored in the cache cookie
#[derive(Debug, Serialize, Deserialize)]
struct CachedSession {
    #[serde(flatten)]
    payload: SessionPayload,
    iat: i64,
    exp: i64,
}

/// Encoder/decoder for the session cache cookie
#[derive(Clone)]
pub struct CookieCache {
    enabled: bool,
    strategy: CookieCacheStrategy,
    max_age: i64,
    secret: String,
}

impl std::fmt::Debug for CookieCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieCache")
            .field("enabled", &self.enabled)
            .field("strategy", &self.strategy)
            .field("max_age", &self.max_age)
            .finish()
    }
}

impl CookieCache {
    pub fn new(config: &CookieCacheConfig, secret: &str) -> Self {
        Self {
            enabled: config.enabled,
            strategy: config.strategy,
            max_age: config.max_age,
            secret: secret.to_string(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Encode a payload valid for `max_age` seconds from now
    pub fn encode(&self, payload: &SessionPayload) -> Result<String, AppError> {
        self.encode_at(payload, Utc::now().timestamp())
    }

    fn encode_at(&self, payload: &SessionPayload, issued_at: i64) -> Result<String, AppError> {
        let claims = CachedSession {
            payload: payload.clone(),
            iat: issued_at,
            exp: issued_at + self.max_age,
        };

        match self.strategy {
            CookieCacheStrategy::Jwt => {
                use jsonwebtoken::{EncodingKey, Header, encode};

                encode(
                    &Header::default(),
                    &claims,
                    &EncodingKey::from_secret(self.secret.as_bytes()),
                )
                .map_err(|e| AppError::Encryption(format!("Failed to encode session cache: {e}")))
            }
            CookieCacheStrategy::Compact => {
                let json = serde_json::to_string(&claims)
                    .map_err(|e| AppError::Internal(e.into()))?;
                let payload_b64 = general_purpose::URL_SAFE_NO_PAD.encode(json.as_bytes());
                sign_value(&payload_b64, &self.secret)
            }
        }
    }

    /// Decode a cache cookie
    ///
    /// # Errors
    /// `InvalidSignature` on tampering, `Unauthorized` when the cache entry
    /// or the session inside it has expired.
    pub fn decode(&self, value: &str) -> Result<SessionPayload, AppError> {
        let claims = match self.strategy {
            CookieCacheStrategy::Jwt => {
                use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};

                let mut validation = Validation::new(Algorithm::HS256);
                validation.leeway = 0;

                decode::<CachedSession>(
                    value,
                    &DecodingKey::from_secret(self.secret.as_bytes()),
                    &validation,
                )
                .map_err(|e| match e.kind() {
                    ErrorKind::ExpiredSignature => AppError::Unauthorized,
                    _ => AppError::InvalidSignature,
                })?
                .claims
            }
            CookieCacheStrategy::Compact => {
                let payload_b64 = verify_signed_value(value, &self.secret)?;
                let json = general_purpose::URL_SAFE_NO_PAD
                    .decode(payload_b64)
                    .map_err(|_| AppError::InvalidSignature)?;
                serde_json::from_slice::<CachedSession>(&json)
                    .map_err(|_| AppError::InvalidSignature)?
            }
        };

        if claims.exp <= Utc::now().timestamp() || claims.payload.session.is_expired() {
            return Err(AppError::Unauthorized);
        }

        Ok(claims.payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    const SECRET: &str = "test-secret-key-32-bytes-long!!!";

    fn payload() -> SessionPayload {
        let now = Utc::now();
        SessionPayload {
            session: Session {
                id: "session-1".to_string(),
                token: "token-1".to_string(),
                user_id: "user-1".to_string(),
                expires_at: now + Duration::days(7),
                ip_address: None,
                user_agent: None,
                created_at: now,
                updated_at: now,
            },
            user: User {
                id: "user-1".to_string(),
                name: "Ada".to_string(),
                email: "a@b.com".to_string(),
                email_verified: true,
                image: None,
                created_at: now,
                updated_at: now,
            },
        }
    }

    fn cache(strategy: CookieCacheStrategy) -> CookieCache {
        CookieCache::new(
            &CookieCacheConfig {
                enabled: true,
                max_age: 300,
                strategy,
            },
            SECRET,
        )
    }

    #[test]
    fn signed_value_verifies() {
        let signed = sign_value("abc", SECRET).unwrap();
        assert_eq!(verify_signed_value(&signed, SECRET).unwrap(), "abc");
    }

    #[test]
    fn signed_value_rejects_wrong_secret_and_tampering() {
        let signed = sign_value("abc", SECRET).unwrap();
        assert!(matches!(
            verify_signed_value(&signed, "another-secret-that-is-32-bytes!"),
            Err(AppError::InvalidSignature)
        ));

        let tampered = signed.replacen("abc", "abd", 1);
        assert!(verify_signed_value(&tampered, SECRET).is_err());
        assert!(verify_signed_value("no-signature", SECRET).is_err());
    }

    #[test]
    fn session_tokens_are_unique_and_url_safe() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert_ne!(a, b);
        assert!(
            a.chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        );
    }

    #[test]
    fn jwt_cache_decodes_fresh_payload() {
        let cache = cache(CookieCacheStrategy::Jwt);
        let encoded = cache.encode(&payload()).unwrap();
        assert_eq!(encoded.matches('.').count(), 2);
        assert_eq!(cache.decode(&encoded).unwrap().user.email, "a@b.com");
    }

    #[test]
    fn compact_cache_decodes_fresh_payload() {
        let cache = cache(CookieCacheStrategy::Compact);
        let original = payload();
        let encoded = cache.encode(&original).unwrap();
        assert_eq!(cache.decode(&encoded).unwrap(), original);
    }

    #[test]
    fn stale_cache_entries_are_rejected() {
        for strategy in [CookieCacheStrategy::Jwt, CookieCacheStrategy::Compact] {
            let cache = cache(strategy);
            let issued_long_ago = Utc::now().timestamp() - 301;
            let encoded = cache.encode_at(&payload(), issued_long_ago).unwrap();
            assert!(
                matches!(cache.decode(&encoded), Err(AppError::Unauthorized)),
                "{strategy:?} cache should expire after max_age"
            );
        }
    }

    #[test]
    fn cache_rejects_expired_session_inside_fresh_entry() {
        let cache = cache(CookieCacheStrategy::Jwt);
        let mut expired = payload();
        expired.session.expires_at = Utc::now() - Duration::seconds(1);

        let encoded = cache.encode(&expired).unwrap();
        assert!(cache.decode(&encoded).is_err());
    }

    #[test]
    fn cache_rejects_foreign_secret() {
        let encoded = cache(CookieCacheStrategy::Jwt).encode(&payload()).unwrap();
        let other = CookieCache::new(
            &CookieCacheConfig {
                enabled: true,
                max_age: 300,
                strategy: CookieCacheStrategy::Jwt,
            },
            "another-secret-that-is-32-bytes!",
        );
        assert!(matches!(
            other.decode(&encoded),
            Err(AppError::InvalidSignature)
        ));
    }
}
