//! Operator and relay authentication (spec section 4.4).
//!
//! Two independent credential kinds share this module: the operator JWT
//! (HS256, signed with `username || password` so rotating either
//! invalidates every token already issued) and the relay API key (an
//! opaque `sk-<app>-<random>` string resolved against
//! [`crate::core::cache::EntityCache`]). Grounded on the teacher's
//! `auth::jwt::JwtHandler`, stripped down to the single-operator, no-RBAC
//! scheme this system actually has.

use dashmap::DashMap;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use rand::distributions::Alphanumeric;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use crate::config::AuthConfig;
use crate::core::cache::EntityCache;
use crate::core::types::ApiKey;
use crate::utils::error::{GatewayError, Result};

const DAY_SECS: i64 = 24 * 60 * 60;
const LONG_TTL_DAYS: i64 = 30;
const STREAM_TOKEN_TTL: Duration = Duration::from_secs(30);

fn now_secs() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs() as i64
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iat: i64,
    pub nbf: i64,
    pub exp: i64,
}

/// Issues and verifies the single operator's session token. The signing
/// key is derived fresh from the current config on every call, so a
/// config reload that rotates `admin_username`/`admin_password` silently
/// invalidates every token signed under the old key.
pub struct OperatorAuth {
    username: String,
    password: String,
    default_ttl_minutes: i64,
    stream_tokens: DashMap<String, Instant>,
}

impl OperatorAuth {
    pub fn new(config: &AuthConfig) -> Self {
        Self {
            username: config.admin_username.clone(),
            password: config.admin_password.clone(),
            default_ttl_minutes: config.jwt_default_ttl_minutes,
            stream_tokens: DashMap::new(),
        }
    }

    /// Mints a short-lived, single-use token for the SSE log stream, which
    /// can't carry a bearer header (spec section 6).
    pub fn issue_stream_token(&self) -> String {
        let token: String = rand::thread_rng().sample_iter(&Alphanumeric).take(32).map(char::from).collect();
        self.stream_tokens.insert(token.clone(), Instant::now());
        token
    }

    /// Consumes `token` if it exists and hasn't expired; every call removes
    /// it, so a replayed token is always rejected.
    pub fn consume_stream_token(&self, token: &str) -> bool {
        match self.stream_tokens.remove(token) {
            Some((_, issued_at)) => issued_at.elapsed() < STREAM_TOKEN_TTL,
            None => false,
        }
    }

    fn encoding_key(&self) -> EncodingKey {
        EncodingKey::from_secret(self.signing_material().as_bytes())
    }

    fn decoding_key(&self) -> DecodingKey {
        DecodingKey::from_secret(self.signing_material().as_bytes())
    }

    fn signing_material(&self) -> String {
        format!("{}{}", self.username, self.password)
    }

    /// `username`/`password` are the caller-supplied login credentials to
    /// check against the configured operator account; `expires` follows
    /// spec section 4.4: `-1` means 30 days, any positive value is
    /// minutes, `None` uses the configured default.
    pub fn login(&self, username: &str, password: &str, expires: Option<i64>) -> Result<String> {
        if username != self.username || password != self.password {
            return Err(GatewayError::unauthorized("invalid username or password"));
        }
        self.issue_token(expires.unwrap_or(self.default_ttl_minutes))
    }

    fn issue_token(&self, expires: i64) -> Result<String> {
        let ttl_secs = if expires < 0 { LONG_TTL_DAYS * DAY_SECS } else { expires.max(1) * 60 };
        let now = now_secs();
        let claims = Claims { sub: self.username.clone(), iat: now, nbf: now, exp: now + ttl_secs };
        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key())?;
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims> {
        let validation = Validation::new(Algorithm::HS256);
        let data = decode::<Claims>(token, &self.decoding_key(), &validation)?;
        Ok(data.claims)
    }

    pub fn extract_bearer(header_value: &str) -> Option<&str> {
        header_value.strip_prefix("Bearer ")
    }
}

/// Which caller-facing wire shape a relay request arrived in, tagged from
/// which auth header was present: `x-api-key` means Anthropic, `Authorization:
/// Bearer` means OpenAI. `GET /v1/models` reads this to pick its response shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestFormat {
    OpenaiStyle,
    AnthropicStyle,
}

/// Resolves a caller-presented credential to its cached [`ApiKey`] and the
/// wire-format tag, in the enforcement order spec section 4.4 names:
/// lookup, `enabled`, expiry, cost cap.
pub fn authenticate_api_key(
    cache: &EntityCache,
    x_api_key: Option<&str>,
    authorization: Option<&str>,
) -> Result<(ApiKey, RequestFormat)> {
    let (presented, format) = match (x_api_key, authorization) {
        (Some(key), _) => (key.to_string(), RequestFormat::AnthropicStyle),
        (None, Some(header)) => {
            let token = OperatorAuth::extract_bearer(header)
                .ok_or_else(|| GatewayError::unauthorized("malformed Authorization header"))?;
            (token.to_string(), RequestFormat::OpenaiStyle)
        }
        (None, None) => return Err(GatewayError::unauthorized("missing API key")),
    };

    let key = cache.api_key(&presented).ok_or_else(|| GatewayError::unauthorized("unknown API key"))?;
    key.is_usable(now_secs()).map_err(GatewayError::unauthorized)?;
    Ok((key, format))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> AuthConfig {
        AuthConfig {
            admin_username: "admin".to_string(),
            admin_password: "s3cret".to_string(),
            app_name: "relay".to_string(),
            jwt_default_ttl_minutes: 15,
        }
    }

    #[test]
    fn login_rejects_wrong_credentials() {
        let auth = OperatorAuth::new(&config());
        assert!(auth.login("admin", "wrong", None).is_err());
    }

    #[test]
    fn login_issues_a_token_verifiable_by_the_same_key() {
        let auth = OperatorAuth::new(&config());
        let token = auth.login("admin", "s3cret", None).unwrap();
        let claims = auth.verify(&token).unwrap();
        assert_eq!(claims.sub, "admin");
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn rotating_the_password_invalidates_prior_tokens() {
        let auth = OperatorAuth::new(&config());
        let token = auth.login("admin", "s3cret", None).unwrap();
        let mut rotated = config();
        rotated.admin_password = "different".to_string();
        let rotated_auth = OperatorAuth::new(&rotated);
        assert!(rotated_auth.verify(&token).is_err());
    }

    #[test]
    fn negative_expires_means_thirty_days() {
        let auth = OperatorAuth::new(&config());
        let token = auth.login("admin", "s3cret", Some(-1)).unwrap();
        let claims = auth.verify(&token).unwrap();
        assert_eq!(claims.exp - claims.iat, LONG_TTL_DAYS * DAY_SECS);
    }

    #[test]
    fn extract_bearer_rejects_non_bearer_schemes() {
        assert_eq!(OperatorAuth::extract_bearer("Bearer abc"), Some("abc"));
        assert_eq!(OperatorAuth::extract_bearer("Basic abc"), None);
    }
}
