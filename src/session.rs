//! Binary authorised / not-authorised gate for the HTTP surface.
//!
//! A session token is `<user>.<expires_unix>.<hex hmac-sha256>` signed with
//! the server secret. The token carries no other claims; holding a valid
//! unexpired token is the whole authorisation decision.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::config::SessionConfig;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "session";

pub struct SessionGate {
    secret: Vec<u8>,
    lifetime: Duration,
    operator_user: String,
    operator_password: String,
}

impl SessionGate {
    pub fn new(
        secret: impl Into<Vec<u8>>,
        lifetime: Duration,
        operator_user: impl Into<String>,
        operator_password: impl Into<String>,
    ) -> Self {
        Self {
            secret: secret.into(),
            lifetime,
            operator_user: operator_user.into(),
            operator_password: operator_password.into(),
        }
    }

    /// Build the gate from `[session]`, reading secrets from the environment.
    pub fn from_config(config: &SessionConfig) -> Result<Self> {
        let secret = std::env::var(&config.secret_env)
            .with_context(|| format!("{} environment variable not set", config.secret_env))?;
        if secret.len() < 16 {
            anyhow::bail!("{} must be at least 16 bytes", config.secret_env);
        }
        let password = std::env::var(&config.operator_password_env).with_context(|| {
            format!("{} environment variable not set", config.operator_password_env)
        })?;
        Ok(Self::new(
            secret,
            Duration::minutes(config.lifetime_minutes),
            config.operator_user.clone(),
            password,
        ))
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Check operator credentials. Comparison goes through the MAC so its
    /// timing does not depend on where the inputs differ.
    pub fn check_credentials(&self, user: &str, password: &str) -> bool {
        let expected = self.sign(&credential_bytes(&self.operator_user, &self.operator_password));
        let mut mac = self.mac();
        mac.update(&credential_bytes(user, password));
        mac.verify_slice(&expected).is_ok()
    }

    pub fn issue(&self, user: &str, now: DateTime<Utc>) -> String {
        let expires = (now + self.lifetime).timestamp();
        let payload = format!("{}.{}", user, expires);
        let sig = hex::encode(self.sign(payload.as_bytes()));
        format!("{}.{}", payload, sig)
    }

    pub fn verify(&self, token: &str, now: DateTime<Utc>) -> bool {
        let mut parts = token.rsplitn(3, '.');
        let (Some(sig), Some(expires), Some(user)) = (parts.next(), parts.next(), parts.next())
        else {
            return false;
        };
        if !is_token_safe_user(user) {
            return false;
        }
        let Ok(expires) = expires.parse::<i64>() else {
            return false;
        };
        let Ok(sig) = hex::decode(sig) else {
            return false;
        };
        let mut mac = self.mac();
        mac.update(format!("{}.{}", user, expires).as_bytes());
        mac.verify_slice(&sig).is_ok() && now.timestamp() < expires
    }

    fn mac(&self) -> HmacSha256 {
        HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size")
    }

    fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut mac = self.mac();
        mac.update(data);
        mac.finalize().into_bytes().to_vec()
    }
}

/// Length-prefixed so no split of one string into user and password
/// collides with another.
fn credential_bytes(user: &str, password: &str) -> Vec<u8> {
    format!("{}:{}{}", user.len(), user, password).into_bytes()
}

/// A user name that can sit inside a session token and a cookie value:
/// non-empty printable ASCII without whitespace, `;`, `,`, `"` or `\`.
/// Dots are fine; the token is split from the right.
pub fn is_token_safe_user(user: &str) -> bool {
    !user.is_empty()
        && user
            .chars()
            .all(|c| c.is_ascii_graphic() && !matches!(c, ';' | ',' | '"' | '\\'))
}

/// Pull the session token out of a `Cookie` header value.
pub fn token_from_cookie_header(header: &str) -> Option<&str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value)
}
