//! Signed identity tokens.
//!
//! A token is `base64url(header).base64url(claims).base64url(signature)`, where
//! the signature is HMAC-SHA256 over the first two segments joined by `.`.
//! Only `HS256` is ever produced or accepted.

use crate::config::ConfigError;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

pub const ALGORITHM: &str = "HS256";
pub const DEFAULT_TTL: Duration = Duration::from_secs(3600);

const HEADER_JSON: &str = r#"{"alg":"HS256","typ":"JWT"}"#;
const RESERVED_CLAIMS: [&str; 3] = ["sub", "iat", "exp"];

#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("malformed token")]
    MalformedToken,
    #[error("token signature mismatch")]
    BadSignature,
    #[error("token expired")]
    TokenExpired,
    #[error("missing bearer credential")]
    MissingCredential,
}

impl TokenError {
    /// Error code exposed at the HTTP boundary.
    pub fn code(&self) -> &'static str {
        match self {
            TokenError::MissingCredential => "UNAUTHENTICATED",
            _ => "UNAUTHORIZED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Claims {
    pub fn new(subject: impl Into<String>) -> Self {
        Self {
            sub: subject.into(),
            iat: None,
            exp: None,
            extra: Map::new(),
        }
    }

    /// Adds a custom claim. Names owned by the token itself (`sub`, `iat`,
    /// `exp`) are ignored.
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let name = name.into();
        if !RESERVED_CLAIMS.contains(&name.as_str()) {
            self.extra.insert(name, value.into());
        }
        self
    }

    fn to_json(&self) -> String {
        let mut object = self.extra.clone();
        object.insert("sub".to_string(), Value::from(self.sub.clone()));
        if let Some(iat) = self.iat {
            object.insert("iat".to_string(), Value::from(iat));
        }
        if let Some(exp) = self.exp {
            object.insert("exp".to_string(), Value::from(exp));
        }
        Value::Object(object).to_string()
    }
}

#[derive(Deserialize)]
struct Header {
    alg: String,
}

/// Mints and verifies tokens with one process-wide secret.
#[derive(Clone)]
pub struct TokenService {
    mac: HmacSha256,
    default_ttl: Duration,
}

impl fmt::Debug for TokenService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenService")
            .field("secret", &"[REDACTED]")
            .field("default_ttl", &self.default_ttl)
            .finish()
    }
}

impl TokenService {
    pub fn new(secret: &[u8], default_ttl: Duration) -> Result<Self, ConfigError> {
        if secret.is_empty() {
            return Err(ConfigError::InvalidSecret("must not be empty".to_string()));
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| ConfigError::InvalidSecret(e.to_string()))?;
        Ok(Self { mac, default_ttl })
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    pub fn mint(&self, claims: Claims, ttl: Option<Duration>) -> String {
        self.mint_at(claims, ttl, unix_now())
    }

    /// Mints a token as if the current time were `now` (Unix seconds).
    pub fn mint_at(&self, mut claims: Claims, ttl: Option<Duration>, now: u64) -> String {
        let ttl = ttl.unwrap_or(self.default_ttl);
        claims.iat = Some(now);
        claims.exp = Some(now.saturating_add(ttl.as_secs()));

        let header = URL_SAFE_NO_PAD.encode(HEADER_JSON);
        let payload = URL_SAFE_NO_PAD.encode(claims.to_json());
        let signature = self.sign(&header, &payload);

        format!("{header}.{payload}.{signature}")
    }

    pub fn verify(&self, token: &str) -> Result<Claims, TokenError> {
        self.verify_at(token, unix_now())
    }

    /// Verifies a token as if the current time were `now` (Unix seconds).
    pub fn verify_at(&self, token: &str, now: u64) -> Result<Claims, TokenError> {
        let mut parts = token.split('.');
        let (Some(header), Some(payload), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::MalformedToken);
        };
        if header.is_empty() || payload.is_empty() || signature.is_empty() {
            return Err(TokenError::MalformedToken);
        }

        let expected = self.sign(header, payload);
        if !bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            return Err(TokenError::BadSignature);
        }

        let header: Header = decode_segment(header)?;
        if header.alg != ALGORITHM {
            return Err(TokenError::MalformedToken);
        }

        let claims: Claims = decode_segment(payload)?;
        if let Some(exp) = claims.exp
            && now > exp
        {
            return Err(TokenError::TokenExpired);
        }

        Ok(claims)
    }

    fn sign(&self, header: &str, payload: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(header.as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes())
    }
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, TokenError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|_| TokenError::MalformedToken)?;
    serde_json::from_slice(&bytes).map_err(|_| TokenError::MalformedToken)
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
