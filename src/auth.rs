//! Stateless signed session tokens.
//!
//! # Wire format
//!
//! ```text
//! base64url(header) . base64url(claims) . base64url(hmac-sha256(header "." claims))
//! ```
//!
//! The header is fixed to `{"alg":"HS256","typ":"JWT"}`; claims are a flat
//! JSON object plus a numeric `exp` (seconds since the Unix epoch).
//!
//! # Trade-off
//!
//! Nothing is stored server-side. Verification is a pure function of the
//! token, the clock and the secret, which means a token cannot be revoked
//! before it expires. Keep lifetimes short.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::{AuthConfig, ConfigError};

type HmacSha256 = Hmac<Sha256>;

const HEADER: &str = r#"{"alg":"HS256","typ":"JWT"}"#;
const ALGORITHM: &str = "HS256";

/// Reserved claim holding the expiry. Overwritten on issue, stripped on verify.
pub const EXPIRY_CLAIM: &str = "exp";

/// Conventional subject claim.
pub const SUBJECT_CLAIM: &str = "sub";

/// Why a token was not accepted.
///
/// The variants stay distinct for logging even though the outcome shown to
/// clients collapses all of them into one message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("token missing")]
    Missing,

    #[error("token malformed: {0}")]
    Malformed(&'static str),

    #[error("token signature mismatch")]
    SignatureMismatch,

    #[error("token expired at {expired_at}")]
    Expired { expired_at: u64 },

    #[error("token lacks required claim `{0}`")]
    MissingClaim(String),

    #[error("claims cannot be encoded: {0}")]
    UnserializableClaims(String),
}

impl AuthError {
    /// Short machine-readable reason for log fields.
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Missing => "missing",
            Self::Malformed(_) => "malformed",
            Self::SignatureMismatch => "signature_mismatch",
            Self::Expired { .. } => "expired",
            Self::MissingClaim(_) => "missing_claim",
            Self::UnserializableClaims(_) => "unserializable_claims",
        }
    }
}

// ── Claims ────────────────────────────────────────────────────────────────────

/// A flat key → value claim set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a claim. Returns `self` for chaining.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    pub fn subject(&self) -> Option<&str> {
        self.get_str(SUBJECT_CLAIM)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

// ── Token ─────────────────────────────────────────────────────────────────────

/// An issued token. Opaque to everyone but the authenticator.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Token(String);

impl Token {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Token> for String {
    fn from(t: Token) -> Self {
        t.0
    }
}

// ── Authenticator ─────────────────────────────────────────────────────────────

/// Issues and verifies tokens with one process-wide secret.
#[derive(Clone)]
pub struct TokenAuthenticator {
    mac: HmacSha256,
    required: Vec<String>,
}

impl fmt::Debug for TokenAuthenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenAuthenticator")
            .field("secret", &"<redacted>")
            .field("required", &self.required)
            .finish()
    }
}

impl TokenAuthenticator {
    /// Fails only for an empty secret.
    pub fn new(secret: impl AsRef<[u8]>) -> Result<Self, ConfigError> {
        let secret = secret.as_ref();
        if secret.is_empty() {
            return Err(ConfigError::invalid("auth.secret must not be empty"));
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|_| ConfigError::invalid("auth.secret has an unusable length"))?;
        Ok(Self { mac, required: Vec::new() })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self, ConfigError> {
        let authenticator = Self::new(&config.secret)?;
        Ok(config.required_claims.iter().fold(authenticator, |a, c| a.require_claim(c.as_str())))
    }

    /// Tokens lacking `claim` fail verification with [`AuthError::MissingClaim`].
    pub fn require_claim(mut self, claim: impl Into<String>) -> Self {
        self.required.push(claim.into());
        self
    }

    pub fn issue(&self, claims: &Claims, ttl: Duration) -> Result<Token, AuthError> {
        self.issue_at(claims, ttl, SystemTime::now())
    }

    /// Issues a token as if the clock read `now`.
    ///
    /// Expiry has whole-second resolution: `exp = now + ttl` rounded up, so
    /// a token never expires before its full `ttl` has passed. A `ttl` too
    /// large for the clock saturates.
    /// Claims must be scalars; nested arrays or objects are rejected.
    pub fn issue_at(&self, claims: &Claims, ttl: Duration, now: SystemTime) -> Result<Token, AuthError> {
        let mut payload = Map::with_capacity(claims.len() + 1);
        for (key, value) in claims.iter() {
            if value.is_array() || value.is_object() {
                return Err(AuthError::UnserializableClaims(format!("claim `{key}` is not a scalar")));
            }
            payload.insert(key.clone(), value.clone());
        }
        payload.insert(EXPIRY_CLAIM.to_owned(), Value::from(ceil_secs(since_epoch(now).saturating_add(ttl))));

        let claims_json = serde_json::to_vec(&Value::Object(payload))
            .map_err(|e| AuthError::UnserializableClaims(e.to_string()))?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(HEADER),
            URL_SAFE_NO_PAD.encode(claims_json)
        );
        let signature = URL_SAFE_NO_PAD.encode(self.sign(signing_input.as_bytes()));
        Ok(Token(format!("{signing_input}.{signature}")))
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.verify_at(token, SystemTime::now())
    }

    /// Verifies `token` as if the clock read `now`.
    ///
    /// Checks run in a fixed order: shape, header, signature, claims,
    /// expiry, required claims. An undecodable signature segment counts as
    /// a signature mismatch.
    pub fn verify_at(&self, token: &str, now: SystemTime) -> Result<Claims, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::Missing);
        }

        let mut segments = token.split('.');
        let (Some(header), Some(claims), Some(signature), None) =
            (segments.next(), segments.next(), segments.next(), segments.next())
        else {
            return Err(AuthError::Malformed("expected three segments"));
        };

        let header_json = decode_object(header).ok_or(AuthError::Malformed("header"))?;
        if header_json.get("alg").and_then(Value::as_str) != Some(ALGORITHM) {
            return Err(AuthError::Malformed("unsupported algorithm"));
        }

        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| AuthError::SignatureMismatch)?;
        let expected = self.sign(format!("{header}.{claims}").as_bytes());
        if !bool::from(expected.as_slice().ct_eq(provided.as_slice())) {
            return Err(AuthError::SignatureMismatch);
        }

        let mut claims = decode_object(claims).ok_or(AuthError::Malformed("claims"))?;
        let expires_at = claims
            .remove(EXPIRY_CLAIM)
            .and_then(|v| v.as_u64())
            .ok_or(AuthError::Malformed("expiry"))?;
        if since_epoch(now) >= Duration::from_secs(expires_at) {
            return Err(AuthError::Expired { expired_at: expires_at });
        }

        if let Some(missing) = self.required.iter().find(|c| !claims.contains_key(c.as_str())) {
            return Err(AuthError::MissingClaim(missing.clone()));
        }

        Ok(Claims(claims))
    }

    fn sign(&self, input: &[u8]) -> Vec<u8> {
        let mut mac = self.mac.clone();
        mac.update(input);
        mac.finalize().into_bytes().to_vec()
    }
}

fn decode_object(segment: &str) -> Option<Map<String, Value>> {
    let bytes = URL_SAFE_NO_PAD.decode(segment).ok()?;
    match serde_json::from_slice(&bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

fn since_epoch(t: SystemTime) -> Duration {
    t.duration_since(UNIX_EPOCH).unwrap_or(Duration::ZERO)
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs().saturating_add(u64::from(d.subsec_nanos() > 0))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(600);

    fn authenticator() -> TokenAuthenticator {
        TokenAuthenticator::new("token!Q@W3e4r").unwrap()
    }

    fn claims() -> Claims {
        Claims::new().with("id", 1).with("userName", "zufeng").with(SUBJECT_CLAIM, "1")
    }

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    #[test]
    fn round_trip_before_expiry() {
        let auth = authenticator();
        let token = auth.issue_at(&claims(), TTL, at(1_000)).unwrap();
        assert_eq!(token.as_str().split('.').count(), 3);
        assert_eq!(auth.verify_at(token.as_str(), at(1_599)), Ok(claims()));
    }

    #[test]
    fn expired_once_ttl_elapses() {
        let auth = authenticator();
        let token = auth.issue_at(&claims(), TTL, at(1_000)).unwrap();
        assert_eq!(
            auth.verify_at(token.as_str(), at(1_600)),
            Err(AuthError::Expired { expired_at: 1_600 })
        );
    }

    #[test]
    fn sub_second_issue_time_never_shortens_the_ttl() {
        let auth = authenticator();
        let issued = at(1_000) + Duration::from_millis(900);
        let token = auth.issue_at(&claims(), Duration::from_secs(1), issued).unwrap();
        assert!(auth.verify_at(token.as_str(), at(1_001)).is_ok());
        assert!(auth.verify_at(token.as_str(), issued + Duration::from_secs(1)).is_ok());
        assert_eq!(
            auth.verify_at(token.as_str(), at(1_002)),
            Err(AuthError::Expired { expired_at: 1_002 })
        );
    }

    #[test]
    fn sub_second_ttl_is_valid_when_issued() {
        let auth = authenticator();
        let token = auth.issue_at(&claims(), Duration::from_millis(500), at(1_000)).unwrap();
        assert!(auth.verify_at(token.as_str(), at(1_000)).is_ok());
        assert!(auth.verify_at(token.as_str(), at(1_001)).is_err());
    }

    #[test]
    fn huge_ttl_saturates_instead_of_overflowing() {
        let auth = authenticator();
        let token = auth.issue(&claims(), Duration::MAX).unwrap();
        assert_eq!(auth.verify(token.as_str()), Ok(claims()));

        let config_ttl = Duration::from_secs(u64::MAX);
        assert!(auth.issue_at(&claims(), config_ttl, at(1_000)).is_ok());
    }

    #[test]
    fn any_tampered_signature_byte_is_a_mismatch() {
        let auth = authenticator();
        let token = auth.issue_at(&claims(), TTL, at(1_000)).unwrap().into_string();
        let sig_start = token.rfind('.').unwrap() + 1;

        for i in sig_start..token.len() {
            let mut bytes = token.clone().into_bytes();
            bytes[i] = if bytes[i] == b'A' { b'B' } else { b'A' };
            let tampered = String::from_utf8(bytes).unwrap();
            assert_eq!(
                auth.verify_at(&tampered, at(1_001)),
                Err(AuthError::SignatureMismatch),
                "byte {i} of the signature"
            );
        }
    }

    #[test]
    fn another_secret_is_a_mismatch() {
        let token = authenticator().issue_at(&claims(), TTL, at(0)).unwrap();
        let other = TokenAuthenticator::new("someone else").unwrap();
        assert_eq!(other.verify_at(token.as_str(), at(1)), Err(AuthError::SignatureMismatch));
    }

    #[test]
    fn tampered_claims_fail_the_signature() {
        let auth = authenticator();
        let token = auth.issue_at(&claims(), TTL, at(0)).unwrap().into_string();
        let parts: Vec<&str> = token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(r#"{"id":2,"exp":99999999999}"#);
        let forged_token = format!("{}.{}.{}", parts[0], forged, parts[2]);
        assert_eq!(auth.verify_at(&forged_token, at(1)), Err(AuthError::SignatureMismatch));
    }

    #[test]
    fn structural_corruption_is_malformed() {
        let auth = authenticator();
        assert_eq!(auth.verify_at("", at(0)), Err(AuthError::Missing));
        assert_eq!(
            auth.verify_at("a.b", at(0)),
            Err(AuthError::Malformed("expected three segments"))
        );
        assert_eq!(
            auth.verify_at("!!.e30.AAAA", at(0)),
            Err(AuthError::Malformed("header"))
        );

        let none_alg = URL_SAFE_NO_PAD.encode(r#"{"alg":"none"}"#);
        assert_eq!(
            auth.verify_at(&format!("{none_alg}.e30."), at(0)),
            Err(AuthError::Malformed("unsupported algorithm"))
        );
    }

    #[test]
    fn required_claims_are_enforced() {
        let issuer = authenticator();
        let token = issuer.issue_at(&Claims::new().with("id", 7), TTL, at(0)).unwrap();
        let strict = authenticator().require_claim("userName");
        assert_eq!(
            strict.verify_at(token.as_str(), at(1)),
            Err(AuthError::MissingClaim("userName".into()))
        );
    }

    #[test]
    fn nested_claims_cannot_be_issued() {
        let nested = Claims::new().with("roles", serde_json::json!(["admin"]));
        assert!(matches!(
            authenticator().issue(&nested, TTL),
            Err(AuthError::UnserializableClaims(_))
        ));
    }

    #[test]
    fn empty_secret_is_rejected() {
        assert!(TokenAuthenticator::new("").is_err());
    }
}
