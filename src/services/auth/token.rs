use std::collections::BTreeSet;
use std::{error::Error as StdError, fmt};

use chrono::{DateTime, TimeZone, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;

pub const BEARER_PREFIX: &str = "Bearer ";

// Errors returned by bearer-token parsing and verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerificationError {
    Malformed,
    UnsupportedAlgorithm,
    SignatureInvalid,
    Expired,
    ClaimMissing(&'static str),
}

impl fmt::Display for VerificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "malformed token"),
            Self::UnsupportedAlgorithm => write!(f, "unsupported signing algorithm"),
            Self::SignatureInvalid => write!(f, "token signature mismatch"),
            Self::Expired => write!(f, "token expired"),
            Self::ClaimMissing(name) => write!(f, "missing '{}' claim", name),
        }
    }
}

impl StdError for VerificationError {}

impl From<jsonwebtoken::errors::Error> for VerificationError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        match e.kind() {
            ErrorKind::InvalidSignature => Self::SignatureInvalid,
            ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
                Self::UnsupportedAlgorithm
            }
            ErrorKind::ExpiredSignature => Self::Expired,
            _ => Self::Malformed,
        }
    }
}

/// A compact JWS taken from an `Authorization: Bearer` header.
///
/// Holding one only proves the shape (`header.payload.signature`, all segments
/// non-empty); nothing about it has been verified yet.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn parse(raw: &str) -> Result<Self, VerificationError> {
        let mut segments = 0;
        for segment in raw.split('.') {
            if segment.is_empty() {
                return Err(VerificationError::Malformed);
            }
            segments += 1;
        }
        if segments != 3 {
            return Err(VerificationError::Malformed);
        }
        Ok(Self(raw.to_owned()))
    }

    /// Extracts the token from a full `Authorization` header value.
    pub fn from_authorization(value: &str) -> Option<Self> {
        let raw = value.strip_prefix(BEARER_PREFIX)?;
        Self::parse(raw).ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The header value this token was presented with (`Bearer <token>`).
    pub fn authorization_value(&self) -> String {
        format!("{}{}", BEARER_PREFIX, self.0)
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print credentials
        f.write_str("BearerToken(..)")
    }
}

#[derive(Debug, Deserialize)]
struct RawClaims {
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    id: Option<serde_json::Value>,
    #[serde(default)]
    iat: Option<i64>,
    #[serde(default)]
    exp: Option<i64>,
    #[serde(default)]
    authorities: Option<Vec<String>>,
}

/// Claims of a token whose signature and expiry have been checked.
///
/// Only [`TokenVerifier`] constructs this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    subject: String,
    user_id: i64,
    issued_at: Option<DateTime<Utc>>,
    expires_at: DateTime<Utc>,
    authorities: BTreeSet<String>,
}

impl TokenClaims {
    /// The `sub` claim; by convention the account email.
    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn authorities(&self) -> &BTreeSet<String> {
        &self.authorities
    }
}

/// HS256 shared-secret verifier.
///
/// - Key material is intentionally not printable via Debug.
/// - Expiry is checked here against an explicit clock, not by jsonwebtoken,
///   so `now >= exp` is rejected with no leeway.
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("algorithms", &self.validation.algorithms)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier {
    pub fn new(secret: &[u8]) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();
        validation.leeway = 0;

        Self {
            decoding_key: DecodingKey::from_secret(secret),
            validation,
        }
    }

    pub fn verify(&self, token: &BearerToken) -> Result<TokenClaims, VerificationError> {
        self.verify_at(token, Utc::now())
    }

    /// Same as [`verify`](Self::verify) with the clock supplied by the caller.
    pub fn verify_at(
        &self,
        token: &BearerToken,
        now: DateTime<Utc>,
    ) -> Result<TokenClaims, VerificationError> {
        let data =
            jsonwebtoken::decode::<RawClaims>(token.as_str(), &self.decoding_key, &self.validation)?;
        let claims = data.claims;

        let subject = claims
            .sub
            .filter(|s| !s.trim().is_empty())
            .ok_or(VerificationError::ClaimMissing("sub"))?;
        let user_id = claims
            .id
            .as_ref()
            .and_then(serde_json::Value::as_i64)
            .ok_or(VerificationError::ClaimMissing("id"))?;

        let exp = claims.exp.ok_or(VerificationError::ClaimMissing("exp"))?;
        let expires_at = timestamp(exp)?;
        if now >= expires_at {
            return Err(VerificationError::Expired);
        }

        let issued_at = claims.iat.map(timestamp).transpose()?;

        Ok(TokenClaims {
            subject,
            user_id,
            issued_at,
            expires_at,
            authorities: claims.authorities.unwrap_or_default().into_iter().collect(),
        })
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, VerificationError> {
    Utc.timestamp_opt(secs, 0)
        .single()
        .ok_or(VerificationError::Malformed)
}
