use std::time::Duration;

use chrono::{DateTime, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
struct IssuedClaims<'a> {
    sub: &'a str,
    email: &'a str,
    id: i64,
    #[serde(skip_serializing_if = "is_empty")]
    authorities: &'a [String],
    iat: i64,
    exp: i64,
}

fn is_empty(authorities: &&[String]) -> bool {
    authorities.is_empty()
}

/// Signs HS256 access tokens in the layout [`TokenVerifier`](super::TokenVerifier) accepts.
///
/// The gateway itself never issues tokens on the request path; this exists for
/// the `token-gen` tool and for tests.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    ttl: Duration,
}

impl TokenIssuer {
    pub fn new(secret: &[u8], ttl: Duration) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            ttl,
        }
    }

    pub fn issue(
        &self,
        email: &str,
        user_id: i64,
        authorities: &[String],
    ) -> Result<String, jsonwebtoken::errors::Error> {
        self.issue_at(email, user_id, authorities, Utc::now())
    }

    pub fn issue_at(
        &self,
        email: &str,
        user_id: i64,
        authorities: &[String],
        now: DateTime<Utc>,
    ) -> Result<String, jsonwebtoken::errors::Error> {
        let iat = now.timestamp();
        let exp = iat.saturating_add(i64::try_from(self.ttl.as_secs()).unwrap_or(i64::MAX));

        let claims = IssuedClaims {
            sub: email,
            email,
            id: user_id,
            authorities,
            iat,
            exp,
        };

        let mut header = Header::new(Algorithm::HS256);
        header.typ = Some("JWT".to_string());
        jsonwebtoken::encode(&header, &claims, &self.encoding_key).map_err(|e| {
            error!(error = %e, "failed to sign JWT");
            e
        })
    }
}
