/*
 * Responsibility
 * - 認証済み主体 (CallerIdentity) と identity service の応答型
 * - fallback の「値」を明示する型 (TokenValidity / Extracted / Cause)
 */
use std::collections::BTreeSet;
use std::fmt;

use serde::Deserialize;

/// Identity attached to one authenticated request.
///
/// Lives in the request's extensions and is dropped with the request; it is
/// never cached or shared between requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub user_id: i64,
    pub email: String,
    pub authorities: BTreeSet<String>,
}

/// Account record served by the identity service's detail lookup.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserDetails {
    pub email: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub authorities: Vec<String>,
}

fn enabled_by_default() -> bool {
    true
}

/// Why the identity service could not be consulted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outage {
    CircuitOpen,
    Timeout,
    Failed,
}

impl fmt::Display for Outage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outage::CircuitOpen => write!(f, "circuit open"),
            Outage::Timeout => write!(f, "timeout"),
            Outage::Failed => write!(f, "call failed"),
        }
    }
}

/// Where a negative answer came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    /// The identity service answered and said no.
    Reported,
    /// The identity service was not reachable; this is a fallback value.
    Outage(Outage),
}

/// Result of token validation. Fallbacks resolve to `Invalid`, never `Valid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenValidity {
    Valid,
    Invalid(Cause),
}

/// Result of a claim extraction. `Absent` is an explicit marker, not a blank value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted<T> {
    Present(T),
    Absent(Cause),
}
