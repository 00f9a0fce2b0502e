/*
 * Responsibility
 * - 環境変数の読み込み (JWT secret, public paths, identity mode, circuit breaker, upstream)
 * - 設定値のバリデーション (不足なら起動失敗)
 */
use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::services::resilience::CircuitConfig;

const DEFAULT_PUBLIC_PATHS: &[&str] = &["/api/auth/register", "/api/auth/login"];
const MIN_SECRET_BYTES: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnv {
    Development,
    Production,
}

impl AppEnv {
    fn parse(value: Option<String>) -> Self {
        match value
            .unwrap_or_else(|| "development".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "production" | "prod" => Self::Production,
            _ => Self::Development,
        }
    }

    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }
}

/// How a verified bearer token becomes a caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityMode {
    /// Claims are decoded and verified in-process with the shared secret.
    Local,
    /// The token is opaque; a downstream identity service validates it.
    Remote {
        service_url: Url,
        fetch_details: bool,
    },
}

#[derive(Debug, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Missing(key) => write!(f, "missing configuration: {}", key),
            ConfigError::Invalid(key) => write!(f, "invalid configuration: {}", key),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Clone)]
pub struct Config {
    pub addr: SocketAddr,
    pub app_env: AppEnv,
    pub cors_allowed_origins: Vec<String>,

    pub jwt_secret: String,
    pub public_paths: Vec<String>,

    pub identity_mode: IdentityMode,
    pub circuit: CircuitConfig,

    pub upstream_url: Url,
    pub upstream_timeout: Duration,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Do not print the signing secret
        f.debug_struct("Config")
            .field("addr", &self.addr)
            .field("app_env", &self.app_env)
            .field("public_paths", &self.public_paths)
            .field("identity_mode", &self.identity_mode)
            .field("circuit", &self.circuit)
            .field("upstream_url", &self.upstream_url.as_str())
            .finish_non_exhaustive()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup (env, map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port: u16 = parse_or(&lookup, "PORT", 8080)?;
        let addr: SocketAddr = SocketAddr::from_str(&format!("0.0.0.0:{}", port))
            .map_err(|_| ConfigError::Invalid("PORT"))?;

        let app_env = AppEnv::parse(lookup("APP_ENV"));

        let cors_allowed_origins = split_list(lookup("CORS_ALLOWED_ORIGINS").unwrap_or_default());

        let jwt_secret = lookup("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if jwt_secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::Invalid("JWT_SECRET"));
        }

        let public_paths = match lookup("PUBLIC_PATHS") {
            Some(raw) => split_list(raw),
            None => DEFAULT_PUBLIC_PATHS.iter().map(|s| s.to_string()).collect(),
        };
        if public_paths.iter().any(|p| !p.starts_with('/')) {
            return Err(ConfigError::Invalid("PUBLIC_PATHS"));
        }

        let identity_mode = match lookup("IDENTITY_MODE")
            .unwrap_or_else(|| "local".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "local" => IdentityMode::Local,
            "remote" => {
                let service_url = lookup("IDENTITY_SERVICE_URL")
                    .ok_or(ConfigError::Missing("IDENTITY_SERVICE_URL"))?;
                let service_url = Url::parse(&service_url)
                    .map_err(|_| ConfigError::Invalid("IDENTITY_SERVICE_URL"))?;
                IdentityMode::Remote {
                    service_url,
                    fetch_details: parse_or(&lookup, "IDENTITY_FETCH_DETAILS", false)?,
                }
            }
            _ => return Err(ConfigError::Invalid("IDENTITY_MODE")),
        };

        let threshold: u8 = parse_or(&lookup, "CIRCUIT_FAILURE_RATE_THRESHOLD", 50)?;
        if threshold == 0 || threshold > 100 {
            return Err(ConfigError::Invalid("CIRCUIT_FAILURE_RATE_THRESHOLD"));
        }
        let half_open_calls: u32 = parse_or(&lookup, "CIRCUIT_HALF_OPEN_CALLS", 3)?;
        if half_open_calls == 0 {
            return Err(ConfigError::Invalid("CIRCUIT_HALF_OPEN_CALLS"));
        }
        // A zero window never counts a call; a zero timeout fails every call.
        let window = Duration::from_secs(parse_nonzero(&lookup, "CIRCUIT_WINDOW_SECONDS", 10)?);
        let call_timeout =
            Duration::from_millis(parse_nonzero(&lookup, "IDENTITY_CALL_TIMEOUT_MS", 5_000)?);
        let circuit = CircuitConfig {
            window,
            failure_rate_threshold: f64::from(threshold) / 100.0,
            minimum_calls: parse_or(&lookup, "CIRCUIT_MINIMUM_CALLS", 10)?,
            wait_in_open: Duration::from_secs(parse_or(&lookup, "CIRCUIT_WAIT_SECONDS", 10)?),
            half_open_calls,
            call_timeout,
        };

        let upstream_url = lookup("UPSTREAM_URL").ok_or(ConfigError::Missing("UPSTREAM_URL"))?;
        let upstream_url =
            Url::parse(&upstream_url).map_err(|_| ConfigError::Invalid("UPSTREAM_URL"))?;
        let upstream_timeout =
            Duration::from_secs(parse_or(&lookup, "UPSTREAM_TIMEOUT_SECONDS", 30)?);

        Ok(Self {
            addr,
            app_env,
            cors_allowed_origins,
            jwt_secret,
            public_paths,
            identity_mode,
            circuit,
            upstream_url,
            upstream_timeout,
        })
    }
}

// Absent keys fall back to the default; present but unparsable keys are rejected.
fn parse_or<F, T>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid(key)),
        None => Ok(default),
    }
}

fn parse_nonzero<F>(lookup: &F, key: &'static str, default: u64) -> Result<u64, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    match parse_or(lookup, key, default)? {
        0 => Err(ConfigError::Invalid(key)),
        value => Ok(value),
    }
}

fn split_list(raw: String) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
