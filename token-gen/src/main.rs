use std::time::Duration;

use chrono::{DateTime, Utc};
use clap::Parser;
use edge_gateway::services::auth::{BearerToken, TokenIssuer, TokenVerifier};

const MIN_SECRET_BYTES: usize = 32;

/// Mint an HS256 access token the gateway accepts in local identity mode.
///
/// - Claims: sub = email, email, id, iat, exp (+ authorities when given)
/// - The secret and expiry default to the gateway's own `JWT_SECRET` /
///   `JWT_EXPIRATION_MS`, so a `.env` shared with the gateway just works.
#[derive(Parser, Debug)]
#[command(name = "token-gen", version, about)]
struct Args {
    /// Subject email (sub / email claims)
    #[arg(long)]
    email: String,

    /// Numeric user id (id claim)
    #[arg(long)]
    user_id: i64,

    /// Granted authority, repeatable (e.g. --authority ROLE_USER)
    #[arg(long = "authority")]
    authorities: Vec<String>,

    /// Shared HS256 secret (at least 32 bytes)
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    secret: String,

    /// Token lifetime in milliseconds
    #[arg(long, env = "JWT_EXPIRATION_MS", default_value_t = 86_400_000)]
    ttl_ms: u64,

    /// Override iat (unix seconds). Default: now.
    #[arg(long)]
    iat: Option<i64>,

    /// Print only the token (no extra lines)
    #[arg(long, default_value_t = false)]
    quiet: bool,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if args.secret.len() < MIN_SECRET_BYTES {
        return Err(format!("secret must be at least {} bytes", MIN_SECRET_BYTES).into());
    }

    let issued_at: DateTime<Utc> = match args.iat {
        Some(secs) => DateTime::from_timestamp(secs, 0).ok_or("iat out of range")?,
        None => Utc::now(),
    };

    let issuer = TokenIssuer::new(args.secret.as_bytes(), Duration::from_millis(args.ttl_ms));
    let token = issuer.issue_at(&args.email, args.user_id, &args.authorities, issued_at)?;

    if args.quiet {
        println!("{}", token);
        return Ok(());
    }

    println!("Authorization: Bearer {}", token);

    // Check with the gateway's own verifier.
    let verifier = TokenVerifier::new(args.secret.as_bytes());
    match verifier.verify(&BearerToken::parse(&token)?) {
        Ok(claims) => {
            println!("sub: {}", claims.subject());
            println!("id: {}", claims.user_id());
            println!("exp: {}", claims.expires_at());
        }
        Err(e) => println!("warning: gateway would reject this token now ({})", e),
    }

    Ok(())
}
