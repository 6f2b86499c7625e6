//! CLI argument parsing, validation, and startup helpers.

use crate::ServerConfig;
use crate::db::Database;
use crate::jwt::CREDENTIAL_DURATION_SECS;
use crate::session::{ROTATION_TOKEN_DURATION_SECS, TokenPolicy};
use clap::Parser;
use tracing::{error, info};

const MIN_JWT_SECRET_LENGTH: usize = 32;

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(clap::ValueEnum, Clone, Debug, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
    Compact,
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "sessionrelay",
    about = "Session tokens with rotation, replay detection and transparent refresh"
)]
pub struct Args {
    /// Port to listen on
    #[arg(short, long, default_value = "7291")]
    pub port: u16,

    /// Path to SQLite database file
    #[arg(short, long, default_value = "sessionrelay.db")]
    pub database: String,

    /// Path to file containing JWT secret. Prefer using JWT_SECRET env var instead
    #[arg(long)]
    pub jwt_secret_file: Option<String>,

    /// Issuer claim written into and required on credentials
    #[arg(long, default_value = "sessionrelay")]
    pub issuer: String,

    /// Audience claim written into and required on credentials
    #[arg(long, default_value = "sessionrelay-api")]
    pub audience: String,

    /// Credential lifetime in seconds
    #[arg(long, env = "CREDENTIAL_TTL", default_value_t = CREDENTIAL_DURATION_SECS)]
    pub credential_ttl: u64,

    /// Rotation token lifetime in seconds
    #[arg(long, env = "ROTATION_TTL", default_value_t = ROTATION_TOKEN_DURATION_SECS)]
    pub rotation_ttl: u64,

    /// Set the Secure flag on token cookies (serve over HTTPS)
    #[arg(long, env = "SECURE_COOKIES")]
    pub secure_cookies: bool,

    /// Days to keep expired rotation tokens before deleting them
    #[arg(long, default_value = "7")]
    pub retention_days: u64,

    /// Log output format
    #[arg(short, long, default_value = "pretty")]
    pub log_format: LogFormat,
}

/// Initialize logging based on the specified format.
pub fn init_logging(format: &LogFormat) {
    match format {
        LogFormat::Pretty => tracing_subscriber::fmt::init(),
        LogFormat::Json => tracing_subscriber::fmt().json().init(),
        LogFormat::Compact => tracing_subscriber::fmt().compact().init(),
    }
}

/// Load JWT secret from environment variable or file.
/// Returns None and logs an error if the secret cannot be loaded.
pub fn load_jwt_secret(jwt_secret_file: Option<&str>) -> Option<String> {
    let secret = if let Ok(secret) = std::env::var("JWT_SECRET") {
        // Clear the environment variable to prevent leaking
        // SAFETY: We're single-threaded at this point during startup,
        // and no other code is reading this environment variable.
        unsafe { std::env::remove_var("JWT_SECRET") };
        secret
    } else if let Some(path) = jwt_secret_file {
        match std::fs::read_to_string(path) {
            Ok(content) => content.trim().to_string(),
            Err(e) => {
                error!(path = %path, error = %e, "Failed to read JWT secret file");
                return None;
            }
        }
    } else {
        error!(
            "JWT secret is required. Set JWT_SECRET environment variable (recommended) or use --jwt-secret-file"
        );
        return None;
    };

    validate_jwt_secret(secret)
}

fn validate_jwt_secret(secret: String) -> Option<String> {
    if secret.len() < MIN_JWT_SECRET_LENGTH {
        error!(
            "JWT secret is shorter than {} characters. Use a longer secret",
            MIN_JWT_SECRET_LENGTH
        );
        return None;
    }

    Some(secret)
}

/// Build ServerConfig from validated arguments.
/// Returns None and logs an error if the token lifetimes are inconsistent.
pub fn build_config(args: &Args, db: Database, jwt_secret: String) -> Option<ServerConfig> {
    let policy = match TokenPolicy::new(args.credential_ttl, args.rotation_ttl) {
        Ok(policy) => policy,
        Err(e) => {
            error!(error = %e, "Invalid token lifetimes");
            return None;
        }
    };

    Some(ServerConfig {
        db,
        jwt_secret: jwt_secret.into_bytes(),
        issuer: args.issuer.clone(),
        audience: args.audience.clone(),
        policy,
        secure_cookies: args.secure_cookies,
        retention_secs: args.retention_days.saturating_mul(SECONDS_PER_DAY),
    })
}

/// Open the database, logging errors if it fails.
pub async fn open_database(path: &str) -> Option<Database> {
    match Database::open(path).await {
        Ok(db) => {
            info!(path = %path, "Database opened");
            Some(db)
        }
        Err(e) => {
            error!(path = %path, error = %e, "Failed to open database");
            None
        }
    }
}
