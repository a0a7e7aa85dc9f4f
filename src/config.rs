//! Configuration for Olaf
//!
//! CLI arguments and environment variable handling using clap. Values are
//! read from the process environment after `.env` has been loaded.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;

/// Secret used when running in dev mode without `SECRET_KEY`
const DEV_SECRET: &str = "olaf-dev-only-insecure-secret-key-000";

/// Password given to the root user in dev mode without `ROOT_PASSWORD`
const DEV_ROOT_PASSWORD: &str = "olaf";

/// Which document store backs the registry
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// MongoDB server
    Mongo,
    /// In-process store, lost on exit
    Memory,
}

/// Log output format
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Olaf - modular business application framework over MongoDB
#[derive(Parser, Debug, Clone)]
#[command(name = "olaf")]
#[command(about = "Document mapper, access rules and JSON-RPC over MongoDB")]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "127.0.0.1:5000")]
    pub listen: SocketAddr,

    /// Public URL of this instance
    #[arg(long, env = "APP_URL", default_value = "http://localhost:5000")]
    pub app_url: String,

    /// Enable development mode (insecure defaults, memory fallback)
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// Document store backend
    #[arg(long, env = "STORE", value_enum, default_value = "mongo")]
    pub store: StoreBackend,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_NAME", default_value = "olaf")]
    pub mongodb_name: String,

    /// MongoDB server selection timeout in milliseconds
    #[arg(long, env = "MONGODB_TIMEOUT", default_value = "2000")]
    pub mongodb_timeout_ms: u64,

    /// Secret for token signing (required in production)
    #[arg(long, env = "SECRET_KEY")]
    pub secret_key: Option<String>,

    /// Access token lifetime in seconds
    #[arg(long, env = "JWT_EXPIRATION_TIME", default_value = "2000")]
    pub jwt_expiration_time: u64,

    /// Password of the root user, applied on every start
    #[arg(long, env = "ROOT_PASSWORD")]
    pub root_password: Option<String>,

    /// Directory containing YAML addons
    #[arg(long, env = "ADDONS_PATH")]
    pub addons_path: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "pretty")]
    pub log_format: LogFormat,
}

impl Args {
    /// Effective token secret (falls back to a fixed value in dev mode)
    pub fn jwt_secret(&self) -> Result<String, String> {
        match (&self.secret_key, self.dev_mode) {
            (Some(secret), _) => Ok(secret.clone()),
            (None, true) => Ok(DEV_SECRET.to_string()),
            (None, false) => Err("SECRET_KEY is required in production mode".to_string()),
        }
    }

    /// Effective root password
    pub fn root_password(&self) -> Result<String, String> {
        match (&self.root_password, self.dev_mode) {
            (Some(password), _) => Ok(password.clone()),
            (None, true) => Ok(DEV_ROOT_PASSWORD.to_string()),
            (None, false) => Err("ROOT_PASSWORD is required in production mode".to_string()),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if !self.dev_mode {
            let secret = self.jwt_secret()?;
            if secret.len() < 32 {
                return Err("SECRET_KEY must be at least 32 characters".to_string());
            }
            let root_password = self.root_password()?;
            if root_password.is_empty() {
                return Err("ROOT_PASSWORD must not be empty".to_string());
            }
        }

        if self.jwt_expiration_time == 0 {
            return Err("JWT_EXPIRATION_TIME must be greater than zero".to_string());
        }

        if self.store == StoreBackend::Mongo && !self.mongodb_uri.starts_with("mongodb") {
            return Err(format!(
                "MONGODB_URI must be a mongodb:// or mongodb+srv:// URI, got {}",
                self.mongodb_uri
            ));
        }

        if let Some(path) = &self.addons_path {
            if !path.is_dir() {
                return Err(format!("ADDONS_PATH {} is not a directory", path.display()));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(extra: &[&str]) -> Args {
        let mut argv = vec!["olaf"];
        argv.extend_from_slice(extra);
        Args::parse_from(argv)
    }

    /// Parsed arguments with values the environment may provide reset
    fn isolated(extra: &[&str]) -> Args {
        let mut args = parse(extra);
        args.secret_key = None;
        args.root_password = None;
        args.addons_path = None;
        args.jwt_expiration_time = 2000;
        args
    }

    #[test]
    fn test_dev_mode_defaults() {
        let mut args = isolated(&["--store", "memory"]);
        args.dev_mode = true;
        assert_eq!(args.jwt_secret().unwrap(), DEV_SECRET);
        assert_eq!(args.root_password().unwrap(), DEV_ROOT_PASSWORD);
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_production_requires_secret() {
        let mut args = isolated(&["--store", "memory"]);
        args.dev_mode = false;
        args.root_password = Some("pw".into());
        assert!(args.jwt_secret().is_err());
        let err = args.validate().unwrap_err();
        assert!(err.contains("SECRET_KEY"));

        args.secret_key = Some("s".repeat(32));
        args.root_password = None;
        let err = args.validate().unwrap_err();
        assert!(err.contains("ROOT_PASSWORD"));

        args.root_password = Some("pw".into());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_short_secret_rejected() {
        let mut args = isolated(&["--store", "memory"]);
        args.dev_mode = false;
        args.secret_key = Some("short".into());
        args.root_password = Some("pw".into());
        let err = args.validate().unwrap_err();
        assert!(err.contains("32 characters"));
    }

    #[test]
    fn test_log_level_short_flag() {
        let args = parse(&["-l", "debug", "--dev-mode"]);
        assert_eq!(args.log_level, "debug");
    }
}
