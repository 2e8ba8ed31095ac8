//! Configuration management for bindery.
//!
//! Loads configuration from environment variables (with .env support):
//! database path, artifact storage root, session signing key, and
//! conversion engine tuning.

use std::env;
use std::sync::OnceLock;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Get the global configuration
pub fn config() -> &'static Config {
    CONFIG.get_or_init(Config::from_env)
}

/// Initialize configuration (call once at startup)
pub fn init() -> &'static Config {
    config()
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub session: SessionConfig,
    pub convert: ConvertConfig,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Root directory for converted artifacts, partitioned per user.
    pub data_dir: String,
    /// Maximum accepted upload size in bytes.
    pub max_upload_size: usize,
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Key for session token digests. Sessions do not survive a restart
    /// when this falls back to a generated value.
    pub secret: String,
    pub max_age_seconds: u64,
}

#[derive(Debug, Clone)]
pub struct ConvertConfig {
    /// Explicit LibreOffice binary path; otherwise well-known names are probed.
    pub libreoffice_path: Option<String>,
    /// Per-document conversion timeout in seconds.
    pub timeout_seconds: u64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Self {
            server: ServerConfig {
                host: env_or("HOST", "0.0.0.0"),
                port: env_or("PORT", "8000").parse().expect("Invalid PORT"),
            },
            database: DatabaseConfig {
                path: env_or("DB_PATH", "data/auth.db"),
            },
            storage: StorageConfig {
                data_dir: env_or("DATA_DIR", "data/outputs"),
                max_upload_size: env_or("MAX_UPLOAD_SIZE", "104857600")
                    .parse()
                    .unwrap_or(100 * 1024 * 1024), // 100MB
            },
            session: SessionConfig {
                secret: env::var("SECRET_KEY").unwrap_or_else(|_| {
                    tracing::warn!(
                        "SECRET_KEY not set, using a generated key; sessions will not survive restart"
                    );
                    nanoid::nanoid!(32)
                }),
                max_age_seconds: env_or("SESSION_MAX_AGE", "604800")
                    .parse()
                    .unwrap_or(604800), // 7 days
            },
            convert: ConvertConfig {
                libreoffice_path: env::var("LIBREOFFICE_PATH").ok(),
                timeout_seconds: env_or("CONVERT_TIMEOUT", "120").parse().unwrap_or(120),
            },
        }
    }
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
