//! Environment-based Configuration
//!
//! Everything the server needs to boot comes from environment variables —
//! there is no config file. The wallet seed in particular must never be
//! hardcoded.
//!
//! # Environment Variables
//!
//! - `DOMAIN` — public base URL blob descriptors are built from (required)
//! - `SEED` — BIP39 mnemonic the HD wallet derives from (required)
//! - `TRUSTED_MINT` — the Cashu mint URL trusted on first boot (required)
//! - `OWNER_NPUB` — owner's npub for swapped-token DMs (optional)
//! - `UPLOAD_COST_2MB` — sats per 2MB of upload, 0 = free (default 0)
//! - `DOWNLOAD_COST_2MB` — sats per 2MB of download, 0 = free (default 0)
//! - `BLOSSOM_HOME_DIR` — data directory (default `~/.ratasker`)
//! - `BLOSSOM_ROTATION_PERIOD_MINUTES` — pubkey rotation period (default 60)
//! - `BLOSSOM_PORT` — HTTP listen port (default 8070)
//! - `BLOSSOM_ENABLE_LOCKTIME_CHECK` — default true
//! - `BLOSSOM_ENABLE_DLEQ_CHECK` — default true
//! - `BLOSSOM_LOG_LEVEL` — logging level (default info)

use std::env;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Debug, Clone)]
pub struct BlossomConfig {
    pub domain: String,
    pub seed: String,
    pub trusted_mint: String,
    pub owner_npub: Option<String>,
    pub upload_cost_2mb: u64,
    pub download_cost_2mb: u64,
    pub home_dir: PathBuf,
    pub rotation_period_minutes: u64,
    pub port: u16,
    pub enable_locktime_check: bool,
    pub enable_dleq_check: bool,
    pub log_level: String,
}

impl BlossomConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let domain = require_env("DOMAIN")?;
        let seed = require_env("SEED")?;
        let trusted_mint = require_env("TRUSTED_MINT")?;
        let owner_npub = env::var("OWNER_NPUB").ok().filter(|v| !v.is_empty());

        let upload_cost_2mb = parse_env_or("UPLOAD_COST_2MB", 0)?;
        let download_cost_2mb = parse_env_or("DOWNLOAD_COST_2MB", 0)?;

        let home_dir = env::var("BLOSSOM_HOME_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_home_dir());

        let rotation_period_minutes = parse_env_or("BLOSSOM_ROTATION_PERIOD_MINUTES", 60)?;
        let port = parse_env_or("BLOSSOM_PORT", 8070)?;
        let enable_locktime_check = parse_bool_env_or("BLOSSOM_ENABLE_LOCKTIME_CHECK", true)?;
        let enable_dleq_check = parse_bool_env_or("BLOSSOM_ENABLE_DLEQ_CHECK", true)?;

        let log_level = env::var("BLOSSOM_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            domain,
            seed,
            trusted_mint,
            owner_npub,
            upload_cost_2mb,
            download_cost_2mb,
            home_dir,
            rotation_period_minutes,
            port,
            enable_locktime_check,
            enable_dleq_check,
            log_level,
        })
    }

    pub fn enable_nostr_dm(&self) -> bool {
        self.owner_npub.is_some()
    }

    pub fn db_path(&self) -> PathBuf {
        self.home_dir.join("blossom.sqlite3")
    }

    pub fn blobs_dir(&self) -> PathBuf {
        self.home_dir.join("blobs")
    }

    pub fn token_log_path(&self) -> PathBuf {
        self.home_dir.join("tokens.txt")
    }

    pub fn rotation_period_secs(&self) -> i64 {
        (self.rotation_period_minutes * 60) as i64
    }

    pub fn print_summary(&self) {
        println!("=== Blossom Cashu Configuration ===");
        println!("Domain: {}", self.domain);
        println!("Trusted mint: {}", self.trusted_mint);
        println!("Owner DM: {}", if self.enable_nostr_dm() { "enabled" } else { "disabled" });
        println!("Upload cost: {} sat / 2MB", self.upload_cost_2mb);
        println!("Download cost: {} sat / 2MB", self.download_cost_2mb);
        println!("Home dir: {}", self.home_dir.display());
        println!("Rotation period: {} minutes", self.rotation_period_minutes);
        println!("Port: {}", self.port);
        println!("Locktime check: {}", self.enable_locktime_check);
        println!("DLEQ check: {}", self.enable_dleq_check);
        println!("Log level: {}", self.log_level);
        println!("====================================");
    }
}

fn default_home_dir() -> PathBuf {
    env::var("HOME")
        .map(|home| PathBuf::from(home).join(".ratasker"))
        .unwrap_or_else(|_| PathBuf::from(".ratasker"))
}

fn require_env(name: &str) -> Result<String, ConfigError> {
    env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn parse_env_or<T: std::str::FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), value)),
        Err(_) => Ok(default),
    }
}

fn parse_bool_env_or(name: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(name) {
        Ok(value) => match value.to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue(name.to_string(), value)),
        },
        Err(_) => Ok(default),
    }
}
