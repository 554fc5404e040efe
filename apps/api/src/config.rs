use std::str::FromStr;

use anyhow::{bail, Context, Result};
use chrono::Duration;

/// Which backend holds abuse blocks and rolling-window events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbuseBackend {
    Postgres,
    Redis,
}

impl FromStr for AbuseBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(AbuseBackend::Postgres),
            "redis" => Ok(AbuseBackend::Redis),
            other => bail!("ABUSE_STORE must be 'postgres' or 'redis', got '{other}'"),
        }
    }
}

/// Thresholds and windows for the abuse guard.
#[derive(Debug, Clone)]
pub struct AbuseConfig {
    pub hash_salt: String,
    pub signup_window: Duration,
    pub max_signups_per_ip: u32,
    pub max_signups_per_device: u32,
    pub ai_burst_window: Duration,
    pub max_new_accounts_per_ip: u32,
    pub max_new_accounts_per_device: u32,
    /// Accounts older than this are never evaluated for AI bursts.
    pub fresh_account_age: Duration,
    pub block_duration: Duration,
}

impl AbuseConfig {
    pub fn with_salt(hash_salt: impl Into<String>) -> Self {
        Self {
            hash_salt: hash_salt.into(),
            signup_window: Duration::hours(1),
            max_signups_per_ip: 5,
            max_signups_per_device: 3,
            ai_burst_window: Duration::hours(1),
            max_new_accounts_per_ip: 3,
            max_new_accounts_per_device: 2,
            fresh_account_age: Duration::hours(48),
            block_duration: Duration::hours(24),
        }
    }

    fn from_env() -> Result<Self> {
        let defaults = Self::with_salt(require_env("ABUSE_HASH_SALT")?);
        Ok(Self {
            signup_window: env_secs("SIGNUP_WINDOW_SECS", defaults.signup_window)?,
            max_signups_per_ip: env_or("MAX_SIGNUPS_PER_IP", defaults.max_signups_per_ip)?,
            max_signups_per_device: env_or(
                "MAX_SIGNUPS_PER_DEVICE",
                defaults.max_signups_per_device,
            )?,
            ai_burst_window: env_secs("AI_BURST_WINDOW_SECS", defaults.ai_burst_window)?,
            max_new_accounts_per_ip: env_or(
                "MAX_NEW_ACCOUNTS_PER_IP",
                defaults.max_new_accounts_per_ip,
            )?,
            max_new_accounts_per_device: env_or(
                "MAX_NEW_ACCOUNTS_PER_DEVICE",
                defaults.max_new_accounts_per_device,
            )?,
            fresh_account_age: env_secs("FRESH_ACCOUNT_AGE_SECS", defaults.fresh_account_age)?,
            block_duration: env_secs("ABUSE_BLOCK_SECS", defaults.block_duration)?,
            ..defaults
        })
    }
}

/// Application configuration loaded from environment variables.
/// Startup fails if required variables are missing or malformed.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub anthropic_api_key: String,
    pub abuse_backend: AbuseBackend,
    pub free_monthly_credits: u32,
    pub abuse: AbuseConfig,
    pub port: u16,
    pub rust_log: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok(); // load .env if present; ignore if missing

        let abuse_backend: AbuseBackend = env_or("ABUSE_STORE", AbuseBackend::Postgres)?;
        let redis_url = std::env::var("REDIS_URL").ok();
        if abuse_backend == AbuseBackend::Redis && redis_url.is_none() {
            bail!("REDIS_URL is required when ABUSE_STORE=redis");
        }

        Ok(Config {
            database_url: require_env("DATABASE_URL")?,
            redis_url,
            anthropic_api_key: require_env("ANTHROPIC_API_KEY")?,
            abuse_backend,
            free_monthly_credits: env_or("FREE_MONTHLY_CREDITS", 30)?,
            abuse: AbuseConfig::from_env()?,
            port: env_or("PORT", 8080)?,
            rust_log: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        })
    }
}

fn require_env(key: &str) -> Result<String> {
    std::env::var(key).with_context(|| format!("Required environment variable '{key}' is not set"))
}

fn env_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => parse_value(key, &raw),
        Err(_) => Ok(default),
    }
}

fn env_secs(key: &str, default: Duration) -> Result<Duration> {
    match std::env::var(key) {
        Ok(raw) => parse_value::<u32>(key, &raw).map(|secs| Duration::seconds(i64::from(secs))),
        Err(_) => Ok(default),
    }
}

fn parse_value<T>(key: &str, raw: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse::<T>()
        .map_err(|e| anyhow::anyhow!("{key} has invalid value '{raw}': {e}"))
}
