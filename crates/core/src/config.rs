use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_u16(profile: &str, key: &str, default: u16) -> u16 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn profiled_env_u32(profile: &str, key: &str, default: u32) -> u32 {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub storage: StorageConfig,
    pub postgres: PostgresConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `FANWATCH_PROFILE`. When set (e.g. `PROD`),
    /// every key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("FANWATCH_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            storage: StorageConfig::from_env_profiled(p),
            postgres: PostgresConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  storage:     data_dir={}", self.storage.data_dir.display());
        tracing::info!(
            "  postgres:    host={}, db={}, configured={}",
            self.postgres.host,
            self.postgres.database,
            self.postgres.is_configured()
        );
    }

    /// Return a redacted view safe for printing (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "storage": { "data_dir": self.storage.data_dir },
            "postgres": {
                "host": self.postgres.host,
                "port": self.postgres.port,
                "database": self.postgres.database,
                "configured": self.postgres.is_configured(),
            },
        })
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory for dataset files and schedule snapshots.
    pub data_dir: PathBuf,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            data_dir: PathBuf::from(profiled_env_or(p, "DATA_DIR", "data")),
        }
    }

    /// Default location of the schedule snapshot written by the memory backend.
    pub fn schedule_snapshot_path(&self) -> PathBuf {
        self.data_dir.join("schedule.json")
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_u16(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "fanwatch"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_u32(p, "PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

// ── Tuning file ───────────────────────────────────────────────

/// Knobs of the frequency scheduler driver, typically parsed from TOML.
///
/// Tier thresholds and intervals are not here: they are compiled in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Seconds between two recompute cycles of the driver loop.
    #[serde(default = "default_cycle_seconds")]
    pub cycle_seconds: u64,
    /// Length of the "hot authors" list.
    #[serde(default = "default_hot_list_size")]
    pub hot_list_size: usize,
}

fn default_cycle_seconds() -> u64 { 86_400 }
fn default_hot_list_size() -> usize { 10 }

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            cycle_seconds: default_cycle_seconds(),
            hot_list_size: default_hot_list_size(),
        }
    }
}

/// Related-author discovery parameters, typically parsed from TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// How many of the host's heaviest tags seed the filter.
    #[serde(default = "default_top_tags")]
    pub top_tags: usize,
    /// Only content published within this many days is matched.
    #[serde(default = "default_window_days")]
    pub window_days: i64,
    /// Maximum content items scanned per round.
    #[serde(default = "default_item_cap")]
    pub item_cap: usize,
    /// Maximum candidates kept per round.
    #[serde(default = "default_round_limit")]
    pub round_limit: usize,
    /// Accumulation target used when the caller passes no limit.
    #[serde(default = "default_result_limit")]
    pub default_result_limit: usize,
}

fn default_top_tags() -> usize { 5 }
fn default_window_days() -> i64 { 90 }
fn default_item_cap() -> usize { 5_000 }
fn default_round_limit() -> usize { 20 }
fn default_result_limit() -> usize { 7 }

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            top_tags: default_top_tags(),
            window_days: default_window_days(),
            item_cap: default_item_cap(),
            round_limit: default_round_limit(),
            default_result_limit: default_result_limit(),
        }
    }
}

/// Contents of `fanwatch.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TuningConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
}

impl TuningConfig {
    /// Load from `path`. Returns defaults if the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "tuning file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            ("scheduler.cycle_seconds", self.scheduler.cycle_seconds == 0),
            ("discovery.top_tags", self.discovery.top_tags == 0),
            ("discovery.window_days", self.discovery.window_days <= 0),
            ("discovery.item_cap", self.discovery.item_cap == 0),
            ("discovery.round_limit", self.discovery.round_limit == 0),
        ];
        for (key, bad) in checks {
            if bad {
                return Err(ConfigError::Invalid {
                    key: key.to_string(),
                    reason: "must be positive".to_string(),
                });
            }
        }
        Ok(())
    }
}
