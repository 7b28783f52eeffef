//! Configuration loading for tracksync.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `TRACKSYNC_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, path::PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::engine::parse_cron;
use crate::notify::ChannelKind;

/// Application configuration derived from `TRACKSYNC_*` environment
/// variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
    #[serde(default = "default_database_url")]
    pub database_url: String,
    #[serde(default = "default_db_max_connections")]
    pub db_max_connections: u32,
    #[serde(default = "default_db_acquire_timeout_ms")]
    pub db_acquire_timeout_ms: u64,
    #[serde(default)]
    pub sync: SyncSettings,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub backoff: BackoffPolicyConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

/// Sync cadence and paging defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SyncSettings {
    /// Cron cadence new sync jobs start with.
    #[serde(default = "default_sync_cron")]
    pub default_cron: String,
    /// Issues requested per search page.
    #[serde(default = "default_sync_page_size")]
    pub page_size: u32,
}

/// Workflow engine tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct EngineConfig {
    /// Seconds between schedule evaluation ticks.
    #[serde(default = "default_engine_tick_interval_seconds")]
    pub tick_interval_seconds: u64,
    /// Start-to-close timeout for one activity attempt, in seconds.
    #[serde(default = "default_activity_timeout_seconds")]
    pub activity_timeout_seconds: u64,
    /// Attempt ceiling per activity invocation, counting the first attempt.
    #[serde(default = "default_activity_max_attempts")]
    pub activity_max_attempts: u32,
    #[serde(default = "default_retry_base_seconds")]
    pub retry_base_seconds: u64,
    #[serde(default = "default_retry_max_seconds")]
    pub retry_max_seconds: u64,
    #[serde(default = "default_retry_jitter_factor")]
    pub retry_jitter_factor: f64,
}

/// Cron backoff ladder and alert routing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct BackoffPolicyConfig {
    /// Escalation steps appended after a job's original cron.
    #[serde(default = "default_backoff_ladder")]
    pub ladder: Vec<String>,
    /// Channel escalation alerts go out on: "email" or "chat".
    #[serde(default = "default_alert_channel")]
    pub alert_channel: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alert_recipients: Vec<String>,
}

/// Notification endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct NotifyConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email_endpoint: Option<String>,
    #[serde(default = "default_email_from")]
    pub email_from: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_webhook_url: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            sync: SyncSettings::default(),
            engine: EngineConfig::default(),
            backoff: BackoffPolicyConfig::default(),
            notify: NotifyConfig::default(),
        }
    }
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            default_cron: default_sync_cron(),
            page_size: default_sync_page_size(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_seconds: default_engine_tick_interval_seconds(),
            activity_timeout_seconds: default_activity_timeout_seconds(),
            activity_max_attempts: default_activity_max_attempts(),
            retry_base_seconds: default_retry_base_seconds(),
            retry_max_seconds: default_retry_max_seconds(),
            retry_jitter_factor: default_retry_jitter_factor(),
        }
    }
}

impl Default for BackoffPolicyConfig {
    fn default() -> Self {
        Self {
            ladder: default_backoff_ladder(),
            alert_channel: default_alert_channel(),
            alert_recipients: Vec::new(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            email_endpoint: None,
            email_from: default_email_from(),
            chat_webhook_url: None,
        }
    }
}

impl AppConfig {
    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if config.notify.chat_webhook_url.is_some() {
            config.notify.chat_webhook_url = Some("[REDACTED]".to_string());
        }
        if config.database_url != default_database_url() {
            config.database_url = "[REDACTED]".to_string();
        }
        serde_json::to_string_pretty(&config)
    }

    /// Validates the configuration, returning an error if a setting is out
    /// of bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.engine.tick_interval_seconds == 0 || self.engine.tick_interval_seconds > 300 {
            return Err(ConfigError::InvalidTickInterval {
                value: self.engine.tick_interval_seconds,
            });
        }

        if self.engine.activity_max_attempts == 0 || self.engine.activity_max_attempts > 10 {
            return Err(ConfigError::InvalidMaxAttempts {
                value: self.engine.activity_max_attempts,
            });
        }

        if self.engine.retry_base_seconds > self.engine.retry_max_seconds {
            return Err(ConfigError::InvalidRetryBounds {
                base: self.engine.retry_base_seconds,
                max: self.engine.retry_max_seconds,
            });
        }

        if !(0.0..=1.0).contains(&self.engine.retry_jitter_factor) {
            return Err(ConfigError::InvalidRetryJitter {
                value: self.engine.retry_jitter_factor,
            });
        }

        if self.sync.page_size == 0 || self.sync.page_size > 100 {
            return Err(ConfigError::InvalidPageSize {
                value: self.sync.page_size,
            });
        }

        parse_cron(&self.sync.default_cron).map_err(|_| ConfigError::InvalidCron {
            field: "SYNC_DEFAULT_CRON".to_string(),
            value: self.sync.default_cron.clone(),
        })?;

        for step in &self.backoff.ladder {
            parse_cron(step).map_err(|_| ConfigError::InvalidCron {
                field: "BACKOFF_LADDER".to_string(),
                value: step.clone(),
            })?;
        }

        if ChannelKind::parse(&self.backoff.alert_channel).is_none() {
            return Err(ConfigError::InvalidAlertChannel {
                value: self.backoff.alert_channel.clone(),
            });
        }

        Ok(())
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "postgres://localhost:5432/tracksync".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5_000
}

fn default_sync_cron() -> String {
    "*/15 * * * *".to_string()
}

fn default_sync_page_size() -> u32 {
    50
}

fn default_engine_tick_interval_seconds() -> u64 {
    15
}

fn default_activity_timeout_seconds() -> u64 {
    120
}

fn default_activity_max_attempts() -> u32 {
    3
}

fn default_retry_base_seconds() -> u64 {
    5
}

fn default_retry_max_seconds() -> u64 {
    300
}

fn default_retry_jitter_factor() -> f64 {
    0.1
}

fn default_backoff_ladder() -> Vec<String> {
    crate::sync::backoff::DEFAULT_CRON_LADDER
        .iter()
        .map(|cron| cron.to_string())
        .collect()
}

fn default_alert_channel() -> String {
    "email".to_string()
}

fn default_email_from() -> String {
    "tracksync@localhost".to_string()
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("engine tick interval must be between 1 and 300 seconds, got {value}")]
    InvalidTickInterval { value: u64 },
    #[error("activity max attempts must be between 1 and 10, got {value}")]
    InvalidMaxAttempts { value: u32 },
    #[error("retry base seconds ({base}) cannot be greater than max seconds ({max})")]
    InvalidRetryBounds { base: u64, max: u64 },
    #[error("retry jitter factor must be between 0.0 and 1.0, got {value}")]
    InvalidRetryJitter { value: f64 },
    #[error("sync page size must be between 1 and 100, got {value}")]
    InvalidPageSize { value: u32 },
    #[error("invalid cron expression in {field}: '{value}'")]
    InvalidCron { field: String, value: String },
    #[error("alert channel must be 'email' or 'chat', got '{value}'")]
    InvalidAlertChannel { value: String },
}

/// Loads configuration using layered `.env` files and `TRACKSYNC_*` env
/// vars.
pub struct ConfigLoader {
    base_dir: PathBuf,
}

impl ConfigLoader {
    /// Creates a new loader rooted at the current working directory.
    pub fn new() -> Self {
        Self {
            base_dir: env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
        }
    }

    /// Creates a loader rooted at the provided directory (useful for tests).
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix("TRACKSYNC_") {
                layered.insert(stripped.to_string(), value);
            }
        }

        let take = |layered: &mut BTreeMap<String, String>, key: &str| {
            layered.remove(key).filter(|value| !value.is_empty())
        };

        let profile = take(&mut layered, "PROFILE").unwrap_or(profile_hint);
        let log_level = take(&mut layered, "LOG_LEVEL").unwrap_or_else(default_log_level);
        let log_format = take(&mut layered, "LOG_FORMAT").unwrap_or_else(default_log_format);
        let database_url = take(&mut layered, "DATABASE_URL").unwrap_or_else(default_database_url);
        let db_max_connections = take(&mut layered, "DB_MAX_CONNECTIONS")
            .and_then(|value| value.parse().ok())
            .unwrap_or_else(default_db_max_connections);
        let db_acquire_timeout_ms = take(&mut layered, "DB_ACQUIRE_TIMEOUT_MS")
            .and_then(|value| value.parse().ok())
            .unwrap_or_else(default_db_acquire_timeout_ms);

        let sync = SyncSettings {
            default_cron: take(&mut layered, "SYNC_DEFAULT_CRON").unwrap_or_else(default_sync_cron),
            page_size: take(&mut layered, "SYNC_PAGE_SIZE")
                .and_then(|value| value.parse().ok())
                .unwrap_or_else(default_sync_page_size),
        };

        let engine = EngineConfig {
            tick_interval_seconds: take(&mut layered, "ENGINE_TICK_INTERVAL_SECONDS")
                .and_then(|value| value.parse().ok())
                .unwrap_or_else(default_engine_tick_interval_seconds),
            activity_timeout_seconds: take(&mut layered, "ACTIVITY_TIMEOUT_SECONDS")
                .and_then(|value| value.parse().ok())
                .unwrap_or_else(default_activity_timeout_seconds),
            activity_max_attempts: take(&mut layered, "ACTIVITY_MAX_ATTEMPTS")
                .and_then(|value| value.parse().ok())
                .unwrap_or_else(default_activity_max_attempts),
            retry_base_seconds: take(&mut layered, "RETRY_BASE_SECONDS")
                .and_then(|value| value.parse().ok())
                .unwrap_or_else(default_retry_base_seconds),
            retry_max_seconds: take(&mut layered, "RETRY_MAX_SECONDS")
                .and_then(|value| value.parse().ok())
                .unwrap_or_else(default_retry_max_seconds),
            retry_jitter_factor: take(&mut layered, "RETRY_JITTER_FACTOR")
                .and_then(|value| value.parse().ok())
                .unwrap_or_else(default_retry_jitter_factor),
        };

        let backoff = BackoffPolicyConfig {
            ladder: take(&mut layered, "BACKOFF_LADDER")
                .map(|ladder| {
                    ladder
                        .split(';')
                        .map(|step| step.trim().to_string())
                        .filter(|step| !step.is_empty())
                        .collect()
                })
                .unwrap_or_else(default_backoff_ladder),
            alert_channel: take(&mut layered, "BACKOFF_ALERT_CHANNEL")
                .unwrap_or_else(default_alert_channel),
            alert_recipients: take(&mut layered, "BACKOFF_ALERT_RECIPIENTS")
                .map(|recipients| {
                    recipients
                        .split(',')
                        .map(|entry| entry.trim().to_string())
                        .filter(|entry| !entry.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        };

        let notify = NotifyConfig {
            email_endpoint: take(&mut layered, "NOTIFY_EMAIL_ENDPOINT"),
            email_from: take(&mut layered, "NOTIFY_EMAIL_FROM").unwrap_or_else(default_email_from),
            chat_webhook_url: take(&mut layered, "NOTIFY_CHAT_WEBHOOK_URL"),
        };

        let config = AppConfig {
            profile,
            log_level,
            log_format,
            database_url,
            db_max_connections,
            db_acquire_timeout_ms,
            sync,
            engine,
            backoff,
            notify,
        };

        config.validate()?;
        Ok(config)
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var("TRACKSYNC_PROFILE")
            .ok()
            .or_else(|| values.get("PROFILE").cloned())
            .unwrap_or_else(default_profile);

        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}", &profile)),
            &mut values,
        )?;
        self.merge_dotenv(
            self.base_dir.join(format!(".env.{}.local", &profile)),
            &mut values,
        )?;

        Ok((values, profile))
    }

    fn merge_dotenv(
        &self,
        path: PathBuf,
        values: &mut BTreeMap<String, String>,
    ) -> Result<(), ConfigError> {
        match dotenvy::from_path_iter(&path) {
            Ok(iter) => {
                for item in iter {
                    let (key, value) = item.map_err(|source| ConfigError::EnvFile {
                        path: path.clone(),
                        source,
                    })?;
                    if let Some(stripped) = key.strip_prefix("TRACKSYNC_") {
                        values.insert(stripped.to_string(), value);
                    }
                }
                Ok(())
            }
            Err(dotenvy::Error::Io(ref io_err))
                if io_err.kind() == std::io::ErrorKind::NotFound =>
            {
                Ok(())
            }
            Err(err) => Err(ConfigError::EnvFile { path, source: err }),
        }
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
