//! Configuration loading for the attendance service.
//!
//! Loads layered `.env` files and environment variables prefixed with
//! `ATTENDANCE_`, producing a typed [`AppConfig`].

use std::{collections::BTreeMap, env, net::SocketAddr, path::PathBuf, str::FromStr, time::Duration};

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::business_date::{BusinessCalendar, CalendarError, parse_local_time};

const ENV_PREFIX: &str = "ATTENDANCE_";

/// Application configuration derived from `ATTENDANCE_*` environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct AppConfig {
    #[serde(default = "default_profile")]
    pub profile: String,
    #[serde(default = "default_api_bind_addr")]
    pub api_bind_addr: String,
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
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub operator_tokens: Vec<String>,
    /// Fixed offset of the business calendar, `[+|-]HH:MM`
    #[serde(default = "default_business_utc_offset")]
    pub business_utc_offset: String,
    /// Earliest local time a shift may be closed, `HH:MM`
    #[serde(default = "default_min_clock_out_local")]
    pub min_clock_out_local: String,
    /// First clock-ins after this local time mark the day late, `HH:MM`
    #[serde(default = "default_late_cutoff_local")]
    pub late_cutoff_local: String,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub hr_push: HrPushConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
}

/// Delivery worker pool and retry contract.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct SyncConfig {
    /// Concurrent deliveries (default: 5)
    ///
    /// Environment variable: `ATTENDANCE_SYNC_WORKERS`
    #[serde(default = "default_sync_workers")]
    pub workers: usize,
    /// Attempt ceiling per task (default: 5)
    ///
    /// Environment variable: `ATTENDANCE_SYNC_MAX_ATTEMPTS`
    #[serde(default = "default_sync_max_attempts")]
    pub max_attempts: u32,
    /// Delay before the first retry (default: 1000)
    #[serde(default = "default_sync_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Multiplier applied per attempt (default: 2.0)
    #[serde(default = "default_sync_backoff_factor")]
    pub backoff_factor: f64,
    /// Upper bound on a single backoff delay (default: 300000)
    #[serde(default = "default_sync_backoff_max_ms")]
    pub backoff_max_ms: u64,
    /// Random extra delay as a fraction of the computed backoff, 0.0-1.0 (default: 0.1)
    #[serde(default = "default_sync_backoff_jitter")]
    pub backoff_jitter: f64,
    /// Timeout for one push call (default: 30)
    #[serde(default = "default_sync_push_timeout_seconds")]
    pub push_timeout_seconds: u64,
    /// Poll interval when no wake-up arrives (default: 1000)
    #[serde(default = "default_sync_tick_ms")]
    pub tick_ms: u64,
    /// Tasks claimed per poll (default: 20)
    #[serde(default = "default_sync_claim_batch")]
    pub claim_batch: u64,
    /// Age after which a running task or PROCESSING event is considered abandoned by
    /// its worker (default: 120)
    #[serde(default = "default_sync_lease_seconds")]
    pub lease_seconds: u64,
    /// Interval between HR reachability checks while serving, 0 disables them (default: 900)
    #[serde(default = "default_sync_health_check_interval_seconds")]
    pub health_check_interval_seconds: u64,
}

/// External HR push endpoint.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct HrPushConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Device identity reported with every punch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
}

/// UI refresh notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct RefreshConfig {
    /// Webhook receiving `{"employee_id": ...}`; notifications are only logged when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_url: Option<String>,
    #[serde(default = "default_refresh_timeout_seconds")]
    pub timeout_seconds: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            profile: default_profile(),
            api_bind_addr: default_api_bind_addr(),
            log_level: default_log_level(),
            log_format: default_log_format(),
            database_url: default_database_url(),
            db_max_connections: default_db_max_connections(),
            db_acquire_timeout_ms: default_db_acquire_timeout_ms(),
            operator_tokens: Vec::new(),
            business_utc_offset: default_business_utc_offset(),
            min_clock_out_local: default_min_clock_out_local(),
            late_cutoff_local: default_late_cutoff_local(),
            sync: SyncConfig::default(),
            hr_push: HrPushConfig::default(),
            refresh: RefreshConfig::default(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            workers: default_sync_workers(),
            max_attempts: default_sync_max_attempts(),
            backoff_base_ms: default_sync_backoff_base_ms(),
            backoff_factor: default_sync_backoff_factor(),
            backoff_max_ms: default_sync_backoff_max_ms(),
            backoff_jitter: default_sync_backoff_jitter(),
            push_timeout_seconds: default_sync_push_timeout_seconds(),
            tick_ms: default_sync_tick_ms(),
            claim_batch: default_sync_claim_batch(),
            lease_seconds: default_sync_lease_seconds(),
            health_check_interval_seconds: default_sync_health_check_interval_seconds(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_seconds: default_refresh_timeout_seconds(),
        }
    }
}

impl AppConfig {
    /// Returns the configured bind address as a socket address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.api_bind_addr.parse()
    }

    /// Business calendar built from `business_utc_offset`.
    pub fn calendar(&self) -> Result<BusinessCalendar, ConfigError> {
        BusinessCalendar::from_offset_str(&self.business_utc_offset).map_err(ConfigError::from)
    }

    pub fn min_clock_out_time(&self) -> Result<NaiveTime, ConfigError> {
        parse_local_time(&self.min_clock_out_local).map_err(ConfigError::from)
    }

    pub fn late_cutoff_time(&self) -> Result<NaiveTime, ConfigError> {
        parse_local_time(&self.late_cutoff_local).map_err(ConfigError::from)
    }

    /// Returns a redacted JSON representation (secrets are redacted).
    pub fn redacted_json(&self) -> serde_json::Result<String> {
        let mut config = self.clone();
        if !config.operator_tokens.is_empty() {
            config.operator_tokens = vec!["[REDACTED]".to_string()];
        }
        if config.hr_push.api_key.is_some() {
            config.hr_push.api_key = Some("[REDACTED]".to_string());
        }
        if config.database_url.contains('@') {
            config.database_url = "[REDACTED]".to_string();
        }
        serde_json::to_string_pretty(&config)
    }

    fn is_local_profile(&self) -> bool {
        matches!(self.profile.as_str(), "local" | "test")
    }

    /// Validates the configuration, returning an error if required settings are missing.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.calendar()?;
        self.min_clock_out_time()?;
        self.late_cutoff_time()?;

        self.sync.validate()?;

        if !self.is_local_profile() {
            if self.operator_tokens.is_empty() {
                return Err(ConfigError::MissingOperatorTokens);
            }
            if self.hr_push.base_url.is_none() {
                return Err(ConfigError::MissingHrPushBaseUrl);
            }
            if self.hr_push.device_id.is_none() {
                return Err(ConfigError::MissingHrDeviceId);
            }
        }

        for (key, value) in [
            ("HR_PUSH_BASE_URL", &self.hr_push.base_url),
            ("REFRESH_WEBHOOK_URL", &self.refresh.webhook_url),
        ] {
            if let Some(raw) = value {
                url::Url::parse(raw).map_err(|source| ConfigError::InvalidUrl {
                    key: key.to_string(),
                    value: raw.clone(),
                    source,
                })?;
            }
        }

        if self.refresh.timeout_seconds == 0 {
            return Err(ConfigError::InvalidRefreshTimeout {
                value: self.refresh.timeout_seconds,
            });
        }

        Ok(())
    }
}

impl SyncConfig {
    /// Validate worker pool and retry bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=50).contains(&self.workers) {
            return Err(ConfigError::InvalidSyncWorkers {
                value: self.workers,
            });
        }
        if !(1..=20).contains(&self.max_attempts) {
            return Err(ConfigError::InvalidSyncMaxAttempts {
                value: self.max_attempts,
            });
        }
        if !self.backoff_factor.is_finite() || self.backoff_factor < 1.0 {
            return Err(ConfigError::InvalidSyncBackoffFactor {
                value: self.backoff_factor,
            });
        }
        if self.backoff_base_ms > self.backoff_max_ms {
            return Err(ConfigError::InvalidSyncBackoffBounds {
                base: self.backoff_base_ms,
                max: self.backoff_max_ms,
            });
        }
        if !(0.0..=1.0).contains(&self.backoff_jitter) {
            return Err(ConfigError::InvalidSyncBackoffJitter {
                value: self.backoff_jitter,
            });
        }
        if !(1..=300).contains(&self.push_timeout_seconds) {
            return Err(ConfigError::InvalidSyncPushTimeout {
                value: self.push_timeout_seconds,
            });
        }
        if self.tick_ms == 0 || self.claim_batch == 0 || self.lease_seconds == 0 {
            return Err(ConfigError::InvalidSyncPolling);
        }
        Ok(())
    }

    pub fn push_timeout(&self) -> Duration {
        Duration::from_secs(self.push_timeout_seconds)
    }

    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    pub fn lease(&self) -> Duration {
        Duration::from_secs(self.lease_seconds)
    }

    pub fn health_check_interval(&self) -> Option<Duration> {
        (self.health_check_interval_seconds > 0)
            .then(|| Duration::from_secs(self.health_check_interval_seconds))
    }
}

fn default_profile() -> String {
    "local".to_string()
}

fn default_api_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "json".to_string()
}

fn default_database_url() -> String {
    "postgresql://localhost:5432/attendance".to_string()
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_db_acquire_timeout_ms() -> u64 {
    5000
}

fn default_business_utc_offset() -> String {
    "+05:30".to_string()
}

fn default_min_clock_out_local() -> String {
    "19:00".to_string()
}

fn default_late_cutoff_local() -> String {
    "09:30".to_string()
}

fn default_sync_workers() -> usize {
    5
}

fn default_sync_max_attempts() -> u32 {
    5
}

fn default_sync_backoff_base_ms() -> u64 {
    1000
}

fn default_sync_backoff_factor() -> f64 {
    2.0
}

fn default_sync_backoff_max_ms() -> u64 {
    300_000
}

fn default_sync_backoff_jitter() -> f64 {
    0.1
}

fn default_sync_push_timeout_seconds() -> u64 {
    30
}

fn default_sync_tick_ms() -> u64 {
    1000
}

fn default_sync_claim_batch() -> u64 {
    20
}

fn default_sync_lease_seconds() -> u64 {
    120
}

fn default_sync_health_check_interval_seconds() -> u64 {
    900
}

fn default_refresh_timeout_seconds() -> u64 {
    5
}

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load environment file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        source: dotenvy::Error,
    },
    #[error("invalid api bind address '{value}': {source}")]
    InvalidBindAddr {
        value: String,
        source: std::net::AddrParseError,
    },
    #[error("invalid value '{value}' for ATTENDANCE_{key}")]
    InvalidValue { key: String, value: String },
    #[error("invalid URL '{value}' for ATTENDANCE_{key}: {source}")]
    InvalidUrl {
        key: String,
        value: String,
        source: url::ParseError,
    },
    #[error(transparent)]
    Calendar(#[from] CalendarError),
    #[error(
        "no operator tokens configured; set ATTENDANCE_OPERATOR_TOKEN or ATTENDANCE_OPERATOR_TOKENS"
    )]
    MissingOperatorTokens,
    #[error("HR push base URL is missing; set ATTENDANCE_HR_PUSH_BASE_URL")]
    MissingHrPushBaseUrl,
    #[error("HR device identifier is missing; set ATTENDANCE_HR_DEVICE_ID")]
    MissingHrDeviceId,
    #[error("sync workers must be between 1 and 50, got {value}")]
    InvalidSyncWorkers { value: usize },
    #[error("sync max attempts must be between 1 and 20, got {value}")]
    InvalidSyncMaxAttempts { value: u32 },
    #[error("sync backoff factor must be at least 1.0, got {value}")]
    InvalidSyncBackoffFactor { value: f64 },
    #[error("sync backoff base ({base} ms) cannot be greater than max ({max} ms)")]
    InvalidSyncBackoffBounds { base: u64, max: u64 },
    #[error("sync backoff jitter must be between 0.0 and 1.0, got {value}")]
    InvalidSyncBackoffJitter { value: f64 },
    #[error("sync push timeout must be between 1 and 300 seconds, got {value}")]
    InvalidSyncPushTimeout { value: u64 },
    #[error("sync tick, claim batch and lease must all be positive")]
    InvalidSyncPolling,
    #[error("refresh webhook timeout must be positive, got {value}")]
    InvalidRefreshTimeout { value: u64 },
}

/// Loads configuration using layered `.env` files and `ATTENDANCE_*` env vars.
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

    /// Loads `.env`, `.env.local`, `.env.<profile>`, `.env.<profile>.local` and finally the
    /// process environment, later sources winning.
    pub fn load(&self) -> Result<AppConfig, ConfigError> {
        let (mut layered, profile_hint) = self.collect_layered_env()?;

        // Overlay process environment last so it wins.
        for (key, value) in env::vars() {
            if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
                layered.insert(stripped.to_string(), value);
            }
        }

        let profile = take_string(&mut layered, "PROFILE").unwrap_or(profile_hint);

        // Support both a single token and a comma-separated list
        let operator_tokens = if let Some(tokens) = layered.remove("OPERATOR_TOKENS") {
            tokens
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        } else if let Some(token) = take_string(&mut layered, "OPERATOR_TOKEN") {
            vec![token]
        } else {
            Vec::new()
        };

        let sync = SyncConfig {
            workers: take_parsed(&mut layered, "SYNC_WORKERS", default_sync_workers)?,
            max_attempts: take_parsed(&mut layered, "SYNC_MAX_ATTEMPTS", default_sync_max_attempts)?,
            backoff_base_ms: take_parsed(
                &mut layered,
                "SYNC_BACKOFF_BASE_MS",
                default_sync_backoff_base_ms,
            )?,
            backoff_factor: take_parsed(
                &mut layered,
                "SYNC_BACKOFF_FACTOR",
                default_sync_backoff_factor,
            )?,
            backoff_max_ms: take_parsed(
                &mut layered,
                "SYNC_BACKOFF_MAX_MS",
                default_sync_backoff_max_ms,
            )?,
            backoff_jitter: take_parsed(
                &mut layered,
                "SYNC_BACKOFF_JITTER",
                default_sync_backoff_jitter,
            )?,
            push_timeout_seconds: take_parsed(
                &mut layered,
                "SYNC_PUSH_TIMEOUT_SECONDS",
                default_sync_push_timeout_seconds,
            )?,
            tick_ms: take_parsed(&mut layered, "SYNC_TICK_MS", default_sync_tick_ms)?,
            claim_batch: take_parsed(&mut layered, "SYNC_CLAIM_BATCH", default_sync_claim_batch)?,
            lease_seconds: take_parsed(&mut layered, "SYNC_LEASE_SECONDS", default_sync_lease_seconds)?,
            health_check_interval_seconds: take_parsed(
                &mut layered,
                "SYNC_HEALTH_CHECK_INTERVAL_SECONDS",
                default_sync_health_check_interval_seconds,
            )?,
        };

        let hr_push = HrPushConfig {
            base_url: take_string(&mut layered, "HR_PUSH_BASE_URL"),
            api_key: take_string(&mut layered, "HR_PUSH_API_KEY"),
            device_id: take_string(&mut layered, "HR_DEVICE_ID"),
        };

        let refresh = RefreshConfig {
            webhook_url: take_string(&mut layered, "REFRESH_WEBHOOK_URL"),
            timeout_seconds: take_parsed(
                &mut layered,
                "REFRESH_TIMEOUT_SECONDS",
                default_refresh_timeout_seconds,
            )?,
        };

        let config = AppConfig {
            profile,
            api_bind_addr: take_string(&mut layered, "API_BIND_ADDR")
                .unwrap_or_else(default_api_bind_addr),
            log_level: take_string(&mut layered, "LOG_LEVEL").unwrap_or_else(default_log_level),
            log_format: take_string(&mut layered, "LOG_FORMAT").unwrap_or_else(default_log_format),
            database_url: take_string(&mut layered, "DATABASE_URL")
                .unwrap_or_else(default_database_url),
            db_max_connections: take_parsed(
                &mut layered,
                "DB_MAX_CONNECTIONS",
                default_db_max_connections,
            )?,
            db_acquire_timeout_ms: take_parsed(
                &mut layered,
                "DB_ACQUIRE_TIMEOUT_MS",
                default_db_acquire_timeout_ms,
            )?,
            operator_tokens,
            business_utc_offset: take_string(&mut layered, "BUSINESS_UTC_OFFSET")
                .unwrap_or_else(default_business_utc_offset),
            min_clock_out_local: take_string(&mut layered, "MIN_CLOCK_OUT_LOCAL")
                .unwrap_or_else(default_min_clock_out_local),
            late_cutoff_local: take_string(&mut layered, "LATE_CUTOFF_LOCAL")
                .unwrap_or_else(default_late_cutoff_local),
            sync,
            hr_push,
            refresh,
        };

        config.validate()?;

        match config.bind_addr() {
            Ok(_) => Ok(config),
            Err(source) => Err(ConfigError::InvalidBindAddr {
                value: config.api_bind_addr.clone(),
                source,
            }),
        }
    }

    fn collect_layered_env(&self) -> Result<(BTreeMap<String, String>, String), ConfigError> {
        let mut values = BTreeMap::new();

        self.merge_dotenv(self.base_dir.join(".env"), &mut values)?;
        self.merge_dotenv(self.base_dir.join(".env.local"), &mut values)?;

        let profile = env::var(format!("{ENV_PREFIX}PROFILE"))
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
                    if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
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

/// Removes a key, treating blank values as unset.
fn take_string(layered: &mut BTreeMap<String, String>, key: &str) -> Option<String> {
    layered
        .remove(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn take_parsed<T: FromStr>(
    layered: &mut BTreeMap<String, String>,
    key: &str,
    default: fn() -> T,
) -> Result<T, ConfigError> {
    match take_string(layered, key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::InvalidValue {
            key: key.to_string(),
            value: raw,
        }),
        None => Ok(default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate_for_local_profile() {
        let config = AppConfig::default();
        config.validate().unwrap();
        assert_eq!(config.calendar().unwrap(), BusinessCalendar::default());
        assert_eq!(
            config.min_clock_out_time().unwrap(),
            NaiveTime::from_hms_opt(19, 0, 0).unwrap()
        );
    }

    #[test]
    fn production_profile_requires_push_settings() {
        let mut config = AppConfig {
            profile: "production".to_string(),
            operator_tokens: vec!["token".to_string()],
            ..AppConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingHrPushBaseUrl)
        ));

        config.hr_push.base_url = Some("https://hr.example.com".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::MissingHrDeviceId)));

        config.hr_push.device_id = Some("device-1".to_string());
        config.validate().unwrap();
    }

    #[test]
    fn sync_bounds_are_enforced() {
        let mut sync = SyncConfig::default();
        sync.workers = 0;
        assert!(matches!(sync.validate(), Err(ConfigError::InvalidSyncWorkers { .. })));

        let mut sync = SyncConfig::default();
        sync.backoff_factor = 0.5;
        assert!(matches!(
            sync.validate(),
            Err(ConfigError::InvalidSyncBackoffFactor { .. })
        ));

        let mut sync = SyncConfig::default();
        sync.backoff_base_ms = sync.backoff_max_ms + 1;
        assert!(matches!(
            sync.validate(),
            Err(ConfigError::InvalidSyncBackoffBounds { .. })
        ));
    }

    #[test]
    fn bad_offset_is_rejected() {
        let config = AppConfig {
            business_utc_offset: "+15:00".to_string(),
            ..AppConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Calendar(_))));
    }

    #[test]
    fn redaction_hides_secrets() {
        let config = AppConfig {
            operator_tokens: vec!["super-secret".to_string()],
            hr_push: HrPushConfig {
                api_key: Some("hr-key".to_string()),
                ..HrPushConfig::default()
            },
            ..AppConfig::default()
        };
        let json = config.redacted_json().unwrap();
        assert!(!json.contains("super-secret"));
        assert!(!json.contains("hr-key"));
    }
}
