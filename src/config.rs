//! Settings file loading.
//!
//! ```toml
//! [casb]
//! username = "reader"
//! password = "..."
//! report_url = "https://casb.example.com/cwc/api/riskscore.csv"
//!
//! [directory]
//! groups = "risk-low,risk-medium,risk-high"
//! mail_nickname = false
//! revoke_sessions = true
//!
//! [sync]
//! interval_minutes = 10
//!
//! [logging]
//! json = false
//!
//! [[tiers]]
//! range = "0-39"
//! group = "risk-low"
//!
//! [[tiers]]
//! range = "70+"
//! group = "risk-high"
//! ```
//!
//! Credentials may instead come from the environment (`CASB_USER_NAME`,
//! `CASB_PASSWORD`, `RISK_SCORE_URL`, `AZURE_ADMIN_LOGIN_NAME`,
//! `AZURE_ADMIN_LOGIN_PASSWORD`), which take precedence over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::directory::AdminCredentials;
use crate::error::RiskSyncError;
use crate::tiering::TierMap;

const MAX_CONFIG_FILE_SIZE: u64 = 64 * 1024; // 64 KiB
const DEFAULT_INTERVAL_MINUTES: u64 = 5;

/// File name looked up in the home directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "azure_casb.toml";

pub const ENV_CASB_USER: &str = "CASB_USER_NAME";
pub const ENV_CASB_PASSWORD: &str = "CASB_PASSWORD";
pub const ENV_REPORT_URL: &str = "RISK_SCORE_URL";
pub const ENV_ADMIN_LOGIN: &str = "AZURE_ADMIN_LOGIN_NAME";
pub const ENV_ADMIN_PASSWORD: &str = "AZURE_ADMIN_LOGIN_PASSWORD";

// --- TOML deserialization structs (private, map 1:1 to TOML schema) ---

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    casb: CasbSection,
    #[serde(default)]
    directory: DirectorySection,
    #[serde(default)]
    sync: SyncSection,
    #[serde(default)]
    logging: LoggingSection,
    #[serde(default)]
    tiers: Vec<TierEntry>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CasbSection {
    username: Option<String>,
    password: Option<String>,
    report_url: Option<String>,
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct DirectorySection {
    admin_login: Option<String>,
    admin_password: Option<String>,
    #[serde(default)]
    groups: String,
    #[serde(default)]
    mail_nickname: bool,
    #[serde(default)]
    revoke_sessions: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct SyncSection {
    #[serde(default = "default_interval")]
    interval_minutes: u64,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
        }
    }
}

fn default_interval() -> u64 {
    DEFAULT_INTERVAL_MINUTES
}

#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct LoggingSection {
    #[serde(default)]
    json: bool,
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TierEntry {
    range: String,
    group: String,
}

// --- Validated settings ---

pub struct Settings {
    pub casb: CasbSettings,
    pub admin: AdminCredentials,
    pub sync: SyncSettings,
    pub log_json: bool,
}

pub struct CasbSettings {
    pub username: String,
    pub password: SecretString,
    pub report_url: String,
}

/// The part of the settings a running sync re-reads on config change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncSettings {
    pub tier_groups: Vec<String>,
    pub tiers: TierMap,
    pub interval: Duration,
    pub mail_nickname: bool,
    pub revoke_sessions: bool,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("report_url", &self.casb.report_url)
            .field("casb_username", &self.casb.username)
            .field("admin", &self.admin)
            .field("sync", &self.sync)
            .field("log_json", &self.log_json)
            .finish()
    }
}

impl Settings {
    /// Load settings from a file, with environment overrides.
    pub fn load(path: &Path) -> Result<Self, RiskSyncError> {
        let content = read_config_file(path)?;
        Self::from_toml(&content, |key| std::env::var(key).ok())
    }

    /// Parse and validate settings. `env` looks up override variables.
    pub fn from_toml(
        content: &str,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, RiskSyncError> {
        let file: ConfigFile =
            toml::from_str(content).map_err(|e| RiskSyncError::ConfigLoad(e.to_string()))?;

        let lookup = |key: &str, from_file: Option<String>| {
            env(key)
                .filter(|v| !v.is_empty())
                .or(from_file)
                .filter(|v| !v.is_empty())
        };

        let casb = CasbSettings {
            username: lookup(ENV_CASB_USER, file.casb.username)
                .ok_or_else(|| missing("casb.username", ENV_CASB_USER))?,
            password: lookup(ENV_CASB_PASSWORD, file.casb.password)
                .map(SecretString::from)
                .ok_or_else(|| missing("casb.password", ENV_CASB_PASSWORD))?,
            report_url: lookup(ENV_REPORT_URL, file.casb.report_url)
                .ok_or_else(|| missing("casb.report_url", ENV_REPORT_URL))?,
        };

        let admin = AdminCredentials {
            login: lookup(ENV_ADMIN_LOGIN, file.directory.admin_login),
            password: lookup(ENV_ADMIN_PASSWORD, file.directory.admin_password)
                .map(SecretString::from),
        };

        let tier_groups = split_groups(&file.directory.groups);
        if tier_groups.is_empty() {
            return Err(RiskSyncError::ConfigLoad(
                "directory.groups must list at least one risk-level group".to_owned(),
            ));
        }

        if file.tiers.is_empty() {
            return Err(RiskSyncError::ConfigLoad(
                "at least one [[tiers]] range must be configured".to_owned(),
            ));
        }
        let tiers = TierMap::compile(
            file.tiers
                .iter()
                .map(|t| (t.range.as_str(), t.group.as_str())),
        )?;

        if file.sync.interval_minutes == 0 {
            return Err(RiskSyncError::ConfigLoad(
                "sync.interval_minutes must be at least 1".to_owned(),
            ));
        }

        Ok(Self {
            casb,
            admin,
            sync: SyncSettings {
                tier_groups,
                tiers,
                interval: Duration::from_secs(file.sync.interval_minutes * 60),
                mail_nickname: file.directory.mail_nickname,
                revoke_sessions: file.directory.revoke_sessions,
            },
            log_json: file.logging.json,
        })
    }
}

/// Read the config file, refusing anything over the size limit.
pub fn read_config_file(path: &Path) -> Result<String, RiskSyncError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| RiskSyncError::ConfigLoad(format!("cannot read {}: {e}", path.display())))?;

    if metadata.len() > MAX_CONFIG_FILE_SIZE {
        return Err(RiskSyncError::ConfigLoad(format!(
            "config file exceeds {MAX_CONFIG_FILE_SIZE} byte limit"
        )));
    }

    std::fs::read_to_string(path)
        .map_err(|e| RiskSyncError::ConfigLoad(format!("cannot read {}: {e}", path.display())))
}

/// Only the log format toggle, without validating the rest of the file.
pub fn read_log_json(path: &Path) -> Result<bool, RiskSyncError> {
    let file: ConfigFile = toml::from_str(&read_config_file(path)?)
        .map_err(|e| RiskSyncError::ConfigLoad(e.to_string()))?;
    Ok(file.logging.json)
}

/// The explicit path if given, otherwise `~/azure_casb.toml` when it exists.
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Result<PathBuf, RiskSyncError> {
    if let Some(path) = explicit {
        return Ok(path);
    }
    let home = dirs::home_dir().ok_or_else(|| {
        RiskSyncError::ConfigLoad("no --config given and home directory is unknown".to_owned())
    })?;
    let candidate = home.join(DEFAULT_CONFIG_FILE);
    if candidate.is_file() {
        Ok(candidate)
    } else {
        Err(RiskSyncError::ConfigLoad(format!(
            "no --config given and {} does not exist",
            candidate.display()
        )))
    }
}

fn split_groups(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|g| !g.is_empty())
        .map(str::to_owned)
        .collect()
}

fn missing(key: &str, env: &str) -> RiskSyncError {
    RiskSyncError::ConfigLoad(format!("{key} is missing (set it in the config file or {env})"))
}
