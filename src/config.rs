use crate::storage::StorageConfig;
use crate::user::User;
use anyhow::Error;
use serde::{Deserialize, Serialize};

pub const DEFAULT_WAITING_NOTICE: &str =
    "Please hold while we connect you to the person who sent this message.";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub http_addr: String,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    pub telephony: TelephonyConfig,
    pub storage: StorageConfig,
    pub callrecord: CallRecordConfig,
    pub assets: AssetsConfig,
    pub auth: AuthConfig,
    pub call: CallConfig,
    pub users: Vec<User>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TelephonyConfig {
    pub account_sid: String,
    pub auth_token: String,
    /// Number every outbound call is placed from.
    pub from_number: String,
    /// Where the provider posts call status events.
    pub status_callback_url: String,
    pub api_base: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallRecordConfig {
    Memory,
    Storage { root: String },
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct AssetsConfig {
    pub catalog_path: Option<String>,
    /// Fixed seed for category selection; OS entropy when unset.
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuthConfig {
    /// HMAC key for bearer tokens. A random per-process key is used when
    /// unset, so tokens then only live as long as the process.
    pub token_secret: Option<String>,
    pub token_ttl_hours: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CallConfig {
    pub waiting_notice: String,
}

impl Default for TelephonyConfig {
    fn default() -> Self {
        Self {
            account_sid: String::new(),
            auth_token: String::new(),
            from_number: String::new(),
            status_callback_url: "http://localhost:8080/status".to_string(),
            api_base: "https://api.twilio.com".to_string(),
            timeout_secs: 15,
        }
    }
}

impl Default for CallRecordConfig {
    fn default() -> Self {
        Self::Memory
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_secret: None,
            token_ttl_hours: 24,
        }
    }
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            waiting_notice: DEFAULT_WAITING_NOTICE.to_string(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: "0.0.0.0:8080".to_string(),
            log_level: Some("info".to_string()),
            log_file: None,
            telephony: TelephonyConfig::default(),
            storage: StorageConfig::default(),
            callrecord: CallRecordConfig::default(),
            assets: AssetsConfig::default(),
            auth: AuthConfig::default(),
            call: CallConfig::default(),
            users: Vec::new(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self, Error> {
        let config = toml::from_str(
            &std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("{}: {}", e, path))?,
        )?;
        Ok(config)
    }
}
