use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::Path;
use std::time::Duration;

use masjid_bot_protocol::normalize_number;
use serde::Deserialize;
use thiserror::Error;
use tokio::fs;

use crate::queue::QueueConfig;

// ============================================================================
// Config (root)
// ============================================================================

/// Service configuration: optional YAML file, then environment overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    /// Raw allow-list entries; see [`Config::admin_list`].
    #[serde(default)]
    pub admin_numbers: Vec<String>,
    #[serde(default)]
    pub automation: AutomationConfig,
    #[serde(default)]
    pub sheets: SheetsConfig,
    #[serde(default)]
    pub prayer: PrayerConfig,
    #[serde(default)]
    pub ai: AiConfig,
    #[serde(default)]
    pub queue: QueueSettings,
}

impl Config {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = match fs::read_to_string(path).await {
            Ok(c) => c,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(ConfigError::Io(e)),
        };
        Ok(serde_saphyr::from_str(&contents)?)
    }

    /// Load the file and overlay the process environment.
    pub async fn load_with_env(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let mut config = Self::load(path).await?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Overlay values from an environment lookup. Set variables win over the file.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = var("HOST") {
            self.server.host = v;
        }
        if let Some(v) = var("PORT") {
            self.server.port = parse_var("PORT", &v)?;
        }
        if let Some(v) = var("REQUEST_TIMEOUT_SECONDS") {
            self.server.request_timeout_seconds = parse_var("REQUEST_TIMEOUT_SECONDS", &v)?;
        }

        if let Some(v) = var("WAHA_BASE_URL") {
            self.gateway.base_url = v;
        }
        if let Some(v) = var("WAHA_API_KEY") {
            self.gateway.api_key = v;
        }
        if let Some(v) = var("WA_SESSION_NAME") {
            self.gateway.session = v;
        }
        if let Some(v) = var("WEBHOOK_URL") {
            self.gateway.webhook_url = Some(v);
        }
        if let Some(v) = var("WAHA_WEBSOCKET") {
            self.gateway.websocket = parse_flag("WAHA_WEBSOCKET", &v)?;
        }

        if let Some(v) = var("ADMIN_NUMBERS") {
            self.admin_numbers = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }

        if let Some(v) = var("N8N_WEBHOOK_URL") {
            self.automation.webhook_url = Some(v);
        }

        if let Some(v) = var("GOOGLE_SHEETS_API_KEY") {
            self.sheets.api_key = Some(v);
        }
        if let Some(v) = var("GOOGLE_SHEETS_ID") {
            self.sheets.spreadsheet_id = Some(v);
        }
        if let Some(v) = var("GOOGLE_SHEETS_BASE_URL") {
            self.sheets.base_url = v;
        }

        if let Some(v) = var("PRAYER_API_BASE") {
            self.prayer.primary_base_url = v;
        }
        if let Some(v) = var("MYQURAN_API_BASE") {
            self.prayer.fallback_base_url = v;
        }
        if let Some(v) = var("DEFAULT_CITY") {
            self.prayer.default_city = v;
        }

        if let Some(v) = var("OPENROUTER_API_KEY") {
            self.ai.api_key = Some(v);
        }
        if let Some(v) = var("OPENROUTER_MODEL") {
            self.ai.model = v;
        }
        if let Some(v) = var("OPENROUTER_BASE_URL") {
            self.ai.base_url = v;
        }

        if let Some(v) = var("QUEUE_SEND_DELAY_MS") {
            self.queue.send_delay_ms = parse_var("QUEUE_SEND_DELAY_MS", &v)?;
        }
        if let Some(v) = var("QUEUE_MAX_ATTEMPTS") {
            self.queue.max_attempts = parse_var("QUEUE_MAX_ATTEMPTS", &v)?;
        }
        if let Some(v) = var("QUEUE_BACKOFF_MS") {
            self.queue.backoff_ms = parse_var("QUEUE_BACKOFF_MS", &v)?;
        }

        Ok(())
    }

    /// Validate and normalize the admin allow-list.
    pub fn admin_list(&self) -> Result<AdminList, ConfigError> {
        AdminList::parse(self.admin_numbers.iter().map(String::as_str))
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_flag(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

// ============================================================================
// ServerConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3001
}

fn default_request_timeout() -> u64 {
    60
}

// ============================================================================
// GatewayConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_url")]
    pub base_url: String,
    #[serde(default = "default_gateway_key")]
    pub api_key: String,
    #[serde(default = "default_session")]
    pub session: String,
    /// Public URL of `/webhook/waha`, registered with the gateway at startup.
    #[serde(default)]
    pub webhook_url: Option<String>,
    /// Also consume events over the gateway WebSocket.
    #[serde(default)]
    pub websocket: bool,
    #[serde(default = "default_gateway_timeout")]
    pub timeout_seconds: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_url(),
            api_key: default_gateway_key(),
            session: default_session(),
            webhook_url: None,
            websocket: false,
            timeout_seconds: default_gateway_timeout(),
        }
    }
}

impl GatewayConfig {
    pub fn waha(&self) -> masjid_bot_waha::WahaConfig {
        masjid_bot_waha::WahaConfig {
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            session: self.session.clone(),
            timeout: Duration::from_secs(self.timeout_seconds),
        }
    }
}

fn default_gateway_url() -> String {
    "http://localhost:3000".to_string()
}

fn default_gateway_key() -> String {
    "admin".to_string()
}

fn default_session() -> String {
    "default".to_string()
}

fn default_gateway_timeout() -> u64 {
    30
}

// ============================================================================
// AutomationConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AutomationConfig {
    #[serde(default)]
    pub webhook_url: Option<String>,
    #[serde(default = "default_automation_timeout")]
    pub timeout_seconds: u64,
}

impl Default for AutomationConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout_seconds: default_automation_timeout(),
        }
    }
}

fn default_automation_timeout() -> u64 {
    30
}

// ============================================================================
// SheetsConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct SheetsConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub spreadsheet_id: Option<String>,
    #[serde(default = "default_sheets_url")]
    pub base_url: String,
}

impl Default for SheetsConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            spreadsheet_id: None,
            base_url: default_sheets_url(),
        }
    }
}

fn default_sheets_url() -> String {
    "https://sheets.googleapis.com/v4/spreadsheets".to_string()
}

// ============================================================================
// PrayerConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct PrayerConfig {
    #[serde(default = "default_prayer_primary")]
    pub primary_base_url: String,
    #[serde(default = "default_prayer_fallback")]
    pub fallback_base_url: String,
    #[serde(default = "default_city")]
    pub default_city: String,
    #[serde(default = "default_prayer_timeout")]
    pub timeout_seconds: u64,
}

impl Default for PrayerConfig {
    fn default() -> Self {
        Self {
            primary_base_url: default_prayer_primary(),
            fallback_base_url: default_prayer_fallback(),
            default_city: default_city(),
            timeout_seconds: default_prayer_timeout(),
        }
    }
}

fn default_prayer_primary() -> String {
    "https://api.aladhan.com/v1".to_string()
}

fn default_prayer_fallback() -> String {
    "https://api.myquran.com/v2".to_string()
}

fn default_city() -> String {
    "Jakarta".to_string()
}

fn default_prayer_timeout() -> u64 {
    10
}

// ============================================================================
// AiConfig
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct AiConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_ai_model")]
    pub model: String,
    #[serde(default = "default_ai_url")]
    pub base_url: String,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_ai_model(),
            base_url: default_ai_url(),
        }
    }
}

fn default_ai_model() -> String {
    "z-ai/glm-4.5-air:free".to_string()
}

fn default_ai_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

// ============================================================================
// QueueSettings
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct QueueSettings {
    #[serde(default = "default_send_delay")]
    pub send_delay_ms: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff")]
    pub backoff_ms: u64,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            send_delay_ms: default_send_delay(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff(),
        }
    }
}

impl QueueSettings {
    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            send_delay: Duration::from_millis(self.send_delay_ms),
            max_attempts: self.max_attempts.max(1),
            backoff_unit: Duration::from_millis(self.backoff_ms),
        }
    }
}

fn default_send_delay() -> u64 {
    1000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff() -> u64 {
    5000
}

// ============================================================================
// AdminList
// ============================================================================

/// Normalized admin phone numbers, validated once at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdminList {
    numbers: BTreeSet<String>,
}

impl AdminList {
    pub fn parse<'a>(entries: impl IntoIterator<Item = &'a str>) -> Result<Self, ConfigError> {
        let mut numbers = BTreeSet::new();
        for entry in entries {
            if entry.trim().is_empty() {
                continue;
            }
            let number = normalize_number(entry);
            if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
                return Err(ConfigError::InvalidAdminNumber(entry.to_string()));
            }
            numbers.insert(number);
        }
        Ok(Self { numbers })
    }

    /// Membership check; `who` may be bare or suffixed.
    pub fn contains(&self, who: &str) -> bool {
        self.numbers.contains(&normalize_number(who))
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.numbers.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }
}

// ============================================================================
// ConfigError
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_saphyr::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("invalid admin number: {0:?}")]
    InvalidAdminNumber(String),
}

// ============================================================================
// Tests
// ============================================================================
