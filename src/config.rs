use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

#[derive(Debug, Clone)]
pub struct Config {
    pub bot: BotConfig,
    pub ledger: LedgerConfig,
    pub server: ServerConfig,
    /// Timeout applied to every outbound HTTP request
    pub http_timeout: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BotMode {
    Polling,
    Webhook,
}

#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Telegram bot token. Doubles as the webhook path secret.
    pub token: String,
    /// Chat id of the channel archives are uploaded to
    pub channel_id: i64,
    /// Lowercased suffix an upload must carry to be recorded, e.g. `.rar`
    pub archive_extension: String,
    pub mode: BotMode,
    pub api_url: String,
    /// Named in the warning sent when some files could not be delivered
    pub support_contact: String,
}

#[derive(Debug, Clone)]
pub enum SpreadsheetRef {
    Id(String),
    Name(String),
}

#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// Raw service-account key JSON
    pub credentials_json: String,
    pub spreadsheet: SpreadsheetRef,
    /// Tabs scanned when building the key map. The first one receives new rows.
    pub tabs: Vec<String>,
    /// Interval between key map rebuilds; `None` loads once at startup only.
    pub refresh_interval: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_address: String,
    /// Public base URL registered with Telegram in webhook mode
    pub webhook_url: Option<String>,
}

impl LedgerConfig {
    pub fn primary_tab(&self) -> &str {
        // validate() guarantees at least one tab
        self.tabs.first().map(String::as_str).unwrap_or_default()
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &'static str| var(name).ok_or(ConfigError::Missing(name));

        let token = required("BOT_TOKEN")?;

        let channel_raw = required("CHANNEL_ID")?;
        let channel_id: i64 = channel_raw.trim().parse().map_err(|_| {
            ConfigError::ValidationError(format!(
                "CHANNEL_ID must be an integer, got '{channel_raw}'"
            ))
        })?;

        let credentials_json = required("GOOGLE_SHEET_JSON")?;

        let spreadsheet = match (var("SHEET_ID"), var("SHEET_NAME")) {
            (Some(id), _) => SpreadsheetRef::Id(id.trim().to_string()),
            (None, Some(name)) => SpreadsheetRef::Name(name.trim().to_string()),
            (None, None) => return Err(ConfigError::Missing("SHEET_NAME")),
        };

        let tabs: Vec<String> = var("SHEET_TABS")
            .unwrap_or_else(|| "1".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let mut archive_extension = var("ARCHIVE_EXTENSION")
            .unwrap_or_else(|| ".rar".to_string())
            .trim()
            .to_lowercase();
        if !archive_extension.starts_with('.') {
            archive_extension.insert(0, '.');
        }

        let mode = match var("BOT_MODE")
            .unwrap_or_else(|| "webhook".to_string())
            .to_lowercase()
            .as_str()
        {
            "webhook" => BotMode::Webhook,
            "polling" => BotMode::Polling,
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "BOT_MODE must be 'webhook' or 'polling', got '{other}'"
                )))
            }
        };

        let refresh_secs: u64 = parse_or("LEDGER_REFRESH_SECS", var("LEDGER_REFRESH_SECS"), 0)?;
        let timeout_secs: u64 = parse_or("HTTP_TIMEOUT_SECS", var("HTTP_TIMEOUT_SECS"), 30)?;

        let config = Config {
            bot: BotConfig {
                token,
                channel_id,
                archive_extension,
                mode,
                api_url: var("TELEGRAM_API_URL")
                    .unwrap_or_else(|| "https://api.telegram.org".to_string())
                    .trim_end_matches('/')
                    .to_string(),
                support_contact: var("SUPPORT_CONTACT")
                    .unwrap_or_else(|| "the administrator".to_string()),
            },
            ledger: LedgerConfig {
                credentials_json,
                spreadsheet,
                tabs,
                refresh_interval: (refresh_secs > 0).then(|| Duration::from_secs(refresh_secs)),
            },
            server: ServerConfig {
                bind_address: var("BIND_ADDRESS").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
                webhook_url: var("WEBHOOK_URL").map(|u| u.trim_end_matches('/').to_string()),
            },
            http_timeout: Duration::from_secs(timeout_secs),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.bot.channel_id == 0 {
            return Err(ConfigError::ValidationError(
                "CHANNEL_ID cannot be 0".to_string(),
            ));
        }

        if self.ledger.tabs.is_empty() {
            return Err(ConfigError::ValidationError(
                "SHEET_TABS must name at least one tab".to_string(),
            ));
        }

        if self.bot.archive_extension.len() < 2 {
            return Err(ConfigError::ValidationError(
                "ARCHIVE_EXTENSION cannot be empty".to_string(),
            ));
        }

        if self.http_timeout.is_zero() {
            return Err(ConfigError::ValidationError(
                "HTTP_TIMEOUT_SECS must be greater than 0".to_string(),
            ));
        }

        if self.bot.mode == BotMode::Polling && self.server.webhook_url.is_some() {
            tracing::warn!("WEBHOOK_URL is ignored in polling mode");
        }

        Ok(())
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match value {
        None => Ok(default),
        Some(raw) => raw.trim().parse().map_err(|_| {
            ConfigError::ValidationError(format!(
                "{name} must be a non-negative integer, got '{raw}'"
            ))
        }),
    }
}
