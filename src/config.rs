use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";
const DEFAULT_TRMNL_API_BASE: &str = "https://usetrmnl.com/api";

/// Environment variable consulted when `telegram.bot_token` is empty.
pub const BOT_TOKEN_ENV: &str = "TELEGRAM_BOT_TOKEN";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub trmnl: TrmnlConfig,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub api_base: String,
    /// Only this sender may use the bot, when set.
    #[serde(default)]
    pub filter_user_id: Option<i64>,
}

impl TelegramConfig {
    /// Returns the effective api_base: if the stored value is empty,
    /// fall back to the public Bot API.
    pub fn effective_api_base(&self) -> &str {
        effective(&self.api_base, DEFAULT_TELEGRAM_API_BASE)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct TrmnlConfig {
    #[serde(default)]
    pub api_base: String,
    pub destination: Destination,
}

impl TrmnlConfig {
    pub fn effective_api_base(&self) -> &str {
        effective(&self.api_base, DEFAULT_TRMNL_API_BASE)
    }

    /// Full URL the payload is POSTed to.
    pub fn endpoint(&self) -> String {
        match &self.destination {
            Destination::Templated { plugin_id } => format!(
                "{}/custom_plugins/{}",
                self.effective_api_base(),
                plugin_id.trim()
            ),
            Destination::Fixed { url } => url.trim().to_string(),
        }
    }
}

/// Where the payload goes: a plugin UUID slotted into the TRMNL API URL, or
/// a complete URL.
#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(tag = "mode", rename_all = "lowercase")]
pub enum Destination {
    Templated { plugin_id: String },
    Fixed { url: String },
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// Errors are reported inside a successful outcome so the surrounding
    /// workflow keeps running.
    #[default]
    Soft,
    /// Errors are returned to the caller.
    Strict,
}

impl std::fmt::Display for FailureMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureMode::Soft => write!(f, "soft"),
            FailureMode::Strict => write!(f, "strict"),
        }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DeliveryConfig {
    #[serde(default)]
    pub failure_mode: FailureMode,
}

fn effective<'a>(value: &'a str, default: &'a str) -> &'a str {
    let value = value.trim().trim_end_matches('/');
    if value.is_empty() {
        default
    } else {
        value
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::parse(&content)?;

        if config.telegram.bot_token.trim().is_empty() {
            config.telegram.bot_token = std::env::var(BOT_TOKEN_ENV).unwrap_or_default();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    pub fn validate(&self) -> Result<()> {
        if self.telegram.bot_token.trim().is_empty() {
            anyhow::bail!(
                "No Telegram bot token: set telegram.bot_token or {}",
                BOT_TOKEN_ENV
            );
        }

        match &self.trmnl.destination {
            Destination::Templated { plugin_id } => {
                uuid::Uuid::parse_str(plugin_id.trim()).with_context(|| {
                    format!("trmnl.destination.plugin_id is not a UUID: {}", plugin_id)
                })?;
            }
            Destination::Fixed { url } => {
                let parsed = reqwest::Url::parse(url.trim())
                    .with_context(|| format!("trmnl.destination.url is not a URL: {}", url))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    anyhow::bail!("trmnl.destination.url must be http(s): {}", url);
                }
            }
        }

        Ok(())
    }
}
