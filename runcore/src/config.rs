use anyhow::{Context, Result};
use liblistener::ListenerConfig;
use libsandbox::SandboxConfig;
use libtask::SchedulerConfig;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Env var consulted when the config file carries no bot token.
pub const TOKEN_ENV: &str = "CORE_BOT_TOKEN";

#[derive(Debug, Default, Deserialize)]
pub struct CoreConfig {
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub listener: ListenerConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
    #[serde(default)]
    pub notify: NotifyConfig,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DiagnosticsConfig {
    // defaults to listing the executable's directory
    pub command: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotifyConfig {
    #[serde(default = "default_api_base")]
    pub api_base: String,
    pub token: Option<String>,
    pub chat_id: Option<String>,
    #[serde(default = "default_message")]
    pub message: String,
    #[serde(default = "default_parse_mode")]
    pub parse_mode: String,
    #[serde(default = "default_keyboard")]
    pub keyboard: Vec<Vec<String>>,
}

fn default_api_base() -> String {
    "https://api.telegram.org".to_string()
}

fn default_message() -> String {
    "Choose an option:".to_string()
}

fn default_parse_mode() -> String {
    "Markdown".to_string()
}

fn default_keyboard() -> Vec<Vec<String>> {
    vec![vec!["🆘".to_string(), "⚖️".to_string()]]
}

impl Default for NotifyConfig {
    fn default() -> Self {
        NotifyConfig {
            api_base: default_api_base(),
            token: None,
            chat_id: None,
            message: default_message(),
            parse_mode: default_parse_mode(),
            keyboard: default_keyboard(),
        }
    }
}

impl NotifyConfig {
    /// Token and chat id, if both are known.
    pub fn credentials(&self) -> Option<(String, String)> {
        let token = self
            .token
            .clone()
            .or_else(|| std::env::var(TOKEN_ENV).ok())
            .filter(|t| !t.is_empty())?;
        let chat_id = self.chat_id.clone().filter(|c| !c.is_empty())?;
        Some((token, chat_id))
    }
}

pub fn load_config(path: &Path) -> Result<CoreConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    let cfg: CoreConfig = serde_yaml::from_str(&content).context("Failed to parse YAML config")?;
    Ok(cfg)
}
