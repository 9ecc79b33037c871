// ABOUTME: Configuration parsing from TOML file with environment variable overrides
// ABOUTME: Validates required fields and provides sensible defaults for optional ones
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub director: DirectorConfig,
    pub twitch: TwitchConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorConfig {
    /// WebSocket endpoint of the director service (ws:// or wss://)
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwitchConfig {
    pub channel: String,
    pub bot_name: String,
    pub client_id: String,
    /// Names that count as a mention; defaults to the bot name
    #[serde(default)]
    pub mention_aliases: Vec<String>,
    #[serde(default = "default_chat_url")]
    pub chat_url: String,
    #[serde(default = "default_device_endpoint")]
    pub device_endpoint: String,
    #[serde(default = "default_token_endpoint")]
    pub token_endpoint: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_http_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
        }
    }
}

fn default_chat_url() -> String {
    "wss://irc-ws.chat.twitch.tv:443".to_string()
}

fn default_device_endpoint() -> String {
    "https://id.twitch.tv/oauth2/device".to_string()
}

fn default_token_endpoint() -> String {
    "https://id.twitch.tv/oauth2/token".to_string()
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    8004
}

impl Config {
    /// Find the config file, checking in order:
    /// 1. BRIDGE_CONFIG_PATH env var (if set)
    /// 2. ./config.toml (current directory)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("BRIDGE_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        None
    }

    /// Load configuration from config.toml with environment variable overrides
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration, preferring an explicitly supplied path (--config)
    /// over BRIDGE_CONFIG_PATH and ./config.toml.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(explicit) => Some(explicit.to_path_buf()),
            None => Self::find_config_file(),
        };

        let mut config = if let Some(config_path) = config_path {
            tracing::info!(
                path = %config_path.display(),
                "Loading configuration from file"
            );
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read {}", config_path.display()))?;
            toml::from_str::<Config>(&content)
                .with_context(|| format!("Failed to parse {}", config_path.display()))?
        } else {
            tracing::info!("No config file found, using environment variables and defaults");
            Config {
                director: DirectorConfig { url: String::new() },
                twitch: TwitchConfig {
                    channel: String::new(),
                    bot_name: String::new(),
                    client_id: String::new(),
                    mention_aliases: Vec::new(),
                    chat_url: default_chat_url(),
                    device_endpoint: default_device_endpoint(),
                    token_endpoint: default_token_endpoint(),
                },
                http: HttpConfig::default(),
            }
        };

        // Override with environment variables if present
        if let Ok(val) = std::env::var("DIRECTOR_URL") {
            config.director.url = val;
        }
        if let Ok(val) = std::env::var("TWITCH_CHANNEL") {
            config.twitch.channel = val;
        }
        if let Ok(val) = std::env::var("TWITCH_BOT_NAME") {
            config.twitch.bot_name = val;
        }
        if let Ok(val) = std::env::var("TWITCH_CLIENT_ID") {
            config.twitch.client_id = val;
        }
        if let Ok(val) = std::env::var("TWITCH_MENTION_ALIASES") {
            config.twitch.mention_aliases = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(val) = std::env::var("TWITCH_CHAT_URL") {
            config.twitch.chat_url = val;
        }
        if let Ok(val) = std::env::var("TWITCH_DEVICE_ENDPOINT") {
            config.twitch.device_endpoint = val;
        }
        if let Ok(val) = std::env::var("TWITCH_TOKEN_ENDPOINT") {
            config.twitch.token_endpoint = val;
        }
        if let Ok(val) = std::env::var("HTTP_HOST") {
            config.http.host = val;
        }
        if let Ok(val) = std::env::var("HTTP_PORT") {
            config.http.port = val
                .parse()
                .with_context(|| format!("HTTP_PORT must be a valid port number, got: {}", val))?;
        }

        // Validate required fields
        if config.director.url.trim().is_empty() {
            anyhow::bail!(
                "director.url is required (set in config.toml or DIRECTOR_URL env var)"
            );
        }
        if !config.director.url.starts_with("ws://") && !config.director.url.starts_with("wss://")
        {
            anyhow::bail!(
                "director.url must be a ws:// or wss:// URL, got: {}",
                config.director.url
            );
        }
        if config.twitch.channel.trim().is_empty() {
            anyhow::bail!(
                "twitch.channel is required (set in config.toml or TWITCH_CHANNEL env var)"
            );
        }
        if config.twitch.bot_name.trim().is_empty() {
            anyhow::bail!(
                "twitch.bot_name is required (set in config.toml or TWITCH_BOT_NAME env var)"
            );
        }
        if config.twitch.client_id.trim().is_empty() {
            anyhow::bail!(
                "twitch.client_id is required (set in config.toml or TWITCH_CLIENT_ID env var)"
            );
        }
        if !config.twitch.chat_url.starts_with("ws://")
            && !config.twitch.chat_url.starts_with("wss://")
        {
            anyhow::bail!(
                "twitch.chat_url must be a ws:// or wss:// URL, got: {}",
                config.twitch.chat_url
            );
        }

        // A bot that cannot recognize its own name gets no mentions
        config
            .twitch
            .mention_aliases
            .retain(|s| !s.trim().is_empty());
        if config.twitch.mention_aliases.is_empty() {
            config.twitch.mention_aliases = vec![config.twitch.bot_name.to_lowercase()];
        }

        Ok(config)
    }
}
