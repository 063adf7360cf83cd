use anyhow::{anyhow, Result};
use std::path::PathBuf;
use tokio::io::AsyncReadExt;

const CONFIG_PATH_REL_HOME: &str = ".config/andybot/config.toml";
const CONFIG_PATH_ENV: &str = "ANDYBOT_CONFIG";
const DISCORD_TOKEN_ENV: &str = "DISCORD_API_TOKEN";
const OPENAI_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Bot configuration
#[derive(Debug, Default, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: General,
    pub discord: Discord,
    pub llm: Llm,
    pub cache: Cache,
    pub rate_limit: RateLimit,
    pub logging: Logging,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct General {
    pub command_prefix: String,
    pub bot_owners: Vec<String>,
    /// Reply to a mention that carries no question.  Silent if unset.
    pub greeting: Option<String>,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Discord {
    pub token: String,
    /// Discord's limit is 2000; leave room.
    pub max_message_length: usize,
    pub typing_indicator: bool,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Llm {
    pub api_key: String,
    pub chat_url: String,
    pub model_name: String,
    pub system: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub base_delay_ms: u64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Cache {
    pub enabled: bool,
    pub ttl_seconds: u64,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RateLimit {
    pub enabled: bool,
    pub window_seconds: u64,
    pub user_max: u32,
    pub guild_max: u32,
}

#[derive(Debug, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct Logging {
    /// `tracing` filter directive, e.g. `info` or `andybot=debug`.  `RUST_LOG` wins if set.
    pub level: String,
    /// Also write logs to a daily-rotated file at this path.
    pub file: Option<PathBuf>,
    pub json: bool,
}

impl Default for General {
    fn default() -> Self {
        Self {
            command_prefix: ";".to_owned(),
            bot_owners: Vec::new(),
            greeting: None,
        }
    }
}

impl Default for Discord {
    fn default() -> Self {
        Self {
            token: String::new(),
            max_message_length: 1900,
            typing_indicator: true,
        }
    }
}

impl Default for Llm {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            chat_url: "https://api.openai.com/v1/chat/completions".to_owned(),
            model_name: "gpt-4o-mini".to_owned(),
            system: "You are Andy, a robotic helper with the goal of providing one-to-two \
                     sentence responses to questions. If you are asked something that you \
                     cannot answer within a reasonable conciseness, ask the user to ask a \
                     different question. You can make jokes, or make fun of users' queries."
                .to_owned(),
            timeout_seconds: 30,
            max_retries: 3,
            base_delay_ms: 1000,
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_seconds: 3600,
        }
    }
}

impl Default for RateLimit {
    fn default() -> Self {
        Self {
            enabled: true,
            window_seconds: 60,
            user_max: 5,
            guild_max: 20,
        }
    }
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".to_owned(),
            file: None,
            json: false,
        }
    }
}

impl Config {
    fn config_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }

        dirs::home_dir()
            .map(|p| p.join(CONFIG_PATH_REL_HOME))
            .ok_or(anyhow!("Could not find home directory"))
    }

    /// Reads the configuration file, if any, applies credentials from the environment and
    /// validates the result.
    ///
    /// A missing file is not an error: every setting has a default and the credentials may
    /// come from the environment alone.
    pub async fn load() -> Result<Self> {
        // A missing .env is normal outside development.
        let _ = dotenvy::dotenv();

        let path = Self::config_path()?;

        let mut config = match tokio::fs::File::open(&path).await {
            Ok(mut file) => {
                let mut contents = String::new();
                file.read_to_string(&mut contents).await.map_err(|e| {
                    anyhow!(
                        "Could not read configuration at `{}`: {}",
                        path.to_string_lossy(),
                        e
                    )
                })?;
                Self::parse(&contents).map_err(|e| {
                    anyhow!(
                        "Could not parse configuration at `{}`: {}",
                        path.to_string_lossy(),
                        e
                    )
                })?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => {
                return Err(anyhow!(
                    "Could not open configuration at `{}`: {}",
                    path.to_string_lossy(),
                    e
                ))
            }
        };

        config.apply_env_credentials(
            std::env::var(DISCORD_TOKEN_ENV).ok(),
            std::env::var(OPENAI_API_KEY_ENV).ok(),
        );
        config.validate()?;

        Ok(config)
    }

    pub fn parse(contents: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(contents)
    }

    /// Non-empty credentials from the environment take precedence over the file.
    pub fn apply_env_credentials(
        &mut self,
        discord_token: Option<String>,
        openai_api_key: Option<String>,
    ) {
        if let Some(token) = discord_token.filter(|t| !t.trim().is_empty()) {
            self.discord.token = token;
        }
        if let Some(key) = openai_api_key.filter(|k| !k.trim().is_empty()) {
            self.llm.api_key = key;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.discord.token.trim().is_empty() {
            return Err(ConfigError::MissingCredential {
                setting: "discord.token",
                env: DISCORD_TOKEN_ENV,
            });
        }
        if self.llm.api_key.trim().is_empty() {
            return Err(ConfigError::MissingCredential {
                setting: "llm.api_key",
                env: OPENAI_API_KEY_ENV,
            });
        }
        if self.rate_limit.window_seconds == 0 {
            return Err(ConfigError::Invalid("rate_limit.window_seconds must be positive"));
        }
        if self.rate_limit.user_max == 0 || self.rate_limit.guild_max == 0 {
            return Err(ConfigError::Invalid(
                "rate_limit.user_max and rate_limit.guild_max must be positive",
            ));
        }
        if self.discord.max_message_length <= 3 {
            return Err(ConfigError::Invalid(
                "discord.max_message_length must be greater than 3",
            ));
        }
        if self.llm.timeout_seconds == 0 {
            return Err(ConfigError::Invalid("llm.timeout_seconds must be positive"));
        }
        Ok(())
    }

    /// Settings that are safe to log.
    pub fn summary(&self) -> String {
        format!(
            "model={} max_message_length={} caching={} (ttl {}s) rate_limiting={} \
             (user {}/{}s, guild {}/{}s) max_retries={}",
            self.llm.model_name,
            self.discord.max_message_length,
            self.cache.enabled,
            self.cache.ttl_seconds,
            self.rate_limit.enabled,
            self.rate_limit.user_max,
            self.rate_limit.window_seconds,
            self.rate_limit.guild_max,
            self.rate_limit.window_seconds,
            self.llm.max_retries,
        )
    }
}

#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("`{setting}` is required; set it in the config file or the {env} environment variable")]
    MissingCredential {
        setting: &'static str,
        env: &'static str,
    },
    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}
