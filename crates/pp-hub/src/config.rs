//! Runtime configuration read from the process environment.

use pp_core::PlaypenError;
use pp_core::PlaypenResult;
use pp_embed::EmbedSettings;
use std::path::PathBuf;

pub const STORAGE_DIR_VAR: &str = "PLAYPEN_STORAGE_DIR";
pub const EPHEMERAL_VAR: &str = "PLAYPEN_EPHEMERAL";
pub const LOG_FILTER_VAR: &str = "PLAYPEN_LOG";
pub const LOG_FORMAT_VAR: &str = "PLAYPEN_LOG_FORMAT";

const DEFAULT_LOG_FILTER: &str = "info";
const DEFAULT_STORAGE_DIR: &str = ".playpen";

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    Json,
    #[default]
    Compact,
}

impl LogFormat {
    fn parse(value: &str) -> PlaypenResult<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "compact" | "" => Ok(Self::Compact),
            other => Err(PlaypenError::new(
                "config.log_format_invalid",
                format!("{LOG_FORMAT_VAR} must be `json` or `compact`, got `{other}`"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HubConfig {
    /// Root of the durable session store.
    pub storage_dir: PathBuf,
    /// Keep the tab session in memory only.
    pub ephemeral: bool,
    /// `EnvFilter` expression.
    pub log_filter: String,
    pub log_format: LogFormat,
    pub embed: EmbedSettings,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            storage_dir: default_storage_dir(),
            ephemeral: false,
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: LogFormat::default(),
            embed: EmbedSettings::default(),
        }
    }
}

impl HubConfig {
    pub fn from_env() -> PlaypenResult<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> PlaypenResult<Self> {
        let mut config = Self::default();

        if let Some(dir) = lookup(STORAGE_DIR_VAR).filter(|dir| !dir.trim().is_empty()) {
            config.storage_dir = PathBuf::from(dir);
        }
        if let Some(flag) = lookup(EPHEMERAL_VAR) {
            config.ephemeral = parse_flag(&flag)?;
        }
        if let Some(filter) = lookup(LOG_FILTER_VAR).filter(|filter| !filter.trim().is_empty()) {
            config.log_filter = filter;
        }
        if let Some(format) = lookup(LOG_FORMAT_VAR) {
            config.log_format = LogFormat::parse(&format)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> PlaypenResult<()> {
        self.embed.validate()
    }
}

fn default_storage_dir() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(DEFAULT_STORAGE_DIR)
}

fn parse_flag(value: &str) -> PlaypenResult<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(PlaypenError::new(
            "config.flag_invalid",
            format!("{EPHEMERAL_VAR} must be a boolean, got `{other}`"),
        )),
    }
}
