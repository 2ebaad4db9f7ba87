use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub channel: ChannelConfig,
    pub llm: LlmConfig,
    pub calendar: CalendarConfig,
    pub knowledge: KnowledgeConfig,
    pub security: SecurityConfig,
    pub reminders: ReminderConfig,
    pub server: ServerConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

/// Messaging-channel (WhatsApp Cloud API style) credentials and endpoints.
#[derive(Clone, Debug)]
pub struct ChannelConfig {
    pub access_token: SecretString,
    pub verify_token: SecretString,
    pub phone_number_id: String,
    pub api_base: String,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct CalendarConfig {
    pub api_base: String,
}

#[derive(Clone, Debug)]
pub struct KnowledgeConfig {
    pub enabled: bool,
    pub api_base: String,
}

#[derive(Clone, Debug)]
pub struct SecurityConfig {
    pub webhook_secret: Option<SecretString>,
    pub origin_ceiling: u32,
    pub sender_ceiling: u32,
    pub window_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ReminderConfig {
    pub lead_minutes: i64,
    pub poll_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub health_check_port: u16,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    OpenAi,
    Anthropic,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub channel_access_token: Option<String>,
    pub channel_verify_token: Option<String>,
    pub channel_phone_number_id: Option<String>,
    pub webhook_secret: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://agendai.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            channel: ChannelConfig {
                access_token: String::new().into(),
                verify_token: String::new().into(),
                phone_number_id: String::new(),
                api_base: "https://graph.facebook.com/v21.0".to_string(),
            },
            llm: LlmConfig {
                provider: LlmProvider::Ollama,
                api_key: None,
                base_url: Some("http://localhost:11434".to_string()),
                model: "llama3.1".to_string(),
                timeout_secs: 30,
            },
            calendar: CalendarConfig {
                api_base: "https://www.googleapis.com/calendar/v3".to_string(),
            },
            knowledge: KnowledgeConfig {
                enabled: false,
                api_base: "https://api.notion.com/v1".to_string(),
            },
            security: SecurityConfig {
                webhook_secret: None,
                origin_ceiling: 30,
                sender_ceiling: 30,
                window_secs: 60,
            },
            reminders: ReminderConfig { lead_minutes: 10, poll_secs: 60 },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 3000,
                health_check_port: 8080,
            },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" => Ok(Self::Anthropic),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|anthropic|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("agendai.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(channel) = patch.channel {
            if let Some(access_token_value) = channel.access_token {
                self.channel.access_token = secret_value(access_token_value);
            }
            if let Some(verify_token_value) = channel.verify_token {
                self.channel.verify_token = secret_value(verify_token_value);
            }
            if let Some(phone_number_id) = channel.phone_number_id {
                self.channel.phone_number_id = phone_number_id;
            }
            if let Some(api_base) = channel.api_base {
                self.channel.api_base = api_base;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(calendar) = patch.calendar {
            if let Some(api_base) = calendar.api_base {
                self.calendar.api_base = api_base;
            }
        }

        if let Some(knowledge) = patch.knowledge {
            if let Some(enabled) = knowledge.enabled {
                self.knowledge.enabled = enabled;
            }
            if let Some(api_base) = knowledge.api_base {
                self.knowledge.api_base = api_base;
            }
        }

        if let Some(security) = patch.security {
            if let Some(webhook_secret_value) = security.webhook_secret {
                self.security.webhook_secret = Some(secret_value(webhook_secret_value));
            }
            if let Some(origin_ceiling) = security.origin_ceiling {
                self.security.origin_ceiling = origin_ceiling;
            }
            if let Some(sender_ceiling) = security.sender_ceiling {
                self.security.sender_ceiling = sender_ceiling;
            }
            if let Some(window_secs) = security.window_secs {
                self.security.window_secs = window_secs;
            }
        }

        if let Some(reminders) = patch.reminders {
            if let Some(lead_minutes) = reminders.lead_minutes {
                self.reminders.lead_minutes = lead_minutes;
            }
            if let Some(poll_secs) = reminders.poll_secs {
                self.reminders.poll_secs = poll_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(health_check_port) = server.health_check_port {
                self.server.health_check_port = health_check_port;
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("AGENDAI_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("AGENDAI_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("AGENDAI_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("AGENDAI_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("AGENDAI_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("AGENDAI_CHANNEL_ACCESS_TOKEN") {
            self.channel.access_token = secret_value(value);
        }
        if let Some(value) = read_env("AGENDAI_CHANNEL_VERIFY_TOKEN") {
            self.channel.verify_token = secret_value(value);
        }
        if let Some(value) = read_env("AGENDAI_CHANNEL_PHONE_NUMBER_ID") {
            self.channel.phone_number_id = value;
        }
        if let Some(value) = read_env("AGENDAI_CHANNEL_API_BASE") {
            self.channel.api_base = value;
        }

        if let Some(value) = read_env("AGENDAI_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("AGENDAI_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("AGENDAI_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("AGENDAI_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("AGENDAI_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("AGENDAI_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("AGENDAI_CALENDAR_API_BASE") {
            self.calendar.api_base = value;
        }
        if let Some(value) = read_env("AGENDAI_KNOWLEDGE_ENABLED") {
            self.knowledge.enabled = parse_bool("AGENDAI_KNOWLEDGE_ENABLED", &value)?;
        }
        if let Some(value) = read_env("AGENDAI_KNOWLEDGE_API_BASE") {
            self.knowledge.api_base = value;
        }

        if let Some(value) = read_env("AGENDAI_WEBHOOK_SECRET") {
            self.security.webhook_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("AGENDAI_RATE_LIMIT_ORIGIN_CEILING") {
            self.security.origin_ceiling = parse_u32("AGENDAI_RATE_LIMIT_ORIGIN_CEILING", &value)?;
        }
        if let Some(value) = read_env("AGENDAI_RATE_LIMIT_SENDER_CEILING") {
            self.security.sender_ceiling = parse_u32("AGENDAI_RATE_LIMIT_SENDER_CEILING", &value)?;
        }
        if let Some(value) = read_env("AGENDAI_RATE_LIMIT_WINDOW_SECS") {
            self.security.window_secs = parse_u64("AGENDAI_RATE_LIMIT_WINDOW_SECS", &value)?;
        }

        if let Some(value) = read_env("AGENDAI_REMINDER_LEAD_MINUTES") {
            self.reminders.lead_minutes =
                parse_u64("AGENDAI_REMINDER_LEAD_MINUTES", &value)? as i64;
        }
        if let Some(value) = read_env("AGENDAI_REMINDER_POLL_SECS") {
            self.reminders.poll_secs = parse_u64("AGENDAI_REMINDER_POLL_SECS", &value)?;
        }

        if let Some(value) = read_env("AGENDAI_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("AGENDAI_SERVER_PORT") {
            self.server.port = parse_u16("AGENDAI_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("AGENDAI_SERVER_HEALTH_CHECK_PORT") {
            self.server.health_check_port =
                parse_u16("AGENDAI_SERVER_HEALTH_CHECK_PORT", &value)?;
        }

        let log_level = read_env("AGENDAI_LOGGING_LEVEL").or_else(|| read_env("AGENDAI_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("AGENDAI_LOGGING_FORMAT").or_else(|| read_env("AGENDAI_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(access_token) = overrides.channel_access_token {
            self.channel.access_token = secret_value(access_token);
        }
        if let Some(verify_token) = overrides.channel_verify_token {
            self.channel.verify_token = secret_value(verify_token);
        }
        if let Some(phone_number_id) = overrides.channel_phone_number_id {
            self.channel.phone_number_id = phone_number_id;
        }
        if let Some(webhook_secret) = overrides.webhook_secret {
            self.security.webhook_secret = Some(secret_value(webhook_secret));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_channel(&self.channel)?;
        validate_llm(&self.llm)?;
        validate_security(&self.security)?;
        validate_reminders(&self.reminders)?;
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("agendai.toml"), PathBuf::from("config/agendai.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_channel(channel: &ChannelConfig) -> Result<(), ConfigError> {
    if channel.access_token.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "channel.access_token is required to call the messaging API".to_string(),
        ));
    }
    if channel.verify_token.expose_secret().is_empty() {
        return Err(ConfigError::Validation(
            "channel.verify_token is required for the webhook subscription handshake".to_string(),
        ));
    }
    if channel.phone_number_id.trim().is_empty() {
        return Err(ConfigError::Validation(
            "channel.phone_number_id is required to address outbound sends".to_string(),
        ));
    }
    if !channel.api_base.starts_with("http://") && !channel.api_base.starts_with("https://") {
        return Err(ConfigError::Validation(
            "channel.api_base must start with http:// or https://".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::OpenAi | LlmProvider::Anthropic => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for openai/anthropic providers".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_security(security: &SecurityConfig) -> Result<(), ConfigError> {
    if security.origin_ceiling == 0 || security.sender_ceiling == 0 {
        return Err(ConfigError::Validation(
            "security rate-limit ceilings must be greater than zero".to_string(),
        ));
    }
    if security.window_secs == 0 || security.window_secs > 3600 {
        return Err(ConfigError::Validation(
            "security.window_secs must be in range 1..=3600".to_string(),
        ));
    }

    Ok(())
}

fn validate_reminders(reminders: &ReminderConfig) -> Result<(), ConfigError> {
    if reminders.lead_minutes <= 0 {
        return Err(ConfigError::Validation(
            "reminders.lead_minutes must be greater than zero".to_string(),
        ));
    }
    if reminders.poll_secs == 0 {
        return Err(ConfigError::Validation(
            "reminders.poll_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation(
            "server.port must be greater than zero".to_string(),
        ));
    }
    if server.health_check_port == 0 {
        return Err(ConfigError::Validation(
            "server.health_check_port must be greater than zero".to_string(),
        ));
    }
    if server.port == server.health_check_port {
        return Err(ConfigError::Validation(
            "server.port and server.health_check_port must differ".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidEnvOverride {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    channel: Option<ChannelPatch>,
    llm: Option<LlmPatch>,
    calendar: Option<CalendarPatch>,
    knowledge: Option<KnowledgePatch>,
    security: Option<SecurityPatch>,
    reminders: Option<ReminderPatch>,
    server: Option<ServerPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ChannelPatch {
    access_token: Option<String>,
    verify_token: Option<String>,
    phone_number_id: Option<String>,
    api_base: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct CalendarPatch {
    api_base: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct KnowledgePatch {
    enabled: Option<bool>,
    api_base: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct SecurityPatch {
    webhook_secret: Option<String>,
    origin_ceiling: Option<u32>,
    sender_ceiling: Option<u32>,
    window_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ReminderPatch {
    lead_minutes: Option<i64>,
    poll_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    health_check_port: Option<u16>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::{AppConfig, ConfigOverrides, LoadOptions, LogFormat};

    fn valid_overrides() -> ConfigOverrides {
        ConfigOverrides {
            database_url: Some("sqlite::memory:".to_string()),
            channel_access_token: Some("EAAG-test".to_string()),
            channel_verify_token: Some("verify-me".to_string()),
            channel_phone_number_id: Some("5511000000".to_string()),
            ..ConfigOverrides::default()
        }
    }

    #[test]
    fn defaults_fail_validation_without_channel_tokens() {
        let result = AppConfig::load(LoadOptions::default());
        let message = result.err().expect("load should fail").to_string();
        assert!(message.contains("channel.access_token"));
    }

    #[test]
    fn overrides_satisfy_validation() {
        let config = AppConfig::load(LoadOptions {
            overrides: valid_overrides(),
            ..LoadOptions::default()
        })
        .expect("load with overrides");

        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.channel.access_token.expose_secret(), "EAAG-test");
        assert_eq!(config.security.origin_ceiling, 30);
        assert_eq!(config.security.window_secs, 60);
        assert_eq!(config.reminders.lead_minutes, 10);
        assert_eq!(config.reminders.poll_secs, 60);
    }

    #[test]
    fn toml_patch_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        write!(
            file,
            r#"
[database]
url = "sqlite://custom.db"

[security]
origin_ceiling = 5
window_secs = 10

[logging]
level = "debug"
format = "json"
"#
        )
        .expect("write config");

        let config = AppConfig::load(LoadOptions {
            config_path: Some(file.path().to_path_buf()),
            require_file: true,
            overrides: ConfigOverrides {
                channel_access_token: Some("EAAG-test".to_string()),
                channel_verify_token: Some("verify-me".to_string()),
                channel_phone_number_id: Some("5511000000".to_string()),
                ..ConfigOverrides::default()
            },
        })
        .expect("load from file");

        assert_eq!(config.database.url, "sqlite://custom.db");
        assert_eq!(config.security.origin_ceiling, 5);
        assert_eq!(config.security.window_secs, 10);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn missing_required_file_is_an_error() {
        let result = AppConfig::load(LoadOptions {
            config_path: Some("does/not/exist.toml".into()),
            require_file: true,
            overrides: valid_overrides(),
        });

        assert!(result.is_err());
    }

    #[test]
    fn zero_rate_limit_ceiling_is_rejected() {
        let mut config = AppConfig::default();
        config.database.url = "sqlite::memory:".to_string();
        config.channel.access_token = "EAAG-test".to_string().into();
        config.channel.verify_token = "verify-me".to_string().into();
        config.channel.phone_number_id = "5511000000".to_string();
        config.security.origin_ceiling = 0;

        let message = config.validate().err().expect("validation error").to_string();
        assert!(message.contains("ceilings"));
    }
}
