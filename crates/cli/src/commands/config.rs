use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use agendai_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];

    let mut push = |key_path: &str, value: &str, env_key: Option<&str>| {
        lines.push(render_line(
            key_path,
            value,
            field_source(key_path, env_key, config_file_doc.as_ref(), config_file_path.as_deref()),
        ));
    };

    push("database.url", &config.database.url, Some("AGENDAI_DATABASE_URL"));
    push(
        "database.max_connections",
        &config.database.max_connections.to_string(),
        Some("AGENDAI_DATABASE_MAX_CONNECTIONS"),
    );
    push(
        "database.timeout_secs",
        &config.database.timeout_secs.to_string(),
        Some("AGENDAI_DATABASE_TIMEOUT_SECS"),
    );

    let access_token = redact_token(config.channel.access_token.expose_secret());
    let verify_token = redact_token(config.channel.verify_token.expose_secret());
    push("channel.access_token", &access_token, Some("AGENDAI_CHANNEL_ACCESS_TOKEN"));
    push("channel.verify_token", &verify_token, Some("AGENDAI_CHANNEL_VERIFY_TOKEN"));
    push(
        "channel.phone_number_id",
        &config.channel.phone_number_id,
        Some("AGENDAI_CHANNEL_PHONE_NUMBER_ID"),
    );
    push("channel.api_base", &config.channel.api_base, Some("AGENDAI_CHANNEL_API_BASE"));

    push("llm.provider", &format!("{:?}", config.llm.provider), Some("AGENDAI_LLM_PROVIDER"));
    push("llm.model", &config.llm.model, Some("AGENDAI_LLM_MODEL"));
    push(
        "llm.base_url",
        config.llm.base_url.as_deref().unwrap_or("<unset>"),
        Some("AGENDAI_LLM_BASE_URL"),
    );
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    push("llm.api_key", llm_api_key, Some("AGENDAI_LLM_API_KEY"));

    push("calendar.api_base", &config.calendar.api_base, Some("AGENDAI_CALENDAR_API_BASE"));
    push(
        "knowledge.enabled",
        &config.knowledge.enabled.to_string(),
        Some("AGENDAI_KNOWLEDGE_ENABLED"),
    );
    push("knowledge.api_base", &config.knowledge.api_base, Some("AGENDAI_KNOWLEDGE_API_BASE"));

    let webhook_secret =
        if config.security.webhook_secret.is_some() { "<redacted>" } else { "<unset>" };
    push("security.webhook_secret", webhook_secret, Some("AGENDAI_WEBHOOK_SECRET"));
    push(
        "security.origin_ceiling",
        &config.security.origin_ceiling.to_string(),
        Some("AGENDAI_RATE_LIMIT_ORIGIN_CEILING"),
    );
    push(
        "security.sender_ceiling",
        &config.security.sender_ceiling.to_string(),
        Some("AGENDAI_RATE_LIMIT_SENDER_CEILING"),
    );
    push(
        "security.window_secs",
        &config.security.window_secs.to_string(),
        Some("AGENDAI_RATE_LIMIT_WINDOW_SECS"),
    );

    push(
        "reminders.lead_minutes",
        &config.reminders.lead_minutes.to_string(),
        Some("AGENDAI_REMINDER_LEAD_MINUTES"),
    );
    push(
        "reminders.poll_secs",
        &config.reminders.poll_secs.to_string(),
        Some("AGENDAI_REMINDER_POLL_SECS"),
    );

    push("server.bind_address", &config.server.bind_address, Some("AGENDAI_SERVER_BIND_ADDRESS"));
    push("server.port", &config.server.port.to_string(), Some("AGENDAI_SERVER_PORT"));
    push(
        "server.health_check_port",
        &config.server.health_check_port.to_string(),
        Some("AGENDAI_SERVER_HEALTH_CHECK_PORT"),
    );

    push("logging.level", &config.logging.level, Some("AGENDAI_LOGGING_LEVEL"));
    push("logging.format", &format!("{:?}", config.logging.format), Some("AGENDAI_LOGGING_FORMAT"));

    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    let root = PathBuf::from("agendai.toml");
    if root.exists() {
        return Some(root);
    }

    let nested = PathBuf::from("config/agendai.toml");
    if nested.exists() {
        return Some(nested);
    }

    None
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact_token, render_line};

    #[test]
    fn redacts_prefixed_tokens_to_their_prefix() {
        assert_eq!(redact_token("EAAG-abc123"), "EAAG-***");
        assert_eq!(redact_token("sk-proj-secret"), "sk-***");
    }

    #[test]
    fn redacts_opaque_and_empty_tokens() {
        assert_eq!(redact_token("opaquesecret"), "<redacted>");
        assert_eq!(redact_token("   "), "<empty>");
    }

    #[test]
    fn walks_nested_toml_paths() {
        let doc: toml::Value = r#"
[channel]
phone_number_id = "5511000000"
"#
        .parse()
        .unwrap();

        assert!(contains_path(&doc, "channel.phone_number_id"));
        assert!(!contains_path(&doc, "channel.access_token"));
        assert!(!contains_path(&doc, "reminders.lead_minutes"));
    }

    #[test]
    fn renders_key_value_and_source() {
        let line = render_line("server.port", "3000", "default".to_string());
        assert_eq!(line, "- server.port = 3000 (source: default)");
    }
}
