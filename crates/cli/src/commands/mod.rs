pub mod config;
pub mod doctor;
pub mod migrate;
pub mod start;

use agendai_core::config::{AppConfig, LoadOptions};
use agendai_db::{connect_with_settings, migrations};
use serde_json::json;

/// Every subcommand resolves to one JSON line on stdout plus a process
/// exit code, so wrappers can script against the CLI without parsing prose.
#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload = json!({
            "command": command,
            "status": "ok",
            "error_class": serde_json::Value::Null,
            "message": message.into(),
        });
        Self { exit_code: 0, output: payload.to_string() }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = json!({
            "command": command,
            "status": "error",
            "error_class": error_class,
            "message": message.into(),
        });
        Self { exit_code, output: payload.to_string() }
    }
}

/// Shared pipeline behind `start` and `migrate`: load and validate config,
/// reach the database, and bring the schema current.
fn database_preflight(command: &'static str, success_message: &'static str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                command,
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                command,
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let outcome = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| ("db_connectivity", error.to_string(), 4u8))?;

        migrations::run_pending(&pool)
            .await
            .map_err(|error| ("migration", error.to_string(), 5u8))?;

        pool.close().await;
        Ok::<(), (&'static str, String, u8)>(())
    });

    match outcome {
        Ok(()) => CommandResult::success(command, success_message),
        Err((error_class, message, exit_code)) => {
            CommandResult::failure(command, error_class, message, exit_code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::CommandResult;

    #[test]
    fn success_payload_is_single_line_json() {
        let result = CommandResult::success("migrate", "applied pending migrations");
        assert_eq!(result.exit_code, 0);
        assert!(!result.output.contains('\n'));

        let payload: serde_json::Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(payload["status"], "ok");
        assert!(payload["error_class"].is_null());
    }

    #[test]
    fn failure_carries_error_class_and_code() {
        let result = CommandResult::failure("start", "db_connectivity", "no such file", 4);
        assert_eq!(result.exit_code, 4);

        let payload: serde_json::Value = serde_json::from_str(&result.output).unwrap();
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "db_connectivity");
    }
}
