use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use agendai_agent::{
    EventResolver, HttpLlmClient, HttpTranscriptionService, LlmClassifier, LlmExtractor,
};
use agendai_channel::HttpChannelClient;
use agendai_connect::{KnowledgeConnector, RestCalendarConnector, RestKnowledgeConnector};
use agendai_core::clock::{Clock, SystemClock};
use agendai_core::config::{AppConfig, ConfigError, LoadOptions};
use agendai_core::security::{RateLimiter, RateLimiterConfig};
use agendai_db::repositories::{
    SqlAccountRepository, SqlEventLogRepository, SqlInboxRepository, SqlReminderRepository,
};
use agendai_db::{connect_with_settings, migrations, DbPool};

use crate::dispatcher::ReminderDispatcher;
use crate::orchestrator::{Orchestrator, Services};
use crate::webhook::WebhookState;

/// Voice notes go to the OpenAI-compatible transcription endpoint with the
/// same API key as the model calls.
const TRANSCRIPTION_BASE: &str = "https://api.openai.com/v1";
const TRANSCRIPTION_MODEL: &str = "whisper-1";

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub webhook_state: WebhookState,
    pub dispatcher: Arc<ReminderDispatcher>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(event_name = "bootstrap.start", "starting application bootstrap");

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(event_name = "bootstrap.database_connected", "database connection established");

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(event_name = "bootstrap.migrations_applied", "database migrations applied");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    let llm = Arc::new(HttpLlmClient::from_config(&config.llm));
    let knowledge: Option<Arc<dyn KnowledgeConnector>> = config
        .knowledge
        .enabled
        .then(|| Arc::new(RestKnowledgeConnector::new(&config.knowledge.api_base)) as _);
    info!(
        event_name = "bootstrap.connectors_ready",
        llm_provider = ?config.llm.provider,
        knowledge_enabled = config.knowledge.enabled,
    );

    let accounts = Arc::new(SqlAccountRepository::new(db_pool.clone()));
    let reminders = Arc::new(SqlReminderRepository::new(db_pool.clone()));
    let channel = Arc::new(HttpChannelClient::new(
        &config.channel.api_base,
        &config.channel.phone_number_id,
        config.channel.access_token.clone(),
    ));

    let services = Services {
        accounts: accounts.clone(),
        event_log: Arc::new(SqlEventLogRepository::new(db_pool.clone())),
        reminders: reminders.clone(),
        inbox: Arc::new(SqlInboxRepository::new(db_pool.clone())),
        channel: channel.clone(),
        transcription: Arc::new(HttpTranscriptionService::new(
            TRANSCRIPTION_BASE,
            config.llm.api_key.clone(),
            TRANSCRIPTION_MODEL,
        )),
        classifier: Arc::new(LlmClassifier::new(llm.clone())),
        extractor: Arc::new(LlmExtractor::new(llm.clone())),
        resolver: Arc::new(EventResolver::new(llm)),
        calendar: Arc::new(RestCalendarConnector::new(&config.calendar.api_base)),
        knowledge,
        clock: clock.clone(),
    };
    let orchestrator = Arc::new(Orchestrator::new(services, config.reminders.lead_minutes));

    let webhook_state = WebhookState {
        orchestrator,
        verify_token: config.channel.verify_token.clone(),
        webhook_secret: config.security.webhook_secret.clone(),
        origin_limiter: Arc::new(RateLimiter::new(
            RateLimiterConfig {
                ceiling: config.security.origin_ceiling,
                window_secs: config.security.window_secs,
            },
            clock.clone(),
        )),
        sender_limiter: Arc::new(RateLimiter::new(
            RateLimiterConfig {
                ceiling: config.security.sender_ceiling,
                window_secs: config.security.window_secs,
            },
            clock.clone(),
        )),
        origin_ceiling: config.security.origin_ceiling,
        sender_ceiling: config.security.sender_ceiling,
    };

    let dispatcher = Arc::new(ReminderDispatcher::new(
        reminders,
        accounts,
        channel,
        clock,
        config.reminders.poll_secs,
    ));

    Ok(Application { config, db_pool, webhook_state, dispatcher })
}
