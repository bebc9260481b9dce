use std::sync::Arc;

use leadline_agent::{LlmClient, NoopLlmClient};
use leadline_comms::{
    FsmClient, HttpFsmClient, HttpSmsDelivery, NoopFsmClient, NoopSmsDelivery, SmsDelivery,
};
use leadline_core::config::{AppConfig, ConfigError, LoadOptions};
use leadline_core::metrics::TracingMetricsSink;
use leadline_db::repositories::{
    SqlAuditLogRepository, SqlConversationRepository, SqlEventReceiptRepository,
    SqlEventRepository, SqlJobRepository, SqlMessageRepository, SqlPendingActionRepository,
};
use leadline_db::{connect_with_settings, migrations, DbPool};
use leadline_engine::{Engine, Services};
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub engine: Arc<Engine>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("sms delivery init failed: {0}")]
    Sms(#[source] leadline_comms::SmsError),
    #[error("fsm client init failed: {0}")]
    Fsm(#[source] leadline_comms::FsmError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let sms: Arc<dyn SmsDelivery> = if config.sms.enabled {
        Arc::new(
            HttpSmsDelivery::new(
                config.sms.api_base_url.clone(),
                config.sms.account_id.clone(),
                config.sms.auth_token.clone(),
                config.sms.from_number.clone(),
                30,
            )
            .map_err(BootstrapError::Sms)?,
        )
    } else {
        Arc::new(NoopSmsDelivery)
    };

    let fsm: Arc<dyn FsmClient> = match (config.fsm.enabled, &config.fsm.api_key) {
        (true, Some(api_key)) => Arc::new(
            HttpFsmClient::new(config.fsm.api_base_url.clone(), api_key.clone(), 30)
                .map_err(BootstrapError::Fsm)?,
        ),
        _ => Arc::new(NoopFsmClient),
    };

    // Provider wiring is a later integration; adapters degrade to their
    // deterministic templates until then.
    let llm: Arc<dyn LlmClient> = Arc::new(NoopLlmClient);

    let engine = Arc::new(Engine::new(Services {
        events: Arc::new(SqlEventRepository::new(db_pool.clone())),
        receipts: Arc::new(SqlEventReceiptRepository::new(db_pool.clone())),
        conversations: Arc::new(SqlConversationRepository::new(db_pool.clone())),
        messages: Arc::new(SqlMessageRepository::new(db_pool.clone())),
        actions: Arc::new(SqlPendingActionRepository::new(db_pool.clone())),
        jobs: Arc::new(SqlJobRepository::new(db_pool.clone())),
        audit_log: Arc::new(SqlAuditLogRepository::new(db_pool.clone())),
        sms,
        fsm,
        metrics: Arc::new(TracingMetricsSink),
        llm,
        business: config.business.clone(),
        policy: config.policy.clone(),
    }));

    info!(
        event_name = "system.bootstrap.engine_wired",
        correlation_id = "bootstrap",
        sms_transport = if config.sms.enabled { "http" } else { "noop" },
        fsm_transport = if config.fsm.enabled { "http" } else { "noop" },
        policy_version = config.policy.version,
        "orchestration engine wired"
    );

    Ok(Application { config, db_pool, engine })
}
