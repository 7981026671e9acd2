use std::sync::Arc;

use thiserror::Error;
use tracing::info;

use tradebook_agent::business_tools::{register_business_tools, BusinessToolDeps};
use tradebook_agent::llm::{LlmClient, OpenAiCompatClient};
use tradebook_agent::remote::{BusinessApi, HttpBusinessApi, RemoteError};
use tradebook_agent::store::InMemoryConversationStore;
use tradebook_agent::tools::ToolRegistry;
use tradebook_agent::{AgentRuntime, RuntimeSettings};
use tradebook_core::config::{AppConfig, ConfigError, LoadOptions};
use tradebook_db::repositories::{SqlBuyerRepository, SqlExpenseRepository, SqlInventoryRepository};
use tradebook_db::{connect_with_settings, migrations, DbPool};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub agent_runtime: Arc<AgentRuntime>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("reasoning engine client setup failed: {0}")]
    LlmClient(String),
    #[error("business service client setup failed: {0}")]
    BusinessApi(#[from] RemoteError),
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

    let llm: Arc<dyn LlmClient> = Arc::new(
        OpenAiCompatClient::from_config(&config.llm)
            .map_err(|e| BootstrapError::LlmClient(format!("{e:#}")))?,
    );
    let api: Arc<dyn BusinessApi> = Arc::new(HttpBusinessApi::from_config(&config.business_api)?);

    let mut registry = ToolRegistry::default();
    register_business_tools(
        &mut registry,
        BusinessToolDeps {
            inventory: Arc::new(SqlInventoryRepository::new(db_pool.clone())),
            buyers: Arc::new(SqlBuyerRepository::new(db_pool.clone())),
            expenses: Arc::new(SqlExpenseRepository::new(db_pool.clone())),
            api,
        },
    );
    info!(
        event_name = "system.bootstrap.tools_registered",
        correlation_id = "bootstrap",
        tools = ?registry.names(),
        llm_provider = ?config.llm.provider,
        llm_model = %config.llm.model,
        "business tools registered"
    );

    let agent_runtime = Arc::new(AgentRuntime::new(
        llm,
        Arc::new(registry),
        Arc::new(InMemoryConversationStore::default()),
        RuntimeSettings::from_config(&config),
    ));

    Ok(Application { config, db_pool, agent_runtime })
}
