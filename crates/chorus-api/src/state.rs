//! Application state wiring all services together.
//!
//! The pipeline and chat service are generic over the repository trait;
//! AppState pins them to the SQLite implementation.

use std::sync::Arc;

use chorus_core::auth::BoxTokenVerifier;
use chorus_core::chat::service::ChatService;
use chorus_core::llm::registry::ProviderRegistry;
use chorus_core::pipeline::{PipelineSettings, SummaryPipeline};
use chorus_infra::auth::build_verifier;
use chorus_infra::llm::build_registry;
use chorus_infra::sqlite::chat::SqliteChatRepository;
use chorus_infra::sqlite::pool::DatabasePool;
use chorus_types::config::AppConfig;

pub type ConcretePipeline = SummaryPipeline<SqliteChatRepository>;

pub type ConcreteChatService = ChatService<SqliteChatRepository>;

/// Shared application state handed to every REST handler.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: ConcretePipeline,
    pub chat_service: ConcreteChatService,
    pub verifier: Arc<BoxTokenVerifier>,
    pub config: Arc<AppConfig>,
    pub db_pool: DatabasePool,
}

impl AppState {
    /// Connect to the database, build the provider registry from the
    /// process environment, and select the token verifier.
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let db_pool = DatabasePool::new(&config.database.url).await?;

        let registry = build_registry(&config.providers, &config.retry, |key| {
            std::env::var(key).ok()
        });
        if registry.is_empty() {
            tracing::warn!("no LLM provider has an API key; summarize requests will fail");
        } else {
            tracing::info!(providers = ?registry.list_names(), "providers ready");
        }
        if !registry.contains(&config.pipeline.default_summary_model) {
            tracing::warn!(
                model = %config.pipeline.default_summary_model,
                "default summary model is not available"
            );
        }

        let verifier = build_verifier(&config.auth)?;

        Ok(Self::from_parts(config, db_pool, registry, verifier))
    }

    /// Wire the state from already-built parts.
    pub fn from_parts(
        config: AppConfig,
        db_pool: DatabasePool,
        registry: ProviderRegistry,
        verifier: BoxTokenVerifier,
    ) -> Self {
        let repo = Arc::new(SqliteChatRepository::new(db_pool.clone()));
        let settings = PipelineSettings {
            default_summary_model: config.pipeline.default_summary_model.clone(),
            title_model: config.pipeline.title_model.clone(),
        };

        Self {
            pipeline: SummaryPipeline::new(Arc::clone(&repo), Arc::new(registry), settings),
            chat_service: ChatService::new(repo),
            verifier: Arc::new(verifier),
            config: Arc::new(config),
            db_pool,
        }
    }
}
