use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use sqlx::{PgPool, postgres::PgPoolOptions};
use tracing::{info, warn};

use crate::{
    api,
    clients::{GenerationBackend, GenerationClient, GenerationSettings},
    config::Config,
    observability::Telemetry,
    pipeline::LyricsPipeline,
    prompt::PromptStore,
    store::{InMemoryStore, LexiconPersistence, PgStore, SongDao, VocabularyDao},
    translation::{
        BatchTranslator, BroadcastPublisher, GenerationLineTranslator, InMemoryTranslationCache,
        RealtimeTranslator, realtime::RealtimeSettings,
    },
};

#[derive(Clone)]
pub(crate) struct AppState {
    registry: Arc<ComponentRegistry>,
}

pub struct ComponentRegistry {
    config: Arc<Config>,
    telemetry: Telemetry,
    pipeline: Arc<LyricsPipeline>,
    realtime: RealtimeTranslator,
    batch: Arc<BatchTranslator>,
    publisher: Arc<BroadcastPublisher>,
    pool: Option<PgPool>,
}

impl AppState {
    pub(crate) fn new(registry: ComponentRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub(crate) fn telemetry(&self) -> &Telemetry {
        &self.registry.telemetry
    }

    pub(crate) fn pipeline(&self) -> Arc<LyricsPipeline> {
        Arc::clone(&self.registry.pipeline)
    }

    pub(crate) fn realtime(&self) -> &RealtimeTranslator {
        &self.registry.realtime
    }

    pub(crate) fn batch(&self) -> Arc<BatchTranslator> {
        Arc::clone(&self.registry.batch)
    }

    pub(crate) fn publisher(&self) -> &BroadcastPublisher {
        &self.registry.publisher
    }

    pub(crate) fn pool(&self) -> Option<&PgPool> {
        self.registry.pool.as_ref()
    }
}

/// Storage adapters chosen at startup.
struct Stores {
    vocabulary: Arc<dyn VocabularyDao>,
    songs: Arc<dyn SongDao>,
    pool: Option<PgPool>,
}

fn build_stores(config: &Config) -> Result<Stores> {
    let Some(dsn) = config.db_dsn() else {
        warn!("LEXICON_DB_DSN is not set; using in-memory storage (data is lost on restart)");
        let store = Arc::new(InMemoryStore::new());
        return Ok(Stores {
            vocabulary: store.clone(),
            songs: store,
            pool: None,
        });
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections())
        .min_connections(config.db_min_connections())
        .acquire_timeout(config.db_acquire_timeout())
        .test_before_acquire(true)
        .connect_lazy(dsn)
        .context("failed to configure lexicon database pool")?;
    let store = Arc::new(PgStore::new(pool.clone()));
    Ok(Stores {
        vocabulary: store.clone(),
        songs: store,
        pool: Some(pool),
    })
}

impl ComponentRegistry {
    /// 構成情報と依存をまとめて初期化し、アプリケーションの共有レジストリを構築する。
    ///
    /// # Errors
    /// Telemetry の初期化や HTTP クライアント構築が失敗した場合はエラーを返す。
    pub fn build(config: Config) -> Result<Self> {
        let telemetry = Telemetry::new(&config)?;
        Self::build_with_telemetry(config, telemetry)
    }

    /// 既存の Telemetry を使ってレジストリを構築する。
    ///
    /// # Errors
    /// HTTP クライアントや DB プールの構築が失敗した場合はエラーを返す。
    pub fn build_with_telemetry(config: Config, telemetry: Telemetry) -> Result<Self> {
        let config = Arc::new(config);
        let metrics = telemetry.metrics();

        let backend: Arc<dyn GenerationBackend> = Arc::new(
            GenerationClient::new(GenerationSettings::from_config(&config))
                .context("failed to build generation client")?,
        );
        let Stores {
            vocabulary,
            songs,
            pool,
        } = build_stores(&config)?;

        let prompts = Arc::new(PromptStore::new(
            config.lyrics_prompt_path().cloned(),
            config.lyrics_prompt_reload(),
        ));
        let pipeline = Arc::new(
            LyricsPipeline::new(
                Arc::clone(&backend),
                LexiconPersistence::new(vocabulary),
                Arc::clone(&songs),
                Arc::clone(&metrics),
            )
            .with_prompts(prompts)
            .with_schema_name(config.generation_schema_name())
            .with_chunk_timeout(config.generation_timeout()),
        );

        let line_translator = Arc::new(
            GenerationLineTranslator::new(backend)
                .with_schema_name(config.translation_schema_name()),
        );
        let publisher = Arc::new(BroadcastPublisher::new(config.translation_progress_channel()));
        let realtime = RealtimeTranslator::new(
            Arc::clone(&songs),
            line_translator.clone(),
            Arc::new(InMemoryTranslationCache::new()),
            publisher.clone(),
            RealtimeSettings {
                cache_ttl: config.translation_cache_ttl(),
                line_timeout: config.translation_line_timeout(),
            },
            metrics,
        );
        let batch = Arc::new(
            BatchTranslator::new(songs, line_translator)
                .with_timeout(config.translation_batch_timeout()),
        );

        info!(
            storage = if pool.is_some() { "postgres" } else { "memory" },
            model = config.generation_model(),
            channel = config.translation_progress_channel(),
            "components initialized"
        );

        Ok(Self {
            config,
            telemetry,
            pipeline,
            realtime,
            batch,
            publisher,
            pool,
        })
    }

    #[must_use]
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }
}

pub fn build_router(registry: ComponentRegistry) -> Router {
    let state = AppState::new(registry);
    api::router(state)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::config::{ENV_MUTEX, ENV_NAMES};

    /// Config with only the required variables set and no database.
    pub(crate) fn test_config(generation_base_url: &str) -> Config {
        let _lock = ENV_MUTEX.lock().expect("env mutex");
        // SAFETY: test code adjusts deterministic environment state sequentially.
        unsafe {
            for name in ENV_NAMES {
                std::env::remove_var(name);
            }
            std::env::set_var("GENERATION_BASE_URL", generation_base_url);
            std::env::set_var("GENERATION_API_KEY", "test-key");
        }
        Config::from_env().expect("config loads")
    }

    pub(crate) fn test_registry(generation_base_url: &str) -> ComponentRegistry {
        let config = test_config(generation_base_url);
        let telemetry = Telemetry::without_tracing().expect("telemetry");
        ComponentRegistry::build_with_telemetry(config, telemetry).expect("registry builds")
    }

    #[tokio::test]
    async fn component_registry_builds_with_memory_storage() {
        let registry = test_registry("http://localhost:18080/v1/chat/completions");
        assert_eq!(registry.config().translation_progress_channel(), "translation:updates");

        let state = AppState::new(registry);
        state.telemetry().record_ready_probe();
        assert!(state.pool().is_none());
        assert!(!state.realtime().is_running("song-1"));
    }
}
