use std::sync::Arc;

use coachline_agent::{BackendError, CoachingBackend, OpenAiCompatibleBackend};
use coachline_core::config::{AppConfig, ConfigError, LoadOptions};
use coachline_core::prompt::{CoachingProfile, ProfileError};
use coachline_db::{connect_with_config, migrations, DbPool, SqlBlobStore};
use thiserror::Error;
use tracing::info;

use crate::state::AppState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub state: AppState,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Profile(#[from] ProfileError),
    #[error("coaching backend could not be initialized: {0}")]
    Backend(#[source] BackendError),
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
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let (profile, profile_source) = match &config.profile.path {
        Some(path) => (CoachingProfile::load(path)?, path.display().to_string()),
        None => (CoachingProfile::builtin(), "builtin".to_string()),
    };
    info!(
        event_name = "system.bootstrap.profile_loaded",
        correlation_id = "bootstrap",
        source = %profile_source,
        exemplars = profile.exemplars().len(),
        "coaching profile loaded"
    );

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database connected and migrations applied"
    );

    let backend: Arc<dyn CoachingBackend> = Arc::new(
        OpenAiCompatibleBackend::from_config(&config.llm).map_err(BootstrapError::Backend)?,
    );
    info!(
        event_name = "system.bootstrap.backend_ready",
        correlation_id = "bootstrap",
        provider = ?config.llm.provider,
        model = %config.llm.model,
        base_url = %config.llm.effective_base_url(),
        "coaching backend configured"
    );

    let store = Arc::new(SqlBlobStore::new(db_pool.clone()));
    let state = AppState::from_parts(&config, profile, backend, store);

    Ok(Application { config, db_pool, state })
}

#[cfg(test)]
mod tests {
    use coachline_core::config::{ConfigOverrides, LlmProvider, LoadOptions};

    use crate::bootstrap::{bootstrap, BootstrapError};

    fn options(database_url: String, overrides: ConfigOverrides) -> LoadOptions {
        LoadOptions {
            overrides: ConfigOverrides { database_url: Some(database_url), ..overrides },
            ..LoadOptions::default()
        }
    }

    fn file_database(dir: &tempfile::TempDir) -> String {
        format!("sqlite://{}", dir.path().join("coachline.db").display())
    }

    #[tokio::test]
    async fn bootstrap_fails_fast_without_openai_key() {
        let result = bootstrap(options(
            "sqlite::memory:".to_string(),
            ConfigOverrides {
                llm_provider: Some(LlmProvider::OpenAi),
                llm_api_key: Some("   ".to_string()),
                ..ConfigOverrides::default()
            },
        ))
        .await;

        let message = match result {
            Ok(_) => panic!("bootstrap should fail without an api key"),
            Err(error) => error.to_string(),
        };
        assert!(message.contains("llm.api_key"));
    }

    #[tokio::test]
    async fn bootstrap_with_local_provider_exposes_ready_blob_store() {
        let dir = tempfile::tempdir().expect("tempdir");
        let app = bootstrap(options(
            file_database(&dir),
            ConfigOverrides { llm_provider: Some(LlmProvider::Ollama), ..ConfigOverrides::default() },
        ))
        .await
        .expect("bootstrap should succeed for ollama without a key");

        app.state.recorder.store().ping().await.expect("blob table should exist after migrations");
        assert_eq!(app.state.runtime.params().model, app.config.llm.model);

        app.db_pool.close().await;
    }

    #[tokio::test]
    async fn missing_profile_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut config = coachline_core::config::AppConfig::default();
        config.database.url = "sqlite::memory:".to_string();
        config.profile.path = Some(dir.path().join("absent.toml"));

        let result = crate::bootstrap::bootstrap_with_config(config).await;

        assert!(matches!(result, Err(BootstrapError::Profile(_))));
    }
}
