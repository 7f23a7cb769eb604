use crate::config::AppConfig;
use crate::storage::{Storage, StorageClient};
use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub config: Arc<AppConfig>,
    pub storage: Arc<dyn StorageClient>,
}

impl AppState {
    pub async fn init(config: AppConfig) -> anyhow::Result<Self> {
        let config = Arc::new(config);

        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await
            .context("connect to database")?;

        let storage = Arc::new(Storage::new(&config.storage).await?) as Arc<dyn StorageClient>;

        Ok(Self {
            db,
            config,
            storage,
        })
    }

    /// State with a lazy pool and in-memory storage. Handlers that reach the
    /// database fail, everything in front of it works.
    #[cfg(test)]
    pub fn fake() -> Self {
        Self::fake_with(|_| None)
    }

    #[cfg(test)]
    pub fn fake_with<F>(vars: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = AppConfig::from_lookup(|key| match key {
            "APP_ENV" => vars(key).or_else(|| Some("testing".into())),
            "JWT_SECRET" => vars(key).or_else(|| Some("test".into())),
            _ => vars(key),
        })
        .expect("test config");

        let db = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .expect("lazy pool ok");

        let storage = Arc::new(crate::storage::MemoryStorage::default()) as Arc<dyn StorageClient>;
        Self {
            db,
            config: Arc::new(config),
            storage,
        }
    }
}
