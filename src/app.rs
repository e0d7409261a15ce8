//! Builds a [`RagEngine`] from configuration.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::info;

use ragchat_core::store::memory::InMemoryStore;
use ragchat_core::store::VectorStore;
use ragchat_core::{RagEngine, RagError};

use crate::config::Config;
use crate::db;
use crate::embedding::create_embedder;
use crate::extract::{PdfTextExtractor, WebScraper};
use crate::llm::create_backend;
use crate::migrate::migrate;
use crate::sqlite_store::SqliteStore;

const SCRAPE_TIMEOUT: Duration = Duration::from_secs(10);

/// Open the configured vector store, migrating SQLite if needed.
pub async fn open_store(config: &Config, dims: usize) -> Result<Arc<dyn VectorStore>> {
    match config.store.backend.as_str() {
        "memory" => Ok(Arc::new(InMemoryStore::new(dims))),
        _ => {
            let pool = db::connect(config).await?;
            migrate(&pool).await?;
            let store = SqliteStore::open(pool, dims)
                .await
                .map_err(|e| open_error(e, &config.db.path))?;
            Ok(Arc::new(store))
        }
    }
}

fn open_error(err: RagError, db_path: &Path) -> anyhow::Error {
    match err {
        RagError::DimensionMismatch { .. } => anyhow::Error::new(err).context(format!(
            "database {} was created with a different embedding dimension",
            db_path.display()
        )),
        other => anyhow::Error::new(other)
            .context(format!("failed to open database {}", db_path.display())),
    }
}

/// Wire embedder, store, generation backend, and acquisition adapters.
pub async fn build_engine(config: &Config) -> Result<RagEngine> {
    let embedder = create_embedder(&config.embedding)?;
    let store = open_store(config, embedder.dims()).await?;
    let backend = create_backend(&config.generation)?;

    info!(
        store = %config.store.backend,
        embedder = embedder.model_name(),
        dims = embedder.dims(),
        generation = backend.name(),
        "engine ready"
    );

    let engine = RagEngine::new(embedder, store, backend, config.engine_params())?
        .with_extractor(Arc::new(PdfTextExtractor))
        .with_scraper(Arc::new(WebScraper::new(SCRAPE_TIMEOUT)?));
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sqlite_config(dir: &TempDir) -> Config {
        let mut config = Config::default();
        config.store.backend = "sqlite".to_string();
        config.db.path = dir.path().join("ragchat.sqlite");
        config
    }

    #[tokio::test]
    async fn test_reopen_with_other_dims_names_the_dimension() {
        let dir = TempDir::new().unwrap();
        let config = sqlite_config(&dir);
        drop(open_store(&config, 4).await.unwrap());

        let err = open_store(&config, 8).await.err().unwrap();
        let message = format!("{:#}", err);
        assert!(message.contains("different embedding dimension"), "{}", message);
        assert!(message.contains("expected 4, got 8"), "{}", message);
    }

    #[test]
    fn test_storage_failure_is_not_reported_as_dimension_mismatch() {
        let err = open_error(
            RagError::Storage("disk I/O error".to_string()),
            Path::new("data/ragchat.sqlite"),
        );
        let message = format!("{:#}", err);
        assert!(!message.contains("dimension"), "{}", message);
        assert!(message.contains("disk I/O error"));
        assert!(message.contains("failed to open database data/ragchat.sqlite"));
    }
}
