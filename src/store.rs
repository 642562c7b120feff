//! Persisted metadata vector store.
//!
//! One SQLite file holds the indexed copy of the check inventory: per check
//! the stored metadata plus an embedding of its description as a little-
//! endian f32 BLOB, and per service its SDK-wrapper source. Similarity is
//! cosine, computed in Rust over the fetched candidate vectors.
//!
//! The embedding provider and model used to build the index are persisted in
//! `index_meta`; opening the store with a different configuration is a
//! [`StudioError::EmbeddingModelMismatch`], never silently tolerated.
//!
//! Mutations (build, update) run in a single transaction so a concurrent
//! search observes either the previous or the new index state, never a
//! partial one. WAL mode keeps reads open during the write.

use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::config::EmbeddingConfig;
use crate::embedding::{
    self, blob_to_vec, cosine_similarity, vec_to_blob, EmbeddingSignature,
};
use crate::error::{Result, StudioError};
use crate::models::{CheckId, CheckRecord, InventoryDiff, RelatedCheck, SearchFilter, ServiceRecord};

/// Handle to the persisted check index.
#[derive(Debug)]
pub struct VectorStore {
    pool: SqlitePool,
    path: PathBuf,
    embedding: EmbeddingConfig,
    /// API key override for the embedding provider; falls back to env.
    api_key: Option<String>,
}

impl VectorStore {
    /// Open (or create) the store file and run migrations. Does not require
    /// an index to be present; use [`VectorStore::require_index`] before
    /// searching.
    pub async fn connect(
        path: &Path,
        embedding: &EmbeddingConfig,
        api_key: Option<String>,
    ) -> Result<Self> {
        let pool = crate::db::connect(path).await?;
        migrate(&pool).await?;

        let store = Self {
            pool,
            path: path.to_path_buf(),
            embedding: embedding.clone(),
            api_key,
        };

        // An existing index must match the configured embedding space.
        if let Some(indexed) = store.stored_signature().await? {
            let configured = EmbeddingSignature::from_config(&store.embedding)?;
            if indexed != configured {
                return Err(StudioError::EmbeddingModelMismatch {
                    indexed: indexed.to_string(),
                    configured: configured.to_string(),
                });
            }
        }

        Ok(store)
    }

    /// Whether an index has been built in this store.
    pub async fn has_index(&self) -> Result<bool> {
        Ok(self.stored_signature().await?.is_some())
    }

    /// Fail unless an index is present.
    pub async fn require_index(&self) -> Result<()> {
        if self.has_index().await? {
            Ok(())
        } else {
            Err(StudioError::Configuration(format!(
                "no check index found at {}; build it with `studio build-check-rag`",
                self.path.display()
            )))
        }
    }

    /// Embed every record's description and persist the index from scratch.
    ///
    /// Fails with [`StudioError::IndexAlreadyExists`] if an index is present
    /// and `overwrite` is false. With `overwrite`, the previous contents are
    /// replaced atomically.
    pub async fn build(
        &self,
        records: &[CheckRecord],
        services: &[ServiceRecord],
        overwrite: bool,
    ) -> Result<()> {
        if self.has_index().await? && !overwrite {
            return Err(StudioError::IndexAlreadyExists {
                path: self.path.clone(),
            });
        }

        let signature = EmbeddingSignature::from_config(&self.embedding)?;
        info!(checks = records.len(), services = services.len(), "building check index");

        let vectors = self.embed_descriptions(records).await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM checks").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM services").execute(&mut *tx).await?;
        sqlx::query("DELETE FROM index_meta").execute(&mut *tx).await?;

        for (key, value) in [
            ("embedding_provider", signature.provider.clone()),
            ("embedding_model", signature.model.clone()),
            ("embedding_dims", signature.dims.to_string()),
            ("built_at", unix_now().to_string()),
        ] {
            sqlx::query("INSERT INTO index_meta (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await?;
        }

        for (record, vector) in records.iter().zip(vectors.iter()) {
            upsert_check(&mut tx, record, vector).await?;
        }
        for service in services {
            upsert_service(&mut tx, service).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// Apply an incremental delta: insert added, re-embed and replace
    /// updated, delete removed. The services table is replaced with the
    /// scanned set, so a service wrapper deleted from the tree disappears
    /// from the index too. Idempotent — replaying the same delta leaves the
    /// index unchanged (upsert-by-identity, delete-by-identity).
    pub async fn update(&self, delta: &InventoryDiff, services: &[ServiceRecord]) -> Result<()> {
        self.require_index().await?;

        let mut changed: Vec<&CheckRecord> = Vec::new();
        changed.extend(delta.added.iter());
        changed.extend(delta.updated.iter());

        let texts: Vec<String> = changed.iter().map(|r| r.description.clone()).collect();
        let vectors = self.embed_batched(&texts).await?;

        info!(
            added = delta.added.len(),
            updated = delta.updated.len(),
            removed = delta.removed.len(),
            "updating check index"
        );

        let mut tx = self.pool.begin().await?;

        for (record, vector) in changed.iter().zip(vectors.iter()) {
            upsert_check(&mut tx, record, vector).await?;
        }

        for id in &delta.removed {
            sqlx::query(
                "DELETE FROM checks WHERE provider = ? AND service = ? AND check_name = ?",
            )
            .bind(&id.provider)
            .bind(&id.service)
            .bind(&id.check_name)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query("DELETE FROM services").execute(&mut *tx).await?;
        for service in services {
            upsert_service(&mut tx, service).await?;
        }

        sqlx::query("UPDATE index_meta SET value = ? WHERE key = 'built_at'")
            .bind(unix_now().to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Embed `query` and return the top-`k` checks by cosine similarity,
    /// ordered by descending score with ties broken by identity.
    pub async fn search(
        &self,
        query: &str,
        k: usize,
        filter: &SearchFilter,
    ) -> Result<Vec<RelatedCheck>> {
        if k == 0 {
            return Err(StudioError::InvalidArgument(
                "search k must be >= 1".to_string(),
            ));
        }
        self.require_index().await?;

        let query_vec = embedding::embed_query(&self.embedding, query, self.api_key.as_deref())
            .await?;

        let rows = match (&filter.provider, &filter.service) {
            (Some(provider), Some(service)) => {
                sqlx::query(
                    "SELECT provider, service, check_name, embedding FROM checks \
                     WHERE provider = ? AND service = ?",
                )
                .bind(provider)
                .bind(service)
                .fetch_all(&self.pool)
                .await?
            }
            (Some(provider), None) => {
                sqlx::query(
                    "SELECT provider, service, check_name, embedding FROM checks WHERE provider = ?",
                )
                .bind(provider)
                .fetch_all(&self.pool)
                .await?
            }
            _ => {
                sqlx::query("SELECT provider, service, check_name, embedding FROM checks")
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        let mut results: Vec<RelatedCheck> = rows
            .iter()
            .map(|row| {
                let blob: Vec<u8> = row.get("embedding");
                let vector = blob_to_vec(&blob);
                RelatedCheck {
                    id: CheckId {
                        provider: row.get("provider"),
                        service: row.get("service"),
                        check_name: row.get("check_name"),
                    },
                    score: cosine_similarity(&query_vec, &vector),
                }
            })
            .collect();

        results.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        results.truncate(k);

        Ok(results)
    }

    /// Load the indexed snapshot back as [`CheckRecord`]s, for diffing
    /// against a fresh scan.
    pub async fn snapshot(&self) -> Result<Vec<CheckRecord>> {
        let rows = sqlx::query(
            "SELECT provider, service, check_name, description, code, metadata_json, \
             severity, content_hash FROM checks \
             ORDER BY provider, service, check_name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| CheckRecord {
                id: CheckId {
                    provider: row.get("provider"),
                    service: row.get("service"),
                    check_name: row.get("check_name"),
                },
                description: row.get("description"),
                code: row.get("code"),
                metadata_json: row.get("metadata_json"),
                severity: row.get("severity"),
                content_hash: row.get("content_hash"),
            })
            .collect())
    }

    /// Providers present in the index.
    pub async fn providers(&self) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar("SELECT DISTINCT provider FROM checks ORDER BY provider")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    /// Services present for a provider.
    pub async fn services_for_provider(&self, provider: &str) -> Result<Vec<String>> {
        let rows = sqlx::query_scalar(
            "SELECT DISTINCT service FROM checks WHERE provider = ? ORDER BY service",
        )
        .bind(provider)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Look up an indexed check by its name alone. Check names carry their
    /// service prefix, so a name identifies at most one record in practice.
    pub async fn find_check(&self, check_name: &str) -> Result<Option<CheckRecord>> {
        let row = sqlx::query(
            "SELECT provider, service, check_name, description, code, metadata_json, \
             severity, content_hash FROM checks WHERE check_name = ? \
             ORDER BY provider, service LIMIT 1",
        )
        .bind(check_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| CheckRecord {
            id: CheckId {
                provider: row.get("provider"),
                service: row.get("service"),
                check_name: row.get("check_name"),
            },
            description: row.get("description"),
            code: row.get("code"),
            metadata_json: row.get("metadata_json"),
            severity: row.get("severity"),
            content_hash: row.get("content_hash"),
        }))
    }

    /// Source code of an indexed check.
    pub async fn check_code(&self, id: &CheckId) -> Result<Option<String>> {
        let code: Option<String> = sqlx::query_scalar(
            "SELECT code FROM checks WHERE provider = ? AND service = ? AND check_name = ?",
        )
        .bind(&id.provider)
        .bind(&id.service)
        .bind(&id.check_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(code)
    }

    /// Raw metadata JSON of an indexed check.
    pub async fn check_metadata(&self, id: &CheckId) -> Result<Option<String>> {
        let metadata: Option<String> = sqlx::query_scalar(
            "SELECT metadata_json FROM checks WHERE provider = ? AND service = ? AND check_name = ?",
        )
        .bind(&id.provider)
        .bind(&id.service)
        .bind(&id.check_name)
        .fetch_optional(&self.pool)
        .await?;
        Ok(metadata)
    }

    /// SDK-wrapper source for a service, if indexed.
    pub async fn service_code(&self, provider: &str, service: &str) -> Result<Option<String>> {
        let code: Option<String> =
            sqlx::query_scalar("SELECT code FROM services WHERE provider = ? AND service = ?")
                .bind(provider)
                .bind(service)
                .fetch_optional(&self.pool)
                .await?;
        Ok(code)
    }

    pub async fn close(self) {
        self.pool.close().await;
    }

    async fn stored_signature(&self) -> Result<Option<EmbeddingSignature>> {
        let rows = sqlx::query("SELECT key, value FROM index_meta")
            .fetch_all(&self.pool)
            .await?;

        if rows.is_empty() {
            return Ok(None);
        }

        let get = |key: &str| -> Result<String> {
            rows.iter()
                .find(|row| row.get::<String, _>("key") == key)
                .map(|row| row.get::<String, _>("value"))
                .ok_or_else(|| StudioError::IndexCorrupt {
                    path: self.path.clone(),
                    reason: format!("missing index metadata key '{}'", key),
                })
        };

        let dims_raw = get("embedding_dims")?;
        let dims = dims_raw.parse::<usize>().map_err(|_| StudioError::IndexCorrupt {
            path: self.path.clone(),
            reason: format!("unparseable embedding_dims '{}'", dims_raw),
        })?;

        Ok(Some(EmbeddingSignature {
            provider: get("embedding_provider")?,
            model: get("embedding_model")?,
            dims,
        }))
    }

    async fn embed_descriptions(&self, records: &[CheckRecord]) -> Result<Vec<Vec<f32>>> {
        let texts: Vec<String> = records.iter().map(|r| r.description.clone()).collect();
        self.embed_batched(&texts).await
    }

    async fn embed_batched(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());
        for batch in texts.chunks(self.embedding.batch_size.max(1)) {
            let mut batch_vectors =
                embedding::embed_texts(&self.embedding, batch, self.api_key.as_deref()).await?;
            vectors.append(&mut batch_vectors);
        }
        // An index row without its vector must never be committed.
        if vectors.len() != texts.len() {
            return Err(StudioError::EmbeddingProvider(format!(
                "expected {} embeddings, got {}",
                texts.len(),
                vectors.len()
            )));
        }
        Ok(vectors)
    }
}

async fn upsert_check(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    record: &CheckRecord,
    vector: &[f32],
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO checks (provider, service, check_name, description, code, metadata_json, severity, content_hash, embedding)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(provider, service, check_name) DO UPDATE SET
            description = excluded.description,
            code = excluded.code,
            metadata_json = excluded.metadata_json,
            severity = excluded.severity,
            content_hash = excluded.content_hash,
            embedding = excluded.embedding
        "#,
    )
    .bind(&record.id.provider)
    .bind(&record.id.service)
    .bind(&record.id.check_name)
    .bind(&record.description)
    .bind(&record.code)
    .bind(&record.metadata_json)
    .bind(&record.severity)
    .bind(&record.content_hash)
    .bind(vec_to_blob(vector))
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn upsert_service(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    service: &ServiceRecord,
) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO services (provider, service, code, content_hash)
        VALUES (?, ?, ?, ?)
        ON CONFLICT(provider, service) DO UPDATE SET
            code = excluded.code,
            content_hash = excluded.content_hash
        "#,
    )
    .bind(&service.provider)
    .bind(&service.service)
    .bind(&service.code)
    .bind(&service.content_hash)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

async fn migrate(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS index_meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS checks (
            provider TEXT NOT NULL,
            service TEXT NOT NULL,
            check_name TEXT NOT NULL,
            description TEXT NOT NULL,
            code TEXT NOT NULL,
            metadata_json TEXT NOT NULL,
            severity TEXT NOT NULL DEFAULT '',
            content_hash TEXT NOT NULL,
            embedding BLOB NOT NULL,
            PRIMARY KEY (provider, service, check_name)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS services (
            provider TEXT NOT NULL,
            service TEXT NOT NULL,
            code TEXT NOT NULL,
            content_hash TEXT NOT NULL,
            PRIMARY KEY (provider, service)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_checks_provider ON checks(provider, service)")
        .execute(pool)
        .await?;

    Ok(())
}

fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
