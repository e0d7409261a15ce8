//! SQLite-backed [`VectorStore`] implementation.
//!
//! Chunks are stored with their embedding as a little-endian f32 BLOB and
//! searched by brute-force cosine similarity. `upsert` and
//! `delete_by_document` each run in a single transaction, and search reads
//! all chunks with one statement, so readers never see half of a batch.
//!
//! The embedding dimension is pinned in `store_meta` the first time the
//! store is opened; reopening with a different dimension fails instead of
//! mixing incompatible vectors.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use ragchat_core::embedding::{blob_to_vec, cosine_similarity, vec_to_blob};
use ragchat_core::models::{Chunk, Document, SearchHit};
use ragchat_core::store::{rank_hits, validate_chunks, VectorStore};
use ragchat_core::{RagError, Result};

fn storage(e: sqlx::Error) -> RagError {
    RagError::Storage(e.to_string())
}

/// SQLite implementation of the [`VectorStore`] trait.
pub struct SqliteStore {
    pool: SqlitePool,
    dims: usize,
}

impl SqliteStore {
    /// Wrap a migrated pool, recording or checking the embedding dimension.
    pub async fn open(pool: SqlitePool, dims: usize) -> Result<Self> {
        let stored: Option<String> =
            sqlx::query_scalar("SELECT value FROM store_meta WHERE key = 'dims'")
                .fetch_optional(&pool)
                .await
                .map_err(storage)?;

        match stored {
            Some(value) => {
                let existing: usize = value.parse().map_err(|_| {
                    RagError::Storage(format!("corrupt store_meta dims value '{}'", value))
                })?;
                if existing != dims {
                    return Err(RagError::DimensionMismatch {
                        expected: existing,
                        actual: dims,
                    });
                }
            }
            None => {
                sqlx::query("INSERT INTO store_meta (key, value) VALUES ('dims', ?)")
                    .bind(dims.to_string())
                    .execute(&pool)
                    .await
                    .map_err(storage)?;
            }
        }

        Ok(Self { pool, dims })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn row_to_document(row: &SqliteRow) -> Result<Document> {
    let kind: String = row.try_get("kind").map_err(storage)?;
    let char_count: i64 = row.try_get("char_count").map_err(storage)?;
    let chunk_count: i64 = row.try_get("chunk_count").map_err(storage)?;
    Ok(Document {
        id: row.try_get("id").map_err(storage)?,
        source: row.try_get("source").map_err(storage)?,
        kind: kind.parse()?,
        created_at: row.try_get("created_at").map_err(storage)?,
        char_count: char_count as usize,
        chunk_count: chunk_count as usize,
    })
}

fn row_to_chunk(row: &SqliteRow) -> Result<Chunk> {
    let chunk_index: i64 = row.try_get("chunk_index").map_err(storage)?;
    let blob: Vec<u8> = row.try_get("embedding").map_err(storage)?;
    Ok(Chunk {
        id: row.try_get("id").map_err(storage)?,
        document_id: row.try_get("document_id").map_err(storage)?,
        source: row.try_get("source").map_err(storage)?,
        chunk_index: chunk_index as usize,
        text: row.try_get("text").map_err(storage)?,
        embedding: blob_to_vec(&blob),
    })
}

#[async_trait]
impl VectorStore for SqliteStore {
    fn dims(&self) -> usize {
        self.dims
    }

    async fn upsert(&self, chunks: &[Chunk]) -> Result<()> {
        validate_chunks(chunks, self.dims)?;
        let mut tx = self.pool.begin().await.map_err(storage)?;

        for chunk in chunks {
            sqlx::query(
                r#"
                INSERT INTO chunks (id, document_id, source, chunk_index, text, embedding)
                VALUES (?, ?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    document_id = excluded.document_id,
                    source = excluded.source,
                    chunk_index = excluded.chunk_index,
                    text = excluded.text,
                    embedding = excluded.embedding
                "#,
            )
            .bind(&chunk.id)
            .bind(&chunk.document_id)
            .bind(&chunk.source)
            .bind(chunk.chunk_index as i64)
            .bind(&chunk.text)
            .bind(vec_to_blob(&chunk.embedding))
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        }

        tx.commit().await.map_err(storage)?;
        Ok(())
    }

    async fn search(&self, query_embedding: &[f32], top_k: usize) -> Result<Vec<SearchHit>> {
        if query_embedding.len() != self.dims {
            return Err(RagError::DimensionMismatch {
                expected: self.dims,
                actual: query_embedding.len(),
            });
        }

        let rows = sqlx::query(
            "SELECT id, document_id, source, chunk_index, text, embedding FROM chunks ORDER BY seq ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        let mut hits = Vec::with_capacity(rows.len());
        for row in &rows {
            let chunk = row_to_chunk(row)?;
            hits.push(SearchHit {
                score: cosine_similarity(query_embedding, &chunk.embedding),
                chunk,
            });
        }
        rank_hits(&mut hits, top_k);
        Ok(hits)
    }

    async fn delete_by_document(&self, doc_id: &str) -> Result<usize> {
        let mut tx = self.pool.begin().await.map_err(storage)?;

        let removed = sqlx::query("DELETE FROM chunks WHERE document_id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?
            .rows_affected();

        sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(doc_id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;

        tx.commit().await.map_err(storage)?;
        Ok(removed as usize)
    }

    async fn record_document(&self, doc: &Document) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (id, source, kind, created_at, char_count, chunk_count)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                source = excluded.source,
                kind = excluded.kind,
                char_count = excluded.char_count,
                chunk_count = excluded.chunk_count
            "#,
        )
        .bind(&doc.id)
        .bind(&doc.source)
        .bind(doc.kind.as_str())
        .bind(doc.created_at)
        .bind(doc.char_count as i64)
        .bind(doc.chunk_count as i64)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn get_document(&self, doc_id: &str) -> Result<Option<Document>> {
        let row = sqlx::query(
            "SELECT id, source, kind, created_at, char_count, chunk_count FROM documents WHERE id = ?",
        )
        .bind(doc_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.as_ref().map(row_to_document).transpose()
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let rows = sqlx::query(
            "SELECT id, source, kind, created_at, char_count, chunk_count FROM documents ORDER BY created_at ASC, rowid ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter().map(row_to_document).collect()
    }
}
