//! SQLite-backed document and chunk store.

use super::DocumentStore;
use crate::types::{Chunk, ChunkId, Document};
use chrono::{DateTime, Utc};
use docqa_core::{AppError, AppResult};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

const SCHEMA: &str = r#"
    PRAGMA foreign_keys = ON;

    CREATE TABLE IF NOT EXISTS documents (
        id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        doc_type TEXT NOT NULL,
        content TEXT NOT NULL,
        tags TEXT NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS chunks (
        document_id TEXT NOT NULL,
        local_index INTEGER NOT NULL,
        text TEXT NOT NULL,
        embedding BLOB,
        metadata TEXT NOT NULL,
        PRIMARY KEY (document_id, local_index),
        FOREIGN KEY (document_id) REFERENCES documents(id) ON DELETE CASCADE
    );

    CREATE INDEX IF NOT EXISTS idx_chunks_document ON chunks(document_id);
"#;

const CHUNK_COLUMNS: &str = "document_id, local_index, text, embedding, metadata";
const DOCUMENT_COLUMNS: &str = "id, title, doc_type, content, tags, created_at, updated_at";

/// Store backed by a single SQLite database file.
///
/// Statements run on the blocking thread pool so slow disk I/O never stalls
/// the async workers.
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open (creating if needed) the database at `db_path`.
    pub fn open(db_path: &Path) -> AppResult<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                AppError::Store(format!("Failed to create store directory: {}", e))
            })?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| AppError::Store(format!("Failed to open SQLite store: {}", e)))?;

        let store = Self::with_connection(conn)?;
        tracing::debug!("Opened SQLite store at {:?}", db_path);
        Ok(store)
    }

    /// A private in-memory database.
    pub fn open_in_memory() -> AppResult<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| AppError::Store(format!("Failed to open SQLite store: {}", e)))?;
        Self::with_connection(conn)
    }

    fn with_connection(conn: Connection) -> AppResult<Self> {
        conn.execute_batch(SCHEMA)
            .map_err(|e| AppError::Store(format!("Failed to create tables: {}", e)))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn run<F, R>(&self, f: F) -> AppResult<R>
    where
        F: FnOnce(&mut Connection) -> AppResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut conn = conn
                .lock()
                .map_err(|_| AppError::Store("SQLite connection lock poisoned".to_string()))?;
            f(&mut conn)
        })
        .await
        .map_err(|e| AppError::Store(format!("SQLite task failed: {}", e)))?
    }
}

fn store_err(context: &str) -> impl Fn(rusqlite::Error) -> AppError + '_ {
    move |e| AppError::Store(format!("{}: {}", context, e))
}

fn conversion_err<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn parse_time(row: &Row<'_>, column: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| conversion_err(column, e))
}

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    let tags_json: String = row.get(4)?;
    let tags: Vec<String> = serde_json::from_str(&tags_json).map_err(|e| conversion_err(4, e))?;

    Ok(Document {
        id: row.get(0)?,
        title: row.get(1)?,
        doc_type: row.get(2)?,
        content: row.get(3)?,
        tags,
        created_at: parse_time(row, 5)?,
        updated_at: parse_time(row, 6)?,
    })
}

fn row_to_chunk(row: &Row<'_>) -> rusqlite::Result<Chunk> {
    let embedding = row
        .get::<_, Option<Vec<u8>>>(3)?
        .map(|bytes| bytes_to_embedding(&bytes))
        .transpose()
        .map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(3, Type::Blob, Box::new(e))
        })?;

    let metadata_json: String = row.get(4)?;
    let metadata = serde_json::from_str(&metadata_json).map_err(|e| conversion_err(4, e))?;

    Ok(Chunk {
        document_id: row.get(0)?,
        local_index: row.get::<_, i64>(1)? as u32,
        text: row.get(2)?,
        embedding,
        metadata,
    })
}

/// Convert embedding vector to little-endian bytes for storage.
fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(embedding.len() * 4);
    for &value in embedding {
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Convert bytes back to embedding vector.
fn bytes_to_embedding(bytes: &[u8]) -> Result<Vec<f32>, std::io::Error> {
    if bytes.len() % 4 != 0 {
        return Err(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "Invalid embedding bytes length",
        ));
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[async_trait::async_trait]
impl DocumentStore for SqliteStore {
    async fn create_document(&self, document: &Document) -> AppResult<()> {
        let document = document.clone();
        let tags = serde_json::to_string(&document.tags)?;
        self.run(move |conn| {
            conn.execute(
                &format!("INSERT INTO documents ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)", DOCUMENT_COLUMNS),
                params![
                    document.id,
                    document.title,
                    document.doc_type,
                    document.content,
                    tags,
                    document.created_at.to_rfc3339(),
                    document.updated_at.to_rfc3339(),
                ],
            )
            .map_err(store_err("Failed to insert document"))?;
            Ok(())
        })
        .await
    }

    async fn get_document(&self, id: &str) -> AppResult<Option<Document>> {
        let id = id.to_string();
        self.run(move |conn| {
            conn.query_row(
                &format!("SELECT {} FROM documents WHERE id = ?1", DOCUMENT_COLUMNS),
                params![id],
                row_to_document,
            )
            .optional()
            .map_err(store_err("Failed to read document"))
        })
        .await
    }

    async fn list_documents(&self) -> AppResult<Vec<Document>> {
        self.run(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM documents ORDER BY created_at, id",
                    DOCUMENT_COLUMNS
                ))
                .map_err(store_err("Failed to prepare query"))?;

            let documents = stmt
                .query_map([], row_to_document)
                .map_err(store_err("Failed to list documents"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(store_err("Failed to read document"))?;
            Ok(documents)
        })
        .await
    }

    async fn update_document(&self, document: &Document) -> AppResult<()> {
        let document = document.clone();
        let tags = serde_json::to_string(&document.tags)?;
        self.run(move |conn| {
            let updated = conn
                .execute(
                    "UPDATE documents SET title = ?2, doc_type = ?3, content = ?4, tags = ?5, updated_at = ?6 WHERE id = ?1",
                    params![
                        document.id,
                        document.title,
                        document.doc_type,
                        document.content,
                        tags,
                        document.updated_at.to_rfc3339(),
                    ],
                )
                .map_err(store_err("Failed to update document"))?;

            if updated == 0 {
                return Err(AppError::NotFound(format!("Document {}", document.id)));
            }
            Ok(())
        })
        .await
    }

    async fn delete_document(&self, id: &str) -> AppResult<bool> {
        let id = id.to_string();
        self.run(move |conn| {
            let tx = conn
                .transaction()
                .map_err(store_err("Failed to begin transaction"))?;
            tx.execute("DELETE FROM chunks WHERE document_id = ?1", params![id])
                .map_err(store_err("Failed to delete chunks"))?;
            let deleted = tx
                .execute("DELETE FROM documents WHERE id = ?1", params![id])
                .map_err(store_err("Failed to delete document"))?;
            tx.commit().map_err(store_err("Failed to commit delete"))?;
            Ok(deleted > 0)
        })
        .await
    }

    async fn create_chunks_bulk(&self, chunks: &[Chunk]) -> AppResult<()> {
        let chunks = chunks.to_vec();
        let count = chunks.len();
        self.run(move |conn| {
            let tx = conn
                .transaction()
                .map_err(store_err("Failed to begin transaction"))?;
            {
                let mut stmt = tx
                    .prepare(&format!(
                        "INSERT INTO chunks ({}) VALUES (?1, ?2, ?3, ?4, ?5)",
                        CHUNK_COLUMNS
                    ))
                    .map_err(store_err("Failed to prepare insert"))?;

                for chunk in &chunks {
                    let metadata = serde_json::to_string(&chunk.metadata)?;
                    stmt.execute(params![
                        chunk.document_id,
                        chunk.local_index as i64,
                        chunk.text,
                        chunk.embedding.as_deref().map(embedding_to_bytes),
                        metadata,
                    ])
                    .map_err(store_err("Failed to insert chunk"))?;
                }
            }
            tx.commit().map_err(store_err("Failed to commit chunks"))?;
            Ok(())
        })
        .await?;

        tracing::debug!("Stored {} chunks", count);
        Ok(())
    }

    async fn get_chunks_by_document(&self, document_id: &str) -> AppResult<Vec<Chunk>> {
        let document_id = document_id.to_string();
        self.run(move |conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM chunks WHERE document_id = ?1 ORDER BY local_index",
                    CHUNK_COLUMNS
                ))
                .map_err(store_err("Failed to prepare query"))?;

            let chunks = stmt
                .query_map(params![document_id], row_to_chunk)
                .map_err(store_err("Failed to query chunks"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(store_err("Failed to read chunk"))?;
            Ok(chunks)
        })
        .await
    }

    async fn get_chunk_by_external_id(&self, id: &ChunkId) -> AppResult<Option<Chunk>> {
        let id = id.clone();
        self.run(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {} FROM chunks WHERE document_id = ?1 AND local_index = ?2",
                    CHUNK_COLUMNS
                ),
                params![id.document_id, id.local_index as i64],
                row_to_chunk,
            )
            .optional()
            .map_err(store_err("Failed to read chunk"))
        })
        .await
    }

    async fn delete_chunks_by_document(&self, document_id: &str) -> AppResult<usize> {
        let document_id = document_id.to_string();
        self.run(move |conn| {
            conn.execute("DELETE FROM chunks WHERE document_id = ?1", params![document_id])
                .map_err(store_err("Failed to delete chunks"))
        })
        .await
    }

    async fn all_chunks(&self) -> AppResult<Vec<Chunk>> {
        self.run(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {} FROM chunks ORDER BY document_id, local_index",
                    CHUNK_COLUMNS
                ))
                .map_err(store_err("Failed to prepare query"))?;

            let chunks = stmt
                .query_map([], row_to_chunk)
                .map_err(store_err("Failed to query chunks"))?
                .collect::<rusqlite::Result<Vec<_>>>()
                .map_err(store_err("Failed to read chunk"))?;
            Ok(chunks)
        })
        .await
    }

    async fn chunk_counts(&self) -> AppResult<HashMap<String, usize>> {
        self.run(|conn| {
            let mut stmt = conn
                .prepare("SELECT document_id, COUNT(*) FROM chunks GROUP BY document_id")
                .map_err(store_err("Failed to prepare query"))?;

            let counts = stmt
                .query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as usize))
                })
                .map_err(store_err("Failed to count chunks"))?
                .collect::<rusqlite::Result<HashMap<_, _>>>()
                .map_err(store_err("Failed to count chunks"))?;
            Ok(counts)
        })
        .await
    }

    async fn counts(&self) -> AppResult<(usize, usize)> {
        self.run(|conn| {
            let documents: i64 = conn
                .query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))
                .map_err(store_err("Failed to count documents"))?;
            let chunks: i64 = conn
                .query_row("SELECT COUNT(*) FROM chunks", [], |row| row.get(0))
                .map_err(store_err("Failed to count chunks"))?;
            Ok((documents as usize, chunks as usize))
        })
        .await
    }
}
