//! SQLite-backed [`VectorStore`] adapter, grounded on
//! `wg-ragsmith::stores::sqlite::SqliteChunkStore`: `tokio-rusqlite` driving
//! a connection with the `sqlite-vec` extension registered once via
//! `std::sync::Once`, with a parallel `vec0` virtual table for the embedding
//! column and cosine distance computed by `vec_distance_cosine`.

use std::mem::transmute;
use std::os::raw::c_char;
use std::path::Path;
use std::sync::Once;

use async_trait::async_trait;
use tokio_rusqlite::{ffi, Connection, OptionalExtension};

use crate::error::{IngestionError, RetrievalError};

use super::{EqualityFilter, VectorStore, VectorStoreHit};

/// A chunk store backed by SQLite + `sqlite-vec`.
pub struct SqliteVectorStore {
    conn: Connection,
    dimensions: usize,
}

impl SqliteVectorStore {
    pub async fn open(path: impl AsRef<Path>, dimensions: usize) -> Result<Self, IngestionError> {
        Self::register_sqlite_vec().map_err(IngestionError::Storage)?;
        let conn = Connection::open(path)
            .await
            .map_err(|err| IngestionError::Storage(err.to_string()))?;

        conn.call(move |conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS vodic_chunks (
                    id TEXT PRIMARY KEY,
                    metadata TEXT NOT NULL,
                    text TEXT NOT NULL
                );",
            )?;
            conn.execute(
                &format!(
                    "CREATE VIRTUAL TABLE IF NOT EXISTS vodic_embeddings USING vec0(\
                        id TEXT PRIMARY KEY, embedding float[{dimensions}])"
                ),
                [],
            )?;
            Ok(())
        })
        .await
        .map_err(|err| IngestionError::Storage(err.to_string()))?;

        Ok(Self { conn, dimensions })
    }

    fn register_sqlite_vec() -> Result<(), String> {
        use std::sync::Mutex;

        static INIT: Once = Once::new();
        static INIT_RESULT: Mutex<Option<Result<(), String>>> = Mutex::new(None);

        INIT.call_once(|| {
            let result = unsafe {
                type SqliteExtensionInit = unsafe extern "C" fn(
                    *mut ffi::sqlite3,
                    *mut *mut c_char,
                    *const ffi::sqlite3_api_routines,
                ) -> i32;

                let init: unsafe extern "C" fn() = sqlite_vec::sqlite3_vec_init;
                let init_fn: SqliteExtensionInit =
                    transmute::<unsafe extern "C" fn(), SqliteExtensionInit>(init);
                let rc = ffi::sqlite3_auto_extension(Some(init_fn));
                if rc != 0 {
                    Err(format!("failed to register sqlite-vec extension (code {rc})"))
                } else {
                    Ok(())
                }
            };
            *INIT_RESULT.lock().expect("init result mutex poisoned") = Some(result);
        });

        INIT_RESULT
            .lock()
            .expect("init result mutex poisoned")
            .clone()
            .expect("init was called but result not set")
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn upsert(
        &self,
        id: &str,
        vector: Vec<f32>,
        metadata: serde_json::Value,
        text: &str,
    ) -> Result<(), IngestionError> {
        if vector.len() != self.dimensions {
            return Err(IngestionError::Storage(format!(
                "embedding has {} dimensions, expected {}",
                vector.len(),
                self.dimensions
            )));
        }
        let id = id.to_string();
        let text = text.to_string();
        let metadata_json = metadata.to_string();
        let vector_json = serde_json::to_string(&vector)
            .map_err(|err| IngestionError::Storage(err.to_string()))?;

        self.conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                tx.execute(
                    "INSERT INTO vodic_chunks (id, metadata, text) VALUES (?1, ?2, ?3)
                     ON CONFLICT(id) DO UPDATE SET metadata = excluded.metadata, text = excluded.text",
                    tokio_rusqlite::params![id, metadata_json, text],
                )?;
                tx.execute("DELETE FROM vodic_embeddings WHERE id = ?1", [&id])?;
                tx.execute(
                    "INSERT INTO vodic_embeddings (id, embedding) VALUES (?1, vec_f32(?2))",
                    tokio_rusqlite::params![id, vector_json],
                )?;
                tx.commit()?;
                Ok(())
            })
            .await
            .map_err(|err| IngestionError::Storage(err.to_string()))
    }

    async fn query(
        &self,
        vector: &[f32],
        filter: Option<EqualityFilter>,
        top_k: usize,
    ) -> Result<Vec<VectorStoreHit>, RetrievalError> {
        let vector_json = serde_json::to_string(vector)
            .map_err(|err| RetrievalError::Store(err.to_string()))?;

        let sql = match &filter {
            Some(f) => format!(
                "SELECT c.id, c.metadata, c.text, vec_distance_cosine(e.embedding, vec_f32(?1)) as distance \
                 FROM vodic_chunks c JOIN vodic_embeddings e ON c.id = e.id \
                 WHERE json_extract(c.metadata, '$.{}') = ?2 \
                 ORDER BY distance ASC LIMIT {}",
                f.key, top_k
            ),
            None => format!(
                "SELECT c.id, c.metadata, c.text, vec_distance_cosine(e.embedding, vec_f32(?1)) as distance \
                 FROM vodic_chunks c JOIN vodic_embeddings e ON c.id = e.id \
                 ORDER BY distance ASC LIMIT {}",
                top_k
            ),
        };

        let filter_value = filter.as_ref().map(|f| f.value.clone());
        self.conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&sql)?;
                let map_row = |row: &tokio_rusqlite::Row<'_>| {
                    let metadata_raw: String = row.get(1)?;
                    let metadata: serde_json::Value =
                        serde_json::from_str(&metadata_raw).unwrap_or_default();
                    Ok(VectorStoreHit {
                        id: row.get(0)?,
                        metadata,
                        text: row.get(2)?,
                        distance: row.get(3)?,
                    })
                };

                let rows = if let Some(value) = filter_value {
                    stmt.query_map(tokio_rusqlite::params![vector_json, value], map_row)?
                } else {
                    stmt.query_map(tokio_rusqlite::params![vector_json], map_row)?
                };

                let mut hits = Vec::new();
                for row in rows {
                    hits.push(row?);
                }
                Ok(hits)
            })
            .await
            .map_err(|err| RetrievalError::Store(err.to_string()))
    }

    async fn delete(&self, id: &str) -> Result<(), IngestionError> {
        let id = id.to_string();
        self.conn
            .call(move |conn| {
                conn.execute("DELETE FROM vodic_chunks WHERE id = ?1", [&id])?;
                conn.execute("DELETE FROM vodic_embeddings WHERE id = ?1", [&id])?;
                Ok(())
            })
            .await
            .map_err(|err| IngestionError::Storage(err.to_string()))
    }

    async fn count(&self) -> Result<usize, IngestionError> {
        self.conn
            .call(|conn| {
                let count: i64 =
                    conn.query_row("SELECT COUNT(*) FROM vodic_chunks", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
            .map_err(|err| IngestionError::Storage(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn upsert_is_idempotent_and_query_filters_by_equality() {
        let dir = tempfile::tempdir().unwrap();
        let store = SqliteVectorStore::open(dir.path().join("test.db"), 4)
            .await
            .unwrap();

        store
            .upsert(
                "a",
                vec![1.0, 0.0, 0.0, 0.0],
                serde_json::json!({"destination": "Rim"}),
                "hotel rim",
            )
            .await
            .unwrap();
        // Re-upsert under the same id: no duplicate row should appear.
        store
            .upsert(
                "a",
                vec![1.0, 0.0, 0.0, 0.0],
                serde_json::json!({"destination": "Rim"}),
                "hotel rim v2",
            )
            .await
            .unwrap();
        store
            .upsert(
                "b",
                vec![0.0, 1.0, 0.0, 0.0],
                serde_json::json!({"destination": "Pariz"}),
                "hotel paris",
            )
            .await
            .unwrap();

        assert_eq!(store.count().await.unwrap(), 2);

        let hits = store
            .query(
                &[1.0, 0.0, 0.0, 0.0],
                Some(EqualityFilter {
                    key: "destination".into(),
                    value: "Rim".into(),
                }),
                10,
            )
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "hotel rim v2");
    }
}
