//! # SQLite Detection Store
//!
//! Document-style detection storage backed by SQLite.
//!
//! Each detection is kept as the raw JSON document it arrived as, and is
//! normalized on read. Documents that no longer parse are skipped with a
//! warning so one bad row never blocks a cleanup run.

use std::sync::{Mutex, MutexGuard};

use log::{info, warn};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;

use crate::error::{ReconcileError, Result};
use crate::normalize::normalize_json;
use crate::store::DetectionStore;
use crate::DetectionRecord;

/// SQLite-backed [`DetectionStore`].
pub struct SqliteDetectionStore {
    db: Mutex<Connection>,
}

impl SqliteDetectionStore {
    /// Open (or create) a store at the given database path.
    pub fn new(db_path: &str) -> Result<Self> {
        let db = Connection::open(db_path)?;
        Self::init_schema(&db)?;
        info!("[DetectionStore] Opened SQLite store at {}", db_path);
        Ok(Self { db: Mutex::new(db) })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        Self::new(":memory:")
    }

    fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS detections (
                id TEXT PRIMARY KEY,
                document TEXT NOT NULL,
                created_at INTEGER DEFAULT (strftime('%s', 'now'))
            );

            CREATE INDEX IF NOT EXISTS idx_detections_created_at ON detections(created_at);
            "#,
        )
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.db.lock().map_err(|_| ReconcileError::Persistence {
            message: "database lock poisoned".to_string(),
        })
    }

    /// Store a raw document under an explicit id, replacing any existing one.
    pub fn insert_document_with_id(&self, id: &str, document: &Value) -> Result<()> {
        ensure_object(id, document)?;
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO detections (id, document) VALUES (?, ?)",
            params![id, document.to_string()],
        )?;
        Ok(())
    }

    /// Store a raw document under a newly assigned id.
    ///
    /// Generated ids never collide with a stored one, including ids written
    /// through [`insert_document_with_id`](Self::insert_document_with_id).
    pub fn insert_document(&self, document: &Value) -> Result<String> {
        ensure_object("new", document)?;
        let conn = self.conn()?;
        let mut next: i64 = conn.query_row(
            "SELECT COALESCE(MAX(rowid), 0) + 1 FROM detections",
            [],
            |row| row.get(0),
        )?;
        loop {
            let id = format!("det-{:06}", next);
            let taken = conn
                .query_row("SELECT 1 FROM detections WHERE id = ?", params![id], |_| Ok(()))
                .optional()?
                .is_some();
            if !taken {
                conn.execute(
                    "INSERT INTO detections (id, document) VALUES (?, ?)",
                    params![id, document.to_string()],
                )?;
                return Ok(id);
            }
            next += 1;
        }
    }

    /// Number of stored documents, parseable or not.
    pub fn count(&self) -> Result<usize> {
        let conn = self.conn()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM detections", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let found = conn
            .query_row(
                "SELECT 1 FROM detections WHERE id = ?",
                params![id],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn read_all(&self) -> Result<Vec<DetectionRecord>> {
        let conn = self.conn()?;
        let mut stmt =
            conn.prepare("SELECT id, document, created_at FROM detections ORDER BY created_at DESC")?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<i64>>(2)?,
            ))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (id, document, created_at) = row?;
            match normalize_json(&id, &document) {
                Ok(mut record) => {
                    if record.created_at.is_none() {
                        record.created_at = created_at
                            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0));
                    }
                    records.push(record);
                }
                Err(e) => warn!("[DetectionStore] Skipping unreadable document: {}", e),
            }
        }
        Ok(records)
    }

    fn delete_row(&self, id: &str) -> Result<bool> {
        let conn = self.conn()?;
        let deleted = conn.execute("DELETE FROM detections WHERE id = ?", params![id])?;
        Ok(deleted > 0)
    }
}

fn ensure_object(id: &str, document: &Value) -> Result<()> {
    if document.is_object() {
        Ok(())
    } else {
        Err(ReconcileError::InvalidDocument {
            id: id.to_string(),
            message: "document is not an object".to_string(),
        })
    }
}

impl DetectionStore for SqliteDetectionStore {
    async fn list_detections(&self) -> Result<Vec<DetectionRecord>> {
        self.read_all().map_err(|e| ReconcileError::StoreRead {
            message: e.to_string(),
        })
    }

    async fn delete_detection(&self, id: &str) -> Result<bool> {
        self.delete_row(id).map_err(|e| ReconcileError::StoreDelete {
            id: id.to_string(),
            message: e.to_string(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn active_doc() -> Value {
        json!({
            "confidence_scores": [0.8],
            "location": { "latitude": 22.695, "longitude": 88.3794, "address": "Ward 12" }
        })
    }

    #[tokio::test]
    async fn test_create_store() {
        let store = SqliteDetectionStore::in_memory().unwrap();
        assert_eq!(store.count().unwrap(), 0);
        assert!(store.list_detections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_and_list() {
        let store = SqliteDetectionStore::in_memory().unwrap();
        let id = store.insert_document(&active_doc()).unwrap();
        assert_eq!(id, "det-000001");

        let records = store.list_detections().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, id);
        assert_eq!(records[0].address, "Ward 12");
        // Falls back to the row insertion time
        assert!(records[0].created_at.is_some());
    }

    #[tokio::test]
    async fn test_delete_reports_absence() {
        let store = SqliteDetectionStore::in_memory().unwrap();
        let id = store.insert_document(&active_doc()).unwrap();

        assert!(store.delete_detection(&id).await.unwrap());
        assert!(!store.delete_detection(&id).await.unwrap());
        assert!(!store.contains(&id).unwrap());
    }

    #[tokio::test]
    async fn test_unreadable_document_is_skipped() {
        let store = SqliteDetectionStore::in_memory().unwrap();
        store.insert_document(&active_doc()).unwrap();
        {
            let conn = store.conn().unwrap();
            conn.execute(
                "INSERT INTO detections (id, document) VALUES ('broken', '{not json')",
                [],
            )
            .unwrap();
        }

        assert_eq!(store.count().unwrap(), 2);
        let records = store.list_detections().await.unwrap();
        assert_eq!(records.len(), 1);
    }

    #[tokio::test]
    async fn test_generated_id_skips_explicit_ids() {
        let store = SqliteDetectionStore::in_memory().unwrap();
        store
            .insert_document_with_id("det-000002", &active_doc())
            .unwrap();
        store
            .insert_document_with_id("det-000003", &active_doc())
            .unwrap();

        let cleaned = json!({ "confidence_scores": [0.0], "lat": 22.695, "lng": 88.3794 });
        let first = store.insert_document(&cleaned).unwrap();
        let second = store.insert_document(&cleaned).unwrap();

        assert_ne!(first, "det-000002");
        assert_ne!(first, "det-000003");
        assert_ne!(first, second);
        assert_eq!(store.count().unwrap(), 4);

        let records = store.list_detections().await.unwrap();
        let explicit = records.iter().find(|r| r.id == "det-000002").unwrap();
        assert!(explicit.is_active());
    }

    #[test]
    fn test_generated_id_after_delete_does_not_reuse_live_id() {
        let store = SqliteDetectionStore::in_memory().unwrap();
        let a = store.insert_document(&active_doc()).unwrap();
        let b = store.insert_document(&active_doc()).unwrap();
        store.delete_row(&a).unwrap();

        let c = store.insert_document(&active_doc()).unwrap();
        assert_ne!(c, b);
        assert_eq!(store.count().unwrap(), 2);
        assert!(store.contains(&b).unwrap());
    }

    #[test]
    fn test_rejects_non_object() {
        let store = SqliteDetectionStore::in_memory().unwrap();
        assert!(matches!(
            store.insert_document_with_id("x", &json!(42)),
            Err(ReconcileError::InvalidDocument { .. })
        ));
        assert!(store.insert_document(&json!([1])).is_err());
        assert_eq!(store.count().unwrap(), 0);
    }
}
