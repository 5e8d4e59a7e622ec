//! Detection store boundary.
//!
//! The reconciler only needs two operations from whatever persistence the
//! deployment uses: read every detection, and delete one by id.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::Result;
use crate::normalize::normalize_document;
use crate::DetectionRecord;

/// Read-all / delete-by-id access to detections.
///
/// `delete_detection` returns `Ok(false)` when the id is already absent.
/// Implementations may instead return [`crate::ReconcileError::NotFound`];
/// callers treat both as a successful delete.
pub trait DetectionStore: Send + Sync {
    fn list_detections(&self) -> impl Future<Output = Result<Vec<DetectionRecord>>> + Send;

    fn delete_detection(&self, id: &str) -> impl Future<Output = Result<bool>> + Send;
}

/// In-process store keyed by id.
///
/// Used by tests, demos, and deployments that feed detections from another
/// service.
#[derive(Debug, Default)]
pub struct MemoryDetectionStore {
    records: RwLock<BTreeMap<String, DetectionRecord>>,
    next_id: AtomicU64,
}

impl MemoryDetectionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with records.
    pub fn with_records(records: impl IntoIterator<Item = DetectionRecord>) -> Self {
        let map = records
            .into_iter()
            .map(|record| (record.id.clone(), record))
            .collect();
        Self {
            records: RwLock::new(map),
            next_id: AtomicU64::new(0),
        }
    }

    /// Insert or replace a record under its own id.
    pub async fn insert(&self, record: DetectionRecord) {
        self.records.write().await.insert(record.id.clone(), record);
    }

    /// Normalize and insert a raw document, assigning a new id.
    ///
    /// Ids already present (seeded or inserted explicitly) are skipped.
    pub async fn insert_document(&self, document: &Value) -> Result<String> {
        let mut records = self.records.write().await;
        let id = loop {
            let candidate = format!("det-{:06}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
            if !records.contains_key(&candidate) {
                break candidate;
            }
        };
        let record = normalize_document(&id, document)?;
        records.insert(id.clone(), record);
        Ok(id)
    }

    pub async fn get(&self, id: &str) -> Option<DetectionRecord> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }
}

impl DetectionStore for MemoryDetectionStore {
    async fn list_detections(&self) -> Result<Vec<DetectionRecord>> {
        Ok(self.records.read().await.values().cloned().collect())
    }

    async fn delete_detection(&self, id: &str) -> Result<bool> {
        let removed = self.records.write().await.remove(id).is_some();
        if !removed {
            debug!("[DetectionStore] Delete of {} was a no-op (already absent)", id);
        }
        Ok(removed)
    }
}
