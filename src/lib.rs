//! # Heatmap Reconciler
//!
//! Deduplication and lifecycle engine for geotagged garbage-overflow detections.
//!
//! This library provides:
//! - Classification of detections as active (garbage seen) or cleaned (all-zero confidence)
//! - Retirement of the nearest active detection for every cleaned signal
//! - A recurring cleanup scheduler that applies retirements to a detection store
//!
//! ## Features
//!
//! - **`persistence`** - Enable the SQLite-backed detection store
//! - **`cli`** - Build the `heatmap-cleanup` binary
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use heatmap_reconciler::{reconcile, DetectionRecord, GeoPoint, ProximityConfig};
//!
//! let records = vec![
//!     DetectionRecord::new("a", GeoPoint::new(22.6950, 88.3794), vec![0.8]),
//!     DetectionRecord::new("c", GeoPoint::new(22.6950, 88.3794), vec![0.0, 0.0]),
//! ];
//!
//! let result = reconcile(&records, &ProximityConfig::default());
//! assert_eq!(result.removed_ids(), vec!["a".to_string()]);
//! assert!(result.active_records.is_empty());
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, ReconcileError, Result};

// Thresholds and scheduler configuration
pub mod config;
pub use config::{CleanupConfig, HeatmapConfig, ProximityConfig};

// Degree-box proximity, tie-break distance and candidate index
pub mod proximity;
pub use proximity::{degree_distance, haversine_distance, within_threshold, ProximityIndex};

// Core reconciliation pass
pub mod reconciler;
pub use reconciler::{reconcile, DecisionOutcome, ReconcileResult, RetirementDecision};

// Raw document -> DetectionRecord mapping
pub mod normalize;
pub use normalize::normalize_document;

// Store boundary
pub mod store;
pub use store::{DetectionStore, MemoryDetectionStore};

// SQLite detection store
#[cfg(feature = "persistence")]
pub mod persistence;
#[cfg(feature = "persistence")]
pub use persistence::SqliteDetectionStore;

// Recurring cleanup
pub mod scheduler;
pub use scheduler::{
    CleanupHandle, CleanupScheduler, CleanupStats, CleanupTotals, SchedulerState,
};

// Map points and statistics
pub mod heatmap;
pub use heatmap::{summarize, HeatmapPoint, HeatmapSummary, ProcessingStats, StoreCensus};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use heatmap_reconciler::GeoPoint;
/// let point = GeoPoint::new(22.6950, 88.3794);
/// assert!(point.is_valid());
/// assert!(!GeoPoint::new(0.0, 0.0).is_valid()); // no GPS fix
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// The `(0, 0)` placeholder written when the device had no GPS fix.
    pub fn is_sentinel(&self) -> bool {
        self.latitude == 0.0 && self.longitude == 0.0
    }

    /// Check if the point has usable coordinates.
    ///
    /// Non-finite, out-of-range and sentinel points are all invalid.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
            && !self.is_sentinel()
    }
}

/// Classification of a detection. There is no third state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionStatus {
    /// At least one positive confidence score: overflow still present.
    Active,
    /// Every confidence score is zero (or there are none): the spot was cleaned.
    Cleaned,
}

/// One garbage-detection event tied to a location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectionRecord {
    /// Store-assigned identifier, stable for the record's lifetime
    pub id: String,
    pub coordinates: GeoPoint,
    /// One score in [0, 1] per object detected in the originating image
    pub confidence_scores: Vec<f64>,
    /// Display only, never used for matching
    #[serde(default)]
    pub address: String,
    /// Reported GPS accuracy in meters. Display only, thresholds are not scaled by it
    #[serde(default)]
    pub accuracy_meters: Option<f64>,
    /// Display/ordering only, never used for matching
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl DetectionRecord {
    /// Create a record with no address or timestamp.
    pub fn new(id: impl Into<String>, coordinates: GeoPoint, confidence_scores: Vec<f64>) -> Self {
        Self {
            id: id.into(),
            coordinates,
            confidence_scores,
            address: String::new(),
            accuracy_meters: None,
            created_at: None,
        }
    }

    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    pub fn with_accuracy(mut self, meters: f64) -> Self {
        self.accuracy_meters = Some(meters);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Active iff any score is positive; everything else is cleaned.
    pub fn status(&self) -> DetectionStatus {
        if self.confidence_scores.iter().any(|&score| score > 0.0) {
            DetectionStatus::Active
        } else {
            DetectionStatus::Cleaned
        }
    }

    pub fn is_active(&self) -> bool {
        self.status() == DetectionStatus::Active
    }

    pub fn is_cleaned(&self) -> bool {
        self.status() == DetectionStatus::Cleaned
    }

    /// Highest confidence score, used as map intensity. `0.0` when cleaned.
    pub fn representative_confidence(&self) -> f64 {
        if self.is_cleaned() {
            return 0.0;
        }
        self.confidence_scores
            .iter()
            .copied()
            .fold(0.0, f64::max)
    }

    /// Whether the record takes part in matching and display at all.
    pub fn has_valid_location(&self) -> bool {
        self.coordinates.is_valid()
    }
}

// ============================================================================
// Tests
// ============================================================================
