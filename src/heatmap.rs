//! Map points and statistics shaped from a reconciliation pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::reconciler::ReconcileResult;
use crate::{DetectionRecord, DetectionStatus};

/// A single point to render on the heatmap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapPoint {
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    /// Highest confidence score of the detection, in (0, 1]
    pub intensity: f64,
    pub address: String,
    /// GPS accuracy radius in meters, when the device reported one
    pub accuracy: Option<f64>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl From<&DetectionRecord> for HeatmapPoint {
    fn from(record: &DetectionRecord) -> Self {
        Self {
            id: record.id.clone(),
            lat: record.coordinates.latitude,
            lng: record.coordinates.longitude,
            intensity: record.representative_confidence(),
            address: record.address.clone(),
            accuracy: record.accuracy_meters,
            timestamp: record.created_at,
        }
    }
}

/// Display set plus the aggregates shown next to the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeatmapSummary {
    pub points: Vec<HeatmapPoint>,
    pub total_count: usize,
    pub average_intensity: f64,
    pub max_intensity: f64,
    /// Active detections retired in this pass
    pub removed_count: usize,
    /// Cleaned signals seen in this pass
    pub cleaned_count: usize,
}

/// Build the heatmap display data from a reconciliation result.
pub fn summarize(result: &ReconcileResult) -> HeatmapSummary {
    let points: Vec<HeatmapPoint> = result.active_records.iter().map(HeatmapPoint::from).collect();

    let total_count = points.len();
    let average_intensity = if total_count > 0 {
        points.iter().map(|p| p.intensity).sum::<f64>() / total_count as f64
    } else {
        0.0
    };
    let max_intensity = points.iter().map(|p| p.intensity).fold(0.0, f64::max);

    HeatmapSummary {
        points,
        total_count,
        average_intensity,
        max_intensity,
        removed_count: result.removed_count(),
        cleaned_count: result.cleaned_count(),
    }
}

/// Kept / removed / ignored breakdown of one pass.
///
/// `kept` counts surviving active detections; `removed` and `ignored` count
/// cleaned signals by outcome.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStats {
    pub total: usize,
    pub kept: usize,
    pub removed: usize,
    pub ignored: usize,
    pub kept_percentage: f64,
    pub removed_percentage: f64,
    pub ignored_percentage: f64,
}

impl ProcessingStats {
    pub fn from_result(result: &ReconcileResult) -> Self {
        let kept = result.active_records.len();
        let removed = result.removed_count();
        let ignored = result.ignored_count();
        let total = kept + removed + ignored;

        let pct = |n: usize| {
            if total > 0 {
                n as f64 / total as f64 * 100.0
            } else {
                0.0
            }
        };

        Self {
            total,
            kept,
            removed,
            ignored,
            kept_percentage: pct(kept),
            removed_percentage: pct(removed),
            ignored_percentage: pct(ignored),
        }
    }
}

/// Counts of what is currently in the store, without reconciling.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreCensus {
    pub total: usize,
    pub active: usize,
    pub cleaned: usize,
    /// Records with missing or sentinel coordinates (also counted as active or cleaned)
    pub invalid: usize,
}

impl StoreCensus {
    pub fn from_records(records: &[DetectionRecord]) -> Self {
        records.iter().fold(Self::default(), |mut census, record| {
            census.total += 1;
            match record.status() {
                DetectionStatus::Active => census.active += 1,
                DetectionStatus::Cleaned => census.cleaned += 1,
            }
            if !record.has_valid_location() {
                census.invalid += 1;
            }
            census
        })
    }
}
