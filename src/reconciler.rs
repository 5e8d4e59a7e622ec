//! # Detection Reconciler
//!
//! Decides which detections stay on the heatmap.
//!
//! A cleaned signal (all confidence scores zero) is evidence that overflow
//! previously reported nearby was cleared. Each cleaned signal retires at most
//! one active detection: the closest not-yet-retired one inside the degree box.
//!
//! ## Ordering
//!
//! Cleaned signals are processed in ascending id order and candidate ties are
//! broken by smallest id, so the set of retirements depends only on the input
//! set, never on the order the store returned it in.
//!
//! The pass is pure. Applying the deletions is the caller's job (see
//! [`crate::scheduler::CleanupScheduler`]).

use std::cmp::Ordering;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::proximity::{degree_distance, haversine_distance, ProximityIndex};
use crate::{DetectionRecord, DetectionStatus, ProximityConfig};

/// Decision reason when no active detection is close enough.
pub const NO_NEARBY_REASON: &str = "no nearby active detection";

/// What happened to a record in one reconciliation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionOutcome {
    /// Active record that stays on the map
    Kept,
    /// Cleaned signal that retired a nearby active record
    Removed,
    /// Cleaned signal with no remaining active record nearby
    Ignored,
}

/// Outcome for one cleaned signal. Transient, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetirementDecision {
    pub cleaned_record_id: String,
    /// None when no nearby active record was found
    pub retired_record_id: Option<String>,
    /// Degree-space distance used for ranking
    pub distance_degrees: Option<f64>,
    /// Great-circle distance, for reporting only
    pub distance_meters: Option<f64>,
    pub outcome: DecisionOutcome,
    pub reason: String,
}

/// Output of [`reconcile`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResult {
    /// One decision per valid cleaned record, in processing order
    pub decisions: Vec<RetirementDecision>,
    /// Active records that survived the pass, in input order
    pub active_records: Vec<DetectionRecord>,
    /// Records dropped for missing or sentinel coordinates
    pub invalid_count: usize,
}

impl ReconcileResult {
    /// Ids of active records to delete from the store.
    pub fn removed_ids(&self) -> Vec<String> {
        self.decisions
            .iter()
            .filter(|d| d.outcome == DecisionOutcome::Removed)
            .filter_map(|d| d.retired_record_id.clone())
            .collect()
    }

    pub fn removed_count(&self) -> usize {
        self.count_outcome(DecisionOutcome::Removed)
    }

    pub fn ignored_count(&self) -> usize {
        self.count_outcome(DecisionOutcome::Ignored)
    }

    /// Number of valid cleaned records seen in the pass.
    pub fn cleaned_count(&self) -> usize {
        self.decisions.len()
    }

    /// Per-record action, for single-detection lookups.
    ///
    /// Returns `Kept` for records still on the map, the decision outcome for
    /// cleaned signals, and `None` for retired, invalid or unknown ids.
    pub fn action_for(&self, id: &str) -> Option<DecisionOutcome> {
        if self.active_records.iter().any(|r| r.id == id) {
            return Some(DecisionOutcome::Kept);
        }
        self.decisions
            .iter()
            .find(|d| d.cleaned_record_id == id)
            .map(|d| d.outcome)
    }

    fn count_outcome(&self, outcome: DecisionOutcome) -> usize {
        self.decisions.iter().filter(|d| d.outcome == outcome).count()
    }
}

/// Run one reconciliation pass over a snapshot of the store.
///
/// Total over its input: records with invalid coordinates are counted and
/// skipped, never reported as errors.
///
/// # Example
/// ```
/// use heatmap_reconciler::{reconcile, DecisionOutcome, DetectionRecord, GeoPoint, ProximityConfig};
///
/// let records = vec![
///     DetectionRecord::new("a", GeoPoint::new(22.70, 88.40), vec![0.7]),
///     DetectionRecord::new("c", GeoPoint::new(22.80, 88.50), vec![0.0]),
/// ];
/// let result = reconcile(&records, &ProximityConfig::default());
/// assert_eq!(result.decisions[0].outcome, DecisionOutcome::Ignored);
/// assert_eq!(result.active_records.len(), 1);
/// ```
pub fn reconcile(records: &[DetectionRecord], config: &ProximityConfig) -> ReconcileResult {
    let mut invalid_count = 0;
    let mut active: Vec<&DetectionRecord> = Vec::new();
    let mut cleaned: Vec<&DetectionRecord> = Vec::new();

    for record in records {
        if !record.has_valid_location() {
            debug!(
                "[Reconciler] Skipping {}: invalid location ({}, {})",
                record.id, record.coordinates.latitude, record.coordinates.longitude
            );
            invalid_count += 1;
            continue;
        }
        match record.status() {
            DetectionStatus::Active => active.push(record),
            DetectionStatus::Cleaned => cleaned.push(record),
        }
    }

    cleaned.sort_by(|a, b| a.id.cmp(&b.id));

    let active_points: Vec<_> = active.iter().map(|r| r.coordinates).collect();
    let index = ProximityIndex::build(&active_points);
    let mut retired = vec![false; active.len()];
    let mut decisions = Vec::with_capacity(cleaned.len());

    for signal in &cleaned {
        let closest = index
            .candidates_near(&signal.coordinates, config)
            .into_iter()
            .filter(|&i| !retired[i])
            .map(|i| (i, degree_distance(&signal.coordinates, &active[i].coordinates)))
            .min_by(|(ia, da), (ib, db)| {
                da.partial_cmp(db)
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| active[*ia].id.cmp(&active[*ib].id))
            });

        let decision = match closest {
            Some((i, distance)) => {
                retired[i] = true;
                let target = active[i];
                debug!(
                    "[Reconciler] {} retires {} ({:.6} degrees away)",
                    signal.id, target.id, distance
                );
                RetirementDecision {
                    cleaned_record_id: signal.id.clone(),
                    retired_record_id: Some(target.id.clone()),
                    distance_degrees: Some(distance),
                    distance_meters: Some(haversine_distance(
                        &signal.coordinates,
                        &target.coordinates,
                    )),
                    outcome: DecisionOutcome::Removed,
                    reason: format!(
                        "retired nearby detection {} ({:.6} degrees away)",
                        target.id, distance
                    ),
                }
            }
            None => {
                debug!("[Reconciler] {} has no nearby active detection", signal.id);
                RetirementDecision {
                    cleaned_record_id: signal.id.clone(),
                    retired_record_id: None,
                    distance_degrees: None,
                    distance_meters: None,
                    outcome: DecisionOutcome::Ignored,
                    reason: NO_NEARBY_REASON.to_string(),
                }
            }
        };
        decisions.push(decision);
    }

    let active_records: Vec<DetectionRecord> = active
        .iter()
        .zip(&retired)
        .filter(|(_, &is_retired)| !is_retired)
        .map(|(record, _)| (*record).clone())
        .collect();

    let result = ReconcileResult {
        decisions,
        active_records,
        invalid_count,
    };

    info!(
        "[Reconciler] Processed {} records: {} kept, {} retired, {} cleaned, {} invalid",
        records.len(),
        result.active_records.len(),
        result.removed_count(),
        result.cleaned_count(),
        invalid_count
    );

    result
}
