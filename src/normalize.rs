//! Maps raw store documents into [`DetectionRecord`].
//!
//! Detection documents have drifted over time: confidence as an array or a
//! single number, location nested or flat, several spellings of the creation
//! time. This is the only place that knows about those shapes.

use chrono::{DateTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::Value;

use crate::error::{OptionExt, ReconcileError, Result};
use crate::{DetectionRecord, GeoPoint};

#[derive(Debug, Default, Deserialize)]
struct RawLocation {
    #[serde(alias = "lat")]
    latitude: Option<f64>,
    #[serde(alias = "lng", alias = "lon")]
    longitude: Option<f64>,
    address: Option<String>,
    accuracy: Option<RawAccuracy>,
}

/// Reported either as meters or as free text such as `"±78 meters"`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawAccuracy {
    Meters(f64),
    Text(String),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawConfidence {
    Many(Vec<f64>),
    One(f64),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawTimestamp {
    Text(String),
    UnixSeconds(i64),
}

#[derive(Debug, Deserialize)]
struct RawDetection {
    #[serde(alias = "confidenceScores")]
    confidence_scores: Option<RawConfidence>,
    #[serde(alias = "confidence")]
    confidence_score: Option<f64>,
    #[serde(alias = "gps_location")]
    location: Option<RawLocation>,
    #[serde(alias = "lat")]
    latitude: Option<f64>,
    #[serde(alias = "lng", alias = "lon")]
    longitude: Option<f64>,
    address: Option<String>,
    #[serde(alias = "created_at", alias = "timestamp")]
    #[serde(rename = "createdAt")]
    created_at: Option<RawTimestamp>,
}

/// Normalize one raw document stored under `id`.
///
/// Missing coordinates map to the `(0, 0)` sentinel so the record is later
/// treated as invalid rather than failing the whole read. Only documents that
/// are not JSON objects, or whose fields have the wrong types, are errors.
///
/// # Example
/// ```
/// use heatmap_reconciler::normalize_document;
/// use serde_json::json;
///
/// let doc = json!({
///     "confidence_scores": [0.0, 0.0],
///     "location": { "latitude": 22.695, "longitude": 88.3794, "address": "Ward 12" }
/// });
/// let record = normalize_document("det-1", &doc).unwrap();
/// assert!(record.is_cleaned());
/// assert_eq!(record.address, "Ward 12");
/// ```
pub fn normalize_document(id: &str, document: &Value) -> Result<DetectionRecord> {
    document
        .as_object()
        .ok_or_invalid_document(id, "document is not an object")?;

    let raw = RawDetection::deserialize(document).map_err(|e| ReconcileError::InvalidDocument {
        id: id.to_string(),
        message: e.to_string(),
    })?;

    let confidence_scores = match (raw.confidence_scores, raw.confidence_score) {
        (Some(RawConfidence::Many(scores)), _) => scores,
        (Some(RawConfidence::One(score)), _) => vec![score],
        (None, Some(score)) => vec![score],
        (None, None) => Vec::new(),
    };

    let location = raw.location.unwrap_or_default();
    // A half-present fix is no fix at all
    let coordinates = match (
        location.latitude.or(raw.latitude),
        location.longitude.or(raw.longitude),
    ) {
        (Some(latitude), Some(longitude)) => GeoPoint::new(latitude, longitude),
        _ => GeoPoint::new(0.0, 0.0),
    };
    let address = location.address.or(raw.address).unwrap_or_default();
    let accuracy_meters = location.accuracy.as_ref().and_then(parse_accuracy);

    let created_at = raw.created_at.and_then(|ts| parse_timestamp(&ts));

    Ok(DetectionRecord {
        id: id.to_string(),
        coordinates,
        confidence_scores,
        address,
        accuracy_meters,
        created_at,
    })
}

/// Normalize a JSON string, as stored by document-style backends.
pub fn normalize_json(id: &str, json: &str) -> Result<DetectionRecord> {
    let document: Value = serde_json::from_str(json).map_err(|e| ReconcileError::InvalidDocument {
        id: id.to_string(),
        message: e.to_string(),
    })?;
    normalize_document(id, &document)
}

fn parse_accuracy(accuracy: &RawAccuracy) -> Option<f64> {
    let meters = match accuracy {
        RawAccuracy::Meters(meters) => *meters,
        RawAccuracy::Text(text) => {
            let digits: String = text
                .chars()
                .skip_while(|c| !c.is_ascii_digit())
                .take_while(|c| c.is_ascii_digit() || *c == '.')
                .collect();
            digits.parse().ok()?
        }
    };
    (meters.is_finite() && meters >= 0.0).then_some(meters)
}

fn parse_timestamp(ts: &RawTimestamp) -> Option<DateTime<Utc>> {
    match ts {
        RawTimestamp::Text(text) => DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|dt| dt.with_timezone(&Utc)),
        RawTimestamp::UnixSeconds(secs) => Utc.timestamp_opt(*secs, 0).single(),
    }
}
