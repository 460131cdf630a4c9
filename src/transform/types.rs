//! Output types of the transform: readings, station descriptors, data types.

use serde::{Deserialize, Serialize};

/// One accepted time-series reading.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedRecord {
    pub station_code: String,
    pub metric_name: String,
    pub timestamp_millis: i64,
    pub value: i64,
    pub period_seconds: u32,
}

/// Registry entry for one station.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StationDescriptor {
    pub code: String,
    pub name: String,
    pub station_type: String,
    pub latitude: f64,
    pub longitude: f64,
    pub origin: String,
    /// Free-form attributes (capacity, localized names, NeTEx parking info).
    pub metadata: serde_json::Value,
}

/// Description of a metric, synced to the registry together with the stations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DataType {
    pub name: String,
    pub unit: String,
    pub description: String,
    pub rtype: String,
}

/// Everything produced from one batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TransformOutput {
    pub stations: Vec<StationDescriptor>,
    pub records: Vec<NormalizedRecord>,
    /// Stations that produced no reading, for whatever reason.
    pub skipped: usize,
}
