//! Turns collected raw batches into station descriptors and occupancy readings.
//!
//! Per station the rules are:
//! - metadata must be a non-empty array, else skip;
//! - stations missing from the [`ReferenceTable`] are dropped silently;
//! - the descriptor is emitted as soon as metadata is usable, even when no
//!   reading comes out of the occupancy data;
//! - a reading is emitted only when the occupancy struct carries no fault,
//!   all four alarm flags are false and the free slot count is not negative.

pub mod reference;
pub mod types;

use serde_json::json;
use tracing::{debug, info, warn};

use crate::collector::RawStationRecord;
use crate::xmlrpc::{Value, members_by_name};

pub use reference::{ReferenceTable, StaticStationMeta};
pub use types::{DataType, NormalizedRecord, StationDescriptor, TransformOutput};

pub const STATION_TYPE: &str = "ParkingStation";
pub const OCCUPIED_METRIC: &str = "occupied";
pub const PERIOD_SECONDS: u32 = 300;
pub const MUNICIPALITY: &str = "Bolzano - Bozen";

// The metadata call answers with a bare positional array
// `[id, name, capacity, ...]`. Only these two slots are relied upon.

/// Position of the station name in the metadata array.
pub const META_NAME_INDEX: usize = 1;
/// Position of the total capacity in the metadata array.
pub const META_CAPACITY_INDEX: usize = 2;

/// Occupancy flags that must all be false for a reading to count.
pub const ALARM_FLAGS: [&str; 4] = [
    "StatoComunicazione",
    "AllarmePostiTotali",
    "AllarmeInattivita",
    "AllarmePostiOccupati",
];
pub const FREE_SLOTS: &str = "PostiLiberi";
pub const FREE_SLOTS_TIMESTAMP: &str = "PostiLiberiTs";

/// Why a station produced no descriptor or no reading.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ValidationError {
    #[error("metadata is not a populated array (got {0})")]
    InvalidMetadata(&'static str),

    #[error("no display name in reference table nor in metadata")]
    MissingName,

    #[error("metadata carries no integer capacity")]
    MissingCapacity,

    #[error("negative capacity {0}")]
    InvalidCapacity(i32),

    #[error("occupancy is not a struct (got {0})")]
    InvalidOccupancy(&'static str),

    #[error("raw data carries fault {code}: {message}")]
    EmbeddedFault { code: i32, message: String },

    #[error("alarm flag {0} is set")]
    AlarmRaised(&'static str),

    #[error("field {0} is missing or not of the expected type")]
    MissingField(&'static str),

    #[error("negative free slot count {0}")]
    NegativeFreeSlots(i32),
}

/// The single metric this transformer produces.
pub fn occupied_data_type() -> DataType {
    DataType {
        name: OCCUPIED_METRIC.to_string(),
        unit: String::new(),
        description: "Occupancy of a parking area".to_string(),
        rtype: "Count".to_string(),
    }
}

/// Applies the reference table and business rules to raw batches.
pub struct Transformer<'a> {
    reference: &'a ReferenceTable,
    origin: String,
}

impl<'a> Transformer<'a> {
    pub fn new(reference: &'a ReferenceTable, origin: impl Into<String>) -> Self {
        Self {
            reference,
            origin: origin.into(),
        }
    }

    /// Transforms all records of a batch. Bad stations are logged and skipped.
    #[tracing::instrument(skip_all, fields(records = records.len()))]
    pub fn transform(&self, records: &[RawStationRecord]) -> TransformOutput {
        let mut out = TransformOutput::default();

        for raw in records {
            let (descriptor, capacity) = match self.describe(raw) {
                Ok(Some(found)) => found,
                Ok(None) => {
                    debug!(station_id = raw.id, "Station not in reference table, ignoring");
                    out.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(station_id = raw.id, error = %e, "Skipping station because of invalid metadata");
                    out.skipped += 1;
                    continue;
                }
            };

            let code = descriptor.code.clone();
            out.stations.push(descriptor);

            match occupancy_reading(&code, capacity, &raw.occupancy) {
                Ok(record) => out.records.push(record),
                Err(
                    e @ (ValidationError::AlarmRaised(_) | ValidationError::NegativeFreeSlots(_)),
                ) => {
                    info!(station_id = raw.id, reason = %e, "No valid reading for station");
                    out.skipped += 1;
                }
                Err(e) => {
                    warn!(station_id = raw.id, error = %e, "Skipping station because of invalid record data");
                    out.skipped += 1;
                }
            }
        }

        info!(
            stations = out.stations.len(),
            readings = out.records.len(),
            skipped = out.skipped,
            "Batch transformed"
        );
        out
    }

    /// Builds the station descriptor and returns it with the capacity.
    ///
    /// `Ok(None)` means the station is not in the reference table.
    pub fn describe(
        &self,
        raw: &RawStationRecord,
    ) -> Result<Option<(StationDescriptor, i32)>, ValidationError> {
        let items = match &raw.metadata {
            Value::Array(items) if !items.is_empty() => items,
            other => return Err(ValidationError::InvalidMetadata(other.kind())),
        };

        let code = raw.id.to_string();
        let Some(meta) = self.reference.get_code(&code) else {
            return Ok(None);
        };

        let name = if meta.name.is_empty() {
            items
                .get(META_NAME_INDEX)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or(ValidationError::MissingName)?
        } else {
            meta.name.clone()
        };

        let capacity = items
            .get(META_CAPACITY_INDEX)
            .and_then(Value::as_int)
            .ok_or(ValidationError::MissingCapacity)?;
        if capacity < 0 {
            return Err(ValidationError::InvalidCapacity(capacity));
        }

        let descriptor = StationDescriptor {
            code,
            name,
            station_type: STATION_TYPE.to_string(),
            latitude: meta.latitude,
            longitude: meta.longitude,
            origin: self.origin.clone(),
            metadata: station_metadata(meta, capacity),
        };
        Ok(Some((descriptor, capacity)))
    }
}

fn station_metadata(meta: &StaticStationMeta, capacity: i32) -> serde_json::Value {
    json!({
        "capacity": capacity,
        "municipality": MUNICIPALITY,
        "name_de": meta.name_de,
        "name_en": meta.name_en,
        "name_it": meta.name_it,
        "standard_name": meta.standard_name,
        "netex_parking": {
            "type": meta.netex_type,
            "layout": meta.netex_layout,
            "charging": meta.netex_charging,
            "reservation": meta.netex_reservation,
            "surveillance": meta.netex_surveillance,
            "vehicletypes": meta.netex_vehicletypes,
            "hazard_prohibited": meta.netex_hazard_prohibited,
        },
    })
}

/// Reads one occupancy struct into a reading.
///
/// The occupied count is `capacity - free`, clamped to `0..=capacity`.
/// A negative free count is a known upstream glitch and is rejected rather
/// than clamped.
pub fn occupancy_reading(
    station_code: &str,
    capacity: i32,
    occupancy: &Value,
) -> Result<NormalizedRecord, ValidationError> {
    let Value::Struct(members) = occupancy else {
        return Err(ValidationError::InvalidOccupancy(occupancy.kind()));
    };
    let state = members_by_name(members);

    if let Some(code) = state.get("faultCode") {
        return Err(ValidationError::EmbeddedFault {
            code: code.as_int().unwrap_or_default(),
            message: state
                .get("faultString")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
        });
    }

    for flag in ALARM_FLAGS {
        match state.get(flag).and_then(|v| v.as_bool()) {
            Some(false) => {}
            Some(true) => return Err(ValidationError::AlarmRaised(flag)),
            None => return Err(ValidationError::MissingField(flag)),
        }
    }

    let free = state
        .get(FREE_SLOTS)
        .and_then(|v| v.as_int())
        .ok_or(ValidationError::MissingField(FREE_SLOTS))?;
    if free < 0 {
        return Err(ValidationError::NegativeFreeSlots(free));
    }

    let timestamp = state
        .get(FREE_SLOTS_TIMESTAMP)
        .and_then(|v| v.as_int())
        .ok_or(ValidationError::MissingField(FREE_SLOTS_TIMESTAMP))?;

    let capacity = i64::from(capacity);
    let occupied = (capacity - i64::from(free)).clamp(0, capacity);

    Ok(NormalizedRecord {
        station_code: station_code.to_string(),
        metric_name: OCCUPIED_METRIC.to_string(),
        timestamp_millis: i64::from(timestamp) * 1000,
        value: occupied,
        period_seconds: PERIOD_SECONDS,
    })
}
