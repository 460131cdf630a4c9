//! Curated station reference table (`stations.csv`).
//!
//! Only stations listed here are forwarded; everything else the pGuide
//! service reports is ignored. The table is loaded once at startup.

use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Deserializer};

use crate::collector::StationId;

/// One row of the reference table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StaticStationMeta {
    pub id: String,
    pub latitude: f64,
    pub longitude: f64,
    /// Preferred display name; empty means "use the name the service reports".
    pub name: String,
    pub name_en: String,
    pub name_it: String,
    pub name_de: String,
    pub standard_name: String,
    pub netex_type: String,
    pub netex_vehicletypes: String,
    pub netex_layout: String,
    #[serde(deserialize_with = "lenient_bool")]
    pub netex_hazard_prohibited: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub netex_charging: bool,
    #[serde(deserialize_with = "lenient_bool")]
    pub netex_surveillance: bool,
    pub netex_reservation: String,
}

/// Reference rows keyed by station code (the stringified station id).
#[derive(Debug, Clone, Default)]
pub struct ReferenceTable {
    stations: HashMap<String, StaticStationMeta>,
}

impl ReferenceTable {
    /// Loads the table from a CSV file with a header row.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path)
            .with_context(|| format!("failed loading metadata from {}", path.display()))?;
        Self::from_reader(file).with_context(|| format!("invalid metadata in {}", path.display()))
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
        let mut stations = HashMap::new();

        for result in rdr.deserialize() {
            let row: StaticStationMeta = result?;
            stations.insert(row.id.clone(), row);
        }

        Ok(Self { stations })
    }

    pub fn get(&self, id: StationId) -> Option<&StaticStationMeta> {
        self.get_code(&id.to_string())
    }

    pub fn get_code(&self, code: &str) -> Option<&StaticStationMeta> {
        self.stations.get(code)
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }
}

/// Accepts the usual spellings of a boolean; an empty cell is `false`.
fn lenient_bool<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    let raw = String::deserialize(deserializer)?;
    match raw.trim() {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Ok(true),
        "" | "0" | "f" | "F" | "false" | "FALSE" | "False" => Ok(false),
        other => Err(serde::de::Error::custom(format!(
            "invalid boolean {other:?}"
        ))),
    }
}
