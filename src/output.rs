//! Sinks for transform results.
//!
//! Readings are appended to a CSV file; station descriptors and data types
//! are written as one JSON sync document.

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{debug, info};

use crate::transform::{DataType, NormalizedRecord, STATION_TYPE, StationDescriptor};
use csv::WriterBuilder;
use std::fs::OpenOptions;

/// Registry payload: all descriptors of one station type plus the data types.
#[derive(Debug, Serialize)]
pub struct SyncDocument<'a> {
    pub station_type: &'a str,
    pub stations: &'a [StationDescriptor],
    pub data_types: &'a [DataType],
}

/// Appends readings as rows to a CSV file.
///
/// Creates the file if needed; the header row is written while the file is
/// still empty.
pub fn append_records(path: &str, records: &[NormalizedRecord]) -> Result<()> {
    let needs_header = std::fs::metadata(path).map_or(true, |m| m.len() == 0);
    debug!(path, needs_header, rows = records.len(), "Appending CSV records");

    let file = OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)
        .with_context(|| format!("cannot open {path}"))?;

    let mut writer = WriterBuilder::new()
        .has_headers(needs_header) // IMPORTANT when appending
        .from_writer(file);

    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;

    Ok(())
}

/// Writes the station sync document as pretty-printed JSON, replacing any
/// previous content.
pub fn write_stations(
    path: &str,
    stations: &[StationDescriptor],
    data_types: &[DataType],
) -> Result<()> {
    let doc = SyncDocument {
        station_type: STATION_TYPE,
        stations,
        data_types,
    };
    let json = serde_json::to_string_pretty(&doc)?;
    std::fs::write(path, json).with_context(|| format!("cannot write {path}"))?;

    info!(path, stations = stations.len(), "Stations synced");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::occupied_data_type;
    use std::env;
    use std::fs;
    use std::path::Path;

    fn temp_path(name: &str) -> String {
        format!("{}/{}", env::temp_dir().display(), name)
    }

    fn record(value: i64) -> NormalizedRecord {
        NormalizedRecord {
            station_code: "103".into(),
            metric_name: "occupied".into(),
            timestamp_millis: 1_700_000_000_000,
            value,
            period_seconds: 300,
        }
    }

    #[test]
    fn test_append_records_writes_header_once() {
        let path = temp_path("famas_parking_test_header.csv");
        let _ = fs::remove_file(&path); // clean up any prior run

        append_records(&path, &[record(15)]).unwrap();
        append_records(&path, &[record(16), record(17)]).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = content.lines().collect();
        assert_eq!(
            lines[0],
            "station_code,metric_name,timestamp_millis,value,period_seconds"
        );
        assert_eq!(lines[1], "103,occupied,1700000000000,15,300");
        // 1 header + 3 data rows
        assert_eq!(lines.len(), 4);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_empty_append_does_not_lose_header() {
        let path = temp_path("famas_parking_test_empty.csv");
        let _ = fs::remove_file(&path);

        append_records(&path, &[]).unwrap();
        assert!(Path::new(&path).exists());

        append_records(&path, &[record(15)]).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("station_code,"));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_write_stations_document() {
        let path = temp_path("famas_parking_test_stations.json");
        let stations = vec![StationDescriptor {
            code: "103".into(),
            name: "Walther".into(),
            station_type: STATION_TYPE.into(),
            latitude: 46.499,
            longitude: 11.352,
            origin: "FAMAS".into(),
            metadata: serde_json::json!({ "capacity": 90 }),
        }];

        write_stations(&path, &stations, &[occupied_data_type()]).unwrap();

        let doc: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["station_type"], "ParkingStation");
        assert_eq!(doc["stations"][0]["code"], "103");
        assert_eq!(doc["stations"][0]["metadata"]["capacity"], 90);
        assert_eq!(doc["data_types"][0]["name"], "occupied");

        fs::remove_file(&path).unwrap();
    }
}
