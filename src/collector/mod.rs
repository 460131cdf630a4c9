//! Station aggregation: one poll cycle against the pGuide service.
//!
//! A cycle lists all stations, then asks for the metadata and the current
//! occupancy of each one, strictly one call at a time and in the order the
//! list came back. A failed per-station call is logged and recorded as
//! [`Value::Void`]; only a failed station list aborts the cycle.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::fetch::HttpClient;
use crate::publish::Publisher;
use crate::xmlrpc::{RpcClient, RpcError, Value};

pub const METHOD_STATION_LIST: &str = "pGuide.getElencoIdentificativiParcheggi";
pub const METHOD_STATION_METADATA: &str = "pGuide.getCaratteristicheParcheggio";
pub const METHOD_OCCUPANCY: &str = "pGuide.getPostiLiberiParcheggioExt";

pub type StationId = i32;

/// What the collector got for one station in one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStationRecord {
    pub id: StationId,
    /// Result of the metadata call, [`Value::Void`] if it failed.
    pub metadata: Value,
    /// Result of the occupancy call, [`Value::Void`] if it failed.
    pub occupancy: Value,
}

/// All records of one cycle, published as a single message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawBatch {
    pub provider: String,
    pub timestamp: DateTime<Utc>,
    pub rawdata: Vec<RawStationRecord>,
}

impl RawBatch {
    pub fn new(provider: impl Into<String>, rawdata: Vec<RawStationRecord>) -> Self {
        Self {
            provider: provider.into(),
            timestamp: Utc::now(),
            rawdata,
        }
    }
}

/// The two per-station calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StationCall {
    Metadata,
    Occupancy,
}

impl StationCall {
    pub fn method(self) -> &'static str {
        match self {
            StationCall::Metadata => METHOD_STATION_METADATA,
            StationCall::Occupancy => METHOD_OCCUPANCY,
        }
    }
}

impl fmt::Display for StationCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationCall::Metadata => f.write_str("metadata"),
            StationCall::Occupancy => f.write_str("occupancy"),
        }
    }
}

/// Drives the list + per-station calls of a poll cycle.
pub struct StationAggregator<C> {
    client: RpcClient<C>,
}

impl<C: HttpClient> StationAggregator<C> {
    pub fn new(client: RpcClient<C>) -> Self {
        Self { client }
    }

    /// Station ids in the order the server returned them.
    ///
    /// Entries that are not integers are logged and dropped.
    pub async fn list_stations(&self) -> Result<Vec<StationId>, RpcError> {
        let list = self.client.call(METHOD_STATION_LIST, vec![]).await?;
        let Value::Array(items) = list else {
            return Err(RpcError::Malformed(format!(
                "station list is a {} instead of an array",
                list.kind()
            )));
        };

        Ok(items
            .iter()
            .filter_map(|item| {
                let id = item.as_int();
                if id.is_none() {
                    warn!(kind = item.kind(), "Ignoring non-integer station id");
                }
                id
            })
            .collect())
    }

    /// Runs the per-station calls for every listed station.
    ///
    /// # Errors
    ///
    /// Only the station list call can fail the whole collection.
    #[tracing::instrument(skip(self), fields(endpoint = %self.client.endpoint()))]
    pub async fn collect(&self) -> Result<Vec<RawStationRecord>, RpcError> {
        let ids = self.list_stations().await?;
        info!(stations = ids.len(), "Station list fetched");

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let metadata = self.fetch_or_void(StationCall::Metadata, id).await;
            let occupancy = self.fetch_or_void(StationCall::Occupancy, id).await;
            records.push(RawStationRecord {
                id,
                metadata,
                occupancy,
            });
        }
        Ok(records)
    }

    /// A fault envelope counts as a failed call: its code and message go to
    /// the log and the batch only sees `Void`. Faults the server embeds in a
    /// successful struct are passed through and rejected by the transform.
    async fn fetch_or_void(&self, call: StationCall, id: StationId) -> Value {
        match self.client.call(call.method(), vec![Value::Int(id)]).await {
            Ok(value) => value,
            Err(e) => {
                error!(station_id = id, call = %call, error = %e, "Error getting station {call}");
                Value::Void
            }
        }
    }
}

/// One complete poll cycle: collect under `cycle_timeout`, then publish.
///
/// If the station list fails or the timeout hits, nothing is published and
/// whatever was collected so far is dropped.
#[tracing::instrument(skip(aggregator, publisher))]
pub async fn run_cycle<C, P>(
    aggregator: &StationAggregator<C>,
    publisher: &P,
    provider: &str,
    cycle_timeout: Duration,
) -> Result<usize>
where
    C: HttpClient,
    P: Publisher + ?Sized,
{
    info!("Job start");

    let records = tokio::time::timeout(cycle_timeout, aggregator.collect())
        .await
        .map_err(|_| {
            anyhow::anyhow!("poll cycle exceeded {cycle_timeout:?}, discarding partial batch")
        })?
        .context("cannot get list of stations. aborting")?;

    let batch = RawBatch::new(provider, records);
    publisher
        .publish(&batch)
        .await
        .context("failed publishing batch")?;

    info!(records_pushed = batch.rawdata.len(), "Job complete");
    Ok(batch.rawdata.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::mock::{Canned, ScriptedClient, fault_xml, success_xml};
    use crate::publish::{MemoryPublisher, decode_batch, encode_batch};
    use async_trait::async_trait;

    /// Transport that never answers within a test's patience.
    struct StalledClient;

    #[async_trait]
    impl HttpClient for StalledClient {
        async fn execute(&self, _req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(reqwest::Response::from(http::Response::new(String::new())))
        }
    }

    struct FailingPublisher;

    #[async_trait]
    impl Publisher for FailingPublisher {
        async fn publish(&self, _batch: &RawBatch) -> Result<()> {
            anyhow::bail!("bucket unreachable")
        }
    }

    fn list_xml(ids: &[i32]) -> Canned {
        let values: String = ids
            .iter()
            .map(|id| format!("<value><int>{id}</int></value>"))
            .collect();
        Canned::Xml(success_xml(&format!("<array><data>{values}</data></array>")))
    }

    fn meta_xml(id: i32, name: &str, capacity: i32) -> Canned {
        Canned::Xml(success_xml(&format!(
            "<array><data><value><i4>{id}</i4></value><value>{name}</value>\
             <value><i4>{capacity}</i4></value></data></array>"
        )))
    }

    fn occupancy_xml(free: i32) -> Canned {
        Canned::Xml(success_xml(&format!(
            "<struct><member><name>PostiLiberi</name><value><i4>{free}</i4></value></member></struct>"
        )))
    }

    fn aggregator(http: ScriptedClient) -> StationAggregator<ScriptedClient> {
        StationAggregator::new(RpcClient::new(http, "http://famas.example/RPC2").unwrap())
    }

    #[tokio::test]
    async fn test_metadata_failure_is_isolated_to_its_station() {
        let http = ScriptedClient::new()
            .on(METHOD_STATION_LIST, list_xml(&[103, 104]))
            .on_id(METHOD_STATION_METADATA, 103, meta_xml(103, "P03", 200))
            .on_id(METHOD_OCCUPANCY, 103, occupancy_xml(12))
            .on_id(METHOD_STATION_METADATA, 104, Canned::Status(500))
            .on_id(METHOD_OCCUPANCY, 104, occupancy_xml(5));

        let records = aggregator(http).collect().await.unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, 103);
        assert!(records[0].metadata.as_array().is_some());
        assert_eq!(records[1].id, 104);
        assert_eq!(records[1].metadata, Value::Void);
        assert_eq!(records[1].occupancy.member("PostiLiberi"), Some(&Value::Int(5)));
    }

    #[tokio::test]
    async fn test_calls_run_sequentially_in_list_order() {
        let http = ScriptedClient::new()
            .on(METHOD_STATION_LIST, list_xml(&[104, 103]))
            .on_id(METHOD_OCCUPANCY, 104, Canned::Xml(fault_xml(0, "unknown")));

        let records = aggregator(http.clone()).collect().await.unwrap();

        // unscripted calls 404 and the fault is recorded as void too
        assert!(records.iter().all(|r| r.metadata.is_void() && r.occupancy.is_void()));
        let calls: Vec<_> = http
            .calls()
            .into_iter()
            .map(|(method, id)| (method, id.unwrap_or(-1)))
            .collect();
        assert_eq!(
            calls,
            vec![
                (METHOD_STATION_LIST.to_string(), -1),
                (METHOD_STATION_METADATA.to_string(), 104),
                (METHOD_OCCUPANCY.to_string(), 104),
                (METHOD_STATION_METADATA.to_string(), 103),
                (METHOD_OCCUPANCY.to_string(), 103),
            ]
        );
    }

    #[tokio::test]
    async fn test_fault_struct_inside_success_is_kept() {
        let embedded = "<struct><member><name>faultCode</name><value><int>3</int></value></member>\
                        </struct>";
        let http = ScriptedClient::new()
            .on(METHOD_STATION_LIST, list_xml(&[103]))
            .on_id(METHOD_OCCUPANCY, 103, Canned::Xml(success_xml(embedded)));

        let records = aggregator(http).collect().await.unwrap();
        assert_eq!(records[0].occupancy.member("faultCode"), Some(&Value::Int(3)));
    }

    #[tokio::test]
    async fn test_non_integer_ids_are_skipped() {
        let http = ScriptedClient::new().on(
            METHOD_STATION_LIST,
            Canned::Xml(success_xml(
                "<array><data><value><int>103</int></value><value>junk</value></data></array>",
            )),
        );
        assert_eq!(aggregator(http).list_stations().await.unwrap(), vec![103]);
    }

    #[tokio::test]
    async fn test_station_list_failure_aborts_without_publishing() {
        let http = ScriptedClient::new().on(METHOD_STATION_LIST, Canned::Status(503));
        let publisher = MemoryPublisher::default();

        let result = run_cycle(
            &aggregator(http),
            &publisher,
            "famas/parking",
            Duration::from_secs(5),
        )
        .await;

        assert!(result.is_err());
        assert!(publisher.batches().is_empty());
    }

    #[tokio::test]
    async fn test_station_list_must_be_an_array() {
        let http = ScriptedClient::new().on(METHOD_STATION_LIST, Canned::Xml(success_xml("<int>1</int>")));
        let err = aggregator(http).collect().await.unwrap_err();
        assert!(matches!(err, RpcError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_cycle_publishes_one_batch() {
        let http = ScriptedClient::new()
            .on(METHOD_STATION_LIST, list_xml(&[103]))
            .on_id(METHOD_STATION_METADATA, 103, meta_xml(103, "P03", 200))
            .on_id(METHOD_OCCUPANCY, 103, occupancy_xml(12));
        let publisher = MemoryPublisher::default();

        let pushed = run_cycle(
            &aggregator(http),
            &publisher,
            "famas/parking",
            Duration::from_secs(5),
        )
        .await
        .unwrap();

        assert_eq!(pushed, 1);
        let batches = publisher.batches();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].provider, "famas/parking");
        assert_eq!(batches[0].rawdata[0].id, 103);
    }

    #[tokio::test]
    async fn test_cycle_timeout_discards_partial_batch() {
        let aggregator =
            StationAggregator::new(RpcClient::new(StalledClient, "http://famas.example/RPC2").unwrap());
        let publisher = MemoryPublisher::default();

        let err = run_cycle(
            &aggregator,
            &publisher,
            "famas/parking",
            Duration::from_millis(20),
        )
        .await
        .unwrap_err();

        assert!(err.to_string().contains("poll cycle exceeded"));
        assert!(publisher.batches().is_empty());
    }

    #[tokio::test]
    async fn test_publish_failure_fails_the_cycle() {
        let http = ScriptedClient::new()
            .on(METHOD_STATION_LIST, list_xml(&[103]))
            .on_id(METHOD_STATION_METADATA, 103, meta_xml(103, "P03", 200))
            .on_id(METHOD_OCCUPANCY, 103, occupancy_xml(12));

        let err = run_cycle(
            &aggregator(http),
            &FailingPublisher,
            "famas/parking",
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

        assert_eq!(err.to_string(), "failed publishing batch");
        assert!(format!("{err:#}").contains("bucket unreachable"));
    }

    #[tokio::test]
    async fn test_nan_in_one_station_keeps_batch_readable() {
        let http = ScriptedClient::new()
            .on(METHOD_STATION_LIST, list_xml(&[103, 104]))
            .on_id(METHOD_STATION_METADATA, 103, meta_xml(103, "P03", 200))
            .on_id(METHOD_OCCUPANCY, 103, occupancy_xml(12))
            .on_id(
                METHOD_STATION_METADATA,
                104,
                Canned::Xml(success_xml(
                    "<array><data><value><i4>104</i4></value><value><double>NaN</double></value>\
                     </data></array>",
                )),
            )
            .on_id(METHOD_OCCUPANCY, 104, occupancy_xml(5));

        let records = aggregator(http).collect().await.unwrap();
        assert_eq!(records[1].metadata, Value::Void);

        let batch = RawBatch::new("famas/parking", records);
        let decoded = decode_batch(&encode_batch(&batch, false).unwrap()).unwrap();
        assert_eq!(decoded.rawdata, batch.rawdata);
    }

    #[test]
    fn test_station_call_names() {
        assert_eq!(StationCall::Metadata.method(), METHOD_STATION_METADATA);
        assert_eq!(StationCall::Occupancy.to_string(), "occupancy");
    }
}
