//! Handing a collected batch over to the transformer.
//!
//! A batch is serialized as one JSON document (optionally gzip-compressed)
//! and dropped either into a local spool directory or into an S3 bucket.
//! [`read_batch`] is the receiving side.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tracing::{debug, info};

use crate::collector::RawBatch;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Destination for collected batches.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, batch: &RawBatch) -> Result<()>;
}

/// Serializes a batch to JSON, gzip-compressed if `gzip` is set.
pub fn encode_batch(batch: &RawBatch, gzip: bool) -> Result<Vec<u8>> {
    let json = serde_json::to_vec(batch)?;
    if !gzip {
        return Ok(json);
    }
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&json)?;
    Ok(encoder.finish()?)
}

/// Parses a batch written by [`encode_batch`]. Compression is detected from
/// the content, not the file name.
pub fn decode_batch(bytes: &[u8]) -> Result<RawBatch> {
    if bytes.starts_with(&GZIP_MAGIC) {
        let mut json = Vec::new();
        GzDecoder::new(bytes)
            .read_to_end(&mut json)
            .context("failed to gunzip batch")?;
        return Ok(serde_json::from_slice(&json)?);
    }
    Ok(serde_json::from_slice(bytes)?)
}

/// Reads a published batch from disk.
pub fn read_batch(path: impl AsRef<Path>) -> Result<RawBatch> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).with_context(|| format!("cannot read batch {}", path.display()))?;
    decode_batch(&bytes).with_context(|| format!("cannot decode batch {}", path.display()))
}

/// Object / file name for a batch, e.g. `famas-20231114T221320.123Z.json.gz`.
pub fn batch_file_name(batch: &RawBatch, gzip: bool) -> String {
    format!(
        "famas-{}.json{}",
        batch.timestamp.format("%Y%m%dT%H%M%S%.3fZ"),
        if gzip { ".gz" } else { "" }
    )
}

/// Writes each batch as a file into a local directory.
pub struct SpoolPublisher {
    dir: PathBuf,
    gzip: bool,
}

impl SpoolPublisher {
    pub fn new(dir: impl Into<PathBuf>, gzip: bool) -> Self {
        Self {
            dir: dir.into(),
            gzip,
        }
    }
}

#[async_trait]
impl Publisher for SpoolPublisher {
    async fn publish(&self, batch: &RawBatch) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("cannot create spool dir {}", self.dir.display()))?;

        let path = self.dir.join(batch_file_name(batch, self.gzip));
        let partial = path.with_extension("partial");
        std::fs::write(&partial, encode_batch(batch, self.gzip)?)?;
        // rename so a reader never sees a half-written batch
        std::fs::rename(&partial, &path)?;

        info!(path = %path.display(), records = batch.rawdata.len(), "Batch spooled");
        Ok(())
    }
}

/// Uploads each batch as an object to an S3 bucket.
pub struct S3Publisher {
    client: aws_sdk_s3::Client,
    bucket: String,
    prefix: String,
    gzip: bool,
}

impl S3Publisher {
    pub fn new(client: aws_sdk_s3::Client, bucket: String, prefix: String, gzip: bool) -> Self {
        Self {
            client,
            bucket,
            prefix,
            gzip,
        }
    }

    fn key(&self, batch: &RawBatch) -> String {
        let prefix = self.prefix.trim_end_matches('/');
        let name = batch_file_name(batch, self.gzip);
        if prefix.is_empty() {
            name
        } else {
            format!("{prefix}/{name}")
        }
    }
}

#[async_trait]
impl Publisher for S3Publisher {
    async fn publish(&self, batch: &RawBatch) -> Result<()> {
        let key = self.key(batch);
        let body = encode_batch(batch, self.gzip)?;
        debug!(bucket = %self.bucket, key = %key, bytes = body.len(), "Uploading batch");

        let mut put = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(&key)
            .content_type("application/json")
            .body(ByteStream::from(body));
        if self.gzip {
            put = put.content_encoding("gzip");
        }
        put.send().await?;

        info!(bucket = %self.bucket, key = %key, records = batch.rawdata.len(), "Batch uploaded");
        Ok(())
    }
}

/// Keeps published batches in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    batches: Arc<Mutex<Vec<RawBatch>>>,
}

impl MemoryPublisher {
    pub fn batches(&self) -> Vec<RawBatch> {
        self.batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl Publisher for MemoryPublisher {
    async fn publish(&self, batch: &RawBatch) -> Result<()> {
        self.batches
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(batch.clone());
        Ok(())
    }
}
