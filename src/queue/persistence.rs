//! Queue snapshots for moving a queue between session representations
//!
//! A snapshot is the unresolved insert tracker followed by the nine category
//! containers in execution order. A container that was never instantiated is
//! written as `None`, so a restored queue can tell "never used" from "empty
//! after clear". The binary (bincode) form is the primary byte stream; JSON
//! and gzip-compressed JSON exist for debugging and transport.

use std::collections::BTreeSet;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::unresolved::UnresolvedInserts;
use crate::config::SNAPSHOT_FORMAT_VERSION;
use crate::{QueueError, QueueResult};

/// Encoding of a snapshot byte stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SnapshotFormat {
    /// Compact bincode stream
    #[default]
    Binary,
    /// Human-readable JSON
    Json,
    /// Gzip-compressed JSON
    CompressedJson,
}

/// Metadata for queue snapshots
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    /// RFC 3339 timestamp of capture
    pub captured_at: String,
    /// Session the queue belonged to
    pub source_session: String,
    /// Actions held by the containers and the tracker at capture time
    pub pending_actions: usize,
}

impl SnapshotMetadata {
    pub fn capture(source_session: &str, pending_actions: usize) -> Self {
        Self {
            captured_at: chrono::Utc::now().to_rfc3339(),
            source_session: source_session.to_string(),
            pending_actions,
        }
    }
}

/// Persisted state of one category container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerSnapshot<A> {
    pub sorted: bool,
    /// Cached space union; `None` when it was never materialized
    pub spaces: Option<BTreeSet<String>>,
    pub actions: Vec<A>,
}

/// Decoded queue snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueSnapshot<A> {
    /// Format version, always first in the stream
    pub version: u32,
    pub metadata: SnapshotMetadata,
    pub unresolved: UnresolvedInserts<A>,
    /// One entry per category, in execution order
    pub categories: Vec<Option<ContainerSnapshot<A>>>,
}

/// Borrowed view of a container; encodes exactly like [`ContainerSnapshot`]
#[derive(Debug, Serialize)]
pub struct ContainerView<'a, A> {
    pub sorted: bool,
    pub spaces: Option<&'a BTreeSet<String>>,
    pub actions: &'a [A],
}

/// Borrowed view of a live queue; encodes exactly like [`QueueSnapshot`]
#[derive(Debug, Serialize)]
pub struct SnapshotView<'a, A> {
    pub version: u32,
    pub metadata: SnapshotMetadata,
    pub unresolved: &'a UnresolvedInserts<A>,
    pub categories: Vec<Option<ContainerView<'a, A>>>,
}

impl<A: Serialize> SnapshotView<'_, A> {
    pub fn encode(&self, format: SnapshotFormat) -> QueueResult<Vec<u8>> {
        match format {
            SnapshotFormat::Binary => Ok(bincode::serialize(self)?),
            SnapshotFormat::Json => Ok(serde_json::to_vec(self)?),
            SnapshotFormat::CompressedJson => compress(&serde_json::to_vec(self)?),
        }
    }
}

impl<A: DeserializeOwned> QueueSnapshot<A> {
    pub fn decode(format: SnapshotFormat, data: &[u8]) -> QueueResult<Self> {
        match format {
            SnapshotFormat::Binary => Self::from_binary(data),
            SnapshotFormat::Json => Self::from_json(data),
            SnapshotFormat::CompressedJson => Self::from_compressed_json(data),
        }
    }

    /// Decode the bincode form
    pub fn from_binary(data: &[u8]) -> QueueResult<Self> {
        let version: u32 = bincode::deserialize(data)?;
        check_version(version)?;
        Ok(bincode::deserialize(data)?)
    }

    /// Decode the JSON form
    pub fn from_json(data: &[u8]) -> QueueResult<Self> {
        let value: serde_json::Value = serde_json::from_slice(data)?;
        let version = value
            .get("version")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| QueueError::SerializationError {
                message: "snapshot has no version field".to_string(),
            })?;
        check_version(u32::try_from(version).unwrap_or(u32::MAX))?;
        Ok(serde_json::from_value(value)?)
    }

    /// Decode the gzip-compressed JSON form
    pub fn from_compressed_json(data: &[u8]) -> QueueResult<Self> {
        use flate2::read::GzDecoder;
        use std::io::Read;

        let mut decoder = GzDecoder::new(data);
        let mut json = Vec::new();
        decoder.read_to_end(&mut json)?;
        Self::from_json(&json)
    }
}

impl<A: Serialize> QueueSnapshot<A> {
    pub fn to_binary(&self) -> QueueResult<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn to_json(&self) -> QueueResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn to_compressed_json(&self) -> QueueResult<Vec<u8>> {
        compress(&serde_json::to_vec(self)?)
    }
}

fn check_version(found: u32) -> QueueResult<()> {
    if found != SNAPSHOT_FORMAT_VERSION {
        return Err(QueueError::UnsupportedSnapshotVersion {
            found,
            supported: SNAPSHOT_FORMAT_VERSION,
        });
    }
    Ok(())
}

fn compress(json: &[u8]) -> QueueResult<Vec<u8>> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(json)?;
    Ok(encoder.finish()?)
}
