//! The versioned run-archive document.
//!
//! An archive is a self-contained, replayable export of a completed run:
//! metadata, the full ordered event list, proposal snapshots, commit
//! records, and (optionally) embedded file bodies. Consumers must check the
//! version tag before parsing and reject unknown versions rather than
//! guessing a schema.

use std::collections::BTreeMap;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::types::{CommitRecord, Proposal, RunEvent, RunMeta};

/// Version tag of the archive format this crate writes.
pub const ARCHIVE_VERSION: &str = "factory.run-archive.v1";

/// How a file body is encoded in the archive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileEncoding {
    Utf8,
    Base64,
}

/// An embedded file body.
///
/// `size` is the number of raw bytes actually included (post-truncation),
/// not the encoded length and not the on-disk size.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub encoding: FileEncoding,
    pub content: String,
    pub size: u64,
}

/// Aggregate accounting over what the archive actually contains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveStats {
    pub events: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
}

/// A `factory.run-archive.v1` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunArchive {
    pub version: String,
    pub meta: RunMeta,
    pub events: Vec<RunEvent>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub proposals: Vec<Proposal>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub commits: Vec<CommitRecord>,
    /// Omitted entirely when export options disable file inclusion.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub files: Option<BTreeMap<String, FileEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<ArchiveStats>,
    pub created_at: DateTime<Utc>,
}

/// Serialize an archive to JSON.
pub fn to_json(archive: &RunArchive, pretty: bool) -> Result<String> {
    let mut raw = if pretty {
        serde_json::to_string_pretty(archive).context("serialize archive")?
    } else {
        serde_json::to_string(archive).context("serialize archive")?
    };
    raw.push('\n');
    Ok(raw)
}

/// Parse an archive document, checking the version tag first.
pub fn parse_archive(raw: &str) -> Result<RunArchive> {
    let value: Value = serde_json::from_str(raw).context("parse archive json")?;
    let Some(version) = value.get("version").and_then(Value::as_str) else {
        bail!("archive is missing a version tag");
    };
    if version != ARCHIVE_VERSION {
        bail!("unsupported archive version {version:?} (expected {ARCHIVE_VERSION:?})");
    }
    serde_json::from_value(value).context("parse archive document")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_archive() -> RunArchive {
        RunArchive {
            version: ARCHIVE_VERSION.to_string(),
            meta: RunMeta::new("run-1", "proj-1"),
            events: vec![RunEvent::new("run/start", None)],
            proposals: Vec::new(),
            commits: Vec::new(),
            files: None,
            stats: Some(ArchiveStats {
                events: 1,
                files: None,
                bytes: None,
            }),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn archive_round_trips() {
        let archive = minimal_archive();
        let raw = to_json(&archive, true).expect("serialize");
        let parsed = parse_archive(&raw).expect("parse");
        assert_eq!(parsed, archive);
        assert_eq!(
            parsed.stats.map(|s| s.events),
            Some(parsed.events.len())
        );
    }

    #[test]
    fn unknown_version_is_rejected() {
        let mut archive = minimal_archive();
        archive.version = "factory.run-archive.v2".to_string();
        let raw = to_json(&archive, false).expect("serialize");
        let err = parse_archive(&raw).expect_err("must reject");
        assert!(err.to_string().contains("unsupported archive version"));
    }

    #[test]
    fn missing_version_is_rejected() {
        let err = parse_archive("{\"meta\": {}}").expect_err("must reject");
        assert!(err.to_string().contains("missing a version tag"));
    }

    #[test]
    fn wire_format_uses_camel_case() {
        let raw = to_json(&minimal_archive(), false).expect("serialize");
        assert!(raw.contains("\"runId\""));
        assert!(raw.contains("\"createdAt\""));
        assert!(raw.contains("\"version\":\"factory.run-archive.v1\""));
    }
}
