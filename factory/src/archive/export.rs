//! Folds a finished run into a single archive document.
//!
//! Redaction happens before any size accounting, so the redacted output
//! size is deterministic regardless of the original secret's length. Byte
//! budgets are a truncation signal, not an error: `stats.bytes` reflects
//! only what was actually included.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::Result;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use tracing::{debug, warn};

use crate::archive::types::{ARCHIVE_VERSION, ArchiveStats, FileEncoding, FileEntry, RunArchive};
use crate::core::redact;
use crate::core::types::{CommitRecord, Proposal, RunEvent, RunMeta};

/// Export configuration.
#[derive(Debug, Clone)]
pub struct ExportOptions {
    /// Embed file bodies for the run's touched paths.
    pub include_files: bool,
    /// Base directory for resolving relative file paths.
    pub base_dir: Option<PathBuf>,
    /// Total byte budget across all embedded file bodies.
    pub max_bytes: u64,
    /// Per-file byte budget; larger files are truncated, never corrupted.
    pub max_file_bytes: u64,
    pub pretty: bool,
    /// Scrub secret-shaped values from messages and metadata.
    pub redact_secrets: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            include_files: false,
            base_dir: None,
            max_bytes: 10_000_000,
            max_file_bytes: 1_000_000,
            pretty: false,
            redact_secrets: true,
        }
    }
}

/// Everything the exporter needs about one run.
#[derive(Debug, Clone)]
pub struct RunInputs {
    pub meta: RunMeta,
    pub events: Vec<RunEvent>,
    pub proposals: Vec<Proposal>,
    pub commits: Vec<CommitRecord>,
    /// Candidate paths for file inclusion, relative to the base directory.
    pub file_paths: Vec<String>,
}

impl RunInputs {
    pub fn new(meta: RunMeta) -> Self {
        Self {
            meta,
            events: Vec::new(),
            proposals: Vec::new(),
            commits: Vec::new(),
            file_paths: Vec::new(),
        }
    }
}

/// Assemble a `factory.run-archive.v1` document.
pub async fn export_run(mut inputs: RunInputs, options: &ExportOptions) -> Result<RunArchive> {
    let mut meta = inputs.meta.clone();

    if options.redact_secrets {
        for event in &mut inputs.events {
            redact::redact_event(event);
        }
        for proposal in &mut inputs.proposals {
            if let Some(summary) = &proposal.summary {
                proposal.summary = Some(redact::redact_text(summary));
            }
        }
        for commit in &mut inputs.commits {
            if let Some(message) = &commit.message {
                commit.message = Some(redact::redact_text(message));
            }
        }
        for value in meta.labels.values_mut() {
            *value = redact::redact_text(value);
        }
    }

    let mut files = None;
    let mut included_bytes = 0u64;
    let mut included_files = 0usize;
    if options.include_files {
        let base = options
            .base_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from("."));
        let mut map = BTreeMap::new();
        for path in &inputs.file_paths {
            let full = base.join(path);
            let data = match tokio::fs::read(&full).await {
                Ok(data) => data,
                Err(err) => {
                    warn!(path = %full.display(), error = %err, "skipping unreadable file");
                    continue;
                }
            };
            let entry = encode_file(data, options.max_file_bytes);
            if included_bytes + entry.size > options.max_bytes {
                warn!(
                    path = %path,
                    budget = options.max_bytes,
                    "byte budget exhausted, remaining file bodies omitted"
                );
                break;
            }
            included_bytes += entry.size;
            included_files += 1;
            map.insert(path.clone(), entry);
        }
        files = Some(map);
    }

    let stats = ArchiveStats {
        events: inputs.events.len(),
        files: options.include_files.then_some(included_files),
        bytes: options.include_files.then_some(included_bytes),
    };
    debug!(events = stats.events, files = ?stats.files, bytes = ?stats.bytes, "run exported");

    Ok(RunArchive {
        version: ARCHIVE_VERSION.to_string(),
        meta,
        events: inputs.events,
        proposals: inputs.proposals,
        commits: inputs.commits,
        files,
        stats: Some(stats),
        created_at: Utc::now(),
    })
}

/// Encode a file body, truncating to the per-file budget.
///
/// UTF-8 content stays textual and is cut at a character boundary; anything
/// else is truncated bytewise and base64-encoded. `size` is the raw byte
/// count included.
fn encode_file(data: Vec<u8>, max_file_bytes: u64) -> FileEntry {
    let limit = usize::try_from(max_file_bytes).unwrap_or(usize::MAX);
    match String::from_utf8(data) {
        Ok(mut text) => {
            if text.len() > limit {
                let mut cut = limit;
                while cut > 0 && !text.is_char_boundary(cut) {
                    cut -= 1;
                }
                text.truncate(cut);
            }
            FileEntry {
                encoding: FileEncoding::Utf8,
                size: text.len() as u64,
                content: text,
            }
        }
        Err(err) => {
            let mut data = err.into_bytes();
            if data.len() > limit {
                data.truncate(limit);
            }
            FileEntry {
                encoding: FileEncoding::Base64,
                size: data.len() as u64,
                content: BASE64.encode(&data),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::archive::types::parse_archive;
    use crate::archive::types::to_json;

    use super::*;

    fn inputs_with_events(count: usize) -> RunInputs {
        let mut inputs = RunInputs::new(RunMeta::new("run-1", "proj-1"));
        for i in 0..count {
            inputs.events.push(RunEvent::new(format!("event/{i}"), None));
        }
        inputs
    }

    #[tokio::test]
    async fn stats_track_event_count() {
        let archive = export_run(inputs_with_events(3), &ExportOptions::default())
            .await
            .expect("export");
        let stats = archive.stats.expect("stats");
        assert_eq!(stats.events, 3);
        assert_eq!(stats.events, archive.events.len());
        assert!(archive.files.is_none());
        assert!(stats.files.is_none());
        assert!(stats.bytes.is_none());
    }

    #[tokio::test]
    async fn included_files_are_counted_and_round_trip() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("a.txt"), "hello").expect("write");
        std::fs::write(temp.path().join("b.txt"), "world!").expect("write");

        let mut inputs = inputs_with_events(1);
        inputs.file_paths = vec!["a.txt".to_string(), "b.txt".to_string()];
        let options = ExportOptions {
            include_files: true,
            base_dir: Some(temp.path().to_path_buf()),
            ..ExportOptions::default()
        };

        let archive = export_run(inputs, &options).await.expect("export");
        let stats = archive.stats.expect("stats");
        assert_eq!(stats.files, Some(2));
        assert_eq!(stats.bytes, Some(11));

        let parsed = parse_archive(&to_json(&archive, true).expect("json")).expect("parse");
        let files = parsed.files.expect("files");
        let total: u64 = files.values().map(|f| f.size).sum();
        assert_eq!(parsed.stats.and_then(|s| s.bytes), Some(total));
    }

    #[tokio::test]
    async fn oversized_file_is_truncated_not_counted_whole() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("big.txt"), "x".repeat(5000)).expect("write");

        let mut inputs = inputs_with_events(0);
        inputs.file_paths = vec!["big.txt".to_string()];
        let options = ExportOptions {
            include_files: true,
            base_dir: Some(temp.path().to_path_buf()),
            max_file_bytes: 1024,
            ..ExportOptions::default()
        };

        let archive = export_run(inputs, &options).await.expect("export");
        let files = archive.files.expect("files");
        let entry = files.get("big.txt").expect("entry");
        assert!(entry.size <= 1024);
        assert_eq!(archive.stats.and_then(|s| s.bytes), Some(entry.size));
    }

    #[tokio::test]
    async fn byte_budget_stops_further_inclusion() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("a.txt"), "a".repeat(600)).expect("write");
        std::fs::write(temp.path().join("b.txt"), "b".repeat(600)).expect("write");

        let mut inputs = inputs_with_events(0);
        inputs.file_paths = vec!["a.txt".to_string(), "b.txt".to_string()];
        let options = ExportOptions {
            include_files: true,
            base_dir: Some(temp.path().to_path_buf()),
            max_bytes: 1000,
            ..ExportOptions::default()
        };

        let archive = export_run(inputs, &options).await.expect("export");
        let stats = archive.stats.expect("stats");
        assert_eq!(stats.files, Some(1));
        assert_eq!(stats.bytes, Some(600));
    }

    #[tokio::test]
    async fn binary_files_are_base64_encoded() {
        let temp = tempfile::tempdir().expect("tempdir");
        std::fs::write(temp.path().join("bin"), [0u8, 159, 146, 150]).expect("write");

        let mut inputs = inputs_with_events(0);
        inputs.file_paths = vec!["bin".to_string()];
        let options = ExportOptions {
            include_files: true,
            base_dir: Some(temp.path().to_path_buf()),
            ..ExportOptions::default()
        };

        let archive = export_run(inputs, &options).await.expect("export");
        let files = archive.files.expect("files");
        let entry = files.get("bin").expect("entry");
        assert_eq!(entry.encoding, FileEncoding::Base64);
        assert_eq!(entry.size, 4);
    }

    #[tokio::test]
    async fn unreadable_files_are_skipped() {
        let temp = tempfile::tempdir().expect("tempdir");
        let mut inputs = inputs_with_events(0);
        inputs.file_paths = vec!["missing.txt".to_string()];
        let options = ExportOptions {
            include_files: true,
            base_dir: Some(temp.path().to_path_buf()),
            ..ExportOptions::default()
        };

        let archive = export_run(inputs, &options).await.expect("export");
        assert_eq!(archive.stats.and_then(|s| s.files), Some(0));
    }

    #[tokio::test]
    async fn redaction_runs_before_size_accounting() {
        let mut inputs = inputs_with_events(0);
        inputs.events.push(RunEvent::new(
            "llm/request",
            Some(json!({"apiKey": "k".repeat(500)})),
        ));
        let short_secret = export_run(inputs.clone(), &ExportOptions::default())
            .await
            .expect("export");

        let mut inputs_long = inputs_with_events(0);
        inputs_long.events.push(RunEvent::new(
            "llm/request",
            Some(json!({"apiKey": "k".repeat(5000)})),
        ));
        let long_secret = export_run(inputs_long, &ExportOptions::default())
            .await
            .expect("export");

        assert_eq!(
            short_secret.events[0].payload, long_secret.events[0].payload,
            "redacted payload must not depend on secret length"
        );
    }

    #[tokio::test]
    async fn redaction_can_be_disabled() {
        let mut inputs = inputs_with_events(0);
        inputs.events.push(RunEvent::new(
            "llm/request",
            Some(json!({"apiKey": "keep-me"})),
        ));
        let options = ExportOptions {
            redact_secrets: false,
            ..ExportOptions::default()
        };
        let archive = export_run(inputs, &options).await.expect("export");
        assert_eq!(
            archive.events[0].payload.as_ref().and_then(|p| p.get("apiKey")),
            Some(&json!("keep-me"))
        );
    }
}
