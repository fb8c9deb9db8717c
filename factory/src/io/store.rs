//! Run directory storage.
//!
//! A run directory is the durable trail of one agent run:
//!
//! - `meta.json`: run/project/task/feature identity plus labels
//! - `events.jsonl`: one [`RunEvent`] per line, append-only
//! - `proposals.json`: proposal snapshots
//! - `commits.json`: commit records appended at finalize time
//!
//! JSON documents are written atomically (temp file + rename); the event
//! log is plain appends so a tailing consumer can follow it.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::core::types::{CommitRecord, Proposal, RunEvent, RunMeta};
use crate::review::HistoryStore;

/// Well-known paths inside a run directory.
#[derive(Debug, Clone)]
pub struct RunPaths {
    pub dir: PathBuf,
    pub meta_path: PathBuf,
    pub events_path: PathBuf,
    pub proposals_path: PathBuf,
    pub commits_path: PathBuf,
}

impl RunPaths {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            meta_path: dir.join("meta.json"),
            events_path: dir.join("events.jsonl"),
            proposals_path: dir.join("proposals.json"),
            commits_path: dir.join("commits.json"),
            dir,
        }
    }
}

/// Create a run directory and write its metadata.
pub fn init_run_dir(dir: &Path, meta: &RunMeta) -> Result<RunPaths> {
    let paths = RunPaths::new(dir);
    fs::create_dir_all(&paths.dir)
        .with_context(|| format!("create run dir {}", paths.dir.display()))?;
    write_meta(&paths, meta)?;
    debug!(dir = %paths.dir.display(), run_id = %meta.run_id, "run directory initialized");
    Ok(paths)
}

pub fn write_meta(paths: &RunPaths, meta: &RunMeta) -> Result<()> {
    write_json_atomic(&paths.meta_path, meta)
}

pub fn read_meta(paths: &RunPaths) -> Result<RunMeta> {
    let contents = fs::read_to_string(&paths.meta_path)
        .with_context(|| format!("read {}", paths.meta_path.display()))?;
    serde_json::from_str(&contents)
        .with_context(|| format!("parse {}", paths.meta_path.display()))
}

/// Append one event to the log.
pub fn append_event(paths: &RunPaths, event: &RunEvent) -> Result<()> {
    let mut line = serde_json::to_string(event).context("serialize event")?;
    line.push('\n');
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&paths.events_path)
        .with_context(|| format!("open {}", paths.events_path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("append {}", paths.events_path.display()))?;
    Ok(())
}

/// Read the full event log in emission order. Missing log means no events.
pub fn read_events(paths: &RunPaths) -> Result<Vec<RunEvent>> {
    if !paths.events_path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(&paths.events_path)
        .with_context(|| format!("read {}", paths.events_path.display()))?;
    let mut events = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event: RunEvent = serde_json::from_str(line)
            .with_context(|| format!("parse event at line {}", index + 1))?;
        events.push(event);
    }
    Ok(events)
}

pub fn write_proposals(paths: &RunPaths, proposals: &[Proposal]) -> Result<()> {
    write_json_atomic(&paths.proposals_path, &proposals)
}

/// Missing file means no proposals.
pub fn read_proposals(paths: &RunPaths) -> Result<Vec<Proposal>> {
    read_json_or_empty(&paths.proposals_path)
}

/// Append a commit record, keeping `commits.json` a single JSON array.
pub fn append_commit(paths: &RunPaths, record: &CommitRecord) -> Result<()> {
    let mut commits = read_commits(paths)?;
    commits.push(record.clone());
    write_json_atomic(&paths.commits_path, &commits)
}

/// Missing file means no commits.
pub fn read_commits(paths: &RunPaths) -> Result<Vec<CommitRecord>> {
    read_json_or_empty(&paths.commits_path)
}

fn read_json_or_empty<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents =
        fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))
}

fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let mut buf = serde_json::to_string_pretty(value).context("serialize json")?;
    buf.push('\n');
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, &buf).with_context(|| format!("write temp {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    Ok(())
}

/// History store backed by a run directory's `commits.json`.
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    paths: RunPaths,
}

impl FileHistoryStore {
    pub fn new(run_dir: impl Into<PathBuf>) -> Self {
        Self {
            paths: RunPaths::new(run_dir),
        }
    }

    pub fn commits(&self) -> Result<Vec<CommitRecord>> {
        read_commits(&self.paths)
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn record_commit(&self, record: &CommitRecord) -> Result<()> {
        append_commit(&self.paths, record)
    }
}
