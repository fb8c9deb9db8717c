//! Test-only helpers: a throwaway git repository and in-memory
//! implementations of the review seams.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::{Arc, Mutex as StdMutex};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;

use crate::core::types::{ChangeCounts, CommitRecord, Proposal};
use crate::review::{HistoryStore, ProposalStore, SandboxOverlay};

/// A temporary git repository with a seed commit and local identity.
pub struct TestRepo {
    temp: tempfile::TempDir,
}

impl TestRepo {
    pub fn new() -> Result<Self> {
        let temp = tempfile::tempdir().context("create tempdir")?;
        run_git(temp.path(), &["init", "-q", "-b", "main"])?;
        run_git(temp.path(), &["config", "user.name", "Test Author"])?;
        run_git(temp.path(), &["config", "user.email", "test@example.com"])?;
        fs::write(temp.path().join("README.md"), "seed\n").context("write seed file")?;
        run_git(temp.path(), &["add", "-A"])?;
        run_git(temp.path(), &["commit", "-q", "-m", "seed"])?;
        Ok(Self { temp })
    }

    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    pub fn write_file(&self, rel: &str, contents: &str) -> Result<()> {
        let path = self.temp.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
        }
        fs::write(&path, contents).with_context(|| format!("write {}", path.display()))
    }

    /// Commit subjects, newest first.
    pub fn log_subjects(&self) -> Result<Vec<String>> {
        let out = run_git(self.temp.path(), &["log", "--format=%s"])?;
        Ok(out.lines().map(str::to_string).collect())
    }
}

/// Run a git command in `dir`, returning trimmed stdout.
pub fn run_git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .with_context(|| format!("spawn git {}", args.join(" ")))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(anyhow!("git {} failed: {}", args.join(" "), stderr.trim()));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Overlay that materializes pending contents into a working tree on
/// accept. Cloning shares the pending set.
#[derive(Clone)]
pub struct MemoryOverlay {
    workdir: PathBuf,
    pending: Arc<StdMutex<BTreeMap<String, String>>>,
}

impl MemoryOverlay {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
            pending: Arc::new(StdMutex::new(BTreeMap::new())),
        }
    }

    /// Queue a proposed file body awaiting acceptance.
    pub fn stage(&self, path: &str, contents: &str) {
        self.pending
            .lock()
            .unwrap()
            .insert(path.to_string(), contents.to_string());
    }

    pub fn pending_paths(&self) -> Vec<String> {
        self.pending.lock().unwrap().keys().cloned().collect()
    }
}

#[async_trait]
impl SandboxOverlay for MemoryOverlay {
    async fn accept_files(&self, files: &[String]) -> Result<()> {
        for file in files {
            let contents = self.pending.lock().unwrap().remove(file);
            let Some(contents) = contents else {
                continue;
            };
            let path = self.workdir.join(file);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create {}", parent.display()))?;
            }
            fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
        }
        Ok(())
    }

    async fn reject_all(&self) -> Result<()> {
        self.pending.lock().unwrap().clear();
        Ok(())
    }
}

/// Proposal registry backed by a map.
#[derive(Clone, Default)]
pub struct MemoryProposalStore {
    proposals: Arc<StdMutex<BTreeMap<String, Proposal>>>,
}

impl MemoryProposalStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, proposal: Proposal) {
        self.proposals
            .lock()
            .unwrap()
            .insert(proposal.proposal_id.clone(), proposal);
    }
}

impl ProposalStore for MemoryProposalStore {
    fn files_for(&self, proposal_id: &str) -> Result<Vec<String>> {
        let proposals = self.proposals.lock().unwrap();
        let proposal = proposals
            .get(proposal_id)
            .ok_or_else(|| anyhow!("unknown proposal {proposal_id}"))?;
        Ok(proposal.file_paths())
    }

    fn counts_for(&self, proposal_id: &str) -> Result<ChangeCounts> {
        let proposals = self.proposals.lock().unwrap();
        let proposal = proposals
            .get(proposal_id)
            .ok_or_else(|| anyhow!("unknown proposal {proposal_id}"))?;
        Ok(proposal.counts())
    }
}

/// History store collecting records in memory. Cloning shares the list.
#[derive(Clone, Default)]
pub struct MemoryHistoryStore {
    records: Arc<StdMutex<Vec<CommitRecord>>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CommitRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn record_commit(&self, record: &CommitRecord) -> Result<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

/// History store that always fails, for exercising finalize ordering.
#[derive(Clone, Default)]
pub struct FailingHistoryStore;

#[async_trait]
impl HistoryStore for FailingHistoryStore {
    async fn record_commit(&self, _record: &CommitRecord) -> Result<()> {
        Err(anyhow!("history store unavailable"))
    }
}
