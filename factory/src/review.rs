//! Proposal review lifecycle: accept/reject against the sandbox overlay,
//! then finalize into a commit plus a history record.
//!
//! The overlay and the history store are external collaborators behind
//! trait seams; the service only transitions and consumes proposals, it
//! never creates them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, instrument};

use crate::core::types::{ChangeCounts, CommitRecord};
use crate::io::git::GitManager;
use crate::sync::Mutex;

/// The sandboxed working copy where proposed edits are materialized before
/// committing.
#[async_trait]
pub trait SandboxOverlay: Send + Sync {
    /// Materialize exactly the given paths into the working tree.
    async fn accept_files(&self, files: &[String]) -> Result<()>;

    /// Discard every pending change, independent of which proposal it
    /// logically belongs to (single active overlay).
    async fn reject_all(&self) -> Result<()>;
}

/// Durable record keeper for finalized proposals.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn record_commit(&self, record: &CommitRecord) -> Result<()>;
}

/// Read access to the per-proposal file diffs tracked by the change
/// manager.
pub trait ProposalStore: Send + Sync {
    /// File paths currently associated with the proposal.
    fn files_for(&self, proposal_id: &str) -> Result<Vec<String>>;

    /// Per-status file counts for the proposal.
    fn counts_for(&self, proposal_id: &str) -> Result<ChangeCounts>;
}

/// Mediates between a proposal's tracked diffs and the physical sandbox,
/// then finalizes into a version-control commit and a history record.
pub struct ReviewService<O, P, H> {
    overlay: O,
    proposals: P,
    history: H,
    git: GitManager,
    /// Serializes finalize sequences: apply, commit, and record must not
    /// interleave with another finalize on the same working directory.
    finalize_lock: Mutex,
}

impl<O, P, H> ReviewService<O, P, H>
where
    O: SandboxOverlay,
    P: ProposalStore,
    H: HistoryStore,
{
    pub fn new(overlay: O, proposals: P, history: H, git: GitManager) -> Self {
        Self {
            overlay,
            proposals,
            history,
            git,
            finalize_lock: Mutex::new(),
        }
    }

    pub fn git(&self) -> &GitManager {
        &self.git
    }

    pub fn git_mut(&mut self) -> &mut GitManager {
        &mut self.git
    }

    /// Accept every file currently associated with the proposal.
    #[instrument(skip_all, fields(proposal_id))]
    pub async fn accept_all(&self, proposal_id: &str) -> Result<()> {
        let files = self.proposals.files_for(proposal_id)?;
        self.overlay
            .accept_files(&files)
            .await
            .with_context(|| format!("accept proposal {proposal_id}"))
    }

    /// Accept a caller-chosen subset; it need not be the full proposal.
    #[instrument(skip_all, fields(proposal_id))]
    pub async fn accept_files(&self, proposal_id: &str, files: &[String]) -> Result<()> {
        self.overlay
            .accept_files(files)
            .await
            .with_context(|| format!("accept files for proposal {proposal_id}"))
    }

    /// Discard all pending overlay changes.
    #[instrument(skip_all, fields(proposal_id))]
    pub async fn reject_all(&self, proposal_id: &str) -> Result<()> {
        self.overlay
            .reject_all()
            .await
            .with_context(|| format!("reject proposal {proposal_id}"))
    }

    /// Intentionally a no-op toward the overlay: partial rejection is
    /// expressed by not accepting those files. Unaccepted files never reach
    /// the working tree, so there is nothing to discard.
    pub async fn reject_files(&self, _proposal_id: &str, _files: &[String]) -> Result<()> {
        Ok(())
    }

    /// Apply the proposal to the active branch, commit, and record history.
    ///
    /// The sequence is strictly apply, then commit, then record: a failure
    /// at any step stops the chain, so a history entry is only ever written
    /// for a commit that exists. Finalizing an already-committed proposal
    /// fails (nothing staged) rather than duplicating a record. Returns the
    /// commit SHA.
    #[instrument(skip_all, fields(proposal_id))]
    pub async fn finalize(&self, proposal_id: &str, message: Option<&str>) -> Result<String> {
        self.finalize_lock.lock().await;
        let result = self.finalize_locked(proposal_id, message).await;
        self.finalize_lock
            .unlock()
            .context("release finalize lock")?;
        result
    }

    async fn finalize_locked(&self, proposal_id: &str, message: Option<&str>) -> Result<String> {
        let files = self.proposals.files_for(proposal_id)?;
        let counts = self.proposals.counts_for(proposal_id)?;

        self.overlay
            .accept_files(&files)
            .await
            .with_context(|| format!("apply proposal {proposal_id}"))?;

        self.git
            .stage_all()
            .await
            .with_context(|| format!("stage proposal {proposal_id}"))?;
        let commit_message = message
            .map(str::to_string)
            .unwrap_or_else(|| format!("Accept proposal {proposal_id}"));
        let sha = self
            .git
            .commit(&commit_message)
            .await
            .with_context(|| format!("commit proposal {proposal_id}"))?;

        let record = CommitRecord {
            proposal_id: proposal_id.to_string(),
            commit_sha: sha.clone(),
            message: message.map(str::to_string),
            files,
            counts,
            created_at: Utc::now(),
        };
        self.history
            .record_commit(&record)
            .await
            .with_context(|| format!("record commit {sha} for proposal {proposal_id}"))?;

        debug!(sha = %sha, "proposal finalized");
        Ok(sha)
    }
}
