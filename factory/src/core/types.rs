//! Shared data model for the run pipeline.
//!
//! These types define the stable contracts between the event stream, the
//! review lifecycle, and the archive format. They are pure data: no I/O,
//! deterministic serialization (camelCase on the wire, matching the
//! `factory.run-archive.v1` document format).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single record of agent activity during a run.
///
/// The pipeline treats the kind as opaque; by convention the orchestrator
/// emits slash-separated kinds such as `run/start`, `run/usage`,
/// `llm/response`, or `run/error`. Events for a run are strictly ordered by
/// emission time and are never reordered downstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    /// Discriminator, e.g. `run/start`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Free-form payload owned by the emitter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    /// Emission time.
    pub time: DateTime<Utc>,
}

impl RunEvent {
    /// Create an event stamped with the current time.
    pub fn new(kind: impl Into<String>, payload: Option<Value>) -> Self {
        Self {
            kind: kind.into(),
            payload,
            time: Utc::now(),
        }
    }
}

/// How a proposed file change alters the working tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
}

/// One proposed file edit inside a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDiff {
    /// Path relative to the repository root.
    pub path: String,
    pub change: ChangeKind,
    /// Unified diff text, when the agent provided one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<String>,
}

/// Named lifecycle state of a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalState {
    Proposed,
    Accepted,
    Rejected,
    Finalized,
}

/// A `{state, time}` entry in a proposal's state history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateEntry {
    pub state: ProposalState,
    pub time: DateTime<Utc>,
}

/// A bundle of file edits suggested by the agent, pending human review.
///
/// Proposals are append-only: the agent adds diffs and states, the review
/// service appends accept/reject/finalize transitions. A proposal is never
/// deleted, only superseded or finalized.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Proposal {
    pub proposal_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diffs: Vec<FileDiff>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub states: Vec<StateEntry>,
}

impl Proposal {
    /// Create a proposal in the `proposed` state.
    pub fn new(proposal_id: impl Into<String>) -> Self {
        let mut proposal = Self {
            proposal_id: proposal_id.into(),
            summary: None,
            diffs: Vec::new(),
            states: Vec::new(),
        };
        proposal.push_state(ProposalState::Proposed);
        proposal
    }

    /// Append a state transition stamped with the current time.
    pub fn push_state(&mut self, state: ProposalState) {
        self.states.push(StateEntry {
            state,
            time: Utc::now(),
        });
    }

    /// Most recent state, if any transition has been recorded.
    pub fn latest_state(&self) -> Option<ProposalState> {
        self.states.last().map(|entry| entry.state)
    }

    /// File paths touched by this proposal, first-occurrence order, deduplicated.
    pub fn file_paths(&self) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        let mut paths = Vec::new();
        for diff in &self.diffs {
            if seen.insert(diff.path.as_str()) {
                paths.push(diff.path.clone());
            }
        }
        paths
    }

    /// Per-status file counts across the proposal's diffs.
    pub fn counts(&self) -> ChangeCounts {
        let mut counts = ChangeCounts::default();
        for diff in &self.diffs {
            match diff.change {
                ChangeKind::Added => counts.added += 1,
                ChangeKind::Modified => counts.modified += 1,
                ChangeKind::Deleted => counts.deleted += 1,
                ChangeKind::Renamed => counts.renamed += 1,
            }
        }
        counts
    }
}

/// Per-status file counts recorded alongside a commit.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeCounts {
    pub added: usize,
    pub modified: usize,
    pub deleted: usize,
    pub renamed: usize,
}

/// Durable record tying a finalized proposal to its version-control commit.
///
/// Immutable once created; one committed proposal yields exactly one record.
/// `message` is the caller-supplied commit message (absent when the generated
/// default was used).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitRecord {
    pub proposal_id: String,
    pub commit_sha: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<String>,
    #[serde(default)]
    pub counts: ChangeCounts,
    pub created_at: DateTime<Utc>,
}

/// Identity of a run: which project/task/feature the agent was executing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMeta {
    pub run_id: String,
    pub project_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Free-form labels attached by the orchestrator.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
}

impl RunMeta {
    pub fn new(run_id: impl Into<String>, project_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            project_id: project_id.into(),
            task_id: None,
            feature_id: None,
            created_at: Utc::now(),
            labels: BTreeMap::new(),
        }
    }
}
