//! Run event & proposal review pipeline.
//!
//! This crate coordinates the output of an autonomous code-modification
//! agent: it buffers the agent's activity as an ordered event stream with
//! replay for late subscribers, stages proposed file edits for human
//! review, and on acceptance commits and publishes the result through git.
//! A finished run can be folded into a single versioned archive document.
//! The architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (event buffering, data model,
//!   redaction). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (configuration, git execution,
//!   run storage). Isolated to enable mocking in tests.
//!
//! Orchestration modules ([`review`], [`archive`]) coordinate core logic
//! with I/O; [`sync`] provides the cooperative mutex that serializes
//! single-writer command sequences.

pub mod archive;
pub mod core;
pub mod io;
pub mod logging;
pub mod review;
pub mod sync;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
