//! Versioned export of a completed run.

pub mod export;
pub mod types;

pub use export::{ExportOptions, RunInputs, export_run};
pub use types::{ARCHIVE_VERSION, ArchiveStats, FileEncoding, FileEntry, RunArchive, parse_archive, to_json};
