//! Pipeline CLI: fold run directories into archives and inspect them.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use factory::archive::{self, ExportOptions, RunInputs};
use factory::io::config::load_config;
use factory::io::store::{self, RunPaths};
use factory::logging;

#[derive(Parser)]
#[command(
    name = "factory",
    version,
    about = "Run event and proposal review pipeline"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fold a run directory into a single versioned archive document.
    Export {
        /// Run directory (meta.json, events.jsonl, proposals.json, commits.json).
        run_dir: PathBuf,

        /// Output path for the archive document.
        #[arg(short, long, default_value = "archive.json")]
        output: PathBuf,

        /// Embed file bodies for the run's touched paths.
        #[arg(long)]
        include_files: bool,

        /// Base directory for resolving file paths (defaults to the run
        /// directory's parent).
        #[arg(long)]
        base_dir: Option<PathBuf>,

        /// Extra file paths to embed, relative to the base directory.
        #[arg(long = "file")]
        files: Vec<String>,

        /// Total byte budget for embedded file bodies.
        #[arg(long)]
        max_bytes: Option<u64>,

        /// Per-file byte budget; larger files are truncated.
        #[arg(long)]
        max_file_bytes: Option<u64>,

        /// Pretty-print the archive JSON.
        #[arg(long)]
        pretty: bool,

        /// Keep secret-shaped values instead of scrubbing them.
        #[arg(long)]
        no_redact: bool,
    },
    /// Validate an archive document's version tag and print a summary.
    Inspect {
        /// Archive file produced by `export`.
        archive: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    logging::init();
    if let Err(err) = run().await {
        eprintln!("{:#}", err);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Export {
            run_dir,
            output,
            include_files,
            base_dir,
            files,
            max_bytes,
            max_file_bytes,
            pretty,
            no_redact,
        } => {
            // Budget defaults come from the run directory's config when
            // one is present; flags override.
            let config = load_config(&run_dir.join("config.toml"))?;
            let options = ExportOptions {
                include_files,
                base_dir: base_dir.or_else(|| run_dir.parent().map(Path::to_path_buf)),
                max_bytes: max_bytes.unwrap_or(config.export.max_bytes),
                max_file_bytes: max_file_bytes.unwrap_or(config.export.max_file_bytes),
                pretty,
                redact_secrets: !no_redact,
            };
            cmd_export(&run_dir, &output, &files, &options).await
        }
        Command::Inspect { archive } => cmd_inspect(&archive),
    }
}

async fn cmd_export(
    run_dir: &Path,
    output: &Path,
    extra_files: &[String],
    options: &ExportOptions,
) -> Result<()> {
    let paths = RunPaths::new(run_dir);
    let meta = store::read_meta(&paths)
        .with_context(|| format!("load run metadata from {}", run_dir.display()))?;

    let mut inputs = RunInputs::new(meta);
    inputs.events = store::read_events(&paths)?;
    inputs.proposals = store::read_proposals(&paths)?;
    inputs.commits = store::read_commits(&paths)?;
    inputs.file_paths = collect_file_paths(&inputs, extra_files);

    let archive = archive::export_run(inputs, options).await?;
    let raw = archive::to_json(&archive, options.pretty)?;
    fs::write(output, raw).with_context(|| format!("write {}", output.display()))?;

    let stats = archive.stats.unwrap_or(archive::ArchiveStats {
        events: archive.events.len(),
        files: None,
        bytes: None,
    });
    println!(
        "wrote {} ({} events, {} proposals, {} commits{})",
        output.display(),
        stats.events,
        archive.proposals.len(),
        archive.commits.len(),
        match (stats.files, stats.bytes) {
            (Some(files), Some(bytes)) => format!(", {files} files / {bytes} bytes"),
            _ => String::new(),
        }
    );
    Ok(())
}

/// Files touched by the run's proposals plus any caller extras, first
/// occurrence wins.
fn collect_file_paths(inputs: &RunInputs, extra_files: &[String]) -> Vec<String> {
    let mut seen = BTreeSet::new();
    let mut paths = Vec::new();
    let proposal_paths = inputs
        .proposals
        .iter()
        .flat_map(|proposal| proposal.file_paths());
    for path in proposal_paths.chain(extra_files.iter().cloned()) {
        if seen.insert(path.clone()) {
            paths.push(path);
        }
    }
    paths
}

fn cmd_inspect(path: &Path) -> Result<()> {
    let raw = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let archive = archive::parse_archive(&raw)?;

    println!("version:   {}", archive.version);
    println!("run:       {}", archive.meta.run_id);
    println!("project:   {}", archive.meta.project_id);
    if let Some(task_id) = &archive.meta.task_id {
        println!("task:      {task_id}");
    }
    if let Some(feature_id) = &archive.meta.feature_id {
        println!("feature:   {feature_id}");
    }
    println!("created:   {}", archive.created_at.to_rfc3339());
    println!("events:    {}", archive.events.len());
    println!("proposals: {}", archive.proposals.len());
    println!("commits:   {}", archive.commits.len());
    if let Some(files) = &archive.files {
        let bytes: u64 = files.values().map(|f| f.size).sum();
        println!("files:     {} ({bytes} bytes embedded)", files.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use factory::core::types::{ChangeKind, FileDiff, Proposal, RunMeta};

    use super::*;

    #[test]
    fn parse_export_defaults() {
        let cli = Cli::parse_from(["factory", "export", "runs/run-1"]);
        match cli.command {
            Command::Export {
                run_dir,
                include_files,
                no_redact,
                ..
            } => {
                assert_eq!(run_dir, PathBuf::from("runs/run-1"));
                assert!(!include_files);
                assert!(!no_redact);
            }
            Command::Inspect { .. } => panic!("expected export"),
        }
    }

    #[test]
    fn parse_inspect() {
        let cli = Cli::parse_from(["factory", "inspect", "archive.json"]);
        assert!(matches!(cli.command, Command::Inspect { .. }));
    }

    #[test]
    fn collect_file_paths_merges_proposals_and_extras() {
        let mut proposal = Proposal::new("p1");
        for path in ["src/a.rs", "src/b.rs"] {
            proposal.diffs.push(FileDiff {
                path: path.to_string(),
                change: ChangeKind::Modified,
                diff: None,
            });
        }
        let mut inputs = RunInputs::new(RunMeta::new("run-1", "proj-1"));
        inputs.proposals = vec![proposal];

        let paths = collect_file_paths(&inputs, &["src/b.rs".to_string(), "docs/x.md".to_string()]);
        assert_eq!(paths, vec!["src/a.rs", "src/b.rs", "docs/x.md"]);
    }
}
