// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

/// Exit code for runtime errors (migration/verification failures, engine errors).
const EXIT_RUNTIME_ERROR: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "sz", version, about = "SIGIL.ZERO run engine CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Repository root the engine operates against.
    #[arg(long, global = true, env = "SIGILZERO_REPO_ROOT", default_value = ".")]
    repo_root: PathBuf,

    /// Enable debug logging.
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Submit a job brief and run it to completion (or replay it idempotently).
    Submit {
        /// Job ref, relative to the repo root, e.g. `jobs/ig-001/brief.yaml`.
        job_ref: String,

        /// External queue job id to record in the manifest.
        #[arg(long)]
        queue_job_id: Option<String>,
    },

    /// Migrate one manifest file to a target schema version.
    Migrate {
        /// Path to the manifest JSON file.
        manifest: PathBuf,

        /// Target schema version, e.g. `1.2.0`. Defaults to the engine's
        /// current manifest schema version.
        #[arg(long, default_value = "1.2.0")]
        to: String,

        /// Report what would change without writing anything.
        #[arg(long)]
        dry_run: bool,
    },

    /// Rebuild the secondary index from everything under `artifacts/`.
    Reindex {
        /// Also print integrity check results and exit non-zero on failure.
        #[arg(long)]
        verify: bool,

        /// Where to persist the rebuilt index.
        #[arg(long, default_value = ".sz/index.json")]
        index_path: PathBuf,
    },

    /// Load a single manifest and print its integrity check results.
    Inspect {
        /// Path to the manifest JSON file.
        manifest: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug {
        EnvFilter::new("sz=debug,sz_engine=debug")
    } else {
        EnvFilter::new("sz=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let result = match cli.command {
        Commands::Submit {
            job_ref,
            queue_job_id,
        } => cmd_submit(&cli.repo_root, &job_ref, queue_job_id),
        Commands::Migrate {
            manifest,
            to,
            dry_run,
        } => cmd_migrate(&manifest, &to, dry_run),
        Commands::Reindex {
            verify,
            index_path,
        } => cmd_reindex(&cli.repo_root, &index_path, verify),
        Commands::Inspect { manifest } => cmd_inspect(&manifest),
    };

    if let Err(e) = result {
        eprintln!("error: {e:#}");
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

fn cmd_submit(repo_root: &Path, job_ref: &str, queue_job_id: Option<String>) -> Result<()> {
    let llm = sz_jobs::MockLlmClient;
    let tracing_sink = sz_jobs::LogTracingSink;
    let outcome = sz_engine::submit(
        repo_root,
        job_ref,
        sz_engine::SubmitParams { queue_job_id },
        &llm,
        &tracing_sink,
    )
    .map_err(|e| anyhow::anyhow!("{e}"))
    .with_context(|| format!("submit '{job_ref}'"))?;

    println!("run_id: {}", outcome.run_id);
    println!("artifact_dir: {}", outcome.artifact_dir.display());
    println!(
        "idempotent_replay: {}",
        outcome.idempotent_replay
    );
    Ok(())
}

fn cmd_migrate(manifest: &Path, target: &str, dry_run: bool) -> Result<()> {
    let registry = sz_migrate::MigrationRegistry::builtin();
    let outcome = sz_migrate::migrate_file(&registry, manifest, target, dry_run)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("migrate '{}'", manifest.display()))?;

    match outcome {
        sz_migrate::FileMigrationOutcome::AlreadyCurrent => {
            println!("already at schema version {target}");
        }
        sz_migrate::FileMigrationOutcome::Migrated { steps } => {
            for step in &steps {
                println!(
                    "{} -> {}: {}",
                    step.from,
                    step.to,
                    step.changes.join(", ")
                );
            }
            println!("migrated {} ({} step(s))", manifest.display(), steps.len());
        }
        sz_migrate::FileMigrationOutcome::DryRun { steps } => {
            if steps.is_empty() {
                println!("already at schema version {target}");
            } else {
                for step in &steps {
                    println!(
                        "would apply {} -> {}: {}",
                        step.from,
                        step.to,
                        step.changes.join(", ")
                    );
                }
            }
        }
    }
    Ok(())
}

fn cmd_reindex(repo_root: &Path, index_path: &Path, verify: bool) -> Result<()> {
    let mut index = sz_reindex::SecondaryIndex::load(index_path)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("load index '{}'", index_path.display()))?;

    let report = sz_reindex::reindex(repo_root, &mut index)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .context("reindex")?;

    if let Some(parent) = index_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create index directory '{}'", parent.display()))?;
        }
    }
    index
        .save(index_path)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("save index '{}'", index_path.display()))?;

    println!("indexed {} run(s)", report.indexed);

    let mut any_failed = false;
    if verify {
        for vr in &report.verify_reports {
            let status = if vr.all_passed() { "OK" } else { "FAILED" };
            println!("{} {}@{}: {status}", status, vr.job_id, vr.run_id);
            if !vr.all_passed() {
                any_failed = true;
                for check in &vr.checks {
                    if !check.passed {
                        println!(
                            "  - {}: {}",
                            check.name,
                            check.detail.as_deref().unwrap_or("failed")
                        );
                    }
                }
            }
        }
    }

    if any_failed {
        anyhow::bail!("one or more runs failed integrity verification");
    }
    Ok(())
}

fn cmd_inspect(manifest: &Path) -> Result<()> {
    let bytes = std::fs::read(manifest)
        .with_context(|| format!("read manifest '{}'", manifest.display()))?;
    let value: serde_json::Value = serde_json::from_slice(&bytes)
        .with_context(|| format!("parse manifest '{}'", manifest.display()))?;

    let job_id = value.get("job_id").and_then(|v| v.as_str()).unwrap_or("<unknown>");
    let run_id = value.get("run_id").and_then(|v| v.as_str()).unwrap_or("<unknown>");
    let status = value.get("status").and_then(|v| v.as_str()).unwrap_or("<unknown>");
    let schema_version = value
        .get("schema_version")
        .and_then(|v| v.as_str())
        .unwrap_or("<unknown>");

    println!("job_id: {job_id}");
    println!("run_id: {run_id}");
    println!("status: {status}");
    println!("schema_version: {schema_version}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_submit() {
        let cli = Cli::parse_from(["sz", "submit", "jobs/ig-001/brief.yaml"]);
        match cli.command {
            Commands::Submit { job_ref, .. } => assert_eq!(job_ref, "jobs/ig-001/brief.yaml"),
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_migrate_with_dry_run() {
        let cli = Cli::parse_from(["sz", "migrate", "manifest.json", "--to", "1.2.0", "--dry-run"]);
        match cli.command {
            Commands::Migrate { to, dry_run, .. } => {
                assert_eq!(to, "1.2.0");
                assert!(dry_run);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn cli_parses_reindex_verify() {
        let cli = Cli::parse_from(["sz", "reindex", "--verify"]);
        matches!(cli.command, Commands::Reindex { verify: true, .. });
    }
}
