// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Atomic finalizer.
//!
//! The temp directory lives at `artifacts/<job_id>/.tmp/tmp-<random>`. The
//! manifest is written into it before the promoting `rename`, so an on-disk
//! manifest always describes whatever directory currently exists at that
//! path. No partial promotions: the temp dir is promoted as a whole or not
//! at all.

use rand::Rng;
use std::path::{Path, PathBuf};
use sz_core::EngineError;

/// An in-flight run's temp directory, not yet promoted.
pub struct TempRun {
    path: PathBuf,
}

impl TempRun {
    /// Create a fresh temp directory at
    /// `artifacts/<job_id>/.tmp/tmp-<random>`.
    pub fn create(repo_root: &Path, job_id: &str) -> Result<Self, EngineError> {
        let tmp_root = repo_root.join("artifacts").join(job_id).join(".tmp");
        std::fs::create_dir_all(&tmp_root).map_err(|e| EngineError::FinalizeFailure {
            message: format!("create .tmp dir: {e}"),
        })?;

        let suffix: String = {
            let mut rng = rand::thread_rng();
            (0..12)
                .map(|_| rng.sample(rand::distributions::Alphanumeric) as char)
                .collect()
        };
        let path = tmp_root.join(format!("tmp-{suffix}"));
        std::fs::create_dir(&path).map_err(|e| EngineError::FinalizeFailure {
            message: format!("create temp run dir: {e}"),
        })?;
        Ok(Self { path })
    }

    /// Root of the temp directory.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Outcome of a successful finalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizeOutcome {
    /// The promoted, canonical artifact directory.
    pub artifact_dir: PathBuf,
    /// Actions taken, for the run footer log line (e.g.
    /// `"created legacy symlink"`).
    pub actions: Vec<String>,
}

/// Write `manifest_bytes` into `temp.path()/manifest.json`, then
/// atomically rename the temp directory to
/// `artifacts/<job_id>/<run_id>`, then best-effort create the legacy
/// symlink `artifacts/runs/<run_id> -> ../<job_id>/<run_id>`.
///
/// If `rename` fails, the temp directory is removed and
/// [`EngineError::FinalizeFailure`] is returned — no partial promotion.
pub fn finalize(
    temp: TempRun,
    repo_root: &Path,
    job_id: &str,
    run_id: &str,
    manifest_bytes: &[u8],
) -> Result<FinalizeOutcome, EngineError> {
    let mut actions = Vec::new();

    std::fs::write(temp.path().join("manifest.json"), manifest_bytes).map_err(|e| {
        EngineError::FinalizeFailure {
            message: format!("write manifest into temp dir: {e}"),
        }
    })?;

    let job_dir = repo_root.join("artifacts").join(job_id);
    let canonical_dir = job_dir.join(run_id);

    if let Err(e) = std::fs::rename(temp.path(), &canonical_dir) {
        let _ = std::fs::remove_dir_all(temp.path());
        return Err(EngineError::FinalizeFailure {
            message: format!("promote {} -> {}: {e}", temp.path().display(), canonical_dir.display()),
        });
    }

    let runs_dir = repo_root.join("artifacts").join("runs");
    if let Err(e) = std::fs::create_dir_all(&runs_dir) {
        tracing::warn!(target: "sigilzero.finalize", run_id, %e, "failed to create runs/ alias dir (non-fatal)");
    } else {
        let symlink_path = runs_dir.join(run_id);
        if !symlink_path.exists() {
            let relative_target = format!("../{job_id}/{run_id}");
            match create_relative_symlink(&relative_target, &symlink_path) {
                Ok(()) => actions.push("created legacy symlink".to_string()),
                Err(e) => tracing::warn!(
                    target: "sigilzero.finalize",
                    run_id, %e,
                    "failed to create legacy symlink (non-fatal)"
                ),
            }
        }
    }

    Ok(FinalizeOutcome {
        artifact_dir: canonical_dir,
        actions,
    })
}

#[cfg(unix)]
fn create_relative_symlink(target: &str, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn create_relative_symlink(_target: &str, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::other("symlinks unsupported on this platform"))
}
