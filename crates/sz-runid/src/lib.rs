// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! `inputs_hash`/`run_id` derivation and collision/idempotency
//! resolution.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use sz_core::EngineError;

/// Suffix space bound: `run_id_base` itself counts as candidate 1; suffixes
/// `-2` through `-1000` bring the total to 1000 candidates before failing.
pub const MAX_CANDIDATES: u32 = 1000;

/// `inputs_hash = sha256(canonical_json({name -> file_sha256}))`, returned
/// `sha256:`-prefixed. No data other than the snapshot hash map may
/// participate — no timestamps, queue ids, or machine ids.
pub fn derive_inputs_hash(snapshot_hashes: &BTreeMap<String, String>) -> Result<String, EngineError> {
    let value = serde_json::to_value(snapshot_hashes)
        .map_err(|e| EngineError::snapshot_io("inputs_hash", format!("serialize: {e}")))?;
    sz_canon::canonical_hash(&value)
        .map_err(|e| EngineError::snapshot_io("inputs_hash", format!("hash: {e}")))
}

/// `run_id_base = hex(inputs_hash)[0:32]`.
pub fn derive_run_id_base(inputs_hash: &str) -> String {
    let hex = inputs_hash.strip_prefix("sha256:").unwrap_or(inputs_hash);
    hex.chars().take(32).collect()
}

/// A candidate run id at a given suffix, `None` meaning the unsuffixed base.
fn candidate_run_id(run_id_base: &str, suffix: u32) -> String {
    if suffix == 1 {
        run_id_base.to_string()
    } else {
        format!("{run_id_base}-{suffix}")
    }
}

/// Outcome of collision resolution for a fresh submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// No existing run matched; this `run_id` (base or suffixed) is
    /// reserved for a new run. No directory exists yet at this path.
    Reserved {
        /// The reserved run id.
        run_id: String,
    },
    /// An existing run at this id has the same `inputs_hash`: idempotent
    /// replay. The caller must discard its temp dir and return this
    /// directory unchanged.
    IdempotentReplay {
        /// The existing run id.
        run_id: String,
        /// Its canonical artifact directory.
        artifact_dir: PathBuf,
    },
}

/// [`Resolution`] plus the side-effecting actions taken while resolving
/// (legacy promotions), for inclusion in the run footer log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionOutcome {
    /// The resolution reached.
    pub resolution: Resolution,
    /// Actions performed as a side effect of resolving (e.g.
    /// `"promoted legacy dir for <run_id>"`).
    pub actions: Vec<String>,
}

/// Resolve `run_id_base` against on-disk state for `job_id`, given the
/// current submission's `inputs_hash`. Scans canonical
/// `artifacts/<job_id>/<run_id>` and legacy `artifacts/runs/<run_id>`
/// directories, promoting legacy plain directories to canonical as
/// encountered.
pub fn resolve(
    repo_root: &Path,
    job_id: &str,
    run_id_base: &str,
    inputs_hash: &str,
) -> Result<ResolutionOutcome, EngineError> {
    let artifacts_dir = repo_root.join("artifacts");
    let mut actions = Vec::new();

    for suffix in 1..=MAX_CANDIDATES {
        let run_id = candidate_run_id(run_id_base, suffix);
        let canonical_dir = artifacts_dir.join(job_id).join(&run_id);
        let legacy_dir = artifacts_dir.join("runs").join(&run_id);

        if !canonical_dir.exists() && is_plain_dir(&legacy_dir) {
            promote_legacy_dir(&artifacts_dir, job_id, &run_id, &legacy_dir, &canonical_dir)?;
            actions.push(format!("promoted legacy directory for run_id {run_id}"));
        }

        if !canonical_dir.exists() {
            return Ok(ResolutionOutcome {
                resolution: Resolution::Reserved { run_id },
                actions,
            });
        }

        match read_manifest_inputs_hash(&canonical_dir) {
            Some(existing_hash) if existing_hash == inputs_hash => {
                actions.push("idempotent replay".to_string());
                return Ok(ResolutionOutcome {
                    resolution: Resolution::IdempotentReplay {
                        run_id,
                        artifact_dir: canonical_dir,
                    },
                    actions,
                });
            }
            _ => continue,
        }
    }

    Err(EngineError::CollisionLimitExceeded {
        run_id_base: run_id_base.to_string(),
    })
}

fn is_plain_dir(path: &Path) -> bool {
    match std::fs::symlink_metadata(path) {
        Ok(meta) => meta.is_dir() && !meta.file_type().is_symlink(),
        Err(_) => false,
    }
}

fn read_manifest_inputs_hash(run_dir: &Path) -> Option<String> {
    let manifest_path = run_dir.join("manifest.json");
    let bytes = std::fs::read(manifest_path).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    value
        .get("inputs_hash")
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
}

fn promote_legacy_dir(
    artifacts_dir: &Path,
    job_id: &str,
    run_id: &str,
    legacy_dir: &Path,
    canonical_dir: &Path,
) -> Result<(), EngineError> {
    if let Some(parent) = canonical_dir.parent() {
        std::fs::create_dir_all(parent).map_err(|e| EngineError::FinalizeFailure {
            message: format!("create canonical job dir: {e}"),
        })?;
    }
    std::fs::rename(legacy_dir, canonical_dir).map_err(|e| EngineError::FinalizeFailure {
        message: format!("promote legacy dir {}: {e}", legacy_dir.display()),
    })?;

    let relative_target = format!("../{job_id}/{run_id}");
    if let Err(e) = create_relative_symlink(&relative_target, legacy_dir) {
        tracing::warn!(
            target: "sigilzero.runid",
            run_id, %e,
            "failed to recreate legacy symlink after promotion (non-fatal)"
        );
    }
    let _ = artifacts_dir;
    Ok(())
}

#[cfg(unix)]
fn create_relative_symlink(target: &str, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(not(unix))]
fn create_relative_symlink(_target: &str, _link: &Path) -> std::io::Result<()> {
    Err(std::io::Error::other("symlinks unsupported on this platform"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn write_manifest(dir: &Path, inputs_hash: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(
            dir.join("manifest.json"),
            format!("{{\"inputs_hash\": \"{inputs_hash}\"}}"),
        )
        .unwrap();
    }

    #[test]
    fn run_id_base_is_first_32_hex_chars() {
        let hash = "sha256:".to_string() + &"a".repeat(64);
        assert_eq!(derive_run_id_base(&hash), "a".repeat(32));
    }

    #[test]
    fn derive_inputs_hash_is_order_independent() {
        let mut m1 = BTreeMap::new();
        m1.insert("brief".to_string(), "sha256:aaa".to_string());
        m1.insert("context".to_string(), "sha256:bbb".to_string());
        let mut m2 = BTreeMap::new();
        m2.insert("context".to_string(), "sha256:bbb".to_string());
        m2.insert("brief".to_string(), "sha256:aaa".to_string());
        assert_eq!(derive_inputs_hash(&m1).unwrap(), derive_inputs_hash(&m2).unwrap());
    }

    #[test]
    fn reserves_base_when_nothing_exists() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = resolve(dir.path(), "ig-test-001", &"b".repeat(32), "sha256:hash1").unwrap();
        assert_eq!(
            outcome.resolution,
            Resolution::Reserved {
                run_id: "b".repeat(32)
            }
        );
        assert!(outcome.actions.is_empty());
    }

    #[test]
    fn idempotent_replay_when_hash_matches() {
        let dir = tempfile::tempdir().unwrap();
        let run_id = "c".repeat(32);
        let canonical = dir.path().join("artifacts/ig-test-001").join(&run_id);
        write_manifest(&canonical, "sha256:samehash");

        let outcome = resolve(dir.path(), "ig-test-001", &run_id, "sha256:samehash").unwrap();
        match outcome.resolution {
            Resolution::IdempotentReplay { run_id: got, .. } => assert_eq!(got, run_id),
            _ => panic!("expected idempotent replay"),
        }
    }

    #[test]
    fn advances_suffix_when_hash_differs() {
        let dir = tempfile::tempdir().unwrap();
        let base = "d".repeat(32);
        let canonical = dir.path().join("artifacts/ig-test-001").join(&base);
        write_manifest(&canonical, "sha256:other");

        let outcome = resolve(dir.path(), "ig-test-001", &base, "sha256:mine").unwrap();
        assert_eq!(
            outcome.resolution,
            Resolution::Reserved {
                run_id: format!("{base}-2")
            }
        );
    }

    #[test]
    fn promotes_legacy_plain_directory_to_canonical() {
        let dir = tempfile::tempdir().unwrap();
        let run_id = "e".repeat(32);
        let legacy = dir.path().join("artifacts/runs").join(&run_id);
        write_manifest(&legacy, "sha256:legacyhash");

        let outcome = resolve(dir.path(), "ig-test-001", &run_id, "sha256:legacyhash").unwrap();
        let canonical = dir.path().join("artifacts/ig-test-001").join(&run_id);
        assert!(canonical.join("manifest.json").is_file());
        assert!(!legacy.exists() || std::fs::symlink_metadata(&legacy).unwrap().file_type().is_symlink());
        match outcome.resolution {
            Resolution::IdempotentReplay { run_id: got, .. } => assert_eq!(got, run_id),
            _ => panic!("expected idempotent replay after promotion"),
        }
        assert!(outcome.actions.iter().any(|a| a.contains("promoted")));
    }
}
