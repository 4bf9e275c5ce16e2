// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Artifact reindexer and integrity verifier.
//!
//! Walks canonical (`artifacts/<job_id>/<run_id>`) and legacy
//! (`artifacts/runs/<run_id>`) layouts, dedupes by `(job_id, run_id)`
//! preferring the canonical directory, runs a six-check integrity
//! verification per run, and upserts the result into a rebuildable
//! secondary index. The index is never consulted by the run engine — its
//! sole purpose is query convenience.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use sz_core::EngineError;

/// One discovered run directory, with its layout noted so canonical
/// directories can be preferred over legacy aliases during dedup.
#[derive(Debug, Clone)]
struct DiscoveredRun {
    job_id: String,
    run_id: String,
    manifest_path: PathBuf,
    run_dir: PathBuf,
    canonical: bool,
}

/// Walk `repo_root/artifacts`, discovering every run in both the
/// canonical (`artifacts/<job_id>/<run_id>`) and legacy
/// (`artifacts/runs/<run_id>`) layouts.
fn discover(repo_root: &Path) -> Vec<DiscoveredRun> {
    let artifacts_dir = repo_root.join("artifacts");
    let mut found = Vec::new();

    let Ok(job_dirs) = std::fs::read_dir(&artifacts_dir) else {
        return found;
    };
    for job_entry in job_dirs.flatten() {
        let job_dir = job_entry.path();
        if !job_dir.is_dir() {
            continue;
        }
        let job_name = job_dir.file_name().and_then(|n| n.to_str()).unwrap_or("").to_string();
        if job_name == "runs" || job_name == ".tmp" {
            continue;
        }

        let Ok(run_dirs) = std::fs::read_dir(&job_dir) else {
            continue;
        };
        for run_entry in run_dirs.flatten() {
            let run_dir = run_entry.path();
            if !run_dir.is_dir() || run_dir.file_name().and_then(|n| n.to_str()) == Some(".tmp") {
                continue;
            }
            let manifest_path = run_dir.join("manifest.json");
            if !manifest_path.is_file() {
                continue;
            }
            let Some((job_id, run_id)) = read_ids(&manifest_path) else {
                continue;
            };
            found.push(DiscoveredRun {
                job_id,
                run_id,
                manifest_path,
                run_dir,
                canonical: true,
            });
        }
    }

    let legacy_dir = artifacts_dir.join("runs");
    if let Ok(entries) = std::fs::read_dir(&legacy_dir) {
        for entry in entries.flatten() {
            let run_dir = entry.path();
            let manifest_path = run_dir.join("manifest.json");
            if !manifest_path.is_file() {
                continue;
            }
            let Some((job_id, run_id)) = read_ids(&manifest_path) else {
                continue;
            };
            found.push(DiscoveredRun {
                job_id,
                run_id,
                manifest_path,
                run_dir,
                canonical: false,
            });
        }
    }

    found
}

fn read_ids(manifest_path: &Path) -> Option<(String, String)> {
    let bytes = std::fs::read(manifest_path).ok()?;
    let value: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
    let job_id = value.get("job_id")?.as_str()?.to_string();
    let run_id = value.get("run_id")?.as_str()?.to_string();
    Some((job_id, run_id))
}

/// Dedupe discovered runs by `(job_id, run_id)`, preferring canonical
/// directories over legacy aliases, so a symlinked legacy entry never
/// double-counts a run already reachable canonically.
fn dedupe(runs: Vec<DiscoveredRun>) -> Vec<DiscoveredRun> {
    let mut by_key: BTreeMap<(String, String), DiscoveredRun> = BTreeMap::new();
    for run in runs {
        let key = (run.job_id.clone(), run.run_id.clone());
        match by_key.get(&key) {
            Some(existing) if existing.canonical && !run.canonical => {}
            _ => {
                by_key.insert(key, run);
            }
        }
    }
    by_key.into_values().collect()
}

/// One integrity check's outcome, named after the invariant it verifies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Check name, e.g. `"snapshot_hashes_match"`.
    pub name: String,
    /// Whether the check passed.
    pub passed: bool,
    /// Human-readable detail, populated on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Full integrity-verification outcome for one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyReport {
    /// `job_id` of the verified run.
    pub job_id: String,
    /// `run_id` of the verified run.
    pub run_id: String,
    /// Directory the run was verified against.
    pub run_dir: String,
    /// Every check run, in a fixed order.
    pub checks: Vec<CheckResult>,
}

impl VerifyReport {
    /// `true` only if every check in [`checks`](Self::checks) passed.
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.passed)
    }
}

fn check(name: &str, passed: bool, detail: Option<String>) -> CheckResult {
    CheckResult {
        name: name.to_string(),
        passed,
        detail,
    }
}

/// Run the six-check integrity verification against one discovered run's
/// manifest:
/// 1. every declared input snapshot file exists;
/// 2. every snapshot file's bytes hash to its declared `sha256`;
/// 3. the doctrine snapshot's content rehashes to `doctrine.sha256`;
/// 4. `inputs_hash` recomputes from the declared snapshot-hash set;
/// 5. `run_id` equals `H[0:32]` or a valid deterministic suffix of it;
/// 6. every file under `outputs/` has a matching `artifacts` entry whose
///    `sha256` matches the file's hash, and vice versa.
fn verify_run(run: &DiscoveredRun) -> Result<VerifyReport, EngineError> {
    let bytes = std::fs::read(&run.manifest_path).map_err(|e| EngineError::snapshot_io(
        "reindex",
        format!("read {}: {e}", run.manifest_path.display()),
    ))?;
    let manifest: serde_json::Value = serde_json::from_slice(&bytes).map_err(|e| {
        EngineError::snapshot_io("reindex", format!("parse {}: {e}", run.manifest_path.display()))
    })?;

    let mut checks = Vec::with_capacity(6);

    let input_snapshots = manifest
        .get("input_snapshots")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();

    let mut snapshot_hashes: BTreeMap<String, String> = BTreeMap::new();
    let mut missing = Vec::new();
    let mut mismatched = Vec::new();
    for (name, entry) in &input_snapshots {
        let Some(rel_path) = entry.get("path").and_then(|v| v.as_str()) else {
            missing.push(name.clone());
            continue;
        };
        let abs = run.run_dir.join(rel_path);
        if !abs.is_file() {
            missing.push(name.clone());
            continue;
        }
        let Ok((actual_hash, _)) = sz_canon::hash_file(&abs) else {
            missing.push(name.clone());
            continue;
        };
        let declared_hash = entry.get("sha256").and_then(|v| v.as_str()).unwrap_or_default();
        if actual_hash != declared_hash {
            mismatched.push(name.clone());
        }
        snapshot_hashes.insert(name.clone(), actual_hash);
    }

    checks.push(check(
        "snapshots_present",
        missing.is_empty(),
        (!missing.is_empty()).then(|| format!("missing snapshots: {}", missing.join(", "))),
    ));
    checks.push(check(
        "snapshot_hashes_match",
        mismatched.is_empty(),
        (!mismatched.is_empty()).then(|| format!("hash mismatch: {}", mismatched.join(", "))),
    ));

    let doctrine_ok = match manifest.get("doctrine") {
        None => true,
        Some(doctrine) => {
            let declared = doctrine.get("sha256").and_then(|v| v.as_str()).unwrap_or_default();
            match input_snapshots.get("doctrine").and_then(|e| e.get("path")).and_then(|v| v.as_str()) {
                Some(rel) => match std::fs::read(run.run_dir.join(rel)) {
                    Ok(bytes) => sz_canon::sha256_prefixed(&bytes) == declared || declared.is_empty(),
                    Err(_) => false,
                },
                None => true,
            }
        }
    };
    checks.push(check("doctrine_rehashes", doctrine_ok, (!doctrine_ok).then(|| "doctrine content hash mismatch".to_string())));

    let declared_inputs_hash = manifest.get("inputs_hash").and_then(|v| v.as_str());
    let inputs_hash_ok = match declared_inputs_hash {
        None => true,
        Some(declared) => match sz_runid::derive_inputs_hash(&snapshot_hashes) {
            Ok(recomputed) => recomputed == declared,
            Err(_) => false,
        },
    };
    checks.push(check(
        "inputs_hash_recomputes",
        inputs_hash_ok,
        (!inputs_hash_ok).then(|| "inputs_hash does not recompute from snapshot hashes".to_string()),
    ));

    let run_id_ok = match declared_inputs_hash {
        None => true,
        Some(declared) => {
            let base = sz_runid::derive_run_id_base(declared);
            run.run_id == base || is_valid_suffix(&run.run_id, &base)
        }
    };
    checks.push(check(
        "run_id_matches_derivation",
        run_id_ok,
        (!run_id_ok).then(|| format!("run_id '{}' does not match inputs_hash derivation", run.run_id)),
    ));

    let artifacts = manifest
        .get("artifacts")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();
    let outputs_dir = run.run_dir.join("outputs");
    let mut artifacts_ok = true;
    let mut artifact_errors = Vec::new();
    for (relpath, entry) in &artifacts {
        let abs = run.run_dir.join(relpath);
        match sz_canon::hash_file(&abs) {
            Ok((actual, _)) => {
                let declared = entry.get("sha256").and_then(|v| v.as_str()).unwrap_or_default();
                if actual != declared {
                    artifacts_ok = false;
                    artifact_errors.push(format!("{relpath} hash mismatch"));
                }
            }
            Err(_) => {
                artifacts_ok = false;
                artifact_errors.push(format!("{relpath} missing on disk"));
            }
        }
    }
    if outputs_dir.is_dir() {
        for entry in walkdir::WalkDir::new(&outputs_dir).into_iter().flatten() {
            if !entry.file_type().is_file() {
                continue;
            }
            let rel = entry
                .path()
                .strip_prefix(&run.run_dir)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            if !artifacts.contains_key(&rel) {
                artifacts_ok = false;
                artifact_errors.push(format!("{rel} has no matching artifacts entry"));
            }
        }
    }
    checks.push(check(
        "artifacts_match_outputs",
        artifacts_ok,
        (!artifacts_ok).then(|| artifact_errors.join("; ")),
    ));

    Ok(VerifyReport {
        job_id: run.job_id.clone(),
        run_id: run.run_id.clone(),
        run_dir: run.run_dir.display().to_string(),
        checks,
    })
}

fn is_valid_suffix(run_id: &str, base: &str) -> bool {
    let Some(rest) = run_id.strip_prefix(base) else {
        return false;
    };
    let Some(num) = rest.strip_prefix('-') else {
        return false;
    };
    matches!(num.parse::<u32>(), Ok(n) if n >= 2)
}

/// One row of the rebuildable secondary index, matching the columns
///  names for the reindexer's exposed interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRow {
    /// `job_id`.
    pub job_id: String,
    /// `run_id`.
    pub run_id: String,
    /// The `job_ref` the run was submitted with.
    #[serde(default)]
    pub job_ref: String,
    /// `job_type`.
    #[serde(default)]
    pub job_type: String,
    /// Run status.
    #[serde(default)]
    pub status: String,
    /// `inputs_hash`.
    #[serde(default)]
    pub inputs_hash: String,
    /// Directory the manifest was discovered under, repo-relative.
    pub artifact_dir: String,
    /// The full manifest, verbatim, for query convenience.
    pub manifest_json: serde_json::Value,
}

/// Upsert-only secondary index, keyed by `(job_id, run_id)`. Never
/// consulted by the run engine; rebuildable from disk at any time by
/// calling [`reindex`].
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct SecondaryIndex {
    rows: BTreeMap<(String, String), IndexRow>,
}

impl SecondaryIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the row for `(job_id, run_id)`.
    pub fn upsert(&mut self, row: IndexRow) {
        self.rows.insert((row.job_id.clone(), row.run_id.clone()), row);
    }

    /// Look up a row by `(job_id, run_id)`.
    pub fn get(&self, job_id: &str, run_id: &str) -> Option<&IndexRow> {
        self.rows.get(&(job_id.to_string(), run_id.to_string()))
    }

    /// All rows, in `(job_id, run_id)` order.
    pub fn rows(&self) -> impl Iterator<Item = &IndexRow> {
        self.rows.values()
    }

    /// Number of indexed rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether the index has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Load a previously-persisted index from `path`, or an empty index
    /// if `path` does not exist.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        if !path.is_file() {
            return Ok(Self::new());
        }
        let bytes = std::fs::read(path)
            .map_err(|e| EngineError::snapshot_io("reindex", format!("read index: {e}")))?;
        let rows: Vec<IndexRow> = serde_json::from_slice(&bytes)
            .map_err(|e| EngineError::snapshot_io("reindex", format!("parse index: {e}")))?;
        let mut index = Self::new();
        for row in rows {
            index.upsert(row);
        }
        Ok(index)
    }

    /// Persist the index as canonical JSON to `path`.
    pub fn save(&self, path: &Path) -> Result<(), EngineError> {
        let rows: Vec<&IndexRow> = self.rows().collect();
        let json = sz_canon::canonical_json_of(&rows)
            .map_err(|e| EngineError::snapshot_io("reindex", format!("serialize index: {e}")))?;
        std::fs::write(path, json.as_bytes())
            .map_err(|e| EngineError::snapshot_io("reindex", format!("write index: {e}")))
    }
}

/// Outcome of a full [`reindex`] pass.
pub struct ReindexReport {
    /// Verification report per discovered, deduped run.
    pub verify_reports: Vec<VerifyReport>,
    /// Number of runs upserted into the index.
    pub indexed: usize,
}

/// Walk `repo_root/artifacts` in both layouts, dedupe, verify each run's
/// integrity, and upsert every run (verified or not) into `index`.
/// Callers in `--verify` mode should inspect `verify_reports` and treat
/// any `!all_passed()` report as a reportable failure without aborting
/// the rest of the walk.
pub fn reindex(repo_root: &Path, index: &mut SecondaryIndex) -> Result<ReindexReport, EngineError> {
    let runs = dedupe(discover(repo_root));
    let mut verify_reports = Vec::with_capacity(runs.len());
    let mut indexed = 0;

    for run in &runs {
        let report = verify_run(run)?;

        let bytes = std::fs::read(&run.manifest_path).ok();
        let manifest: serde_json::Value = bytes
            .and_then(|b| serde_json::from_slice(&b).ok())
            .unwrap_or(serde_json::Value::Null);

        let artifact_dir = run
            .run_dir
            .strip_prefix(repo_root)
            .unwrap_or(&run.run_dir)
            .to_string_lossy()
            .replace('\\', "/");

        index.upsert(IndexRow {
            job_id: run.job_id.clone(),
            run_id: run.run_id.clone(),
            job_ref: manifest.get("job_ref").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            job_type: manifest.get("job_type").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            status: manifest.get("status").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            inputs_hash: manifest.get("inputs_hash").and_then(|v| v.as_str()).unwrap_or_default().to_string(),
            artifact_dir,
            manifest_json: manifest,
        });
        indexed += 1;
        verify_reports.push(report);
    }

    Ok(ReindexReport { verify_reports, indexed })
}
