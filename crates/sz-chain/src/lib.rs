// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Chain resolver.
//!
//! Locates a prior run's manifest on disk by `run_id`, verifies its
//! `required_outputs` exist and hashes them, and builds the
//! `prior_artifact` snapshot a chainable job type embeds as an input.
//! Traversal is always a disk walk keyed by `run_id` — a downstream
//! manifest's `chain_metadata.prior_stages` is an audit record, never a
//! pointer the resolver follows.

use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use sz_core::{EngineError, JobType, PriorArtifactSnapshot, PriorManifestSummary};

/// Find the on-disk manifest for `run_id`, preferring the canonical
/// `artifacts/*/<run_id>/manifest.json` layout and falling back to the
/// legacy `artifacts/runs/<run_id>/manifest.json` alias.
fn locate_manifest(repo_root: &Path, run_id: &str) -> Option<(PathBuf, PathBuf)> {
    let artifacts_dir = repo_root.join("artifacts");
    if let Ok(entries) = std::fs::read_dir(&artifacts_dir) {
        for entry in entries.flatten() {
            let job_dir = entry.path();
            if !job_dir.is_dir() {
                continue;
            }
            if job_dir.file_name().and_then(|n| n.to_str()) == Some("runs") {
                continue;
            }
            let run_dir = job_dir.join(run_id);
            let manifest_path = run_dir.join("manifest.json");
            if manifest_path.is_file() {
                return Some((run_dir, manifest_path));
            }
        }
    }

    let legacy_dir = artifacts_dir.join("runs").join(run_id);
    let legacy_manifest = legacy_dir.join("manifest.json");
    if legacy_manifest.is_file() {
        return Some((legacy_dir, legacy_manifest));
    }

    None
}

/// Resolve `prior_run_id` against on-disk state, verify `required_outputs`,
/// and build the [`PriorArtifactSnapshot`] a chainable job embeds.
///
/// Returns [`EngineError::PriorArtifactMissing`] if the manifest can't be
/// located, a required output is missing, or the upstream manifest's
/// `job_type` doesn't match `expected_upstream_job_type` — a mismatch is a
/// fatal chain error, never a silently-accepted input: a brief chaining
/// from the wrong stage is a configuration bug, not data the engine
/// should launder through.
pub fn resolve_chain(
    repo_root: &Path,
    prior_run_id: &str,
    prior_stage: &str,
    required_outputs: &[String],
    expected_upstream_job_type: JobType,
) -> Result<PriorArtifactSnapshot, EngineError> {
    let (run_dir, manifest_path) = locate_manifest(repo_root, prior_run_id).ok_or_else(|| {
        EngineError::PriorArtifactMissing {
            message: format!("no manifest found for prior_run_id '{prior_run_id}'"),
        }
    })?;

    let bytes = std::fs::read(&manifest_path).map_err(|e| EngineError::PriorArtifactMissing {
        message: format!("read {}: {e}", manifest_path.display()),
    })?;
    let manifest: Value = serde_json::from_slice(&bytes).map_err(|e| EngineError::PriorArtifactMissing {
        message: format!("parse {}: {e}", manifest_path.display()),
    })?;

    let prior_job_id = manifest
        .get("job_id")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::PriorArtifactMissing {
            message: "prior manifest missing job_id".to_string(),
        })?
        .to_string();

    let prior_job_type_str = manifest
        .get("job_type")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::PriorArtifactMissing {
            message: "prior manifest missing job_type".to_string(),
        })?;
    if prior_job_type_str != expected_upstream_job_type.as_str() {
        return Err(EngineError::PriorArtifactMissing {
            message: format!(
                "prior run {prior_run_id} has job_type '{prior_job_type_str}', expected '{}'",
                expected_upstream_job_type.as_str()
            ),
        });
    }

    let prior_inputs_hash = manifest
        .get("inputs_hash")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::PriorArtifactMissing {
            message: "prior manifest missing inputs_hash".to_string(),
        })?
        .to_string();

    let mut prior_output_hashes = BTreeMap::new();
    for relpath in required_outputs {
        let path = run_dir.join(relpath);
        if !path.is_file() {
            return Err(EngineError::PriorArtifactMissing {
                message: format!("required output '{relpath}' missing from prior run {prior_run_id}"),
            });
        }
        let (hash, _bytes) = sz_canon::hash_file(&path).map_err(|e| EngineError::PriorArtifactMissing {
            message: format!("hash required output '{relpath}': {e}"),
        })?;
        prior_output_hashes.insert(relpath.clone(), hash);
    }

    Ok(PriorArtifactSnapshot {
        prior_run_id: prior_run_id.to_string(),
        prior_stage: prior_stage.to_string(),
        prior_job_id: prior_job_id.clone(),
        prior_manifest: PriorManifestSummary {
            job_id: prior_job_id,
            run_id: prior_run_id.to_string(),
            job_type: expected_upstream_job_type,
            inputs_hash: prior_inputs_hash,
        },
        required_outputs: required_outputs.to_vec(),
        prior_output_hashes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_prior_run(
        repo_root: &Path,
        job_id: &str,
        run_id: &str,
        job_type: &str,
        inputs_hash: &str,
        outputs: &[(&str, &str)],
    ) {
        let run_dir = repo_root.join("artifacts").join(job_id).join(run_id);
        std::fs::create_dir_all(run_dir.join("outputs")).unwrap();
        for (name, content) in outputs {
            std::fs::write(run_dir.join(name), content).unwrap();
        }
        std::fs::write(
            run_dir.join("manifest.json"),
            serde_json::to_vec(&serde_json::json!({
                "job_id": job_id,
                "run_id": run_id,
                "job_type": job_type,
                "inputs_hash": inputs_hash,
            }))
            .unwrap(),
        )
        .unwrap();
    }

    #[test]
    fn resolves_chain_and_hashes_required_outputs() {
        let dir = tempfile::tempdir().unwrap();
        let run_id = "a".repeat(32);
        write_prior_run(
            dir.path(),
            "score-001",
            &run_id,
            "brand_compliance_score",
            "sha256:upstream",
            &[("outputs/compliance_scores.json", "{}")],
        );

        let snapshot = resolve_chain(
            dir.path(),
            &run_id,
            "compliance_scoring",
            &["outputs/compliance_scores.json".to_string()],
            JobType::BrandComplianceScore,
        )
        .unwrap();

        assert_eq!(snapshot.prior_job_id, "score-001");
        assert_eq!(snapshot.prior_manifest.inputs_hash, "sha256:upstream");
        assert!(snapshot.prior_output_hashes.contains_key("outputs/compliance_scores.json"));
    }

    #[test]
    fn missing_run_id_is_prior_artifact_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_chain(
            dir.path(),
            &"b".repeat(32),
            "compliance_scoring",
            &[],
            JobType::BrandComplianceScore,
        )
        .unwrap_err();
        assert_eq!(err.code(), sz_core::ErrorCode::PriorArtifactMissing);
    }

    #[test]
    fn missing_required_output_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let run_id = "c".repeat(32);
        write_prior_run(
            dir.path(),
            "score-001",
            &run_id,
            "brand_compliance_score",
            "sha256:upstream",
            &[],
        );
        let err = resolve_chain(
            dir.path(),
            &run_id,
            "compliance_scoring",
            &["outputs/compliance_scores.json".to_string()],
            JobType::BrandComplianceScore,
        )
        .unwrap_err();
        assert_eq!(err.code(), sz_core::ErrorCode::PriorArtifactMissing);
    }

    #[test]
    fn job_type_mismatch_is_rejected_not_laundered() {
        let dir = tempfile::tempdir().unwrap();
        let run_id = "d".repeat(32);
        write_prior_run(
            dir.path(),
            "copy-001",
            &run_id,
            "instagram_copy",
            "sha256:upstream",
            &[],
        );
        let err = resolve_chain(
            dir.path(),
            &run_id,
            "compliance_scoring",
            &[],
            JobType::BrandComplianceScore,
        )
        .unwrap_err();
        assert_eq!(err.code(), sz_core::ErrorCode::PriorArtifactMissing);
        assert!(err.to_string().contains("instagram_copy"));
    }

    #[test]
    fn finds_manifest_via_legacy_runs_alias() {
        let dir = tempfile::tempdir().unwrap();
        let run_id = "e".repeat(32);
        let legacy_dir = dir.path().join("artifacts/runs").join(&run_id);
        std::fs::create_dir_all(&legacy_dir).unwrap();
        std::fs::write(
            legacy_dir.join("manifest.json"),
            serde_json::to_vec(&serde_json::json!({
                "job_id": "score-001",
                "run_id": run_id,
                "job_type": "brand_compliance_score",
                "inputs_hash": "sha256:legacy",
            }))
            .unwrap(),
        )
        .unwrap();

        let snapshot = resolve_chain(
            dir.path(),
            &run_id,
            "compliance_scoring",
            &[],
            JobType::BrandComplianceScore,
        )
        .unwrap();
        assert_eq!(snapshot.prior_manifest.inputs_hash, "sha256:legacy");
    }
}
