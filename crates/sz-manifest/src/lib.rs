// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Run manifest schema and deterministic projection.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use sz_core::{DoctrineReference, ErrorCode, InputSnapshotRef, JobType};

/// Current schema version this crate writes. Readers must ignore unknown
/// fields; writers bump `MINOR` for additive changes, `MAJOR` only for a
/// breaking change with an explicit migration registered.
pub const CURRENT_SCHEMA_VERSION: &str = "1.2.0";

/// Run status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The job body has not yet completed.
    Running,
    /// The job body completed without error.
    Succeeded,
    /// The job body raised; `error` is populated.
    Failed,
}

/// One file under `outputs/` and its declared hash.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactEntry {
    /// `sha256:`-prefixed content hash.
    pub sha256: String,
    /// Size in bytes.
    pub bytes: u64,
}

/// One upstream stage this run's `chain_metadata.prior_stages` references.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PriorStageRef {
    /// Upstream `run_id`.
    pub run_id: String,
    /// Upstream `job_id`.
    pub job_id: String,
    /// Free-form stage label.
    pub stage: String,
    /// Relative output paths this run depended on.
    pub output_references: Vec<String>,
}

/// Chain graph edges recorded on the downstream manifest only; traversal
/// is by disk walk, never by following an edge stored upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ChainMetadata {
    /// Whether this job type accepts a `chain` block.
    pub is_chainable_stage: bool,
    /// Upstream stages this run depended on (empty for non-chainable runs).
    pub prior_stages: Vec<PriorStageRef>,
}

impl Default for ChainMetadata {
    fn default() -> Self {
        Self {
            is_chainable_stage: false,
            prior_stages: Vec::new(),
        }
    }
}

/// Captured job-body failure, recorded into the manifest rather than left
/// to propagate silently.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorRecord {
    /// Stable error code.
    pub code: ErrorCode,
    /// Human-readable message.
    pub message: String,
}

/// One `migration_history` audit entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MigrationHistoryEntry {
    /// Source schema version.
    pub from: String,
    /// Target schema version.
    pub to: String,
    /// Wall-clock time the migration ran.
    pub applied_at: DateTime<Utc>,
    /// Human-readable list of field-level changes.
    pub changes: Vec<String>,
    /// Hash of the deterministic projection before migrating.
    pub checksum_before: String,
    /// Hash of the deterministic projection after migrating.
    pub checksum_after: String,
}

/// A [`DoctrineReference`] plus the volatile resolution timestamp, as it
/// appears in the manifest's stored form. `resolved_at` is recorded here
/// but must never survive into the deterministic projection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DoctrineManifestEntry {
    /// The deterministic doctrine reference.
    #[serde(flatten)]
    pub reference: DoctrineReference,
    /// Wall-clock resolution time; stored form only.
    pub resolved_at: DateTime<Utc>,
}

/// Schema-versioned manifest record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct RunManifest {
    /// `MAJOR.MINOR.PATCH` schema version.
    pub schema_version: String,
    /// Governance-stable external identifier, copied verbatim from the brief.
    pub job_id: String,
    /// Content-addressed run identifier.
    pub run_id: String,
    /// External queue identifier; recorded but excluded from determinism.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_job_id: Option<String>,
    /// The `job_ref` the submission resolved.
    pub job_ref: String,
    /// Job type.
    pub job_type: JobType,
    /// Run status.
    pub status: RunStatus,
    /// `sha256:`-prefixed hash over the snapshot-hash mapping. `None` only
    /// on manifests migrated forward from a schema version that predates
    /// `input_snapshots`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inputs_hash: Option<String>,
    /// `name -> snapshot file reference`.
    pub input_snapshots: BTreeMap<String, InputSnapshotRef>,
    /// Resolved doctrine reference, when this job type uses one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doctrine: Option<DoctrineManifestEntry>,
    /// `relpath -> {sha256, bytes}` for every file under `outputs/`.
    pub artifacts: BTreeMap<String, ArtifactEntry>,
    /// Chain graph edge from this run to its priors.
    #[serde(default)]
    pub chain_metadata: ChainMetadata,
    /// Captured job-body failure, when `status == failed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorRecord>,
    /// Migration audit trail, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub migration_history: Vec<MigrationHistoryEntry>,
    /// Wall-clock start time; excluded from the deterministic projection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Wall-clock finish time; excluded from the deterministic projection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Tracing sink trace id, for cross-reference; excluded from the
    /// deterministic projection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub langfuse_trace_id: Option<String>,
}

/// Field names stripped from the stored form to produce the deterministic
/// projection used for byte-equality testing across runs sharing
/// `inputs_hash`.
const TOP_LEVEL_VOLATILE_FIELDS: &[&str] =
    &["started_at", "finished_at", "queue_job_id", "langfuse_trace_id"];

impl RunManifest {
    /// Canonical JSON of the full stored record, including volatile fields.
    pub fn stored_form(&self) -> Result<String, sz_canon::CanonError> {
        sz_canon::canonical_json_of(self)
    }

    /// Canonical JSON of the deterministic projection: the stored form with
    /// `started_at`, `finished_at`, `queue_job_id`, `langfuse_trace_id`, and
    /// `doctrine.resolved_at` removed. Byte-identical for any two runs
    /// sharing `inputs_hash`.
    pub fn deterministic_projection(&self) -> Result<String, sz_canon::CanonError> {
        let mut value = serde_json::to_value(self)?;
        if let serde_json::Value::Object(map) = &mut value {
            for field in TOP_LEVEL_VOLATILE_FIELDS {
                map.remove(*field);
            }
            if let Some(serde_json::Value::Object(doctrine)) = map.get_mut("doctrine") {
                doctrine.remove("resolved_at");
            }
        }
        sz_canon::canonical_json(&value)
    }

    /// Hash of [`deterministic_projection`](Self::deterministic_projection),
    /// used as `checksum_before`/`checksum_after` in migration history.
    pub fn deterministic_checksum(&self) -> Result<String, sz_canon::CanonError> {
        let projection = self.deterministic_projection()?;
        Ok(sz_canon::sha256_prefixed(projection.as_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(job_id: &str, run_id: &str) -> RunManifest {
        RunManifest {
            schema_version: CURRENT_SCHEMA_VERSION.to_string(),
            job_id: job_id.to_string(),
            run_id: run_id.to_string(),
            queue_job_id: Some("queue-A".to_string()),
            job_ref: "jobs/ig-test-001/brief.yaml".to_string(),
            job_type: JobType::InstagramCopy,
            status: RunStatus::Succeeded,
            inputs_hash: Some("sha256:deadbeef".to_string()),
            input_snapshots: BTreeMap::new(),
            doctrine: Some(DoctrineManifestEntry {
                reference: DoctrineReference {
                    doctrine_id: "prompts/instagram_copy".into(),
                    version: "1.0.0".into(),
                    sha256: "sha256:abc".into(),
                    resolved_path: "doctrine/prompts/instagram_copy/1.0.0/prompt.md".into(),
                },
                resolved_at: Utc::now(),
            }),
            artifacts: BTreeMap::new(),
            chain_metadata: ChainMetadata::default(),
            error: None,
            migration_history: Vec::new(),
            started_at: Some(Utc::now()),
            finished_at: Some(Utc::now()),
            langfuse_trace_id: Some("trace-123".into()),
        }
    }

    #[test]
    fn deterministic_projection_excludes_volatile_fields() {
        let manifest = sample("ig-test-001", &"a".repeat(32));
        let projection = manifest.deterministic_projection().unwrap();
        for field in TOP_LEVEL_VOLATILE_FIELDS {
            assert!(!projection.contains(field), "expected {field} to be stripped");
        }
        assert!(!projection.contains("resolved_at"));
        assert!(projection.contains("deadbeef"));
    }

    #[test]
    fn stored_form_retains_volatile_fields() {
        let manifest = sample("ig-test-001", &"a".repeat(32));
        let stored = manifest.stored_form().unwrap();
        assert!(stored.contains("queue_job_id"));
        assert!(stored.contains("langfuse_trace_id"));
        assert!(stored.contains("resolved_at"));
    }

    #[test]
    fn two_runs_sharing_inputs_hash_project_identically_despite_differing_queue_id() {
        let mut a = sample("ig-test-001", &"a".repeat(32));
        let mut b = sample("ig-test-001", &"a".repeat(32));
        a.queue_job_id = Some("queue-A".into());
        b.queue_job_id = Some("queue-B".into());
        assert_eq!(
            a.deterministic_projection().unwrap(),
            b.deterministic_projection().unwrap()
        );
    }

    #[test]
    fn different_run_ids_project_differently() {
        let a = sample("ig-test-001", &"a".repeat(32));
        let b = sample("ig-test-001", &"b".repeat(32));
        assert_ne!(
            a.deterministic_projection().unwrap(),
            b.deterministic_projection().unwrap()
        );
    }
}
