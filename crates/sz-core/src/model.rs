//! Core data model: briefs, doctrine references, assembled context, and
//! chain inputs.

use crate::config::{ChainInputRequest, ContextRequest, DoctrineRequest, GenerationConfig};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Job type, routing a brief to a job body and to a closed snapshot
/// vocabulary (`sz_snapshot::vocabulary_for`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    /// Generates Instagram caption copy from a brief and doctrine.
    InstagramCopy,
    /// Scores brand compliance of existing copy against a prompt template.
    BrandComplianceScore,
    /// Chainable: optimizes copy using a prior compliance-score run.
    BrandOptimization,
}

impl JobType {
    /// Whether this job type accepts a `chain` block in its brief.
    pub fn is_chainable(self) -> bool {
        matches!(self, Self::BrandOptimization)
    }

    /// Stable wire identifier, as it appears in a brief's `job_type` field.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InstagramCopy => "instagram_copy",
            Self::BrandComplianceScore => "brand_compliance_score",
            Self::BrandOptimization => "brand_optimization",
        }
    }
}

impl std::fmt::Display for JobType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Governance spec supplied by the caller. `job_id` is never generated by
/// the engine and is copied verbatim into the manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Brief {
    /// Governance-stable external identifier.
    pub job_id: String,
    /// Routes to a job body and a snapshot vocabulary.
    pub job_type: JobType,
    /// Brand identifier the doctrine and prompt are scoped to.
    pub brand: String,
    /// Generation-mode controls; defaulted when absent.
    #[serde(default)]
    pub generation: GenerationConfig,
    /// Context-retrieval controls.
    pub context: ContextRequest,
    /// Doctrine reference to resolve.
    pub doctrine: DoctrineRequest,
    /// Prompt template reference; required for `brand_compliance_score`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_template: Option<DoctrineRequest>,
    /// Chain-inputs block; required for chainable job types.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chain: Option<ChainInputRequest>,
}

/// One materialized input snapshot's on-disk record, as it appears under
/// `manifest.input_snapshots`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct InputSnapshotRef {
    /// Path to the snapshot file, relative to the run directory.
    pub path: String,
    /// `sha256:`-prefixed content hash of the file on disk.
    pub sha256: String,
    /// Size in bytes of the file on disk.
    pub bytes: u64,
}

/// `(doctrine_id, version, sha256, resolved_path?)`. `resolved_path`, when
/// present, is repository-relative POSIX — never absolute, never containing
/// `..`. `resolved_at` is tracked alongside but excluded from every hashed
/// or deterministic projection (see [`DoctrineResolution`]).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DoctrineReference {
    /// Doctrine identifier.
    pub doctrine_id: String,
    /// Doctrine version.
    pub version: String,
    /// `sha256:`-prefixed hash of the resolved file's contents.
    pub sha256: String,
    /// Repository-relative POSIX path the doctrine resolved to.
    pub resolved_path: String,
}

/// A [`DoctrineReference`] plus the volatile resolution timestamp, which
/// exists only in memory / the stored manifest form and never in a hashed
/// or deterministic projection.
#[derive(Debug, Clone, PartialEq)]
pub struct DoctrineResolution {
    /// The deterministic reference.
    pub reference: DoctrineReference,
    /// Wall-clock resolution time (stored form only).
    pub resolved_at: chrono::DateTime<chrono::Utc>,
    /// Resolved file content, for snapshotting.
    pub content: Vec<u8>,
}

/// One item selected by the context assembler's retrieval strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SelectedItem {
    /// Repository-relative path of the selected document.
    pub path: String,
    /// `sha256:`-prefixed content hash.
    pub sha256: String,
    /// Size in bytes.
    pub bytes: u64,
    /// BM25 score at selection time.
    pub score: f64,
}

/// The assembled, authoritative audit record for a job's context. The
/// engine never re-queries the filesystem to reproduce a retrieval — it
/// replays this snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "strategy", rename_all = "snake_case")]
pub enum ContextSpec {
    /// Ordered file concatenation.
    Glob {
        /// Selectors used to build `content`.
        selectors: Vec<crate::config::GlobSelector>,
        /// Concatenated content, each file preceded by `# FILE: <path>`.
        content: String,
        /// `sha256:`-prefixed hash of `content`.
        content_hash: String,
    },
    /// Deterministic BM25 retrieval.
    Retrieve {
        /// Original query string.
        query: String,
        /// Every parameter that affected the result, for audit.
        retrieval_config: serde_json::Value,
        /// Selected items, in final (score, path) order.
        selected_items: Vec<SelectedItem>,
    },
}

/// A prior run's manifest summary, as embedded in `prior_artifact.resolved.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PriorManifestSummary {
    /// Upstream `job_id`.
    pub job_id: String,
    /// Upstream `run_id`.
    pub run_id: String,
    /// Upstream `job_type`.
    pub job_type: JobType,
    /// Upstream `inputs_hash`.
    pub inputs_hash: String,
}

/// `{prior_run_id, prior_stage, required_outputs}` snapshotted to
/// `inputs/prior_artifact.resolved.json`, augmented with
/// `prior_output_hashes` and a summary of the prior manifest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PriorArtifactSnapshot {
    /// Upstream run id this run chains from.
    pub prior_run_id: String,
    /// Free-form label for the upstream stage.
    pub prior_stage: String,
    /// Upstream `job_id`, recovered while resolving the chain.
    pub prior_job_id: String,
    /// Summary of the upstream manifest.
    pub prior_manifest: PriorManifestSummary,
    /// Relative paths that were required to exist.
    pub required_outputs: Vec<String>,
    /// `relpath -> sha256` for every required output, computed from the
    /// bytes on disk at resolution time.
    pub prior_output_hashes: std::collections::BTreeMap<String, String>,
}
