//! Typed, closed-set configuration for brief-level controls.
//!
//! The brief's optional controls form a closed set per job type. Every
//! struct here rejects unknown keys
//! (`#[serde(deny_unknown_fields)]`) rather than silently dropping them —
//! a silent drop is a silent-drift vector into `inputs_hash`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

fn default_provider() -> String {
    "mock".to_string()
}

fn default_model() -> String {
    "sigilzero-default".to_string()
}

fn default_temperature() -> f64 {
    0.7
}

fn default_top_p() -> f64 {
    1.0
}

/// Generation-mode controls: provider/model selection and sampling
/// parameters passed to the opaque LLM interface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GenerationConfig {
    /// LLM provider identifier (opaque to the engine).
    #[serde(default = "default_provider")]
    pub provider: String,
    /// Model identifier.
    #[serde(default = "default_model")]
    pub model: String,
    /// Sampling temperature.
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Nucleus sampling parameter.
    #[serde(default = "default_top_p")]
    pub top_p: f64,
    /// Optional hard cap on generated tokens.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    /// Optional deterministic seed, when the provider supports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            temperature: default_temperature(),
            top_p: default_top_p(),
            max_output_tokens: None,
            seed: None,
        }
    }
}

fn default_max_files() -> usize {
    200
}

/// One glob-strategy selector: a root plus include/exclude patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct GlobSelector {
    /// Root directory, relative to `repo_root`, to walk.
    pub root: String,
    /// Include glob patterns (empty = match everything).
    #[serde(default)]
    pub include: Vec<String>,
    /// Exclude glob patterns, evaluated after includes.
    #[serde(default)]
    pub exclude: Vec<String>,
    /// Maximum number of files this selector contributes.
    #[serde(default = "default_max_files")]
    pub max_files: usize,
}

fn default_roots() -> Vec<String> {
    vec!["corpus".to_string()]
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.md".to_string(), "**/*.txt".to_string()]
}

fn default_top_k() -> usize {
    5
}

/// Context-retrieval controls as supplied by the brief. Either a list of
/// glob selectors (deterministic file concatenation) or deterministic BM25
/// retrieval parameters; never both.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "strategy", rename_all = "snake_case", deny_unknown_fields)]
pub enum ContextRequest {
    /// Ordered file concatenation over one or more glob selectors.
    Glob {
        /// Selectors, applied in declared order.
        selectors: Vec<GlobSelector>,
    },
    /// Deterministic BM25 keyword retrieval over a corpus.
    Retrieve {
        /// Free-text query; tokenized deterministically.
        query: String,
        /// Number of top-scoring documents to keep.
        #[serde(default = "default_top_k")]
        top_k: usize,
        /// Root directories to search.
        #[serde(default = "default_roots")]
        roots: Vec<String>,
        /// Include glob patterns.
        #[serde(default = "default_include_globs")]
        include: Vec<String>,
        /// Exclude glob patterns.
        #[serde(default)]
        exclude: Vec<String>,
        /// Maximum candidate files considered before scoring.
        #[serde(default = "default_max_files")]
        max_files: usize,
    },
}

/// Doctrine reference as requested by the brief, before resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct DoctrineRequest {
    /// Closed-set doctrine identifier (see `sz_doctrine::ALLOWED_DOCTRINE_IDS`).
    pub doctrine_id: String,
    /// Semantic version of the doctrine document.
    pub version: String,
    /// Filename within the resolved doctrine directory.
    pub filename: String,
}

/// Chain-inputs block: present only for chainable job types.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ChainInputRequest {
    /// `run_id` of the upstream run to chain from.
    pub prior_run_id: String,
    /// Free-form label for the upstream stage (e.g. `"compliance_score"`).
    pub prior_stage: String,
    /// Relative paths under the upstream run's `outputs/` that must exist
    /// and participate in this run's `inputs_hash`.
    pub required_outputs: Vec<String>,
}
