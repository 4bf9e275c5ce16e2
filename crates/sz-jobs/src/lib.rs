// SPDX-License-Identifier: MIT OR Apache-2.0
#![warn(missing_docs)]
//! Job-type bodies and the opaque LLM/tracing collaborator traits they
//! call through. A job body is pure with respect to everything except its
//! [`LlmClient`]: given the same [`JobContext`], the same collaborator
//! responses, and the same brief, it must produce byte-identical
//! [`JobOutput`]s. Prompt *quality* is out of scope here — these bodies
//! assemble deterministic prompts and persist whatever comes back.

mod brand_compliance_score;
mod brand_optimization;
mod context_text;
mod instagram_copy;
mod llm;
mod tracing_sink;

pub use brand_compliance_score::BrandComplianceScoreJob;
pub use brand_optimization::BrandOptimizationJob;
pub use instagram_copy::InstagramCopyJob;
pub use llm::{LlmClient, MockLlmClient};
pub use tracing_sink::{LogTracingSink, NoopTracingSink, TracingSink};

use std::collections::BTreeMap;
use std::path::Path;
use sz_core::{Brief, ContextSpec, DoctrineResolution, EngineError, JobType, PriorArtifactSnapshot};

/// Everything a job body needs to run, borrowed for the duration of one
/// invocation. Holds no mutable state; a body reads from this and returns
/// its outputs.
pub struct JobContext<'a> {
    /// Repository root, for re-reading files named by a retrieval snapshot.
    pub repo_root: &'a Path,
    /// The brief driving this run.
    pub brief: &'a Brief,
    /// The already-assembled, already-snapshotted context.
    pub context_spec: &'a ContextSpec,
    /// The resolved doctrine.
    pub doctrine: &'a DoctrineResolution,
    /// The resolved prompt template, when the brief carries one.
    pub prompt_template: Option<&'a DoctrineResolution>,
    /// The resolved chain input, when this job type is chainable.
    pub prior_artifact: Option<&'a PriorArtifactSnapshot>,
    /// Bytes of every `prior_artifact.required_outputs` entry, keyed by
    /// relative path, read once by the caller before the body runs.
    pub prior_output_contents: BTreeMap<String, Vec<u8>>,
    /// The opaque LLM collaborator.
    pub llm: &'a dyn LlmClient,
    /// The opaque tracing collaborator.
    pub tracing: &'a dyn TracingSink,
}

/// One output file a job body wants written under the run's `outputs/`
/// directory, as a pair of (path relative to the run dir, bytes).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobOutput {
    /// Path relative to the run directory, e.g. `"outputs/captions.json"`.
    pub relpath: String,
    /// Exact bytes to write; never re-encoded by the caller.
    pub bytes: Vec<u8>,
}

/// A job type's behavior: assemble a prompt from `ctx`, call out to the
/// LLM collaborator, and return the output files to persist.
pub trait JobBody {
    /// Run this job body to completion. Any failure — LLM error, missing
    /// collaborator input, malformed prior artifact — must return
    /// [`EngineError`]; the caller is responsible for turning a
    /// [`EngineError::BodyFailure`] into a `failed` manifest rather than
    /// aborting the run.
    fn run(&self, ctx: &JobContext<'_>) -> Result<Vec<JobOutput>, EngineError>;
}

/// Resolve `job_type` to its job body implementation.
pub fn job_body(job_type: JobType) -> Box<dyn JobBody> {
    match job_type {
        JobType::InstagramCopy => Box::new(InstagramCopyJob),
        JobType::BrandComplianceScore => Box::new(BrandComplianceScoreJob),
        JobType::BrandOptimization => Box::new(BrandOptimizationJob),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_body_registry_covers_every_job_type() {
        for jt in [
            JobType::InstagramCopy,
            JobType::BrandComplianceScore,
            JobType::BrandOptimization,
        ] {
            let _body = job_body(jt);
        }
    }
}
