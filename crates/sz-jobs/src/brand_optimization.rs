//! `brand_optimization`: chainable job type. Rewrites copy using the
//! compliance score produced by an upstream `brand_compliance_score` run.
//! Its `prior_artifact` requires `outputs/compliance_scores.json`.

use crate::{JobBody, JobContext, JobOutput};
use sz_core::EngineError;

/// `brand_optimization` job body.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrandOptimizationJob;

const REQUIRED_PRIOR_OUTPUT: &str = "outputs/compliance_scores.json";

impl JobBody for BrandOptimizationJob {
    fn run(&self, ctx: &JobContext<'_>) -> Result<Vec<JobOutput>, EngineError> {
        let prior = ctx
            .prior_artifact
            .ok_or_else(|| EngineError::PriorArtifactMissing {
                message: "brand_optimization requires a resolved prior_artifact".to_string(),
            })?;
        let prior_bytes = ctx
            .prior_output_contents
            .get(REQUIRED_PRIOR_OUTPUT)
            .ok_or_else(|| EngineError::PriorArtifactMissing {
                message: format!("prior output '{REQUIRED_PRIOR_OUTPUT}' not loaded"),
            })?;
        let prior_score: serde_json::Value = serde_json::from_slice(prior_bytes)
            .map_err(|e| EngineError::PriorArtifactMissing {
                message: format!("prior compliance score is not valid JSON: {e}"),
            })?;

        let context_text = crate::context_text::render(ctx.repo_root, ctx.context_spec)?;
        let doctrine_text = String::from_utf8_lossy(&ctx.doctrine.content);

        let prompt = format!(
            "{doctrine_text}\n\n---\nBRAND: {brand}\n---\nPRIOR COMPLIANCE SCORE:\n{prior_score}\n---\nCONTEXT:\n{context_text}\n",
            brand = ctx.brief.brand,
            prior_score = serde_json::to_string(&prior_score).unwrap_or_default(),
        );

        ctx.tracing.generation(
            "brand_optimization.generate",
            &[("job_id".to_string(), ctx.brief.job_id.clone())]
                .into_iter()
                .collect(),
        );
        let generated = ctx.llm.generate_text(&prompt, &ctx.brief.generation)?;

        let payload = serde_json::json!({
            "brand": ctx.brief.brand,
            "doctrine_id": ctx.doctrine.reference.doctrine_id,
            "doctrine_version": ctx.doctrine.reference.version,
            "prior_run_id": prior.prior_run_id,
            "prior_stage": prior.prior_stage,
            "prior_compliance_score": prior_score,
            "optimized_text": generated,
        });
        let bytes = sz_canon::canonical_json(&payload)
            .map_err(|e| EngineError::snapshot_io("outputs", format!("serialize optimized copy: {e}")))?
            .into_bytes();

        Ok(vec![JobOutput {
            relpath: "outputs/optimized_copy.json".to_string(),
            bytes,
        }])
    }
}
