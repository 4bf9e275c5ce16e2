//! `brand_compliance_score`: scores existing copy against a prompt
//! template and doctrine. Snapshot vocabulary adds `prompt_template` to
//! the base set. Its `outputs/compliance_scores.json` is the
//! `required_outputs` entry `brand_optimization` chains on.

use crate::{JobBody, JobContext, JobOutput};
use sz_core::EngineError;

/// `brand_compliance_score` job body.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrandComplianceScoreJob;

/// Deterministic compliance score in `[0, 100]`, derived from the content
/// hash of the rendered context — a stand-in for a real scoring model
/// that keeps the score reproducible without a live provider.
fn deterministic_score(seed: &str) -> f64 {
    let digest = sz_canon::sha256_hex(seed.as_bytes());
    let first_byte = u8::from_str_radix(&digest[0..2], 16).unwrap_or(0);
    (first_byte as f64 / 255.0 * 100.0 * 100.0).round() / 100.0
}

impl JobBody for BrandComplianceScoreJob {
    fn run(&self, ctx: &JobContext<'_>) -> Result<Vec<JobOutput>, EngineError> {
        let prompt_template = ctx.prompt_template.ok_or_else(|| EngineError::BriefInvalid {
            message: "brand_compliance_score requires prompt_template".to_string(),
        })?;

        let context_text = crate::context_text::render(ctx.repo_root, ctx.context_spec)?;
        let doctrine_text = String::from_utf8_lossy(&ctx.doctrine.content);
        let template_text = String::from_utf8_lossy(&prompt_template.content);

        let prompt = format!(
            "{template_text}\n\n---\nDOCTRINE:\n{doctrine_text}\n---\nBRAND: {brand}\n---\nCONTEXT:\n{context_text}\n",
            brand = ctx.brief.brand,
        );

        ctx.tracing.generation(
            "brand_compliance_score.generate",
            &[("job_id".to_string(), ctx.brief.job_id.clone())]
                .into_iter()
                .collect(),
        );
        let notes = ctx.llm.generate_text(&prompt, &ctx.brief.generation)?;
        let score = deterministic_score(&context_text);

        let payload = serde_json::json!({
            "brand": ctx.brief.brand,
            "score": score,
            "scale": {"min": 0, "max": 100},
            "doctrine_id": ctx.doctrine.reference.doctrine_id,
            "prompt_template_id": prompt_template.reference.doctrine_id,
            "notes": notes,
        });
        let bytes = sz_canon::canonical_json(&payload)
            .map_err(|e| EngineError::snapshot_io("outputs", format!("serialize compliance score: {e}")))?
            .into_bytes();

        Ok(vec![JobOutput {
            relpath: "outputs/compliance_scores.json".to_string(),
            bytes,
        }])
    }
}
