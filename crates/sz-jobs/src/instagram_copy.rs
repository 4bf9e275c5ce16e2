//! `instagram_copy`: generates caption copy from a brief's context and
//! doctrine. Non-chainable; snapshot vocabulary is
//! `{brief, context, model_config, doctrine}`.

use crate::{JobBody, JobContext, JobOutput};
use sz_core::EngineError;

/// `instagram_copy` job body.
#[derive(Debug, Default, Clone, Copy)]
pub struct InstagramCopyJob;

impl JobBody for InstagramCopyJob {
    fn run(&self, ctx: &JobContext<'_>) -> Result<Vec<JobOutput>, EngineError> {
        let context_text = crate::context_text::render(ctx.repo_root, ctx.context_spec)?;
        let doctrine_text = String::from_utf8_lossy(&ctx.doctrine.content);

        let prompt = format!(
            "{doctrine_text}\n\n---\nBRAND: {brand}\n---\nCONTEXT:\n{context_text}\n",
            brand = ctx.brief.brand,
        );

        ctx.tracing.generation(
            "instagram_copy.generate",
            &[("job_id".to_string(), ctx.brief.job_id.clone())]
                .into_iter()
                .collect(),
        );
        let generated = ctx.llm.generate_text(&prompt, &ctx.brief.generation)?;

        let payload = serde_json::json!({
            "brand": ctx.brief.brand,
            "doctrine_id": ctx.doctrine.reference.doctrine_id,
            "doctrine_version": ctx.doctrine.reference.version,
            "generated_text": generated,
        });
        let bytes = sz_canon::canonical_json(&payload)
            .map_err(|e| EngineError::snapshot_io("outputs", format!("serialize captions: {e}")))?
            .into_bytes();

        Ok(vec![JobOutput {
            relpath: "outputs/captions.json".to_string(),
            bytes,
        }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockLlmClient, NoopTracingSink};
    use std::collections::BTreeMap;
    use sz_core::{Brief, ContextSpec, DoctrineResolution, GenerationConfig};

    fn sample_context() -> ContextSpec {
        ContextSpec::Glob {
            selectors: vec![],
            content: "# FILE: corpus/a.md\nbrand voice\n".into(),
            content_hash: "sha256:x".into(),
        }
    }

    fn sample_brief() -> Brief {
        serde_json::from_value(serde_json::json!({
            "job_id": "ig-test-001",
            "job_type": "instagram_copy",
            "brand": "SIGIL.ZERO",
            "context": {"strategy": "glob", "selectors": []},
            "doctrine": {"doctrine_id": "prompts/instagram_copy", "version": "1.0.0", "filename": "prompt.md"}
        }))
        .unwrap()
    }

    fn sample_doctrine() -> DoctrineResolution {
        DoctrineResolution {
            reference: sz_core::DoctrineReference {
                doctrine_id: "prompts/instagram_copy".into(),
                version: "1.0.0".into(),
                sha256: "sha256:abc".into(),
                resolved_path: "doctrine/prompts/instagram_copy/1.0.0/prompt.md".into(),
            },
            resolved_at: chrono::Utc::now(),
            content: b"Write warm, concise captions.\n".to_vec(),
        }
    }

    #[test]
    fn produces_one_captions_output_deterministically() {
        let dir = tempfile::tempdir().unwrap();
        let brief = sample_brief();
        let context_spec = sample_context();
        let doctrine = sample_doctrine();
        let llm = MockLlmClient;
        let tracing_sink = NoopTracingSink;

        let ctx = JobContext {
            repo_root: dir.path(),
            brief: &brief,
            context_spec: &context_spec,
            doctrine: &doctrine,
            prompt_template: None,
            prior_artifact: None,
            prior_output_contents: BTreeMap::new(),
            llm: &llm,
            tracing: &tracing_sink,
        };

        let job = InstagramCopyJob;
        let out1 = job.run(&ctx).unwrap();
        let out2 = job.run(&ctx).unwrap();
        assert_eq!(out1, out2);
        assert_eq!(out1.len(), 1);
        assert_eq!(out1[0].relpath, "outputs/captions.json");
    }

    #[test]
    fn varies_with_generation_config() {
        let dir = tempfile::tempdir().unwrap();
        let mut brief = sample_brief();
        let context_spec = sample_context();
        let doctrine = sample_doctrine();
        let llm = MockLlmClient;
        let tracing_sink = NoopTracingSink;

        let ctx_a = JobContext {
            repo_root: dir.path(),
            brief: &brief,
            context_spec: &context_spec,
            doctrine: &doctrine,
            prompt_template: None,
            prior_artifact: None,
            prior_output_contents: BTreeMap::new(),
            llm: &llm,
            tracing: &tracing_sink,
        };
        let out_a = InstagramCopyJob.run(&ctx_a).unwrap();

        brief.generation = GenerationConfig {
            temperature: 0.99,
            ..GenerationConfig::default()
        };
        let ctx_b = JobContext {
            repo_root: dir.path(),
            brief: &brief,
            context_spec: &context_spec,
            doctrine: &doctrine,
            prompt_template: None,
            prior_artifact: None,
            prior_output_contents: BTreeMap::new(),
            llm: &llm,
            tracing: &tracing_sink,
        };
        let out_b = InstagramCopyJob.run(&ctx_b).unwrap();

        assert_ne!(out_a, out_b);
    }
}
