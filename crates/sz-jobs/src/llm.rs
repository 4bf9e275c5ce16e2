//! The opaque LLM collaborator. The engine
//! treats the generator as a text-in, text-out black box; any failure
//! surfaces to the caller as [`EngineError::BodyFailure`].

use sz_core::{EngineError, GenerationConfig};

/// `generate_text(prompt, spec) -> string`, consumed by every job body.
/// Implementations are free to call out to a real provider; the engine
/// never inspects `spec` beyond passing it through.
pub trait LlmClient: Send + Sync {
    /// Generate text for `prompt` under the sampling parameters in `spec`.
    /// Any failure (timeout, provider error, malformed response) must be
    /// surfaced as [`EngineError::BodyFailure`] — the engine has no
    /// special-case handling for LLM failures beyond that.
    fn generate_text(&self, prompt: &str, spec: &GenerationConfig) -> Result<String, EngineError>;
}

/// A deterministic, network-free [`LlmClient`] used for local development
/// and tests. Mirrors the prototype's local-first fallback (`model.py`'s
/// "`OPENAI_API_KEY` not set" stub): rather than a fixed string, the
/// output is derived from a hash of the prompt and sampling parameters, so
/// varying any upstream snapshot still varies the job body's output —
/// this keeps the no-silent-drift property
/// exercisable without a live provider.
#[derive(Debug, Default, Clone, Copy)]
pub struct MockLlmClient;

impl LlmClient for MockLlmClient {
    fn generate_text(&self, prompt: &str, spec: &GenerationConfig) -> Result<String, EngineError> {
        let mut seed_input = prompt.to_string();
        seed_input.push('\0');
        seed_input.push_str(&spec.provider);
        seed_input.push('\0');
        seed_input.push_str(&spec.model);
        seed_input.push('\0');
        seed_input.push_str(&spec.temperature.to_string());
        let digest = sz_canon::sha256_hex(seed_input.as_bytes());
        Ok(format!(
            "mock-generation:{}:{}",
            &digest[..16],
            spec.model
        ))
    }
}
