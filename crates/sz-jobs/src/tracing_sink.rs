//! The optional tracing sink. Every
//! call is best-effort: a tracing failure must never propagate into the
//! run path, and the sink must only be invoked once a `run_id` exists.

use std::collections::BTreeMap;

/// `trace`/`span`/`generation` operations, all best-effort. Implementors
/// must swallow their own errors — there is no `Result` return precisely
/// so a failing sink cannot fail a run.
pub trait TracingSink: Send + Sync {
    /// Record a top-level trace for a run.
    fn trace(&self, name: &str, attrs: &BTreeMap<String, String>);
    /// Record a span within a run's trace.
    fn span(&self, name: &str, attrs: &BTreeMap<String, String>);
    /// Record one LLM generation call within a run's trace.
    fn generation(&self, name: &str, attrs: &BTreeMap<String, String>);
}

/// A sink that discards everything. The default when no tracing
/// collaborator is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTracingSink;

impl TracingSink for NoopTracingSink {
    fn trace(&self, _name: &str, _attrs: &BTreeMap<String, String>) {}
    fn span(&self, _name: &str, _attrs: &BTreeMap<String, String>) {}
    fn generation(&self, _name: &str, _attrs: &BTreeMap<String, String>) {}
}

/// A sink that emits `tracing::debug!` events, for local development
/// without a real tracing backend configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogTracingSink;

impl TracingSink for LogTracingSink {
    fn trace(&self, name: &str, attrs: &BTreeMap<String, String>) {
        tracing::debug!(target: "sigilzero.trace", kind = "trace", name, ?attrs);
    }
    fn span(&self, name: &str, attrs: &BTreeMap<String, String>) {
        tracing::debug!(target: "sigilzero.trace", kind = "span", name, ?attrs);
    }
    fn generation(&self, name: &str, attrs: &BTreeMap<String, String>) {
        tracing::debug!(target: "sigilzero.trace", kind = "generation", name, ?attrs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_sink_accepts_any_call_without_panicking() {
        let sink = NoopTracingSink;
        let attrs = BTreeMap::new();
        sink.trace("run_header", &attrs);
        sink.span("assemble_context", &attrs);
        sink.generation("llm_call", &attrs);
    }
}
