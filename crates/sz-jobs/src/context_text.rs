//! Render an assembled [`ContextSpec`] back into prompt-ready text.
//!
//! For the glob strategy this is just the already-concatenated `content`.
//! For retrieval, the snapshot's `selected_items` is the authoritative
//! list of *which* files were selected — re-reading their bytes here to
//! build a prompt is not "re-querying the corpus to reproduce a
//! retrieval" (that would mean re-running BM25 and getting a different
//! selection); it is reading files the selection already named.

use sz_core::{ContextSpec, EngineError};
use std::path::Path;

/// Render `spec` into the text block a job body splices into its prompt.
pub fn render(repo_root: &Path, spec: &ContextSpec) -> Result<String, EngineError> {
    match spec {
        ContextSpec::Glob { content, .. } => Ok(content.clone()),
        ContextSpec::Retrieve { selected_items, .. } => {
            let mut out = String::new();
            for item in selected_items {
                let bytes = std::fs::read(repo_root.join(&item.path))
                    .map_err(|e| EngineError::snapshot_io("context", format!("read {}: {e}", item.path)))?;
                out.push_str(&format!("# FILE: {} (score={:.4})\n", item.path, item.score));
                out.push_str(&String::from_utf8_lossy(&bytes));
                if !out.ends_with('\n') {
                    out.push('\n');
                }
                out.push('\n');
            }
            Ok(out)
        }
    }
}
