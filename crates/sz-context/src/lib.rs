// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Context assembler: glob concatenation and deterministic BM25 retrieval,
//! each producing an authoritative, replayable audit record.

mod glob_strategy;
mod retrieve_strategy;

use sz_core::{ContextRequest, ContextSpec, EngineError};
use std::path::Path;

/// Assemble a [`ContextSpec`] from a brief's [`ContextRequest`], running
/// whichever strategy the request names.
pub fn assemble(repo_root: &Path, request: &ContextRequest) -> Result<ContextSpec, EngineError> {
    match request {
        ContextRequest::Glob { selectors } => {
            let result = glob_strategy::assemble(repo_root, selectors)?;
            Ok(ContextSpec::Glob {
                selectors: selectors.clone(),
                content: result.content,
                content_hash: result.content_hash,
            })
        }
        ContextRequest::Retrieve {
            query,
            top_k,
            roots,
            include,
            exclude,
            max_files,
        } => {
            let result = retrieve_strategy::assemble(
                repo_root, query, *top_k, roots, include, exclude, *max_files,
            )?;
            Ok(ContextSpec::Retrieve {
                query: query.clone(),
                retrieval_config: result.retrieval_config,
                selected_items: result.selected_items,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sz_core::GlobSelector;

    #[test]
    fn glob_request_routes_to_glob_strategy() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("corpus")).unwrap();
        std::fs::write(dir.path().join("corpus/a.md"), "hi\n").unwrap();

        let request = ContextRequest::Glob {
            selectors: vec![GlobSelector {
                root: "corpus".into(),
                include: vec!["**/*.md".into()],
                exclude: vec![],
                max_files: 10,
            }],
        };
        match assemble(dir.path(), &request).unwrap() {
            ContextSpec::Glob { content, .. } => assert!(content.contains("corpus/a.md")),
            _ => panic!("expected Glob"),
        }
    }

    #[test]
    fn retrieve_request_routes_to_retrieve_strategy() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("corpus")).unwrap();
        std::fs::write(dir.path().join("corpus/a.md"), "brand voice\n").unwrap();

        let request = ContextRequest::Retrieve {
            query: "brand".into(),
            top_k: 5,
            roots: vec!["corpus".into()],
            include: vec!["**/*.md".into()],
            exclude: vec![],
            max_files: 200,
        };
        match assemble(dir.path(), &request).unwrap() {
            ContextSpec::Retrieve { selected_items, .. } => assert_eq!(selected_items.len(), 1),
            _ => panic!("expected Retrieve"),
        }
    }
}
