//! Glob strategy: ordered file concatenation.

use sz_core::{EngineError, GlobSelector};
use sz_glob::IncludeExcludeGlobs;
use std::collections::BTreeSet;
use std::path::Path;
use walkdir::WalkDir;

/// Result of running the glob strategy: the concatenated content and its hash.
pub struct GlobAssembly {
    /// Concatenated content, each file preceded by `# FILE: <path>`.
    pub content: String,
    /// `sha256:`-prefixed hash of `content`.
    pub content_hash: String,
}

/// Walk each selector's root, match include/exclude globs, dedupe by
/// resolved repo-relative path, stable-sort lexicographically, truncate to
/// `max_files`, and concatenate with a `# FILE: <repo-relative>` header
/// between entries.
pub fn assemble(repo_root: &Path, selectors: &[GlobSelector]) -> Result<GlobAssembly, EngineError> {
    let mut seen = BTreeSet::new();
    let mut selected: Vec<String> = Vec::new();

    for selector in selectors {
        let root_path = repo_root.join(&selector.root);
        if !root_path.is_dir() {
            continue;
        }

        let rules = IncludeExcludeGlobs::new(&selector.include, &selector.exclude).map_err(|e| {
            EngineError::snapshot_io("context", format!("compile glob selector: {e}"))
        })?;

        let mut matched: Vec<String> = Vec::new();
        for entry in WalkDir::new(&root_path).sort_by_file_name() {
            let entry = entry
                .map_err(|e| EngineError::snapshot_io("context", format!("walk {}: {e}", selector.root)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let rel_to_root = entry.path().strip_prefix(&root_path).unwrap_or(entry.path());
            if !rules.decide_path(rel_to_root).is_allowed() {
                continue;
            }
            let rel_to_repo = entry
                .path()
                .strip_prefix(repo_root)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .replace('\\', "/");
            if seen.contains(&rel_to_repo) {
                continue;
            }
            seen.insert(rel_to_repo.clone());
            matched.push(rel_to_repo);
            if matched.len() >= selector.max_files {
                break;
            }
        }
        matched.sort();
        selected.extend(matched);
    }

    let mut content = String::new();
    for (i, rel) in selected.iter().enumerate() {
        if i > 0 {
            content.push('\n');
        }
        content.push_str(&format!("# FILE: {rel}\n"));
        let bytes = std::fs::read(repo_root.join(rel))
            .map_err(|e| EngineError::snapshot_io("context", format!("read {rel}: {e}")))?;
        content.push_str(&String::from_utf8_lossy(&bytes));
        if !content.ends_with('\n') {
            content.push('\n');
        }
    }

    let content_hash = sz_canon::sha256_prefixed(content.as_bytes());
    Ok(GlobAssembly { content, content_hash })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, contents: &str) {
        let p = root.join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, contents).unwrap();
    }

    #[test]
    fn concatenates_in_lexicographic_order_with_headers() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "corpus/b.md", "second\n");
        write(dir.path(), "corpus/a.md", "first\n");

        let selectors = vec![GlobSelector {
            root: "corpus".into(),
            include: vec!["**/*.md".into()],
            exclude: vec![],
            max_files: 10,
        }];
        let result = assemble(dir.path(), &selectors).unwrap();
        let a_pos = result.content.find("a.md").unwrap();
        let b_pos = result.content.find("b.md").unwrap();
        assert!(a_pos < b_pos);
        assert!(result.content.contains("# FILE: corpus/a.md"));
    }

    #[test]
    fn truncates_to_max_files() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            write(dir.path(), &format!("corpus/{i}.md"), "x\n");
        }
        let selectors = vec![GlobSelector {
            root: "corpus".into(),
            include: vec!["**/*.md".into()],
            exclude: vec![],
            max_files: 2,
        }];
        let result = assemble(dir.path(), &selectors).unwrap();
        assert_eq!(result.content.matches("# FILE:").count(), 2);
    }

    #[test]
    fn deterministic_hash_across_runs() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "corpus/a.md", "hello\n");
        let selectors = vec![GlobSelector {
            root: "corpus".into(),
            include: vec!["**/*.md".into()],
            exclude: vec![],
            max_files: 10,
        }];
        let r1 = assemble(dir.path(), &selectors).unwrap();
        let r2 = assemble(dir.path(), &selectors).unwrap();
        assert_eq!(r1.content_hash, r2.content_hash);
    }
}
