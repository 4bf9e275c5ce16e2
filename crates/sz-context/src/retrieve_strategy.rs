//! Deterministic BM25 retrieval strategy ("Retrieve" context strategy).

use serde_json::json;
use sz_core::{EngineError, SelectedItem};
use sz_glob::IncludeExcludeGlobs;
use std::collections::HashMap;
use walkdir::WalkDir;

const K1: f64 = 1.5;
const B: f64 = 0.75;

/// Deterministic tokenization: lowercase, split on non-`[a-z0-9]`, drop
/// empty tokens.
fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    lower
        .split(|c: char| !(c.is_ascii_alphanumeric()))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

struct Candidate {
    path: String,
    sha256: String,
    size_bytes: u64,
    tokens: Vec<String>,
    score: f64,
}

fn bm25_score(
    query_tokens: &[String],
    doc_tokens: &[String],
    doc_freq: &HashMap<String, usize>,
    num_docs: usize,
    avg_doc_length: f64,
) -> f64 {
    let doc_length = doc_tokens.len() as f64;
    let mut term_freq: HashMap<&str, usize> = HashMap::new();
    for t in doc_tokens {
        *term_freq.entry(t.as_str()).or_insert(0) += 1;
    }

    let mut unique_query: Vec<&String> = Vec::new();
    for t in query_tokens {
        if !unique_query.contains(&t) {
            unique_query.push(t);
        }
    }

    let mut score = 0.0;
    for term in unique_query {
        let tf = match term_freq.get(term.as_str()) {
            Some(&tf) => tf as f64,
            None => continue,
        };
        let df = match doc_freq.get(term) {
            Some(&df) if df > 0 => df as f64,
            _ => continue,
        };
        let idf = ((num_docs as f64 - df + 0.5) / (df + 0.5) + 1.0).ln();
        let norm_tf = tf / (tf + K1 * (1.0 - B + B * doc_length / avg_doc_length));
        score += idf * norm_tf;
    }
    score
}

/// Result of running the retrieval strategy.
pub struct RetrieveAssembly {
    /// Selected items, already in final `(-score, path)` order, truncated
    /// to `top_k`.
    pub selected_items: Vec<SelectedItem>,
    /// Every parameter that affected the result, for audit.
    pub retrieval_config: serde_json::Value,
}

/// Retrieve the top-`top_k` documents for `query` using deterministic BM25
/// scoring over files found under `roots`.
#[allow(clippy::too_many_arguments)]
pub fn assemble(
    repo_root: &std::path::Path,
    query: &str,
    top_k: usize,
    roots: &[String],
    include: &[String],
    exclude: &[String],
    max_files: usize,
) -> Result<RetrieveAssembly, EngineError> {
    let rules = IncludeExcludeGlobs::new(include, exclude)
        .map_err(|e| EngineError::snapshot_io("context", format!("compile retrieval globs: {e}")))?;

    let mut candidates: Vec<Candidate> = Vec::new();
    let mut seen = std::collections::BTreeSet::new();

    'roots: for root in roots {
        let root_path = repo_root.join(root);
        if !root_path.is_dir() {
            continue;
        }
        for entry in WalkDir::new(&root_path).sort_by_file_name() {
            let entry = entry
                .map_err(|e| EngineError::snapshot_io("context", format!("walk {root}: {e}")))?;
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

            let Ok(bytes) = std::fs::read(entry.path()) else {
                continue;
            };
            let content = String::from_utf8_lossy(&bytes).into_owned();
            let sha256 = sz_canon::sha256_prefixed(content.as_bytes());
            let tokens = tokenize(&content);

            candidates.push(Candidate {
                path: rel_to_repo,
                sha256,
                size_bytes: content.len() as u64,
                tokens,
                score: 0.0,
            });

            if candidates.len() >= max_files {
                break 'roots;
            }
        }
    }

    let retrieval_config = json!({
        "method": "keyword",
        "query": query,
        "top_k": top_k,
        "roots": roots,
        "include_globs": include,
        "exclude_globs": exclude,
        "max_files": max_files,
        "num_candidates": candidates.len(),
        "tokenization": "lowercase_alphanumeric",
        "scoring": "bm25",
        "bm25_k1": K1,
        "bm25_b": B,
    });

    if candidates.is_empty() {
        return Ok(RetrieveAssembly {
            selected_items: Vec::new(),
            retrieval_config,
        });
    }

    let query_tokens = tokenize(query);
    let mut doc_freq: HashMap<String, usize> = HashMap::new();
    let mut total_len = 0usize;
    for c in &candidates {
        total_len += c.tokens.len();
        let mut unique: Vec<&String> = Vec::new();
        for t in &c.tokens {
            if !unique.contains(&t) {
                unique.push(t);
            }
        }
        for t in unique {
            *doc_freq.entry(t.clone()).or_insert(0) += 1;
        }
    }
    let num_docs = candidates.len();
    let avg_doc_length = total_len as f64 / num_docs as f64;

    for c in &mut candidates {
        c.score = bm25_score(&query_tokens, &c.tokens, &doc_freq, num_docs, avg_doc_length);
    }

    candidates.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.path.cmp(&b.path))
    });

    let selected_items = candidates
        .into_iter()
        .take(top_k)
        .map(|c| SelectedItem {
            path: c.path,
            sha256: c.sha256,
            bytes: c.size_bytes,
            score: c.score,
        })
        .collect();

    Ok(RetrieveAssembly {
        selected_items,
        retrieval_config,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &std::path::Path, rel: &str, contents: &str) {
        let p = root.join(rel);
        std::fs::create_dir_all(p.parent().unwrap()).unwrap();
        std::fs::write(p, contents).unwrap();
    }

    #[test]
    fn tokenizes_lowercase_alphanumeric_only() {
        assert_eq!(
            tokenize("Brand-Voice: Playful!! 2024"),
            vec!["brand", "voice", "playful", "2024"]
        );
    }

    #[test]
    fn scores_higher_relevance_above_lower() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "corpus/a.md", "brand voice playful playful playful\n");
        write(dir.path(), "corpus/b.md", "unrelated filler content about weather\n");

        let result = assemble(
            dir.path(),
            "brand voice",
            5,
            &["corpus".to_string()],
            &["**/*.md".to_string()],
            &[],
            200,
        )
        .unwrap();

        assert_eq!(result.selected_items[0].path, "corpus/a.md");
        assert!(result.selected_items[0].score > result.selected_items[1].score);
    }

    #[test]
    fn tie_breaks_by_path_ascending() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "corpus/b.md", "nothing relevant\n");
        write(dir.path(), "corpus/a.md", "nothing relevant\n");

        let result = assemble(
            dir.path(),
            "zzzz",
            5,
            &["corpus".to_string()],
            &["**/*.md".to_string()],
            &[],
            200,
        )
        .unwrap();

        assert_eq!(result.selected_items[0].path, "corpus/a.md");
        assert_eq!(result.selected_items[1].path, "corpus/b.md");
    }

    #[test]
    fn truncates_to_top_k() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..5 {
            write(dir.path(), &format!("corpus/{i}.md"), "brand voice text\n");
        }
        let result = assemble(
            dir.path(),
            "brand",
            2,
            &["corpus".to_string()],
            &["**/*.md".to_string()],
            &[],
            200,
        )
        .unwrap();
        assert_eq!(result.selected_items.len(), 2);
    }

    #[test]
    fn empty_corpus_returns_empty_selection() {
        let dir = tempfile::tempdir().unwrap();
        let result = assemble(
            dir.path(),
            "brand",
            5,
            &["corpus".to_string()],
            &["**/*.md".to_string()],
            &[],
            200,
        )
        .unwrap();
        assert!(result.selected_items.is_empty());
        assert_eq!(result.retrieval_config["num_candidates"], 0);
    }
}
