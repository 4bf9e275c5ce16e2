// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Doctrine loader.
//!
//! Accepts `(doctrine_id, version, filename)`, rejects unknown ids or unsafe
//! path components, and resolves under a single configured canonical root —
//! the earlier prototype's multi-root probing loop is deliberately not
//! carried forward.

use sz_core::{DoctrineReference, DoctrineResolution, EngineError};
use std::path::{Path, PathBuf};

/// The closed set of doctrine identifiers the engine will resolve. One per
/// job type that consumes doctrine directly as a prompt template.
pub const ALLOWED_DOCTRINE_IDS: &[&str] = &[
    "prompts/instagram_copy",
    "prompts/brand_compliance_score",
    "prompts/brand_optimization",
];

/// Resolves doctrine references under a single canonical root.
pub struct DoctrineLoader {
    repo_root: PathBuf,
    /// Doctrine root, relative to `repo_root` (e.g. `"doctrine"`).
    doctrine_root_rel: String,
}

impl DoctrineLoader {
    /// Bind a loader to `repo_root`, resolving doctrine under
    /// `repo_root.join(doctrine_root_rel)`.
    pub fn new(repo_root: impl Into<PathBuf>, doctrine_root_rel: impl Into<String>) -> Self {
        Self {
            repo_root: repo_root.into(),
            doctrine_root_rel: doctrine_root_rel.into(),
        }
    }

    /// Resolve `(doctrine_id, version, filename)` to content plus a
    /// [`DoctrineResolution`]. Fails with [`EngineError::DoctrineUnsafe`] if
    /// any component contains a path separator or `..`, or if `doctrine_id`
    /// is not in [`ALLOWED_DOCTRINE_IDS`]. Fails with
    /// [`EngineError::DoctrineNotFound`] if the resolved path does not exist.
    pub fn resolve(
        &self,
        doctrine_id: &str,
        version: &str,
        filename: &str,
    ) -> Result<DoctrineResolution, EngineError> {
        if !ALLOWED_DOCTRINE_IDS.contains(&doctrine_id) {
            return Err(EngineError::DoctrineUnsafe {
                message: format!("doctrine_id '{doctrine_id}' is not in the allow-list"),
            });
        }
        require_safe_component("version", version)?;
        require_safe_component("filename", filename)?;

        let doctrine_root = self.repo_root.join(&self.doctrine_root_rel);
        let abs_path = doctrine_root.join(doctrine_id).join(version).join(filename);

        if !abs_path.is_file() {
            return Err(EngineError::DoctrineNotFound {
                doctrine_id: doctrine_id.to_string(),
                version: version.to_string(),
            });
        }

        let content = std::fs::read(&abs_path).map_err(|e| EngineError::DoctrineNotFound {
            doctrine_id: doctrine_id.to_string(),
            version: format!("{version} (read failed: {e})"),
        })?;

        let sha256 = sz_canon::sha256_prefixed(&content);
        let resolved_path = repo_relative_posix(&self.repo_root, &abs_path)?;

        Ok(DoctrineResolution {
            reference: DoctrineReference {
                doctrine_id: doctrine_id.to_string(),
                version: version.to_string(),
                sha256,
                resolved_path,
            },
            resolved_at: chrono::Utc::now(),
            content,
        })
    }
}

fn require_safe_component(label: &str, value: &str) -> Result<(), EngineError> {
    if value.is_empty()
        || value.contains('/')
        || value.contains('\\')
        || value.split('/').any(|seg| seg == "..")
        || value == ".."
    {
        return Err(EngineError::DoctrineUnsafe {
            message: format!("{label} '{value}' contains an unsafe path component"),
        });
    }
    Ok(())
}

fn repo_relative_posix(repo_root: &Path, abs_path: &Path) -> Result<String, EngineError> {
    let rel = abs_path
        .strip_prefix(repo_root)
        .map_err(|_| EngineError::DoctrineUnsafe {
            message: format!("resolved path escapes repo_root: {}", abs_path.display()),
        })?;
    let posix = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/");
    Ok(posix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        let doc_dir = dir.path().join("doctrine/prompts/instagram_copy/1.0.0");
        std::fs::create_dir_all(&doc_dir).unwrap();
        std::fs::write(doc_dir.join("prompt.md"), b"Write warm, concise captions.\n").unwrap();
        dir
    }

    #[test]
    fn resolves_known_doctrine() {
        let dir = setup();
        let loader = DoctrineLoader::new(dir.path(), "doctrine");
        let resolution = loader
            .resolve("prompts/instagram_copy", "1.0.0", "prompt.md")
            .unwrap();
        assert_eq!(
            resolution.reference.resolved_path,
            "doctrine/prompts/instagram_copy/1.0.0/prompt.md"
        );
        assert_eq!(
            resolution.reference.sha256,
            sz_canon::sha256_prefixed(b"Write warm, concise captions.\n")
        );
    }

    #[test]
    fn rejects_unknown_doctrine_id() {
        let dir = setup();
        let loader = DoctrineLoader::new(dir.path(), "doctrine");
        let err = loader.resolve("prompts/unknown", "1.0.0", "prompt.md").unwrap_err();
        assert_eq!(err.code(), sz_core::ErrorCode::DoctrineUnsafe);
    }

    #[test]
    fn rejects_path_traversal_in_version() {
        let dir = setup();
        let loader = DoctrineLoader::new(dir.path(), "doctrine");
        let err = loader
            .resolve("prompts/instagram_copy", "../../etc", "prompt.md")
            .unwrap_err();
        assert_eq!(err.code(), sz_core::ErrorCode::DoctrineUnsafe);
    }

    #[test]
    fn rejects_path_separator_in_filename() {
        let dir = setup();
        let loader = DoctrineLoader::new(dir.path(), "doctrine");
        let err = loader
            .resolve("prompts/instagram_copy", "1.0.0", "../secrets")
            .unwrap_err();
        assert_eq!(err.code(), sz_core::ErrorCode::DoctrineUnsafe);
    }

    #[test]
    fn missing_version_directory_is_not_found() {
        let dir = setup();
        let loader = DoctrineLoader::new(dir.path(), "doctrine");
        let err = loader
            .resolve("prompts/instagram_copy", "9.9.9", "prompt.md")
            .unwrap_err();
        assert_eq!(err.code(), sz_core::ErrorCode::DoctrineNotFound);
    }
}
