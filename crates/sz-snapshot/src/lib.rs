// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Input snapshot materialization.
//!
//! Writes each named input payload as `inputs/<name>.resolved.json` inside a
//! caller-supplied temp directory. Only the resulting files matter — writing
//! order is irrelevant. A failed write poisons the whole temp directory: the
//! caller must discard it rather than attempt to repair individual files.

use serde_json::Value;
use sz_core::{EngineError, InputSnapshotRef, JobType};
use std::path::{Path, PathBuf};

/// The closed set of snapshot names a job type writes, in no particular
/// order — order of writing is irrelevant.
pub fn vocabulary_for(job_type: JobType) -> &'static [&'static str] {
    match job_type {
        JobType::InstagramCopy => &["brief", "context", "model_config", "doctrine"],
        JobType::BrandComplianceScore => {
            &["brief", "context", "model_config", "doctrine", "prompt_template"]
        }
        JobType::BrandOptimization => {
            &["brief", "context", "model_config", "doctrine", "prior_artifact"]
        }
    }
}

/// Writes named input snapshots into `inputs/` under a temp directory.
pub struct SnapshotWriter {
    temp_dir: PathBuf,
}

impl SnapshotWriter {
    /// Bind a writer to an existing temp directory. The directory must
    /// already exist; this does not create it.
    pub fn new(temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            temp_dir: temp_dir.into(),
        }
    }

    /// Write one snapshot. `value` is canonicalized (sorted keys, 2-space
    /// indent, trailing newline) before being written to disk, then the
    /// file is re-read to compute its hash — the invariant that the bytes
    /// hashed are the bytes on disk, never an in-memory object.
    pub fn write(&self, name: &str, value: &Value) -> Result<InputSnapshotRef, EngineError> {
        let inputs_dir = self.temp_dir.join("inputs");
        std::fs::create_dir_all(&inputs_dir)
            .map_err(|e| EngineError::snapshot_io(name, format!("create inputs dir: {e}")))?;

        let json = sz_canon::canonical_json(value)
            .map_err(|e| EngineError::snapshot_io(name, format!("canonicalize: {e}")))?;

        let rel_path = format!("inputs/{name}.resolved.json");
        let abs_path = self.temp_dir.join(&rel_path);
        std::fs::write(&abs_path, json.as_bytes())
            .map_err(|e| EngineError::snapshot_io(name, format!("write: {e}")))?;

        let (sha256, bytes) = sz_canon::hash_file(&abs_path)
            .map_err(|e| EngineError::snapshot_io(name, format!("hash written file: {e}")))?;

        Ok(InputSnapshotRef {
            path: rel_path,
            sha256,
            bytes,
        })
    }

    /// Write raw bytes (used for snapshots whose content is not itself
    /// canonical JSON, e.g. doctrine text) under `inputs/<name>.resolved.json`
    /// without re-canonicalizing the payload.
    pub fn write_raw(&self, name: &str, bytes: &[u8]) -> Result<InputSnapshotRef, EngineError> {
        let inputs_dir = self.temp_dir.join("inputs");
        std::fs::create_dir_all(&inputs_dir)
            .map_err(|e| EngineError::snapshot_io(name, format!("create inputs dir: {e}")))?;

        let rel_path = format!("inputs/{name}.resolved.json");
        let abs_path = self.temp_dir.join(&rel_path);
        std::fs::write(&abs_path, bytes)
            .map_err(|e| EngineError::snapshot_io(name, format!("write: {e}")))?;

        let (sha256, written) = sz_canon::hash_file(&abs_path)
            .map_err(|e| EngineError::snapshot_io(name, format!("hash written file: {e}")))?;

        Ok(InputSnapshotRef {
            path: rel_path,
            sha256,
            bytes: written,
        })
    }

    /// Root of the temp directory this writer is bound to.
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn vocabulary_matches_job_type() {
        assert_eq!(
            vocabulary_for(JobType::InstagramCopy),
            &["brief", "context", "model_config", "doctrine"]
        );
        assert!(vocabulary_for(JobType::BrandComplianceScore).contains(&"prompt_template"));
        assert!(vocabulary_for(JobType::BrandOptimization).contains(&"prior_artifact"));
    }

    #[test]
    fn write_produces_canonical_bytes_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path());
        let v = json!({"b": 1, "a": 2});
        let snap = writer.write("brief", &v).unwrap();
        assert_eq!(snap.path, "inputs/brief.resolved.json");

        let on_disk = std::fs::read_to_string(dir.path().join(&snap.path)).unwrap();
        assert!(on_disk.find("\"a\"").unwrap() < on_disk.find("\"b\"").unwrap());
        assert!(on_disk.ends_with('\n'));

        let (expect_hash, expect_len) =
            sz_canon::hash_file(&dir.path().join(&snap.path)).unwrap();
        assert_eq!(snap.sha256, expect_hash);
        assert_eq!(snap.bytes, expect_len);
    }

    #[test]
    fn same_value_twice_yields_identical_hash() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path());
        let v = json!({"x": [1, 2, 3], "y": "z"});
        let a = writer.write("context", &v).unwrap();
        let b = writer.write("context", &v).unwrap();
        assert_eq!(a.sha256, b.sha256);
    }

    #[test]
    fn write_raw_hashes_exact_bytes_given() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path());
        let snap = writer.write_raw("doctrine", b"hand-authored text\n").unwrap();
        assert_eq!(snap.sha256, sz_canon::sha256_prefixed(b"hand-authored text\n"));
    }
}
