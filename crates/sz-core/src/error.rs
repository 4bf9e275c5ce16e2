//! Unified error taxonomy for the run engine, stable across the lifetime of
//! a manifest schema version.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Machine-readable, stable error code. Serializes as `SCREAMING_SNAKE_CASE`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Malformed brief, missing `job_id`, or unknown `job_type`.
    BriefInvalid,
    /// `(doctrine_id, version)` did not resolve under the configured root.
    DoctrineNotFound,
    /// Doctrine reference contained an unsafe path component.
    DoctrineUnsafe,
    /// Writing an input snapshot to the temp directory failed.
    SnapshotIoError,
    /// A chainable job's prior run or required output could not be resolved.
    PriorArtifactMissing,
    /// The job body (LLM call, parsing, output write) raised.
    BodyFailure,
    /// Rename or symlink creation during promotion failed.
    FinalizeFailure,
    /// The deterministic suffix space was exhausted.
    CollisionLimitExceeded,
    /// A migration transform or post-state validation failed.
    MigrationFailure,
}

impl ErrorCode {
    /// Stable `&'static str` form, e.g. `"BRIEF_INVALID"`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BriefInvalid => "BRIEF_INVALID",
            Self::DoctrineNotFound => "DOCTRINE_NOT_FOUND",
            Self::DoctrineUnsafe => "DOCTRINE_UNSAFE",
            Self::SnapshotIoError => "SNAPSHOT_IO_ERROR",
            Self::PriorArtifactMissing => "PRIOR_ARTIFACT_MISSING",
            Self::BodyFailure => "BODY_FAILURE",
            Self::FinalizeFailure => "FINALIZE_FAILURE",
            Self::CollisionLimitExceeded => "COLLISION_LIMIT_EXCEEDED",
            Self::MigrationFailure => "MIGRATION_FAILURE",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error taxonomy for every fatal or terminal condition the run engine can
/// surface. Every variant except [`EngineError::BodyFailure`] aborts before
/// (or independently of) the manifest; only `BodyFailure` yields a
/// persisted `failed` run.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Malformed brief, missing `job_id`, or unknown `job_type`. Fatal at
    /// submission; no temp dir created.
    #[error("brief invalid: {message}")]
    BriefInvalid {
        /// Human-readable description.
        message: String,
    },

    /// `(doctrine_id, version)` did not resolve under the configured root.
    #[error("doctrine not found: {doctrine_id} v{version}")]
    DoctrineNotFound {
        /// Requested doctrine id.
        doctrine_id: String,
        /// Requested version.
        version: String,
    },

    /// Doctrine identifier, version, or filename contained an unsafe
    /// component (path separators, `..`, or an id outside the allow-list).
    #[error("doctrine reference unsafe: {message}")]
    DoctrineUnsafe {
        /// Human-readable description.
        message: String,
    },

    /// Writing an input snapshot failed; the temp dir must be treated as
    /// poisoned and discarded.
    #[error("snapshot write failed for '{name}': {message}")]
    SnapshotIoError {
        /// Snapshot name (e.g. `"brief"`, `"context"`).
        name: String,
        /// Human-readable description.
        message: String,
    },

    /// A chainable job could not resolve `prior_run_id` or one of its
    /// `required_outputs`. Fatal before `inputs_hash` derivation.
    #[error("prior artifact missing: {message}")]
    PriorArtifactMissing {
        /// Human-readable description.
        message: String,
    },

    /// The job body (LLM call, parsing, output write) raised. Captured into
    /// `manifest.error`; the run still finalizes as `failed`.
    #[error("job body failed: {message}")]
    BodyFailure {
        /// Human-readable description.
        message: String,
    },

    /// `rename` or symlink creation hit a contradictory on-disk state.
    /// Fatal; temp dir removed; no artifact persists.
    #[error("finalize failed: {message}")]
    FinalizeFailure {
        /// Human-readable description.
        message: String,
    },

    /// The deterministic suffix space (`run_id_base-2` .. `-1000`) was
    /// exhausted. Indicates corruption.
    #[error("collision suffix space exhausted for run_id_base '{run_id_base}'")]
    CollisionLimitExceeded {
        /// The base run id whose suffixes were exhausted.
        run_id_base: String,
    },

    /// A migration transform or post-state validation failed. The original
    /// manifest is left untouched; its backup is preserved.
    #[error("migration failed: {message}")]
    MigrationFailure {
        /// Human-readable description.
        message: String,
    },
}

impl EngineError {
    /// The stable [`ErrorCode`] this error maps to.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::BriefInvalid { .. } => ErrorCode::BriefInvalid,
            Self::DoctrineNotFound { .. } => ErrorCode::DoctrineNotFound,
            Self::DoctrineUnsafe { .. } => ErrorCode::DoctrineUnsafe,
            Self::SnapshotIoError { .. } => ErrorCode::SnapshotIoError,
            Self::PriorArtifactMissing { .. } => ErrorCode::PriorArtifactMissing,
            Self::BodyFailure { .. } => ErrorCode::BodyFailure,
            Self::FinalizeFailure { .. } => ErrorCode::FinalizeFailure,
            Self::CollisionLimitExceeded { .. } => ErrorCode::CollisionLimitExceeded,
            Self::MigrationFailure { .. } => ErrorCode::MigrationFailure,
        }
    }

    /// Shorthand for constructing [`EngineError::SnapshotIoError`].
    pub fn snapshot_io(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SnapshotIoError {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Shorthand for constructing [`EngineError::BriefInvalid`].
    pub fn brief_invalid(message: impl Into<String>) -> Self {
        Self::BriefInvalid {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_matches_variant() {
        let err = EngineError::BriefInvalid {
            message: "missing job_id".into(),
        };
        assert_eq!(err.code(), ErrorCode::BriefInvalid);
    }

    #[test]
    fn error_code_serializes_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::SnapshotIoError).unwrap();
        assert_eq!(json, "\"SNAPSHOT_IO_ERROR\"");
    }

    #[test]
    fn display_is_human_readable() {
        let err = EngineError::CollisionLimitExceeded {
            run_id_base: "abc123".into(),
        };
        assert!(err.to_string().contains("abc123"));
    }
}
