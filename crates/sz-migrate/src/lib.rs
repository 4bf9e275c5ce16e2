// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Manifest schema migration registry and upgrade engine.
//!
//! Migrations are additive-only JSON transforms keyed by `(from, to)`
//! schema version pairs. The registry holds direct edges, including
//! multi-hop shortcuts such as `1.0.0 -> 1.2.0`; a path between two
//! versions without a registered direct edge is discovered by
//! breadth-first search over the remaining edges. A direct edge is always
//! preferred over a longer route, since it is visited before any
//! multi-hop alternative.

use chrono::Utc;
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};
use std::path::Path;
use sz_core::EngineError;

/// One registered transform between two adjacent schema versions.
pub struct Migration {
    /// Source schema version this transform applies from.
    pub from: &'static str,
    /// Target schema version this transform applies to.
    pub to: &'static str,
    /// Human-readable list of field-level changes, for `migration_history`.
    pub changes: &'static [&'static str],
    /// The transform itself. Must be additive: it may add or rename
    /// fields but must never drop data the source schema defined.
    pub transform: fn(Value) -> Value,
}

/// A registry of direct migration edges, with BFS-discovered multi-hop
/// paths layered on top.
#[derive(Default)]
pub struct MigrationRegistry {
    edges: Vec<Migration>,
}

impl MigrationRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self { edges: Vec::new() }
    }

    /// Register a direct `from -> to` transform.
    pub fn register(mut self, migration: Migration) -> Self {
        self.edges.push(migration);
        self
    }

    /// The built-in registry for the current manifest schema lineage.
    pub fn builtin() -> Self {
        Self::new()
            .register(Migration {
                from: "1.0.0",
                to: "1.1.0",
                changes: &[
                    "added input_snapshots as an empty map",
                    "added inputs_hash as null",
                ],
                transform: |mut v| {
                    if let Value::Object(map) = &mut v {
                        map.entry("input_snapshots")
                            .or_insert_with(|| serde_json::json!({}));
                        map.entry("inputs_hash").or_insert(Value::Null);
                    }
                    v
                },
            })
            .register(Migration {
                from: "1.1.0",
                to: "1.2.0",
                changes: &["added chain_metadata with default empty prior_stages"],
                transform: |mut v| {
                    if let Value::Object(map) = &mut v {
                        map.entry("chain_metadata").or_insert_with(|| {
                            serde_json::json!({ "is_chainable_stage": false, "prior_stages": [] })
                        });
                    }
                    v
                },
            })
            .register(Migration {
                from: "1.0.0",
                to: "1.2.0",
                changes: &[
                    "added input_snapshots as an empty map",
                    "added inputs_hash as null",
                    "added chain_metadata with default empty prior_stages",
                ],
                transform: |mut v| {
                    if let Value::Object(map) = &mut v {
                        map.entry("input_snapshots")
                            .or_insert_with(|| serde_json::json!({}));
                        map.entry("inputs_hash").or_insert(Value::Null);
                        map.entry("chain_metadata").or_insert_with(|| {
                            serde_json::json!({ "is_chainable_stage": false, "prior_stages": [] })
                        });
                    }
                    v
                },
            })
    }

    /// Direct edges only, `from -> Migration`.
    fn direct_edges(&self) -> BTreeMap<&'static str, &Migration> {
        self.edges.iter().map(|m| (m.from, m)).collect()
    }

    /// Find a path of migrations from `from` to `to` by breadth-first
    /// search over registered edges. Returns the edges in application
    /// order. `None` if no path exists (including `from == to`, which
    /// callers should treat as already-current, not an error).
    pub fn path(&self, from: &str, to: &str) -> Option<Vec<&Migration>> {
        if from == to {
            return None;
        }
        let mut by_from: BTreeMap<&str, Vec<&Migration>> = BTreeMap::new();
        for m in &self.edges {
            by_from.entry(m.from).or_default().push(m);
        }

        let mut queue = VecDeque::new();
        let mut visited = std::collections::BTreeSet::new();
        queue.push_back((from, Vec::<&Migration>::new()));
        visited.insert(from);

        while let Some((node, path_so_far)) = queue.pop_front() {
            let Some(outgoing) = by_from.get(node) else {
                continue;
            };
            for edge in outgoing {
                if edge.to == to {
                    let mut full = path_so_far.clone();
                    full.push(edge);
                    return Some(full);
                }
                if visited.insert(edge.to) {
                    let mut extended = path_so_far.clone();
                    extended.push(edge);
                    queue.push_back((edge.to, extended));
                }
            }
        }
        None
    }
}

/// One `migration_history` entry produced by [`migrate_value`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct MigrationStep {
    /// Source schema version.
    pub from: String,
    /// Target schema version.
    pub to: String,
    /// Changes applied, copied from the [`Migration`] definition.
    pub changes: Vec<String>,
    /// Checksum of the deterministic projection before this step.
    pub checksum_before: String,
    /// Checksum of the deterministic projection after this step.
    pub checksum_after: String,
}

/// Result of migrating an in-memory manifest value.
pub struct MigrationResult {
    /// The manifest after applying every transform on the path.
    pub manifest: Value,
    /// One entry per edge traversed, in application order.
    pub steps: Vec<MigrationStep>,
}

fn checksum_of(value: &Value) -> Result<String, EngineError> {
    let canonical = sz_canon::canonical_json(value)
        .map_err(|e| EngineError::MigrationFailure { message: e.to_string() })?;
    Ok(sz_canon::sha256_prefixed(canonical.as_bytes()))
}

/// Migrate `manifest` (a raw JSON value with a `schema_version` field) to
/// `target`. Returns `Ok(None)` when the manifest is already at `target`
/// (idempotent no-op). Returns [`EngineError::MigrationFailure`] if
/// `schema_version` is missing/non-string or no path to `target` exists.
pub fn migrate_value(
    registry: &MigrationRegistry,
    manifest: Value,
    target: &str,
) -> Result<Option<MigrationResult>, EngineError> {
    let current = manifest
        .get("schema_version")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineError::MigrationFailure {
            message: "manifest missing string schema_version".to_string(),
        })?
        .to_string();

    if current == target {
        return Ok(None);
    }

    let path = registry.path(&current, target).ok_or_else(|| {
        EngineError::MigrationFailure {
            message: format!("no migration path from {current} to {target}"),
        }
    })?;

    let mut value = manifest;
    let mut steps = Vec::with_capacity(path.len());

    for migration in path {
        let checksum_before = checksum_of(&value)?;
        value = (migration.transform)(value);
        if let Value::Object(map) = &mut value {
            map.insert(
                "schema_version".to_string(),
                Value::String(migration.to.to_string()),
            );
        }
        let checksum_after = checksum_of(&value)?;
        steps.push(MigrationStep {
            from: migration.from.to_string(),
            to: migration.to.to_string(),
            changes: migration.changes.iter().map(|s| s.to_string()).collect(),
            checksum_before,
            checksum_after,
        });
    }

    Ok(Some(MigrationResult { manifest: value, steps }))
}

/// Outcome of [`migrate_file`].
pub enum FileMigrationOutcome {
    /// The manifest was already at `target`; nothing was written.
    AlreadyCurrent,
    /// The manifest was migrated; `.backup` holds the pre-migration bytes.
    Migrated {
        /// Steps applied, in order.
        steps: Vec<MigrationStep>,
    },
    /// Dry run: reports what would change without touching disk.
    DryRun {
        /// Steps that would be applied, in order.
        steps: Vec<MigrationStep>,
    },
}

/// Load `path`, migrate its JSON content to `target`, and — unless
/// `dry_run` — write a `.backup` of the original bytes before overwriting
/// `path` with the migrated, canonical form plus a single appended
/// `migration_history` record spanning the whole chain from the
/// manifest's original `schema_version` to `target`, regardless of how
/// many edges the path traversed.
pub fn migrate_file(
    registry: &MigrationRegistry,
    path: &Path,
    target: &str,
    dry_run: bool,
) -> Result<FileMigrationOutcome, EngineError> {
    let raw = std::fs::read(path).map_err(|e| EngineError::MigrationFailure {
        message: format!("read {}: {e}", path.display()),
    })?;
    let manifest: Value = serde_json::from_slice(&raw).map_err(|e| EngineError::MigrationFailure {
        message: format!("parse {}: {e}", path.display()),
    })?;

    let Some(mut result) = migrate_value(registry, manifest, target)? else {
        return Ok(FileMigrationOutcome::AlreadyCurrent);
    };

    if dry_run {
        return Ok(FileMigrationOutcome::DryRun { steps: result.steps });
    }

    let span_from = result.steps.first().map(|step| step.from.clone()).unwrap_or_default();
    let span_to = result.steps.last().map(|step| step.to.clone()).unwrap_or_default();
    let checksum_before = result
        .steps
        .first()
        .map(|step| step.checksum_before.clone())
        .unwrap_or_default();
    let checksum_after = result
        .steps
        .last()
        .map(|step| step.checksum_after.clone())
        .unwrap_or_default();
    let combined_changes: Vec<String> = result
        .steps
        .iter()
        .flat_map(|step| step.changes.iter().cloned())
        .collect();

    if let Value::Object(map) = &mut result.manifest {
        let history = map
            .entry("migration_history")
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(arr) = history {
            arr.push(serde_json::json!({
                "from": span_from,
                "to": span_to,
                "applied_at": Utc::now().to_rfc3339(),
                "changes": combined_changes,
                "checksum_before": checksum_before,
                "checksum_after": checksum_after,
            }));
        }
    }

    let backup_path = path.with_extension("backup");
    std::fs::write(&backup_path, &raw).map_err(|e| EngineError::MigrationFailure {
        message: format!("write backup {}: {e}", backup_path.display()),
    })?;

    let canonical = sz_canon::canonical_json(&result.manifest)
        .map_err(|e| EngineError::MigrationFailure { message: e.to_string() })?;
    std::fs::write(path, canonical.as_bytes()).map_err(|e| EngineError::MigrationFailure {
        message: format!("write {}: {e}", path.display()),
    })?;

    Ok(FileMigrationOutcome::Migrated { steps: result.steps })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_prefers_direct_composite_edge() {
        let registry = MigrationRegistry::builtin();
        let path = registry.path("1.0.0", "1.2.0").unwrap();
        assert_eq!(path.len(), 1);
        assert_eq!(path[0].from, "1.0.0");
        assert_eq!(path[0].to, "1.2.0");
    }

    #[test]
    fn registry_without_direct_edge_falls_back_to_bfs() {
        let registry = MigrationRegistry::new()
            .register(Migration {
                from: "1.0.0",
                to: "1.1.0",
                changes: &["a"],
                transform: |v| v,
            })
            .register(Migration {
                from: "1.1.0",
                to: "1.2.0",
                changes: &["b"],
                transform: |v| v,
            });
        let path = registry.path("1.0.0", "1.2.0").unwrap();
        assert_eq!(path.len(), 2);
        assert_eq!(path[0].to, "1.1.0");
        assert_eq!(path[1].to, "1.2.0");
    }

    #[test]
    fn migrate_value_is_idempotent_at_target() {
        let registry = MigrationRegistry::builtin();
        let manifest = serde_json::json!({"schema_version": "1.2.0"});
        let result = migrate_value(&registry, manifest, "1.2.0").unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn migrate_value_applies_transforms_in_order() {
        let registry = MigrationRegistry::builtin();
        let manifest = serde_json::json!({"schema_version": "1.0.0", "job_id": "ig-test-001"});
        let result = migrate_value(&registry, manifest, "1.2.0").unwrap().unwrap();
        assert_eq!(result.manifest["schema_version"], "1.2.0");
        assert_eq!(result.manifest["input_snapshots"], serde_json::json!({}));
        assert!(result.manifest["inputs_hash"].is_null());
        assert!(result.manifest["chain_metadata"]["prior_stages"].as_array().unwrap().is_empty());
        assert!(result.manifest.get("migration_history").is_none());
        assert_eq!(result.steps.len(), 1);
    }

    #[test]
    fn migrate_value_rejects_unknown_target() {
        let registry = MigrationRegistry::builtin();
        let manifest = serde_json::json!({"schema_version": "1.0.0"});
        let err = migrate_value(&registry, manifest, "9.9.9").unwrap_err();
        assert_eq!(err.code(), sz_core::ErrorCode::MigrationFailure);
    }

    #[test]
    fn migrate_file_writes_backup_and_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(
            &path,
            serde_json::to_vec(&serde_json::json!({"schema_version": "1.0.0", "job_id": "x"})).unwrap(),
        )
        .unwrap();

        let registry = MigrationRegistry::builtin();
        let outcome = migrate_file(&registry, &path, "1.2.0", false).unwrap();
        assert!(matches!(outcome, FileMigrationOutcome::Migrated { .. }));
        assert!(path.with_extension("backup").is_file());

        let migrated: Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(migrated["schema_version"], "1.2.0");
        let history = migrated["migration_history"].as_array().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0]["from"], "1.0.0");
        assert_eq!(history[0]["to"], "1.2.0");
    }

    #[test]
    fn migrate_file_dry_run_does_not_touch_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        let original = serde_json::to_vec(&serde_json::json!({"schema_version": "1.0.0"})).unwrap();
        std::fs::write(&path, &original).unwrap();

        let registry = MigrationRegistry::builtin();
        let outcome = migrate_file(&registry, &path, "1.2.0", true).unwrap();
        assert!(matches!(outcome, FileMigrationOutcome::DryRun { .. }));
        assert!(!path.with_extension("backup").exists());
        assert_eq!(std::fs::read(&path).unwrap(), original);
    }

    #[test]
    fn migrate_file_rerun_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        std::fs::write(
            &path,
            serde_json::to_vec(&serde_json::json!({"schema_version": "1.2.0"})).unwrap(),
        )
        .unwrap();

        let registry = MigrationRegistry::builtin();
        let outcome = migrate_file(&registry, &path, "1.2.0", false).unwrap();
        assert!(matches!(outcome, FileMigrationOutcome::AlreadyCurrent));
    }
}
