// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Submission entry point. `submit` is the single function
//! an HTTP handler or queue worker calls; everything else in this crate is
//! private wiring between C1 (`sz-canon`), C2 (`sz-snapshot`), C3
//! (`sz-doctrine`), C4 (`sz-context`), C5/C6 (`sz-runid`), C7
//! (`sz-finalize`), C8 (`sz-manifest`), and C10 (`sz-chain`).

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::time::Instant;

use sz_core::{Brief, EngineError, JobType, PriorArtifactSnapshot};
use sz_jobs::{JobContext, LlmClient, TracingSink};
use sz_manifest::{
    ArtifactEntry, ChainMetadata, DoctrineManifestEntry, ErrorRecord, PriorStageRef, RunManifest,
    RunStatus, CURRENT_SCHEMA_VERSION,
};

/// Doctrine root, relative to `repo_root`. The engine resolves doctrine
/// under exactly one configured root rather than probing several
/// candidates.
const DOCTRINE_ROOT: &str = "doctrine";

/// Caller-supplied submission parameters. `queue_job_id`, when present, is
/// recorded in the manifest's stored form but never participates in
/// `inputs_hash` or the deterministic projection.
#[derive(Debug, Default, Clone)]
pub struct SubmitParams {
    /// External queue identifier, for cross-reference only.
    pub queue_job_id: Option<String>,
}

/// Outcome of a submission, returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// The resolved, possibly pre-existing, run id.
    pub run_id: String,
    /// Canonical artifact directory for this run.
    pub artifact_dir: PathBuf,
    /// Whether this submission short-circuited to an existing run.
    pub idempotent_replay: bool,
}

/// Resolve `job_ref` under `jobs/`, load and validate the brief, assemble
/// surrounding inputs, and either replay an existing run or execute the
/// job body and atomically promote a new one.
pub fn submit(
    repo_root: &Path,
    job_ref: &str,
    params: SubmitParams,
    llm: &dyn LlmClient,
    tracing_sink: &dyn TracingSink,
) -> Result<SubmitOutcome, EngineError> {
    let started_at = chrono::Utc::now();
    let timer = Instant::now();

    let brief_path = validate_job_ref(repo_root, job_ref)?;
    let brief = load_brief(&brief_path)?;

    let doctrine_loader = sz_doctrine::DoctrineLoader::new(repo_root, DOCTRINE_ROOT);
    let doctrine = doctrine_loader.resolve(
        &brief.doctrine.doctrine_id,
        &brief.doctrine.version,
        &brief.doctrine.filename,
    )?;

    let prompt_template = match (&brief.job_type, &brief.prompt_template) {
        (JobType::BrandComplianceScore, Some(req)) => Some(doctrine_loader.resolve(
            &req.doctrine_id,
            &req.version,
            &req.filename,
        )?),
        (JobType::BrandComplianceScore, None) => {
            return Err(EngineError::brief_invalid(
                "brand_compliance_score requires a prompt_template reference",
            ));
        }
        _ => None,
    };

    let context_spec = sz_context::assemble(repo_root, &brief.context)?;

    let (prior_artifact, prior_output_contents) = match (&brief.job_type, &brief.chain) {
        (JobType::BrandOptimization, Some(chain_req)) => {
            let snapshot = sz_chain::resolve_chain(
                repo_root,
                &chain_req.prior_run_id,
                &chain_req.prior_stage,
                &chain_req.required_outputs,
                upstream_job_type_for(JobType::BrandOptimization),
            )?;
            let contents = read_prior_outputs(repo_root, &snapshot)?;
            (Some(snapshot), contents)
        }
        (JobType::BrandOptimization, None) => {
            return Err(EngineError::brief_invalid(
                "brand_optimization requires a chain block",
            ));
        }
        _ => (None, BTreeMap::new()),
    };

    let temp = sz_finalize::TempRun::create(repo_root, &brief.job_id)?;
    let writer = sz_snapshot::SnapshotWriter::new(temp.path());

    let mut snapshot_refs = BTreeMap::new();
    snapshot_refs.insert(
        "brief".to_string(),
        writer.write("brief", &serde_json::to_value(&brief).map_err(|e| {
            EngineError::snapshot_io("brief", format!("to_value: {e}"))
        })?)?,
    );
    snapshot_refs.insert(
        "context".to_string(),
        writer.write(
            "context",
            &serde_json::to_value(&context_spec)
                .map_err(|e| EngineError::snapshot_io("context", format!("to_value: {e}")))?,
        )?,
    );
    snapshot_refs.insert(
        "model_config".to_string(),
        writer.write(
            "model_config",
            &serde_json::to_value(&brief.generation)
                .map_err(|e| EngineError::snapshot_io("model_config", format!("to_value: {e}")))?,
        )?,
    );
    snapshot_refs.insert("doctrine".to_string(), writer.write_raw("doctrine", &doctrine.content)?);
    if let Some(ref template) = prompt_template {
        snapshot_refs.insert(
            "prompt_template".to_string(),
            writer.write_raw("prompt_template", &template.content)?,
        );
    }
    if let Some(ref prior) = prior_artifact {
        snapshot_refs.insert(
            "prior_artifact".to_string(),
            writer.write(
                "prior_artifact",
                &serde_json::to_value(prior)
                    .map_err(|e| EngineError::snapshot_io("prior_artifact", format!("to_value: {e}")))?,
            )?,
        );
    }

    let mut snapshot_hashes = BTreeMap::new();
    for (name, snap) in &snapshot_refs {
        snapshot_hashes.insert(name.clone(), snap.sha256.clone());
    }
    let inputs_hash = sz_runid::derive_inputs_hash(&snapshot_hashes)?;
    let run_id_base = sz_runid::derive_run_id_base(&inputs_hash);

    let outcome = sz_runid::resolve(repo_root, &brief.job_id, &run_id_base, &inputs_hash)?;

    tracing::info!(
        target: "sigilzero.run",
        job_id = %brief.job_id,
        job_ref,
        inputs_hash = %inputs_hash,
        run_id = %run_id_for(&outcome.resolution),
        queue_job_id = params.queue_job_id.as_deref().unwrap_or(""),
        doctrine_version = %doctrine.reference.version,
        doctrine_sha256 = %doctrine.reference.sha256,
        "run_header"
    );

    if let sz_runid::Resolution::IdempotentReplay { run_id, artifact_dir } = &outcome.resolution {
        let _ = std::fs::remove_dir_all(temp.path());
        let mut actions = outcome.actions.clone();
        actions.push("idempotent replay".to_string());
        tracing::info!(
            target: "sigilzero.run",
            job_id = %brief.job_id,
            run_id = %run_id,
            status = "idempotent_replay",
            artifact_dir = %artifact_dir.display(),
            elapsed_ms = timer.elapsed().as_millis() as u64,
            actions = ?actions,
            "run_footer"
        );
        return Ok(SubmitOutcome {
            run_id: run_id.clone(),
            artifact_dir: artifact_dir.clone(),
            idempotent_replay: true,
        });
    }

    let run_id = match &outcome.resolution {
        sz_runid::Resolution::Reserved { run_id } => run_id.clone(),
        sz_runid::Resolution::IdempotentReplay { .. } => unreachable!("handled above"),
    };

    let ctx = JobContext {
        repo_root,
        brief: &brief,
        context_spec: &context_spec,
        doctrine: &doctrine,
        prompt_template: prompt_template.as_ref(),
        prior_artifact: prior_artifact.as_ref(),
        prior_output_contents,
        llm,
        tracing: tracing_sink,
    };
    let body = sz_jobs::job_body(brief.job_type);
    let body_result = body.run(&ctx);

    let (status, artifacts, error) = match body_result {
        Ok(outputs) => {
            let mut artifacts = BTreeMap::new();
            for output in outputs {
                let abs = temp.path().join(&output.relpath);
                if let Some(parent) = abs.parent() {
                    std::fs::create_dir_all(parent).map_err(|e| EngineError::BodyFailure {
                        message: format!("create output dir for '{}': {e}", output.relpath),
                    })?;
                }
                std::fs::write(&abs, &output.bytes).map_err(|e| EngineError::BodyFailure {
                    message: format!("write output '{}': {e}", output.relpath),
                })?;
                let (sha256, bytes) = sz_canon::hash_file(&abs).map_err(|e| EngineError::BodyFailure {
                    message: format!("hash output '{}': {e}", output.relpath),
                })?;
                artifacts.insert(output.relpath, ArtifactEntry { sha256, bytes });
            }
            (RunStatus::Succeeded, artifacts, None)
        }
        Err(e) => (
            RunStatus::Failed,
            BTreeMap::new(),
            Some(ErrorRecord {
                code: e.code(),
                message: e.to_string(),
            }),
        ),
    };

    let chain_metadata = ChainMetadata {
        is_chainable_stage: brief.job_type.is_chainable(),
        prior_stages: prior_artifact
            .as_ref()
            .map(|p| {
                vec![PriorStageRef {
                    run_id: p.prior_run_id.clone(),
                    job_id: p.prior_job_id.clone(),
                    stage: p.prior_stage.clone(),
                    output_references: p.required_outputs.clone(),
                }]
            })
            .unwrap_or_default(),
    };

    let manifest = RunManifest {
        schema_version: CURRENT_SCHEMA_VERSION.to_string(),
        job_id: brief.job_id.clone(),
        run_id: run_id.clone(),
        queue_job_id: params.queue_job_id.clone(),
        job_ref: job_ref.to_string(),
        job_type: brief.job_type,
        status,
        inputs_hash: Some(inputs_hash.clone()),
        input_snapshots: snapshot_refs,
        doctrine: Some(DoctrineManifestEntry {
            reference: doctrine.reference.clone(),
            resolved_at: doctrine.resolved_at,
        }),
        artifacts,
        chain_metadata,
        error: error.clone(),
        migration_history: Vec::new(),
        started_at: Some(started_at),
        finished_at: Some(chrono::Utc::now()),
        langfuse_trace_id: None,
    };

    let manifest_bytes = manifest
        .stored_form()
        .map_err(|e| EngineError::FinalizeFailure {
            message: format!("serialize manifest: {e}"),
        })?
        .into_bytes();

    let finalize_outcome = sz_finalize::finalize(
        temp,
        repo_root,
        &brief.job_id,
        &run_id,
        &manifest_bytes,
    )?;

    tracing::info!(
        target: "sigilzero.run",
        job_id = %brief.job_id,
        run_id = %run_id,
        status = ?manifest.status,
        artifact_dir = %finalize_outcome.artifact_dir.display(),
        elapsed_ms = timer.elapsed().as_millis() as u64,
        actions = ?finalize_outcome.actions,
        "run_footer"
    );

    if let Some(err) = error {
        return Err(EngineError::BodyFailure {
            message: err.message,
        });
    }

    Ok(SubmitOutcome {
        run_id,
        artifact_dir: finalize_outcome.artifact_dir,
        idempotent_replay: false,
    })
}

fn run_id_for(resolution: &sz_runid::Resolution) -> &str {
    match resolution {
        sz_runid::Resolution::Reserved { run_id } => run_id,
        sz_runid::Resolution::IdempotentReplay { run_id, .. } => run_id,
    }
}

/// The only chain edge this engine knows about: `brand_optimization` always
/// chains from a `brand_compliance_score` run. Extending to more chain
/// shapes would add a lookup table here, not change the call site.
fn upstream_job_type_for(job_type: JobType) -> JobType {
    match job_type {
        JobType::BrandOptimization => JobType::BrandComplianceScore,
        other => other,
    }
}

/// Validate `job_ref`: relative, first component `jobs`, no `..`, no
/// absolute paths. Returns the resolved absolute path to the brief file.
fn validate_job_ref(repo_root: &Path, job_ref: &str) -> Result<PathBuf, EngineError> {
    let rel = Path::new(job_ref);
    if rel.is_absolute() {
        return Err(EngineError::brief_invalid(format!(
            "job_ref '{job_ref}' must be a relative path"
        )));
    }
    let mut components = rel.components();
    match components.next() {
        Some(Component::Normal(first)) if first == "jobs" => {}
        _ => {
            return Err(EngineError::brief_invalid(format!(
                "job_ref '{job_ref}' must start with 'jobs/'"
            )));
        }
    }
    if rel
        .components()
        .any(|c| matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_)))
    {
        return Err(EngineError::brief_invalid(format!(
            "job_ref '{job_ref}' contains an unsafe path component"
        )));
    }
    Ok(repo_root.join(rel))
}

fn load_brief(path: &Path) -> Result<Brief, EngineError> {
    let bytes = std::fs::read(path).map_err(|e| {
        EngineError::brief_invalid(format!("read brief '{}': {e}", path.display()))
    })?;
    serde_yaml::from_slice(&bytes).map_err(|e| {
        EngineError::brief_invalid(format!("parse brief '{}': {e}", path.display()))
    })
}

/// Locate the on-disk run directory for `run_id`, preferring the
/// canonical `artifacts/<job_id>/<run_id>` layout and falling back to the
/// legacy `artifacts/runs/<run_id>` alias. Mirrors `sz_chain`'s internal
/// lookup; duplicated here because the chain resolver only returns hashes,
/// not the run directory the content must be re-read from.
fn locate_run_dir(repo_root: &Path, run_id: &str) -> Option<PathBuf> {
    let artifacts_dir = repo_root.join("artifacts");
    if let Ok(entries) = std::fs::read_dir(&artifacts_dir) {
        for entry in entries.flatten() {
            let job_dir = entry.path();
            if !job_dir.is_dir() || job_dir.file_name().and_then(|n| n.to_str()) == Some("runs") {
                continue;
            }
            let run_dir = job_dir.join(run_id);
            if run_dir.join("manifest.json").is_file() {
                return Some(run_dir);
            }
        }
    }
    let legacy = artifacts_dir.join("runs").join(run_id);
    if legacy.join("manifest.json").is_file() {
        return Some(legacy);
    }
    None
}

fn read_prior_outputs(
    repo_root: &Path,
    snapshot: &PriorArtifactSnapshot,
) -> Result<BTreeMap<String, Vec<u8>>, EngineError> {
    let run_dir = locate_run_dir(repo_root, &snapshot.prior_run_id).ok_or_else(|| {
        EngineError::PriorArtifactMissing {
            message: format!(
                "prior run directory for '{}' vanished after chain resolution",
                snapshot.prior_run_id
            ),
        }
    })?;
    let mut contents = BTreeMap::new();
    for relpath in &snapshot.required_outputs {
        let bytes = std::fs::read(run_dir.join(relpath)).map_err(|e| {
            EngineError::PriorArtifactMissing {
                message: format!("read prior output '{relpath}': {e}"),
            }
        })?;
        contents.insert(relpath.clone(), bytes);
    }
    Ok(contents)
}
