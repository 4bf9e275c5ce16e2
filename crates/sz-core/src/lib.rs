// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Shared data model and error taxonomy for the SIGIL.ZERO run engine.
//!
//! This crate has no filesystem dependency of its own: it defines the
//! shapes every other `sz-*` crate passes around (`Brief`, `DoctrineReference`,
//! `ContextSpec`, chain-input records) plus the [`error::EngineError`]
//! taxonomy every fallible operation in the workspace returns.

pub mod config;
pub mod error;
pub mod model;

pub use config::{ChainInputRequest, ContextRequest, DoctrineRequest, GenerationConfig, GlobSelector};
pub use error::{EngineError, ErrorCode};
pub use model::{
    Brief, ContextSpec, DoctrineReference, DoctrineResolution, InputSnapshotRef, JobType,
    PriorArtifactSnapshot, PriorManifestSummary, SelectedItem,
};
