/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Structured error types for the placement pipeline.
//!
//! Two error enums model the two failure layers:
//!
//! * [`StageError`]: why a single algorithm could not produce a result
//!   (bad configuration data it relied on, or a failed external lookup).
//! * [`PipelineError`]: top-level failure returned from
//!   [`Pipeline::run()`](super::Pipeline::run), naming the stage involved.
//!
//! Exclusions are *not* errors: a filter rejecting a server records a
//! [`RejectReason`](crate::algorithms::RejectReason) and carries on.  Errors
//! always abort the whole placement; no partial result is returned.

use thiserror::Error;

use crate::accounting::AccountingError;
use crate::server::Resource;

use super::resolver::ResolveError;

// ── Stage errors ──────────────────────────────────────────────────────────────

/// Failure inside one algorithm stage.
#[derive(Debug, Error)]
pub enum StageError {
    /// The requested package carries an unusable overprovision ratio.
    #[error("package {resource} overprovision ratio {ratio} must be a positive finite number")]
    InvalidPackageRatio { resource: Resource, ratio: f64 },

    /// A server carries an unusable overprovision ratio.
    #[error("server '{server}': {resource} overprovision ratio {ratio} must be a positive finite number")]
    InvalidServerRatio {
        server: String,
        resource: Resource,
        ratio: f64,
    },

    /// A NIC reports a link status other than `up` / `down`.
    #[error("server '{server}': NIC '{nic}' has unrecognised link status '{status}'")]
    MalformedNic {
        server: String,
        nic: String,
        status: String,
    },

    /// A scoring weight resolved to NaN or infinity.
    #[error("score weight '{setting}' resolved to non-finite value {value}")]
    InvalidWeight { setting: &'static str, value: f64 },

    /// The dependency resolver failed.  Never downgraded to "not found".
    #[error("failed to resolve dependency '{dependency}'")]
    Resolver {
        dependency: String,
        #[source]
        source: ResolveError,
    },
}

// ── Top-level pipeline errors ─────────────────────────────────────────────────

/// Top-level error type returned by
/// [`Pipeline::run()`](super::Pipeline::run) and pipeline construction.
///
/// | Variant | Layer |
/// |---|---|
/// | `UnknownAlgorithm` | construction |
/// | `Accounting` | inventory enrichment |
/// | `Stage` | algorithm failure |
/// | `UnexplainedExclusion` / `UnknownServer` / `ScorerChangedServers` | plugin contract violation |
/// | `Timeout` | request deadline |
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A configured algorithm name is not registered.
    #[error("unknown algorithm: '{0}'")]
    UnknownAlgorithm(String),

    /// The inventory could not be enriched.
    #[error("resource accounting failed: {0}")]
    Accounting(#[from] AccountingError),

    /// A stage failed.
    #[error("stage '{stage}' failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: StageError,
    },

    /// A filter removed a server without recording why.
    #[error("stage '{stage}' removed server '{server}' without a reason")]
    UnexplainedExclusion { stage: String, server: String },

    /// A stage returned a server that was not in its input.
    #[error("stage '{stage}' returned server '{server}' which was not in its input")]
    UnknownServer { stage: String, server: String },

    /// A scorer added or removed servers.
    #[error("scorer '{stage}' changed the server set ({before} in, {after} out)")]
    ScorerChangedServers {
        stage: String,
        before: usize,
        after: usize,
    },

    /// The request deadline elapsed while `stage` was running.
    #[error("placement deadline of {deadline_ms}ms exceeded during stage '{stage}'")]
    Timeout { stage: String, deadline_ms: u128 },
}

impl PipelineError {
    /// Name of the stage this error is attributed to, if any.
    pub fn stage(&self) -> Option<&str> {
        match self {
            PipelineError::Stage { stage, .. }
            | PipelineError::UnexplainedExclusion { stage, .. }
            | PipelineError::UnknownServer { stage, .. }
            | PipelineError::ScorerChangedServers { stage, .. }
            | PipelineError::Timeout { stage, .. } => Some(stage),
            PipelineError::UnknownAlgorithm(_) | PipelineError::Accounting(_) => None,
        }
    }
}
