//! Pipeline orchestrator.
//!
//! A [`Pipeline`] is an ordered list of [`Plugin`] stages resolved from the
//! [`AlgorithmRegistry`] at construction time.  One call to
//! [`Pipeline::run`] takes a placement request from raw inventory to a
//! ranked [`Designation`]:
//!
//! ```text
//! inventory ─► enrich ─► stage 1 ─► stage 2 ─► … ─► stage N ─► rank
//!                          │          │                │
//!                          └──────────┴── StepDiagnostic per stage
//! ```
//!
//! # Rules
//! * Stages run strictly in order; each consumes the previous output.
//! * Any stage error aborts the whole run.  No partial result is returned.
//! * A stage that leaves no servers short-circuits the rest, after its own
//!   diagnostics are recorded.
//! * An optional deadline covers the whole request; it is enforced around
//!   every stage with `tokio::time::timeout_at`.
//! * The orchestrator checks each stage's output against the plugin
//!   contract: filters must explain every exclusion, scorers must return
//!   exactly their input set, and no stage may invent servers.
//!
//! A `Pipeline` holds no per-request state, so one instance can serve any
//! number of concurrent requests.

pub mod error;
pub mod resolver;

pub use error::{PipelineError, StageError};
pub use resolver::{DependencyResolver, ResolveError, ResolvedVm, StaticResolver};

use std::cmp::Ordering;
use std::collections::BTreeSet;
use std::time::Duration;

use serde::Serialize;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, info_span, Instrument};

use crate::accounting;
use crate::algorithms::{AlgorithmRegistry, Plugin, PluginContext, Reasons, StageResult};
use crate::request::Constraints;
use crate::server::Server;

// ── Output types ──────────────────────────────────────────────────────────────

/// One entry of the diagnostic trail.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepDiagnostic {
    /// Display name of the stage.
    pub step: String,
    /// Number of servers left after the stage.
    pub remaining: usize,
    /// Ids of the surviving servers, in output order.
    pub servers: Vec<String>,
    pub reasons: Reasons,
}

/// Result of a successful placement run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Designation {
    /// Surviving servers, best first.
    pub servers: Vec<Server>,
    /// One entry per stage that actually ran, in order.
    pub steps: Vec<StepDiagnostic>,
}

impl Designation {
    /// The top-ranked server, if any survived.
    pub fn best(&self) -> Option<&Server> {
        self.servers.first()
    }
}

// ── Pipeline ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct Pipeline {
    stages: Vec<Plugin>,
    deadline: Option<Duration>,
}

impl Pipeline {
    pub fn new(stages: Vec<Plugin>) -> Self {
        Self {
            stages,
            deadline: None,
        }
    }

    /// Build a pipeline from registry keys.
    ///
    /// # Errors
    /// [`PipelineError::UnknownAlgorithm`] for the first key the registry
    /// does not know.
    pub fn from_names<S: AsRef<str>>(
        registry: &AlgorithmRegistry,
        names: &[S],
        ctx: &PluginContext,
    ) -> Result<Self, PipelineError> {
        let stages = names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                registry
                    .build(name, ctx)
                    .ok_or_else(|| PipelineError::UnknownAlgorithm(name.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(stages))
    }

    /// Bound every run by `deadline`, measured from the start of the run.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn deadline(&self) -> Option<Duration> {
        self.deadline
    }

    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(Plugin::name).collect()
    }

    // ── Public entry point ────────────────────────────────────────────────────

    /// Place one request against `inventory`.
    ///
    /// # Errors
    /// Any [`PipelineError`]; see the module docs for when each arises.
    pub async fn run(
        &self,
        inventory: Vec<Server>,
        constraints: &Constraints,
    ) -> Result<Designation, PipelineError> {
        let deadline_at = self.deadline.map(|d| Instant::now() + d);

        info!(
            server_count = inventory.len(),
            stage_count = self.stages.len(),
            "=== Pipeline::run() ==="
        );

        let mut servers = accounting::enrich(inventory)?;
        let mut steps = Vec::with_capacity(self.stages.len());

        for (i, stage) in self.stages.iter().enumerate() {
            let name = stage.name();
            let span = info_span!("stage", stage = name);

            let input: BTreeSet<String> = servers.iter().map(|s| s.uuid.clone()).collect();
            let fut = stage.run(servers, constraints).instrument(span.clone());

            let outcome = match deadline_at {
                Some(at) => {
                    if Instant::now() >= at {
                        return Err(self.timeout(name));
                    }
                    timeout_at(at, fut).await.map_err(|_| self.timeout(name))?
                }
                None => fut.await,
            };
            let result = outcome.map_err(|source| PipelineError::Stage {
                stage: name.to_string(),
                source,
            })?;

            check_contract(stage, &input, &result)?;

            let StageResult { servers: out, reasons } = result;
            span.in_scope(|| {
                if let Some(why) = reasons.skip_reason() {
                    debug!(reason = why, "stage skipped");
                }
                info!(surviving = out.len(), "stage finished");
            });

            steps.push(StepDiagnostic {
                step: name.to_string(),
                remaining: out.len(),
                servers: out.iter().map(|s| s.uuid.clone()).collect(),
                reasons,
            });
            servers = out;

            if servers.is_empty() && i + 1 < self.stages.len() {
                info!(stage = name, "no servers left; skipping remaining stages");
                break;
            }
        }

        rank(&mut servers);
        info!(surviving = servers.len(), "=== Pipeline::run() done ===");

        Ok(Designation { servers, steps })
    }

    fn timeout(&self, stage: &str) -> PipelineError {
        PipelineError::Timeout {
            stage: stage.to_string(),
            deadline_ms: self.deadline.map_or(0, |d| d.as_millis()),
        }
    }
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn check_contract(
    stage: &Plugin,
    input: &BTreeSet<String>,
    result: &StageResult,
) -> Result<(), PipelineError> {
    let name = stage.name();
    let output: BTreeSet<&str> = result.servers.iter().map(|s| s.uuid.as_str()).collect();

    if let Some(unknown) = output.iter().find(|id| !input.contains(**id)) {
        return Err(PipelineError::UnknownServer {
            stage: name.to_string(),
            server: unknown.to_string(),
        });
    }

    if stage.is_scorer() {
        if result.servers.len() != input.len() || output.len() != input.len() {
            return Err(PipelineError::ScorerChangedServers {
                stage: name.to_string(),
                before: input.len(),
                after: result.servers.len(),
            });
        }
        return Ok(());
    }

    for id in input {
        if !output.contains(id.as_str()) && result.reasons.get(id).is_none() {
            return Err(PipelineError::UnexplainedExclusion {
                stage: name.to_string(),
                server: id.clone(),
            });
        }
    }
    Ok(())
}

/// Best score first; unscored servers last; ties keep pipeline order.
fn rank(servers: &mut [Server]) {
    servers.sort_by(|a, b| match (a.score, b.score) {
        (Some(x), Some(y)) => y.partial_cmp(&x).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────
