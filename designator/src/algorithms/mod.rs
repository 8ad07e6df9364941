//! Algorithm plugin contract and registry.
//!
//! Every pipeline stage is either a [`Filter`] (hard constraint, may remove
//! servers, must explain every removal) or a [`Scorer`] (adjusts `score`,
//! never removes servers).  Both are `async` so that stages needing external
//! I/O (the volumes-from filter) and purely computational stages share one
//! contract; computational stages simply complete on first poll.
//!
//! Algorithms are looked up by a stable key in an [`AlgorithmRegistry`] when
//! the pipeline is built, not when it runs:
//!
//! | Key | Kind |
//! |---|---|
//! | `identity` | filter |
//! | `hard-filter-min-cpu` | filter |
//! | `hard-filter-min-ram` | filter |
//! | `hard-filter-min-disk` | filter |
//! | `hard-filter-vlans` | filter |
//! | `hard-filter-volumes-from` | filter |
//! | `score-num-owner-zones` | scorer |
//! | `score-unreserved-ram` | scorer |
//! | `score-unreserved-disk` | scorer |

pub mod identity;
pub mod min_resources;
pub mod owner_zones;
pub mod reasons;
pub mod scorers;
pub mod unreserved;
pub mod vlans;
pub mod volumes_from;

pub use reasons::{Reasons, RejectReason};

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::pipeline::error::StageError;
use crate::pipeline::resolver::DependencyResolver;
use crate::request::Constraints;
use crate::server::Server;

// ── Stage result ──────────────────────────────────────────────────────────────

/// The unit threaded through the pipeline: surviving servers plus the
/// stage's explanations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StageResult {
    pub servers: Vec<Server>,
    pub reasons: Reasons,
}

impl StageResult {
    pub fn new(servers: Vec<Server>, reasons: Reasons) -> Self {
        Self { servers, reasons }
    }

    /// Pass `servers` through untouched with a `skip` explanation.
    pub fn skipped(servers: Vec<Server>, why: impl Into<String>) -> Self {
        Self {
            servers,
            reasons: Reasons::skipped(why),
        }
    }
}

// ── Plugin traits ─────────────────────────────────────────────────────────────

/// A hard constraint.
#[async_trait]
pub trait Filter: Send + Sync {
    /// Display name used in the diagnostic trail.
    fn name(&self) -> &'static str;

    async fn filter(
        &self,
        servers: Vec<Server>,
        constraints: &Constraints,
    ) -> Result<StageResult, StageError>;
}

/// A desirability adjustment.  Must return exactly the servers it was given.
#[async_trait]
pub trait Scorer: Send + Sync {
    /// Display name used in the diagnostic trail.
    fn name(&self) -> &'static str;

    async fn score(
        &self,
        servers: Vec<Server>,
        constraints: &Constraints,
    ) -> Result<StageResult, StageError>;
}

/// A registered algorithm, tagged with the interface it implements.
pub enum Plugin {
    Filter(Box<dyn Filter>),
    Scorer(Box<dyn Scorer>),
}

impl Plugin {
    pub fn name(&self) -> &'static str {
        match self {
            Plugin::Filter(f) => f.name(),
            Plugin::Scorer(s) => s.name(),
        }
    }

    pub fn is_scorer(&self) -> bool {
        matches!(self, Plugin::Scorer(_))
    }

    /// Run the stage through whichever interface it implements.
    pub async fn run(
        &self,
        servers: Vec<Server>,
        constraints: &Constraints,
    ) -> Result<StageResult, StageError> {
        match self {
            Plugin::Filter(f) => f.filter(servers, constraints).await,
            Plugin::Scorer(s) => s.score(servers, constraints).await,
        }
    }
}

impl std::fmt::Debug for Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = if self.is_scorer() { "Scorer" } else { "Filter" };
        write!(f, "{}({:?})", kind, self.name())
    }
}

// ── Registry ──────────────────────────────────────────────────────────────────

/// Collaborators made available to algorithm constructors.
#[derive(Clone, Default)]
pub struct PluginContext {
    pub resolver: Option<Arc<dyn DependencyResolver>>,
}

impl PluginContext {
    pub fn with_resolver(resolver: Arc<dyn DependencyResolver>) -> Self {
        Self {
            resolver: Some(resolver),
        }
    }
}

type Constructor = Box<dyn Fn(&PluginContext) -> Plugin + Send + Sync>;

/// Name → constructor table for pipeline algorithms.
///
/// `BTreeMap` keeps [`keys`](Self::keys) in a stable order.
#[derive(Default)]
pub struct AlgorithmRegistry {
    entries: BTreeMap<&'static str, Constructor>,
}

impl AlgorithmRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in algorithm.
    pub fn with_builtins() -> Self {
        let mut r = Self::new();
        r.register("identity", |_| Plugin::Filter(Box::new(identity::Identity)));
        r.register("hard-filter-min-cpu", |_| {
            Plugin::Filter(Box::new(min_resources::MinCpu))
        });
        r.register("hard-filter-min-ram", |_| {
            Plugin::Filter(Box::new(min_resources::MinRam))
        });
        r.register("hard-filter-min-disk", |_| {
            Plugin::Filter(Box::new(min_resources::MinDisk))
        });
        r.register("hard-filter-vlans", |_| Plugin::Filter(Box::new(vlans::Vlans)));
        r.register("hard-filter-volumes-from", |ctx| {
            Plugin::Filter(Box::new(volumes_from::VolumesFrom::new(ctx.resolver.clone())))
        });
        r.register("score-num-owner-zones", |_| {
            Plugin::Scorer(Box::new(owner_zones::NumOwnerZones))
        });
        r.register("score-unreserved-ram", |_| {
            Plugin::Scorer(Box::new(unreserved::UnreservedRam))
        });
        r.register("score-unreserved-disk", |_| {
            Plugin::Scorer(Box::new(unreserved::UnreservedDisk))
        });
        r
    }

    /// Register (or replace) an algorithm under `key`.
    pub fn register<F>(&mut self, key: &'static str, constructor: F)
    where
        F: Fn(&PluginContext) -> Plugin + Send + Sync + 'static,
    {
        self.entries.insert(key, Box::new(constructor));
    }

    /// Instantiate the algorithm registered under `key`.
    pub fn build(&self, key: &str, ctx: &PluginContext) -> Option<Plugin> {
        self.entries.get(key).map(|ctor| ctor(ctx))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.keys().copied()
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
