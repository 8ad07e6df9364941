/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{error, info, warn};

use designator::algorithms::{AlgorithmRegistry, PluginContext, Reasons};
use designator::config::{self, ConfigManager};
use designator::pipeline::{Designation, Pipeline};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Designator placement engine.
///
/// Example:
///   designator -i servers.yaml -r request.yaml \
///              --config designator.yaml --vm-lookup vms.yaml
#[derive(Debug, Parser)]
#[command(
    name = "designator",
    about = "Designator – choose a server for a VM placement request",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML server inventory (`servers:` list).
    #[arg(short = 'i', long = "inventory")]
    inventory: PathBuf,

    /// Path to the YAML placement request (`vm`, `package`, `image`).
    #[arg(short = 'r', long = "request")]
    request: PathBuf,

    /// Path to the YAML designator configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Path to a YAML VM-lookup table used to resolve volumes-from
    /// dependencies that are not in the inventory.
    #[arg(short = 'l', long = "vm-lookup")]
    vm_lookup: Option<PathBuf>,
}

// ── Output shape ──────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct RankedServer<'a> {
    uuid: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    score: Option<f64>,
}

#[derive(Debug, Serialize)]
struct Step<'a> {
    step: &'a str,
    remaining: usize,
    reasons: &'a Reasons,
}

#[derive(Debug, Serialize)]
struct Summary<'a> {
    servers: Vec<RankedServer<'a>>,
    steps: Vec<Step<'a>>,
}

impl<'a> From<&'a Designation> for Summary<'a> {
    fn from(d: &'a Designation) -> Self {
        Self {
            servers: d
                .servers
                .iter()
                .map(|s| RankedServer {
                    uuid: &s.uuid,
                    score: s.score,
                })
                .collect(),
            steps: d
                .steps
                .iter()
                .map(|s| Step {
                    step: &s.step,
                    remaining: s.remaining,
                    reasons: &s.reasons,
                })
                .collect(),
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    info!(
        inventory = %cli.inventory.display(),
        request   = %cli.request.display(),
        config    = ?cli.config,
        vm_lookup = ?cli.vm_lookup,
        "Designator starting"
    );

    if let Err(e) = run(cli).await {
        error!("Placement failed: {:#}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    // ── Configuration ─────────────────────────────────────────────────────────
    let mut manager = ConfigManager::new();
    match &cli.config {
        Some(path) => manager.load_from_file(path)?,
        None => warn!("No configuration file provided, using default pipeline"),
    }
    let cfg = manager.config();

    // ── Inputs ────────────────────────────────────────────────────────────────
    let inventory = config::load_inventory(&cli.inventory)?;
    let request = config::load_request(&cli.request)?;
    let constraints = request.into_constraints(cfg.defaults.clone());

    let ctx = match &cli.vm_lookup {
        Some(path) => PluginContext::with_resolver(Arc::new(config::load_vm_lookup(path)?)),
        None => PluginContext::default(),
    };

    // ── Pipeline ──────────────────────────────────────────────────────────────
    let registry = AlgorithmRegistry::with_builtins();
    let mut pipeline = Pipeline::from_names(&registry, cfg.pipeline.as_slice(), &ctx)?;
    if let Some(deadline) = cfg.deadline {
        pipeline = pipeline.with_deadline(deadline);
    }
    info!(
        stages   = ?pipeline.stage_names(),
        deadline = ?pipeline.deadline(),
        "Pipeline ready"
    );

    let designation = pipeline.run(inventory, &constraints).await?;

    match designation.best() {
        Some(best) => info!(server = %best.uuid, score = ?best.score, "Selected server"),
        None => warn!("No server can host the requested VM"),
    }

    let yaml = serde_yaml::to_string(&Summary::from(&designation))
        .context("Failed to serialise placement result")?;
    print!("{}", yaml);

    Ok(())
}
