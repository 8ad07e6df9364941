/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Spare-capacity scorers.
//!
//! A positive weight favours servers with more unreserved RAM (or disk),
//! spreading load; a negative weight packs workloads onto the fullest
//! servers.  Servers without derived fields rank as if they had no spare
//! capacity at all.

use async_trait::async_trait;

use super::scorers::score_weighted;
use super::{Reasons, Scorer, StageResult};
use crate::accounting::units::format_amount;
use crate::pipeline::error::StageError;
use crate::request::Constraints;
use crate::server::{Resource, Server};

pub struct UnreservedRam;

pub struct UnreservedDisk;

#[async_trait]
impl Scorer for UnreservedRam {
    fn name(&self) -> &'static str {
        "Score servers based on unreserved RAM"
    }

    async fn score(
        &self,
        servers: Vec<Server>,
        constraints: &Constraints,
    ) -> Result<StageResult, StageError> {
        score_unreserved(
            Resource::Ram,
            "weight_unreserved_ram",
            constraints.defaults.weight_unreserved_ram,
            servers,
        )
    }
}

#[async_trait]
impl Scorer for UnreservedDisk {
    fn name(&self) -> &'static str {
        "Score servers based on unreserved disk"
    }

    async fn score(
        &self,
        servers: Vec<Server>,
        constraints: &Constraints,
    ) -> Result<StageResult, StageError> {
        score_unreserved(
            Resource::Disk,
            "weight_unreserved_disk",
            constraints.defaults.weight_unreserved_disk,
            servers,
        )
    }
}

fn spare(server: &Server, resource: Resource) -> f64 {
    server.unreserved.map_or(0.0, |u| u.get(resource))
}

fn score_unreserved(
    resource: Resource,
    setting: &'static str,
    weight: f64,
    mut servers: Vec<Server>,
) -> Result<StageResult, StageError> {
    if !weight.is_finite() {
        return Err(StageError::InvalidWeight {
            setting,
            value: weight,
        });
    }
    if weight == 0.0 {
        return Ok(StageResult::skipped(
            servers,
            "Resolved score weight to 0.00; no changes",
        ));
    }

    let criterion = format!("unreserved {}", resource);
    let mut reasons = Reasons::new();
    // Smaller key = more favoured, so negate to put the most spare first.
    score_weighted(&mut servers, weight, &criterion, &mut reasons, |s| {
        -spare(s, resource)
    });

    for server in &servers {
        reasons.append(
            &server.uuid,
            format!("{} MiB {} found", format_amount(spare(server, resource)), criterion),
        );
    }

    Ok(StageResult::new(servers, reasons))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
