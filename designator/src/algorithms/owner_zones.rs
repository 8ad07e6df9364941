/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Owner-zone-count scorer.
//!
//! Spreads a tenant's workloads across servers.  A positive
//! `weight_num_owner_zones` favours servers hosting *fewer* of the
//! requesting tenant's VMs; a negative weight packs them together.  The
//! legacy spread policy (package first, then defaults) takes precedence:
//! `min-owner` overrides the numeric weight with [`MIN_OWNER_WEIGHT`], any
//! other policy leaves the servers unscored.

use async_trait::async_trait;

use super::scorers::score_weighted;
use super::{Reasons, Scorer, StageResult};
use crate::pipeline::error::StageError;
use crate::request::Constraints;
use crate::server::Server;

/// Score budget forced by the `min-owner` spread policy.
pub const MIN_OWNER_WEIGHT: f64 = 2.0;

const MIN_OWNER: &str = "min-owner";

pub struct NumOwnerZones;

/// Outcome of applying the legacy spread policy.
#[derive(Debug, PartialEq)]
enum Resolved<'a> {
    Weight(f64),
    /// A spread policy other than `min-owner` is in force.
    Spread(&'a str),
}

fn resolve_weight(constraints: &Constraints) -> Resolved<'_> {
    let spread = constraints
        .pkg
        .as_ref()
        .and_then(|p| p.alloc_server_spread.as_deref())
        .or(constraints.defaults.server_spread.as_deref());

    match spread {
        Some(MIN_OWNER) => Resolved::Weight(MIN_OWNER_WEIGHT),
        Some(other) => Resolved::Spread(other),
        None => Resolved::Weight(constraints.defaults.weight_num_owner_zones),
    }
}

#[async_trait]
impl Scorer for NumOwnerZones {
    fn name(&self) -> &'static str {
        "Score servers based on number of zones belonging to owner"
    }

    async fn score(
        &self,
        mut servers: Vec<Server>,
        constraints: &Constraints,
    ) -> Result<StageResult, StageError> {
        let weight = match resolve_weight(constraints) {
            Resolved::Weight(w) => w,
            Resolved::Spread(spread) => {
                return Ok(StageResult::skipped(
                    servers,
                    format!("pkg or default set to spread with: {}", spread),
                ));
            }
        };
        if !weight.is_finite() {
            return Err(StageError::InvalidWeight {
                setting: "weight_num_owner_zones",
                value: weight,
            });
        }
        if weight == 0.0 {
            return Ok(StageResult::skipped(
                servers,
                "Resolved score weight to 0.00; no changes",
            ));
        }

        let owner = constraints.vm.owner_uuid.as_str();
        let mut reasons = Reasons::new();
        score_weighted(&mut servers, weight, "owner zones", &mut reasons, |s| {
            s.count_owner_vms(owner) as f64
        });

        for server in &servers {
            reasons.append(
                &server.uuid,
                format!("{} owner zones found", server.count_owner_vms(owner)),
            );
        }

        Ok(StageResult::new(servers, reasons))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
