/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Network-tag (VLAN) hard filter.
//!
//! A server is admitted only if, for every tag the VM requires, at least one
//! of its NICs (physical or overlay) carries the tag and is link-up.  Tags
//! are checked in request order and the first failing tag is reported.

use async_trait::async_trait;
use tracing::debug;

use super::{Filter, Reasons, RejectReason, StageResult};
use crate::pipeline::error::StageError;
use crate::request::Constraints;
use crate::server::{LinkState, Server};

pub struct Vlans;

#[async_trait]
impl Filter for Vlans {
    fn name(&self) -> &'static str {
        "Servers with required network tags"
    }

    async fn filter(
        &self,
        servers: Vec<Server>,
        constraints: &Constraints,
    ) -> Result<StageResult, StageError> {
        let tags = &constraints.vm.nic_tags;
        let mut reasons = Reasons::new();
        if tags.is_empty() {
            return Ok(StageResult::new(servers, reasons));
        }

        let mut kept = Vec::with_capacity(servers.len());
        for server in servers {
            match first_unreachable_tag(&server, tags)? {
                None => kept.push(server),
                Some(reason) => {
                    debug!(server = %server.uuid, %reason, "excluded");
                    reasons.reject(&server.uuid, &reason);
                }
            }
        }

        Ok(StageResult::new(kept, reasons))
    }
}

/// Reject NICs with an unknown link status among those carrying any
/// required tag, regardless of where they sit in the NIC list.
fn validate_links(server: &Server, tags: &[String]) -> Result<(), StageError> {
    let malformed = server
        .nics
        .iter()
        .filter(|n| tags.iter().any(|t| n.carries_tag(t)))
        .find(|n| n.link_state().is_none());

    match malformed {
        Some(nic) => Err(StageError::MalformedNic {
            server: server.uuid.clone(),
            nic: nic.name.clone(),
            status: nic.link_status.clone(),
        }),
        None => Ok(()),
    }
}

fn first_unreachable_tag(
    server: &Server,
    tags: &[String],
) -> Result<Option<RejectReason>, StageError> {
    validate_links(server, tags)?;

    for tag in tags {
        let carriers: Vec<_> = server.nics.iter().filter(|n| n.carries_tag(tag)).collect();
        if carriers.is_empty() {
            return Ok(Some(RejectReason::MissingVlan { tag: tag.clone() }));
        }
        if carriers.iter().any(|n| n.link_state() == Some(LinkState::Up)) {
            continue;
        }
        // Every carrier is down once links are validated.
        return Ok(Some(RejectReason::NicDown {
            nic: carriers[0].name.clone(),
            tag: tag.clone(),
        }));
    }
    Ok(None)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
