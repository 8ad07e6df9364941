/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-stage explanations.
//!
//! * [`RejectReason`]: why one server was excluded by a hard filter
//!   (typed, carries exact values).
//! * [`Reasons`]: the map a stage returns: server id → human-readable text,
//!   plus the reserved `skip` entry meaning "this stage changed nothing".
//!
//! `Reasons` serialises as a flat map so the `skip` key sits next to the
//! server ids, which is the shape operators read in the diagnostic trail.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::accounting::units::format_amount;
use crate::server::Resource;

// ── RejectReason ──────────────────────────────────────────────────────────────

/// Detailed reason why a server was excluded by a hard filter.
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    /// The accounting engine has not populated the server's derived fields.
    NoUnreservedData { resource: Resource },

    /// The package declares no overprovision ratio for `resource`, but the
    /// server expects one.
    RatioMismatch { resource: Resource, server_ratio: f64 },

    /// The request, scaled by the effective ratio, does not fit.
    InsufficientCapacity {
        resource: Resource,
        calculated: f64,
        spare: f64,
    },

    /// No NIC on the server carries `tag`.
    MissingVlan { tag: String },

    /// NICs carry `tag` but none is link-up; `nic` is the first one found.
    NicDown { nic: String, tag: String },

    /// A volumes-from dependency is not resident on this server.
    MissingVolumesFrom { vm_uuid: String },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::NoUnreservedData { resource } => {
                write!(f, "Server has no unreserved {} data to evaluate", resource)
            }

            RejectReason::RatioMismatch {
                resource,
                server_ratio,
            } => write!(
                f,
                "Package gave no {} overprovision ratio, but server has ratio {}",
                resource,
                format_amount(*server_ratio)
            ),

            RejectReason::InsufficientCapacity {
                resource,
                calculated,
                spare,
            } => write!(
                f,
                "VM's calculated {} {} is less than server's spare {}",
                format_amount(*calculated),
                resource,
                format_amount(*spare)
            ),

            RejectReason::MissingVlan { tag } => write!(f, "Server missing vlan \"{}\"", tag),

            RejectReason::NicDown { nic, tag } => {
                write!(f, "NIC {} for tag \"{}\" is down", nic, tag)
            }

            RejectReason::MissingVolumesFrom { vm_uuid } => write!(
                f,
                "VM needs volumes from {}, which was not found on server",
                vm_uuid
            ),
        }
    }
}

// ── Reasons ───────────────────────────────────────────────────────────────────

/// Explanations produced by one stage.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Reasons {
    #[serde(skip_serializing_if = "Option::is_none")]
    skip: Option<String>,

    #[serde(flatten)]
    servers: BTreeMap<String, String>,
}

impl Reasons {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reasons for a stage that did not apply to this request.
    pub fn skipped(why: impl Into<String>) -> Self {
        Self {
            skip: Some(why.into()),
            servers: BTreeMap::new(),
        }
    }

    pub fn skip_reason(&self) -> Option<&str> {
        self.skip.as_deref()
    }

    pub fn is_skip(&self) -> bool {
        self.skip.is_some()
    }

    /// Set (replace) the explanation for `server`.
    pub fn insert(&mut self, server: &str, reason: impl Into<String>) {
        self.servers.insert(server.to_string(), reason.into());
    }

    /// Record an exclusion.
    pub fn reject(&mut self, server: &str, reason: &RejectReason) {
        self.insert(server, reason.to_string());
    }

    /// Extend the explanation for `server`, joining with `"; "`.
    pub fn append(&mut self, server: &str, text: impl AsRef<str>) {
        let text = text.as_ref();
        self.servers
            .entry(server.to_string())
            .and_modify(|r| {
                r.push_str("; ");
                r.push_str(text);
            })
            .or_insert_with(|| text.to_string());
    }

    pub fn get(&self, server: &str) -> Option<&str> {
        self.servers.get(server).map(String::as_str)
    }

    /// Number of per-server entries (the `skip` entry is not counted).
    pub fn len(&self) -> usize {
        self.servers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.skip.is_none() && self.servers.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.servers.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
