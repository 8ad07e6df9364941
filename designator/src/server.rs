/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Server inventory records for the Designator placement engine.
//!
//! One [`Server`] describes a candidate host as supplied by the inventory
//! layer, plus the fields the engine derives while processing a single
//! placement request:
//!
//! ```text
//! inventory ──(Server, raw)──►  accounting  ──(Server + Unreserved)──►  pipeline  ──(Server + score)──►  caller
//!                               ↑ enrich only                           ↑ filter / score
//! ```
//!
//! # Ownership model
//! Servers are **owned** by the pipeline for the duration of one placement
//! run.  The caller moves `Vec<Server>` in; every stage consumes the previous
//! stage's vector and returns a new one, so there is never shared mutable
//! state between stages or between concurrent requests.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::request::Brand;

// ── Resource kinds ────────────────────────────────────────────────────────────

/// The three accounted resources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    Ram,
    Cpu,
    Disk,
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Resource::Ram => "RAM",
            Resource::Cpu => "CPU",
            Resource::Disk => "disk",
        })
    }
}

// ── Overprovisioning ──────────────────────────────────────────────────────────

/// Per-resource overprovisioning ratios declared by a server.
///
/// A missing ratio is meaningful: for CPU it means "CPU is not a reserved
/// resource on this server", for disk it means "backing volumes are not
/// reserved", and for RAM it means "count resident RAM at face value".
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OverprovisionRatios {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ram: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disk: Option<f64>,
}

impl OverprovisionRatios {
    pub fn get(&self, resource: Resource) -> Option<f64> {
        match resource {
            Resource::Ram => self.ram,
            Resource::Cpu => self.cpu,
            Resource::Disk => self.disk,
        }
    }
}

// ── Resident workloads ────────────────────────────────────────────────────────

/// Footprint of a workload already running on a server.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResidentVm {
    /// Tenant that owns the workload.
    #[serde(default)]
    pub owner_uuid: Option<String>,

    #[serde(default)]
    pub brand: Brand,

    /// CPU cap in hundredths of a core.  `None` = uncapped.
    #[serde(default)]
    pub cpu_cap: Option<u32>,

    /// Disk quota in GiB.
    #[serde(default)]
    pub quota: u64,

    /// RAM allocation in MiB.
    #[serde(default)]
    pub max_physical_memory: u64,
}

// ── Network interfaces ────────────────────────────────────────────────────────

/// Whether a NIC belongs to the physical or the virtual (overlay) inventory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NicKind {
    #[default]
    Physical,
    Virtual,
}

/// Link state of a NIC after parsing the inventory's raw status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Up,
    Down,
}

/// One network interface as reported by the server's sysinfo.
///
/// `link_status` is kept as the raw inventory string; it is validated when a
/// stage actually needs it (see [`Nic::link_state`]) so that malformed
/// inventory surfaces as an error from the stage that relies on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nic {
    pub name: String,

    #[serde(default)]
    pub kind: NicKind,

    pub link_status: String,

    /// Network tags reachable through this interface (NIC names for
    /// physical interfaces, overlay tags for virtual ones).
    #[serde(default)]
    pub tags: Vec<String>,
}

impl Nic {
    /// Parse `link_status`.  Returns `None` for anything other than `up` /
    /// `down` (case-insensitive).
    pub fn link_state(&self) -> Option<LinkState> {
        match self.link_status.to_ascii_lowercase().as_str() {
            "up" => Some(LinkState::Up),
            "down" => Some(LinkState::Down),
            _ => None,
        }
    }

    pub fn carries_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

// ── Derived capacity ──────────────────────────────────────────────────────────

/// Spare capacity computed by the accounting engine.
///
/// RAM and disk are in MiB, CPU in hundredths of a core.  Values can be
/// negative when a server is already over-committed; filters treat that as
/// insufficient rather than clamping.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Unreserved {
    pub ram: f64,
    pub cpu: f64,
    pub disk: f64,
}

impl Unreserved {
    pub fn get(&self, resource: Resource) -> f64 {
        match resource {
            Resource::Ram => self.ram,
            Resource::Cpu => self.cpu,
            Resource::Disk => self.disk,
        }
    }
}

// ── Server ────────────────────────────────────────────────────────────────────

/// A candidate host for a placement request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    // ── Identity ──────────────────────────────────────────────────────────────
    pub uuid: String,

    // ── Raw capacity ──────────────────────────────────────────────────────────
    #[serde(default)]
    pub memory_total_bytes: u64,

    #[serde(default)]
    pub disk_pool_size_bytes: u64,

    #[serde(default)]
    pub cpu_total_cores: u32,

    // ── Allocated-disk accounting inputs ──────────────────────────────────────
    #[serde(default)]
    pub disk_installed_images_used_bytes: u64,

    /// Sum of container zone quotas.  Informational only.
    #[serde(default)]
    pub disk_zone_quota_bytes: u64,

    /// Sum of hardware-virtualized VM quotas.  Informational only.
    #[serde(default)]
    pub disk_kvm_quota_bytes: u64,

    /// Size of hardware-virtualized backing volumes (zvols).
    #[serde(default)]
    pub disk_kvm_zvol_volsize_bytes: u64,

    /// Fraction of total RAM withheld as operational margin.
    #[serde(default)]
    pub reservation_ratio: f64,

    #[serde(default)]
    pub overprovision_ratios: OverprovisionRatios,

    // ── Resident workloads & network ──────────────────────────────────────────
    /// VM uuid → footprint.  `BTreeMap` keeps iteration deterministic.
    #[serde(default)]
    pub vms: BTreeMap<String, ResidentVm>,

    #[serde(default)]
    pub nics: Vec<Nic>,

    // ── Derived (filled by the pipeline) ──────────────────────────────────────
    /// `None` until the accounting engine has run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unreserved: Option<Unreserved>,

    /// `None` until a scorer touches the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
}

impl Server {
    /// Minimal server with the given id and no capacity.  Mostly useful for
    /// tests and for building fixtures field by field.
    pub fn new(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            memory_total_bytes: 0,
            disk_pool_size_bytes: 0,
            cpu_total_cores: 0,
            disk_installed_images_used_bytes: 0,
            disk_zone_quota_bytes: 0,
            disk_kvm_quota_bytes: 0,
            disk_kvm_zvol_volsize_bytes: 0,
            reservation_ratio: 0.0,
            overprovision_ratios: OverprovisionRatios::default(),
            vms: BTreeMap::new(),
            nics: Vec::new(),
            unreserved: None,
            score: None,
        }
    }

    /// Increase the desirability score.  Scores never go down.
    pub fn add_score(&mut self, delta: f64) {
        debug_assert!(delta >= 0.0, "score delta must be non-negative, got {delta}");
        self.score = Some(self.score.unwrap_or(0.0) + delta.max(0.0));
    }

    /// Number of resident workloads owned by `owner_uuid`.
    pub fn count_owner_vms(&self, owner_uuid: &str) -> usize {
        self.vms
            .values()
            .filter(|vm| vm.owner_uuid.as_deref() == Some(owner_uuid))
            .count()
    }

    pub fn hosts_vm(&self, vm_uuid: &str) -> bool {
        self.vms.contains_key(vm_uuid)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
