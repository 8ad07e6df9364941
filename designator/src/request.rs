/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Placement request data structures.
//!
//! A placement request is the VM being placed, the package (resource tier)
//! it was ordered with, the image it boots from, and the process-wide
//! [`Defaults`].  The four are bundled into one request-scoped
//! [`Constraints`] value that is passed by reference to every stage; no
//! stage reads ambient or global configuration.

use serde::{Deserialize, Serialize};

// ── Brand ─────────────────────────────────────────────────────────────────────

/// Virtualization brand of a workload.
///
/// Hardware-virtualized brands (`kvm`, `bhyve`) differ from OS-level
/// containers in how RAM and disk are accounted for.  Unknown brand strings
/// are preserved in [`Brand::Other`] rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Brand {
    /// Native OS container.
    #[default]
    Joyent,
    JoyentMinimal,
    /// Linux-branded container.
    Lx,
    Kvm,
    Bhyve,
    Other(String),
}

impl Brand {
    /// Returns `true` for hardware-virtualized brands.
    pub fn is_hvm(&self) -> bool {
        matches!(self, Brand::Kvm | Brand::Bhyve)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Brand::Joyent => "joyent",
            Brand::JoyentMinimal => "joyent-minimal",
            Brand::Lx => "lx",
            Brand::Kvm => "kvm",
            Brand::Bhyve => "bhyve",
            Brand::Other(s) => s,
        }
    }
}

impl From<String> for Brand {
    fn from(s: String) -> Self {
        match s.as_str() {
            "joyent" => Brand::Joyent,
            "joyent-minimal" => Brand::JoyentMinimal,
            "lx" => Brand::Lx,
            "kvm" => Brand::Kvm,
            "bhyve" => Brand::Bhyve,
            _ => Brand::Other(s),
        }
    }
}

impl From<Brand> for String {
    fn from(b: Brand) -> Self {
        b.as_str().to_string()
    }
}

impl std::fmt::Display for Brand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Vm (the workload being placed) ────────────────────────────────────────────

/// The workload being placed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vm {
    /// Requesting tenant.
    #[serde(default)]
    pub owner_uuid: String,

    /// Requested RAM in MiB.  `None` = no RAM constraint to evaluate.
    #[serde(default)]
    pub ram: Option<u64>,

    /// Requested CPU cap in hundredths of a core.
    #[serde(default)]
    pub cpu_cap: Option<u32>,

    /// Requested disk quota in GiB.
    #[serde(default)]
    pub quota: Option<u64>,

    #[serde(default)]
    pub brand: Brand,

    /// Network tags the workload must be able to reach.
    #[serde(default)]
    pub nic_tags: Vec<String>,

    /// `true` for Docker containers (the only workloads that can mount
    /// another workload's volumes).
    #[serde(default)]
    pub docker: bool,

    /// Identifiers of workloads whose volumes this one mounts.
    ///
    /// `None` = the request carries no dependency metadata at all;
    /// `Some(vec![])` = metadata present but lists nothing.
    #[serde(default)]
    pub volumes_from: Option<Vec<String>>,
}

// ── Package ───────────────────────────────────────────────────────────────────

/// The requested resource tier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Package {
    #[serde(default)]
    pub overprovision_cpu: Option<f64>,
    #[serde(default)]
    pub overprovision_ram: Option<f64>,
    #[serde(default)]
    pub overprovision_disk: Option<f64>,

    /// Legacy spread policy; overrides [`Defaults::server_spread`].
    #[serde(default)]
    pub alloc_server_spread: Option<String>,
}

// ── Image ─────────────────────────────────────────────────────────────────────

/// The image the workload boots from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Image {
    #[serde(default)]
    pub uuid: Option<String>,

    /// Size of the image's root volume in MiB.  Only hardware-virtualized
    /// workloads consume it on top of their quota.
    #[serde(default)]
    pub image_size: Option<u64>,
}

// ── Defaults ──────────────────────────────────────────────────────────────────

/// Process-wide fallback configuration, threaded into each request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Defaults {
    /// Deprecated spread policy (`min-owner` et al.).
    #[serde(default)]
    pub server_spread: Option<String>,

    /// `false` disables the minimum-resource filters entirely.
    #[serde(default = "default_true")]
    pub filter_min_resources: bool,

    #[serde(default)]
    pub weight_num_owner_zones: f64,

    #[serde(default = "default_weight_unreserved_ram")]
    pub weight_unreserved_ram: f64,

    #[serde(default = "default_weight_unreserved_disk")]
    pub weight_unreserved_disk: f64,
}

fn default_true() -> bool {
    true
}

fn default_weight_unreserved_ram() -> f64 {
    2.0
}

fn default_weight_unreserved_disk() -> f64 {
    1.0
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            server_spread: None,
            filter_min_resources: true,
            weight_num_owner_zones: 0.0,
            weight_unreserved_ram: default_weight_unreserved_ram(),
            weight_unreserved_disk: default_weight_unreserved_disk(),
        }
    }
}

// ── Constraints ───────────────────────────────────────────────────────────────

/// Everything a stage may consult about the request, scoped to one
/// placement run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    pub vm: Vm,
    pub pkg: Option<Package>,
    pub img: Option<Image>,
    pub defaults: Defaults,
}

impl Constraints {
    pub fn new(vm: Vm, defaults: Defaults) -> Self {
        Self {
            vm,
            pkg: None,
            img: None,
            defaults,
        }
    }

    pub fn with_package(mut self, pkg: Package) -> Self {
        self.pkg = Some(pkg);
        self
    }

    pub fn with_image(mut self, img: Image) -> Self {
        self.img = Some(img);
        self
    }
}

// ── PlacementRequest ──────────────────────────────────────────────────────────

/// A placement request as supplied by the request-handling layer, before
/// process defaults are attached.
///
/// ```yaml
/// vm:
///   owner_uuid: 930896af-bf8c-48d4-885c-6573a94b1853
///   ram: 512
///   nic_tags: [external]
/// package:
///   overprovision_ram: 1.0
/// image:
///   image_size: 10240
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlacementRequest {
    pub vm: Vm,
    #[serde(default)]
    pub package: Option<Package>,
    #[serde(default)]
    pub image: Option<Image>,
}

impl PlacementRequest {
    /// Bundle the request with `defaults` into the value every stage reads.
    pub fn into_constraints(self, defaults: Defaults) -> Constraints {
        Constraints {
            vm: self.vm,
            pkg: self.package,
            img: self.image,
            defaults,
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
