//! Resource accounting engine.
//!
//! Computes each server's spare ("unreserved") RAM, CPU and disk from its raw
//! inventory, its resident workloads, and its overprovisioning ratios.  No
//! filtering or scoring happens here; the engine only enriches.
//!
//! # Rules
//!
//! | Resource | Unreserved |
//! |---|---|
//! | RAM  | `floor(total_mib × (1 − reservation_ratio)) − Σ vm.ram / ram_ratio` (ratio defaults to 1) |
//! | CPU  | `cores × 100`, minus `Σ vm.cpu_cap / cpu_ratio` **only** when the server declares a CPU ratio |
//! | Disk | `pool_mib − installed_images_mib`, minus the full zvol size **only** when the server declares a disk ratio |
//!
//! CPU is unconstrained by default: contention is left to the node's own
//! scheduler unless an operator opts a server into CPU capping.  Zone and KVM
//! quotas are thin-provisioned and never subtracted.
//!
//! Results may be negative for over-committed servers; they are **not**
//! clamped.

pub mod units;

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::{debug, info};

use crate::server::{Server, Unreserved};
use units::{bytes_to_mib, cores_to_cpu_units};

// ── Error type ────────────────────────────────────────────────────────────────

/// Malformed server data that makes resource arithmetic meaningless.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AccountingError {
    #[error("server '{server}': reservation ratio {ratio} is outside [0, 1)")]
    InvalidReservationRatio { server: String, ratio: f64 },

    #[error("server '{server}': {resource} overprovision ratio {ratio} must be a positive finite number")]
    InvalidOverprovisionRatio {
        server: String,
        resource: &'static str,
        ratio: f64,
    },

    #[error("server '{server}' appears more than once in the inventory")]
    DuplicateServer { server: String },
}

/// A usable overprovisioning ratio is finite and strictly positive.
pub fn is_valid_ratio(ratio: f64) -> bool {
    ratio.is_finite() && ratio > 0.0
}

fn checked_ratio(
    server: &Server,
    resource: &'static str,
    ratio: Option<f64>,
) -> Result<Option<f64>, AccountingError> {
    match ratio {
        Some(r) if !is_valid_ratio(r) => Err(AccountingError::InvalidOverprovisionRatio {
            server: server.uuid.clone(),
            resource,
            ratio: r,
        }),
        other => Ok(other),
    }
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Compute the unreserved capacity of a single server.
///
/// Pure function of the server's raw fields.
///
/// # Errors
/// Returns an [`AccountingError`] if the reservation ratio is outside
/// `[0, 1)` or any declared overprovision ratio is not a positive number.
pub fn calculate_unreserved(server: &Server) -> Result<Unreserved, AccountingError> {
    let rr = server.reservation_ratio;
    if !(rr.is_finite() && (0.0..1.0).contains(&rr)) {
        return Err(AccountingError::InvalidReservationRatio {
            server: server.uuid.clone(),
            ratio: rr,
        });
    }

    let ratios = &server.overprovision_ratios;
    let ram_ratio = checked_ratio(server, "RAM", ratios.ram)?;
    let cpu_ratio = checked_ratio(server, "CPU", ratios.cpu)?;
    let disk_ratio = checked_ratio(server, "disk", ratios.disk)?;

    // RAM
    let total_ram = bytes_to_mib(server.memory_total_bytes);
    let reservable_ram = (total_ram * (1.0 - rr)).floor();
    let resident_ram: u64 = server.vms.values().map(|vm| vm.max_physical_memory).sum();
    let ram = reservable_ram - resident_ram as f64 / ram_ratio.unwrap_or(1.0);

    // CPU
    let total_cpu = cores_to_cpu_units(server.cpu_total_cores);
    let cpu = match cpu_ratio {
        Some(ratio) => {
            let resident_cpu: u64 = server
                .vms
                .values()
                .map(|vm| vm.cpu_cap.unwrap_or(0) as u64)
                .sum();
            total_cpu - resident_cpu as f64 / ratio
        }
        None => total_cpu,
    };

    // Disk
    let pool = bytes_to_mib(server.disk_pool_size_bytes);
    let images = bytes_to_mib(server.disk_installed_images_used_bytes);
    let mut disk = pool - images;
    if disk_ratio.is_some() {
        disk -= bytes_to_mib(server.disk_kvm_zvol_volsize_bytes);
    }

    let unreserved = Unreserved { ram, cpu, disk };

    debug!(
        server = %server.uuid,
        unreserved_ram  = unreserved.ram,
        unreserved_cpu  = unreserved.cpu,
        unreserved_disk = unreserved.disk,
        "computed unreserved capacity"
    );

    Ok(unreserved)
}

/// Populate the derived capacity fields of every server.
///
/// Consumes the inventory snapshot and returns it enriched.  Fails fast on the
/// first malformed server or repeated server id; no partially enriched
/// inventory is returned.
pub fn enrich(mut servers: Vec<Server>) -> Result<Vec<Server>, AccountingError> {
    let mut seen = BTreeSet::new();
    for server in &servers {
        if !seen.insert(server.uuid.as_str()) {
            return Err(AccountingError::DuplicateServer {
                server: server.uuid.clone(),
            });
        }
    }

    for server in servers.iter_mut() {
        server.unreserved = Some(calculate_unreserved(server)?);
    }
    info!(server_count = servers.len(), "inventory enriched");
    Ok(servers)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
