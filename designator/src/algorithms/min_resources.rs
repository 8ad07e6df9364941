/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Minimum-resource hard filters: CPU, RAM and disk.
//!
//! The three filters share one admission rule and differ only in which
//! request field and which derived capacity they compare:
//!
//! 1. `defaults.filter_min_resources == false` → skip.
//! 2. The VM requests nothing for the resource → skip.
//! 3. Package present but silent on the ratio while the server declares one
//!    → exclude (the two disagree about whether the resource is sold at a
//!    discount).
//! 4. Effective ratio = package ratio, else server ratio.  CPU and disk
//!    with no effective ratio are uncapped and every server passes; RAM is
//!    always enforced, at face value when no ratio applies.
//! 5. Admit iff `requested / effective_ratio <= unreserved`.
//!
//! Hardware-virtualized guests touch all of their memory, so their RAM is
//! never discounted regardless of ratios.

use async_trait::async_trait;
use tracing::debug;

use super::{Filter, Reasons, RejectReason, StageResult};
use crate::accounting::is_valid_ratio;
use crate::accounting::units::gib_to_mib;
use crate::pipeline::error::StageError;
use crate::request::{Constraints, Package};
use crate::server::{Resource, Server};

// ── Filters ───────────────────────────────────────────────────────────────────

/// Servers with enough unreserved CPU for the VM's cap.
pub struct MinCpu;

/// Servers with enough unreserved RAM.
pub struct MinRam;

/// Servers with enough unreserved disk.
pub struct MinDisk;

#[async_trait]
impl Filter for MinCpu {
    fn name(&self) -> &'static str {
        "Servers with enough unreserved CPU"
    }

    async fn filter(
        &self,
        servers: Vec<Server>,
        constraints: &Constraints,
    ) -> Result<StageResult, StageError> {
        filter_min_resource(Resource::Cpu, servers, constraints)
    }
}

#[async_trait]
impl Filter for MinRam {
    fn name(&self) -> &'static str {
        "Servers with enough unreserved RAM"
    }

    async fn filter(
        &self,
        servers: Vec<Server>,
        constraints: &Constraints,
    ) -> Result<StageResult, StageError> {
        filter_min_resource(Resource::Ram, servers, constraints)
    }
}

#[async_trait]
impl Filter for MinDisk {
    fn name(&self) -> &'static str {
        "Servers with enough unreserved disk"
    }

    async fn filter(
        &self,
        servers: Vec<Server>,
        constraints: &Constraints,
    ) -> Result<StageResult, StageError> {
        filter_min_resource(Resource::Disk, servers, constraints)
    }
}

// ── Shared rule ───────────────────────────────────────────────────────────────

/// Amount of `resource` the VM asks for, in engine units.
fn requested_amount(resource: Resource, constraints: &Constraints) -> Option<f64> {
    let vm = &constraints.vm;
    match resource {
        Resource::Cpu => vm.cpu_cap.map(f64::from),
        Resource::Ram => vm.ram.map(|r| r as f64),
        Resource::Disk => vm.quota.map(|quota| {
            let mut mib = gib_to_mib(quota);
            if vm.brand.is_hvm() {
                let image = constraints.img.as_ref().and_then(|i| i.image_size);
                mib = mib.saturating_add(image.unwrap_or(0));
            }
            mib as f64
        }),
    }
}

fn package_ratio(resource: Resource, pkg: &Package) -> Option<f64> {
    match resource {
        Resource::Cpu => pkg.overprovision_cpu,
        Resource::Ram => pkg.overprovision_ram,
        Resource::Disk => pkg.overprovision_disk,
    }
}

fn filter_min_resource(
    resource: Resource,
    servers: Vec<Server>,
    constraints: &Constraints,
) -> Result<StageResult, StageError> {
    if !constraints.defaults.filter_min_resources {
        return Ok(StageResult::skipped(
            servers,
            format!("Do not filter out based on minimum free {}", resource),
        ));
    }

    let requested = match requested_amount(resource, constraints) {
        Some(r) => r,
        None => {
            return Ok(StageResult::skipped(
                servers,
                format!("VM has no {} requirement to evaluate", resource),
            ))
        }
    };

    // Outer None: no package at all.  Inner None: package without a ratio.
    let pkg_ratio = constraints.pkg.as_ref().map(|p| package_ratio(resource, p));
    if let Some(Some(ratio)) = pkg_ratio {
        if !is_valid_ratio(ratio) {
            return Err(StageError::InvalidPackageRatio { resource, ratio });
        }
    }

    let hvm = constraints.vm.brand.is_hvm();
    let mut reasons = Reasons::new();
    let mut kept = Vec::with_capacity(servers.len());

    for server in servers {
        match evaluate(resource, requested, pkg_ratio, hvm, &server)? {
            None => kept.push(server),
            Some(reason) => {
                debug!(server = %server.uuid, %reason, "excluded");
                reasons.reject(&server.uuid, &reason);
            }
        }
    }

    Ok(StageResult::new(kept, reasons))
}

/// `Ok(None)` admits the server; `Ok(Some(_))` excludes it.
fn evaluate(
    resource: Resource,
    requested: f64,
    pkg_ratio: Option<Option<f64>>,
    hvm: bool,
    server: &Server,
) -> Result<Option<RejectReason>, StageError> {
    let server_ratio = server.overprovision_ratios.get(resource);
    if let Some(ratio) = server_ratio {
        if !is_valid_ratio(ratio) {
            return Err(StageError::InvalidServerRatio {
                server: server.uuid.clone(),
                resource,
                ratio,
            });
        }
    }

    let effective = match pkg_ratio {
        Some(None) => {
            if let Some(ratio) = server_ratio {
                return Ok(Some(RejectReason::RatioMismatch {
                    resource,
                    server_ratio: ratio,
                }));
            }
            None
        }
        Some(Some(ratio)) => Some(ratio),
        None => server_ratio,
    };

    let divisor = match (resource, effective) {
        (Resource::Ram, _) if hvm => 1.0,
        // RAM has no uncapped mode; without a ratio it is checked at face value.
        (Resource::Ram, ratio) => ratio.unwrap_or(1.0),
        (_, Some(ratio)) => ratio,
        // Uncapped resource
        (_, None) => return Ok(None),
    };

    let spare = match server.unreserved {
        Some(u) => u.get(resource),
        None => return Ok(Some(RejectReason::NoUnreservedData { resource })),
    };

    let calculated = requested / divisor;
    if calculated <= spare {
        Ok(None)
    } else {
        Ok(Some(RejectReason::InsufficientCapacity {
            resource,
            calculated,
            spare,
        }))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::{Brand, Defaults, Image, Vm};
    use crate::server::Unreserved;

    fn server(uuid: &str, resource: Resource, spare: f64, ratio: Option<f64>) -> Server {
        let mut s = Server::new(uuid);
        let mut u = Unreserved {
            ram: 0.0,
            cpu: 0.0,
            disk: 0.0,
        };
        match resource {
            Resource::Ram => {
                u.ram = spare;
                s.overprovision_ratios.ram = ratio;
            }
            Resource::Cpu => {
                u.cpu = spare;
                s.overprovision_ratios.cpu = ratio;
            }
            Resource::Disk => {
                u.disk = spare;
                s.overprovision_ratios.disk = ratio;
            }
        }
        s.unreserved = Some(u);
        s
    }

    fn cpu_servers(ratio_for_all: Option<f64>) -> Vec<Server> {
        vec![
            server("s400", Resource::Cpu, 400.0, ratio_for_all),
            server("s590", Resource::Cpu, 590.0, ratio_for_all),
            server("s610", Resource::Cpu, 610.0, Some(1.0)),
            server("s900", Resource::Cpu, 900.0, Some(1.0)),
        ]
    }

    fn cpu_request(cpu_cap: Option<u32>) -> Vm {
        Vm {
            cpu_cap,
            ..Default::default()
        }
    }

    fn ids(result: &StageResult) -> Vec<&str> {
        result.servers.iter().map(|s| s.uuid.as_str()).collect()
    }

    // ── CPU ───────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn cpu_package_without_ratio_rejects_servers_that_declare_one() {
        let c = Constraints::new(cpu_request(Some(900)), Defaults::default())
            .with_package(Package::default());
        let out = MinCpu.filter(cpu_servers(None), &c).await.unwrap();

        assert_eq!(ids(&out), vec!["s400", "s590"]);
        assert_eq!(
            out.reasons.get("s610"),
            Some("Package gave no CPU overprovision ratio, but server has ratio 1")
        );
        assert_eq!(out.reasons.len(), 2);
    }

    #[tokio::test]
    async fn cpu_with_package_ratio_scales_request() {
        let c = Constraints::new(cpu_request(Some(900)), Defaults::default()).with_package(
            Package {
                overprovision_cpu: Some(1.5),
                ..Default::default()
            },
        );
        let out = MinCpu.filter(cpu_servers(Some(1.0)), &c).await.unwrap();

        assert_eq!(ids(&out), vec!["s610", "s900"]);
        assert_eq!(
            out.reasons.get("s400"),
            Some("VM's calculated 600 CPU is less than server's spare 400")
        );
        assert_eq!(
            out.reasons.get("s590"),
            Some("VM's calculated 600 CPU is less than server's spare 590")
        );
    }

    #[tokio::test]
    async fn cpu_without_package_falls_back_to_server_ratio() {
        let c = Constraints::new(cpu_request(Some(900)), Defaults::default());
        let out = MinCpu.filter(cpu_servers(None), &c).await.unwrap();

        // s400/s590 are uncapped; s610 has ratio 1 and only 610 spare.
        assert_eq!(ids(&out), vec!["s400", "s590", "s900"]);
        assert_eq!(
            out.reasons.get("s610"),
            Some("VM's calculated 900 CPU is less than server's spare 610")
        );
    }

    #[tokio::test]
    async fn cpu_disabled_by_defaults_flag() {
        let defaults = Defaults {
            filter_min_resources: false,
            ..Default::default()
        };
        let c = Constraints::new(cpu_request(Some(900)), defaults).with_package(Package::default());
        let servers = cpu_servers(Some(1.0));
        let out = MinCpu.filter(servers.clone(), &c).await.unwrap();
        assert_eq!(out.servers, servers);
        assert!(out.reasons.is_skip());
    }

    #[tokio::test]
    async fn cpu_without_cap_skips() {
        let c = Constraints::new(cpu_request(None), Defaults::default());
        let servers = cpu_servers(Some(1.0));
        let out = MinCpu.filter(servers.clone(), &c).await.unwrap();
        assert_eq!(out.servers, servers);
        assert_eq!(
            out.reasons.skip_reason(),
            Some("VM has no CPU requirement to evaluate")
        );
    }

    #[tokio::test]
    async fn no_servers_gives_empty_reasons() {
        let c = Constraints::new(cpu_request(Some(900)), Defaults::default()).with_package(
            Package {
                overprovision_cpu: Some(1.0),
                ..Default::default()
            },
        );
        let out = MinCpu.filter(vec![], &c).await.unwrap();
        assert!(out.servers.is_empty());
        assert!(out.reasons.is_empty());
    }

    #[tokio::test]
    async fn invalid_package_ratio_is_an_error() {
        let c = Constraints::new(cpu_request(Some(900)), Defaults::default()).with_package(
            Package {
                overprovision_cpu: Some(-1.0),
                ..Default::default()
            },
        );
        let err = MinCpu.filter(cpu_servers(None), &c).await.unwrap_err();
        assert!(matches!(
            err,
            StageError::InvalidPackageRatio {
                resource: Resource::Cpu,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn invalid_server_ratio_is_an_error() {
        let c = Constraints::new(cpu_request(Some(900)), Defaults::default());
        let servers = vec![server("bad", Resource::Cpu, 900.0, Some(f64::NAN))];
        let err = MinCpu.filter(servers, &c).await.unwrap_err();
        assert!(matches!(err, StageError::InvalidServerRatio { .. }));
    }

    #[tokio::test]
    async fn server_without_derived_fields_is_excluded() {
        let c = Constraints::new(cpu_request(Some(100)), Defaults::default());
        let mut s = Server::new("raw");
        s.overprovision_ratios.cpu = Some(1.0);
        let out = MinCpu.filter(vec![s], &c).await.unwrap();
        assert!(out.servers.is_empty());
        assert_eq!(
            out.reasons.get("raw"),
            Some("Server has no unreserved CPU data to evaluate")
        );
    }

    // ── RAM ───────────────────────────────────────────────────────────────────

    fn ram_request(ram: u64, brand: Brand) -> Vm {
        Vm {
            ram: Some(ram),
            brand,
            ..Default::default()
        }
    }

    fn ram_servers(ratio: Option<f64>) -> Vec<Server> {
        vec![
            server("s256", Resource::Ram, 256.0, ratio),
            server("s511", Resource::Ram, 511.0, ratio),
            server("s512", Resource::Ram, 512.0, ratio),
            server("s768", Resource::Ram, 768.0, ratio),
        ]
    }

    #[tokio::test]
    async fn ram_is_enforced_at_face_value_without_ratios() {
        let c = Constraints::new(ram_request(512, Brand::Joyent), Defaults::default())
            .with_package(Package::default());
        let out = MinRam.filter(ram_servers(None), &c).await.unwrap();

        assert_eq!(ids(&out), vec!["s512", "s768"]);
        assert_eq!(
            out.reasons.get("s256"),
            Some("VM's calculated 512 RAM is less than server's spare 256")
        );
    }

    #[tokio::test]
    async fn ram_package_without_ratio_rejects_servers_that_declare_one() {
        let c = Constraints::new(ram_request(512, Brand::Joyent), Defaults::default())
            .with_package(Package::default());
        let out = MinRam.filter(ram_servers(Some(1.0)), &c).await.unwrap();
        assert!(out.servers.is_empty());
        assert_eq!(
            out.reasons.get("s768"),
            Some("Package gave no RAM overprovision ratio, but server has ratio 1")
        );
    }

    #[tokio::test]
    async fn ram_with_package_ratio_scales_request() {
        let c = Constraints::new(ram_request(768, Brand::Joyent), Defaults::default())
            .with_package(Package {
                overprovision_ram: Some(1.5),
                ..Default::default()
            });
        let out = MinRam.filter(ram_servers(Some(1.0)), &c).await.unwrap();
        assert_eq!(ids(&out), vec!["s512", "s768"]);
        assert_eq!(
            out.reasons.get("s511"),
            Some("VM's calculated 512 RAM is less than server's spare 511")
        );
    }

    #[tokio::test]
    async fn hvm_ram_is_never_discounted() {
        let c = Constraints::new(ram_request(512, Brand::Kvm), Defaults::default()).with_package(
            Package {
                overprovision_ram: Some(2.0),
                ..Default::default()
            },
        );
        let out = MinRam.filter(ram_servers(Some(2.0)), &c).await.unwrap();
        assert_eq!(ids(&out), vec!["s512", "s768"]);
        assert_eq!(
            out.reasons.get("s256"),
            Some("VM's calculated 512 RAM is less than server's spare 256")
        );
    }

    #[tokio::test]
    async fn negative_spare_ram_is_insufficient() {
        let c = Constraints::new(ram_request(1, Brand::Joyent), Defaults::default());
        let out = MinRam
            .filter(vec![server("over", Resource::Ram, -20.0, None)], &c)
            .await
            .unwrap();
        assert!(out.servers.is_empty());
        assert_eq!(
            out.reasons.get("over"),
            Some("VM's calculated 1 RAM is less than server's spare -20")
        );
    }

    #[tokio::test]
    async fn ram_admission_is_monotonic_in_request() {
        let servers = ram_servers(None);
        let admitted = |ram: u64| {
            let c = Constraints::new(ram_request(ram, Brand::Joyent), Defaults::default());
            let servers = servers.clone();
            async move {
                MinRam
                    .filter(servers, &c)
                    .await
                    .unwrap()
                    .servers
                    .into_iter()
                    .map(|s| s.uuid)
                    .collect::<Vec<_>>()
            }
        };

        let mut previous = admitted(1024).await;
        for ram in (0..1024).rev().step_by(64) {
            let now = admitted(ram).await;
            for id in &previous {
                assert!(now.contains(id), "{id} admitted at larger request but not at {ram}");
            }
            previous = now;
        }
    }

    // ── Disk ──────────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn disk_is_uncapped_without_ratios() {
        let vm = Vm {
            quota: Some(100),
            ..Default::default()
        };
        let c = Constraints::new(vm, Defaults::default());
        let servers = vec![server("tiny", Resource::Disk, 10.0, None)];
        let out = MinDisk.filter(servers, &c).await.unwrap();
        assert_eq!(ids(&out), vec!["tiny"]);
    }

    #[tokio::test]
    async fn hvm_disk_includes_image_size() {
        let vm = Vm {
            quota: Some(10),
            brand: Brand::Kvm,
            ..Default::default()
        };
        let c = Constraints::new(vm, Defaults::default())
            .with_package(Package {
                overprovision_disk: Some(1.0),
                ..Default::default()
            })
            .with_image(Image {
                uuid: None,
                image_size: Some(5120),
            });
        let servers = vec![
            server("small", Resource::Disk, 15_359.0, Some(1.0)),
            server("exact", Resource::Disk, 15_360.0, Some(1.0)),
        ];
        let out = MinDisk.filter(servers, &c).await.unwrap();
        assert_eq!(ids(&out), vec!["exact"]);
        assert_eq!(
            out.reasons.get("small"),
            Some("VM's calculated 15360 disk is less than server's spare 15359")
        );
    }
}
