/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Volumes-from (inter-workload dependency) hard filter.
//!
//! A Docker container that mounts volumes from other containers must land on
//! the server that hosts every one of them.  Dependency locations come from
//! the candidates' resident-VM maps first; identifiers not found there are
//! looked up through the injected [`DependencyResolver`], all at once.
//!
//! A resolver *failure* aborts the stage.  Only a definite "not found" turns
//! into an exclusion.
//!
//! The local pass sees only the servers that reached this stage.  A
//! dependency whose host was removed by an earlier filter is therefore
//! queried through the resolver, and a resolver failure for it aborts the
//! run even though no surviving candidate could host it.  Place this stage
//! early in the pipeline to keep such lookups rare.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use tracing::debug;

use super::{Filter, Reasons, RejectReason, StageResult};
use crate::pipeline::error::StageError;
use crate::pipeline::resolver::DependencyResolver;
use crate::request::Constraints;
use crate::server::Server;

pub struct VolumesFrom {
    resolver: Option<Arc<dyn DependencyResolver>>,
}

impl VolumesFrom {
    pub fn new(resolver: Option<Arc<dyn DependencyResolver>>) -> Self {
        Self { resolver }
    }

    /// dependency id → ids of candidate servers hosting it.
    ///
    /// Dependencies absent from both the inventory and the resolver map to
    /// an empty set.
    async fn locate(
        &self,
        servers: &[Server],
        deps: &[String],
    ) -> Result<BTreeMap<String, BTreeSet<String>>, StageError> {
        let mut hosts: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for dep in deps {
            let local: BTreeSet<String> = servers
                .iter()
                .filter(|s| s.hosts_vm(dep))
                .map(|s| s.uuid.clone())
                .collect();
            hosts.insert(dep.clone(), local);
        }

        let resolver = match &self.resolver {
            Some(r) => r,
            None => return Ok(hosts),
        };

        let unresolved: Vec<String> = hosts
            .iter()
            .filter(|(_, on)| on.is_empty())
            .map(|(dep, _)| dep.clone())
            .collect();
        if unresolved.is_empty() {
            return Ok(hosts);
        }

        debug!(count = unresolved.len(), "querying resolver for dependencies");
        let lookups = unresolved.iter().map(|dep| async move {
            resolver
                .resolve(dep)
                .await
                .map(|found| (dep.clone(), found))
                .map_err(|source| StageError::Resolver {
                    dependency: dep.clone(),
                    source,
                })
        });

        for (dep, found) in try_join_all(lookups).await? {
            if let Some(vm) = found {
                hosts.entry(dep).or_default().insert(vm.server_uuid);
            }
        }
        Ok(hosts)
    }
}

#[async_trait]
impl Filter for VolumesFrom {
    fn name(&self) -> &'static str {
        "Servers containing VMs required for volumes-from"
    }

    async fn filter(
        &self,
        servers: Vec<Server>,
        constraints: &Constraints,
    ) -> Result<StageResult, StageError> {
        let vm = &constraints.vm;
        if !vm.docker {
            return Ok(StageResult::skipped(
                servers,
                "Requested VM is not a Docker container",
            ));
        }
        let deps = match &vm.volumes_from {
            Some(deps) => deps,
            None => {
                return Ok(StageResult::skipped(
                    servers,
                    "Requested VM has no volumes-from metadata",
                ))
            }
        };
        if deps.is_empty() {
            return Ok(StageResult::skipped(
                servers,
                "Requested VM lists no volumes-from dependencies",
            ));
        }
        if servers.is_empty() {
            return Ok(StageResult::new(servers, Reasons::new()));
        }

        let hosts = self.locate(&servers, deps).await?;

        let mut reasons = Reasons::new();
        let mut kept = Vec::with_capacity(servers.len());
        for server in servers {
            let missing = deps.iter().find(|dep| {
                !hosts
                    .get(dep.as_str())
                    .is_some_and(|on| on.contains(&server.uuid))
            });
            match missing {
                None => kept.push(server),
                Some(dep) => {
                    let reason = RejectReason::MissingVolumesFrom {
                        vm_uuid: dep.clone(),
                    };
                    debug!(server = %server.uuid, %reason, "excluded");
                    reasons.reject(&server.uuid, &reason);
                }
            }
        }

        Ok(StageResult::new(kept, reasons))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::resolver::{ResolveError, ResolvedVm, StaticResolver};
    use crate::request::{Defaults, Vm};
    use crate::server::ResidentVm;

    const CN_A: &str = "d8ea612d-7440-411e-8e34-e6bf1adeb008";
    const CN_B: &str = "07d6d108-f4ed-4f2c-9b09-949f99de2b5d";
    const CN_C: &str = "60eaf62c-f19e-4e15-b520-72830b0afe2d";
    const CN_D: &str = "69cd993f-d679-4382-96e0-f6821a4ce36b";

    const VM_1C: &str = "1c713cf6-8433-4a3c-b2a0-40df6b24074f";
    const VM_C7: &str = "c7deac87-5f2c-46d5-9374-c3e261ab3eb8";
    const VM_67: &str = "679c97ea-065b-4a4f-9629-3aabde21cb45";
    const VM_D2: &str = "d2872179-574c-4f86-8d0c-651a8b628e64";
    const VM_0D: &str = "0d0690a2-06a7-41cb-a0a4-55d5e37519e7";

    fn make_server(uuid: &str, vms: &[&str]) -> Server {
        let mut s = Server::new(uuid);
        for vm in vms {
            s.vms.insert(vm.to_string(), ResidentVm::default());
        }
        s
    }

    fn prepopulated() -> Vec<Server> {
        vec![
            make_server(CN_A, &[VM_1C, VM_C7]),
            make_server(CN_B, &[VM_67, VM_D2]),
            make_server(CN_C, &[VM_67, VM_0D]),
            make_server(CN_D, &[]),
        ]
    }

    fn bare() -> Vec<Server> {
        [CN_A, CN_B, CN_C, CN_D]
            .iter()
            .map(|id| make_server(id, &[]))
            .collect()
    }

    fn lookup() -> Arc<dyn DependencyResolver> {
        let mut r = StaticResolver::default();
        r.insert(VM_1C, CN_A);
        r.insert(VM_C7, CN_A);
        r.insert(VM_D2, CN_B);
        r.insert(VM_67, CN_C);
        r.insert(VM_0D, CN_C);
        Arc::new(r)
    }

    fn docker_vm(deps: &[&str]) -> Constraints {
        let vm = Vm {
            docker: true,
            volumes_from: Some(deps.iter().map(|d| d.to_string()).collect()),
            ..Default::default()
        };
        Constraints::new(vm, Defaults::default())
    }

    fn needs(dep: &str) -> String {
        format!("VM needs volumes from {}, which was not found on server", dep)
    }

    fn ids(result: &StageResult) -> Vec<&str> {
        result.servers.iter().map(|s| s.uuid.as_str()).collect()
    }

    #[tokio::test]
    async fn inventory_only_without_resolver() {
        let out = VolumesFrom::new(None)
            .filter(prepopulated(), &docker_vm(&[VM_67, VM_0D]))
            .await
            .unwrap();

        assert_eq!(ids(&out), vec![CN_C]);
        assert_eq!(out.reasons.get(CN_A), Some(needs(VM_67).as_str()));
        assert_eq!(out.reasons.get(CN_B), Some(needs(VM_0D).as_str()));
        assert_eq!(out.reasons.get(CN_D), Some(needs(VM_67).as_str()));
        assert_eq!(out.reasons.len(), 3);
    }

    #[tokio::test]
    async fn resolver_locates_non_local_dependencies() {
        let out = VolumesFrom::new(Some(lookup()))
            .filter(bare(), &docker_vm(&[VM_67, VM_0D]))
            .await
            .unwrap();

        assert_eq!(ids(&out), vec![CN_C]);
        for cn in [CN_A, CN_B, CN_D] {
            assert_eq!(out.reasons.get(cn), Some(needs(VM_67).as_str()));
        }
    }

    #[tokio::test]
    async fn dependencies_on_different_servers_exclude_all() {
        let out = VolumesFrom::new(Some(lookup()))
            .filter(bare(), &docker_vm(&[VM_67, VM_1C]))
            .await
            .unwrap();

        assert!(out.servers.is_empty());
        assert_eq!(out.reasons.get(CN_C), Some(needs(VM_1C).as_str()));
        assert_eq!(out.reasons.get(CN_A), Some(needs(VM_67).as_str()));
        assert_eq!(out.reasons.len(), 4);
    }

    #[tokio::test]
    async fn resolver_not_found_excludes_local_host() {
        let ghost = "99999999-0000-0000-0000-000000000000";
        let out = VolumesFrom::new(Some(lookup()))
            .filter(prepopulated(), &docker_vm(&[VM_1C, ghost]))
            .await
            .unwrap();

        assert!(out.servers.is_empty());
        assert_eq!(out.reasons.get(CN_A), Some(needs(ghost).as_str()));
        assert_eq!(out.reasons.get(CN_B), Some(needs(VM_1C).as_str()));
    }

    struct FailingResolver;

    #[async_trait]
    impl DependencyResolver for FailingResolver {
        async fn resolve(&self, _vm_uuid: &str) -> Result<Option<ResolvedVm>, ResolveError> {
            Err(ResolveError::Unavailable("connection refused".into()))
        }
    }

    #[tokio::test]
    async fn resolver_failure_is_an_error_not_an_exclusion() {
        let err = VolumesFrom::new(Some(Arc::new(FailingResolver)))
            .filter(bare(), &docker_vm(&[VM_67]))
            .await
            .unwrap_err();
        assert!(matches!(err, StageError::Resolver { ref dependency, .. } if dependency == VM_67));
    }

    struct CountingResolver {
        inner: StaticResolver,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl DependencyResolver for CountingResolver {
        async fn resolve(&self, vm_uuid: &str) -> Result<Option<ResolvedVm>, ResolveError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.inner.resolve(vm_uuid).await
        }
    }

    #[tokio::test]
    async fn dependency_on_a_filtered_out_host_is_resolved_remotely() {
        let mut inner = StaticResolver::default();
        inner.insert(VM_1C, CN_A);
        let resolver = Arc::new(CountingResolver {
            inner,
            calls: Default::default(),
        });

        // CN_A hosts the dependency but did not survive earlier stages.
        let candidates: Vec<Server> = prepopulated()
            .into_iter()
            .filter(|s| s.uuid != CN_A)
            .collect();
        let shared: Arc<dyn DependencyResolver> = resolver.clone();
        let out = VolumesFrom::new(Some(shared))
            .filter(candidates, &docker_vm(&[VM_1C]))
            .await
            .unwrap();

        assert_eq!(resolver.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert!(out.servers.is_empty());
        for cn in [CN_B, CN_C, CN_D] {
            assert_eq!(out.reasons.get(cn), Some(needs(VM_1C).as_str()));
        }
    }

    #[tokio::test]
    async fn resolver_not_consulted_when_all_local() {
        let out = VolumesFrom::new(Some(Arc::new(FailingResolver)))
            .filter(prepopulated(), &docker_vm(&[VM_1C, VM_C7]))
            .await
            .unwrap();
        assert_eq!(ids(&out), vec![CN_A]);
    }

    #[tokio::test]
    async fn no_servers_returns_early() {
        let out = VolumesFrom::new(Some(Arc::new(FailingResolver)))
            .filter(vec![], &docker_vm(&[VM_67, VM_0D]))
            .await
            .unwrap();
        assert!(out.servers.is_empty());
        assert!(out.reasons.is_empty());
    }

    #[tokio::test]
    async fn skip_reasons() {
        let f = VolumesFrom::new(None);

        let c = Constraints::new(Vm::default(), Defaults::default());
        let out = f.filter(bare(), &c).await.unwrap();
        assert_eq!(out.servers.len(), 4);
        assert_eq!(
            out.reasons.skip_reason(),
            Some("Requested VM is not a Docker container")
        );

        let vm = Vm {
            docker: true,
            ..Default::default()
        };
        let out = f
            .filter(bare(), &Constraints::new(vm, Defaults::default()))
            .await
            .unwrap();
        assert_eq!(
            out.reasons.skip_reason(),
            Some("Requested VM has no volumes-from metadata")
        );

        let out = f.filter(bare(), &docker_vm(&[])).await.unwrap();
        assert_eq!(
            out.reasons.skip_reason(),
            Some("Requested VM lists no volumes-from dependencies")
        );
    }
}
