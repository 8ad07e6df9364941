/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Dependency resolver collaborator.
//!
//! Maps a workload id to the server currently hosting it.  The pipeline is
//! handed an `Arc<dyn DependencyResolver>` at construction; when none is
//! supplied, dependency resolution uses inventory-local data only.

use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

/// A workload located by the resolver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedVm {
    pub uuid: String,
    pub server_uuid: String,
}

/// Failure of the resolver itself, as opposed to "not found".
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("resolver unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait DependencyResolver: Send + Sync {
    /// `Ok(None)` means the workload does not exist anywhere.
    async fn resolve(&self, vm_uuid: &str) -> Result<Option<ResolvedVm>, ResolveError>;
}

// ── StaticResolver ────────────────────────────────────────────────────────────

/// In-memory resolver backed by a vm uuid → server uuid table.
///
/// Used by the CLI (`--vm-lookup`) and in tests.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    table: HashMap<String, String>,
}

impl StaticResolver {
    pub fn new(table: HashMap<String, String>) -> Self {
        Self { table }
    }

    pub fn insert(&mut self, vm_uuid: impl Into<String>, server_uuid: impl Into<String>) {
        self.table.insert(vm_uuid.into(), server_uuid.into());
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[async_trait]
impl DependencyResolver for StaticResolver {
    async fn resolve(&self, vm_uuid: &str) -> Result<Option<ResolvedVm>, ResolveError> {
        Ok(self.table.get(vm_uuid).map(|server_uuid| ResolvedVm {
            uuid: vm_uuid.to_string(),
            server_uuid: server_uuid.clone(),
        }))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
