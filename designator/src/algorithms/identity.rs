/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Pass-through stage.  Useful as a placeholder in pipeline configuration.

use async_trait::async_trait;

use super::{Filter, Reasons, StageResult};
use crate::pipeline::error::StageError;
use crate::request::Constraints;
use crate::server::Server;

pub struct Identity;

#[async_trait]
impl Filter for Identity {
    fn name(&self) -> &'static str {
        "Identity"
    }

    async fn filter(
        &self,
        servers: Vec<Server>,
        _constraints: &Constraints,
    ) -> Result<StageResult, StageError> {
        Ok(StageResult::new(servers, Reasons::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_input_unchanged() {
        let servers = vec![Server::new("a"), Server::new("b")];
        let out = Identity
            .filter(servers.clone(), &Constraints::default())
            .await
            .unwrap();
        assert_eq!(out.servers, servers);
        assert!(out.reasons.is_empty());
    }

    #[tokio::test]
    async fn empty_input_is_fine() {
        let out = Identity.filter(vec![], &Constraints::default()).await.unwrap();
        assert!(out.servers.is_empty());
    }
}
