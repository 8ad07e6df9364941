/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Designator – placement-decision engine
//!
//! Chooses which server should host a new VM or container: enriches the
//! inventory with spare capacity, narrows it with hard filters, ranks the
//! survivors with weighted scorers and explains every decision.
//!
//! ```text
//! lib.rs
//! ├── server        – server inventory records, NICs, derived capacity
//! ├── request       – VM / package / image / defaults → Constraints
//! ├── accounting/   – unreserved RAM / CPU / disk, unit helpers
//! ├── algorithms/   – Filter / Scorer contract, registry, built-in stages
//! ├── pipeline/     – orchestrator, diagnostic trail, errors, resolver
//! └── config/       – YAML configuration and input files
//! ```

pub mod accounting;
pub mod algorithms;
pub mod config;
pub mod pipeline;
pub mod request;
pub mod server;
