//! Designator configuration and input-file loading.
//!
//! The configuration file fixes the algorithm chain, the process-wide
//! [`Defaults`] and an optional per-request deadline:
//! ```yaml
//! deadline_ms: 5000
//! pipeline:
//!   - hard-filter-vlans
//!   - hard-filter-min-ram
//!   - hard-filter-min-cpu
//!   - hard-filter-min-disk
//!   - hard-filter-volumes-from
//!   - score-num-owner-zones
//!   - score-unreserved-ram
//! defaults:
//!   filter_min_resources: true
//!   weight_num_owner_zones: 0.0
//! ```
//!
//! The CLI additionally reads three input files, each with its own loader:
//! an inventory (`servers:`), a request (`vm` / `package` / `image`) and a
//! VM-lookup table (`vms: { <vm uuid>: <server uuid> }`) that backs the
//! in-memory dependency resolver.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::pipeline::StaticResolver;
use crate::request::{Defaults, PlacementRequest};
use crate::server::Server;

/// Algorithm chain used when no configuration file names one.
pub const DEFAULT_PIPELINE: &[&str] = &[
    "hard-filter-vlans",
    "hard-filter-min-ram",
    "hard-filter-min-cpu",
    "hard-filter-min-disk",
    "hard-filter-volumes-from",
    "score-num-owner-zones",
    "score-unreserved-ram",
];

// ── Private YAML deserialization types ────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    deadline_ms: Option<u64>,
    #[serde(default)]
    pipeline: Vec<String>,
    #[serde(default)]
    defaults: Defaults,
}

#[derive(Debug, Deserialize)]
struct InventoryFile {
    #[serde(default)]
    servers: Vec<Server>,
}

#[derive(Debug, Deserialize)]
struct VmLookupFile {
    #[serde(default)]
    vms: HashMap<String, String>,
}

// ── Public data structures ────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct DesignatorConfig {
    /// Registry keys, in execution order.
    pub pipeline: Vec<String>,
    pub defaults: Defaults,
    pub deadline: Option<Duration>,
}

impl Default for DesignatorConfig {
    fn default() -> Self {
        Self {
            pipeline: DEFAULT_PIPELINE.iter().map(|s| s.to_string()).collect(),
            defaults: Defaults::default(),
            deadline: None,
        }
    }
}

// ── ConfigManager ─────────────────────────────────────────────────────────────

/// Holds the active [`DesignatorConfig`], starting from built-in defaults.
#[derive(Debug, Default)]
pub struct ConfigManager {
    config: DesignatorConfig,

    /// Set to `true` after a successful [`load_from_file`](Self::load_from_file).
    loaded: bool,
}

impl ConfigManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `path` and replaces the active configuration.
    ///
    /// An empty or missing `pipeline` list falls back to
    /// [`DEFAULT_PIPELINE`].  Algorithm names are not checked here; that
    /// happens when the pipeline is built.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or is not valid YAML.
    pub fn load_from_file(&mut self, path: &Path) -> Result<()> {
        info!("Loading designator configuration from: {}", path.display());

        self.config = DesignatorConfig::default();
        self.loaded = false;

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let file: ConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        if file.pipeline.is_empty() {
            warn!("No pipeline configured, using the default algorithm chain");
        } else {
            self.config.pipeline = file.pipeline;
        }
        self.config.defaults = file.defaults;
        self.config.deadline = file.deadline_ms.map(Duration::from_millis);

        self.loaded = true;

        info!(
            stages = self.config.pipeline.len(),
            deadline = ?self.config.deadline,
            "Configuration loaded"
        );
        for (i, name) in self.config.pipeline.iter().enumerate() {
            debug!("  [{}] {}", i, name);
        }

        Ok(())
    }

    pub fn config(&self) -> &DesignatorConfig {
        &self.config
    }

    /// Returns `true` after a successful call to [`load_from_file`](Self::load_from_file).
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}

// ── Input files ───────────────────────────────────────────────────────────────

fn read_yaml<T: DeserializeOwned>(path: &Path, what: &str) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot open {} file: {}", what, path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse {} file: {}", what, path.display()))
}

/// Load a server inventory snapshot.
pub fn load_inventory(path: &Path) -> Result<Vec<Server>> {
    let file: InventoryFile = read_yaml(path, "inventory")?;
    if file.servers.is_empty() {
        warn!("Inventory {} lists no servers", path.display());
    }
    info!("Loaded {} server(s) from {}", file.servers.len(), path.display());
    Ok(file.servers)
}

/// Load a placement request.
pub fn load_request(path: &Path) -> Result<PlacementRequest> {
    read_yaml(path, "request")
}

/// Load a VM-lookup table into an in-memory resolver.
pub fn load_vm_lookup(path: &Path) -> Result<StaticResolver> {
    let file: VmLookupFile = read_yaml(path, "VM lookup")?;
    info!("Loaded {} VM location(s) from {}", file.vms.len(), path.display());
    Ok(StaticResolver::new(file.vms))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    use crate::pipeline::DependencyResolver;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    // ── ConfigManager ─────────────────────────────────────────────────────────

    #[test]
    fn defaults_before_loading() {
        let mgr = ConfigManager::new();
        assert!(!mgr.is_loaded());
        assert_eq!(mgr.config().pipeline.len(), DEFAULT_PIPELINE.len());
        assert!(mgr.config().deadline.is_none());
    }

    #[test]
    fn load_full_config() {
        let yaml = r#"
deadline_ms: 250
pipeline:
  - hard-filter-vlans
  - score-num-owner-zones
defaults:
  server_spread: min-owner
  filter_min_resources: false
  weight_unreserved_ram: -1.0
"#;
        let f = yaml_tempfile(yaml);
        let mut mgr = ConfigManager::new();
        mgr.load_from_file(f.path()).unwrap();

        assert!(mgr.is_loaded());
        let cfg = mgr.config();
        assert_eq!(cfg.pipeline, vec!["hard-filter-vlans", "score-num-owner-zones"]);
        assert_eq!(cfg.deadline, Some(Duration::from_millis(250)));
        assert_eq!(cfg.defaults.server_spread.as_deref(), Some("min-owner"));
        assert!(!cfg.defaults.filter_min_resources);
        assert_eq!(cfg.defaults.weight_unreserved_ram, -1.0);
        assert_eq!(cfg.defaults.weight_unreserved_disk, 1.0);
    }

    #[test]
    fn empty_pipeline_falls_back_to_default_chain() {
        let f = yaml_tempfile("pipeline: []\n");
        let mut mgr = ConfigManager::new();
        mgr.load_from_file(f.path()).unwrap();
        assert!(mgr.is_loaded());
        assert_eq!(mgr.config(), &DesignatorConfig::default());
    }

    #[test]
    fn missing_file_returns_error() {
        let mut mgr = ConfigManager::new();
        let result = mgr.load_from_file(Path::new("/nonexistent/path/designator.yaml"));
        assert!(result.is_err());
        assert!(!mgr.is_loaded());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("pipeline: {not: [a, list");
        let mut mgr = ConfigManager::new();
        assert!(mgr.load_from_file(f.path()).is_err());
        assert!(!mgr.is_loaded());
    }

    // ── Input files ───────────────────────────────────────────────────────────

    #[test]
    fn load_inventory_reads_servers() {
        let yaml = r#"
servers:
  - uuid: cn1
    memory_total_bytes: 1073741824
    cpu_total_cores: 4
  - uuid: cn2
    overprovision_ratios:
      cpu: 4.0
"#;
        let f = yaml_tempfile(yaml);
        let servers = load_inventory(f.path()).unwrap();
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].cpu_total_cores, 4);
        assert_eq!(servers[1].overprovision_ratios.cpu, Some(4.0));
    }

    #[test]
    fn load_request_reads_all_parts() {
        let yaml = r#"
vm:
  owner_uuid: tenant
  quota: 10
  docker: true
  volumes_from: [dep1]
package:
  alloc_server_spread: min-owner
image:
  image_size: 2048
"#;
        let f = yaml_tempfile(yaml);
        let req = load_request(f.path()).unwrap();
        assert_eq!(req.vm.volumes_from, Some(vec!["dep1".to_string()]));
        assert_eq!(req.image.and_then(|i| i.image_size), Some(2048));
    }

    #[test]
    fn load_request_requires_vm() {
        let f = yaml_tempfile("package: {}\n");
        assert!(load_request(f.path()).is_err());
    }

    #[tokio::test]
    async fn load_vm_lookup_backs_resolver() {
        let f = yaml_tempfile("vms:\n  dep1: cn2\n");
        let resolver = load_vm_lookup(f.path()).unwrap();
        assert_eq!(resolver.len(), 1);
        let found = resolver.resolve("dep1").await.unwrap().unwrap();
        assert_eq!(found.server_uuid, "cn2");
    }
}
