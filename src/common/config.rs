//! Configuration for minifs components
//!
//! Cluster membership and the file → primary map are static: every node of a
//! deployment must be started with an identical [`ClusterConfig`]. There is no
//! protocol to distribute it.

use crate::common::{validate_filename, Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Number of yes votes a write needs before it commits.
///
/// A strict majority of the default three-datacenter cluster. Fixed per
/// deployment rather than derived from the membership size at runtime.
pub const QUORUM_REQUIRED: usize = 2;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "MINIFS_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "minifs.toml";

/// Global configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Settings of the node run by this process
    #[serde(default)]
    pub node: NodeConfig,

    /// Shared cluster layout
    #[serde(default)]
    pub cluster: ClusterConfig,

    /// Client (CLI) settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Logging level
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load from the file named by `MINIFS_CONFIG` (default `minifs.toml`,
    /// optional) layered with `MINIFS_*` environment variables.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path).required(false))
            .add_source(
                config::Environment::with_prefix("MINIFS")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;
        let config: Config = settings.try_deserialize()?;
        config.cluster.validate()?;
        Ok(config)
    }
}

/// Node-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Datacenter code served by this process
    #[serde(default = "default_datacenter")]
    pub datacenter: String,

    /// Bind address for the HTTP API
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Root data directory; each datacenter stores under `<data_dir>/<code>`
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

fn default_datacenter() -> String {
    "NY".to_string()
}
fn default_bind_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 5001))
}
fn default_data_dir() -> PathBuf {
    PathBuf::from("files")
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            datacenter: default_datacenter(),
            bind_addr: default_bind_addr(),
            data_dir: default_data_dir(),
        }
    }
}

impl NodeConfig {
    /// Directory holding this datacenter's files.
    pub fn store_dir(&self) -> PathBuf {
        self.data_dir.join(&self.datacenter)
    }
}

/// One cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatacenterSpec {
    pub code: String,
    /// Base URL, e.g. `http://localhost:5001`
    pub address: String,
}

/// Static primary assignment for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAssignment {
    pub filename: String,
    pub primary: String,
}

/// How the primary treats overlapping writes to the same file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteSerialization {
    /// Overlapping writes interleave freely; the last commit wins.
    #[default]
    Unserialized,
    /// One write per filename at a time on the primary.
    PerFile,
}

/// Cluster layout shared by every node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Members, in a stable order
    #[serde(default = "default_datacenters")]
    pub datacenters: Vec<DatacenterSpec>,

    /// File → primary datacenter
    #[serde(default = "default_files")]
    pub files: Vec<FileAssignment>,

    /// Yes votes needed to commit
    #[serde(default = "default_quorum")]
    pub quorum_required: usize,

    /// Per-peer vote timeout
    #[serde(default = "default_vote_timeout")]
    pub vote_timeout_ms: u64,

    /// Per-peer replication timeout
    #[serde(default = "default_replicate_timeout")]
    pub replicate_timeout_ms: u64,

    #[serde(default)]
    pub write_serialization: WriteSerialization,
}

fn default_datacenters() -> Vec<DatacenterSpec> {
    [("NY", 5001), ("TO", 5002), ("LD", 5003)]
        .into_iter()
        .map(|(code, port)| DatacenterSpec {
            code: code.to_string(),
            address: format!("http://localhost:{}", port),
        })
        .collect()
}
fn default_files() -> Vec<FileAssignment> {
    [("file1.txt", "NY"), ("file2.txt", "TO"), ("file3.txt", "LD")]
        .into_iter()
        .map(|(filename, primary)| FileAssignment {
            filename: filename.to_string(),
            primary: primary.to_string(),
        })
        .collect()
}
fn default_quorum() -> usize {
    QUORUM_REQUIRED
}
fn default_vote_timeout() -> u64 {
    2_000
}
fn default_replicate_timeout() -> u64 {
    10_000
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            datacenters: default_datacenters(),
            files: default_files(),
            quorum_required: default_quorum(),
            vote_timeout_ms: default_vote_timeout(),
            replicate_timeout_ms: default_replicate_timeout(),
            write_serialization: WriteSerialization::default(),
        }
    }
}

impl ClusterConfig {
    /// Reject layouts no node could run with.
    pub fn validate(&self) -> Result<()> {
        if self.datacenters.is_empty() {
            return Err(Error::InvalidConfig("cluster has no datacenters".into()));
        }

        let mut seen = HashSet::new();
        for dc in &self.datacenters {
            if dc.code.is_empty() {
                return Err(Error::InvalidConfig("empty datacenter code".into()));
            }
            if !seen.insert(dc.code.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "duplicate datacenter {}",
                    dc.code
                )));
            }
        }

        let mut assigned = HashSet::new();
        for file in &self.files {
            if let Err(e) = validate_filename(&file.filename) {
                return Err(Error::InvalidConfig(format!("file assignment: {}", e)));
            }
            if !seen.contains(file.primary.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "{} is assigned to unknown primary {}",
                    file.filename, file.primary
                )));
            }
            if !assigned.insert(file.filename.as_str()) {
                return Err(Error::InvalidConfig(format!(
                    "{} has more than one primary",
                    file.filename
                )));
            }
        }

        if self.quorum_required == 0 || self.quorum_required > self.datacenters.len() {
            return Err(Error::InvalidConfig(format!(
                "quorum of {} is impossible with {} datacenters",
                self.quorum_required,
                self.datacenters.len()
            )));
        }

        Ok(())
    }

    /// Statically assigned primary of `filename`, if any.
    pub fn primary_for(&self, filename: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.filename == filename)
            .map(|f| f.primary.as_str())
    }

    pub fn address_of(&self, code: &str) -> Option<&str> {
        self.datacenters
            .iter()
            .find(|dc| dc.code == code)
            .map(|dc| dc.address.as_str())
    }

    pub fn contains(&self, code: &str) -> bool {
        self.datacenters.iter().any(|dc| dc.code == code)
    }

    pub fn codes(&self) -> impl Iterator<Item = &str> {
        self.datacenters.iter().map(|dc| dc.code.as_str())
    }

    /// Every member except `code`.
    pub fn peers_of(&self, code: &str) -> Vec<String> {
        self.codes()
            .filter(|c| *c != code)
            .map(str::to_string)
            .collect()
    }

    pub fn vote_timeout(&self) -> Duration {
        Duration::from_millis(self.vote_timeout_ms)
    }

    pub fn replicate_timeout(&self) -> Duration {
        Duration::from_millis(self.replicate_timeout_ms)
    }
}

/// Client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Node every cache miss is fetched from
    #[serde(default = "default_bootstrap")]
    pub bootstrap: String,

    /// Cache directory; `None` keeps the cache in memory only
    #[serde(default = "default_cache_dir")]
    pub cache_dir: Option<PathBuf>,

    #[serde(default = "default_read_timeout")]
    pub read_timeout_ms: u64,

    #[serde(default = "default_write_timeout")]
    pub write_timeout_ms: u64,
}

fn default_bootstrap() -> String {
    "NY".to_string()
}
fn default_cache_dir() -> Option<PathBuf> {
    Some(PathBuf::from("cache"))
}
fn default_read_timeout() -> u64 {
    2_000
}
fn default_write_timeout() -> u64 {
    10_000
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            bootstrap: default_bootstrap(),
            cache_dir: default_cache_dir(),
            read_timeout_ms: default_read_timeout(),
            write_timeout_ms: default_write_timeout(),
        }
    }
}

impl ClientConfig {
    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}
