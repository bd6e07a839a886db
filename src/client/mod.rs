//! Client with a read-through cache
//!
//! Reads are served from the cache when possible and otherwise fetched from a
//! single bootstrap datacenter. Writes go to the file's primary; a successful
//! write drops the cached copy so the next read fetches fresh content.

pub mod cache;

use crate::common::{
    validate_filename, ClientConfig, ClusterConfig, Error, ListResponse, PingResponse, Result,
    WriteReceipt,
};
use crate::transport::{HttpTransport, Transport};
use std::sync::Arc;
use std::time::Duration;

pub use cache::{CacheEntry, ClientCache};

/// Result of [`Client::read`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRead {
    pub entry: CacheEntry,
    /// Served from the cache without a network call
    pub cached: bool,
}

pub struct Client {
    transport: Arc<dyn Transport>,
    cluster: Arc<ClusterConfig>,
    bootstrap: String,
    cache: ClientCache,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl Client {
    /// Client reading from `bootstrap`, with default timeouts.
    pub fn new(
        transport: Arc<dyn Transport>,
        cluster: Arc<ClusterConfig>,
        bootstrap: impl Into<String>,
        cache: ClientCache,
    ) -> Result<Self> {
        let bootstrap = bootstrap.into();
        if !cluster.contains(&bootstrap) {
            return Err(Error::UnknownDatacenter(bootstrap));
        }
        let defaults = ClientConfig::default();
        Ok(Self {
            transport,
            cluster,
            bootstrap,
            cache,
            read_timeout: defaults.read_timeout(),
            write_timeout: defaults.write_timeout(),
        })
    }

    /// HTTP client built from configuration. The cache is persisted when
    /// `config.cache_dir` is set.
    pub fn from_config(cluster: Arc<ClusterConfig>, config: &ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new(cluster.clone())
            .with_client_timeouts(config.read_timeout(), config.write_timeout());
        let cache = match &config.cache_dir {
            Some(dir) => ClientCache::open(dir)?,
            None => ClientCache::in_memory(),
        };
        Ok(Self::new(Arc::new(transport), cluster, config.bootstrap.clone(), cache)?
            .with_timeouts(config.read_timeout(), config.write_timeout()))
    }

    pub fn with_timeouts(mut self, read: Duration, write: Duration) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    pub fn bootstrap(&self) -> &str {
        &self.bootstrap
    }

    pub fn cache(&self) -> &ClientCache {
        &self.cache
    }

    /// Read `filename`, from the cache if present.
    ///
    /// A miss is fetched from the bootstrap datacenter and cached, unless the
    /// file was invalidated while the fetch was in flight. Failures are
    /// returned as-is, with no retry and no fallback to another datacenter.
    pub async fn read(&self, filename: &str) -> Result<FileRead> {
        validate_filename(filename)?;

        if let Some(entry) = self.cache.get(filename)? {
            tracing::debug!("Cache hit for {} (from {})", filename, entry.source_node);
            return Ok(FileRead {
                entry,
                cached: true,
            });
        }

        tracing::debug!("Cache miss for {}, fetching from {}", filename, self.bootstrap);
        let generation = self.cache.generation(filename)?;
        let fetch = self.transport.read(&self.bootstrap, filename);
        let response = tokio::time::timeout(self.read_timeout, fetch)
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "read of {} from {} exceeded {:?}",
                    filename, self.bootstrap, self.read_timeout
                ))
            })??;

        // A write that succeeded meanwhile makes this content stale.
        let entry = CacheEntry::new(filename, response.content, self.bootstrap.as_str());
        self.cache.insert_if_current(entry.clone(), generation)?;
        Ok(FileRead {
            entry,
            cached: false,
        })
    }

    /// Write `content` to `filename` through its primary.
    ///
    /// Files without a configured primary are sent to the bootstrap
    /// datacenter, which refuses them with `NotPrimary`. The cached copy is
    /// dropped only when the write succeeds.
    pub async fn write(&self, filename: &str, content: &str) -> Result<WriteReceipt> {
        validate_filename(filename)?;

        let target = self
            .cluster
            .primary_for(filename)
            .unwrap_or(self.bootstrap.as_str());
        tracing::debug!("Sending write of {} to {}", filename, target);

        let send = self.transport.write(target, filename, content);
        let receipt = tokio::time::timeout(self.write_timeout, send)
            .await
            .map_err(|_| {
                Error::Timeout(format!(
                    "write of {} to {} exceeded {:?}",
                    filename, target, self.write_timeout
                ))
            })??;

        if receipt.is_success() {
            self.cache.invalidate(filename)?;
            tracing::debug!("Cache invalidated for {}", filename);
        }
        Ok(receipt)
    }

    pub async fn ping(&self, datacenter: &str) -> Result<PingResponse> {
        tokio::time::timeout(self.read_timeout, self.transport.ping(datacenter))
            .await
            .map_err(|_| Error::Timeout(format!("{} did not answer ping", datacenter)))?
    }

    pub async fn list(&self, datacenter: &str) -> Result<ListResponse> {
        tokio::time::timeout(self.read_timeout, self.transport.list(datacenter))
            .await
            .map_err(|_| Error::Timeout(format!("{} did not answer list", datacenter)))?
    }
}
