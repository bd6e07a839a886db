//! In-process transport and multi-node harness
//!
//! [`LocalCluster`] builds one [`Node`] per configured datacenter inside the
//! current process and wires them together with [`LocalTransport`]. Failure
//! injection (taking a datacenter offline, adding latency) is applied by the
//! transport before a call reaches the target node.

use crate::common::{
    ClusterConfig, Error, ListResponse, PingResponse, ReadResponse, ReplicateResponse, Result,
    VoteResponse, WriteReceipt,
};
use crate::node::store::MemStore;
use crate::node::Node;
use crate::transport::Transport;
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, RwLock, Weak};
use std::time::Duration;

/// Reachability state shared by every [`LocalTransport`] of one cluster.
#[derive(Default)]
struct Registry {
    nodes: RwLock<HashMap<String, Weak<Node>>>,
    offline: RwLock<HashSet<String>>,
    latency: RwLock<HashMap<String, Duration>>,
}

/// Dispatches [`Transport`] calls to nodes living in the same process.
#[derive(Clone)]
pub struct LocalTransport {
    registry: Arc<Registry>,
}

impl LocalTransport {
    async fn reach(&self, datacenter: &str) -> Result<Arc<Node>> {
        let offline = self
            .registry
            .offline
            .read()
            .map(|set| set.contains(datacenter))
            .unwrap_or(false);
        if offline {
            return Err(Error::NetworkUnavailable {
                node: datacenter.to_string(),
                reason: "datacenter is offline".to_string(),
            });
        }

        let latency = self
            .registry
            .latency
            .read()
            .ok()
            .and_then(|map| map.get(datacenter).copied());
        if let Some(delay) = latency {
            tokio::time::sleep(delay).await;
        }

        let node = self
            .registry
            .nodes
            .read()
            .ok()
            .and_then(|map| map.get(datacenter).cloned());
        match node {
            Some(weak) => weak.upgrade().ok_or_else(|| Error::NetworkUnavailable {
                node: datacenter.to_string(),
                reason: "node has shut down".to_string(),
            }),
            None => Err(Error::UnknownDatacenter(datacenter.to_string())),
        }
    }
}

#[async_trait]
impl Transport for LocalTransport {
    async fn ping(&self, datacenter: &str) -> Result<PingResponse> {
        Ok(self.reach(datacenter).await?.ping())
    }

    async fn read(&self, datacenter: &str, filename: &str) -> Result<ReadResponse> {
        self.reach(datacenter).await?.read(filename)
    }

    async fn list(&self, datacenter: &str) -> Result<ListResponse> {
        self.reach(datacenter).await?.list()
    }

    async fn vote(&self, datacenter: &str, filename: &str) -> Result<VoteResponse> {
        self.reach(datacenter).await?.vote(filename)
    }

    async fn write(
        &self,
        datacenter: &str,
        filename: &str,
        content: &str,
    ) -> Result<WriteReceipt> {
        let node = self.reach(datacenter).await?;
        let filename = filename.to_string();
        let content = content.to_string();
        // The coordinator run outlives a caller that stops waiting.
        tokio::spawn(async move { node.write(&filename, &content).await })
            .await
            .map_err(|e| Error::Internal(format!("write task failed: {}", e)))?
    }

    async fn replicate(
        &self,
        datacenter: &str,
        filename: &str,
        content: &str,
    ) -> Result<ReplicateResponse> {
        self.reach(datacenter).await?.replicate(filename, content)
    }
}

/// A whole cluster simulated in one process.
pub struct LocalCluster {
    config: Arc<ClusterConfig>,
    registry: Arc<Registry>,
    nodes: BTreeMap<String, Arc<Node>>,
}

impl LocalCluster {
    /// One in-memory node per datacenter, default vote policy.
    pub fn new(config: ClusterConfig) -> Result<Self> {
        Self::build(config, |datacenter, cluster, transport| {
            Node::new(datacenter, cluster, Arc::new(MemStore::new()), transport)
        })
    }

    /// Build each node with `factory(datacenter, cluster, transport)`.
    pub fn build<F>(config: ClusterConfig, mut factory: F) -> Result<Self>
    where
        F: FnMut(&str, Arc<ClusterConfig>, Arc<dyn Transport>) -> Result<Node>,
    {
        config.validate()?;
        let config = Arc::new(config);
        let registry = Arc::new(Registry::default());
        let transport: Arc<dyn Transport> = Arc::new(LocalTransport {
            registry: registry.clone(),
        });

        let mut nodes = BTreeMap::new();
        for code in config.codes() {
            let node = Arc::new(factory(code, config.clone(), transport.clone())?);
            if node.datacenter() != code {
                return Err(Error::InvalidConfig(format!(
                    "factory built {} for datacenter {}",
                    node.datacenter(),
                    code
                )));
            }
            nodes.insert(code.to_string(), node);
        }

        {
            let mut map = registry
                .nodes
                .write()
                .map_err(|_| Error::Internal("registry lock poisoned".into()))?;
            for (code, node) in &nodes {
                map.insert(code.clone(), Arc::downgrade(node));
            }
        }

        Ok(Self {
            config,
            registry,
            nodes,
        })
    }

    pub fn config(&self) -> Arc<ClusterConfig> {
        self.config.clone()
    }

    /// Node serving `datacenter`.
    pub fn node(&self, datacenter: &str) -> Result<&Arc<Node>> {
        self.nodes
            .get(datacenter)
            .ok_or_else(|| Error::UnknownDatacenter(datacenter.to_string()))
    }

    /// A transport into this cluster, as seen by clients.
    pub fn transport(&self) -> Arc<dyn Transport> {
        Arc::new(LocalTransport {
            registry: self.registry.clone(),
        })
    }

    /// Take `datacenter` offline (or back online) for every caller.
    pub fn set_online(&self, datacenter: &str, online: bool) {
        if let Ok(mut offline) = self.registry.offline.write() {
            if online {
                offline.remove(datacenter);
            } else {
                offline.insert(datacenter.to_string());
            }
        }
        tracing::info!(
            "{} is now {}",
            datacenter,
            if online { "online" } else { "offline" }
        );
    }

    pub fn is_online(&self, datacenter: &str) -> bool {
        self.registry
            .offline
            .read()
            .map(|set| !set.contains(datacenter))
            .unwrap_or(true)
    }

    /// Delay every call into `datacenter` by `delay` (zero clears it).
    pub fn set_latency(&self, datacenter: &str, delay: Duration) {
        if let Ok(mut latency) = self.registry.latency.write() {
            if delay.is_zero() {
                latency.remove(datacenter);
            } else {
                latency.insert(datacenter.to_string(), delay);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Decision;

    #[tokio::test]
    async fn test_offline_datacenter_is_unreachable() {
        let cluster = LocalCluster::new(ClusterConfig::default()).unwrap();
        let transport = cluster.transport();

        assert_eq!(transport.ping("TO").await.unwrap().datacenter, "TO");

        cluster.set_online("TO", false);
        assert!(!cluster.is_online("TO"));
        let err = transport.vote("TO", "file1.txt").await.unwrap_err();
        assert!(err.is_unreachable());

        cluster.set_online("TO", true);
        let vote = transport.vote("TO", "file1.txt").await.unwrap();
        assert_eq!(vote.vote, Decision::Yes);
        assert_eq!(vote.server, "TO");
    }

    #[tokio::test]
    async fn test_unknown_datacenter() {
        let cluster = LocalCluster::new(ClusterConfig::default()).unwrap();
        let err = cluster.transport().ping("SF").await.unwrap_err();
        assert!(matches!(err, Error::UnknownDatacenter(_)));
        assert!(cluster.node("SF").is_err());
    }

    #[tokio::test]
    async fn test_dropped_cluster_is_unreachable() {
        let cluster = LocalCluster::new(ClusterConfig::default()).unwrap();
        let transport = cluster.transport();
        drop(cluster);

        let err = transport.ping("NY").await.unwrap_err();
        assert!(matches!(err, Error::NetworkUnavailable { .. }));
    }
}
