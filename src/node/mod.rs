//! Datacenter node
//!
//! A node bundles:
//! - its local store (exclusively owned)
//! - the vote service answering write proposals
//! - the replication handler applying content pushed by primaries
//! - the write coordinator, used when it is the primary of a file
//!
//! The node API is plain method calls; `http` layers the HTTP surface on top
//! and `transport::LocalTransport` calls it directly in-process.

pub mod coordinator;
pub mod http;
pub mod replication;
pub mod server;
pub mod store;
pub mod vote;

use crate::common::{
    validate_filename, ClusterConfig, Error, ListResponse, NodeMetrics, PingResponse,
    ReadResponse, ReplicateResponse, ReplicationStatus, Result, VoteResponse, WriteReceipt,
};
use crate::transport::Transport;
use coordinator::WriteCoordinator;
use std::sync::Arc;
use store::LocalStore;
use vote::{AcceptAll, VotePolicy};

pub use server::NodeServer;

pub struct Node {
    datacenter: String,
    cluster: Arc<ClusterConfig>,
    store: Arc<dyn LocalStore>,
    vote_policy: Arc<dyn VotePolicy>,
    coordinator: WriteCoordinator,
    metrics: Arc<NodeMetrics>,
}

impl Node {
    /// Create the node serving `datacenter`, which must be a cluster member.
    pub fn new(
        datacenter: &str,
        cluster: Arc<ClusterConfig>,
        store: Arc<dyn LocalStore>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        if !cluster.contains(datacenter) {
            return Err(Error::UnknownDatacenter(datacenter.to_string()));
        }

        let metrics = Arc::new(NodeMetrics::new());
        let coordinator = WriteCoordinator::new(
            datacenter.to_string(),
            cluster.clone(),
            store.clone(),
            transport,
            metrics.clone(),
        );

        Ok(Self {
            datacenter: datacenter.to_string(),
            cluster,
            store,
            vote_policy: Arc::new(AcceptAll),
            coordinator,
            metrics,
        })
    }

    /// Replace the vote policy (default: [`AcceptAll`]).
    pub fn with_vote_policy(mut self, policy: Arc<dyn VotePolicy>) -> Self {
        self.vote_policy = policy;
        self
    }

    pub fn datacenter(&self) -> &str {
        &self.datacenter
    }

    pub fn cluster(&self) -> &Arc<ClusterConfig> {
        &self.cluster
    }

    pub fn store(&self) -> &Arc<dyn LocalStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<NodeMetrics> {
        &self.metrics
    }

    pub fn ping(&self) -> PingResponse {
        PingResponse {
            status: "ok".to_string(),
            datacenter: self.datacenter.clone(),
        }
    }

    /// Serve a read from the local store only. A replica that missed a
    /// replication answers with whatever it holds, possibly nothing.
    pub fn read(&self, filename: &str) -> Result<ReadResponse> {
        validate_filename(filename)?;
        self.metrics.reads_total.inc();

        let data = match self.store.get(filename)? {
            Some(data) => data,
            None => {
                self.metrics.reads_not_found.inc();
                return Err(Error::NotFound(filename.to_string()));
            }
        };
        let content = String::from_utf8(data)
            .map_err(|e| Error::Corrupted(format!("{} is not UTF-8: {}", filename, e)))?;

        Ok(ReadResponse {
            filename: filename.to_string(),
            content,
            server: self.datacenter.clone(),
        })
    }

    pub fn list(&self) -> Result<ListResponse> {
        Ok(ListResponse {
            server: self.datacenter.clone(),
            files: self.store.list()?,
        })
    }

    pub fn vote(&self, filename: &str) -> Result<VoteResponse> {
        validate_filename(filename)?;
        self.metrics.votes_cast.inc();
        Ok(VoteResponse {
            vote: self.vote_policy.decide(filename),
            server: self.datacenter.clone(),
        })
    }

    /// Coordinate a write; only succeeds on the file's primary.
    pub async fn write(&self, filename: &str, content: &str) -> Result<WriteReceipt> {
        validate_filename(filename)?;
        self.coordinator.write(filename, content).await
    }

    /// Apply content pushed by a primary.
    pub fn replicate(&self, filename: &str, content: &str) -> Result<ReplicateResponse> {
        validate_filename(filename)?;
        self.store
            .put(filename, content.as_bytes())
            .map_err(|e| Error::LocalWriteFailed(e.to_string()))?;
        self.metrics.replications_applied.inc();
        self.metrics.bytes_written.add(content.len() as u64);
        tracing::debug!("Applied replica of {}", filename);

        Ok(ReplicateResponse {
            status: ReplicationStatus::Replicated,
            filename: filename.to_string(),
            server: self.datacenter.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Decision;
    use crate::transport::LocalCluster;

    #[test]
    fn test_unknown_datacenter_is_rejected() {
        let cluster = Arc::new(ClusterConfig::default());
        let local = LocalCluster::new(ClusterConfig::default()).unwrap();
        let result = Node::new(
            "SF",
            cluster,
            Arc::new(store::MemStore::new()),
            local.transport(),
        );
        assert!(matches!(result, Err(Error::UnknownDatacenter(_))));
    }

    #[test]
    fn test_read_is_local_only() {
        let cluster = LocalCluster::new(ClusterConfig::default()).unwrap();
        let ny = cluster.node("NY").unwrap();
        let to = cluster.node("TO").unwrap();

        ny.store().put("file1.txt", b"only on NY").unwrap();

        assert_eq!(ny.read("file1.txt").unwrap().content, "only on NY");
        assert!(matches!(to.read("file1.txt"), Err(Error::NotFound(_))));
        assert_eq!(to.metrics().reads_not_found.get(), 1);
    }

    #[test]
    fn test_vote_and_replicate() {
        let cluster = LocalCluster::new(ClusterConfig::default()).unwrap();
        let ld = cluster.node("LD").unwrap();

        let vote = ld.vote("file1.txt").unwrap();
        assert_eq!(vote.vote, Decision::Yes);
        assert_eq!(vote.server, "LD");

        let ack = ld.replicate("file1.txt", "pushed").unwrap();
        assert_eq!(ack.status, ReplicationStatus::Replicated);
        assert_eq!(ack.server, "LD");
        assert_eq!(ld.read("file1.txt").unwrap().content, "pushed");
        assert_eq!(ld.list().unwrap().files, vec!["file1.txt"]);
    }

    #[test]
    fn test_invalid_filenames() {
        let cluster = LocalCluster::new(ClusterConfig::default()).unwrap();
        let ny = cluster.node("NY").unwrap();
        assert!(matches!(ny.read(".."), Err(Error::InvalidFilename(_))));
        assert!(matches!(ny.vote(""), Err(Error::InvalidFilename(_))));
        assert!(matches!(
            ny.replicate(".", "x"),
            Err(Error::InvalidFilename(_))
        ));
    }
}
