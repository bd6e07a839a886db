//! Write coordinator
//!
//! Runs on the primary of a file and drives one write through
//!
//! ```text
//! Received → CheckingPrimary → CollectingVotes ─┬─ QuorumFailed
//!                                               └─ Committing ─┬─ LocalWriteFailed
//!                                                              └─ Replicating → Done
//! ```
//!
//! Every transition is attempted exactly once. Peer failures never abort a
//! write: an unreachable voter is a `no` vote and an unreachable replica is a
//! `failed` entry in the replication report. Only the primary check, the
//! quorum count and the local commit can end a write early.

use crate::common::{
    ClusterConfig, Error, NodeMetrics, Result, Vote, VoteSet, WriteReceipt, WriteSerialization,
};
use crate::node::replication::Replicator;
use crate::node::store::LocalStore;
use crate::transport::Transport;
use futures_util::future::join_all;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::OwnedMutexGuard;

/// Steps of a single write run, as logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePhase {
    Received,
    CheckingPrimary,
    CollectingVotes,
    Committing,
    Replicating,
    Done,
}

/// Orchestrates quorum collection, local commit and replication.
pub struct WriteCoordinator {
    datacenter: String,
    cluster: Arc<ClusterConfig>,
    store: Arc<dyn LocalStore>,
    transport: Arc<dyn Transport>,
    replicator: Replicator,
    metrics: Arc<NodeMetrics>,
    file_locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl WriteCoordinator {
    pub fn new(
        datacenter: String,
        cluster: Arc<ClusterConfig>,
        store: Arc<dyn LocalStore>,
        transport: Arc<dyn Transport>,
        metrics: Arc<NodeMetrics>,
    ) -> Self {
        let replicator = Replicator::new(transport.clone(), cluster.replicate_timeout());
        Self {
            datacenter,
            cluster,
            store,
            transport,
            replicator,
            metrics,
            file_locks: Mutex::new(HashMap::new()),
        }
    }

    fn enter(&self, filename: &str, phase: WritePhase) {
        tracing::debug!(datacenter = %self.datacenter, filename, ?phase, "write phase");
    }

    /// Run one write of `content` to `filename`.
    pub async fn write(&self, filename: &str, content: &str) -> Result<WriteReceipt> {
        self.enter(filename, WritePhase::Received);
        self.metrics.writes_total.inc();

        self.enter(filename, WritePhase::CheckingPrimary);
        let expected_primary = self.cluster.primary_for(filename);
        if expected_primary != Some(self.datacenter.as_str()) {
            self.metrics.writes_not_primary.inc();
            return Err(Error::NotPrimary {
                filename: filename.to_string(),
                expected_primary: expected_primary.map(str::to_string),
                this_server: self.datacenter.clone(),
            });
        }

        let _serialized = self.serialize(filename).await;

        self.enter(filename, WritePhase::CollectingVotes);
        let votes = self.collect_votes(filename).await;
        let received = votes.yes_count();
        let required = self.cluster.quorum_required;
        if received < required {
            self.metrics.writes_quorum_failed.inc();
            tracing::warn!(
                "Quorum failed for {}: {}/{} yes votes",
                filename,
                received,
                required
            );
            return Err(Error::QuorumFailed {
                votes,
                required,
                received,
            });
        }

        self.enter(filename, WritePhase::Committing);
        if let Err(e) = self.store.put(filename, content.as_bytes()) {
            self.metrics.writes_local_failed.inc();
            tracing::error!("Local write of {} failed: {}", filename, e);
            return Err(Error::LocalWriteFailed(e.to_string()));
        }
        self.metrics.writes_committed.inc();
        self.metrics.bytes_written.add(content.len() as u64);
        tracing::info!(
            "Committed {} ({} bytes) with {}/{} votes",
            filename,
            content.len(),
            received,
            votes.len()
        );

        self.enter(filename, WritePhase::Replicating);
        let targets = self.cluster.peers_of(&self.datacenter);
        let replication_results = self
            .replicator
            .replicate_all(&targets, filename, content)
            .await;
        let failed = replication_results.failures().len();
        if failed > 0 {
            self.metrics.replication_failures.add(failed as u64);
            tracing::warn!(
                "{} committed but {} of {} replicas missed it",
                filename,
                failed,
                targets.len()
            );
        }

        self.enter(filename, WritePhase::Done);
        Ok(WriteReceipt {
            status: WriteReceipt::SUCCESS.to_string(),
            filename: filename.to_string(),
            primary: self.datacenter.clone(),
            votes,
            replication_results,
        })
    }

    /// Ask every member for a vote. The primary votes for itself without a
    /// network call; every peer call is bounded by the vote timeout and any
    /// failure to answer counts as `no`.
    async fn collect_votes(&self, filename: &str) -> VoteSet {
        let timeout = self.cluster.vote_timeout();
        let peers = self.cluster.peers_of(&self.datacenter);

        let requests = peers.iter().map(|peer| async move {
            match tokio::time::timeout(timeout, self.transport.vote(peer, filename)).await {
                Ok(Ok(answer)) if answer.vote.is_yes() => Vote::yes(peer.as_str()),
                Ok(Ok(_)) => Vote::no(peer.as_str(), "declined"),
                Ok(Err(e)) => {
                    tracing::warn!("Vote request to {} failed: {}", peer, e);
                    Vote::no(peer.as_str(), e.to_string())
                }
                Err(_) => {
                    tracing::warn!("Vote request to {} timed out after {:?}", peer, timeout);
                    Vote::no(peer.as_str(), format!("timed out after {:?}", timeout))
                }
            }
        });

        let mut votes: VoteSet = join_all(requests).await.into_iter().collect();
        votes.insert(Vote::yes(self.datacenter.as_str()));
        votes
    }

    /// Per-file exclusion when configured; `None` leaves writes unserialized.
    async fn serialize(&self, filename: &str) -> Option<OwnedMutexGuard<()>> {
        if self.cluster.write_serialization != WriteSerialization::PerFile {
            return None;
        }
        let lock = {
            let mut locks = self
                .file_locks
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            locks
                .entry(filename.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
                .clone()
        };
        Some(lock.lock_owned().await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{Decision, ReplicationStatus};
    use crate::node::store::MemStore;
    use crate::node::Node;
    use crate::transport::LocalCluster;
    use std::time::Duration;

    #[tokio::test]
    async fn test_write_on_primary_commits_and_replicates() {
        let cluster = LocalCluster::new(ClusterConfig::default()).unwrap();
        let ny = cluster.node("NY").unwrap();

        let receipt = ny.write("file1.txt", "hello").await.unwrap();
        assert!(receipt.is_success());
        assert_eq!(receipt.primary, "NY");
        assert_eq!(receipt.votes.len(), 3);
        assert_eq!(receipt.votes.yes_count(), 3);
        assert_eq!(receipt.replication_results.len(), 2);
        assert!(receipt.replication_results.get("NY").is_none());
        for dc in ["TO", "LD"] {
            assert_eq!(
                receipt.replication_results.get(dc).unwrap().status,
                ReplicationStatus::Replicated
            );
        }
    }

    #[tokio::test]
    async fn test_unassigned_file_has_no_primary() {
        let cluster = LocalCluster::new(ClusterConfig::default()).unwrap();
        for dc in ["NY", "TO", "LD"] {
            let err = cluster
                .node(dc)
                .unwrap()
                .write("unassigned.txt", "x")
                .await
                .unwrap_err();
            match err {
                Error::NotPrimary {
                    expected_primary,
                    this_server,
                    ..
                } => {
                    assert_eq!(expected_primary, None);
                    assert_eq!(this_server, dc);
                }
                other => panic!("expected NotPrimary, got {:?}", other),
            }
        }
    }

    #[tokio::test]
    async fn test_one_peer_down_still_reaches_quorum() {
        let cluster = LocalCluster::new(ClusterConfig::default()).unwrap();
        cluster.set_online("LD", false);

        let receipt = cluster
            .node("NY")
            .unwrap()
            .write("file1.txt", "two of three")
            .await
            .unwrap();

        assert_eq!(receipt.votes.yes_count(), 2);
        let ld_vote = receipt.votes.get("LD").unwrap();
        assert_eq!(ld_vote.decision, Decision::No);
        assert!(ld_vote.reason.is_some());
        assert!(receipt.replication_results.is_partial_failure());
    }

    #[tokio::test]
    async fn test_slow_voters_count_as_no() {
        let config = ClusterConfig {
            vote_timeout_ms: 50,
            ..Default::default()
        };
        let cluster = LocalCluster::new(config).unwrap();
        cluster.set_latency("TO", Duration::from_millis(500));
        cluster.set_latency("LD", Duration::from_millis(500));

        let err = cluster
            .node("NY")
            .unwrap()
            .write("file1.txt", "late")
            .await
            .unwrap_err();
        match err {
            Error::QuorumFailed {
                votes,
                required,
                received,
            } => {
                assert_eq!(required, 2);
                assert_eq!(received, 1);
                let reason = votes.get("TO").unwrap().reason.clone().unwrap();
                assert!(reason.contains("timed out"));
            }
            other => panic!("expected QuorumFailed, got {:?}", other),
        }
        let stored = cluster.node("NY").unwrap().store().get("file1.txt").unwrap();
        assert_eq!(stored, None);
    }

    #[tokio::test]
    async fn test_declining_policy_blocks_quorum() {
        let cluster = LocalCluster::build(ClusterConfig::default(), |dc, config, transport| {
            let node = Node::new(dc, config, Arc::new(MemStore::new()), transport)?;
            Ok(if dc == "NY" {
                node
            } else {
                node.with_vote_policy(Arc::new(|_: &str| Decision::No))
            })
        })
        .unwrap();

        let err = cluster
            .node("NY")
            .unwrap()
            .write("file1.txt", "denied")
            .await
            .unwrap_err();
        match err {
            Error::QuorumFailed { votes, received, .. } => {
                assert_eq!(received, 1);
                assert_eq!(votes.get("TO").unwrap().reason.as_deref(), Some("declined"));
            }
            other => panic!("expected QuorumFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_per_file_serialization_applies_writes_in_turn() {
        let config = ClusterConfig {
            write_serialization: WriteSerialization::PerFile,
            ..Default::default()
        };
        let cluster = LocalCluster::new(config).unwrap();
        cluster.set_latency("TO", Duration::from_millis(20));
        let ny = cluster.node("NY").unwrap().clone();

        let first = {
            let ny = ny.clone();
            tokio::spawn(async move { ny.write("file1.txt", "first").await })
        };
        let second = {
            let ny = ny.clone();
            tokio::spawn(async move { ny.write("file1.txt", "second").await })
        };
        assert!(first.await.unwrap().is_ok());
        assert!(second.await.unwrap().is_ok());

        // Whichever ran last, primary and replicas agree once both complete.
        let primary = ny.store().get("file1.txt").unwrap().unwrap();
        let replica = cluster.node("TO").unwrap().store().get("file1.txt").unwrap().unwrap();
        assert_eq!(primary, replica);
    }
}
