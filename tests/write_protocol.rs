//! Write protocol scenarios on an in-process three-datacenter cluster

use minifs::common::{ClusterConfig, Decision, Error, ReplicationStatus, Result};
use minifs::node::store::{LocalStore, MemStore};
use minifs::{LocalCluster, Node, Transport};
use std::sync::Arc;

/// Store whose writes always fail; reads see nothing.
struct BrokenStore;

impl LocalStore for BrokenStore {
    fn get(&self, _filename: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    fn put(&self, _filename: &str, _content: &[u8]) -> Result<()> {
        Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk full",
        )))
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

fn cluster_with_broken(broken: &'static str) -> LocalCluster {
    LocalCluster::build(ClusterConfig::default(), |dc, config, transport| {
        let store: Arc<dyn LocalStore> = if dc == broken {
            Arc::new(BrokenStore)
        } else {
            Arc::new(MemStore::new())
        };
        Node::new(dc, config, store, transport)
    })
    .unwrap()
}

#[tokio::test]
async fn test_all_online_write_then_replica_read() {
    let cluster = LocalCluster::new(ClusterConfig::default()).unwrap();
    let transport = cluster.transport();

    let receipt = transport.write("NY", "file1.txt", "hello").await.unwrap();
    assert!(receipt.is_success());
    assert_eq!(receipt.primary, "NY");
    assert_eq!(receipt.votes.yes_count(), 3);
    for dc in ["NY", "TO", "LD"] {
        assert_eq!(receipt.votes.get(dc).unwrap().decision, Decision::Yes);
    }
    for dc in ["TO", "LD"] {
        assert_eq!(
            receipt.replication_results.get(dc).unwrap().status,
            ReplicationStatus::Replicated
        );
    }

    let read = transport.read("TO", "file1.txt").await.unwrap();
    assert_eq!(read.content, "hello");
    assert_eq!(read.server, "TO");
}

#[tokio::test]
async fn test_two_peers_offline_fails_quorum_and_leaves_primary_untouched() {
    let cluster = LocalCluster::new(ClusterConfig::default()).unwrap();
    let transport = cluster.transport();
    transport.write("NY", "file1.txt", "before").await.unwrap();

    cluster.set_online("TO", false);
    cluster.set_online("LD", false);

    let err = transport
        .write("NY", "file1.txt", "after")
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
            assert_eq!(votes.len(), 3);
            assert_eq!(votes.get("TO").unwrap().decision, Decision::No);
            assert_eq!(votes.get("LD").unwrap().decision, Decision::No);
        }
        other => panic!("expected QuorumFailed, got {:?}", other),
    }

    let read = transport.read("NY", "file1.txt").await.unwrap();
    assert_eq!(read.content, "before");
    assert_eq!(
        cluster.node("NY").unwrap().metrics().writes_quorum_failed.get(),
        1
    );
}

#[tokio::test]
async fn test_non_primaries_refuse_writes() {
    let cluster = LocalCluster::new(ClusterConfig::default()).unwrap();
    let transport = cluster.transport();

    let cases = [
        ("file1.txt", "NY", ["TO", "LD"]),
        ("file2.txt", "TO", ["NY", "LD"]),
        ("file3.txt", "LD", ["NY", "TO"]),
    ];
    for (filename, primary, others) in cases {
        for dc in others {
            match transport.write(dc, filename, "x").await.unwrap_err() {
                Error::NotPrimary {
                    expected_primary,
                    this_server,
                    ..
                } => {
                    assert_eq!(expected_primary.as_deref(), Some(primary));
                    assert_eq!(this_server, dc);
                }
                other => panic!("expected NotPrimary, got {:?}", other),
            }
            assert!(cluster.node(dc).unwrap().store().get(filename).unwrap().is_none());
        }
    }
}

#[tokio::test]
async fn test_replication_failure_keeps_write_successful() {
    let cluster = LocalCluster::new(ClusterConfig::default()).unwrap();
    let transport = cluster.transport();
    cluster.set_online("LD", false);

    let receipt = transport.write("NY", "file1.txt", "partial").await.unwrap();
    assert!(receipt.is_success());
    assert!(receipt.replication_results.is_partial_failure());

    let failures = receipt.replication_results.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].node, "LD");
    assert!(failures[0].detail.is_some());

    assert_eq!(
        transport.read("NY", "file1.txt").await.unwrap().content,
        "partial"
    );
    assert_eq!(
        transport.read("TO", "file1.txt").await.unwrap().content,
        "partial"
    );
}

#[tokio::test]
async fn test_file2_round_trip_through_toronto() {
    let cluster = LocalCluster::new(ClusterConfig::default()).unwrap();
    let transport = cluster.transport();

    let receipt = transport.write("TO", "file2.txt", "maple").await.unwrap();
    assert_eq!(receipt.primary, "TO");
    assert!(receipt.replication_results.get("TO").is_none());

    for dc in ["NY", "TO", "LD"] {
        assert_eq!(transport.read(dc, "file2.txt").await.unwrap().content, "maple");
    }
}

#[tokio::test]
async fn test_replica_that_missed_replication_serves_stale_content() {
    let cluster = LocalCluster::new(ClusterConfig::default()).unwrap();
    let transport = cluster.transport();
    transport.write("LD", "file3.txt", "v1").await.unwrap();

    cluster.set_online("NY", false);
    transport.write("LD", "file3.txt", "v2").await.unwrap();
    cluster.set_online("NY", true);

    assert_eq!(transport.read("LD", "file3.txt").await.unwrap().content, "v2");
    assert_eq!(transport.read("TO", "file3.txt").await.unwrap().content, "v2");
    assert_eq!(transport.read("NY", "file3.txt").await.unwrap().content, "v1");

    // The next successful write repairs the lagging replica.
    transport.write("LD", "file3.txt", "v3").await.unwrap();
    assert_eq!(transport.read("NY", "file3.txt").await.unwrap().content, "v3");
}

#[tokio::test]
async fn test_local_commit_failure_aborts_before_replication() {
    let cluster = cluster_with_broken("NY");
    let transport = cluster.transport();

    let err = transport.write("NY", "file1.txt", "lost").await.unwrap_err();
    assert!(matches!(err, Error::LocalWriteFailed(ref detail) if detail.contains("disk full")));
    assert!(err.is_write_abort());

    for dc in ["TO", "LD"] {
        assert!(matches!(
            transport.read(dc, "file1.txt").await,
            Err(Error::NotFound(_))
        ));
    }
}

#[tokio::test]
async fn test_replica_store_failure_is_reported_not_raised() {
    let cluster = cluster_with_broken("TO");
    let transport = cluster.transport();

    let receipt = transport.write("NY", "file1.txt", "hello").await.unwrap();
    assert!(receipt.is_success());
    let to = receipt.replication_results.get("TO").unwrap();
    assert_eq!(to.status, ReplicationStatus::Failed);
    assert!(to.detail.as_deref().unwrap().contains("disk full"));
    assert_eq!(
        receipt.replication_results.get("LD").unwrap().status,
        ReplicationStatus::Replicated
    );
}

#[tokio::test]
async fn test_one_peer_offline_still_commits() {
    let cluster = LocalCluster::new(ClusterConfig::default()).unwrap();
    let transport = cluster.transport();
    cluster.set_online("TO", false);

    let receipt = transport.write("LD", "file3.txt", "two votes").await.unwrap();
    assert_eq!(receipt.votes.yes_count(), 2);
    assert_eq!(receipt.votes.get("TO").unwrap().decision, Decision::No);
}
