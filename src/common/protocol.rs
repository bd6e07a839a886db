//! Wire messages exchanged between nodes and clients
//!
//! Field names follow the JSON bodies of the node HTTP API, so the same
//! structs serve the in-process transport and the HTTP adapter.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A vote decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Decision {
    Yes,
    No,
}

impl Decision {
    pub fn is_yes(self) -> bool {
        self == Decision::Yes
    }
}

/// One node's answer to a write proposal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vote {
    #[serde(rename = "server")]
    pub node: String,
    #[serde(rename = "vote")]
    pub decision: Decision,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Vote {
    pub fn yes(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            decision: Decision::Yes,
            reason: None,
        }
    }

    pub fn no(node: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            decision: Decision::No,
            reason: Some(reason.into()),
        }
    }
}

/// Votes collected for a single write, keyed by datacenter code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoteSet(BTreeMap<String, Vote>);

impl VoteSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, vote: Vote) {
        self.0.insert(vote.node.clone(), vote);
    }

    pub fn get(&self, node: &str) -> Option<&Vote> {
        self.0.get(node)
    }

    pub fn yes_count(&self) -> usize {
        self.0.values().filter(|v| v.decision.is_yes()).count()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vote> {
        self.0.values()
    }
}

impl FromIterator<Vote> for VoteSet {
    fn from_iter<I: IntoIterator<Item = Vote>>(iter: I) -> Self {
        let mut set = VoteSet::new();
        for vote in iter {
            set.insert(vote);
        }
        set
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplicationStatus {
    Replicated,
    Failed,
}

/// Outcome of pushing content to one replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationResult {
    #[serde(rename = "server")]
    pub node: String,
    pub status: ReplicationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ReplicationResult {
    pub fn replicated(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            status: ReplicationStatus::Replicated,
            detail: None,
        }
    }

    pub fn failed(node: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            status: ReplicationStatus::Failed,
            detail: Some(detail.into()),
        }
    }
}

/// Per-replica outcomes of one write, keyed by datacenter code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReplicationReport(BTreeMap<String, ReplicationResult>);

impl ReplicationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, result: ReplicationResult) {
        self.0.insert(result.node.clone(), result);
    }

    pub fn get(&self, node: &str) -> Option<&ReplicationResult> {
        self.0.get(node)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ReplicationResult> {
        self.0.values()
    }

    /// Replicas that did not receive the content.
    pub fn failures(&self) -> Vec<&ReplicationResult> {
        self.0
            .values()
            .filter(|r| r.status == ReplicationStatus::Failed)
            .collect()
    }

    /// True when at least one replica failed. Informational only: the write
    /// that produced this report has already committed on the primary.
    pub fn is_partial_failure(&self) -> bool {
        !self.failures().is_empty()
    }
}

impl FromIterator<ReplicationResult> for ReplicationReport {
    fn from_iter<I: IntoIterator<Item = ReplicationResult>>(iter: I) -> Self {
        let mut report = ReplicationReport::new();
        for result in iter {
            report.insert(result);
        }
        report
    }
}

/// Result of a committed write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteReceipt {
    pub status: String,
    pub filename: String,
    pub primary: String,
    pub votes: VoteSet,
    pub replication_results: ReplicationReport,
}

impl WriteReceipt {
    pub const SUCCESS: &'static str = "success";

    pub fn is_success(&self) -> bool {
        self.status == Self::SUCCESS
    }
}

/// Body of `POST /write/{filename}` and `POST /replicate/{filename}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentBody {
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PingResponse {
    pub status: String,
    pub datacenter: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResponse {
    pub filename: String,
    pub content: String,
    pub server: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteResponse {
    pub vote: Decision,
    pub server: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicateResponse {
    pub status: ReplicationStatus,
    pub filename: String,
    pub server: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse {
    pub server: String,
    pub files: Vec<String>,
}

/// 403 payload of a write sent to the wrong node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotPrimaryBody {
    pub error: String,
    pub expected_primary: Option<String>,
    pub this_server: String,
}

/// 409 payload of a write that did not gather enough votes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuorumFailedBody {
    pub status: String,
    pub votes: VoteSet,
    pub required: usize,
    pub received: usize,
}
