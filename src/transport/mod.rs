//! Node-to-node and client-to-node transport
//!
//! Every cross-node interaction goes through [`Transport`], addressed by
//! datacenter code. Reachability (online/offline) is a property of the
//! transport, never of the node being addressed.
//!
//! - [`HttpTransport`]: reqwest client for real deployments
//! - [`LocalTransport`]: in-process dispatch for simulation and tests

pub mod http;
pub mod local;

use crate::common::{
    ListResponse, PingResponse, ReadResponse, ReplicateResponse, Result, VoteResponse,
    WriteReceipt,
};
use async_trait::async_trait;

pub use http::HttpTransport;
pub use local::{LocalCluster, LocalTransport};

/// The node operations, invoked on a named datacenter.
///
/// Write aborts come back as the same errors the target node produced
/// (`NotPrimary`, `QuorumFailed`, `LocalWriteFailed`); failure to reach the
/// target is `NetworkUnavailable` or `Timeout`.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn ping(&self, datacenter: &str) -> Result<PingResponse>;

    async fn read(&self, datacenter: &str, filename: &str) -> Result<ReadResponse>;

    async fn list(&self, datacenter: &str) -> Result<ListResponse>;

    async fn vote(&self, datacenter: &str, filename: &str) -> Result<VoteResponse>;

    async fn write(&self, datacenter: &str, filename: &str, content: &str)
        -> Result<WriteReceipt>;

    async fn replicate(
        &self,
        datacenter: &str,
        filename: &str,
        content: &str,
    ) -> Result<ReplicateResponse>;
}
