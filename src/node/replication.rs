//! Replication fan-out
//!
//! After the primary has committed a file locally, the content is pushed to
//! every other datacenter. Pushes run concurrently and independently: each has
//! its own timeout, none is retried, and one target failing neither blocks nor
//! undoes the others. The caller gets one [`ReplicationResult`] per target.

use crate::common::{ReplicationReport, ReplicationResult, ReplicationStatus};
use crate::transport::Transport;
use futures_util::future::join_all;
use std::sync::Arc;
use std::time::Duration;

/// Pushes committed content from a primary to its peers.
pub struct Replicator {
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl Replicator {
    pub fn new(transport: Arc<dyn Transport>, timeout: Duration) -> Self {
        Self { transport, timeout }
    }

    /// Replicate to every target and wait for all of them.
    pub async fn replicate_all(
        &self,
        targets: &[String],
        filename: &str,
        content: &str,
    ) -> ReplicationReport {
        let pushes = targets
            .iter()
            .map(|target| self.replicate_one(target, filename, content));
        join_all(pushes).await.into_iter().collect()
    }

    async fn replicate_one(&self, target: &str, filename: &str, content: &str) -> ReplicationResult {
        let push = self.transport.replicate(target, filename, content);
        match tokio::time::timeout(self.timeout, push).await {
            Ok(Ok(ack)) if ack.status == ReplicationStatus::Replicated => {
                tracing::debug!("Replicated {} to {}", filename, target);
                ReplicationResult::replicated(target)
            }
            Ok(Ok(ack)) => {
                tracing::warn!("{} refused replica of {}", target, filename);
                ReplicationResult::failed(target, format!("{} answered {:?}", ack.server, ack.status))
            }
            Ok(Err(e)) => {
                tracing::warn!("Replication of {} to {} failed: {}", filename, target, e);
                ReplicationResult::failed(target, e.to_string())
            }
            Err(_) => {
                tracing::warn!(
                    "Replication of {} to {} timed out after {:?}",
                    filename,
                    target,
                    self.timeout
                );
                ReplicationResult::failed(target, format!("timed out after {:?}", self.timeout))
            }
        }
    }
}
