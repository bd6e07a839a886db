//! Node server

use crate::common::{ClusterConfig, Error, NodeConfig, Result};
use crate::node::http::{create_router, NodeState, Reachability};
use crate::node::store::FileStore;
use crate::node::Node;
use crate::transport::HttpTransport;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

pub struct NodeServer {
    config: NodeConfig,
    cluster: Arc<ClusterConfig>,
}

impl NodeServer {
    pub fn new(config: NodeConfig, cluster: Arc<ClusterConfig>) -> Result<Self> {
        cluster.validate()?;
        if !cluster.contains(&config.datacenter) {
            return Err(Error::UnknownDatacenter(config.datacenter));
        }
        Ok(Self { config, cluster })
    }

    pub fn datacenter(&self) -> &str {
        &self.config.datacenter
    }

    /// Open the on-disk store and wire the node to its peers over HTTP.
    fn build_node(&self) -> Result<Arc<Node>> {
        let store = Arc::new(FileStore::open(self.config.store_dir())?);
        let transport = Arc::new(HttpTransport::new(self.cluster.clone()));
        let node = Node::new(&self.config.datacenter, self.cluster.clone(), store, transport)?;
        Ok(Arc::new(node))
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn serve(self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        self.run(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn run<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let node = self.build_node()?;

        tracing::info!("Starting node: {}", self.config.datacenter);
        tracing::info!("  HTTP API: {}", listener.local_addr()?);
        tracing::info!("  Data path: {}", self.config.store_dir().display());
        tracing::info!("  Peers: {}", self.cluster.peers_of(&self.config.datacenter).join(", "));
        for file in self.cluster.files.iter().filter(|f| f.primary == self.config.datacenter) {
            tracing::info!("  Primary for: {}", file.filename);
        }

        let router = create_router(NodeState {
            node,
            reachability: Reachability::default(),
        });

        tracing::info!("✓ Node {} ready", self.config.datacenter);

        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await?;

        tracing::info!("Node {} stopped", self.config.datacenter);
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rejects_datacenter_outside_cluster() {
        let dir = TempDir::new().unwrap();
        let config = NodeConfig {
            datacenter: "SF".to_string(),
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let result = NodeServer::new(config, Arc::new(ClusterConfig::default()));
        assert!(matches!(result, Err(Error::UnknownDatacenter(_))));
    }

    #[tokio::test]
    async fn test_run_serves_ping_and_stops() {
        let dir = TempDir::new().unwrap();
        let config = NodeConfig {
            datacenter: "TO".to_string(),
            data_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        let server = NodeServer::new(config, Arc::new(ClusterConfig::default())).unwrap();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let handle = tokio::spawn(server.run(listener, async {
            let _ = stop_rx.await;
        }));

        let body: serde_json::Value = reqwest::get(format!("http://{}/ping", addr))
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["datacenter"], "TO");
        assert!(dir.path().join("TO").is_dir());

        stop_tx.send(()).unwrap();
        handle.await.unwrap().unwrap();
    }
}
