//! HTTP transport over the node API

use crate::common::protocol::{NotPrimaryBody, QuorumFailedBody};
use crate::common::{
    encode_filename, ClusterConfig, ContentBody, Error, ListResponse, PingResponse,
    ReadResponse, ReplicateResponse, Result, VoteResponse, WriteReceipt,
};
use crate::transport::Transport;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(2);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// reqwest-based [`Transport`] resolving datacenter codes through the
/// cluster config.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    cluster: Arc<ClusterConfig>,
    read_timeout: Duration,
    write_timeout: Duration,
}

impl HttpTransport {
    pub fn new(cluster: Arc<ClusterConfig>) -> Self {
        Self {
            client: Client::new(),
            cluster,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
        }
    }

    /// Override the timeouts of client-facing calls (ping, read, list, write).
    /// Vote and replicate timeouts come from the cluster config.
    pub fn with_client_timeouts(mut self, read: Duration, write: Duration) -> Self {
        self.read_timeout = read;
        self.write_timeout = write;
        self
    }

    fn url(&self, datacenter: &str, path: &str) -> Result<String> {
        let base = self
            .cluster
            .address_of(datacenter)
            .ok_or_else(|| Error::UnknownDatacenter(datacenter.to_string()))?;
        Ok(format!("{}/{}", base.trim_end_matches('/'), path))
    }

    fn file_url(&self, datacenter: &str, op: &str, filename: &str) -> Result<String> {
        self.url(datacenter, &format!("{}/{}", op, encode_filename(filename)))
    }

    async fn send(
        &self,
        datacenter: &str,
        request: RequestBuilder,
        timeout: Duration,
    ) -> Result<Response> {
        request.timeout(timeout).send().await.map_err(|e| {
            if e.is_timeout() {
                Error::Timeout(format!("{} did not answer within {:?}", datacenter, timeout))
            } else {
                Error::NetworkUnavailable {
                    node: datacenter.to_string(),
                    reason: e.to_string(),
                }
            }
        })
    }
}

/// Map a node response back to the result the node produced.
async fn decode<T: DeserializeOwned>(
    datacenter: &str,
    filename: &str,
    response: Response,
) -> Result<T> {
    let status = response.status();
    match status {
        StatusCode::OK => Ok(response.json::<T>().await?),
        StatusCode::NOT_FOUND => Err(Error::NotFound(filename.to_string())),
        StatusCode::FORBIDDEN => {
            let body: NotPrimaryBody = response.json().await?;
            Err(Error::NotPrimary {
                filename: filename.to_string(),
                expected_primary: body.expected_primary,
                this_server: body.this_server,
            })
        }
        StatusCode::CONFLICT => {
            let body: QuorumFailedBody = response.json().await?;
            Err(Error::QuorumFailed {
                votes: body.votes,
                required: body.required,
                received: body.received,
            })
        }
        StatusCode::SERVICE_UNAVAILABLE => Err(Error::NetworkUnavailable {
            node: datacenter.to_string(),
            reason: "datacenter is offline".to_string(),
        }),
        StatusCode::BAD_REQUEST => Err(Error::BadRequest(response.text().await?)),
        _ => {
            let text = response.text().await?;
            let local_failure = serde_json::from_str::<serde_json::Value>(&text)
                .ok()
                .filter(|v| v["status"] == "local write failed")
                .and_then(|v| v["error"].as_str().map(str::to_string));
            match local_failure {
                Some(detail) => Err(Error::LocalWriteFailed(detail)),
                None => Err(Error::Http(format!("{} answered {}: {}", datacenter, status, text))),
            }
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn ping(&self, datacenter: &str) -> Result<PingResponse> {
        let url = self.url(datacenter, "ping")?;
        let response = self
            .send(datacenter, self.client.get(url), self.read_timeout)
            .await?;
        decode(datacenter, "", response).await
    }

    async fn read(&self, datacenter: &str, filename: &str) -> Result<ReadResponse> {
        let url = self.file_url(datacenter, "read", filename)?;
        let response = self
            .send(datacenter, self.client.get(url), self.read_timeout)
            .await?;
        decode(datacenter, filename, response).await
    }

    async fn list(&self, datacenter: &str) -> Result<ListResponse> {
        let url = self.url(datacenter, "files")?;
        let response = self
            .send(datacenter, self.client.get(url), self.read_timeout)
            .await?;
        decode(datacenter, "", response).await
    }

    async fn vote(&self, datacenter: &str, filename: &str) -> Result<VoteResponse> {
        let url = self.file_url(datacenter, "vote", filename)?;
        let response = self
            .send(datacenter, self.client.get(url), self.cluster.vote_timeout())
            .await?;
        decode(datacenter, filename, response).await
    }

    async fn write(
        &self,
        datacenter: &str,
        filename: &str,
        content: &str,
    ) -> Result<WriteReceipt> {
        let url = self.file_url(datacenter, "write", filename)?;
        let body = ContentBody {
            content: content.to_string(),
        };
        let response = self
            .send(
                datacenter,
                self.client.post(url).json(&body),
                self.write_timeout,
            )
            .await?;
        decode(datacenter, filename, response).await
    }

    async fn replicate(
        &self,
        datacenter: &str,
        filename: &str,
        content: &str,
    ) -> Result<ReplicateResponse> {
        let url = self.file_url(datacenter, "replicate", filename)?;
        let body = ContentBody {
            content: content.to_string(),
        };
        let response = self
            .send(
                datacenter,
                self.client.post(url).json(&body),
                self.cluster.replicate_timeout(),
            )
            .await?;
        decode(datacenter, filename, response).await
    }
}
