//! HTTP API of a node
//!
//! | Route                      | Operation                         |
//! |----------------------------|-----------------------------------|
//! | `GET /ping`                | health                            |
//! | `GET /read/:filename`      | local read (also `/files/:name`)  |
//! | `GET /files`               | list local files                  |
//! | `GET /vote/:filename`      | vote on a write proposal          |
//! | `POST /write/:filename`    | coordinated write (primary only)  |
//! | `POST /replicate/:filename`| apply a replica pushed by primary |
//! | `GET /metrics`             | Prometheus counters               |
//! | `/admin/*`                 | status and failure injection      |
//!
//! Failure injection lives here, outside the node: while a node is marked
//! offline every non-admin request is refused with 503, which peers and
//! clients observe as the datacenter being unreachable.

use crate::common::protocol::{NotPrimaryBody, QuorumFailedBody};
use crate::common::tracing_middleware::request_tracing_middleware;
use crate::common::{ContentBody, Error};
use crate::node::Node;
use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path, Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Largest accepted request body.
const MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Online/offline switch of one HTTP-served node.
#[derive(Clone, Debug, Default)]
pub struct Reachability {
    offline: Arc<AtomicBool>,
}

impl Reachability {
    pub fn is_online(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }

    pub fn set_online(&self, online: bool) {
        self.offline.store(!online, Ordering::SeqCst);
    }
}

/// Shared node state for HTTP handlers.
#[derive(Clone)]
pub struct NodeState {
    pub node: Arc<Node>,
    pub reachability: Reachability,
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = self.to_http_status();
        match self {
            Error::NotPrimary {
                expected_primary,
                this_server,
                ..
            } => (
                status,
                Json(NotPrimaryBody {
                    error: "writes must go to primary".to_string(),
                    expected_primary,
                    this_server,
                }),
            )
                .into_response(),
            Error::QuorumFailed {
                votes,
                required,
                received,
            } => (
                status,
                Json(QuorumFailedBody {
                    status: "quorum failed".to_string(),
                    votes,
                    required,
                    received,
                }),
            )
                .into_response(),
            Error::LocalWriteFailed(detail) => (
                status,
                Json(json!({ "status": "local write failed", "error": detail })),
            )
                .into_response(),
            Error::NotFound(_) => {
                (status, Json(json!({ "error": "file not found" }))).into_response()
            }
            other => (status, Json(json!({ "error": other.to_string() }))).into_response(),
        }
    }
}

fn parse_content(body: &Bytes) -> Result<ContentBody, Error> {
    serde_json::from_slice(body).map_err(|e| Error::BadRequest(format!("invalid JSON: {}", e)))
}

/// Creates the HTTP router with all node endpoints.
pub fn create_router(state: NodeState) -> Router {
    let datacenter = state.node.datacenter().to_string();
    let reachability = state.reachability.clone();

    Router::new()
        .route("/ping", get(ping))
        .route("/read/:filename", get(read_file))
        .route("/files", get(list_files))
        .route("/files/:filename", get(read_file))
        .route("/vote/:filename", get(vote))
        .route("/write/:filename", post(write_file))
        .route("/replicate/:filename", post(replicate_file))
        .route("/metrics", get(metrics))
        .route("/admin/status", get(admin_status))
        .route("/admin/offline", post(admin_offline))
        .route("/admin/online", post(admin_online))
        .fallback(unknown_endpoint)
        .with_state(state)
        .layer(middleware::from_fn_with_state(
            reachability,
            reachability_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            datacenter,
            request_tracing_middleware,
        ))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
}

/// Refuses every non-admin request while the node is offline.
async fn reachability_middleware(
    State(reachability): State<Reachability>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if reachability.is_online() || request.uri().path().starts_with("/admin/") {
        return next.run(request).await;
    }
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({ "error": "datacenter is offline" })),
    )
        .into_response()
}

async fn ping(State(state): State<NodeState>) -> impl IntoResponse {
    Json(state.node.ping())
}

async fn read_file(
    State(state): State<NodeState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, Error> {
    Ok(Json(state.node.read(&filename)?))
}

async fn list_files(State(state): State<NodeState>) -> Result<impl IntoResponse, Error> {
    Ok(Json(state.node.list()?))
}

async fn vote(
    State(state): State<NodeState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, Error> {
    Ok(Json(state.node.vote(&filename)?))
}

/// Runs the coordinator in its own task so a client hanging up mid-write does
/// not cancel a commit already under way.
async fn write_file(
    State(state): State<NodeState>,
    Path(filename): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, Error> {
    let ContentBody { content } = parse_content(&body)?;
    let node = state.node.clone();
    let receipt = tokio::spawn(async move { node.write(&filename, &content).await })
        .await
        .map_err(|e| Error::Internal(format!("write task failed: {}", e)))??;
    Ok(Json(receipt))
}

async fn replicate_file(
    State(state): State<NodeState>,
    Path(filename): Path<String>,
    body: Bytes,
) -> Result<impl IntoResponse, Error> {
    let ContentBody { content } = parse_content(&body)?;
    Ok(Json(state.node.replicate(&filename, &content)?))
}

async fn metrics(State(state): State<NodeState>) -> impl IntoResponse {
    let node = &state.node;
    (
        StatusCode::OK,
        node.metrics().to_prometheus(node.datacenter()),
    )
}

async fn admin_status(State(state): State<NodeState>) -> impl IntoResponse {
    let node = &state.node;
    let cluster = node.cluster();
    let primaries: BTreeMap<&str, &str> = cluster
        .files
        .iter()
        .map(|f| (f.filename.as_str(), f.primary.as_str()))
        .collect();
    let files_stored = node.store().list().map(|files| files.len()).unwrap_or(0);

    Json(json!({
        "datacenter": node.datacenter(),
        "online": state.reachability.is_online(),
        "peers": cluster.peers_of(node.datacenter()),
        "quorum_required": cluster.quorum_required,
        "write_serialization": cluster.write_serialization,
        "primaries": primaries,
        "files_stored": files_stored,
        "version": crate::VERSION,
    }))
}

async fn admin_offline(State(state): State<NodeState>) -> impl IntoResponse {
    set_reachability(&state, false)
}

async fn admin_online(State(state): State<NodeState>) -> impl IntoResponse {
    set_reachability(&state, true)
}

fn set_reachability(state: &NodeState, online: bool) -> Json<serde_json::Value> {
    state.reachability.set_online(online);
    tracing::warn!(
        "{} marked {}",
        state.node.datacenter(),
        if online { "online" } else { "offline" }
    );
    Json(json!({ "datacenter": state.node.datacenter(), "online": online }))
}

async fn unknown_endpoint() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "unknown endpoint" })),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::ClusterConfig;
    use crate::transport::LocalCluster;
    use axum::http::Method;
    use tower::ServiceExt;

    fn router(cluster: &LocalCluster, dc: &str) -> (Router, Reachability) {
        let reachability = Reachability::default();
        let router = create_router(NodeState {
            node: cluster.node(dc).unwrap().clone(),
            reachability: reachability.clone(),
        });
        (router, reachability)
    }

    async fn call(
        router: &Router,
        method: Method,
        uri: &str,
        body: &str,
    ) -> (StatusCode, serde_json::Value) {
        let request = axum::http::Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn test_offline_refuses_all_but_admin() {
        let cluster = LocalCluster::new(ClusterConfig::default()).unwrap();
        let (router, reachability) = router(&cluster, "NY");

        reachability.set_online(false);
        let (status, body) = call(&router, Method::GET, "/ping", "").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"], "datacenter is offline");

        let (status, body) = call(&router, Method::GET, "/admin/status", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["online"], false);

        let (status, _) = call(&router, Method::POST, "/admin/online", "").await;
        assert_eq!(status, StatusCode::OK);
        assert!(reachability.is_online());
        let (status, body) = call(&router, Method::GET, "/ping", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["datacenter"], "NY");
    }

    #[tokio::test]
    async fn test_replicate_endpoint_applies_content() {
        let cluster = LocalCluster::new(ClusterConfig::default()).unwrap();
        let (router, _) = router(&cluster, "TO");

        let (status, body) = call(
            &router,
            Method::POST,
            "/replicate/file1.txt",
            r#"{"content":"pushed"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "replicated");
        assert_eq!(body["server"], "TO");

        let (status, body) = call(&router, Method::GET, "/read/file1.txt", "").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["content"], "pushed");
    }

    #[tokio::test]
    async fn test_encoded_filenames_and_invalid_names() {
        let cluster = LocalCluster::new(ClusterConfig::default()).unwrap();
        let (router, _) = router(&cluster, "LD");

        let (status, _) = call(
            &router,
            Method::POST,
            "/replicate/dir%2Fnote%20one.txt",
            r#"{"content":"x"}"#,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let stored = cluster.node("LD").unwrap().store().get("dir/note one.txt").unwrap();
        assert_eq!(stored.unwrap(), b"x");

        let (status, _) = call(&router, Method::GET, "/read/%2E%2E", "").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_local_write_failure_body() {
        let response = Error::LocalWriteFailed("disk full".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["status"], "local write failed");
        assert_eq!(body["error"], "disk full");
    }
}
