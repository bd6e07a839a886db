//! Common utilities and types shared across minifs

pub mod config;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod tracing_middleware;
pub mod utils;

pub use config::{
    ClientConfig, ClusterConfig, Config, DatacenterSpec, FileAssignment, NodeConfig,
    WriteSerialization, QUORUM_REQUIRED,
};
pub use error::{Error, Result};
pub use metrics::{Counter, NodeMetrics};
pub use protocol::{
    ContentBody, Decision, ListResponse, PingResponse, ReadResponse, ReplicateResponse,
    ReplicationReport, ReplicationResult, ReplicationStatus, Vote, VoteResponse, VoteSet,
    WriteReceipt,
};
pub use utils::{decode_filename, encode_filename, validate_filename};
