//! # minifs
//!
//! A small multi-datacenter file store with:
//! - A static primary datacenter per file
//! - Quorum voting before every write commits on the primary
//! - Best-effort replication fan-out to every other datacenter
//! - A client-side read cache, invalidated by the client's own writes
//!
//! ## Architecture
//!
//! ```text
//!             write file1.txt            ┌──────────────┐
//!  client ──────────────────────────────▶│  NY (primary)│
//!    │                                   │  coordinator │
//!    │ read (cache miss)                 └──┬───────┬───┘
//!    ▼                              vote /  │       │  vote /
//!  bootstrap node                 replicate │       │ replicate
//!                                  ┌────────▼─┐   ┌─▼────────┐
//!                                  │    TO    │   │    LD    │
//!                                  └──────────┘   └──────────┘
//! ```
//!
//! Reads are local to the node that serves them. A replica that missed a
//! replication keeps serving its old content until the next successful write
//! reaches it.
//!
//! ## Usage
//!
//! ### Start the nodes
//! ```bash
//! minifs-node serve --dc NY --bind 0.0.0.0:5001
//! minifs-node serve --dc TO --bind 0.0.0.0:5002
//! minifs-node serve --dc LD --bind 0.0.0.0:5003
//! ```
//!
//! ### Use the CLI
//! ```bash
//! minifs write file1.txt --content hello
//! minifs read file1.txt
//! minifs ping TO
//! minifs status
//! ```

#![allow(clippy::result_large_err)]

pub mod client;
pub mod common;
pub mod node;
pub mod transport;

// Re-export commonly used types
pub use client::{Client, ClientCache};
pub use common::{Config, Error, Result};
pub use node::{Node, NodeServer};
pub use transport::{HttpTransport, LocalCluster, Transport};

/// Current version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build info
pub const BUILD_INFO: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("CARGO_PKG_NAME"), ")");
