//! anchor_web - single-host HTTP/1.x origin server with an anchored document root
//!
//! A small origin server built around three pieces:
//!
//! - **Incremental zero-copy parsing** - requests are decoded out of a
//!   growable per-connection buffer into offset/length views, with no
//!   per-request allocation on the hot path.
//! - **A URL-safety pipeline** - targets are percent-decoded, canonicalized
//!   with a segment stack, and split into API and static-file routes; the
//!   final filesystem open is anchored on the document-root descriptor and
//!   cannot escape it.
//! - **A pipelining-aware connection driver** - fragmented reads, HTTP/1.1
//!   keep-alive and pipelining, receive timeouts, and two response
//!   families: buffered bodies and zero-copy file sends.
//!
//! # Quick Start
//!
//! ```no_run
//! use anchor_web::{DocRoot, Server};
//! use tokio::net::TcpListener;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() {
//!     Server::builder()
//!         .listener(TcpListener::bind("0.0.0.0:8080").await.unwrap())
//!         .doc_root(DocRoot::open(Path::new("public")).unwrap())
//!         .build()
//!         .launch()
//!         .await;
//! }
//! ```
//!
//! # Routes
//!
//! | Route | Behavior |
//! |---|---|
//! | `GET /api/` | `Hello` |
//! | `POST /api/echo` | echoes the request body |
//! | `GET /<path>` | serves `<path>` from the document root |
//!
//! Everything else answers with the protocol-mandated status codes; see
//! [`limits`] for the configurable buffering and timeout knobs.
pub(crate) mod http {
    pub(crate) mod path;
    pub(crate) mod request;
    pub(crate) mod response;
    pub(crate) mod types;
}
pub(crate) mod server {
    pub(crate) mod buffer;
    pub(crate) mod connection;
    pub(crate) mod router;
    pub(crate) mod server_impl;
    pub(crate) mod static_files;
}
pub(crate) mod errors;
pub mod limits;

pub use crate::{
    http::types::StatusCode,
    server::{
        server_impl::{Server, ServerBuilder},
        static_files::DocRoot,
    },
};
