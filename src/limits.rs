//! Server configuration limits and timeouts
//!
//! Default limits are intentionally conservative to prevent:
//! - Resource exhaustion through unbounded request buffers
//! - Slowloris-style stalled connections
//! - Header flooding
//!
//! Each active connection owns one request buffer (between
//! [`ReqLimits::initial_capacity`] and [`ReqLimits::max_capacity`] bytes)
//! and one response head buffer ([`RespLimits::header_buffer`] bytes),
//! allocated once and reused across requests and connections.

use std::time::Duration;

/// Controls server-level concurrency and queueing.
///
/// The accept loop pushes every connection into a shared queue; exactly
/// [`workers`](Self::workers) pre-spawned tasks pop from it, each owning a
/// single reusable connection state. When the queue holds more than
/// [`max_pending_connections`](Self::max_pending_connections) entries, new
/// connections receive an immediate `503` and are closed.
#[derive(Debug, Clone)]
pub struct ServerLimits {
    /// Number of pre-spawned connection workers (default: `100`).
    pub workers: usize,

    /// Maximum number of TCP connections waiting in the admission queue
    /// (default: `250`).
    pub max_pending_connections: usize,

    /// How idle workers wait for the queue to refill (default: `Sleep(50µs)`).
    pub wait_strategy: WaitStrategy,
}

impl Default for ServerLimits {
    fn default() -> Self {
        Self {
            workers: 100,
            max_pending_connections: 250,
            wait_strategy: WaitStrategy::Sleep(Duration::from_micros(50)),
        }
    }
}

/// Strategy for worker tasks waiting on an empty connection queue.
#[derive(Debug, Clone)]
pub enum WaitStrategy {
    /// Spin through [`tokio::task::yield_now`]. Lowest latency, busy CPU.
    Yield,

    /// Park in [`tokio::time::sleep`] between polls.
    Sleep(Duration),
}

/// Connection-level timeouts.
#[derive(Debug, Clone)]
pub struct ConnLimits {
    /// Maximum duration to wait for bytes of a new or in-progress request
    /// (default: `10 seconds`).
    ///
    /// Expiry is answered with `408 Request Timeout` and the connection is
    /// closed.
    pub socket_read_timeout: Duration,
}

impl Default for ConnLimits {
    fn default() -> Self {
        Self {
            socket_read_timeout: Duration::from_secs(10),
        }
    }
}

/// Request parsing and buffering limits.
#[derive(Debug, Clone)]
pub struct ReqLimits {
    /// Starting capacity of the per-connection request buffer
    /// (default: `4096`).
    pub initial_capacity: usize,

    /// Hard ceiling on the request buffer; a request whose header block plus
    /// declared body cannot fit is answered with `413` (default: `16384`).
    pub max_capacity: usize,

    /// Maximum number of header fields per request (default: `100`).
    pub max_headers: usize,

    /// Maximum length of a single header line; longer lines are answered
    /// with `431` (default: `8192`).
    pub max_header_line: usize,
}

impl Default for ReqLimits {
    fn default() -> Self {
        Self {
            initial_capacity: 4096,
            max_capacity: 16384,
            max_headers: 100,
            max_header_line: 8192,
        }
    }
}

/// Response formatting limits.
#[derive(Debug, Clone)]
pub struct RespLimits {
    /// Capacity of the reusable scratch buffer the status line and headers
    /// are formatted into (default: `16384`).
    pub header_buffer: usize,
}

impl Default for RespLimits {
    fn default() -> Self {
        Self {
            header_buffer: 16384,
        }
    }
}
