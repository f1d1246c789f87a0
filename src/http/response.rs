//! Response values and wire formatting.

use crate::http::types::{self, StatusCode};
use std::fs::File;

/// One response, either a buffered body or an open file.
///
/// The payload is owned until the send pipeline consumes it; file handles
/// and body buffers are released by scope exit on every path, including
/// send failure.
#[derive(Debug)]
pub(crate) struct Response {
    pub(crate) status: StatusCode,
    pub(crate) content_type: &'static str,
    pub(crate) close_after_send: bool,
    pub(crate) payload: Payload,
}

#[derive(Debug)]
pub(crate) enum Payload {
    InMemory(Vec<u8>),
    File { file: File, size: u64 },
}

impl Response {
    #[inline]
    pub(crate) fn in_memory(
        status: StatusCode,
        content_type: &'static str,
        body: Vec<u8>,
    ) -> Self {
        Self {
            status,
            content_type,
            close_after_send: false,
            payload: Payload::InMemory(body),
        }
    }

    #[inline]
    pub(crate) fn empty(status: StatusCode) -> Self {
        Self::in_memory(status, "text/plain", Vec::new())
    }

    #[inline]
    pub(crate) fn file(file: File, size: u64, content_type: &'static str) -> Self {
        Self {
            status: StatusCode::Ok,
            content_type,
            close_after_send: false,
            payload: Payload::File { file, size },
        }
    }

    #[inline]
    pub(crate) fn content_length(&self) -> u64 {
        match &self.payload {
            Payload::InMemory(body) => body.len() as u64,
            Payload::File { size, .. } => *size,
        }
    }

    /// Formats the status line and headers into `buf`, exactly:
    ///
    /// ```text
    /// HTTP/1.1 <code> <text>\r\n
    /// Content-Length: <n>\r\n
    /// Content-Type: <type>\r\n
    /// Connection: <close|keep-alive>\r\n
    /// \r\n
    /// ```
    pub(crate) fn write_head(&self, buf: &mut Vec<u8>) {
        buf.clear();

        buf.extend_from_slice(self.status.first_line());

        buf.extend_from_slice(b"Content-Length: ");
        types::write_decimal(buf, self.content_length());
        buf.extend_from_slice(b"\r\n");

        buf.extend_from_slice(b"Content-Type: ");
        buf.extend_from_slice(self.content_type.as_bytes());
        buf.extend_from_slice(b"\r\n");

        buf.extend_from_slice(b"Connection: ");
        buf.extend_from_slice(match self.close_after_send {
            true => b"close" as &[u8],
            false => b"keep-alive",
        });
        buf.extend_from_slice(b"\r\n\r\n");
    }
}
