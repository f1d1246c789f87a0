use crate::{
    errors::ErrorKind,
    http::{
        path,
        request::RequestDescriptor,
        response::{Payload, Response},
        types::ByteView,
    },
    limits::{ConnLimits, ReqLimits, RespLimits},
    server::{buffer::ConnectionBuffer, router, static_files::DocRoot},
};
use nix::sys::sendfile::sendfile;
use std::{fs::File, io, sync::Arc};
use tokio::{
    io::{AsyncWriteExt, Interest},
    net::TcpStream,
};

// Buffer-growth refusal by the allocator; mirrors the error wire format.
const ALLOC_FAILURE: &[u8] =
    b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Per-connection driver state, created once per worker and reused across
/// connections.
pub(crate) struct HttpConnection {
    doc_root: Arc<DocRoot>,
    buffer: ConnectionBuffer,
    request: RequestDescriptor,
    head_scratch: Vec<u8>,
    conn_limits: ConnLimits,
    req_limits: ReqLimits,
}

impl HttpConnection {
    #[inline]
    pub(crate) fn new(
        doc_root: Arc<DocRoot>,
        conn_limits: ConnLimits,
        req_limits: ReqLimits,
        resp_limits: &RespLimits,
    ) -> Self {
        Self {
            doc_root,
            buffer: ConnectionBuffer::new(&req_limits),
            request: RequestDescriptor::new(&req_limits),
            head_scratch: Vec::with_capacity(resp_limits.header_buffer),
            conn_limits,
            req_limits,
        }
    }

    /// Drives one connection to completion: read, frame, parse, route,
    /// send, shift, until the peer closes or keep-alive ends.
    ///
    /// Parser and pipeline failures answer with the kind's canonical
    /// close-response; send failures abort with no further wire traffic.
    pub(crate) async fn run(&mut self, stream: &mut TcpStream) -> io::Result<()> {
        self.buffer.reset();

        loop {
            match self
                .buffer
                .fill(stream, self.conn_limits.socket_read_timeout)
                .await
            {
                Ok(0) => return Ok(()),
                Ok(_) => {}
                Err(err) if err.kind() == io::ErrorKind::TimedOut => {
                    log::debug!(
                        "connection idle past {:?}",
                        self.conn_limits.socket_read_timeout
                    );
                    return send_error(stream, ErrorKind::RequestTimeout).await;
                }
                Err(err) => return Err(err),
            }

            // Drain every request already buffered before reading again.
            loop {
                let Some(header_end) = self.buffer.find_header_end() else {
                    // A pending shift frees the consumed prefix before more
                    // capacity is needed.
                    if !self.buffer.is_full() || self.buffer.parse_offset > 0 {
                        break;
                    }
                    if self.buffer.capacity() <= self.buffer.max_capacity() {
                        let target = self.buffer.max_capacity() + 1;
                        if self.buffer.grow(target).is_err() {
                            return stream.write_all(ALLOC_FAILURE).await;
                        }
                        break;
                    }
                    // Header block still unterminated at the ceiling.
                    return send_error(stream, ErrorKind::HeaderTooLarge).await;
                };

                if let Err(kind) = self.request.parse(
                    self.buffer.filled(),
                    self.buffer.parse_offset,
                    header_end,
                    &self.req_limits,
                ) {
                    return send_error(stream, kind).await;
                }

                let header_size = header_end - self.buffer.parse_offset + 4;
                let total = header_size + self.request.content_length;

                // The final buffer byte is reserved, so a request needs
                // strictly more capacity than its size.
                if total >= self.buffer.capacity() {
                    if total + 1 > self.buffer.max_capacity() {
                        return send_error(stream, ErrorKind::PayloadTooLarge).await;
                    }
                    if self.buffer.grow(total + 1).is_err() {
                        return stream.write_all(ALLOC_FAILURE).await;
                    }
                }

                if self.buffer.read_offset < self.buffer.parse_offset + total {
                    break;
                }

                self.request.body = ByteView::new(
                    self.buffer.parse_offset + header_size,
                    self.request.content_length,
                );

                if let Err(kind) = path::resolve(&mut self.request, self.buffer.filled()) {
                    return send_error(stream, kind).await;
                }

                let response =
                    router::route(&self.request, self.buffer.filled(), &self.doc_root);

                log::debug!(
                    "{} {} {} -> {} (body {} bytes)",
                    String::from_utf8_lossy(self.request.method.slice(self.buffer.filled())),
                    String::from_utf8_lossy(&self.request.normalized_path),
                    String::from_utf8_lossy(self.request.version.slice(self.buffer.filled())),
                    response.status as u16,
                    self.request.body.len(),
                );

                let close = response.close_after_send;
                self.send_response(stream, response).await?;
                self.buffer.parse_offset += total;

                if close {
                    return Ok(());
                }
            }

            self.buffer.shift();
        }
    }

    /// Sends head then payload; responses go out strictly in request order
    /// because the driver is the connection's only flow of control.
    async fn send_response(
        &mut self,
        stream: &mut TcpStream,
        response: Response,
    ) -> io::Result<()> {
        response.write_head(&mut self.head_scratch);
        stream.write_all(&self.head_scratch).await?;

        match response.payload {
            Payload::InMemory(body) => {
                if !body.is_empty() {
                    stream.write_all(&body).await?;
                }
            }
            Payload::File { file, size } => send_file(stream, &file, size).await?,
        }

        Ok(())
    }
}

/// Answers a driver-detected failure with the kind's canonical
/// close-response; the caller closes the connection afterwards.
async fn send_error(stream: &mut TcpStream, kind: ErrorKind) -> io::Result<()> {
    log::debug!("rejecting request: {kind} ({})", kind.status_code());
    stream.write_all(kind.as_http()).await
}

/// Transmits `size` file bytes straight from the page cache to the socket,
/// retrying across readiness and interruption.
async fn send_file(stream: &TcpStream, file: &File, size: u64) -> io::Result<()> {
    let mut offset: nix::libc::off_t = 0;

    while (offset as u64) < size {
        let count = ((size - offset as u64) as usize).min(1 << 20);

        stream.writable().await?;
        match stream.try_io(Interest::WRITABLE, || {
            sendfile(stream, file, Some(&mut offset), count).map_err(io::Error::from)
        }) {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "peer stopped accepting file bytes",
                ))
            }
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::WouldBlock => continue,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{fs, net::SocketAddr, time::Duration};
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::TcpListener,
    };

    /// Serves exactly one connection with the given limits and root.
    async fn serve_one(
        dir: &tempfile::TempDir,
        conn_limits: ConnLimits,
    ) -> SocketAddr {
        let doc_root = Arc::new(DocRoot::open(dir.path()).unwrap());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut conn = HttpConnection::new(
                doc_root,
                conn_limits,
                ReqLimits::default(),
                &RespLimits::default(),
            );
            let _ = conn.run(&mut stream).await;
        });

        addr
    }

    /// Writes the whole payload, half-closes, and returns everything the
    /// server sends back.
    async fn exchange(addr: SocketAddr, payload: &[u8]) -> Vec<u8> {
        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream.write_all(payload).await.unwrap();
        stream.shutdown().await.unwrap();

        let mut out = Vec::new();
        stream.read_to_end(&mut out).await.unwrap();
        out
    }

    fn text(bytes: &[u8]) -> String {
        String::from_utf8_lossy(bytes).into_owned()
    }

    #[tokio::test]
    async fn api_hello_with_connection_close() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve_one(&dir, ConnLimits::default()).await;

        let reply = exchange(addr, b"GET /api/ HTTP/1.1\r\nConnection: close\r\n\r\n").await;
        assert_eq!(
            text(&reply),
            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nContent-Type: text/plain\r\nConnection: close\r\n\r\nHello"
        );
    }

    #[tokio::test]
    async fn api_echo_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve_one(&dir, ConnLimits::default()).await;

        let reply =
            exchange(addr, b"POST /api/echo HTTP/1.1\r\nContent-Length: 5\r\n\r\nabcde").await;
        assert_eq!(
            text(&reply),
            "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nContent-Type: text/plain\r\nConnection: keep-alive\r\n\r\nabcde"
        );
    }

    #[tokio::test]
    async fn encoded_escape_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve_one(&dir, ConnLimits::default()).await;

        let reply = exchange(addr, b"GET /%2e%2e/etc/passwd HTTP/1.1\r\n\r\n").await;
        assert_eq!(
            text(&reply),
            "HTTP/1.1 400 Bad Path For Request\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn unsupported_version() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve_one(&dir, ConnLimits::default()).await;

        let reply = exchange(addr, b"GET / HTTP/0.9\r\n\r\n").await;
        assert_eq!(
            text(&reply),
            "HTTP/1.1 505 HTTP Version Not Supported\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn unknown_method_gets_descriptive_body() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve_one(&dir, ConnLimits::default()).await;

        let reply = exchange(addr, b"DELETE /api/whatever HTTP/1.1\r\n\r\n").await;
        assert_eq!(
            text(&reply),
            "HTTP/1.1 405 Method Not Allowed\r\nContent-Length: 44\r\nContent-Type: text/plain\r\nConnection: keep-alive\r\n\r\nThis request method is currently unsupported"
        );
    }

    #[tokio::test]
    async fn pipelined_requests_answered_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve_one(&dir, ConnLimits::default()).await;

        let reply =
            exchange(addr, b"GET /api/ HTTP/1.1\r\n\r\nGET /api/ HTTP/1.1\r\n\r\n").await;

        let one = "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nContent-Type: text/plain\r\nConnection: keep-alive\r\n\r\nHello";
        assert_eq!(text(&reply), format!("{one}{one}"));
    }

    #[tokio::test]
    async fn fragmented_request_is_reassembled() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve_one(&dir, ConnLimits::default()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        for chunk in [
            &b"GET /ap"[..],
            b"i/ HTTP/1.1\r\nConnec",
            b"tion: close\r\n\r\n",
        ] {
            stream.write_all(chunk).await.unwrap();
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        assert!(text(&reply).ends_with("Hello"));
        assert!(text(&reply).starts_with("HTTP/1.1 200 OK\r\n"));
    }

    #[tokio::test]
    async fn body_arriving_after_headers() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve_one(&dir, ConnLimits::default()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        stream
            .write_all(b"POST /api/echo HTTP/1.1\r\nContent-Length: 10\r\n\r\n12345")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        stream.write_all(b"67890").await.unwrap();
        stream.shutdown().await.unwrap();

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        assert!(text(&reply).ends_with("1234567890"));
    }

    #[tokio::test]
    async fn keep_alive_serves_sequential_requests() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve_one(&dir, ConnLimits::default()).await;

        let expected = "HTTP/1.1 200 OK\r\nContent-Length: 5\r\nContent-Type: text/plain\r\nConnection: keep-alive\r\n\r\nHello";

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut reply = vec![0u8; expected.len()];

        for _ in 0..2 {
            stream.write_all(b"GET /api/ HTTP/1.1\r\n\r\n").await.unwrap();
            stream.read_exact(&mut reply).await.unwrap();
            assert_eq!(text(&reply), expected);
        }
    }

    #[tokio::test]
    async fn pipelined_tail_survives_the_shift() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve_one(&dir, ConnLimits::default()).await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        // One complete request plus the head of a second one.
        stream
            .write_all(b"GET /api/ HTTP/1.1\r\n\r\nPOST /api/echo HTTP/1.1\r\nContent-Le")
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        stream.write_all(b"ngth: 2\r\n\r\nhi").await.unwrap();
        stream.shutdown().await.unwrap();

        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();

        let replies = text(&reply);
        assert!(replies.contains("Hello"));
        assert!(replies.ends_with("hi"));
    }

    #[tokio::test]
    async fn oversized_request_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve_one(&dir, ConnLimits::default()).await;

        let reply =
            exchange(addr, b"POST /api/echo HTTP/1.1\r\nContent-Length: 99999\r\n\r\n").await;
        assert_eq!(
            text(&reply),
            "HTTP/1.1 413 Payload Too Large\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn large_request_within_ceiling_is_grown_into() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve_one(&dir, ConnLimits::default()).await;

        // Larger than the initial 4096-byte buffer, below the 16384 ceiling.
        let body = vec![b'x'; 6000];
        let mut payload =
            format!("POST /api/echo HTTP/1.1\r\nContent-Length: {}\r\n\r\n", body.len())
                .into_bytes();
        payload.extend_from_slice(&body);

        let reply = exchange(addr, &payload).await;
        let replies = text(&reply);
        assert!(replies.starts_with("HTTP/1.1 200 OK\r\nContent-Length: 6000\r\n"));
        assert!(replies.ends_with(&"x".repeat(6000)));
    }

    #[tokio::test]
    async fn unterminated_header_block_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve_one(&dir, ConnLimits::default()).await;

        // 20 KiB without a terminator: overruns even the grown buffer.
        let payload = format!("GET / HTTP/1.1\r\nA: {}", "v".repeat(20 * 1024)).into_bytes();
        let reply = exchange(addr, &payload).await;
        assert_eq!(
            text(&reply),
            "HTTP/1.1 431 Request Header Fields Too Large\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn idle_connection_times_out_with_408() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve_one(
            &dir,
            ConnLimits {
                socket_read_timeout: Duration::from_millis(50),
            },
        )
        .await;

        let mut stream = TcpStream::connect(addr).await.unwrap();
        let mut reply = Vec::new();
        stream.read_to_end(&mut reply).await.unwrap();
        assert_eq!(
            text(&reply),
            "HTTP/1.1 408 Request Timeout\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        );
    }

    #[tokio::test]
    async fn static_file_served_with_exact_length() {
        let dir = tempfile::tempdir().unwrap();
        let page = "<html><body>anchored</body></html>";
        fs::write(dir.path().join("index.html"), page).unwrap();
        let addr = serve_one(&dir, ConnLimits::default()).await;

        let reply = exchange(addr, b"GET / HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").await;
        assert_eq!(
            text(&reply),
            format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n{page}",
                page.len()
            )
        );
    }

    #[tokio::test]
    async fn large_static_file_is_fully_delivered() {
        let dir = tempfile::tempdir().unwrap();
        let blob: Vec<u8> = (0..200_000u32).map(|v| (v % 251) as u8).collect();
        fs::write(dir.path().join("blob.bin"), &blob).unwrap();
        let addr = serve_one(&dir, ConnLimits::default()).await;

        let reply = exchange(addr, b"GET /blob.bin HTTP/1.1\r\nConnection: close\r\n\r\n").await;

        let split = crate::http::types::find(&reply, b"\r\n\r\n").unwrap() + 4;
        assert!(text(&reply[..split]).starts_with("HTTP/1.1 200 OK\r\nContent-Length: 200000\r\n"));
        assert_eq!(&reply[split..], &blob[..]);
    }

    #[tokio::test]
    async fn missing_static_file_keeps_the_connection() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve_one(&dir, ConnLimits::default()).await;

        let reply = exchange(addr, b"GET /nope.css HTTP/1.1\r\n\r\n").await;
        assert_eq!(
            text(&reply),
            "HTTP/1.1 404 Not Found\r\nContent-Length: 15\r\nContent-Type: text/plain\r\nConnection: keep-alive\r\n\r\nRoute Not Found"
        );
    }

    #[tokio::test]
    async fn get_with_content_length_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let addr = serve_one(&dir, ConnLimits::default()).await;

        let reply = exchange(addr, b"GET /api/ HTTP/1.1\r\nContent-Length: 3\r\n\r\nabc").await;
        assert_eq!(
            text(&reply),
            "HTTP/1.1 400 Body not allowed\r\nContent-Length: 0\r\nConnection: close\r\n\r\n"
        );
    }
}
