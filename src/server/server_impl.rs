use crate::{
    limits::{ConnLimits, ReqLimits, RespLimits, ServerLimits, WaitStrategy},
    server::{connection::HttpConnection, static_files::DocRoot},
};
use crossbeam::queue::SegQueue;
use std::{net::SocketAddr, sync::Arc};
use tokio::{
    io::AsyncWriteExt,
    net::{TcpListener, TcpStream},
    task::yield_now,
    time::sleep as tokio_sleep,
};

// Sent by the overload task when the admission queue is over capacity.
const OVERLOADED: &[u8] =
    b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

type TcpQueue = Arc<SegQueue<(TcpStream, SocketAddr)>>;

/// The origin server: accepts connections and hands them to a pool of
/// pre-spawned workers, each owning one reusable connection state.
///
/// # Examples
///
/// ```no_run
/// use anchor_web::{DocRoot, Server};
/// use tokio::net::TcpListener;
/// use std::path::Path;
///
/// #[tokio::main]
/// async fn main() {
///     Server::builder()
///         .listener(TcpListener::bind("127.0.0.1:8080").await.unwrap())
///         .doc_root(DocRoot::open(Path::new("public")).unwrap())
///         .build()
///         .launch()
///         .await;
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    stream_queue: TcpQueue,
    overflow_queue: TcpQueue,
    server_limits: ServerLimits,
}

impl Server {
    /// Creates a builder for configuring the server instance.
    #[inline]
    pub fn builder() -> ServerBuilder {
        ServerBuilder {
            listener: None,
            doc_root: None,

            server_limits: None,
            connection_limits: None,
            request_limits: None,
            response_limits: None,
        }
    }

    /// Accepts connections forever, queueing them for the worker pool.
    pub async fn launch(self) {
        if let Ok(addr) = self.listener.local_addr() {
            log::info!("accepting connections on {addr}");
        }

        loop {
            let value = match self.listener.accept().await {
                Ok(value) => value,
                Err(err) => {
                    log::warn!("accept failed: {err}");
                    continue;
                }
            };

            match self.stream_queue.len() < self.server_limits.max_pending_connections {
                true => self.stream_queue.push(value),
                false => self.overflow_queue.push(value),
            }
        }
    }

    async fn get_stream(queue: &TcpQueue, wait: &WaitStrategy) -> (TcpStream, SocketAddr) {
        loop {
            if let Some(value) = queue.pop() {
                return value;
            }

            match wait {
                WaitStrategy::Yield => yield_now().await,
                WaitStrategy::Sleep(time) => tokio_sleep(*time).await,
            }
        }
    }
}

/// Builder for [`Server`] instances.
pub struct ServerBuilder {
    listener: Option<TcpListener>,
    doc_root: Option<DocRoot>,

    server_limits: Option<ServerLimits>,
    connection_limits: Option<ConnLimits>,
    request_limits: Option<ReqLimits>,
    response_limits: Option<RespLimits>,
}

impl ServerBuilder {
    /// Sets the TCP listener the server accepts from.
    ///
    /// **This is a required component.**
    #[inline(always)]
    pub fn listener(mut self, listener: TcpListener) -> Self {
        self.listener = Some(listener);
        self
    }

    /// Sets the document root static files are served from.
    ///
    /// **This is a required component.** The directory handle is opened
    /// before the first connection and shared by every worker until
    /// shutdown.
    #[inline(always)]
    pub fn doc_root(mut self, doc_root: DocRoot) -> Self {
        self.doc_root = Some(doc_root);
        self
    }

    /// Configures worker-pool and admission-queue limits.
    #[inline(always)]
    pub fn server_limits(mut self, limits: ServerLimits) -> Self {
        self.server_limits = Some(limits);
        self
    }

    /// Configures connection timeouts.
    #[inline(always)]
    pub fn connection_limits(mut self, limits: ConnLimits) -> Self {
        self.connection_limits = Some(limits);
        self
    }

    /// Configures request parsing and buffering limits.
    #[inline(always)]
    pub fn request_limits(mut self, limits: ReqLimits) -> Self {
        self.request_limits = Some(limits);
        self
    }

    /// Configures response formatting limits.
    #[inline(always)]
    pub fn response_limits(mut self, limits: RespLimits) -> Self {
        self.response_limits = Some(limits);
        self
    }

    /// Finalizes the builder, spawning the worker pool.
    ///
    /// # Panics
    ///
    /// Panics when [`listener`](Self::listener) or
    /// [`doc_root`](Self::doc_root) was not called.
    #[track_caller]
    pub fn build(self) -> Server {
        let listener = self
            .listener
            .expect("The `listener` method must be called to create");
        let doc_root = Arc::new(
            self.doc_root
                .expect("The `doc_root` method must be called to create"),
        );

        let server_limits = self.server_limits.unwrap_or_default();
        let conn_limits = self.connection_limits.unwrap_or_default();
        let req_limits = self.request_limits.unwrap_or_default();
        let resp_limits = self.response_limits.unwrap_or_default();

        let stream_queue: TcpQueue = Arc::new(SegQueue::new());
        let overflow_queue: TcpQueue = Arc::new(SegQueue::new());

        for _ in 0..server_limits.workers {
            Self::spawn_worker(
                &stream_queue,
                &doc_root,
                &server_limits.wait_strategy,
                &conn_limits,
                &req_limits,
                &resp_limits,
            );
        }
        Self::spawn_overload_task(&overflow_queue, &server_limits.wait_strategy);

        Server {
            listener,
            stream_queue,
            overflow_queue,
            server_limits,
        }
    }

    fn spawn_worker(
        queue: &TcpQueue,
        doc_root: &Arc<DocRoot>,
        wait: &WaitStrategy,
        conn_limits: &ConnLimits,
        req_limits: &ReqLimits,
        resp_limits: &RespLimits,
    ) {
        let queue = queue.clone();
        let wait = wait.clone();
        let mut conn = HttpConnection::new(
            doc_root.clone(),
            conn_limits.clone(),
            req_limits.clone(),
            resp_limits,
        );

        tokio::spawn(async move {
            loop {
                let (mut stream, addr) = Server::get_stream(&queue, &wait).await;
                log::debug!("connection accepted from {addr}");

                if let Err(err) = conn.run(&mut stream).await {
                    log::debug!("connection from {addr} aborted: {err}");
                }
            }
        });
    }

    fn spawn_overload_task(queue: &TcpQueue, wait: &WaitStrategy) {
        let queue = queue.clone();
        let wait = wait.clone();

        tokio::spawn(async move {
            loop {
                let (mut stream, addr) = Server::get_stream(&queue, &wait).await;
                log::warn!("admission queue full, shedding connection from {addr}");

                let _ = stream.write_all(OVERLOADED).await;
            }
        });
    }
}
