//! Async TCP server using Tokio.
//!
//! Accepts TCP connections (optionally wrapped in TLS) and serves HTTP/1.1
//! requests through a shared [`Dispatcher`]. Each connection runs on its own
//! task; dispatch itself runs on the blocking pool so handlers and template
//! reads may use ordinary synchronous I/O.
//!
//! A connection is kept open until the client asks to close it, an HTTP/1.0
//! request arrives without `Connection: keep-alive`, or a response either
//! carries `Connection: close` or has an empty body sent without
//! `Content-Length`. In the last case closing the connection is what ends the
//! body for the client.

pub mod tls;

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::context::RequestContext;
use crate::dispatch::Dispatcher;
use crate::http::body::{BodyError, read_body};
use crate::http::{Method, Request, Response, StatusCode};
pub use tls::TlsError;

/// Errors that prevent the server from starting or keep it from accepting.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Tls(#[from] TlsError),
}

/// Upper bound on the request line plus headers.
const MAX_HEAD_SIZE: usize = 64 * 1024;

/// Initial capacity of the per-request head buffer.
const INITIAL_BUF_SIZE: usize = 4096;

/// A bound listener and the dispatcher that serves it.
///
/// # Examples
///
/// ```rust,no_run
/// use pathserve::config::Defaults;
/// use pathserve::dispatch::Dispatcher;
/// use pathserve::router::RouteTable;
/// use pathserve::server::Server;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let dispatcher = Dispatcher::new(RouteTable::with_default_paths(), Defaults::new());
///     let server = Server::bind("127.0.0.1:8080", dispatcher).await?;
///     server.run().await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    tls: Option<TlsAcceptor>,
    dispatcher: Arc<Dispatcher>,
}

impl Server {
    /// Binds a plaintext listener on `addr`.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address is unavailable.
    pub async fn bind(addr: impl AsRef<str>, dispatcher: Dispatcher) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            tls: None,
            dispatcher: Arc::new(dispatcher),
        })
    }

    /// Binds according to `config`, loading the TLS certificate and key when
    /// both are given.
    pub async fn from_config(config: &ServerConfig, dispatcher: Dispatcher) -> Result<Self, ServerError> {
        let tls = config.tls.as_ref().map(tls::load_acceptor).transpose()?;
        let server = Self::bind(config.address(), dispatcher).await?;
        Ok(match tls {
            Some(acceptor) => server.with_tls(acceptor),
            None => server,
        })
    }

    /// Serves every connection over TLS.
    #[must_use]
    pub fn with_tls(mut self, acceptor: TlsAcceptor) -> Self {
        self.tls = Some(acceptor);
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_tls(&self) -> bool {
        self.tls.is_some()
    }

    /// Accepts connections forever, one task each.
    pub async fn run(self) -> Result<(), ServerError> {
        let scheme = if self.tls.is_some() { "https" } else { "http" };
        info!(address = %self.local_addr, scheme, "pathserve listening");

        loop {
            let (stream, peer_addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            debug!(peer = %peer_addr, "connection accepted");
            let dispatcher = Arc::clone(&self.dispatcher);
            let acceptor = self.tls.clone();

            tokio::spawn(async move {
                let result = match acceptor {
                    Some(acceptor) => match acceptor.accept(stream).await {
                        Ok(tls_stream) => serve_connection(tls_stream, peer_addr, true, dispatcher).await,
                        Err(e) => {
                            warn!(peer = %peer_addr, error = %e, "TLS handshake failed");
                            return;
                        }
                    },
                    None => serve_connection(stream, peer_addr, false, dispatcher).await,
                };
                if let Err(e) = result {
                    warn!(peer = %peer_addr, error = %e, "connection closed with error");
                }
            });
        }
    }
}

/// Outcome of reading one request head.
enum Head {
    Complete(BytesMut),
    Closed,
    TooLarge,
}

/// Serves requests from one connection until it should be closed.
async fn serve_connection<S>(
    stream: S,
    peer_addr: SocketAddr,
    tls: bool,
    dispatcher: Arc<Dispatcher>,
) -> Result<(), std::io::Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut writer) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    loop {
        let head = match read_head(&mut reader).await? {
            Head::Complete(head) => head,
            Head::Closed => {
                debug!(peer = %peer_addr, "connection closed by peer");
                break;
            }
            Head::TooLarge => {
                warn!(peer = %peer_addr, "request head too large, sending 400");
                send_bad_request(&mut writer, &dispatcher).await?;
                break;
            }
        };

        let (mut request, _) = match Request::parse(&head) {
            Ok(pair) => pair,
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "bad request, sending 400");
                send_bad_request(&mut writer, &dispatcher).await?;
                break;
            }
        };

        for (name, value) in request.headers().iter() {
            debug!(peer = %peer_addr, header = name, value, "request header");
        }

        let body = match read_body(&mut reader, request.method(), request.headers()).await {
            Ok(body) => body,
            Err(BodyError::Io(e)) => return Err(e),
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "unreadable body, sending 400");
                send_bad_request(&mut writer, &dispatcher).await?;
                break;
            }
        };
        request.set_body(body);

        let keep_alive = request.is_keep_alive();
        let method = request.method().clone();
        let uri = request.target().to_owned();
        let ctx = RequestContext::new(request, peer_addr, tls);

        let worker = Arc::clone(&dispatcher);
        let response = match tokio::task::spawn_blocking(move || worker.dispatch(&ctx)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                error!(peer = %peer_addr, %method, uri, error = %e, "request failed, closing connection");
                break;
            }
            Err(e) => {
                error!(peer = %peer_addr, %method, uri, error = %e, "handler panicked, closing connection");
                break;
            }
        };

        for (name, value) in response.headers() {
            debug!(peer = %peer_addr, header = name.as_str(), value = value.as_str(), "response header");
        }

        let status = response.status();
        let close = !keep_alive || response.closes_connection() || response.delimited_by_close(&method);
        let bytes = response.serialize(&method, dispatcher.banner());
        writer.write_all(&bytes).await?;
        writer.flush().await?;

        info!(peer = %peer_addr, %method, uri, status, "request served");

        if close {
            debug!(peer = %peer_addr, "closing connection");
            break;
        }
    }

    writer.shutdown().await
}

/// Reads the request line and headers, up to and including the blank line.
///
/// Blank lines before the request line are skipped.
async fn read_head<R>(reader: &mut R) -> Result<Head, std::io::Error>
where
    R: AsyncBufRead + Unpin,
{
    let mut head = BytesMut::with_capacity(INITIAL_BUF_SIZE);
    let mut line = Vec::new();

    loop {
        line.clear();
        let limit = (MAX_HEAD_SIZE + 1 - head.len()) as u64;
        let n = (&mut *reader).take(limit).read_until(b'\n', &mut line).await?;
        if n == 0 {
            // EOF, possibly mid-head.
            return Ok(Head::Closed);
        }

        let blank = line == b"\r\n" || line == b"\n";
        if blank && head.is_empty() {
            continue;
        }

        head.extend_from_slice(&line);
        if head.len() > MAX_HEAD_SIZE {
            return Ok(Head::TooLarge);
        }
        if blank {
            return Ok(Head::Complete(head));
        }
    }
}

async fn send_bad_request<W>(writer: &mut W, dispatcher: &Dispatcher) -> Result<(), std::io::Error>
where
    W: AsyncWrite + Unpin,
{
    let mut response = Response::from_defaults(StatusCode::BadRequest, dispatcher.defaults());
    response.set_header("Connection", "close");
    let bytes = response.serialize(&Method::Get, dispatcher.banner());
    writer.write_all(&bytes).await?;
    writer.flush().await
}
