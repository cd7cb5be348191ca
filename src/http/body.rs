//! Request body acquisition.
//!
//! Reads the body that follows a parsed request head off a buffered
//! connection, honouring `Content-Length`, `Transfer-Encoding: chunked` and
//! gzip `Content-Encoding`.

use std::io::Read;

use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tracing::debug;

use super::{Headers, Method};

/// Content codings the transport recognizes. Only gzip is decoded.
pub const COMPRESSION_SCHEMES: [&str; 5] = ["gzip", "x-gzip", "compress", "deflate", "br"];

/// Errors produced while reading a request body.
#[derive(Debug, Error)]
pub enum BodyError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid chunk size line: {line:?}")]
    InvalidChunkSize { line: String },

    #[error("connection closed before the terminating chunk")]
    UnexpectedEof,

    #[error("failed to gunzip request body: {0}")]
    Decompress(#[source] std::io::Error),
}

/// How the body is framed on the wire, derived from the request headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BodyFraming {
    /// Numeric `Content-Length`, if one was sent.
    pub content_length: Option<usize>,
    /// `Transfer-Encoding` mentions `chunked`.
    pub chunked: bool,
    /// The `Content-Encoding` value, when it names a recognized scheme.
    pub compression: Option<String>,
}

impl BodyFraming {
    /// Inspects the request headers.
    pub fn from_headers(headers: &Headers) -> Self {
        let content_length = headers
            .get("content-length")
            .and_then(|v| v.trim().parse().ok());
        let chunked = headers
            .get("transfer-encoding")
            .is_some_and(|v| v.contains("chunked"));
        let compression = headers
            .get("content-encoding")
            .filter(|v| COMPRESSION_SCHEMES.iter().any(|cs| v.contains(cs)))
            .map(str::to_owned);
        Self {
            content_length,
            chunked,
            compression,
        }
    }

    /// Only POST/PUT or a request with a numeric `Content-Length` carries a body.
    pub fn expects_body(&self, method: &Method) -> bool {
        matches!(method, Method::Post | Method::Put) || self.content_length.is_some()
    }
}

/// Reads and decodes the request body from `reader`.
///
/// With a positive `Content-Length`, up to that many bytes are read; if the
/// peer closes early the bytes received so far are returned without error.
/// Otherwise a chunked body is reassembled. A gzip `Content-Encoding` is then
/// decompressed; other recognized codings are left as-is.
///
/// # Errors
///
/// - [`BodyError::Io`]: the underlying stream failed.
/// - [`BodyError::InvalidChunkSize`] / [`BodyError::UnexpectedEof`]: malformed chunked framing.
/// - [`BodyError::Decompress`]: the gzip payload is corrupt.
pub async fn read_body<R>(
    reader: &mut R,
    method: &Method,
    headers: &Headers,
) -> Result<Bytes, BodyError>
where
    R: AsyncBufRead + Unpin,
{
    let framing = BodyFraming::from_headers(headers);
    if !framing.expects_body(method) {
        return Ok(Bytes::new());
    }

    let mut payload = Vec::new();
    match framing.content_length {
        Some(len) if len > 0 => {
            (&mut *reader).take(len as u64).read_to_end(&mut payload).await?;
        }
        _ if framing.chunked => read_chunked(reader, &mut payload).await?,
        _ => {}
    }

    if let Some(scheme) = &framing.compression {
        if scheme.contains("gzip") {
            if !payload.is_empty() {
                payload = gunzip(&payload)?;
            }
        } else {
            debug!(encoding = %scheme, "content encoding recognized but not decoded");
        }
    }

    Ok(Bytes::from(payload))
}

// Hex size line, that many bytes, then the two-byte chunk tail; until a zero-size chunk.
async fn read_chunked<R>(reader: &mut R, out: &mut Vec<u8>) -> Result<(), BodyError>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = String::new();
    loop {
        line.clear();
        if reader.read_line(&mut line).await? == 0 {
            return Err(BodyError::UnexpectedEof);
        }
        let size_field = line.split(';').next().unwrap_or("").trim();
        let size = u64::from_str_radix(size_field, 16).map_err(|_| BodyError::InvalidChunkSize {
            line: line.trim_end().to_owned(),
        })?;

        (&mut *reader).take(size).read_to_end(out).await?;
        let mut tail = Vec::with_capacity(2);
        (&mut *reader).take(2).read_to_end(&mut tail).await?;

        if size == 0 {
            return Ok(());
        }
    }
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>, BodyError> {
    let mut decoder = MultiGzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder
        .read_to_end(&mut decompressed)
        .map_err(BodyError::Decompress)?;
    Ok(decompressed)
}
