//! HTTP/1.1 framing for the service exchange.
//!
//! [`HttpCodec`] plugs into `tokio_util::codec::Framed`: the encoder
//! writes one `POST` request, the decoder yields one complete response.
//! Responses may be delimited by `Content-Length`, by chunked transfer
//! encoding, or by the server closing the connection.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::SandboxError;

/// Maximum size of a response status line plus headers.
pub const MAX_HEAD_SIZE: usize = 16 * 1024;

/// Default maximum response body size.
pub const DEFAULT_MAX_BODY_SIZE: usize = 64 * 1024 * 1024;

// ── HttpRequest ──────────────────────────────────────────────────

/// A single `POST` request.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// Value of the `Host` header.
    pub host: String,
    /// Request target: path plus optional `?query`.
    pub target: String,
    pub content_type: &'static str,
    pub body: Bytes,
}

// ── HttpResponse ─────────────────────────────────────────────────

/// A fully received response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

// ── HttpCodec ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BodyKind {
    Length(usize),
    Chunked,
    UntilClose,
}

#[derive(Debug)]
enum Phase {
    Head,
    Body {
        status: u16,
        headers: Vec<(String, String)>,
        kind: BodyKind,
        /// Body bytes collected so far (chunked and until-close only).
        collected: BytesMut,
    },
}

/// Client-side HTTP/1.1 codec.
#[derive(Debug)]
pub struct HttpCodec {
    phase: Phase,
    max_body: usize,
}

impl HttpCodec {
    pub fn new() -> Self {
        Self::with_max_body(DEFAULT_MAX_BODY_SIZE)
    }

    pub fn with_max_body(max_body: usize) -> Self {
        Self {
            phase: Phase::Head,
            max_body,
        }
    }

    fn check_body_size(&self, size: usize) -> Result<(), SandboxError> {
        if size > self.max_body {
            return Err(SandboxError::ResponseTooLarge {
                size,
                max: self.max_body,
            });
        }
        Ok(())
    }

    fn finish(&mut self, body: Bytes) -> Option<HttpResponse> {
        match std::mem::replace(&mut self.phase, Phase::Head) {
            Phase::Body {
                status, headers, ..
            } => Some(HttpResponse {
                status,
                headers,
                body,
            }),
            Phase::Head => None,
        }
    }
}

impl Default for HttpCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse `status line + headers` (without the terminating blank line).
fn parse_head(head: &[u8]) -> Result<(u16, Vec<(String, String)>), SandboxError> {
    let text =
        std::str::from_utf8(head).map_err(|_| SandboxError::MalformedHttp("non-utf8 header"))?;
    let mut lines = text.split("\r\n");

    let status_line = lines
        .next()
        .ok_or(SandboxError::MalformedHttp("empty response"))?;
    let mut parts = status_line.splitn(3, ' ');
    let version = parts.next().unwrap_or_default();
    if !version.starts_with("HTTP/1.") {
        return Err(SandboxError::MalformedHttp("unsupported http version"));
    }
    let status = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .filter(|s| (100..600).contains(s))
        .ok_or(SandboxError::MalformedHttp("invalid status code"))?;

    let mut headers = Vec::new();
    for line in lines.filter(|l| !l.is_empty()) {
        let (name, value) = line
            .split_once(':')
            .ok_or(SandboxError::MalformedHttp("header without colon"))?;
        headers.push((name.trim().to_string(), value.trim().to_string()));
    }
    Ok((status, headers))
}

fn body_kind(status: u16, headers: &[(String, String)]) -> Result<BodyKind, SandboxError> {
    if (100..200).contains(&status) || status == 204 || status == 304 {
        return Ok(BodyKind::Length(0));
    }
    let lookup = |name: &str| {
        headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    };
    if lookup("transfer-encoding").is_some_and(|v| v.to_ascii_lowercase().contains("chunked")) {
        return Ok(BodyKind::Chunked);
    }
    match lookup("content-length") {
        Some(v) => v
            .parse::<usize>()
            .map(BodyKind::Length)
            .map_err(|_| SandboxError::MalformedHttp("invalid content-length")),
        None => Ok(BodyKind::UntilClose),
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Drain as many complete chunks from `src` into `collected` as are
/// available. Returns `true` once the terminating chunk and trailers
/// have been consumed.
fn drain_chunks(
    src: &mut BytesMut,
    collected: &mut BytesMut,
    max_body: usize,
) -> Result<bool, SandboxError> {
    loop {
        let Some(line_end) = find(src, b"\r\n") else {
            return Ok(false);
        };
        let size_line = std::str::from_utf8(&src[..line_end])
            .map_err(|_| SandboxError::MalformedHttp("non-utf8 chunk size"))?;
        let size_hex = size_line.split(';').next().unwrap_or_default().trim();
        let size = usize::from_str_radix(size_hex, 16)
            .map_err(|_| SandboxError::MalformedHttp("invalid chunk size"))?;

        if size == 0 {
            // Last chunk: either an immediate blank line or trailers.
            let rest = &src[line_end + 2..];
            let trailer_end = if rest.starts_with(b"\r\n") {
                Some(2)
            } else {
                find(rest, b"\r\n\r\n").map(|i| i + 4)
            };
            return match trailer_end {
                Some(n) => {
                    src.advance(line_end + 2 + n);
                    Ok(true)
                }
                None => Ok(false),
            };
        }

        if size > max_body.saturating_sub(collected.len()) {
            return Err(SandboxError::ResponseTooLarge {
                size: collected.len().saturating_add(size),
                max: max_body,
            });
        }
        let total = (line_end + 4)
            .checked_add(size)
            .ok_or(SandboxError::MalformedHttp("invalid chunk size"))?;
        if src.len() < total {
            src.reserve(total - src.len());
            return Ok(false);
        }
        if &src[total - 2..total] != b"\r\n" {
            return Err(SandboxError::MalformedHttp("chunk not terminated by CRLF"));
        }
        collected.extend_from_slice(&src[line_end + 2..line_end + 2 + size]);
        src.advance(total);
    }
}

impl tokio_util::codec::Decoder for HttpCodec {
    type Item = HttpResponse;
    type Error = SandboxError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            match &mut self.phase {
                Phase::Head => {
                    let Some(end) = find(src, b"\r\n\r\n") else {
                        if src.len() > MAX_HEAD_SIZE {
                            return Err(SandboxError::ResponseTooLarge {
                                size: src.len(),
                                max: MAX_HEAD_SIZE,
                            });
                        }
                        return Ok(None);
                    };
                    let head = src.split_to(end + 4);
                    let (status, headers) = parse_head(&head[..end])?;
                    if (100..200).contains(&status) {
                        // Interim response; the real one follows.
                        continue;
                    }
                    let kind = body_kind(status, &headers)?;
                    if let BodyKind::Length(n) = kind {
                        self.check_body_size(n)?;
                    }
                    self.phase = Phase::Body {
                        status,
                        headers,
                        kind,
                        collected: BytesMut::new(),
                    };
                }
                Phase::Body {
                    kind: BodyKind::Length(n),
                    ..
                } => {
                    let n = *n;
                    if src.len() < n {
                        src.reserve(n - src.len());
                        return Ok(None);
                    }
                    let body = src.split_to(n).freeze();
                    return Ok(self.finish(body));
                }
                Phase::Body {
                    kind: BodyKind::Chunked,
                    collected,
                    ..
                } => {
                    if !drain_chunks(src, collected, self.max_body)? {
                        return Ok(None);
                    }
                    let body = std::mem::take(collected).freeze();
                    return Ok(self.finish(body));
                }
                Phase::Body {
                    kind: BodyKind::UntilClose,
                    collected,
                    ..
                } => {
                    collected.extend_from_slice(src);
                    src.clear();
                    let size = collected.len();
                    self.check_body_size(size)?;
                    return Ok(None);
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if let Some(response) = self.decode(src)? {
            return Ok(Some(response));
        }
        match &mut self.phase {
            Phase::Head if src.is_empty() => Ok(None),
            Phase::Body {
                kind: BodyKind::UntilClose,
                collected,
                ..
            } => {
                let body = std::mem::take(collected).freeze();
                Ok(self.finish(body))
            }
            _ => Err(SandboxError::MalformedHttp("connection closed mid-response")),
        }
    }
}

impl tokio_util::codec::Encoder<HttpRequest> for HttpCodec {
    type Error = SandboxError;

    fn encode(&mut self, item: HttpRequest, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let head = format!(
            "POST {} HTTP/1.1\r\n\
             Host: {}\r\n\
             User-Agent: sandbox-client/{}\r\n\
             Accept: application/json\r\n\
             Content-Type: {}\r\n\
             Content-Length: {}\r\n\
             Connection: close\r\n\r\n",
            item.target,
            item.host,
            env!("CARGO_PKG_VERSION"),
            item.content_type,
            item.body.len(),
        );
        dst.reserve(head.len() + item.body.len());
        dst.put_slice(head.as_bytes());
        dst.put_slice(&item.body);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::codec::{Decoder, Encoder};

    fn decode_all(codec: &mut HttpCodec, bytes: &[u8]) -> Option<HttpResponse> {
        let mut buf = BytesMut::from(bytes);
        codec.decode_eof(&mut buf).unwrap()
    }

    #[test]
    fn encodes_post_request() {
        let mut codec = HttpCodec::new();
        let mut dst = BytesMut::new();
        codec
            .encode(
                HttpRequest {
                    host: "127.0.0.1:5000".into(),
                    target: "/sandbox?width=2&height=1".into(),
                    content_type: "application/octet-stream",
                    body: Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8]),
                },
                &mut dst,
            )
            .unwrap();
        let text = String::from_utf8_lossy(&dst);
        assert!(text.starts_with("POST /sandbox?width=2&height=1 HTTP/1.1\r\n"));
        assert!(text.contains("Content-Length: 8\r\n"));
        assert!(text.contains("Content-Type: application/octet-stream\r\n"));
        assert!(dst.ends_with(&[1, 2, 3, 4, 5, 6, 7, 8]));
    }

    #[test]
    fn decodes_content_length_across_reads() {
        let mut codec = HttpCodec::new();
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 11\r\n\r\n{\"im"[..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        buf.extend_from_slice(b"age\":1}");
        let resp = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(&resp.body[..], b"{\"image\":1}");
        assert_eq!(resp.headers, vec![("Content-Length".to_string(), "11".to_string())]);
    }

    #[test]
    fn decodes_chunked_body() {
        let mut codec = HttpCodec::new();
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5;ext=1\r\npedia\r\n0\r\n\r\n";
        let resp = decode_all(&mut codec, raw).unwrap();
        assert_eq!(&resp.body[..], b"Wikipedia");
    }

    #[test]
    fn decodes_body_until_close() {
        let mut codec = HttpCodec::new();
        let raw = b"HTTP/1.0 200 OK\r\nContent-Type: application/json\r\n\r\n{\"image\":\"\"}";
        let resp = decode_all(&mut codec, raw).unwrap();
        assert_eq!(&resp.body[..], b"{\"image\":\"\"}");
    }

    #[test]
    fn skips_interim_continue() {
        let mut codec = HttpCodec::new();
        let raw = b"HTTP/1.1 100 Continue\r\n\r\nHTTP/1.1 500 INTERNAL SERVER ERROR\r\nContent-Length: 0\r\n\r\n";
        let resp = decode_all(&mut codec, raw).unwrap();
        assert_eq!(resp.status, 500);
        assert!(!resp.is_success());
    }

    #[test]
    fn rejects_garbage_status_line() {
        let mut codec = HttpCodec::new();
        let mut buf = BytesMut::from(&b"SSH-2.0-OpenSSH\r\n\r\n"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(SandboxError::MalformedHttp(_))
        ));
    }

    #[test]
    fn rejects_oversized_body() {
        let mut codec = HttpCodec::with_max_body(4);
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\n\r\n"[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(SandboxError::ResponseTooLarge { size: 5, max: 4 })
        ));
    }

    #[test]
    fn huge_chunk_size_is_rejected_before_buffering() {
        let mut codec = HttpCodec::new();
        let mut buf = BytesMut::from(
            &b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\nffffffffffffffff\r\nabcdefgh"[..],
        );
        assert!(matches!(
            codec.decode(&mut buf),
            Err(SandboxError::ResponseTooLarge {
                max: DEFAULT_MAX_BODY_SIZE,
                ..
            })
        ));
    }

    #[test]
    fn chunks_past_the_body_limit_are_rejected() {
        let mut codec = HttpCodec::with_max_body(6);
        let raw = b"HTTP/1.1 200 OK\r\nTransfer-Encoding: chunked\r\n\r\n4\r\nWiki\r\n5\r\npedia\r\n0\r\n\r\n";
        let mut buf = BytesMut::from(&raw[..]);
        assert!(matches!(
            codec.decode(&mut buf),
            Err(SandboxError::ResponseTooLarge { size: 9, max: 6 })
        ));
    }

    #[test]
    fn truncated_response_is_an_error() {
        let mut codec = HttpCodec::new();
        let mut buf = BytesMut::from(&b"HTTP/1.1 200 OK\r\nContent-Length: 10\r\n\r\nabc"[..]);
        assert!(matches!(
            codec.decode_eof(&mut buf),
            Err(SandboxError::MalformedHttp(_))
        ));
    }
}
