use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::oneshot;
use tokio_util::codec::Framed;
use tracing::{debug, trace};

use crate::codec::{DEFAULT_MAX_BODY_SIZE, HttpCodec, HttpRequest};
use crate::error::SandboxError;
use crate::stream::payload::{CONTENT_TYPE, RequestPayload};

/// Outcome of one round trip: the raw response body on success.
pub type ExchangeResult = Result<Bytes, SandboxError>;

// ── Completion channel ───────────────────────────────────────────

/// Network-side half of an exchange. Delivering the result is a single
/// channel send; no decoding happens here.
#[derive(Debug)]
pub struct CompletionSender {
    tx: oneshot::Sender<ExchangeResult>,
}

impl CompletionSender {
    /// Hand the result to the tick loop.
    pub fn complete(self, result: ExchangeResult) {
        // The receiver is gone when the scheduler discarded the exchange.
        let _ = self.tx.send(result);
    }
}

/// Tick-side half of an exchange.
#[derive(Debug)]
pub struct PendingExchange {
    rx: oneshot::Receiver<ExchangeResult>,
    ready: Option<ExchangeResult>,
    bytes_out: usize,
}

impl PendingExchange {
    /// Create a linked completion pair for sending `payload`.
    pub fn for_payload(payload: &RequestPayload) -> (CompletionSender, PendingExchange) {
        let (tx, rx) = oneshot::channel();
        (
            CompletionSender { tx },
            PendingExchange {
                rx,
                ready: None,
                bytes_out: payload.body.len(),
            },
        )
    }

    /// Request body size in bytes.
    pub fn bytes_out(&self) -> usize {
        self.bytes_out
    }

    /// Take the result if the exchange has finished. Never blocks.
    ///
    /// A sender dropped without completing yields
    /// [`SandboxError::ExchangeAbandoned`].
    pub fn try_complete(&mut self) -> Option<ExchangeResult> {
        if let Some(result) = self.ready.take() {
            return Some(result);
        }
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(SandboxError::ExchangeAbandoned)),
        }
    }

    /// Wait for the exchange to finish without consuming the result;
    /// the next [`try_complete`](Self::try_complete) returns it.
    pub async fn wait(&mut self) {
        if self.ready.is_none() {
            let result = (&mut self.rx).await.map_err(SandboxError::from);
            self.ready = Some(result.and_then(|r| r));
        }
    }
}

// ── Exchange ─────────────────────────────────────────────────────

/// A non-blocking request/response round trip with the processing
/// service.
///
/// `submit` must return immediately; the result is delivered later
/// through the returned [`PendingExchange`].
pub trait Exchange {
    fn submit(&self, payload: RequestPayload) -> PendingExchange;
}

impl<E: Exchange + ?Sized> Exchange for Arc<E> {
    fn submit(&self, payload: RequestPayload) -> PendingExchange {
        (**self).submit(payload)
    }
}

// ── HttpExchange ─────────────────────────────────────────────────

/// Where and how to reach the processing service.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Service address as `host:port`.
    pub address: String,
    /// Request path, e.g. `/sandbox`.
    pub path: String,
    /// Deadline for one full round trip.
    pub timeout: Duration,
    /// Maximum accepted response body size.
    pub max_body: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:5000".into(),
            path: "/sandbox".into(),
            timeout: Duration::from_secs(5),
            max_body: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl ExchangeConfig {
    /// Request target for `payload`: path plus dimension query.
    pub fn target(&self, payload: &RequestPayload) -> String {
        let path = self.path.trim_start_matches('/');
        format!("/{path}?{}", payload.query())
    }
}

/// HTTP/1.1 `POST` exchange, one TCP connection per round trip.
///
/// Each submit spawns a task on the supplied runtime; the caller's
/// thread never waits on the network.
#[derive(Debug, Clone)]
pub struct HttpExchange {
    config: Arc<ExchangeConfig>,
    runtime: Handle,
}

impl HttpExchange {
    pub fn new(config: ExchangeConfig, runtime: Handle) -> Self {
        Self {
            config: Arc::new(config),
            runtime,
        }
    }

    pub fn config(&self) -> &ExchangeConfig {
        &self.config
    }

    /// Perform one round trip on the current task.
    pub async fn post(config: &ExchangeConfig, payload: RequestPayload) -> ExchangeResult {
        let stream = TcpStream::connect(&config.address).await?;
        stream.set_nodelay(true)?;

        let request = HttpRequest {
            host: config.address.clone(),
            target: config.target(&payload),
            content_type: CONTENT_TYPE,
            body: payload.body,
        };
        trace!("POST {} ({} bytes)", request.target, request.body.len());

        let mut framed = Framed::new(stream, HttpCodec::with_max_body(config.max_body));
        framed.send(request).await?;

        let response = framed
            .next()
            .await
            .ok_or(SandboxError::MalformedHttp("connection closed before response"))??;

        if !response.is_success() {
            return Err(SandboxError::Status {
                status: response.status,
            });
        }
        debug!(
            "service replied {} ({} bytes)",
            response.status,
            response.body.len()
        );
        Ok(response.body)
    }
}

impl Exchange for HttpExchange {
    fn submit(&self, payload: RequestPayload) -> PendingExchange {
        let (done, pending) = PendingExchange::for_payload(&payload);
        let config = Arc::clone(&self.config);
        self.runtime.spawn(async move {
            let result = match tokio::time::timeout(config.timeout, Self::post(&config, payload)).await
            {
                Ok(result) => result,
                Err(_) => Err(SandboxError::Timeout(config.timeout)),
            };
            done.complete(result);
        });
        pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(width: u32, height: u32) -> RequestPayload {
        RequestPayload {
            width,
            height,
            body: Bytes::from(vec![0u8; (width * height * 4) as usize]),
        }
    }

    #[test]
    fn pending_reports_empty_then_result() {
        let (done, mut pending) = PendingExchange::for_payload(&payload(2, 2));
        assert_eq!(pending.bytes_out(), 16);
        assert!(pending.try_complete().is_none());
        done.complete(Ok(Bytes::from_static(b"{}")));
        let result = pending.try_complete().unwrap();
        assert_eq!(&result.unwrap()[..], b"{}");
    }

    #[test]
    fn dropped_sender_is_abandoned() {
        let (done, mut pending) = PendingExchange::for_payload(&payload(1, 1));
        drop(done);
        assert!(matches!(
            pending.try_complete(),
            Some(Err(SandboxError::ExchangeAbandoned))
        ));
    }

    #[tokio::test]
    async fn wait_keeps_result_for_try_complete() {
        let (done, mut pending) = PendingExchange::for_payload(&payload(1, 1));
        tokio::spawn(async move { done.complete(Err(SandboxError::Status { status: 502 })) });
        pending.wait().await;
        assert!(matches!(
            pending.try_complete(),
            Some(Err(SandboxError::Status { status: 502 }))
        ));
    }

    #[test]
    fn target_normalises_leading_slash() {
        let mut config = ExchangeConfig::default();
        assert_eq!(config.target(&payload(4, 3)), "/sandbox?width=4&height=3");
        config.path = "process".into();
        assert_eq!(config.target(&payload(1, 1)), "/process?width=1&height=1");
    }

    #[tokio::test]
    async fn connection_refused_is_network_error() {
        // Bind and drop to get a port nothing listens on.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let config = ExchangeConfig {
            address: addr.to_string(),
            ..ExchangeConfig::default()
        };
        let err = HttpExchange::post(&config, payload(1, 1)).await.unwrap_err();
        assert!(err.is_network(), "{err}");
    }
}
