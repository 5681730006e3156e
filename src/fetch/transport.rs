//! Network transport collaborator interface
//!
//! The byte-level protocol is not this crate's concern: a transport takes
//! a request description and asynchronously produces a status plus byte
//! payload, observing an optional cancellation token. The mock transport
//! mirrors the kind of injected test client a production embedding uses,
//! including randomized latency.

use std::ops::Range;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use rand::Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cancel::CancellationToken;

/// Transport-level failures. `Aborted` is distinguished so the fetch
/// surface can map it to an `AbortError` rejection; everything else
/// becomes a `FetchError`. Never retried by this crate.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("failed to decode response: {0}")]
    Decode(String),
    #[error("request aborted")]
    Aborted,
}

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
    Head,
    Options,
}

/// A request description handed to the transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: FxHashMap<String, String>,
    #[serde(default)]
    pub body: Option<String>,
}

/// What the transport produces: a status and the full byte payload.
/// Failed requests carry no partial body.
#[derive(Debug, Clone)]
pub struct FetchResponsePayload {
    pub status: u16,
    pub body: Vec<u8>,
}

impl FetchResponsePayload {
    /// Whether the status is in the 2xx range.
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// The network collaborator. Implementations run on the host pool and
/// should observe the token where they can; cancellation is cooperative
/// and best-effort.
pub trait HttpTransport: Send + Sync + 'static {
    fn fetch(
        &self,
        request: FetchRequest,
        token: Option<CancellationToken>,
    ) -> BoxFuture<'static, Result<FetchResponsePayload, TransportError>>;
}

#[derive(Clone)]
enum MockBehavior {
    Respond { status: u16, body: Vec<u8> },
    Fail { message: String },
}

/// An injectable transport for tests and embedding demos. Responds after
/// a randomized latency drawn per request, like a real client would.
pub struct MockTransport {
    behavior: MockBehavior,
    latency_ms: Range<u64>,
    requests: AtomicUsize,
}

impl MockTransport {
    /// Respond with `200` and a JSON body.
    pub fn json(body: &str) -> Self {
        Self {
            behavior: MockBehavior::Respond {
                status: 200,
                body: body.as_bytes().to_vec(),
            },
            latency_ms: 100..500,
            requests: AtomicUsize::new(0),
        }
    }

    /// Fail every request with a connection error.
    pub fn failing(message: &str) -> Self {
        Self {
            behavior: MockBehavior::Fail {
                message: message.to_string(),
            },
            latency_ms: 100..500,
            requests: AtomicUsize::new(0),
        }
    }

    /// Override the response status.
    pub fn with_status(mut self, status: u16) -> Self {
        if let MockBehavior::Respond {
            status: ref mut s, ..
        } = self.behavior
        {
            *s = status;
        }
        self
    }

    /// Override the latency range (milliseconds).
    pub fn with_latency(mut self, latency_ms: Range<u64>) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// How many requests this transport has started.
    pub fn requests_started(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl HttpTransport for MockTransport {
    fn fetch(
        &self,
        _request: FetchRequest,
        token: Option<CancellationToken>,
    ) -> BoxFuture<'static, Result<FetchResponsePayload, TransportError>> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        let behavior = self.behavior.clone();
        let delay = if self.latency_ms.is_empty() {
            0
        } else {
            rand::thread_rng().gen_range(self.latency_ms.clone())
        };
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if token.as_ref().map_or(false, CancellationToken::is_cancelled) {
                return Err(TransportError::Aborted);
            }
            match behavior {
                MockBehavior::Respond { status, body } => {
                    Ok(FetchResponsePayload { status, body })
                }
                MockBehavior::Fail { message } => Err(TransportError::Connection(message)),
            }
        })
    }
}
