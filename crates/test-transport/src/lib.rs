//! A local scripted transport for testing purpose.

#![deny(missing_docs)]

mod preset;

use std::collections::VecDeque;
use std::error::Error as StdError;
use std::fmt::{self, Debug, Display, Formatter};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll, ready};
use std::time::Duration;

use bytes::Bytes;
use pin_project_lite::pin_project;
use streamchat_model::{
    ChatRequest, ErrorKind, ResponseBody, Transport, TransportError,
};
use tokio::time::{Sleep, sleep};

pub use preset::*;

/// The error reported by [`TestTransport`] and its bodies.
#[derive(Debug)]
pub struct Error {
    message: String,
    kind: ErrorKind,
    status: Option<u16>,
}

impl Error {
    fn new(message: impl Into<String>, kind: ErrorKind) -> Self {
        Self {
            message: message.into(),
            kind,
            status: None,
        }
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl StdError for Error {}

impl TransportError for Error {
    #[inline]
    fn kind(&self) -> ErrorKind {
        self.kind
    }

    #[inline]
    fn status(&self) -> Option<u16> {
        self.status
    }
}

pin_project! {
    /// A response body that plays the steps of a [`PresetResponse`].
    pub struct TestResponseBody {
        steps: VecDeque<BodyStep>,
        #[pin]
        delay: Option<Sleep>,
    }
}

impl ResponseBody for TestResponseBody {
    type Error = crate::Error;

    fn poll_next_chunk(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Result<Option<Bytes>, Self::Error>> {
        let mut this = self.project();
        loop {
            if let Some(delay) = this.delay.as_mut().as_pin_mut() {
                ready!(delay.poll(cx));
                this.delay.set(None);
            }

            match this.steps.pop_front() {
                None => return Poll::Ready(Ok(None)),
                Some(BodyStep::Chunk(bytes)) => {
                    return Poll::Ready(Ok(Some(Bytes::from(bytes))));
                }
                Some(BodyStep::Delay(ms)) => {
                    this.delay.set(Some(sleep(Duration::from_millis(ms))));
                }
                Some(BodyStep::Fail(message)) => {
                    this.steps.clear();
                    return Poll::Ready(Err(Error::new(
                        message,
                        ErrorKind::Network,
                    )));
                }
                Some(BodyStep::Hang) => {
                    // Nobody will wake us up. The reader has to give up on
                    // its own, by a timeout or a cancellation.
                    this.steps.push_front(BodyStep::Hang);
                    return Poll::Pending;
                }
            }
        }
    }
}

/// A local scripted transport for testing purpose.
///
/// Before sending requests, you need to queue the responses, which is how
/// the "server" should answer. Each request consumes the next queued
/// response. If there are no responses left, the request fails.
///
/// Every request is recorded and can be inspected with
/// [`requests`](Self::requests). Clones share the same script and records.
///
/// # Note
///
/// This type is not optimized for production use, there are heavy memory
/// copies involved. You should only use it for testing.
#[derive(Clone, Default)]
pub struct TestTransport {
    script: Arc<Mutex<VecDeque<PresetResponse>>>,
    requests: Arc<Mutex<Vec<ChatRequest>>>,
}

impl TestTransport {
    /// Queues a response for a future request.
    #[inline]
    pub fn push_response(&self, preset: PresetResponse) {
        self.script
            .lock()
            .expect("script lock poisoned")
            .push_back(preset);
    }

    /// Returns all requests sent so far.
    #[inline]
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .expect("request log poisoned")
            .clone()
    }
}

impl Debug for TestTransport {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestTransport").finish_non_exhaustive()
    }
}

impl Transport for TestTransport {
    type Error = crate::Error;
    type Body = TestResponseBody;

    fn send_request(
        &self,
        req: &ChatRequest,
    ) -> impl Future<Output = Result<Self::Body, Self::Error>> + Send + 'static
    {
        self.requests
            .lock()
            .expect("request log poisoned")
            .push(req.clone());
        let preset = self
            .script
            .lock()
            .expect("script lock poisoned")
            .pop_front();

        async move {
            let Some(preset) = preset else {
                return Err(Error::new(
                    "no scripted response left",
                    ErrorKind::Other,
                ));
            };

            if let Some(delay_ms) = preset.delay_ms {
                sleep(Duration::from_millis(delay_ms)).await;
            }

            match preset.failure {
                Some(PresetFailure::Network) => {
                    Err(Error::new("connection refused", ErrorKind::Network))
                }
                Some(PresetFailure::Status(status)) => Err(Error {
                    message: format!("HTTP status {status}"),
                    kind: ErrorKind::HttpStatus,
                    status: Some(status),
                }),
                Some(PresetFailure::EmptyBody) => {
                    Err(Error::new("response has no body", ErrorKind::EmptyBody))
                }
                None => Ok(TestResponseBody {
                    steps: preset.steps.into(),
                    delay: None,
                }),
            }
        }
    }
}
