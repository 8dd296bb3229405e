use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll, ready};

use futures_util::Stream;
use streamchat_model::{MessageId, StreamState};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::SessionError;
use crate::session::SessionShared;

/// The content of the in-progress message after a delta has been applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateEvent {
    /// Id of the assistant message being streamed into.
    pub message_id: MessageId,
    /// The full content accumulated so far.
    pub content: String,
}

/// Incremental updates of a session, in the order they were applied.
///
/// The stream ends when the session does. No update is ever delivered for
/// a session after it has been cancelled, including the ones that were
/// already queued.
#[derive(Debug)]
pub struct UpdateStream {
    rx: mpsc::UnboundedReceiver<UpdateEvent>,
    state_rx: watch::Receiver<StreamState>,
}

impl UpdateStream {
    #[inline]
    pub(crate) fn new(
        rx: mpsc::UnboundedReceiver<UpdateEvent>,
        state_rx: watch::Receiver<StreamState>,
    ) -> Self {
        Self { rx, state_rx }
    }

    #[inline]
    fn is_aborted(&self) -> bool {
        *self.state_rx.borrow() == StreamState::Aborted
    }

    /// Receives the next update, or `None` once the session has ended.
    pub async fn recv(&mut self) -> Option<UpdateEvent> {
        if self.is_aborted() {
            self.rx.close();
            return None;
        }
        let event = self.rx.recv().await?;
        // Cancelled while we were waiting.
        if self.is_aborted() {
            self.rx.close();
            return None;
        }
        Some(event)
    }

    /// Drains the updates that are ready and returns the latest one.
    ///
    /// Useful for renderers that only care about the current content.
    pub fn try_latest(&mut self) -> Option<UpdateEvent> {
        let mut latest = None;
        while let Ok(event) = self.rx.try_recv() {
            latest = Some(event);
        }
        if self.is_aborted() {
            return None;
        }
        latest
    }
}

impl Stream for UpdateStream {
    type Item = UpdateEvent;

    fn poll_next(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
    ) -> Poll<Option<Self::Item>> {
        if self.is_aborted() {
            self.rx.close();
            return Poll::Ready(None);
        }
        let event = ready!(self.rx.poll_recv(cx));
        if self.is_aborted() {
            self.rx.close();
            return Poll::Ready(None);
        }
        Poll::Ready(event)
    }
}

/// A cloneable handle that can only cancel a session.
#[derive(Clone)]
pub struct CancelHandle(Arc<SessionShared>);

impl CancelHandle {
    /// Cancels the session. Returns `false` if it had already ended.
    #[inline]
    pub fn cancel(&self) -> bool {
        self.0.cancel()
    }
}

/// A handle to a streaming session started by
/// [`SessionManager::send`](crate::SessionManager::send).
pub struct SessionHandle {
    shared: Arc<SessionShared>,
    state_rx: watch::Receiver<StreamState>,
    updates: UpdateStream,
    task: JoinHandle<Result<(), SessionError>>,
}

impl SessionHandle {
    #[inline]
    pub(crate) fn new(
        shared: Arc<SessionShared>,
        updates: UpdateStream,
        task: JoinHandle<Result<(), SessionError>>,
    ) -> Self {
        let state_rx = shared.state.subscribe();
        Self {
            shared,
            state_rx,
            updates,
            task,
        }
    }

    /// Returns the id of the assistant message this session streams into.
    #[inline]
    pub fn message_id(&self) -> MessageId {
        self.shared.message_id
    }

    /// Returns the current state of the session.
    #[inline]
    pub fn state(&self) -> StreamState {
        *self.state_rx.borrow()
    }

    /// Returns a receiver that observes state changes.
    #[inline]
    pub fn watch_state(&self) -> watch::Receiver<StreamState> {
        self.state_rx.clone()
    }

    /// Returns the incremental updates of this session.
    #[inline]
    pub fn updates(&mut self) -> &mut UpdateStream {
        &mut self.updates
    }

    /// Returns a handle that can cancel this session from elsewhere.
    #[inline]
    pub fn canceller(&self) -> CancelHandle {
        CancelHandle(Arc::clone(&self.shared))
    }

    /// Cancels the session. Returns `false` if it had already ended.
    #[inline]
    pub fn cancel(&self) -> bool {
        self.shared.cancel()
    }

    /// Waits for the session to end and returns its final state.
    ///
    /// A failed session yields the error that ended it. Cancellation is
    /// not an error.
    pub async fn join(self) -> Result<StreamState, SessionError> {
        let result = self.task.await.map_err(|err| {
            SessionError::internal(format!("session task failed: {err}"))
        })?;
        result?;
        Ok(*self.state_rx.borrow())
    }
}
