mod builder;
#[cfg(test)]
mod tests;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use streamchat_model::{ChatRequest, ConversationHistory, StreamState};
use tokio::sync::{mpsc, watch};
use tracing::Instrument;

use crate::config::SessionConfig;
use crate::error::SendError;
use crate::handle::{SessionHandle, UpdateStream};
use crate::session::{SessionShared, StreamingChatSession};
use crate::transport_client::TransportClient;
use crate::watchers::{HistoryCell, StreamingIndicator};
pub use builder::SessionManagerBuilder;

/// Owns a conversation and runs at most one streaming session on it.
///
/// Sending a new message cancels the session that is still running, if
/// any. The conversation can be observed either with
/// [`subscribe`](Self::subscribe) or with the callbacks registered on the
/// [builder](SessionManagerBuilder).
pub struct SessionManager {
    client: TransportClient,
    config: Arc<SessionConfig>,
    history: Arc<HistoryCell>,
    indicator: Arc<StreamingIndicator>,
    active: Mutex<Option<Arc<SessionShared>>>,
}

impl SessionManager {
    /// Appends `text` as a user message, followed by an empty assistant
    /// message, and starts streaming the reply into the latter.
    ///
    /// Both messages are in the history by the time this returns. The
    /// request itself is issued on a background task, so this must be
    /// called within a Tokio runtime.
    pub fn send(&self, text: &str) -> Result<SessionHandle, SendError> {
        if text.trim().is_empty() {
            return Err(SendError::EmptyInput);
        }

        let mut active = lock(&self.active);
        if let Some(previous) = active.take() {
            if previous.cancel() {
                debug!("superseded session {}", previous.message_id);
            }
        }

        let (message_id, messages) = self.history.modify(|history| {
            let id = history.begin_exchange(text);
            ((id, history.to_request_messages()), true)
        });

        let shared = Arc::new(SessionShared::new(
            message_id,
            Arc::clone(&self.history),
            Arc::clone(&self.indicator),
        ));
        shared.transition(StreamState::Awaiting);

        let request = ChatRequest::streaming(self.config.model.clone(), messages);
        debug!(
            "sending {} messages to {}",
            request.messages.len(),
            request.model
        );
        let response = self.client.send_request(&request);

        let (updates_tx, updates_rx) = mpsc::unbounded_channel();
        let session = StreamingChatSession::new(
            Arc::clone(&shared),
            Arc::clone(&self.config),
            updates_tx,
        );
        let task = tokio::spawn(
            session
                .run(response)
                .instrument(debug_span!("session", %message_id)),
        );

        *active = Some(Arc::clone(&shared));
        let updates = UpdateStream::new(updates_rx, shared.state.subscribe());
        Ok(SessionHandle::new(shared, updates, task))
    }

    /// Cancels the running session. Returns `false` if there was none.
    pub fn cancel_current(&self) -> bool {
        lock(&self.active)
            .take()
            .is_some_and(|session| session.cancel())
    }

    /// Returns `true` while a reply is being awaited or streamed.
    #[inline]
    pub fn is_streaming(&self) -> bool {
        self.indicator.is_streaming()
    }

    /// Returns a snapshot of the conversation.
    #[inline]
    pub fn history(&self) -> ConversationHistory {
        self.history.snapshot()
    }

    /// Returns a receiver that observes every change of the conversation.
    #[inline]
    pub fn subscribe(&self) -> watch::Receiver<ConversationHistory> {
        self.history.subscribe()
    }

    /// Cancels the running session and removes all messages.
    pub fn clear(&self) {
        self.cancel_current();
        self.history.modify(|history| {
            let changed = !history.is_empty();
            history.clear();
            ((), changed)
        });
    }

    /// Returns the configuration sessions run with.
    #[inline]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}

impl Drop for SessionManager {
    fn drop(&mut self) {
        // The task would otherwise keep streaming into a history that
        // nobody can see anymore.
        self.cancel_current();
    }
}

#[inline]
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
