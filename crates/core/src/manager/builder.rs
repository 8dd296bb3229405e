use std::sync::{Arc, Mutex};

use streamchat_model::{ConversationHistory, Transport};

use super::SessionManager;
use crate::config::SessionConfig;
use crate::transport_client::TransportClient;
use crate::watchers::{
    HistoryCell, MessagesChangedFn, StreamingChangedFn, StreamingIndicator,
};

/// [`SessionManager`] builder.
pub struct SessionManagerBuilder {
    client: TransportClient,
    config: SessionConfig,
    history: ConversationHistory,
    on_messages_changed: Option<MessagesChangedFn>,
    on_streaming_changed: Option<StreamingChangedFn>,
}

impl SessionManagerBuilder {
    /// Creates a new builder with the specified transport.
    #[inline]
    pub fn with_transport<T: Transport + 'static>(transport: T) -> Self {
        Self {
            client: TransportClient::new(transport),
            config: SessionConfig::default(),
            history: ConversationHistory::new(),
            on_messages_changed: None,
            on_streaming_changed: None,
        }
    }

    /// Sets the session configuration.
    #[inline]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Starts the conversation with a system message.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.history = ConversationHistory::with_system_prompt(prompt);
        self
    }

    /// Starts from an existing conversation.
    #[inline]
    pub fn with_history(mut self, history: ConversationHistory) -> Self {
        self.history = history;
        self
    }

    /// Attaches a callback to be invoked whenever the messages change.
    ///
    /// Calls are serialized and arrive in the order the changes were made.
    /// The callback may read from the manager, but must not send, cancel,
    /// or clear from within, as that would deadlock.
    #[inline]
    pub fn on_messages_changed(
        mut self,
        on_change: impl Fn(&ConversationHistory) + Send + Sync + 'static,
    ) -> Self {
        self.on_messages_changed = Some(Box::new(on_change));
        self
    }

    /// Attaches a callback to be invoked when streaming starts or stops.
    ///
    /// The same restrictions apply as for
    /// [`on_messages_changed`](Self::on_messages_changed).
    #[inline]
    pub fn on_streaming_changed(
        mut self,
        on_change: impl Fn(bool) + Send + Sync + 'static,
    ) -> Self {
        self.on_streaming_changed = Some(Box::new(on_change));
        self
    }

    /// Builds the manager.
    #[inline]
    pub fn build(self) -> SessionManager {
        let SessionManagerBuilder {
            client,
            config,
            history,
            on_messages_changed,
            on_streaming_changed,
        } = self;

        SessionManager {
            client,
            config: Arc::new(config),
            history: Arc::new(HistoryCell::new(history, on_messages_changed)),
            indicator: Arc::new(StreamingIndicator::new(on_streaming_changed)),
            active: Mutex::new(None),
        }
    }
}
