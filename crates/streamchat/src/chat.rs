use std::env;
use std::error::Error as StdError;
use std::fmt::{self, Display};
use std::ops::Deref;
use std::time::Duration;

use streamchat_core::{SessionConfigBuilder, SessionManager, SessionManagerBuilder};
use streamchat_model::{ConversationHistory, Transport};
use streamchat_openai_transport::{
    Error as OpenAIError, OpenAIConfig, OpenAIConfigBuilder, OpenAITransport,
};

const API_KEY_VAR: &str = "OPENAI_API_KEY";
const BASE_URL_VAR: &str = "OPENAI_BASE_URL";
const MODEL_VAR: &str = "OPENAI_MODEL";

/// The error returned when a chat cannot be configured.
#[derive(Debug)]
pub enum ConfigError {
    /// An environment variable is set, but not to valid unicode.
    InvalidVar(&'static str),
    /// The HTTP client could not be created.
    Transport(OpenAIError),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidVar(name) => {
                write!(f, "environment variable {name} is not valid unicode")
            }
            ConfigError::Transport(err) => {
                write!(f, "failed to create the transport: {err}")
            }
        }
    }
}

impl StdError for ConfigError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            ConfigError::InvalidVar(_) => None,
            ConfigError::Transport(err) => Some(err),
        }
    }
}

/// A chat builder.
///
/// See [`Chat`].
pub struct ChatBuilder {
    manager_builder: SessionManagerBuilder,
    config_builder: SessionConfigBuilder,
}

impl ChatBuilder {
    /// Creates a chat builder with a specified transport.
    #[inline]
    pub fn with_transport<T: Transport + 'static>(transport: T) -> Self {
        Self {
            manager_builder: SessionManagerBuilder::with_transport(transport),
            config_builder: SessionConfigBuilder::new(),
        }
    }

    /// Creates a chat builder that talks to an OpenAI-compatible endpoint.
    pub fn with_openai(config: OpenAIConfig) -> Result<Self, ConfigError> {
        let transport =
            OpenAITransport::new(config).map_err(ConfigError::Transport)?;
        Ok(Self::with_transport(transport))
    }

    /// Creates a chat builder configured from `OPENAI_API_KEY`,
    /// `OPENAI_BASE_URL` and `OPENAI_MODEL`. Unset variables fall back to
    /// the defaults, and a missing key means no authorization.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut openai_config = match read_var(API_KEY_VAR)? {
            Some(api_key) => OpenAIConfigBuilder::with_api_key(api_key),
            None => OpenAIConfigBuilder::without_api_key(),
        };
        if let Some(base_url) = read_var(BASE_URL_VAR)? {
            openai_config = openai_config.with_base_url(base_url);
        }
        let mut builder = Self::with_openai(openai_config.build())?;
        if let Some(model) = read_var(MODEL_VAR)? {
            builder = builder.with_model(model);
        }
        Ok(builder)
    }

    /// Sets the model to request replies from.
    #[inline]
    pub fn with_model<S: Into<String>>(mut self, model: S) -> Self {
        self.config_builder = self.config_builder.with_model(model);
        self
    }

    /// Sets the text shown when a reply fails before any content arrived.
    #[inline]
    pub fn with_fallback_message<S: Into<String>>(mut self, message: S) -> Self {
        self.config_builder = self.config_builder.with_fallback_message(message);
        self
    }

    /// Sets how long a reply may stall before it is failed.
    #[inline]
    pub fn with_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.config_builder = self.config_builder.with_idle_timeout(timeout);
        self
    }

    /// Sets the system prompt of the conversation.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(mut self, prompt: S) -> Self {
        self.manager_builder = self.manager_builder.with_system_prompt(prompt);
        self
    }

    /// Attaches a callback to be invoked whenever the messages change.
    #[inline]
    pub fn on_messages_changed(
        mut self,
        on_change: impl Fn(&ConversationHistory) + Send + Sync + 'static,
    ) -> Self {
        self.manager_builder = self.manager_builder.on_messages_changed(on_change);
        self
    }

    /// Attaches a callback to be invoked when streaming starts or stops.
    #[inline]
    pub fn on_streaming_changed(
        mut self,
        on_change: impl Fn(bool) + Send + Sync + 'static,
    ) -> Self {
        self.manager_builder =
            self.manager_builder.on_streaming_changed(on_change);
        self
    }

    /// Builds a new chat.
    pub fn build(self) -> Chat {
        let manager = self
            .manager_builder
            .with_config(self.config_builder.build())
            .build();
        debug!("chat created with model {}", manager.config().model());
        Chat { manager }
    }
}

/// A chat, like a window that displays messages and has an input box.
///
/// It's basically a [`SessionManager`] with a configured transport, and
/// derefs to it.
pub struct Chat {
    manager: SessionManager,
}

impl Chat {
    /// Serializes the messages to a JSON array of `{id, role, content}`
    /// objects.
    pub fn messages_json(&self) -> String {
        messages_json(&self.manager.history())
    }
}

impl Deref for Chat {
    type Target = SessionManager;

    #[inline]
    fn deref(&self) -> &Self::Target {
        &self.manager
    }
}

pub(crate) fn messages_json(history: &ConversationHistory) -> String {
    // Plain values with derived impls, this cannot fail.
    serde_json::to_string(history.messages()).unwrap_or_default()
}

fn read_var(name: &'static str) -> Result<Option<String>, ConfigError> {
    match env::var(name) {
        Ok(value) if value.is_empty() => Ok(None),
        Ok(value) => Ok(Some(value)),
        Err(env::VarError::NotPresent) => Ok(None),
        Err(env::VarError::NotUnicode(_)) => Err(ConfigError::InvalidVar(name)),
    }
}

#[cfg(test)]
mod tests {
    use streamchat_model::StreamState;
    use streamchat_test_transport::{
        DONE_EVENT, PresetResponse, TestTransport, delta_event,
    };

    use super::*;

    #[tokio::test]
    async fn test_chat() {
        let transport = TestTransport::default();
        transport.push_response(PresetResponse::with_chunks([
            delta_event("Hello!"),
            DONE_EVENT.to_owned(),
        ]));
        let chat = ChatBuilder::with_transport(transport.clone())
            .with_model("test-model")
            .with_system_prompt("Be brief.")
            .build();

        let handle = chat.send("Hi").unwrap();
        assert_eq!(handle.join().await.unwrap(), StreamState::Done);
        assert_eq!(transport.requests()[0].model, "test-model");

        let messages: serde_json::Value =
            serde_json::from_str(&chat.messages_json()).unwrap();
        let messages = messages.as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0]["role"], "system");
        assert_eq!(messages[2]["role"], "assistant");
        assert_eq!(messages[2]["content"], "Hello!");
        assert!(messages[2]["id"].is_u64());
    }
}
