use serde::{Deserialize, Serialize};

use crate::message::{Message, Role};

/// A request to be sent to the text-generation endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The conversation so far, reduced to roles and contents.
    pub messages: Vec<RequestMessage>,
    /// The model identifier.
    pub model: String,
    /// Whether the response should be streamed as server-sent events.
    pub stream: bool,
}

impl ChatRequest {
    /// Creates a streaming request.
    #[inline]
    pub fn streaming<S: Into<String>>(
        model: S,
        messages: Vec<RequestMessage>,
    ) -> Self {
        Self {
            messages,
            model: model.into(),
            stream: true,
        }
    }
}

/// A message as it appears in the request payload.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestMessage {
    /// The author of the message.
    pub role: Role,
    /// The text body.
    pub content: String,
}

impl From<&Message> for RequestMessage {
    #[inline]
    fn from(msg: &Message) -> Self {
        Self {
            role: msg.role,
            content: msg.content.clone(),
        }
    }
}
