use crate::message::{Message, MessageId};
use crate::request::RequestMessage;

/// An ordered sequence of messages, oldest first.
///
/// The history also tracks which assistant placeholder is currently being
/// streamed into. That message is always the last one, and only the
/// holder of its id may change its content through
/// [`update_in_progress`](Self::update_in_progress). Everything before it
/// is treated as an immutable snapshot.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConversationHistory {
    messages: Vec<Message>,
    in_progress: Option<MessageId>,
}

impl ConversationHistory {
    /// Creates an empty history.
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a history that starts with a system message.
    #[inline]
    pub fn with_system_prompt<S: Into<String>>(prompt: S) -> Self {
        Self {
            messages: vec![Message::system(prompt)],
            in_progress: None,
        }
    }

    /// Returns all messages in chronological order.
    #[inline]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Returns the most recent message.
    #[inline]
    pub fn last(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Looks up a message by its id.
    #[inline]
    pub fn get(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    /// Returns the number of messages.
    #[inline]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if there are no messages.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Returns the id of the placeholder that is being streamed into.
    #[inline]
    pub fn in_progress(&self) -> Option<MessageId> {
        self.in_progress
    }

    /// Appends a message.
    ///
    /// A placeholder that was in progress stops being the last message, so
    /// its holder loses the right to update it.
    pub fn push(&mut self, message: Message) {
        self.in_progress = None;
        self.messages.push(message);
    }

    /// Appends a user message followed by an empty assistant placeholder,
    /// and marks the placeholder as in progress.
    ///
    /// Placeholders left empty by earlier exchanges are dropped first, so
    /// the new one is the only empty assistant message afterwards.
    pub fn begin_exchange<S: Into<String>>(&mut self, user_text: S) -> MessageId {
        self.prune_placeholders();
        self.push(Message::user(user_text));
        let placeholder = Message::assistant("");
        let id = placeholder.id;
        self.messages.push(placeholder);
        self.in_progress = Some(id);
        id
    }

    /// Replaces the content of the last message.
    ///
    /// Returns `false` if the history is empty.
    pub fn replace_last<S: Into<String>>(&mut self, content: S) -> bool {
        let Some(last) = self.messages.last_mut() else {
            return false;
        };
        last.content = content.into();
        true
    }

    /// Replaces the content of the in-progress placeholder, if `id` still
    /// holds it.
    ///
    /// Returns `false` (and changes nothing) when the placeholder has been
    /// released, which is how late updates from a cancelled session are
    /// rejected.
    pub fn update_in_progress<S: Into<String>>(
        &mut self,
        id: MessageId,
        content: S,
    ) -> bool {
        if self.in_progress != Some(id) {
            return false;
        }
        self.replace_last(content)
    }

    /// Releases the in-progress placeholder held by `id`.
    ///
    /// Returns `false` if `id` did not hold it.
    pub fn release(&mut self, id: MessageId) -> bool {
        if self.in_progress != Some(id) {
            return false;
        }
        self.in_progress = None;
        true
    }

    /// Drops every empty assistant message that is not in progress.
    pub fn prune_placeholders(&mut self) {
        let in_progress = self.in_progress;
        self.messages
            .retain(|m| !m.is_placeholder() || Some(m.id) == in_progress);
    }

    /// Removes all messages.
    pub fn clear(&mut self) {
        self.messages.clear();
        self.in_progress = None;
    }

    /// Projects the history into the messages of an outgoing request.
    ///
    /// Empty assistant placeholders are local state and never sent.
    pub fn to_request_messages(&self) -> Vec<RequestMessage> {
        self.messages
            .iter()
            .filter(|m| !m.is_placeholder())
            .map(RequestMessage::from)
            .collect()
    }
}
