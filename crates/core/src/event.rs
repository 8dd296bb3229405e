use serde::Deserialize;
use serde_json::Value;

const DATA_FIELD: &str = "data:";
const DONE_SENTINEL: &str = "[DONE]";

// ------------------------------
// Types received from the server
// ------------------------------

#[derive(Clone, Debug, PartialEq, Deserialize)]
struct ChatCompletionChunk {
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
struct Choice {
    #[serde(default)]
    delta: Delta,
    finish_reason: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
struct Delta {
    content: Option<String>,
}

/// What an event line means for the session.
#[derive(Debug)]
pub enum Event {
    /// The `[DONE]` sentinel.
    Done,
    /// A non-empty content delta.
    Delta(String),
    /// A well-formed chunk that carries no content (role announcements,
    /// finish reasons, usage reports, etc.)
    Empty,
    /// The endpoint reported an error in the stream.
    Upstream(String),
    /// The payload is not a chunk we understand.
    Malformed(serde_json::Error),
}

/// Parses a line of the stream.
///
/// Returns `None` for lines that are not `data` fields, which carry
/// nothing for us (comments, `event:`/`id:` fields, blank separators).
pub fn parse_line(line: &str) -> Option<Event> {
    let data = line.strip_prefix(DATA_FIELD)?;
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data == DONE_SENTINEL {
        return Some(Event::Done);
    }

    let chunk = match serde_json::from_str::<ChatCompletionChunk>(data) {
        Ok(chunk) => chunk,
        Err(err) => return Some(Event::Malformed(err)),
    };

    if let Some(error) = chunk.error {
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .map(ToOwned::to_owned)
            .unwrap_or_else(|| format!("{error}"));
        return Some(Event::Upstream(message));
    }

    let Some(choice) = chunk.choices.into_iter().next() else {
        return Some(Event::Empty);
    };
    if let Some(finish_reason) = &choice.finish_reason {
        trace!("finish reason: {finish_reason}");
    }
    match choice.delta.content {
        Some(content) if !content.is_empty() => Some(Event::Delta(content)),
        _ => Some(Event::Empty),
    }
}
