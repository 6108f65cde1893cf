use serde::{Deserialize, Serialize};

use crate::StreamEvent;

// -- Request types ----------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        ChatMessage { role: "system".to_string(), content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        ChatMessage { role: "user".to_string(), content: content.into() }
    }
}

/// Body POSTed to the collaborator inference endpoint.
#[derive(Debug, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
    pub stream: bool,
}

// -- SSE payload types ------------------------------------------------------

/// One decoded `data:` JSON payload.
///
/// The serving collaborator tags payloads with an `event` discriminant
/// (some deployments use `type`) and puts the text under `chunk` or
/// `content` depending on the event. Unknown fields are ignored.
#[derive(Debug, Deserialize)]
pub struct StreamPayload {
    #[serde(default, alias = "type")]
    pub event: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub chunk: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub report: Option<String>,
}

impl StreamPayload {
    /// Fold the payload into a typed event. Payloads that carry neither a
    /// recognized discriminant nor any text are dropped (`None`).
    pub fn into_event(self) -> Option<StreamEvent> {
        if let Some(message) = self.error {
            return Some(StreamEvent::Error { message });
        }
        match self.event.as_deref() {
            Some("start") => Some(StreamEvent::Start),
            Some("done") | Some("end") => Some(StreamEvent::Done {
                final_text: self.report.or(self.content),
            }),
            Some("error") => Some(StreamEvent::Error {
                message: "unspecified stream error".to_string(),
            }),
            _ => {
                let text = self.chunk.or(self.content)?;
                Some(StreamEvent::Chunk { text })
            }
        }
    }
}

/// Parse one raw `data:` payload into a typed event.
///
/// Malformed JSON is dropped, not fatal — the stream continues.
pub fn classify_payload(raw: &str) -> Option<StreamEvent> {
    match serde_json::from_str::<StreamPayload>(raw) {
        Ok(payload) => payload.into_event(),
        Err(err) => {
            tracing::debug!(%err, "dropping malformed SSE payload");
            None
        }
    }
}
