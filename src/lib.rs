pub mod cli;
pub mod consensus;
pub mod error;
pub mod gesture;
pub mod prefs;
pub mod protocol;
pub mod sse;
pub mod thinking;

use std::collections::HashMap;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio_stream::StreamExt;
use tracing::{debug, warn};

use protocol::{ChatMessage, ChatRequest};
use sse::{SseDecoder, SseFrame};

/// Collaborator inference endpoint used when neither the CLI nor the
/// preferences file overrides it.
pub const DEFAULT_ENDPOINT: &str = "http://localhost:3000/api/chat";

// ---------------------------------------------------------------------------
// Stream events
// ---------------------------------------------------------------------------

/// One event in a single model's stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StreamEvent {
    Start,
    Chunk { text: String },
    /// End of stream. `final_text` is the server-reported final text when
    /// present; consumers fall back to their accumulated chunks.
    Done { final_text: Option<String> },
    Error { message: String },
}

/// A [`StreamEvent`] tagged with the model that produced it, for fan-in.
///
/// Events are ordered per model; there is no cross-model ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModelStreamEvent {
    pub model: String,
    #[serde(flatten)]
    pub event: StreamEvent,
}

/// Sampling parameters sent with every request.
#[derive(Debug, Clone)]
pub struct StreamOptions {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for StreamOptions {
    fn default() -> Self {
        StreamOptions { max_tokens: 1024, temperature: 0.7 }
    }
}

// ---------------------------------------------------------------------------
// ChatClient — streaming client for the collaborator endpoint
// ---------------------------------------------------------------------------

/// HTTP client for the collaborator inference endpoint.
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    endpoint: String,
    api_token: Option<String>,
}

impl ChatClient {
    pub fn new(endpoint: impl Into<String>, api_token: Option<String>) -> Self {
        ChatClient {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_token,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Stream one model's response, pushing events into `tx`.
    ///
    /// Failures never propagate as `Err`: an HTTP or read failure becomes a
    /// single [`StreamEvent::Error`] for this model so sibling streams keep
    /// going. A fired cancellation signal stops reads without any event.
    pub async fn stream_model(
        &self,
        model: String,
        messages: Vec<ChatMessage>,
        opts: StreamOptions,
        tx: mpsc::UnboundedSender<ModelStreamEvent>,
        mut cancel: watch::Receiver<bool>,
    ) {
        let request_id = uuid::Uuid::new_v4();
        let emit = |event: StreamEvent| {
            let _ = tx.send(ModelStreamEvent { model: model.clone(), event });
        };

        if *cancel.borrow() {
            return;
        }

        let body = ChatRequest {
            model: model.clone(),
            messages,
            max_tokens: opts.max_tokens,
            temperature: opts.temperature,
            stream: true,
        };
        let mut request = self
            .client
            .post(&self.endpoint)
            .header("Content-Type", "application/json")
            .json(&body);
        if let Some(token) = &self.api_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        debug!(%model, %request_id, "starting model stream");
        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                warn!(%model, %e, "request failed");
                emit(StreamEvent::Error { message: e.to_string() });
                return;
            }
        };
        if !response.status().is_success() {
            let status = response.status();
            warn!(%model, %status, "non-success response");
            emit(StreamEvent::Error { message: format!("HTTP {}", status) });
            return;
        }

        let mut stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        let mut accumulated = String::new();
        let mut done_emitted = false;
        let mut cancel_open = true;

        'read: loop {
            if *cancel.borrow() {
                debug!(%model, "stream cancelled");
                return;
            }
            tokio::select! {
                changed = cancel.changed(), if cancel_open => {
                    match changed {
                        Ok(()) => {
                            if *cancel.borrow() {
                                debug!(%model, "stream cancelled");
                                return;
                            }
                        }
                        // The cancel handle is gone; nobody can cancel now.
                        Err(_) => cancel_open = false,
                    }
                }
                next = stream.next() => {
                    match next {
                        Some(Ok(bytes)) => {
                            for frame in decoder.feed(&bytes) {
                                if handle_frame(frame, &emit, &mut accumulated, &mut done_emitted) {
                                    break 'read;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            if *cancel.borrow() {
                                return;
                            }
                            warn!(%model, %e, "stream read failed");
                            emit(StreamEvent::Error { message: e.to_string() });
                            return;
                        }
                        // Connection closed without a sentinel — a valid end.
                        None => break 'read,
                    }
                }
            }
        }

        for frame in decoder.finish() {
            if handle_frame(frame, &emit, &mut accumulated, &mut done_emitted) {
                break;
            }
        }
        if !done_emitted {
            emit(StreamEvent::Done {
                final_text: if accumulated.is_empty() { None } else { Some(accumulated) },
            });
        }
        debug!(%model, %request_id, "model stream finished");
    }
}

/// Fold one SSE frame into events. Returns `true` when the stream is done.
fn handle_frame(
    frame: SseFrame,
    emit: &impl Fn(StreamEvent),
    accumulated: &mut String,
    done_emitted: &mut bool,
) -> bool {
    match frame {
        SseFrame::Done => {
            if !*done_emitted {
                *done_emitted = true;
                emit(StreamEvent::Done {
                    final_text: if accumulated.is_empty() {
                        None
                    } else {
                        Some(std::mem::take(accumulated))
                    },
                });
            }
            true
        }
        SseFrame::Data(payload) => match protocol::classify_payload(&payload) {
            Some(StreamEvent::Chunk { text }) => {
                accumulated.push_str(&text);
                emit(StreamEvent::Chunk { text });
                false
            }
            Some(StreamEvent::Done { final_text }) => {
                *done_emitted = true;
                let fallback = std::mem::take(accumulated);
                emit(StreamEvent::Done {
                    final_text: final_text
                        .or(if fallback.is_empty() { None } else { Some(fallback) }),
                });
                true
            }
            Some(event @ StreamEvent::Error { .. }) => {
                emit(event);
                true
            }
            Some(event) => {
                emit(event);
                false
            }
            // Malformed payloads are dropped, not fatal.
            None => false,
        },
    }
}

// ---------------------------------------------------------------------------
// Multi-model fan-out
// ---------------------------------------------------------------------------

/// Cancels a whole fan-out. In-flight reads are abandoned without emitting
/// an error event.
#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// Spawn one streaming task per model, all feeding a single channel.
///
/// Each model's events arrive in order; across models the interleaving is
/// whatever the network produces. The receiver sees the channel close once
/// every stream has finished.
pub fn fan_out(
    client: &ChatClient,
    models: &[String],
    messages: &[ChatMessage],
    opts: &StreamOptions,
) -> (mpsc::UnboundedReceiver<ModelStreamEvent>, CancelHandle) {
    let (tx, rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = watch::channel(false);

    for model in models {
        let client = client.clone();
        let tx = tx.clone();
        let cancel = cancel_rx.clone();
        let model = model.clone();
        let messages = messages.to_vec();
        let opts = opts.clone();
        tokio::spawn(async move {
            client.stream_model(model, messages, opts, tx, cancel).await;
        });
    }

    (rx, CancelHandle { tx: cancel_tx })
}

/// Drain a fan-out channel into per-model final texts.
///
/// `Ok(text)` holds the server-reported final text (or the concatenated
/// chunks when the server sent none); `Err(message)` records that model's
/// failure. Models cancelled mid-stream simply never appear.
pub async fn collect_responses(
    mut rx: mpsc::UnboundedReceiver<ModelStreamEvent>,
) -> HashMap<String, Result<String, String>> {
    let mut partial: HashMap<String, String> = HashMap::new();
    let mut finished: HashMap<String, Result<String, String>> = HashMap::new();

    while let Some(ModelStreamEvent { model, event }) = rx.recv().await {
        match event {
            StreamEvent::Start => {}
            StreamEvent::Chunk { text } => {
                partial.entry(model).or_default().push_str(&text);
            }
            StreamEvent::Done { final_text } => {
                let fallback = partial.remove(&model).unwrap_or_default();
                finished.insert(model, Ok(final_text.unwrap_or(fallback)));
            }
            StreamEvent::Error { message } => {
                partial.remove(&model);
                finished.insert(model, Err(message));
            }
        }
    }
    finished
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn event(model: &str, event: StreamEvent) -> ModelStreamEvent {
        ModelStreamEvent { model: model.to_string(), event }
    }

    // -- event serialization --

    #[test]
    fn test_chunk_event_serializes_tagged() {
        let ev = event("a", StreamEvent::Chunk { text: "hi".to_string() });
        let json = serde_json::to_string(&ev).expect("serialize");
        assert!(json.contains("\"model\":\"a\""));
        assert!(json.contains("\"event\":\"chunk\""));
        assert!(json.contains("\"text\":\"hi\""));
    }

    #[test]
    fn test_done_event_serializes() {
        let ev = event("a", StreamEvent::Done { final_text: Some("full".to_string()) });
        let json = serde_json::to_string(&ev).expect("serialize");
        assert!(json.contains("\"event\":\"done\""));
        assert!(json.contains("\"final_text\":\"full\""));
    }

    #[test]
    fn test_stream_options_defaults() {
        let opts = StreamOptions::default();
        assert_eq!(opts.max_tokens, 1024);
        assert!((opts.temperature - 0.7).abs() < f32::EPSILON);
    }

    // -- handle_frame --

    #[test]
    fn test_handle_frame_chunk_accumulates() {
        let collected = std::cell::RefCell::new(Vec::new());
        let emit = |e: StreamEvent| collected.borrow_mut().push(e);
        let mut acc = String::new();
        let mut done = false;
        let finished = handle_frame(
            SseFrame::Data(r#"{"chunk":"ab"}"#.to_string()),
            &emit,
            &mut acc,
            &mut done,
        );
        assert!(!finished);
        assert_eq!(acc, "ab");
        assert_eq!(collected.borrow().len(), 1);
    }

    #[test]
    fn test_handle_frame_sentinel_flushes_accumulated() {
        let collected = std::cell::RefCell::new(Vec::new());
        let emit = |e: StreamEvent| collected.borrow_mut().push(e);
        let mut acc = "hello".to_string();
        let mut done = false;
        let finished = handle_frame(SseFrame::Done, &emit, &mut acc, &mut done);
        assert!(finished);
        assert!(done);
        assert_eq!(
            collected.borrow()[0],
            StreamEvent::Done { final_text: Some("hello".to_string()) }
        );
    }

    #[test]
    fn test_handle_frame_malformed_dropped() {
        let emit = |_e: StreamEvent| panic!("nothing should be emitted");
        let mut acc = String::new();
        let mut done = false;
        let finished = handle_frame(
            SseFrame::Data("{broken".to_string()),
            &emit,
            &mut acc,
            &mut done,
        );
        assert!(!finished);
    }

    // -- collect_responses --

    #[tokio::test]
    async fn test_collect_accumulates_chunks() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(event("a", StreamEvent::Chunk { text: "Hel".to_string() })).expect("send");
        tx.send(event("a", StreamEvent::Chunk { text: "lo".to_string() })).expect("send");
        tx.send(event("a", StreamEvent::Done { final_text: None })).expect("send");
        drop(tx);
        let results = collect_responses(rx).await;
        assert_eq!(results["a"], Ok("Hello".to_string()));
    }

    #[tokio::test]
    async fn test_collect_prefers_server_final_text() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(event("a", StreamEvent::Chunk { text: "partial".to_string() })).expect("send");
        tx.send(event("a", StreamEvent::Done { final_text: Some("authoritative".to_string()) }))
            .expect("send");
        drop(tx);
        let results = collect_responses(rx).await;
        assert_eq!(results["a"], Ok("authoritative".to_string()));
    }

    #[tokio::test]
    async fn test_collect_error_scoped_to_one_model() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(event("bad", StreamEvent::Error { message: "HTTP 503".to_string() }))
            .expect("send");
        tx.send(event("good", StreamEvent::Chunk { text: "fine".to_string() })).expect("send");
        tx.send(event("good", StreamEvent::Done { final_text: None })).expect("send");
        drop(tx);
        let results = collect_responses(rx).await;
        assert_eq!(results["bad"], Err("HTTP 503".to_string()));
        assert_eq!(results["good"], Ok("fine".to_string()));
    }

    #[tokio::test]
    async fn test_collect_interleaved_models() {
        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(event("a", StreamEvent::Chunk { text: "a1".to_string() })).expect("send");
        tx.send(event("b", StreamEvent::Chunk { text: "b1".to_string() })).expect("send");
        tx.send(event("a", StreamEvent::Chunk { text: "a2".to_string() })).expect("send");
        tx.send(event("b", StreamEvent::Done { final_text: None })).expect("send");
        tx.send(event("a", StreamEvent::Done { final_text: None })).expect("send");
        drop(tx);
        let results = collect_responses(rx).await;
        assert_eq!(results["a"], Ok("a1a2".to_string()));
        assert_eq!(results["b"], Ok("b1".to_string()));
    }

    #[test]
    fn test_collect_empty_channel() {
        let (tx, rx) = mpsc::unbounded_channel::<ModelStreamEvent>();
        drop(tx);
        let results = tokio_test::block_on(collect_responses(rx));
        assert!(results.is_empty());
    }

    // -- cancellation plumbing --

    #[tokio::test]
    async fn test_cancel_handle_flips_watch() {
        let (tx, rx) = watch::channel(false);
        let handle = CancelHandle { tx };
        assert!(!*rx.borrow());
        handle.cancel();
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn test_fan_out_zero_models_closes_channel() {
        let client = ChatClient::new("http://localhost:1/api/chat", None);
        let (rx, _cancel) =
            fan_out(&client, &[], &[ChatMessage::user("hi")], &StreamOptions::default());
        let results = collect_responses(rx).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_fan_out_unreachable_endpoint_reports_per_model_error() {
        // Port 1 refuses connections; each model gets its own error event.
        let client = ChatClient::new("http://127.0.0.1:1/api/chat", None);
        let models = vec!["a".to_string(), "b".to_string()];
        let (rx, _cancel) =
            fan_out(&client, &models, &[ChatMessage::user("hi")], &StreamOptions::default());
        let results = collect_responses(rx).await;
        assert_eq!(results.len(), 2);
        assert!(results["a"].is_err());
        assert!(results["b"].is_err());
    }

    // -- ChatClient construction --

    #[test]
    fn test_client_stores_endpoint() {
        let client = ChatClient::new("http://example.test/chat", Some("tok".to_string()));
        assert_eq!(client.endpoint(), "http://example.test/chat");
    }
}
