//! Incremental Server-Sent-Events line decoder.
//!
//! Feeds on raw response bytes as they arrive and yields complete `data:`
//! payloads. Handles the two boundary problems a naive splitter gets wrong:
//! a multi-byte UTF-8 character split across two reads, and a line split
//! across two reads. Non-`data:` lines (comments, `event:` fields, blank
//! separators) are ignored. The literal payload `[DONE]` terminates the
//! stream; everything after it is dropped.

/// One decoded frame from the SSE stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    /// A non-empty `data:` payload (raw, not yet JSON-parsed).
    Data(String),
    /// The `data: [DONE]` sentinel was seen.
    Done,
}

/// Incremental decoder for a single SSE stream.
///
/// Call [`SseDecoder::feed`] with each network read in order. Bytes that do
/// not yet form a complete UTF-8 character are held until the next read;
/// text that does not yet form a complete line is held likewise.
#[derive(Debug, Default)]
pub struct SseDecoder {
    /// Raw bytes not yet decodable as UTF-8 (at most one partial sequence).
    pending: Vec<u8>,
    /// Decoded text not yet terminated by a newline.
    line: String,
    finished: bool,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` once the `[DONE]` sentinel has been seen.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Feed one network read and return every frame it completes.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        if self.finished {
            return Vec::new();
        }
        self.pending.extend_from_slice(chunk);
        self.decode_pending();

        let mut frames = Vec::new();
        while let Some(pos) = self.line.find('\n') {
            let raw: String = self.line.drain(..=pos).collect();
            match Self::classify_line(raw.trim()) {
                Some(SseFrame::Done) => {
                    self.finished = true;
                    frames.push(SseFrame::Done);
                    return frames;
                }
                Some(frame) => frames.push(frame),
                None => {}
            }
        }
        frames
    }

    /// Move every complete UTF-8 character from `pending` into `line`.
    /// An incomplete trailing sequence stays in `pending`; invalid bytes
    /// are replaced with U+FFFD so one bad byte cannot stall the stream.
    fn decode_pending(&mut self) {
        loop {
            match std::str::from_utf8(&self.pending) {
                Ok(text) => {
                    self.line.push_str(text);
                    self.pending.clear();
                    return;
                }
                Err(err) => {
                    let valid = err.valid_up_to();
                    if let Ok(prefix) = std::str::from_utf8(&self.pending[..valid]) {
                        self.line.push_str(prefix);
                    }
                    match err.error_len() {
                        // Incomplete sequence at the end — wait for more bytes.
                        None => {
                            self.pending.drain(..valid);
                            return;
                        }
                        Some(bad) => {
                            self.line.push('\u{FFFD}');
                            self.pending.drain(..valid + bad);
                        }
                    }
                }
            }
        }
    }

    /// Flush at end of stream: a final `data:` line without a trailing
    /// newline still counts when the connection closes.
    pub fn finish(&mut self) -> Vec<SseFrame> {
        if self.finished {
            return Vec::new();
        }
        self.decode_pending();
        let last: String = std::mem::take(&mut self.line);
        match Self::classify_line(last.trim()) {
            Some(SseFrame::Done) => {
                self.finished = true;
                vec![SseFrame::Done]
            }
            Some(frame) => vec![frame],
            None => Vec::new(),
        }
    }

    fn classify_line(line: &str) -> Option<SseFrame> {
        let payload = line.strip_prefix("data: ").or_else(|| line.strip_prefix("data:"))?;
        let payload = payload.trim();
        if payload.is_empty() {
            return None;
        }
        if payload == "[DONE]" {
            return Some(SseFrame::Done);
        }
        Some(SseFrame::Data(payload.to_string()))
    }
}
