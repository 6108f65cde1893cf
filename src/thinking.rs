//! Incremental splitter of streamed model text into reasoning ("thinking")
//! and answer text.
//!
//! Three dialects, mutually exclusive per stream:
//!
//! 1. Explicit tag pairs — `<think>…</think>` / `<thinking>…</thinking>`,
//!    any number of regions per stream.
//! 2. Harmony channel markers — `<|channel|>NAME<|message|>` selects the
//!    sink; the `final` channel is answer text, every other channel is
//!    thinking, and all `<|…|>` control markers are stripped.
//! 3. Implicit thinking — a closing tag with no prior opening tag means the
//!    stream has been "in thinking" since the start, up to that first close.
//!    Already-emitted answer text is reclassified via
//!    [`ParsedChunk::demote_answer`].
//!
//! A tag split across chunk boundaries is handled by withholding any buffer
//! tail that could still become a tag; the withheld text is re-prefixed onto
//! the next chunk. Feeding a text in any split therefore accumulates the
//! same output as feeding it whole (see the property tests).

const OPEN_TAGS: [&str; 2] = ["<think>", "<thinking>"];
const CLOSE_TAGS: [&str; 2] = ["</think>", "</thinking>"];

const HARMONY_CHANNEL: &str = "<|channel|>";
const HARMONY_MARKERS: [&str; 6] = [
    "<|channel|>",
    "<|message|>",
    "<|end|>",
    "<|start|>",
    "<|return|>",
    "<|constrain|>",
];

/// Output of one [`ThinkingParser::parse_chunk`] call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedChunk {
    pub answer: String,
    pub thinking: String,
    /// When set, all answer text accumulated from earlier chunks belongs to
    /// thinking (implicit-thinking dialect detected). Applies once per
    /// stream; [`ThinkingAccumulator`] honors it.
    pub demote_answer: bool,
}

impl ParsedChunk {
    fn is_empty(&self) -> bool {
        self.answer.is_empty() && self.thinking.is_empty() && !self.demote_answer
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
enum HarmonyMode {
    /// Emitting content to the current channel's sink.
    #[default]
    Text,
    /// Accumulating the channel name between `<|channel|>` and `<|message|>`.
    ChannelName,
    /// Discarding the role token after `<|start|>`.
    Role,
}

#[derive(Debug, Clone, Default)]
struct HarmonyState {
    mode: HarmonyMode,
    channel: Option<String>,
    name_buf: String,
}

/// Incremental parser state for one model stream.
///
/// Owned exclusively by that stream's consumer; chunks must arrive in order
/// (a precondition, not detected). Drop it when the stream ends, after
/// calling [`ThinkingParser::finish`] to flush withheld text.
#[derive(Debug, Clone, Default)]
pub struct ThinkingParser {
    carry: String,
    in_think: bool,
    saw_open_tag: bool,
    implicit_seen: bool,
    harmony_active: bool,
    harmony: HarmonyState,
}

impl ThinkingParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Split one incoming chunk into answer and thinking text.
    pub fn parse_chunk(&mut self, chunk: &str) -> ParsedChunk {
        let mut buf = std::mem::take(&mut self.carry);
        buf.push_str(chunk);

        let mut out = ParsedChunk::default();

        // Harmony activation: a complete channel marker, seen before any
        // explicit tag, commits the stream to the Harmony dialect. Text
        // before the marker contains no tags (the guard below) and is
        // answer text — exactly what incremental feeding already emitted.
        if !self.harmony_active && self.dialect_undecided() {
            if let Some(hi) = buf.find(HARMONY_CHANNEL) {
                let first_tag = OPEN_TAGS
                    .iter()
                    .chain(CLOSE_TAGS.iter())
                    .filter_map(|t| buf.find(t))
                    .min();
                if first_tag.map_or(true, |ti| hi < ti) {
                    self.harmony_active = true;
                    out.answer.push_str(&buf[..hi]);
                    self.parse_harmony(&buf[hi..], &mut out);
                    return out;
                }
            }
        }

        if self.harmony_active {
            self.parse_harmony(&buf, &mut out);
        } else {
            self.parse_tagged(&buf, &mut out);
        }
        out
    }

    /// Flush the withheld carry-over. The stream may legitimately end inside
    /// a thinking region or mid-tag; whatever is held goes to the currently
    /// active sink verbatim.
    pub fn finish(&mut self) -> ParsedChunk {
        let rest = std::mem::take(&mut self.carry);
        let mut out = ParsedChunk::default();
        if rest.is_empty() {
            return out;
        }
        if self.harmony_active {
            match self.harmony.mode {
                HarmonyMode::Text => self.harmony_sink(&mut out).push_str(&rest),
                // Header text (channel name / role token) is control data.
                HarmonyMode::ChannelName | HarmonyMode::Role => {}
            }
        } else if self.in_think {
            out.thinking.push_str(&rest);
        } else {
            out.answer.push_str(&rest);
        }
        out
    }

    fn dialect_undecided(&self) -> bool {
        !self.saw_open_tag && !self.implicit_seen && !self.in_think
    }

    // -- explicit / implicit tag dialects -----------------------------------

    fn parse_tagged(&mut self, buf: &str, out: &mut ParsedChunk) {
        let mut rest = buf;
        loop {
            if self.in_think {
                match find_first(rest, &CLOSE_TAGS) {
                    Some((i, tag)) => {
                        out.thinking.push_str(&rest[..i]);
                        rest = &rest[i + tag.len()..];
                        self.in_think = false;
                    }
                    None => {
                        let hold = withhold_point(rest, &CLOSE_TAGS);
                        out.thinking.push_str(&rest[..hold]);
                        self.carry = rest[hold..].to_string();
                        return;
                    }
                }
            } else {
                let open = find_first(rest, &OPEN_TAGS);
                let close = find_first(rest, &CLOSE_TAGS);
                match (open, close) {
                    (Some((oi, otag)), close) if close.map_or(true, |(ci, _)| oi < ci) => {
                        out.answer.push_str(&rest[..oi]);
                        rest = &rest[oi + otag.len()..];
                        self.in_think = true;
                        self.saw_open_tag = true;
                    }
                    // Open tag with no close tag in the buffer. The guarded arm
                    // above already handles this at runtime (its guard is true
                    // when `close` is `None`); this arm only exists so the match
                    // is statically exhaustive despite that guard.
                    (Some((oi, otag)), None) => {
                        out.answer.push_str(&rest[..oi]);
                        rest = &rest[oi + otag.len()..];
                        self.in_think = true;
                        self.saw_open_tag = true;
                    }
                    (_, Some((ci, ctag))) => {
                        if !self.saw_open_tag && !self.implicit_seen {
                            // Implicit dialect: the whole stream so far was
                            // thinking, up to this first close.
                            out.demote_answer = true;
                            self.implicit_seen = true;
                            let mut demoted = std::mem::take(&mut out.answer);
                            demoted.push_str(&rest[..ci]);
                            out.thinking.push_str(&demoted);
                        } else {
                            // Stray close after the region already ended:
                            // strip the tag, keep the surrounding text.
                            out.answer.push_str(&rest[..ci]);
                        }
                        rest = &rest[ci + ctag.len()..];
                    }
                    (None, None) => {
                        let hold = if self.dialect_undecided() {
                            withhold_point_multi(
                                rest,
                                &[&OPEN_TAGS, &CLOSE_TAGS, &[HARMONY_CHANNEL]],
                            )
                        } else {
                            withhold_point_multi(rest, &[&OPEN_TAGS, &CLOSE_TAGS])
                        };
                        out.answer.push_str(&rest[..hold]);
                        self.carry = rest[hold..].to_string();
                        return;
                    }
                }
            }
        }
    }

    // -- Harmony dialect -----------------------------------------------------

    fn parse_harmony(&mut self, buf: &str, out: &mut ParsedChunk) {
        let mut rest = buf;
        loop {
            match rest.find("<|") {
                None => {
                    let hold = withhold_point(rest, &HARMONY_MARKERS);
                    self.harmony_consume(&rest[..hold], out);
                    self.carry = rest[hold..].to_string();
                    return;
                }
                Some(i) => {
                    self.harmony_consume(&rest[..i], out);
                    rest = &rest[i..];
                    match match_marker(rest) {
                        MarkerMatch::Complete(name, len) => {
                            self.handle_marker(name);
                            rest = &rest[len..];
                        }
                        MarkerMatch::Partial => {
                            self.carry = rest.to_string();
                            return;
                        }
                        MarkerMatch::NotAMarker => {
                            // Literal "<|" that is not a control marker.
                            self.harmony_consume("<|", out);
                            rest = &rest[2..];
                        }
                    }
                }
            }
        }
    }

    /// Route plain text according to the current Harmony mode.
    fn harmony_consume(&mut self, text: &str, out: &mut ParsedChunk) {
        if text.is_empty() {
            return;
        }
        match self.harmony.mode {
            HarmonyMode::Text => self.harmony_sink(out).push_str(text),
            HarmonyMode::ChannelName => self.harmony.name_buf.push_str(text),
            HarmonyMode::Role => {}
        }
    }

    fn harmony_sink<'a>(&self, out: &'a mut ParsedChunk) -> &'a mut String {
        if self.harmony.channel.as_deref() == Some("final") {
            &mut out.answer
        } else {
            &mut out.thinking
        }
    }

    fn handle_marker(&mut self, name: &str) {
        match self.harmony.mode {
            HarmonyMode::ChannelName => match name {
                "message" => {
                    let raw = std::mem::take(&mut self.harmony.name_buf);
                    let channel = raw
                        .split_whitespace()
                        .next()
                        .unwrap_or("")
                        .to_lowercase();
                    self.harmony.channel = Some(channel);
                    self.harmony.mode = HarmonyMode::Text;
                }
                "channel" => self.harmony.name_buf.clear(),
                // Header adornments like <|constrain|> sit between the
                // channel name tokens; strip and keep accumulating.
                _ => {}
            },
            HarmonyMode::Text | HarmonyMode::Role => match name {
                "channel" => {
                    self.harmony.mode = HarmonyMode::ChannelName;
                    self.harmony.name_buf.clear();
                }
                "start" => self.harmony.mode = HarmonyMode::Role,
                _ => self.harmony.mode = HarmonyMode::Text,
            },
        }
    }
}

// -- accumulator ------------------------------------------------------------

/// Folds [`ParsedChunk`]s into the final answer/thinking pair, applying
/// implicit-dialect demotion. One per model stream.
#[derive(Debug, Default)]
pub struct ThinkingAccumulator {
    parser: ThinkingParser,
    answer: String,
    thinking: String,
}

impl ThinkingAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse one chunk and fold its output. Returns the chunk-level result
    /// so callers can render incrementally.
    pub fn push(&mut self, chunk: &str) -> ParsedChunk {
        let parsed = self.parser.parse_chunk(chunk);
        self.apply(&parsed);
        parsed
    }

    /// Flush withheld text at end of stream.
    pub fn finish(&mut self) -> ParsedChunk {
        let parsed = self.parser.finish();
        self.apply(&parsed);
        parsed
    }

    fn apply(&mut self, parsed: &ParsedChunk) {
        if parsed.is_empty() {
            return;
        }
        if parsed.demote_answer {
            let prior = std::mem::take(&mut self.answer);
            self.thinking.push_str(&prior);
        }
        self.thinking.push_str(&parsed.thinking);
        self.answer.push_str(&parsed.answer);
    }

    pub fn answer(&self) -> &str {
        &self.answer
    }

    pub fn thinking(&self) -> &str {
        &self.thinking
    }

    pub fn into_parts(self) -> (String, String) {
        (self.answer, self.thinking)
    }
}

// -- helpers ----------------------------------------------------------------

/// Earliest occurrence of any of `tags` in `text`.
fn find_first<'t>(text: &str, tags: &[&'t str]) -> Option<(usize, &'t str)> {
    let mut best: Option<(usize, &'t str)> = None;
    for tag in tags {
        if let Some(i) = text.find(tag) {
            if best.map_or(true, |(bi, _)| i < bi) {
                best = Some((i, tag));
            }
        }
    }
    best
}

/// Index from which the tail of `text` must be withheld: the start of the
/// longest suffix that is a proper prefix of one of `tags`. Returns
/// `text.len()` when nothing needs to be held.
fn withhold_point(text: &str, tags: &[&str]) -> usize {
    withhold_point_multi(text, &[tags])
}

fn withhold_point_multi(text: &str, tag_sets: &[&[&str]]) -> usize {
    let max_hold = tag_sets
        .iter()
        .flat_map(|set| set.iter())
        .map(|t| t.len().saturating_sub(1))
        .max()
        .unwrap_or(0);
    let start = text.len().saturating_sub(max_hold);
    let bytes = text.as_bytes();
    for i in start..text.len() {
        if bytes[i] != b'<' || !text.is_char_boundary(i) {
            continue;
        }
        let suffix = &text[i..];
        let held = tag_sets
            .iter()
            .flat_map(|set| set.iter())
            .any(|t| t.len() > suffix.len() && t.as_bytes().starts_with(suffix.as_bytes()));
        if held {
            return i;
        }
    }
    text.len()
}

enum MarkerMatch {
    /// A complete marker: its name (without delimiters) and byte length.
    Complete(&'static str, usize),
    /// The text is a prefix of a marker — wait for more bytes.
    Partial,
    NotAMarker,
}

fn match_marker(s: &str) -> MarkerMatch {
    for marker in &HARMONY_MARKERS {
        if s.starts_with(marker) {
            let name = &marker[2..marker.len() - 2];
            return MarkerMatch::Complete(marker_name(name), marker.len());
        }
    }
    if HARMONY_MARKERS
        .iter()
        .any(|m| m.len() > s.len() && m.starts_with(s))
    {
        return MarkerMatch::Partial;
    }
    MarkerMatch::NotAMarker
}

fn marker_name(name: &str) -> &'static str {
    match name {
        "channel" => "channel",
        "message" => "message",
        "end" => "end",
        "start" => "start",
        "return" => "return",
        _ => "constrain",
    }
}

// -- tests ------------------------------------------------------------------
