//! Incremental decoder for the chat event stream.
//!
//! The transport hands over the response body in fragments cut at arbitrary
//! byte positions: inside a field name, inside a multi-byte UTF-8 character,
//! or between the two newlines of a separator. The decoder keeps every byte
//! after the last complete frame and prefixes it to the next fragment, so the
//! frames it yields do not depend on how the body was split.
//!
//! Wire format:
//!
//! ```text
//! event: chunk
//! data: {"text":"Hel"}
//!
//! ```
//!
//! A frame ends at a blank line. `event:` sets the event type, `data:` lines
//! form the payload (joined with `\n` when repeated). One space after the
//! colon is stripped. Every other line is ignored.

use std::fmt;

/// A decoded protocol unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Value of the `event:` field.
    pub event_type: String,
    /// Raw payload text from the `data:` field(s).
    pub data: String,
}

impl Frame {
    /// Create a frame.
    #[must_use]
    pub fn new(event_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            data: data.into(),
        }
    }

    /// Serialize the frame in wire format, separator included.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = format!("event: {}\n", self.event_type);
        for line in self.data.split('\n') {
            out.push_str("data: ");
            out.push_str(line);
            out.push('\n');
        }
        out.push('\n');
        out
    }
}

/// Why a frame was dropped instead of dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DropReason {
    /// The frame had a payload but no `event:` field.
    MissingEventType,
    /// The frame had an event type but no payload text.
    MissingData,
    /// The frame bytes were not valid UTF-8.
    InvalidUtf8,
    /// The payload was not valid JSON for its event type.
    InvalidPayload,
    /// The stream ended in the middle of a frame.
    TruncatedTail,
}

impl DropReason {
    /// Short label for logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::MissingEventType => "missing_event_type",
            Self::MissingData => "missing_data",
            Self::InvalidUtf8 => "invalid_utf8",
            Self::InvalidPayload => "invalid_payload",
            Self::TruncatedTail => "truncated_tail",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A frame the decoder or dispatcher discarded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameDrop {
    /// Why it was discarded.
    pub reason: DropReason,
    /// The event type, when one was present.
    pub event_type: Option<String>,
}

impl FrameDrop {
    /// Create a drop record.
    #[must_use]
    pub const fn new(reason: DropReason, event_type: Option<String>) -> Self {
        Self { reason, event_type }
    }
}

/// Stateful frame decoder. One instance per stream.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    /// Position up to which `buffer` is known to hold no separator.
    scanned: usize,
}

impl FrameDecoder {
    /// Create an empty decoder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return the frames it completes.
    ///
    /// The iterator is lazy: frames are split off the buffer only as it is
    /// advanced. Frames left unread stay buffered and come out of the next
    /// call.
    pub fn push(&mut self, fragment: &[u8]) -> Frames<'_> {
        self.buffer.extend_from_slice(fragment);
        Frames { decoder: self }
    }

    /// Number of buffered bytes not yet part of a complete frame.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Consume the decoder at end of stream.
    ///
    /// Returns a drop record if the stream stopped inside a frame. Trailing
    /// whitespace alone is not reported.
    #[must_use]
    pub fn finish(self) -> Option<FrameDrop> {
        if self.buffer.iter().all(u8::is_ascii_whitespace) {
            return None;
        }
        let event_type = String::from_utf8_lossy(&self.buffer)
            .lines()
            .find_map(|line| field_value(line, "event").map(str::to_string));
        Some(FrameDrop::new(DropReason::TruncatedTail, event_type))
    }

    fn next_block(&mut self) -> Option<Vec<u8>> {
        let Some((end, separator_len)) = find_separator(&self.buffer, self.scanned) else {
            // The last two bytes may be the start of a separator.
            self.scanned = self.buffer.len().saturating_sub(2);
            return None;
        };
        let block: Vec<u8> = self.buffer.drain(..end + separator_len).take(end).collect();
        self.scanned = 0;
        Some(block)
    }
}

/// Lazy iterator over the frames completed by one [`FrameDecoder::push`].
///
/// Yields `Err` for frames that were dropped, so callers can count them.
/// Blocks with neither an `event:` nor a `data:` line (comments, keep-alives,
/// stray blank lines) are skipped without a record.
#[derive(Debug)]
pub struct Frames<'a> {
    decoder: &'a mut FrameDecoder,
}

impl Iterator for Frames<'_> {
    type Item = Result<Frame, FrameDrop>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let block = self.decoder.next_block()?;
            if let Some(parsed) = parse_block(&block) {
                return Some(parsed);
            }
        }
    }
}

/// Find the first blank line at or after `from`.
///
/// Returns the offset where the frame text ends and the separator length
/// (`\n\n` or `\n\r\n`).
fn find_separator(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let start = from.min(buf.len());
    buf[start..]
        .iter()
        .enumerate()
        .filter(|(_, b)| **b == b'\n')
        .find_map(|(i, _)| {
            let at = start + i;
            match (buf.get(at + 1), buf.get(at + 2)) {
                (Some(b'\n'), _) => Some((at, 2)),
                (Some(b'\r'), Some(b'\n')) => Some((at, 3)),
                _ => None,
            }
        })
}

fn field_value<'a>(line: &'a str, name: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(name)?.strip_prefix(':')?;
    Some(rest.strip_prefix(' ').unwrap_or(rest))
}

fn parse_block(block: &[u8]) -> Option<Result<Frame, FrameDrop>> {
    let Ok(text) = std::str::from_utf8(block) else {
        return Some(Err(FrameDrop::new(DropReason::InvalidUtf8, None)));
    };

    let mut event_type: Option<&str> = None;
    let mut data_lines: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if let Some(value) = field_value(line, "event") {
            event_type = Some(value);
        } else if let Some(value) = field_value(line, "data") {
            data_lines.push(value);
        }
    }

    if event_type.is_none() && data_lines.is_empty() {
        return None;
    }

    let event_type = event_type.filter(|t| !t.is_empty());
    let data = data_lines.join("\n");

    Some(match (event_type, data.is_empty()) {
        (None, _) => Err(FrameDrop::new(DropReason::MissingEventType, None)),
        (Some(t), true) => Err(FrameDrop::new(
            DropReason::MissingData,
            Some(t.to_string()),
        )),
        (Some(t), false) => Ok(Frame::new(t, data)),
    })
}
