//! Event stream frame decoder
//!
//! Turns an arbitrarily chunked response body into discrete [`DecodedEvent`]s.
//! Frames are separated by a blank line. Everything after the last complete
//! separator is kept in the pending buffer and only parsed once its own
//! separator arrives, so the emitted sequence does not depend on where the
//! transport happened to cut the body.
//!
//! The buffer holds raw bytes. A frame is decoded as UTF-8 only after it is
//! complete, which keeps multi-byte characters intact when a chunk boundary
//! falls inside one.

use crate::domain::events::{DecodedEvent, DEFAULT_EVENT_NAME};

const EVENT_FIELD: &str = "event:";
const DATA_FIELD: &str = "data:";

/// Incremental decoder for one response body
#[derive(Debug, Default)]
pub struct FrameDecoder {
    pending: Vec<u8>,
    /// Bytes of `pending` already known to contain no boundary
    scanned: usize,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every frame it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<DecodedEvent> {
        self.pending.extend_from_slice(chunk);

        let mut events = Vec::new();
        let mut consumed = 0;
        let mut search_from = self.scanned;

        while let Some((frame_end, next_start)) = find_boundary(&self.pending, search_from) {
            if let Some(event) = parse_frame(&self.pending[consumed..frame_end]) {
                events.push(event);
            }
            consumed = next_start;
            search_from = next_start;
        }

        if consumed > 0 {
            self.pending.drain(..consumed);
        }
        // A boundary may straddle the next chunk; rescan the last two bytes.
        self.scanned = self.pending.len().saturating_sub(2);
        events
    }

    pub fn push_str(&mut self, chunk: &str) -> Vec<DecodedEvent> {
        self.push(chunk.as_bytes())
    }

    /// Flush whatever is left at end of stream by closing it with a synthetic
    /// boundary. The decoder is empty afterwards.
    pub fn finish(&mut self) -> Vec<DecodedEvent> {
        if self.pending.is_empty() {
            return Vec::new();
        }
        let events = self.push(b"\n\n");
        // Only separator bytes can remain here.
        self.pending.clear();
        self.scanned = 0;
        events
    }

    /// Size of the retained incomplete fragment
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Locate the next blank line at or after `from`.
///
/// Returns the end of the frame content and the start of the next frame.
/// Accepts `\n\n`, `\r\n\r\n` and the mixed forms.
fn find_boundary(buf: &[u8], from: usize) -> Option<(usize, usize)> {
    let mut i = from;
    while i < buf.len() {
        if buf[i] == b'\n' {
            match buf.get(i + 1) {
                Some(b'\n') => return Some((i, i + 2)),
                Some(b'\r') if buf.get(i + 2) == Some(&b'\n') => return Some((i, i + 3)),
                _ => {}
            }
        }
        i += 1;
    }
    None
}

/// Parse one complete frame. Frames without a `data:` line yield nothing.
fn parse_frame(raw: &[u8]) -> Option<DecodedEvent> {
    let text = String::from_utf8_lossy(raw);
    let mut event_name: Option<String> = None;
    let mut payload: Option<String> = None;

    for line in text.split('\n') {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.starts_with(':') {
            continue;
        }
        if let Some(value) = line.strip_prefix(EVENT_FIELD) {
            event_name = Some(field_value(value).to_string());
        } else if let Some(value) = line.strip_prefix(DATA_FIELD) {
            // Only the first data line of a frame counts.
            if payload.is_none() {
                payload = Some(field_value(value).to_string());
            }
        }
    }

    let payload = payload?;
    let event_name = event_name
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| DEFAULT_EVENT_NAME.to_string());
    Some(DecodedEvent { event_name, payload })
}

fn field_value(value: &str) -> &str {
    value.strip_prefix(' ').unwrap_or(value)
}
