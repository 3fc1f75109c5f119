//! Incremental decoder for Server-Sent Events.
//!
//! Implements the `text/event-stream` parsing rules of the HTML Living
//! Standard: lines end in CRLF, LF or CR; lines starting with `:` are
//! comments; `data` lines accumulate until a blank line dispatches the
//! message. Bytes may arrive split at any point, including in the middle of
//! a line ending or a multi-byte character.
//!
//! # Example
//!
//! ```rust
//! use playerbar::protocol::sse::Decoder;
//!
//! let mut decoder = Decoder::default();
//! let messages = decoder.decode(b"event: update\ndata: {\"running\":true}\n\n");
//! assert_eq!(messages[0].event, "update");
//! ```

use std::mem;

/// A dispatched Server-Sent Event.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Message {
    /// Event name, `message` when the server did not name it.
    pub event: String,

    /// Payload with `data` lines joined by LF.
    pub data: String,
}

#[derive(Debug, Default)]
pub struct Decoder {
    /// Bytes of the line being received.
    line: Vec<u8>,

    /// A CR ended the previous chunk; skip a LF that may follow.
    pending_cr: bool,

    /// The byte order mark may only appear at the very start.
    started: bool,

    /// Current line exceeded the size limit and is being skipped.
    discarding_line: bool,

    event: String,
    data: String,
    oversized: bool,
}

impl Decoder {
    /// Default event name.
    pub const DEFAULT_EVENT: &'static str = "message";

    /// Maximum size of a single message payload.
    ///
    /// Snapshots are a few hundred bytes; anything much larger is either a
    /// misbehaving backend or not our backend at all.
    pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

    const BOM: &'static [u8] = b"\xEF\xBB\xBF";

    /// Feeds a chunk of the stream and returns the messages it completed.
    pub fn decode(&mut self, chunk: &[u8]) -> Vec<Message> {
        let mut messages = Vec::new();
        let mut chunk = chunk;

        if !self.started {
            // Wait until enough bytes are in to tell whether a BOM leads.
            self.line.extend_from_slice(chunk);
            if self.line.len() < Self::BOM.len() && Self::BOM.starts_with(&self.line) {
                return messages;
            }
            self.started = true;

            let buffered = mem::take(&mut self.line);
            let start = if buffered.starts_with(Self::BOM) {
                Self::BOM.len()
            } else {
                0
            };
            self.feed(&buffered[start..], &mut messages);
            return messages;
        }

        // An empty chunk says nothing about what follows the CR.
        if self.pending_cr && !chunk.is_empty() {
            self.pending_cr = false;
            if let Some(rest) = chunk.strip_prefix(b"\n") {
                chunk = rest;
            }
        }

        self.feed(chunk, &mut messages);
        messages
    }

    fn feed(&mut self, mut chunk: &[u8], messages: &mut Vec<Message>) {
        while let Some(end) = chunk.iter().position(|&b| b == b'\n' || b == b'\r') {
            let terminator = chunk[end];
            self.push_line_bytes(&chunk[..end]);

            let line = mem::take(&mut self.line);
            if mem::take(&mut self.discarding_line) {
                self.oversized = true;
            } else if let Some(message) = self.process_line(&line) {
                messages.push(message);
            }

            chunk = &chunk[end + 1..];
            if terminator == b'\r' {
                match chunk.first() {
                    Some(b'\n') => chunk = &chunk[1..],
                    Some(_) => {}
                    None => self.pending_cr = true,
                }
            }
        }

        self.push_line_bytes(chunk);
    }

    fn push_line_bytes(&mut self, bytes: &[u8]) {
        if self.discarding_line {
            return;
        }

        if self.line.len() + bytes.len() > Self::MAX_MESSAGE_SIZE {
            error!(
                "discarding event stream line larger than {} bytes",
                Self::MAX_MESSAGE_SIZE
            );
            self.line.clear();
            self.discarding_line = true;
        } else {
            self.line.extend_from_slice(bytes);
        }
    }

    fn process_line(&mut self, line: &[u8]) -> Option<Message> {
        if line.is_empty() {
            return self.dispatch();
        }

        if line[0] == b':' {
            trace!("event stream comment: {}", String::from_utf8_lossy(&line[1..]));
            return None;
        }

        let (field, value) = match line.iter().position(|&b| b == b':') {
            Some(colon) => {
                let value = &line[colon + 1..];
                (&line[..colon], value.strip_prefix(b" ").unwrap_or(value))
            }
            None => (line, &[][..]),
        };

        match field {
            b"event" => self.event = String::from_utf8_lossy(value).into_owned(),
            b"data" => {
                if self.oversized || self.data.len() + value.len() + 1 > Self::MAX_MESSAGE_SIZE {
                    if !self.oversized {
                        error!(
                            "discarding event stream message larger than {} bytes",
                            Self::MAX_MESSAGE_SIZE
                        );
                    }
                    self.oversized = true;
                    self.data.clear();
                } else {
                    self.data.push_str(&String::from_utf8_lossy(value));
                    self.data.push('\n');
                }
            }
            other => trace!(
                "ignoring event stream field {}",
                String::from_utf8_lossy(other)
            ),
        }

        None
    }

    fn dispatch(&mut self) -> Option<Message> {
        let event = mem::take(&mut self.event);
        let mut data = mem::take(&mut self.data);

        if mem::take(&mut self.oversized) {
            return None;
        }

        // Unlike browsers, dispatch named events without data: a bare
        // `event: end` carries its meaning in the name.
        if data.is_empty() && event.is_empty() {
            return None;
        }

        if data.ends_with('\n') {
            data.pop();
        }
        Some(Message {
            event: if event.is_empty() {
                Self::DEFAULT_EVENT.to_owned()
            } else {
                event
            },
            data,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_all(chunks: &[&[u8]]) -> Vec<Message> {
        let mut decoder = Decoder::default();
        chunks
            .iter()
            .flat_map(|chunk| decoder.decode(chunk))
            .collect()
    }

    #[test]
    fn named_events() {
        let messages = decode_all(&[b"event: update\ndata: {}\n\nevent: end\ndata: \n\n"]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].event, "update");
        assert_eq!(messages[0].data, "{}");
        assert_eq!(messages[1].event, "end");
        assert_eq!(messages[1].data, "");
    }

    #[test]
    fn named_events_without_data() {
        let messages = decode_all(&[b"event: end\n\n"]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].event, "end");

        assert!(decode_all(&[b"\n\n\n"]).is_empty());
    }

    #[test]
    fn unnamed_events_are_messages() {
        let messages = decode_all(&[b"data: hello\n\n"]);
        assert_eq!(messages[0].event, Decoder::DEFAULT_EVENT);
    }

    #[test]
    fn multiline_data_joined_with_lf() {
        let messages = decode_all(&[b"data: {\ndata:\"a\":1}\n\n"]);
        assert_eq!(messages[0].data, "{\n\"a\":1}");
    }

    #[test]
    fn every_line_ending() {
        let messages = decode_all(&[b"data: a\r\n\r\ndata: b\r\rdata: c\n\n"]);
        let data: Vec<_> = messages.iter().map(|m| m.data.as_str()).collect();
        assert_eq!(data, ["a", "b", "c"]);
    }

    #[test]
    fn split_anywhere() {
        let stream = "\u{feff}event: update\r\ndata: {\"title\":\"Ünïcødé\"}\r\n\r\n".as_bytes();
        for split in 0..stream.len() {
            let messages = decode_all(&[&stream[..split], &stream[split..]]);
            assert_eq!(messages.len(), 1, "split at {split}");
            assert_eq!(messages[0].event, "update");
            assert_eq!(messages[0].data, "{\"title\":\"Ünïcødé\"}");
        }
    }

    #[test]
    fn byte_by_byte() {
        let stream = b"event: update\r\ndata: 1\r\n\r\nevent: end\rdata: x\r\r";
        let chunks: Vec<&[u8]> = stream.chunks(1).collect();
        let messages = decode_all(&chunks);
        let events: Vec<_> = messages.iter().map(|m| m.event.as_str()).collect();
        assert_eq!(events, ["update", "end"]);
    }

    #[test]
    fn comments_and_unknown_fields_are_ignored() {
        let messages = decode_all(&[b": keep-alive\nfoo: bar\ndata: x\n\n"]);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data, "x");
    }

    #[test]
    fn event_name_resets_after_dispatch() {
        let messages = decode_all(&[b"event: end\n\ndata: x\n\n"]);
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].event, "end");
        assert_eq!(messages[1].event, Decoder::DEFAULT_EVENT);
    }

    #[test]
    fn incomplete_message_is_not_dispatched() {
        let messages = decode_all(&[b"event: update\ndata: {}\n"]);
        assert!(messages.is_empty());
    }

    #[test]
    fn reconnect_fields_are_ignored() {
        let messages = decode_all(&[b"id: 7\nretry: 1500\ndata: x\n\n"]);
        assert_eq!(
            messages,
            [Message {
                event: Decoder::DEFAULT_EVENT.to_owned(),
                data: "x".to_owned(),
            }]
        );
    }

    #[test]
    fn crlf_split_by_empty_chunk() {
        let chunks: [&[u8]; 5] = [b"event: update\r", b"", b"\ndata: 1\r", b"", b"\n\r\n"];
        let messages = decode_all(&chunks);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].event, "update");
        assert_eq!(messages[0].data, "1");
    }

    #[test]
    fn oversized_messages_are_dropped() {
        let mut decoder = Decoder::default();
        let big = "x".repeat(Decoder::MAX_MESSAGE_SIZE);

        let mut stream = format!("event: update\ndata: {big}\n\n").into_bytes();
        stream.extend_from_slice(b"event: end\ndata: bye\n\n");

        let messages = decoder.decode(&stream);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].event, "end");
    }

    #[test]
    fn oversized_across_lines_is_dropped() {
        let mut decoder = Decoder::default();
        let half = "y".repeat(Decoder::MAX_MESSAGE_SIZE / 2 + 1);
        let stream = format!("data: {half}\ndata: {half}\n\ndata: ok\n\n");

        let messages = decoder.decode(stream.as_bytes());
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].data, "ok");
    }
}
