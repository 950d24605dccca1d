//! Incremental SSE frame parsing.
//!
//! The parser is push-based and keeps its own buffer, so a `data:` line split
//! across two read chunks reassembles correctly — chunk boundaries carry no
//! meaning. Frames are delimited by a blank line (`\n\n` or `\r\n\r\n`); the
//! `data: [DONE]` sentinel terminates the stream.

use std::collections::VecDeque;

use futures_core::Stream;
use futures_util::{stream, StreamExt};

use crate::errors::Result;
use crate::http::transport_error;

/// One parsed server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field, when present.
    pub name: Option<String>,
    /// Concatenated `data:` lines, newline-joined.
    pub data: String,
}

/// Output of the parser: either an event or the `[DONE]` terminator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseFrame {
    Event(SseEvent),
    Done,
}

/// Push-based SSE parser. Feed raw chunks with [`push`](Self::push); call
/// [`finish`](Self::finish) at end of input to flush a trailing frame that
/// was never terminated by a blank line.
///
/// The buffer holds raw bytes and blocks are decoded only once a frame
/// delimiter is found, so a multi-byte UTF-8 character split across chunks
/// decodes intact.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: Vec<u8>,
    finished: bool,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True once the `[DONE]` sentinel has been seen; later input is ignored.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseFrame> {
        if self.finished {
            return Vec::new();
        }
        self.buffer.extend_from_slice(chunk);
        self.drain(false)
    }

    pub fn finish(&mut self) -> Vec<SseFrame> {
        if self.finished {
            return Vec::new();
        }
        self.drain(true)
    }

    fn drain(&mut self, flush: bool) -> Vec<SseFrame> {
        let mut frames = Vec::new();
        loop {
            let Some((idx, delim_len)) = find_delimiter(&self.buffer) else {
                if flush {
                    let block = std::mem::take(&mut self.buffer);
                    if let Some(frame) = parse_block(&String::from_utf8_lossy(&block)) {
                        self.push_frame(&mut frames, frame);
                    }
                }
                break;
            };
            let block = String::from_utf8_lossy(&self.buffer[..idx]).into_owned();
            self.buffer.drain(..idx + delim_len);
            if let Some(frame) = parse_block(&block) {
                self.push_frame(&mut frames, frame);
                if self.finished {
                    break;
                }
            }
        }
        frames
    }

    fn push_frame(&mut self, frames: &mut Vec<SseFrame>, frame: SseFrame) {
        if matches!(frame, SseFrame::Done) {
            self.finished = true;
            self.buffer.clear();
        }
        frames.push(frame);
    }
}

/// Earliest blank-line delimiter, LF-LF or CRLF-CRLF.
fn find_delimiter(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = find_subslice(buffer, b"\n\n").map(|i| (i, 2));
    let crlf = find_subslice(buffer, b"\r\n\r\n").map(|i| (i, 4));
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.0 < b.0 { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

fn parse_block(block: &str) -> Option<SseFrame> {
    let mut name: Option<String> = None;
    let mut data_lines: Vec<String> = Vec::new();

    for line in block.split('\n') {
        let line = line.trim_end_matches('\r');
        if line.is_empty() || line.starts_with(':') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("event:") {
            name = Some(rest.trim().to_string());
            continue;
        }
        if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest).to_string());
        }
    }

    if name.is_none() && data_lines.is_empty() {
        return None;
    }

    let data = data_lines.join("\n");
    if data.trim() == "[DONE]" {
        return Some(SseFrame::Done);
    }
    Some(SseFrame::Event(SseEvent { name, data }))
}

/// Adapt a streaming HTTP response body into a stream of parsed events.
/// The stream ends at `[DONE]` or end of body; transport failures surface as
/// a single error item.
pub fn sse_stream(response: reqwest::Response) -> impl Stream<Item = Result<SseEvent>> + Send {
    let body = Box::pin(response.bytes_stream());
    let state = (body, SseParser::new(), VecDeque::<SseEvent>::new(), false);

    stream::unfold(state, |state| async move {
        let (mut body, mut parser, mut pending, mut done) = state;
        loop {
            if let Some(event) = pending.pop_front() {
                return Some((Ok(event), (body, parser, pending, done)));
            }
            if done {
                return None;
            }
            match body.next().await {
                Some(Ok(chunk)) => {
                    for frame in parser.push(&chunk) {
                        match frame {
                            SseFrame::Event(event) => pending.push_back(event),
                            SseFrame::Done => done = true,
                        }
                    }
                }
                Some(Err(err)) => {
                    done = true;
                    return Some((Err(transport_error(err)), (body, parser, pending, done)));
                }
                None => {
                    for frame in parser.finish() {
                        match frame {
                            SseFrame::Event(event) => pending.push_back(event),
                            SseFrame::Done => {}
                        }
                    }
                    done = true;
                }
            }
        }
    })
}
