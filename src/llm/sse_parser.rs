// ABOUTME: Shared SSE line-buffering parser for LLM streaming responses
// ABOUTME: Handles partial lines across TCP boundaries and multiple events per chunk
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Agora Contributors

//! # SSE Stream Parser
//!
//! A shared line-buffering parser for Server-Sent Events used by all LLM
//! providers. Solves two correctness issues:
//!
//! 1. **Multiple events per TCP chunk**: when network buffers batch several
//!    SSE events into a single `bytes_stream()` chunk, all events are
//!    emitted, not just the first.
//! 2. **Partial JSON across TCP boundaries**: when a payload is split across
//!    two TCP chunks, the line buffer accumulates partial data until a
//!    complete line arrives.
//!
//! Each provider supplies a `parse_data` closure that converts raw JSON
//! strings into zero or more [`StreamEvent`]s. SSE framing (line buffering,
//! `data:` prefix stripping, `[DONE]` detection) is handled once here.

use std::collections::VecDeque;
use std::mem;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use futures_util::stream::unfold;
use futures_util::{Stream, StreamExt};

use super::{ChatStream, StreamEvent};
use crate::errors::{AppError, AppResult};

/// Backoff before the single pre-first-byte retry
pub const RETRY_BACKOFF: Duration = Duration::from_secs(2);

/// A parsed SSE event from the byte stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// A `data:` payload with the JSON string (prefix stripped)
    Data(String),
    /// The `[DONE]` termination signal (OpenAI-dialect convention)
    Done,
}

/// Line-buffering SSE parser that handles partial lines across chunk boundaries
///
/// SSE streams are newline-delimited but TCP does not guarantee alignment
/// between network chunks and event boundaries. Incomplete lines stay
/// buffered until the terminating `\n` arrives.
#[derive(Debug, Default)]
pub struct SseLineBuffer {
    buffer: String,
}

impl SseLineBuffer {
    /// Create a new empty line buffer
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes from a TCP chunk, returning any complete SSE events
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(bytes));

        let mut events = Vec::new();
        while let Some(newline_pos) = self.buffer.find('\n') {
            let line = self.buffer[..newline_pos].trim_end_matches('\r').to_owned();
            self.buffer = self.buffer[newline_pos + 1..].to_owned();

            if let Some(event) = Self::parse_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Flush any remaining buffered content as a final event
    ///
    /// Called when the byte stream ends with a partial line (no trailing
    /// newline) still in the buffer.
    pub fn flush(&mut self) -> Vec<SseEvent> {
        let remaining = mem::take(&mut self.buffer);
        Self::parse_line(&remaining).into_iter().collect()
    }

    fn parse_line(line: &str) -> Option<SseEvent> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed == "data: [DONE]" {
            return Some(SseEvent::Done);
        }
        // Ignore non-data SSE fields (event:, id:, retry:, comments)
        let data = trimmed.strip_prefix("data: ")?;
        if data.trim().is_empty() {
            return None;
        }
        Some(SseEvent::Data(data.to_owned()))
    }
}

/// Internal state for the SSE stream unfold
struct SseStreamState {
    parser: SseLineBuffer,
    pending: VecDeque<AppResult<StreamEvent>>,
    end_emitted: bool,
    stream_ended: bool,
}

impl SseStreamState {
    fn push_events<F>(&mut self, events: Vec<SseEvent>, parse_data: &F)
    where
        F: Fn(&str) -> Vec<AppResult<StreamEvent>>,
    {
        for event in events {
            match event {
                SseEvent::Data(json_str) => {
                    for item in parse_data(&json_str) {
                        if matches!(item, Ok(StreamEvent::End { .. })) {
                            if self.end_emitted {
                                continue;
                            }
                            self.end_emitted = true;
                        }
                        self.pending.push_back(item);
                    }
                }
                SseEvent::Done => {
                    if !self.end_emitted {
                        self.end_emitted = true;
                        self.pending.push_back(Ok(StreamEvent::End { usage: None }));
                    }
                }
            }
        }
    }
}

/// Create a properly-buffered event stream from a raw SSE byte stream
///
/// Wraps a `reqwest` byte stream with line buffering. The `parse_data`
/// closure converts provider-specific JSON strings into stream events;
/// returning an empty `Vec` skips payloads that produce no output. A
/// duplicate `End` (finish chunk followed by `[DONE]`) is suppressed.
pub fn create_sse_stream<S, F>(
    byte_stream: S,
    parse_data: F,
    provider_name: &'static str,
) -> ChatStream
where
    S: Stream<Item = Result<Bytes, reqwest::Error>> + Send + 'static,
    F: Fn(&str) -> Vec<AppResult<StreamEvent>> + Send + 'static,
{
    let state = SseStreamState {
        parser: SseLineBuffer::new(),
        pending: VecDeque::new(),
        end_emitted: false,
        stream_ended: false,
    };

    // unfold keeps parser state across async iterations: each turn either
    // drains a pending event or reads the next TCP chunk.
    let stream = unfold(
        (
            Box::pin(byte_stream)
                as Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
            state,
            parse_data,
            provider_name,
        ),
        |(mut byte_stream, mut state, parse_data, provider_name)| async move {
            loop {
                if let Some(item) = state.pending.pop_front() {
                    return Some((item, (byte_stream, state, parse_data, provider_name)));
                }
                if state.stream_ended {
                    return None;
                }

                match byte_stream.next().await {
                    Some(Ok(bytes)) => {
                        let events = state.parser.feed(&bytes);
                        state.push_events(events, &parse_data);
                    }
                    Some(Err(e)) => {
                        state.stream_ended = true;
                        let error = if e.is_timeout() {
                            AppError::provider_timeout(
                                provider_name,
                                super::DEFAULT_REQUEST_TIMEOUT_SECS,
                            )
                        } else {
                            AppError::provider_upstream(
                                provider_name,
                                format!("stream read error: {e}"),
                            )
                        };
                        return Some((Err(error), (byte_stream, state, parse_data, provider_name)));
                    }
                    None => {
                        state.stream_ended = true;
                        let events = state.parser.flush();
                        state.push_events(events, &parse_data);
                        if !state.end_emitted {
                            state.end_emitted = true;
                            state.pending.push_back(Ok(StreamEvent::End { usage: None }));
                        }
                    }
                }
            }
        },
    );

    // Drop empty text/thinking chunks
    let filtered = stream.filter(|result| {
        futures_util::future::ready(!matches!(
            result,
            Ok(StreamEvent::Text(t) | StreamEvent::Thinking(t)) if t.is_empty()
        ))
    });

    Box::pin(filtered)
}

/// Check if a request error is retryable (connection/DNS failures only)
///
/// Retries are allowed once, before the first byte. Anything after the
/// request was accepted upstream is never retried.
#[must_use]
pub fn is_retryable_request_error(error: &reqwest::Error) -> bool {
    error.is_connect()
}
