//! Streamed completions: decode server-sent events into answer fragments.
//!
//! A streamed chat completion arrives as SSE lines:
//!
//! ```text
//! data: {"choices":[{"delta":{"content":"Hel"}}]}
//! data: {"choices":[{"delta":{"reasoning_content":"thinking"}}]}
//! data: {"choices":[],"usage":{...}}
//! data: [DONE]
//! ```
//!
//! Network chunks do not respect line boundaries, so [`SseDecoder`] buffers
//! partial lines (as bytes, since a chunk may also split a UTF-8 sequence).
//! Blank lines and comments are ignored, unparsable payloads are logged and
//! skipped, and the usage-only chunk with empty `choices` yields nothing.
//!
//! [`ChatStream`] is a [`Stream`] of [`Fragment`]s. Once it is exhausted,
//! [`ChatStream::finalize`] returns the assembled answer and appends the
//! user and assistant turns to the history.

use crate::content::Message;
use crate::error::{ExtractError, PageLensError};
use crate::history::ConversationHistory;
use crate::pipeline::extract::error_message;
use crate::pipeline::llm::transport_error;
use futures::Stream;
use serde_json::Value;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{ready, Context, Poll};
use tracing::{debug, warn};

/// One incremental piece of a streamed answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    /// Part of the answer text.
    Content(String),
    /// Part of the model's separate reasoning trace, when the backend sends one.
    Reasoning(String),
}

/// The assembled result of a streamed completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamedAnswer {
    /// Content fragments concatenated in arrival order.
    pub content: String,
    /// Reasoning fragments concatenated in arrival order.
    pub reasoning: String,
}

impl StreamedAnswer {
    fn absorb(&mut self, fragment: &Fragment) {
        match fragment {
            Fragment::Content(t) => self.content.push_str(t),
            Fragment::Reasoning(t) => self.reasoning.push_str(t),
        }
    }
}

/// A decoded SSE line that matters to us.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    Data(String),
    Done,
}

/// Incremental SSE line decoder.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: Vec<u8>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one network chunk; returns the events completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(ev) = parse_line(&line[..line.len() - 1]) {
                events.push(ev);
            }
        }
        events
    }

    /// Flush a final line that was not newline-terminated.
    pub fn finish(&mut self) -> Option<SseEvent> {
        let line = std::mem::take(&mut self.buffer);
        parse_line(&line)
    }
}

fn parse_line(raw: &[u8]) -> Option<SseEvent> {
    let line = String::from_utf8_lossy(raw);
    let line = line.trim_end_matches('\r');
    if line.trim().is_empty() || line.starts_with(':') {
        return None;
    }
    let payload = line.strip_prefix("data:")?.trim_start();
    if payload == "[DONE]" {
        Some(SseEvent::Done)
    } else {
        Some(SseEvent::Data(payload.to_string()))
    }
}

/// Fragments carried by one `data:` payload.
///
/// Reasoning comes before content when a chunk carries both.
pub fn parse_chunk(payload: &str) -> Result<Vec<Fragment>, ExtractError> {
    let value: Value = serde_json::from_str(payload).map_err(|_| ExtractError::MalformedResponse)?;
    if let Some(err) = value.get("error") {
        return Err(ExtractError::BackendReported(error_message(err)));
    }

    let Some(delta) = value
        .get("choices")
        .and_then(Value::as_array)
        .and_then(|c| c.first())
        .and_then(|c| c.get("delta"))
    else {
        return Ok(Vec::new());
    };

    let mut out = Vec::new();
    if let Some(r) = delta.get("reasoning_content").and_then(Value::as_str) {
        if !r.is_empty() {
            out.push(Fragment::Reasoning(r.to_string()));
        }
    }
    if let Some(c) = delta.get("content").and_then(Value::as_str) {
        if !c.is_empty() {
            out.push(Fragment::Content(c.to_string()));
        }
    }
    Ok(out)
}

type ByteStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, reqwest::Error>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Open,
    Finished,
    Failed,
}

/// Fragments of one streamed completion, in arrival order.
pub struct ChatStream {
    body: ByteStream,
    decoder: SseDecoder,
    pending: VecDeque<Fragment>,
    answer: StreamedAnswer,
    user: Message,
    timeout_secs: u64,
    state: State,
    /// Set once `[DONE]` arrives; remaining pending fragments still drain.
    done: bool,
}

impl std::fmt::Debug for ChatStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStream")
            .field("state", &self.state)
            .field("pending", &self.pending.len())
            .field("answer", &self.answer)
            .finish()
    }
}

impl ChatStream {
    /// Wrap a raw body stream. `user` is the turn that opened the stream.
    pub fn new<S>(body: S, user: Message, timeout_secs: u64) -> Self
    where
        S: Stream<Item = Result<Vec<u8>, reqwest::Error>> + Send + 'static,
    {
        Self {
            body: Box::pin(body),
            decoder: SseDecoder::new(),
            pending: VecDeque::new(),
            answer: StreamedAnswer::default(),
            user,
            timeout_secs,
            state: State::Open,
            done: false,
        }
    }

    /// What has been assembled so far.
    pub fn answer(&self) -> &StreamedAnswer {
        &self.answer
    }

    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    /// Return the assembled answer and record the turn in `history`.
    ///
    /// Only valid once the stream has yielded `None`. A stream that failed
    /// part-way leaves the history untouched.
    pub fn finalize(
        self,
        history: Option<&mut ConversationHistory>,
    ) -> Result<StreamedAnswer, PageLensError> {
        match self.state {
            State::Finished => {
                if let Some(h) = history {
                    h.record_turn(self.user, self.answer.content.clone());
                }
                Ok(self.answer)
            }
            State::Open => Err(PageLensError::Internal(
                "stream finalized before it was exhausted".into(),
            )),
            State::Failed => Err(PageLensError::Internal(
                "stream failed; turn not recorded".into(),
            )),
        }
    }

    fn handle(&mut self, event: SseEvent) -> Result<(), PageLensError> {
        match event {
            SseEvent::Done => {
                debug!("Stream signalled [DONE]");
                self.done = true;
            }
            SseEvent::Data(payload) => match parse_chunk(&payload) {
                Ok(fragments) => self.pending.extend(fragments),
                Err(ExtractError::MalformedResponse) => {
                    warn!("Skipping unparsable stream line: {}", payload);
                }
                Err(e) => return Err(e.into()),
            },
        }
        Ok(())
    }
}

impl Stream for ChatStream {
    type Item = Result<Fragment, PageLensError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = &mut *self;
        loop {
            if let Some(fragment) = this.pending.pop_front() {
                this.answer.absorb(&fragment);
                return Poll::Ready(Some(Ok(fragment)));
            }
            if this.state != State::Open {
                return Poll::Ready(None);
            }
            if this.done {
                this.state = State::Finished;
                return Poll::Ready(None);
            }

            let events = match ready!(this.body.as_mut().poll_next(cx)) {
                Some(Ok(chunk)) => this.decoder.feed(&chunk),
                Some(Err(e)) => {
                    this.state = State::Failed;
                    return Poll::Ready(Some(Err(transport_error(e, this.timeout_secs))));
                }
                None => {
                    this.done = true;
                    this.decoder.finish().into_iter().collect()
                }
            };
            for event in events {
                if let Err(e) = this.handle(event) {
                    this.state = State::Failed;
                    this.pending.clear();
                    return Poll::Ready(Some(Err(e)));
                }
            }
        }
    }
}
