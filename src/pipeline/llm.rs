//! Backend client: send one chat-completion request and return the result.
//!
//! The client is a thin wrapper over `reqwest` with a fixed per-request
//! timeout. It performs no retries; transport failures come back as
//! [`PageLensError::Timeout`] or [`PageLensError::Connection`] so callers can
//! decide for themselves.
//!
//! ## Failure mapping
//!
//! | Condition | Error |
//! |-----------|-------|
//! | request exceeded `timeout_secs` | `Timeout { secs }` |
//! | DNS / refused / reset | `Connection { detail }` |
//! | non-2xx status | `Backend { status, body }` |
//! | 2xx but body is not JSON | `Extract(MalformedResponse)` |
//!
//! Buffered calls then run the body through [`extract_answer`]; streamed
//! calls hand the byte stream to [`crate::stream::ChatStream`].

use crate::config::BackendConfig;
use crate::content::Message;
use crate::error::{ExtractError, PageLensError};
use crate::history::ConversationHistory;
use crate::pipeline::extract::extract_answer;
use crate::stream::{ChatStream, Fragment, StreamedAnswer};
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// JSON body of a chat-completion request.
#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    stream_options: Option<StreamOptions>,
}

#[derive(Debug, Serialize)]
struct StreamOptions {
    include_usage: bool,
}

/// Client for one configured chat-completion endpoint.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct BackendClient {
    http: reqwest::Client,
    config: BackendConfig,
    url: String,
}

impl BackendClient {
    pub fn new(config: BackendConfig) -> Result<Self, PageLensError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PageLensError::Internal(format!("Failed to build HTTP client: {}", e)))?;
        let url = config.completions_url();
        Ok(Self { http, config, url })
    }

    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    pub(crate) fn request_body<'a>(
        &'a self,
        messages: &'a [Message],
        stream: bool,
    ) -> ChatRequest<'a> {
        ChatRequest {
            model: &self.config.model,
            messages,
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            top_p: self.config.top_p,
            stream,
            stream_options: stream.then_some(StreamOptions {
                include_usage: true,
            }),
        }
    }

    /// POST the request and check the status. The body is left unread.
    async fn post(
        &self,
        messages: &[Message],
        stream: bool,
    ) -> Result<reqwest::Response, PageLensError> {
        info!(
            "Calling {} ({} message(s), stream={})",
            self.config.model,
            messages.len(),
            stream
        );
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.config.api_key)
            .json(&self.request_body(messages, stream))
            .send()
            .await
            .map_err(|e| transport_error(e, self.config.timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("Backend returned HTTP {}: {}", status.as_u16(), body);
            return Err(PageLensError::Backend {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Send `messages` and return the raw response body as JSON.
    pub async fn send(&self, messages: &[Message]) -> Result<Value, PageLensError> {
        let start = Instant::now();
        let response = self.post(messages, false).await?;
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, self.config.timeout_secs))?;
        debug!("Backend answered in {:?} ({} bytes)", start.elapsed(), body.len());

        serde_json::from_str(&body).map_err(|e| {
            warn!("Backend body is not JSON ({}): {}", e, body);
            PageLensError::Extract(ExtractError::MalformedResponse)
        })
    }

    /// Buffered completion of one turn.
    ///
    /// With a history, the payload is every prior message plus `message`,
    /// and on success both the user turn and the answer are appended. On
    /// any failure the history is left as it was.
    pub async fn complete(
        &self,
        message: &Message,
        history: Option<&mut ConversationHistory>,
    ) -> Result<String, PageLensError> {
        let messages = match history.as_deref() {
            Some(h) => h.with_next(message),
            None => vec![message.clone()],
        };
        let response = self.send(&messages).await?;
        let answer = extract_answer(&response)?;

        if let Some(h) = history {
            h.record_turn(message.clone(), answer.clone());
        }
        Ok(answer)
    }

    /// Open a streamed completion.
    ///
    /// The returned [`ChatStream`] yields fragments as they arrive; call
    /// [`ChatStream::finalize`] once it is exhausted to record the turn.
    pub async fn stream(
        &self,
        message: &Message,
        history: Option<&ConversationHistory>,
    ) -> Result<ChatStream, PageLensError> {
        let messages = match history {
            Some(h) => h.with_next(message),
            None => vec![message.clone()],
        };
        let response = self.post(&messages, true).await?;
        Ok(ChatStream::new(
            response.bytes_stream().map(|chunk| chunk.map(|b| b.to_vec())),
            message.clone(),
            self.config.timeout_secs,
        ))
    }

    /// Streamed completion that drives the stream to the end, handing each
    /// fragment to `on_fragment`, then records the turn.
    pub async fn complete_streaming<F>(
        &self,
        message: &Message,
        history: Option<&mut ConversationHistory>,
        mut on_fragment: F,
    ) -> Result<StreamedAnswer, PageLensError>
    where
        F: FnMut(&Fragment),
    {
        let mut stream = self.stream(message, history.as_deref()).await?;
        while let Some(fragment) = stream.next().await {
            on_fragment(&fragment?);
        }
        stream.finalize(history)
    }
}

/// Map a `reqwest` failure to a named transport error.
pub(crate) fn transport_error(err: reqwest::Error, timeout_secs: u64) -> PageLensError {
    if err.is_timeout() {
        warn!("Backend call timed out after {}s", timeout_secs);
        PageLensError::Timeout { secs: timeout_secs }
    } else {
        warn!("Backend transport failure: {}", err);
        PageLensError::Connection {
            detail: err.to_string(),
        }
    }
}
