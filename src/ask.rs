//! Request entry points: route, call the backend, return an [`Answer`].
//!
//! One request is handled end-to-end on the calling task. The only
//! suspension points are the pdfium work (moved to `spawn_blocking`) and the
//! backend call itself. The [`Request`] is taken by value so its staged
//! upload is released when the call returns, whichever way it returns.

use crate::config::AssistantConfig;
use crate::error::PageLensError;
use crate::history::ConversationHistory;
use crate::output::Answer;
use crate::pipeline::llm::BackendClient;
use crate::pipeline::router::{BackendKind, Prepared, Request, RequestRouter, Routed};
use crate::stream::{Fragment, StreamedAnswer};
use std::time::Instant;
use tracing::info;

/// Routes requests and sends them to the vision or text backend.
#[derive(Debug, Clone)]
pub struct Assistant {
    router: RequestRouter,
    vision: BackendClient,
    text: BackendClient,
}

impl Assistant {
    pub fn new(config: AssistantConfig) -> Result<Self, PageLensError> {
        let text = BackendClient::new(config.text_backend().clone())?;
        let vision = BackendClient::new(config.vision)?;
        Ok(Self {
            router: RequestRouter::new(config.raster, config.default_prompts),
            vision,
            text,
        })
    }

    /// Build from `PAGELENS_*` / `PAGELENS_TEXT_*` environment variables.
    pub fn from_env() -> Result<Self, PageLensError> {
        Self::new(AssistantConfig::from_env()?)
    }

    pub fn client(&self, kind: BackendKind) -> &BackendClient {
        match kind {
            BackendKind::Vision => &self.vision,
            BackendKind::Text => &self.text,
        }
    }

    /// Backend for a prepared message. Text turns in a conversation that
    /// already holds images stay on the vision backend.
    fn backend_for(
        &self,
        prepared: &Prepared,
        history: Option<&ConversationHistory>,
    ) -> &BackendClient {
        match prepared.backend {
            BackendKind::Text if history.is_some_and(|h| h.has_images()) => &self.vision,
            kind => self.client(kind),
        }
    }

    /// Route a request without calling a backend. Rejections become
    /// [`PageLensError::Rejected`].
    pub async fn prepare(&self, request: &Request) -> Result<Prepared, PageLensError> {
        match self.router.route(request).await? {
            Routed::Ready(prepared) => Ok(prepared),
            Routed::Rejected(rejection) => Err(rejection.into()),
        }
    }

    /// Answer a single request with no history.
    pub async fn ask(&self, request: Request) -> Result<Answer, PageLensError> {
        self.ask_inner(request, None).await
    }

    /// Answer one turn of a conversation. The turn is recorded only when
    /// the backend call succeeds.
    pub async fn ask_with_history(
        &self,
        request: Request,
        history: &mut ConversationHistory,
    ) -> Result<Answer, PageLensError> {
        self.ask_inner(request, Some(history)).await
    }

    /// Answer a request as a stream, handing each fragment to `on_fragment`
    /// as it arrives. The turn is recorded once the stream completes.
    pub async fn ask_streaming<F>(
        &self,
        request: Request,
        history: Option<&mut ConversationHistory>,
        on_fragment: F,
    ) -> Result<Answer, PageLensError>
    where
        F: FnMut(&Fragment),
    {
        let start = Instant::now();
        let prepared = self.prepare(&request).await?;
        let client = self.backend_for(&prepared, history.as_deref());
        let streamed = client
            .complete_streaming(&prepared.message, history, on_fragment)
            .await?;
        Ok(finish(prepared, client, streamed, start))
    }

    async fn ask_inner(
        &self,
        request: Request,
        history: Option<&mut ConversationHistory>,
    ) -> Result<Answer, PageLensError> {
        let start = Instant::now();
        let prepared = self.prepare(&request).await?;
        let client = self.backend_for(&prepared, history.as_deref());
        let content = client.complete(&prepared.message, history).await?;
        let streamed = StreamedAnswer {
            content,
            reasoning: String::new(),
        };
        Ok(finish(prepared, client, streamed, start))
    }
}

fn finish(
    prepared: Prepared,
    client: &BackendClient,
    streamed: StreamedAnswer,
    start: Instant,
) -> Answer {
    let duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Answered {} request via {} in {}ms ({} chars)",
        prepared.mode,
        client.model(),
        duration_ms,
        streamed.content.len()
    );
    Answer {
        mode: prepared.mode,
        answer: streamed.content,
        reasoning: (!streamed.reasoning.is_empty()).then_some(streamed.reasoning),
        filename: prepared.filename,
        pages: prepared.page_count,
        model: client.model().to_string(),
        duration_ms,
    }
}
