//! Request routing: classify an inbound request and build its message.
//!
//! Every request resolves to exactly one [`Mode`]:
//!
//! | Mode | Trigger | Message content | Backend |
//! |------|---------|-----------------|---------|
//! | `text`  | no attachment | the raw prompt string | text |
//! | `image` | `.png` `.jpg` `.jpeg` `.webp` | text part + 1 image part | vision |
//! | `pdf`   | `.pdf` | text part + 1 image part per rendered page | vision |
//!
//! A PDF sent with `modelType = "text"` is read through its text layer
//! instead and goes to the text backend as a plain-string prompt.
//!
//! Malformed input never becomes an `Err`: the router answers with
//! [`Routed::Rejected`] carrying a reason and a 4xx status hint, and no
//! backend call is made. `Err` is reserved for processing failures.

use crate::config::{DefaultPrompts, RasterConfig};
use crate::content::{build_content, effective_prompt, Message};
use crate::error::{ClientError, PageLensError};
use crate::pipeline::input::{ensure_pdf_magic, Attachment, AttachmentKind};
use crate::pipeline::{encode, render};
use crate::prompts;
use serde::Serialize;
use tracing::{debug, info};

/// The three request modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Text,
    Image,
    Pdf,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Mode::Text => "text",
            Mode::Image => "image",
            Mode::Pdf => "pdf",
        })
    }
}

/// Which configured backend a prepared message goes to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Text,
    Vision,
}

/// Explicit `modelType` hint from the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelHint {
    Text,
    Vision,
}

impl ModelHint {
    /// Parse a hint. Blank means "no hint"; unknown values are rejected.
    pub fn parse(raw: Option<&str>) -> Result<Option<Self>, ClientError> {
        let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
            return Ok(None);
        };
        match raw.to_ascii_lowercase().as_str() {
            "text" => Ok(Some(ModelHint::Text)),
            "image" | "pdf" | "vision" | "multimodal" => Ok(Some(ModelHint::Vision)),
            other => Err(ClientError::bad_request(format!("unknown modelType: {other}"))),
        }
    }
}

/// One inbound request.
///
/// Owns its attachment, so dropping the request releases any staged upload.
#[derive(Debug, Default)]
pub struct Request {
    pub prompt: Option<String>,
    pub attachment: Option<Attachment>,
    pub model_type: Option<String>,
}

impl Request {
    pub fn new() -> Self {
        Self::default()
    }

    /// A text-only request.
    pub fn text(prompt: impl Into<String>) -> Self {
        Self::new().prompt(prompt)
    }

    pub fn prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt = Some(prompt.into());
        self
    }

    pub fn attachment(mut self, attachment: Attachment) -> Self {
        self.attachment = Some(attachment);
        self
    }

    pub fn model_type(mut self, hint: impl Into<String>) -> Self {
        self.model_type = Some(hint.into());
        self
    }
}

/// How a PDF is turned into a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PdfStrategy {
    /// Render pages to images for a vision model.
    Rasterize,
    /// Read the text layer for a text model.
    ExtractText,
}

/// Result of classification, before any file is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub mode: Mode,
    pub pdf_strategy: Option<PdfStrategy>,
}

/// A message ready to send.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub mode: Mode,
    pub backend: BackendKind,
    pub message: Message,
    /// Pages in the source document (PDF mode), else 0.
    pub page_count: usize,
    pub filename: Option<String>,
}

/// Router outcome: a prepared message, or a client error.
#[derive(Debug, Clone)]
pub enum Routed {
    Ready(Prepared),
    Rejected(ClientError),
}

/// Classifies requests and builds their messages.
#[derive(Debug, Clone, Default)]
pub struct RequestRouter {
    raster: RasterConfig,
    defaults: DefaultPrompts,
}

impl RequestRouter {
    pub fn new(raster: RasterConfig, defaults: DefaultPrompts) -> Self {
        Self { raster, defaults }
    }

    /// Decide the mode without touching any file contents.
    pub fn classify(&self, request: &Request) -> Result<Route, ClientError> {
        let hint = ModelHint::parse(request.model_type.as_deref())?;

        let Some(attachment) = &request.attachment else {
            if hint == Some(ModelHint::Vision) {
                return Err(ClientError::bad_request("no file uploaded"));
            }
            let has_prompt = request
                .prompt
                .as_deref()
                .is_some_and(|p| !p.trim().is_empty());
            if !has_prompt {
                return Err(ClientError::bad_request("empty prompt"));
            }
            return Ok(Route {
                mode: Mode::Text,
                pdf_strategy: None,
            });
        };

        match (attachment.kind()?, hint) {
            (AttachmentKind::Image, Some(ModelHint::Text)) => Err(ClientError::bad_request(
                "image attachments require a vision model (modelType is 'text')",
            )),
            (AttachmentKind::Image, _) => Ok(Route {
                mode: Mode::Image,
                pdf_strategy: None,
            }),
            (AttachmentKind::Pdf, Some(ModelHint::Text)) => Ok(Route {
                mode: Mode::Pdf,
                pdf_strategy: Some(PdfStrategy::ExtractText),
            }),
            (AttachmentKind::Pdf, _) => Ok(Route {
                mode: Mode::Pdf,
                pdf_strategy: Some(PdfStrategy::Rasterize),
            }),
        }
    }

    /// Classify the request and build its message.
    pub async fn route(&self, request: &Request) -> Result<Routed, PageLensError> {
        let route = match self.classify(request) {
            Ok(route) => route,
            Err(rejection) => {
                info!("Rejected request: {}", rejection);
                return Ok(Routed::Rejected(rejection));
            }
        };
        info!(
            "Routing {} request{}",
            route.mode,
            request
                .attachment
                .as_ref()
                .map(|a| format!(" with '{}'", a.filename()))
                .unwrap_or_default()
        );

        let prepared = match (route.mode, &request.attachment) {
            (Mode::Text, _) => self.prepare_text(request),
            (Mode::Image, Some(att)) => self.prepare_image(request, att),
            (Mode::Pdf, Some(att)) => {
                if let Err(rejection) = ensure_pdf_magic(att.path()) {
                    return Ok(Routed::Rejected(rejection));
                }
                match route.pdf_strategy {
                    Some(PdfStrategy::ExtractText) => self.prepare_pdf_text(request, att).await,
                    _ => self.prepare_pdf(request, att).await,
                }
            }
            (_, None) => Err(PageLensError::Internal(format!(
                "{} route without an attachment",
                route.mode
            ))),
        }?;

        debug!(
            "Prepared {} message with {} image part(s)",
            prepared.mode,
            prepared.message.image_count()
        );
        Ok(Routed::Ready(prepared))
    }

    fn prepare_text(&self, request: &Request) -> Result<Prepared, PageLensError> {
        let prompt = request.prompt.clone().unwrap_or_default();
        Ok(Prepared {
            mode: Mode::Text,
            backend: BackendKind::Text,
            message: Message::user_text(prompt),
            page_count: 0,
            filename: None,
        })
    }

    fn prepare_image(
        &self,
        request: &Request,
        att: &Attachment,
    ) -> Result<Prepared, PageLensError> {
        let images = encode::encode_paths(&[att.path()]);
        let prompt = effective_prompt(request.prompt.as_deref(), &self.defaults.image);

        Ok(Prepared {
            mode: Mode::Image,
            backend: BackendKind::Vision,
            message: Message::user_parts(build_content(prompt, images)),
            page_count: 0,
            filename: Some(att.filename().to_string()),
        })
    }

    async fn prepare_pdf(
        &self,
        request: &Request,
        att: &Attachment,
    ) -> Result<Prepared, PageLensError> {
        let doc = render::rasterize_pdf(att.path(), &self.raster).await?;
        let prompt = effective_prompt(request.prompt.as_deref(), &self.defaults.pdf);

        Ok(Prepared {
            mode: Mode::Pdf,
            backend: BackendKind::Vision,
            message: Message::user_parts(build_content(prompt, doc.images)),
            page_count: doc.page_count,
            filename: Some(att.filename().to_string()),
        })
    }

    async fn prepare_pdf_text(
        &self,
        request: &Request,
        att: &Attachment,
    ) -> Result<Prepared, PageLensError> {
        let (text, page_count) = render::extract_text(att.path()).await?;
        let question = effective_prompt(request.prompt.as_deref(), &self.defaults.pdf);
        let body = prompts::pdf_text_question(&text, page_count, question);

        Ok(Prepared {
            mode: Mode::Pdf,
            backend: BackendKind::Text,
            message: Message::user_text(body),
            page_count,
            filename: Some(att.filename().to_string()),
        })
    }
}
