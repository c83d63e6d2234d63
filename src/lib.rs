//! # pagelens
//!
//! Ask questions about plain text, images, and PDF documents through an
//! OpenAI-compatible chat-completion API.
//!
//! ## How a request is answered
//!
//! Every request resolves to one of three modes. Text goes to the backend as
//! a plain string. An image is base64-encoded into a single image part. A PDF
//! is rasterised page by page with pdfium, and each page becomes one image
//! part after the question, in page order, so the vision model reads the
//! document as a human would.
//!
//! ```text
//! request
//!  │
//!  ├─ 1. Input   stage the upload, classify by extension
//!  ├─ 2. Route   text / image / pdf, default prompt per mode
//!  ├─ 3. Render  rasterise pages via pdfium (spawn_blocking)
//!  ├─ 4. Encode  bytes / PNG → base64 data URI
//!  ├─ 5. Call    POST /chat/completions (buffered or SSE stream)
//!  └─ 6. Extract choices[0].message.content → Answer
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pagelens::{Assistant, Attachment, Request};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads PAGELENS_BASE_URL / PAGELENS_API_KEY / PAGELENS_MODEL
//!     let assistant = Assistant::from_env()?;
//!     let request = Request::text("Summarize")
//!         .attachment(Attachment::from_path("report.pdf")?);
//!     let answer = assistant.ask(request).await?;
//!     println!("{} ({} pages)", answer.answer, answer.pages);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pagelens` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! pagelens = { version = "0.1", default-features = false }
//! ```
//!
//! ## pdfium
//!
//! PDF rendering binds to a pdfium shared library at runtime. Set
//! `PDFIUM_LIB_PATH` to the library file or its directory; otherwise the
//! current directory and then the system library path are tried.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod ask;
pub mod config;
pub mod content;
pub mod error;
pub mod history;
pub mod output;
pub mod pipeline;
pub mod prompts;
pub mod stream;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use ask::Assistant;
pub use config::{
    AssistantConfig, BackendConfig, BackendConfigBuilder, DefaultPrompts, RasterConfig,
    RenderScale,
};
pub use content::{build_content, ContentPart, ImageData, Message, MessageContent, Role};
pub use error::{ClientError, ExtractError, PageError, PageLensError};
pub use history::ConversationHistory;
pub use output::{Answer, Envelope};
pub use pipeline::encode::{encode_file, encode_paths};
pub use pipeline::extract::extract_answer;
pub use pipeline::input::{Attachment, AttachmentKind};
pub use pipeline::llm::BackendClient;
pub use pipeline::render::{rasterize_pdf, PageSource, RasterPage, RenderedDocument};
pub use pipeline::router::{Mode, Request, RequestRouter, Routed};
pub use stream::{ChatStream, Fragment, StreamedAnswer};
