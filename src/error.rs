//! Error types for the pagelens library.
//!
//! Three error types reflect three distinct failure scopes:
//!
//! * [`PageLensError`] — **Fatal** for the current request: the input was
//!   rejected, the backend failed, the network timed out, or credentials are
//!   missing. Returned as `Err(PageLensError)` from the top-level `ask*`
//!   functions.
//!
//! * [`PageError`] — **Non-fatal**: a single page or image could not be
//!   rendered or encoded. The pipeline logs it and moves on to the next one,
//!   so one bad page never costs the whole document.
//!
//! * [`ExtractError`] — the named reasons a backend response body can fail
//!   answer extraction. Wrapped in [`PageLensError::Extract`].
//!
//! Every fatal error carries an HTTP-equivalent [`PageLensError::status_hint`]
//! and a stable [`PageLensError::kind`] name so a transport layer can map it
//! without string matching.

use std::path::PathBuf;
use thiserror::Error;

/// A rejected request: malformed or missing input.
///
/// Produced by the router instead of an error so callers can answer the
/// client directly. Never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error, serde::Serialize)]
#[error("{reason}")]
pub struct ClientError {
    /// Human-readable reason, e.g. `"unsupported file type: .docx"`.
    pub reason: String,
    /// HTTP-equivalent status (always 4xx).
    pub status_hint: u16,
}

impl ClientError {
    /// A `400 Bad Request` rejection.
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            status_hint: 400,
        }
    }

    /// Rejection for an attachment whose extension is not accepted.
    pub fn unsupported_file_type(extension: &str) -> Self {
        let ext = if extension.is_empty() {
            "(none)".to_string()
        } else {
            format!(".{extension}")
        };
        Self::bad_request(format!("unsupported file type: {ext}"))
    }
}

/// Why a backend response body could not yield an answer.
///
/// Checks run in declaration order; the first failing check wins.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractError {
    /// The body is not a JSON object.
    #[error("malformed response")]
    MalformedResponse,

    /// The backend embedded an `error` field in an otherwise valid body.
    #[error("backend-reported error: {0}")]
    BackendReported(String),

    #[error("missing choices field")]
    MissingChoices,

    #[error("empty choices")]
    EmptyChoices,

    #[error("missing message field")]
    MissingMessage,

    #[error("missing content field")]
    MissingContent,
}

/// All fatal errors returned by the pagelens library.
///
/// Page-level failures use [`PageError`] and are logged rather than
/// propagated here.
#[derive(Debug, Error)]
pub enum PageLensError {
    // ── Client errors ─────────────────────────────────────────────────────
    /// The request was malformed (no file, unsupported extension, empty prompt).
    #[error("Request rejected: {0}")]
    Rejected(ClientError),

    // ── Processing errors ─────────────────────────────────────────────────
    /// The PDF could not be opened at all. No partial pages are produced.
    #[error("PDF '{path}' could not be opened: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium system-wide, or set PDFIUM_LIB_PATH=/path/to/dir/containing/libpdfium.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Backend errors ────────────────────────────────────────────────────
    /// The backend answered with a non-success HTTP status.
    #[error("Backend returned HTTP {status}: {body}")]
    Backend { status: u16, body: String },

    /// The backend answered 2xx but the body did not contain an answer.
    #[error("Backend response unusable: {0}")]
    Extract(#[from] ExtractError),

    // ── Transport errors ──────────────────────────────────────────────────
    /// The backend call exceeded the configured timeout. Safe to retry.
    #[error("Backend call timed out after {secs}s")]
    Timeout { secs: u64 },

    /// The backend could not be reached. Safe to retry.
    #[error("Could not reach backend: {detail}")]
    Connection { detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Required configuration (endpoint, API key, model) is missing or invalid.
    #[error("Invalid configuration: {0}")]
    Config(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PageLensError {
    /// HTTP-equivalent status for this error.
    pub fn status_hint(&self) -> u16 {
        match self {
            PageLensError::Rejected(c) => c.status_hint,
            PageLensError::CorruptPdf { .. } => 400,
            PageLensError::Backend { .. } | PageLensError::Extract(_) => 502,
            PageLensError::Timeout { .. } => 504,
            PageLensError::Connection { .. } => 503,
            PageLensError::PdfiumBindingFailed(_)
            | PageLensError::Config(_)
            | PageLensError::Internal(_) => 500,
        }
    }

    /// Stable category name, usable as a machine-readable error code.
    pub fn kind(&self) -> &'static str {
        match self {
            PageLensError::Rejected(_) | PageLensError::CorruptPdf { .. } => "client_error",
            PageLensError::PdfiumBindingFailed(_) => "processing",
            PageLensError::Backend { .. } | PageLensError::Extract(_) => "backend",
            PageLensError::Timeout { .. } => "timeout",
            PageLensError::Connection { .. } => "connection",
            PageLensError::Config(_) => "configuration",
            PageLensError::Internal(_) => "internal",
        }
    }

    /// Transport failures are the only ones worth retrying unchanged.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PageLensError::Timeout { .. } | PageLensError::Connection { .. }
        )
    }
}

impl From<ClientError> for PageLensError {
    fn from(e: ClientError) -> Self {
        PageLensError::Rejected(e)
    }
}

/// A non-fatal error for a single page or image.
///
/// The pipeline logs it and skips the item; the remaining items keep their
/// relative order.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// Rendered page could not be PNG-encoded.
    #[error("Page {page}: encoding failed: {detail}")]
    EncodeFailed { page: usize, detail: String },

    /// An image file referenced by path does not exist.
    #[error("Image file not found: '{path}'")]
    NotFound { path: PathBuf },

    /// An image file exists but could not be read.
    #[error("Image file '{path}' could not be read: {detail}")]
    Unreadable { path: PathBuf, detail: String },
}
