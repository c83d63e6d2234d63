//! Pipeline stages for answering a request.
//!
//! Each submodule implements exactly one step, so each can be tested on its
//! own.
//!
//! ## Data Flow
//!
//! ```text
//! input ──▶ router ──▶ render ──▶ encode ──▶ llm ──▶ extract
//! (upload)  (mode)    (pdfium)   (base64)   (HTTP)  (answer)
//! ```
//!
//! 1. [`input`]   — stage an upload in a temp dir, classify it by extension
//! 2. [`router`]  — resolve the request mode and build the message
//! 3. [`render`]  — rasterise PDF pages; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 4. [`encode`]  — base64-wrap uploaded images and PNG-encode rendered pages
//! 5. [`llm`]     — send the chat-completion request; the only stage with
//!    network I/O
//! 6. [`extract`] — read `choices[0].message.content` from the response

pub mod encode;
pub mod extract;
pub mod input;
pub mod llm;
pub mod render;
pub mod router;
