//! Message and content-part types, and the content builder.
//!
//! A multimodal message is an ordered list of parts: exactly one leading text
//! part (the question) followed by zero or more image parts in page/upload
//! order. Backends read position as page order, so [`build_content`] never
//! reorders or deduplicates.
//!
//! ## Wire format
//!
//! Parts serialise to the OpenAI-compatible shape:
//!
//! ```text
//! {"type": "text", "text": "..."}
//! {"type": "image_url", "image_url": {"url": "data:image/png;base64,..."}}
//! ```

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A base64-encoded image with its MIME type.
///
/// `Display` renders the self-describing data URI
/// `data:<mime>;base64,<payload>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageData {
    pub mime_type: String,
    /// Standard-alphabet base64 payload, padded.
    pub data: String,
}

impl ImageData {
    pub fn new(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data: data.into(),
        }
    }

    /// Encode raw bytes under the given MIME type.
    pub fn from_bytes(bytes: &[u8], mime_type: impl Into<String>) -> Self {
        Self::new(STANDARD.encode(bytes), mime_type)
    }

    /// The data URI form, e.g. `data:image/png;base64,iVBOR...`.
    pub fn to_data_uri(&self) -> String {
        self.to_string()
    }

    /// Decode the payload back into raw bytes.
    pub fn decode(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }
}

impl fmt::Display for ImageData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "data:{};base64,{}", self.mime_type, self.data)
    }
}

/// One atomic unit of a multimodal message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentPart {
    Text(String),
    Image(ImageData),
}

impl ContentPart {
    pub fn is_text(&self) -> bool {
        matches!(self, ContentPart::Text(_))
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ContentPart::Text(t) => Some(t),
            ContentPart::Image(_) => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageData> {
        match self {
            ContentPart::Image(img) => Some(img),
            ContentPart::Text(_) => None,
        }
    }
}

#[derive(Serialize)]
struct WireUrl {
    url: String,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WirePart<'a> {
    Text { text: &'a str },
    ImageUrl { image_url: WireUrl },
}

impl Serialize for ContentPart {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let wire = match self {
            ContentPart::Text(text) => WirePart::Text { text },
            ContentPart::Image(img) => WirePart::ImageUrl {
                image_url: WireUrl {
                    url: img.to_data_uri(),
                },
            },
        };
        wire.serialize(serializer)
    }
}

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// Message body: a plain string for text turns, parts for multimodal turns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// One chat turn. Immutable once sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    /// A user turn carrying a raw prompt string.
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    /// A user turn carrying multimodal parts.
    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(parts),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Number of image parts in this message.
    pub fn image_count(&self) -> usize {
        match &self.content {
            MessageContent::Text(_) => 0,
            MessageContent::Parts(parts) => parts.iter().filter(|p| !p.is_text()).count(),
        }
    }
}

/// Assemble the parts of one multimodal message.
///
/// The result always starts with a text part equal to `prompt`, followed by
/// one image part per entry of `images`, in the order given.
pub fn build_content(
    prompt: &str,
    images: impl IntoIterator<Item = ImageData>,
) -> Vec<ContentPart> {
    let images = images.into_iter();
    let mut parts = Vec::with_capacity(1 + images.size_hint().0);
    parts.push(ContentPart::Text(prompt.to_string()));
    parts.extend(images.map(ContentPart::Image));
    parts
}

/// The prompt to use: `prompt` when it has non-whitespace content, otherwise
/// `fallback`.
pub fn effective_prompt<'a>(prompt: Option<&'a str>, fallback: &'a str) -> &'a str {
    match prompt {
        Some(p) if !p.trim().is_empty() => p,
        _ => fallback,
    }
}
