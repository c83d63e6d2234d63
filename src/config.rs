//! Configuration types for backends and rasterisation.
//!
//! Nothing about the remote endpoint is hardcoded: the endpoint URL, API key,
//! and model identifier always arrive through a [`BackendConfig`], and
//! [`BackendConfigBuilder::build`] refuses to produce one with a required
//! field missing. A misconfigured deployment therefore fails before the first
//! request is attempted instead of sending unauthenticated calls.

use crate::error::PageLensError;
use crate::prompts;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Default backend call timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default longest-edge size for rasterised PDF pages, in pixels.
pub const DEFAULT_LONGEST_EDGE: u32 = 1024;

/// Magnification used by [`RenderScale::Fixed`] when no target size is given.
pub const DEFAULT_FIXED_SCALE: f32 = 2.0;

/// Connection settings for one chat-completion endpoint.
///
/// Built via [`BackendConfig::builder()`] or [`BackendConfig::from_env`].
///
/// # Example
/// ```rust
/// use pagelens::BackendConfig;
///
/// let config = BackendConfig::builder()
///     .base_url("https://api.example.com/v1")
///     .api_key("sk-test")
///     .model("qwen2.5-vl-7b-instruct")
///     .timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.completions_url(), "https://api.example.com/v1/chat/completions");
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// Base URL of the OpenAI-compatible API, e.g. `https://host/v1`.
    /// `/chat/completions` is appended unless already present.
    pub base_url: String,

    /// Bearer token sent in the `Authorization` header.
    pub api_key: String,

    /// Model identifier sent in every request body.
    pub model: String,

    /// Whole-request timeout in seconds, including a streamed body. Default: 30.
    pub timeout_secs: u64,

    /// Maximum completion tokens. Default: 4096.
    pub max_tokens: u32,

    /// Sampling temperature. Default: 0.7.
    pub temperature: f32,

    /// Nucleus sampling. Default: 0.7.
    pub top_p: f32,
}

impl fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendConfig")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("model", &self.model)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_tokens", &self.max_tokens)
            .field("temperature", &self.temperature)
            .field("top_p", &self.top_p)
            .finish()
    }
}

impl BackendConfig {
    /// Create a new builder with every required field unset.
    pub fn builder() -> BackendConfigBuilder {
        BackendConfigBuilder {
            base_url: None,
            api_key: None,
            model: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_tokens: 4096,
            temperature: 0.7,
            top_p: 0.7,
        }
    }

    /// Read `<PREFIX>_BASE_URL`, `<PREFIX>_API_KEY`, `<PREFIX>_MODEL` and the
    /// optional `<PREFIX>_TIMEOUT_SECS`.
    ///
    /// Missing required variables yield [`PageLensError::Config`] naming the
    /// variable.
    pub fn from_env(prefix: &str) -> Result<Self, PageLensError> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Same as [`BackendConfig::from_env`] but with a caller-supplied lookup,
    /// which keeps tests independent of the process environment.
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self, PageLensError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |suffix: &str| -> Result<String, PageLensError> {
            let key = format!("{prefix}_{suffix}");
            match lookup(&key) {
                Some(v) if !v.trim().is_empty() => Ok(v.trim().to_string()),
                _ => Err(PageLensError::Config(format!("{key} is not set"))),
            }
        };

        let mut builder = Self::builder()
            .base_url(required("BASE_URL")?)
            .api_key(required("API_KEY")?)
            .model(required("MODEL")?);

        let timeout_key = format!("{prefix}_TIMEOUT_SECS");
        if let Some(raw) = lookup(&timeout_key) {
            let secs = raw.trim().parse::<u64>().map_err(|_| {
                PageLensError::Config(format!("{timeout_key} must be a whole number, got '{raw}'"))
            })?;
            builder = builder.timeout_secs(secs);
        }

        builder.build()
    }

    /// Full URL of the chat-completion endpoint.
    pub fn completions_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/chat/completions") {
            base.to_string()
        } else {
            format!("{base}/chat/completions")
        }
    }
}

/// Builder for [`BackendConfig`].
#[derive(Debug)]
pub struct BackendConfigBuilder {
    base_url: Option<String>,
    api_key: Option<String>,
    model: Option<String>,
    timeout_secs: u64,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
}

impl BackendConfigBuilder {
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = n;
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn top_p(mut self, p: f32) -> Self {
        self.top_p = p.clamp(0.0, 1.0);
        self
    }

    /// Build the configuration, validating that every required field is present.
    pub fn build(self) -> Result<BackendConfig, PageLensError> {
        fn present(field: &str, value: Option<String>) -> Result<String, PageLensError> {
            match value {
                Some(v) if !v.trim().is_empty() => Ok(v),
                _ => Err(PageLensError::Config(format!("{field} is required"))),
            }
        }

        let base_url = present("base_url", self.base_url)?;
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            return Err(PageLensError::Config(format!(
                "base_url must be an HTTP/HTTPS URL, got '{base_url}'"
            )));
        }
        if self.timeout_secs == 0 {
            return Err(PageLensError::Config("timeout_secs must be ≥ 1".into()));
        }

        Ok(BackendConfig {
            base_url,
            api_key: present("api_key", self.api_key)?,
            model: present("model", self.model)?,
            timeout_secs: self.timeout_secs,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
        })
    }
}

// ── Rasterisation ────────────────────────────────────────────────────────

/// How PDF pages are sized when rasterised.
///
/// | Variant | Scale factor |
/// |---------|--------------|
/// | `LongestEdge(px)` | `px / max(page_width, page_height)` |
/// | `Fixed(f)` | `f` regardless of page size |
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum RenderScale {
    /// Scale uniformly so the longest edge measures this many pixels.
    LongestEdge(u32),
    /// Fixed magnification of the page's point size.
    Fixed(f32),
}

impl Default for RenderScale {
    fn default() -> Self {
        RenderScale::LongestEdge(DEFAULT_LONGEST_EDGE)
    }
}

impl RenderScale {
    /// The uniform scale factor for a page of the given size in points.
    ///
    /// Degenerate pages (zero or negative size) fall back to the fixed
    /// default magnification.
    pub fn factor_for(&self, width: f32, height: f32) -> f32 {
        match *self {
            RenderScale::Fixed(f) => f,
            RenderScale::LongestEdge(px) => {
                let longest = width.max(height);
                if longest > 0.0 {
                    px as f32 / longest
                } else {
                    DEFAULT_FIXED_SCALE
                }
            }
        }
    }
}

/// Settings for turning PDF pages into images.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RasterConfig {
    /// Page sizing policy. Default: longest edge 1024 px.
    pub scale: RenderScale,

    /// When set, every rendered page is also written here as
    /// `<basename>_page<N>.png`.
    pub output_dir: Option<PathBuf>,
}

/// Prompts used when the caller supplies none.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultPrompts {
    pub image: String,
    pub pdf: String,
}

impl Default for DefaultPrompts {
    fn default() -> Self {
        Self {
            image: prompts::DEFAULT_IMAGE_PROMPT.to_string(),
            pdf: prompts::DEFAULT_PDF_PROMPT.to_string(),
        }
    }
}

/// Everything an [`crate::Assistant`] needs.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Backend for image and PDF content.
    pub vision: BackendConfig,

    /// Backend for plain-text prompts. Falls back to `vision` when `None`.
    pub text: Option<BackendConfig>,

    pub raster: RasterConfig,

    pub default_prompts: DefaultPrompts,
}

impl AssistantConfig {
    /// Configuration with only a vision backend and default settings.
    pub fn new(vision: BackendConfig) -> Self {
        Self {
            vision,
            text: None,
            raster: RasterConfig::default(),
            default_prompts: DefaultPrompts::default(),
        }
    }

    /// Read `PAGELENS_*` (vision backend, required) and `PAGELENS_TEXT_*`
    /// (text backend, optional).
    ///
    /// The text backend is used only when all three of its required
    /// variables are present; a partial set is a configuration error.
    pub fn from_env() -> Result<Self, PageLensError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, PageLensError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vision = BackendConfig::from_lookup("PAGELENS", &lookup)?;

        let text_vars = ["BASE_URL", "API_KEY", "MODEL"]
            .iter()
            .filter(|s| lookup(&format!("PAGELENS_TEXT_{s}")).is_some())
            .count();
        let text = match text_vars {
            0 => None,
            _ => Some(BackendConfig::from_lookup("PAGELENS_TEXT", &lookup)?),
        };

        Ok(Self {
            text,
            ..Self::new(vision)
        })
    }

    /// The backend used for text-mode requests.
    pub fn text_backend(&self) -> &BackendConfig {
        self.text.as_ref().unwrap_or(&self.vision)
    }
}
