//! CLI binary for pagelens.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `AssistantConfig` / `Request` and prints results.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pagelens::{
    rasterize_pdf, Answer, Assistant, AssistantConfig, Attachment, BackendConfig,
    ConversationHistory, Envelope, Fragment, PageLensError, RasterConfig, RenderScale, Request,
};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Plain text question
  pagelens ask --prompt "Explain SSE framing in one paragraph"

  # Ask about an image
  pagelens ask --file photo.jpg --prompt "What breed is this dog?"

  # Summarise a PDF (default prompt), streaming the answer
  pagelens ask --file report.pdf --stream

  # Ask a text model about a PDF's text layer instead of its page images
  pagelens ask --file report.pdf --model-type text --prompt "Who signed it?"

  # JSON envelope, keep the rendered pages
  pagelens ask --file report.pdf --json --output-dir pages/

  # Interactive session about one document
  pagelens chat --file report.pdf

  # Rasterise only (no API key needed)
  pagelens render report.pdf --output-dir pages/

ENVIRONMENT VARIABLES:
  PAGELENS_BASE_URL       Chat-completion endpoint, e.g. https://api.example.com/v1
  PAGELENS_API_KEY        Bearer token for the endpoint
  PAGELENS_MODEL          Vision model ID
  PAGELENS_TIMEOUT_SECS   Per-request timeout (default 30)
  PAGELENS_TEXT_MODEL     Text model ID (defaults to the vision model)
  PAGELENS_TEXT_BASE_URL  Text endpoint (defaults to PAGELENS_BASE_URL)
  PAGELENS_TEXT_API_KEY   Text endpoint key (defaults to PAGELENS_API_KEY)
  PDFIUM_LIB_PATH         Path to libpdfium or the directory containing it
"#;

/// Ask questions about text, images, and PDFs through a chat-completion API.
#[derive(Parser, Debug)]
#[command(
    name = "pagelens",
    version,
    about = "Ask questions about text, images, and PDFs through a chat-completion API",
    long_about = "Send a question, optionally with an image or PDF, to any OpenAI-compatible \
chat-completion endpoint. PDFs are rasterised page by page and sent as images to a vision model, \
or read through their text layer for a text model.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PAGELENS_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PAGELENS_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Answer one request.
    Ask(AskArgs),
    /// Interactive multi-turn session; answers stream to stdout.
    Chat(ChatArgs),
    /// Rasterise a PDF to PNG files without calling a backend.
    Render(RenderArgs),
}

#[derive(Args, Debug)]
struct AskArgs {
    /// Image (.png .jpg .jpeg .webp) or PDF to attach.
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// The question. Image and PDF requests fall back to a default prompt.
    #[arg(short, long)]
    prompt: Option<String>,

    /// Model hint: text, image, pdf, vision.
    #[arg(long, env = "PAGELENS_MODEL_TYPE")]
    model_type: Option<String>,

    /// Print the answer as it streams in.
    #[arg(long)]
    stream: bool,

    /// Print the JSON envelope instead of the plain answer.
    #[arg(long)]
    json: bool,

    #[command(flatten)]
    raster: RasterArgs,

    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Args, Debug)]
struct ChatArgs {
    /// Image or PDF to attach to the first turn.
    #[arg(short, long)]
    file: Option<PathBuf>,

    #[command(flatten)]
    raster: RasterArgs,

    #[command(flatten)]
    backend: BackendArgs,
}

#[derive(Args, Debug)]
struct RenderArgs {
    /// PDF to rasterise.
    input: PathBuf,

    #[command(flatten)]
    raster: RasterArgs,
}

#[derive(Args, Debug)]
struct RasterArgs {
    /// Also write rendered pages to this directory as <name>_page<N>.png.
    #[arg(long, env = "PAGELENS_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Scale each page so its longest edge is this many pixels.
    #[arg(long, env = "PAGELENS_LONGEST_EDGE", conflicts_with = "fixed_scale",
          value_parser = clap::value_parser!(u32).range(64..=8192))]
    longest_edge: Option<u32>,

    /// Render at a fixed magnification instead (e.g. 2.0).
    #[arg(long, env = "PAGELENS_FIXED_SCALE")]
    fixed_scale: Option<f32>,
}

impl RasterArgs {
    fn to_config(&self) -> Result<RasterConfig> {
        let scale = match (self.longest_edge, self.fixed_scale) {
            (_, Some(f)) if !(f > 0.0 && f.is_finite()) => {
                anyhow::bail!("--fixed-scale must be a positive number (got {})", f)
            }
            (_, Some(f)) => RenderScale::Fixed(f),
            (Some(px), None) => RenderScale::LongestEdge(px),
            (None, None) => RenderScale::default(),
        };
        Ok(RasterConfig {
            scale,
            output_dir: self.output_dir.clone(),
        })
    }
}

#[derive(Args, Debug)]
struct BackendArgs {
    /// Chat-completion endpoint base URL.
    #[arg(long, env = "PAGELENS_BASE_URL")]
    base_url: Option<String>,

    /// API key for the endpoint.
    #[arg(long, env = "PAGELENS_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Vision model ID.
    #[arg(long, env = "PAGELENS_MODEL")]
    model: Option<String>,

    /// Text model ID (defaults to --model).
    #[arg(long, env = "PAGELENS_TEXT_MODEL")]
    text_model: Option<String>,

    /// Text endpoint base URL (defaults to --base-url).
    #[arg(long, env = "PAGELENS_TEXT_BASE_URL")]
    text_base_url: Option<String>,

    /// Text endpoint API key (defaults to --api-key).
    #[arg(long, env = "PAGELENS_TEXT_API_KEY", hide_env_values = true)]
    text_api_key: Option<String>,

    /// Per-request timeout in seconds.
    #[arg(long, env = "PAGELENS_TIMEOUT_SECS", default_value_t = 30)]
    timeout: u64,

    /// Max completion tokens.
    #[arg(long, env = "PAGELENS_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: u32,

    /// Sampling temperature.
    #[arg(long, env = "PAGELENS_TEMPERATURE", default_value_t = 0.7)]
    temperature: f32,
}

impl BackendArgs {
    fn backend(
        &self,
        base_url: Option<&str>,
        api_key: Option<&str>,
        model: Option<&str>,
    ) -> Result<BackendConfig> {
        let mut builder = BackendConfig::builder()
            .timeout_secs(self.timeout)
            .max_tokens(self.max_tokens)
            .temperature(self.temperature);
        if let Some(url) = base_url {
            builder = builder.base_url(url);
        }
        if let Some(key) = api_key {
            builder = builder.api_key(key);
        }
        if let Some(model) = model {
            builder = builder.model(model);
        }
        builder.build().context(
            "Invalid backend configuration (see `pagelens --help` for the PAGELENS_* variables)",
        )
    }

    fn to_config(&self, raster: RasterConfig) -> Result<AssistantConfig> {
        let vision = self.backend(
            self.base_url.as_deref(),
            self.api_key.as_deref(),
            self.model.as_deref(),
        )?;

        let text = if self.text_model.is_some()
            || self.text_base_url.is_some()
            || self.text_api_key.is_some()
        {
            Some(self.backend(
                self.text_base_url.as_deref().or(self.base_url.as_deref()),
                self.text_api_key.as_deref().or(self.api_key.as_deref()),
                self.text_model.as_deref().or(self.model.as_deref()),
            )?)
        } else {
            None
        };

        let mut config = AssistantConfig::new(vision);
        config.text = text;
        config.raster = raster;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Ask(args) => run_ask(args, cli.quiet).await,
        Command::Chat(args) => run_chat(args).await,
        Command::Render(args) => run_render(args, cli.quiet).await,
    }
}

/// Build the request for `--file` / `--prompt` / `--model-type`.
fn build_request(
    file: Option<&PathBuf>,
    prompt: Option<String>,
    model_type: Option<String>,
) -> Result<Request> {
    let mut request = Request::new();
    request.prompt = prompt;
    request.model_type = model_type;
    if let Some(path) = file {
        let attachment = Attachment::from_path(path)
            .with_context(|| format!("Cannot attach {}", path.display()))?;
        request = request.attachment(attachment);
    }
    Ok(request)
}

/// Spinner shown on stderr while a buffered answer is pending.
fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}  {elapsed:.dim}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
    );
    bar.set_prefix("pagelens");
    bar.set_message(message.to_string());
    bar.enable_steady_tick(Duration::from_millis(80));
    bar
}

async fn run_ask(args: AskArgs, quiet: bool) -> Result<()> {
    let config = args.backend.to_config(args.raster.to_config()?)?;
    let assistant = Assistant::new(config).context("Failed to initialise backend client")?;
    let request = build_request(args.file.as_ref(), args.prompt, args.model_type)?;

    let result: Result<Answer, PageLensError> = if args.stream && !args.json {
        let mut stdout = io::stdout();
        let mut in_reasoning = false;
        let result = assistant
            .ask_streaming(request, None, |fragment| match fragment {
                Fragment::Reasoning(t) => {
                    if !quiet {
                        if !in_reasoning {
                            eprint!("{} ", dim("thinking:"));
                            in_reasoning = true;
                        }
                        eprint!("{}", dim(t));
                    }
                }
                Fragment::Content(t) => {
                    if in_reasoning {
                        eprintln!();
                        in_reasoning = false;
                    }
                    print!("{t}");
                    stdout.flush().ok();
                }
            })
            .await;
        if result.is_ok() {
            println!();
        }
        result
    } else {
        let bar = (!quiet && !args.json).then(|| spinner("Waiting for answer…"));
        let result = assistant.ask(request).await;
        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
        if let (Ok(answer), false) = (&result, args.json) {
            println!("{}", answer.answer);
        }
        result
    };

    if args.json {
        let envelope = Envelope::from_result(&result);
        println!(
            "{}",
            serde_json::to_string_pretty(&envelope).context("Failed to serialise envelope")?
        );
    }

    match result {
        Ok(answer) => {
            if !quiet && !args.json {
                let pages = if answer.pages > 0 {
                    format!("  {} pages", answer.pages)
                } else {
                    String::new()
                };
                eprintln!(
                    "{} {}  {}{}  {}",
                    green("✔"),
                    answer.mode,
                    dim(&answer.model),
                    pages,
                    dim(&format!("{}ms", answer.duration_ms)),
                );
            }
            Ok(())
        }
        Err(e) => {
            if !args.json {
                eprintln!("{} {}", red("✘"), e);
            }
            std::process::exit(exit_code(&e));
        }
    }
}

async fn run_chat(args: ChatArgs) -> Result<()> {
    let config = args.backend.to_config(args.raster.to_config()?)?;
    let assistant = Assistant::new(config).context("Failed to initialise backend client")?;
    let mut history = ConversationHistory::new();
    let mut pending_file = args.file;

    eprintln!(
        "{} {}",
        cyan("◆"),
        bold("pagelens chat: type a question, empty line or Ctrl-D to quit")
    );
    if let Some(path) = &pending_file {
        eprintln!("  {} {}", dim("attached:"), path.display());
    }

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        eprint!("{} ", bold(">"));
        io::stderr().flush().ok();

        let Some(line) = lines.next() else { break };
        let line = line.context("Failed to read from stdin")?;
        let line = line.trim();
        if line.is_empty() {
            break;
        }

        // The attachment rides on the first turn only; if that turn fails
        // it is offered again with the next one.
        let file = pending_file.clone();
        let request = build_request(file.as_ref(), Some(line.to_string()), None)?;

        let mut stdout = io::stdout();
        let result = assistant
            .ask_streaming(request, Some(&mut history), |fragment| {
                if let Fragment::Content(t) = fragment {
                    print!("{t}");
                    stdout.flush().ok();
                }
            })
            .await;

        match result {
            Ok(_) => {
                println!();
                pending_file = None;
            }
            Err(e) => eprintln!("\n{} {}", red("✘"), e),
        }
    }

    eprintln!("{} {} turns", green("✔"), history.len() / 2);
    Ok(())
}

async fn run_render(args: RenderArgs, quiet: bool) -> Result<()> {
    let mut raster = args.raster.to_config()?;
    if raster.output_dir.is_none() {
        raster.output_dir = Some(PathBuf::from("."));
    }

    let doc = rasterize_pdf(&args.input, &raster)
        .await
        .with_context(|| format!("Failed to render {}", args.input.display()))?;

    for path in &doc.written {
        println!("{}", path.display());
    }
    if !quiet {
        eprintln!(
            "{} {}/{} pages written",
            if doc.written.len() == doc.page_count {
                green("✔")
            } else {
                cyan("⚠")
            },
            bold(&doc.written.len().to_string()),
            doc.page_count,
        );
    }
    Ok(())
}

/// Process exit code per error category.
fn exit_code(err: &PageLensError) -> i32 {
    match err.status_hint() {
        400..=499 => 2,
        504 => 4,
        503 => 5,
        502 => 6,
        _ => 1,
    }
}
