//! CLI binary for edgequake-pdf2schema.
//!
//! `pdf2schema serve` starts the upload form; `pdf2schema run` processes one
//! PDF from the terminal.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use edgequake_pdf2schema::server::{serve, AppState};
use edgequake_pdf2schema::{
    process_file, write_schema, Credential, ExtractionConfig, ExtractionProgressCallback,
    ProgressCallback, SchemaSource, Stage,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, Write};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One spinner, relabelled per stage; a log line per finished stage.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]),
        );
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl ExtractionProgressCallback for CliProgressCallback {
    fn on_stage_start(&self, stage: Stage) {
        self.bar.set_prefix(stage.to_string());
        self.bar.set_message("…");
    }

    fn on_stage_complete(&self, stage: Stage, detail: &str) {
        self.bar
            .println(format!("  {} {:<20} {}", green("✓"), stage, dim(detail)));
        if stage == Stage::SchemaSynthesis {
            self.bar.finish_and_clear();
        }
    }

    fn on_stage_error(&self, stage: Stage, error: &str) {
        // Rendering failures are reported but the run goes on.
        let mark = if stage == Stage::Render {
            yellow("⚠")
        } else {
            red("✗")
        };
        self.bar.println(format!("  {} {:<20} {}", mark, stage, error));
        if stage != Stage::Render {
            self.bar.finish_and_clear();
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Start the upload form on http://127.0.0.1:8501
  pdf2schema serve

  # Process one document from the terminal
  pdf2schema run fund-facts.pdf -o schema.json

  # Build the schema from the page text instead of the diagram
  pdf2schema run --schema-source document fund-facts.pdf

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          Key used by `run` (the form asks for it instead)
  PDF2SCHEMA_MODEL        Override model ID
  PDF2SCHEMA_WORK_DIR     Root of per-request workspaces
  PDFIUM_LIB_PATH         Path to an existing libpdfium
  RUST_LOG                Tracing filter, e.g. edgequake_pdf2schema=debug
"#;

/// Turn PDFs into an entity diagram and a JSON schema using an LLM.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2schema",
    version,
    about = "Turn PDFs into an entity diagram and a JSON schema using an LLM",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2SCHEMA_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2SCHEMA_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the upload form.
    Serve(ServeArgs),
    /// Process one PDF file or URL.
    Run(RunArgs),
}

/// Settings shared by both commands.
#[derive(Args, Debug)]
struct CommonArgs {
    /// LLM model ID.
    #[arg(long, env = "PDF2SCHEMA_MODEL", default_value = edgequake_pdf2schema::config::DEFAULT_MODEL)]
    model: String,

    /// LLM provider. Only `openai` takes the key from the request.
    #[arg(long, env = "PDF2SCHEMA_PROVIDER", default_value = "openai")]
    provider: String,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "PDF2SCHEMA_TEMPERATURE", default_value_t = 0.0)]
    temperature: f32,

    /// Max output tokens per model call.
    #[arg(long, env = "PDF2SCHEMA_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// Root directory for per-request workspaces.
    #[arg(long, env = "PDF2SCHEMA_WORK_DIR", default_value = "./digraph")]
    work_dir: PathBuf,

    /// What the schema prompt is built from.
    #[arg(long, env = "PDF2SCHEMA_SCHEMA_SOURCE", value_enum, default_value = "diagram")]
    schema_source: SchemaSourceArg,

    /// Text file replacing the diagram prompt (must contain {content}).
    #[arg(long, env = "PDF2SCHEMA_DIAGRAM_PROMPT")]
    diagram_prompt: Option<PathBuf>,

    /// Text file replacing the schema prompt (must contain {content}).
    #[arg(long, env = "PDF2SCHEMA_SCHEMA_PROMPT")]
    schema_prompt: Option<PathBuf>,

    /// Explicit pdfium shared library.
    #[arg(long, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ServeArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Address to listen on.
    #[arg(long, env = "PDF2SCHEMA_BIND", default_value = "127.0.0.1:8501")]
    bind: SocketAddr,

    /// Largest accepted upload in MiB.
    #[arg(long, env = "PDF2SCHEMA_MAX_UPLOAD_MB", default_value_t = 32)]
    max_upload_mb: usize,

    /// Leave each request's workspace on disk after the page is served.
    #[arg(long, env = "PDF2SCHEMA_KEEP_WORKSPACES")]
    keep_workspaces: bool,
}

#[derive(Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    common: CommonArgs,

    /// Local PDF file path or HTTP/HTTPS URL.
    input: String,

    /// API key for the model provider.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Write the schema to this file instead of stdout.
    #[arg(short, long, env = "PDF2SCHEMA_OUTPUT")]
    output: Option<PathBuf>,

    /// Print the whole result (diagram, schema, stats) as JSON.
    #[arg(long, env = "PDF2SCHEMA_JSON")]
    json: bool,

    /// Delete the staged PDF after text extraction, and the whole workspace
    /// if the run fails.
    #[arg(long, env = "PDF2SCHEMA_DISCARD_UPLOADS")]
    discard_uploads: bool,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2SCHEMA_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable the progress spinner.
    #[arg(long, env = "PDF2SCHEMA_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum SchemaSourceArg {
    Diagram,
    Document,
}

impl From<SchemaSourceArg> for SchemaSource {
    fn from(v: SchemaSourceArg) -> Self {
        match v {
            SchemaSourceArg::Diagram => SchemaSource::Diagram,
            SchemaSourceArg::Document => SchemaSource::Document,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The spinner replaces INFO logs for `run`; `serve` always logs.
    let show_progress = match &cli.command {
        Command::Run(args) => !cli.quiet && !args.no_progress && !args.json,
        Command::Serve(_) => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    match cli.command {
        Command::Serve(args) => {
            let config = build_config(&args.common, None, 120, args.keep_workspaces).await?;
            let state = AppState::new(config, args.max_upload_mb);
            serve(args.bind, state)
                .await
                .with_context(|| format!("Server on {} stopped", args.bind))?;
        }
        Command::Run(args) => run(args, show_progress, cli.quiet).await?,
    }

    Ok(())
}

async fn run(args: RunArgs, show_progress: bool, quiet: bool) -> Result<()> {
    let credential = Credential::new(args.api_key.as_deref().unwrap_or_default())
        .context("Set OPENAI_API_KEY or pass --api-key")?;

    let progress: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn ExtractionProgressCallback>)
    } else {
        None
    };
    let config = build_config(
        &args.common,
        progress,
        args.download_timeout,
        !args.discard_uploads,
    )
    .await?;

    let output = process_file(&args.input, &credential, &config)
        .await
        .context("Extraction failed")?;

    if args.json {
        let json = serde_json::to_string_pretty(&output).context("Failed to serialise output")?;
        println!("{json}");
    } else if let Some(ref path) = args.output {
        write_schema(&output, path)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?;
    } else {
        let mut handle = io::stdout().lock();
        handle
            .write_all(output.schema.as_bytes())
            .context("Failed to write to stdout")?;
        if !output.schema.ends_with('\n') {
            handle
                .write_all(b"\n")
                .context("Failed to write to stdout")?;
        }
    }

    if !quiet && !args.json {
        match (&output.image_path, &output.render_error) {
            (Some(p), _) => eprintln!("{} diagram  {}", green("✔"), p.display()),
            (None, Some(e)) => eprintln!("{} diagram not rendered: {}", yellow("⚠"), e),
            (None, None) => {}
        }
        eprintln!(
            "   {} tokens in  /  {} tokens out  ·  {}ms total",
            dim(&output.stats.total_input_tokens().to_string()),
            dim(&output.stats.total_output_tokens().to_string()),
            output.stats.total_duration_ms,
        );
    }

    Ok(())
}

/// Map CLI args to `ExtractionConfig`.
async fn build_config(
    common: &CommonArgs,
    progress: Option<ProgressCallback>,
    download_timeout: u64,
    keep_workspaces: bool,
) -> Result<ExtractionConfig> {
    let mut builder = ExtractionConfig::builder()
        .model(common.model.clone())
        .provider_name(common.provider.clone())
        .temperature(common.temperature)
        .max_tokens(common.max_tokens)
        .work_dir(common.work_dir.clone())
        .keep_workspaces(keep_workspaces)
        .schema_source(common.schema_source.into())
        .download_timeout_secs(download_timeout);

    if let Some(ref path) = common.diagram_prompt {
        builder = builder.diagram_prompt(read_prompt(path).await?);
    }
    if let Some(ref path) = common.schema_prompt {
        builder = builder.schema_prompt(read_prompt(path).await?);
    }
    if let Some(ref path) = common.pdfium_lib {
        builder = builder.pdfium_lib_path(path.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn read_prompt(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read prompt from {:?}", path))
}
