//! Command-line client for an InsightGUIDE server.
//!
//! Drives the same client state the web UI uses: upload validation, the
//! preloaded example catalog, the API client and report saving.

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use insight_guide::client::api::ReportFormat;
use insight_guide::client::preload::PreloadSource;
use insight_guide::client::report::ReportState;
use insight_guide::client::upload::{CandidateFile, PDF_MIME};
use insight_guide::client::{
    InsightClient, LoadedPdf, PdfViewer, PreloadCatalog, ReportPane, UploadMode, UploadState,
};
use insight_guide::config::{Secret, DEFAULT_MAX_FILE_SIZE};
use insight_guide::markdown::format_file_size;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Generate AI reading guides for research papers.
#[derive(Parser, Debug)]
#[command(name = "insight", version, arg_required_else_help = true)]
struct Cli {
    /// Base URL of the InsightGUIDE API.
    #[arg(long, global = true, env = "INSIGHT_SERVER", default_value = "http://localhost:8000")]
    server: String,

    /// Basic-auth user, when the server requires it.
    #[arg(long, global = true, env = "BASIC_AUTH_USER")]
    user: Option<String>,

    #[arg(long, global = true, env = "BASIC_AUTH_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Reject larger files before uploading.
    #[arg(long, global = true, env = "INSIGHT_MAX_FILE_SIZE", default_value_t = DEFAULT_MAX_FILE_SIZE)]
    max_file_size: usize,

    /// Per-request deadline, e.g. `90s` or `5m`.
    #[arg(long, global = true, env = "INSIGHT_TIMEOUT", value_parser = humantime::parse_duration)]
    timeout: Option<Duration>,

    /// Preloaded example directory; defaults to the server's `/data/preload`.
    #[arg(long, global = true, env = "INSIGHT_EXAMPLES_DIR")]
    examples_dir: Option<PathBuf>,

    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate an insight report for a paper.
    Process {
        #[command(flatten)]
        input: Input,

        /// Save `<stem>_insights.md` into this directory instead of printing.
        #[arg(short, long)]
        out: Option<PathBuf>,

        /// Ask the server for raw markdown instead of JSON.
        #[arg(long)]
        markdown: bool,
    },
    /// Print the OCR markdown of a paper.
    Extract {
        #[command(flatten)]
        input: Input,

        /// Write the markdown to this file instead of stdout.
        #[arg(short, long)]
        out: Option<PathBuf>,
    },
    /// List the preloaded examples.
    Examples {
        /// Check that every listed MD and PDF file exists.
        #[arg(long)]
        verify: bool,
    },
    /// Check the server's health endpoint.
    Health,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct Input {
    /// Local PDF file.
    #[arg(long)]
    file: Option<PathBuf>,

    /// Remote PDF URL.
    #[arg(long)]
    url: Option<String>,

    /// Preloaded example id.
    #[arg(long)]
    example: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let filter = if cli.verbose { "insight_guide=debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let http = reqwest::Client::builder()
        .build()
        .context("Failed to build HTTP client")?;

    let mut client = InsightClient::new(http.clone(), &cli.server).with_max_file_size(cli.max_file_size);
    if let Some(user) = &cli.user {
        let password = cli
            .password
            .clone()
            .context("--password is required with --user")?;
        client = client.with_basic_auth(user, Secret::new(password));
    }
    if let Some(timeout) = cli.timeout {
        client = client.with_timeout(timeout);
    }

    match &cli.command {
        Command::Process {
            input,
            out,
            markdown,
        } => {
            let format = if *markdown {
                ReportFormat::Markdown
            } else {
                ReportFormat::Json
            };
            process(&cli, &http, client.with_format(format), input, out.as_deref()).await
        }
        Command::Extract { input, out } => extract(&cli, &http, &client, input, out.as_deref()).await,
        Command::Examples { verify } => examples(&cli, &http, &client, *verify).await,
        Command::Health => {
            let health = client.health().await.map_err(|e| anyhow::anyhow!(e.user_message()))?;
            println!("{} (version {})", health.status, health.version);
            Ok(())
        }
    }
}

async fn catalog(cli: &Cli, http: &reqwest::Client, client: &InsightClient) -> Result<PreloadCatalog> {
    let source = match &cli.examples_dir {
        Some(dir) => PreloadSource::Dir(dir.clone()),
        None => PreloadSource::http(http.clone(), format!("{}/data/preload", client.base_url())),
    };
    PreloadCatalog::load(source)
        .await
        .context("Failed to load preloaded examples")
}

/// Load the selected input into a fresh upload state.
async fn load_input(
    cli: &Cli,
    http: &reqwest::Client,
    client: &InsightClient,
    input: &Input,
) -> Result<UploadState> {
    let mut state = UploadState::new(cli.max_file_size);

    if let Some(path) = &input.file {
        let meta = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());
        let candidate = CandidateFile {
            mime: mime_for(&name).to_string(),
            name,
            size: usize::try_from(meta.len()).unwrap_or(usize::MAX),
        };
        state.accept_file(&candidate, || std::fs::read(path))?;
    } else if let Some(url) = &input.url {
        state.set_mode(UploadMode::Url)?;
        state.load_url(http, url).await?;
    } else if let Some(id) = &input.example {
        let example = catalog(cli, http, client).await?.fetch(id).await?;
        state.set_mode(UploadMode::Preload)?;
        state.load_example(example)?;
    }

    if let Some(pdf) = state.source().pdf() {
        let mut viewer = PdfViewer::new();
        let pages = viewer
            .load_pdf(&pdf.bytes)
            .map_or_else(|| "unknown".to_string(), |n| n.to_string());
        info!(
            "Loaded {} ({}, {} pages)",
            pdf.name,
            format_file_size(pdf.size() as u64),
            pages
        );
    }
    Ok(state)
}

fn mime_for(name: &str) -> &'static str {
    if name.to_ascii_lowercase().ends_with(".pdf") {
        PDF_MIME
    } else {
        "application/octet-stream"
    }
}

fn loaded_pdf(state: &UploadState) -> Result<&LoadedPdf> {
    state.source().pdf().context("No document loaded")
}

async fn process(
    cli: &Cli,
    http: &reqwest::Client,
    client: InsightClient,
    input: &Input,
    out: Option<&Path>,
) -> Result<()> {
    let state = load_input(cli, http, &client, input).await?;
    let mut pane = ReportPane::new(false);

    if let insight_guide::client::UploadSource::PreloadedExample(example) = state.source() {
        pane.show_example(example);
    } else {
        let pdf = loaded_pdf(&state)?;
        pane.start(&pdf.name)?;
        eprintln!("Analyzing {}...", pdf.name);
        pane.finish(client.process_pdf(pdf).await);
    }

    match pane.state() {
        ReportState::Ready(report) => match out {
            Some(dir) => {
                let path = pane.save_to(dir).await?;
                eprintln!("Saved {}", path.display());
            }
            None => {
                let mut stdout = io::stdout().lock();
                stdout.write_all(report.markdown().as_bytes())?;
                stdout.write_all(b"\n")?;
            }
        },
        ReportState::Failed(alert) => bail!("{}", alert.message),
        ReportState::Empty | ReportState::Processing { .. } => bail!("No report was produced"),
    }
    Ok(())
}

async fn extract(
    cli: &Cli,
    http: &reqwest::Client,
    client: &InsightClient,
    input: &Input,
    out: Option<&Path>,
) -> Result<()> {
    let state = load_input(cli, http, client, input).await?;
    let pdf = loaded_pdf(&state)?;
    let markdown = client
        .extract_text(pdf)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    match out {
        Some(path) => {
            tokio::fs::write(path, &markdown)
                .await
                .with_context(|| format!("Failed to write {}", path.display()))?;
            eprintln!("Saved {}", path.display());
        }
        None => println!("{}", markdown),
    }
    Ok(())
}

async fn examples(cli: &Cli, http: &reqwest::Client, client: &InsightClient, verify: bool) -> Result<()> {
    let catalog = catalog(cli, http, client).await?;
    for paper in catalog.papers() {
        println!("{:<24} {}", paper.id, paper.title);
    }

    if verify {
        let missing = catalog.verify().await;
        if !missing.is_empty() {
            for m in &missing {
                eprintln!("missing: {} ({})", m.path, m.paper_id);
            }
            bail!("{} preloaded file(s) missing", missing.len());
        }
        eprintln!("All {} examples verified", catalog.papers().len());
    }
    Ok(())
}
