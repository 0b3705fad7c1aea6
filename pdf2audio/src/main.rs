//! pdf2audio - Convert PDF documents to chaptered M4B audiobooks using Piper TTS

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf2audio::config::{Pdf2AudioConfig, clamp_speed};
use pdf2audio::export::FfmpegMuxer;
use pdf2audio::extract::{BackendKind, Extractor};
use pdf2audio::speech::piper::{PiperEngine, voice_id};
use pdf2audio::{Pipeline, RunRequest};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser, Debug)]
#[command(name = "pdf2audio")]
#[command(about = "Convert PDF documents to chaptered M4B audiobooks", long_about = None)]
#[command(version)]
struct Args {
    /// Path to the PDF file
    input: Option<PathBuf>,

    /// Output file path (default: audio/<pdf-name>_<voice>.m4b)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Piper voice model (.onnx)
    #[arg(long)]
    voice: Option<PathBuf>,

    /// Speech speed multiplier (0.5-2.0)
    #[arg(long)]
    speed: Option<f32>,

    /// Extraction backend for the first pass
    #[arg(long, value_enum)]
    layout_engine: Option<BackendKind>,

    /// Synthesize a single randomly chosen page
    #[arg(long, default_value_t = false)]
    test_random_page: bool,

    /// Write the full diagnostics report as JSON
    #[arg(long)]
    report: Option<PathBuf>,

    /// Book title (default: PDF metadata, then file name)
    #[arg(long)]
    title: Option<String>,

    /// Book author (default: PDF metadata, then "Unknown")
    #[arg(long)]
    author: Option<String>,

    /// Maximum concurrent Piper processes
    #[arg(long)]
    concurrency: Option<usize>,

    /// Enable debug output
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// Hide the progress bar
    #[arg(short, long, default_value_t = false)]
    quiet: bool,

    /// Subcommands
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Show current configuration
    Show,
    /// Set default voice model
    SetVoice {
        /// Path to a Piper voice model (.onnx)
        path: PathBuf,
    },
    /// Set default speech speed
    SetSpeed {
        /// Value (0.5-2.0)
        value: f32,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    if let Some(Commands::Config { action }) = &args.command {
        return handle_config_command(action);
    }

    let input = args.input.clone().ok_or_else(|| {
        anyhow::anyhow!("PDF file path is required. Run 'pdf2audio --help' for usage.")
    })?;

    if !input.exists() {
        anyhow::bail!("PDF file not found: {}", input.display());
    }

    let mut config = Pdf2AudioConfig::load().context("Failed to load configuration")?;
    apply_overrides(&mut config, &args);

    let voice = voice_id(&config.synthesis.voice_model);
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_path(&input, &voice, args.test_random_page));

    if args.debug {
        eprintln!("PDF: {}", input.display());
        eprintln!("Output: {}", output.display());
        eprintln!("Voice: {} ({})", voice, config.synthesis.voice_model.display());
        eprintln!("Speed: {}", config.synthesis.speed);
        eprintln!("Layout engine: {}", config.extraction.backend);
    }

    let engine = PiperEngine::new(&config.synthesis.piper_path, &config.synthesis.voice_model)
        .context("Failed to load voice model")?;
    let muxer = FfmpegMuxer::new(&config.export);

    let request = RunRequest {
        backend: config.extraction.backend,
        test_random_page: args.test_random_page,
        title: args.title.clone(),
        author: args.author.clone(),
        ..RunRequest::new(&input, &output)
    };

    let pipeline = Pipeline::new(
        config,
        Arc::new(Extractor::for_pdf()),
        Arc::new(engine),
        Arc::new(muxer),
    );

    eprintln!("Converting: {}", input.display());

    let pb = progress_bar(args.quiet)?;

    let outcome = pipeline
        .run(&request, |progress| {
            pb.set_length(progress.total as u64);
            pb.set_position(progress.completed as u64);
            if progress.failed > 0 {
                pb.set_message(format!(
                    "{:.0}s audio, {} failed",
                    progress.audio_secs, progress.failed
                ));
            } else {
                pb.set_message(format!("{:.0}s audio", progress.audio_secs));
            }
        })
        .await;
    pb.finish_and_clear();

    let diagnostics = outcome.diagnostics;

    if let Some(page) = diagnostics.test_page {
        eprintln!("Test mode: page {}", page + 1);
    }

    if let Some(summary) = diagnostics.render_summary() {
        eprintln!("\n{}", summary);
    }

    if let Some(report_path) = &args.report {
        let json = serde_json::to_string_pretty(&diagnostics)
            .context("Failed to serialize diagnostics report")?;
        std::fs::write(report_path, json)
            .with_context(|| format!("Failed to write report to {}", report_path.display()))?;
        eprintln!("Report: {}", report_path.display());
    }

    let book = outcome.result.context("Conversion failed")?;
    let size_mb = book.size_bytes as f64 / (1024.0 * 1024.0);

    eprintln!(
        "Output: {} ({} chapters, {}, {:.1} MB)",
        book.path.display(),
        book.chapter_count,
        pdf2audio::diagnostics::format_timestamp(book.duration_ms),
        size_mb
    );

    Ok(())
}

fn progress_bar(quiet: bool) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }

    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// CLI flags take precedence over the config file.
fn apply_overrides(config: &mut Pdf2AudioConfig, args: &Args) {
    if let Some(voice) = &args.voice {
        config.synthesis.voice_model = voice.clone();
    }
    if let Some(speed) = args.speed {
        config.synthesis.speed = speed;
    }
    config.synthesis.speed = clamp_speed(config.synthesis.speed);
    if let Some(concurrency) = args.concurrency {
        config.synthesis.concurrency = concurrency.max(1);
    }
    if let Some(backend) = args.layout_engine {
        config.extraction.backend = backend;
    }
}

/// `audio/<stem>_<voice>[_test].m4b`
fn default_output_path(input: &Path, voice: &str, test_mode: bool) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "audiobook".to_string());
    let suffix = if test_mode { "_test" } else { "" };
    PathBuf::from("audio").join(format!("{}_{}{}.m4b", stem, voice, suffix))
}

fn handle_config_command(action: &ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = Pdf2AudioConfig::load()?;
            println!("Configuration file: {:?}", Pdf2AudioConfig::config_path()?);
            println!();
            println!("voice_model = \"{}\"", config.synthesis.voice_model.display());
            println!("speed = {}", config.synthesis.speed);
            println!("piper = \"{}\"", config.synthesis.piper_path.display());
            println!("concurrency = {}", config.synthesis.concurrency);
            println!("layout_engine = {}", config.extraction.backend);
            println!("max_chunk_chars = {}", config.chunking.max_chunk_chars);
        }
        ConfigAction::SetVoice { path } => {
            let mut config = Pdf2AudioConfig::load()?;
            config.synthesis.voice_model = path.clone();
            config.save()?;
            println!("Default voice model set to: {}", path.display());
        }
        ConfigAction::SetSpeed { value } => {
            let mut config = Pdf2AudioConfig::load()?;
            config.synthesis.speed = clamp_speed(*value);
            config.save()?;
            println!("Default speed set to: {}", config.synthesis.speed);
        }
    }
    Ok(())
}
