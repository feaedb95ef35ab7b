//! Streaming heart-rate analysis CLI.
//!
//! Subcommands:
//! - `validate`: check an options document without creating a session
//! - `replay`: stream a recorded signal through one session
//! - `synth`: drive several concurrent sessions with a synthetic pulse

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use hrv_stream::engine::pulse_wave;
use hrv_stream::{validate, AnalyzerOptions, Handle, SessionManager, WindowedEngine};
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "hrv-stream", version, about = "Streaming heart-rate analysis sessions")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate an options document
    Validate(ValidateArgs),
    /// Stream a recorded signal through a session, printing each result
    Replay(ReplayArgs),
    /// Run concurrent sessions over a synthetic pulse signal
    Synth(SynthArgs),
}

#[derive(Args)]
struct ValidateArgs {
    /// Options document (JSON)
    #[arg(long)]
    options: PathBuf,
    /// Override the sample rate
    #[arg(long)]
    fs: Option<f64>,
}

#[derive(Args)]
struct ReplayArgs {
    /// Samples separated by whitespace, commas or newlines
    #[arg(long)]
    input: PathBuf,
    /// Options document (JSON); defaults apply when omitted
    #[arg(long)]
    options: Option<PathBuf>,
    /// Override the sample rate
    #[arg(long)]
    fs: Option<f64>,
    /// Samples per push
    #[arg(long, default_value_t = 100)]
    chunk: usize,
}

#[derive(Args)]
struct SynthArgs {
    /// Number of concurrent sessions
    #[arg(long, default_value_t = 4)]
    sessions: usize,
    /// Seconds of signal per session
    #[arg(long, default_value_t = 30)]
    seconds: usize,
    /// Pulse rate of the first session; later sessions add 5 bpm each
    #[arg(long, default_value_t = 60.0)]
    bpm: f64,
    /// Sample rate
    #[arg(long, default_value_t = 100.0)]
    fs: f64,
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout carries results.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("hrv_stream=info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Validate(args) => run_validate(args),
        Command::Replay(args) => block_on(run_replay(args)),
        Command::Synth(args) => block_on(run_synth(args)),
    }
}

fn block_on<F: std::future::Future<Output = anyhow::Result<()>>>(fut: F) -> anyhow::Result<()> {
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create tokio runtime")?;
    rt.block_on(fut)
}

fn load_options(path: Option<&Path>, fs: Option<f64>) -> anyhow::Result<AnalyzerOptions> {
    let mut opts = match path {
        Some(p) => AnalyzerOptions::from_json_file(p)
            .with_context(|| format!("loading options from {}", p.display()))?,
        None => AnalyzerOptions::default(),
    };
    if let Some(fs) = fs {
        opts.fs = fs;
    }
    Ok(opts)
}

fn run_validate(args: ValidateArgs) -> anyhow::Result<()> {
    let opts = load_options(Some(args.options.as_path()), args.fs)?;
    match validate(&opts) {
        Ok(()) => {
            println!("ok");
            Ok(())
        }
        Err(v) => anyhow::bail!("{v}"),
    }
}

fn parse_samples(text: &str) -> anyhow::Result<Vec<f64>> {
    let mut samples = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        for token in line
            .split(|c: char| c == ',' || c.is_whitespace())
            .filter(|t| !t.is_empty())
        {
            let value: f64 = token
                .parse()
                .with_context(|| format!("line {}: invalid sample {token:?}", lineno + 1))?;
            samples.push(value);
        }
    }
    Ok(samples)
}

async fn run_replay(args: ReplayArgs) -> anyhow::Result<()> {
    let opts = load_options(args.options.as_deref(), args.fs)?;
    let text = std::fs::read_to_string(&args.input)
        .with_context(|| format!("reading {}", args.input.display()))?;
    let samples = parse_samples(&text)?;

    let manager = SessionManager::new(WindowedEngine);
    let chunk = args.chunk.clamp(1, manager.config().max_samples_per_push);
    replay(&manager, opts, &samples, chunk).await
}

/// Stream `samples` through a fresh session in `chunk`-sized pushes. The
/// session is destroyed whether or not streaming succeeds.
async fn replay(
    manager: &SessionManager,
    opts: AnalyzerOptions,
    samples: &[f64],
    chunk: usize,
) -> anyhow::Result<()> {
    let fs = opts.fs;
    let handle = manager.create(opts).await?;
    info!(handle = %handle, samples = samples.len(), chunk, "Replaying signal");

    let streamed = stream_chunks(manager, handle, samples, chunk, fs).await;
    manager.destroy(handle).await;
    streamed
}

async fn stream_chunks(
    manager: &SessionManager,
    handle: Handle,
    samples: &[f64],
    chunk: usize,
    fs: f64,
) -> anyhow::Result<()> {
    let chunk = chunk.max(1);
    for (i, batch) in samples.chunks(chunk).enumerate() {
        let t0 = (i * chunk) as f64 / fs;
        manager.push(handle, batch.to_vec(), t0).await?;
        if let Some(metrics) = manager.poll(handle).await? {
            let t = (i * chunk + batch.len()) as f64 / fs;
            println!("{}", json!({ "t": t, "metrics": metrics }));
        }
    }
    Ok(())
}

async fn feed_session(
    manager: Arc<SessionManager>,
    handle: Handle,
    fs: f64,
    bpm: f64,
    seconds: usize,
) -> anyhow::Result<Option<f64>> {
    let per_second = fs.round() as usize;
    let mut last_bpm = None;
    for s in 0..seconds {
        let batch = pulse_wave(fs, bpm, s * per_second, per_second);
        manager.push(handle, batch, s as f64).await?;
        if let Some(m) = manager.poll(handle).await? {
            last_bpm = Some(m.bpm);
        }
    }
    Ok(last_bpm)
}

async fn wait_for_shutdown_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await?;
    Ok(())
}

async fn run_synth(args: SynthArgs) -> anyhow::Result<()> {
    let manager = Arc::new(SessionManager::new(WindowedEngine));
    let opts = AnalyzerOptions::builder(args.fs).window_sec(20.0).build();

    let mut tasks = Vec::with_capacity(args.sessions);
    for i in 0..args.sessions {
        let handle = manager.create(opts.clone()).await?;
        let bpm = args.bpm + 5.0 * i as f64;
        let task = tokio::spawn(feed_session(manager.clone(), handle, args.fs, bpm, args.seconds));
        tasks.push((handle, bpm, task));
    }
    info!(sessions = tasks.len(), seconds = args.seconds, "Synthetic run started");

    let mut results = Vec::with_capacity(tasks.len());
    let collect = async {
        for (handle, bpm, task) in tasks {
            let measured = match task.await {
                Ok(Ok(m)) => m,
                Ok(Err(e)) => {
                    warn!(handle = %handle, error = %e, "Session failed");
                    None
                }
                Err(e) => {
                    warn!(handle = %handle, error = %e, "Session task panicked");
                    None
                }
            };
            results.push(json!({ "handle": handle, "targetBpm": bpm, "bpm": measured }));
        }
    };
    tokio::select! {
        _ = collect => {},
        res = wait_for_shutdown_signal() => {
            res?;
            warn!("Interrupted, shutting down sessions");
        }
    }

    let report = json!({
        "sessions": results,
        "stats": manager.stats(),
    });
    manager.shutdown_all().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
