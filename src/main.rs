//! surface-player: play a media file onto a surface and report the outcome
//!
//! Usage: surface-player <media_file> [--snapshots DIR] [--every N] [--settings FILE] [--json]
//!
//! Without `--snapshots` frames are presented to an offscreen memory surface,
//! which is useful to check that a file decodes end to end.

use std::env;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context};

use surface_player::telemetry::init_logging;
use surface_player::{
    FfmpegBackend, ImageSequenceSurface, MemorySurface, PlaybackPipeline, PlaybackReport,
    PlayerSettings,
};

struct Args {
    media: PathBuf,
    snapshots: Option<PathBuf>,
    every: Option<u32>,
    settings: Option<PathBuf>,
    json: bool,
}

fn usage(program: &str) -> String {
    format!(
        "Usage: {} <media_file> [--snapshots DIR] [--every N] [--settings FILE] [--json]",
        program
    )
}

fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let program = args.first().map(String::as_str).unwrap_or("surface-player");
    let mut media = None;
    let mut snapshots = None;
    let mut every = None;
    let mut settings = None;
    let mut json = false;

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--snapshots" => {
                let dir = iter.next().context("--snapshots needs a directory")?;
                snapshots = Some(PathBuf::from(dir));
            }
            "--every" => {
                let value = iter.next().context("--every needs a frame count")?;
                let count = value
                    .parse::<u32>()
                    .with_context(|| format!("invalid frame count: {}", value))?;
                every = Some(count);
            }
            "--settings" => {
                settings = Some(PathBuf::from(iter.next().context("--settings needs a file")?));
            }
            "--json" => json = true,
            "-h" | "--help" => bail!(usage(program)),
            other if other.starts_with("--") => {
                bail!("unknown option {}\n{}", other, usage(program))
            }
            other if media.is_none() => media = Some(PathBuf::from(other)),
            other => bail!("unexpected argument {}\n{}", other, usage(program)),
        }
    }

    let Some(media) = media else {
        bail!(usage(program));
    };
    Ok(Args {
        media,
        snapshots,
        every,
        settings,
        json,
    })
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<PlayerSettings> {
    match path {
        Some(path) => PlayerSettings::load_from_file(path)
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None => Ok(PlayerSettings::load()),
    }
}

fn print_report(report: &PlaybackReport) {
    println!("\n=== Playback ===");
    if let Some(stream) = &report.stream {
        println!(
            "Stream {}: {} {}x{}",
            stream.index, stream.codec, stream.width, stream.height
        );
    }
    let stats = &report.stats;
    println!(
        "Packets: {} read, {} skipped, {} sent",
        stats.packets_read, stats.packets_skipped, stats.packets_sent
    );
    println!(
        "Frames: {} decoded, {} presented, {} dropped",
        stats.frames_decoded, stats.frames_presented, stats.frames_dropped
    );
    println!(
        "Present latency: avg {:.3} ms, p95 {:.3} ms, max {:.3} ms ({:.1} fps)",
        stats.present_latency.avg_ms,
        stats.present_latency.p95_ms,
        stats.present_latency.max_ms,
        stats.fps
    );
    match (&report.result, report.failed_stage) {
        (Ok(()), _) => println!("Result: completed"),
        (Err(e), Some(stage)) => println!("Result: aborted in {:?}: {}", stage, e),
        (Err(e), None) => println!("Result: aborted: {}", e),
    }
}

fn run() -> anyhow::Result<bool> {
    let raw_args: Vec<String> = env::args().collect();
    let args = parse_args(&raw_args)?;

    let mut settings = load_settings(args.settings.as_deref())?;
    if let Some(every) = args.every {
        settings.snapshot_every = every;
        settings.clamp();
    }

    let _log_guard = init_logging(&settings.log_config())
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {}", e))?;

    let backend = FfmpegBackend::new(settings.scaling)?;
    let mut pipeline = PlaybackPipeline::with_settings(backend, &settings);

    let report = match &args.snapshots {
        Some(dir) => {
            let mut surface = ImageSequenceSurface::new(dir, settings.snapshot_every);
            let report = pipeline.play(&args.media, &mut surface);
            tracing::info!(
                written = surface.written().len(),
                dir = %dir.display(),
                "Snapshots saved"
            );
            report
        }
        None => pipeline.play(&args.media, &mut MemorySurface::new()),
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(report.is_complete())
}

fn main() -> ExitCode {
    match run() {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(2),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
