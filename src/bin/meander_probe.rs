//! meander-probe - Evaluate a project file and inspect its signals

use clap::{Parser, Subcommand};
use crossbeam::channel::{unbounded, RecvTimeoutError};
use meander::{
    EvaluatorConfig, Project, SignalId, SignalInterpolator, SignalsEvaluator, SnapshotAdapter,
    WaveformProbe,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meander-probe")]
#[command(about = "Sample and inspect Meander signal projects", long_about = None)]
struct Cli {
    /// Evaluator config file (default: <config dir>/meander/evaluator.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Seconds to wait for the first sampling pass
    #[arg(long, default_value = "10", global = true)]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print sampled and display statistics of every track
    Stats {
        /// Project file (.toml or .json)
        project: PathBuf,

        /// Display width used for the display statistics
        #[arg(short, long, default_value = "512")]
        width: usize,
    },

    /// Print `t value` lines of one track
    Sample {
        /// Project file (.toml or .json)
        project: PathBuf,

        /// Track id or name
        #[arg(short, long)]
        track: String,

        /// Number of evenly spaced points
        #[arg(short, long, default_value = "16")]
        points: usize,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = EvaluatorConfig::load_or_default(cli.config.as_deref())?;

    let filter = match &config.log_filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::from_default_env(),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let timeout = Duration::from_secs(cli.timeout);

    match cli.command {
        Commands::Stats { project, width } => {
            let (project, evaluator) = evaluate(&project, config, timeout)?;
            let probe = WaveformProbe::new(width);

            for track in &project.tracks {
                let Some(interpolator) = evaluator.interpolator(&track.id) else {
                    println!("{} ({}): no interpolator", track.name, track.id);
                    continue;
                };
                let sampled = interpolator.stats();
                let display = probe.render(&interpolator).stats;

                println!("{} ({}) [{}]", track.name, track.id, track.signal.kind());
                println!(
                    "  sampled: max={:.6} min={:.6} rms={:.6}",
                    sampled.max, sampled.min, sampled.rms
                );
                println!(
                    "  display: avg={:.6} max={:.6} min={:.6} rms={:.6}",
                    display.avg, display.max, display.min, display.rms
                );
            }
        }

        Commands::Sample {
            project,
            track,
            points,
        } => {
            let (project, evaluator) = evaluate(&project, config, timeout)?;
            let id = project
                .track(&track)
                .map(|t| t.id)
                .ok_or_else(|| format!("no track named or identified by '{}'", track))?;
            let interpolator = evaluator
                .interpolator(&id)
                .ok_or_else(|| format!("track '{}' has no interpolator", track))?;

            print_points(&interpolator, points);
        }
    }

    Ok(())
}

/// Load `path`, attach it to an evaluator and wait for the first dispatch
fn evaluate(
    path: &Path,
    config: EvaluatorConfig,
    timeout: Duration,
) -> Result<(Project, SignalsEvaluator), Box<dyn std::error::Error>> {
    let project = Project::load(path)?;
    let snapshot = project.snapshot(config.default_samples_count);
    let evaluator = SignalsEvaluator::with_config(config);

    let (tx, rx) = unbounded::<SignalId>();
    let _subscriptions: Vec<_> = project
        .tracks
        .iter()
        .map(|track| {
            let tx = tx.clone();
            let id = track.id;
            evaluator.subscribe_signal_interpolator_updates(id, move |_| {
                let _ = tx.send(id);
            })
        })
        .collect();
    drop(tx);

    evaluator.attach(Arc::new(SnapshotAdapter::new(snapshot)));

    if !project.tracks.is_empty() {
        match rx.recv_timeout(timeout) {
            Ok(_) => {}
            Err(RecvTimeoutError::Timeout) => {
                return Err("timed out waiting for sampled signals (see log for errors)".into())
            }
            Err(RecvTimeoutError::Disconnected) => return Err("evaluator went away".into()),
        }
    }

    Ok((project, evaluator))
}

fn print_points(interpolator: &SignalInterpolator, points: usize) {
    let step = if points > 1 {
        1.0 / (points - 1) as f64
    } else {
        0.0
    };
    for i in 0..points {
        let t = i as f64 * step;
        println!("{:.6} {:.6}", t, interpolator.interpolate(t));
    }
}
