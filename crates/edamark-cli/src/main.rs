mod render;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use edamark_lib::{
    config::Config,
    error::LoadError,
    pipeline::{discover_sessions, run_alignment, run_decomposition, run_features},
    plot::{figure_from_decomposition, figure_from_marked, PlotBackend},
    session::RoutingTable,
};
use env_logger::Env;
use log::{error, info};
use render::PngBackend;
use serde_json::json;
use std::{
    io::{self, BufRead, IsTerminal, Write},
    path::{Path, PathBuf},
};

const MAX_PLOT_POINTS: usize = 4096;

#[derive(Parser)]
#[command(
    name = "edamark",
    version,
    about = "Align logged events onto skin-conductance recordings"
)]
struct Cli {
    /// Logging verbosity (e.g., debug, info, warn)
    #[arg(long, default_value = "info", global = true)]
    log_level: String,

    /// TOML configuration file; relative paths in it resolve against its directory
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Clone, Default)]
struct DirOverrides {
    /// Directory holding sensor exports
    #[arg(long)]
    sensor_dir: Option<PathBuf>,
    /// Directory holding event logs
    #[arg(long)]
    log_dir: Option<PathBuf>,
    /// Directory receiving exported CSVs
    #[arg(long)]
    export_dir: Option<PathBuf>,
    /// Directory receiving figures
    #[arg(long)]
    fig_dir: Option<PathBuf>,
    /// Sampling rate for recordings without a routed rate
    #[arg(long)]
    sampling_rate: Option<u32>,
    /// Skip writing CSV exports
    #[arg(long)]
    no_export: bool,
    /// Render a PNG per recording
    #[arg(long)]
    plot: bool,
}

impl DirOverrides {
    fn apply(&self, mut cfg: Config) -> Config {
        if let Some(dir) = &self.sensor_dir {
            cfg.sensor_dir = dir.clone();
        }
        if let Some(dir) = &self.log_dir {
            cfg.log_dir = dir.clone();
        }
        if let Some(dir) = &self.export_dir {
            cfg.export_dir = dir.clone();
        }
        if let Some(dir) = &self.fig_dir {
            cfg.fig_dir = dir.clone();
        }
        if let Some(rate) = self.sampling_rate {
            cfg.default_sampling_rate = rate;
        }
        if self.no_export {
            cfg.export = false;
        }
        if self.plot {
            cfg.plot = true;
        }
        cfg
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Place event markers on every routed recording and export them
    Align {
        #[command(flatten)]
        dirs: DirOverrides,
    },
    /// Split conductance into tonic and phasic components
    Decompose {
        #[command(flatten)]
        dirs: DirOverrides,
        /// Decompose a single recording instead of the whole sensor directory
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Detect SCRs per session, reusing the feature cache when present
    Features {
        #[command(flatten)]
        dirs: DirOverrides,
        /// Feature cache location
        #[arg(long)]
        cache: Option<PathBuf>,
    },
    /// Show how recordings in the sensor directory are routed
    Routes {
        #[command(flatten)]
        dirs: DirOverrides,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(Env::default().default_filter_or(&cli.log_level)).init();

    let base = load_config(cli.config.as_deref())?;
    let routing = base.routing().context("building session routes")?;
    match cli.command {
        Commands::Align { dirs } => cmd_align(&dirs.apply(base), &routing)?,
        Commands::Decompose { dirs, input } => {
            cmd_decompose(&dirs.apply(base), &routing, input.as_deref())?
        }
        Commands::Features { dirs, cache } => {
            let mut cfg = dirs.apply(base);
            if let Some(path) = cache {
                cfg.feature_cache = path;
            }
            cmd_features(&cfg, &routing)?
        }
        Commands::Routes { dirs } => cmd_routes(&dirs.apply(base), &routing)?,
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let cfg = Config::load(path)?;
            let base = path.parent().unwrap_or_else(|| Path::new("."));
            info!("loaded configuration from {}", path.display());
            Ok(cfg.resolve_paths(base))
        }
        None => Ok(Config::default()),
    }
}

/// Return `path` if it exists. Otherwise, on an interactive terminal, ask
/// once for a replacement; a second miss is fatal.
fn locate_input(path: &Path) -> Result<PathBuf> {
    if path.exists() {
        return Ok(path.to_path_buf());
    }
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        return Err(LoadError::NotFound(path.to_path_buf()).into());
    }
    eprintln!("Could not locate file at path: {}", path.display());
    eprint!("Path to the recording >> ");
    io::stderr().flush()?;
    let mut answer = String::new();
    stdin.lock().read_line(&mut answer)?;
    let retry = PathBuf::from(answer.trim());
    if retry.exists() {
        Ok(retry)
    } else {
        Err(LoadError::NotFound(retry).into())
    }
}

fn cmd_align(cfg: &Config, routing: &RoutingTable) -> Result<()> {
    if routing.is_empty() {
        bail!("no [[session]] routes configured; nothing to align");
    }
    let runs = run_alignment(cfg, routing)?;
    let mut failed = 0;
    for run in &runs {
        match &run.result {
            Ok(session) => {
                let summary = json!({
                    "key": session.job.key,
                    "file": session.job.file,
                    "sampling_rate": session.job.sampling_rate,
                    "samples": session.series.len(),
                    "report": session.report,
                    "export": session.export,
                });
                println!("{}", serde_json::to_string(&summary)?);
                if cfg.plot {
                    let conductance = &cfg.recording.conductance_column;
                    if let Some(ts) = session.series.channel_series(conductance) {
                        let title = session.job.key.to_string();
                        let fig =
                            figure_from_marked(&title, &ts, &session.markers, MAX_PLOT_POINTS);
                        let path = cfg.fig_dir.join(format!("{}.png", title));
                        PngBackend::new(path).draw(&fig)?;
                    }
                }
            }
            Err(err) => {
                failed += 1;
                error!("{}: {:#}", run.job.key, err);
            }
        }
    }
    if failed > 0 {
        bail!("{} of {} sessions failed to align", failed, runs.len());
    }
    Ok(())
}

fn cmd_decompose(cfg: &Config, routing: &RoutingTable, input: Option<&Path>) -> Result<()> {
    let input = input.map(locate_input).transpose()?;
    let recordings = run_decomposition(cfg, routing, input.as_deref())?;
    for rec in &recordings {
        let summary = json!({
            "file": rec.file,
            "fs": rec.fs,
            "samples": rec.decomposition.tonic.len(),
            "export": rec.export,
        });
        println!("{}", serde_json::to_string(&summary)?);
        if cfg.plot {
            let stem = rec
                .file
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_else(|| "recording".into());
            let fig = figure_from_decomposition(&stem, &rec.decomposition, rec.fs, MAX_PLOT_POINTS);
            PngBackend::new(cfg.fig_dir.join(format!("{}.png", stem))).draw(&fig)?;
        }
    }
    Ok(())
}

fn cmd_features(cfg: &Config, routing: &RoutingTable) -> Result<()> {
    let (cache, status) = run_features(cfg, routing)?;
    for (key, features) in &cache.entries {
        info!("{}: {} detected", key, features.len());
        let summary = json!({
            "key": key,
            "status": status,
            "peaks": features.len(),
        });
        println!("{}", serde_json::to_string(&summary)?);
    }
    Ok(())
}

fn cmd_routes(cfg: &Config, routing: &RoutingTable) -> Result<()> {
    for job in discover_sessions(cfg, routing)? {
        println!("{}", serde_json::to_string(&job)?);
    }
    Ok(())
}
