//! Batch drivers tying loaders, alignment, decomposition and export together.

use anyhow::{anyhow, Context, Result};
use log::{info, warn};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;

use crate::align::{align, AlignmentReport};
use crate::cache::{CacheStatus, FeatureCache};
use crate::config::Config;
use crate::eda::{decompose, extract_scr, fill_missing, Decomposition};
use crate::error::{ConfigError, LoadError};
use crate::io::eventlog::read_named_logs;
use crate::io::export::{write_decomposed_csv, write_marked_csv};
use crate::io::shimmer::read_recording;
use crate::session::{RoutingTable, SessionKey};
use crate::signal::{EventLog, MarkerChannel, SampleSeries, TimeSeries};

/// A recording matched to its session route.
#[derive(Debug, Clone, Serialize)]
pub struct SessionJob {
    pub file: PathBuf,
    pub key: SessionKey,
    pub sampling_rate: u32,
    pub logs: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct AlignedSession {
    pub job: SessionJob,
    pub series: SampleSeries,
    pub markers: MarkerChannel,
    pub report: AlignmentReport,
    pub export: Option<PathBuf>,
}

/// Per-session result; one failing session does not stop the others.
pub struct SessionRun {
    pub job: SessionJob,
    pub result: Result<AlignedSession>,
}

fn list_recordings(cfg: &Config) -> Result<Vec<PathBuf>> {
    let dir = &cfg.sensor_dir;
    if !dir.exists() {
        return Err(LoadError::NotFound(dir.clone()).into());
    }
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let path = entry?.path();
        let accepted = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| cfg.recording.accepts(n))
            .unwrap_or(false);
        if accepted && path.is_file() {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

/// Route every recording in the sensor directory. Files no route claims are
/// skipped with a warning; two files resolving to the same session key are
/// an error, since both would export to the same place.
pub fn discover_sessions(cfg: &Config, routing: &RoutingTable) -> Result<Vec<SessionJob>> {
    let mut jobs: Vec<SessionJob> = Vec::new();
    for file in list_recordings(cfg)? {
        let name = file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let Some((key, route)) = routing.resolve(&name) else {
            warn!("{}: no session route matches; skipping", name);
            continue;
        };
        if let Some(prev) = jobs.iter().find(|job| job.key == key) {
            return Err(ConfigError::DuplicateRecording {
                key: key.to_string(),
                first: prev.file.clone(),
                second: file,
            }
            .into());
        }
        let sampling_rate = route.rate_for(&key.placement, cfg.default_sampling_rate);
        jobs.push(SessionJob {
            file,
            key,
            sampling_rate,
            logs: route.logs.clone(),
        });
    }
    Ok(jobs)
}

/// Load, align and optionally export one session.
pub fn align_session(cfg: &Config, job: &SessionJob) -> Result<AlignedSession> {
    let series = read_recording(&job.file, &cfg.recording, job.sampling_rate)?;
    let logs = read_named_logs(&cfg.log_dir, &job.logs, &cfg.log)?;
    let refs: Vec<&EventLog> = logs.iter().collect();
    let events = EventLog::concat(&refs);
    let alignment = align(&series, &events, job.sampling_rate, &cfg.align)
        .with_context(|| format!("aligning {}", job.key))?;
    let report = alignment.report;
    info!(
        "{}: {} samples at {} Hz, {}/{} events marked",
        job.key,
        series.len(),
        job.sampling_rate,
        report.marked,
        report.total_events
    );
    let export = if cfg.export {
        let path = cfg.export_dir.join(format!("{}.csv", job.key));
        write_marked_csv(&path, &series, &alignment.markers)?;
        Some(path)
    } else {
        None
    };
    Ok(AlignedSession {
        job: job.clone(),
        series,
        markers: alignment.markers,
        report,
        export,
    })
}

/// Align every routed recording, one scoped thread per session.
pub fn run_alignment(cfg: &Config, routing: &RoutingTable) -> Result<Vec<SessionRun>> {
    let jobs = discover_sessions(cfg, routing)?;
    let runs = thread::scope(|scope| {
        let handles: Vec<_> = jobs
            .iter()
            .map(|job| scope.spawn(move || align_session(cfg, job)))
            .collect();
        handles
            .into_iter()
            .zip(&jobs)
            .map(|(handle, job)| SessionRun {
                job: job.clone(),
                result: handle
                    .join()
                    .unwrap_or_else(|_| Err(anyhow!("alignment of {} panicked", job.key))),
            })
            .collect::<Vec<_>>()
    });
    Ok(runs)
}

fn conductance_of(cfg: &Config, series: &SampleSeries, file: &Path) -> Result<TimeSeries> {
    let mut ts = series
        .channel_series(&cfg.recording.conductance_column)
        .ok_or_else(|| LoadError::MissingColumn {
            path: file.to_path_buf(),
            column: cfg.recording.conductance_column.clone(),
        })?;
    let filled = fill_missing(&mut ts.data);
    if filled > 0 {
        warn!("{}: filled {} missing conductance samples", file.display(), filled);
    }
    Ok(ts)
}

fn rate_for_file(cfg: &Config, routing: &RoutingTable, file: &Path) -> u32 {
    file.file_name()
        .and_then(|n| n.to_str())
        .and_then(|n| routing.resolve(n))
        .map(|(key, route)| route.rate_for(&key.placement, cfg.default_sampling_rate))
        .unwrap_or(cfg.default_sampling_rate)
}

#[derive(Debug, Clone)]
pub struct DecomposedRecording {
    pub file: PathBuf,
    pub fs: f64,
    pub decomposition: Decomposition,
    pub export: Option<PathBuf>,
}

/// Standardize and split the conductance channel of `file`, or of every
/// recording in the sensor directory when no file is given.
pub fn run_decomposition(
    cfg: &Config,
    routing: &RoutingTable,
    file: Option<&Path>,
) -> Result<Vec<DecomposedRecording>> {
    let files = match file {
        Some(path) => vec![path.to_path_buf()],
        None => list_recordings(cfg)?,
    };
    let mut out = Vec::with_capacity(files.len());
    for file in files {
        let rate = rate_for_file(cfg, routing, &file);
        let series = read_recording(&file, &cfg.recording, rate)?;
        let ts = conductance_of(cfg, &series, &file)?;
        let decomposition = decompose(&ts, &cfg.decompose)
            .with_context(|| format!("decomposing {}", file.display()))?;
        let export = if cfg.export {
            let stem = file
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            let path = cfg.export_dir.join(format!("{}_DECOMPOSED.csv", stem));
            write_decomposed_csv(&path, &decomposition)?;
            Some(path)
        } else {
            None
        };
        info!("{}: decomposed {} samples", file.display(), ts.len());
        out.push(DecomposedRecording {
            file,
            fs: ts.fs,
            decomposition,
            export,
        });
    }
    Ok(out)
}

/// Load the SCR feature cache, computing it from every routed recording when
/// it does not exist yet.
pub fn run_features(cfg: &Config, routing: &RoutingTable) -> Result<(FeatureCache, CacheStatus)> {
    FeatureCache::load_or_compute(&cfg.feature_cache, || {
        let mut cache = FeatureCache::default();
        for job in discover_sessions(cfg, routing)? {
            let series = read_recording(&job.file, &cfg.recording, job.sampling_rate)?;
            let ts = conductance_of(cfg, &series, &job.file)?;
            let features = extract_scr(&ts, &cfg.scr)
                .with_context(|| format!("extracting SCRs for {}", job.key))?;
            cache.entries.insert(job.key, features);
        }
        Ok(cache)
    })
}
