//! Skin-conductance processing: standardization, tonic/phasic decomposition
//! and skin-conductance-response (SCR) detection. Independent of alignment.

pub mod filter;
pub mod scr;

use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use crate::signal::TimeSeries;
use filter::butterworth_lowpass;

pub use scr::{extract_scr, ScrConfig, ScrFeatures};

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct DecomposeConfig {
    /// Boundary between tonic and phasic activity (Hz).
    pub cutoff_hz: f64,
    pub order: u32,
    /// Z-score the signal before splitting it.
    pub standardize: bool,
}

impl Default for DecomposeConfig {
    fn default() -> Self {
        Self {
            cutoff_hz: 0.05,
            order: 2,
            standardize: true,
        }
    }
}

/// Slow baseline and fast transient components; `tonic + phasic` reproduces
/// the (standardized) input.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Decomposition {
    pub tonic: Vec<f64>,
    pub phasic: Vec<f64>,
}

/// Z-score using the sample standard deviation. A constant signal maps to zeros.
pub fn standardize(data: &[f64]) -> Vec<f64> {
    if data.len() < 2 {
        return vec![0.0; data.len()];
    }
    let n = data.len() as f64;
    let mean = data.iter().sum::<f64>() / n;
    let var = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    let sd = var.sqrt();
    if sd == 0.0 || !sd.is_finite() {
        return vec![0.0; data.len()];
    }
    data.iter().map(|x| (x - mean) / sd).collect()
}

/// Replace non-finite samples with the previous finite one (the first finite
/// value for a leading gap). Returns the number of samples replaced.
pub fn fill_missing(data: &mut [f64]) -> usize {
    let Some(first) = data.iter().copied().find(|v| v.is_finite()) else {
        return 0;
    };
    let mut last = first;
    let mut filled = 0;
    for value in data.iter_mut() {
        if value.is_finite() {
            last = *value;
        } else {
            *value = last;
            filled += 1;
        }
    }
    filled
}

pub fn decompose(ts: &TimeSeries, cfg: &DecomposeConfig) -> Result<Decomposition> {
    ensure!(ts.fs > 0.0, "sampling rate must be positive");
    ensure!(
        ts.data.iter().all(|v| v.is_finite()),
        "signal contains missing or non-finite samples"
    );
    let signal = if cfg.standardize {
        standardize(&ts.data)
    } else {
        ts.data.clone()
    };
    let tonic = butterworth_lowpass(&signal, ts.fs, cfg.cutoff_hz, cfg.order)?;
    let phasic = signal.iter().zip(&tonic).map(|(x, t)| x - t).collect();
    Ok(Decomposition { tonic, phasic })
}
