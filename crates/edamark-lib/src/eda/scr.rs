use anyhow::{ensure, Result};
use serde::{Deserialize, Serialize};

use super::filter::{butterworth_lowpass, moving_average};
use crate::signal::TimeSeries;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrConfig {
    /// Low-pass cutoff applied before smoothing (Hz).
    pub lowpass_hz: f64,
    pub lowpass_order: u32,
    /// Moving-average smoothing window (seconds).
    pub smoothing_s: f64,
    /// Minimum onset-to-peak rise for a response to count.
    pub min_amplitude: f64,
}

impl Default for ScrConfig {
    fn default() -> Self {
        Self {
            lowpass_hz: 5.0,
            lowpass_order: 4,
            smoothing_s: 0.75,
            min_amplitude: 0.01,
        }
    }
}

/// Detected skin-conductance responses; the three vectors are parallel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScrFeatures {
    pub fs: f64,
    pub onsets: Vec<usize>,
    pub peaks: Vec<usize>,
    pub amplitudes: Vec<f64>,
}

impl ScrFeatures {
    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    /// Peak times in seconds from the first sample.
    pub fn peak_times(&self) -> Vec<f64> {
        self.peaks.iter().map(|&p| p as f64 / self.fs).collect()
    }
}

/// Filter, smooth, then pair each local minimum with the following local
/// maximum.
pub fn extract_scr(ts: &TimeSeries, cfg: &ScrConfig) -> Result<ScrFeatures> {
    ensure!(ts.fs > 0.0, "sampling rate must be positive");
    ensure!(
        ts.data.iter().all(|v| v.is_finite()),
        "signal contains missing or non-finite samples"
    );
    let filtered = if cfg.lowpass_hz > 0.0 && cfg.lowpass_hz < ts.fs * 0.5 {
        butterworth_lowpass(&ts.data, ts.fs, cfg.lowpass_hz, cfg.lowpass_order)?
    } else {
        ts.data.clone()
    };
    let win = ((cfg.smoothing_s * ts.fs).round() as usize).max(1);
    let smoothed = moving_average(&filtered, win);

    let mut onsets = Vec::new();
    let mut peaks = Vec::new();
    let mut amplitudes = Vec::new();
    if smoothed.len() < 3 {
        return Ok(ScrFeatures {
            fs: ts.fs,
            onsets,
            peaks,
            amplitudes,
        });
    }

    let mut onset = (smoothed[1] > smoothed[0]).then_some(0);
    for i in 1..smoothed.len() - 1 {
        let rise_in = smoothed[i] - smoothed[i - 1];
        let rise_out = smoothed[i + 1] - smoothed[i];
        if rise_in <= 0.0 && rise_out > 0.0 {
            onset = Some(i);
        } else if rise_in > 0.0 && rise_out <= 0.0 {
            if let Some(start) = onset.take() {
                let amplitude = smoothed[i] - smoothed[start];
                if amplitude >= cfg.min_amplitude {
                    onsets.push(start);
                    peaks.push(i);
                    amplitudes.push(amplitude);
                }
            }
        }
    }
    Ok(ScrFeatures {
        fs: ts.fs,
        onsets,
        peaks,
        amplitudes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bumps(fs: f64, seconds: f64, centers: &[f64], height: f64) -> TimeSeries {
        let n = (seconds * fs) as usize;
        let data = (0..n)
            .map(|i| {
                let t = i as f64 / fs;
                2.0 + centers
                    .iter()
                    .map(|c| height * (-(t - c).powi(2) / 2.0).exp())
                    .sum::<f64>()
            })
            .collect();
        TimeSeries { fs, data }
    }

    #[test]
    fn finds_each_response() {
        let ts = bumps(32.0, 40.0, &[10.0, 25.0], 0.5);
        let features = extract_scr(&ts, &ScrConfig::default()).unwrap();
        assert_eq!(features.len(), 2);
        assert!((features.peaks[0] as i64 - 320).abs() <= 3);
        assert!((features.peaks[1] as i64 - 800).abs() <= 3);
        assert!(features.onsets[0] < features.peaks[0]);
        assert!(features.amplitudes.iter().all(|a| *a > 0.4));
        let times = features.peak_times();
        assert!((times[0] - 10.0).abs() < 0.1);
    }

    #[test]
    fn ignores_small_ripples() {
        let ts = bumps(32.0, 40.0, &[10.0], 0.005);
        let features = extract_scr(&ts, &ScrConfig::default()).unwrap();
        assert!(features.is_empty());
    }

    #[test]
    fn flat_signal_has_no_responses() {
        let ts = TimeSeries {
            fs: 128.0,
            data: vec![1.0; 512],
        };
        assert!(extract_scr(&ts, &ScrConfig::default()).unwrap().is_empty());
    }
}
