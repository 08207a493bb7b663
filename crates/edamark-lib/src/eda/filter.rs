use anyhow::Result;
use realfft::RealFftPlanner;

/// Zero-phase low-pass with a Butterworth magnitude response, applied in the
/// frequency domain. The gain is |H(f)|^2, the response of running the
/// filter forward and backward. The signal is mirrored before the transform so
/// the circular wrap does not join its two ends.
pub fn butterworth_lowpass(data: &[f64], fs: f64, cutoff_hz: f64, order: u32) -> Result<Vec<f64>> {
    let n = data.len();
    if n < 2 || cutoff_hz <= 0.0 || fs <= 0.0 {
        return Ok(data.to_vec());
    }
    let len = 2 * n;
    let mut planner = RealFftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(len);
    let inverse = planner.plan_fft_inverse(len);

    let mut buffer: Vec<f64> = data.iter().chain(data.iter().rev()).copied().collect();
    let mut spectrum = forward.make_output_vec();
    forward.process(&mut buffer, &mut spectrum)?;

    let exponent = 2.0 * order.max(1) as f64;
    for (k, bin) in spectrum.iter_mut().enumerate() {
        let freq = k as f64 * fs / len as f64;
        *bin *= 1.0 / (1.0 + (freq / cutoff_hz).powf(exponent));
    }
    spectrum[0].im = 0.0;
    if let Some(last) = spectrum.last_mut() {
        last.im = 0.0;
    }

    let mut output = inverse.make_output_vec();
    inverse.process(&mut spectrum, &mut output)?;
    let scale = len as f64;
    Ok(output[..n].iter().map(|v| v / scale).collect())
}

/// Centered moving average; the window shrinks at the edges.
pub fn moving_average(data: &[f64], win: usize) -> Vec<f64> {
    if data.is_empty() {
        return Vec::new();
    }
    if win <= 1 {
        return data.to_vec();
    }
    let half = win / 2;
    let mut prefix = Vec::with_capacity(data.len() + 1);
    let mut acc = 0.0;
    prefix.push(acc);
    for &sample in data {
        acc += sample;
        prefix.push(acc);
    }
    (0..data.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + win - half).min(data.len());
            (prefix[end] - prefix[start]) / (end - start) as f64
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    #[test]
    fn lowpass_keeps_slow_and_removes_fast() {
        let fs = 64.0;
        let data: Vec<f64> = (0..640)
            .map(|i| {
                let t = i as f64 / fs;
                (2.0 * PI * 0.5 * t).sin() + 0.5 * (2.0 * PI * 20.0 * t).sin()
            })
            .collect();
        let filtered = butterworth_lowpass(&data, fs, 5.0, 4).unwrap();
        assert_eq!(filtered.len(), data.len());
        for i in 64..576 {
            let t = i as f64 / fs;
            let slow = (2.0 * PI * 0.5 * t).sin();
            assert!((filtered[i] - slow).abs() < 0.05, "sample {}", i);
        }
    }

    #[test]
    fn lowpass_passes_constant() {
        let filtered = butterworth_lowpass(&[3.0; 100], 10.0, 0.05, 2).unwrap();
        assert!(filtered.iter().all(|v| (v - 3.0).abs() < 1e-9));
    }

    #[test]
    fn moving_average_is_centered() {
        let out = moving_average(&[0.0, 0.0, 3.0, 0.0, 0.0], 3);
        assert_eq!(out, vec![0.0, 1.0, 1.0, 1.0, 0.0]);
    }
}
