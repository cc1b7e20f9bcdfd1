//! Fixed-window sample statistics.

use std::fmt;

/// Summary of one full window of samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowSummary {
    pub min: f64,
    pub p20: f64,
    pub mean: f64,
    pub p80: f64,
    pub max: f64,
}

impl fmt::Display for WindowSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "min={:.1} p20={:.1} mean={:.1} p80={:.1} max={:.1}",
            self.min, self.p20, self.mean, self.p80, self.max
        )
    }
}

/// Collects samples and summarizes every `window` of them.
#[derive(Debug, Clone)]
pub struct WindowStats {
    window: usize,
    buffer: Vec<i16>,
}

impl WindowStats {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            buffer: Vec::with_capacity(window.max(1)),
        }
    }

    /// Samples waiting for the current window to fill.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Add samples; returns a summary for each window completed by them.
    pub fn push(&mut self, mut samples: &[i16]) -> Vec<WindowSummary> {
        let mut done = Vec::new();
        while !samples.is_empty() {
            let take = (self.window - self.buffer.len()).min(samples.len());
            self.buffer.extend_from_slice(&samples[..take]);
            samples = &samples[take..];
            if self.buffer.len() == self.window {
                done.push(summarize(&mut self.buffer));
                self.buffer.clear();
            }
        }
        done
    }
}

/// Percentile with linear interpolation between closest ranks.
fn percentile(sorted: &[i16], q: f64) -> f64 {
    let rank = q * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    f64::from(sorted[lo]) + (f64::from(sorted[hi]) - f64::from(sorted[lo])) * frac
}

fn summarize(samples: &mut [i16]) -> WindowSummary {
    samples.sort_unstable();
    let sum: i64 = samples.iter().map(|&s| i64::from(s)).sum();
    WindowSummary {
        min: f64::from(samples[0]),
        p20: percentile(samples, 0.2),
        mean: sum as f64 / samples.len() as f64,
        p80: percentile(samples, 0.8),
        max: f64::from(samples[samples.len() - 1]),
    }
}
