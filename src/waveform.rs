//! Waveform probe
//!
//! Renders an interpolator the way a waveform view draws it: `width` points
//! at `t = i / width`, with running display statistics.

use crate::interpolator::SignalInterpolator;

/// Statistics over the rendered points, not the underlying samples
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DisplayStats {
    pub avg: f64,
    pub max: f64,
    pub min: f64,
    pub rms: f64,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Waveform {
    pub points: Vec<(f64, f64)>,
    pub stats: DisplayStats,
}

#[derive(Clone, Copy, Debug)]
pub struct WaveformProbe {
    width: usize,
}

impl WaveformProbe {
    pub fn new(width: usize) -> Self {
        Self { width }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn render(&self, interpolator: &SignalInterpolator) -> Waveform {
        if self.width == 0 {
            return Waveform::default();
        }

        let width = self.width as f64;
        let mut points = Vec::with_capacity(self.width);
        let mut stats = DisplayStats {
            avg: 0.0,
            max: f64::NEG_INFINITY,
            min: f64::INFINITY,
            rms: 0.0,
        };

        for i in 0..self.width {
            let t = i as f64 / width;
            let v = interpolator.interpolate(t);
            points.push((t, v));

            stats.avg += v / width;
            stats.max = stats.max.max(v);
            stats.min = stats.min.min(v);
            stats.rms += v * v / width;
        }
        stats.rms = stats.rms.sqrt();

        Waveform { points, stats }
    }
}
