//! Continuous reads over sampled signals
//!
//! An interpolator is a cheap, immutable handle: it keeps its own `Arc` to
//! the swap-chain slot it was built from, so it stays valid (and returns the
//! same values) after newer generations are published. Consumers replace it
//! whenever the evaluator dispatches a fresh one.

use crate::error::{EvaluatorError, EvaluatorResult};
use crate::sampler::{Offsets, SamplingPlan};
use crate::signal_data::{SignalData, SignalId};
use crate::swap_chain::{SignalStats, SwapChainSlot};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{error, warn};

/// Read-only window onto one signal's values in a published slot
#[derive(Clone)]
pub struct SampleView {
    slot: Arc<SwapChainSlot>,
    start: usize,
    len: usize,
}

impl SampleView {
    /// View `len` values starting at `start`, clamped to the slot
    pub fn new(slot: Arc<SwapChainSlot>, start: usize, len: usize) -> Self {
        let total = slot.values().len();
        let start = start.min(total);
        let len = len.min(total - start);
        Self { slot, start, len }
    }

    pub fn values(&self) -> &[f64] {
        &self.slot.values()[self.start..self.start + self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

impl fmt::Debug for SampleView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleView")
            .field("start", &self.start)
            .field("len", &self.len)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub enum SignalInterpolator {
    /// Linear interpolation over directly sampled values
    View { stats: SignalStats, view: SampleView },
    /// `minuend(t) - subtrahend(t)`
    Difference {
        stats: SignalStats,
        minuend: Arc<SignalInterpolator>,
        subtrahend: Arc<SignalInterpolator>,
    },
    /// Fallback for dependencies that could not be resolved
    Constant(f64),
}

impl SignalInterpolator {
    /// Value at normalized position `t ∈ [0, 1]`
    ///
    /// Positions outside the range (and NaN) read the nearest edge sample.
    pub fn interpolate(&self, t: f64) -> f64 {
        match self {
            SignalInterpolator::View { view, .. } => interpolate_values(view.values(), t),
            SignalInterpolator::Difference {
                minuend,
                subtrahend,
                ..
            } => minuend.interpolate(t) - subtrahend.interpolate(t),
            SignalInterpolator::Constant(value) => *value,
        }
    }

    pub fn stats(&self) -> SignalStats {
        match self {
            SignalInterpolator::View { stats, .. }
            | SignalInterpolator::Difference { stats, .. } => *stats,
            SignalInterpolator::Constant(value) => SignalStats {
                max: *value,
                min: *value,
                rms: value.abs(),
            },
        }
    }

    pub fn zero() -> Self {
        SignalInterpolator::Constant(0.0)
    }

    /// Combine two interpolators, measuring the result over `samples_count` points
    pub fn difference(
        minuend: Arc<SignalInterpolator>,
        subtrahend: Arc<SignalInterpolator>,
        samples_count: usize,
    ) -> Self {
        let mut interpolator = SignalInterpolator::Difference {
            stats: SignalStats::default(),
            minuend,
            subtrahend,
        };
        let measured = measure(&interpolator, samples_count);
        if let SignalInterpolator::Difference { stats, .. } = &mut interpolator {
            *stats = measured;
        }
        interpolator
    }
}

fn interpolate_values(values: &[f64], t: f64) -> f64 {
    let (first, last) = match (values.first(), values.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return 0.0,
    };

    if t.is_nan() || t <= 0.0 {
        return first;
    }
    if t >= 1.0 {
        return last;
    }

    let x = t * (values.len() - 1) as f64;
    let lo = x.floor();
    let a = values[lo as usize];
    let b = values[x.ceil() as usize];
    a + (b - a) * (x - lo)
}

/// Max/min/RMS over `count` evenly spaced positions
fn measure(interpolator: &SignalInterpolator, count: usize) -> SignalStats {
    if count == 0 {
        return SignalStats::default();
    }

    let step = if count > 1 {
        1.0 / (count - 1) as f64
    } else {
        0.0
    };
    let mut stats = SignalStats {
        max: f64::NEG_INFINITY,
        min: f64::INFINITY,
        rms: 0.0,
    };

    for j in 0..count {
        let v = interpolator.interpolate(j as f64 * step);
        stats.max = stats.max.max(v);
        stats.min = stats.min.min(v);
        stats.rms += v * v / count as f64;
    }
    stats.rms = stats.rms.sqrt();
    stats
}

/// Build one interpolator per signal of a sampled plan
///
/// Walks the plan in execution order so that a difference finds its
/// dependencies already built. A dependency that is missing (unresolved id)
/// reads as zero. A signal whose interpolator cannot be built is logged and
/// left out; the others are still returned.
pub fn build_interpolators(
    front: &Arc<SwapChainSlot>,
    plan: &SamplingPlan<'_>,
) -> HashMap<SignalId, Arc<SignalInterpolator>> {
    let mut built: HashMap<SignalId, Arc<SignalInterpolator>> =
        HashMap::with_capacity(plan.len());

    for state in plan.iter() {
        match build_one(front, state.id, state.data, state.offsets, &built) {
            Ok(interpolator) => {
                built.insert(state.id, Arc::new(interpolator));
            }
            Err(e) => error!(signal = %state.id, error = %e, "failed to build signal interpolator"),
        }
    }

    built
}

fn build_one(
    front: &Arc<SwapChainSlot>,
    id: SignalId,
    data: &SignalData,
    offsets: Option<Offsets>,
    built: &HashMap<SignalId, Arc<SignalInterpolator>>,
) -> EvaluatorResult<SignalInterpolator> {
    let stride = front.values_stride();

    match (data, offsets) {
        (SignalData::Meander(_), Some(offsets)) => Ok(SignalInterpolator::View {
            stats: front
                .stats()
                .get(offsets.stats_offset)
                .copied()
                .unwrap_or_default(),
            view: SampleView::new(Arc::clone(front), offsets.values_offset, stride),
        }),
        (SignalData::Difference(d), _) => {
            let lookup = |dep: SignalId| {
                built.get(&dep).cloned().unwrap_or_else(|| {
                    warn!(
                        signal = %id,
                        error = %EvaluatorError::UnresolvedDependency(dep),
                        "reading zero in place of missing dependency"
                    );
                    Arc::new(SignalInterpolator::zero())
                })
            };
            Ok(SignalInterpolator::difference(
                lookup(d.minuend()),
                lookup(d.subtrahend()),
                stride,
            ))
        }
        (data, None) => Err(EvaluatorError::UnsupportedSignalKind(data.kind())),
    }
}
