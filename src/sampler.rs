//! Sampling pass
//!
//! Turns one snapshot into a published swap-chain generation:
//! 1. [`SamplingPlan::resolve`] weighs every signal through the dependency
//!    graph and fixes the execution order
//! 2. [`sample_signals`] writes `N` values per directly sampled signal into
//!    the back slot, with max/min/RMS, and publishes it
//!
//! Cancellation is polled per signal and per sample; a cancelled pass
//! returns `Err(Cancelled)` and never publishes.

use crate::cancellation::CancellationToken;
use crate::dependency_graph::DependencyGraph;
use crate::error::EvaluatorResult;
use crate::signal_data::{Signal, SignalData, SignalId};
use crate::swap_chain::{SignalStats, SwapChain, SwapChainSlot};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Location of a sampled signal inside a swap-chain slot
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Offsets {
    pub stats_offset: usize,
    pub values_offset: usize,
}

/// Per-signal bookkeeping for one pass
#[derive(Debug)]
pub struct SamplingState<'a> {
    pub id: SignalId,
    pub data: &'a SignalData,
    pub weight: usize,
    /// Set once the signal has been written to the buffer
    pub offsets: Option<Offsets>,
}

/// Weighted, ordered signals of one snapshot
#[derive(Debug)]
pub struct SamplingPlan<'a> {
    order: Vec<SignalId>,
    states: HashMap<SignalId, SamplingState<'a>>,
}

impl<'a> SamplingPlan<'a> {
    /// Weigh `signals` and order them dependencies-first
    ///
    /// # Errors
    /// - `CyclicDependency` when the snapshot contains a cycle
    /// - `Cancelled` when `cancellation` fires
    pub fn resolve(signals: &'a [Signal], cancellation: &CancellationToken) -> EvaluatorResult<Self> {
        let graph = DependencyGraph::build(signals);
        let weights = graph.resolve_weights(cancellation)?;
        let order = graph.execution_order(&weights);

        let mut states = HashMap::with_capacity(signals.len());
        for signal in signals {
            states.entry(signal.id).or_insert_with(|| SamplingState {
                id: signal.id,
                data: &signal.data,
                weight: weights.get(&signal.id).copied().unwrap_or(0),
                offsets: None,
            });
        }

        Ok(Self { order, states })
    }

    /// Signal ids, dependencies before dependents
    pub fn order(&self) -> &[SignalId] {
        &self.order
    }

    pub fn state(&self, id: &SignalId) -> Option<&SamplingState<'a>> {
        self.states.get(id)
    }

    /// States in execution order
    pub fn iter(&self) -> impl Iterator<Item = &SamplingState<'a>> {
        self.order.iter().filter_map(|id| self.states.get(id))
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Ids of signals the sampler writes into the value buffer
    fn sampled_ids(&self) -> Vec<SignalId> {
        self.iter()
            .filter(|state| state.data.is_sampled())
            .map(|state| state.id)
            .collect()
    }
}

/// Sample every directly sampled signal of `plan` and publish the result
///
/// On success the plan's states carry their offsets into the returned
/// (now front) slot. On failure or cancellation the front slot is left as
/// it was.
pub fn sample_signals(
    plan: &mut SamplingPlan<'_>,
    samples_count: usize,
    swap_chain: &SwapChain,
    cancellation: &CancellationToken,
) -> EvaluatorResult<Arc<SwapChainSlot>> {
    cancellation.check()?;
    let sampled = plan.sampled_ids();
    let mut offsets = Vec::with_capacity(sampled.len());

    let front = {
        let states = &plan.states;
        swap_chain.fill_and_publish(sampled.len(), samples_count, cancellation, |slot| {
            offsets.clear();
            for (i, id) in sampled.iter().enumerate() {
                cancellation.check()?;

                let Some(state) = states.get(id) else { continue };
                let values_offset = i * samples_count;
                let values = &mut slot.values_mut()[values_offset..values_offset + samples_count];
                let stats = fill_signal(state.data, values, cancellation)?;
                slot.stats_mut()[i] = stats;

                offsets.push((
                    *id,
                    Offsets {
                        stats_offset: i,
                        values_offset,
                    },
                ));
            }
            Ok(())
        })?
    };

    for (id, offs) in offsets {
        if let Some(state) = plan.states.get_mut(&id) {
            state.offsets = Some(offs);
        }
    }

    debug!(
        signals = plan.len(),
        sampled = sampled.len(),
        samples_count,
        "published sampled signals"
    );
    Ok(front)
}

/// Write `values.len()` samples of `data` and return their statistics
fn fill_signal(
    data: &SignalData,
    values: &mut [f64],
    cancellation: &CancellationToken,
) -> EvaluatorResult<SignalStats> {
    if values.is_empty() {
        return Ok(SignalStats::default());
    }

    let count = values.len() as f64;
    let mut max = f64::NEG_INFINITY;
    let mut min = f64::INFINITY;
    let mut rms = 0.0;

    for (j, slot) in values.iter_mut().enumerate() {
        cancellation.check()?;

        let value = data.sample_at(j)?;
        *slot = value;

        max = max.max(value);
        min = min.min(value);
        rms += value * value / count;
    }

    Ok(SignalStats {
        max,
        min,
        rms: rms.sqrt(),
    })
}
