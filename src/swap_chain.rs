/// Double-buffered storage for sampled signal values
///
/// The sampler fills the back slot, then publishes it as the new front.
/// Readers only ever see the front slot, through their own `Arc`, so a
/// published generation stays intact for as long as anyone holds it.
///
/// # Design
/// - `ArcSwap` front: lock-free loads for interpolators
/// - Mutex-guarded back: exclusive to the pass that holds the lock
/// - In-place reuse of the back slot when nobody else holds it and its
///   buffers are within the resize threshold; the lock is then held for the
///   whole fill
/// - Fresh allocation otherwise; the lock is only taken for the swap
use crate::cancellation::CancellationToken;
use crate::error::EvaluatorResult;
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Default divisor of the oversize threshold (`required + required / 4`)
pub const DEFAULT_REALLOC_SLACK_DIVISOR: usize = 4;

/// Summary statistics of one sampled signal
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct SignalStats {
    pub max: f64,
    pub min: f64,
    pub rms: f64,
}

/// One published (or in-progress) generation of sampled values
#[derive(Debug, Default)]
pub struct SwapChainSlot {
    stats: Vec<SignalStats>,
    values: Vec<f64>,
    values_stride: usize,
}

impl SwapChainSlot {
    fn with_capacity(signals: usize, stride: usize) -> Self {
        let mut slot = Self {
            stats: Vec::with_capacity(signals),
            values: Vec::with_capacity(signals * stride),
            values_stride: stride,
        };
        slot.prepare(signals, stride);
        slot
    }

    /// Size the buffers for `signals` slices of `stride` values
    ///
    /// Never allocates when the capacity already suffices.
    fn prepare(&mut self, signals: usize, stride: usize) {
        self.stats.clear();
        self.stats.resize(signals, SignalStats::default());
        self.values.resize(signals * stride, 0.0);
        self.values_stride = stride;
    }

    fn fits(&self, signals: usize, stride: usize, slack_divisor: usize) -> bool {
        !needs_realloc(self.values.capacity(), signals * stride, slack_divisor)
            && !needs_realloc(self.stats.capacity(), signals, slack_divisor)
    }

    /// Per-signal statistics, indexed by stats offset
    pub fn stats(&self) -> &[SignalStats] {
        &self.stats
    }

    pub fn stats_mut(&mut self) -> &mut [SignalStats] {
        &mut self.stats
    }

    /// Flat value buffer, `values_stride` values per sampled signal
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut [f64] {
        &mut self.values
    }

    pub fn values_stride(&self) -> usize {
        self.values_stride
    }

    /// Number of signal slices in this slot
    pub fn signal_count(&self) -> usize {
        self.stats.len()
    }
}

/// Whether a buffer of `capacity` must be reallocated to hold `required`
///
/// Grows when undersized; shrinks only when the buffer exceeds `required`
/// by more than `required / slack_divisor`.
pub fn needs_realloc(capacity: usize, required: usize, slack_divisor: usize) -> bool {
    let slack = if slack_divisor == 0 {
        0
    } else {
        required / slack_divisor
    };
    capacity < required || capacity > required + slack
}

/// Buffer reuse statistics for monitoring
#[derive(Debug, Default)]
struct SwapChainStats {
    /// Passes that filled the back slot in place
    reuses: AtomicU64,

    /// Passes that allocated a fresh slot
    allocations: AtomicU64,

    /// Completed swaps
    publishes: AtomicU64,
}

pub struct SwapChain {
    front: ArcSwap<SwapChainSlot>,
    back: Mutex<Arc<SwapChainSlot>>,
    slack_divisor: usize,
    stats: SwapChainStats,
}

impl Default for SwapChain {
    fn default() -> Self {
        Self::new(DEFAULT_REALLOC_SLACK_DIVISOR)
    }
}

impl SwapChain {
    pub fn new(slack_divisor: usize) -> Self {
        Self {
            front: ArcSwap::from_pointee(SwapChainSlot::default()),
            back: Mutex::new(Arc::new(SwapChainSlot::default())),
            slack_divisor,
            stats: SwapChainStats::default(),
        }
    }

    /// Currently published slot
    pub fn front(&self) -> Arc<SwapChainSlot> {
        self.front.load_full()
    }

    /// Fill a back slot with `fill` and publish it as the new front
    ///
    /// The back slot is reused in place when no reader holds it and its
    /// buffers fit; in that case the lock is held for the entire fill.
    /// Otherwise a fresh slot is filled without the lock and the lock is
    /// only taken around the swap.
    ///
    /// Nothing is published if `fill` fails or `cancellation` fires before
    /// the swap; the front keeps the last successful generation.
    pub fn fill_and_publish<F>(
        &self,
        signals: usize,
        stride: usize,
        cancellation: &CancellationToken,
        mut fill: F,
    ) -> EvaluatorResult<Arc<SwapChainSlot>>
    where
        F: FnMut(&mut SwapChainSlot) -> EvaluatorResult<()>,
    {
        cancellation.check()?;

        let mut back = self.lock_back();
        let reused = match Arc::get_mut(&mut *back) {
            Some(slot) if slot.fits(signals, stride, self.slack_divisor) => {
                slot.prepare(signals, stride);
                fill(slot)?;
                true
            }
            _ => false,
        };

        if reused {
            self.stats.reuses.fetch_add(1, Ordering::Relaxed);
            cancellation.check()?;
            let filled = Arc::clone(&*back);
            *back = self.front.swap(Arc::clone(&filled));
            self.stats.publishes.fetch_add(1, Ordering::Relaxed);
            return Ok(filled);
        }

        // Fresh buffers: nobody can observe them until the swap
        drop(back);
        self.stats.allocations.fetch_add(1, Ordering::Relaxed);

        let mut slot = SwapChainSlot::with_capacity(signals, stride);
        fill(&mut slot)?;
        let filled = Arc::new(slot);

        let mut back = self.lock_back();
        cancellation.check()?;
        *back = self.front.swap(Arc::clone(&filled));
        self.stats.publishes.fetch_add(1, Ordering::Relaxed);
        Ok(filled)
    }

    fn lock_back(&self) -> MutexGuard<'_, Arc<SwapChainSlot>> {
        // A panicking fill leaves only the unpublished back slot behind
        self.back.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns (reuses, allocations, publishes)
    pub fn stats(&self) -> (u64, u64, u64) {
        (
            self.stats.reuses.load(Ordering::Relaxed),
            self.stats.allocations.load(Ordering::Relaxed),
            self.stats.publishes.load(Ordering::Relaxed),
        )
    }
}
