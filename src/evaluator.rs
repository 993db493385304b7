//! Signals evaluator
//!
//! Owns the adapter subscription, re-samples the whole signal set on a
//! background thread whenever the adapter reports a change, and hands the
//! resulting interpolators to subscribers.
//!
//! # Lifecycle
//! ```text
//! Idle ──set_adapter(Some)──► AttachedNoData ──pass ok──► AttachedReady
//!  ▲                               │                          │
//!  └──────────set_adapter(None)────┴──────────────────────────┘
//! ```
//!
//! Latest wins: a change notification cancels the in-flight pass before the
//! next one is spawned, and a cancelled pass neither publishes nor
//! dispatches. Failed passes are logged and leave the previous state alone.
//!
//! Callbacks run without any evaluator lock held. Each subscription sees
//! generations in increasing order; a delivery older than one it already
//! received is dropped.

use crate::adapter::{ListenerId, SignalDataAdapter};
use crate::cancellation::CancellationToken;
use crate::config::EvaluatorConfig;
use crate::error::{EvaluatorError, EvaluatorResult};
use crate::interpolator::{build_interpolators, SignalInterpolator};
use crate::sampler::{sample_signals, SamplingPlan};
use crate::signal_data::SignalId;
use crate::swap_chain::{SwapChain, SwapChainSlot};
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::thread;
use tracing::{debug, error};

/// Consumer callback receiving up-to-date interpolators
pub type InterpolatorCallback = Arc<dyn Fn(Arc<SignalInterpolator>) + Send + Sync>;

type DispatchTable = HashMap<SignalId, Arc<SignalInterpolator>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvaluatorState {
    /// No adapter attached
    Idle,
    /// Adapter attached, no pass has completed yet
    AttachedNoData,
    /// At least one pass completed; interpolators are dispatchable
    AttachedReady,
}

pub struct SignalsEvaluator {
    inner: Arc<Inner>,
}

struct Inner {
    config: EvaluatorConfig,
    swap_chain: SwapChain,
    attachment: Mutex<Option<Attachment>>,
    /// Token of the latest pass; at most one is live
    cancellation: Mutex<Option<CancellationToken>>,
    /// Generation of the latest started pass
    generation: AtomicU64,
    dispatch: Mutex<DispatchState>,
    next_subscription: AtomicU64,
}

struct Attachment {
    adapter: Arc<dyn SignalDataAdapter>,
    listener: ListenerId,
}

#[derive(Default)]
struct DispatchState {
    table: DispatchTable,
    /// Slot the table's interpolators read from
    table_front: Option<Arc<SwapChainSlot>>,
    table_generation: u64,
    ready: bool,
    subscriptions: HashMap<SignalId, Registration>,
}

struct Registration {
    token: u64,
    sink: Arc<CallbackSink>,
}

/// A subscriber's callback and the newest generation handed to it
///
/// Deliveries to one sink are serialized and never go backwards: a
/// generation at or below the last delivered one is skipped. The sink's own
/// lock is the only lock held while the callback runs, so a callback must
/// not block waiting for its own next delivery.
struct CallbackSink {
    callback: InterpolatorCallback,
    delivered_generation: Mutex<u64>,
}

impl CallbackSink {
    fn new(callback: InterpolatorCallback) -> Self {
        Self {
            callback,
            delivered_generation: Mutex::new(0),
        }
    }

    /// Returns false if a newer generation was already delivered
    fn deliver(&self, id: SignalId, generation: u64, interpolator: Arc<SignalInterpolator>) -> bool {
        let mut delivered = lock(&self.delivered_generation);
        if generation <= *delivered {
            return false;
        }
        *delivered = generation;

        if panic::catch_unwind(AssertUnwindSafe(|| (self.callback)(interpolator))).is_err() {
            error!(signal = %id, generation, "signal subscription callback panicked");
        }
        true
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // Callbacks are caught before they can unwind through a guard; a
    // poisoned guard still holds consistent data
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn same_adapter(a: &Arc<dyn SignalDataAdapter>, b: &Arc<dyn SignalDataAdapter>) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

impl Default for SignalsEvaluator {
    fn default() -> Self {
        Self::new()
    }
}

impl SignalsEvaluator {
    pub fn new() -> Self {
        Self::with_config(EvaluatorConfig::default())
    }

    pub fn with_config(config: EvaluatorConfig) -> Self {
        let swap_chain = SwapChain::new(config.realloc_slack_divisor);
        Self {
            inner: Arc::new(Inner {
                config,
                swap_chain,
                attachment: Mutex::new(None),
                cancellation: Mutex::new(None),
                generation: AtomicU64::new(0),
                dispatch: Mutex::new(DispatchState::default()),
                next_subscription: AtomicU64::new(0),
            }),
        }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.inner.config
    }

    pub fn adapter(&self) -> Option<Arc<dyn SignalDataAdapter>> {
        lock(&self.inner.attachment)
            .as_ref()
            .map(|a| Arc::clone(&a.adapter))
    }

    /// Attach `adapter` (detaching the previous one) and start a pass
    ///
    /// Setting the adapter that is already attached is a no-op. `None`
    /// cancels any in-flight pass and returns the evaluator to `Idle`.
    pub fn set_adapter(&self, adapter: Option<Arc<dyn SignalDataAdapter>>) {
        let mut attachment = lock(&self.inner.attachment);

        match (attachment.as_ref(), adapter.as_ref()) {
            (Some(current), Some(next)) if same_adapter(&current.adapter, next) => return,
            (None, None) => return,
            _ => {}
        }

        if let Some(previous) = attachment.take() {
            previous.adapter.unsubscribe_data_changed(previous.listener);
        }
        self.inner.cancel_in_flight();
        self.inner.clear_table();

        let Some(adapter) = adapter else {
            debug!("signal data adapter detached");
            return;
        };

        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let listener = adapter.subscribe_data_changed(Arc::new(move || {
            if let Some(inner) = weak.upgrade() {
                Inner::on_data_changed(&inner);
            }
        }));
        *attachment = Some(Attachment { adapter, listener });
        drop(attachment);

        debug!("signal data adapter attached");
        Inner::on_data_changed(&self.inner);
    }

    pub fn attach<A>(&self, adapter: Arc<A>)
    where
        A: SignalDataAdapter + 'static,
    {
        self.set_adapter(Some(adapter as Arc<dyn SignalDataAdapter>));
    }

    pub fn detach(&self) {
        self.set_adapter(None);
    }

    /// Start a pass over the attached adapter's current signals
    pub fn refresh(&self) {
        Inner::on_data_changed(&self.inner);
    }

    pub fn state(&self) -> EvaluatorState {
        if lock(&self.inner.attachment).is_none() {
            EvaluatorState::Idle
        } else if lock(&self.inner.dispatch).ready {
            EvaluatorState::AttachedReady
        } else {
            EvaluatorState::AttachedNoData
        }
    }

    /// Register `callback` for `id`, replacing any previous callback
    ///
    /// If an interpolator for `id` already exists it is delivered
    /// synchronously before this returns. Dropping the returned handle
    /// unregisters the callback.
    pub fn subscribe_signal_interpolator_updates<F>(&self, id: SignalId, callback: F) -> Subscription
    where
        F: Fn(Arc<SignalInterpolator>) + Send + Sync + 'static,
    {
        let sink = Arc::new(CallbackSink::new(Arc::new(callback)));
        let token = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);

        let current = {
            let mut state = lock(&self.inner.dispatch);
            state.subscriptions.insert(
                id,
                Registration {
                    token,
                    sink: Arc::clone(&sink),
                },
            );
            let generation = state.table_generation;
            state.table.get(&id).cloned().map(|interpolator| (generation, interpolator))
        };

        // A pass finishing meanwhile may already have delivered a newer one
        if let Some((generation, interpolator)) = current {
            sink.deliver(id, generation, interpolator);
        }

        Subscription {
            inner: Arc::downgrade(&self.inner),
            id,
            token,
        }
    }

    /// Interpolator of `id` from the latest completed pass
    pub fn interpolator(&self, id: &SignalId) -> Option<Arc<SignalInterpolator>> {
        lock(&self.inner.dispatch).table.get(id).cloned()
    }

    /// Ids with an interpolator in the latest completed pass
    pub fn signal_ids(&self) -> Vec<SignalId> {
        lock(&self.inner.dispatch).table.keys().copied().collect()
    }

    /// Slot the current interpolators read from
    ///
    /// Before the first dispatch, and after an adapter change, this is the
    /// swap chain's front, which can belong to a pass that was superseded
    /// right after publishing.
    pub fn front(&self) -> Arc<SwapChainSlot> {
        let stored = lock(&self.inner.dispatch).table_front.clone();
        stored.unwrap_or_else(|| self.inner.swap_chain.front())
    }

    /// Swap-chain (reuses, allocations, publishes)
    pub fn swap_chain_stats(&self) -> (u64, u64, u64) {
        self.inner.swap_chain.stats()
    }
}

impl Drop for SignalsEvaluator {
    fn drop(&mut self) {
        if let Some(previous) = lock(&self.inner.attachment).take() {
            previous.adapter.unsubscribe_data_changed(previous.listener);
        }
        self.inner.cancel_in_flight();
    }
}

impl Inner {
    fn on_data_changed(inner: &Arc<Inner>) {
        let Some(adapter) = lock(&inner.attachment)
            .as_ref()
            .map(|a| Arc::clone(&a.adapter))
        else {
            return;
        };

        let token = CancellationToken::new();
        let generation = {
            let mut current = lock(&inner.cancellation);
            if let Some(previous) = current.replace(token.clone()) {
                previous.cancel();
            }
            inner.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        let worker = Arc::clone(inner);
        let spawned = thread::Builder::new()
            .name(inner.config.sampler_thread_name.clone())
            .spawn(move || worker.run_pass(adapter, token, generation));

        if let Err(e) = spawned {
            let e = EvaluatorError::SamplerThread(e.to_string());
            error!(generation, error = %e, "failed to start sampling pass");
        }
    }

    fn cancel_in_flight(&self) {
        if let Some(token) = lock(&self.cancellation).take() {
            token.cancel();
        }
    }

    fn clear_table(&self) {
        let mut state = lock(&self.dispatch);
        state.table.clear();
        state.table_front = None;
        state.ready = false;
    }

    fn run_pass(&self, adapter: Arc<dyn SignalDataAdapter>, token: CancellationToken, generation: u64) {
        debug!(generation, "sampling pass started");

        let result = panic::catch_unwind(AssertUnwindSafe(|| self.sample(adapter.as_ref(), &token)));
        match result {
            Ok(Ok((table, front))) => self.dispatch(table, front, &token, generation),
            Ok(Err(e)) if e.is_cancelled() => debug!(generation, "sampling pass cancelled"),
            Ok(Err(e)) => error!(generation, error = %e, "failed to sample signals data"),
            Err(_) => {
                let e = EvaluatorError::SamplerThread("sampling pass panicked".to_string());
                error!(generation, error = %e, "failed to sample signals data");
            }
        }

        // Retire our token unless a newer pass already replaced it
        let mut current = lock(&self.cancellation);
        if self.generation.load(Ordering::SeqCst) == generation {
            current.take();
        }
    }

    fn sample(
        &self,
        adapter: &dyn SignalDataAdapter,
        token: &CancellationToken,
    ) -> EvaluatorResult<(DispatchTable, Arc<SwapChainSlot>)> {
        let snapshot = adapter.snapshot();
        token.check()?;

        let mut plan = SamplingPlan::resolve(snapshot.signals(), token)?;
        let front = sample_signals(&mut plan, snapshot.samples_count(), &self.swap_chain, token)?;
        token.check()?;

        let table = build_interpolators(&front, &plan);
        Ok((table, front))
    }

    fn dispatch(
        &self,
        table: DispatchTable,
        front: Arc<SwapChainSlot>,
        token: &CancellationToken,
        generation: u64,
    ) {
        let deliveries: Vec<_> = {
            let mut state = lock(&self.dispatch);
            if token.is_cancelled() || generation < state.table_generation {
                debug!(generation, "discarding superseded sampling pass");
                return;
            }

            state.table = table;
            state.table_front = Some(front);
            state.table_generation = generation;
            state.ready = true;

            state
                .subscriptions
                .iter()
                .filter_map(|(id, registration)| {
                    state
                        .table
                        .get(id)
                        .map(|interpolator| (*id, Arc::clone(&registration.sink), Arc::clone(interpolator)))
                })
                .collect()
        };

        debug!(generation, subscribers = deliveries.len(), "dispatching signal interpolators");
        for (id, sink, interpolator) in deliveries {
            if !sink.deliver(id, generation, interpolator) {
                debug!(signal = %id, generation, "subscriber already has a newer interpolator");
            }
        }
    }
}

/// Registration handle returned by
/// [`SignalsEvaluator::subscribe_signal_interpolator_updates`]
///
/// Dropping it unregisters the callback, unless a newer subscription for
/// the same id has replaced it in the meantime.
#[must_use = "dropping the subscription unregisters the callback"]
pub struct Subscription {
    inner: Weak<Inner>,
    id: SignalId,
    token: u64,
}

impl Subscription {
    pub fn signal_id(&self) -> SignalId {
        self.id
    }

    /// Whether this handle's callback is still the registered one
    pub fn is_active(&self) -> bool {
        self.inner.upgrade().is_some_and(|inner| {
            lock(&inner.dispatch)
                .subscriptions
                .get(&self.id)
                .is_some_and(|r| r.token == self.token)
        })
    }

    /// Unregister now; same as dropping the handle
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        let Some(inner) = self.inner.upgrade() else {
            return;
        };
        let mut state = lock(&inner.dispatch);
        if state
            .subscriptions
            .get(&self.id)
            .is_some_and(|r| r.token == self.token)
        {
            state.subscriptions.remove(&self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{SignalSnapshot, SnapshotAdapter};
    use crate::signal_data::{Signal, SignalData};
    use crossbeam::channel::{unbounded, Receiver};
    use std::time::Duration;

    const TIMEOUT: Duration = Duration::from_secs(5);

    fn subscribe_channel(
        evaluator: &SignalsEvaluator,
        id: SignalId,
    ) -> (Subscription, Receiver<Arc<SignalInterpolator>>) {
        let (tx, rx) = unbounded();
        let sub = evaluator.subscribe_signal_interpolator_updates(id, move |interpolator| {
            let _ = tx.send(interpolator);
        });
        (sub, rx)
    }

    #[test]
    fn test_idle_until_attached() {
        let evaluator = SignalsEvaluator::new();
        assert_eq!(evaluator.state(), EvaluatorState::Idle);
        assert!(evaluator.adapter().is_none());
    }

    #[test]
    fn test_attach_samples_and_dispatches() {
        let id = SignalId::new_v4();
        let adapter = Arc::new(SnapshotAdapter::new(SignalSnapshot::new(
            4,
            vec![Signal::new(id, SignalData::meander([0.0, 0.5, 1.0, -1.0]))],
        )));

        let evaluator = SignalsEvaluator::new();
        let (_sub, rx) = subscribe_channel(&evaluator, id);
        evaluator.attach(adapter.clone());

        let interpolator = rx.recv_timeout(TIMEOUT).unwrap();
        assert_eq!(interpolator.interpolate(0.0), 0.0);
        assert_eq!(interpolator.interpolate(1.0), -1.0);
        assert_eq!(evaluator.state(), EvaluatorState::AttachedReady);
        assert_eq!(adapter.listener_count(), 1);
    }

    #[test]
    fn test_same_adapter_is_noop() {
        let adapter: Arc<dyn SignalDataAdapter> = Arc::new(SnapshotAdapter::empty(4));
        let evaluator = SignalsEvaluator::new();

        evaluator.set_adapter(Some(Arc::clone(&adapter)));
        evaluator.set_adapter(Some(Arc::clone(&adapter)));

        let current = evaluator.adapter().unwrap();
        assert!(same_adapter(&current, &adapter));
    }

    #[test]
    fn test_detach_unsubscribes_and_goes_idle() {
        let adapter = Arc::new(SnapshotAdapter::empty(4));
        let evaluator = SignalsEvaluator::new();

        evaluator.attach(adapter.clone());
        assert_eq!(adapter.listener_count(), 1);

        evaluator.detach();
        assert_eq!(adapter.listener_count(), 0);
        assert_eq!(evaluator.state(), EvaluatorState::Idle);
    }

    #[test]
    fn test_drop_detaches_adapter() {
        let adapter = Arc::new(SnapshotAdapter::empty(4));
        {
            let evaluator = SignalsEvaluator::new();
            evaluator.attach(adapter.clone());
        }
        assert_eq!(adapter.listener_count(), 0);
    }

    #[test]
    fn test_subscription_drop_unregisters() {
        let id = SignalId::new_v4();
        let evaluator = SignalsEvaluator::new();

        let first = evaluator.subscribe_signal_interpolator_updates(id, |_| {});
        assert!(first.is_active());

        // A newer registration replaces the callback for the same id
        let second = evaluator.subscribe_signal_interpolator_updates(id, |_| {});
        assert!(!first.is_active());
        drop(first);
        assert!(second.is_active());

        second.unsubscribe();
        assert!(lock(&evaluator.inner.dispatch).subscriptions.is_empty());
    }

    #[test]
    fn test_sink_skips_older_generations() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let record = Arc::clone(&seen);
        let sink = CallbackSink::new(Arc::new(move |interpolator: Arc<SignalInterpolator>| {
            record.lock().unwrap().push(interpolator.interpolate(0.0));
        }));
        let id = SignalId::new_v4();

        assert!(sink.deliver(id, 2, Arc::new(SignalInterpolator::Constant(2.0))));
        assert!(!sink.deliver(id, 1, Arc::new(SignalInterpolator::Constant(1.0))));
        assert!(!sink.deliver(id, 2, Arc::new(SignalInterpolator::Constant(2.0))));
        assert!(sink.deliver(id, 3, Arc::new(SignalInterpolator::Constant(3.0))));

        assert_eq!(*seen.lock().unwrap(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_panicking_sink_still_advances() {
        let sink = CallbackSink::new(Arc::new(|_: Arc<SignalInterpolator>| panic!("subscriber failure")));
        let id = SignalId::new_v4();

        assert!(sink.deliver(id, 1, Arc::new(SignalInterpolator::zero())));
        assert!(!sink.deliver(id, 1, Arc::new(SignalInterpolator::zero())));
    }

    #[test]
    fn test_front_follows_dispatched_table() {
        let id = SignalId::new_v4();
        let adapter = Arc::new(SnapshotAdapter::new(SignalSnapshot::new(
            2,
            vec![Signal::new(id, SignalData::meander([1.0, 2.0]))],
        )));
        let evaluator = SignalsEvaluator::new();
        let (_sub, rx) = subscribe_channel(&evaluator, id);

        evaluator.attach(adapter);
        rx.recv_timeout(TIMEOUT).unwrap();
        let dispatched = evaluator.front();

        // A pass that publishes and is superseded before dispatching
        evaluator
            .inner
            .swap_chain
            .fill_and_publish(0, 0, &CancellationToken::new(), |_| Ok(()))
            .unwrap();

        assert!(!Arc::ptr_eq(&dispatched, &evaluator.inner.swap_chain.front()));
        assert!(Arc::ptr_eq(&dispatched, &evaluator.front()));
        assert_eq!(dispatched.values(), &[1.0, 2.0]);
    }
}
