//! Signal data adapter contract
//!
//! The evaluator does not own signal definitions; it reads them through a
//! [`SignalDataAdapter`] whenever the adapter reports a change. Adapters
//! embed a [`DataChangedEvent`] to manage their listeners.
//! [`SnapshotAdapter`] is the in-memory adapter a state container feeds with
//! whole snapshots.

use crate::signal_data::{Signal, SignalData, SignalId};
use arc_swap::ArcSwap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Callback fired when an adapter's signal set changes
pub type DataChangedListener = Arc<dyn Fn() + Send + Sync>;

/// Handle of a registered [`DataChangedListener`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Immutable point-in-time set of signals
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SignalSnapshot {
    samples_count: usize,
    signals: Vec<Signal>,
}

impl SignalSnapshot {
    pub fn new(samples_count: usize, signals: Vec<Signal>) -> Self {
        Self {
            samples_count,
            signals,
        }
    }

    /// Discrete samples per signal
    pub fn samples_count(&self) -> usize {
        self.samples_count
    }

    pub fn signals(&self) -> &[Signal] {
        &self.signals
    }

    pub fn get(&self, id: &SignalId) -> Option<&SignalData> {
        self.signals.iter().find(|s| &s.id == id).map(|s| &s.data)
    }

    pub fn len(&self) -> usize {
        self.signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Replace or append `signal`
    pub fn upsert(&mut self, signal: Signal) {
        match self.signals.iter_mut().find(|s| s.id == signal.id) {
            Some(existing) => *existing = signal,
            None => self.signals.push(signal),
        }
    }

    pub fn remove(&mut self, id: &SignalId) -> Option<Signal> {
        let index = self.signals.iter().position(|s| &s.id == id)?;
        Some(self.signals.remove(index))
    }

    pub fn set_samples_count(&mut self, samples_count: usize) {
        self.samples_count = samples_count;
    }
}

pub trait SignalDataAdapter: Send + Sync {
    /// Discrete samples per signal for the current snapshot
    fn samples_count(&self) -> usize;

    /// All current signals; must be consistent for one call
    fn enumerate_all_signals(&self) -> Vec<Signal>;

    fn subscribe_data_changed(&self, listener: DataChangedListener) -> ListenerId;

    fn unsubscribe_data_changed(&self, id: ListenerId);

    /// Sample count and signals taken together
    ///
    /// Adapters that can read both atomically should override this.
    fn snapshot(&self) -> Arc<SignalSnapshot> {
        Arc::new(SignalSnapshot::new(
            self.samples_count(),
            self.enumerate_all_signals(),
        ))
    }
}

/// Listener registry for change notifications
#[derive(Default)]
pub struct DataChangedEvent {
    next_id: AtomicU64,
    listeners: Mutex<Vec<(ListenerId, DataChangedListener)>>,
}

impl DataChangedEvent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: DataChangedListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.lock().push((id, listener));
        id
    }

    /// Returns false if `id` was not registered
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        let before = listeners.len();
        listeners.retain(|(other, _)| *other != id);
        listeners.len() != before
    }

    /// Invoke every listener, outside the registry lock
    pub fn notify(&self) {
        let listeners: Vec<DataChangedListener> =
            self.lock().iter().map(|(_, l)| Arc::clone(l)).collect();
        for listener in listeners {
            listener();
        }
    }

    pub fn listener_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, DataChangedListener)>> {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// In-memory adapter over whole snapshots
pub struct SnapshotAdapter {
    snapshot: ArcSwap<SignalSnapshot>,
    data_changed: DataChangedEvent,
}

impl SnapshotAdapter {
    pub fn new(snapshot: SignalSnapshot) -> Self {
        Self {
            snapshot: ArcSwap::from_pointee(snapshot),
            data_changed: DataChangedEvent::new(),
        }
    }

    pub fn empty(samples_count: usize) -> Self {
        Self::new(SignalSnapshot::new(samples_count, Vec::new()))
    }

    pub fn current(&self) -> Arc<SignalSnapshot> {
        self.snapshot.load_full()
    }

    /// Replace the whole snapshot and notify listeners
    pub fn publish(&self, snapshot: SignalSnapshot) {
        self.snapshot.store(Arc::new(snapshot));
        self.data_changed.notify();
    }

    /// Derive the next snapshot from the current one and notify listeners
    pub fn update<F>(&self, mut f: F)
    where
        F: FnMut(&mut SignalSnapshot),
    {
        self.snapshot.rcu(|current| {
            let mut next = SignalSnapshot::clone(current);
            f(&mut next);
            next
        });
        self.data_changed.notify();
    }

    /// Notify listeners without changing the snapshot
    pub fn touch(&self) {
        self.data_changed.notify();
    }

    pub fn listener_count(&self) -> usize {
        self.data_changed.listener_count()
    }
}

impl SignalDataAdapter for SnapshotAdapter {
    fn samples_count(&self) -> usize {
        self.snapshot.load().samples_count()
    }

    fn enumerate_all_signals(&self) -> Vec<Signal> {
        self.snapshot.load().signals().to_vec()
    }

    fn subscribe_data_changed(&self, listener: DataChangedListener) -> ListenerId {
        self.data_changed.subscribe(listener)
    }

    fn unsubscribe_data_changed(&self, id: ListenerId) {
        self.data_changed.unsubscribe(id);
    }

    fn snapshot(&self) -> Arc<SignalSnapshot> {
        self.snapshot.load_full()
    }
}
