//! # Meander - Signal Sampling and Interpolation Engine
//!
//! Meander evaluates a set of interdependent signals: directly authored
//! meanders and signals derived from others by id. Whenever the signal set
//! changes it re-samples everything on a background thread, publishes the
//! samples through a double-buffered swap chain, and hands consumers
//! interpolators they can read at any normalized position `t ∈ [0, 1]`.
//!
//! ## Core Features
//!
//! - **Dependency Ordering**: signals are weighed through a dependency graph
//!   so every dependency is built before its dependents; cycles abort the pass
//! - **Latest Wins**: a change cancels the in-flight pass; stale results are
//!   never published
//! - **Stable Readers**: interpolators keep the buffer they read from alive,
//!   so a reader is never torn by a newer generation
//! - **Buffer Reuse**: back buffers are reused in place when nobody holds them
//!   and they are within 1.25x of the required size
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use meander::{Signal, SignalData, SignalId, SignalSnapshot, SignalsEvaluator, SnapshotAdapter};
//! use std::sync::Arc;
//!
//! let (a, b, c) = (SignalId::new_v4(), SignalId::new_v4(), SignalId::new_v4());
//! let adapter = Arc::new(SnapshotAdapter::new(SignalSnapshot::new(
//!     4,
//!     vec![
//!         Signal::new(a, SignalData::meander([0.0, 1.0, 2.0, 3.0])),
//!         Signal::new(b, SignalData::meander([3.0, 2.0, 1.0, 0.0])),
//!         Signal::new(c, SignalData::difference(a, b)),
//!     ],
//! )));
//!
//! let evaluator = SignalsEvaluator::new();
//! let _subscription = evaluator.subscribe_signal_interpolator_updates(c, |interpolator| {
//!     println!("C(0.5) = {}", interpolator.interpolate(0.5));
//! });
//! evaluator.attach(adapter);
//! ```
//!
//! ## Architecture
//!
//! - [`adapter`]: where signals come from and how changes are announced
//! - [`dependency_graph`]: weights and execution order
//! - [`sampler`]: fills and publishes one generation
//! - [`swap_chain`]: front/back sample buffers
//! - [`interpolator`]: continuous reads over a generation
//! - [`evaluator`]: lifecycle, cancellation and dispatch
//! - [`project`], [`waveform`], [`config`]: files, display probing and settings

pub mod adapter;
pub mod cancellation;
pub mod config;
pub mod dependency_graph;
pub mod error;
pub mod evaluator;
pub mod interpolator;
pub mod project;
pub mod sampler;
pub mod signal_data;
pub mod swap_chain;
pub mod waveform;

pub use adapter::{DataChangedEvent, ListenerId, SignalDataAdapter, SignalSnapshot, SnapshotAdapter};
pub use cancellation::CancellationToken;
pub use config::EvaluatorConfig;
pub use error::{EvaluatorError, EvaluatorResult};
pub use evaluator::{EvaluatorState, SignalsEvaluator, Subscription};
pub use interpolator::SignalInterpolator;
pub use project::{Project, SignalTrack};
pub use signal_data::{Signal, SignalData, SignalId, SignalKind};
pub use swap_chain::{SignalStats, SwapChain, SwapChainSlot};
pub use waveform::{DisplayStats, WaveformProbe};
