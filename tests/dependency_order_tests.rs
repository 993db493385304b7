//! Randomized checks of dependency weights and execution order

use meander::dependency_graph::DependencyGraph;
use meander::sampler::SamplingPlan;
use meander::{CancellationToken, EvaluatorError, Signal, SignalData, SignalId};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;

/// Random DAG: each derived signal reads two signals created before it
fn random_dag(rng: &mut StdRng, size: usize) -> Vec<Signal> {
    let mut ids: Vec<SignalId> = Vec::with_capacity(size);
    let mut signals = Vec::with_capacity(size);

    for i in 0..size {
        let id = SignalId::new_v4();
        let data = if i < 2 || rng.gen_bool(0.3) {
            SignalData::meander((0..rng.gen_range(1..8)).map(|_| rng.gen_range(-1.0..1.0)))
        } else {
            let minuend = ids[rng.gen_range(0..i)];
            let subtrahend = ids[rng.gen_range(0..i)];
            SignalData::difference(minuend, subtrahend)
        };
        ids.push(id);
        signals.push(Signal::new(id, data));
    }

    signals.shuffle(rng);
    signals
}

#[test]
fn test_dependencies_outweigh_dependents() {
    let mut rng = StdRng::seed_from_u64(0x6d65616e646572);
    let token = CancellationToken::new();

    for size in [1, 2, 5, 20, 100] {
        for _ in 0..20 {
            let signals = random_dag(&mut rng, size);
            let graph = DependencyGraph::build(&signals);
            assert!(graph.is_acyclic());

            let weights = graph.resolve_weights(&token).unwrap();
            let order = graph.execution_order(&weights);
            assert_eq!(order.len(), signals.len());

            let position: HashMap<SignalId, usize> =
                order.iter().enumerate().map(|(i, id)| (*id, i)).collect();

            for signal in &signals {
                for dep in signal.data.dependencies() {
                    assert!(weights[dep] > weights[&signal.id]);
                    assert!(position[dep] < position[&signal.id]);
                }
            }
        }
    }
}

#[test]
fn test_plan_order_matches_graph_order() {
    let mut rng = StdRng::seed_from_u64(7);
    let token = CancellationToken::new();
    let signals = random_dag(&mut rng, 50);

    let graph = DependencyGraph::build(&signals);
    let expected = graph.execution_order(&graph.resolve_weights(&token).unwrap());
    let plan = SamplingPlan::resolve(&signals, &token).unwrap();

    assert_eq!(plan.order(), expected.as_slice());
    assert!(plan.iter().all(|state| state.offsets.is_none()));
}

#[test]
fn test_order_is_deterministic_across_input_permutations() {
    let mut rng = StdRng::seed_from_u64(42);
    let token = CancellationToken::new();
    let mut signals = random_dag(&mut rng, 30);

    let graph = DependencyGraph::build(&signals);
    let first = graph.execution_order(&graph.resolve_weights(&token).unwrap());

    signals.shuffle(&mut rng);
    let graph = DependencyGraph::build(&signals);
    let second = graph.execution_order(&graph.resolve_weights(&token).unwrap());

    assert_eq!(first, second);
}

#[test]
fn test_back_edge_is_reported_as_cycle() {
    let mut rng = StdRng::seed_from_u64(3);
    let token = CancellationToken::new();
    let mut signals = random_dag(&mut rng, 10);

    // Close a loop through two new derived signals
    let anchor = signals[0].id;
    let (x, y) = (SignalId::new_v4(), SignalId::new_v4());
    signals.push(Signal::new(x, SignalData::difference(anchor, y)));
    signals.push(Signal::new(y, SignalData::difference(x, anchor)));

    let graph = DependencyGraph::build(&signals);
    assert!(!graph.is_acyclic());
    assert!(matches!(
        graph.resolve_weights(&token),
        Err(EvaluatorError::CyclicDependency(_))
    ));
    assert!(matches!(
        SamplingPlan::resolve(&signals, &token),
        Err(EvaluatorError::CyclicDependency(_))
    ));
}
