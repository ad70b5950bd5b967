//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use neuroflow_rs::pipeline::{Engine, EngineConfig, FailurePolicy, Graph, QueuePolicy};
use std::time::Duration;

/// Upper bound for waiting on worker threads
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// Wait until no delivery is in flight, failing the test on timeout
pub fn settle(engine: &Engine) {
    assert!(
        engine.wait_idle(test_timeout()),
        "{} deliveries still in flight",
        engine.in_flight()
    );
}

pub fn settle_graph(graph: &Graph) {
    settle(graph.engine());
}

pub fn engine_with(failure_policy: FailurePolicy, queue: QueuePolicy) -> EngineConfig {
    EngineConfig {
        tick_rate_hz: 0,
        queue,
        failure_policy,
        ..Default::default()
    }
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}
