//! Pipeline driver: the top-level tick loop.
//!
//! Each iteration:
//! 1. Tick every root generator; a root failure tears the graph down.
//! 2. Drain worker failure reports; a `Teardown` report stops the loop.
//! 3. Log node statistics every `stats_interval_secs`.
//! 4. Rate-limit to `tick_rate_hz`.
//!
//! The loop ends when the stop flag is cleared (signal handler), after
//! `max_ticks`, or on a fatal failure. The graph is always disposed on exit.

use crate::pipeline::engine::{FailurePolicy, NodeFailure};
use crate::pipeline::error::PipelineResult;
use crate::pipeline::graph::Graph;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why `Pipeline::run` returned.
#[derive(Debug, Clone, PartialEq)]
pub enum StopReason {
    /// The stop flag was cleared.
    Stopped,
    /// `max_ticks` ticks completed.
    MaxTicks,
    /// A worker failed under `FailurePolicy::Teardown`.
    Teardown { node: String, message: String },
}

#[derive(Debug, Clone)]
pub struct RunSummary {
    pub ticks: u64,
    pub reason: StopReason,
    /// Every failure reported while running.
    pub failures: Vec<NodeFailure>,
}

/// Owns a graph and drives its roots.
pub struct Pipeline {
    graph: Graph,
    running: Arc<AtomicBool>,
    tick_rate_hz: u32,
    stats_interval: Duration,
    drain_timeout: Duration,
    max_ticks: Option<u64>,
    ticks: u64,
    last_tick_time: Option<Instant>,
    last_stats_time: Instant,
    failures: Vec<NodeFailure>,
}

impl Pipeline {
    pub fn new(graph: Graph) -> Self {
        let config = graph.engine().config().clone();
        Self {
            graph,
            running: Arc::new(AtomicBool::new(true)),
            tick_rate_hz: config.tick_rate_hz,
            stats_interval: Duration::from_secs(config.stats_interval_secs.max(1)),
            drain_timeout: Duration::from_secs(1),
            max_ticks: None,
            ticks: 0,
            last_tick_time: None,
            last_stats_time: Instant::now(),
            failures: Vec::new(),
        }
    }

    pub fn with_max_ticks(mut self, max_ticks: Option<u64>) -> Self {
        self.max_ticks = max_ticks;
        self
    }

    pub fn with_tick_rate(mut self, hz: u32) -> Self {
        self.tick_rate_hz = hz;
        self
    }

    /// How long shutdown waits for queued deliveries before disposing.
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Clearing this flag stops `run` after the current tick.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.running.clone()
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Run until stopped. Root failures are returned as errors after the
    /// graph has been disposed.
    pub fn run(&mut self) -> PipelineResult<RunSummary> {
        tracing::info!(
            "Pipeline started ({} Hz, {:?})",
            self.tick_rate_hz,
            self.max_ticks
        );

        let reason = loop {
            if !self.running.load(Ordering::SeqCst) {
                break StopReason::Stopped;
            }
            if self.max_ticks.is_some_and(|max| self.ticks >= max) {
                break StopReason::MaxTicks;
            }

            self.last_tick_time = Some(Instant::now());
            if let Some(reason) = self.step()? {
                break reason;
            }

            if self.last_stats_time.elapsed() >= self.stats_interval {
                self.log_stats();
                self.last_stats_time = Instant::now();
            }
            self.rate_limit();
        };

        self.shutdown();
        tracing::info!("Pipeline stopped after {} ticks: {:?}", self.ticks, reason);
        Ok(RunSummary {
            ticks: self.ticks,
            reason,
            failures: std::mem::take(&mut self.failures),
        })
    }

    /// One tick plus failure draining. Returns a stop reason when a worker
    /// failure requires teardown.
    pub fn step(&mut self) -> PipelineResult<Option<StopReason>> {
        self.graph.tick()?;
        self.ticks += 1;

        for failure in self.graph.drain_failures() {
            tracing::warn!("[{}] node stopped: {}", failure.node, failure.message);
            let teardown = failure.policy == FailurePolicy::Teardown;
            self.failures.push(failure.clone());
            if teardown {
                tracing::error!("[{}] failure policy requires teardown", failure.node);
                self.graph.dispose_all();
                return Ok(Some(StopReason::Teardown {
                    node: failure.node,
                    message: failure.message,
                }));
            }
        }
        Ok(None)
    }

    /// Let queued deliveries finish, then dispose everything.
    pub fn shutdown(&mut self) {
        if self.graph.is_disposed() {
            return;
        }
        if !self.graph.wait_idle(self.drain_timeout) {
            tracing::warn!(
                "{} deliveries still in flight after {:?}, disposing anyway",
                self.graph.engine().in_flight(),
                self.drain_timeout
            );
        }
        self.graph.dispose_all();
    }

    fn log_stats(&self) {
        for (name, stats) in self.graph.stats() {
            tracing::debug!(
                "[{}] delivered={} processed={} emitted={} dropped={} queue={} failed={}",
                name,
                stats.delivered,
                stats.processed,
                stats.emitted,
                stats.dropped,
                stats.queue_depth,
                stats.failed
            );
        }
    }

    fn rate_limit(&self) {
        if self.tick_rate_hz == 0 {
            std::thread::yield_now();
            return;
        }

        let target_interval = Duration::from_nanos(1_000_000_000 / self.tick_rate_hz as u64);

        if let Some(last) = self.last_tick_time {
            let elapsed = last.elapsed();
            if elapsed < target_interval {
                let remaining = target_interval - elapsed;
                // Spin for sub-millisecond accuracy, sleep for larger waits
                if remaining > Duration::from_millis(2) {
                    std::thread::sleep(remaining - Duration::from_millis(1));
                }
                while last.elapsed() < target_interval {
                    std::hint::spin_loop();
                }
            }
        }
    }
}
