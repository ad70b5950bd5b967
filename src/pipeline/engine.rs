//! Thread-per-node execution engine.
//!
//! Every non-generator node owns an input queue drained by a dedicated worker
//! thread, spawned the first time something is delivered to it. A worker
//! takes deliveries in FIFO order, runs one step on the node, and if the step
//! emits, pushes each output port's buffer onto the queues of the children
//! wired to it. Pushing never waits on the child; the child's own worker does
//! the processing.
//!
//! ```text
//!  driver ──tick──► [generator] ──run()──► queue ─► worker ─► [window] ──run()──► queue ─► worker ─► [sink]
//! ```
//!
//! Generators have no queue. The driver ticks them synchronously and their
//! output is fanned out on the driver thread.
//!
//! Failures on a worker are handled according to `FailurePolicy` and always
//! reported on the engine's failure channel.

use crate::pipeline::buffer::{PortBuffers, TimeSeriesBuffer};
use crate::pipeline::error::{PipelineError, PipelineResult, WiringError};
use crate::pipeline::id::NodeId;
use crate::pipeline::node::{NodeCore, StepOutcome};
use crate::pipeline::node_type::NodeCategory;
use crossbeam_channel::{bounded, select, unbounded, Receiver, Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Once, RwLock};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

struct PanicSite {
    location: String,
    backtrace: String,
}

thread_local! {
    static LAST_PANIC: RefCell<Option<PanicSite>> = const { RefCell::new(None) };
}

static PANIC_HOOK: Once = Once::new();

/// Chain a hook that remembers where the current thread last panicked, so a
/// caught node panic can be logged with its trace.
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|l| l.to_string())
                .unwrap_or_else(|| "unknown location".to_string());
            let backtrace = Backtrace::force_capture().to_string();
            LAST_PANIC.with(|slot| *slot.borrow_mut() = Some(PanicSite { location, backtrace }));
            previous(info);
        }));
    });
}

fn take_panic_site() -> PanicSite {
    LAST_PANIC
        .with(|slot| slot.borrow_mut().take())
        .unwrap_or_else(|| PanicSite {
            location: "unknown location".to_string(),
            backtrace: String::new(),
        })
}

/// Input queue bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum QueuePolicy {
    /// No backpressure: a slow node accumulates backlog.
    #[default]
    Unbounded,
    /// Deliveries beyond `capacity` are dropped and counted.
    Bounded { capacity: usize },
}

/// What a worker does when a step fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// The failing node stops processing; the rest of the graph keeps running.
    #[default]
    StopNode,
    /// The failed delivery is dropped and the node carries on.
    SkipDelivery,
    /// The failing node stops and the driver tears the whole graph down.
    Teardown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Driver tick rate; 0 ticks as fast as possible.
    pub tick_rate_hz: u32,
    pub queue: QueuePolicy,
    pub failure_policy: FailurePolicy,
    pub stats_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 100,
            queue: QueuePolicy::Unbounded,
            failure_policy: FailurePolicy::StopNode,
            stats_interval_secs: 5,
        }
    }
}

/// A worker failure, as reported to the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeFailure {
    pub node: String,
    pub message: String,
    pub policy: FailurePolicy,
}

/// Point-in-time counters for one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeStats {
    pub delivered: u64,
    pub processed: u64,
    pub emitted: u64,
    pub dropped: u64,
    pub failures: u64,
    pub queue_depth: usize,
    pub failed: bool,
}

struct EngineShared {
    config: EngineConfig,
    in_flight: AtomicUsize,
    failure_tx: Sender<NodeFailure>,
}

/// Shared runtime state for every node of one graph.
#[derive(Clone)]
pub struct Engine {
    shared: Arc<EngineShared>,
}

impl Engine {
    /// Create an engine and the receiving end of its failure channel.
    pub fn new(config: EngineConfig) -> (Self, Receiver<NodeFailure>) {
        install_panic_hook();
        let (failure_tx, failure_rx) = unbounded();
        let engine = Self {
            shared: Arc::new(EngineShared {
                config,
                in_flight: AtomicUsize::new(0),
                failure_tx,
            }),
        };
        (engine, failure_rx)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    /// Deliveries queued or being processed anywhere in the graph.
    pub fn in_flight(&self) -> usize {
        self.shared.in_flight.load(Ordering::SeqCst)
    }

    /// Block until no delivery is in flight. Returns false on timeout.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let start = Instant::now();
        loop {
            if self.in_flight() == 0 {
                return true;
            }
            if start.elapsed() >= timeout {
                return false;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Wrap a node core into a runnable handle.
    pub fn spawn_node(&self, id: NodeId, core: NodeCore) -> NodeHandle {
        let (tx, rx) = match self.shared.config.queue {
            QueuePolicy::Unbounded => unbounded(),
            QueuePolicy::Bounded { capacity } => bounded(capacity.max(1)),
        };
        let (stop_tx, stop_rx) = bounded(1);
        let children = core
            .outputs()
            .iter()
            .map(|p| (p.clone(), Vec::new()))
            .collect();

        NodeHandle {
            inner: Arc::new(NodeInner {
                id,
                name: core.name().to_string(),
                category: core.category(),
                inputs: core.inputs().to_vec(),
                outputs: core.outputs().to_vec(),
                core: Mutex::new(core),
                children: RwLock::new(children),
                tx,
                rx,
                stop_tx,
                stop_rx,
                worker: Mutex::new(None),
                running: AtomicBool::new(false),
                failed: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                disposal_started: AtomicBool::new(false),
                pending: AtomicUsize::new(0),
                delivered: AtomicU64::new(0),
                processed: AtomicU64::new(0),
                emitted: AtomicU64::new(0),
                dropped: AtomicU64::new(0),
                failures: AtomicU64::new(0),
                engine: self.shared.clone(),
            }),
        }
    }
}

struct Delivery {
    input: String,
    buffer: TimeSeriesBuffer,
}

/// One wired edge: deliveries go to `input` on `node`.
#[derive(Clone)]
pub struct ChildEdge {
    pub node: NodeHandle,
    pub input: String,
}

struct NodeInner {
    id: NodeId,
    name: String,
    category: NodeCategory,
    inputs: Vec<String>,
    outputs: Vec<String>,
    core: Mutex<NodeCore>,
    /// Output port → children, in declared output order.
    children: RwLock<Vec<(String, Vec<ChildEdge>)>>,
    tx: Sender<Delivery>,
    rx: Receiver<Delivery>,
    stop_tx: Sender<()>,
    stop_rx: Receiver<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
    failed: AtomicBool,
    disposed: AtomicBool,
    disposal_started: AtomicBool,
    /// This node's share of the engine's in-flight count.
    pending: AtomicUsize,
    delivered: AtomicU64,
    processed: AtomicU64,
    emitted: AtomicU64,
    dropped: AtomicU64,
    failures: AtomicU64,
    engine: Arc<EngineShared>,
}

/// Cheap, cloneable reference to a running node.
#[derive(Clone)]
pub struct NodeHandle {
    inner: Arc<NodeInner>,
}

impl NodeHandle {
    pub fn id(&self) -> NodeId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn category(&self) -> NodeCategory {
        self.inner.category
    }

    pub fn inputs(&self) -> &[String] {
        &self.inner.inputs
    }

    pub fn outputs(&self) -> &[String] {
        &self.inner.outputs
    }

    pub fn check_input(&self, input: &str) -> Result<(), WiringError> {
        if self.inner.inputs.iter().any(|p| p == input) {
            Ok(())
        } else {
            Err(WiringError::UnknownInput {
                node: self.inner.name.clone(),
                input: input.to_string(),
            })
        }
    }

    pub fn check_output(&self, output: &str) -> Result<(), WiringError> {
        if self.inner.outputs.iter().any(|p| p == output) {
            Ok(())
        } else {
            Err(WiringError::UnknownOutput {
                node: self.inner.name.clone(),
                output: output.to_string(),
            })
        }
    }

    /// Register `child.input` as a target of `output`.
    ///
    /// The same `(child, input)` pair may appear at most once per output
    /// port. The same child on a different input port is a separate edge.
    pub fn add_child(&self, output: &str, child: &NodeHandle, input: &str) -> PipelineResult<()> {
        self.check_output(output)?;
        child.check_input(input)?;

        let mut children = self
            .inner
            .children
            .write()
            .map_err(|_| PipelineError::Poisoned(self.inner.name.clone()))?;
        let Some((_, edges)) = children.iter_mut().find(|(p, _)| p == output) else {
            return Err(WiringError::UnknownOutput {
                node: self.inner.name.clone(),
                output: output.to_string(),
            }
            .into());
        };
        if edges
            .iter()
            .any(|e| Arc::ptr_eq(&e.node.inner, &child.inner) && e.input == input)
        {
            return Err(WiringError::DuplicateEdge {
                from: self.inner.name.clone(),
                output: output.to_string(),
                to: child.inner.name.clone(),
                input: input.to_string(),
            }
            .into());
        }
        edges.push(ChildEdge {
            node: child.clone(),
            input: input.to_string(),
        });
        tracing::debug!(
            "[{}] wired {} -> {}.{}",
            self.inner.name,
            output,
            child.inner.name,
            input
        );
        Ok(())
    }

    /// Edges per output port, in fan-out order.
    pub fn children(&self) -> Vec<(String, Vec<ChildEdge>)> {
        self.inner
            .children
            .read()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    /// Distinct child nodes, in fan-out order.
    fn child_nodes(&self) -> Vec<NodeHandle> {
        let mut seen: Vec<NodeHandle> = Vec::new();
        for (_, edges) in self.children() {
            for edge in edges {
                if !seen.iter().any(|n| Arc::ptr_eq(&n.inner, &edge.node.inner)) {
                    seen.push(edge.node);
                }
            }
        }
        seen
    }

    /// Enqueue `buffer` for `input` and wake the worker.
    ///
    /// The only entry point for delivering data. Starts the worker on first
    /// use. Never blocks on the node's processing.
    pub fn run(&self, input: &str, buffer: TimeSeriesBuffer) -> PipelineResult<()> {
        let inner = &self.inner;
        if inner.disposed.load(Ordering::SeqCst) {
            return Err(PipelineError::NodeDisposed(inner.name.clone()));
        }
        self.check_input(input)?;
        self.ensure_worker()?;

        inner.pending.fetch_add(1, Ordering::SeqCst);
        inner.engine.in_flight.fetch_add(1, Ordering::SeqCst);
        inner.delivered.fetch_add(1, Ordering::Relaxed);

        let delivery = Delivery {
            input: input.to_string(),
            buffer,
        };
        match inner.tx.try_send(delivery) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                let dropped = inner.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    "[{}] input queue full, dropped delivery on '{}' ({} dropped)",
                    inner.name,
                    input,
                    dropped
                );
                inner.release(1);
            }
            Err(TrySendError::Disconnected(_)) => {
                inner.release(1);
                return Err(PipelineError::NodeDisposed(inner.name.clone()));
            }
        }

        // A stopped node accepts deliveries but never drains them.
        if inner.failed.load(Ordering::SeqCst) || inner.disposed.load(Ordering::SeqCst) {
            inner.release_all();
        }
        Ok(())
    }

    /// Tick a generator on the calling thread and fan out its output.
    pub fn tick(&self) -> PipelineResult<()> {
        let inner = &self.inner;
        if inner.disposed.load(Ordering::SeqCst) {
            return Err(PipelineError::NodeDisposed(inner.name.clone()));
        }
        let outcome = inner.guarded_step(|core| core.generate())?;
        if let Some(output) = outcome.emitted {
            inner.emitted.fetch_add(1, Ordering::Relaxed);
            self.fan_out(&output);
        }
        Ok(())
    }

    fn fan_out(&self, output: &PortBuffers) {
        for (port, edges) in self.children() {
            let Some(buffer) = output.get(&port).filter(|b| b.has_data()) else {
                continue;
            };
            for edge in edges {
                if let Err(e) = edge.node.run(&edge.input, buffer.clone()) {
                    tracing::debug!(
                        "[{}] delivery to {}.{} refused: {}",
                        self.inner.name,
                        edge.node.name(),
                        edge.input,
                        e
                    );
                }
            }
        }
    }

    fn ensure_worker(&self) -> PipelineResult<()> {
        if self.inner.category == NodeCategory::Generator {
            return Ok(());
        }
        let mut worker = self.inner.lock_worker();
        if worker.is_some() || self.inner.disposed.load(Ordering::SeqCst) {
            return Ok(());
        }

        self.inner.running.store(true, Ordering::SeqCst);
        let handle = self.clone();
        let spawned = std::thread::Builder::new()
            .name(format!("node-{}", self.inner.name))
            .spawn(move || handle.worker_loop())
            .map_err(|source| PipelineError::Spawn {
                node: self.inner.name.clone(),
                source,
            })?;
        tracing::debug!("[{}] worker started", self.inner.name);
        *worker = Some(spawned);
        Ok(())
    }

    fn worker_loop(self) {
        let inner = &self.inner;
        while inner.running.load(Ordering::SeqCst) {
            select! {
                recv(inner.stop_rx) -> _ => break,
                recv(inner.rx) -> msg => match msg {
                    Ok(delivery) => {
                        if !self.handle_delivery(delivery) {
                            break;
                        }
                    }
                    Err(_) => break,
                },
            }
        }
        tracing::debug!("[{}] worker exiting", inner.name);
    }

    /// Process one delivery. Returns false when the worker must stop.
    fn handle_delivery(&self, delivery: Delivery) -> bool {
        let inner = &self.inner;
        let result = inner.guarded_step(|core| core.deliver(&delivery.input, &delivery.buffer));
        let keep_running = match result {
            Ok(outcome) => {
                if let Some(output) = outcome.emitted {
                    inner.emitted.fetch_add(1, Ordering::Relaxed);
                    self.fan_out(&output);
                }
                true
            }
            Err(e) => inner.report_failure(&e),
        };
        inner.release(1);
        if !keep_running {
            inner.release_all();
        }
        keep_running
    }

    /// Stop the worker and release the behaviour. Idempotent.
    ///
    /// A step in progress completes first; the worker is never interrupted
    /// mid-step.
    pub fn dispose(&self) {
        let inner = &self.inner;
        if inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        inner.running.store(false, Ordering::SeqCst);
        let _ = inner.stop_tx.try_send(());

        let handle = inner.lock_worker().take();
        if let Some(handle) = handle {
            if handle.thread().id() != std::thread::current().id() {
                if handle.join().is_err() {
                    tracing::error!("[{}] worker thread panicked", inner.name);
                }
            }
        }

        inner.release_all();
        inner
            .core
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .dispose();
        if let Ok(mut children) = inner.children.write() {
            for (_, edges) in children.iter_mut() {
                edges.clear();
            }
        }
        tracing::debug!("[{}] disposed", inner.name);
    }

    /// Dispose every descendant depth-first, then this node.
    ///
    /// Each node is disposed once even when reachable along several paths.
    pub fn dispose_all(&self) {
        if self.inner.disposal_started.swap(true, Ordering::SeqCst) {
            return;
        }
        for child in self.child_nodes() {
            child.dispose_all();
        }
        self.dispose();
    }

    pub fn is_failed(&self) -> bool {
        self.inner.failed.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Whether a worker thread has been started.
    pub fn has_worker(&self) -> bool {
        self.inner.lock_worker().is_some()
    }

    pub fn stats(&self) -> NodeStats {
        let inner = &self.inner;
        NodeStats {
            delivered: inner.delivered.load(Ordering::Relaxed),
            processed: inner.processed.load(Ordering::Relaxed),
            emitted: inner.emitted.load(Ordering::Relaxed),
            dropped: inner.dropped.load(Ordering::Relaxed),
            failures: inner.failures.load(Ordering::Relaxed),
            queue_depth: inner.rx.len(),
            failed: inner.failed.load(Ordering::SeqCst),
        }
    }

    /// Read the node's state under its lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&NodeCore) -> R) -> PipelineResult<R> {
        let core = self.inner.lock_core()?;
        Ok(f(&core))
    }
}

impl std::fmt::Debug for NodeHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodeHandle")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("category", &self.inner.category)
            .finish()
    }
}

impl NodeInner {
    fn lock_core(&self) -> PipelineResult<MutexGuard<'_, NodeCore>> {
        self.core
            .lock()
            .map_err(|_| PipelineError::Poisoned(self.name.clone()))
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.worker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Run one step under the core lock, turning panics into errors. The
    /// lock is released before the caller fans out.
    fn guarded_step(
        &self,
        step: impl FnOnce(&mut NodeCore) -> PipelineResult<StepOutcome>,
    ) -> PipelineResult<StepOutcome> {
        let result = catch_unwind(AssertUnwindSafe(|| {
            let mut core = self.lock_core()?;
            step(&mut core)
        }));
        let outcome = match result {
            Ok(outcome) => outcome?,
            Err(panic) => {
                self.core.clear_poison();
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                let site = take_panic_site();
                return Err(PipelineError::Panicked {
                    node: self.name.clone(),
                    message,
                    location: site.location,
                    backtrace: site.backtrace,
                });
            }
        };
        if outcome.processed {
            self.processed.fetch_add(1, Ordering::Relaxed);
        }
        Ok(outcome)
    }

    /// Log and report a failed step. Returns whether the worker continues.
    fn report_failure(&self, error: &PipelineError) -> bool {
        self.failures.fetch_add(1, Ordering::Relaxed);
        let policy = self.engine.config.failure_policy;
        let message = error_chain(error);
        match error.panic_backtrace() {
            Some(trace) => tracing::error!(
                "[{}] step failed ({:?}): {}\n{}",
                self.name,
                policy,
                message,
                trace
            ),
            None => tracing::error!("[{}] step failed ({:?}): {}", self.name, policy, message),
        }

        let keep_running = policy == FailurePolicy::SkipDelivery;
        if !keep_running {
            self.failed.store(true, Ordering::SeqCst);
            self.running.store(false, Ordering::SeqCst);
        }
        let _ = self.engine.failure_tx.send(NodeFailure {
            node: self.name.clone(),
            message,
            policy,
        });
        keep_running
    }

    /// Give back up to `n` of this node's in-flight deliveries.
    fn release(&self, n: usize) {
        let taken = self
            .pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |p| Some(p.saturating_sub(n)))
            .map_or(0, |prev| prev.min(n));
        if taken > 0 {
            self.engine.in_flight.fetch_sub(taken, Ordering::SeqCst);
        }
    }

    fn release_all(&self) {
        let n = self.pending.swap(0, Ordering::SeqCst);
        if n > 0 {
            self.engine.in_flight.fetch_sub(n, Ordering::SeqCst);
        }
    }
}

/// `outer: inner: root` rendering of an error and its sources.
pub fn error_chain(error: &dyn std::error::Error) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(e) = source {
        let text = e.to_string();
        if !message.ends_with(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = e.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::buffer_options::BufferOptions;
    use crate::pipeline::node::{Generator, NodeKind, Processor};
    use crate::pipeline::port;

    struct Passthrough;

    impl Processor for Passthrough {
        fn inputs(&self) -> Vec<String> {
            vec![port::MAIN.into()]
        }

        fn outputs(&self) -> Vec<String> {
            vec![port::MAIN.into()]
        }

        fn process(&mut self, input: &mut PortBuffers) -> PipelineResult<PortBuffers> {
            let mut out = PortBuffers::new();
            let n = input.count(port::MAIN);
            out.insert(port::MAIN, input.entry(port::MAIN).splice(0, n));
            Ok(out)
        }
    }

    fn passthrough(engine: &Engine, id: u32, name: &str) -> NodeHandle {
        let options = BufferOptions {
            clear_output_buffer_after_process: true,
            ..Default::default()
        };
        engine.spawn_node(
            NodeId(id),
            NodeCore::new(name, NodeKind::Processing(Box::new(Passthrough)), options),
        )
    }

    #[test]
    fn test_worker_is_lazy() {
        let (engine, _failures) = Engine::new(EngineConfig::default());
        let node = passthrough(&engine, 0, "a");
        assert!(!node.has_worker());
        node.run(port::MAIN, TimeSeriesBuffer::from_channel(1.0, "x", vec![1.0]))
            .unwrap();
        assert!(node.has_worker());
        assert!(engine.wait_idle(Duration::from_secs(5)));
        assert_eq!(node.stats().processed, 1);
        node.dispose_all();
        assert!(node.is_disposed());
    }

    #[test]
    fn test_duplicate_edge_rejected() {
        let (engine, _failures) = Engine::new(EngineConfig::default());
        let a = passthrough(&engine, 0, "a");
        let b = passthrough(&engine, 1, "b");
        a.add_child(port::MAIN, &b, port::MAIN).unwrap();
        let err = a.add_child(port::MAIN, &b, port::MAIN).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Wiring(WiringError::DuplicateEdge { .. })
        ));
        assert!(a.add_child(port::MAIN, &b, "label").is_err());
        assert!(a.add_child("other", &b, port::MAIN).is_err());
    }

    #[test]
    fn test_run_after_dispose_is_refused() {
        let (engine, _failures) = Engine::new(EngineConfig::default());
        let a = passthrough(&engine, 0, "a");
        a.dispose();
        let err = a
            .run(port::MAIN, TimeSeriesBuffer::from_channel(1.0, "x", vec![1.0]))
            .unwrap_err();
        assert!(matches!(err, PipelineError::NodeDisposed(_)));
        assert_eq!(engine.in_flight(), 0);
    }

    #[test]
    fn test_error_chain_includes_context() {
        let err = PipelineError::incompatible("bad shape").with_context("[window] input 'main'");
        let text = error_chain(&err);
        assert!(text.contains("[window] input 'main'"));
        assert!(text.contains("bad shape"));
    }

    struct Exploding;

    impl Generator for Exploding {
        fn outputs(&self) -> Vec<String> {
            vec![port::MAIN.into()]
        }

        fn generate(&mut self) -> PipelineResult<PortBuffers> {
            panic!("sensor unplugged");
        }
    }

    #[test]
    fn test_panic_carries_location_and_backtrace() {
        let (engine, _failures) = Engine::new(EngineConfig::default());
        let node = engine.spawn_node(
            NodeId(0),
            NodeCore::new(
                "exploding",
                NodeKind::Generator(Box::new(Exploding)),
                BufferOptions::default(),
            ),
        );

        let err = node.tick().unwrap_err();
        match &err {
            PipelineError::Panicked {
                node,
                message,
                location,
                backtrace,
            } => {
                assert_eq!(node, "exploding");
                assert_eq!(message, "sensor unplugged");
                assert!(location.contains("engine.rs"), "location: {}", location);
                assert!(!backtrace.is_empty());
            }
            other => panic!("expected a panic error, got {:?}", other),
        }
        let wrapped = err.with_context("root 'exploding'");
        assert!(wrapped.panic_backtrace().is_some());
        assert!(PipelineError::incompatible("x").panic_backtrace().is_none());
        node.dispose();
    }

    #[test]
    fn test_engine_config_serde() {
        let config: EngineConfig = toml::from_str(
            r#"
            tick_rate_hz = 10
            failure_policy = "teardown"
            [queue]
            policy = "bounded"
            capacity = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.queue, QueuePolicy::Bounded { capacity: 4 });
        assert_eq!(config.failure_policy, FailurePolicy::Teardown);
        assert_eq!(config.stats_interval_secs, 5);
    }
}
