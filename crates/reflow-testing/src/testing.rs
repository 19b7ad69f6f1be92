//! Deterministic drivers and a harness around `Renderer<MemoryHost>`.
//!
//! Everything here runs synchronously under test control: the
//! schedulers only count their signals, the clock only moves when
//! told to, and `settle` drains both queues to quiescence.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use reflow_core::{
    Clock, FlushScheduler, HostAdapter, HostId, HostOp, MemoryHost, PaintScheduler, RenderError,
    Renderer, Runtime, VNode,
};

/// Batching strategy that records how many times it was armed.
#[derive(Default)]
pub struct CountingScheduler {
    calls: AtomicUsize,
}

impl CountingScheduler {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl FlushScheduler for CountingScheduler {
    fn schedule_flush(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }
}

/// Paint signal that records how many times it was requested.
#[derive(Default)]
pub struct CountingPaint {
    requests: AtomicUsize,
}

impl CountingPaint {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl PaintScheduler for CountingPaint {
    fn request_paint(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

/// Clock that advances only on demand.
#[derive(Default)]
pub struct TestClock {
    millis: AtomicU64,
}

impl TestClock {
    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// A renderer over the in-memory host, rooted at a fresh container.
pub struct Harness {
    renderer: Renderer<MemoryHost>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_runtime(Runtime::default())
    }

    pub fn with_runtime(runtime: Runtime) -> Self {
        let mut host = MemoryHost::new();
        let container = host
            .create_element("root", None)
            .expect("failed to create container");
        host.take_ops();
        Self {
            renderer: Renderer::with_runtime(host, container, runtime),
        }
    }

    pub fn renderer(&mut self) -> &mut Renderer<MemoryHost> {
        &mut self.renderer
    }

    pub fn container(&self) -> HostId {
        self.renderer.container()
    }

    pub fn mount(&mut self, node: VNode) -> Result<(), RenderError> {
        self.renderer.render(node)
    }

    pub fn hydrate(&mut self, node: VNode) -> Result<(), RenderError> {
        self.renderer.hydrate(node)
    }

    /// Flush renders and paint effects until nothing is pending.
    pub fn settle(&mut self) -> Result<(), RenderError> {
        self.renderer.run_until_idle()
    }

    /// Mount and settle in one step.
    pub fn show(&mut self, node: VNode) -> Result<(), RenderError> {
        self.mount(node)?;
        self.settle()
    }

    pub fn text(&self) -> String {
        self.renderer.host().text_content(self.renderer.container())
    }

    pub fn find(&self, tag: &str) -> Option<HostId> {
        self.renderer
            .host()
            .find_by_tag(self.renderer.container(), tag)
    }

    pub fn take_ops(&mut self) -> Vec<HostOp> {
        self.renderer.host_mut().take_ops()
    }

    pub fn emit(&self, target: HostId, event: &str) {
        self.renderer.host().emit(target, event);
    }

    pub fn click(&self, target: HostId) {
        self.emit(target, "click");
    }
}

impl Default for Harness {
    fn default() -> Self {
        Self::new()
    }
}

pub fn count_moves(ops: &[HostOp]) -> usize {
    ops.iter()
        .filter(|op| matches!(op, HostOp::Move { .. }))
        .count()
}

pub fn count_inserts(ops: &[HostOp]) -> usize {
    ops.iter()
        .filter(|op| matches!(op, HostOp::Insert { .. } | HostOp::Append { .. }))
        .count()
}

pub fn count_removes(ops: &[HostOp]) -> usize {
    ops.iter()
        .filter(|op| matches!(op, HostOp::Remove { .. }))
        .count()
}

pub fn count_creates(ops: &[HostOp]) -> usize {
    ops.iter()
        .filter(|op| matches!(op, HostOp::CreateElement { .. } | HostOp::CreateText { .. }))
        .count()
}
