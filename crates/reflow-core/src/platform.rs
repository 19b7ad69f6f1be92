//! Platform abstraction traits for the runtime's scheduling services.
//!
//! These traits let the engine delegate flush batching, paint signals
//! and timing to the host environment, so the same reconciler runs
//! under a real event loop or a fully deterministic test driver.

use std::time::Instant;

/// Batching strategy for re-render requests.
///
/// `schedule_flush` is a signal only: implementations arrange for the
/// host to call [`crate::Renderer::flush`] later. It must never flush
/// synchronously on the stack of the state update that triggered it.
pub trait FlushScheduler: Send + Sync {
    /// Request that the host flush the render queue.
    fn schedule_flush(&self);
}

/// Paint signal for effects deferred until the host has visually
/// updated.
pub trait PaintScheduler: Send + Sync {
    /// Request that the host call
    /// [`crate::Renderer::flush_paint_effects`] at the next paint
    /// opportunity.
    fn request_paint(&self);
}

/// Provides timing for the paint fallback deadline.
pub trait Clock: Send + Sync {
    /// Milliseconds elapsed since an arbitrary fixed origin.
    fn now_millis(&self) -> u64;
}

/// Default batching strategy: a pure no-op signal. The host polls
/// [`crate::Renderer::needs_flush`] from its own loop.
#[derive(Default)]
pub struct DeferredScheduler;

impl FlushScheduler for DeferredScheduler {
    fn schedule_flush(&self) {}
}

/// Default paint signal: a pure no-op. The host drives paint flushes,
/// and the fallback deadline guarantees progress regardless.
#[derive(Default)]
pub struct DeferredPaint;

impl PaintScheduler for DeferredPaint {
    fn request_paint(&self) {}
}

pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}
