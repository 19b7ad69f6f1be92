use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::collections::map::HashSet;
use crate::component::{ComponentHandle, InstanceId, InstanceInner};
use crate::platform::{Clock, DeferredPaint, DeferredScheduler, FlushScheduler, PaintScheduler, SystemClock};

/// Milliseconds after which paint-deferred effects are flushed even if
/// no paint signal ever arrives.
pub const PAINT_FALLBACK_MS: u64 = 100;

struct RuntimeInner {
    flush: RefCell<Arc<dyn FlushScheduler>>,
    paint: RefCell<Arc<dyn PaintScheduler>>,
    clock: RefCell<Arc<dyn Clock>>,
    dirty: RefCell<Vec<Weak<InstanceInner>>>,
    dirty_ids: RefCell<HashSet<InstanceId>>,
    armed_strategy: Cell<usize>,
    paint_pending: RefCell<Vec<Weak<InstanceInner>>>,
    paint_ids: RefCell<HashSet<InstanceId>>,
    paint_requested: Cell<bool>,
    paint_deadline: Cell<Option<u64>>,
}

impl RuntimeInner {
    fn new(flush: Arc<dyn FlushScheduler>) -> Self {
        Self {
            flush: RefCell::new(flush),
            paint: RefCell::new(Arc::new(DeferredPaint)),
            clock: RefCell::new(Arc::new(SystemClock::new())),
            dirty: RefCell::new(Vec::new()),
            dirty_ids: RefCell::new(HashSet::new()),
            armed_strategy: Cell::new(0),
            paint_pending: RefCell::new(Vec::new()),
            paint_ids: RefCell::new(HashSet::new()),
            paint_requested: Cell::new(false),
            paint_deadline: Cell::new(None),
        }
    }

    fn strategy_ptr(&self) -> usize {
        Arc::as_ptr(&*self.flush.borrow()) as *const () as usize
    }

    fn enqueue_dirty(&self, instance: &ComponentHandle) {
        if !self.dirty_ids.borrow_mut().insert(instance.id()) {
            return;
        }
        let was_empty = {
            let mut dirty = self.dirty.borrow_mut();
            let was_empty = dirty.is_empty();
            dirty.push(Rc::downgrade(instance));
            was_empty
        };
        // Arm the batching strategy on the first pending entry, or
        // whenever the strategy object changed since the last arm.
        let current = self.strategy_ptr();
        if was_empty || self.armed_strategy.replace(current) != current {
            self.armed_strategy.set(current);
            self.flush.borrow().schedule_flush();
        }
    }

    fn take_dirty(&self) -> Vec<ComponentHandle> {
        let entries: Vec<Weak<InstanceInner>> = self.dirty.borrow_mut().drain(..).collect();
        self.dirty_ids.borrow_mut().clear();
        entries.iter().filter_map(Weak::upgrade).collect()
    }

    fn enqueue_paint(&self, instance: &ComponentHandle) {
        if self.paint_ids.borrow_mut().insert(instance.id()) {
            self.paint_pending.borrow_mut().push(Rc::downgrade(instance));
        }
        if !self.paint_requested.replace(true) {
            let now = self.clock.borrow().now_millis();
            self.paint_deadline.set(Some(now + PAINT_FALLBACK_MS));
            self.paint.borrow().request_paint();
        }
    }

    fn take_paint(&self) -> Vec<ComponentHandle> {
        let entries: Vec<Weak<InstanceInner>> = self.paint_pending.borrow_mut().drain(..).collect();
        self.paint_ids.borrow_mut().clear();
        self.paint_requested.set(false);
        self.paint_deadline.set(None);
        entries.iter().filter_map(Weak::upgrade).collect()
    }

    fn paint_overdue(&self) -> bool {
        match self.paint_deadline.get() {
            Some(deadline) => self.clock.borrow().now_millis() >= deadline,
            None => false,
        }
    }
}

/// The process-wide render queue, wrapped as an explicit object so the
/// batching strategy and clock are injectable and tests can drive it
/// deterministically.
#[derive(Clone)]
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn new(flush: Arc<dyn FlushScheduler>) -> Self {
        Self {
            inner: Rc::new(RuntimeInner::new(flush)),
        }
    }

    pub fn handle(&self) -> RuntimeHandle {
        RuntimeHandle(Rc::downgrade(&self.inner))
    }

    pub fn set_flush_scheduler(&self, flush: Arc<dyn FlushScheduler>) {
        *self.inner.flush.borrow_mut() = flush;
    }

    pub fn set_paint_scheduler(&self, paint: Arc<dyn PaintScheduler>) {
        *self.inner.paint.borrow_mut() = paint;
    }

    pub fn set_clock(&self, clock: Arc<dyn Clock>) {
        *self.inner.clock.borrow_mut() = clock;
    }

    pub fn has_dirty(&self) -> bool {
        !self.inner.dirty_ids.borrow().is_empty()
    }

    pub fn has_paint_pending(&self) -> bool {
        !self.inner.paint_ids.borrow().is_empty()
    }

    pub(crate) fn take_dirty(&self) -> Vec<ComponentHandle> {
        self.inner.take_dirty()
    }

    pub(crate) fn take_paint(&self) -> Vec<ComponentHandle> {
        self.inner.take_paint()
    }

    pub(crate) fn paint_overdue(&self) -> bool {
        self.inner.paint_overdue()
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new(Arc::new(DeferredScheduler))
    }
}

#[derive(Clone)]
pub struct RuntimeHandle(Weak<RuntimeInner>);

impl RuntimeHandle {
    pub(crate) fn enqueue_dirty(&self, instance: &ComponentHandle) {
        if let Some(inner) = self.0.upgrade() {
            inner.enqueue_dirty(instance);
        }
    }

    pub(crate) fn enqueue_paint(&self, instance: &ComponentHandle) {
        if let Some(inner) = self.0.upgrade() {
            inner.enqueue_paint(instance);
        }
    }

    pub fn has_dirty(&self) -> bool {
        self.0
            .upgrade()
            .map(|inner| !inner.dirty_ids.borrow().is_empty())
            .unwrap_or(false)
    }
}
