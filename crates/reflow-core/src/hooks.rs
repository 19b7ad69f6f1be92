//! Hook runtime: a growable, call-order-addressed store of state
//! cells attached to each component instance.
//!
//! Cells are addressed strictly by the position at which they were
//! requested during a render, so a component must issue the same
//! sequence of hook calls on every render of a given instance. The
//! store cannot detect a reordering, only a changed count — debug
//! builds flag that as a programming error.

use std::any::Any;
use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::component::{request_render, ComponentHandle, InstanceInner};
use crate::error::RenderError;
use crate::host::{Event, EventHandler};
use crate::PropValue;

thread_local! {
    static CURRENT: RefCell<Vec<ComponentHandle>> = RefCell::new(Vec::new());
}

pub(crate) fn install(instance: &ComponentHandle) {
    CURRENT.with(|stack| stack.borrow_mut().push(Rc::clone(instance)));
}

pub(crate) fn uninstall() {
    CURRENT.with(|stack| {
        stack.borrow_mut().pop();
    });
}

fn with_current<R>(f: impl FnOnce(&ComponentHandle) -> R) -> R {
    let instance = CURRENT.with(|stack| {
        stack
            .borrow()
            .last()
            .cloned()
            .expect("hook used outside a component render")
    });
    f(&instance)
}

/// Dependency list for memo and effect cells. `always()` (no list)
/// recomputes on every render; an element-wise difference from the
/// previous list recomputes; so does the very first call.
#[derive(Clone, Debug)]
pub struct Deps(pub(crate) Option<Vec<PropValue>>);

impl Deps {
    pub fn always() -> Self {
        Self(None)
    }

    pub fn empty() -> Self {
        Self(Some(Vec::new()))
    }

    pub fn list(values: impl IntoIterator<Item = PropValue>) -> Self {
        Self(Some(values.into_iter().collect()))
    }
}

impl From<Vec<PropValue>> for Deps {
    fn from(values: Vec<PropValue>) -> Self {
        Self(Some(values))
    }
}

/// Build a [`Deps`] list from values convertible to [`PropValue`].
#[macro_export]
macro_rules! deps {
    () => {
        $crate::Deps::empty()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Deps::list(vec![$($crate::PropValue::from($value)),+])
    };
}

fn deps_changed(prev: &Option<Vec<PropValue>>, next: &Option<Vec<PropValue>>) -> bool {
    match (prev, next) {
        (Some(prev), Some(next)) => {
            prev.len() != next.len() || prev.iter().zip(next).any(|(a, b)| a != b)
        }
        _ => true,
    }
}

pub(crate) struct StateSlot<T> {
    value: RefCell<T>,
}

pub(crate) type CleanupFn = Box<dyn FnOnce() -> Result<(), RenderError>>;
pub(crate) type EffectFn = Box<dyn FnOnce() -> Result<Cleanup, RenderError>>;

/// Teardown returned by an effect body; runs before the effect's next
/// execution and once on unmount.
pub struct Cleanup(Option<CleanupFn>);

impl Cleanup {
    pub fn none() -> Self {
        Self(None)
    }

    pub fn new(f: impl FnOnce() -> Result<(), RenderError> + 'static) -> Self {
        Self(Some(Box::new(f)))
    }
}

struct EffectCell {
    deps: Option<Vec<PropValue>>,
    run: Option<EffectFn>,
    cleanup: Option<CleanupFn>,
    layout: bool,
}

enum HookCell {
    State(Rc<dyn Any>),
    Memo {
        deps: Option<Vec<PropValue>>,
        value: Rc<dyn Any>,
    },
    Effect(EffectCell),
}

#[derive(Default)]
pub(crate) struct HookStore {
    cells: Vec<HookCell>,
    cursor: usize,
    prev_count: Option<usize>,
    pending_paint: Vec<usize>,
}

impl HookStore {
    fn advance(&mut self) -> usize {
        let index = self.cursor;
        self.cursor += 1;
        index
    }

    fn put(&mut self, index: usize, cell: HookCell) {
        if index < self.cells.len() {
            self.cells[index] = cell;
        } else {
            self.cells.push(cell);
        }
    }

    pub(crate) fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    pub(crate) fn check_cell_count(&mut self) {
        if let Some(previous) = self.prev_count {
            debug_assert_eq!(
                previous, self.cursor,
                "component issued a different number of hook calls than on its previous render"
            );
        }
        self.prev_count = Some(self.cursor);
    }

    fn state_slot<T: 'static>(&mut self, init: impl FnOnce() -> T) -> Rc<StateSlot<T>> {
        let index = self.advance();
        if let Some(HookCell::State(existing)) = self.cells.get(index) {
            if let Ok(slot) = Rc::clone(existing).downcast::<StateSlot<T>>() {
                return slot;
            }
        }
        let slot = Rc::new(StateSlot {
            value: RefCell::new(init()),
        });
        self.put(index, HookCell::State(slot.clone() as Rc<dyn Any>));
        slot
    }

    fn memo_slot<T: 'static>(&mut self, deps: Deps, compute: impl FnOnce() -> T) -> Rc<T> {
        let index = self.advance();
        if let Some(HookCell::Memo { deps: prev, value }) = self.cells.get(index) {
            if !deps_changed(prev, &deps.0) {
                if let Ok(cached) = Rc::clone(value).downcast::<T>() {
                    return cached;
                }
            }
        }
        let value = Rc::new(compute());
        self.put(
            index,
            HookCell::Memo {
                deps: deps.0,
                value: value.clone() as Rc<dyn Any>,
            },
        );
        value
    }

    fn effect_slot(&mut self, deps: Deps, layout: bool, body: EffectFn) {
        let index = self.advance();
        if let Some(HookCell::Effect(cell)) = self.cells.get_mut(index) {
            if deps_changed(&cell.deps, &deps.0) {
                cell.deps = deps.0;
                cell.run = Some(body);
                cell.layout = layout;
            }
            return;
        }
        self.put(
            index,
            HookCell::Effect(EffectCell {
                deps: deps.0,
                run: Some(body),
                cleanup: None,
                layout,
            }),
        );
    }

    /// Cell indices with a pending body, partitioned into commit-time
    /// and post-paint batches, in declared order.
    fn pending_effects(&self) -> (Vec<usize>, Vec<usize>) {
        let mut layout = Vec::new();
        let mut paint = Vec::new();
        for (index, cell) in self.cells.iter().enumerate() {
            if let HookCell::Effect(effect) = cell {
                if effect.run.is_some() {
                    if effect.layout {
                        layout.push(index);
                    } else {
                        paint.push(index);
                    }
                }
            }
        }
        (layout, paint)
    }

    fn take_cleanup(&mut self, index: usize) -> Option<CleanupFn> {
        match self.cells.get_mut(index) {
            Some(HookCell::Effect(cell)) => cell.cleanup.take(),
            _ => None,
        }
    }

    fn take_run(&mut self, index: usize) -> Option<EffectFn> {
        match self.cells.get_mut(index) {
            Some(HookCell::Effect(cell)) => cell.run.take(),
            _ => None,
        }
    }

    fn store_cleanup(&mut self, index: usize, cleanup: Option<CleanupFn>) {
        if let Some(HookCell::Effect(cell)) = self.cells.get_mut(index) {
            cell.cleanup = cleanup;
        }
    }

    fn drain_cleanups(&mut self) -> Vec<CleanupFn> {
        self.pending_paint.clear();
        self.cells
            .iter_mut()
            .filter_map(|cell| match cell {
                HookCell::Effect(effect) => {
                    effect.run = None;
                    effect.cleanup.take()
                }
                _ => None,
            })
            .collect()
    }
}

impl InstanceInner {
    pub(crate) fn begin_render(&self) {
        self.hooks.borrow_mut().reset_cursor();
    }

    pub(crate) fn end_render(&self) {
        self.hooks.borrow_mut().check_cell_count();
    }

    /// Queue this render's pending effects: commit-time ones onto the
    /// post-commit callback list, post-paint ones onto the instance's
    /// paint batch. Returns whether a paint flush is needed.
    pub(crate) fn schedule_effects(&self) -> bool {
        let (layout, paint) = self.hooks.borrow().pending_effects();
        for index in layout {
            self.push_render_callback(Box::new(move |instance| instance.run_effect_cell(index)));
        }
        if paint.is_empty() {
            return false;
        }
        self.hooks.borrow_mut().pending_paint.extend(paint);
        true
    }

    /// Run one effect cell: previous cleanup first, then the body,
    /// storing the body's new cleanup.
    pub(crate) fn run_effect_cell(&self, index: usize) -> Result<(), RenderError> {
        let (cleanup, body) = {
            let mut hooks = self.hooks.borrow_mut();
            (hooks.take_cleanup(index), hooks.take_run(index))
        };
        if let Some(cleanup) = cleanup {
            cleanup()?;
        }
        if let Some(body) = body {
            let next = body()?;
            self.hooks.borrow_mut().store_cleanup(index, next.0);
        }
        Ok(())
    }

    /// Flush this instance's post-paint batch: all cleanups, then all
    /// bodies, both in declared order. An error abandons the rest of
    /// the batch (it has already been drained) and is routed by the
    /// caller.
    pub(crate) fn flush_pending_effects(&self) -> Result<(), RenderError> {
        let pending = std::mem::take(&mut self.hooks.borrow_mut().pending_paint);
        for &index in &pending {
            let cleanup = self.hooks.borrow_mut().take_cleanup(index);
            if let Some(cleanup) = cleanup {
                cleanup()?;
            }
        }
        for &index in &pending {
            let body = self.hooks.borrow_mut().take_run(index);
            if let Some(body) = body {
                let next = body()?;
                self.hooks.borrow_mut().store_cleanup(index, next.0);
            }
        }
        Ok(())
    }

    /// Unmount path: run every stored cleanup once, in registration
    /// order, isolating failures per cell.
    pub(crate) fn teardown_hooks(&self) -> Vec<RenderError> {
        let cleanups = self.hooks.borrow_mut().drain_cleanups();
        let mut errors = Vec::new();
        for cleanup in cleanups {
            if let Err(error) = cleanup() {
                log::warn!("effect cleanup failed during unmount: {error}");
                errors.push(error);
            }
        }
        errors
    }
}

/// A state cell: returns the current value and a setter bound to the
/// owning instance. Setting a value equal to the current one (by
/// `PartialEq`) neither mutates the cell nor schedules a re-render.
pub fn use_state<T>(init: impl FnOnce() -> T) -> (T, StateSetter<T>)
where
    T: Clone + PartialEq + 'static,
{
    with_current(|instance| {
        let slot = instance.hooks.borrow_mut().state_slot(init);
        let value = slot.value.borrow().clone();
        let setter = StateSetter {
            slot,
            instance: Rc::downgrade(instance),
        };
        (value, setter)
    })
}

pub struct StateSetter<T> {
    slot: Rc<StateSlot<T>>,
    instance: Weak<InstanceInner>,
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
            instance: self.instance.clone(),
        }
    }
}

impl<T: PartialEq + 'static> StateSetter<T> {
    pub fn set(&self, next: T) {
        {
            if *self.slot.value.borrow() == next {
                return;
            }
        }
        *self.slot.value.borrow_mut() = next;
        if let Some(instance) = self.instance.upgrade() {
            request_render(&instance);
        }
    }

    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = {
            let current = self.slot.value.borrow();
            f(&current)
        };
        self.set(next);
    }
}

/// The reducer form of a state cell.
pub fn use_reducer<S, A>(reducer: fn(&S, A) -> S, init: impl FnOnce() -> S) -> (S, Dispatch<S, A>)
where
    S: Clone + PartialEq + 'static,
    A: 'static,
{
    with_current(|instance| {
        let slot = instance.hooks.borrow_mut().state_slot(init);
        let value = slot.value.borrow().clone();
        let dispatch = Dispatch {
            slot,
            instance: Rc::downgrade(instance),
            reducer,
        };
        (value, dispatch)
    })
}

pub struct Dispatch<S, A> {
    slot: Rc<StateSlot<S>>,
    instance: Weak<InstanceInner>,
    reducer: fn(&S, A) -> S,
}

impl<S, A> Clone for Dispatch<S, A> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
            instance: self.instance.clone(),
            reducer: self.reducer,
        }
    }
}

impl<S: PartialEq + 'static, A> Dispatch<S, A> {
    pub fn dispatch(&self, action: A) {
        let next = {
            let current = self.slot.value.borrow();
            (self.reducer)(&current, action)
        };
        {
            if *self.slot.value.borrow() == next {
                return;
            }
        }
        *self.slot.value.borrow_mut() = next;
        if let Some(instance) = self.instance.upgrade() {
            request_render(&instance);
        }
    }
}

/// A memo cell: recomputes only when the dependency list changes.
pub fn use_memo<T: 'static>(deps: Deps, compute: impl FnOnce() -> T) -> Rc<T> {
    with_current(|instance| instance.hooks.borrow_mut().memo_slot(deps, compute))
}

/// Stable-callback primitive: memoization of the handler reference
/// itself, so an unchanged dependency list keeps listener identity and
/// the attribute differ leaves the host listener untouched.
pub fn use_callback(deps: Deps, f: impl Fn(&Event) + 'static) -> EventHandler {
    let handler = use_memo(deps, || EventHandler::new(f));
    (*handler).clone()
}

/// A mutable cell with stable identity across renders.
pub fn use_ref<T: 'static>(init: impl FnOnce() -> T) -> Rc<RefCell<T>> {
    use_memo(Deps::empty(), || RefCell::new(init()))
}

/// Deferred effect, run after the host has painted.
pub fn use_effect(deps: Deps, effect: impl FnOnce() -> Result<Cleanup, RenderError> + 'static) {
    with_current(|instance| {
        instance
            .hooks
            .borrow_mut()
            .effect_slot(deps, false, Box::new(effect));
    });
}

/// Deferred effect, run at commit time, before paint.
pub fn use_layout_effect(
    deps: Deps,
    effect: impl FnOnce() -> Result<Cleanup, RenderError> + 'static,
) {
    with_current(|instance| {
        instance
            .hooks
            .borrow_mut()
            .effect_slot(deps, true, Box::new(effect));
    });
}

/// Read a named context value provided by an ancestor.
pub fn use_context(name: &str) -> Option<PropValue> {
    with_current(|instance| instance.context.borrow().get(name))
}
