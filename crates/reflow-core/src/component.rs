//! Stateful component runtime: the lifecycle trait, per-instance
//! mutable state, and the update handles user code schedules renders
//! through.

use std::any::TypeId;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::error::RenderError;
use crate::hooks::HookStore;
use crate::host::HostId;
use crate::runtime::RuntimeHandle;
use crate::{Context, ContextMap, Props, PropValue, StateMap, VNode, VNodeId};

/// A plain function component. Identity (for matching across renders)
/// is the function pointer itself; per-instance state comes from the
/// hook runtime.
pub type ComponentFn = fn(&Props) -> Result<VNode, RenderError>;

/// A stateful component. Every method except `render` has a no-op
/// default.
///
/// `derive_state` returning `Some` counts as declaring the
/// derive-from-props step: when it is declared, the legacy
/// `will_mount`/`will_receive_props` hooks are not invoked for that
/// pass.
pub trait Component: 'static {
    fn render(&self, ctx: &ComponentCtx) -> Result<VNode, RenderError>;

    /// Pure mapping from the incoming props (and current staged state)
    /// to a partial state, applied before every render of the
    /// instance.
    fn derive_state(&self, _next_props: &Props, _state: &StateMap) -> Option<StateMap> {
        None
    }

    fn will_mount(&mut self, _ctx: &ComponentCtx) -> Result<(), RenderError> {
        Ok(())
    }

    fn did_mount(&mut self, _ctx: &ComponentCtx) -> Result<(), RenderError> {
        Ok(())
    }

    fn will_receive_props(
        &mut self,
        _ctx: &ComponentCtx,
        _next_props: &Props,
    ) -> Result<(), RenderError> {
        Ok(())
    }

    /// Veto hook: returning `false` skips the re-render and reuses the
    /// previous subtree. Ignored when a forced update was requested.
    fn should_update(
        &self,
        _ctx: &ComponentCtx,
        _next_props: &Props,
        _next_state: &StateMap,
    ) -> bool {
        true
    }

    fn will_update(
        &mut self,
        _ctx: &ComponentCtx,
        _next_props: &Props,
        _next_state: &StateMap,
    ) -> Result<(), RenderError> {
        Ok(())
    }

    fn did_update(
        &mut self,
        _ctx: &ComponentCtx,
        _prev_props: &Props,
        _prev_state: &StateMap,
        _snapshot: Option<PropValue>,
    ) -> Result<(), RenderError> {
        Ok(())
    }

    /// Captured after render but before the host tree is touched;
    /// handed back to `did_update`.
    fn snapshot_before_update(
        &self,
        _ctx: &ComponentCtx,
        _prev_props: &Props,
        _prev_state: &StateMap,
    ) -> Option<PropValue> {
        None
    }

    fn will_unmount(&mut self) -> Result<(), RenderError> {
        Ok(())
    }

    /// Error-to-state mapping for a descendant failure. Returning
    /// `Some` makes this instance a boundary for that error.
    fn derive_state_from_error(&self, _error: &RenderError) -> Option<StateMap> {
        None
    }

    /// Error observation hook. Return `true` to mark the error as
    /// handled by this instance.
    fn did_catch(&mut self, _error: &RenderError) -> bool {
        false
    }

    /// Additional context entries merged into the context seen by the
    /// rendered subtree.
    fn child_context(&self, _ctx: &ComponentCtx) -> Option<ContextMap> {
        None
    }
}

/// Constructor for a stateful component node. Matching across renders
/// uses the component's `TypeId`, so two nodes built from different
/// spec values of the same component type still pair up.
#[derive(Clone)]
pub struct StatefulSpec {
    type_id: TypeId,
    name: &'static str,
    make: Rc<dyn Fn() -> Box<dyn Component>>,
}

impl StatefulSpec {
    pub fn of<C: Component + Default>() -> Self {
        Self {
            type_id: TypeId::of::<C>(),
            name: std::any::type_name::<C>(),
            make: Rc::new(|| Box::new(C::default())),
        }
    }

    pub fn with<C: Component>(init: impl Fn() -> C + 'static) -> Self {
        Self {
            type_id: TypeId::of::<C>(),
            name: std::any::type_name::<C>(),
            make: Rc::new(move || Box::new(init())),
        }
    }

    pub(crate) fn same_type(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }

    pub(crate) fn instantiate(&self) -> Box<dyn Component> {
        (self.make)()
    }
}

impl fmt::Debug for StatefulSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatefulSpec({})", self.name)
    }
}

pub(crate) enum ComponentBody {
    Function(ComponentFn),
    Stateful(Box<dyn Component>),
}

pub(crate) type InstanceId = usize;

static NEXT_INSTANCE_ID: std::sync::atomic::AtomicUsize = std::sync::atomic::AtomicUsize::new(1);

pub(crate) type RenderCallback = Box<dyn FnOnce(&ComponentHandle) -> Result<(), RenderError>>;

/// One live component instance. Owned by the tree node that created
/// it and carried across renders of nodes matching by key and type.
pub(crate) struct InstanceInner {
    id: InstanceId,
    pub(crate) body: RefCell<ComponentBody>,
    pub(crate) props: RefCell<Props>,
    pub(crate) state: RefCell<StateMap>,
    pub(crate) next_state: RefCell<Option<StateMap>>,
    pub(crate) context: RefCell<Context>,
    pub(crate) dirty: Cell<bool>,
    pub(crate) force: Cell<bool>,
    pub(crate) vnode: Cell<Option<VNodeId>>,
    pub(crate) depth: Cell<u32>,
    pub(crate) parent_host: Cell<Option<HostId>>,
    pub(crate) hooks: RefCell<HookStore>,
    pub(crate) render_callbacks: RefCell<Vec<RenderCallback>>,
    pub(crate) processing_error: Cell<bool>,
    pub(crate) runtime: RuntimeHandle,
}

pub(crate) type ComponentHandle = Rc<InstanceInner>;

impl InstanceInner {
    pub(crate) fn create(
        body: ComponentBody,
        props: Props,
        context: Context,
        runtime: RuntimeHandle,
        depth: u32,
        parent_host: HostId,
    ) -> ComponentHandle {
        Rc::new(Self {
            id: NEXT_INSTANCE_ID.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            body: RefCell::new(body),
            props: RefCell::new(props),
            state: RefCell::new(StateMap::default()),
            next_state: RefCell::new(None),
            context: RefCell::new(context),
            dirty: Cell::new(false),
            force: Cell::new(false),
            vnode: Cell::new(None),
            depth: Cell::new(depth),
            parent_host: Cell::new(Some(parent_host)),
            hooks: RefCell::new(HookStore::default()),
            render_callbacks: RefCell::new(Vec::new()),
            processing_error: Cell::new(false),
            runtime,
        })
    }

    pub(crate) fn id(&self) -> InstanceId {
        self.id
    }

    pub(crate) fn is_stateful(&self) -> bool {
        matches!(&*self.body.borrow(), ComponentBody::Stateful(_))
    }

    /// Merge a partial state into the staged state, creating the stage
    /// from the committed state on first touch.
    pub(crate) fn merge_staged(&self, partial: StateMap) {
        let mut staged = self.next_state.borrow_mut();
        let target = staged.get_or_insert_with(|| self.state.borrow().clone());
        for (key, value) in partial {
            target.insert(key, value);
        }
    }

    /// The state the upcoming render will observe.
    pub(crate) fn staged_view(&self) -> StateMap {
        self.next_state
            .borrow()
            .clone()
            .unwrap_or_else(|| self.state.borrow().clone())
    }

    pub(crate) fn commit_staged(&self) {
        if let Some(staged) = self.next_state.borrow_mut().take() {
            *self.state.borrow_mut() = staged;
        }
    }

    pub(crate) fn push_render_callback(&self, callback: RenderCallback) {
        self.render_callbacks.borrow_mut().push(callback);
    }

    pub(crate) fn has_render_callbacks(&self) -> bool {
        !self.render_callbacks.borrow().is_empty()
    }

    pub(crate) fn take_render_callbacks(&self) -> Vec<RenderCallback> {
        std::mem::take(&mut *self.render_callbacks.borrow_mut())
    }

    pub(crate) fn dispose(&self) {
        self.vnode.set(None);
        self.parent_host.set(None);
        self.dirty.set(false);
    }
}

/// Enqueue a re-render of `instance`, deduplicated by its dirty flag.
pub(crate) fn request_render(instance: &ComponentHandle) {
    if instance.vnode.get().is_none() {
        return;
    }
    if instance.dirty.replace(true) {
        return;
    }
    instance.runtime.enqueue_dirty(instance);
}

/// What user code sees of its own instance while rendering or inside
/// a lifecycle hook.
#[derive(Clone)]
pub struct ComponentCtx {
    inner: ComponentHandle,
}

impl ComponentCtx {
    pub(crate) fn new(instance: &ComponentHandle) -> Self {
        Self {
            inner: Rc::clone(instance),
        }
    }

    pub fn props(&self) -> Props {
        self.inner.props.borrow().clone()
    }

    pub fn state(&self) -> StateMap {
        self.inner.state.borrow().clone()
    }

    pub fn state_value(&self, name: &str) -> Option<PropValue> {
        self.inner.state.borrow().get(name).cloned()
    }

    pub fn context(&self) -> Context {
        self.inner.context.borrow().clone()
    }

    pub fn update_handle(&self) -> UpdateHandle {
        UpdateHandle {
            inner: Rc::downgrade(&self.inner),
        }
    }

    pub fn set_state(&self, partial: StateMap) {
        self.update_handle().set_state(partial);
    }

    pub fn force_update(&self) {
        self.update_handle().force_update();
    }
}

/// A weak handle for scheduling updates against an instance from
/// outside a render pass (event handlers, timers, effects).
#[derive(Clone)]
pub struct UpdateHandle {
    inner: Weak<InstanceInner>,
}

impl fmt::Debug for UpdateHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("UpdateHandle")
    }
}

impl UpdateHandle {
    /// Shallow-merge a partial state and schedule a re-render.
    pub fn set_state(&self, partial: StateMap) {
        let Some(instance) = self.inner.upgrade() else {
            return;
        };
        instance.merge_staged(partial);
        request_render(&instance);
    }

    /// Compute the partial from the staged state and current props;
    /// returning `None` drops the request entirely.
    pub fn set_state_with(
        &self,
        update: impl FnOnce(&StateMap, &Props) -> Option<StateMap>,
    ) {
        let Some(instance) = self.inner.upgrade() else {
            return;
        };
        let staged = instance.staged_view();
        let props = instance.props.borrow().clone();
        let Some(partial) = update(&staged, &props) else {
            return;
        };
        instance.merge_staged(partial);
        request_render(&instance);
    }

    /// Like `set_state`, with a callback invoked once the update has
    /// been committed to the host tree.
    pub fn set_state_then(&self, partial: StateMap, callback: impl FnOnce() + 'static) {
        let Some(instance) = self.inner.upgrade() else {
            return;
        };
        instance.merge_staged(partial);
        instance.push_render_callback(Box::new(move |_| {
            callback();
            Ok(())
        }));
        request_render(&instance);
    }

    /// Re-render bypassing the `should_update` veto; nothing else is
    /// skipped.
    pub fn force_update(&self) {
        let Some(instance) = self.inner.upgrade() else {
            return;
        };
        instance.force.set(true);
        request_render(&instance);
    }
}

/// Build a partial state from literal entries.
pub fn state_map<I, V>(entries: I) -> StateMap
where
    I: IntoIterator<Item = (&'static str, V)>,
    V: Into<PropValue>,
{
    entries
        .into_iter()
        .map(|(key, value)| (Rc::from(key), value.into()))
        .collect()
}
