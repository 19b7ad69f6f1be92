#![doc = r"Declarative tree reconciliation engine.

A caller describes the desired tree as immutable [`VNode`] values; the
[`Renderer`] diffs each new description against the previous one and
issues the minimal set of mutations against a [`host::HostAdapter`],
while managing component lifecycle, per-instance hook state, update
batching and error-boundary recovery."]

pub mod collections;
pub mod component;
mod diff;
mod error;
pub mod hash;
pub mod hooks;
pub mod host;
pub mod platform;
pub mod runtime;

pub use component::{
    state_map, Component, ComponentCtx, ComponentFn, StatefulSpec, UpdateHandle,
};
pub use error::RenderError;
pub use hooks::{
    use_callback, use_context, use_effect, use_layout_effect, use_memo, use_reducer, use_ref,
    use_state, Cleanup, Deps, Dispatch, StateSetter,
};
pub use host::{Event, EventHandler, HostAdapter, HostDesc, HostError, HostId, HostOp, MemoryHost};
pub use platform::{Clock, DeferredPaint, DeferredScheduler, FlushScheduler, PaintScheduler, SystemClock};
pub use runtime::{Runtime, RuntimeHandle, PAINT_FALLBACK_MS};

use std::cell::RefCell;
use std::fmt;
use std::hash::Hash;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::IndexMap;

use component::{request_render, ComponentBody, ComponentHandle};

#[cfg(test)]
mod tests;

pub type Key = u64;
pub type VNodeId = usize;
pub(crate) type Stamp = u64;

pub type AttrMap = IndexMap<Rc<str>, PropValue>;
pub type StyleMap = IndexMap<Rc<str>, Rc<str>>;
pub type StateMap = IndexMap<Rc<str>, PropValue>;

static NEXT_STAMP: AtomicU64 = AtomicU64::new(1);

fn next_stamp() -> Stamp {
    NEXT_STAMP.fetch_add(1, Ordering::Relaxed)
}

/// Hash any value into a child identity key.
pub fn key_of<K: Hash>(key: &K) -> Key {
    hash::hash_one(key)
}

/// One attribute or state value. Equality is value equality except for
/// handlers, which compare by callback identity.
#[derive(Clone, Debug)]
pub enum PropValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Rc<str>),
    Style(Rc<StyleMap>),
    Handler(EventHandler),
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a == b,
            (Self::Str(a), Self::Str(b)) => a == b,
            (Self::Style(a), Self::Style(b)) => a == b,
            (Self::Handler(a), Self::Handler(b)) => a == b,
            _ => false,
        }
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for PropValue {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        Self::Str(Rc::from(v))
    }
}

impl From<String> for PropValue {
    fn from(v: String) -> Self {
        Self::Str(Rc::from(v))
    }
}

impl From<Rc<str>> for PropValue {
    fn from(v: Rc<str>) -> Self {
        Self::Str(v)
    }
}

impl From<EventHandler> for PropValue {
    fn from(v: EventHandler) -> Self {
        Self::Handler(v)
    }
}

/// The value handed to a [`Ref`] when its node is attached.
#[derive(Clone, Debug)]
pub enum RefValue {
    Host(HostId),
    Instance(UpdateHandle),
}

enum RefImpl {
    Cell(RefCell<Option<RefValue>>),
    Callback(Box<dyn Fn(Option<RefValue>) -> Result<(), RenderError>>),
}

/// Output binding for a node: either a readable cell or a callback
/// invoked with `Some` on attach and `None` on detach.
#[derive(Clone)]
pub struct Ref {
    inner: Rc<RefImpl>,
}

impl Ref {
    pub fn cell() -> Self {
        Self {
            inner: Rc::new(RefImpl::Cell(RefCell::new(None))),
        }
    }

    pub fn callback(f: impl Fn(Option<RefValue>) -> Result<(), RenderError> + 'static) -> Self {
        Self {
            inner: Rc::new(RefImpl::Callback(Box::new(f))),
        }
    }

    /// Current value of a cell ref; always `None` for callback refs.
    pub fn get(&self) -> Option<RefValue> {
        match &*self.inner {
            RefImpl::Cell(cell) => cell.borrow().clone(),
            RefImpl::Callback(_) => None,
        }
    }

    pub(crate) fn apply(&self, value: Option<RefValue>) -> Result<(), RenderError> {
        match &*self.inner {
            RefImpl::Cell(cell) => {
                *cell.borrow_mut() = value;
                Ok(())
            }
            RefImpl::Callback(f) => f(value),
        }
    }
}

impl PartialEq for Ref {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Ref {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &*self.inner {
            RefImpl::Cell(_) => write!(f, "Ref::cell"),
            RefImpl::Callback(_) => write!(f, "Ref::callback"),
        }
    }
}

pub type ContextMap = collections::map::HashMap<Rc<str>, PropValue>;

/// Named values passed down through the tree, extended by components
/// that declare a child-context contribution.
#[derive(Clone, Default, Debug)]
pub struct Context {
    values: Rc<ContextMap>,
}

impl Context {
    pub fn from_entries<I, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, V)>,
        V: Into<PropValue>,
    {
        Self {
            values: Rc::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (Rc::from(k), v.into()))
                    .collect(),
            ),
        }
    }

    pub fn get(&self, name: &str) -> Option<PropValue> {
        self.values.get(name).cloned()
    }

    pub(crate) fn merged(&self, extra: ContextMap) -> Self {
        let mut values: ContextMap = (*self.values).clone();
        values.extend(extra);
        Self {
            values: Rc::new(values),
        }
    }
}

/// The tag of a declarative node. Component dispatch switches on this
/// variant, never on runtime shape inspection.
#[derive(Clone, Debug)]
pub enum NodeKind {
    HostTag(Rc<str>),
    TextLeaf,
    Function(ComponentFn),
    Stateful(StatefulSpec),
    Fragment,
}

impl NodeKind {
    pub(crate) fn same_type(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::HostTag(a), Self::HostTag(b)) => a == b,
            (Self::TextLeaf, Self::TextLeaf) => true,
            (Self::Function(a), Self::Function(b)) => *a == *b,
            (Self::Stateful(a), Self::Stateful(b)) => a.same_type(b),
            (Self::Fragment, Self::Fragment) => true,
            _ => false,
        }
    }

    pub(crate) fn is_host(&self) -> bool {
        matches!(self, Self::HostTag(_) | Self::TextLeaf)
    }

    pub(crate) fn is_component(&self) -> bool {
        !self.is_host()
    }
}

/// Attribute and child-bearing data of a node. The reserved child
/// list, key and ref never appear among the generic attributes; a
/// `None` child slot renders nothing but still occupies its position
/// in the list.
#[derive(Clone, Debug, Default)]
pub struct Props {
    attrs: AttrMap,
    children: Vec<Option<VNode>>,
    text: Option<Rc<str>>,
    namespace: Option<Rc<str>>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.attrs.insert(Rc::from(name), value.into());
        self
    }

    pub fn on(mut self, event: &str, f: impl Fn(&Event) + 'static) -> Self {
        self.attrs
            .insert(Rc::from(event), PropValue::Handler(EventHandler::new(f)));
        self
    }

    pub fn handler(mut self, event: &str, handler: EventHandler) -> Self {
        self.attrs
            .insert(Rc::from(event), PropValue::Handler(handler));
        self
    }

    pub fn child(mut self, child: impl Into<VNode>) -> Self {
        self.children.push(Some(child.into()));
        self
    }

    pub fn maybe_child(mut self, child: Option<impl Into<VNode>>) -> Self {
        self.children.push(child.map(Into::into));
        self
    }

    /// A slot that renders nothing but preserves sibling identity.
    pub fn hole(mut self) -> Self {
        self.children.push(None);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = VNode>) -> Self {
        self.children.extend(children.into_iter().map(Some));
        self
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.attrs.get(name)
    }

    pub fn attrs(&self) -> &AttrMap {
        &self.attrs
    }

    pub fn child_slots(&self) -> &[Option<VNode>] {
        &self.children
    }

    pub fn text(&self) -> Option<&Rc<str>> {
        self.text.as_ref()
    }

    fn from_text(content: Rc<str>) -> Self {
        Self {
            text: Some(content),
            ..Self::default()
        }
    }
}

/// Immutable-per-pass description of a subtree. The stamp is assigned
/// once at construction and survives `clone`; handing the engine a
/// clone of the previous output is what makes it skip the subtree.
#[derive(Clone, Debug)]
pub struct VNode {
    kind: NodeKind,
    props: Props,
    key: Option<Key>,
    node_ref: Option<Ref>,
    stamp: Stamp,
}

impl VNode {
    fn new(kind: NodeKind, props: Props) -> Self {
        Self {
            kind,
            props,
            key: None,
            node_ref: None,
            stamp: next_stamp(),
        }
    }

    pub fn element(tag: &str) -> ElementBuilder {
        ElementBuilder {
            tag: Rc::from(tag),
            props: Props::default(),
            styles: StyleMap::default(),
            key: None,
            node_ref: None,
        }
    }

    pub fn text(content: impl Into<Rc<str>>) -> Self {
        Self::new(NodeKind::TextLeaf, Props::from_text(content.into()))
    }

    pub fn fragment(children: impl IntoIterator<Item = VNode>) -> Self {
        Self::new(NodeKind::Fragment, Props::new().children(children))
    }

    pub fn fragment_slots(children: impl IntoIterator<Item = Option<VNode>>) -> Self {
        let mut props = Props::default();
        props.children.extend(children);
        Self::new(NodeKind::Fragment, props)
    }

    pub fn function(component: ComponentFn, props: Props) -> Self {
        Self::new(NodeKind::Function(component), props)
    }

    pub fn stateful<C: Component + Default>(props: Props) -> Self {
        Self::new(NodeKind::Stateful(StatefulSpec::of::<C>()), props)
    }

    pub fn stateful_with<C: Component>(init: impl Fn() -> C + 'static, props: Props) -> Self {
        Self::new(NodeKind::Stateful(StatefulSpec::with(init)), props)
    }

    pub fn with_key(mut self, key: impl Hash) -> Self {
        self.key = Some(key_of(&key));
        self
    }

    pub fn with_ref(mut self, node_ref: Ref) -> Self {
        self.node_ref = Some(node_ref);
        self
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn key(&self) -> Option<Key> {
        self.key
    }

    /// Same description, fresh identity: used when re-rendering a
    /// component in place so the old and new node never fast-path
    /// match each other.
    pub(crate) fn renewed(&self) -> Self {
        let mut next = self.clone();
        next.stamp = next_stamp();
        next
    }
}

impl From<&str> for VNode {
    fn from(content: &str) -> Self {
        Self::text(content)
    }
}

impl From<String> for VNode {
    fn from(content: String) -> Self {
        Self::text(content)
    }
}

impl From<i64> for VNode {
    fn from(value: i64) -> Self {
        Self::text(value.to_string())
    }
}

impl From<f64> for VNode {
    fn from(value: f64) -> Self {
        Self::text(value.to_string())
    }
}

/// Builder for host-element nodes.
pub struct ElementBuilder {
    tag: Rc<str>,
    props: Props,
    styles: StyleMap,
    key: Option<Key>,
    node_ref: Option<Ref>,
}

impl ElementBuilder {
    pub fn attr(mut self, name: &str, value: impl Into<PropValue>) -> Self {
        self.props.attrs.insert(Rc::from(name), value.into());
        self
    }

    pub fn style(mut self, property: &str, value: &str) -> Self {
        self.styles.insert(Rc::from(property), Rc::from(value));
        self
    }

    pub fn on(mut self, event: &str, f: impl Fn(&Event) + 'static) -> Self {
        self.props = self.props.on(event, f);
        self
    }

    pub fn on_capture(mut self, event: &str, f: impl Fn(&Event) + 'static) -> Self {
        self.props = self.props.handler(event, EventHandler::capture(f));
        self
    }

    pub fn handler(mut self, event: &str, handler: EventHandler) -> Self {
        self.props = self.props.handler(event, handler);
        self
    }

    pub fn namespace(mut self, namespace: &str) -> Self {
        self.props.namespace = Some(Rc::from(namespace));
        self
    }

    pub fn key(mut self, key: impl Hash) -> Self {
        self.key = Some(key_of(&key));
        self
    }

    pub fn node_ref(mut self, node_ref: Ref) -> Self {
        self.node_ref = Some(node_ref);
        self
    }

    pub fn child(mut self, child: impl Into<VNode>) -> Self {
        self.props.children.push(Some(child.into()));
        self
    }

    pub fn maybe_child(mut self, child: Option<impl Into<VNode>>) -> Self {
        self.props.children.push(child.map(Into::into));
        self
    }

    pub fn hole(mut self) -> Self {
        self.props.children.push(None);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = VNode>) -> Self {
        self.props.children.extend(children.into_iter().map(Some));
        self
    }

    pub fn build(mut self) -> VNode {
        if !self.styles.is_empty() {
            self.props
                .attrs
                .insert(Rc::from("style"), PropValue::Style(Rc::new(self.styles)));
        }
        let mut node = VNode::new(NodeKind::HostTag(self.tag), self.props);
        node.key = self.key;
        node.node_ref = self.node_ref;
        node
    }
}

impl From<ElementBuilder> for VNode {
    fn from(builder: ElementBuilder) -> Self {
        builder.build()
    }
}

/// Instrumentation callbacks invoked synchronously at their named
/// points. Every method has a no-op default.
pub trait Extensions {
    fn before_diff(&self, _node: &VNode) {}
    fn before_render(&self, _node: &VNode) {}
    fn after_diff(&self, _node: &VNode) {}
    fn before_commit(&self, _node: &VNode) {}
    fn after_unmount(&self, _node: &VNode) {}
}

#[derive(Default)]
pub struct NoopExtensions;

impl Extensions for NoopExtensions {}

/// One entry of the live tree: the description plus engine-owned
/// linkage, addressed by index.
pub(crate) struct TreeNode {
    pub(crate) vnode: VNode,
    pub(crate) parent: Option<VNodeId>,
    pub(crate) depth: u32,
    pub(crate) children: Vec<Option<VNodeId>>,
    pub(crate) host: Option<HostId>,
    pub(crate) instance: Option<ComponentHandle>,
    /// Mutable copy of the description's stamp; zeroed when an error
    /// was caught at this node so the subtree never fast-path matches.
    pub(crate) stamp: Stamp,
    pub(crate) namespace: Option<Rc<str>>,
}

impl TreeNode {
    pub(crate) fn new(vnode: VNode, parent: Option<VNodeId>, depth: u32) -> Self {
        let stamp = vnode.stamp;
        Self {
            vnode,
            parent,
            depth,
            children: Vec::new(),
            host: None,
            instance: None,
            stamp,
            namespace: None,
        }
    }
}

#[derive(Default)]
pub(crate) struct NodeArena {
    slots: Vec<Option<TreeNode>>,
}

impl NodeArena {
    pub(crate) fn insert(&mut self, node: TreeNode) -> VNodeId {
        let id = self.slots.len();
        self.slots.push(Some(node));
        id
    }

    pub(crate) fn node(&self, id: VNodeId) -> &TreeNode {
        self.slots[id].as_ref().expect("tree node missing")
    }

    pub(crate) fn node_mut(&mut self, id: VNodeId) -> &mut TreeNode {
        self.slots[id].as_mut().expect("tree node missing")
    }

    pub(crate) fn release(&mut self, id: VNodeId) -> Option<TreeNode> {
        self.slots.get_mut(id).and_then(|slot| slot.take())
    }
}

pub(crate) struct DiffOut {
    pub(crate) host: Option<HostId>,
    /// Insertion point after this subtree, produced by component and
    /// fragment nodes so the parent list diff can resume after a
    /// subtree with no single host anchor.
    pub(crate) resume: Option<Option<HostId>>,
    /// The subtree was reused verbatim; the parent re-places its host
    /// nodes instead of re-diffing.
    pub(crate) bailed: bool,
}

#[derive(Default)]
pub(crate) struct CommitQueue {
    pub(crate) instances: Vec<ComponentHandle>,
    pub(crate) refs: Vec<(Ref, Option<RefValue>, VNodeId)>,
}

/// Mounts and updates a live tree rooted at a host container.
pub struct Renderer<H: HostAdapter> {
    pub(crate) nodes: NodeArena,
    pub(crate) host: H,
    runtime: Runtime,
    container: HostId,
    root: Option<VNodeId>,
    pub(crate) extensions: Rc<dyn Extensions>,
}

impl<H: HostAdapter> Renderer<H> {
    pub fn new(host: H, container: HostId) -> Self {
        Self::with_runtime(host, container, Runtime::default())
    }

    pub fn with_runtime(host: H, container: HostId, runtime: Runtime) -> Self {
        Self {
            nodes: NodeArena::default(),
            host,
            runtime,
            container,
            root: None,
            extensions: Rc::new(NoopExtensions),
        }
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn set_extensions(&mut self, extensions: Rc<dyn Extensions>) {
        self.extensions = extensions;
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    pub fn host_mut(&mut self) -> &mut H {
        &mut self.host
    }

    pub fn container(&self) -> HostId {
        self.container
    }

    pub fn root(&self) -> Option<VNodeId> {
        self.root
    }

    /// Mount `node` into the container, or update the tree already
    /// mounted there. Idempotent for an unchanged description.
    pub fn render(&mut self, node: VNode) -> Result<(), RenderError> {
        self.mount_internal(node, false)
    }

    /// Like [`render`](Self::render), but adopts the container's
    /// pre-existing children instead of creating fresh host nodes.
    pub fn hydrate(&mut self, node: VNode) -> Result<(), RenderError> {
        self.mount_internal(node, true)
    }

    fn mount_internal(&mut self, node: VNode, hydrating: bool) -> Result<(), RenderError> {
        let old_root = self.root.take();
        let new_id = self.nodes.insert(TreeNode::new(node, None, 0));
        self.root = Some(new_id);
        // a root whose key or type changed replaces the old tree
        let old_root = match old_root {
            Some(old) => {
                let same = {
                    let new_node = self.nodes.node(new_id);
                    let old_node = self.nodes.node(old);
                    new_node.vnode.key == old_node.vnode.key
                        && new_node.vnode.kind.same_type(&old_node.vnode.kind)
                };
                if same {
                    Some(old)
                } else {
                    let mut cleared = Vec::new();
                    let result = self.unmount_node(old, false, &mut cleared);
                    for node_ref in cleared {
                        if let Err(error) = node_ref.apply(None) {
                            log::warn!("ref detach failed while replacing root: {error}");
                        }
                    }
                    result?;
                    None
                }
            }
            None => None,
        };
        let anchor = old_root.and_then(|id| self.nodes.node(id).host);
        let mut excess = if hydrating {
            Some(self.host.children(self.container).map_err(RenderError::from)?)
        } else {
            None
        };
        let anchor = anchor.or_else(|| excess.as_ref().and_then(|e| e.first().copied()));
        let mut commit = CommitQueue::default();
        let context = Context::default();
        let result = self.diff(
            self.container,
            new_id,
            old_root,
            &context,
            None,
            &mut excess,
            &mut commit,
            anchor,
            hydrating,
        );
        if let Some(leftover) = excess {
            for id in leftover {
                let _ = self.host.remove(id);
            }
        }
        let out = result?;
        // a host-kind root has no parent list diff to place it
        if self.nodes.node(new_id).vnode.kind.is_host() {
            if let Some(dom) = out.host {
                self.place_host(self.container, dom, 1, anchor)?;
            }
        }
        self.commit_root(commit)?;
        Ok(())
    }

    /// Tear down the mounted tree, removing its host nodes.
    pub fn unmount(&mut self) -> Result<(), RenderError> {
        let Some(root) = self.root.take() else {
            return Ok(());
        };
        let mut cleared = Vec::new();
        let result = self.unmount_node(root, false, &mut cleared);
        let mut first_error = result.err();
        for node_ref in cleared {
            if let Err(error) = node_ref.apply(None) {
                log::warn!("ref detach failed during unmount: {error}");
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
        }
        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    /// Whether a flush would do work right now.
    pub fn needs_flush(&self) -> bool {
        self.runtime.has_dirty() || self.runtime.paint_overdue()
    }

    /// Drain the render queue: snapshot, order by ascending depth,
    /// render every still-dirty entry, and repeat for requests made
    /// during the pass.
    pub fn flush(&mut self) -> Result<(), RenderError> {
        if self.runtime.paint_overdue() {
            self.flush_paint_effects()?;
        }
        loop {
            let mut batch = self.runtime.take_dirty();
            if batch.is_empty() {
                break;
            }
            batch.sort_by_key(|instance| instance.depth.get());
            for instance in batch {
                if instance.dirty.get() {
                    self.render_dirty(instance)?;
                }
            }
        }
        Ok(())
    }

    /// The paint boundary: run effects deferred until after the host
    /// has visually updated.
    pub fn flush_paint_effects(&mut self) -> Result<(), RenderError> {
        for instance in self.runtime.take_paint() {
            if let Err(error) = instance.flush_pending_effects() {
                match instance.vnode.get() {
                    Some(id) => self.route_error(id, error)?,
                    None => log::warn!("effect failed after unmount: {error}"),
                }
            }
        }
        Ok(())
    }

    /// Alternate queue and paint flushes until the tree is quiescent.
    pub fn run_until_idle(&mut self) -> Result<(), RenderError> {
        while self.runtime.has_dirty() || self.runtime.has_paint_pending() {
            self.flush()?;
            self.flush_paint_effects()?;
        }
        Ok(())
    }

    /// Re-render one dirty component in place.
    fn render_dirty(&mut self, instance: ComponentHandle) -> Result<(), RenderError> {
        let Some(old_id) = instance.vnode.get() else {
            return Ok(());
        };
        let (parent_id, depth, namespace, old_host) = {
            let node = self.nodes.node(old_id);
            (node.parent, node.depth, node.namespace.clone(), node.host)
        };
        let parent_host = instance.parent_host.get().unwrap_or(self.container);
        let new_vnode = self.nodes.node(old_id).vnode.renewed();
        let new_id = self.nodes.insert(TreeNode::new(new_vnode, parent_id, depth));
        let anchor = old_host.or_else(|| self.host_sibling(old_id));
        let context = instance.context.borrow().clone();
        let mut commit = CommitQueue::default();
        let mut excess = None;
        let result = self.diff(
            parent_host,
            new_id,
            Some(old_id),
            &context,
            namespace,
            &mut excess,
            &mut commit,
            anchor,
            false,
        );
        match parent_id {
            Some(pid) => {
                let parent = self.nodes.node_mut(pid);
                if let Some(slot) = parent
                    .children
                    .iter_mut()
                    .find(|slot| **slot == Some(old_id))
                {
                    *slot = Some(new_id);
                }
            }
            None => self.root = Some(new_id),
        }
        result?;
        self.commit_root(commit)?;
        self.update_parent_host_pointers(new_id);
        Ok(())
    }

    /// Run queued ref attachments and post-commit lifecycle callbacks
    /// against the now-consistent host tree.
    pub(crate) fn commit_root(&mut self, commit: CommitQueue) -> Result<(), RenderError> {
        if let Some(root) = self.root {
            let extensions = Rc::clone(&self.extensions);
            extensions.before_commit(&self.nodes.node(root).vnode);
        }
        let CommitQueue { instances, refs } = commit;
        for (node_ref, value, owner) in refs {
            if let Err(error) = node_ref.apply(value) {
                self.route_error(owner, error)?;
            }
        }
        for instance in instances {
            for callback in instance.take_render_callbacks() {
                if let Err(error) = callback(&instance) {
                    match instance.vnode.get() {
                        Some(id) => self.route_error(id, error)?,
                        None => return Err(error),
                    }
                    break;
                }
            }
        }
        Ok(())
    }

    /// Walk strictly upward from the throwing node looking for a live
    /// boundary; re-raises when none handles the error.
    pub(crate) fn route_error(
        &mut self,
        from: VNodeId,
        error: RenderError,
    ) -> Result<(), RenderError> {
        let start = self.nodes.node(from).parent;
        self.route_error_at(start, error)
    }

    /// Boundary walk beginning at `start` itself; used when the
    /// throwing node is already gone from the tree.
    pub(crate) fn route_error_at(
        &mut self,
        start: Option<VNodeId>,
        error: RenderError,
    ) -> Result<(), RenderError> {
        let mut cursor = start;
        while let Some(id) = cursor {
            let next = self.nodes.node(id).parent;
            if let Some(instance) = self.nodes.node(id).instance.clone() {
                if instance.is_stateful() && !instance.processing_error.get() {
                    let mut handled = false;
                    let derived = match &*instance.body.borrow() {
                        ComponentBody::Stateful(component) => {
                            component.derive_state_from_error(&error)
                        }
                        ComponentBody::Function(_) => None,
                    };
                    if let Some(partial) = derived {
                        instance.merge_staged(partial);
                        handled = true;
                    }
                    let observed = match &mut *instance.body.borrow_mut() {
                        ComponentBody::Stateful(component) => component.did_catch(&error),
                        ComponentBody::Function(_) => false,
                    };
                    if handled || observed {
                        instance.processing_error.set(true);
                        log::debug!("error boundary absorbed: {error}");
                        request_render(&instance);
                        return Ok(());
                    }
                }
            }
            cursor = next;
        }
        Err(error)
    }

    /// First host node rendered by any later sibling, walking up
    /// through hostless ancestors.
    pub(crate) fn host_sibling(&self, id: VNodeId) -> Option<HostId> {
        let parent = self.nodes.node(id).parent?;
        let parent_node = self.nodes.node(parent);
        let position = parent_node
            .children
            .iter()
            .position(|slot| *slot == Some(id))?;
        for slot in &parent_node.children[position + 1..] {
            if let Some(sibling) = slot {
                if let Some(dom) = self.nodes.node(*sibling).host {
                    return Some(dom);
                }
            }
        }
        if parent_node.vnode.kind.is_host() {
            None
        } else {
            self.host_sibling(parent)
        }
    }

    /// After re-rendering a subtree in place, refresh the first-host
    /// pointers of hostless ancestors.
    fn update_parent_host_pointers(&mut self, mut id: VNodeId) {
        while let Some(parent) = self.nodes.node(id).parent {
            if self.nodes.node(parent).vnode.kind.is_host() {
                break;
            }
            let first = self
                .nodes
                .node(parent)
                .children
                .iter()
                .flatten()
                .find_map(|&child| self.nodes.node(child).host);
            self.nodes.node_mut(parent).host = first;
            id = parent;
        }
    }
}
