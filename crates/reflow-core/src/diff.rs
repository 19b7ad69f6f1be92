//! The diff engine: computes and applies the minimal mutation set
//! between the previous tree and a new description, one subtree at a
//! time.
//!
//! Reordering is eager, by insertion order against a moving anchor,
//! with a bounded forward scan to detect already-positioned nodes;
//! deliberately not a minimal-move (longest-stable-subsequence)
//! algorithm.

use std::rc::Rc;

use crate::component::{ComponentBody, ComponentCtx, InstanceInner};
use crate::hooks;
use crate::host::{HostAdapter, HostDesc, HostId};
use crate::{
    AttrMap, CommitQueue, Context, DiffOut, NodeKind, PropValue, Ref, RefValue, RenderError,
    Renderer, TreeNode, VNode, VNodeId,
};

impl<H: HostAdapter> Renderer<H> {
    /// Reconcile one node pair. Exceptions raised anywhere below this
    /// node are caught here: the node's identity stamp is invalidated
    /// and the error is handed to the boundary walk instead of
    /// propagating.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn diff(
        &mut self,
        parent_host: HostId,
        new_id: VNodeId,
        old_id: Option<VNodeId>,
        context: &Context,
        namespace: Option<Rc<str>>,
        excess: &mut Option<Vec<HostId>>,
        commit: &mut CommitQueue,
        anchor: Option<HostId>,
        hydrating: bool,
    ) -> Result<DiffOut, RenderError> {
        self.nodes.node_mut(new_id).namespace = namespace.clone();

        // Identity-stamp fast path: literally the same render output,
        // adopt the old subtree without touching the host.
        if let Some(old) = old_id {
            let old_stamp = self.nodes.node(old).stamp;
            let new_stamp = self.nodes.node(new_id).stamp;
            let kind_bails = !matches!(
                self.nodes.node(new_id).vnode.kind,
                NodeKind::Function(_) | NodeKind::Stateful(_)
            );
            if kind_bails
                && excess.is_none()
                && !hydrating
                && old_stamp != 0
                && old_stamp == new_stamp
            {
                let host = self.adopt_subtree(new_id, old);
                let fragment = matches!(self.nodes.node(new_id).vnode.kind, NodeKind::Fragment);
                self.nodes.release(old);
                return Ok(DiffOut {
                    host,
                    resume: None,
                    bailed: fragment,
                });
            }
        }

        let extensions = Rc::clone(&self.extensions);
        extensions.before_diff(&self.nodes.node(new_id).vnode);
        let is_component = self.nodes.node(new_id).vnode.kind.is_component();
        let result = if is_component {
            self.diff_component(
                parent_host,
                new_id,
                old_id,
                context,
                namespace,
                excess,
                commit,
                anchor,
                hydrating,
            )
        } else {
            self.diff_host(new_id, old_id, context, namespace, excess, hydrating, commit)
        };
        match result {
            Ok(out) => {
                extensions.after_diff(&self.nodes.node(new_id).vnode);
                self.queue_ref_update(new_id, old_id, commit);
                if let Some(old) = old_id {
                    self.nodes.release(old);
                }
                Ok(out)
            }
            Err(error) => {
                self.nodes.node_mut(new_id).stamp = 0;
                if hydrating || excess.is_some() {
                    self.nodes.node_mut(new_id).host = anchor;
                }
                if let Some(old) = old_id {
                    self.nodes.release(old);
                }
                self.route_error(new_id, error)?;
                Ok(DiffOut {
                    host: self.nodes.node(new_id).host,
                    resume: None,
                    bailed: false,
                })
            }
        }
    }

    /// Queue ref detach/attach for a changed binding; attachments run
    /// in the commit phase, once the whole pass is consistent.
    fn queue_ref_update(&mut self, new_id: VNodeId, old_id: Option<VNodeId>, commit: &mut CommitQueue) {
        let new_ref = self.nodes.node(new_id).vnode.node_ref.clone();
        let old_ref = old_id.and_then(|o| self.nodes.node(o).vnode.node_ref.clone());
        if new_ref == old_ref {
            return;
        }
        if let Some(old_ref) = old_ref {
            commit.refs.push((old_ref, None, new_id));
        }
        if let Some(new_ref) = new_ref {
            let value = match self.nodes.node(new_id).instance.clone() {
                Some(instance) => Some(RefValue::Instance(
                    ComponentCtx::new(&instance).update_handle(),
                )),
                None => self.nodes.node(new_id).host.map(RefValue::Host),
            };
            if let Some(value) = value {
                commit.refs.push((new_ref, Some(value), new_id));
            }
        }
    }

    /// Component and fragment path: resolve the instance, run the
    /// lifecycle protocol, render, and recurse into the output.
    #[allow(clippy::too_many_arguments)]
    fn diff_component(
        &mut self,
        parent_host: HostId,
        new_id: VNodeId,
        old_id: Option<VNodeId>,
        context: &Context,
        namespace: Option<Rc<str>>,
        excess: &mut Option<Vec<HostId>>,
        commit: &mut CommitQueue,
        anchor: Option<HostId>,
        hydrating: bool,
    ) -> Result<DiffOut, RenderError> {
        let new_vnode = self.nodes.node(new_id).vnode.clone();
        let depth = self.nodes.node(new_id).depth;

        // Fragments carry no instance; their child list is the output.
        if matches!(new_vnode.kind, NodeKind::Fragment) {
            let output = new_vnode.props.children.clone();
            let old_children = old_id
                .map(|o| self.nodes.node(o).children.clone())
                .unwrap_or_default();
            let next = self.diff_children(
                parent_host,
                new_id,
                output,
                old_children,
                context,
                namespace,
                excess,
                commit,
                anchor,
                hydrating,
            )?;
            return Ok(DiffOut {
                host: self.nodes.node(new_id).host,
                resume: Some(next),
                bailed: false,
            });
        }

        let (instance, is_new) = match old_id.and_then(|o| self.nodes.node(o).instance.clone()) {
            Some(existing) => (existing, false),
            None => {
                let body = match &new_vnode.kind {
                    NodeKind::Function(f) => ComponentBody::Function(*f),
                    NodeKind::Stateful(spec) => ComponentBody::Stateful(spec.instantiate()),
                    _ => unreachable!("host node in component path"),
                };
                let instance = InstanceInner::create(
                    body,
                    new_vnode.props.clone(),
                    context.clone(),
                    self.runtime().handle(),
                    depth,
                    parent_host,
                );
                (instance, true)
            }
        };
        self.nodes.node_mut(new_id).instance = Some(instance.clone());
        instance.vnode.set(Some(new_id));
        instance.depth.set(depth);
        instance.parent_host.set(Some(parent_host));
        instance.context.replace(context.clone());

        let old_props = instance.props.borrow().clone();
        let old_state = instance.state.borrow().clone();
        let ctx_obj = ComponentCtx::new(&instance);
        let force = instance.force.replace(false);

        // Derive-from-props runs whenever declared; otherwise the
        // legacy pre-mount / pre-update-props hooks apply.
        let staged_before = instance.staged_view();
        let derived = match &*instance.body.borrow() {
            ComponentBody::Stateful(component) => {
                component.derive_state(&new_vnode.props, &staged_before)
            }
            ComponentBody::Function(_) => None,
        };
        let declared_derive = derived.is_some();
        if let Some(partial) = derived {
            instance.merge_staged(partial);
        }
        if !declared_derive {
            if is_new {
                let result = match &mut *instance.body.borrow_mut() {
                    ComponentBody::Stateful(component) => component.will_mount(&ctx_obj),
                    ComponentBody::Function(_) => Ok(()),
                };
                result?;
            } else if !force {
                let result = match &mut *instance.body.borrow_mut() {
                    ComponentBody::Stateful(component) => {
                        component.will_receive_props(&ctx_obj, &new_vnode.props)
                    }
                    ComponentBody::Function(_) => Ok(()),
                };
                result?;
            }
        }

        // Bail-out: an explicit veto, or an unchanged identity stamp
        // with no recovery render pending. Props and state still
        // advance; the old subtree is reused verbatim.
        let staged = instance.staged_view();
        let same_stamp = old_id
            .map(|o| {
                let stamp = self.nodes.node(o).stamp;
                stamp != 0 && stamp == self.nodes.node(new_id).stamp
            })
            .unwrap_or(false);
        let veto = if is_new || force {
            false
        } else {
            let should = match &*instance.body.borrow() {
                ComponentBody::Stateful(component) => {
                    component.should_update(&ctx_obj, &new_vnode.props, &staged)
                }
                ComponentBody::Function(_) => true,
            };
            !should
        };
        let stamp_bail =
            same_stamp && !instance.processing_error.get() && excess.is_none() && !hydrating;
        if !is_new && (veto || stamp_bail) {
            let old = old_id.expect("bail-out requires a previous node");
            instance.props.replace(new_vnode.props.clone());
            instance.commit_staged();
            instance.dirty.set(false);
            let host = self.adopt_subtree(new_id, old);
            if instance.has_render_callbacks() {
                commit.instances.push(instance.clone());
            }
            return Ok(DiffOut {
                host,
                resume: None,
                bailed: true,
            });
        }

        if !is_new {
            let result = match &mut *instance.body.borrow_mut() {
                ComponentBody::Stateful(component) => {
                    component.will_update(&ctx_obj, &new_vnode.props, &staged)
                }
                ComponentBody::Function(_) => Ok(()),
            };
            result?;
        }

        instance.props.replace(new_vnode.props.clone());
        instance.commit_staged();
        instance.dirty.set(false);

        let extensions = Rc::clone(&self.extensions);
        extensions.before_render(&new_vnode);
        // effects still pending from the previous pass run before the
        // next render of this instance begins
        instance.flush_pending_effects()?;
        instance.begin_render();
        hooks::install(&instance);
        let rendered = match &*instance.body.borrow() {
            ComponentBody::Function(f) => f(&new_vnode.props),
            ComponentBody::Stateful(component) => component.render(&ctx_obj),
        };
        hooks::uninstall();
        let rendered = rendered?;
        instance.end_render();

        let child_context = {
            let contribution = match &*instance.body.borrow() {
                ComponentBody::Stateful(component) => component.child_context(&ctx_obj),
                ComponentBody::Function(_) => None,
            };
            match contribution {
                Some(extra) => context.merged(extra),
                None => context.clone(),
            }
        };
        let snapshot = if is_new {
            None
        } else {
            match &*instance.body.borrow() {
                ComponentBody::Stateful(component) => {
                    component.snapshot_before_update(&ctx_obj, &old_props, &old_state)
                }
                ComponentBody::Function(_) => None,
            }
        };

        // A keyless fragment result unwraps to its children; anything
        // else becomes a single-element child list.
        let output = match rendered {
            VNode {
                kind: NodeKind::Fragment,
                key: None,
                props,
                ..
            } => props.children,
            other => vec![Some(other)],
        };
        let old_children = old_id
            .map(|o| self.nodes.node(o).children.clone())
            .unwrap_or_default();
        let next = self.diff_children(
            parent_host,
            new_id,
            output,
            old_children,
            &child_context,
            namespace,
            excess,
            commit,
            anchor,
            hydrating,
        )?;

        if instance.is_stateful() {
            if is_new {
                instance.push_render_callback(Box::new(|instance| {
                    let ctx = ComponentCtx::new(instance);
                    match &mut *instance.body.borrow_mut() {
                        ComponentBody::Stateful(component) => component.did_mount(&ctx),
                        ComponentBody::Function(_) => Ok(()),
                    }
                }));
            } else {
                instance.push_render_callback(Box::new(move |instance| {
                    let ctx = ComponentCtx::new(instance);
                    match &mut *instance.body.borrow_mut() {
                        ComponentBody::Stateful(component) => {
                            component.did_update(&ctx, &old_props, &old_state, snapshot)
                        }
                        ComponentBody::Function(_) => Ok(()),
                    }
                }));
            }
        }
        if instance.schedule_effects() {
            self.runtime().handle().enqueue_paint(&instance);
        }
        if instance.has_render_callbacks() {
            commit.instances.push(instance.clone());
        }
        instance.processing_error.set(false);

        Ok(DiffOut {
            host: self.nodes.node(new_id).host,
            resume: Some(next),
            bailed: false,
        })
    }

    /// Host element and text path: create or adopt the host node,
    /// reconcile attributes, recurse into children.
    #[allow(clippy::too_many_arguments)]
    fn diff_host(
        &mut self,
        new_id: VNodeId,
        old_id: Option<VNodeId>,
        context: &Context,
        namespace: Option<Rc<str>>,
        excess: &mut Option<Vec<HostId>>,
        hydrating: bool,
        commit: &mut CommitQueue,
    ) -> Result<DiffOut, RenderError> {
        let new_vnode = self.nodes.node(new_id).vnode.clone();
        let old_host = old_id.and_then(|o| self.nodes.node(o).host);

        if matches!(new_vnode.kind, NodeKind::TextLeaf) {
            let text: Rc<str> = new_vnode.props.text.clone().unwrap_or_else(|| Rc::from(""));
            let dom = match old_host {
                Some(dom) => {
                    let old_text = old_id.and_then(|o| self.nodes.node(o).vnode.props.text.clone());
                    if old_text.as_deref() != Some(&*text) {
                        self.host.set_text(dom, &text)?;
                    }
                    dom
                }
                None => match self.claim_text(excess) {
                    Some((dom, content)) => {
                        if &*content != &*text {
                            self.host.set_text(dom, &text)?;
                        }
                        dom
                    }
                    None => self.host.create_text(&text)?,
                },
            };
            self.nodes.node_mut(new_id).host = Some(dom);
            return Ok(DiffOut {
                host: Some(dom),
                resume: None,
                bailed: false,
            });
        }

        let NodeKind::HostTag(tag) = new_vnode.kind.clone() else {
            unreachable!("component node in host path");
        };
        let child_namespace = new_vnode.props.namespace.clone().or(namespace);
        let mut child_excess: Option<Vec<HostId>> = None;
        let dom = match old_host {
            Some(dom) => dom,
            None => match self.claim_element(excess, &tag)? {
                Some(dom) => {
                    child_excess = Some(self.host.children(dom)?);
                    dom
                }
                None => self
                    .host
                    .create_element(&tag, child_namespace.as_deref())?,
            },
        };
        self.nodes.node_mut(new_id).host = Some(dom);

        let old_attrs = match old_id {
            Some(o) => self.nodes.node(o).vnode.props.attrs.clone(),
            None => AttrMap::default(),
        };
        self.diff_attributes(dom, &old_attrs, &new_vnode.props.attrs, hydrating)?;

        let old_children = old_id
            .map(|o| self.nodes.node(o).children.clone())
            .unwrap_or_default();
        let child_anchor = child_excess
            .as_ref()
            .and_then(|list| list.first().copied())
            .or_else(|| old_id.and_then(|o| self.first_child_host(o)));
        self.diff_children(
            dom,
            new_id,
            new_vnode.props.children.clone(),
            old_children,
            context,
            child_namespace,
            &mut child_excess,
            commit,
            child_anchor,
            hydrating,
        )?;
        if let Some(leftover) = child_excess {
            if !hydrating {
                for id in leftover {
                    let _ = self.host.remove(id);
                }
            }
        }

        Ok(DiffOut {
            host: Some(dom),
            resume: None,
            bailed: false,
        })
    }

    /// Attribute reconciliation: remove what vanished, write what
    /// changed. Text data, merged styles and listeners each follow
    /// their own assignment rule; while hydrating only listeners are
    /// installed.
    fn diff_attributes(
        &mut self,
        dom: HostId,
        old: &AttrMap,
        new: &AttrMap,
        hydrating: bool,
    ) -> Result<(), RenderError> {
        for (name, old_value) in old {
            if new.contains_key(name) {
                continue;
            }
            match old_value {
                PropValue::Handler(handler) => {
                    self.host.remove_listener(dom, name, handler.is_capture())?;
                }
                _ => self.host.remove_attribute(dom, name)?,
            }
        }
        for (name, new_value) in new {
            let old_value = old.get(name);
            if old_value == Some(new_value) {
                continue;
            }
            match new_value {
                PropValue::Handler(handler) => {
                    if let Some(PropValue::Handler(previous)) = old_value {
                        if previous.is_capture() != handler.is_capture() {
                            self.host
                                .remove_listener(dom, name, previous.is_capture())?;
                        }
                    }
                    self.host.add_listener(dom, name, handler.clone())?;
                }
                PropValue::Style(styles) => {
                    if hydrating {
                        continue;
                    }
                    if let Some(PropValue::Style(old_styles)) = old_value {
                        for property in old_styles.keys() {
                            if !styles.contains_key(property) {
                                self.host.set_style(dom, property, None)?;
                            }
                        }
                        for (property, value) in styles.iter() {
                            if old_styles.get(property) != Some(value) {
                                self.host.set_style(dom, property, Some(value))?;
                            }
                        }
                    } else {
                        for (property, value) in styles.iter() {
                            self.host.set_style(dom, property, Some(value))?;
                        }
                    }
                }
                PropValue::Null | PropValue::Bool(false) => {
                    if hydrating {
                        continue;
                    }
                    if old_value.is_some() {
                        self.host.remove_attribute(dom, name)?;
                    }
                }
                other => {
                    if hydrating {
                        continue;
                    }
                    self.host.set_attribute(dom, name, other)?;
                }
            }
        }
        Ok(())
    }

    /// Keyed child-list reconciliation: one pass over the new
    /// children against a working copy of the old list, deferred
    /// unmount of the unmatched, eager placement.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn diff_children(
        &mut self,
        parent_host: HostId,
        parent_id: VNodeId,
        new_children: Vec<Option<VNode>>,
        old_children: Vec<Option<VNodeId>>,
        context: &Context,
        namespace: Option<Rc<str>>,
        excess: &mut Option<Vec<HostId>>,
        commit: &mut CommitQueue,
        mut anchor: Option<HostId>,
        hydrating: bool,
    ) -> Result<Option<HostId>, RenderError> {
        let depth = self.nodes.node(parent_id).depth;
        let old_len = old_children.len();
        let mut remaining = old_children;
        let mut out_children: Vec<Option<VNodeId>> = Vec::with_capacity(new_children.len());
        let mut first_host: Option<HostId> = None;

        for (index, slot) in new_children.into_iter().enumerate() {
            let Some(desc) = slot else {
                // a hole renders nothing but keeps its position,
                // consuming a hole in the old list at the same index
                out_children.push(None);
                continue;
            };
            // cheap common case first: the old child at the same
            // index; otherwise the first match in the remaining list
            let mut matched: Option<VNodeId> = None;
            if let Some(entry) = remaining.get_mut(index) {
                if let Some(candidate) = *entry {
                    if self.same_identity(&desc, candidate) {
                        matched = entry.take();
                    }
                }
            }
            if matched.is_none() {
                for entry in remaining.iter_mut() {
                    if let Some(candidate) = *entry {
                        if self.same_identity(&desc, candidate) {
                            matched = entry.take();
                            break;
                        }
                    }
                }
            }

            let child_id = self
                .nodes
                .insert(TreeNode::new(desc, Some(parent_id), depth + 1));
            out_children.push(Some(child_id));
            let out = self.diff(
                parent_host,
                child_id,
                matched,
                context,
                namespace.clone(),
                excess,
                commit,
                anchor,
                hydrating,
            )?;

            if out.bailed {
                if first_host.is_none() {
                    first_host = self.nodes.node(child_id).host;
                }
                anchor = self.reorder_children(child_id, parent_host, anchor, old_len)?;
            } else if let Some(dom) = out.host {
                if first_host.is_none() {
                    first_host = Some(dom);
                }
                match out.resume {
                    // component subtrees placed their own hosts and
                    // report where the parent resumes
                    Some(next) => anchor = next,
                    None => anchor = self.place_host(parent_host, dom, old_len, anchor)?,
                }
            } else if let Some(next) = out.resume {
                anchor = next;
            }
        }

        if self.nodes.node(parent_id).vnode.kind.is_component() {
            self.nodes.node_mut(parent_id).host = first_host;
        }
        self.nodes.node_mut(parent_id).children = out_children;

        // Unmatched old children go last, as one batch, so host nodes
        // about to be reused by a move were never touched; their refs
        // clear only after the whole group is down.
        let mut cleared: Vec<Ref> = Vec::new();
        let mut deferred: Option<RenderError> = None;
        for entry in remaining.into_iter().flatten() {
            if let Err(error) = self.unmount_node(entry, false, &mut cleared) {
                if deferred.is_none() {
                    deferred = Some(error);
                } else {
                    log::warn!("additional unmount failure suppressed: {error}");
                }
            }
        }
        for node_ref in cleared {
            if let Err(error) = node_ref.apply(None) {
                match self.route_error_at(Some(parent_id), error) {
                    Ok(()) => {}
                    Err(error) => {
                        if deferred.is_none() {
                            deferred = Some(error);
                        }
                    }
                }
            }
        }
        if let Some(error) = deferred {
            return Err(error);
        }

        Ok(anchor)
    }

    fn same_identity(&self, desc: &VNode, candidate: VNodeId) -> bool {
        let node = self.nodes.node(candidate);
        desc.key == node.vnode.key && desc.kind.same_type(&node.vnode.kind)
    }

    /// Place one produced host node relative to the moving anchor:
    /// append when there is no reference node, skip when a bounded
    /// forward scan finds it already positioned, insert-before
    /// otherwise. Returns the next anchor.
    pub(crate) fn place_host(
        &mut self,
        parent_host: HostId,
        dom: HostId,
        scan_len: usize,
        anchor: Option<HostId>,
    ) -> Result<Option<HostId>, RenderError> {
        if anchor == Some(dom) {
            return Ok(self.next_host_sibling(parent_host, dom)?);
        }
        let Some(before) = anchor else {
            self.host.append(parent_host, dom)?;
            return Ok(None);
        };
        let siblings = self.host.children(parent_host)?;
        let Some(start) = siblings.iter().position(|&s| s == before) else {
            self.host.append(parent_host, dom)?;
            return Ok(None);
        };
        let mut index = start + 1;
        let mut steps = 0usize;
        while index < siblings.len() && steps < scan_len {
            if siblings[index] == dom {
                // already in position; leave it and move past it
                return Ok(self.next_host_sibling(parent_host, dom)?);
            }
            index += 1;
            steps += 2;
        }
        self.host.insert_before(parent_host, dom, Some(before))?;
        Ok(Some(before))
    }

    /// Re-place the host nodes of a subtree that was reused verbatim,
    /// walking through hostless component layers.
    fn reorder_children(
        &mut self,
        id: VNodeId,
        parent_host: HostId,
        mut anchor: Option<HostId>,
        scan_len: usize,
    ) -> Result<Option<HostId>, RenderError> {
        let children: Vec<VNodeId> = self
            .nodes
            .node(id)
            .children
            .iter()
            .flatten()
            .copied()
            .collect();
        for child in children {
            let (is_component, dom) = {
                let node = self.nodes.node(child);
                (node.vnode.kind.is_component(), node.host)
            };
            if is_component {
                anchor = self.reorder_children(child, parent_host, anchor, scan_len)?;
            } else if let Some(dom) = dom {
                anchor = self.place_host(parent_host, dom, scan_len, anchor)?;
            }
        }
        Ok(anchor)
    }

    fn next_host_sibling(
        &self,
        parent: HostId,
        node: HostId,
    ) -> Result<Option<HostId>, crate::HostError> {
        let children = self.host.children(parent)?;
        Ok(children
            .iter()
            .position(|&c| c == node)
            .and_then(|i| children.get(i + 1).copied()))
    }

    fn first_child_host(&self, id: VNodeId) -> Option<HostId> {
        self.nodes
            .node(id)
            .children
            .iter()
            .flatten()
            .find_map(|&child| self.nodes.node(child).host)
    }

    /// Move the old node's linkage (children, host, instance) onto the
    /// new node without re-diffing the subtree.
    fn adopt_subtree(&mut self, new_id: VNodeId, old_id: VNodeId) -> Option<HostId> {
        let (children, host, instance, namespace) = {
            let old = self.nodes.node_mut(old_id);
            (
                std::mem::take(&mut old.children),
                old.host,
                old.instance.take(),
                old.namespace.clone(),
            )
        };
        for child in children.iter().flatten() {
            self.nodes.node_mut(*child).parent = Some(new_id);
        }
        if let Some(instance) = &instance {
            instance.vnode.set(Some(new_id));
        }
        let node = self.nodes.node_mut(new_id);
        node.children = children;
        node.host = host;
        node.namespace = namespace;
        if node.instance.is_none() {
            node.instance = instance;
        }
        node.host
    }

    fn claim_text(&mut self, excess: &mut Option<Vec<HostId>>) -> Option<(HostId, Rc<str>)> {
        let list = excess.as_mut()?;
        let position = list
            .iter()
            .position(|&id| matches!(self.host.describe(id), Ok(HostDesc::Text { .. })))?;
        let id = list.remove(position);
        let content = match self.host.describe(id) {
            Ok(HostDesc::Text { content }) => content,
            _ => Rc::from(""),
        };
        Some((id, content))
    }

    fn claim_element(
        &mut self,
        excess: &mut Option<Vec<HostId>>,
        tag: &Rc<str>,
    ) -> Result<Option<HostId>, RenderError> {
        let Some(list) = excess.as_mut() else {
            return Ok(None);
        };
        let position = list.iter().position(|&id| {
            matches!(self.host.describe(id), Ok(HostDesc::Element { tag: t }) if t == *tag)
        });
        Ok(position.map(|p| list.remove(p)))
    }

    /// Unmount a subtree: pre-unmount hook, hook-cell cleanups, anchor
    /// detach, children, deferred ref clear, and one host removal per
    /// removed subtree.
    pub(crate) fn unmount_node(
        &mut self,
        id: VNodeId,
        skip_remove: bool,
        cleared: &mut Vec<Ref>,
    ) -> Result<(), RenderError> {
        let mut deferred: Option<RenderError> = None;
        let (is_host_kind, own_host, children, instance, node_ref) = {
            let node = self.nodes.node(id);
            (
                node.vnode.kind.is_host(),
                node.host,
                node.children.clone(),
                node.instance.clone(),
                node.vnode.node_ref.clone(),
            )
        };
        if let Some(instance) = &instance {
            let result = match &mut *instance.body.borrow_mut() {
                ComponentBody::Stateful(component) => component.will_unmount(),
                ComponentBody::Function(_) => Ok(()),
            };
            if let Err(error) = result {
                if let Err(error) = self.route_error(id, error) {
                    deferred = Some(error);
                }
            }
            for error in instance.teardown_hooks() {
                if let Err(error) = self.route_error(id, error) {
                    if deferred.is_none() {
                        deferred = Some(error);
                    }
                }
            }
            instance.dispose();
        }
        let skip_children = skip_remove || is_host_kind;
        for child in children.into_iter().flatten() {
            if let Err(error) = self.unmount_node(child, skip_children, cleared) {
                if deferred.is_none() {
                    deferred = Some(error);
                }
            }
        }
        if let Some(node_ref) = node_ref {
            cleared.push(node_ref);
        }
        if is_host_kind && !skip_remove {
            if let Some(dom) = own_host {
                if let Err(error) = self.host.remove(dom) {
                    if deferred.is_none() {
                        deferred = Some(error.into());
                    }
                }
            }
        }
        let extensions = Rc::clone(&self.extensions);
        extensions.after_unmount(&self.nodes.node(id).vnode);
        self.nodes.release(id);
        match deferred {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}
