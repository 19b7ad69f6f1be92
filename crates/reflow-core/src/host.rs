//! Host-tree adapter: the contract the reconciler mutates a live tree
//! through, plus an in-memory reference implementation used by tests
//! and embedders without a real host.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use thiserror::Error;

use crate::{AttrMap, PropValue, StyleMap};

pub type HostId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("host node {id} missing")]
    Missing { id: HostId },
    #[error("host node {id} is not an element")]
    NotAnElement { id: HostId },
}

/// An event synthesized by the host and delivered to installed
/// listeners.
#[derive(Debug, Clone)]
pub struct Event {
    pub name: Rc<str>,
    pub target: HostId,
}

/// A listener bound into the host tree. Equality is pointer identity
/// of the callback plus the capture flag; the attribute differ relies
/// on this to leave an unchanged listener untouched.
#[derive(Clone)]
pub struct EventHandler {
    capture: bool,
    callback: Rc<dyn Fn(&Event)>,
}

impl EventHandler {
    pub fn new(callback: impl Fn(&Event) + 'static) -> Self {
        Self {
            capture: false,
            callback: Rc::new(callback),
        }
    }

    pub fn capture(callback: impl Fn(&Event) + 'static) -> Self {
        Self {
            capture: true,
            callback: Rc::new(callback),
        }
    }

    pub fn is_capture(&self) -> bool {
        self.capture
    }

    pub fn invoke(&self, event: &Event) {
        (self.callback)(event);
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        self.capture == other.capture && Rc::ptr_eq(&self.callback, &other.callback)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventHandler")
            .field("capture", &self.capture)
            .finish_non_exhaustive()
    }
}

/// Shape of an existing host node, as reported for adoption of
/// pre-existing markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostDesc {
    Element { tag: Rc<str> },
    Text { content: Rc<str> },
}

/// The primitive operations the reconciler issues against a host tree.
///
/// The engine only ever calls these; it never owns or implements the
/// real tree. Inserting a node that already has a parent is a move.
/// `add_listener` replaces any listener previously installed for the
/// same `(event, capture)` pair.
pub trait HostAdapter {
    fn create_element(&mut self, tag: &str, namespace: Option<&str>) -> Result<HostId, HostError>;
    fn create_text(&mut self, text: &str) -> Result<HostId, HostError>;
    fn set_text(&mut self, node: HostId, text: &str) -> Result<(), HostError>;
    fn set_attribute(
        &mut self,
        node: HostId,
        name: &str,
        value: &PropValue,
    ) -> Result<(), HostError>;
    fn remove_attribute(&mut self, node: HostId, name: &str) -> Result<(), HostError>;
    fn set_style(
        &mut self,
        node: HostId,
        property: &str,
        value: Option<&str>,
    ) -> Result<(), HostError>;
    fn add_listener(
        &mut self,
        node: HostId,
        event: &str,
        handler: EventHandler,
    ) -> Result<(), HostError>;
    fn remove_listener(
        &mut self,
        node: HostId,
        event: &str,
        capture: bool,
    ) -> Result<(), HostError>;
    fn insert_before(
        &mut self,
        parent: HostId,
        node: HostId,
        before: Option<HostId>,
    ) -> Result<(), HostError>;
    fn append(&mut self, parent: HostId, node: HostId) -> Result<(), HostError>;
    fn remove(&mut self, node: HostId) -> Result<(), HostError>;
    fn children(&self, parent: HostId) -> Result<Vec<HostId>, HostError>;
    fn describe(&self, node: HostId) -> Result<HostDesc, HostError>;
}

/// One recorded host mutation. The op log is the observable side of
/// the reconciler: a skipped subtree is a subtree with no ops.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostOp {
    CreateElement { node: HostId, tag: Rc<str> },
    CreateText { node: HostId },
    SetText { node: HostId },
    SetAttribute { node: HostId, name: Rc<str> },
    RemoveAttribute { node: HostId, name: Rc<str> },
    SetStyle { node: HostId, property: Rc<str> },
    AddListener { node: HostId, event: Rc<str> },
    RemoveListener { node: HostId, event: Rc<str> },
    Append { node: HostId },
    Insert { node: HostId },
    Move { node: HostId },
    Remove { node: HostId },
}

enum HostBody {
    Element {
        tag: Rc<str>,
        namespace: Option<Rc<str>>,
    },
    Text(Rc<str>),
}

struct HostNode {
    body: HostBody,
    attrs: AttrMap,
    styles: StyleMap,
    listeners: Vec<(Rc<str>, EventHandler)>,
    children: Vec<HostId>,
    parent: Option<HostId>,
}

impl HostNode {
    fn element(tag: &str, namespace: Option<&str>) -> Self {
        Self {
            body: HostBody::Element {
                tag: Rc::from(tag),
                namespace: namespace.map(Rc::from),
            },
            attrs: AttrMap::default(),
            styles: StyleMap::default(),
            listeners: Vec::new(),
            children: Vec::new(),
            parent: None,
        }
    }

    fn text(content: &str) -> Self {
        Self {
            body: HostBody::Text(Rc::from(content)),
            attrs: AttrMap::default(),
            styles: StyleMap::default(),
            listeners: Vec::new(),
            children: Vec::new(),
            parent: None,
        }
    }
}

/// Arena-backed reference host. Nodes are addressed by index; removed
/// slots stay vacant. Every mutation is appended to the op log.
#[derive(Default)]
pub struct MemoryHost {
    nodes: Vec<Option<HostNode>>,
    ops: Vec<HostOp>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    fn node(&self, id: HostId) -> Result<&HostNode, HostError> {
        self.nodes
            .get(id)
            .and_then(|n| n.as_ref())
            .ok_or(HostError::Missing { id })
    }

    fn node_mut(&mut self, id: HostId) -> Result<&mut HostNode, HostError> {
        self.nodes
            .get_mut(id)
            .and_then(|n| n.as_mut())
            .ok_or(HostError::Missing { id })
    }

    fn alloc(&mut self, node: HostNode) -> HostId {
        let id = self.nodes.len();
        self.nodes.push(Some(node));
        id
    }

    fn detach(&mut self, id: HostId) -> Result<(), HostError> {
        if let Some(parent) = self.node(id)?.parent {
            let siblings = &mut self.node_mut(parent)?.children;
            siblings.retain(|&c| c != id);
        }
        self.node_mut(id)?.parent = None;
        Ok(())
    }

    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    pub fn tag_of(&self, id: HostId) -> Option<Rc<str>> {
        match &self.node(id).ok()?.body {
            HostBody::Element { tag, .. } => Some(tag.clone()),
            HostBody::Text(_) => None,
        }
    }

    pub fn attr(&self, id: HostId, name: &str) -> Option<PropValue> {
        self.node(id).ok()?.attrs.get(name).cloned()
    }

    pub fn style(&self, id: HostId, property: &str) -> Option<Rc<str>> {
        self.node(id).ok()?.styles.get(property).cloned()
    }

    pub fn has_listener(&self, id: HostId, event: &str) -> bool {
        self.node(id)
            .map(|n| n.listeners.iter().any(|(e, _)| &**e == event))
            .unwrap_or(false)
    }

    /// Concatenated text content of the subtree, depth first.
    pub fn text_content(&self, id: HostId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: HostId, out: &mut String) {
        let Ok(node) = self.node(id) else { return };
        match &node.body {
            HostBody::Text(content) => out.push_str(content),
            HostBody::Element { .. } => {
                for &child in &node.children {
                    self.collect_text(child, out);
                }
            }
        }
    }

    /// First element with the given tag, depth first from `root`.
    pub fn find_by_tag(&self, root: HostId, tag: &str) -> Option<HostId> {
        let node = self.node(root).ok()?;
        if let HostBody::Element { tag: t, .. } = &node.body {
            if &**t == tag {
                return Some(root);
            }
        }
        for &child in &node.children {
            if let Some(found) = self.find_by_tag(child, tag) {
                return Some(found);
            }
        }
        None
    }

    /// Deliver an event to the listeners installed on `target`,
    /// capture listeners first.
    pub fn emit(&self, target: HostId, name: &str) {
        let Ok(node) = self.node(target) else { return };
        let mut handlers: Vec<EventHandler> = Vec::new();
        for (event, handler) in &node.listeners {
            if &**event == name && handler.is_capture() {
                handlers.push(handler.clone());
            }
        }
        for (event, handler) in &node.listeners {
            if &**event == name && !handler.is_capture() {
                handlers.push(handler.clone());
            }
        }
        let event = Event {
            name: Rc::from(name),
            target,
        };
        for handler in handlers {
            handler.invoke(&event);
        }
    }

    pub fn dump_tree(&self, root: Option<HostId>) -> String {
        let mut output = String::new();
        if let Some(root_id) = root {
            self.dump_node(&mut output, root_id, 0);
        } else {
            output.push_str("(no root)\n");
        }
        output
    }

    fn dump_node(&self, output: &mut String, id: HostId, depth: usize) {
        let indent = "  ".repeat(depth);
        let Ok(node) = self.node(id) else {
            output.push_str(&format!("{indent}[{id}] (missing)\n"));
            return;
        };
        match &node.body {
            HostBody::Element { tag, .. } => {
                output.push_str(&format!("{indent}[{id}] <{tag}>\n"));
                for &child in &node.children {
                    self.dump_node(output, child, depth + 1);
                }
            }
            HostBody::Text(content) => {
                output.push_str(&format!("{indent}[{id}] {content:?}\n"));
            }
        }
    }
}

impl HostAdapter for MemoryHost {
    fn create_element(&mut self, tag: &str, namespace: Option<&str>) -> Result<HostId, HostError> {
        let id = self.alloc(HostNode::element(tag, namespace));
        self.ops.push(HostOp::CreateElement {
            node: id,
            tag: Rc::from(tag),
        });
        Ok(id)
    }

    fn create_text(&mut self, text: &str) -> Result<HostId, HostError> {
        let id = self.alloc(HostNode::text(text));
        self.ops.push(HostOp::CreateText { node: id });
        Ok(id)
    }

    fn set_text(&mut self, node: HostId, text: &str) -> Result<(), HostError> {
        match &mut self.node_mut(node)?.body {
            HostBody::Text(content) => *content = Rc::from(text),
            HostBody::Element { .. } => return Err(HostError::NotAnElement { id: node }),
        }
        self.ops.push(HostOp::SetText { node });
        Ok(())
    }

    fn set_attribute(
        &mut self,
        node: HostId,
        name: &str,
        value: &PropValue,
    ) -> Result<(), HostError> {
        self.node_mut(node)?
            .attrs
            .insert(Rc::from(name), value.clone());
        self.ops.push(HostOp::SetAttribute {
            node,
            name: Rc::from(name),
        });
        Ok(())
    }

    fn remove_attribute(&mut self, node: HostId, name: &str) -> Result<(), HostError> {
        let entry = self.node_mut(node)?;
        if name == "style" {
            entry.styles = IndexMap::default();
        }
        entry.attrs.shift_remove(name);
        self.ops.push(HostOp::RemoveAttribute {
            node,
            name: Rc::from(name),
        });
        Ok(())
    }

    fn set_style(
        &mut self,
        node: HostId,
        property: &str,
        value: Option<&str>,
    ) -> Result<(), HostError> {
        let styles = &mut self.node_mut(node)?.styles;
        match value {
            Some(v) => {
                styles.insert(Rc::from(property), Rc::from(v));
            }
            None => {
                styles.shift_remove(property);
            }
        }
        self.ops.push(HostOp::SetStyle {
            node,
            property: Rc::from(property),
        });
        Ok(())
    }

    fn add_listener(
        &mut self,
        node: HostId,
        event: &str,
        handler: EventHandler,
    ) -> Result<(), HostError> {
        let capture = handler.is_capture();
        let listeners = &mut self.node_mut(node)?.listeners;
        listeners.retain(|(e, h)| !(&**e == event && h.is_capture() == capture));
        listeners.push((Rc::from(event), handler));
        self.ops.push(HostOp::AddListener {
            node,
            event: Rc::from(event),
        });
        Ok(())
    }

    fn remove_listener(
        &mut self,
        node: HostId,
        event: &str,
        capture: bool,
    ) -> Result<(), HostError> {
        self.node_mut(node)?
            .listeners
            .retain(|(e, h)| !(&**e == event && h.is_capture() == capture));
        self.ops.push(HostOp::RemoveListener {
            node,
            event: Rc::from(event),
        });
        Ok(())
    }

    fn insert_before(
        &mut self,
        parent: HostId,
        node: HostId,
        before: Option<HostId>,
    ) -> Result<(), HostError> {
        let moved = self.node(node)?.parent == Some(parent);
        self.detach(node)?;
        let children = &mut self.node_mut(parent)?.children;
        let index = match before {
            Some(anchor) => children.iter().position(|&c| c == anchor).unwrap_or(children.len()),
            None => children.len(),
        };
        children.insert(index, node);
        self.node_mut(node)?.parent = Some(parent);
        if moved {
            self.ops.push(HostOp::Move { node });
        } else {
            self.ops.push(HostOp::Insert { node });
        }
        Ok(())
    }

    fn append(&mut self, parent: HostId, node: HostId) -> Result<(), HostError> {
        if self.node(node)?.parent == Some(parent)
            && self.node(parent)?.children.last() == Some(&node)
        {
            return Ok(());
        }
        let moved = self.node(node)?.parent == Some(parent);
        self.detach(node)?;
        self.node_mut(parent)?.children.push(node);
        self.node_mut(node)?.parent = Some(parent);
        if moved {
            self.ops.push(HostOp::Move { node });
        } else {
            self.ops.push(HostOp::Append { node });
        }
        Ok(())
    }

    fn remove(&mut self, node: HostId) -> Result<(), HostError> {
        self.detach(node)?;
        self.release(node);
        self.ops.push(HostOp::Remove { node });
        Ok(())
    }

    fn children(&self, parent: HostId) -> Result<Vec<HostId>, HostError> {
        Ok(self.node(parent)?.children.clone())
    }

    fn describe(&self, node: HostId) -> Result<HostDesc, HostError> {
        match &self.node(node)?.body {
            HostBody::Element { tag, .. } => Ok(HostDesc::Element { tag: tag.clone() }),
            HostBody::Text(content) => Ok(HostDesc::Text {
                content: content.clone(),
            }),
        }
    }
}

impl MemoryHost {
    fn release(&mut self, id: HostId) {
        let children = match self.nodes.get_mut(id).and_then(|n| n.take()) {
            Some(node) => node.children,
            None => return,
        };
        for child in children {
            self.release(child);
        }
    }
}
