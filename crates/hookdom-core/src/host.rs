//! The boundary between the engine and a concrete host tree.
//!
//! The engine only ever talks to a [`HostAdapter`]. [`MemoryHost`] is the
//! in-memory adapter used by tests, benches and headless hosts.

use std::fmt::Write as _;
use std::rc::Rc;

use crate::collections::ordered::IndexMap;
use crate::vnode::{Attributes, EventHandler, PropValue};
use crate::HostError;

pub type HostId = usize;

pub trait HostAdapter {
    fn create_element(&mut self, tag: &str) -> HostId;
    fn create_text(&mut self, value: &str) -> HostId;
    fn set_text(&mut self, node: HostId, value: &str) -> Result<(), HostError>;
    /// Pushes the full previous and next attribute sets; the adapter works out the delta.
    fn apply_attribute_delta(
        &mut self,
        node: HostId,
        old: &Attributes,
        new: &Attributes,
    ) -> Result<(), HostError>;
    fn append_child(&mut self, parent: HostId, child: HostId) -> Result<(), HostError>;
    fn remove_child(&mut self, parent: HostId, child: HostId) -> Result<(), HostError>;
    fn replace_child(
        &mut self,
        parent: HostId,
        new_child: HostId,
        old_child: HostId,
    ) -> Result<(), HostError>;
    /// Inserts `child` before `before`, or at the end when `before` is `None`.
    /// A child that already has a parent is moved.
    fn insert_before(
        &mut self,
        parent: HostId,
        child: HostId,
        before: Option<HostId>,
    ) -> Result<(), HostError>;
    /// Current child order of `parent`.
    fn child_nodes(&self, parent: HostId) -> Result<Vec<HostId>, HostError>;
    /// Drops a detached subtree that was built for an aborted render and will
    /// never be attached.
    fn release(&mut self, _node: HostId) {}
}

/// Per-node event handlers keyed by event name.
#[derive(Default, Clone, Debug)]
pub struct HandlerTable {
    handlers: IndexMap<Rc<str>, EventHandler>,
}

impl HandlerTable {
    pub fn get(&self, name: &str) -> Option<&EventHandler> {
        self.handlers.get(name)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub(crate) fn set(&mut self, name: Rc<str>, handler: EventHandler) {
        self.handlers.insert(name, handler);
    }

    pub(crate) fn remove(&mut self, name: &str) {
        self.handlers.shift_remove(name);
    }
}

#[derive(Debug)]
enum MemoryNodeKind {
    Element { tag: Rc<str>, attributes: Attributes },
    Text(String),
}

#[derive(Debug)]
struct MemoryNode {
    kind: MemoryNodeKind,
    parent: Option<HostId>,
    children: Vec<HostId>,
    handlers: HandlerTable,
}

impl MemoryNode {
    fn new(kind: MemoryNodeKind) -> Self {
        Self {
            kind,
            parent: None,
            children: Vec::new(),
            handlers: HandlerTable::default(),
        }
    }
}

#[derive(Default)]
pub struct MemoryHost {
    nodes: Vec<Option<MemoryNode>>,
    /// Freed slots, reused before the arena grows.
    vacant: Vec<HostId>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live host nodes, attached or detached.
    pub fn len(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: HostId) -> bool {
        matches!(self.nodes.get(id), Some(Some(_)))
    }

    pub fn tag(&self, id: HostId) -> Option<&str> {
        match &self.node(id).ok()?.kind {
            MemoryNodeKind::Element { tag, .. } => Some(tag),
            MemoryNodeKind::Text(_) => None,
        }
    }

    pub fn text(&self, id: HostId) -> Option<&str> {
        match &self.node(id).ok()?.kind {
            MemoryNodeKind::Text(value) => Some(value),
            MemoryNodeKind::Element { .. } => None,
        }
    }

    pub fn attribute(&self, id: HostId, name: &str) -> Option<&PropValue> {
        match &self.node(id).ok()?.kind {
            MemoryNodeKind::Element { attributes, .. } => attributes.get(name),
            MemoryNodeKind::Text(_) => None,
        }
    }

    pub fn parent(&self, id: HostId) -> Option<HostId> {
        self.node(id).ok()?.parent
    }

    pub fn children(&self, id: HostId) -> &[HostId] {
        self.node(id).map(|node| node.children.as_slice()).unwrap_or(&[])
    }

    pub fn handlers(&self, id: HostId) -> Option<&HandlerTable> {
        self.node(id).ok().map(|node| &node.handlers)
    }

    /// Read side of the handler table, used by event delegation.
    pub fn handler(&self, id: HostId, event: &str) -> Option<EventHandler> {
        self.handlers(id)?.get(event).cloned()
    }

    /// Markup for `id` and its subtree, e.g. `<p class="x">Hello</p>`.
    pub fn serialize(&self, id: HostId) -> String {
        let mut output = String::new();
        self.write_node(&mut output, id);
        output
    }

    /// Markup for the children of `id`, without `id` itself.
    pub fn inner_html(&self, id: HostId) -> String {
        let mut output = String::new();
        for &child in self.children(id) {
            self.write_node(&mut output, child);
        }
        output
    }

    fn write_node(&self, output: &mut String, id: HostId) {
        let Ok(node) = self.node(id) else {
            output.push_str("<!--missing-->");
            return;
        };
        match &node.kind {
            MemoryNodeKind::Text(value) => escape_into(output, value),
            MemoryNodeKind::Element { tag, attributes } => {
                output.push('<');
                output.push_str(tag);
                for (name, value) in attributes {
                    match value {
                        PropValue::Str(value) => {
                            output.push(' ');
                            output.push_str(name);
                            output.push_str("=\"");
                            escape_into(output, value);
                            output.push('"');
                        }
                        PropValue::Bool(true) => {
                            output.push(' ');
                            output.push_str(name);
                        }
                        PropValue::Int(value) => {
                            let _ = write!(output, " {name}=\"{value}\"");
                        }
                        PropValue::Float(value) => {
                            let _ = write!(output, " {name}=\"{value}\"");
                        }
                        PropValue::Bool(false) | PropValue::Handler(_) | PropValue::Opaque(_) => {}
                    }
                }
                output.push('>');
                for &child in &node.children {
                    self.write_node(output, child);
                }
                output.push_str("</");
                output.push_str(tag);
                output.push('>');
            }
        }
    }

    /// Number of slots ever allocated, live or vacant.
    pub fn capacity(&self) -> usize {
        self.nodes.len()
    }

    fn insert(&mut self, node: MemoryNode) -> HostId {
        if let Some(id) = self.vacant.pop() {
            self.nodes[id] = Some(node);
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(Some(node));
        id
    }

    fn node(&self, id: HostId) -> Result<&MemoryNode, HostError> {
        self.nodes
            .get(id)
            .and_then(Option::as_ref)
            .ok_or(HostError::Missing { id })
    }

    fn node_mut(&mut self, id: HostId) -> Result<&mut MemoryNode, HostError> {
        self.nodes
            .get_mut(id)
            .and_then(Option::as_mut)
            .ok_or(HostError::Missing { id })
    }

    fn element_mut(&mut self, id: HostId) -> Result<&mut MemoryNode, HostError> {
        let node = self.node_mut(id)?;
        match node.kind {
            MemoryNodeKind::Element { .. } => Ok(node),
            MemoryNodeKind::Text(_) => Err(HostError::NotAnElement { id }),
        }
    }

    fn detach(&mut self, child: HostId) -> Result<(), HostError> {
        if let Some(parent) = self.node(child)?.parent {
            let siblings = &mut self.node_mut(parent)?.children;
            siblings.retain(|&id| id != child);
            self.node_mut(child)?.parent = None;
        }
        Ok(())
    }

    fn free(&mut self, id: HostId) {
        let children = match self.nodes.get_mut(id).and_then(Option::take) {
            Some(node) => node.children,
            None => return,
        };
        self.vacant.push(id);
        for child in children {
            self.free(child);
        }
    }
}

impl HostAdapter for MemoryHost {
    fn create_element(&mut self, tag: &str) -> HostId {
        self.insert(MemoryNode::new(MemoryNodeKind::Element {
            tag: Rc::from(tag),
            attributes: Attributes::default(),
        }))
    }

    fn create_text(&mut self, value: &str) -> HostId {
        self.insert(MemoryNode::new(MemoryNodeKind::Text(value.to_owned())))
    }

    fn set_text(&mut self, node: HostId, value: &str) -> Result<(), HostError> {
        match &mut self.node_mut(node)?.kind {
            MemoryNodeKind::Text(text) => {
                text.clear();
                text.push_str(value);
                Ok(())
            }
            MemoryNodeKind::Element { .. } => Err(HostError::NotText { id: node }),
        }
    }

    fn apply_attribute_delta(
        &mut self,
        node: HostId,
        old: &Attributes,
        new: &Attributes,
    ) -> Result<(), HostError> {
        let target = self.element_mut(node)?;
        let MemoryNode { kind, handlers, .. } = target;
        let MemoryNodeKind::Element { attributes, .. } = kind else {
            return Err(HostError::NotAnElement { id: node });
        };
        for name in old.keys() {
            if !new.contains_key(name) {
                attributes.shift_remove(name);
                handlers.remove(name);
            }
        }
        for (name, value) in new {
            if old.get(name) == Some(value) {
                continue;
            }
            match value {
                PropValue::Handler(handler) => {
                    attributes.shift_remove(name);
                    handlers.set(name.clone(), handler.clone());
                }
                other => {
                    handlers.remove(name);
                    attributes.insert(name.clone(), other.clone());
                }
            }
        }
        Ok(())
    }

    fn append_child(&mut self, parent: HostId, child: HostId) -> Result<(), HostError> {
        self.insert_before(parent, child, None)
    }

    fn remove_child(&mut self, parent: HostId, child: HostId) -> Result<(), HostError> {
        if self.node(child)?.parent != Some(parent) {
            return Err(HostError::NotAChild { parent, child });
        }
        self.detach(child)?;
        self.free(child);
        Ok(())
    }

    fn replace_child(
        &mut self,
        parent: HostId,
        new_child: HostId,
        old_child: HostId,
    ) -> Result<(), HostError> {
        if self.node(old_child)?.parent != Some(parent) {
            return Err(HostError::NotAChild {
                parent,
                child: old_child,
            });
        }
        self.node(new_child)?;
        self.detach(new_child)?;
        let siblings = &mut self.element_mut(parent)?.children;
        let Some(index) = siblings.iter().position(|&id| id == old_child) else {
            return Err(HostError::NotAChild {
                parent,
                child: old_child,
            });
        };
        siblings[index] = new_child;
        self.node_mut(new_child)?.parent = Some(parent);
        self.node_mut(old_child)?.parent = None;
        self.free(old_child);
        Ok(())
    }

    fn insert_before(
        &mut self,
        parent: HostId,
        child: HostId,
        before: Option<HostId>,
    ) -> Result<(), HostError> {
        self.element_mut(parent)?;
        self.detach(child)?;
        let siblings = &mut self.element_mut(parent)?.children;
        let index = match before {
            Some(anchor) => siblings
                .iter()
                .position(|&id| id == anchor)
                .ok_or(HostError::NotAChild {
                    parent,
                    child: anchor,
                })?,
            None => siblings.len(),
        };
        siblings.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);
        Ok(())
    }

    fn child_nodes(&self, parent: HostId) -> Result<Vec<HostId>, HostError> {
        Ok(self.node(parent)?.children.clone())
    }

    fn release(&mut self, node: HostId) {
        match self.node(node) {
            Ok(detached) if detached.parent.is_none() => self.free(node),
            Ok(_) => log::debug!("not releasing host node {node}: still attached"),
            Err(_) => {}
        }
    }
}

fn escape_into(output: &mut String, value: &str) {
    for ch in value.chars() {
        match ch {
            '<' => output.push_str("&lt;"),
            '>' => output.push_str("&gt;"),
            '&' => output.push_str("&amp;"),
            '"' => output.push_str("&quot;"),
            other => output.push(other),
        }
    }
}

#[cfg(test)]
#[path = "tests/host_tests.rs"]
mod tests;
