//! Immutable descriptions of tree positions.
//!
//! A [`VNode`] is a cheap-clone handle; once built it is never mutated. The
//! engine keeps everything it learns while diffing (host node handles,
//! component instances, expanded children) in its own mounted-node arena.

use std::any::{type_name, Any, TypeId};
use std::fmt;
use std::rc::Rc;

use crate::collections::ordered::IndexMap;
use crate::HookError;

/// What a component render function produces.
pub type Element = Result<VNode, HookError>;

/// Identity token used to match siblings across renders independent of position.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Int(i64),
    Str(Rc<str>),
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<i32> for Key {
    fn from(value: i32) -> Self {
        Key::Int(i64::from(value))
    }
}

impl From<usize> for Key {
    /// Indices past `i64::MAX` keep their exact value as a string key.
    fn from(value: usize) -> Self {
        match i64::try_from(value) {
            Ok(value) => Key::Int(value),
            Err(_) => Key::Str(Rc::from(value.to_string())),
        }
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(Rc::from(value))
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(Rc::from(value))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Int(value) => write!(f, "{value}"),
            Key::Str(value) => f.write_str(value),
        }
    }
}

/// Payload handed to an [`EventHandler`] by whoever dispatches host events.
#[derive(Clone, Debug)]
pub struct Event {
    pub name: Rc<str>,
    pub detail: Option<PropValue>,
}

impl Event {
    pub fn new(name: impl Into<Rc<str>>) -> Self {
        Self {
            name: name.into(),
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<PropValue>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Event callback stored in a host node's handler table.
///
/// Compared by pointer identity: re-creating the closure on every render
/// counts as a changed attribute.
#[derive(Clone)]
pub struct EventHandler(Rc<dyn Fn(&Event)>);

impl EventHandler {
    pub fn new(handler: impl Fn(&Event) + 'static) -> Self {
        Self(Rc::new(handler))
    }

    pub fn call(&self, event: &Event) {
        (self.0)(event)
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventHandler({:p})", Rc::as_ptr(&self.0))
    }
}

/// Attribute value.
#[derive(Clone)]
pub enum PropValue {
    Str(Rc<str>),
    Int(i64),
    Float(f64),
    Bool(bool),
    Handler(EventHandler),
    Opaque(Rc<dyn Any>),
}

impl PropValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_handler(&self) -> Option<&EventHandler> {
        match self {
            PropValue::Handler(handler) => Some(handler),
            _ => None,
        }
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        match self {
            PropValue::Opaque(value) => value.downcast_ref::<T>(),
            _ => None,
        }
    }
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Str(a), PropValue::Str(b)) => a == b,
            (PropValue::Int(a), PropValue::Int(b)) => a == b,
            // same-value semantics: NaN matches NaN, +0 and -0 differ
            (PropValue::Float(a), PropValue::Float(b)) => a.to_bits() == b.to_bits(),
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Handler(a), PropValue::Handler(b)) => a.ptr_eq(b),
            (PropValue::Opaque(a), PropValue::Opaque(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Str(value) => write!(f, "{value:?}"),
            PropValue::Int(value) => write!(f, "{value}"),
            PropValue::Float(value) => write!(f, "{value}"),
            PropValue::Bool(value) => write!(f, "{value}"),
            PropValue::Handler(handler) => handler.fmt(f),
            PropValue::Opaque(value) => write!(f, "Opaque({:p})", Rc::as_ptr(value)),
        }
    }
}

impl From<&str> for PropValue {
    fn from(value: &str) -> Self {
        PropValue::Str(Rc::from(value))
    }
}

impl From<String> for PropValue {
    fn from(value: String) -> Self {
        PropValue::Str(Rc::from(value))
    }
}

impl From<Rc<str>> for PropValue {
    fn from(value: Rc<str>) -> Self {
        PropValue::Str(value)
    }
}

impl From<i64> for PropValue {
    fn from(value: i64) -> Self {
        PropValue::Int(value)
    }
}

impl From<i32> for PropValue {
    fn from(value: i32) -> Self {
        PropValue::Int(i64::from(value))
    }
}

impl From<f64> for PropValue {
    fn from(value: f64) -> Self {
        PropValue::Float(value)
    }
}

impl From<bool> for PropValue {
    fn from(value: bool) -> Self {
        PropValue::Bool(value)
    }
}

impl From<EventHandler> for PropValue {
    fn from(value: EventHandler) -> Self {
        PropValue::Handler(value)
    }
}

/// Ordered attribute mapping.
pub type Attributes = IndexMap<Rc<str>, PropValue>;

/// Attributes plus the ordered child list of a node.
#[derive(Clone, Default)]
pub struct Props {
    attrs: Attributes,
    children: Vec<VNode>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attr(mut self, name: impl Into<Rc<str>>, value: impl Into<PropValue>) -> Self {
        self.attrs.insert(name.into(), value.into());
        self
    }

    pub fn on(self, event: impl Into<Rc<str>>, handler: impl Fn(&Event) + 'static) -> Self {
        self.attr(event, EventHandler::new(handler))
    }

    pub fn child(mut self, child: VNode) -> Self {
        self.children.push(child);
        self
    }

    pub fn children(mut self, children: impl IntoIterator<Item = VNode>) -> Self {
        self.children.extend(children);
        self
    }

    pub fn get(&self, name: &str) -> Option<&PropValue> {
        self.attrs.get(name)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attrs
    }

    pub fn child_nodes(&self) -> &[VNode] {
        &self.children
    }

    /// Attribute-level equality; children are not inspected.
    pub fn same_attributes(&self, other: &Props) -> bool {
        self.attrs == other.attrs
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Props")
            .field("attrs", &self.attrs)
            .field("children", &self.children)
            .finish()
    }
}

type RenderFn = dyn Fn(&Props) -> Element;

/// A component render function together with its identity.
#[derive(Clone)]
pub struct Component {
    type_id: TypeId,
    name: &'static str,
    render: Rc<RenderFn>,
}

impl Component {
    pub fn new<F>(render: F) -> Self
    where
        F: Fn(&Props) -> Element + 'static,
    {
        Self {
            type_id: TypeId::of::<F>(),
            name: type_name::<F>(),
            render: Rc::new(render),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Two occurrences refer to the same component when built from the same function.
    pub fn same_type(&self, other: &Component) -> bool {
        self.type_id == other.type_id
    }

    pub(crate) fn render(&self, props: &Props) -> Element {
        (self.render)(props)
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Component({})", self.name)
    }
}

#[derive(Clone, Debug)]
pub enum VNodeKind {
    Element(Rc<str>),
    Text(Rc<str>),
    Component(Component),
}

#[derive(Debug)]
struct VNodeInner {
    kind: VNodeKind,
    props: Props,
    key: Option<Key>,
}

#[derive(Clone)]
pub struct VNode {
    inner: Rc<VNodeInner>,
}

impl VNode {
    fn from_parts(kind: VNodeKind, props: Props, key: Option<Key>) -> Self {
        Self {
            inner: Rc::new(VNodeInner { kind, props, key }),
        }
    }

    pub fn element(tag: impl Into<Rc<str>>, props: Props) -> Self {
        Self::from_parts(VNodeKind::Element(tag.into()), props, None)
    }

    pub fn text(value: impl Into<Rc<str>>) -> Self {
        Self::from_parts(VNodeKind::Text(value.into()), Props::default(), None)
    }

    pub fn component<F>(render: F, props: Props) -> Self
    where
        F: Fn(&Props) -> Element + 'static,
    {
        Self::from_parts(VNodeKind::Component(Component::new(render)), props, None)
    }

    /// Returns a copy of this description carrying `key`.
    pub fn keyed(self, key: impl Into<Key>) -> Self {
        let key = Some(key.into());
        match Rc::try_unwrap(self.inner) {
            Ok(inner) => Self::from_parts(inner.kind, inner.props, key),
            Err(shared) => Self::from_parts(shared.kind.clone(), shared.props.clone(), key),
        }
    }

    pub fn kind(&self) -> &VNodeKind {
        &self.inner.kind
    }

    pub fn props(&self) -> &Props {
        &self.inner.props
    }

    pub fn children(&self) -> &[VNode] {
        self.inner.props.child_nodes()
    }

    pub fn key(&self) -> Option<&Key> {
        self.inner.key.as_ref()
    }

    pub fn as_component(&self) -> Option<&Component> {
        match &self.inner.kind {
            VNodeKind::Component(component) => Some(component),
            _ => None,
        }
    }

    pub fn is_component(&self) -> bool {
        matches!(self.inner.kind, VNodeKind::Component(_))
    }

    /// Host-level type equality: same tag for elements, text against text.
    /// Components never match here; they are resolved before host diffing.
    pub(crate) fn same_host_type(&self, other: &VNode) -> bool {
        match (&self.inner.kind, &other.inner.kind) {
            (VNodeKind::Element(a), VNodeKind::Element(b)) => a == b,
            (VNodeKind::Text(_), VNodeKind::Text(_)) => true,
            _ => false,
        }
    }

    pub fn ptr_eq(&self, other: &VNode) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = f.debug_struct("VNode");
        debug.field("kind", &self.inner.kind);
        if let Some(key) = &self.inner.key {
            debug.field("key", key);
        }
        if !self.inner.props.attrs.is_empty() {
            debug.field("attrs", &self.inner.props.attrs);
        }
        if !self.inner.props.children.is_empty() {
            debug.field("children", &self.inner.props.children);
        }
        debug.finish()
    }
}

#[cfg(test)]
#[path = "tests/vnode_tests.rs"]
mod tests;
