//! # VNode Model
//!
//! Immutable description of a UI tree. Four node kinds:
//!
//! - **Element**: tag, ordered attributes, children, optional key and ref
//! - **Text** and **Comment**: a string payload
//! - **Fragment**: children spliced into the parent, no node of its own
//!
//! Constructors normalize their input: tags are lower-cased, nested child
//! lists are flattened, and the reserved `key`/`ref` attributes live in their
//! own fields rather than in `attrs`.

use crate::dom::NodeId;
use crate::errors::VNodeError;
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// Ordered attribute map of an element node
pub type Attrs = IndexMap<String, AttrValue>;

/// Virtual DOM node
///
/// A VNode is immutable once built: re-rendering produces a new tree and the
/// renderer diffs it against the previous one.
#[derive(Debug, Clone, PartialEq)]
pub enum VNode {
    /// HTML element
    Element {
        tag: String,
        attrs: Attrs,
        children: Vec<VNode>,
        /// Identity hint among siblings (taken out of `attrs`)
        key: Option<String>,
        /// Handle filled with the live node once mounted (taken out of `attrs`)
        node_ref: Option<NodeRef>,
    },

    /// Text node
    Text { value: String },

    /// Comment node
    Comment { value: String },

    /// Group of siblings without a wrapping element
    Fragment { children: Vec<VNode> },
}

/// Attribute value
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Number(f64),
    Str(String),
    List(Vec<AttrValue>),
    Map(IndexMap<String, AttrValue>),
    /// Event binding, only meaningful on `on*` names
    Handler(EventHandler),
    /// Ref handle, only meaningful on the reserved `ref` name
    Ref(NodeRef),
}

impl AttrValue {
    pub fn is_truthy(&self) -> bool {
        match self {
            AttrValue::Null => false,
            AttrValue::Bool(b) => *b,
            AttrValue::Number(n) => *n != 0.0 && !n.is_nan(),
            AttrValue::Str(s) => !s.is_empty(),
            AttrValue::List(_) | AttrValue::Map(_) => true,
            AttrValue::Handler(_) | AttrValue::Ref(_) => true,
        }
    }

    pub fn is_handler(&self) -> bool {
        matches!(self, AttrValue::Handler(_))
    }

    /// String form used when the value lands in a DOM attribute.
    pub fn to_attr_string(&self) -> String {
        match self {
            AttrValue::Null => String::new(),
            AttrValue::Bool(b) => b.to_string(),
            AttrValue::Number(n) => format_number(*n),
            AttrValue::Str(s) => s.clone(),
            AttrValue::List(items) => items
                .iter()
                .filter(|item| item.is_truthy())
                .map(AttrValue::to_attr_string)
                .collect::<Vec<_>>()
                .join(" "),
            AttrValue::Map(map) => map
                .iter()
                .filter(|(_, v)| v.is_truthy())
                .map(|(k, _)| k.as_str())
                .collect::<Vec<_>>()
                .join(" "),
            AttrValue::Handler(_) | AttrValue::Ref(_) => String::new(),
        }
    }

    /// Convert a JSON value into an attribute value.
    pub fn from_json(value: &Value) -> AttrValue {
        match value {
            Value::Null => AttrValue::Null,
            Value::Bool(b) => AttrValue::Bool(*b),
            Value::Number(n) => AttrValue::Number(n.as_f64().unwrap_or_default()),
            Value::String(s) => AttrValue::Str(s.clone()),
            Value::Array(items) => AttrValue::List(items.iter().map(AttrValue::from_json).collect()),
            Value::Object(map) => AttrValue::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), AttrValue::from_json(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for AttrValue {
    fn from(s: &str) -> Self {
        AttrValue::Str(s.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(s: String) -> Self {
        AttrValue::Str(s)
    }
}

impl From<bool> for AttrValue {
    fn from(b: bool) -> Self {
        AttrValue::Bool(b)
    }
}

impl From<f64> for AttrValue {
    fn from(n: f64) -> Self {
        AttrValue::Number(n)
    }
}

impl From<i32> for AttrValue {
    fn from(n: i32) -> Self {
        AttrValue::Number(n as f64)
    }
}

impl From<i64> for AttrValue {
    fn from(n: i64) -> Self {
        AttrValue::Number(n as f64)
    }
}

impl From<EventHandler> for AttrValue {
    fn from(handler: EventHandler) -> Self {
        AttrValue::Handler(handler)
    }
}

impl From<NodeRef> for AttrValue {
    fn from(node_ref: NodeRef) -> Self {
        AttrValue::Ref(node_ref)
    }
}

impl<T: Into<AttrValue>> From<Vec<T>> for AttrValue {
    fn from(items: Vec<T>) -> Self {
        AttrValue::List(items.into_iter().map(Into::into).collect())
    }
}

/// Event delivered to a handler by the event collaborator
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub name: String,
    pub target: NodeId,
    pub detail: Value,
}

/// Callable event binding; compares by identity
#[derive(Clone)]
pub struct EventHandler(Arc<dyn Fn(&Event) + Send + Sync>);

impl EventHandler {
    pub fn new(f: impl Fn(&Event) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, event: &Event) {
        (self.0)(event)
    }
}

impl PartialEq for EventHandler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for EventHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("EventHandler(..)")
    }
}

/// Shared handle to the live node produced for an element
///
/// The renderer fills it on mount and clears it on unmount. Compares by identity.
#[derive(Clone, Default)]
pub struct NodeRef(Arc<Mutex<Option<NodeId>>>);

impl NodeRef {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<NodeId> {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn set(&self, node: Option<NodeId>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = node;
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NodeRef").field(&self.get()).finish()
    }
}

/// Child input accepted by [`create_vnode`]
///
/// Nested lists are flattened; `Empty` and booleans are dropped.
#[derive(Debug, Clone, PartialEq)]
pub enum Child {
    Node(VNode),
    Text(String),
    Number(f64),
    Bool(bool),
    Empty,
    List(Vec<Child>),
}

impl From<VNode> for Child {
    fn from(node: VNode) -> Self {
        Child::Node(node)
    }
}

impl From<&str> for Child {
    fn from(s: &str) -> Self {
        Child::Text(s.to_string())
    }
}

impl From<String> for Child {
    fn from(s: String) -> Self {
        Child::Text(s)
    }
}

impl From<f64> for Child {
    fn from(n: f64) -> Self {
        Child::Number(n)
    }
}

impl From<i32> for Child {
    fn from(n: i32) -> Self {
        Child::Number(n as f64)
    }
}

impl From<i64> for Child {
    fn from(n: i64) -> Self {
        Child::Number(n as f64)
    }
}

impl From<bool> for Child {
    fn from(b: bool) -> Self {
        Child::Bool(b)
    }
}

impl<T: Into<Child>> From<Option<T>> for Child {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Child::Empty)
    }
}

impl<T: Into<Child>> From<Vec<T>> for Child {
    fn from(items: Vec<T>) -> Self {
        Child::List(items.into_iter().map(Into::into).collect())
    }
}

/// Build an attribute map from `(name, value)` pairs.
pub fn attrs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Attrs
where
    K: Into<String>,
    V: Into<AttrValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Create an element VNode.
///
/// The tag is lower-cased, children are flattened (dropping empties and
/// booleans), and the reserved `key`/`ref` attributes are lifted into their
/// own fields.
pub fn create_vnode(tag: &str, attrs: Attrs, children: Vec<Child>) -> VNode {
    let mut attrs = attrs;
    let key = attrs.shift_remove("key").and_then(key_from_attr);
    let node_ref = attrs.shift_remove("ref").and_then(ref_from_attr);

    let mut flat = Vec::with_capacity(children.len());
    flatten_children(children, &mut flat);

    VNode::Element {
        tag: tag.to_lowercase(),
        attrs,
        children: flat,
        key,
        node_ref,
    }
}

fn key_from_attr(value: AttrValue) -> Option<String> {
    match value {
        AttrValue::Str(s) => Some(s),
        AttrValue::Number(n) => Some(format_number(n)),
        _ => None,
    }
}

fn ref_from_attr(value: AttrValue) -> Option<NodeRef> {
    match value {
        AttrValue::Ref(node_ref) => Some(node_ref),
        _ => None,
    }
}

/// Create an element VNode, rejecting invalid tag names and duplicate sibling keys.
pub fn create_vnode_checked(
    tag: &str,
    attrs: Attrs,
    children: Vec<Child>,
) -> Result<VNode, VNodeError> {
    if !is_valid_tag_name(tag) {
        return Err(VNodeError::Validation(format!("invalid tag name '{}'", tag)));
    }

    let node = create_vnode(tag, attrs, children);
    if let VNode::Element { children, .. } = &node {
        check_unique_keys(children)?;
    }
    Ok(node)
}

pub fn create_text_vnode(value: impl Into<String>) -> VNode {
    VNode::Text { value: value.into() }
}

pub fn create_comment_vnode(value: impl Into<String>) -> VNode {
    VNode::Comment { value: value.into() }
}

pub fn create_fragment_vnode(children: Vec<Child>) -> VNode {
    let mut flat = Vec::with_capacity(children.len());
    flatten_children(children, &mut flat);
    VNode::Fragment { children: flat }
}

impl VNode {
    pub fn element(tag: impl Into<String>) -> Self {
        VNode::Element {
            tag: tag.into().to_lowercase(),
            attrs: Attrs::new(),
            children: Vec::new(),
            key: None,
            node_ref: None,
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        create_text_vnode(value)
    }

    pub fn comment(value: impl Into<String>) -> Self {
        create_comment_vnode(value)
    }

    /// Set an attribute. `key` and `ref` go to their own fields, as in
    /// [`create_vnode`].
    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        if let VNode::Element {
            ref mut attrs,
            ref mut key,
            ref mut node_ref,
            ..
        } = self
        {
            let name = name.into();
            let value = value.into();
            match name.as_str() {
                "key" => *key = key_from_attr(value),
                "ref" => *node_ref = ref_from_attr(value),
                _ => {
                    attrs.insert(name, value);
                }
            }
        }
        self
    }

    pub fn with_child(mut self, child: VNode) -> Self {
        if let VNode::Element {
            ref mut children, ..
        } = self
        {
            children.push(child);
        }
        self
    }

    pub fn with_children(mut self, new_children: Vec<VNode>) -> Self {
        if let VNode::Element {
            ref mut children, ..
        } = self
        {
            children.extend(new_children);
        }
        self
    }

    pub fn with_key(mut self, new_key: impl Into<String>) -> Self {
        if let VNode::Element { ref mut key, .. } = self {
            *key = Some(new_key.into());
        }
        self
    }

    pub fn with_ref(mut self, new_ref: NodeRef) -> Self {
        if let VNode::Element {
            ref mut node_ref, ..
        } = self
        {
            *node_ref = Some(new_ref);
        }
        self
    }

    /// Build a VNode tree from a JSON description.
    ///
    /// Accepted shapes: strings and numbers (text), `null` (empty placeholder
    /// comment), arrays (fragment), `{"tag", "attrs"?, "children"?}`,
    /// `{"text"}` and `{"comment"}`.
    pub fn from_json(value: &Value) -> Result<VNode, VNodeError> {
        match value {
            Value::Null => Ok(VNode::comment("")),
            Value::String(s) => Ok(VNode::text(s.clone())),
            Value::Number(n) => Ok(VNode::text(format_number(n.as_f64().unwrap_or_default()))),
            Value::Bool(_) => Err(VNodeError::Validation(
                "a boolean cannot be rendered as a node".to_string(),
            )),
            Value::Array(items) => Ok(VNode::Fragment {
                children: json_children(items)?,
            }),
            Value::Object(map) => {
                if let Some(text) = map.get("text") {
                    return Ok(VNode::text(json_scalar_text(text)?));
                }
                if let Some(comment) = map.get("comment") {
                    return Ok(VNode::comment(json_scalar_text(comment)?));
                }

                let tag = match map.get("tag") {
                    Some(Value::String(tag)) => tag,
                    Some(other) => {
                        return Err(VNodeError::Validation(format!(
                            "tag must be a string, got {}",
                            json_type_name(other)
                        )))
                    }
                    None => return Err(VNodeError::Validation("missing tag".to_string())),
                };

                let attrs = match map.get("attrs") {
                    None | Some(Value::Null) => Attrs::new(),
                    Some(Value::Object(entries)) => entries
                        .iter()
                        .map(|(k, v)| (k.clone(), AttrValue::from_json(v)))
                        .collect(),
                    Some(other) => {
                        return Err(VNodeError::Validation(format!(
                            "attrs must be an object, got {}",
                            json_type_name(other)
                        )))
                    }
                };

                let children = match map.get("children") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(items)) => json_children(items)?,
                    Some(other) => {
                        return Err(VNodeError::Validation(format!(
                            "children must be an array, got {}",
                            json_type_name(other)
                        )))
                    }
                };

                create_vnode_checked(tag, attrs, children.into_iter().map(Child::Node).collect())
            }
        }
    }
}

fn json_children(items: &[Value]) -> Result<Vec<VNode>, VNodeError> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::Null | Value::Bool(_) => continue,
            Value::Array(nested) => out.extend(json_children(nested)?),
            other => out.push(VNode::from_json(other)?),
        }
    }
    Ok(out)
}

fn json_scalar_text(value: &Value) -> Result<String, VNodeError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(format_number(n.as_f64().unwrap_or_default())),
        other => Err(VNodeError::Validation(format!(
            "text must be a string, got {}",
            json_type_name(other)
        ))),
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn flatten_children(children: Vec<Child>, out: &mut Vec<VNode>) {
    for child in children {
        match child {
            Child::Node(node) => out.push(node),
            Child::Text(s) => out.push(VNode::text(s)),
            Child::Number(n) => out.push(VNode::text(format_number(n))),
            Child::Bool(_) | Child::Empty => {}
            Child::List(nested) => flatten_children(nested, out),
        }
    }
}

fn check_unique_keys(children: &[VNode]) -> Result<(), VNodeError> {
    let mut seen = HashSet::new();
    for child in children {
        if let VNode::Element { key: Some(key), .. } = child {
            if !seen.insert(key.as_str()) {
                return Err(VNodeError::Validation(format!(
                    "duplicate sibling key '{}'",
                    key
                )));
            }
        }
    }
    Ok(())
}

/// Element names: an ASCII letter followed by letters, digits or hyphens.
pub fn is_valid_tag_name(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '-')
        }
        _ => false,
    }
}

/// Render a number the way a text node shows it (`1` rather than `1.0`).
pub fn format_number(n: f64) -> String {
    if n.is_finite() && n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        n.to_string()
    }
}
