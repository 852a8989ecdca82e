//! # Live Document
//!
//! In-memory document tree the renderer writes into. It models the subset of
//! the browser DOM the reconciler relies on:
//!
//! - element, text, comment and fragment nodes
//! - attributes, live properties (with attribute reflection) and inline styles
//! - child-list edits with DOM semantics (inserting an attached node moves it,
//!   inserting a fragment splices its children)
//! - HTML serialization
//!
//! Nodes live in an arena and are addressed by generational [`NodeId`]s.
//! Discarding a subtree frees its slots, so ids held elsewhere (the binding
//! table, refs) go stale instead of keeping nodes alive.
//!
//! Every observable write bumps a mutation counter, which is how tests assert
//! that a patch touched nothing.

use crate::errors::DomError;
use crate::vnode::{format_number, is_valid_tag_name};
use std::collections::BTreeMap;

/// Stable identity token for a live node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId {
    index: u32,
    generation: u32,
}

/// Value of a live DOM property
#[derive(Debug, Clone, PartialEq)]
pub enum PropValue {
    Bool(bool),
    Number(f64),
    Str(String),
}

impl PropValue {
    fn reflected(&self) -> Option<String> {
        match self {
            PropValue::Bool(true) => Some(String::new()),
            PropValue::Bool(false) => None,
            PropValue::Number(n) => Some(format_number(*n)),
            PropValue::Str(s) => Some(s.clone()),
        }
    }
}

/// Element payload
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementData {
    pub tag: String,
    pub attributes: BTreeMap<String, String>,
    pub properties: BTreeMap<String, PropValue>,
    pub style: BTreeMap<String, String>,
}

/// Node payload
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    Element(ElementData),
    /// `raw` text is serialized without HTML escaping
    Text { data: String, raw: bool },
    Comment { data: String },
    Fragment,
}

#[derive(Debug)]
struct NodeEntry {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<NodeEntry>,
}

/// In-memory document
#[derive(Debug)]
pub struct Document {
    slots: Vec<Slot>,
    free: Vec<u32>,
    body: NodeId,
    mutations: u64,
    created: u64,
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Properties whose writes are mirrored into the attribute of the same name.
/// `value`, `checked` and `selected` track user state and are not reflected.
fn is_reflected(name: &str) -> bool {
    !matches!(name, "value" | "checked" | "selected")
}

fn element_has_property(tag: &str, name: &str) -> bool {
    let global = matches!(
        name,
        "id" | "title" | "lang" | "dir" | "hidden" | "tabindex" | "draggable"
    );
    global
        || match tag {
            "input" => matches!(
                name,
                "value"
                    | "checked"
                    | "disabled"
                    | "readonly"
                    | "type"
                    | "name"
                    | "placeholder"
                    | "required"
                    | "min"
                    | "max"
                    | "step"
                    | "multiple"
            ),
            "textarea" => matches!(
                name,
                "value" | "disabled" | "readonly" | "placeholder" | "name" | "rows" | "cols" | "required"
            ),
            "select" => matches!(name, "value" | "disabled" | "multiple" | "name" | "required"),
            "option" => matches!(name, "value" | "selected" | "disabled" | "label"),
            "button" => matches!(name, "disabled" | "type" | "name" | "value"),
            "a" => matches!(name, "href" | "target" | "rel" | "download"),
            "img" => matches!(name, "src" | "alt" | "width" | "height"),
            "form" => matches!(name, "action" | "method"),
            "details" | "dialog" => name == "open",
            _ => false,
        }
}

/// Parse `"color: red; margin: 0"` into declarations.
pub fn parse_style_declarations(css: &str) -> Vec<(String, String)> {
    css.split(';')
        .filter_map(|decl| {
            let (prop, value) = decl.split_once(':')?;
            let prop = prop.trim();
            let value = value.trim();
            if prop.is_empty() || value.is_empty() {
                None
            } else {
                Some((prop.to_string(), value.to_string()))
            }
        })
        .collect()
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

impl Document {
    pub fn new() -> Self {
        let mut doc = Self {
            slots: Vec::new(),
            free: Vec::new(),
            body: NodeId {
                index: 0,
                generation: 0,
            },
            mutations: 0,
            created: 0,
        };
        doc.body = doc.alloc(NodeData::Element(ElementData {
            tag: "body".to_string(),
            ..Default::default()
        }));
        doc
    }

    /// Root element every mounted container hangs from
    pub fn body(&self) -> NodeId {
        self.body
    }

    /// Number of writes applied to nodes so far
    pub fn mutation_count(&self) -> u64 {
        self.mutations
    }

    /// Number of nodes created so far
    pub fn created_count(&self) -> u64 {
        self.created
    }

    /// Number of nodes currently alive
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.entry.is_some()).count()
    }

    pub fn is_alive(&self, id: NodeId) -> bool {
        self.entry(id).is_ok()
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    pub fn create_element(&mut self, tag: &str) -> Result<NodeId, DomError> {
        if !is_valid_tag_name(tag) {
            return Err(DomError::InvalidCharacter(tag.to_string()));
        }
        Ok(self.alloc(NodeData::Element(ElementData {
            tag: tag.to_lowercase(),
            ..Default::default()
        })))
    }

    pub fn create_text(&mut self, data: impl Into<String>) -> NodeId {
        self.alloc(NodeData::Text {
            data: data.into(),
            raw: false,
        })
    }

    /// Text node serialized without escaping
    pub fn create_raw_text(&mut self, data: impl Into<String>) -> NodeId {
        self.alloc(NodeData::Text {
            data: data.into(),
            raw: true,
        })
    }

    pub fn create_comment(&mut self, data: impl Into<String>) -> NodeId {
        self.alloc(NodeData::Comment { data: data.into() })
    }

    pub fn create_fragment(&mut self) -> NodeId {
        self.alloc(NodeData::Fragment)
    }

    fn alloc(&mut self, data: NodeData) -> NodeId {
        self.created += 1;
        let entry = NodeEntry {
            data,
            parent: None,
            children: Vec::new(),
        };

        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.entry = Some(entry);
            return NodeId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        NodeId {
            index,
            generation: 0,
        }
    }

    // ------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------

    fn entry(&self, id: NodeId) -> Result<&NodeEntry, DomError> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
            .ok_or(DomError::NodeNotFound(id))
    }

    fn entry_mut(&mut self, id: NodeId) -> Result<&mut NodeEntry, DomError> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
            .ok_or(DomError::NodeNotFound(id))
    }

    pub fn node(&self, id: NodeId) -> Result<&NodeData, DomError> {
        Ok(&self.entry(id)?.data)
    }

    pub fn element(&self, id: NodeId) -> Option<&ElementData> {
        match self.node(id) {
            Ok(NodeData::Element(el)) => Some(el),
            _ => None,
        }
    }

    fn element_mut(&mut self, id: NodeId) -> Result<&mut ElementData, DomError> {
        match &mut self.entry_mut(id)?.data {
            NodeData::Element(el) => Ok(el),
            _ => Err(DomError::NotAnElement(id)),
        }
    }

    pub fn tag(&self, id: NodeId) -> Option<&str> {
        self.element(id).map(|el| el.tag.as_str())
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.entry(id).ok().and_then(|e| e.parent)
    }

    pub fn children(&self, id: NodeId) -> Result<&[NodeId], DomError> {
        Ok(&self.entry(id)?.children)
    }

    pub fn child_at(&self, id: NodeId, index: usize) -> Option<NodeId> {
        self.entry(id).ok().and_then(|e| e.children.get(index).copied())
    }

    pub fn index_of(&self, parent: NodeId, child: NodeId) -> Option<usize> {
        self.entry(parent)
            .ok()
            .and_then(|e| e.children.iter().position(|c| *c == child))
    }

    /// Character data of a text or comment node
    pub fn text(&self, id: NodeId) -> Option<&str> {
        match self.node(id) {
            Ok(NodeData::Text { data, .. }) | Ok(NodeData::Comment { data }) => Some(data),
            _ => None,
        }
    }

    /// Concatenated text of every descendant text node
    pub fn text_content(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(id, &mut out);
        out
    }

    fn collect_text(&self, id: NodeId, out: &mut String) {
        let Ok(entry) = self.entry(id) else { return };
        match &entry.data {
            NodeData::Text { data, .. } => out.push_str(data),
            NodeData::Comment { .. } => {}
            NodeData::Element(_) | NodeData::Fragment => {
                for child in &entry.children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// Node and all its descendants, parents before children
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![id];
        while let Some(next) = stack.pop() {
            if let Ok(entry) = self.entry(next) {
                out.push(next);
                stack.extend(entry.children.iter().rev().copied());
            }
        }
        out
    }

    fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.parent(id);
        }
        false
    }

    // ------------------------------------------------------------------
    // Child list
    // ------------------------------------------------------------------

    pub fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.insert_before(parent, child, None)
    }

    /// Insert `child` before `reference` (or at the end). An attached child is
    /// moved; a fragment child is emptied into `parent`.
    pub fn insert_before(
        &mut self,
        parent: NodeId,
        child: NodeId,
        reference: Option<NodeId>,
    ) -> Result<(), DomError> {
        match self.node(parent)? {
            NodeData::Element(_) | NodeData::Fragment => {}
            _ => {
                return Err(DomError::Hierarchy(format!(
                    "{:?} cannot have children",
                    parent
                )))
            }
        }
        self.entry(child)?;
        if let Some(reference) = reference {
            if self.parent(reference) != Some(parent) {
                return Err(DomError::NotAChild {
                    parent,
                    node: reference,
                });
            }
            if reference == child {
                return Ok(());
            }
        }
        if self.is_inclusive_ancestor(child, parent) {
            return Err(DomError::Hierarchy(format!(
                "{:?} is an ancestor of {:?}",
                child, parent
            )));
        }

        let moving = if matches!(self.node(child)?, NodeData::Fragment) {
            std::mem::take(&mut self.entry_mut(child)?.children)
        } else {
            if let Some(old_parent) = self.parent(child) {
                self.detach(old_parent, child)?;
            }
            vec![child]
        };

        let position = match reference {
            Some(reference) => self
                .index_of(parent, reference)
                .ok_or(DomError::NotAChild {
                    parent,
                    node: reference,
                })?,
            None => self.entry(parent)?.children.len(),
        };

        for (offset, node) in moving.iter().enumerate() {
            self.entry_mut(*node)?.parent = Some(parent);
            self.entry_mut(parent)?
                .children
                .insert(position + offset, *node);
            self.mutations += 1;
        }

        Ok(())
    }

    pub fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        if self.parent(child) != Some(parent) {
            return Err(DomError::NotAChild {
                parent,
                node: child,
            });
        }
        self.detach(parent, child)
    }

    /// Put `new_child` where `old_child` is. `old_child` ends up detached.
    pub fn replace_child(
        &mut self,
        parent: NodeId,
        new_child: NodeId,
        old_child: NodeId,
    ) -> Result<(), DomError> {
        if self.parent(old_child) != Some(parent) {
            return Err(DomError::NotAChild {
                parent,
                node: old_child,
            });
        }
        if new_child == old_child {
            return Ok(());
        }

        let index = self.index_of(parent, old_child).unwrap_or_default();
        let reference = self.child_at(parent, index + 1);
        self.detach(parent, old_child)?;
        self.insert_before(parent, new_child, reference)
    }

    fn detach(&mut self, parent: NodeId, child: NodeId) -> Result<(), DomError> {
        self.entry_mut(parent)?.children.retain(|c| *c != child);
        self.entry_mut(child)?.parent = None;
        self.mutations += 1;
        Ok(())
    }

    /// Detach `id` if attached and free it with its whole subtree.
    pub fn discard(&mut self, id: NodeId) -> Result<(), DomError> {
        if let Some(parent) = self.parent(id) {
            self.detach(parent, id)?;
        }
        for node in self.descendants(id) {
            let slot = &mut self.slots[node.index as usize];
            slot.entry = None;
            slot.generation = slot.generation.wrapping_add(1);
            self.free.push(node.index);
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Attributes, properties, styles, text
    // ------------------------------------------------------------------

    pub fn attribute(&self, id: NodeId, name: &str) -> Option<&str> {
        self.element(id)
            .and_then(|el| el.attributes.get(name))
            .map(String::as_str)
    }

    pub fn set_attribute(&mut self, id: NodeId, name: &str, value: &str) -> Result<(), DomError> {
        let el = self.element_mut(id)?;
        if name == "style" {
            el.style = parse_style_declarations(value).into_iter().collect();
        }
        el.attributes.insert(name.to_string(), value.to_string());
        self.mutations += 1;
        Ok(())
    }

    pub fn remove_attribute(&mut self, id: NodeId, name: &str) -> Result<(), DomError> {
        let el = self.element_mut(id)?;
        if name == "style" {
            el.style.clear();
        }
        if el.attributes.remove(name).is_some() {
            self.mutations += 1;
        }
        Ok(())
    }

    /// Whether the element exposes `name` as a live property
    pub fn has_property(&self, id: NodeId, name: &str) -> bool {
        self.element(id)
            .map(|el| element_has_property(&el.tag, name))
            .unwrap_or(false)
    }

    pub fn property(&self, id: NodeId, name: &str) -> Option<&PropValue> {
        self.element(id).and_then(|el| el.properties.get(name))
    }

    pub fn set_property(&mut self, id: NodeId, name: &str, value: PropValue) -> Result<(), DomError> {
        let el = self.element_mut(id)?;
        if is_reflected(name) && element_has_property(&el.tag, name) {
            match value.reflected() {
                Some(attr) => el.attributes.insert(name.to_string(), attr),
                None => el.attributes.remove(name),
            };
        }
        el.properties.insert(name.to_string(), value);
        self.mutations += 1;
        Ok(())
    }

    pub fn remove_property(&mut self, id: NodeId, name: &str) -> Result<(), DomError> {
        let el = self.element_mut(id)?;
        if el.properties.remove(name).is_some() {
            if is_reflected(name) {
                el.attributes.remove(name);
            }
            self.mutations += 1;
        }
        Ok(())
    }

    pub fn style(&self, id: NodeId, prop: &str) -> Option<&str> {
        self.element(id)
            .and_then(|el| el.style.get(prop))
            .map(String::as_str)
    }

    pub fn set_style(&mut self, id: NodeId, prop: &str, value: &str) -> Result<(), DomError> {
        let el = self.element_mut(id)?;
        el.style.insert(prop.to_string(), value.to_string());
        sync_style_attribute(el);
        self.mutations += 1;
        Ok(())
    }

    pub fn remove_style(&mut self, id: NodeId, prop: &str) -> Result<(), DomError> {
        let el = self.element_mut(id)?;
        if el.style.remove(prop).is_some() {
            sync_style_attribute(el);
            self.mutations += 1;
        }
        Ok(())
    }

    pub fn set_text(&mut self, id: NodeId, value: &str) -> Result<(), DomError> {
        match &mut self.entry_mut(id)?.data {
            NodeData::Text { data, .. } | NodeData::Comment { data } => {
                *data = value.to_string();
            }
            _ => return Err(DomError::NotCharacterData(id)),
        }
        self.mutations += 1;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Serialization
    // ------------------------------------------------------------------

    pub fn outer_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        self.write_html(id, &mut out);
        out
    }

    pub fn inner_html(&self, id: NodeId) -> String {
        let mut out = String::new();
        if let Ok(entry) = self.entry(id) {
            for child in &entry.children {
                self.write_html(*child, &mut out);
            }
        }
        out
    }

    fn write_html(&self, id: NodeId, out: &mut String) {
        let Ok(entry) = self.entry(id) else { return };
        match &entry.data {
            NodeData::Text { data, raw } => {
                if *raw {
                    out.push_str(data);
                } else {
                    out.push_str(&escape_html(data));
                }
            }
            NodeData::Comment { data } => {
                out.push_str("<!--");
                out.push_str(data);
                out.push_str("-->");
            }
            NodeData::Fragment => {
                for child in &entry.children {
                    self.write_html(*child, out);
                }
            }
            NodeData::Element(el) => {
                out.push('<');
                out.push_str(&el.tag);
                for (name, value) in &el.attributes {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    out.push_str(&escape_html(value));
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&el.tag.as_str()) {
                    return;
                }
                for child in &entry.children {
                    self.write_html(*child, out);
                }
                out.push_str("</");
                out.push_str(&el.tag);
                out.push('>');
            }
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

fn sync_style_attribute(el: &mut ElementData) {
    if el.style.is_empty() {
        el.attributes.remove("style");
    } else {
        let css = el
            .style
            .iter()
            .map(|(k, v)| format!("{}: {}", k, v))
            .collect::<Vec<_>>()
            .join("; ");
        el.attributes.insert("style".to_string(), css);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_and_serialize() {
        let mut doc = Document::new();
        let div = doc.create_element("div").unwrap();
        doc.set_attribute(div, "id", "a").unwrap();
        let text = doc.create_text("1 < 2");
        doc.append_child(div, text).unwrap();

        assert_eq!(doc.outer_html(div), "<div id=\"a\">1 &lt; 2</div>");
        assert_eq!(doc.parent(text), Some(div));
    }

    #[test]
    fn test_raw_text_is_not_escaped() {
        let mut doc = Document::new();
        let p = doc.create_element("p").unwrap();
        let raw = doc.create_raw_text("<b>bold</b>");
        doc.append_child(p, raw).unwrap();

        assert_eq!(doc.inner_html(p), "<b>bold</b>");
    }

    #[test]
    fn test_invalid_tag_rejected() {
        let mut doc = Document::new();
        assert_eq!(
            doc.create_element("not valid"),
            Err(DomError::InvalidCharacter("not valid".to_string()))
        );
    }

    #[test]
    fn test_insert_moves_attached_node() {
        let mut doc = Document::new();
        let list = doc.create_element("ul").unwrap();
        let a = doc.create_element("li").unwrap();
        let b = doc.create_element("li").unwrap();
        doc.append_child(list, a).unwrap();
        doc.append_child(list, b).unwrap();

        doc.insert_before(list, b, Some(a)).unwrap();

        assert_eq!(doc.children(list).unwrap(), &[b, a]);
    }

    #[test]
    fn test_fragment_children_are_spliced() {
        let mut doc = Document::new();
        let parent = doc.create_element("div").unwrap();
        let tail = doc.create_element("span").unwrap();
        doc.append_child(parent, tail).unwrap();

        let frag = doc.create_fragment();
        let x = doc.create_text("x");
        let y = doc.create_text("y");
        doc.append_child(frag, x).unwrap();
        doc.append_child(frag, y).unwrap();
        doc.insert_before(parent, frag, Some(tail)).unwrap();

        assert_eq!(doc.children(parent).unwrap(), &[x, y, tail]);
        assert!(doc.children(frag).unwrap().is_empty());
    }

    #[test]
    fn test_replace_child_keeps_position() {
        let mut doc = Document::new();
        let parent = doc.create_element("div").unwrap();
        let a = doc.create_text("a");
        let b = doc.create_text("b");
        let c = doc.create_text("c");
        doc.append_child(parent, a).unwrap();
        doc.append_child(parent, b).unwrap();

        doc.replace_child(parent, c, a).unwrap();

        assert_eq!(doc.children(parent).unwrap(), &[c, b]);
        assert_eq!(doc.parent(a), None);
    }

    #[test]
    fn test_cycle_rejected() {
        let mut doc = Document::new();
        let outer = doc.create_element("div").unwrap();
        let inner = doc.create_element("div").unwrap();
        doc.append_child(outer, inner).unwrap();

        assert!(matches!(
            doc.append_child(inner, outer),
            Err(DomError::Hierarchy(_))
        ));
    }

    #[test]
    fn test_discard_frees_subtree_and_stales_ids() {
        let mut doc = Document::new();
        let parent = doc.create_element("div").unwrap();
        let child = doc.create_element("span").unwrap();
        doc.append_child(parent, child).unwrap();
        let before = doc.live_count();

        doc.discard(parent).unwrap();

        assert_eq!(doc.live_count(), before - 2);
        assert!(!doc.is_alive(child));
        let reused = doc.create_element("p").unwrap();
        assert_ne!(reused, child);
        assert!(matches!(doc.node(child), Err(DomError::NodeNotFound(_))));
    }

    #[test]
    fn test_reflected_property_writes_attribute() {
        let mut doc = Document::new();
        let link = doc.create_element("a").unwrap();
        doc.set_property(link, "href", PropValue::Str("/home".into()))
            .unwrap();
        assert_eq!(doc.attribute(link, "href"), Some("/home"));

        let input = doc.create_element("input").unwrap();
        doc.set_property(input, "value", PropValue::Str("typed".into()))
            .unwrap();
        assert_eq!(doc.attribute(input, "value"), None);
        assert!(doc.has_property(input, "checked"));
        assert!(!doc.has_property(link, "checked"));
    }

    #[test]
    fn test_style_map_and_attribute_stay_in_sync() {
        let mut doc = Document::new();
        let div = doc.create_element("div").unwrap();
        doc.set_style(div, "color", "red").unwrap();
        doc.set_style(div, "margin", "0").unwrap();
        assert_eq!(doc.attribute(div, "style"), Some("color: red; margin: 0"));

        doc.remove_style(div, "color").unwrap();
        assert_eq!(doc.attribute(div, "style"), Some("margin: 0"));

        doc.set_attribute(div, "style", "padding: 4px").unwrap();
        assert_eq!(doc.style(div, "padding"), Some("4px"));
        assert_eq!(doc.style(div, "margin"), None);
    }

    #[test]
    fn test_mutation_counter() {
        let mut doc = Document::new();
        let div = doc.create_element("div").unwrap();
        let start = doc.mutation_count();

        doc.set_attribute(div, "title", "x").unwrap();
        doc.remove_attribute(div, "missing").unwrap();

        assert_eq!(doc.mutation_count(), start + 1);
    }
}
