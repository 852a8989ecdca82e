//! # Reconciliation
//!
//! Patches a live subtree from the tree it was rendered from (`old`) to a new
//! one. Rules, in order:
//!
//! 1. identical VNode references: nothing to do
//! 2. new side absent: unmount the live node
//! 3. old side absent: create and insert
//! 4. different variant or tag: replace the whole subtree
//! 5. text and comment nodes: write the payload only if it changed
//! 6. elements: attribute diff, then children diff
//!
//! Children are compared by key when every sibling on both sides is a keyed
//! element, and by index otherwise. Fragments are flattened first so that
//! each VNode in a children list lines up with exactly one live child.

use crate::attributes::{apply_attribute, remove_attribute};
use crate::dom::{NodeData, NodeId};
use crate::errors::{DomError, RenderResult};
use crate::renderer::{PatchStats, Renderer};
use crate::vnode::VNode;
use std::collections::{HashMap, HashSet};
use std::ptr;
use tracing::{debug, error, instrument, warn};

/// Expand fragments in a children list.
pub(crate) fn flatten_children(children: &[VNode]) -> Vec<&VNode> {
    let mut out = Vec::with_capacity(children.len());
    push_flat(children, &mut out);
    out
}

fn push_flat<'a>(children: &'a [VNode], out: &mut Vec<&'a VNode>) {
    for child in children {
        match child {
            VNode::Fragment { children } => push_flat(children, out),
            other => out.push(other),
        }
    }
}

fn flatten_root(vnode: Option<&VNode>) -> Vec<&VNode> {
    match vnode {
        None => Vec::new(),
        Some(VNode::Fragment { children }) => flatten_children(children),
        Some(other) => vec![other],
    }
}

fn key_of(vnode: &VNode) -> Option<&str> {
    match vnode {
        VNode::Element { key, .. } => key.as_deref(),
        _ => None,
    }
}

/// Keys of `children` if every one of them is a keyed element with a unique key.
fn sibling_keys<'a>(children: &[&'a VNode]) -> Option<Vec<&'a str>> {
    let keys = children
        .iter()
        .map(|&child| key_of(child))
        .collect::<Option<Vec<_>>>()?;

    let mut seen = HashSet::with_capacity(keys.len());
    for key in &keys {
        if !seen.insert(*key) {
            warn!(key = %key, "Duplicate sibling key - falling back to unkeyed diff");
            return None;
        }
    }
    Some(keys)
}

impl Renderer {
    /// Reconcile the children of `container` from `old` to `new`.
    ///
    /// `container` is assumed to hold exactly the nodes rendered from `old`.
    /// Errors never escape: a failing subtree is swapped for a fallback
    /// comment and counted in [`PatchStats::failures`].
    #[instrument(skip_all, fields(?container))]
    pub fn patch(
        &mut self,
        container: NodeId,
        old: Option<&VNode>,
        new: Option<&VNode>,
    ) -> PatchStats {
        if let (Some(old), Some(new)) = (old, new) {
            if ptr::eq(old, new) {
                return PatchStats::default();
            }
        }

        self.begin_pass();
        let old_children = flatten_root(old);
        let new_children = flatten_root(new);
        if let Err(e) = self.diff_children(container, &old_children, &new_children) {
            error!(error = %e, "Patch failed");
            self.stats.failures += 1;
        }
        self.end_pass()
    }

    /// Reconcile the single live child at `index` of `parent`.
    pub fn update_element(
        &mut self,
        parent: NodeId,
        index: usize,
        old: Option<&VNode>,
        new: Option<&VNode>,
    ) -> PatchStats {
        self.begin_pass();
        self.update_child(parent, index, old, new);
        self.end_pass()
    }

    fn begin_pass(&mut self) {
        self.stats = PatchStats {
            mutations: self.document.mutation_count(),
            ..PatchStats::default()
        };
    }

    fn end_pass(&mut self) -> PatchStats {
        let mut stats = std::mem::take(&mut self.stats);
        stats.mutations = self.document.mutation_count() - stats.mutations;
        debug!(?stats, "Patch complete");
        stats
    }

    fn update_child(
        &mut self,
        parent: NodeId,
        index: usize,
        old: Option<&VNode>,
        new: Option<&VNode>,
    ) {
        if let Err(e) = self.try_update(parent, index, old, new) {
            error!(error = %e, index, "Failed to patch subtree - rendering fallback");
            if new.is_some() {
                self.recover(parent, index);
            } else {
                self.stats.failures += 1;
            }
        }
    }

    /// Swap whatever sits at `index` for a fallback comment.
    fn recover(&mut self, parent: NodeId, index: usize) {
        let fallback = self.fallback_node();
        let placed = match self.document.child_at(parent, index) {
            Some(existing) => self
                .document
                .replace_child(parent, fallback, existing)
                .map(|_| self.unmount(existing)),
            None => self.document.append_child(parent, fallback),
        };
        if let Err(e) = placed {
            error!(error = %e, "Could not place fallback node");
            let _ = self.document.discard(fallback);
        }
    }

    fn try_update(
        &mut self,
        parent: NodeId,
        index: usize,
        old: Option<&VNode>,
        new: Option<&VNode>,
    ) -> RenderResult<()> {
        let live = self.document.child_at(parent, index);
        match (old, new, live) {
            (_, None, None) => Ok(()),
            (_, None, Some(node)) => {
                self.document.remove_child(parent, node)?;
                self.unmount(node);
                self.stats.removed += 1;
                Ok(())
            }
            (None, Some(new), _) | (Some(_), Some(new), None) => {
                let node = self.create_element(new);
                self.insert_at(parent, node, index)
            }
            (Some(old), Some(new), Some(node)) => {
                if ptr::eq(old, new) {
                    return Ok(());
                }
                self.morph(parent, node, old, new)
            }
        }
    }

    fn insert_at(&mut self, parent: NodeId, node: NodeId, index: usize) -> RenderResult<()> {
        let reference = self.document.child_at(parent, index);
        self.document.insert_before(parent, node, reference)?;
        self.release_shell(node);
        Ok(())
    }

    /// A fragment is empty once its children are spliced in; free the shell.
    fn release_shell(&mut self, node: NodeId) {
        if matches!(self.document.node(node), Ok(NodeData::Fragment)) {
            let _ = self.document.discard(node);
        }
    }

    fn morph(&mut self, parent: NodeId, node: NodeId, old: &VNode, new: &VNode) -> RenderResult<()> {
        match (old, new) {
            (VNode::Text { value: before }, VNode::Text { value: after })
            | (VNode::Comment { value: before }, VNode::Comment { value: after }) => {
                if before != after {
                    self.document.set_text(node, after)?;
                    self.stats.text_updates += 1;
                }
                Ok(())
            }
            (VNode::Element { tag: old_tag, .. }, VNode::Element { tag: new_tag, .. })
                if old_tag == new_tag =>
            {
                self.patch_element(node, old, new)
            }
            _ => self.replace(parent, node, new),
        }
    }

    fn replace(&mut self, parent: NodeId, node: NodeId, new: &VNode) -> RenderResult<()> {
        let fresh = self.create_element(new);
        if let Err(e) = self.document.replace_child(parent, fresh, node) {
            self.unmount(fresh);
            return Err(e.into());
        }
        self.release_shell(fresh);
        self.unmount(node);
        self.stats.replaced += 1;
        Ok(())
    }

    fn patch_element(&mut self, node: NodeId, old: &VNode, new: &VNode) -> RenderResult<()> {
        let (
            VNode::Element {
                attrs: old_attrs,
                children: old_children,
                key: old_key,
                node_ref: old_ref,
                ..
            },
            VNode::Element {
                attrs: new_attrs,
                children: new_children,
                key: new_key,
                node_ref: new_ref,
                ..
            },
        ) = (old, new)
        else {
            return Err(DomError::NotAnElement(node).into());
        };

        for (name, previous) in old_attrs {
            if !new_attrs.contains_key(name) {
                remove_attribute(&mut self.document, self.events.as_ref(), node, name, previous)?;
                self.stats.attr_updates += 1;
            }
        }
        for (name, value) in new_attrs {
            let previous = old_attrs.get(name);
            if previous == Some(value) {
                continue;
            }
            apply_attribute(
                &mut self.document,
                self.events.as_ref(),
                node,
                name,
                previous,
                value,
            )?;
            self.stats.attr_updates += 1;
        }

        if old_key != new_key || old_ref != new_ref {
            self.bindings.release(node);
            self.bindings.bind(node, new_key.clone(), new_ref.clone());
        }

        let old_children = flatten_children(old_children);
        let new_children = flatten_children(new_children);
        self.diff_children(node, &old_children, &new_children)
    }

    fn diff_children(&mut self, parent: NodeId, old: &[&VNode], new: &[&VNode]) -> RenderResult<()> {
        if old.is_empty() || new.is_empty() {
            self.diff_unkeyed(parent, old, new);
            return Ok(());
        }
        match (sibling_keys(old), sibling_keys(new)) {
            (Some(old_keys), Some(new_keys)) => {
                self.diff_keyed(parent, old, &old_keys, new, &new_keys)
            }
            _ => {
                self.diff_unkeyed(parent, old, new);
                Ok(())
            }
        }
    }

    fn diff_unkeyed(&mut self, parent: NodeId, old: &[&VNode], new: &[&VNode]) {
        let shared = old.len().min(new.len());
        for i in 0..shared {
            self.update_child(parent, i, Some(old[i]), Some(new[i]));
        }
        for i in (shared..old.len()).rev() {
            self.update_child(parent, i, Some(old[i]), None);
        }
        for (i, child) in new.iter().enumerate().skip(shared) {
            self.update_child(parent, i, None, Some(*child));
        }
    }

    fn diff_keyed(
        &mut self,
        parent: NodeId,
        old: &[&VNode],
        old_keys: &[&str],
        new: &[&VNode],
        new_keys: &[&str],
    ) -> RenderResult<()> {
        let live = self.document.children(parent)?.to_vec();
        let live_by_key: HashMap<&str, NodeId> = live
            .iter()
            .filter_map(|node| self.bindings.key_of(*node).map(|key| (key, *node)))
            .collect();

        let mut matched: HashMap<&str, (&VNode, NodeId)> = HashMap::with_capacity(old.len());
        for (i, (vnode, key)) in old.iter().zip(old_keys).enumerate() {
            let node = live_by_key.get(key).copied().or_else(|| live.get(i).copied());
            if let Some(node) = node {
                matched.insert(*key, (*vnode, node));
            }
        }

        let wanted: HashSet<&str> = new_keys.iter().copied().collect();
        for key in old_keys {
            if wanted.contains(key) {
                continue;
            }
            if let Some((_, node)) = matched.remove(key) {
                self.document.remove_child(parent, node)?;
                self.unmount(node);
                self.stats.removed += 1;
            }
        }

        for (i, (vnode, key)) in new.iter().zip(new_keys).enumerate() {
            match matched.get(key).copied() {
                Some((old_vnode, node)) => {
                    if self.document.index_of(parent, node) != Some(i) {
                        let reference = self.document.child_at(parent, i);
                        self.document.insert_before(parent, node, reference)?;
                        self.stats.moved += 1;
                    }
                    self.update_child(parent, i, Some(old_vnode), Some(*vnode));
                }
                None => {
                    let node = self.create_element(vnode);
                    self.insert_at(parent, node, i)?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyed(tag: &str, key: &str) -> VNode {
        VNode::element(tag).with_key(key)
    }

    #[test]
    fn test_flatten_expands_nested_fragments() {
        let children = vec![
            VNode::text("a"),
            VNode::Fragment {
                children: vec![
                    VNode::text("b"),
                    VNode::Fragment {
                        children: vec![VNode::text("c")],
                    },
                ],
            },
        ];

        let flat = flatten_children(&children);
        let texts: Vec<_> = flat
            .iter()
            .map(|v| match v {
                VNode::Text { value } => value.as_str(),
                _ => "",
            })
            .collect();
        assert_eq!(texts, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_sibling_keys_requires_every_child_keyed() {
        let a = keyed("li", "a");
        let b = keyed("li", "b");
        let plain = VNode::element("li");

        assert_eq!(sibling_keys(&[&a, &b]), Some(vec!["a", "b"]));
        assert_eq!(sibling_keys(&[&a, &plain]), None);
    }

    #[test]
    fn test_sibling_keys_rejects_duplicates() {
        let a = keyed("li", "a");
        let again = keyed("li", "a");
        assert_eq!(sibling_keys(&[&a, &again]), None);
    }

    #[test]
    fn test_text_only_written_when_changed() {
        let mut renderer = Renderer::new();
        let container = renderer.create_container("div").unwrap();
        let first = VNode::text("same");
        renderer.patch(container, None, Some(&first));

        let unchanged = renderer.patch(container, Some(&first), Some(&VNode::text("same")));
        assert_eq!(unchanged.mutations, 0);

        let changed = renderer.patch(container, Some(&first), Some(&VNode::text("new")));
        assert_eq!(changed.text_updates, 1);
        assert_eq!(renderer.document().inner_html(container), "new");
    }

    #[test]
    fn test_tag_change_replaces_subtree() {
        let mut renderer = Renderer::new();
        let container = renderer.create_container("div").unwrap();
        let old = VNode::element("span").with_child(VNode::text("x"));
        let new = VNode::element("em").with_child(VNode::text("x"));

        renderer.patch(container, None, Some(&old));
        let stats = renderer.patch(container, Some(&old), Some(&new));

        assert_eq!(stats.replaced, 1);
        assert_eq!(renderer.document().inner_html(container), "<em>x</em>");
    }

    #[test]
    fn test_absent_new_tree_clears_container() {
        let mut renderer = Renderer::new();
        let container = renderer.create_container("div").unwrap();
        let old = VNode::element("p").with_child(VNode::text("bye"));

        renderer.patch(container, None, Some(&old));
        let live_before = renderer.document().live_count();
        let stats = renderer.patch(container, Some(&old), None);

        assert_eq!(stats.removed, 1);
        assert_eq!(renderer.document().inner_html(container), "");
        assert_eq!(renderer.document().live_count(), live_before - 2);
    }

    #[test]
    fn test_update_element_targets_one_child() {
        let mut renderer = Renderer::new();
        let container = renderer.create_container("div").unwrap();
        let old = VNode::Fragment {
            children: vec![VNode::element("a"), VNode::element("b")],
        };
        renderer.patch(container, None, Some(&old));

        let stats = renderer.update_element(
            container,
            1,
            Some(&VNode::element("b")),
            Some(&VNode::element("b").with_attr("title", "t")),
        );

        assert_eq!(stats.attr_updates, 1);
        assert_eq!(
            renderer.document().inner_html(container),
            "<a></a><b title=\"t\"></b>"
        );
    }
}
