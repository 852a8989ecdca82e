//! # Renderer
//!
//! Maps VNode trees onto the live [`Document`]: [`Renderer::create_element`]
//! builds fresh nodes, and the reconciler in `differ.rs` patches an existing
//! subtree in place.
//!
//! ## Failure containment
//!
//! Creation never fails from the caller's point of view. A subtree whose
//! creation errors (bad tag name, stale node, invalid VNode under validation)
//! is discarded, logged, and replaced by an inert `render-error` comment so
//! the rest of the tree still renders and keeps its shape.

use crate::attributes::apply_attribute;
use crate::bindings::BindingTable;
use crate::differ::flatten_children;
use crate::dom::{Document, NodeId};
use crate::errors::{RenderError, RenderResult, VNodeError};
use crate::events::{EventManager, NoopEvents};
use crate::vnode::{is_valid_tag_name, Attrs, VNode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error};

/// Data of the comment that stands in for a subtree that failed to render
pub const FALLBACK_COMMENT: &str = "render-error";

/// Renderer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RenderOptions {
    /// HTML-escape text nodes on serialization
    #[serde(default = "default_escape_text")]
    pub escape_text: bool,

    /// Validate element VNodes before creating them
    #[serde(default)]
    pub validate_vnodes: bool,
}

fn default_escape_text() -> bool {
    true
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            escape_text: default_escape_text(),
            validate_vnodes: false,
        }
    }
}

/// What one `patch` call did to the document
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PatchStats {
    pub created: usize,
    pub removed: usize,
    pub moved: usize,
    pub replaced: usize,
    pub text_updates: usize,
    pub attr_updates: usize,
    pub failures: usize,
    /// Document writes performed, as counted by the document itself
    pub mutations: u64,
}

impl PatchStats {
    pub fn is_noop(&self) -> bool {
        self.mutations == 0
    }

    pub(crate) fn absorb(&mut self, other: PatchStats) {
        self.created += other.created;
        self.removed += other.removed;
        self.moved += other.moved;
        self.replaced += other.replaced;
        self.text_updates += other.text_updates;
        self.attr_updates += other.attr_updates;
        self.failures += other.failures;
        self.mutations += other.mutations;
    }
}

/// Owns the live document and renders VNodes into it
pub struct Renderer {
    pub(crate) document: Document,
    pub(crate) events: Arc<dyn EventManager>,
    pub(crate) bindings: BindingTable,
    pub(crate) options: RenderOptions,
    pub(crate) stats: PatchStats,
}

impl Renderer {
    pub fn new() -> Self {
        Self::with_events(Arc::new(NoopEvents))
    }

    pub fn with_events(events: Arc<dyn EventManager>) -> Self {
        Self::with_options(events, RenderOptions::default())
    }

    pub fn with_options(events: Arc<dyn EventManager>, options: RenderOptions) -> Self {
        Self {
            document: Document::new(),
            events,
            bindings: BindingTable::new(),
            options,
            stats: PatchStats::default(),
        }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Direct document access, for the glue layer and for tests that poke at
    /// live nodes behind the renderer's back.
    pub fn document_mut(&mut self) -> &mut Document {
        &mut self.document
    }

    pub fn bindings(&self) -> &BindingTable {
        &self.bindings
    }

    pub fn options(&self) -> &RenderOptions {
        &self.options
    }

    /// Create a detached element to mount trees into.
    pub fn create_container(&mut self, tag: &str) -> RenderResult<NodeId> {
        let container = self.document.create_element(tag)?;
        let body = self.document.body();
        self.document.append_child(body, container)?;
        Ok(container)
    }

    /// Build live nodes for `vnode`. Never fails: a subtree that cannot be
    /// created becomes a fallback comment.
    pub fn create_element(&mut self, vnode: &VNode) -> NodeId {
        match self.try_create(vnode) {
            Ok(node) => node,
            Err(e) => {
                error!(error = %e, "Failed to create subtree - rendering fallback");
                self.fallback_node()
            }
        }
    }

    /// Like [`Renderer::create_element`], with `None` rendering a placeholder
    /// comment that keeps the tree shape stable for later diffs.
    pub fn create_element_opt(&mut self, vnode: Option<&VNode>) -> NodeId {
        match vnode {
            Some(vnode) => self.create_element(vnode),
            None => {
                self.stats.created += 1;
                self.document.create_comment("")
            }
        }
    }

    pub(crate) fn fallback_node(&mut self) -> NodeId {
        self.stats.failures += 1;
        self.document.create_comment(FALLBACK_COMMENT)
    }

    fn try_create(&mut self, vnode: &VNode) -> RenderResult<NodeId> {
        match vnode {
            VNode::Text { value } => {
                self.stats.created += 1;
                Ok(if self.options.escape_text {
                    self.document.create_text(value.as_str())
                } else {
                    self.document.create_raw_text(value.as_str())
                })
            }
            VNode::Comment { value } => {
                self.stats.created += 1;
                Ok(self.document.create_comment(value.as_str()))
            }
            VNode::Fragment { children } => {
                let fragment = self.document.create_fragment();
                for child in children {
                    let node = self.create_element(child);
                    self.document.append_child(fragment, node)?;
                }
                Ok(fragment)
            }
            VNode::Element {
                tag,
                attrs,
                children,
                key,
                node_ref,
            } => {
                if self.options.validate_vnodes && !is_valid_tag_name(tag) {
                    return Err(RenderError::VNode(VNodeError::Validation(format!(
                        "invalid tag name '{}'",
                        tag
                    ))));
                }

                let node = self.document.create_element(tag)?;
                if let Err(e) = self.populate(node, attrs, children) {
                    self.unmount(node);
                    return Err(e);
                }

                self.bindings.bind(node, key.clone(), node_ref.clone());
                self.stats.created += 1;
                debug!(tag = %tag, ?node, "Created element");
                Ok(node)
            }
        }
    }

    fn populate(&mut self, node: NodeId, attrs: &Attrs, children: &[VNode]) -> RenderResult<()> {
        for (name, value) in attrs {
            apply_attribute(
                &mut self.document,
                self.events.as_ref(),
                node,
                name,
                None,
                value,
            )?;
        }
        for child in flatten_children(children) {
            let child_node = self.create_element(child);
            self.document.append_child(node, child_node)?;
        }
        Ok(())
    }

    /// Release bindings and listeners for `node` and its subtree, then free it.
    pub(crate) fn unmount(&mut self, node: NodeId) {
        for id in self.document.descendants(node) {
            self.bindings.release(id);
            if self.document.element(id).is_some() {
                self.events.cleanup(id);
            }
        }
        if let Err(e) = self.document.discard(node) {
            debug!(error = %e, "Unmounted node was already gone");
        }
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}
