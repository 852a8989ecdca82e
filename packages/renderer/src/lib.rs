//! Virtual node model and reconciler for an in-memory live document.
//!
//! Build trees with [`create_vnode`] (or the [`VNode`] builder), mount them
//! with [`Renderer::create_element`] or [`Renderer::patch`], and re-render by
//! patching from the previous tree to the next one.

pub mod attributes;
pub mod bindings;
pub mod differ;
pub mod dom;
pub mod errors;
pub mod events;
pub mod render_loop;
pub mod renderer;
pub mod vnode;

pub use attributes::{class_string, style_declarations};
pub use bindings::{Binding, BindingTable};
pub use dom::{Document, ElementData, NodeData, NodeId, PropValue};
pub use errors::{DomError, RenderError, RenderResult, VNodeError};
pub use events::{event_name, EventManager, ListenerTable, NoopEvents};
pub use render_loop::{PatchOutcome, PatchRequest, RenderLoop};
pub use renderer::{PatchStats, RenderOptions, Renderer, FALLBACK_COMMENT};
pub use vnode::{
    attrs, create_comment_vnode, create_fragment_vnode, create_text_vnode, create_vnode,
    create_vnode_checked, AttrValue, Attrs, Child, Event, EventHandler, NodeRef, VNode,
};
