//! # Attribute application rules
//!
//! How a VNode attribute lands on a live element:
//!
//! | name                                  | effect                                         |
//! |---------------------------------------|------------------------------------------------|
//! | `on*` with a handler                  | delegated to the [`EventManager`]              |
//! | `class` / `className`                 | truthy entries of string/list/map, space-joined |
//! | `style`                               | CSS string or property map (`null` clears)     |
//! | `checked` `disabled` `readonly` `selected` | live property and attribute presence      |
//! | `value` on `input` / `textarea`       | live property and attribute                    |
//! | `data-*` / `aria-*`                   | always an attribute                            |
//! | anything else                         | live property if the element has one, else attribute |

use crate::dom::{parse_style_declarations, Document, NodeId, PropValue};
use crate::errors::DomError;
use crate::events::{event_name, EventManager};
use crate::vnode::AttrValue;
use std::collections::BTreeMap;
use tracing::debug;

const BOOLEAN_PROPERTIES: &[&str] = &["checked", "disabled", "readonly", "selected"];

fn is_boolean_property(name: &str) -> bool {
    BOOLEAN_PROPERTIES.contains(&name)
}

fn is_value_property(doc: &Document, node: NodeId, name: &str) -> bool {
    name == "value" && matches!(doc.tag(node), Some("input") | Some("textarea"))
}

/// Normalize a `class` value to its space-joined truthy entries.
pub fn class_string(value: &AttrValue) -> String {
    match value {
        AttrValue::Null | AttrValue::Bool(_) => String::new(),
        other => other.to_attr_string(),
    }
}

/// Resolve a `style` value to property declarations. `None` clears.
pub fn style_declarations(value: &AttrValue) -> BTreeMap<String, Option<String>> {
    match value {
        AttrValue::Str(css) => parse_style_declarations(css)
            .into_iter()
            .map(|(k, v)| (k, Some(v)))
            .collect(),
        AttrValue::Map(map) => map
            .iter()
            .map(|(prop, v)| {
                let value = match v {
                    AttrValue::Null => None,
                    other => Some(other.to_attr_string()),
                };
                (prop.clone(), value)
            })
            .collect(),
        _ => BTreeMap::new(),
    }
}

/// Apply attribute `name` = `value`, given what was applied before (if anything).
pub(crate) fn apply_attribute(
    doc: &mut Document,
    events: &dyn EventManager,
    node: NodeId,
    name: &str,
    previous: Option<&AttrValue>,
    value: &AttrValue,
) -> Result<(), DomError> {
    if let AttrValue::Handler(handler) = value {
        return match event_name(name) {
            Some(event) => {
                events.attach(node, &event, handler);
                Ok(())
            }
            None => {
                debug!(attribute = name, "Ignoring handler on non-event attribute");
                Ok(())
            }
        };
    }
    if let Some(AttrValue::Handler(_)) = previous {
        if let Some(event) = event_name(name) {
            events.detach(node, &event);
        }
    }

    match name {
        "key" | "ref" => Ok(()),
        "class" | "className" => {
            let class = class_string(value);
            if class.is_empty() {
                doc.remove_attribute(node, "class")
            } else {
                doc.set_attribute(node, "class", &class)
            }
        }
        "style" => apply_style(doc, node, previous, value),
        _ if is_boolean_property(name) => {
            let on = value.is_truthy();
            doc.set_property(node, name, PropValue::Bool(on))?;
            if on {
                doc.set_attribute(node, name, "")
            } else {
                doc.remove_attribute(node, name)
            }
        }
        _ if is_value_property(doc, node, name) => {
            let text = value.to_attr_string();
            doc.set_property(node, name, PropValue::Str(text.clone()))?;
            doc.set_attribute(node, name, &text)
        }
        _ if name.starts_with("data-") || name.starts_with("aria-") => {
            doc.set_attribute(node, name, &value.to_attr_string())
        }
        _ => match value {
            AttrValue::Null | AttrValue::Bool(false) => {
                doc.remove_property(node, name)?;
                doc.remove_attribute(node, name)
            }
            AttrValue::Ref(_) => Ok(()),
            AttrValue::Bool(true) if doc.has_property(node, name) => {
                doc.set_property(node, name, PropValue::Bool(true))
            }
            AttrValue::Number(n) if doc.has_property(node, name) => {
                doc.set_property(node, name, PropValue::Number(*n))
            }
            other if doc.has_property(node, name) => {
                doc.set_property(node, name, PropValue::Str(other.to_attr_string()))
            }
            AttrValue::Bool(true) => doc.set_attribute(node, name, ""),
            other => doc.set_attribute(node, name, &other.to_attr_string()),
        },
    }
}

/// Undo attribute `name`, which was last applied as `previous`.
pub(crate) fn remove_attribute(
    doc: &mut Document,
    events: &dyn EventManager,
    node: NodeId,
    name: &str,
    previous: &AttrValue,
) -> Result<(), DomError> {
    if previous.is_handler() {
        if let Some(event) = event_name(name) {
            events.detach(node, &event);
        }
        return Ok(());
    }

    match name {
        "key" | "ref" => Ok(()),
        "class" | "className" => doc.remove_attribute(node, "class"),
        "style" => doc.remove_attribute(node, "style"),
        _ if is_boolean_property(name) => {
            doc.set_property(node, name, PropValue::Bool(false))?;
            doc.remove_attribute(node, name)
        }
        _ if is_value_property(doc, node, name) => {
            doc.set_property(node, name, PropValue::Str(String::new()))?;
            doc.remove_attribute(node, name)
        }
        _ => {
            doc.remove_property(node, name)?;
            doc.remove_attribute(node, name)
        }
    }
}

fn apply_style(
    doc: &mut Document,
    node: NodeId,
    previous: Option<&AttrValue>,
    value: &AttrValue,
) -> Result<(), DomError> {
    if let AttrValue::Str(css) = value {
        return doc.set_attribute(node, "style", css);
    }

    let next = style_declarations(value);
    if let Some(previous) = previous {
        for prop in style_declarations(previous).keys() {
            if !next.contains_key(prop) {
                doc.remove_style(node, prop)?;
            }
        }
    }

    for (prop, declared) in &next {
        match declared {
            Some(v) if doc.style(node, prop) != Some(v.as_str()) => doc.set_style(node, prop, v)?,
            Some(_) => {}
            None => doc.remove_style(node, prop)?,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ListenerTable;
    use crate::vnode::{attrs, EventHandler};
    use indexmap::IndexMap;

    fn element(doc: &mut Document, tag: &str) -> NodeId {
        doc.create_element(tag).unwrap()
    }

    fn apply(doc: &mut Document, node: NodeId, name: &str, value: AttrValue) {
        apply_attribute(doc, &ListenerTable::new(), node, name, None, &value).unwrap();
    }

    #[test]
    fn test_class_accepts_string_list_and_map() {
        let mut doc = Document::new();
        let div = element(&mut doc, "div");

        apply(&mut doc, div, "class", "a b".into());
        assert_eq!(doc.attribute(div, "class"), Some("a b"));

        apply(&mut doc, div, "className", vec!["x", "y"].into());
        assert_eq!(doc.attribute(div, "class"), Some("x y"));

        let mut map = IndexMap::new();
        map.insert("on".to_string(), AttrValue::Bool(true));
        map.insert("off".to_string(), AttrValue::Number(0.0));
        map.insert("also".to_string(), AttrValue::Str("yes".into()));
        apply(&mut doc, div, "class", AttrValue::Map(map));
        assert_eq!(doc.attribute(div, "class"), Some("on also"));
    }

    #[test]
    fn test_style_map_with_null_clears_property() {
        let mut doc = Document::new();
        let div = element(&mut doc, "div");
        doc.set_style(div, "color", "red").unwrap();

        let style = attrs([("margin", AttrValue::from("0")), ("color", AttrValue::Null)]);
        apply(&mut doc, div, "style", AttrValue::Map(style));

        assert_eq!(doc.style(div, "color"), None);
        assert_eq!(doc.style(div, "margin"), Some("0"));
    }

    #[test]
    fn test_style_string() {
        let mut doc = Document::new();
        let div = element(&mut doc, "div");
        apply(&mut doc, div, "style", "color: blue; width: 10px".into());

        assert_eq!(doc.style(div, "color"), Some("blue"));
        assert_eq!(doc.style(div, "width"), Some("10px"));
    }

    #[test]
    fn test_boolean_properties_mirror_attribute_presence() {
        let mut doc = Document::new();
        let input = element(&mut doc, "input");

        apply(&mut doc, input, "checked", true.into());
        assert_eq!(doc.property(input, "checked"), Some(&PropValue::Bool(true)));
        assert_eq!(doc.attribute(input, "checked"), Some(""));

        apply(&mut doc, input, "checked", false.into());
        assert_eq!(doc.property(input, "checked"), Some(&PropValue::Bool(false)));
        assert_eq!(doc.attribute(input, "checked"), None);
    }

    #[test]
    fn test_value_sets_property_and_attribute() {
        let mut doc = Document::new();
        let input = element(&mut doc, "input");
        apply(&mut doc, input, "value", "hello".into());

        assert_eq!(
            doc.property(input, "value"),
            Some(&PropValue::Str("hello".into()))
        );
        assert_eq!(doc.attribute(input, "value"), Some("hello"));
    }

    #[test]
    fn test_data_and_aria_always_attributes() {
        let mut doc = Document::new();
        let div = element(&mut doc, "div");
        apply(&mut doc, div, "data-id", 42.into());
        apply(&mut doc, div, "aria-label", "close".into());

        assert_eq!(doc.attribute(div, "data-id"), Some("42"));
        assert_eq!(doc.attribute(div, "aria-label"), Some("close"));
        assert!(doc.property(div, "data-id").is_none());
    }

    #[test]
    fn test_known_property_preferred_over_attribute() {
        let mut doc = Document::new();
        let link = element(&mut doc, "a");
        apply(&mut doc, link, "href", "/next".into());
        apply(&mut doc, link, "rel-custom", "x".into());

        assert_eq!(
            doc.property(link, "href"),
            Some(&PropValue::Str("/next".into()))
        );
        assert_eq!(doc.attribute(link, "href"), Some("/next"));
        assert!(doc.property(link, "rel-custom").is_none());
        assert_eq!(doc.attribute(link, "rel-custom"), Some("x"));
    }

    #[test]
    fn test_handlers_go_to_event_manager() {
        let mut doc = Document::new();
        let button = element(&mut doc, "button");
        let events = ListenerTable::new();
        let handler = AttrValue::Handler(EventHandler::new(|_| {}));

        apply_attribute(&mut doc, &events, button, "onClick", None, &handler).unwrap();
        assert!(events.has_handler(button, "click"));
        assert_eq!(doc.attribute(button, "onClick"), None);

        remove_attribute(&mut doc, &events, button, "onClick", &handler).unwrap();
        assert!(!events.has_handler(button, "click"));
    }

    #[test]
    fn test_handler_replaced_by_string_detaches() {
        let mut doc = Document::new();
        let button = element(&mut doc, "button");
        let events = ListenerTable::new();
        let handler = AttrValue::Handler(EventHandler::new(|_| {}));

        apply_attribute(&mut doc, &events, button, "onclick", None, &handler).unwrap();
        apply_attribute(
            &mut doc,
            &events,
            button,
            "onclick",
            Some(&handler),
            &"alert(1)".into(),
        )
        .unwrap();

        assert!(!events.has_handler(button, "click"));
        assert_eq!(doc.attribute(button, "onclick"), Some("alert(1)"));
    }
}
