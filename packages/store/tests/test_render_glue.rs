/// A store subscription driving the renderer through a render loop
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use trellis_renderer::{RenderLoop, Renderer, VNode};
use trellis_store::{Store, StoreResult, SubscribeOptions};

fn view(state: &Value) -> VNode {
    let items = state["todos"]
        .as_array()
        .map(|todos| {
            todos
                .iter()
                .map(|todo| {
                    VNode::element("li")
                        .with_key(todo["id"].to_string())
                        .with_child(VNode::text(todo["title"].as_str().unwrap_or_default()))
                })
                .collect()
        })
        .unwrap_or_default();
    VNode::element("ul").with_children(items)
}

#[tokio::test]
async fn test_state_changes_patch_the_document() -> StoreResult<()> {
    let store = Store::new(json!({"todos": [{"id": 1, "title": "a"}]}));
    let render_loop = RenderLoop::new(Renderer::new());
    let container = render_loop.with_renderer(|r| r.create_container("main").unwrap());

    let first = view(&store.get_state());
    render_loop.request_patch(container, None, Some(first.clone()));
    let last = Arc::new(Mutex::new(first));

    let loop_handle = render_loop.clone();
    let _sub = store.subscribe(
        move |new, _, _| {
            let next = view(new);
            let prev = std::mem::replace(&mut *last.lock().unwrap(), next.clone());
            loop_handle.request_patch(container, Some(prev), Some(next));
            Ok(())
        },
        SubscribeOptions::default(),
    );

    store
        .update(|state| {
            let mut next = state.clone();
            next["todos"]
                .as_array_mut()
                .unwrap()
                .insert(0, json!({"id": 2, "title": "b"}));
            next
        })
        .await?;

    let html = render_loop.with_renderer(|r| r.document().inner_html(container));
    assert_eq!(html, "<ul><li>b</li><li>a</li></ul>");

    store.undo().await?;
    let html = render_loop.with_renderer(|r| r.document().inner_html(container));
    assert_eq!(html, "<ul><li>a</li></ul>");
    Ok(())
}
