/// Subscription options, path watchers and computed values
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trellis_store::{Store, SubscribeOptions};

fn counter() -> (Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let count = Arc::new(AtomicUsize::new(0));
    (count.clone(), count)
}

#[tokio::test]
async fn test_once_listener_fires_a_single_time() {
    let store = Store::new(json!({"n": 0}));
    let (calls, sink) = counter();
    let _once = store.subscribe(
        move |_, _, _| {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        SubscribeOptions::once(),
    );

    store.set("n", 1).await.unwrap();
    store.set("n", 2).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(store.subscription_count(), 0);
}

#[tokio::test]
async fn test_once_waits_for_condition() {
    let store = Store::new(json!({"n": 0}));
    let (calls, sink) = counter();
    let options = SubscribeOptions::once()
        .with_condition(|new: &Value, _: &Value| new["n"].as_i64().unwrap_or(0) >= 2);
    let _once = store.subscribe(
        move |_, _, _| {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        options,
    );

    store.set("n", 1).await.unwrap();
    assert_eq!(store.subscription_count(), 1);
    store.set("n", 2).await.unwrap();
    store.set("n", 3).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_path_watcher_sees_values_at_path() {
    let store = Store::new(json!({"user": {"name": "ada", "age": 36}}));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _watch = store.watch(
        "user.name",
        move |new, prev, _| {
            sink.lock().unwrap().push((new.clone(), prev.clone()));
            Ok(())
        },
        SubscribeOptions::default(),
    );

    store.set("user.age", 37).await.unwrap();
    store.set("user.name", "grace").await.unwrap();
    store.merge(json!({"user": {"name": "grace"}})).await.unwrap();
    store.delete("user").await.unwrap();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            (json!("grace"), json!("ada")),
            (Value::Null, json!("grace")),
        ]
    );
}

#[tokio::test]
async fn test_disposing_during_notification_skips_listener() {
    let store = Store::new(json!({"n": 0}));
    let (calls, sink) = counter();

    let victim = store.subscribe(
        move |_, _, _| {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        SubscribeOptions::default(),
    );
    let victim = Arc::new(Mutex::new(Some(victim)));
    let _killer = store.subscribe(
        move |_, _, _| {
            if let Some(disposer) = victim.lock().unwrap().take() {
                disposer.dispose();
            }
            Ok(())
        },
        SubscribeOptions::default().with_priority(1),
    );

    store.set("n", 1).await.unwrap();

    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(store.subscription_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_debounce_delivers_last_change_of_a_burst() {
    let store = Store::new(json!({"n": 0}));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let _debounced = store.subscribe(
        move |new, prev, _| {
            sink.lock().unwrap().push((new["n"].clone(), prev["n"].clone()));
            Ok(())
        },
        SubscribeOptions::default().with_debounce(Duration::from_millis(100)),
    );

    for n in 1..=3 {
        store.set("n", n).await.unwrap();
    }
    assert!(seen.lock().unwrap().is_empty());

    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(*seen.lock().unwrap(), vec![(json!(3), json!(2))]);

    store.set("n", 4).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    assert_eq!(seen.lock().unwrap().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_debounced_listener_disposed_before_timer_stays_silent() {
    let store = Store::new(json!({"n": 0}));
    let (calls, sink) = counter();
    let disposer = store.subscribe(
        move |_, _, _| {
            sink.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        SubscribeOptions::default().with_debounce(Duration::from_millis(50)),
    );

    store.set("n", 1).await.unwrap();
    assert!(disposer.dispose());
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_computed_recomputes_only_for_its_deps() {
    let store = Store::new(json!({"items": [1, 2], "title": "list"}));
    let (runs, sink) = counter();
    let _total = store.computed(
        "total",
        move |state| {
            sink.fetch_add(1, Ordering::SeqCst);
            let sum: i64 = state["items"]
                .as_array()
                .map(|items| items.iter().filter_map(Value::as_i64).sum())
                .unwrap_or(0);
            json!(sum)
        },
        vec!["items".into()],
    );
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    store.set("title", "renamed").await.unwrap();
    assert_eq!(store.computed_value("total"), Some(json!(3)));
    assert_eq!(runs.load(Ordering::SeqCst), 1);

    store.set("items", json!([1, 2, 3])).await.unwrap();
    assert_eq!(store.computed_value("total"), Some(json!(6)));
    assert_eq!(store.computed_value("total"), Some(json!(6)));
    assert_eq!(runs.load(Ordering::SeqCst), 2);
    assert_eq!(store.computed_names(), vec!["total"]);
}

#[tokio::test]
async fn test_listeners_read_fresh_computed_values() {
    let store = Store::new(json!({"n": 1}));
    let _double = store.computed("double", |state| json!(state["n"].as_i64().unwrap_or(0) * 2), vec![]);

    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let reader = store.clone();
    let _sub = store.subscribe(
        move |_, _, _| {
            sink.lock().unwrap().push(reader.computed_value("double"));
            Ok(())
        },
        SubscribeOptions::default(),
    );

    store.set("n", 5).await.unwrap();

    assert_eq!(*seen.lock().unwrap(), vec![Some(json!(10))]);
}
