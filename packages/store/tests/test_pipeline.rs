/// Update pipeline: ordering, middleware, validation, batching
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use trellis_store::{
    Action, ActionType, ChangeInfo, MiddlewareError, MiddlewareOptions, SetOptions, StateUpdate,
    Store, StoreError, StoreResult, SubscribeOptions,
};

type Calls = Arc<Mutex<Vec<(Value, Value, ChangeInfo)>>>;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn record_calls(store: &Store) -> Calls {
    let calls: Calls = Arc::default();
    let sink = calls.clone();
    let _sub = store.subscribe(
        move |new, prev, info| {
            sink.lock().unwrap().push((new.clone(), prev.clone(), info.clone()));
            Ok(())
        },
        SubscribeOptions::default(),
    );
    calls
}

#[tokio::test]
async fn test_set_notifies_global_subscriber_once() {
    let store = Store::new(json!({"count": 0}));
    let calls = record_calls(&store);

    store.set("count", 1).await.unwrap();

    assert_eq!(store.get_state_at("count"), json!(1));
    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    let (new, prev, info) = &calls[0];
    assert_eq!(new, &json!({"count": 1}));
    assert_eq!(prev, &json!({"count": 0}));
    assert_eq!(info.action.kind, ActionType::Set);
    assert_eq!(info.action.path.as_deref(), Some("count"));
    assert_eq!(info.commits, 1);
    assert_eq!(info.replay, None);
}

#[tokio::test]
async fn test_batch_notifies_once_with_final_state() {
    let store = Store::new(json!({}));
    let calls = record_calls(&store);

    store
        .batch(|s| async move {
            s.set("a", 1).await?;
            s.set("b", 2).await?;
            Ok::<_, StoreError>(())
        })
        .await
        .unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, json!({"a": 1, "b": 2}));
    assert_eq!(calls[0].1, json!({}));
    assert_eq!(calls[0].2.commits, 2);
    assert_eq!(store.get_state(), json!({"a": 1, "b": 2}));
}

#[tokio::test]
async fn test_nested_batches_notify_at_outermost_end() {
    let store = Store::new(json!({"n": 0}));
    let calls = record_calls(&store);

    store
        .batch(|outer| async move {
            outer.set("n", 1).await?;
            outer
                .batch(|inner| async move {
                    inner.set("n", 2).await?;
                    Ok::<_, StoreError>(())
                })
                .await?;
            Ok::<_, StoreError>(())
        })
        .await
        .unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, json!({"n": 2}));
    assert_eq!(calls[0].1, json!({"n": 0}));
}

#[tokio::test]
async fn test_batch_returning_to_start_is_silent() {
    let store = Store::new(json!({"n": 0}));
    let calls = record_calls(&store);

    store
        .batch(|s| async move {
            s.set("n", 1).await?;
            s.set("n", 0).await?;
            Ok::<_, StoreError>(())
        })
        .await
        .unwrap();

    assert!(calls.lock().unwrap().is_empty());
    assert_eq!(store.stats().updates, 2);
}

#[tokio::test]
async fn test_cancelled_batch_still_closes() {
    init_tracing();
    let store = Store::new(json!({"n": 0}));
    let calls = record_calls(&store);

    let cancelled = tokio::time::timeout(
        Duration::from_millis(10),
        store.batch(|s| async move {
            s.set("n", 1).await?;
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok::<_, StoreError>(())
        }),
    )
    .await;
    assert!(cancelled.is_err());

    // the held-back notification is flushed from a spawned task
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
    {
        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, json!({"n": 1}));
        assert_eq!(calls[0].1, json!({"n": 0}));
    }

    store.set("n", 2).await.unwrap();
    store.set("n", 3).await.unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls[2].0, json!({"n": 3}));
}

#[tokio::test]
async fn test_validator_rejects_update() {
    init_tracing();
    let store = Store::new(json!({"count": 0}));
    let calls = record_calls(&store);
    let _numeric = store.add_validator("count", |value, _| {
        if value.is_number() {
            Ok(())
        } else {
            Err("count must be a number".to_string())
        }
    });

    let err = store.set("count", "bad").await.unwrap_err();

    assert!(err.is_validation());
    match err {
        StoreError::Validation(e) => {
            assert_eq!(e.path, "count");
            assert_eq!(e.message, "count must be a number");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(store.get_state_at("count"), json!(0));
    assert!(calls.lock().unwrap().is_empty());
    assert!(!store.can_undo());
    assert_eq!(store.stats().validation_failures, 1);
}

#[tokio::test]
async fn test_validator_skipped_for_unrelated_path() {
    let store = Store::new(json!({"count": 0, "name": ""}));
    let runs = Arc::new(AtomicUsize::new(0));
    let counter = runs.clone();
    let _validator = store.add_validator("count", move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    store.set("name", "x").await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 0);

    store.merge(json!({"count": 3})).await.unwrap();
    store.update(|s| s.clone()).await.unwrap();
    assert_eq!(runs.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_async_validator() {
    let store = Store::new(json!({"email": ""}));
    let _validator = store.add_async_validator("email", |value, _| async move {
        tokio::task::yield_now().await;
        if value.as_str().is_some_and(|s| s.contains('@')) {
            Ok(())
        } else {
            Err("invalid email".to_string())
        }
    });

    assert!(store.set("email", "nope").await.is_err());
    store.set("email", "a@b.c").await.unwrap();
    assert_eq!(store.get_state_at("email"), json!("a@b.c"));
}

#[tokio::test]
async fn test_middleware_runs_by_priority_and_transforms() {
    let store = Store::new(json!({"log": []}));
    let _low = store.use_middleware(
        |_, _, mut next| {
            next["log"].as_array_mut().unwrap().push(json!("low"));
            Ok(next)
        },
        MiddlewareOptions::priority(0),
    );
    let _high = store.use_middleware(
        |_, _, mut next| {
            next["log"].as_array_mut().unwrap().push(json!("high"));
            Ok(next)
        },
        MiddlewareOptions::priority(10),
    );

    store.set("touched", true).await.unwrap();

    assert_eq!(store.get_state(), json!({"log": ["high", "low"], "touched": true}));
}

#[tokio::test]
async fn test_middleware_error_is_contained() {
    init_tracing();
    let store = Store::new(json!({"n": 0}));
    let _failing = store.use_middleware(
        |_, _, _| Err(MiddlewareError::from("nope")),
        MiddlewareOptions::priority(5).named("failing"),
    );
    let _stamp = store.use_middleware(
        |_, _, mut next| {
            next["stamped"] = json!(true);
            Ok(next)
        },
        MiddlewareOptions::default(),
    );

    store.set("n", 1).await.unwrap();

    assert_eq!(store.get_state(), json!({"n": 1, "stamped": true}));
    assert_eq!(store.stats().middleware_errors, 1);
}

#[tokio::test]
async fn test_middleware_can_veto_by_returning_prev() {
    let store = Store::new(json!({"locked": true, "n": 0}));
    let _guard = store.use_middleware(
        |_, prev: &Value, next| {
            if prev["locked"] == json!(true) {
                Ok(prev.clone())
            } else {
                Ok(next)
            }
        },
        MiddlewareOptions::default(),
    );

    store.set("n", 5).await.unwrap();

    assert_eq!(store.get_state_at("n"), json!(0));
    assert_eq!(store.stats().updates, 0);
}

#[tokio::test]
async fn test_disposed_middleware_no_longer_runs() {
    let store = Store::new(json!({"n": 0}));
    let disposer = store.use_middleware(
        |_, _, _| Ok(json!({"n": -1})),
        MiddlewareOptions::default(),
    );
    assert_eq!(store.middleware_count(), 1);
    assert!(disposer.dispose());

    store.set("n", 1).await.unwrap();
    assert_eq!(store.get_state(), json!({"n": 1}));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_updates_commit_in_submission_order() {
    let store = Store::new(json!({"log": []}));
    // the first update suspends for a while; later ones must still wait
    let seen = Arc::new(AtomicUsize::new(0));
    let _slow = store.use_async_middleware(
        move |_action: Action, _prev, next| {
            let first = seen.fetch_add(1, Ordering::SeqCst) == 0;
            async move {
                if first {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                }
                Ok::<_, MiddlewareError>(next)
            }
        },
        MiddlewareOptions::default(),
    );

    let mut tasks = Vec::new();
    for i in 0..5 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            store
                .update(move |state| {
                    let mut next = state.clone();
                    next["log"].as_array_mut().unwrap().push(json!(i));
                    next
                })
                .await
        }));
        // make sure task i queues before task i + 1
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(store.get_state_at("log"), json!([0, 1, 2, 3, 4]));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_increments_are_not_lost() {
    let store = Store::new(json!({"n": 0}));

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .update(|state| json!({"n": state["n"].as_i64().unwrap_or(0) + 1}))
                    .await
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap().unwrap();
    }

    assert_eq!(store.get_state_at("n"), json!(50));
}

#[tokio::test]
async fn test_silent_update_commits_without_notifying() {
    let store = Store::new(json!({"n": 0}));
    let calls = record_calls(&store);

    store
        .set_state(StateUpdate::set("n", 1), SetOptions::silent())
        .await
        .unwrap();

    assert_eq!(store.get_state_at("n"), json!(1));
    assert!(calls.lock().unwrap().is_empty());
    assert!(store.can_undo());
}

#[tokio::test]
async fn test_metadata_reaches_listeners() {
    let store = Store::new(json!({"n": 0}));
    let calls = record_calls(&store);

    store
        .set_state(
            StateUpdate::set("n", 1),
            SetOptions::default().with_metadata(json!({"source": "keyboard"})),
        )
        .await
        .unwrap();

    let calls = calls.lock().unwrap();
    assert_eq!(calls[0].2.metadata, Some(json!({"source": "keyboard"})));
}

#[tokio::test]
async fn test_delete_and_reset() -> StoreResult<()> {
    let store = Store::new(json!({"user": {"name": "ada", "age": 36}}));

    store.delete("user.age").await?;
    assert_eq!(store.get_state(), json!({"user": {"name": "ada"}}));

    store.set("user.name", "grace").await?;
    store.reset().await?;
    assert_eq!(store.get_state(), json!({"user": {"name": "ada", "age": 36}}));
    Ok(())
}
