//! Write queue behavior: buffering while queuing, draining on transition,
//! broadcast across instances and failure handling.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::*;
use dualwrite::args;
use dualwrite::config::SchemaConfig;
use dualwrite::error::QueueError;
use dualwrite::messaging::{Broker, InMemoryBroker, QueuedOperation, TransitionMessage};
use dualwrite::proxy::{DispatchProxy, MirrorOutcome};
use dualwrite::queue::{QueueMode, QueuePolicy, TransitionOutcome, WriteQueueManager};
use dualwrite::schema::SchemaBuilder;
use serde_json::json;

const QUEUE_KEY: &str = "dualwrite-fruit-test";

fn manager(broker: Arc<dyn Broker>, logger: &Arc<CapturingLogger>) -> Arc<WriteQueueManager> {
    Arc::new(WriteQueueManager::new(broker, logger.clone()))
}

fn queued_proxy(
    manager: &Arc<WriteQueueManager>,
    secondary: dualwrite::backend::FnBackend,
    logger: &Arc<CapturingLogger>,
) -> DispatchProxy {
    SchemaBuilder::new("fruit")
        .backend("a", store_backend("a", &Store::new()))
        .backend("b", secondary)
        .logger(logger.clone())
        .write_queue(Arc::clone(manager))
        .environment("test")
        .build(&SchemaConfig::new("a").with_secondary("b"))
        .unwrap()
}

async fn transition(manager: &WriteQueueManager, queue: bool) -> Result<TransitionOutcome, QueueError> {
    manager
        .handle_transition(&TransitionMessage::new("fruit", queue))
        .await
}

#[tokio::test]
async fn test_queue_and_drain_through_listener() {
    let broker = InMemoryBroker::new();
    let logger = CapturingLogger::new();
    let manager = manager(Arc::new(broker.clone()), &logger);
    let _listener = manager.listen().await.unwrap();

    let store_b = Store::new();
    let proxy = queued_proxy(&manager, store_backend("b", &store_b), &logger);
    assert_eq!(proxy.queue_mode(), Some(QueueMode::Active));

    proxy.set_queue_state(true).await.unwrap();
    assert!(eventually(|| proxy.queue_mode() == Some(QueueMode::Queuing)).await);
    assert!(manager.is_queuing("fruit"));

    for fruit in ["apple", "banana", "cherry"] {
        let dispatched = proxy
            .call_tracked("update", args![fruit, fruit])
            .await
            .unwrap();
        assert_eq!(dispatched.value, json!("a updated"));
        assert_eq!(dispatched.mirror_outcome().await, Some(MirrorOutcome::Queued));
    }

    assert_eq!(broker.queue_length(QUEUE_KEY).await, 3);
    assert_eq!(manager.pending("fruit").await.unwrap(), 3);
    assert_eq!(store_b.len(), 0);

    proxy.set_queue_state(false).await.unwrap();
    assert!(eventually(|| proxy.queue_mode() == Some(QueueMode::Active)).await);

    assert_eq!(store_b.get("banana").as_deref(), Some("b: banana"));
    assert_eq!(store_b.len(), 3);
    assert_eq!(broker.queue_length(QUEUE_KEY).await, 0);

    let logs = logger.logs();
    assert!(logs.iter().any(|l| l.contains("Subscribed to channel: dualwrite-metadata")));
    assert!(logs.iter().any(|l| l.contains("Re-processed 3 messages for fruit")));
}

#[tokio::test]
async fn test_drain_counts_every_record_even_when_replays_fail() {
    let logger = CapturingLogger::new();
    let manager = manager(Arc::new(InMemoryBroker::new()), &logger);
    let (secondary, calls) = recording_backend(&["update"]);
    let proxy = queued_proxy(&manager, secondary, &logger);

    assert_eq!(transition(&manager, true).await.unwrap(), TransitionOutcome::EnteredQueuing);

    let first_args = [json!("ok"), json!("fail"), json!("ok"), json!("fail"), json!("ok")];
    for first in &first_args {
        let dispatched = proxy
            .call_tracked("update", vec![first.clone(), json!("v")])
            .await
            .unwrap();
        assert_eq!(dispatched.mirror_outcome().await, Some(MirrorOutcome::Queued));
    }
    assert!(calls.is_empty());

    let outcome = transition(&manager, false).await.unwrap();
    assert_eq!(outcome, TransitionOutcome::Drained { count: 5 });
    assert_eq!(calls.len(), 5);
    assert_eq!(proxy.queue_mode(), Some(QueueMode::Active));

    let failures = logger.errors_containing("Error during reprocessing: b#update");
    assert_eq!(failures.len(), 2);
    assert!(failures[0].1.contains("update rejected"));
}

#[tokio::test]
async fn test_drain_replays_in_fifo_order() {
    let broker = InMemoryBroker::new();
    let logger = CapturingLogger::new();
    let manager = manager(Arc::new(broker.clone()), &logger);
    let (secondary, calls) = recording_backend(&["update"]);
    let proxy = queued_proxy(&manager, secondary, &logger);

    transition(&manager, true).await.unwrap();
    for i in 0..10 {
        proxy
            .call_tracked("update", args![i])
            .await
            .unwrap()
            .mirror_outcome()
            .await;
    }

    let buffered: Vec<_> = broker
        .peek_all(QUEUE_KEY)
        .await
        .iter()
        .map(|payload| QueuedOperation::from_payload(payload).unwrap().args[0].clone())
        .collect();
    assert_eq!(buffered, (0..10).map(|i| json!(i)).collect::<Vec<_>>());

    transition(&manager, false).await.unwrap();

    let replayed: Vec<_> = calls.calls().into_iter().map(|(_, args)| args[0].clone()).collect();
    let expected: Vec<_> = (0..10).map(|i| json!(i)).collect();
    assert_eq!(replayed, expected);
}

#[tokio::test]
async fn test_concurrent_drain_replays_everything() {
    let logger = CapturingLogger::new();
    let manager = Arc::new(
        WriteQueueManager::new(Arc::new(InMemoryBroker::new()), logger.clone()).with_drain_concurrency(4),
    );
    let (secondary, calls) = recording_backend(&["update"]);
    let proxy = queued_proxy(&manager, secondary, &logger);

    transition(&manager, true).await.unwrap();
    for i in 0..25 {
        proxy
            .call_tracked("update", args![i])
            .await
            .unwrap()
            .mirror_outcome()
            .await;
    }

    assert_eq!(
        transition(&manager, false).await.unwrap(),
        TransitionOutcome::Drained { count: 25 }
    );
    assert_eq!(calls.len(), 25);
}

#[tokio::test]
async fn test_repeated_transitions_are_idempotent() {
    let logger = CapturingLogger::new();
    let manager = manager(Arc::new(InMemoryBroker::new()), &logger);
    let (secondary, calls) = recording_backend(&["update"]);
    let proxy = queued_proxy(&manager, secondary, &logger);

    assert_eq!(transition(&manager, false).await.unwrap(), TransitionOutcome::Unchanged);
    assert_eq!(transition(&manager, true).await.unwrap(), TransitionOutcome::EnteredQueuing);
    assert_eq!(transition(&manager, true).await.unwrap(), TransitionOutcome::Unchanged);

    proxy
        .call_tracked("update", args!["k"])
        .await
        .unwrap()
        .mirror_outcome()
        .await;

    assert_eq!(
        transition(&manager, false).await.unwrap(),
        TransitionOutcome::Drained { count: 1 }
    );
    assert_eq!(transition(&manager, false).await.unwrap(), TransitionOutcome::Unchanged);
    assert_eq!(calls.len(), 1);
    assert_eq!(
        logger
            .logs()
            .iter()
            .filter(|l| l.contains("Re-processed"))
            .count(),
        1
    );
}

#[tokio::test]
async fn test_unknown_schema_transition_is_logged_and_dropped() {
    let logger = CapturingLogger::new();
    let manager = manager(Arc::new(InMemoryBroker::new()), &logger);
    let _listener = manager.listen().await.unwrap();
    let (secondary, _) = recording_backend(&["update"]);
    let proxy = queued_proxy(&manager, secondary, &logger);

    let err = manager
        .handle_transition(&TransitionMessage::new("ghost", true))
        .await
        .unwrap_err();
    assert!(matches!(err, QueueError::UnknownSchema { ref schema } if schema == "ghost"));
    assert_eq!(logger.errors_containing("No existing model of type \"ghost\"").len(), 1);

    manager.set_queue_state("ghost", true).await.unwrap();
    proxy.set_queue_state(true).await.unwrap();

    assert!(eventually(|| proxy.queue_mode() == Some(QueueMode::Queuing)).await);
    assert_eq!(logger.errors_containing("No existing model of type \"ghost\"").len(), 2);
}

#[tokio::test]
async fn test_malformed_transition_does_not_stop_listener() {
    let broker = InMemoryBroker::new();
    let logger = CapturingLogger::new();
    let manager = manager(Arc::new(broker.clone()), &logger);
    let _listener = manager.listen().await.unwrap();
    let (secondary, _) = recording_backend(&["update"]);
    let proxy = queued_proxy(&manager, secondary, &logger);

    broker.publish("dualwrite-metadata", "not json").await.unwrap();
    proxy.set_queue_state(true).await.unwrap();

    assert!(eventually(|| proxy.queue_mode() == Some(QueueMode::Queuing)).await);
    assert_eq!(logger.errors_containing("malformed transition").len(), 1);
}

#[tokio::test]
async fn test_pop_failure_aborts_drain_and_keeps_queuing() {
    let broker = FlakyBroker::new();
    let logger = CapturingLogger::new();
    let manager = manager(Arc::new(broker.clone()), &logger);
    let (secondary, calls) = recording_backend(&["update"]);
    let proxy = queued_proxy(&manager, secondary, &logger);

    transition(&manager, true).await.unwrap();
    for i in 0..3 {
        proxy
            .call_tracked("update", args![i])
            .await
            .unwrap()
            .mirror_outcome()
            .await;
    }

    broker.fail_pops_after(Some(1));
    let err = transition(&manager, false).await.unwrap_err();
    assert!(matches!(err, QueueError::Drain { .. }));
    assert_eq!(proxy.queue_mode(), Some(QueueMode::Queuing));
    assert_eq!(calls.len(), 1);
    assert_eq!(logger.errors_containing("Problem with reprocessing").len(), 1);
    assert_eq!(manager.pending("fruit").await.unwrap(), 2);

    broker.fail_pops_after(None);
    assert_eq!(
        transition(&manager, false).await.unwrap(),
        TransitionOutcome::Drained { count: 2 }
    );
    assert_eq!(calls.len(), 3);
    assert_eq!(proxy.queue_mode(), Some(QueueMode::Active));
}

#[tokio::test]
async fn test_enqueue_failure_is_reported_not_raised() {
    let broker = FlakyBroker::new();
    let logger = CapturingLogger::new();
    let manager = manager(Arc::new(broker.clone()), &logger);
    let (secondary, calls) = recording_backend(&["update"]);
    let proxy = queued_proxy(&manager, secondary, &logger);

    transition(&manager, true).await.unwrap();
    broker.fail_pushes(true);

    let dispatched = proxy.call_tracked("update", args!["k", "v"]).await.unwrap();
    assert_eq!(dispatched.value, json!("a updated"));
    assert!(matches!(
        dispatched.mirror_outcome().await,
        Some(MirrorOutcome::EnqueueFailed(_))
    ));

    let failures = logger.errors_containing("Failed to queue write for secondary model: b#update");
    assert_eq!(failures.len(), 1);
    assert!(failures[0].1.contains("broker unavailable"));
    assert!(calls.is_empty());
}

#[tokio::test]
async fn test_replay_targets_backend_named_in_record() {
    let broker = InMemoryBroker::new();
    let logger = CapturingLogger::new();
    let manager = manager(Arc::new(broker.clone()), &logger);
    let (primary, primary_calls) = recording_backend(&["update"]);
    let (secondary, secondary_calls) = recording_backend(&["update"]);
    let (archive, archive_calls) = recording_backend(&["update"]);

    let _proxy = SchemaBuilder::new("fruit")
        .backend("a", primary)
        .backend("b", secondary)
        .backend("archive", archive)
        .logger(logger.clone())
        .write_queue(Arc::clone(&manager))
        .environment("test")
        .build(&SchemaConfig::new("a").with_secondary("b"))
        .unwrap();

    transition(&manager, true).await.unwrap();
    for model in ["b", "archive", "a", "missing"] {
        let record = QueuedOperation::new("fruit", model, "update", args![model]);
        broker
            .push_right(QUEUE_KEY, &record.to_payload().unwrap())
            .await
            .unwrap();
    }

    assert_eq!(
        transition(&manager, false).await.unwrap(),
        TransitionOutcome::Drained { count: 4 }
    );
    assert_eq!(secondary_calls.len(), 1);
    assert_eq!(archive_calls.len(), 1);
    assert!(primary_calls.is_empty());
    assert_eq!(logger.errors_containing("no secondary model named").len(), 2);
}

#[tokio::test]
async fn test_queue_policy_limits_buffered_operations() {
    let logger = CapturingLogger::new();
    let manager = manager(Arc::new(InMemoryBroker::new()), &logger);
    let (primary, _) = recording_backend(&["update", "delete"]);
    let (secondary, calls) = recording_backend(&["update", "delete"]);

    let proxy = SchemaBuilder::new("fruit")
        .backend("a", primary)
        .backend("b", secondary)
        .queue_policy("b", QueuePolicy::only(["update"]))
        .write_queue(Arc::clone(&manager))
        .environment("test")
        .build(&SchemaConfig::new("a").with_secondary("b"))
        .unwrap();

    transition(&manager, true).await.unwrap();

    let update = proxy.call_tracked("update", args!["k"]).await.unwrap();
    assert_eq!(update.mirror_outcome().await, Some(MirrorOutcome::Queued));

    let delete = proxy.call_tracked("delete", args!["k"]).await.unwrap();
    assert_eq!(delete.mirror_outcome().await, Some(MirrorOutcome::Mirrored));

    assert_eq!(calls.calls()[0].0, "delete");
    assert_eq!(manager.pending("fruit").await.unwrap(), 1);
}

#[tokio::test]
async fn test_transitions_reach_every_instance() {
    let shared = InMemoryBroker::new();

    let logger_one = CapturingLogger::new();
    let logger_two = CapturingLogger::new();
    let one = manager(Arc::new(shared.clone()), &logger_one);
    let two = manager(Arc::new(shared.clone()), &logger_two);
    assert_ne!(one.instance_id(), two.instance_id());

    let _listener_one = one.listen().await.unwrap();
    let _listener_two = two.listen().await.unwrap();

    let (secondary_one, calls_one) = recording_backend(&["update"]);
    let (secondary_two, calls_two) = recording_backend(&["update"]);
    let proxy_one = queued_proxy(&one, secondary_one, &logger_one);
    let proxy_two = queued_proxy(&two, secondary_two, &logger_two);

    proxy_one.set_queue_state(true).await.unwrap();
    assert!(eventually(|| proxy_one.queue_mode() == Some(QueueMode::Queuing)).await);
    assert!(eventually(|| proxy_two.queue_mode() == Some(QueueMode::Queuing)).await);

    for i in 0..6 {
        let proxy = if i % 2 == 0 { &proxy_one } else { &proxy_two };
        proxy
            .call_tracked("update", args![i])
            .await
            .unwrap()
            .mirror_outcome()
            .await;
    }
    assert_eq!(shared.queue_length(QUEUE_KEY).await, 6);

    proxy_two.set_queue_state(false).await.unwrap();
    assert!(eventually(|| proxy_one.queue_mode() == Some(QueueMode::Active)).await);
    assert!(eventually(|| proxy_two.queue_mode() == Some(QueueMode::Active)).await);

    assert_eq!(calls_one.len() + calls_two.len(), 6);
    assert_eq!(shared.queue_length(QUEUE_KEY).await, 0);
}

#[tokio::test]
async fn test_queue_key_override_and_unknown_pending() {
    let broker = InMemoryBroker::new();
    let logger = CapturingLogger::new();
    let manager = manager(Arc::new(broker.clone()), &logger);
    let (secondary, _) = recording_backend(&["update"]);

    let proxy = SchemaBuilder::new("fruit")
        .backend("a", store_backend("a", &Store::new()))
        .backend("b", secondary)
        .write_queue(Arc::clone(&manager))
        .build(
            &SchemaConfig::new("a")
                .with_secondary("b")
                .with_queue_key("legacy-fruit-queue"),
        )
        .unwrap();
    assert_eq!(proxy.write_queue().unwrap().queue_key(), "legacy-fruit-queue");

    transition(&manager, true).await.unwrap();
    proxy
        .call_tracked("update", args!["k", "v"])
        .await
        .unwrap()
        .mirror_outcome()
        .await;
    assert_eq!(broker.queue_length("legacy-fruit-queue").await, 1);

    let err = manager.pending("ghost").await.unwrap_err();
    assert!(matches!(err, QueueError::UnknownSchema { .. }));
    assert_eq!(manager.schema_names(), vec!["fruit".to_string()]);
}

#[tokio::test]
async fn test_write_buffered_while_drain_settles_is_replayed() {
    let broker = FlakyBroker::new();
    let logger = CapturingLogger::new();
    let manager = manager(Arc::new(broker.clone()), &logger);
    let (secondary, calls) = recording_backend(&["update"]);
    let proxy = queued_proxy(&manager, secondary, &logger);

    transition(&manager, true).await.unwrap();
    broker.delay_pushes(Some(Duration::from_millis(50)));

    // The push is still sleeping when the drain finds the list empty
    let dispatched = proxy.call_tracked("update", args!["late"]).await.unwrap();
    let outcome = transition(&manager, false).await.unwrap();

    assert_eq!(outcome, TransitionOutcome::Drained { count: 1 });
    assert_eq!(dispatched.mirror_outcome().await, Some(MirrorOutcome::Queued));
    assert_eq!(proxy.queue_mode(), Some(QueueMode::Active));
    assert_eq!(manager.pending("fruit").await.unwrap(), 0);
    assert_eq!(calls.len(), 1);
}

#[tokio::test]
async fn test_write_during_drain_is_replayed_by_that_drain() {
    let logger = CapturingLogger::new();
    let manager = manager(Arc::new(InMemoryBroker::new()), &logger);
    let store_b = Store::new();
    let proxy = queued_proxy(
        &manager,
        slow_store_backend("b", &store_b, Duration::from_millis(100)),
        &logger,
    );

    transition(&manager, true).await.unwrap();
    proxy
        .call_tracked("update", args!["first", "v1"])
        .await
        .unwrap()
        .mirror_outcome()
        .await;

    let drain = tokio::spawn({
        let manager = Arc::clone(&manager);
        async move { transition(&manager, false).await }
    });
    assert!(eventually(|| matches!(proxy.queue_mode(), Some(QueueMode::Draining { .. }))).await);

    let dispatched = proxy.call_tracked("update", args!["second", "v2"]).await.unwrap();
    assert_eq!(dispatched.mirror_outcome().await, Some(MirrorOutcome::Queued));

    assert_eq!(drain.await.unwrap().unwrap(), TransitionOutcome::Drained { count: 2 });
    assert_eq!(store_b.get("first").as_deref(), Some("b: v1"));
    assert_eq!(store_b.get("second").as_deref(), Some("b: v2"));
    assert_eq!(proxy.queue_mode(), Some(QueueMode::Active));
}

#[tokio::test]
async fn test_second_stop_during_drain_starts_no_new_drain() {
    let logger = CapturingLogger::new();
    let manager = manager(Arc::new(InMemoryBroker::new()), &logger);
    let _listener = manager.listen().await.unwrap();
    let store_b = Store::new();
    let proxy = queued_proxy(
        &manager,
        slow_store_backend("b", &store_b, Duration::from_millis(100)),
        &logger,
    );

    proxy.set_queue_state(true).await.unwrap();
    assert!(eventually(|| proxy.queue_mode() == Some(QueueMode::Queuing)).await);
    for key in ["one", "two"] {
        proxy
            .call_tracked("update", args![key, key])
            .await
            .unwrap()
            .mirror_outcome()
            .await;
    }

    proxy.set_queue_state(false).await.unwrap();
    assert!(eventually(|| matches!(proxy.queue_mode(), Some(QueueMode::Draining { .. }))).await);
    proxy.set_queue_state(false).await.unwrap();

    assert!(eventually(|| proxy.queue_mode() == Some(QueueMode::Active)).await);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let drains: Vec<_> = logger
        .logs()
        .into_iter()
        .filter(|l| l.contains("Re-processed"))
        .collect();
    assert_eq!(drains.len(), 1);
    assert!(drains[0].contains("Re-processed 2 messages for fruit"));
    assert_eq!(store_b.len(), 2);
}

#[tokio::test]
async fn test_queue_request_during_drain_resumes_queuing() {
    let logger = CapturingLogger::new();
    let manager = manager(Arc::new(InMemoryBroker::new()), &logger);
    let _listener = manager.listen().await.unwrap();
    let store_b = Store::new();
    let proxy = queued_proxy(
        &manager,
        slow_store_backend("b", &store_b, Duration::from_millis(100)),
        &logger,
    );

    proxy.set_queue_state(true).await.unwrap();
    assert!(eventually(|| proxy.queue_mode() == Some(QueueMode::Queuing)).await);
    proxy
        .call_tracked("update", args!["first", "v1"])
        .await
        .unwrap()
        .mirror_outcome()
        .await;

    proxy.set_queue_state(false).await.unwrap();
    assert!(eventually(|| matches!(proxy.queue_mode(), Some(QueueMode::Draining { .. }))).await);
    proxy.set_queue_state(true).await.unwrap();

    assert!(eventually(|| store_b.get("first").is_some()).await);
    assert!(eventually(|| proxy.queue_mode() == Some(QueueMode::Queuing)).await);

    let dispatched = proxy.call_tracked("update", args!["later", "v2"]).await.unwrap();
    assert_eq!(dispatched.mirror_outcome().await, Some(MirrorOutcome::Queued));
    assert_eq!(manager.pending("fruit").await.unwrap(), 1);
    assert_eq!(store_b.get("later"), None);
}
