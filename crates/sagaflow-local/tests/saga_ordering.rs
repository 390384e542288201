//! Concurrent dispatch stress test: many sagas handled in parallel, each
//! receiving its events strictly in publication order, with a cache purge
//! and reload at the end to prove the order survived persistence.

use async_trait::async_trait;
use sagaflow_core::{
    AssociationValue, DispatchSequencer, EventMessage, HandlerError, SagaCreationPolicy,
    SagaDirective, SagaHandler, SagaRepository, SagaType, SequencerConfig,
};
use sagaflow_local::InMemorySagaStore;
use std::sync::Arc;

const SAGA_COUNT: usize = 10;
const EVENTS_PER_SAGA: usize = 100;

/// Appends each event's `message` payload to the saga's log.
struct LoggingHandler;

#[async_trait]
impl SagaHandler for LoggingHandler {
    async fn on_event(
        &self,
        saga: &mut sagaflow_core::Saga,
        event: &EventMessage,
    ) -> Result<Vec<SagaDirective>, HandlerError> {
        if !saga.data.is_array() {
            saga.data = serde_json::json!([]);
        }
        saga.data
            .as_array_mut()
            .expect("log is an array")
            .push(event.payload["message"].clone());
        Ok(vec![])
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_per_saga_order_survives_concurrent_dispatch() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let store = Arc::new(InMemorySagaStore::new());
    let repository = Arc::new(SagaRepository::new(Arc::clone(&store)));
    let sequencer = DispatchSequencer::new(
        SequencerConfig::new().with_lanes(4),
        Arc::clone(&repository),
        Arc::new(LoggingHandler),
    );

    let saga_type = SagaType::new("stress");
    let ids: Vec<String> = (0..SAGA_COUNT).map(|n| format!("saga-{n}")).collect();

    // Interleave the sagas' events round-robin so every saga's stream is
    // spread across the whole publication sequence.
    for round in 0..EVENTS_PER_SAGA {
        for id in &ids {
            sequencer
                .publish(
                    saga_type.clone(),
                    EventMessage::new(
                        "stress.message",
                        serde_json::json!({ "message": format!("message{round}") }),
                    ),
                    vec![AssociationValue::new("myId", id)],
                    SagaCreationPolicy::IfNoneFound,
                )
                .unwrap();
        }
    }
    sequencer.drain().await;

    let metrics = sequencer.metrics().snapshot();
    assert_eq!(metrics.sagas_created, SAGA_COUNT as u64);
    assert_eq!(metrics.events_handled, (SAGA_COUNT * EVENTS_PER_SAGA) as u64);
    assert_eq!(metrics.handler_failures, 0);
    assert_eq!(metrics.commit_failures, 0);

    // Drop every cached instance so the checks below go back through the
    // backing store.
    repository.purge_cache();
    assert_eq!(repository.cached_count(), 0);
    assert_eq!(store.len(), SAGA_COUNT);

    let expected: Vec<serde_json::Value> = (0..EVENTS_PER_SAGA)
        .map(|n| serde_json::json!(format!("message{n}")))
        .collect();
    for id in &ids {
        let found = repository
            .find(&saga_type, &[AssociationValue::new("myId", id)])
            .await
            .unwrap();
        assert_eq!(found.len(), 1, "exactly one saga for {id}");
        let saga = found[0].lock().await;
        assert_eq!(
            saga.data.as_array().expect("log is an array"),
            &expected,
            "saga {id} saw its events out of order"
        );
    }

    repository.index().verify_consistency().unwrap();
    sequencer.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_purge_is_idempotent_and_keeps_index_routable() {
    let store = Arc::new(InMemorySagaStore::new());
    let repository = Arc::new(SagaRepository::new(Arc::clone(&store)));
    let sequencer = DispatchSequencer::new(
        SequencerConfig::new().with_lanes(2),
        Arc::clone(&repository),
        Arc::new(LoggingHandler),
    );

    let saga_type = SagaType::new("stress");
    let value = AssociationValue::new("myId", "solo");
    sequencer
        .publish(
            saga_type.clone(),
            EventMessage::new("stress.message", serde_json::json!({ "message": "first" })),
            vec![value.clone()],
            SagaCreationPolicy::IfNoneFound,
        )
        .unwrap();
    sequencer.drain().await;

    repository.purge_cache();
    repository.purge_cache();
    assert!(!repository.index().is_empty());

    // Routing still works after the purge: the next event reloads the
    // saga instead of creating a second one.
    sequencer
        .publish(
            saga_type.clone(),
            EventMessage::new("stress.message", serde_json::json!({ "message": "second" })),
            vec![value.clone()],
            SagaCreationPolicy::IfNoneFound,
        )
        .unwrap();
    sequencer.drain().await;

    assert_eq!(sequencer.metrics().snapshot().sagas_created, 1);
    let found = repository.find(&saga_type, &[value]).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(
        found[0].lock().await.data,
        serde_json::json!(["first", "second"])
    );
    sequencer.shutdown().await;
}
