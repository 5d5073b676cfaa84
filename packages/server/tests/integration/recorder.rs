use std::time::Duration;

use chrono::Utc;

use ::common::DeadLetterRecord;
use ::common::headers::DLS_REPLAY_PRODUCER;
use ::common::subject::{NON_NATIVE_PRODUCER, dls_msg_id, dls_subject, identity_timestamp};
use dls_server::consumers::listen_for_poison_messages;
use dls_server::dls::{POISON_MESSAGE_TITLE, RecordOutcome, SkipReason};
use dls_server::error::DlsError;
use dls_server::notifications::NotificationCategory;
use mq::LogStore;

use crate::common::{ADVISORY_SUBJECT, RecordingNotifier, TestEngine, advisory, wait_until};

const NATIVE_HEADERS: &[(&str, &str)] = &[
    ("$memphis_connectionId", "c-1"),
    ("$memphis_producedBy", "p-1"),
    ("trace-id", "abc"),
];

fn seed_producer(engine: &TestEngine) {
    engine.add_connection("c-1", "10.0.0.7:51820");
    engine.add_producer("p-1", "c-1", "root");
}

fn recorded(outcome: RecordOutcome) -> DeadLetterRecord {
    match outcome {
        RecordOutcome::Recorded(record) => record,
        other => panic!("Expected a recorded message, got {other:?}"),
    }
}

#[tokio::test]
async fn test_records_poison_message() {
    let engine = TestEngine::new();
    let station = engine.add_station("orders", true, true);
    seed_producer(&engine);
    let sent_at = Utc::now();
    let seq = engine.produce(&station, NATIVE_HEADERS, b"hello", sent_at);

    let outcome = engine
        .state
        .recorder()
        .handle_advisory(&advisory(&station, "billing", seq, 10))
        .await
        .unwrap();
    let record = recorded(outcome);

    let expected_id = dls_msg_id("orders", seq, "p-1", &identity_timestamp(sent_at));
    assert_eq!(record.id, expected_id);
    assert_eq!(record.station_name, "orders");
    assert_eq!(record.message_seq, seq);
    assert_eq!(record.producer.name, "p-1");
    assert_eq!(record.producer.client_address, "10.0.0.7:51820");
    assert_eq!(record.producer.created_by_user, "root");
    assert_eq!(record.message.data, hex::encode("hello"));
    assert_eq!(record.message.time_sent, sent_at);
    assert_eq!(record.message.headers["trace-id"], "abc");

    let cg = record.poisoned_cg.as_ref().unwrap();
    assert_eq!(cg.cg_name, "billing");
    assert_eq!(cg.deliveries_count, 10);

    let stored = engine.dls_messages(&station);
    assert_eq!(stored.len(), 1);
    assert_eq!(
        stored[0].subject,
        dls_subject("poison", "orders", &expected_id, "billing")
    );
    let decoded: DeadLetterRecord = serde_json::from_slice(&stored[0].data).unwrap();
    assert_eq!(decoded, record);

    let sent = engine.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].title, POISON_MESSAGE_TITLE);
    assert_eq!(sent[0].category, NotificationCategory::PoisonMessage);
    assert!(
        sent[0]
            .body
            .ends_with(&format!("http://ui.test/stations/orders/{expected_id}"))
    );
}

#[tokio::test]
async fn test_same_message_poisoning_two_groups_shares_id() {
    let engine = TestEngine::new();
    let station = engine.add_station("orders", true, true);
    seed_producer(&engine);
    let seq = engine.produce(&station, NATIVE_HEADERS, b"hello", Utc::now());

    let recorder = engine.state.recorder();
    let first = recorded(
        recorder
            .handle_advisory(&advisory(&station, "billing", seq, 10))
            .await
            .unwrap(),
    );
    let second = recorded(
        recorder
            .handle_advisory(&advisory(&station, "shipping", seq, 3))
            .await
            .unwrap(),
    );

    assert_eq!(first.id, second.id);
    let subjects: Vec<String> = engine
        .dls_messages(&station)
        .into_iter()
        .map(|m| m.subject)
        .collect();
    assert_eq!(
        subjects,
        vec![
            dls_subject("poison", "orders", &first.id, "billing"),
            dls_subject("poison", "orders", &first.id, "shipping"),
        ]
    );
}

#[tokio::test]
async fn test_disabled_poison_detection_records_nothing() {
    let engine = TestEngine::new();
    let station = engine.add_station("orders", true, false);
    seed_producer(&engine);
    let seq = engine.produce(&station, NATIVE_HEADERS, b"hello", Utc::now());

    let outcome = engine
        .state
        .recorder()
        .handle_advisory(&advisory(&station, "billing", seq, 10))
        .await
        .unwrap();

    assert_eq!(
        outcome,
        RecordOutcome::Skipped(SkipReason::PoisonDetectionDisabled)
    );
    assert!(engine.dls_messages(&station).is_empty());
    assert!(engine.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_replayed_dead_letter_is_not_recorded_again() {
    let engine = TestEngine::new();
    let station = engine.add_station("orders", true, true);
    seed_producer(&engine);
    let seq = engine.produce(
        &station,
        &[
            ("$memphis_connectionId", "c-1"),
            ("$memphis_producedBy", DLS_REPLAY_PRODUCER),
        ],
        b"hello",
        Utc::now(),
    );

    let outcome = engine
        .state
        .recorder()
        .handle_advisory(&advisory(&station, "billing", seq, 10))
        .await
        .unwrap();

    assert_eq!(outcome, RecordOutcome::Skipped(SkipReason::DeadLetterReplay));
    assert!(engine.dls_messages(&station).is_empty());
    assert!(engine.notifier.sent().is_empty());
}

#[tokio::test]
async fn test_legacy_attribution_headers() {
    let engine = TestEngine::new();
    let station = engine.add_station("orders", true, true);
    seed_producer(&engine);
    let seq = engine.produce(
        &station,
        &[("connectionId", "c-1"), ("producedBy", "p-1")],
        b"hello",
        Utc::now(),
    );

    let record = recorded(
        engine
            .state
            .recorder()
            .handle_advisory(&advisory(&station, "billing", seq, 10))
            .await
            .unwrap(),
    );

    assert_eq!(record.producer.name, "p-1");
    assert_eq!(record.producer.connection_id, "c-1");
}

#[tokio::test]
async fn test_missing_attribution_is_malformed_input() {
    let engine = TestEngine::new();
    let station = engine.add_station("orders", true, true);
    seed_producer(&engine);
    let seq = engine.produce(&station, &[("trace-id", "abc")], b"hello", Utc::now());

    let err = engine
        .state
        .recorder()
        .handle_advisory(&advisory(&station, "billing", seq, 10))
        .await
        .unwrap_err();

    assert!(matches!(err, DlsError::MissingAttribution { seq: s, .. } if s == seq));
    assert!(err.is_malformed_input());
    assert!(engine.dls_messages(&station).is_empty());
}

#[tokio::test]
async fn test_malformed_advisory() {
    let engine = TestEngine::new();
    engine.add_station("orders", true, true);

    let err = engine
        .state
        .recorder()
        .handle_advisory(b"not json")
        .await
        .unwrap_err();

    assert!(matches!(err, DlsError::MalformedAdvisory(_)));
    assert!(err.is_malformed_input());
}

#[tokio::test]
async fn test_unknown_station() {
    let engine = TestEngine::new();
    let station = engine.add_station("orders", true, true);
    let payload = serde_json::json!({
        "stream": "ghost",
        "consumer": "billing",
        "stream_seq": 1,
        "deliveries": 10,
    })
    .to_string();

    let err = engine
        .state
        .recorder()
        .handle_advisory(payload.as_bytes())
        .await
        .unwrap_err();

    assert!(matches!(err, DlsError::StationNotFound(ref name) if name == "ghost"));
    assert!(!err.is_malformed_input());
    assert!(engine.dls_messages(&station).is_empty());
}

#[tokio::test]
async fn test_unknown_connection() {
    let engine = TestEngine::new();
    let station = engine.add_station("orders", true, true);
    engine.add_producer("p-1", "c-1", "root");
    let seq = engine.produce(&station, NATIVE_HEADERS, b"hello", Utc::now());

    let err = engine
        .state
        .recorder()
        .handle_advisory(&advisory(&station, "billing", seq, 10))
        .await
        .unwrap_err();

    assert!(matches!(err, DlsError::ConnectionNotFound(ref id) if id == "c-1"));
}

#[tokio::test]
async fn test_non_native_station_uses_placeholder_producer() {
    let engine = TestEngine::new();
    let station = engine.add_station("sensors", false, true);
    let sent_at = Utc::now();
    let seq = engine.produce(&station, &[], b"{\"t\":21}", sent_at);

    let record = recorded(
        engine
            .state
            .recorder()
            .handle_advisory(&advisory(&station, "ingest", seq, 5))
            .await
            .unwrap(),
    );

    assert_eq!(
        record.id,
        dls_msg_id("sensors", seq, NON_NATIVE_PRODUCER, &identity_timestamp(sent_at))
    );
    assert!(record.producer.name.is_empty());
    assert!(record.message.headers.is_empty());
    assert_eq!(record.poisoned_cg.unwrap().cg_name, "ingest");
    assert_eq!(engine.dls_messages(&station).len(), 1);
}

#[tokio::test]
async fn test_notification_failure_does_not_fail_recording() {
    let engine = TestEngine::with_notifier(RecordingNotifier::rejecting());
    let station = engine.add_station("orders", true, true);
    seed_producer(&engine);
    let seq = engine.produce(&station, NATIVE_HEADERS, b"hello", Utc::now());

    let outcome = engine
        .state
        .recorder()
        .handle_advisory(&advisory(&station, "billing", seq, 10))
        .await
        .unwrap();

    recorded(outcome);
    assert_eq!(engine.notifier.sent().len(), 1);
    assert_eq!(engine.dls_messages(&station).len(), 1);
}

#[tokio::test]
async fn test_internal_names_are_reverted() {
    let engine = TestEngine::new();
    let station = engine.add_station("orders.eu", true, true);
    seed_producer(&engine);
    let seq = engine.produce(&station, NATIVE_HEADERS, b"hello", Utc::now());

    let record = recorded(
        engine
            .state
            .recorder()
            .handle_advisory(&advisory(&station, "billing.eu", seq, 10))
            .await
            .unwrap(),
    );

    assert_eq!(station.name.intern(), "orders#eu");
    assert_eq!(record.station_name, "orders.eu");
    assert_eq!(record.poisoned_cg.unwrap().cg_name, "billing.eu");
    assert_eq!(
        engine.dls_messages(&station)[0].subject,
        dls_subject("poison", "orders#eu", &record.id, "billing.eu")
    );
}

#[tokio::test]
async fn test_listener_records_published_advisory() {
    let engine = TestEngine::new();
    let station = engine.add_station("orders", true, true);
    seed_producer(&engine);
    let seq = engine.produce(&station, NATIVE_HEADERS, b"hello", Utc::now());

    let listener = tokio::spawn(listen_for_poison_messages(engine.state.clone()));
    assert!(
        wait_until(Duration::from_secs(2), || {
            engine.store.subscription_count(ADVISORY_SUBJECT) == 1
        })
        .await
    );

    engine
        .store
        .publish(
            "$JS.EVENT.ADVISORY.CONSUMER.MAX_DELIVERIES.orders.billing",
            advisory(&station, "billing", seq, 10),
        )
        .await
        .unwrap();
    engine
        .store
        .publish(
            "$JS.EVENT.ADVISORY.CONSUMER.MAX_DELIVERIES.orders.billing",
            b"garbage".to_vec(),
        )
        .await
        .unwrap();

    assert!(
        wait_until(Duration::from_secs(2), || {
            engine.dls_messages(&station).len() == 1
        })
        .await
    );
    assert!(!listener.is_finished());
    listener.abort();
}
