use chrono::{Duration, TimeZone, Utc};

use ::common::subject::dls_subject;
use ::common::{DlsConfig, DlsKind};
use dls_server::error::DlsError;

use crate::common::{TestEngine, poison_record, schema_record, test_config};

fn at(seconds: i64) -> chrono::DateTime<Utc> {
    Utc.timestamp_opt(1_714_557_600 + seconds, 250_000_000)
        .unwrap()
}

#[tokio::test]
async fn test_empty_station_lists_nothing() {
    let engine = TestEngine::new();
    let station = engine.add_station("orders", true, true);

    let listing = engine
        .state
        .dls_service()
        .list_for_station(&station.name)
        .await
        .unwrap();

    assert!(listing.poison_messages.is_empty());
    assert!(listing.schema_messages.is_empty());
    assert_eq!(listing.total_dls_amount, 0);
    assert!(engine.dls_consumers(&station).is_empty());
}

#[tokio::test]
async fn test_poison_records_deduplicated_by_id() {
    let engine = TestEngine::new();
    let station = engine.add_station("orders", true, true);
    for cg in ["billing", "shipping", "audit"] {
        engine.seed_record(
            &station,
            DlsKind::Poison,
            &poison_record(&station, 7, "p-1", cg, at(0), at(10)),
        );
    }
    engine.seed_record(
        &station,
        DlsKind::Poison,
        &poison_record(&station, 8, "p-1", "billing", at(1), at(11)),
    );

    let listing = engine
        .state
        .dls_service()
        .list_for_station(&station.name)
        .await
        .unwrap();

    assert_eq!(listing.poison_messages.len(), 2);
    assert_eq!(listing.total_dls_amount, 2);
    let seqs: Vec<u64> = listing
        .poison_messages
        .iter()
        .map(|m| m.message_seq)
        .collect();
    // Stream sequences of the first record of each id, newest send time first.
    assert_eq!(seqs, vec![4, 1]);
    assert!(engine.dls_consumers(&station).is_empty());
}

#[tokio::test]
async fn test_listing_sorted_newest_first_and_capped() {
    let engine = TestEngine::with_config(DlsConfig {
        list_limit: 2,
        ..test_config()
    });
    let station = engine.add_station("orders", true, true);
    for (seq, offset) in [(1, 30), (2, 10), (3, 50), (4, 20), (5, 40)] {
        engine.seed_record(
            &station,
            DlsKind::Poison,
            &poison_record(&station, seq, "p-1", "billing", at(offset), at(100)),
        );
    }

    let listing = engine
        .state
        .dls_service()
        .list_for_station(&station.name)
        .await
        .unwrap();

    let times: Vec<_> = listing
        .poison_messages
        .iter()
        .map(|m| m.message.time_sent)
        .collect();
    assert_eq!(times, vec![at(50), at(40)]);
    assert_eq!(listing.total_dls_amount, 5);
}

#[tokio::test]
async fn test_schema_records_use_creation_time_and_full_size() {
    let engine = TestEngine::new();
    let station = engine.add_station("orders", true, true);
    let mut record = schema_record(&station, 9, "p-1", at(0), at(3600));
    record
        .message
        .headers
        .insert("$memphis_producedBy".to_string(), "p-1".to_string());
    engine.seed_record(&station, DlsKind::Schema, &record);
    engine.seed_record(
        &station,
        DlsKind::Poison,
        &poison_record(&station, 10, "p-1", "billing", at(5), at(6)),
    );

    let listing = engine
        .state
        .dls_service()
        .list_for_station(&station.name)
        .await
        .unwrap();

    assert_eq!(listing.poison_messages.len(), 1);
    assert_eq!(listing.schema_messages.len(), 1);
    assert_eq!(listing.total_dls_amount, 2);

    let schema = &listing.schema_messages[0];
    assert_eq!(schema.id, record.id);
    assert_eq!(schema.message.time_sent, at(3600));
    let subject = dls_subject("schema", "orders", &record.id, "");
    let expected_size = subject.len()
        + record.message.data.len()
        + "$memphis_producedBy".len()
        + "p-1".len();
    assert_eq!(schema.message.size, expected_size);
}

#[tokio::test]
async fn test_schema_creation_time_falls_back_to_unix_seconds() {
    let engine = TestEngine::new();
    let station = engine.add_station("orders", true, true);
    let mut record = schema_record(&station, 9, "p-1", at(0), at(0));
    record.creation_date = None;
    record.creation_unix = (at(0) + Duration::hours(2)).timestamp();
    engine.seed_record(&station, DlsKind::Schema, &record);

    let listing = engine
        .state
        .dls_service()
        .list_for_station(&station.name)
        .await
        .unwrap();

    let expected = Utc.timestamp_opt(record.creation_unix, 0).unwrap();
    assert_eq!(listing.schema_messages[0].message.time_sent, expected);
}

#[tokio::test]
async fn test_foreign_subjects_are_skipped() {
    let engine = TestEngine::new();
    let station = engine.add_station("orders", true, true);
    engine.seed_record(
        &station,
        DlsKind::Poison,
        &poison_record(&station, 1, "p-1", "billing", at(0), at(1)),
    );
    engine
        .store
        .append(
            &station.name.dls_stream(),
            &format!("{}.retired.x", station.name.dls_stream()),
            b"{}".to_vec(),
        )
        .unwrap();

    let listing = engine
        .state
        .dls_service()
        .list_for_station(&station.name)
        .await
        .unwrap();

    assert_eq!(listing.poison_messages.len(), 1);
    assert_eq!(listing.total_dls_amount, 1);
}

#[tokio::test]
async fn test_undecodable_record_fails_listing() {
    let engine = TestEngine::new();
    let station = engine.add_station("orders", true, true);
    engine
        .store
        .append(
            &station.name.dls_stream(),
            &dls_subject("poison", "orders", "broken", "billing"),
            b"not json".to_vec(),
        )
        .unwrap();

    let err = engine
        .state
        .dls_service()
        .list_for_station(&station.name)
        .await
        .unwrap_err();

    assert!(matches!(err, DlsError::Decode { seq: 1, .. }));
    assert!(engine.dls_consumers(&station).is_empty());
}

#[tokio::test]
async fn test_remove_group_deletes_only_its_poison_records() {
    let engine = TestEngine::new();
    let station = engine.add_station("orders", true, true);
    for seq in 1..=4 {
        engine.seed_record(
            &station,
            DlsKind::Poison,
            &poison_record(&station, seq, "p-1", "billing", at(seq as i64), at(100)),
        );
    }
    for seq in 5..=6 {
        engine.seed_record(
            &station,
            DlsKind::Poison,
            &poison_record(&station, seq, "p-1", "shipping", at(seq as i64), at(100)),
        );
    }
    engine.seed_record(
        &station,
        DlsKind::Schema,
        &schema_record(&station, 7, "p-1", at(7), at(100)),
    );

    let service = engine.state.dls_service();
    let removed = service.remove_group(&station.name, "billing").await.unwrap();

    assert_eq!(removed, 4);
    assert_eq!(engine.dls_messages(&station).len(), 3);
    assert_eq!(
        service.count_by_group(&station.name, "billing").await.unwrap(),
        0
    );
    assert_eq!(
        service
            .count_by_group(&station.name, "shipping")
            .await
            .unwrap(),
        2
    );
    assert_eq!(
        service.remove_group(&station.name, "billing").await.unwrap(),
        0
    );

    let listed = service.list_for_station(&station.name).await.unwrap();
    let mut poison_ids: Vec<String> = listed
        .poison_messages
        .iter()
        .map(|m| m.id.clone())
        .collect();
    poison_ids.sort();
    let mut shipping_ids: Vec<String> = (5..=6)
        .map(|seq| poison_record(&station, seq, "p-1", "shipping", at(seq as i64), at(100)).id)
        .collect();
    shipping_ids.sort();
    assert_eq!(poison_ids, shipping_ids);
    assert_eq!(listed.schema_messages.len(), 1);
    assert_eq!(listed.total_dls_amount, 3);
}
