use super::*;

use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::json;

use crate::{error::TransportError, transport::MissingSnapshotSource};

struct FixedSource {
    snapshot: Mutex<Option<Snapshot>>,
}

#[async_trait]
impl SnapshotSource for FixedSource {
    async fn fetch_snapshot(&self, _session_id: &SessionId) -> Result<Snapshot, TransportError> {
        self.snapshot
            .lock()
            .expect("lock")
            .take()
            .ok_or_else(|| TransportError::Unavailable("already served".into()))
    }
}

fn offline_summary(context: Value) -> SummaryController {
    SummaryController::from_value(context, Arc::new(MissingSnapshotSource)).expect("summary")
}

fn crate_record(value: Value) -> CrateRecord {
    serde_json::from_value(value).expect("crate record")
}

fn id(raw: &str) -> CrateId {
    CrateId::from(raw)
}

#[test]
fn construction_backfills_empty_containers() {
    let summary = offline_summary(json!({ "session_id": "S1" }));
    let state = summary.state();

    assert_eq!(state.session_id.as_str(), "S1");
    assert!(state.crates().is_empty());
    assert_eq!(state.crate_summary, CrateSummary::default());
    assert!(state.item_summary.is_empty());
}

#[test]
fn replacing_a_crate_keeps_a_single_entry() {
    let mut summary = offline_summary(json!({}));

    summary.insert_or_replace_crate(crate_record(json!({ "crate_id": "C1", "qty": 5 })));
    let replaced =
        summary.insert_or_replace_crate(crate_record(json!({ "crate_id": "C1", "qty": 9 })));

    assert!(replaced.is_some());
    let crates = summary.state().crates();
    assert_eq!(crates.len(), 1);
    assert_eq!(crates[&id("C1")].get("qty"), Some(&json!(9)));
}

#[test]
fn insert_is_idempotent() {
    let record = crate_record(json!({ "crate_id": "C2", "item_code": "TOM" }));
    let mut once = offline_summary(json!({}));
    once.insert_or_replace_crate(record.clone());

    let mut twice = offline_summary(json!({}));
    twice.insert_or_replace_crate(record.clone());
    twice.insert_or_replace_crate(record);

    assert_eq!(once.state().crates(), twice.state().crates());
}

#[test]
fn deleting_a_missing_crate_is_a_noop() {
    let mut summary = offline_summary(json!({ "crates": [{ "crate_id": "C1" }] }));
    let before = summary.state().crates().clone();
    let mut events = summary.subscribe_events();

    assert!(summary.delete_crate(&id("C404")).is_none());

    assert_eq!(summary.state().crates(), &before);
    assert!(events.try_recv().is_err());
}

#[test]
fn earlier_snapshots_are_not_affected_by_deletes() {
    let mut summary = offline_summary(json!({
        "crates": [{ "crate_id": "C1" }, { "crate_id": "C2" }],
    }));
    let held = summary.state().crates_snapshot();

    summary.delete_crate(&id("C1"));

    assert_eq!(held.len(), 2);
    assert_eq!(summary.state().crates().len(), 1);
}

#[test]
fn crates_mapping_deletes_nulls_and_inserts_records() {
    let mut summary = offline_summary(json!({ "crates": [{ "crate_id": "A" }] }));

    let report = summary.merge_summary_update(
        serde_json::from_value(json!({
            "crates": { "A": null, "B": { "crate_id": "B", "qty": 1 } },
        }))
        .expect("update"),
    );

    let crates = summary.state().crates();
    assert!(!crates.contains_key(&id("A")));
    assert!(crates.contains_key(&id("B")));
    assert_eq!(report.deleted, vec![id("A")]);
    assert_eq!(report.inserted, vec![id("B")]);
}

#[test]
fn keyed_crates_without_ids_merge_alongside_aggregates() {
    let mut summary = offline_summary(json!({ "crates": [{ "crate_id": "A" }] }));

    let report = summary
        .merge_summary_update_text(
            r#"{"crate_summary":{"count":2,"quantity":5},"crates":{"A":null,"B":{"item_code":"TOM"}}}"#,
        )
        .expect("merge");

    let crates = summary.state().crates();
    assert_eq!(crates.len(), 1);
    assert_eq!(crates[&id("B")].crate_id, id("B"));
    assert_eq!(crates[&id("B")].get("item_code"), Some(&json!("TOM")));
    assert_eq!(summary.state().crate_summary.count, 2);
    assert_eq!(summary.state().crate_summary.quantity, 5.0);
    assert_eq!(report.deleted, vec![id("A")]);
    assert_eq!(report.inserted, vec![id("B")]);
    assert!(report.crate_summary);
    assert!(report.rejected.is_empty());
}

#[test]
fn unreadable_parts_are_skipped_and_reported() {
    let mut summary = offline_summary(json!({
        "crates": [{ "crate_id": "A" }],
        "crate_summary": { "count": 1, "quantity": 3 },
    }));
    let mut events = summary.subscribe_events();

    let report = summary
        .merge_summary_value(json!({
            "crate_summary": { "count": -4, "quantity": 5 },
            "item_summary": [{ "item_code": "TOM", "count": 1, "quantity": 2 }],
            "crates": { "A": null, "C": 7 },
        }))
        .expect("merge");

    let rejected: Vec<&str> = report.rejected.iter().map(|r| r.part.as_str()).collect();
    assert_eq!(rejected, vec!["crate_summary", "crates.C"]);
    assert!(!report.crate_summary);
    assert!(report.item_summary);
    assert_eq!(report.deleted, vec![id("A")]);

    let state = summary.state();
    assert!(state.crates().is_empty());
    assert_eq!(state.crate_summary.count, 1);
    assert_eq!(state.item_summary.get("TOM").map(|t| t.count), Some(1));

    match events.try_recv().expect("event") {
        ViewEvent::InvalidPayload { view, reason } => {
            assert_eq!(view, ViewKind::Summary);
            assert!(reason.contains("crate_summary"), "{reason}");
            assert!(reason.contains("crates.C"), "{reason}");
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[test]
fn aggregates_are_replaced_wholesale() {
    let mut summary = offline_summary(json!({
        "crate_summary": { "count": 1, "quantity": 3 },
        "item_summary": [{ "item_code": "TOM", "count": 1, "quantity": 3 }],
    }));
    let mut events = summary.subscribe_events();

    let report = summary
        .merge_summary_update_text(
            r#"{"crate_summary": {"count": 4, "quantity": 12.5}, "item_summary": []}"#,
        )
        .expect("merge");

    assert!(report.crate_summary);
    assert!(report.item_summary);
    assert_eq!(summary.state().crate_summary.count, 4);
    assert_eq!(summary.state().crate_summary.quantity, 12.5);
    assert!(summary.state().item_summary.is_empty());
    assert_eq!(
        events.try_recv().expect("event"),
        ViewEvent::FieldsChanged {
            view: ViewKind::Summary,
            fields: vec!["crate_summary", "item_summary"],
        }
    );
}

#[test]
fn single_crate_update_is_inserted() {
    let mut summary = offline_summary(json!({}));
    let report = summary
        .merge_summary_update_text(r#"{"crate": {"crate_id": "C5", "grn_quantity": 2}}"#)
        .expect("merge");

    assert_eq!(report.inserted, vec![id("C5")]);
    assert_eq!(summary.state().crates()[&id("C5")].grn_quantity(), 2.0);
}

#[test]
fn empty_updates_change_nothing() {
    let mut summary = offline_summary(json!({ "crates": [{ "crate_id": "C1" }] }));
    let before = summary.state().clone();

    assert!(summary.merge_summary_update_text("{}").expect("merge").is_noop());
    assert!(summary.merge_summary_update_text("   ").expect("merge").is_noop());
    assert!(summary
        .merge_summary_update_text(r#"{"crate": null, "crates": null}"#)
        .expect("merge")
        .is_noop());

    assert_eq!(summary.state(), &before);
}

#[test]
fn non_object_payloads_are_rejected() {
    let mut summary = offline_summary(json!({ "crates": [{ "crate_id": "C1" }] }));
    let before = summary.state().clone();

    for raw in [r#""crate""#, "[1, 2]", "42", "{\"crate\": "] {
        let err = summary
            .merge_summary_update_text(raw)
            .expect_err("should fail");
        assert!(matches!(err, ViewError::InvalidDirective { .. }), "{raw}");
    }
    let err = summary
        .merge_summary_value(json!("crate"))
        .expect_err("should fail");
    assert!(matches!(err, ViewError::InvalidDirective { .. }));

    assert_eq!(summary.state(), &before);
}

#[test]
fn unknown_summary_field_is_ignored() {
    let mut summary = offline_summary(json!({ "activity": "Procurement" }));
    let before = summary.state().clone();

    let outcome = summary.apply_named_field("show_item_summary", json!(true));

    assert_eq!(outcome, FieldUpdate::Ignored(IgnoreReason::UnknownField));
    assert_eq!(summary.state(), &before);
}

#[test]
fn recompute_rebuilds_aggregates_from_crates() {
    let mut summary = offline_summary(json!({
        "crates": [
            { "crate_id": "C1", "item_code": "TOM", "grn_quantity": 4.5 },
            { "crate_id": "C2", "item_code": "ONI", "grn_quantity": 2 },
            { "crate_id": "C3", "item_code": "TOM", "grn_quantity": "1.5" },
            { "crate_id": "C4", "item_code": "TOM" },
        ],
        "crate_summary": { "count": 99, "quantity": 99 },
    }));

    summary.recompute_summaries();

    let state = summary.state();
    assert_eq!(state.crate_summary.count, 4);
    assert_eq!(state.crate_summary.quantity, 8.0);
    let tomato = state.item_summary.get("TOM").expect("tomato");
    assert_eq!(tomato.count, 3);
    assert_eq!(tomato.quantity, 6.0);
    let onion = state.item_summary.get("ONI").expect("onion");
    assert_eq!(onion.count, 1);
    assert_eq!(state.item_summary.0[0].item_code, "TOM");
}

#[tokio::test]
async fn refresh_replaces_collection_from_server() {
    let snapshot = match json!({
        "crates": { "C7": { "crate_id": "C7", "item_code": "TOM" } },
        "crate_summary": { "count": 1, "quantity": 7 },
        "show_crate_summary": false,
    }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    };
    let source = Arc::new(FixedSource {
        snapshot: Mutex::new(Some(snapshot)),
    });
    let mut summary = SummaryController::from_value(
        json!({ "session_id": "S1", "crates": [{ "crate_id": "C1" }] }),
        source,
    )
    .expect("summary");

    let outcome = summary.refresh_from_server().await.expect("refresh");

    match outcome {
        RefreshOutcome::Applied(report) => {
            assert_eq!(report.applied.len(), 2);
            assert_eq!(report.unknown, vec!["show_crate_summary".to_string()]);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    let crates = summary.state().crates();
    assert_eq!(crates.len(), 1);
    assert!(crates.contains_key(&id("C7")));
    assert_eq!(summary.state().crate_summary.count, 1);
}

#[tokio::test]
async fn refresh_without_source_reports_failure() {
    let mut summary = offline_summary(json!({ "session_id": "S1", "crates": [{ "crate_id": "C1" }] }));
    let before = summary.state().clone();

    let err = summary.refresh_from_server().await.expect_err("should fail");

    assert!(matches!(
        err,
        ViewError::RefreshFailed(TransportError::Unavailable(_))
    ));
    assert_eq!(summary.state(), &before);
}

#[test]
fn refresh_response_for_the_form_is_not_merged() {
    let mut summary = offline_summary(json!({ "session_id": "S1", "crates": [{ "crate_id": "C1" }] }));
    let before = summary.state().clone();
    let ticket = summary.begin_refresh().ticket();

    let snapshot = match json!({ "crates": { "C9": { "crate_id": "C9" } } }) {
        Value::Object(map) => map,
        _ => unreachable!(),
    };
    let outcome = summary
        .complete_refresh(RefreshResponse {
            ticket,
            view: ViewKind::Form,
            result: Ok(snapshot),
        })
        .expect("complete");

    assert_eq!(
        outcome,
        RefreshOutcome::Stale {
            ticket,
            latest: ticket
        }
    );
    assert_eq!(summary.state(), &before);
}
