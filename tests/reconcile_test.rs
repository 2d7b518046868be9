// ABOUTME: Integration tests for the child-collection reconciliation engine
// ABOUTME: Convergence, exact-set, identity preservation, atomicity, and key coercion
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Event Admin Console
#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::{create_test_store, query, route_stops, seed_app, seed_project, seed_route, seed_stop, seed_way, FailingExecutor};
use event_admin::database::{DataStore, SqlValue};
use event_admin::handlers::app_pages::APP_PAGES;
use event_admin::handlers::route_stops::ROUTE_STOPS;
use event_admin::reconcile::{reconcile, DesiredChild, NaturalKey, ReconciliationResult};

struct RouteFixture {
    store: DataStore,
    route_id: i64,
    ways: Vec<i64>,
}

async fn route_fixture(way_count: usize) -> RouteFixture {
    let store = create_test_store().await;
    let project_id = seed_project(&store, "Summer Fest").await;
    let route_id = seed_route(&store, project_id, "Shuttle").await;
    let mut ways = Vec::new();
    for index in 0..way_count {
        ways.push(seed_way(&store, project_id, &format!("Way {index}")).await);
    }
    RouteFixture {
        store,
        route_id,
        ways,
    }
}

async fn reconcile_stops(fixture: &RouteFixture, desired: &[DesiredChild]) -> ReconciliationResult {
    let mut tx = fixture.store.begin().await.unwrap();
    let outcome = reconcile(&mut tx, &ROUTE_STOPS, &SqlValue::Integer(fixture.route_id), desired).await;
    tx.finish(outcome).await.unwrap()
}

async fn stop_ids(store: &DataStore, route_id: i64) -> Vec<(i64, i64)> {
    query(
        store,
        "SELECT id, way_id FROM bus_route_stops WHERE route_id = ? ORDER BY way_id",
        &[SqlValue::Integer(route_id)],
    )
    .await
    .iter()
    .map(|row| (row.get_i64("way_id").unwrap(), row.get_i64("id").unwrap()))
    .collect()
}

#[tokio::test]
async fn test_second_identical_call_is_noop() {
    let fixture = route_fixture(3).await;
    let desired: Vec<DesiredChild> = fixture
        .ways
        .iter()
        .map(|way| DesiredChild::new(*way).with_field("scheduled_time", "09:00"))
        .collect();

    let first = reconcile_stops(&fixture, &desired).await;
    assert_eq!(first.inserted, 3);

    let second = reconcile_stops(&fixture, &desired).await;
    assert!(second.is_noop());
    assert_eq!(second.unchanged, 3);
    assert_eq!(second.rows, first.rows);
}

#[tokio::test]
async fn test_final_key_set_matches_desired_list() {
    let fixture = route_fixture(5).await;
    let lists: Vec<Vec<i64>> = vec![
        vec![fixture.ways[0], fixture.ways[1], fixture.ways[2]],
        vec![fixture.ways[2], fixture.ways[3]],
        vec![fixture.ways[4], fixture.ways[0], fixture.ways[3], fixture.ways[1]],
        vec![],
        vec![fixture.ways[2]],
    ];

    for list in lists {
        let desired: Vec<DesiredChild> = list.iter().map(|way| DesiredChild::new(*way)).collect();
        let result = reconcile_stops(&fixture, &desired).await;

        let mut expected: Vec<NaturalKey> = list.iter().map(|way| NaturalKey::Integer(*way)).collect();
        expected.sort();
        let mut actual = result.keys();
        actual.sort();
        assert_eq!(actual, expected);

        let stored: Vec<i64> = route_stops(&fixture.store, fixture.route_id)
            .await
            .into_iter()
            .map(|(way, _)| way)
            .collect();
        assert_eq!(stored, list, "stored order follows list order");
    }
}

#[tokio::test]
async fn test_changed_payload_keeps_row_identity() {
    let fixture = route_fixture(2).await;
    let [a, b] = [fixture.ways[0], fixture.ways[1]];
    reconcile_stops(
        &fixture,
        &[
            DesiredChild::new(a).with_field("scheduled_time", "09:00"),
            DesiredChild::new(b).with_field("scheduled_time", "09:30"),
        ],
    )
    .await;
    let before = stop_ids(&fixture.store, fixture.route_id).await;

    let result = reconcile_stops(
        &fixture,
        &[
            DesiredChild::new(b).with_field("scheduled_time", "10:00"),
            DesiredChild::new(a).with_field("scheduled_time", "09:00"),
        ],
    )
    .await;

    assert_eq!(result.updated, 2, "b changed time, both changed position");
    assert_eq!(result.inserted + result.deleted, 0);
    assert_eq!(stop_ids(&fixture.store, fixture.route_id).await, before);
    assert_eq!(route_stops(&fixture.store, fixture.route_id).await, vec![(b, 0), (a, 1)]);
}

#[tokio::test]
async fn test_failed_insert_leaves_store_untouched() {
    let fixture = route_fixture(6).await;
    seed_stop(&fixture.store, fixture.route_id, fixture.ways[0], 0).await;
    let before = stop_ids(&fixture.store, fixture.route_id).await;

    let desired: Vec<DesiredChild> = fixture.ways[1..].iter().map(|way| DesiredChild::new(*way)).collect();
    let mut tx = fixture.store.begin().await.unwrap();
    let outcome = {
        let mut failing = FailingExecutor::new(&mut tx, 2);
        reconcile(&mut failing, &ROUTE_STOPS, &SqlValue::Integer(fixture.route_id), &desired).await
    };
    let err = tx.finish(outcome).await.unwrap_err();
    assert_eq!(err.http_status(), 409);

    assert_eq!(stop_ids(&fixture.store, fixture.route_id).await, before);
}

#[tokio::test]
async fn test_scenario_replace_one_child() {
    let fixture = route_fixture(3).await;
    let [a, b, c] = [fixture.ways[0], fixture.ways[1], fixture.ways[2]];
    seed_stop(&fixture.store, fixture.route_id, a, 0).await;
    let b_id = seed_stop(&fixture.store, fixture.route_id, b, 1).await;

    let result = reconcile_stops(&fixture, &[DesiredChild::new(c), DesiredChild::new(b)]).await;

    assert_eq!(result.deleted, 1);
    assert_eq!(result.inserted, 1);
    assert_eq!(result.unchanged, 1, "b keeps position 1");
    assert_eq!(result.updated, 0);
    assert_eq!(route_stops(&fixture.store, fixture.route_id).await, vec![(c, 0), (b, 1)]);
    let b_row = result.rows.iter().find(|row| row.key == NaturalKey::Integer(b)).unwrap();
    assert_eq!(b_row.id, b_id);
}

#[tokio::test]
async fn test_scenario_empty_list_deletes_all() {
    let fixture = route_fixture(3).await;
    for (position, way) in fixture.ways.iter().enumerate() {
        seed_stop(&fixture.store, fixture.route_id, *way, position as i64).await;
    }

    let result = reconcile_stops(&fixture, &[]).await;

    assert_eq!(result.deleted, 3);
    assert!(result.rows.is_empty());
    assert!(route_stops(&fixture.store, fixture.route_id).await.is_empty());
}

#[tokio::test]
async fn test_scenario_insert_into_empty_parent() {
    let fixture = route_fixture(2).await;

    let result = reconcile_stops(
        &fixture,
        &[DesiredChild::new(fixture.ways[0]), DesiredChild::new(fixture.ways[1])],
    )
    .await;

    assert_eq!(result.inserted, 2);
    assert_eq!(result.deleted + result.updated + result.unchanged, 0);
}

#[tokio::test]
async fn test_scenario_third_insert_fails_and_rolls_back() {
    let fixture = route_fixture(4).await;
    let [a, b, c, d] = [fixture.ways[0], fixture.ways[1], fixture.ways[2], fixture.ways[3]];
    seed_stop(&fixture.store, fixture.route_id, a, 0).await;
    let before = route_stops(&fixture.store, fixture.route_id).await;

    let desired = [DesiredChild::new(b), DesiredChild::new(c), DesiredChild::new(d)];
    let mut tx = fixture.store.begin().await.unwrap();
    let outcome = {
        let mut failing = FailingExecutor::new(&mut tx, 3);
        reconcile(&mut failing, &ROUTE_STOPS, &SqlValue::Integer(fixture.route_id), &desired).await
    };
    assert!(tx.finish(outcome).await.is_err());

    assert_eq!(route_stops(&fixture.store, fixture.route_id).await, before);
}

#[tokio::test]
async fn test_mixed_type_keys_converge() {
    let fixture = route_fixture(2).await;
    let [a, b] = [fixture.ways[0], fixture.ways[1]];
    reconcile_stops(&fixture, &[DesiredChild::new(a), DesiredChild::new(b)]).await;
    let before = stop_ids(&fixture.store, fixture.route_id).await;

    let as_text = [
        DesiredChild::new(a.to_string()),
        DesiredChild::new(format!(" {b} ")),
    ];
    let result = reconcile_stops(&fixture, &as_text).await;
    assert!(result.is_noop(), "numeric strings match integer keys");

    let as_float = [DesiredChild::new(a as f64), DesiredChild::new(b as f64)];
    let result = reconcile_stops(&fixture, &as_float).await;
    assert!(result.is_noop(), "integral floats match integer keys");

    assert_eq!(stop_ids(&fixture.store, fixture.route_id).await, before);
}

#[tokio::test]
async fn test_integer_values_match_text_keys() {
    let store = create_test_store().await;
    let project_id = seed_project(&store, "Apps").await;
    let app_id = seed_app(&store, project_id, "Portal", None).await;
    let parent = SqlValue::Integer(app_id);

    let mut tx = store.begin().await.unwrap();
    let desired = [
        DesiredChild::new("home").with_field("title", "Home"),
        DesiredChild::new(404_i64).with_field("title", "Missing"),
    ];
    let outcome = reconcile(&mut tx, &APP_PAGES, &parent, &desired).await;
    tx.finish(outcome).await.unwrap();

    let mut tx = store.begin().await.unwrap();
    let again = [
        DesiredChild::new("home").with_field("title", "Home"),
        DesiredChild::new("404").with_field("title", "Missing"),
    ];
    let outcome = reconcile(&mut tx, &APP_PAGES, &parent, &again).await;
    let result = tx.finish(outcome).await.unwrap();

    assert!(result.is_noop());
    assert_eq!(result.rows[1].key, NaturalKey::Text("404".into()));
}

#[tokio::test]
async fn test_duplicate_keys_are_rejected_before_any_write() {
    let fixture = route_fixture(2).await;
    seed_stop(&fixture.store, fixture.route_id, fixture.ways[0], 0).await;
    let before = route_stops(&fixture.store, fixture.route_id).await;

    let mut tx = fixture.store.begin().await.unwrap();
    let desired = [
        DesiredChild::new(fixture.ways[1]),
        DesiredChild::new(fixture.ways[1].to_string()),
    ];
    let outcome = reconcile(&mut tx, &ROUTE_STOPS, &SqlValue::Integer(fixture.route_id), &desired).await;
    let err = tx.finish(outcome).await.unwrap_err();

    assert_eq!(err.http_status(), 400);
    assert_eq!(route_stops(&fixture.store, fixture.route_id).await, before);
}

#[tokio::test]
async fn test_invalid_input_is_rejected() {
    let fixture = route_fixture(1).await;
    let way = fixture.ways[0];
    let cases = [
        (SqlValue::Integer(fixture.route_id), vec![DesiredChild::new(SqlValue::Null)]),
        (SqlValue::Null, vec![DesiredChild::new(way)]),
        (SqlValue::Integer(fixture.route_id), vec![DesiredChild::new("not-a-number")]),
        (
            SqlValue::Integer(fixture.route_id),
            vec![DesiredChild::new(way).with_field("colour", "red")],
        ),
    ];

    for (parent, desired) in cases {
        let mut tx = fixture.store.begin().await.unwrap();
        let outcome = reconcile(&mut tx, &ROUTE_STOPS, &parent, &desired).await;
        let err = tx.finish(outcome).await.unwrap_err();
        assert_eq!(err.http_status(), 400, "{desired:?}");
    }
    assert!(route_stops(&fixture.store, fixture.route_id).await.is_empty());
}

#[tokio::test]
async fn test_explicit_positions_win_over_list_order() {
    let fixture = route_fixture(2).await;
    let [a, b] = [fixture.ways[0], fixture.ways[1]];

    reconcile_stops(
        &fixture,
        &[DesiredChild::new(a).at_position(10), DesiredChild::new(b).at_position(5)],
    )
    .await;

    assert_eq!(route_stops(&fixture.store, fixture.route_id).await, vec![(b, 5), (a, 10)]);
}
