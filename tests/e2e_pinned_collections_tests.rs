//! End-to-end tests for pinned collections
//!
//! Saving the plugin configuration fires the pin job, which marks every
//! pinned collection as a favorite of every user.

mod common;

use axum::http::StatusCode;
use common::*;
use genre_collections::user::FavoritesStore;
use serde_json::json;
use uuid::Uuid;

fn is_favorite(server: &TestServer, user_id: usize, item_id: &Uuid) -> bool {
    server.user_store.is_favorite(user_id, item_id).unwrap()
}

#[tokio::test]
async fn test_saving_configuration_pins_for_every_user() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server);
    let drama = server.catalog.existing_collection;

    let (status, body) = client
        .put_configuration(json!({ "pinned_collection_ids": [drama] }))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pinned_collection_ids"], json!([drama]));

    let run = client.wait_for_runs(PINNED_JOB_ID, 1, "completed").await;
    assert_eq!(run["triggered_by"], "hook:OnConfigurationChanged");

    assert!(is_favorite(&server, server.alice, &drama));
    assert!(is_favorite(&server, server.bob, &drama));
}

#[tokio::test]
async fn test_unknown_and_non_collection_ids_are_skipped() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server);
    let drama = server.catalog.existing_collection;
    let unknown = Uuid::new_v4();
    let movie = server.catalog.heat;

    client
        .put_configuration(json!({ "pinned_collection_ids": [unknown, movie, drama] }))
        .await;
    client.wait_for_runs(PINNED_JOB_ID, 1, "completed").await;

    assert!(is_favorite(&server, server.alice, &drama));
    assert!(!is_favorite(&server, server.alice, &movie));
    assert!(!is_favorite(&server, server.alice, &unknown));
}

#[tokio::test]
async fn test_existing_favorites_are_kept() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server);
    let drama = server.catalog.existing_collection;
    server
        .user_store
        .set_favorite(server.alice, &drama, true)
        .unwrap();

    client
        .put_configuration(json!({ "pinned_collection_ids": [drama] }))
        .await;
    client.wait_for_runs(PINNED_JOB_ID, 1, "completed").await;

    assert!(is_favorite(&server, server.alice, &drama));
    assert!(is_favorite(&server, server.bob, &drama));
}

#[tokio::test]
async fn test_unpinning_does_not_remove_favorites() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server);
    let drama = server.catalog.existing_collection;

    client
        .put_configuration(json!({ "pinned_collection_ids": [drama] }))
        .await;
    client.wait_for_runs(PINNED_JOB_ID, 1, "completed").await;

    client
        .put_configuration(json!({ "pinned_collection_ids": [] }))
        .await;
    client.wait_for_runs(PINNED_JOB_ID, 2, "completed").await;

    assert!(is_favorite(&server, server.alice, &drama));
}

#[tokio::test]
async fn test_configuration_is_persisted_with_defaults() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server);

    let initial = client.get_configuration().await;
    assert_eq!(initial["pinned_collection_ids"], json!([]));
    assert_eq!(initial["true_false_setting"], true);
    assert_eq!(initial["a_string"], "string");
    assert_eq!(initial["options"], "one_option");

    client
        .put_configuration(json!({
            "a_string": "changed",
            "options": "another_option",
        }))
        .await;

    let saved = client.get_configuration().await;
    assert_eq!(saved["a_string"], "changed");
    assert_eq!(saved["options"], "another_option");
    assert_eq!(saved["an_integer"], 2);
}

#[tokio::test]
async fn test_manual_trigger_with_params_overrides_saved_pins() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server);
    let drama = server.catalog.existing_collection;

    let status = client
        .trigger_job(PINNED_JOB_ID, Some(json!({ "pinned_collection_ids": [drama] })))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let run = client.wait_for_runs(PINNED_JOB_ID, 1, "completed").await;
    assert_eq!(run["triggered_by"], "manual");
    assert!(is_favorite(&server, server.bob, &drama));
    assert_eq!(client.get_configuration().await["pinned_collection_ids"], json!([]));
}

#[tokio::test]
async fn test_invalid_trigger_params_fail_the_run() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server);

    let status = client
        .trigger_job(PINNED_JOB_ID, Some(json!({ "pinned_collection_ids": "drama" })))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let run = client.wait_for_runs(PINNED_JOB_ID, 1, "failed").await;
    assert!(run["error_message"]
        .as_str()
        .unwrap()
        .contains("Invalid parameters"));
}

#[tokio::test]
async fn test_malformed_configuration_is_rejected() {
    let server = TestServer::spawn().await;
    let client = TestClient::new(&server);

    let (status, _) = client
        .put_configuration(json!({ "pinned_collection_ids": ["not-a-uuid"] }))
        .await;
    assert!(status.is_client_error());

    let history = client.job_history(PINNED_JOB_ID).await;
    assert_eq!(history, json!([]));
}
