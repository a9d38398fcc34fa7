//! Remote data-API client tests against a mock HTTP server.

use anyhow::Result;
use chrono::{SecondsFormat, TimeZone, Utc};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use accord::error::StoreError;
use accord::store::{ConnectionLifecycle, FieldMap, RecordStore, RemoteStore};

async fn session_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sessions"))
        .and(body_json(json!({"username": "sync-bot", "password": "pw"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "tok-1"})))
        .mount(&server)
        .await;
    server
}

fn store(server: &MockServer) -> RemoteStore {
    RemoteStore::new(&server.uri(), "sync-bot", "pw", 5).unwrap()
}

#[tokio::test]
async fn fetch_modified_since_sends_the_watermark_and_bearer_token() -> Result<()> {
    let server = session_server().await;
    let watermark = Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap();

    Mock::given(method("GET"))
        .and(path("/tables/contacts/records"))
        .and(query_param(
            "modified_since",
            watermark.to_rfc3339_opts(SecondsFormat::Secs, true),
        ))
        .and(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [
                {
                    "id": "fm-1",
                    "link_id": "pg-1",
                    "modified_at": "2025-03-02T09:30:00Z",
                    "fields": {"name": "Ada"}
                }
            ]
        })))
        .mount(&server)
        .await;

    let store = store(&server);
    let lease = store.open().await?;

    let records = store.fetch_modified_since("contacts", watermark).await?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "fm-1");
    assert_eq!(records[0].link_id.as_deref(), Some("pg-1"));
    assert_eq!(records[0].fields.get("name").unwrap(), "Ada");

    lease.close().await.ok();
    Ok(())
}

#[tokio::test]
async fn requests_without_a_session_are_rejected() {
    let server = MockServer::start().await;
    let store = store(&server);

    let err = store.snapshot("contacts").await.unwrap_err();
    assert!(matches!(err, StoreError::Session { .. }));
}

#[tokio::test]
async fn fetch_by_ids_posts_the_id_set() -> Result<()> {
    let server = session_server().await;

    Mock::given(method("POST"))
        .and(path("/tables/contacts/records/search"))
        .and(body_json(json!({"ids": ["pg-a", "pg-c"]})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "records": [
                {"id": "pg-a", "modified_at": "2025-01-01T00:00:00Z", "fields": {}}
            ]
        })))
        .mount(&server)
        .await;

    let store = store(&server);
    let lease = store.open().await?;

    let records = store
        .fetch_by_ids("contacts", &["pg-a".to_string(), "pg-c".to_string()])
        .await?;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].id, "pg-a");

    lease.close().await.ok();
    Ok(())
}

#[tokio::test]
async fn create_returns_the_new_record_id() -> Result<()> {
    let server = session_server().await;

    Mock::given(method("POST"))
        .and(path("/tables/contacts/records"))
        .and(body_json(json!({"fields": {"name": "Ada", "source_id": "pg-1"}})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"id": "fm-9"})))
        .mount(&server)
        .await;

    let store = store(&server);
    let lease = store.open().await?;

    let mut fields = FieldMap::new();
    fields.insert("name".to_string(), json!("Ada"));
    fields.insert("source_id".to_string(), json!("pg-1"));

    let id = store.create("contacts", &fields).await?;
    assert_eq!(id, "fm-9");

    lease.close().await.ok();
    Ok(())
}

#[tokio::test]
async fn update_and_delete_map_missing_records_to_not_found() -> Result<()> {
    let server = session_server().await;

    Mock::given(method("PATCH"))
        .and(path("/tables/contacts/records/fm-404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/tables/contacts/records/fm-404"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/tables/contacts/records/fm-1"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let store = store(&server);
    let lease = store.open().await?;

    let err = store
        .update("contacts", "fm-404", &FieldMap::new())
        .await
        .unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));

    let err = store.delete("contacts", "fm-404").await.unwrap_err();
    assert!(matches!(err, StoreError::NotFound { .. }));

    store.delete("contacts", "fm-1").await?;

    lease.close().await.ok();
    Ok(())
}

#[tokio::test]
async fn api_errors_carry_status_and_truncated_body() -> Result<()> {
    let server = session_server().await;

    Mock::given(method("GET"))
        .and(path("/tables/contacts/records"))
        .respond_with(ResponseTemplate::new(500).set_body_string("x".repeat(500)))
        .mount(&server)
        .await;

    let store = store(&server);
    let lease = store.open().await?;

    let err = store.snapshot("contacts").await.unwrap_err();
    match err {
        StoreError::Api { status, message } => {
            assert_eq!(status, 500);
            assert!(message.ends_with("..."));
            assert!(message.chars().count() <= 203);
        }
        other => panic!("unexpected error {other:?}"),
    }

    lease.close().await.ok();
    Ok(())
}

#[tokio::test]
async fn malformed_payloads_are_reported_as_such() -> Result<()> {
    let server = session_server().await;

    Mock::given(method("GET"))
        .and(path("/tables/contacts/records"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let store = store(&server);
    let lease = store.open().await?;

    let err = store.snapshot("contacts").await.unwrap_err();
    assert!(matches!(err, StoreError::Malformed { .. }));

    lease.close().await.ok();
    Ok(())
}

#[tokio::test]
async fn closing_the_lease_releases_the_token() -> Result<()> {
    let server = session_server().await;

    Mock::given(method("DELETE"))
        .and(path("/sessions/tok-1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = store(&server);
    let lease = store.open().await?;
    lease.close().await?;

    // The token is gone; further requests fail before reaching the wire.
    let err = store.snapshot("contacts").await.unwrap_err();
    assert!(matches!(err, StoreError::Session { .. }));

    Ok(())
}
