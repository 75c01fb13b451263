//! Integration tests for the HTTP remote store against a mock server.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use progress_sync_core::record::Achievement;
use progress_sync_core::{
    HttpRemoteConfig, HttpRemoteStore, LocalStore, RemoteStore, SyncConfig, SyncError,
    SyncOrchestrator, SyncOutcome, UserRecord,
};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn store_for(server: &MockServer) -> HttpRemoteStore {
    HttpRemoteStore::new(&HttpRemoteConfig {
        base_url: format!("{}/api", server.uri()),
        user_agent: Some("progress-sync-tests".to_string()),
    })
    .expect("valid base url")
}

// =============================================================================
// Connectivity
// =============================================================================

mod ping {
    use super::*;

    #[tokio::test]
    async fn test_ping_ok() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/ping"))
            .respond_with(ResponseTemplate::new(200).set_body_string("pong"))
            .expect(1)
            .mount(&server)
            .await;

        store_for(&server).ping().await.unwrap();
    }

    #[tokio::test]
    async fn test_ping_server_error_is_connectivity() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/ping"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = store_for(&server).ping().await;
        assert!(matches!(result, Err(SyncError::Connectivity(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connectivity() {
        let store = HttpRemoteStore::new(&HttpRemoteConfig {
            base_url: "http://127.0.0.1:1/api".to_string(),
            user_agent: None,
        })
        .expect("valid base url");

        assert!(matches!(store.exists("u1").await, Err(SyncError::Connectivity(_))));
        assert!(matches!(store.download("u1").await, Err(SyncError::Connectivity(_))));
        assert!(matches!(
            store.upload("u1", &UserRecord::new(), "dev-1").await,
            Err(SyncError::Connectivity(_))
        ));
    }
}

// =============================================================================
// User record endpoints
// =============================================================================

mod records {
    use super::*;

    #[tokio::test]
    async fn test_exists() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/u1/exists"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "exists": true,
                "lastModified": "2024-03-01T08:00:00.000Z"
            })))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/users/u2/exists"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({ "success": true, "exists": false })),
            )
            .mount(&server)
            .await;

        let store = store_for(&server);
        assert!(store.exists("u1").await.unwrap());
        assert!(!store.exists("u2").await.unwrap());
    }

    #[tokio::test]
    async fn test_unsuccessful_body_carries_server_message() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/u1/exists"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": "user store unavailable"
            })))
            .mount(&server)
            .await;

        let result = store_for(&server).exists("u1").await;
        assert_eq!(
            result,
            Err(SyncError::RemoteOperation("user store unavailable".to_string()))
        );
    }

    #[tokio::test]
    async fn test_download_not_found_is_empty() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/u1/data"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "success": false,
                "error": "User data not found"
            })))
            .mount(&server)
            .await;

        assert_eq!(store_for(&server).download("u1").await, Ok(None));
    }

    #[tokio::test]
    async fn test_download_rehydrates_dates() {
        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/u1/data"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": {
                    "goals": [{
                        "id": "g1",
                        "title": "Run",
                        "completedDates": ["2024-02-29T07:30:00.000Z"],
                        "lastUpdated": { "_seconds": 1709280000, "_nanoseconds": 0 }
                    }],
                    "achievements": [{ "id": "a1", "earnedAt": 1709280000000i64 }],
                    "deviceId": "device_1_abcdefghi"
                },
                "lastModified": "2024-03-01T08:00:00.000Z"
            })))
            .mount(&server)
            .await;

        let record = store_for(&server).download("u1").await.unwrap().unwrap();

        let goal = record.goals.get("g1").unwrap();
        assert_eq!(goal.last_updated, t0);
        assert_eq!(goal.completed_dates.len(), 1);
        assert_eq!(record.achievements.get("a1").unwrap().earned_at, Some(t0));
        assert_eq!(record.last_modified, Some(t0));
        assert_eq!(record.device_id.as_deref(), Some("device_1_abcdefghi"));
    }

    #[tokio::test]
    async fn test_download_malformed_body() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/users/u1/data"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        match store_for(&server).download("u1").await {
            Err(SyncError::RemoteOperation(message)) => assert!(message.starts_with("malformed")),
            other => panic!("expected malformed response error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_upload_wraps_record_and_device() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/users/u1/data"))
            .and(body_partial_json(json!({
                "userData": { "deviceId": "dev-1" }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "lastModified": "2024-03-01T08:00:00.000Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap();
        let mut record = UserRecord::new();
        record.add_achievement(Achievement::earned("a1", t0));

        let written = store_for(&server).upload("u1", &record, "dev-1").await.unwrap();
        assert_eq!(written, Some(t0));
    }
}

// =============================================================================
// Orchestrator over HTTP
// =============================================================================

#[tokio::test]
async fn test_first_sync_uploads_over_http() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/ping"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/api/users/u1/exists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "exists": false })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/users/u1/data"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "success": true,
            "lastModified": "2024-03-01T08:00:00.000Z"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let orchestrator = SyncOrchestrator::new(
        Arc::new(store_for(&server)),
        LocalStore::in_memory(),
        SyncConfig::default(),
    );

    let outcome = orchestrator
        .sync_user_data("u1", UserRecord::new(), &CancellationToken::new())
        .await;

    assert!(matches!(outcome, SyncOutcome::Synced(_)));
    assert!(!orchestrator.has_pending_changes("u1"));
}
