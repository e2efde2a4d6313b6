//! Apollo Client Sync Tests
//!
//! Runs the notification/pull protocol against a mock Apollo config service.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use batata_apollo_client::{
    ApolloClient, ApolloConfig, CacheStore, ClientConfig, ClientError, FnChangeListener,
    PollResult,
};
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const APP_ID: &str = "app1";

fn create_client(server: &MockServer, namespaces: &[&str], save_dir: &TempDir) -> ApolloClient {
    let config = ClientConfig::new(
        &server.uri(),
        APP_ID,
        namespaces.iter().copied(),
        save_dir.path(),
    );
    ApolloClient::new(config).unwrap()
}

fn notifications_body(entries: &[(&str, i64)]) -> serde_json::Value {
    json!(
        entries
            .iter()
            .map(|(ns, id)| json!({"namespaceName": ns, "notificationId": id}))
            .collect::<Vec<_>>()
    )
}

fn config_body(namespace: &str, release_key: &str, pairs: serde_json::Value) -> serde_json::Value {
    json!({
        "appId": APP_ID,
        "cluster": "default",
        "namespaceName": namespace,
        "releaseKey": release_key,
        "configurations": pairs,
    })
}

async fn mount_notifications(server: &MockServer, entries: &[(&str, i64)]) {
    Mock::given(method("GET"))
        .and(path("/notifications/v2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(notifications_body(entries)))
        .mount(server)
        .await;
}

fn seed_cache(dir: &TempDir, namespace: &str, release_key: &str) -> Vec<u8> {
    let store = CacheStore::new(dir.path());
    let config = ApolloConfig {
        app_id: APP_ID.to_string(),
        cluster: "default".to_string(),
        namespace_name: namespace.to_string(),
        release_key: release_key.to_string(),
        configurations: [("timeout".to_string(), "10".to_string())].into(),
    };
    store.write(namespace, &config).unwrap();
    std::fs::read(store.config_file(namespace)).unwrap()
}

// ============== Scenarios ==============

#[tokio::test]
async fn test_changed_namespace_is_pulled_and_acknowledged() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/notifications/v2"))
        .and(query_param("appId", APP_ID))
        .and(query_param("cluster", "default"))
        .and(query_param(
            "notifications",
            r#"[{"namespaceName":"application","notificationId":-1}]"#,
        ))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(notifications_body(&[("application", 5)])),
        )
        .expect(1)
        .mount(&server)
        .await;

    Mock::given(method("GET"))
        .and(path("/configs/app1/default/application"))
        .and(query_param("ip", "127.0.0.1"))
        .and(query_param("releaseKey", ""))
        .respond_with(ResponseTemplate::new(200).set_body_json(config_body(
            "application",
            "abc",
            json!({"timeout": "30"}),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = create_client(&server, &["application"], &dir);
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let listener = FnChangeListener::new(move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    client.run(false, Some(&listener)).await.unwrap();

    let cached = client.cache().read("application").unwrap();
    assert_eq!(cached.release_key, "abc");
    assert_eq!(cached.configurations.len(), 1);
    assert_eq!(cached.configurations["timeout"], "30");
    assert_eq!(client.notification_id("application"), Some(5));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_not_modified_leaves_cache_untouched_but_acknowledges() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let before = seed_cache(&dir, "application", "abc");

    mount_notifications(&server, &[("application", 5)]).await;
    Mock::given(method("GET"))
        .and(path("/configs/app1/default/application"))
        .and(query_param("releaseKey", "abc"))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = create_client(&server, &["application"], &dir);

    let outcome = client.fetch("application").await;
    assert!(outcome.succeeded);
    assert!(!outcome.updated);
    server.reset().await;

    mount_notifications(&server, &[("application", 5)]).await;
    Mock::given(method("GET"))
        .and(path("/configs/app1/default/application"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    let result = client.poll_once().await;
    assert_eq!(
        result,
        PollResult::Changed(BTreeSet::from(["application".to_string()]))
    );

    let after = std::fs::read(client.cache().config_file("application")).unwrap();
    assert_eq!(before, after);
    assert_eq!(client.notification_id("application"), Some(5));
}

#[tokio::test]
async fn test_failed_pull_keeps_id_and_is_retried() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let before = seed_cache(&dir, "application", "old");

    mount_notifications(&server, &[("application", 5)]).await;
    Mock::given(method("GET"))
        .and(path("/configs/app1/default/application"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/configs/app1/default/application"))
        .respond_with(ResponseTemplate::new(200).set_body_json(config_body(
            "application",
            "new",
            json!({"timeout": "60"}),
        )))
        .mount(&server)
        .await;

    let mut client = create_client(&server, &["application"], &dir);

    // Round 1: pull fails
    let result = client.poll_once().await;
    assert_eq!(result, PollResult::Changed(BTreeSet::new()));
    assert_eq!(client.notification_id("application"), Some(-1));
    let after_failure = std::fs::read(client.cache().config_file("application")).unwrap();
    assert_eq!(before, after_failure);

    // Round 2: server still reports 5, so the namespace is pulled again
    let result = client.poll_once().await;
    assert_eq!(
        result,
        PollResult::Changed(BTreeSet::from(["application".to_string()]))
    );
    assert_eq!(client.notification_id("application"), Some(5));
    assert_eq!(client.cache().read_release_key("application"), Some("new".to_string()));
}

#[tokio::test]
async fn test_server_error_on_notifications_stops_run() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/notifications/v2"))
        .respond_with(ResponseTemplate::new(500).set_body_string("apollo down"))
        .mount(&server)
        .await;

    let mut client = create_client(&server, &["application"], &dir);
    assert_eq!(
        client.poll_once().await,
        PollResult::ServerError("apollo down".to_string())
    );

    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let listener = FnChangeListener::new(move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let err = client.run(true, Some(&listener)).await.unwrap_err();
    assert!(matches!(err, ClientError::Server(ref detail) if detail == "apollo down"));
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

// ============== Sync Loop ==============

#[tokio::test]
async fn test_no_change_round() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/notifications/v2"))
        .respond_with(ResponseTemplate::new(304))
        .expect(1)
        .mount(&server)
        .await;

    let mut client = create_client(&server, &["application"], &dir);
    let listener = FnChangeListener::new(|| -> anyhow::Result<()> {
        panic!("listener must not run on 304")
    });

    client.run(false, Some(&listener)).await.unwrap();
    assert_eq!(client.notification_id("application"), Some(-1));
}

#[tokio::test]
async fn test_continuous_run_until_server_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/notifications/v2"))
        .respond_with(ResponseTemplate::new(304))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/notifications/v2"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(notifications_body(&[("application", 3)])),
        )
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/notifications/v2"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/configs/app1/default/application"))
        .respond_with(ResponseTemplate::new(200).set_body_json(config_body(
            "application",
            "r3",
            json!({"a": "1"}),
        )))
        .mount(&server)
        .await;

    let mut client = create_client(&server, &["application"], &dir);
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();
    let listener = FnChangeListener::new(move || {
        calls_clone.fetch_add(1, Ordering::SeqCst);
        Ok(())
    });

    let err = client.run(true, Some(&listener)).await.unwrap_err();
    assert!(matches!(err, ClientError::Server(ref detail) if detail.contains("503")));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(client.notification_id("application"), Some(3));
}

#[tokio::test]
async fn test_listener_error_propagates() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_notifications(&server, &[("application", 1)]).await;
    Mock::given(method("GET"))
        .and(path("/configs/app1/default/application"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;

    let mut client = create_client(&server, &["application"], &dir);
    let listener = FnChangeListener::new(|| -> anyhow::Result<()> {
        Err(anyhow::anyhow!("no config available"))
    });

    let err = client.run(true, Some(&listener)).await.unwrap_err();
    assert!(matches!(err, ClientError::Callback(_)));
    assert!(err.to_string().contains("no config available"));
}

#[tokio::test]
async fn test_run_without_listener() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    mount_notifications(&server, &[("application", 2)]).await;
    Mock::given(method("GET"))
        .and(path("/configs/app1/default/application"))
        .respond_with(ResponseTemplate::new(200).set_body_json(config_body(
            "application",
            "r2",
            json!({}),
        )))
        .mount(&server)
        .await;

    let mut client = create_client(&server, &["application"], &dir);
    client.run(false, None).await.unwrap();
    assert_eq!(client.notification_id("application"), Some(2));
}

// ============== Batch Fetching ==============

#[tokio::test]
async fn test_batch_round_isolates_failures() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let namespaces: Vec<String> = (0..7).map(|i| format!("ns-{}", i)).collect();
    let names: Vec<&str> = namespaces.iter().map(String::as_str).collect();

    let entries: Vec<(&str, i64)> = names.iter().map(|ns| (*ns, 9)).collect();
    mount_notifications(&server, &entries).await;

    for ns in &names {
        let response = if *ns == "ns-3" {
            ResponseTemplate::new(404)
        } else {
            ResponseTemplate::new(200)
                .set_body_json(config_body(ns, &format!("{}-r", ns), json!({"k": *ns})))
                .set_delay(Duration::from_millis(50))
        };
        Mock::given(method("GET"))
            .and(path(format!("/configs/app1/default/{}", ns)))
            .respond_with(response)
            .expect(1)
            .mount(&server)
            .await;
    }

    let mut client = create_client(&server, &names, &dir);
    let result = client.poll_once().await;

    let PollResult::Changed(applied) = result else {
        panic!("expected a change round, got {:?}", result);
    };
    assert_eq!(applied.len(), 6);
    assert!(!applied.contains("ns-3"));
    assert_eq!(client.notification_id("ns-3"), Some(-1));
    assert_eq!(client.notification_id("ns-6"), Some(9));
    assert_eq!(client.cache().load_all().unwrap().len(), 6);
}

#[tokio::test]
async fn test_fetch_many_returns_one_outcome_per_namespace() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/configs/app1/default/a"))
        .respond_with(ResponseTemplate::new(200).set_body_json(config_body("a", "ra", json!({}))))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/configs/app1/default/b"))
        .respond_with(ResponseTemplate::new(304))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/configs/app1/default/c"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
        .mount(&server)
        .await;

    let client = create_client(&server, &["a", "b", "c"], &dir);
    let requested: BTreeSet<String> = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
    let outcomes = client.fetch_many(&requested).await;

    assert_eq!(outcomes.len(), 4);
    assert!(outcomes["a"].succeeded && outcomes["a"].updated);
    assert!(outcomes["b"].succeeded && !outcomes["b"].updated);
    assert!(matches!(outcomes["c"].error, Some(ClientError::Decode(_))));
    assert!(matches!(
        outcomes["d"].error,
        Some(ClientError::ServerRejected { status: 404, .. })
    ));
    assert_eq!(client.cache().read_release_key("c"), None);

    let empty = client.fetch_many(&BTreeSet::new()).await;
    assert!(empty.is_empty());
}

#[tokio::test]
async fn test_fetch_many_honours_configured_concurrency() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let namespaces: Vec<String> = (0..6).map(|i| format!("ns-{}", i)).collect();

    for ns in &namespaces {
        Mock::given(method("GET"))
            .and(path(format!("/configs/app1/default/{}", ns)))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(config_body(ns, "r1", json!({"k": "v"})))
                    .set_delay(Duration::from_millis(150)),
            )
            .expect(1)
            .mount(&server)
            .await;
    }

    let config = ClientConfig::new(&server.uri(), APP_ID, namespaces.iter().cloned(), dir.path())
        .with_fetch_concurrency(2);
    let client = ApolloClient::new(config).unwrap();
    let requested: BTreeSet<String> = namespaces.iter().cloned().collect();

    let started = Instant::now();
    let outcomes = client.fetch_many(&requested).await;
    let elapsed = started.elapsed();

    assert_eq!(outcomes.len(), 6);
    assert!(outcomes.values().all(|o| o.succeeded && o.updated));
    // Two at a time means three waves of delayed responses
    assert!(elapsed >= Duration::from_millis(450), "took {:?}", elapsed);
}

// ============== Storage ==============

#[tokio::test]
async fn test_storage_failure_keeps_id_and_reports_error() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "x").unwrap();

    mount_notifications(&server, &[("application", 5)]).await;
    Mock::given(method("GET"))
        .and(path("/configs/app1/default/application"))
        .respond_with(ResponseTemplate::new(200).set_body_json(config_body(
            "application",
            "abc",
            json!({"timeout": "30"}),
        )))
        .mount(&server)
        .await;

    let config = ClientConfig::new(&server.uri(), APP_ID, ["application"], &blocker);
    let mut client = ApolloClient::new(config).unwrap();

    assert_eq!(client.poll_once().await, PollResult::Changed(BTreeSet::new()));
    assert_eq!(client.notification_id("application"), Some(-1));

    let outcome = client.fetch("application").await;
    assert!(!outcome.succeeded);
    assert!(matches!(
        outcome.error,
        Some(ClientError::StorageWrite { ref namespace, .. }) if namespace == "application"
    ));
}

// ============== Transport ==============

#[tokio::test]
async fn test_unreachable_server() {
    let dir = TempDir::new().unwrap();
    let config = ClientConfig::new("http://127.0.0.1:1", APP_ID, ["application"], dir.path())
        .with_pull_timeout(2)
        .with_interval_timeout(2);
    let mut client = ApolloClient::new(config).unwrap();

    let outcome = client.fetch("application").await;
    assert!(!outcome.succeeded);
    assert!(outcome.error.as_ref().is_some_and(|e| e.is_transport()));

    assert!(matches!(client.poll_once().await, PollResult::ServerError(_)));
}

#[tokio::test]
async fn test_long_poll_timeout_is_reported() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/notifications/v2"))
        .respond_with(ResponseTemplate::new(304).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let config = ClientConfig::new(&server.uri(), APP_ID, ["application"], dir.path())
        .with_interval_timeout(1);
    let mut client = ApolloClient::new(config).unwrap();

    assert!(matches!(client.poll_once().await, PollResult::ServerError(_)));
}

#[tokio::test]
async fn test_custom_cluster_and_ip() {
    let server = MockServer::start().await;
    let dir = TempDir::new().unwrap();

    Mock::given(method("GET"))
        .and(path("/configs/app1/sh/application"))
        .and(query_param("ip", "10.1.2.3"))
        .respond_with(ResponseTemplate::new(200).set_body_json(config_body(
            "application",
            "gray",
            json!({"flag": "on"}),
        )))
        .expect(1)
        .mount(&server)
        .await;

    let config = ClientConfig::new(&server.uri(), APP_ID, ["application"], dir.path())
        .with_cluster("sh")
        .with_client_ip("10.1.2.3");
    let client = ApolloClient::new(config).unwrap();

    let outcome = client.fetch("application").await;
    assert!(outcome.updated);
    assert_eq!(client.cache().read_release_key("application"), Some("gray".to_string()));
}
