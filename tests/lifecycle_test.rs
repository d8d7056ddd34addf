//! End-to-end lifecycle tests against the mock adapters.

mod common;

use std::time::Duration;

use accessh_daemon::adapters::mock::MockResponse;
use accessh_daemon::daemon::{LifecycleSettings, LifecycleState, RetryPolicy};
use accessh_daemon::error::{AuthError, DaemonError, HubError, KeyFileError};
use accessh_daemon::keys::{REGION_FOOTER, REGION_HEADER};
use accessh_daemon::traits::HttpError;
use common::*;
use serde_json::json;

fn secs(values: &[u64]) -> Vec<Duration> {
    values.iter().copied().map(Duration::from_secs).collect()
}

#[tokio::test]
async fn test_transient_auth_failures_back_off_then_connect() {
    let mut harness = Harness::start(&managed_file(&[]), LifecycleSettings::default(), |http, _| {
        for _ in 0..3 {
            http.queue_response(
                &auth_url(),
                MockResponse::Error(HttpError::Timeout("timed out".to_string())),
            );
        }
        http.set_response(&auth_url(), jwt_response("jwt-1"));
    });

    harness.wait_connected().await;

    assert_eq!(harness.scheduler.delays(), secs(&[10, 30, 60]));
    assert_eq!(harness.http.get_requests().len(), 4);
    let calls = harness.connector.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].hub_url, HUB_URL);
    assert_eq!(calls[0].access_token, "jwt-1");

    assert_eq!(harness.shutdown().await.exit_code(), 0);
}

#[tokio::test]
async fn test_transient_connect_failure_retries() {
    let mut harness = Harness::start(&managed_file(&[]), LifecycleSettings::default(), |http, hub| {
        http.set_response(&auth_url(), jwt_response("jwt-1"));
        hub.fail_next(HubError::Timeout { secs: 100 });
    });

    harness.wait_connected().await;

    assert_eq!(harness.scheduler.delays(), secs(&[10]));
    assert_eq!(harness.connector.calls().len(), 2);
    assert_eq!(harness.http.get_requests().len(), 1);

    harness.shutdown().await;
}

#[tokio::test]
async fn test_removed_action_clears_region_and_exits() {
    let mut harness = Harness::connected_default(&managed_file(&["old-key"]));
    let channel = harness.wait_connected().await;

    channel
        .invoke("InitKeys", vec![json!(["k1", "k2"])])
        .await
        .unwrap();
    channel.invoke("ServerActions", vec![json!(3)]).await.unwrap();

    let exit = harness.exit().await;
    assert_eq!(exit.exit_code(), 3);
    assert!(matches!(
        exit.error(),
        Some(DaemonError::ServerRequestedShutdown { .. })
    ));

    assert_eq!(harness.content(), managed_file(&[]));
    assert!(harness.scheduler.delays().is_empty());
    assert!(channel.is_closed());
    assert_eq!(harness.handle.state(), LifecycleState::Terminated);
}

#[tokio::test]
async fn test_logout_action_exits() {
    let mut harness = Harness::connected_default(&managed_file(&[]));
    let channel = harness.wait_connected().await;

    channel.invoke("ServerActions", vec![json!(2)]).await.unwrap();

    assert_eq!(harness.exit().await.exit_code(), 3);
}

#[tokio::test]
async fn test_reconnect_action_reauthenticates_after_delay() {
    let mut harness = Harness::start(&managed_file(&[]), LifecycleSettings::default(), |http, _| {
        http.queue_response(&auth_url(), jwt_response("jwt-1"));
        http.set_response(&auth_url(), jwt_response("jwt-2"));
    });
    let first = harness.wait_connected().await;

    first.invoke("ServerActions", vec![json!(1)]).await.unwrap();

    let connector = harness.connector.clone();
    eventually("second connect", || connector.calls().len() == 2).await;

    assert!(first.is_closed());
    assert_eq!(harness.connector.calls()[1].access_token, "jwt-2");
    assert_eq!(harness.scheduler.delays(), secs(&[60]));
    assert_eq!(harness.http.get_requests().len(), 2);

    assert_eq!(
        harness.handle.wait_for(LifecycleState::Connected).await,
        LifecycleState::Connected
    );
    assert_eq!(harness.shutdown().await.exit_code(), 0);
}

#[tokio::test]
async fn test_connection_loss_reauthenticates_after_delay() {
    let mut harness = Harness::connected_default(&managed_file(&["kept"]));
    let first = harness.wait_connected().await;

    first.drop_connection(Some("server restarting")).await.unwrap();

    let connector = harness.connector.clone();
    eventually("reconnect", || connector.calls().len() == 2).await;
    assert_eq!(harness.scheduler.delays(), secs(&[60]));
    assert_eq!(harness.http.get_requests().len(), 2);

    // Keys are kept across a reconnect.
    assert_eq!(harness.content(), managed_file(&["kept"]));

    harness.shutdown().await;
}

#[tokio::test]
async fn test_rejected_authentication_exits_without_connecting() {
    let mut harness = Harness::start(&managed_file(&["k"]), LifecycleSettings::default(), |http, _| {
        http.set_response(
            &auth_url(),
            MockResponse::json(401, json!({"messages": ["Invalid token"]})),
        );
    });

    let exit = harness.exit().await;
    assert_eq!(exit.exit_code(), 4);
    match exit.error() {
        Some(DaemonError::Auth(AuthError::Rejected {
            status, messages, ..
        })) => {
            assert_eq!(*status, 401);
            assert_eq!(messages, &vec!["Invalid token".to_string()]);
        }
        other => panic!("unexpected exit: {:?}", other),
    }

    assert!(harness.connector.calls().is_empty());
    assert!(harness.scheduler.delays().is_empty());
    assert_eq!(harness.content(), managed_file(&[]));
}

#[tokio::test]
async fn test_unauthorized_connect_exits() {
    let mut harness = Harness::start(&managed_file(&[]), LifecycleSettings::default(), |http, hub| {
        http.set_response(&auth_url(), jwt_response("jwt-1"));
        hub.fail_next(HubError::Unauthorized { status: 401 });
    });

    let exit = harness.exit().await;
    assert_eq!(exit.exit_code(), 4);
    assert_eq!(harness.connector.calls().len(), 1);
    assert!(harness.scheduler.delays().is_empty());
}

#[tokio::test]
async fn test_authentication_status_false_exits() {
    let mut harness = Harness::connected_default(&managed_file(&[]));
    let channel = harness.wait_connected().await;

    channel
        .invoke(
            "AuthenticationStatus",
            vec![json!(false), json!({"messages": ["token revoked"]})],
        )
        .await
        .unwrap();

    let exit = harness.exit().await;
    assert_eq!(exit.exit_code(), 4);
}

#[tokio::test]
async fn test_server_error_exits() {
    let mut harness = Harness::connected_default(&managed_file(&["k"]));
    let channel = harness.wait_connected().await;

    channel
        .invoke("Error", vec![json!({"messages": ["server deleted"]})])
        .await
        .unwrap();

    let exit = harness.exit().await;
    assert_eq!(exit.exit_code(), 3);
    match exit.error() {
        Some(DaemonError::ServerRequestedShutdown { reason }) => {
            assert!(reason.contains("server deleted"));
        }
        other => panic!("unexpected exit: {:?}", other),
    }
    assert_eq!(harness.content(), managed_file(&[]));
}

#[tokio::test]
async fn test_missing_region_is_fatal() {
    let mut harness = Harness::connected_default(&format!("{}\n", OUTSIDE_KEY));
    let channel = harness.wait_connected().await;

    channel.invoke("AddKeys", vec![json!(["k"])]).await.unwrap();

    let exit = harness.exit().await;
    assert_eq!(exit.exit_code(), 1);
    assert!(matches!(
        exit.error(),
        Some(DaemonError::KeyFile(KeyFileError::RegionNotFound { .. }))
    ));
}

#[tokio::test]
async fn test_get_keys_sent_when_enabled() {
    let settings = LifecycleSettings {
        request_keys_on_connect: true,
        ..LifecycleSettings::default()
    };
    let mut harness = Harness::start(&managed_file(&[]), settings, |http, _| {
        http.set_response(&auth_url(), jwt_response("jwt-1"));
    });
    let channel = harness.wait_connected().await;

    let probe = channel.clone();
    eventually("GetKeys request", || !probe.sent().is_empty()).await;
    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].target, "GetKeys");
    assert!(sent[0].arguments.is_empty());

    harness.shutdown().await;
}

#[tokio::test]
async fn test_get_keys_not_sent_by_default() {
    let mut harness = Harness::connected_default(&managed_file(&[]));
    let channel = harness.wait_connected().await;
    assert!(channel.sent().is_empty());
    harness.shutdown().await;
}

#[tokio::test]
async fn test_retry_budget_exhausted() {
    let settings = LifecycleSettings {
        retry: RetryPolicy::new(secs(&[10, 30]), 3),
        ..LifecycleSettings::default()
    };
    let mut harness = Harness::start(&managed_file(&[]), settings, |http, _| {
        http.set_response(
            &auth_url(),
            MockResponse::Error(HttpError::ConnectionFailed("refused".to_string())),
        );
    });

    let exit = harness.exit().await;
    assert_eq!(exit.exit_code(), 1);
    assert!(matches!(
        exit.error(),
        Some(DaemonError::Auth(AuthError::NetworkTransient { .. }))
    ));
    assert_eq!(harness.scheduler.delays(), secs(&[10, 30]));
    assert_eq!(harness.http.get_requests().len(), 3);
    assert!(harness.connector.calls().is_empty());
}

#[tokio::test]
async fn test_shutdown_clears_region_after_queued_writes() {
    let mut harness = Harness::connected_default(&managed_file(&["old"]));
    let channel = harness.wait_connected().await;

    channel.invoke("AddKeys", vec![json!(["new"])]).await.unwrap();
    let path = harness.path.clone();
    eventually("key written", || {
        std::fs::read_to_string(&path).unwrap() == managed_file(&["new", "old"])
    })
    .await;

    let exit = harness.shutdown().await;
    assert_eq!(exit.exit_code(), 0);
    assert!(exit.error().is_none());

    let content = harness.content();
    assert!(content.starts_with(OUTSIDE_KEY));
    assert!(content.contains(&format!("{}\n{}", REGION_HEADER, REGION_FOOTER)));
    assert!(channel.is_closed());
    assert!(harness.scheduler.is_stopped());
}

#[tokio::test]
async fn test_key_commands_applied_in_order() {
    let mut harness = Harness::connected_default(&managed_file(&[]));
    let channel = harness.wait_connected().await;

    channel.invoke("AddKeys", vec![json!(["a"])]).await.unwrap();
    channel.invoke("RemoveKeys", vec![json!(["a"])]).await.unwrap();
    channel.invoke("AddKeys", vec![json!(["b"])]).await.unwrap();

    let path = harness.path.clone();
    eventually("final key set", || {
        std::fs::read_to_string(&path).unwrap() == managed_file(&["b"])
    })
    .await;

    harness.shutdown().await;
}
