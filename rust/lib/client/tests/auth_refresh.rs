//! Credential headers and the refresh-and-retry cycle, over real HTTP.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Arc;

use crm_client::storage::{keys, SessionStorage};
use crm_client::{ApiError, ApiRequest, ListQuery};

use common::*;

const SIGNED_IN: &[(&str, &str)] = &[
    (keys::ACCESS_TOKEN, ACCESS_1),
    (keys::REFRESH_TOKEN, REFRESH_1),
    (keys::ORG_ID, "3"),
];

const EXPIRED: &[(&str, &str)] = &[
    (keys::ACCESS_TOKEN, "expired"),
    (keys::REFRESH_TOKEN, REFRESH_1),
    (keys::ORG_ID, "3"),
];

#[tokio::test]
async fn attaches_bearer_and_org_headers() {
    let server = start_mock_server().await;
    let (_, crm) = server.client(SIGNED_IN);

    crm.leads().list(&ListQuery::new()).await.unwrap();

    assert_eq!(server.state.auth_headers(), vec![Some(format!("Bearer {}", ACCESS_1))]);
    assert_eq!(server.state.org_headers(), vec![Some("3".to_string())]);
    assert_eq!(server.state.refresh_hits(), 0);
}

#[tokio::test]
async fn no_headers_without_session() {
    let server = start_mock_server().await;
    let (_, crm) = server.client(&[]);

    let err = crm.leads().list(&ListQuery::new()).await.unwrap_err();
    // No refresh token either, so the refresh attempt fails locally.
    assert!(matches!(err, ApiError::SessionExpired(_)), "got: {:?}", err);
    assert_eq!(server.state.auth_headers(), vec![None]);
    assert_eq!(server.state.org_headers(), vec![None]);
    assert_eq!(server.state.refresh_hits(), 0);
}

#[tokio::test]
async fn expired_token_is_refreshed_and_retried_once() {
    let server = start_mock_server().await;
    let (storage, crm) = server.client(EXPIRED);

    let lead = crm.leads().get(5i64).await.unwrap();
    assert_eq!(lead.title.as_deref(), Some("Renewal"));

    assert_eq!(server.state.refresh_hits(), 1);
    assert_eq!(
        server.state.auth_headers(),
        vec![Some("Bearer expired".to_string()), Some(format!("Bearer {}", ACCESS_2))]
    );
    assert_eq!(storage.get(keys::ACCESS_TOKEN).as_deref(), Some(ACCESS_2));

    // Subsequent requests use the new token directly.
    crm.leads().get(6i64).await.unwrap();
    assert_eq!(server.state.refresh_hits(), 1);
    assert_eq!(server.state.protected_hits(), 3);
}

#[tokio::test]
async fn retried_request_is_not_retried_again() {
    let server = start_mock_server().await;
    let (storage, crm) = server.client(SIGNED_IN);

    let err = crm.api().send(&ApiRequest::get("locked/")).await.unwrap_err();
    match err {
        ApiError::Unauthorized(msg) => assert!(msg.contains("locked"), "got: {}", msg),
        other => panic!("expected Unauthorized, got: {:?}", other),
    }
    assert_eq!(server.state.protected_hits(), 2);
    assert_eq!(server.state.refresh_hits(), 1);
    // The refresh itself succeeded, so the session is kept.
    assert_eq!(storage.get(keys::ACCESS_TOKEN).as_deref(), Some(ACCESS_2));
}

#[tokio::test]
async fn failed_refresh_clears_session_and_redirects() {
    let server = start_mock_server().await;
    server.state.refresh_ok.store(false, Ordering::SeqCst);

    let redirect = Arc::new(RecordingRedirect::default());
    let mut seeded = EXPIRED.to_vec();
    seeded.push((keys::THEME, "dark"));
    let (storage, crm) = server.client_with_redirect(&seeded, redirect.clone());

    let err = crm.leads().list(&ListQuery::new()).await.unwrap_err();
    assert!(matches!(err, ApiError::SessionExpired(_)), "got: {:?}", err);
    assert_eq!(redirect.reasons.lock().unwrap().len(), 1);

    for key in keys::SESSION {
        assert!(storage.get(key).is_none(), "{} should be cleared", key);
    }
    assert_eq!(storage.get(keys::THEME).as_deref(), Some("dark"));
    assert!(!crm.session().is_authenticated());

    // Later requests carry no stale credentials.
    let _ = crm.leads().list(&ListQuery::new()).await;
    let headers = server.state.auth_headers();
    assert_eq!(headers.last().unwrap(), &None);
    assert_eq!(server.state.org_headers().last().unwrap(), &None);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_401s_share_one_refresh() {
    let server = start_mock_server().await;
    let (storage, crm) = server.client(EXPIRED);

    let mut handles = Vec::new();
    for id in 1..=8i64 {
        let leads = crm.leads();
        handles.push(tokio::spawn(async move { leads.get(id).await }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(server.state.refresh_hits(), 1);
    assert_eq!(storage.get(keys::ACCESS_TOKEN).as_deref(), Some(ACCESS_2));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_401s_share_one_failed_refresh() {
    let server = start_mock_server().await;
    server.state.refresh_ok.store(false, Ordering::SeqCst);
    let redirect = Arc::new(RecordingRedirect::default());
    let (storage, crm) = server.client_with_redirect(EXPIRED, redirect.clone());

    let mut handles = Vec::new();
    for id in 1..=8i64 {
        let leads = crm.leads();
        handles.push(tokio::spawn(async move { leads.get(id).await }));
    }
    for handle in handles {
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, ApiError::SessionExpired(_)), "got: {:?}", err);
    }

    assert_eq!(server.state.refresh_hits(), 1);
    assert!(!redirect.reasons.lock().unwrap().is_empty());
    assert!(storage.get(keys::ACCESS_TOKEN).is_none());
    assert!(storage.get(keys::REFRESH_TOKEN).is_none());
}
