//! AuthenticatedClient refresh-and-retry behavior against a scripted
//! backend: the success path, session teardown, and the single-refresh
//! de-duplication property.

mod common;

use common::{FakeBackend, RefreshMode};
use dhaba_client::backend::ApiRequest;
use dhaba_client::client::AuthenticatedClient;
use dhaba_client::error::ClientError;
use dhaba_client::models::TokenPair;
use dhaba_client::storage::TokenStore;
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn stale_pair() -> TokenPair {
    TokenPair {
        access_token: "stale-access".to_string(),
        refresh_token: "refresh-0".to_string(),
    }
}

fn client_with_stale_pair(
    backend: FakeBackend,
) -> (Arc<AuthenticatedClient<FakeBackend>>, Arc<TokenStore>) {
    let store = Arc::new(TokenStore::in_memory().unwrap());
    store.save(&stale_pair()).unwrap();
    let client = Arc::new(AuthenticatedClient::new(backend, store.clone()));
    (client, store)
}

#[tokio::test]
async fn test_valid_token_passes_through_without_refresh() {
    let backend = FakeBackend::default();
    let store = Arc::new(TokenStore::in_memory().unwrap());
    store
        .save(&TokenPair {
            access_token: "access-0".to_string(),
            refresh_token: "refresh-0".to_string(),
        })
        .unwrap();
    let client = AuthenticatedClient::new(backend, store);

    let response = client.call(ApiRequest::get("/profile/me")).await.unwrap();

    assert_eq!(response.status, 200);
    assert_eq!(response.body["username"], "ayesha");
}

#[tokio::test]
async fn test_expired_token_refreshes_once_and_retries() {
    let (client, store) = client_with_stale_pair(FakeBackend::default());

    let response = client.call(ApiRequest::get("/profile/me")).await.unwrap();

    assert_eq!(response.status, 200);
    // Store holds the refreshed pair, not the stale one
    let pair = store.load().unwrap();
    assert_eq!(pair.access_token, "access-1");
    assert_eq!(pair.refresh_token, "refresh-0");
}

#[tokio::test]
async fn test_refresh_keeps_rotated_refresh_token() {
    let mut backend = FakeBackend::default();
    backend.rotated_refresh = Some("refresh-rotated".to_string());
    let (client, store) = client_with_stale_pair(backend);

    client.call(ApiRequest::get("/profile/me")).await.unwrap();

    let pair = store.load().unwrap();
    assert_eq!(pair.refresh_token, "refresh-rotated");
}

#[tokio::test]
async fn test_rejected_refresh_ends_session_and_clears_store() {
    let backend = FakeBackend::default();
    backend.set_refresh_mode(RefreshMode::Reject);
    let (client, store) = client_with_stale_pair(backend);

    let err = client.call(ApiRequest::get("/profile/me")).await.unwrap_err();

    assert!(matches!(err, ClientError::SessionExpired));
    assert!(store.load().is_none());
}

#[tokio::test]
async fn test_network_failure_during_refresh_ends_session() {
    let backend = FakeBackend::default();
    backend.set_refresh_mode(RefreshMode::NetworkFail);
    let (client, store) = client_with_stale_pair(backend);

    let err = client.call(ApiRequest::get("/profile/me")).await.unwrap_err();

    assert!(matches!(err, ClientError::SessionExpired));
    assert!(store.load().is_none());
}

#[tokio::test]
async fn test_missing_tokens_end_session_on_unauthorized() {
    let backend = FakeBackend::default();
    let store = Arc::new(TokenStore::in_memory().unwrap());
    let client = AuthenticatedClient::new(backend, store);

    let err = client.call(ApiRequest::get("/profile/me")).await.unwrap_err();

    assert!(matches!(err, ClientError::SessionExpired));
}

#[tokio::test]
async fn test_network_error_on_call_preserves_tokens() {
    let backend = FakeBackend::default();
    backend.set_network_down(true);
    let (client, store) = client_with_stale_pair(backend);

    let err = client.call(ApiRequest::get("/profile/me")).await.unwrap_err();

    // A transport failure is not a session failure
    assert!(matches!(err, ClientError::Network(_)));
    assert_eq!(store.load().unwrap(), stale_pair());
}

#[tokio::test]
async fn test_non_auth_error_statuses_pass_through() {
    let backend = FakeBackend::default();
    let store = Arc::new(TokenStore::in_memory().unwrap());
    store
        .save(&TokenPair {
            access_token: "access-0".to_string(),
            refresh_token: "refresh-0".to_string(),
        })
        .unwrap();
    let client = AuthenticatedClient::new(backend, store);

    let response = client.call(ApiRequest::get("/no/such/path")).await.unwrap();

    // 404 is the caller's problem, not an auth event
    assert_eq!(response.status, 404);
}

#[tokio::test]
async fn test_concurrent_expiry_triggers_exactly_one_refresh() {
    let (client, store) = client_with_stale_pair(FakeBackend::default());

    let calls: Vec<_> = (0..8)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.call(ApiRequest::get("/profile/me")).await })
        })
        .collect();

    for handle in calls {
        let response = handle.await.unwrap().unwrap();
        assert_eq!(response.status, 200);
    }

    // One refresh issued "access-1"; had each caller refreshed on its
    // own the store would hold a later token.
    let pair = store.load().unwrap();
    assert_eq!(pair.access_token, "access-1");
}

#[tokio::test]
async fn test_concurrent_refresh_count_is_one() {
    let backend = Arc::new(FakeBackend::default());
    let store = Arc::new(TokenStore::in_memory().unwrap());
    store.save(&stale_pair()).unwrap();
    let client = Arc::new(AuthenticatedClient::new(backend.clone(), store));

    let calls: Vec<_> = (0..8)
        .map(|_| {
            let client = client.clone();
            tokio::spawn(async move { client.call(ApiRequest::get("/profile/me")).await })
        })
        .collect();
    for handle in calls {
        assert!(handle.await.unwrap().is_ok());
    }

    assert_eq!(backend.refresh_calls.load(Ordering::SeqCst), 1);
}
