//! E2E tests for the complete GitHub sign-in flow through the client SDK

mod common;

use authdemo::client::{AuthApi, AuthClient, ClientError};
use common::{
    MOCK_ACCESS_TOKEN, MOCK_GITHUB_EMAIL, MOCK_GITHUB_ID, MOCK_GITHUB_NAME, TestServer,
    browser_client, location, query_param,
};

/// Sign in through the mock GitHub and return the callback's redirect target
async fn sign_in(server: &TestServer, auth: &AuthClient, http: &reqwest::Client) -> String {
    let redirect = auth
        .sign_in_social("github", "/demo/auth")
        .await
        .expect("sign-in starts");
    assert!(redirect.redirect);

    // The provider sends the browser back with the state and a code
    let state = query_param(&redirect.url, "state").expect("state in authorize url");
    let response = http
        .get(server.url("/api/auth/callback/github"))
        .query(&[("state", state.as_str()), ("code", "mock-code")])
        .send()
        .await
        .expect("callback request succeeds");
    assert!(response.status().is_redirection());
    location(&response)
}

#[tokio::test]
async fn test_full_sign_in_and_sign_out() {
    let server = TestServer::new().await;
    let http = browser_client();
    let auth = AuthClient::with_http_client(&server.addr, http.clone());

    assert!(auth.get_session().await.expect("session read").is_none());

    let target = sign_in(&server, &auth, &http).await;
    assert_eq!(target, "/demo/auth");

    let session = auth
        .get_session()
        .await
        .expect("session read")
        .expect("signed in");
    assert_eq!(session.user.email, MOCK_GITHUB_EMAIL);
    assert_eq!(session.user.name, MOCK_GITHUB_NAME);
    assert!(session.user.email_verified);
    assert_eq!(
        session.user.image.as_deref(),
        Some("https://avatars.example.com/u/583231")
    );
    assert_eq!(session.session.user_id, session.user.id);
    assert!(session.session.expires_at > chrono::Utc::now());

    let account = server
        .state
        .db
        .get_account("github", &MOCK_GITHUB_ID.to_string())
        .await
        .expect("account lookup")
        .expect("account linked");
    assert_eq!(account.user_id, session.user.id);
    assert_eq!(account.access_token.as_deref(), Some(MOCK_ACCESS_TOKEN));

    auth.sign_out().await.expect("sign-out succeeds");
    assert!(auth.get_session().await.expect("session read").is_none());
}

#[tokio::test]
async fn test_repeat_sign_in_reuses_user() {
    let server = TestServer::new().await;

    let first_http = browser_client();
    let first = AuthClient::with_http_client(&server.addr, first_http.clone());
    sign_in(&server, &first, &first_http).await;
    let first_session = first.get_session().await.unwrap().unwrap();

    let second_http = browser_client();
    let second = AuthClient::with_http_client(&server.addr, second_http.clone());
    sign_in(&server, &second, &second_http).await;
    let second_session = second.get_session().await.unwrap().unwrap();

    assert_eq!(first_session.user.id, second_session.user.id);
    assert_ne!(first_session.session.token, second_session.session.token);

    // Signing out one browser leaves the other signed in
    second.sign_out().await.unwrap();
    assert!(second.get_session().await.unwrap().is_none());
    assert!(first.get_session().await.unwrap().is_some());
}

#[tokio::test]
async fn test_session_cookie_carries_request_metadata() {
    let server = TestServer::new().await;
    let http = browser_client();
    let auth = AuthClient::with_http_client(&server.addr, http.clone());

    let redirect = auth.sign_in_social("github", "/").await.unwrap();
    let state = query_param(&redirect.url, "state").unwrap();
    http.get(server.url("/api/auth/callback/github"))
        .query(&[("state", state.as_str()), ("code", "mock-code")])
        .header("user-agent", "e2e-browser/1.0")
        .header("x-forwarded-for", "203.0.113.9")
        .send()
        .await
        .unwrap();

    let session = auth.get_session().await.unwrap().unwrap();
    assert_eq!(session.session.user_agent.as_deref(), Some("e2e-browser/1.0"));
    assert_eq!(session.session.ip_address.as_deref(), Some("203.0.113.9"));
}

#[tokio::test]
async fn test_client_reports_server_error_message() {
    let server = TestServer::new().await;
    let auth = AuthClient::new(&server.addr).expect("client builds");

    let error = auth
        .sign_in_social("gitlab", "/")
        .await
        .expect_err("unknown provider is rejected");

    match error {
        ClientError::Api { status, code, message } => {
            assert_eq!(status, 404);
            assert_eq!(code.as_deref(), Some("PROVIDER_NOT_FOUND"));
            assert!(message.unwrap_or_default().contains("gitlab"));
        }
        other => panic!("unexpected error: {other}"),
    }
}
