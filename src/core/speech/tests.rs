use std::time::Duration;

use bytes::Bytes;
use wiremock::matchers::{header, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;

fn config_for(token_server: &MockServer, endpoint: &str) -> SpeechConfig {
    SpeechConfig {
        token_url: format!("{}/sts/v1.0/issueToken", token_server.uri()),
        endpoint: endpoint.to_string(),
        connect_timeout: Duration::from_secs(2),
        token_timeout: Duration::from_secs(2),
        ..SpeechConfig::default()
    }
}

#[test]
fn test_new_session_is_idle() {
    let session = SpeechSession::new(SubscriptionKey::new("key"), SpeechConfig::default()).unwrap();
    assert_eq!(session.state(), ConnectionState::Idle);
    assert!(!session.is_ready());
    assert!(session.request_id().is_none());
}

#[test]
fn test_connectable_states() {
    assert!(ConnectionState::Idle.can_connect());
    assert!(ConnectionState::Error.can_connect());
    assert!(ConnectionState::Closed.can_connect());
    assert!(!ConnectionState::Authenticating.can_connect());
    assert!(!ConnectionState::Connecting.can_connect());
    assert!(!ConnectionState::Open.can_connect());
    assert_eq!(ConnectionState::Open.to_string(), "open");
}

#[tokio::test]
async fn test_send_audio_before_connect_is_not_ready() {
    let session = SpeechSession::new(SubscriptionKey::new("key"), SpeechConfig::default()).unwrap();
    let result = session.send_audio(Bytes::from_static(&[0u8; 320])).await;
    assert_eq!(result, Err(ConnectionError::NotReady));
    assert_eq!(session.state(), ConnectionState::Idle);
}

#[tokio::test]
async fn test_close_is_idempotent_from_idle() {
    let session = SpeechSession::new(SubscriptionKey::new("key"), SpeechConfig::default()).unwrap();
    session.close().await;
    assert_eq!(session.state(), ConnectionState::Closed);
    session.close().await;
    assert_eq!(session.state(), ConnectionState::Closed);

    let result = session.send_audio(Bytes::from_static(b"pcm")).await;
    assert_eq!(result, Err(ConnectionError::NotReady));
}

#[tokio::test]
async fn test_rejected_key_enters_error_state() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403))
        .expect(1)
        .mount(&server)
        .await;

    let session = SpeechSession::new(
        SubscriptionKey::new("bad-key"),
        config_for(&server, "ws://127.0.0.1:9"),
    )
    .unwrap();

    let result = session.connect().await;
    assert_eq!(
        result,
        Err(ConnectionError::Credential(CredentialError::Rejected { status: 403 }))
    );
    assert_eq!(session.state(), ConnectionState::Error);
    assert!(session.request_id().is_none());
}

#[tokio::test]
async fn test_empty_key_fails_without_request() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("TOKEN"))
        .expect(0)
        .mount(&server)
        .await;

    let session =
        SpeechSession::new(SubscriptionKey::new(""), config_for(&server, "ws://127.0.0.1:9")).unwrap();

    let result = session.connect().await;
    assert_eq!(
        result,
        Err(ConnectionError::Credential(CredentialError::MissingKey))
    );
    assert_eq!(session.state(), ConnectionState::Error);
}

#[tokio::test]
async fn test_unreachable_socket_enters_error_and_allows_retry() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(header(SUBSCRIPTION_KEY_HEADER, "abc123"))
        .respond_with(ResponseTemplate::new(200).set_body_string("TOKEN1"))
        .expect(2)
        .mount(&server)
        .await;

    // Nothing listens on the discard port.
    let session = SpeechSession::new(
        SubscriptionKey::new("abc123"),
        config_for(&server, "ws://127.0.0.1:9"),
    )
    .unwrap();

    let first = session.connect().await;
    assert!(matches!(
        first,
        Err(ConnectionError::SocketFailure(_)) | Err(ConnectionError::Timeout(_))
    ));
    assert_eq!(session.state(), ConnectionState::Error);

    // A fresh token is fetched on every attempt.
    let second = session.connect().await;
    assert!(second.is_err());
    assert_eq!(session.state(), ConnectionState::Error);
}

#[tokio::test]
async fn test_invalid_endpoint_scheme_fails_to_connect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("TOKEN1"))
        .mount(&server)
        .await;

    let session = SpeechSession::new(
        SubscriptionKey::new("abc123"),
        config_for(&server, "https://speech.example.com"),
    )
    .unwrap();

    let result = session.connect().await;
    assert!(matches!(result, Err(ConnectionError::SocketFailure(msg)) if msg.contains("ws://")));
    assert_eq!(session.state(), ConnectionState::Error);
}

#[tokio::test]
async fn test_close_during_token_fetch_cancels_connect() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_string("TOKEN1")
                .set_delay(Duration::from_millis(500)),
        )
        .mount(&server)
        .await;

    let session = std::sync::Arc::new(
        SpeechSession::new(
            SubscriptionKey::new("abc123"),
            config_for(&server, "ws://127.0.0.1:9"),
        )
        .unwrap(),
    );

    let connecting = {
        let session = session.clone();
        tokio::spawn(async move { session.connect().await })
    };

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(session.state(), ConnectionState::Authenticating);
    session.close().await;

    let result = connecting.await.unwrap();
    assert_eq!(result, Err(ConnectionError::Cancelled));
    assert_eq!(session.state(), ConnectionState::Closed);
}
