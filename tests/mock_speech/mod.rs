//! Mock speech service for integration tests
//!
//! Provides:
//! - A wiremock token endpoint issuing `TOKEN1` for the key `abc123`
//! - A local recognition socket that records the handshake and every frame
//!   the client writes, and pushes frames scripted by the test

// Not every test binary uses every helper
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use speech_bridge::core::speech::{SUBSCRIPTION_KEY_HEADER, SpeechConfig};

pub const TEST_KEY: &str = "abc123";
pub const TEST_TOKEN: &str = "TOKEN1";
pub const TOKEN_PATH: &str = "/sts/v1.0/issueToken";

/// Token endpoint that accepts [`TEST_KEY`] and rejects anything else with 401.
pub async fn start_token_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .and(header(SUBSCRIPTION_KEY_HEADER, TEST_KEY))
        .respond_with(ResponseTemplate::new(200).set_body_string(TEST_TOKEN))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(TOKEN_PATH))
        .respond_with(ResponseTemplate::new(401))
        .with_priority(2)
        .mount(&server)
        .await;
    server
}

/// Session settings pointing at the mock token endpoint and socket.
pub fn speech_config(token_server: &MockServer, socket: &MockSpeechSocket) -> SpeechConfig {
    SpeechConfig {
        token_url: format!("{}{}", token_server.uri(), TOKEN_PATH),
        endpoint: socket.endpoint(),
        connect_timeout: Duration::from_secs(5),
        token_timeout: Duration::from_secs(5),
        ..SpeechConfig::default()
    }
}

/// What the client sent on the socket handshake.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    pub uri: String,
    pub authorization: Option<String>,
    pub connection_id: Option<String>,
}

/// Frames the test asks the mock service to send.
#[derive(Debug)]
pub enum ServiceAction {
    Text(String),
    Binary(Vec<u8>),
    Close,
    /// Drop the TCP connection without a close frame.
    Reset,
}

/// How the mock socket answers handshakes.
#[derive(Debug, Clone, Copy, Default)]
pub enum HandshakeBehavior {
    #[default]
    Accept,
    Reject(u16),
    /// Wait before completing the handshake.
    Delay(Duration),
}

/// Mock recognition socket serving one connection at a time.
pub struct MockSpeechSocket {
    pub addr: SocketAddr,
    pub handshakes: Arc<Mutex<Vec<Handshake>>>,
    ended: Arc<AtomicUsize>,
    received_rx: mpsc::UnboundedReceiver<Message>,
    actions_tx: mpsc::UnboundedSender<ServiceAction>,
}

impl MockSpeechSocket {
    pub async fn start() -> Self {
        Self::start_with(HandshakeBehavior::Accept).await
    }

    pub async fn start_with(behavior: HandshakeBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handshakes = Arc::new(Mutex::new(Vec::new()));
        let ended = Arc::new(AtomicUsize::new(0));
        let (received_tx, received_rx) = mpsc::unbounded_channel();
        let (actions_tx, actions_rx) = mpsc::unbounded_channel();
        let actions_rx = Arc::new(tokio::sync::Mutex::new(actions_rx));

        let recorded = handshakes.clone();
        let ended_count = ended.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                if let HandshakeBehavior::Delay(delay) = behavior {
                    tokio::time::sleep(delay).await;
                }

                let recorded = recorded.clone();
                let callback = move |request: &Request, response: Response| {
                    let header = |name: &str| {
                        request
                            .headers()
                            .get(name)
                            .and_then(|v| v.to_str().ok())
                            .map(str::to_string)
                    };
                    recorded.lock().push(Handshake {
                        uri: request.uri().to_string(),
                        authorization: header("authorization"),
                        connection_id: header("x-connectionid"),
                    });

                    if let HandshakeBehavior::Reject(status) = behavior {
                        let mut rejection = ErrorResponse::new(Some("denied".to_string()));
                        *rejection.status_mut() = StatusCode::from_u16(status).unwrap();
                        return Err(rejection);
                    }
                    Ok(response)
                };

                let Ok(ws_stream) = accept_hdr_async(stream, callback).await else {
                    continue;
                };

                let received_tx = received_tx.clone();
                let actions_rx = actions_rx.clone();
                let ended_count = ended_count.clone();
                tokio::spawn(async move {
                    let mut actions = actions_rx.lock().await;
                    let (mut write, mut read) = ws_stream.split();
                    loop {
                        tokio::select! {
                            frame = read.next() => match frame {
                                Some(Ok(frame)) => {
                                    let closing = matches!(frame, Message::Close(_));
                                    let _ = received_tx.send(frame);
                                    if closing {
                                        break;
                                    }
                                }
                                _ => break,
                            },
                            action = actions.recv() => match action {
                                Some(ServiceAction::Text(text)) => {
                                    let _ = write.send(Message::Text(text.into())).await;
                                }
                                Some(ServiceAction::Binary(data)) => {
                                    let _ = write.send(Message::Binary(data.into())).await;
                                }
                                Some(ServiceAction::Close) | None => {
                                    let _ = write.send(Message::Close(None)).await;
                                    // Drain until the client acknowledges.
                                    while let Some(Ok(frame)) = read.next().await {
                                        let _ = received_tx.send(frame);
                                    }
                                    break;
                                }
                                Some(ServiceAction::Reset) => break,
                            },
                        }
                    }
                    drop((write, read));
                    ended_count.fetch_add(1, Ordering::SeqCst);
                });
            }
        });

        Self {
            addr,
            handshakes,
            ended,
            received_rx,
            actions_tx,
        }
    }

    /// `ws://` endpoint for [`SpeechConfig::endpoint`].
    pub fn endpoint(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn handshake(&self) -> Option<Handshake> {
        self.handshakes.lock().first().cloned()
    }

    /// Next frame written by the client, skipping keep-alives.
    pub async fn next_frame(&mut self) -> Option<Message> {
        loop {
            let frame = tokio::time::timeout(Duration::from_secs(5), self.received_rx.recv())
                .await
                .ok()??;
            if !matches!(frame, Message::Ping(_) | Message::Pong(_)) {
                return Some(frame);
            }
        }
    }

    pub fn send_text(&self, text: impl Into<String>) {
        self.actions_tx.send(ServiceAction::Text(text.into())).unwrap();
    }

    pub fn send_binary(&self, data: Vec<u8>) {
        self.actions_tx.send(ServiceAction::Binary(data)).unwrap();
    }

    pub fn close(&self) {
        self.actions_tx.send(ServiceAction::Close).unwrap();
    }

    pub fn reset(&self) {
        self.actions_tx.send(ServiceAction::Reset).unwrap();
    }

    /// Connections whose server side has finished.
    pub fn connections_ended(&self) -> usize {
        self.ended.load(Ordering::SeqCst)
    }
}

/// A service message in wire format.
pub fn service_frame(path: &str, request_id: &str, payload: &str) -> String {
    format!(
        "Path: {path}\r\nX-RequestId: {request_id}\r\nContent-Type: application/json; charset=utf-8\r\n\r\n{payload}"
    )
}

/// Poll `check` until it holds or two seconds pass.
pub async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    check()
}
