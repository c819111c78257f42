#![allow(dead_code)]

use futures_util::{SinkExt, StreamExt};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use puffsync::gateway::codec::{deflate, inflate};

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// In-process gateway. Every accepted socket is handed to the test as a
/// [`Connection`].
pub struct FakeGateway {
    pub url: String,
    connections: mpsc::UnboundedReceiver<Connection>,
}

pub struct Connection {
    ws: WebSocketStream<TcpStream>,
    /// Request path and query the client connected with.
    pub uri: String,
    zlib: bool,
}

impl FakeGateway {
    pub async fn spawn() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, connections) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let uri = Arc::new(Mutex::new(String::new()));
                let seen = uri.clone();
                let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    *seen.lock().unwrap() = req.uri().to_string();
                    Ok(resp)
                };
                let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                    continue;
                };
                let uri = uri.lock().unwrap().clone();
                let zlib = uri.contains("compression=zlib");
                if tx.send(Connection { ws, uri, zlib }).is_err() {
                    break;
                }
            }
        });

        Self {
            url: format!("ws://127.0.0.1:{}", addr.port()),
            connections,
        }
    }

    pub async fn accept(&mut self) -> Connection {
        tokio::time::timeout(RECV_TIMEOUT, self.connections.recv())
            .await
            .expect("no client connected")
            .expect("gateway listener stopped")
    }
}

impl Connection {
    /// Send an envelope the way the client asked for it: deflated binary
    /// frames under zlib, text otherwise.
    pub async fn send(&mut self, envelope: serde_json::Value) {
        let json = envelope.to_string();
        let message = if self.zlib {
            Message::Binary(deflate(json.as_bytes()).unwrap().into())
        } else {
            Message::Text(json.into())
        };
        self.ws.send(message).await.unwrap();
    }

    pub async fn send_raw(&mut self, message: Message) {
        self.ws.send(message).await.unwrap();
    }

    pub async fn hello(&mut self, heartbeat_interval: u64, session_id: &str, session_token: &str) {
        self.send(serde_json::json!({
            "op": 0,
            "d": {
                "heartbeat_interval": heartbeat_interval,
                "session_id": session_id,
                "session_token": session_token,
            }
        }))
        .await;
    }

    pub async fn event(&mut self, tag: &str, payload: serde_json::Value) {
        self.send(serde_json::json!({ "op": 3, "t": tag, "d": payload }))
            .await;
    }

    /// Next envelope from the client, including heartbeats.
    pub async fn recv(&mut self) -> serde_json::Value {
        loop {
            let message = tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .expect("timed out waiting for client frame")
                .expect("client hung up")
                .unwrap();
            match message {
                Message::Text(text) => return serde_json::from_str(text.as_str()).unwrap(),
                Message::Binary(bytes) => {
                    return serde_json::from_slice(&inflate(&bytes).unwrap()).unwrap()
                }
                Message::Close(_) => panic!("client closed the socket"),
                _ => continue,
            }
        }
    }

    /// Next envelope from the client that is not a heartbeat.
    pub async fn recv_op(&mut self) -> serde_json::Value {
        loop {
            let envelope = self.recv().await;
            if envelope["op"] != 420 {
                return envelope;
            }
        }
    }

    /// Consume the UPDATE_USER every HELLO triggers and return the name.
    pub async fn announced(&mut self) -> String {
        let envelope = self.recv_op().await;
        assert_eq!(envelope["op"], 6, "expected UPDATE_USER, got {envelope}");
        envelope["d"]["name"].as_str().unwrap().to_string()
    }

    /// Read until the client drops the socket, returning every data frame
    /// it sent on the way out.
    pub async fn drain_until_closed(&mut self) -> Vec<serde_json::Value> {
        let mut frames = Vec::new();
        loop {
            let next = tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
                .await
                .expect("client kept the socket open");
            match next {
                Some(Ok(Message::Text(text))) => {
                    frames.push(serde_json::from_str(text.as_str()).unwrap())
                }
                Some(Ok(Message::Binary(bytes))) => {
                    frames.push(serde_json::from_slice(&inflate(&bytes).unwrap()).unwrap())
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return frames,
                Some(Ok(_)) => continue,
            }
        }
    }

    /// Raw next frame, for asserting on the frame type.
    pub async fn recv_frame(&mut self) -> Message {
        tokio::time::timeout(RECV_TIMEOUT, self.ws.next())
            .await
            .expect("timed out waiting for client frame")
            .expect("client hung up")
            .unwrap()
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}

/// Wait until `rx` yields, failing the test after a few seconds.
pub async fn expect<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(RECV_TIMEOUT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}
