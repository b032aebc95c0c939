use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::state::{DriverInput, SharedSimState};

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ClientMessage {
    Ping,
    Input(DriverInput),
}

pub async fn start_websocket_server(bind: SocketAddr, state: Arc<Mutex<SharedSimState>>) -> anyhow::Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!("websocket listening on ws://{}", listener.local_addr()?);

    loop {
        let (raw, peer) = match listener.accept().await {
            Ok(conn) => conn,
            Err(err) => {
                warn!(%err, "accept failed");
                continue;
            }
        };

        tokio::spawn(handle_connection(raw, peer, Arc::clone(&state)));
    }
}

async fn handle_connection(raw: TcpStream, peer: SocketAddr, state: Arc<Mutex<SharedSimState>>) {
    let ws = match accept_async(raw).await {
        Ok(ws) => ws,
        Err(err) => {
            warn!(%peer, %err, "websocket handshake failed");
            return;
        }
    };
    let (mut write, mut read) = ws.split();

    // -------------------------------
    // 1) Outgoing message channel + send loop
    // -------------------------------
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if write.send(Message::Text(msg)).await.is_err() {
                break;
            }
        }
    });

    // -------------------------------
    // 2) Register client
    // -------------------------------
    let client_id = Uuid::new_v4().to_string();
    state.lock().await.register_client(&client_id, tx.clone());
    info!(%client_id, %peer, "client connected");

    let welcome = serde_json::json!({ "type": "welcome", "client_id": client_id });
    let _ = tx.send(welcome.to_string());

    // -------------------------------
    // 3) Receive loop
    // -------------------------------
    while let Some(msg) = read.next().await {
        let msg = match msg {
            Ok(m) => m,
            Err(_) => break,
        };
        let text = match msg {
            Message::Text(t) => t,
            Message::Close(_) => break,
            _ => continue,
        };

        match serde_json::from_str::<ClientMessage>(&text) {
            Ok(ClientMessage::Ping) => {
                let _ = tx.send(r#"{"type":"pong"}"#.to_string());
            }
            Ok(ClientMessage::Input(input)) => {
                state.lock().await.update_input(input);
            }
            Err(err) => {
                debug!(%client_id, %err, "ignoring client message");
            }
        }
    }

    info!(%client_id, "client disconnected");
    state.lock().await.remove_client(&client_id);
}
