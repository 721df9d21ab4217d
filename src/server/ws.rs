use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::Mutex;
use tracing::debug;

use crate::core::{BroadcastHub, DeliveryError, Subscriber};
use crate::domain::LogEvent;

use super::api::SharedState;

/// A connected WebSocket client, fed by the broadcast hub
pub struct WsSubscriber {
    sender: Mutex<SplitSink<WebSocket, Message>>,
}

impl WsSubscriber {
    pub fn new(sender: SplitSink<WebSocket, Message>) -> Self {
        Self {
            sender: Mutex::new(sender),
        }
    }
}

#[async_trait]
impl Subscriber for WsSubscriber {
    fn name(&self) -> &str {
        "websocket"
    }

    async fn deliver(&self, event: &LogEvent) -> Result<(), DeliveryError> {
        let json =
            serde_json::to_string(event).map_err(|e| DeliveryError::Failed(e.to_string()))?;
        self.sender
            .lock()
            .await
            .send(Message::Text(json.into()))
            .await
            .map_err(|_| DeliveryError::Closed)
    }
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    let hub = Arc::clone(state.orchestrator.hub());
    ws.on_upgrade(move |socket| handle_socket(socket, hub))
}

/// Keep the client registered until it closes or the connection drops
async fn handle_socket(socket: WebSocket, hub: Arc<BroadcastHub>) {
    let (sender, mut receiver) = socket.split();
    let id = hub.register(Arc::new(WsSubscriber::new(sender))).await;
    debug!(subscriber = %id, "WebSocket client registered");

    while let Some(msg) = receiver.next().await {
        match msg {
            Ok(Message::Close(_)) | Err(_) => break,
            // Client traffic only keeps the connection alive
            Ok(_) => {}
        }
    }

    hub.unregister(id).await;
    debug!(subscriber = %id, "WebSocket client unregistered");
}
