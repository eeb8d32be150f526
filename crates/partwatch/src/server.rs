//! WebSocket endpoint for live completion events.
//!
//! Each connection to `GET /ws` becomes one subscriber in the shared
//! [`SubscriberRegistry`]. Inbound text is read and ignored; it only keeps
//! the connection alive.

use crate::notify::{AnalysisEvent, SubscriberRegistry};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

pub fn router(registry: SubscriberRegistry) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(registry)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<F>(
    addr: SocketAddr,
    registry: SubscriberRegistry,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind(addr).await?;
    serve_on(listener, registry, shutdown).await
}

/// Serve on an already-bound listener.
pub async fn serve_on<F>(
    listener: TcpListener,
    registry: SubscriberRegistry,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    info!(addr = %listener.local_addr()?, "Notification endpoint listening on /ws");
    axum::serve(listener, router(registry))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn ws_handler(ws: WebSocketUpgrade, State(registry): State<SubscriberRegistry>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, registry))
}

async fn handle_socket(socket: WebSocket, registry: SubscriberRegistry) {
    let (id, events) = registry.add();
    debug!(subscriber = id.as_u64(), "WebSocket subscriber connected");

    let (sink, mut stream) = socket.split();
    let mut send_task = tokio::spawn(forward_events(events, sink));
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(message)) = stream.next().await {
            if matches!(message, Message::Close(_)) {
                break;
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    registry.remove(id);
    debug!(subscriber = id.as_u64(), "WebSocket subscriber disconnected");
}

async fn forward_events<S>(mut events: mpsc::UnboundedReceiver<AnalysisEvent>, mut sink: S)
where
    S: futures_util::Sink<Message> + Unpin,
{
    while let Some(event) = events.recv().await {
        let text = match event.to_json() {
            Ok(text) => text,
            Err(e) => {
                warn!(error = %e, "Skipping unencodable event");
                continue;
            }
        };
        if sink.send(Message::Text(text)).await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_tungstenite::tungstenite::Message as ClientMessage;

    async fn wait_for_subscribers(registry: &SubscriberRegistry, n: usize) {
        for _ in 0..100 {
            if registry.len() == n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {n} subscribers, have {}", registry.len());
    }

    #[tokio::test]
    async fn events_reach_websocket_clients() {
        let registry = SubscriberRegistry::new();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
        let server = tokio::spawn(serve_on(listener, registry.clone(), async move {
            let _ = stop_rx.await;
        }));

        let (mut client, _) = tokio_tungstenite::connect_async(format!("ws://{}/ws", addr))
            .await
            .unwrap();
        wait_for_subscribers(&registry, 1).await;

        registry.broadcast(&AnalysisEvent::analyzed("parts.xlsx", vec!["Sheet1".into()]));

        let message = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        let text = match message {
            ClientMessage::Text(text) => text.to_string(),
            other => panic!("unexpected message: {other:?}"),
        };
        let json: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(json["type"], "analyzed");
        assert_eq!(json["fileName"], "parts.xlsx");
        assert_eq!(json["sheetNames"][0], "Sheet1");

        client.close(None).await.unwrap();
        wait_for_subscribers(&registry, 0).await;

        let _ = stop_tx.send(());
        server.await.unwrap().unwrap();
    }
}
