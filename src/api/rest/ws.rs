use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::engine::access;
use crate::error::AppError;
use crate::models::access::{CallerContext, Permission};
use crate::models::event::PickupEvent;
use crate::state::AppState;

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    caller: CallerContext,
) -> Result<impl IntoResponse, AppError> {
    access::require(&caller, Permission::ViewPickups)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, caller)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, caller: CallerContext) {
    let (sender, receiver) = socket.split();

    info!(caller = %caller.identity, role = %caller.role, "websocket client connected");
    forward_events(sender, receiver, state.events_tx.subscribe(), &caller).await;
    info!(caller = %caller.identity, "websocket client disconnected");
}

/// Pushes visible pickup events to the client until either side goes away.
/// Client hang-ups are noticed even while every event is being filtered out.
async fn forward_events<Tx, Rx, E>(
    mut outgoing: Tx,
    mut incoming: Rx,
    events: broadcast::Receiver<PickupEvent>,
    caller: &CallerContext,
) where
    Tx: Sink<Message> + Unpin,
    Rx: Stream<Item = Result<Message, E>> + Unpin,
{
    let mut events = BroadcastStream::new(events);

    loop {
        tokio::select! {
            inbound = incoming.next() => match inbound {
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            next = events.next() => {
                let event = match next {
                    Some(Ok(event)) => event,
                    Some(Err(err)) => {
                        warn!(error = %err, "websocket subscriber lagged; events dropped");
                        continue;
                    }
                    None => break,
                };
                if !access::can_see(caller, &event.pickup) {
                    continue;
                }

                let json = match serde_json::to_string(&event) {
                    Ok(json) => json,
                    Err(err) => {
                        warn!(error = %err, "failed to serialize pickup event for ws");
                        continue;
                    }
                };

                if outgoing.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
        }
    }
}
