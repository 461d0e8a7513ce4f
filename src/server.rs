//! WebSocket listener for the real-time channel.

use std::net::SocketAddr;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_hdr_async;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::hub::{Hub, Origin};

pub const WS_PATH: &str = "/api/ws";

/// Accepts connections until `stop` fires. Each connection gets its own task.
pub async fn serve(listener: TcpListener, hub: Hub, stop: triggered::Listener) {
    if let Ok(addr) = listener.local_addr() {
        info!("websocket listening on ws://{}{}", addr, WS_PATH);
    }
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    tokio::spawn(handle_connection(hub.clone(), stream, peer));
                }
                Err(err) => warn!("accept failed: {err}"),
            },
            _ = stop.clone() => break,
        }
    }
}

fn header(request: &Request, name: &str) -> Option<String> {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

async fn handle_connection(hub: Hub, stream: TcpStream, peer: SocketAddr) {
    let mut origin = Origin {
        peer: Some(peer),
        ..Origin::default()
    };
    let callback = |request: &Request, response: Response| {
        if request.uri().path() != WS_PATH {
            let mut rejection = ErrorResponse::new(Some("not found".to_string()));
            *rejection.status_mut() = StatusCode::NOT_FOUND;
            return Err(rejection);
        }
        origin.forwarded_for =
            header(request, "x-forwarded-for").or_else(|| header(request, "x-real-ip"));
        origin.user_agent = header(request, "user-agent");
        Ok(response)
    };
    let socket = match accept_hdr_async(stream, callback).await {
        Ok(socket) => socket,
        Err(err) => {
            debug!(%peer, "websocket handshake failed: {err}");
            return;
        }
    };

    let (id, mut outbound) = hub.on_connect(origin).await;
    let (mut socket_write, mut socket_read) = socket.split();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound.recv().await {
            if let Err(err) = socket_write.send(Message::text(message.to_json())).await {
                debug!(session = %id, "send failed: {err}");
                break;
            }
        }
        let _ = socket_write.close().await;
    });

    while let Some(frame) = socket_read.next().await {
        let payload = match frame {
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Binary(bytes)) => bytes,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(err) => {
                debug!(session = %id, "read failed: {err}");
                break;
            }
        };
        if let Err(err) = hub.on_message(id, &payload).await {
            warn!(session = %id, "closing session: {err}");
            break;
        }
    }

    hub.on_disconnect(id).await;
    writer.abort();
}
