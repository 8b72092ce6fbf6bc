use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;

use std::net::SocketAddr;
use std::sync::Arc;

use crate::transport::handler::Handler;
use crate::transport::message::ServerMessage;

/// Binds `addr` and serves requests until the listener fails.
pub async fn start_websocket_server(addr: &str, handler: Arc<Handler>) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    info!("WebSocket server listening on ws://{}", listener.local_addr()?);
    serve(listener, handler).await;
    Ok(())
}

/// Accept loop over an already bound listener.
pub async fn serve(listener: TcpListener, handler: Arc<Handler>) {
    while let Ok((stream, peer)) = listener.accept().await {
        let handler = Arc::clone(&handler);
        tokio::spawn(handle_connection(stream, peer, handler));
    }
    warn!("WebSocket accept loop stopped");
}

async fn handle_connection(stream: TcpStream, peer: SocketAddr, handler: Arc<Handler>) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            error!(%peer, error = %e, "WebSocket handshake error");
            return;
        }
    };
    debug!(%peer, "Client connected");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    // One request, one reply, in order.
    while let Some(frame) = ws_receiver.next().await {
        let msg = match frame {
            Ok(msg) => msg,
            Err(e) => {
                warn!(%peer, error = %e, "WebSocket read error");
                break;
            }
        };

        let reply = match msg {
            WsMessage::Text(text) => handler.handle_text(text.as_str()).await,
            WsMessage::Close(_) => break,
            WsMessage::Binary(_) => {
                ServerMessage::error("bad_request", "only text frames are accepted")
            }
            _ => continue,
        };

        let body = match serde_json::to_string(&reply) {
            Ok(body) => body,
            Err(e) => {
                error!(%peer, error = %e, "Cannot encode reply");
                continue;
            }
        };
        if let Err(e) = ws_sender.send(WsMessage::Text(body.into())).await {
            warn!(%peer, error = %e, "Failed to send reply");
            break;
        }
    }

    debug!(%peer, "Client disconnected");
}
