//! Client session handling
//!
//! This module handles:
//! - Framing client requests off the socket and replies onto it
//! - Routing requests to the command dispatcher
//! - Forwarding subscribed command events to the client
//! - Tracking connected clients

mod connection;
mod handler;
mod manager;

pub use connection::{ClientConnection, SessionHandle};
pub use handler::RequestHandler;
pub use manager::SessionManager;

use lithium_dispatch::CommandDispatcher;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Serve one client until it disconnects
pub async fn serve(
    stream: TcpStream,
    addr: SocketAddr,
    dispatcher: CommandDispatcher,
    sessions: Arc<SessionManager>,
) {
    let mut connection = ClientConnection::new(stream, addr, sessions.next_id());
    let handle = connection.get_handle();
    sessions.register(handle.clone()).await;
    info!("Client {} connected from {}", handle.id, addr);
    debug!("Connected clients: {:?}", sessions.connected_clients().await);

    let mut handler = RequestHandler::new(dispatcher, handle.clone());
    while let Some(message) = connection.recv().await {
        handler.handle(message);
    }

    let removed = handler.close();
    sessions.unregister(handle.id).await;
    info!(
        "Client {} disconnected after {:?} ({} subscriptions removed)",
        handle.id,
        handle.connected_at.elapsed(),
        removed
    );
}
