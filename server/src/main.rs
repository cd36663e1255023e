mod config;
mod devices;
mod session;

use config::ServerConfig;
use lithium_dispatch::{CommandDispatcher, TokioEventLoop};
use session::SessionManager;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()))
        .init();

    let config = ServerConfig::load()?;

    let event_loop = Arc::new(TokioEventLoop::current()?);
    let dispatcher = CommandDispatcher::new(event_loop, config.dispatcher.clone())?;

    devices::register_all(&dispatcher)?;
    info!(
        "Registered {} commands: {}",
        dispatcher.registered_commands().len(),
        dispatcher.registered_commands().join(", ")
    );

    let sessions = Arc::new(SessionManager::new());
    let listener = TcpListener::bind(&config.listen_addr).await?;
    info!("Lithium server listening on {}", config.listen_addr);

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, addr) = match accepted {
                    Ok(accepted) => accepted,
                    Err(e) => {
                        warn!("Accept failed: {}", e);
                        continue;
                    }
                };

                let dispatcher = dispatcher.clone();
                let sessions = sessions.clone();
                tokio::spawn(async move {
                    session::serve(stream, addr, dispatcher, sessions).await;
                });
            }
            _ = tokio::signal::ctrl_c() => {
                info!(
                    "Shutting down: {} clients connected, {} commands active",
                    sessions.count().await,
                    dispatcher.get_active_commands().len()
                );
                break;
            }
        }
    }

    Ok(())
}
