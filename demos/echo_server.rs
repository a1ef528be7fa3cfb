//! Echo server example

use rust_duplex_transport::{Socket, Transport, TransportConfig};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let config = TransportConfig::new().with_max_connections(100);
    let transport = Transport::with_config(config);

    println!("Starting echo server on 127.0.0.1:8080...");
    let listener = Arc::new(transport.listen("127.0.0.1:8080").await?);

    let server = Arc::clone(&listener);
    let accept = tokio::spawn(async move {
        server
            .accept(|socket: Arc<Socket>| async move {
                println!("Client connected: {:?} (ID: {})", socket.peer_addr(), socket.id());

                while let Ok(mut message) = socket.recv().await {
                    println!(
                        "Socket {} received {}: {}",
                        socket.id(),
                        message,
                        String::from_utf8_lossy(message.body())
                    );

                    if let Err(e) = socket.send(&mut message).await {
                        eprintln!("Failed to send echo: {}", e);
                        break;
                    }
                }

                println!(
                    "Client disconnected: {} (uptime: {:?})",
                    socket.id(),
                    socket.uptime()
                );
            })
            .await
    });

    println!("Listening on {}. Press Ctrl+C to stop.", listener.addr());

    tokio::signal::ctrl_c().await?;

    println!("Shutting down...");
    listener.close().await?;
    accept.await??;

    println!("Server stopped.");
    Ok(())
}
