//! Simple client example

use rust_duplex_transport::{Message, SocketConfig, Transport, TransportConfig};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let config = TransportConfig::new()
        .with_connect_timeout(Duration::from_secs(5))
        .with_socket_config(SocketConfig::new().with_write_timeout(Duration::from_secs(5)));
    let transport = Transport::with_config(config);

    println!("Connecting to server...");
    let socket = transport.dial("127.0.0.1:8080").await?;

    println!("Connected! Sending messages...");

    for i in 1..=5 {
        let mut msg = Message::new(format!("Hello from client! Message #{}", i))
            .header_entry("Content-Type", "text/plain");

        let id = socket.send(&mut msg).await?;
        println!("Sent #{}: {}", id, String::from_utf8_lossy(msg.body()));

        let response = socket.recv().await?;
        println!(
            "Received #{}: {}",
            response.correlation_id().unwrap_or_default(),
            String::from_utf8_lossy(response.body())
        );

        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    println!("Disconnecting...");
    socket.close().await?;

    println!("Done!");
    Ok(())
}
