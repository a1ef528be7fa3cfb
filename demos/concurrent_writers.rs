//! Many tasks writing through one socket
//!
//! Starts a listener that collects everything it receives, then has several
//! workers share a single dialed socket. The server prints the order in
//! which correlation ids arrived.

use rust_duplex_transport::{Message, Socket, Transport, TransportError};
use std::sync::Arc;
use tokio::sync::mpsc;

const WORKERS: usize = 10;
const MESSAGES_PER_WORKER: usize = 10;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let transport = Transport::new();
    let listener = Arc::new(transport.listen("127.0.0.1:").await?);
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    let server = Arc::clone(&listener);
    tokio::spawn(async move {
        server
            .accept(move |socket: Arc<Socket>| {
                let tx = tx.clone();
                async move {
                    loop {
                        match socket.recv().await {
                            Ok(message) => {
                                let _ = tx.send(message);
                            }
                            Err(TransportError::EndOfStream) => break,
                            Err(e) => {
                                eprintln!("Receive failed: {}", e);
                                break;
                            }
                        }
                    }
                }
            })
            .await
    });

    let socket = Arc::new(transport.dial(&listener.addr()).await?);
    println!("Connected to {}", listener.addr());

    let workers: Vec<_> = (0..WORKERS)
        .map(|worker| {
            let socket = Arc::clone(&socket);
            tokio::spawn(async move {
                for i in 0..MESSAGES_PER_WORKER {
                    let mut msg = Message::new(format!("[worker-{}]: msg-{}", worker, i));
                    socket.send(&mut msg).await?;
                }
                Ok::<_, TransportError>(())
            })
        })
        .collect();

    for worker in workers {
        worker.await??;
    }
    socket.close().await?;

    let mut received = 0;
    let mut in_order = true;
    while received < WORKERS * MESSAGES_PER_WORKER {
        let Some(message) = rx.recv().await else {
            break;
        };
        received += 1;
        in_order &= message.correlation_id() == Some(received as u64);
        println!("{} {}", message, String::from_utf8_lossy(message.body()));
    }

    println!(
        "Received {} message(s); ids in order: {}",
        received, in_order
    );

    listener.close().await?;
    Ok(())
}
