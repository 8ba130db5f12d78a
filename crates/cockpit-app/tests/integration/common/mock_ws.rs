//! Mock market event stream for integration tests.
//!
//! Provides a simple WebSocket server that can:
//! - Accept connections and send scripted frames on connect
//! - Push further frames to every connected client
//! - Drop every client (to force a reconnect)
//! - Record connections, open clients and client close frames

use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::{accept_async, tungstenite::Message};

#[derive(Clone, Debug)]
enum Command {
    Frame(String),
    DropAll,
}

/// A mock WebSocket server for testing.
pub struct MockWsServer {
    addr: SocketAddr,
    commands: broadcast::Sender<Command>,
    connections: Arc<AtomicU32>,
    open: Arc<AtomicU32>,
    closes_received: Arc<AtomicU32>,
}

impl MockWsServer {
    /// Start a server that sends `on_connect` to every new client.
    pub async fn start(on_connect: Vec<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (commands, _) = broadcast::channel(64);
        let connections = Arc::new(AtomicU32::new(0));
        let open = Arc::new(AtomicU32::new(0));
        let closes_received = Arc::new(AtomicU32::new(0));

        let server = Self {
            addr,
            commands: commands.clone(),
            connections: connections.clone(),
            open: open.clone(),
            closes_received: closes_received.clone(),
        };

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                connections.fetch_add(1, Ordering::SeqCst);
                let open = open.clone();
                let session = handle_connection(
                    stream,
                    on_connect.clone(),
                    commands.subscribe(),
                    closes_received.clone(),
                );
                tokio::spawn(async move {
                    open.fetch_add(1, Ordering::SeqCst);
                    session.await;
                    open.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        server
    }

    /// Get the server's WebSocket URL.
    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn connection_count(&self) -> u32 {
        self.connections.load(Ordering::SeqCst)
    }

    /// Clients whose TCP connection is still up.
    pub fn open_connections(&self) -> u32 {
        self.open.load(Ordering::SeqCst)
    }

    /// Close frames received from clients.
    pub fn closes_received(&self) -> u32 {
        self.closes_received.load(Ordering::SeqCst)
    }

    /// Send a frame to every connected client.
    pub fn push(&self, frame: impl Into<String>) {
        let _ = self.commands.send(Command::Frame(frame.into()));
    }

    /// Drop every connected client without a close handshake.
    pub fn drop_all(&self) {
        let _ = self.commands.send(Command::DropAll);
    }
}

async fn handle_connection(
    stream: TcpStream,
    on_connect: Vec<String>,
    mut commands: broadcast::Receiver<Command>,
    closes_received: Arc<AtomicU32>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            eprintln!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (mut write, mut read) = ws_stream.split();

    for frame in on_connect {
        if write.send(Message::Text(frame)).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Ok(Command::Frame(frame)) => {
                    if write.send(Message::Text(frame)).await.is_err() {
                        return;
                    }
                }
                Ok(Command::DropAll) | Err(_) => return,
            },
            msg = read.next() => match msg {
                Some(Ok(Message::Ping(data))) => {
                    let _ = write.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) => {
                    closes_received.fetch_add(1, Ordering::SeqCst);
                    return;
                }
                Some(Ok(_)) => {}
                Some(Err(_)) | None => return,
            },
        }
    }
}
