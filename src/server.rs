//! TCP server for handling WebSocket echo connections.
//!
//! Accepts incoming connections, performs the WebSocket upgrade, and runs
//! one echo loop per connection on its own task.

use crate::config::Config;
use crate::protocols::echo::{EchoLoop, Termination, TracingFrameLog};
use crate::transport::websocket::WsSettings;
use crate::transport::WsConnection;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Semaphore;
use tracing::{debug, error, info};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Server instance
pub struct Server {
    config: Config,
    connection_limit: Arc<Semaphore>,
}

impl Server {
    /// Create a new server instance
    pub fn new(config: Config) -> Self {
        let connection_limit = Arc::new(Semaphore::new(config.max_connections));

        Server {
            config,
            connection_limit,
        }
    }

    /// Bind the configured address and serve until Ctrl-C.
    pub async fn run(&self) -> Result<(), BoxError> {
        let listener = TcpListener::bind(&self.config.listen).await?;
        info!(address = %listener.local_addr()?, "Server listening");

        tokio::select! {
            result = self.serve(listener) => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received, no longer accepting connections");
                Ok(())
            }
        }
    }

    /// Accept connections from `listener`, one echo task per connection.
    pub async fn serve(&self, listener: TcpListener) -> Result<(), BoxError> {
        let settings = self.settings();

        loop {
            // Wait for a connection slot
            let permit = self.connection_limit.clone().acquire_owned().await?;

            match listener.accept().await {
                Ok((stream, peer)) => {
                    debug!(peer = %peer, "New connection");

                    tokio::spawn(async move {
                        handle_connection(stream, peer, settings).await;
                        drop(permit);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }
    }

    fn settings(&self) -> WsSettings {
        WsSettings {
            max_message_size: self.config.max_message_size,
            io_timeout: self.config.io_timeout,
        }
    }
}

/// Upgrade a single client connection and echo until the session ends
async fn handle_connection(stream: TcpStream, peer: SocketAddr, settings: WsSettings) {
    let conn = match WsConnection::accept(stream, settings).await {
        Ok(conn) => conn,
        Err(e) => {
            debug!(peer = %peer, error = %e, "WebSocket handshake failed");
            return;
        }
    };

    match EchoLoop::new(conn, TracingFrameLog::new(peer)).run().await {
        Ok(Termination::PeerClosed(status)) => {
            debug!(
                peer = %peer,
                code = %status.code,
                reason = %status.reason,
                "Connection closed by peer"
            );
        }
        Ok(Termination::ServerClosed) => {
            debug!(peer = %peer, "Connection closed by server");
        }
        Ok(Termination::Aborted) => {
            info!(peer = %peer, "Connection forcibly terminated");
        }
        Err(e) => {
            debug!(peer = %peer, error = %e, "Connection error");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use std::time::Duration;
    use tokio::io::AsyncWriteExt;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;
    use tokio_tungstenite::tungstenite::{Error as WsError, Message};
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    const WAIT: Duration = Duration::from_secs(5);

    fn test_config(io_timeout: Option<Duration>) -> Config {
        Config {
            listen: "127.0.0.1:0".to_string(),
            workers: None,
            max_connections: 16,
            max_message_size: 1024 * 1024,
            io_timeout,
            log_level: "info".to_string(),
        }
    }

    async fn start(config: Config) -> SocketAddr {
        let listener = TcpListener::bind(&config.listen).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = Server::new(config);
        tokio::spawn(async move {
            let _ = server.serve(listener).await;
        });
        addr
    }

    async fn connect(addr: SocketAddr) -> Client {
        let (client, _response) = connect_async(format!("ws://{addr}")).await.unwrap();
        client
    }

    async fn next(client: &mut Client) -> Option<Result<Message, WsError>> {
        tokio::time::timeout(WAIT, client.next())
            .await
            .expect("timed out waiting for server")
    }

    #[tokio::test]
    async fn test_server_creation() {
        let server = Server::new(test_config(None));
        assert_eq!(server.connection_limit.available_permits(), 16);
        assert_eq!(server.settings().max_message_size, 1024 * 1024);
        assert_eq!(server.settings().io_timeout, None);
    }

    #[tokio::test]
    async fn test_echo_text_and_binary() {
        let addr = start(test_config(None)).await;
        let mut client = connect(addr).await;

        client.send(Message::text("hello")).await.unwrap();
        assert_eq!(next(&mut client).await.unwrap().unwrap(), Message::text("hello"));

        client.send(Message::binary(vec![0u8, 1, 2, 255])).await.unwrap();
        assert_eq!(
            next(&mut client).await.unwrap().unwrap(),
            Message::binary(vec![0u8, 1, 2, 255])
        );

        client.send(Message::text("serverclose")).await.unwrap();
        assert_eq!(
            next(&mut client).await.unwrap().unwrap(),
            Message::text("serverclose")
        );
    }

    #[tokio::test]
    async fn test_server_close_command() {
        let addr = start(test_config(None)).await;
        let mut client = connect(addr).await;

        client.send(Message::text("ServerClose")).await.unwrap();
        match next(&mut client).await {
            Some(Ok(Message::Close(Some(frame)))) => {
                assert_eq!(frame.code, CloseCode::Normal);
                assert_eq!(frame.reason.as_str(), "Closing from Server");
            }
            other => panic!("unexpected: {:?}", other),
        }

        // Flushes our acknowledgement; the stream then ends.
        while let Some(Ok(msg)) = next(&mut client).await {
            panic!("unexpected frame after close: {:?}", msg);
        }
    }

    #[tokio::test]
    async fn test_server_abort_command() {
        let addr = start(test_config(None)).await;
        let mut client = connect(addr).await;

        client.send(Message::text("ServerAbort")).await.unwrap();
        match next(&mut client).await {
            Some(Ok(msg)) => panic!("unexpected frame after abort: {:?}", msg),
            Some(Err(_)) | None => {}
        }
    }

    #[tokio::test]
    async fn test_peer_close_is_echoed() {
        let addr = start(test_config(None)).await;
        let mut client = connect(addr).await;

        client
            .close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "bye".into(),
            }))
            .await
            .unwrap();

        match next(&mut client).await {
            Some(Ok(Message::Close(Some(frame)))) => {
                assert_eq!(frame.code, CloseCode::Away);
                assert_eq!(frame.reason.as_str(), "bye");
            }
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_failed_handshake_keeps_serving() {
        let addr = start(test_config(None)).await;

        let mut raw = TcpStream::connect(addr).await.unwrap();
        raw.write_all(b"GET / HTTP/1.1\r\nHost: localhost\r\n\r\n")
            .await
            .unwrap();
        drop(raw);

        let mut client = connect(addr).await;
        client.send(Message::text("still here")).await.unwrap();
        assert_eq!(
            next(&mut client).await.unwrap().unwrap(),
            Message::text("still here")
        );
    }

    #[tokio::test]
    async fn test_idle_connection_times_out() {
        let addr = start(test_config(Some(Duration::from_millis(100)))).await;
        let mut client = connect(addr).await;

        match next(&mut client).await {
            Some(Ok(msg)) => panic!("unexpected frame: {:?}", msg),
            Some(Err(_)) | None => {}
        }
    }
}
