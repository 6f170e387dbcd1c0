//! WebSocket connection backed by `tokio-tungstenite`.

use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::{
    CloseCode as WsCloseCode, Data as OpData, OpCode,
};
use tokio_tungstenite::tungstenite::protocol::frame::Frame;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tokio_tungstenite::tungstenite::{Message as WsMessage, Utf8Bytes};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, trace};

use super::{Connection, TransportError};
use crate::protocols::echo::frame::{CloseCode, CloseStatus, Message, MessageKind};

/// Per-connection transport settings.
#[derive(Debug, Clone, Copy)]
pub struct WsSettings {
    /// Largest accepted message in bytes.
    pub max_message_size: usize,
    /// Deadline for each handshake, receive, send and close. `None` waits forever.
    pub io_timeout: Option<Duration>,
}

/// Server side of an upgraded WebSocket connection.
pub struct WsConnection {
    /// `None` once aborted.
    inner: Option<WebSocketStream<TcpStream>>,
    io_timeout: Option<Duration>,
    peer_closed: bool,
    /// A message was started with a non-final frame and awaits continuations.
    fragmenting: bool,
}

impl WsConnection {
    /// Perform the upgrade handshake on an accepted TCP stream.
    pub async fn accept(stream: TcpStream, settings: WsSettings) -> Result<Self, TransportError> {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(settings.max_message_size);
        config.max_frame_size = Some(settings.max_message_size);

        let inner = with_deadline(settings.io_timeout, async {
            tokio_tungstenite::accept_async_with_config(stream, Some(config))
                .await
                .map_err(TransportError::from)
        })
        .await?;

        Ok(Self {
            inner: Some(inner),
            io_timeout: settings.io_timeout,
            peer_closed: false,
            fragmenting: false,
        })
    }

    fn stream(&mut self) -> Result<&mut WebSocketStream<TcpStream>, TransportError> {
        self.inner.as_mut().ok_or(TransportError::Aborted)
    }
}

#[async_trait]
impl Connection for WsConnection {
    async fn receive(&mut self) -> Result<Message, TransportError> {
        let limit = self.io_timeout;
        let stream = self.stream()?;

        let message = with_deadline(limit, async {
            loop {
                match stream.next().await {
                    Some(Ok(WsMessage::Text(text))) => {
                        return Ok(Message::text(Bytes::from(text)));
                    }
                    Some(Ok(WsMessage::Binary(data))) => return Ok(Message::binary(data)),
                    Some(Ok(WsMessage::Close(frame))) => {
                        return Ok(Message::close(close_status(frame)));
                    }
                    // Pings are answered by tungstenite itself.
                    Some(Ok(other)) => trace!(?other, "Skipping control frame"),
                    Some(Err(e)) => return Err(TransportError::from(e)),
                    None => return Err(TransportError::Closed),
                }
            }
        })
        .await?;

        if message.is_close() {
            self.peer_closed = true;
        }
        Ok(message)
    }

    async fn send(&mut self, message: &Message) -> Result<(), TransportError> {
        if message.kind == MessageKind::Close {
            let status = message
                .close_status
                .clone()
                .unwrap_or_else(|| CloseStatus::new(CloseCode::Empty, ""));
            return self.close(&status).await;
        }

        let outgoing = if self.fragmenting || !message.end_of_message {
            // Fragments go out as raw frames so the FIN bit follows
            // `end_of_message`. UTF-8 is checked by the peer on the whole message.
            let opcode = if self.fragmenting {
                OpCode::Data(OpData::Continue)
            } else {
                data_opcode(message.kind)
            };
            self.fragmenting = !message.end_of_message;
            WsMessage::Frame(Frame::message(
                message.payload.clone(),
                opcode,
                message.end_of_message,
            ))
        } else if message.kind == MessageKind::Text {
            let text = Utf8Bytes::try_from(message.payload.clone())
                .map_err(|_| TransportError::InvalidText)?;
            WsMessage::Text(text)
        } else {
            WsMessage::Binary(message.payload.clone())
        };

        let limit = self.io_timeout;
        let stream = self.stream()?;
        with_deadline(limit, async {
            stream.send(outgoing).await.map_err(TransportError::from)
        })
        .await
    }

    async fn close(&mut self, status: &CloseStatus) -> Result<(), TransportError> {
        let limit = self.io_timeout;
        let peer_closed = self.peer_closed;
        let stream = self.stream()?;

        if peer_closed {
            // tungstenite queued a reply carrying the peer's own code and
            // reason when the close arrived; flushing it completes the handshake.
            return with_deadline(limit, async {
                SinkExt::close(stream).await.map_err(TransportError::from)
            })
            .await;
        }

        let frame = close_frame(status);
        with_deadline(limit, async {
            stream.close(frame).await.map_err(TransportError::from)?;
            // Wait for the peer to acknowledge; data arriving meanwhile is dropped.
            while let Some(incoming) = stream.next().await {
                match incoming.map_err(TransportError::from)? {
                    WsMessage::Close(_) => break,
                    other => trace!(?other, "Discarding frame received while closing"),
                }
            }
            Ok::<(), TransportError>(())
        })
        .await
    }

    fn abort(&mut self) {
        if let Some(stream) = self.inner.take() {
            // Zero linger turns the drop into a reset instead of a graceful FIN.
            #[allow(deprecated)]
            let linger = stream.get_ref().set_linger(Some(Duration::ZERO));
            if let Err(e) = linger {
                debug!(error = %e, "Failed to set zero linger before abort");
            }
        }
    }
}

async fn with_deadline<T, F>(limit: Option<Duration>, op: F) -> Result<T, TransportError>
where
    F: Future<Output = Result<T, TransportError>>,
{
    match limit {
        Some(limit) => tokio::time::timeout(limit, op)
            .await
            .map_err(|_| TransportError::TimedOut(limit))?,
        None => op.await,
    }
}

fn data_opcode(kind: MessageKind) -> OpCode {
    match kind {
        MessageKind::Text => OpCode::Data(OpData::Text),
        _ => OpCode::Data(OpData::Binary),
    }
}

fn close_status(frame: Option<CloseFrame>) -> CloseStatus {
    match frame {
        Some(frame) => CloseStatus::new(
            CloseCode::from(u16::from(frame.code)),
            frame.reason.as_str(),
        ),
        None => CloseStatus::new(CloseCode::Empty, ""),
    }
}

fn close_frame(status: &CloseStatus) -> Option<CloseFrame> {
    if status.code == CloseCode::Empty {
        return None;
    }
    Some(CloseFrame {
        code: WsCloseCode::from(u16::from(status.code)),
        reason: status.reason.clone().into(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_status_from_frame() {
        let frame = CloseFrame {
            code: WsCloseCode::Away,
            reason: "bye".into(),
        };
        assert_eq!(
            close_status(Some(frame)),
            CloseStatus::new(CloseCode::GoingAway, "bye")
        );
        assert_eq!(close_status(None), CloseStatus::new(CloseCode::Empty, ""));
    }

    #[test]
    fn test_close_frame_from_status() {
        let frame = close_frame(&CloseStatus::new(CloseCode::NormalClosure, "done"))
            .expect("frame");
        assert_eq!(frame.code, WsCloseCode::Normal);
        assert_eq!(frame.reason.as_str(), "done");

        assert!(close_frame(&CloseStatus::new(CloseCode::Empty, "")).is_none());
    }

    #[tokio::test]
    async fn test_deadline_elapses() {
        let limit = Duration::from_millis(10);
        let result: Result<(), _> = with_deadline(Some(limit), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert!(matches!(result, Err(TransportError::TimedOut(d)) if d == limit));
    }

    async fn pair() -> (
        WsConnection,
        WebSocketStream<tokio_tungstenite::MaybeTlsStream<TcpStream>>,
    ) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::spawn(async move {
            let (client, _response) = tokio_tungstenite::connect_async(format!("ws://{addr}"))
                .await
                .unwrap();
            client
        });

        let (stream, _peer) = listener.accept().await.unwrap();
        let settings = WsSettings {
            max_message_size: 1024 * 1024,
            io_timeout: Some(Duration::from_secs(5)),
        };
        let conn = WsConnection::accept(stream, settings).await.unwrap();
        (conn, client.await.unwrap())
    }

    #[tokio::test]
    async fn test_text_round_trip() {
        let (mut conn, mut client) = pair().await;

        client.send(WsMessage::text("héllo")).await.unwrap();
        let received = conn.receive().await.unwrap();
        assert_eq!(received, Message::text("héllo"));

        conn.send(&received).await.unwrap();
        let echoed = client.next().await.unwrap().unwrap();
        assert_eq!(echoed, WsMessage::text("héllo"));
    }

    #[tokio::test]
    async fn test_non_final_fragment_keeps_fin_unset() {
        let (mut conn, mut client) = pair().await;

        let mut first = Message::text("par");
        first.end_of_message = false;
        conn.send(&first).await.unwrap();

        // Without the final fragment the client has no complete message yet.
        let pending = tokio::time::timeout(Duration::from_millis(200), client.next()).await;
        assert!(pending.is_err());

        conn.send(&Message::text("t")).await.unwrap();
        let complete = client.next().await.unwrap().unwrap();
        assert_eq!(complete, WsMessage::text("part"));

        // The next message starts fresh with its own opcode.
        conn.send(&Message::binary(vec![7u8, 8])).await.unwrap();
        let next = client.next().await.unwrap().unwrap();
        assert_eq!(next, WsMessage::binary(vec![7u8, 8]));
    }

    #[tokio::test]
    async fn test_binary_fragments() {
        let (mut conn, mut client) = pair().await;

        let mut first = Message::binary(vec![1u8, 2]);
        first.end_of_message = false;
        let mut middle = Message::binary(vec![3u8]);
        middle.end_of_message = false;
        conn.send(&first).await.unwrap();
        conn.send(&middle).await.unwrap();
        conn.send(&Message::binary(vec![4u8])).await.unwrap();

        let complete = client.next().await.unwrap().unwrap();
        assert_eq!(complete, WsMessage::binary(vec![1u8, 2, 3, 4]));
    }

    #[tokio::test]
    async fn test_invalid_text_rejected() {
        let (mut conn, _client) = pair().await;

        let result = conn.send(&Message::text(vec![0xffu8, 0xfe])).await;
        assert!(matches!(result, Err(TransportError::InvalidText)));
    }

    #[tokio::test]
    async fn test_no_deadline_waits() {
        let result = with_deadline(None, async { Ok::<_, TransportError>(7) }).await;
        tokio_test::assert_ok!(result);
    }
}
