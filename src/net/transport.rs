//! Transport module
//!
//! Thin wrappers over the two halves of a WebSocket stream. The protocol is
//! text only: outbound frames are sent as text messages, and inbound
//! messages are reduced to text payloads or a note that the frame kind is
//! unsupported. Ping and pong are answered by the WebSocket layer itself.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::trace;

use crate::error::{NetworkError, Result, WorldError};
use crate::protocol::Frame;

/// An inbound message after control frames are filtered out
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text frame carrying an event envelope
    Text(String),
    /// A frame kind the protocol does not use
    Unsupported(&'static str),
}

fn ws_error(e: tungstenite::Error) -> WorldError {
    WorldError::Network(NetworkError::WebSocket(e.to_string()))
}

/// Split a WebSocket into its frame sink and frame stream
pub fn split<S>(ws: WebSocketStream<S>) -> (FrameSink<S>, FrameStream<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (sink, stream) = ws.split();
    (FrameSink { sink }, FrameStream { stream })
}

/// Write half of a WebSocket
pub struct FrameSink<S> {
    sink: SplitSink<WebSocketStream<S>, Message>,
}

impl<S> FrameSink<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Send an encoded frame as a text message
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        self.sink
            .send(Message::Text(frame.to_string()))
            .await
            .map_err(ws_error)
    }

    /// Send a close frame
    pub async fn close(&mut self) -> Result<()> {
        self.sink.close().await.map_err(ws_error)
    }
}

/// Read half of a WebSocket
pub struct FrameStream<S> {
    stream: SplitStream<WebSocketStream<S>>,
}

impl<S> FrameStream<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wait for the next data message
    ///
    /// Returns `None` once the peer closes the connection.
    pub async fn next_inbound(&mut self) -> Result<Option<Inbound>> {
        while let Some(message) = self.stream.next().await {
            match message {
                Ok(Message::Text(text)) => return Ok(Some(Inbound::Text(text))),
                Ok(Message::Binary(_)) => return Ok(Some(Inbound::Unsupported("binary"))),
                Ok(Message::Close(frame)) => {
                    trace!(close_frame = ?frame, "Received close frame");
                    return Ok(None);
                }
                Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                Err(tungstenite::Error::ConnectionClosed) => return Ok(None),
                Err(e) => return Err(ws_error(e)),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let server = WebSocketStream::from_raw_socket(a, Role::Server, None).await;
        let client = WebSocketStream::from_raw_socket(b, Role::Client, None).await;
        (server, client)
    }

    #[tokio::test]
    async fn test_text_and_binary_frames() {
        let (server, mut client) = pair().await;
        let (_sink, mut stream) = split(server);

        client.send(Message::Ping(vec![1])).await.unwrap();
        client
            .send(Message::Text(r#"{"event":"user:join"}"#.to_string()))
            .await
            .unwrap();
        client.send(Message::Binary(vec![1, 2, 3])).await.unwrap();

        assert_eq!(
            stream.next_inbound().await.unwrap(),
            Some(Inbound::Text(r#"{"event":"user:join"}"#.to_string()))
        );
        assert_eq!(
            stream.next_inbound().await.unwrap(),
            Some(Inbound::Unsupported("binary"))
        );
    }

    #[tokio::test]
    async fn test_close_ends_stream() {
        let (server, mut client) = pair().await;
        let (_sink, mut stream) = split(server);

        client.send(Message::Close(None)).await.unwrap();

        assert_eq!(stream.next_inbound().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_send_frame_as_text() {
        let (server, mut client) = pair().await;
        let (mut sink, _stream) = split(server);

        sink.send_frame(&Frame::from(r#"{"event":"items:update","data":[]}"#))
            .await
            .unwrap();

        match client.next().await.unwrap().unwrap() {
            Message::Text(text) => assert_eq!(text, r#"{"event":"items:update","data":[]}"#),
            other => panic!("unexpected message: {:?}", other),
        }
    }
}
