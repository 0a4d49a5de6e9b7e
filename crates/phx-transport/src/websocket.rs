//! WebSocket transport implementation using `tokio-tungstenite`.
//!
//! One protocol frame travels as one WebSocket message: text messages for
//! text codecs (JSON), binary messages otherwise.

use std::sync::Arc;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use phx_protocol::{Codec, Frame};
use phx_sync::{race_fetch, CancellationToken, Fetched};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use crate::{Endpoint, Link, LinkId, OutgoingEnvelope, Transport, TransportError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A [`Transport`] that dials a WebSocket server.
///
/// Registered for `ws` and `wss` by default. `wss` needs the `tls`
/// feature; without it the connect attempt fails and the failure is
/// reported through `ready`.
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    endpoint: Endpoint,
}

impl WebSocketTransport {
    /// Creates a transport that will connect to `endpoint`.
    pub fn new(endpoint: Endpoint) -> Self {
        Self { endpoint }
    }

    /// The endpoint this transport connects to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

impl Transport for WebSocketTransport {
    async fn run(self, link: Link) -> Result<(), TransportError> {
        let Link {
            id,
            inbound,
            outbound,
            ready,
            stop,
            codec,
        } = link;
        let url = self.endpoint.connect_url();
        tracing::debug!(%id, url = %self.endpoint.url(), "connecting WebSocket");

        let connected = tokio::select! {
            biased;
            () = stop.cancelled() => {
                let _ = ready.resolve(Err(TransportError::ConnectionClosed(
                    "stopped while connecting".into(),
                )));
                return Ok(());
            }
            result = connect_async(url.as_str()) => result,
        };

        let ws = match connected {
            Ok((ws, _response)) => ws,
            Err(e) => {
                let err = TransportError::ConnectFailed(e.to_string());
                tracing::warn!(%id, error = %err, "WebSocket connect failed");
                let _ = ready.resolve(Err(err.clone()));
                return Err(err);
            }
        };
        let _ = ready.resolve(Ok(()));
        tracing::info!(%id, url = %self.endpoint.url(), "WebSocket connected");

        let (sink, stream) = ws.split();

        // `try_join!` polls both pumps concurrently and returns the first
        // error, dropping the other pump.
        let outcome = tokio::try_join!(
            receive_pump(id, stream, inbound, Arc::clone(&codec), &stop),
            send_pump(id, sink, outbound, codec, &stop),
        );
        match outcome {
            Ok(((), ())) => {
                tracing::debug!(%id, "WebSocket stopped");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(%id, error = %e, "WebSocket failed");
                Err(e)
            }
        }
    }
}

/// Reads messages, decodes them and queues the frames.
async fn receive_pump(
    id: LinkId,
    mut stream: SplitStream<WsStream>,
    inbound: mpsc::UnboundedSender<Frame>,
    codec: Arc<dyn Codec>,
    stop: &CancellationToken,
) -> Result<(), TransportError> {
    loop {
        let message = match race_fetch(stream.next(), stop).await {
            Fetched::Done => return Ok(()),
            Fetched::Item(None) => {
                return Err(TransportError::ConnectionClosed(
                    "stream ended".into(),
                ));
            }
            Fetched::Item(Some(Err(e))) => {
                return Err(TransportError::ReceiveFailed(e.to_string()));
            }
            Fetched::Item(Some(Ok(message))) => message,
        };

        let decoded = match &message {
            Message::Text(text) => codec.decode(text.as_bytes()),
            Message::Binary(data) => codec.decode(data.as_ref()),
            Message::Close(close) => {
                let reason = close
                    .as_ref()
                    .map(|c| c.reason.to_string())
                    .unwrap_or_default();
                return Err(TransportError::ConnectionClosed(format!(
                    "closed by peer: {reason}"
                )));
            }
            _ => continue, // skip ping/pong/frame
        };

        let frame = match decoded {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!(%id, error = %e, "dropping undecodable message");
                continue;
            }
        };

        tracing::trace!(
            %id,
            event = frame.event(),
            topic = frame.topic(),
            "frame received"
        );
        if inbound.send(frame).is_err() {
            tracing::debug!(%id, "inbound queue closed");
            return Ok(());
        }
    }
}

/// Takes envelopes off the queue, writes them and acknowledges each one.
async fn send_pump(
    id: LinkId,
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<OutgoingEnvelope>,
    codec: Arc<dyn Codec>,
    stop: &CancellationToken,
) -> Result<(), TransportError> {
    loop {
        let envelope = match race_fetch(outbound.recv(), stop).await {
            Fetched::Done | Fetched::Item(None) => {
                let _ = sink.close().await;
                return Ok(());
            }
            Fetched::Item(Some(envelope)) => envelope,
        };

        let message = match encode(codec.as_ref(), envelope.frame()) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(%id, error = %e, "failed to encode frame");
                envelope.fail(e);
                continue;
            }
        };

        let written = tokio::select! {
            biased;
            result = sink.send(message) => result,
            () = stop.cancelled() => {
                envelope.fail(TransportError::ConnectionClosed(
                    "transport stopped".into(),
                ));
                return Ok(());
            }
        };

        match written {
            Ok(()) => {
                tracing::trace!(
                    %id,
                    event = envelope.frame().event(),
                    topic = envelope.frame().topic(),
                    "frame sent"
                );
                envelope.acknowledge();
            }
            Err(e) => {
                let err = TransportError::SendFailed(e.to_string());
                envelope.fail(err.clone());
                return Err(err);
            }
        }
    }
}

fn encode(codec: &dyn Codec, frame: &Frame) -> Result<Message, TransportError> {
    let bytes = codec.encode(frame)?;
    if codec.is_text() {
        let text = String::from_utf8(bytes)
            .map_err(|e| TransportError::Codec(e.to_string()))?;
        Ok(Message::Text(text.into()))
    } else {
        Ok(Message::Binary(bytes.into()))
    }
}

#[cfg(test)]
mod tests {
    use phx_protocol::{JsonCodec, Ref};
    use serde_json::json;

    use super::*;

    #[test]
    fn test_json_frames_become_text_messages() {
        let frame = Frame::new("room:lobby", "ping", json!({}), Some(Ref(1)));
        let message = encode(&JsonCodec, &frame).unwrap();
        assert!(message.is_text());
    }

    struct BinaryJson;

    impl Codec for BinaryJson {
        fn encode(&self, frame: &Frame) -> Result<Vec<u8>, phx_protocol::ProtocolError> {
            JsonCodec.encode(frame)
        }

        fn decode(&self, data: &[u8]) -> Result<Frame, phx_protocol::ProtocolError> {
            JsonCodec.decode(data)
        }

        fn is_text(&self) -> bool {
            false
        }
    }

    #[test]
    fn test_binary_codecs_become_binary_messages() {
        let frame = Frame::new("t", "e", json!(null), None);
        let message = encode(&BinaryJson, &frame).unwrap();
        assert!(message.is_binary());
    }
}
