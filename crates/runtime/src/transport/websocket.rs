//! JSON frames over a websocket to a remote driver.

use std::time::Duration;

use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::{Inbound, Transport, build_runtime, poll_inbound};
use crate::error::{Error, Result};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;

/// Transport to a driver exposed with `playwright run-server`.
pub struct WebSocketTransport {
	runtime: tokio::runtime::Runtime,
	sink: WsSink,
	inbound: Inbound,
	reader: JoinHandle<()>,
	closed: bool,
}

impl WebSocketTransport {
	/// Connects to `ws_endpoint` and starts reading frames.
	pub fn connect(ws_endpoint: &str) -> Result<Self> {
		let runtime = build_runtime()?;
		let (stream, _) = runtime
			.block_on(connect_async(ws_endpoint))
			.map_err(|e| Error::TransportError(format!("WebSocket connect to {ws_endpoint} failed: {e}")))?;
		let (sink, mut source) = stream.split();
		let (tx, inbound) = mpsc::unbounded_channel();

		let reader = runtime.spawn(async move {
			while let Some(frame) = source.next().await {
				let message = match frame {
					Ok(WsMessage::Text(text)) => serde_json::from_str::<Value>(&text).map_err(Error::from),
					Ok(WsMessage::Binary(bytes)) => serde_json::from_slice::<Value>(&bytes).map_err(Error::from),
					Ok(WsMessage::Close(_)) => break,
					Ok(_) => continue,
					Err(e) => Err(Error::TransportError(format!("WebSocket read failed: {e}"))),
				};
				let failed = message.is_err();
				if tx.send(message).is_err() || failed {
					break;
				}
			}
			tracing::debug!("WebSocket reader finished");
		});

		Ok(Self {
			runtime,
			sink,
			inbound,
			reader,
			closed: false,
		})
	}
}

impl Transport for WebSocketTransport {
	fn send(&mut self, message: Value) -> Result<()> {
		if self.closed {
			return Err(Error::ChannelClosed);
		}
		let text = serde_json::to_string(&message)?;
		let sink = &mut self.sink;
		self.runtime
			.block_on(sink.send(WsMessage::Text(text)))
			.map_err(|e| Error::TransportError(format!("WebSocket write failed: {e}")))
	}

	fn poll(&mut self, timeout: Duration) -> Result<Option<Value>> {
		if self.closed {
			return Err(Error::ChannelClosed);
		}
		poll_inbound(&self.runtime, &mut self.inbound, timeout)
	}

	fn close(&mut self) -> Result<()> {
		if self.closed {
			return Ok(());
		}
		self.closed = true;
		self.reader.abort();
		let sink = &mut self.sink;
		if let Err(e) = self.runtime.block_on(sink.close()) {
			tracing::debug!(error = %e, "WebSocket already closed by peer");
		}
		Ok(())
	}
}
