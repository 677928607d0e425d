//! Length-prefixed JSON frames over driver stdio.

use std::process::{ChildStdin, ChildStdout};
use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{Inbound, Transport, build_runtime, poll_inbound};
use crate::error::{Error, Result};

/// Largest frame accepted from the driver.
pub(crate) const MAX_FRAME_LEN: usize = 256 * 1024 * 1024;

/// Transport speaking the driver's stdio framing:
/// `len(data).to_bytes(4, "little") + data`.
pub struct PipeTransport {
	runtime: tokio::runtime::Runtime,
	stdin: Box<dyn AsyncWrite + Send + Unpin>,
	inbound: Inbound,
	reader: JoinHandle<()>,
	closed: bool,
}

impl PipeTransport {
	/// Creates a transport writing to `stdin` and reading from `stdout`.
	pub fn new<W, R>(stdin: W, stdout: R) -> Result<Self>
	where
		W: AsyncWrite + Send + Unpin + 'static,
		R: AsyncRead + Send + Unpin + 'static,
	{
		Ok(Self::with_runtime(build_runtime()?, stdin, stdout))
	}

	/// Creates a transport from the stdio handles of a spawned driver process.
	pub fn from_child(stdin: ChildStdin, stdout: ChildStdout) -> Result<Self> {
		let runtime = build_runtime()?;
		let (stdin, stdout) = {
			let _guard = runtime.enter();
			(
				tokio::process::ChildStdin::from_std(stdin)?,
				tokio::process::ChildStdout::from_std(stdout)?,
			)
		};
		Ok(Self::with_runtime(runtime, stdin, stdout))
	}

	fn with_runtime<W, R>(runtime: tokio::runtime::Runtime, stdin: W, stdout: R) -> Self
	where
		W: AsyncWrite + Send + Unpin + 'static,
		R: AsyncRead + Send + Unpin + 'static,
	{
		let (tx, inbound) = mpsc::unbounded_channel();
		let reader = runtime.spawn(read_frames(stdout, tx));
		Self {
			runtime,
			stdin: Box::new(stdin),
			inbound,
			reader,
			closed: false,
		}
	}
}

/// Encodes one message as a length-prefixed frame.
pub(crate) fn encode_frame(message: &Value) -> Result<Vec<u8>> {
	let json = serde_json::to_vec(message)?;
	let length = u32::try_from(json.len())
		.map_err(|_| Error::TransportError(format!("Message too large: {} bytes", json.len())))?;
	let mut frame = Vec::with_capacity(4 + json.len());
	frame.extend_from_slice(&length.to_le_bytes());
	frame.extend_from_slice(&json);
	Ok(frame)
}

/// Reads frames until EOF, forwarding each decoded message.
///
/// EOF on a frame boundary ends the stream cleanly; anything else is sent
/// as an error before the task exits.
pub(crate) async fn read_frames<R>(mut stdout: R, tx: mpsc::UnboundedSender<Result<Value>>)
where
	R: AsyncRead + Unpin,
{
	loop {
		let frame = match read_frame(&mut stdout).await {
			Ok(Some(frame)) => frame,
			Ok(None) => break,
			Err(e) => {
				let _ = tx.send(Err(e));
				break;
			}
		};
		let message = serde_json::from_slice::<Value>(&frame).map_err(Error::from);
		if tx.send(message).is_err() {
			break;
		}
	}
	tracing::debug!("Pipe reader finished");
}

async fn read_frame<R>(stdout: &mut R) -> Result<Option<Vec<u8>>>
where
	R: AsyncRead + Unpin,
{
	let mut len_buf = [0u8; 4];
	let mut filled = 0;
	while filled < len_buf.len() {
		let n = stdout
			.read(&mut len_buf[filled..])
			.await
			.map_err(|e| Error::TransportError(format!("Failed to read length prefix: {e}")))?;
		if n == 0 {
			if filled == 0 {
				return Ok(None);
			}
			return Err(Error::TransportError(
				"Failed to read length prefix: unexpected end of stream".to_string(),
			));
		}
		filled += n;
	}

	let length = u32::from_le_bytes(len_buf) as usize;
	if length > MAX_FRAME_LEN {
		return Err(Error::ProtocolError(format!(
			"Frame length {length} exceeds the {MAX_FRAME_LEN} byte limit"
		)));
	}
	let mut frame = vec![0u8; length];
	stdout
		.read_exact(&mut frame)
		.await
		.map_err(|e| Error::TransportError(format!("Failed to read message body: {e}")))?;
	Ok(Some(frame))
}

impl Transport for PipeTransport {
	fn send(&mut self, message: Value) -> Result<()> {
		if self.closed {
			return Err(Error::ChannelClosed);
		}
		let frame = encode_frame(&message)?;
		let stdin = &mut self.stdin;
		self.runtime
			.block_on(async {
				stdin.write_all(&frame).await?;
				stdin.flush().await
			})
			.map_err(|e| Error::TransportError(format!("Failed to write message: {e}")))
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
		let stdin = &mut self.stdin;
		match self.runtime.block_on(stdin.shutdown()) {
			Ok(()) => Ok(()),
			Err(e)
				if matches!(
					e.kind(),
					std::io::ErrorKind::BrokenPipe | std::io::ErrorKind::NotConnected
				) =>
			{
				tracing::debug!("Driver already closed its end of the pipe");
				Ok(())
			}
			Err(e) => Err(e.into()),
		}
	}
}
