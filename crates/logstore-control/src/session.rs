use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

use tracing::{debug, error, info};

use crate::lifecycle::ShutdownFlag;
use crate::proto::{Command, Request};
use crate::verify;

/// Errors from control session operations.
#[derive(Debug)]
pub enum SessionError {
	/// No connection is established.
	NotConnected,
	/// The daemon cannot be reached.
	Connect(io::Error),
	/// IO error during a request/acknowledgement exchange.
	Io(io::Error),
	/// Failed to serialize the request line.
	Serialize(String),
	/// The daemon answered, but not with the expected acknowledgement.
	Rejected { expected: String, received: String },
}

impl std::fmt::Display for SessionError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			SessionError::NotConnected => write!(f, "not connected to the daemon"),
			SessionError::Connect(e) => write!(f, "daemon unreachable: {}", e),
			SessionError::Io(e) => write!(f, "io error: {}", e),
			SessionError::Serialize(e) => write!(f, "serialize error: {}", e),
			SessionError::Rejected { expected, received } => {
				write!(f, "request rejected: expected '{}', got '{}'", expected, received)
			}
		}
	}
}

impl std::error::Error for SessionError {}

impl From<io::Error> for SessionError {
	fn from(e: io::Error) -> Self {
		SessionError::Io(e)
	}
}

/// Connection state of a [`ControlSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
	Disconnected,
	Connecting,
	Connected,
}

/// Synchronous control session with the logstored daemon.
///
/// Owns the transport exclusively. Connect, send and disconnect are called
/// strictly sequentially from a single thread; there is no concurrent
/// mutation to guard against.
pub struct ControlSession {
	socket: PathBuf,
	ecu: String,
	retry_delay: Duration,
	state: SessionState,
	stream: Option<UnixStream>,
}

impl ControlSession {
	pub fn new(
		socket: impl Into<PathBuf>,
		ecu: impl Into<String>,
		retry_delay: Duration,
	) -> Self {
		Self {
			socket: socket.into(),
			ecu: ecu.into(),
			retry_delay,
			state: SessionState::Disconnected,
			stream: None,
		}
	}

	pub fn state(&self) -> SessionState {
		self.state
	}

	pub fn ecu(&self) -> &str {
		&self.ecu
	}

	/// Single connection attempt.
	pub fn connect(&mut self) -> Result<(), SessionError> {
		self.state = SessionState::Connecting;
		match UnixStream::connect(&self.socket) {
			Ok(stream) => {
				debug!("connected to daemon at {}", self.socket.display());
				self.stream = Some(stream);
				self.state = SessionState::Connected;
				Ok(())
			}
			Err(e) => {
				self.state = SessionState::Disconnected;
				Err(SessionError::Connect(e))
			}
		}
	}

	/// Connect, retrying with a sleep until the daemon comes up.
	///
	/// The retry is unbounded: the daemon is expected to become available
	/// eventually (it may simply not be up yet at boot). Only the shutdown
	/// flag preempts it, checked before every attempt and again before
	/// every sleep. Returns `false` on a shutdown-preempted abort, which
	/// the caller must treat as a clean exit, not an error.
	pub fn connect_with_retry(&mut self, shutdown: &ShutdownFlag) -> bool {
		loop {
			if shutdown.must_exit() {
				debug!("shutdown requested, abandoning connect");
				return false;
			}
			match self.connect() {
				Ok(()) => return true,
				Err(e) => {
					error!("failed to reach the daemon: {}", e);
					error!("retrying in {:?}", self.retry_delay);
				}
			}
			if shutdown.must_exit() {
				debug!("shutdown requested, abandoning connect");
				return false;
			}
			thread::sleep(self.retry_delay);
		}
	}

	/// Send one command and validate the daemon's acknowledgement.
	///
	/// The verification result is the result of the send: an acknowledgement
	/// that does not carry the expected prefix is a rejection even when the
	/// transport round-trip itself succeeded.
	pub fn send(&mut self, command: &Command) -> Result<(), SessionError> {
		let stream = self.stream.as_mut().ok_or(SessionError::NotConnected)?;

		let request = Request {
			ecu: self.ecu.clone(),
			event: command.event().code(),
			path: command.path().to_string(),
		};
		let mut data =
			serde_json::to_vec(&request).map_err(|e| SessionError::Serialize(e.to_string()))?;
		data.push(b'\n');
		stream.write_all(&data)?;

		let mut reader = BufReader::new(&*stream);
		let mut line = String::new();
		reader.read_line(&mut line)?;
		let ack = line.trim_end_matches('\n');

		if verify::verify_response(ack) {
			info!("{} of '{}' acknowledged", command.event(), command.path());
			Ok(())
		} else {
			Err(SessionError::Rejected {
				expected: verify::expected_ack(),
				received: ack.to_string(),
			})
		}
	}

	/// Drop the connection.
	///
	/// Idempotent and safe to call in any state, including when never
	/// connected.
	pub fn disconnect(&mut self) {
		if self.stream.take().is_some() {
			debug!("disconnected from daemon");
		}
		self.state = SessionState::Disconnected;
	}
}

impl Drop for ControlSession {
	fn drop(&mut self) {
		self.disconnect();
	}
}
