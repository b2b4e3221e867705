use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Control service identifier of the log-storage service, fixed by the
/// daemon protocol. Acknowledgements name it: `service(56), ok`.
pub const LOGSTORAGE_SERVICE_ID: u32 = 0x38;

/// Maximum accepted length of a mount-point path, in bytes.
pub const MOUNT_PATH_MAX: usize = 1024;

/// Configuration artifact expected at a mount point before a one-shot
/// request is sent for it.
pub const CONF_NAME: &str = "logstore.conf";

/// Storage event relayed to the daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
	Disconnect,
	Connect,
}

impl EventType {
	/// Protocol code: disconnect = 0, connect = 1.
	pub fn code(self) -> u8 {
		match self {
			EventType::Disconnect => 0,
			EventType::Connect => 1,
		}
	}

	pub fn from_code(code: u8) -> Option<Self> {
		match code {
			0 => Some(EventType::Disconnect),
			1 => Some(EventType::Connect),
			_ => None,
		}
	}
}

impl fmt::Display for EventType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			EventType::Disconnect => write!(f, "disconnect"),
			EventType::Connect => write!(f, "connect"),
		}
	}
}

/// Errors building a [`Command`].
#[derive(Debug)]
pub enum CommandError {
	/// The mount path exceeds [`MOUNT_PATH_MAX`].
	PathTooLong(usize),
}

impl fmt::Display for CommandError {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			CommandError::PathTooLong(len) => {
				write!(f, "mount path too long: {} bytes (max {})", len, MOUNT_PATH_MAX)
			}
		}
	}
}

impl std::error::Error for CommandError {}

/// A single attach/detach command: event type plus the affected mount path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
	event: EventType,
	path: String,
}

impl Command {
	pub fn new(event: EventType, path: impl Into<String>) -> Result<Self, CommandError> {
		let path = path.into();
		if path.len() > MOUNT_PATH_MAX {
			return Err(CommandError::PathTooLong(path.len()));
		}
		Ok(Self { event, path })
	}

	pub fn event(&self) -> EventType {
		self.event
	}

	pub fn path(&self) -> &str {
		&self.path
	}
}

/// One request line as sent over the control socket. The daemon answers
/// with a single raw text line (see [`crate::verify`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
	pub ecu: String,
	pub event: u8,
	pub path: String,
}

/// Check whether the configuration artifact is present at a mount point.
pub fn config_file_exists(mount: &Path) -> bool {
	mount.join(CONF_NAME).is_file()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn event_codes_match_protocol() {
		assert_eq!(EventType::Connect.code(), 1);
		assert_eq!(EventType::Disconnect.code(), 0);
		assert_eq!(EventType::from_code(1), Some(EventType::Connect));
		assert_eq!(EventType::from_code(0), Some(EventType::Disconnect));
		assert_eq!(EventType::from_code(2), None);
	}

	#[test]
	fn command_rejects_overlong_path() {
		let path = "x".repeat(MOUNT_PATH_MAX + 1);
		match Command::new(EventType::Connect, path) {
			Err(CommandError::PathTooLong(len)) => assert_eq!(len, MOUNT_PATH_MAX + 1),
			other => panic!("expected PathTooLong, got {:?}", other),
		}
	}

	#[test]
	fn command_keeps_event_and_path() {
		let cmd = Command::new(EventType::Disconnect, "/mnt/usb").unwrap();
		assert_eq!(cmd.event(), EventType::Disconnect);
		assert_eq!(cmd.path(), "/mnt/usb");
	}

	#[test]
	fn config_artifact_detection() {
		let dir = tempfile::tempdir().unwrap();
		assert!(!config_file_exists(dir.path()));
		std::fs::write(dir.path().join(CONF_NAME), "").unwrap();
		assert!(config_file_exists(dir.path()));
	}

	#[test]
	fn request_serializes_as_flat_object() {
		let request = Request {
			ecu: "ECU1".into(),
			event: 1,
			path: "/mnt/usb".into(),
		};
		let line = serde_json::to_string(&request).unwrap();
		assert_eq!(line, r#"{"ecu":"ECU1","event":1,"path":"/mnt/usb"}"#);
	}
}
