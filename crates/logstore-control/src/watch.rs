use std::cell::RefCell;
use std::fs::{File, OpenOptions};
use std::io::{self, Read};
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::rc::Rc;

use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use tracing::{debug, info, warn};

use crate::multiplex::{EventSource, SourceError};
use crate::proto::{Command, EventType, MOUNT_PATH_MAX};
use crate::session::ControlSession;

const READ_CHUNK: usize = 512;

// Longest well-formed line: event word, separator, bounded path, newline.
const CARRY_MAX: usize = MOUNT_PATH_MAX + 32;

/// FIFO-backed event source for persistent mode.
///
/// An external hook (udev rule, mount helper) writes one line per storage
/// event: `<event> <path>`, where `<event>` is `connect`/`1` or
/// `disconnect`/`0`. Each dispatch drains every complete line available —
/// the edge-triggered registration fires only once per transition — and
/// relays each line as a command through the shared session.
pub struct MountTrigger {
	pipe: File,
	session: Rc<RefCell<ControlSession>>,
	carry: Vec<u8>,
}

impl MountTrigger {
	/// Create (if needed) and open the trigger FIFO.
	///
	/// Opened read-write so the FIFO stays readable across writer comings
	/// and goings, and non-blocking so a dispatch can drain to exhaustion.
	pub fn open(
		path: &Path,
		session: Rc<RefCell<ControlSession>>,
	) -> Result<Self, SourceError> {
		match mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR) {
			Ok(()) => debug!("created trigger pipe at {}", path.display()),
			Err(Errno::EEXIST) => {}
			Err(e) => return Err(SourceError::Io(io::Error::from(e))),
		}

		let pipe = OpenOptions::new()
			.read(true)
			.write(true)
			.custom_flags(OFlag::O_NONBLOCK.bits())
			.open(path)?;

		info!("watching trigger pipe at {}", path.display());
		Ok(Self::from_pipe(pipe, session))
	}

	/// Wrap an already-open, non-blocking readable descriptor.
	pub fn from_pipe(pipe: File, session: Rc<RefCell<ControlSession>>) -> Self {
		Self {
			pipe,
			session,
			carry: Vec::new(),
		}
	}

	fn relay_line(&self, line: &str) {
		let line = line.trim();
		if line.is_empty() {
			return;
		}
		let command = match parse_trigger_line(line) {
			Some(command) => command,
			None => {
				warn!("ignoring malformed trigger line: '{}'", line);
				return;
			}
		};
		// A rejected or failed relay is logged, not terminal; the next
		// trigger line still gets its chance.
		if let Err(e) = self.session.borrow_mut().send(&command) {
			warn!("relay of '{}' failed: {}", line, e);
		}
	}
}

impl EventSource for MountTrigger {
	fn as_fd(&self) -> BorrowedFd<'_> {
		self.pipe.as_fd()
	}

	fn dispatch(&mut self) -> Result<(), SourceError> {
		let mut chunk = [0u8; READ_CHUNK];
		loop {
			match self.pipe.read(&mut chunk) {
				Ok(0) => return Err(SourceError::Failed("trigger pipe closed".into())),
				Ok(n) => self.carry.extend_from_slice(&chunk[..n]),
				Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
				Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
				Err(e) => return Err(SourceError::Io(e)),
			}
		}

		while let Some(pos) = self.carry.iter().position(|&b| b == b'\n') {
			let raw: Vec<u8> = self.carry.drain(..=pos).collect();
			// Convert per complete line: a multibyte character must never
			// be split at a read-chunk boundary.
			let line = String::from_utf8_lossy(&raw);
			self.relay_line(&line);
		}

		if self.carry.len() > CARRY_MAX {
			warn!(
				"discarding {} bytes of partial trigger line without a newline",
				self.carry.len()
			);
			self.carry.clear();
		}
		Ok(())
	}
}

/// Parse one `<event> <path>` trigger line.
fn parse_trigger_line(line: &str) -> Option<Command> {
	let (event, path) = line.split_once(char::is_whitespace)?;
	let event = match event {
		"connect" | "1" => EventType::Connect,
		"disconnect" | "0" => EventType::Disconnect,
		_ => return None,
	};
	let path = path.trim();
	if path.is_empty() {
		return None;
	}
	Command::new(event, path).ok()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn parses_word_and_numeric_events() {
		let cmd = parse_trigger_line("connect /mnt/usb").unwrap();
		assert_eq!(cmd.event(), EventType::Connect);
		assert_eq!(cmd.path(), "/mnt/usb");

		let cmd = parse_trigger_line("0 /mnt/usb").unwrap();
		assert_eq!(cmd.event(), EventType::Disconnect);

		let cmd = parse_trigger_line("1 /media/stick").unwrap();
		assert_eq!(cmd.event(), EventType::Connect);
	}

	#[test]
	fn rejects_malformed_lines() {
		assert!(parse_trigger_line("attach /mnt/usb").is_none());
		assert!(parse_trigger_line("connect").is_none());
		assert!(parse_trigger_line("connect    ").is_none());
		assert!(parse_trigger_line("2 /mnt/usb").is_none());
	}

	#[test]
	fn rejects_overlong_paths() {
		let line = format!("connect /{}", "x".repeat(2048));
		assert!(parse_trigger_line(&line).is_none());
	}
}
