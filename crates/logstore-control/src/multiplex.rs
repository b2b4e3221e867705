use std::collections::HashMap;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};

use nix::errno::Errno;
use nix::sys::epoll::{Epoll, EpollCreateFlags, EpollEvent, EpollFlags, EpollTimeout};
use tracing::{debug, error};

use crate::lifecycle::ShutdownFlag;

/// Bounded wait per poll cycle. The loop re-checks the shutdown flag at
/// this cadence, since signal delivery alone does not reliably wake a
/// blocking wait.
pub const POLL_TIMEOUT_MS: u16 = 500;

const MAX_EVENTS: usize = 10;

/// Failure reported by an event source's dispatch.
#[derive(Debug)]
pub enum SourceError {
	Io(io::Error),
	Failed(String),
}

impl std::fmt::Display for SourceError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			SourceError::Io(e) => write!(f, "io error: {}", e),
			SourceError::Failed(e) => write!(f, "{}", e),
		}
	}
}

impl std::error::Error for SourceError {}

impl From<io::Error> for SourceError {
	fn from(e: io::Error) -> Self {
		SourceError::Io(e)
	}
}

/// A registered event producer.
///
/// Registration is edge-triggered: readiness fires once per transition, so
/// a dispatch must drain everything available before returning.
pub trait EventSource {
	/// Descriptor to watch for read readiness.
	fn as_fd(&self) -> BorrowedFd<'_>;

	/// Consume whatever made the descriptor ready. An error here is
	/// terminal for the whole session: a dead single producer has nothing
	/// to fall back on.
	fn dispatch(&mut self) -> Result<(), SourceError>;
}

/// Errors creating or registering with the multiplexer.
#[derive(Debug)]
pub enum MuxError {
	/// The readiness context could not be created. Fatal at startup.
	Create(Errno),
	/// Registering the descriptor with the kernel failed.
	Register(Errno),
	/// A producer is already registered; the loop supports exactly one.
	AlreadyRegistered,
}

impl std::fmt::Display for MuxError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			MuxError::Create(e) => write!(f, "failed to create epoll context: {}", e),
			MuxError::Register(e) => write!(f, "failed to register descriptor: {}", e),
			MuxError::AlreadyRegistered => write!(f, "an event producer is already registered"),
		}
	}
}

impl std::error::Error for MuxError {}

/// Fatal outcome of a poll cycle.
#[derive(Debug)]
pub enum PollError {
	Wait(Errno),
	/// The producer reported readiness without the read flags: it died.
	ProducerGone,
	/// Readiness for a descriptor nothing is registered for.
	MissingSource(u64),
	Dispatch(SourceError),
}

impl std::fmt::Display for PollError {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		match self {
			PollError::Wait(e) => write!(f, "poll wait error: {}", e),
			PollError::ProducerGone => write!(f, "event producer died"),
			PollError::MissingSource(token) => {
				write!(f, "no source registered for descriptor {}", token)
			}
			PollError::Dispatch(e) => write!(f, "dispatch failed: {}", e),
		}
	}
}

impl std::error::Error for PollError {}

/// Edge-triggered readiness multiplexer for the persistent dispatch loop.
///
/// Owns the epoll context and the registered source. Dropping the
/// multiplexer releases the context and invalidates the registration; there
/// is no per-descriptor teardown.
pub struct EventMultiplexer {
	epoll: Epoll,
	sources: HashMap<u64, Box<dyn EventSource>>,
	shutdown: ShutdownFlag,
}

impl EventMultiplexer {
	/// Create the readiness context.
	pub fn open(shutdown: ShutdownFlag) -> Result<Self, MuxError> {
		let epoll = Epoll::new(EpollCreateFlags::empty()).map_err(MuxError::Create)?;
		Ok(Self {
			epoll,
			sources: HashMap::new(),
			shutdown,
		})
	}

	/// Register the event producer for edge-triggered read readiness.
	///
	/// At most one producer may be registered at a time; a second
	/// registration is rejected.
	pub fn register(&mut self, source: Box<dyn EventSource>) -> Result<(), MuxError> {
		if !self.sources.is_empty() {
			return Err(MuxError::AlreadyRegistered);
		}
		let token = source.as_fd().as_raw_fd() as u64;
		let event = EpollEvent::new(EpollFlags::EPOLLIN | EpollFlags::EPOLLET, token);
		self.epoll.add(source.as_fd(), event).map_err(MuxError::Register)?;
		debug!("watching descriptor {}", token);
		self.sources.insert(token, source);
		Ok(())
	}

	/// Wait for readiness (bounded) and dispatch each ready source once.
	///
	/// Returns the number of dispatches. A wait interrupted by a signal is
	/// not an error: zero dispatches are reported so the caller re-evaluates
	/// the shutdown flag before retrying. Every fatal condition sets the
	/// shutdown flag before returning.
	pub fn poll(&mut self) -> Result<usize, PollError> {
		let mut events = [EpollEvent::empty(); MAX_EVENTS];
		let ready = match self.epoll.wait(&mut events, EpollTimeout::from(POLL_TIMEOUT_MS)) {
			Ok(n) => n,
			Err(Errno::EINTR) => return Ok(0),
			Err(e) => {
				error!("poll wait error: {}", e);
				self.shutdown.request_exit();
				return Err(PollError::Wait(e));
			}
		};

		let mut dispatched = 0;
		for event in events.iter().take(ready) {
			let token = event.data();

			if !event.events().contains(EpollFlags::EPOLLIN) {
				error!(
					"producer error on descriptor {}: events {:?}",
					token,
					event.events()
				);
				// Dropping the source closes its descriptor.
				self.sources.remove(&token);
				self.shutdown.request_exit();
				return Err(PollError::ProducerGone);
			}

			let source = match self.sources.get_mut(&token) {
				Some(source) => source,
				None => {
					error!("no source registered for descriptor {}", token);
					self.shutdown.request_exit();
					return Err(PollError::MissingSource(token));
				}
			};

			debug!("descriptor {} ready, dispatching", token);
			if let Err(e) = source.dispatch() {
				error!("dispatch failed: {}", e);
				self.shutdown.request_exit();
				return Err(PollError::Dispatch(e));
			}
			dispatched += 1;
		}
		Ok(dispatched)
	}

	/// Poll until shutdown is requested or a poll cycle turns fatal.
	pub fn run(&mut self) -> Result<(), PollError> {
		while !self.shutdown.must_exit() {
			self.poll()?;
		}
		Ok(())
	}
}
