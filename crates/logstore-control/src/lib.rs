//! # logstore-control
//!
//! Control-plane toolkit for the logstored daemon.
//!
//! Everything the `logstorectl` tool needs to drive the daemon's
//! log-storage service: a synchronous control session with unbounded
//! connect-with-retry, acknowledgement verification, an edge-triggered
//! event multiplexer for persistent mode, a FIFO trigger source, and
//! process-wide shutdown handling.

pub mod config;
pub mod lifecycle;
pub mod multiplex;
pub mod paths;
pub mod proto;
pub mod session;
pub mod verify;
pub mod watch;

pub use config::{load_config, ToolConfig};
pub use lifecycle::{install_signal_handlers, ShutdownFlag};
pub use multiplex::{EventMultiplexer, EventSource, MuxError, PollError, SourceError};
pub use proto::{Command, CommandError, EventType};
pub use session::{ControlSession, SessionError, SessionState};
pub use watch::MountTrigger;
