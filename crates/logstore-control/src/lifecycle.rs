use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::signal::{SIGINT, SIGQUIT, SIGTERM};
use tracing::debug;

/// One-way shutdown flag shared between the dispatch loop, the session
/// retry logic and the signal handlers.
///
/// Set at most once per run (setting it again is a no-op) and never
/// cleared. Once set, no new command is sent and every loop winds down at
/// its next iteration boundary. Single-word atomic: safe to flip from
/// signal context, lock-free to read everywhere else.
#[derive(Debug, Clone, Default)]
pub struct ShutdownFlag(Arc<AtomicBool>);

impl ShutdownFlag {
	pub fn new() -> Self {
		Self::default()
	}

	/// Request process exit.
	pub fn request_exit(&self) {
		self.0.store(true, Ordering::SeqCst);
	}

	pub fn must_exit(&self) -> bool {
		self.0.load(Ordering::SeqCst)
	}
}

/// Install handlers for the termination signals (SIGINT, SIGQUIT, SIGTERM).
///
/// The handler does nothing beyond flipping the flag; teardown always runs
/// later, on the loop thread.
pub fn install_signal_handlers(flag: &ShutdownFlag) -> io::Result<()> {
	debug!("installing signal handlers");
	for signal in [SIGINT, SIGQUIT, SIGTERM] {
		signal_hook::flag::register(signal, Arc::clone(&flag.0))?;
	}
	Ok(())
}
