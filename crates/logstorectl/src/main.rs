use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::rc::Rc;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use logstore_control::{
	config, install_signal_handlers, paths, proto, Command, ControlSession, EventMultiplexer,
	EventType, MountTrigger, ShutdownFlag,
};

/// Send a trigger to the logstored daemon to connect or disconnect a
/// log-storage device.
#[derive(Debug, Parser)]
#[command(name = "logstorectl", version)]
#[command(about = "Attach and detach log-storage devices on a running logstored daemon")]
struct Args {
	/// Connection type: connect = 1, disconnect = 0
	#[arg(short = 'c', long = "connection", value_name = "TYPE")]
	connection: Option<u8>,

	/// Run persistently, relaying trigger-pipe events to the daemon; the
	/// optional token selects the handler (only "fifo" is built in)
	#[arg(short = 'd', long = "daemon", value_name = "HANDLER", num_args = 0..=1, default_missing_value = "fifo")]
	daemon: Option<String>,

	/// ECU identifier of the daemon instance
	#[arg(short = 'e', long = "ecu", value_name = "ID")]
	ecu: Option<String>,

	/// Mount point path
	#[arg(short = 'p', long = "path", value_name = "PATH", default_value = "/tmp")]
	path: PathBuf,

	/// Connect retry delay in seconds
	#[arg(short = 't', long = "timeout", value_name = "SECS")]
	timeout: Option<u64>,

	/// Control socket path (overrides config file and environment)
	#[arg(short = 's', long = "socket", value_name = "PATH")]
	socket: Option<PathBuf>,

	/// Trigger pipe watched in daemon mode
	#[arg(long = "trigger", value_name = "PATH")]
	trigger: Option<PathBuf>,

	/// Verbose output
	#[arg(short = 'v', long = "verbose")]
	verbose: bool,
}

fn main() -> ExitCode {
	let args = Args::parse();
	init_tracing(args.verbose);

	let file_config = config::load_config();
	let ecu = args.ecu.unwrap_or(file_config.ecu);
	let timeout = Duration::from_secs(args.timeout.unwrap_or(file_config.timeout));
	let socket = args
		.socket
		.or(file_config.socket)
		.unwrap_or_else(paths::control_socket_path);
	let trigger = args
		.trigger
		.or(file_config.trigger)
		.unwrap_or_else(paths::trigger_pipe_path);

	let event = match EventType::from_code(args.connection.unwrap_or(1)) {
		Some(event) => event,
		None => {
			error!("invalid connection type (connect = 1, disconnect = 0)");
			return ExitCode::FAILURE;
		}
	};

	let shutdown = ShutdownFlag::new();
	let session = ControlSession::new(socket, ecu, timeout);

	match args.daemon {
		None => {
			debug!("one shot");
			one_shot(session, &shutdown, event, &args.path)
		}
		Some(handler) => {
			debug!("entering daemon mode");
			if handler != "fifo" {
				warn!("unknown handler type '{}', using the fifo trigger", handler);
			}
			persistent(session, &shutdown, &trigger)
		}
	}
}

fn init_tracing(verbose: bool) {
	let default_level = if verbose { "debug" } else { "info" };
	let filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.init();
}

/// Send a single command and exit with the verification result.
fn one_shot(
	mut session: ControlSession,
	shutdown: &ShutdownFlag,
	event: EventType,
	mount: &Path,
) -> ExitCode {
	if !proto::config_file_exists(mount) {
		error!(
			"no '{}' file available at: {}",
			proto::CONF_NAME,
			mount.display()
		);
		return ExitCode::FAILURE;
	}

	let command = match Command::new(event, mount.to_string_lossy()) {
		Ok(command) => command,
		Err(e) => {
			error!("{}", e);
			return ExitCode::FAILURE;
		}
	};

	if let Err(e) = install_signal_handlers(shutdown) {
		error!("failed to install signal handlers: {}", e);
		return ExitCode::FAILURE;
	}

	if !session.connect_with_retry(shutdown) {
		info!("shutdown requested before a connection was established");
		return ExitCode::SUCCESS;
	}

	debug!(
		"event type is [{}], device path is [{}]",
		command.event().code(),
		command.path()
	);
	let result = session.send(&command);
	session.disconnect();

	match result {
		Ok(()) => ExitCode::SUCCESS,
		Err(e) => {
			error!("request failed: {}", e);
			error!("check the daemon's log-storage configuration");
			ExitCode::FAILURE
		}
	}
}

/// Watch the trigger pipe and relay its events until shutdown.
fn persistent(
	mut session: ControlSession,
	shutdown: &ShutdownFlag,
	trigger_path: &Path,
) -> ExitCode {
	// Tell the supervisor we are up, or detach ourselves if there is none.
	if !notify_ready() {
		debug!("no supervisor to notify, detaching from the session");
		if let Err(e) = nix::unistd::daemon(true, true) {
			error!("failed to daemonize: {}", e);
			return ExitCode::FAILURE;
		}
	}

	if let Err(e) = install_signal_handlers(shutdown) {
		error!("failed to install signal handlers: {}", e);
		return ExitCode::FAILURE;
	}

	// Startup resource failure is fatal before anything else happens.
	let mut mux = match EventMultiplexer::open(shutdown.clone()) {
		Ok(mux) => mux,
		Err(e) => {
			error!("{}", e);
			return ExitCode::FAILURE;
		}
	};

	if !session.connect_with_retry(shutdown) {
		info!("shutdown requested before a connection was established");
		return ExitCode::SUCCESS;
	}
	let session = Rc::new(RefCell::new(session));

	let trigger = match MountTrigger::open(trigger_path, Rc::clone(&session)) {
		Ok(trigger) => trigger,
		Err(e) => {
			error!("failed to initialize the trigger source: {}", e);
			session.borrow_mut().disconnect();
			return ExitCode::FAILURE;
		}
	};
	if let Err(e) = mux.register(Box::new(trigger)) {
		error!("{}", e);
		shutdown.request_exit();
		session.borrow_mut().disconnect();
		return ExitCode::FAILURE;
	}

	debug!("executing the event loop");
	let result = mux.run();

	// Releases the epoll context and with it the registered source.
	drop(mux);
	session.borrow_mut().disconnect();

	match result {
		Ok(()) => {
			info!("exiting");
			ExitCode::SUCCESS
		}
		Err(e) => {
			error!("event loop failed: {}", e);
			ExitCode::FAILURE
		}
	}
}

/// Best-effort readiness notification towards a service supervisor.
fn notify_ready() -> bool {
	if std::env::var_os("NOTIFY_SOCKET").is_none() {
		return false;
	}
	match sd_notify::notify(false, &[sd_notify::NotifyState::Ready]) {
		Ok(()) => true,
		Err(e) => {
			warn!("supervisor notification failed: {}", e);
			false
		}
	}
}
