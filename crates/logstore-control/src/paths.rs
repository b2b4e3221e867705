use std::path::PathBuf;

/// Location of the daemon control socket.
///
/// `LOGSTORED_SOCKET` overrides; otherwise the socket lives in the
/// daemon's runtime directory.
pub fn control_socket_path() -> PathBuf {
	if let Ok(path) = std::env::var("LOGSTORED_SOCKET") {
		return PathBuf::from(path);
	}
	runtime_dir().join("control.sock")
}

/// Location of the trigger pipe watched in persistent mode.
///
/// `LOGSTORED_TRIGGER` overrides.
pub fn trigger_pipe_path() -> PathBuf {
	if let Ok(path) = std::env::var("LOGSTORED_TRIGGER") {
		return PathBuf::from(path);
	}
	runtime_dir().join("trigger.pipe")
}

/// Per-user configuration file for the control tool.
pub fn config_path() -> PathBuf {
	if let Ok(dir) = std::env::var("XDG_CONFIG_HOME") {
		PathBuf::from(dir).join("logstorectl").join("config.toml")
	} else if let Some(home) = home_dir() {
		home.join(".config").join("logstorectl").join("config.toml")
	} else {
		PathBuf::from("/tmp/logstorectl").join("config.toml")
	}
}

fn runtime_dir() -> PathBuf {
	if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
		PathBuf::from(dir).join("logstored")
	} else {
		PathBuf::from("/tmp/logstored")
	}
}

fn home_dir() -> Option<PathBuf> {
	std::env::var("HOME").ok().map(PathBuf::from)
}
