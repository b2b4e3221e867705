use std::path::PathBuf;

use serde::Deserialize;
use tracing::warn;

use crate::paths;

pub const DEFAULT_ECU: &str = "ECU1";
pub const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Defaults for the control tool, read from the per-user config file.
///
/// Every field has a fallback; command-line flags override whatever is set
/// here.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolConfig {
	#[serde(default = "default_ecu")]
	pub ecu: String,
	/// Connect retry delay, in seconds.
	#[serde(default = "default_timeout")]
	pub timeout: u64,
	pub socket: Option<PathBuf>,
	pub trigger: Option<PathBuf>,
}

impl Default for ToolConfig {
	fn default() -> Self {
		Self {
			ecu: default_ecu(),
			timeout: default_timeout(),
			socket: None,
			trigger: None,
		}
	}
}

fn default_ecu() -> String {
	DEFAULT_ECU.to_string()
}
fn default_timeout() -> u64 {
	DEFAULT_TIMEOUT_SECS
}

/// Load the config file, falling back to defaults when it is absent or
/// malformed.
pub fn load_config() -> ToolConfig {
	let path = paths::config_path();
	let raw = match std::fs::read_to_string(&path) {
		Ok(raw) => raw,
		Err(_) => return ToolConfig::default(),
	};
	match toml::from_str(&raw) {
		Ok(config) => config,
		Err(e) => {
			warn!("ignoring invalid config {}: {}", path.display(), e);
			ToolConfig::default()
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn defaults_when_empty() {
		let config: ToolConfig = toml::from_str("").unwrap();
		assert_eq!(config.ecu, "ECU1");
		assert_eq!(config.timeout, 10);
		assert_eq!(config.socket, None);
		assert_eq!(config.trigger, None);
	}

	#[test]
	fn parses_overrides() {
		let config: ToolConfig = toml::from_str(
			r#"
			ecu = "ECU7"
			timeout = 3
			socket = "/run/logstored/control.sock"
			"#,
		)
		.unwrap();
		assert_eq!(config.ecu, "ECU7");
		assert_eq!(config.timeout, 3);
		assert_eq!(
			config.socket,
			Some(PathBuf::from("/run/logstored/control.sock"))
		);
	}
}
