use tracing::debug;

use crate::proto::LOGSTORAGE_SERVICE_ID;

/// Acknowledgement prefix the daemon sends for an accepted log-storage
/// request.
pub fn expected_ack() -> String {
	format!("service({}), ok", LOGSTORAGE_SERVICE_ID)
}

/// Check a raw daemon acknowledgement.
///
/// Succeeds only when the text starts with the exact `service(<id>), ok`
/// literal. This is a prefix match: the daemon may append its own payload
/// after the prefix and it is ignored. An empty answer always fails.
pub fn verify_response(response: &str) -> bool {
	let expected = expected_ack();

	debug!("response received: '{}'", response);
	debug!("response expected: '{}'", expected);

	if response.is_empty() {
		return false;
	}
	response.starts_with(&expected)
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn exact_match_succeeds() {
		assert!(verify_response("service(56), ok"));
	}

	#[test]
	fn trailing_payload_is_ignored() {
		assert!(verify_response("service(56), ok, device attached"));
	}

	#[test]
	fn empty_response_fails() {
		assert!(!verify_response(""));
	}

	#[test]
	fn rejection_fails() {
		assert!(!verify_response("service(56), fail"));
	}

	#[test]
	fn partial_prefix_fails() {
		assert!(!verify_response("service(56), o"));
		assert!(!verify_response("service(56)"));
	}

	#[test]
	fn wrong_service_id_fails() {
		assert!(!verify_response("service(57), ok"));
	}

	#[test]
	fn match_is_case_sensitive() {
		assert!(!verify_response("Service(56), OK"));
	}

	#[test]
	fn spacing_and_punctuation_are_exact() {
		assert!(!verify_response("service(56),ok"));
		assert!(!verify_response("service (56), ok"));
	}
}
