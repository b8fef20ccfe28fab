//! Relay-level error types shared across the token gate, SUNAT clients, and feedback stores.

// self
use crate::{_prelude::*, feedback::StoreError};

/// Relay-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical relay error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Local configuration problem (missing client id, bad URL, bad credential blob).
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Token endpoint rejected the request or could not be reached.
	#[error(transparent)]
	RemoteAuth(#[from] RemoteAuthError),
	/// Validation endpoint rejected the request or could not be reached.
	#[error(transparent)]
	RemoteValidation(#[from] RemoteValidationError),
	/// Feedback storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		StoreError,
	),
}
impl Error {
	/// Returns the upstream error payload carried by remote failures, if any.
	pub fn upstream_payload(&self) -> Option<&JsonValue> {
		match self {
			Self::RemoteAuth(RemoteAuthError::Rejected { payload, .. })
			| Self::RemoteValidation(RemoteValidationError::Rejected { payload, .. })
			| Self::Storage(StoreError::Rejected { payload, .. }) => payload.as_ref(),
			_ => None,
		}
	}
}

/// Configuration and validation failures raised before any network access.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// `CLIENT_ID_SUNAT` is not set.
	#[error("Client identifier not configured (CLIENT_ID_SUNAT).")]
	MissingClientId,
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// An endpoint URL could not be built.
	#[error("Endpoint URL `{url}` is invalid.")]
	InvalidUrl {
		/// Offending URL text.
		url: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A base URL cannot carry path segments (e.g. `mailto:` or `data:` URLs).
	#[error("Base URL `{url}` cannot carry path segments.")]
	UnusableBaseUrl {
		/// Offending URL text.
		url: String,
	},
	/// An environment variable holds a value that cannot be parsed.
	#[error("Environment variable {name} is invalid: {reason}.")]
	InvalidEnvVar {
		/// Variable name.
		name: &'static str,
		/// Human-readable reason.
		reason: String,
	},
	/// Service account credential blob is malformed.
	#[error("Service account credentials are invalid.")]
	InvalidServiceAccount {
		/// Underlying parsing failure.
		#[source]
		source: BoxError,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	/// Wraps a service account parsing or key failure.
	pub fn invalid_service_account(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::InvalidServiceAccount { source: Box::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Token endpoint failures.
#[derive(Debug, ThisError)]
pub enum RemoteAuthError {
	/// Token endpoint answered with a non-success status.
	#[error("Token endpoint rejected the request (status {}).", display_status(.status))]
	Rejected {
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Upstream error body, decoded as JSON when possible.
		payload: Option<JsonValue>,
	},
	/// Token endpoint could not be reached.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Token endpoint answered with a success status but an unreadable body.
	#[error("Token endpoint returned malformed JSON.")]
	Decode {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Token endpoint returned an unusable `expires_in`.
	#[error("Token endpoint returned an invalid expires_in: {reason}.")]
	InvalidExpiry {
		/// What was wrong with the value.
		reason: &'static str,
	},
}

/// Comprobante validation endpoint failures.
#[derive(Debug, ThisError)]
pub enum RemoteValidationError {
	/// Validation endpoint answered with a non-success status.
	#[error("Validation endpoint rejected the request (status {status}).")]
	Rejected {
		/// HTTP status code.
		status: u16,
		/// Upstream error body, decoded as JSON when possible.
		payload: Option<JsonValue>,
	},
	/// Validation endpoint could not be reached.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Validation endpoint answered with a success status but a non-JSON body.
	#[error("Validation endpoint returned malformed JSON.")]
	Decode {
		/// Underlying parsing failure.
		#[source]
		source: serde_json::Error,
	},
}

/// Transport-level failures (network, IO).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling {endpoint}.")]
	Network {
		/// Endpoint label.
		endpoint: &'static str,
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(
		endpoint: &'static str,
		src: impl 'static + Send + Sync + std::error::Error,
	) -> Self {
		Self::Network { endpoint, source: Box::new(src) }
	}
}

/// Decodes an upstream error body: JSON when it parses, plain text otherwise, `None` when empty.
pub fn decode_payload(body: &[u8]) -> Option<JsonValue> {
	if body.iter().all(u8::is_ascii_whitespace) {
		return None;
	}

	serde_json::from_slice(body)
		.ok()
		.or_else(|| Some(JsonValue::String(String::from_utf8_lossy(body).into_owned())))
}

fn display_status(status: &Option<u16>) -> String {
	status.map_or_else(|| "unknown".into(), |code| code.to_string())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn payload_decoding_prefers_json() {
		assert_eq!(
			decode_payload(br#"{"error":"invalid_client"}"#),
			Some(serde_json::json!({ "error": "invalid_client" }))
		);
		assert_eq!(decode_payload(b"Bad Gateway"), Some(JsonValue::String("Bad Gateway".into())));
		assert_eq!(decode_payload(b"  \n"), None);
	}

	#[test]
	fn upstream_payload_is_exposed_for_rejections() {
		let err: Error = RemoteAuthError::Rejected {
			status: Some(401),
			payload: Some(serde_json::json!({ "error": "invalid_client" })),
		}
		.into();

		assert_eq!(err.upstream_payload(), Some(&serde_json::json!({ "error": "invalid_client" })));
		assert!(err.to_string().contains("401"));

		let err: Error = ConfigError::MissingClientId.into();

		assert!(err.upstream_payload().is_none());
	}
}
