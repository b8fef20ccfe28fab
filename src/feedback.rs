//! Feedback records: input validation, the storage contract, and the built-in stores.

pub mod firestore;
pub mod memory;

pub use firestore::{FirestoreFeedbackStore, ServiceAccountKey, ServiceAccountTokenSource};
pub use memory::MemoryFeedbackStore;

// self
use crate::{_prelude::*, error::TransportError};

/// Boxed future returned by [`FeedbackStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Append-only storage backend for feedback records.
pub trait FeedbackStore
where
	Self: Send + Sync,
{
	/// Short backend label used in logs.
	fn backend(&self) -> &'static str;

	/// Persists `feedback` and returns the identifier generated by the backend.
	fn insert(&self, feedback: Feedback) -> StoreFuture<'_, String>;
}

/// Error type produced by [`FeedbackStore`] implementations.
#[derive(Debug, ThisError)]
pub enum StoreError {
	/// A record could not be encoded for, or decoded from, the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend answered with a non-success status.
	#[error("Feedback store rejected the insert (status {status}).")]
	Rejected {
		/// HTTP status code.
		status: u16,
		/// Upstream error body, decoded as JSON when possible.
		payload: Option<JsonValue>,
	},
	/// Backend could not be reached.
	#[error(transparent)]
	Transport(#[from] TransportError),
}

/// Reasons a feedback payload is refused before reaching the store.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ValidationInputError {
	/// Body is not a JSON document.
	#[error("El cuerpo de la solicitud debe ser un JSON válido.")]
	MalformedBody,
	/// `scanTimeEstimate` is missing, not a string, or empty.
	#[error("El campo scanTimeEstimate es obligatorio y debe ser un texto no vacío.")]
	ScanTimeEstimate,
	/// `efficiencyRating` is missing, not an integer, or outside `1..=5`.
	#[error("El campo efficiencyRating es obligatorio y debe ser un entero entre 1 y 5.")]
	EfficiencyRating,
}

/// Validated client payload for `POST /api/feedback`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedbackInput {
	/// Free-form estimate of how long a scan took.
	pub scan_time_estimate: String,
	/// Rating in `1..=5`.
	pub efficiency_rating: u8,
}
impl FeedbackInput {
	/// Lowest accepted rating.
	pub const MIN_RATING: u8 = 1;
	/// Highest accepted rating.
	pub const MAX_RATING: u8 = 5;

	/// Checks the raw request body field by field.
	pub fn validate(value: &JsonValue) -> Result<Self, ValidationInputError> {
		let scan_time_estimate = value
			.get("scanTimeEstimate")
			.and_then(JsonValue::as_str)
			.filter(|estimate| !estimate.trim().is_empty())
			.ok_or(ValidationInputError::ScanTimeEstimate)?
			.to_owned();
		let efficiency_rating = value
			.get("efficiencyRating")
			.and_then(JsonValue::as_u64)
			.and_then(|rating| u8::try_from(rating).ok())
			.filter(|rating| (Self::MIN_RATING..=Self::MAX_RATING).contains(rating))
			.ok_or(ValidationInputError::EfficiencyRating)?;

		Ok(Self { scan_time_estimate, efficiency_rating })
	}

	/// Stamps the input with the server-side receive time.
	pub fn into_feedback(self, timestamp: OffsetDateTime) -> Feedback {
		Feedback {
			scan_time_estimate: self.scan_time_estimate,
			efficiency_rating: self.efficiency_rating,
			timestamp,
		}
	}
}

/// Stored feedback record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
	/// Free-form estimate of how long a scan took.
	pub scan_time_estimate: String,
	/// Rating in `1..=5`.
	pub efficiency_rating: u8,
	/// Server-generated creation time.
	#[serde(with = "time::serde::rfc3339")]
	pub timestamp: OffsetDateTime,
}

#[cfg(test)]
mod tests {
	// std
	use std::error::Error as StdError;
	// crates.io
	use serde_json::json;
	use time::macros;
	// self
	use super::*;

	#[test]
	fn accepts_well_formed_input() {
		let input =
			FeedbackInput::validate(&json!({ "scanTimeEstimate": "2m", "efficiencyRating": 4 }))
				.expect("Valid feedback should pass.");

		assert_eq!(input, FeedbackInput { scan_time_estimate: "2m".into(), efficiency_rating: 4 });
	}

	#[test]
	fn rejects_out_of_range_and_mistyped_ratings() {
		for rating in [json!(0), json!(6), json!(-1), json!(4.5), json!("4"), JsonValue::Null] {
			let body = json!({ "scanTimeEstimate": "2m", "efficiencyRating": rating });

			assert_eq!(
				FeedbackInput::validate(&body),
				Err(ValidationInputError::EfficiencyRating)
			);
		}

		assert_eq!(
			FeedbackInput::validate(&json!({ "scanTimeEstimate": "2m" })),
			Err(ValidationInputError::EfficiencyRating)
		);
	}

	#[test]
	fn rejects_missing_or_blank_estimate() {
		for body in [
			json!({ "efficiencyRating": 3 }),
			json!({ "scanTimeEstimate": "  ", "efficiencyRating": 3 }),
			json!({ "scanTimeEstimate": 120, "efficiencyRating": 3 }),
			json!("not an object"),
		] {
			assert_eq!(FeedbackInput::validate(&body), Err(ValidationInputError::ScanTimeEstimate));
		}
	}

	#[test]
	fn feedback_serializes_with_camel_case_fields() {
		let feedback = FeedbackInput { scan_time_estimate: "30s".into(), efficiency_rating: 5 }
			.into_feedback(macros::datetime!(2025-03-01 12:00 UTC));

		assert_eq!(
			serde_json::to_value(&feedback).expect("Feedback should serialize."),
			json!({
				"scanTimeEstimate": "30s",
				"efficiencyRating": 5,
				"timestamp": "2025-03-01T12:00:00Z",
			})
		);
	}

	#[test]
	fn store_error_converts_into_relay_error_with_source() {
		let store_error = StoreError::Backend { message: "database unreachable".into() };
		let relay_error: Error = store_error.into();

		assert!(matches!(relay_error, Error::Storage(_)));
		assert!(relay_error.to_string().contains("database unreachable"));

		let source = StdError::source(&relay_error)
			.expect("Relay error should expose the original store error as its source.");

		assert!(source.to_string().contains("database unreachable"));
	}
}
