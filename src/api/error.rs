//! Handler error responses.
//!
//! Each route keeps the JSON shape its clients already parse, so the variants map to distinct
//! bodies rather than one envelope. Every failure is logged before it is rendered.

// crates.io
use axum::{
	Json,
	http::StatusCode,
	response::{IntoResponse, Response},
};
use serde_json::json;
// self
use crate::{_prelude::*, feedback::ValidationInputError};

/// Message returned when the token probe fails.
pub const TOKEN_PROBE_FAILED: &str = "Falló el intento de obtener el token.";
/// Message returned when a validation passthrough fails.
pub const VALIDATION_FAILED: &str = "Error interno del servidor al validar el comprobante.";
/// Message returned when a feedback insert fails.
pub const FEEDBACK_FAILED: &str = "Error al guardar el feedback.";

/// Failures surfaced by the HTTP handlers.
#[derive(Debug, ThisError)]
pub enum ApiError {
	/// `GET /api/test-token` could not obtain a token.
	#[error("Token probe failed: {0}")]
	TokenProbe(#[source] Error),
	/// `POST /api/sunat/validar-comprobante` failed at the token gate or upstream.
	#[error("Comprobante validation failed: {0}")]
	Validation(#[source] Error),
	/// `POST /api/feedback` received an unusable payload.
	#[error(transparent)]
	FeedbackInput(#[from] ValidationInputError),
	/// `POST /api/feedback` could not store the record.
	#[error("Feedback storage failed: {0}")]
	FeedbackStorage(#[source] Error),
}
impl IntoResponse for ApiError {
	fn into_response(self) -> Response {
		let (status, body) = match &self {
			Self::TokenProbe(e) => {
				let detail = e.upstream_payload().cloned().unwrap_or_else(|| e.to_string().into());

				tracing::error!(error = %e, %detail, "Token probe failed.");

				(
					StatusCode::INTERNAL_SERVER_ERROR,
					json!({ "mensaje": TOKEN_PROBE_FAILED, "error": detail }),
				)
			},
			Self::Validation(e) => {
				let detail = e.upstream_payload().cloned().unwrap_or_else(|| e.to_string().into());

				tracing::error!(error = %e, %detail, "Comprobante validation failed.");

				(
					StatusCode::INTERNAL_SERVER_ERROR,
					json!({ "success": false, "message": VALIDATION_FAILED, "error": detail }),
				)
			},
			Self::FeedbackInput(e) => {
				tracing::warn!(reason = %e, "Feedback payload rejected.");

				(StatusCode::BAD_REQUEST, json!({ "message": e.to_string() }))
			},
			Self::FeedbackStorage(e) => {
				tracing::error!(error = %e, "Feedback could not be stored.");

				(
					StatusCode::INTERNAL_SERVER_ERROR,
					json!({ "message": FEEDBACK_FAILED, "error": e.to_string() }),
				)
			},
		};

		(status, Json(body)).into_response()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::error::{ConfigError, RemoteValidationError};

	#[test]
	fn statuses_follow_error_kind() {
		let input = ApiError::FeedbackInput(ValidationInputError::EfficiencyRating);

		assert_eq!(input.into_response().status(), StatusCode::BAD_REQUEST);
		assert_eq!(
			ApiError::TokenProbe(ConfigError::MissingClientId.into()).into_response().status(),
			StatusCode::INTERNAL_SERVER_ERROR
		);
		assert_eq!(
			ApiError::Validation(
				RemoteValidationError::Rejected { status: 404, payload: None }.into()
			)
			.into_response()
			.status(),
			StatusCode::INTERNAL_SERVER_ERROR
		);
	}
}
