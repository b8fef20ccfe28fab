//! Route handlers.

// crates.io
use axum::{
	Json,
	extract::{State, rejection::JsonRejection},
	http::StatusCode,
	response::{IntoResponse, Response},
};
use serde_json::json;
// self
use crate::{
	_prelude::*,
	api::{ApiError, AppState},
	feedback::{FeedbackInput, ValidationInputError},
};

/// Liveness text served at `/`.
pub const ROOT_MESSAGE: &str = "¡Mi backend para SUNAT está funcionando correctamente!";
/// Message returned when the token probe succeeds.
pub const TOKEN_PROBE_OK: &str = "¡Éxito! Se intentó obtener un token.";
/// Message returned when a feedback record is stored.
pub const FEEDBACK_STORED: &str = "¡Gracias! Tu feedback fue registrado correctamente.";

/// `GET /`
pub async fn root() -> &'static str {
	ROOT_MESSAGE
}

/// `GET /api/test-token`: runs the token gate and echoes the token.
pub async fn test_token(State(state): State<AppState>) -> Result<Json<JsonValue>, ApiError> {
	let token = state.sunat_tokens.acquire().await.map_err(ApiError::TokenProbe)?;

	Ok(Json(json!({ "mensaje": TOKEN_PROBE_OK, "tokenRecibido": token.expose() })))
}

/// `POST /api/sunat/validar-comprobante`: forwards the body with a bearer token and relays the
/// upstream JSON.
///
/// A request without a JSON content type is forwarded as `{}`.
pub async fn validate_comprobante(
	State(state): State<AppState>,
	payload: Result<Json<JsonValue>, JsonRejection>,
) -> Result<Response, ApiError> {
	let body = match payload {
		Ok(Json(body)) => body,
		Err(JsonRejection::MissingJsonContentType(_)) => json!({}),
		Err(rejection) => return Ok(rejection.into_response()),
	};

	tracing::info!(%body, "Validation request received.");

	let token = state.sunat_tokens.acquire().await.map_err(ApiError::Validation)?;
	let upstream = state.validation.validate(&token, &body).await.map_err(ApiError::Validation)?;

	Ok((StatusCode::OK, Json(upstream)).into_response())
}

/// `POST /api/feedback`: validates and stores a feedback record.
pub async fn create_feedback(
	State(state): State<AppState>,
	payload: Result<Json<JsonValue>, JsonRejection>,
) -> Result<(StatusCode, Json<JsonValue>), ApiError> {
	let Json(body) = payload.map_err(|rejection| {
		tracing::debug!(%rejection, "Feedback body is not JSON.");

		ValidationInputError::MalformedBody
	})?;
	let feedback = FeedbackInput::validate(&body)?.into_feedback(OffsetDateTime::now_utc());
	let id = state.feedback.insert(feedback).await.map_err(ApiError::FeedbackStorage)?;

	tracing::info!(%id, backend = state.feedback.backend(), "Feedback stored.");

	Ok((StatusCode::CREATED, Json(json!({ "message": FEEDBACK_STORED, "id": id }))))
}
