//! Comprobante validation passthrough.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	error::{self, RemoteValidationError, TransportError},
	http::ReqwestHttpClient,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	sunat::SunatEndpoints,
};

/// Forwards validation requests to the SUNAT contributor API.
#[derive(Clone, Debug)]
pub struct ValidationClient {
	http_client: ReqwestHttpClient,
	endpoints: SunatEndpoints,
}
impl ValidationClient {
	/// Creates a client for the given endpoints.
	pub fn new(endpoints: SunatEndpoints, http_client: ReqwestHttpClient) -> Self {
		Self { http_client, endpoints }
	}

	/// Posts `body` verbatim to the validation endpoint of the RUC named in `body.numRuc` and
	/// returns the upstream JSON body.
	///
	/// A missing `numRuc` is forwarded as the literal `undefined` path segment.
	pub async fn validate(&self, token: &TokenSecret, body: &JsonValue) -> Result<JsonValue> {
		const KIND: FlowKind = FlowKind::ComprobanteValidation;

		let url = self.endpoints.validation_url(&ruc_segment(body))?;
		let span = FlowSpan::new(KIND, "validate");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				tracing::info!(%url, "Querying SUNAT validation endpoint.");

				let response = self
					.http_client
					.post(url)
					.bearer_auth(token.expose())
					.json(body)
					.send()
					.await
					.map_err(transport_error)?;
				let status = response.status();
				let bytes = response.bytes().await.map_err(transport_error)?;

				if !status.is_success() {
					return Err(RemoteValidationError::Rejected {
						status: status.as_u16(),
						payload: error::decode_payload(&bytes),
					});
				}
				if bytes.is_empty() {
					return Ok(JsonValue::Null);
				}

				serde_json::from_slice(&bytes)
					.map_err(|source| RemoteValidationError::Decode { source })
			})
			.await;

		match &result {
			Ok(payload) => {
				tracing::info!(%payload, "SUNAT validation response received.");
				obs::record_flow_outcome(KIND, FlowOutcome::Success);
			},
			Err(e) => {
				tracing::error!(error = %e, "SUNAT validation failed.");
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		Ok(result?)
	}
}

/// Renders `numRuc` the way the frontend contract expects it in the URL path.
///
/// Strings are used verbatim, a missing field becomes `undefined`, and any other JSON value uses
/// its JSON text (`null`, `20123456789`, ...).
pub fn ruc_segment(body: &JsonValue) -> String {
	match body.get("numRuc") {
		None => "undefined".into(),
		Some(JsonValue::String(ruc)) => ruc.clone(),
		Some(other) => other.to_string(),
	}
}

fn transport_error(e: ReqwestError) -> RemoteValidationError {
	TransportError::network("the validation endpoint", e).into()
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;

	#[test]
	fn ruc_segment_mirrors_template_rendering() {
		assert_eq!(ruc_segment(&json!({ "numRuc": "20123456789" })), "20123456789");
		assert_eq!(ruc_segment(&json!({ "numRuc": 20123456789_u64 })), "20123456789");
		assert_eq!(ruc_segment(&json!({ "numRuc": null })), "null");
		assert_eq!(ruc_segment(&json!({ "codComp": "01" })), "undefined");
		assert_eq!(ruc_segment(&json!(["not", "an", "object"])), "undefined");
	}
}
