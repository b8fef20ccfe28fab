//! SUNAT integration: the client-credentials token source and the comprobante validation client.

pub mod token;
pub mod validation;

pub use token::*;
pub use validation::*;

// self
use crate::{_prelude::*, error::ConfigError, http};

/// Default host of the SUNAT security (OAuth2) API.
pub const DEFAULT_SECURITY_URL: &str = "https://api-seguridad.sunat.gob.pe";
/// Default host of the SUNAT contributor API.
pub const DEFAULT_API_URL: &str = "https://api.sunat.gob.pe";
/// Scope requested for every client-credentials token.
pub const SCOPE: &str = "https://api.sunat.gob.pe/v1/contribuyente/contribuyentes";

/// Base URLs of the two SUNAT APIs.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SunatEndpoints {
	/// Security API hosting the token endpoint.
	pub security: Url,
	/// Contributor API hosting the validation endpoint.
	pub api: Url,
}
impl SunatEndpoints {
	/// Production SUNAT hosts.
	pub fn production() -> Result<Self, ConfigError> {
		Self::parse(DEFAULT_SECURITY_URL, DEFAULT_API_URL)
	}

	/// Parses both base URLs.
	pub fn parse(security: &str, api: &str) -> Result<Self, ConfigError> {
		let parse = |value: &str| {
			Url::parse(value)
				.map_err(|source| ConfigError::InvalidUrl { url: value.to_owned(), source })
		};

		Ok(Self { security: parse(security)?, api: parse(api)? })
	}

	/// `{security}/v1/clientesextranet/{client_id}/oauth2/token/`
	pub fn token_url(&self, client_id: &str) -> Result<Url, ConfigError> {
		http::endpoint(
			&self.security,
			&["v1", "clientesextranet", client_id, "oauth2", "token", ""],
		)
	}

	/// `{api}/v1/contribuyente/contribuyentes/{ruc}/validarcomprobante`
	pub fn validation_url(&self, ruc: &str) -> Result<Url, ConfigError> {
		http::endpoint(
			&self.api,
			&["v1", "contribuyente", "contribuyentes", ruc, "validarcomprobante"],
		)
	}
}
