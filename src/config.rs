//! Relay configuration.
//!
//! Configuration is loaded from environment variables. Credentials are redacted in Debug output.

// std
use std::{
	env::{self, VarError},
	net::SocketAddr,
};
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	feedback::{ServiceAccountKey, firestore::DEFAULT_FIRESTORE_URL},
	sunat::{DEFAULT_API_URL, DEFAULT_SECURITY_URL, SunatEndpoints},
};

/// Default HTTP port.
pub const DEFAULT_PORT: u16 = 3000;
/// Environment variables read by [`Config::from_env`].
pub const ENV_VARS: [&str; 7] = [
	"PORT",
	"CLIENT_ID_SUNAT",
	"CLIENT_SECRET_SUNAT",
	"FIREBASE_SERVICE_ACCOUNT",
	"SUNAT_SECURITY_URL",
	"SUNAT_API_URL",
	"FIRESTORE_URL",
];

/// Relay configuration.
#[derive(Clone)]
pub struct Config {
	/// Listening port on all interfaces (`PORT`, default 3000).
	pub port: u16,
	/// SUNAT client identifier (`CLIENT_ID_SUNAT`); checked when a token is needed.
	pub client_id: Option<String>,
	/// SUNAT client secret (`CLIENT_SECRET_SUNAT`).
	pub client_secret: Option<String>,
	/// Firestore credentials (`FIREBASE_SERVICE_ACCOUNT`, JSON key blob).
	pub service_account: Option<ServiceAccountKey>,
	/// SUNAT API hosts (`SUNAT_SECURITY_URL`, `SUNAT_API_URL`).
	pub sunat: SunatEndpoints,
	/// Firestore REST host (`FIRESTORE_URL`).
	pub firestore_url: Url,
}
impl Config {
	/// Load configuration from environment variables.
	///
	/// Only the names in [`ENV_VARS`] are read; unrelated variables are never inspected.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_vars(&lookup_vars(env::var)?)
	}

	/// Load configuration from a map of variables.
	///
	/// Empty values count as unset.
	pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
		let var = |name: &str| vars.get(name).filter(|value| !value.trim().is_empty());
		let port = match var("PORT") {
			Some(raw) => raw.trim().parse::<u16>().map_err(|e| ConfigError::InvalidEnvVar {
				name: "PORT",
				reason: format!("expected a port number, got '{raw}': {e}"),
			})?,
			None => DEFAULT_PORT,
		};
		let client_id = var("CLIENT_ID_SUNAT").cloned();
		let client_secret = var("CLIENT_SECRET_SUNAT").cloned();
		let service_account = var("FIREBASE_SERVICE_ACCOUNT")
			.map(|raw| ServiceAccountKey::from_json(raw))
			.transpose()?;
		let sunat = SunatEndpoints::parse(
			var("SUNAT_SECURITY_URL").map_or(DEFAULT_SECURITY_URL, String::as_str),
			var("SUNAT_API_URL").map_or(DEFAULT_API_URL, String::as_str),
		)?;
		let firestore_url = var("FIRESTORE_URL").map_or(DEFAULT_FIRESTORE_URL, String::as_str);
		let firestore_url = Url::parse(firestore_url)
			.map_err(|source| ConfigError::InvalidUrl { url: firestore_url.to_owned(), source })?;

		Ok(Self { port, client_id, client_secret, service_account, sunat, firestore_url })
	}

	/// Socket address the HTTP server binds to.
	pub fn bind_address(&self) -> SocketAddr {
		SocketAddr::from(([0, 0, 0, 0], self.port))
	}
}
impl Debug for Config {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Config")
			.field("port", &self.port)
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
			.field("service_account", &self.service_account)
			.field("sunat", &self.sunat)
			.field("firestore_url", &self.firestore_url.as_str())
			.finish()
	}
}

fn lookup_vars<F>(lookup: F) -> Result<HashMap<String, String>, ConfigError>
where
	F: Fn(&'static str) -> Result<String, VarError>,
{
	let mut vars = HashMap::new();

	for name in ENV_VARS {
		match lookup(name) {
			Ok(value) => {
				vars.insert(name.to_owned(), value);
			},
			Err(VarError::NotPresent) => {},
			Err(VarError::NotUnicode(_)) =>
				return Err(ConfigError::InvalidEnvVar {
					name,
					reason: "value is not valid Unicode".into(),
				}),
		}
	}

	Ok(vars)
}
