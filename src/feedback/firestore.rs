//! Firestore-backed [`FeedbackStore`] using the REST API and a service account identity.
//!
//! The store signs an RS256 assertion with the service account key, trades it for a bearer token
//! at the key's `token_uri` (JWT bearer grant), and keeps that token in its own
//! [`TokenCache`], so the Google identity follows the same expiry rules as the SUNAT one.

// crates.io
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde_json::json;
use time::format_description::well_known::Rfc3339;
// self
use crate::{
	_prelude::*,
	auth::IssuedToken,
	cache::{TokenCache, TokenFuture, TokenSource},
	error::{self, ConfigError, RemoteAuthError, TransportError},
	feedback::{Feedback, FeedbackStore, StoreError, StoreFuture},
	http::{self, ReqwestHttpClient},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Default Firestore REST host.
pub const DEFAULT_FIRESTORE_URL: &str = "https://firestore.googleapis.com";
/// Default OAuth2 token endpoint for Google service accounts.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";
/// Scope granting Firestore document access.
pub const DATASTORE_SCOPE: &str = "https://www.googleapis.com/auth/datastore";
/// Collection receiving feedback documents.
pub const COLLECTION: &str = "feedback";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";
const ASSERTION_LIFETIME: Duration = Duration::hours(1);
// Assertions issued "in the future" are refused; backdate `iat` to absorb clock skew.
const CLOCK_SKEW_FUDGE: Duration = Duration::seconds(10);

/// Subset of a Google service account JSON key used by the relay.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
	/// Project hosting the Firestore database.
	pub project_id: String,
	/// Service account e-mail, used as the assertion issuer.
	pub client_email: String,
	/// PEM-encoded RSA private key.
	pub private_key: String,
	/// Identifier of `private_key`, forwarded as the JWT `kid`.
	#[serde(default)]
	pub private_key_id: Option<String>,
	/// OAuth2 token endpoint for the JWT bearer grant.
	#[serde(default = "default_token_uri")]
	pub token_uri: String,
}
impl ServiceAccountKey {
	/// Parses the JSON blob stored in `FIREBASE_SERVICE_ACCOUNT`.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		serde_json::from_str(raw).map_err(ConfigError::invalid_service_account)
	}
}
impl Debug for ServiceAccountKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceAccountKey")
			.field("project_id", &self.project_id)
			.field("client_email", &self.client_email)
			.field("private_key", &"<redacted>")
			.field("private_key_id", &self.private_key_id)
			.field("token_uri", &self.token_uri)
			.finish()
	}
}

fn default_token_uri() -> String {
	DEFAULT_TOKEN_URI.into()
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
	iss: &'a str,
	scope: &'a str,
	aud: &'a str,
	#[serde(with = "time::serde::timestamp")]
	iat: OffsetDateTime,
	#[serde(with = "time::serde::timestamp")]
	exp: OffsetDateTime,
}

#[derive(Deserialize)]
struct GoogleTokenResponse {
	access_token: String,
	expires_in: u64,
}

/// Mints Google access tokens for a service account with the JWT bearer grant.
pub struct ServiceAccountTokenSource {
	client_email: String,
	private_key_id: Option<String>,
	signing_key: EncodingKey,
	token_url: Url,
	http_client: ReqwestHttpClient,
}
impl ServiceAccountTokenSource {
	/// Prepares the signing key and token endpoint for `key`.
	pub fn new(
		key: &ServiceAccountKey,
		http_client: ReqwestHttpClient,
	) -> Result<Self, ConfigError> {
		let signing_key = EncodingKey::from_rsa_pem(key.private_key.as_bytes())
			.map_err(ConfigError::invalid_service_account)?;
		let token_url = Url::parse(&key.token_uri)
			.map_err(|source| ConfigError::InvalidUrl { url: key.token_uri.clone(), source })?;

		Ok(Self {
			client_email: key.client_email.clone(),
			private_key_id: key.private_key_id.clone(),
			signing_key,
			token_url,
			http_client,
		})
	}

	/// Builds the signed assertion presented to the token endpoint.
	pub fn assertion_at(&self, now: OffsetDateTime) -> Result<String, ConfigError> {
		let iat = now - CLOCK_SKEW_FUDGE;
		let claims = AssertionClaims {
			iss: &self.client_email,
			scope: DATASTORE_SCOPE,
			aud: self.token_url.as_str(),
			iat,
			exp: iat + ASSERTION_LIFETIME,
		};
		let mut header = Header::new(Algorithm::RS256);

		header.kid = self.private_key_id.clone();

		jsonwebtoken::encode(&header, &claims, &self.signing_key)
			.map_err(ConfigError::invalid_service_account)
	}

	async fn request(&self) -> Result<IssuedToken> {
		let assertion = self.assertion_at(OffsetDateTime::now_utc())?;
		let response = self
			.http_client
			.post(self.token_url.clone())
			.form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
			.send()
			.await
			.map_err(auth_transport_error)?;
		let status = response.status();
		let bytes = response.bytes().await.map_err(auth_transport_error)?;

		if !status.is_success() {
			return Err(RemoteAuthError::Rejected {
				status: Some(status.as_u16()),
				payload: error::decode_payload(&bytes),
			}
			.into());
		}

		let decoded: GoogleTokenResponse =
			serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(&bytes))
				.map_err(|source| RemoteAuthError::Decode {
					source,
					status: Some(status.as_u16()),
				})?;

		Ok(IssuedToken::from_seconds(decoded.access_token, decoded.expires_in)?)
	}
}
impl TokenSource for ServiceAccountTokenSource {
	fn flow(&self) -> FlowKind {
		FlowKind::ServiceAccountToken
	}

	fn fetch(&self) -> TokenFuture<'_, IssuedToken> {
		Box::pin(self.request())
	}
}
impl Debug for ServiceAccountTokenSource {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceAccountTokenSource")
			.field("client_email", &self.client_email)
			.field("token_url", &self.token_url.as_str())
			.finish()
	}
}

fn auth_transport_error(e: ReqwestError) -> RemoteAuthError {
	TransportError::network("the service account token endpoint", e).into()
}

#[derive(Deserialize)]
struct CreatedDocument {
	name: String,
}

/// Appends feedback documents to the `feedback` collection of a Firestore database.
#[derive(Debug)]
pub struct FirestoreFeedbackStore {
	tokens: TokenCache<ServiceAccountTokenSource>,
	documents_url: Url,
	http_client: ReqwestHttpClient,
}
impl FirestoreFeedbackStore {
	/// Creates a store that talks to the production Firestore host.
	pub fn new(
		key: &ServiceAccountKey,
		http_client: ReqwestHttpClient,
	) -> Result<Self, ConfigError> {
		let base = Url::parse(DEFAULT_FIRESTORE_URL).map_err(|source| ConfigError::InvalidUrl {
			url: DEFAULT_FIRESTORE_URL.into(),
			source,
		})?;

		Self::with_base_url(key, &base, http_client)
	}

	/// Creates a store that talks to the Firestore REST API under `base`.
	pub fn with_base_url(
		key: &ServiceAccountKey,
		base: &Url,
		http_client: ReqwestHttpClient,
	) -> Result<Self, ConfigError> {
		let project = key.project_id.as_str();
		let documents_url = http::endpoint(
			base,
			&["v1", "projects", project, "databases", "(default)", "documents", COLLECTION],
		)?;
		let source = ServiceAccountTokenSource::new(key, http_client.clone())?;

		Ok(Self {
			tokens: <TokenCache<ServiceAccountTokenSource>>::new(source),
			documents_url,
			http_client,
		})
	}

	/// Returns the collection URL documents are posted to.
	pub fn documents_url(&self) -> &Url {
		&self.documents_url
	}

	/// Returns the token cache guarding the service account identity.
	pub fn tokens(&self) -> &TokenCache<ServiceAccountTokenSource> {
		&self.tokens
	}

	async fn insert_document(&self, feedback: Feedback) -> Result<String> {
		let token = self.tokens.acquire().await?;
		let document = to_document(&feedback)?;
		let response = self
			.http_client
			.post(self.documents_url.clone())
			.bearer_auth(token.expose())
			.json(&document)
			.send()
			.await
			.map_err(store_transport_error)?;
		let status = response.status();
		let bytes = response.bytes().await.map_err(store_transport_error)?;

		if !status.is_success() {
			return Err(StoreError::Rejected {
				status: status.as_u16(),
				payload: error::decode_payload(&bytes),
			}
			.into());
		}

		let created: CreatedDocument = serde_json::from_slice(&bytes)
			.map_err(|e| StoreError::Serialization { message: e.to_string() })?;

		let id = document_id(&created.name).ok_or_else(|| StoreError::Backend {
			message: format!("unexpected document name `{}`", created.name),
		})?;

		Ok(id.to_owned())
	}
}
impl FeedbackStore for FirestoreFeedbackStore {
	fn backend(&self) -> &'static str {
		"firestore"
	}

	fn insert(&self, feedback: Feedback) -> StoreFuture<'_, String> {
		const KIND: FlowKind = FlowKind::FeedbackInsert;

		Box::pin(async move {
			obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

			let span = FlowSpan::new(KIND, "insert");
			let result = span.instrument(self.insert_document(feedback)).await;

			match &result {
				Ok(id) => {
					tracing::info!(%id, "Feedback document created.");
					obs::record_flow_outcome(KIND, FlowOutcome::Success);
				},
				Err(e) => {
					tracing::error!(error = %e, "Feedback insert failed.");
					obs::record_flow_outcome(KIND, FlowOutcome::Failure);
				},
			}

			result
		})
	}
}

fn store_transport_error(e: ReqwestError) -> StoreError {
	TransportError::network("the Firestore API", e).into()
}

/// Encodes a feedback record as a Firestore document with typed fields.
pub fn to_document(feedback: &Feedback) -> Result<JsonValue, StoreError> {
	let timestamp = feedback
		.timestamp
		.format(&Rfc3339)
		.map_err(|e| StoreError::Serialization { message: e.to_string() })?;

	Ok(json!({
		"fields": {
			"scanTimeEstimate": { "stringValue": feedback.scan_time_estimate },
			"efficiencyRating": { "integerValue": feedback.efficiency_rating.to_string() },
			"timestamp": { "timestampValue": timestamp },
		}
	}))
}

fn document_id(name: &str) -> Option<&str> {
	name.rsplit('/').next().filter(|id| !id.is_empty() && *id != name)
}
