//! Client-credentials exchange over the `oauth2` transport seam.

pub use oauth2;

// crates.io
use oauth2::{
	AsyncHttpClient, ClientId, ClientSecret, HttpClientError, HttpRequest, HttpResponse,
	http::{
		Method, Request,
		header::{ACCEPT, CONTENT_TYPE},
	},
};
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	auth::IssuedToken,
	error::{self, ConfigError, RemoteAuthError, TransportError},
	http::{ReqwestHttpClient, ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
};

/// Maps HTTP transport failures into relay [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a relay error.
	fn map_transport_error(
		&self,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		_metadata: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) if inner.is_builder() => ConfigError::from(*inner).into(),
			HttpClientError::Reqwest(inner) =>
				RemoteAuthError::from(TransportError::network("the token endpoint", *inner)).into(),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => RemoteAuthError::from(TransportError::Io(inner)).into(),
			HttpClientError::Other(message) =>
				RemoteAuthError::from(TransportError::Io(std::io::Error::other(message))).into(),
			_ => RemoteAuthError::from(TransportError::Io(std::io::Error::other(
				"HTTP client error occurred while calling the token endpoint",
			)))
			.into(),
		}
	}
}

/// Fields read from a successful token endpoint body; anything else is ignored.
#[derive(Deserialize)]
struct TokenEndpointResponse {
	access_token: String,
	expires_in: u64,
}

/// Client-credentials exchange against a single token URL.
///
/// Credentials travel in the form body (`client_secret_post`); the secret is sent even when empty.
/// A 2xx body is decoded as JSON whatever its content type, and only `access_token` plus
/// `expires_in` are required.
pub(crate) struct ClientCredentialsFacade<C = ReqwestHttpClient, M = ReqwestTransportErrorMapper>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	token_url: Url,
	client_id: ClientId,
	client_secret: ClientSecret,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
impl<C, M> ClientCredentialsFacade<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	pub(crate) fn new(
		token_url: &Url,
		client_id: &str,
		client_secret: &str,
		http_client: Arc<C>,
		error_mapper: Arc<M>,
	) -> Self {
		Self {
			token_url: token_url.clone(),
			client_id: ClientId::new(client_id.to_owned()),
			client_secret: ClientSecret::new(client_secret.to_owned()),
			http_client,
			error_mapper,
		}
	}

	pub(crate) async fn exchange(&self, scope: &str) -> Result<IssuedToken> {
		let request = self.token_request(scope)?;
		let meta = ResponseMetadataSlot::default();
		let instrumented = self.http_client.with_metadata(meta.clone());
		let response = instrumented
			.call(request)
			.await
			.map_err(|err| self.error_mapper.map_transport_error(meta.take().as_ref(), err))?;

		map_token_response(&response)
	}

	fn token_request(&self, scope: &str) -> Result<HttpRequest> {
		let body = form_urlencoded::Serializer::new(String::new())
			.append_pair("grant_type", "client_credentials")
			.append_pair("scope", scope)
			.append_pair("client_id", self.client_id.as_str())
			.append_pair("client_secret", self.client_secret.secret())
			.finish();
		let request = Request::builder()
			.method(Method::POST)
			.uri(self.token_url.as_str())
			.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
			.header(ACCEPT, "application/json")
			.body(body.into_bytes())
			.map_err(ConfigError::from)?;

		Ok(request)
	}
}

fn map_token_response(response: &HttpResponse) -> Result<IssuedToken> {
	let status = response.status();

	if !status.is_success() {
		return Err(RemoteAuthError::Rejected {
			status: Some(status.as_u16()),
			payload: error::decode_payload(response.body()),
		}
		.into());
	}

	let decoded: TokenEndpointResponse =
		serde_path_to_error::deserialize(&mut serde_json::Deserializer::from_slice(response.body()))
			.map_err(|source| RemoteAuthError::Decode { source, status: Some(status.as_u16()) })?;

	Ok(IssuedToken::from_seconds(decoded.access_token, decoded.expires_in)?)
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::StatusCode;
	// self
	use super::*;

	fn response(status: StatusCode, body: &str) -> HttpResponse {
		let mut response = HttpResponse::new(body.as_bytes().to_vec());

		*response.status_mut() = status;

		response
	}

	#[test]
	fn request_posts_form_with_empty_secret() {
		let url =
			Url::parse("https://api-seguridad.sunat.gob.pe/v1/clientesextranet/abc/oauth2/token/")
				.expect("Token URL fixture should parse.");
		let facade = <ClientCredentialsFacade>::new(
			&url,
			"abc",
			"",
			Arc::new(ReqwestHttpClient::default()),
			Arc::new(ReqwestTransportErrorMapper),
		);
		let request = facade.token_request("scope-a").expect("Token request should build.");

		assert_eq!(request.method(), Method::POST);
		assert_eq!(request.uri().to_string(), url.as_str());
		assert_eq!(
			request.headers().get(CONTENT_TYPE).and_then(|value| value.to_str().ok()),
			Some("application/x-www-form-urlencoded")
		);
		assert_eq!(
			String::from_utf8_lossy(request.body()),
			"grant_type=client_credentials&scope=scope-a&client_id=abc&client_secret="
		);
	}

	#[test]
	fn success_body_needs_only_token_and_lifetime() {
		let token = map_token_response(&response(
			StatusCode::OK,
			r#"{"access_token":"t","expires_in":3600}"#,
		))
		.expect("A body without token_type should decode.");

		assert_eq!(token.access_token.expose(), "t");
		assert_eq!(token.expires_in, Duration::seconds(3600));
	}

	#[test]
	fn bodies_split_on_status() {
		let err = map_token_response(&response(StatusCode::OK, "{}"))
			.expect_err("An empty object is not a token response.");

		assert!(matches!(err, Error::RemoteAuth(RemoteAuthError::Decode { status: Some(200), .. })));

		let err =
			map_token_response(&response(StatusCode::INTERNAL_SERVER_ERROR, r#"{"cod":"500"}"#))
				.expect_err("A 500 is a rejection.");

		assert_eq!(err.upstream_payload(), Some(&serde_json::json!({ "cod": "500" })));
	}
}
