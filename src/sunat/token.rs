//! Client-credentials token source for the SUNAT security API.

// self
use crate::{
	_prelude::*,
	auth::IssuedToken,
	cache::{TokenCache, TokenFuture, TokenSource},
	error::ConfigError,
	http::{ReqwestHttpClient, TokenHttpClient},
	oauth::{ClientCredentialsFacade, ReqwestTransportErrorMapper, TransportErrorMapper},
	obs::FlowKind,
	sunat::{SCOPE, SunatEndpoints},
};

/// Token gate specialized for the default reqwest-backed SUNAT source.
pub type SunatTokenCache = TokenCache<SunatTokenSource>;

/// Fetches SUNAT bearer tokens with the client-credentials grant.
///
/// The client identifier is only checked when a fetch is needed, so the relay starts without
/// credentials and reports the gap per request. The client secret is sent as-is (empty when
/// unset).
pub struct SunatTokenSource<C = ReqwestHttpClient, M = ReqwestTransportErrorMapper>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	endpoints: SunatEndpoints,
	client_id: Option<String>,
	client_secret: Option<String>,
	http_client: Arc<C>,
	transport_mapper: Arc<M>,
}
impl<C, M> SunatTokenSource<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a source that reuses the caller-provided transport + mapper pair.
	pub fn with_http_client(
		endpoints: SunatEndpoints,
		client_id: Option<String>,
		client_secret: Option<String>,
		http_client: impl Into<Arc<C>>,
		mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			endpoints,
			client_id,
			client_secret,
			http_client: http_client.into(),
			transport_mapper: mapper.into(),
		}
	}

	/// Returns `true` when a client identifier is configured.
	pub fn has_client_id(&self) -> bool {
		self.client_id.is_some()
	}

	async fn request(&self) -> Result<IssuedToken> {
		let client_id = self.client_id.as_deref().ok_or(ConfigError::MissingClientId)?;
		let token_url = self.endpoints.token_url(client_id)?;
		let facade = <ClientCredentialsFacade<C, M>>::new(
			&token_url,
			client_id,
			self.client_secret.as_deref().unwrap_or_default(),
			self.http_client.clone(),
			self.transport_mapper.clone(),
		);

		tracing::debug!(%token_url, "Requesting SUNAT client-credentials token.");

		facade.exchange(SCOPE).await
	}
}
impl SunatTokenSource {
	/// Creates a source backed by a default reqwest client.
	pub fn new(
		endpoints: SunatEndpoints,
		client_id: Option<String>,
		client_secret: Option<String>,
	) -> Self {
		Self::with_http_client(
			endpoints,
			client_id,
			client_secret,
			ReqwestHttpClient::default(),
			Arc::new(ReqwestTransportErrorMapper),
		)
	}
}
impl<C, M> TokenSource for SunatTokenSource<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn flow(&self) -> FlowKind {
		FlowKind::SunatToken
	}

	fn fetch(&self) -> TokenFuture<'_, IssuedToken> {
		Box::pin(self.request())
	}
}
impl<C, M> Debug for SunatTokenSource<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SunatTokenSource")
			.field("endpoints", &self.endpoints)
			.field("client_id", &self.client_id)
			.field("client_secret_set", &self.client_secret.is_some())
			.finish()
	}
}
