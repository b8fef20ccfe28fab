//! Token cache gate placed in front of every call that needs a remote bearer token.
//!
//! [`TokenCache`] owns a single [`CachedToken`] and a [`TokenSource`] able to mint new ones. A
//! call to [`TokenCache::acquire`] returns the cached value while it is fresh and otherwise asks
//! the source for a new token, stamping it with the [`SAFETY_MARGIN`](crate::auth::SAFETY_MARGIN)
//! before storing it. Fetches run behind a single-flight guard: callers that find the cache
//! stale queue on the guard and re-check the record once they hold it, so one expiry produces
//! one outbound token request. A failed fetch leaves the previous record in place.

// self
use crate::{
	_prelude::*,
	auth::{CachedToken, IssuedToken, TokenSecret},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
};

/// Boxed future returned by [`TokenSource::fetch`].
pub type TokenFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Remote authority able to mint bearer tokens.
pub trait TokenSource
where
	Self: Send + Sync,
{
	/// Flow label used for spans and metrics.
	fn flow(&self) -> FlowKind;

	/// Requests a new token from the remote authority.
	fn fetch(&self) -> TokenFuture<'_, IssuedToken>;
}

/// Single-slot token cache with single-flight fetches.
pub struct TokenCache<S>
where
	S: ?Sized + TokenSource,
{
	source: Arc<S>,
	state: RwLock<Option<CachedToken>>,
	singleflight: AsyncMutex<()>,
}
impl<S> TokenCache<S>
where
	S: ?Sized + TokenSource,
{
	/// Creates an empty cache backed by `source`.
	pub fn new(source: impl Into<Arc<S>>) -> Self {
		Self { source: source.into(), state: RwLock::new(None), singleflight: AsyncMutex::new(()) }
	}

	/// Returns the token source.
	pub fn source(&self) -> &S {
		self.source.as_ref()
	}

	/// Returns a copy of the cached record, if any.
	pub fn snapshot(&self) -> Option<CachedToken> {
		self.state.read().clone()
	}

	/// Replaces the cached record wholesale.
	pub fn store(&self, token: CachedToken) {
		*self.state.write() = Some(token);
	}

	/// Returns a valid bearer token, fetching a new one when the cache is empty or stale.
	///
	/// A fetched token is stamped with the clock reading taken once the fetch resolves, so time
	/// spent queued on the single-flight guard does not shorten its cached lifetime.
	pub async fn acquire(&self) -> Result<TokenSecret> {
		self.acquire_with(OffsetDateTime::now_utc).await
	}

	/// Same as [`acquire`](Self::acquire) with an explicit clock reading used for every check.
	pub async fn acquire_at(&self, now: OffsetDateTime) -> Result<TokenSecret> {
		self.acquire_with(move || now).await
	}

	async fn acquire_with<F>(&self, clock: F) -> Result<TokenSecret>
	where
		F: Send + Sync + Fn() -> OffsetDateTime,
	{
		let kind = self.source.flow();

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		if let Some(token) = self.fresh_at(clock()) {
			tracing::debug!(flow = kind.as_str(), "Using cached token; still valid.");
			obs::record_flow_outcome(kind, FlowOutcome::CacheHit);

			return Ok(token);
		}

		let span = FlowSpan::new(kind, "acquire");
		let result: Result<TokenSecret> = span
			.instrument(async {
				let _singleflight = self.singleflight.lock().await;

				// Another caller may have refreshed the record while this one waited.
				if let Some(token) = self.fresh_at(clock()) {
					return Ok(token);
				}

				tracing::info!("Token missing or expired; requesting a new one.");

				let issued = self.source.fetch().await?;
				let cached = CachedToken::issued_at(issued, clock())?;
				let token = cached.value.clone();

				tracing::info!(expires_at = %cached.expires_at, "New token obtained and cached.");
				self.store(cached);

				Ok(token)
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(kind, FlowOutcome::Success),
			Err(e) => {
				tracing::error!(flow = kind.as_str(), error = %e, "Token acquisition failed.");
				obs::record_flow_outcome(kind, FlowOutcome::Failure);
			},
		}

		result
	}

	fn fresh_at(&self, now: OffsetDateTime) -> Option<TokenSecret> {
		self.state
			.read()
			.as_ref()
			.filter(|token| token.is_fresh_at(now))
			.map(|token| token.value.clone())
	}
}
impl<S> Debug for TokenCache<S>
where
	S: ?Sized + TokenSource,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenCache")
			.field("flow", &self.source.flow())
			.field("cached", &*self.state.read())
			.finish()
	}
}
