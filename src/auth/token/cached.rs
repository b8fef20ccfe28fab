//! Cached token record and the decoded token endpoint response.

// self
use crate::{_prelude::*, auth::TokenSecret, error::RemoteAuthError};

/// Fixed reduction applied to every remote token lifetime before caching.
pub const SAFETY_MARGIN: Duration = Duration::seconds(60);

/// Token minted by a remote authority, before the safety margin is applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedToken {
	/// Bearer token value.
	pub access_token: TokenSecret,
	/// Remote lifetime.
	pub expires_in: Duration,
}
impl IssuedToken {
	/// Builds an issued token from the raw `expires_in` seconds returned by the provider.
	pub fn from_seconds(
		access_token: impl Into<String>,
		expires_in: u64,
	) -> Result<Self, RemoteAuthError> {
		let secs = i64::try_from(expires_in)
			.map_err(|_| RemoteAuthError::InvalidExpiry { reason: "value out of range" })?;

		if secs <= 0 {
			return Err(RemoteAuthError::InvalidExpiry { reason: "value must be positive" });
		}

		Ok(Self {
			access_token: TokenSecret::new(access_token),
			expires_in: Duration::seconds(secs),
		})
	}
}

/// The single token held by a [`TokenCache`](crate::cache::TokenCache).
///
/// `expires_at` is the remote expiry minus [`SAFETY_MARGIN`]; a value without an expiry cannot be
/// constructed.
#[derive(Clone, PartialEq, Eq)]
pub struct CachedToken {
	/// Bearer token value.
	pub value: TokenSecret,
	/// Instant after which the token must be fetched again.
	pub expires_at: OffsetDateTime,
}
impl CachedToken {
	/// Caches an issued token received at `now`.
	pub fn issued_at(token: IssuedToken, now: OffsetDateTime) -> Result<Self, RemoteAuthError> {
		let expires_at = now
			.checked_add(token.expires_in)
			.and_then(|instant| instant.checked_sub(SAFETY_MARGIN))
			.ok_or(RemoteAuthError::InvalidExpiry { reason: "value out of range" })?;

		Ok(Self { value: token.access_token, expires_at })
	}

	/// Returns `true` while `now` is strictly before the cached expiry.
	pub fn is_fresh_at(&self, now: OffsetDateTime) -> bool {
		now < self.expires_at
	}
}
impl Debug for CachedToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CachedToken")
			.field("value", &"<redacted>")
			.field("expires_at", &self.expires_at)
			.finish()
	}
}
