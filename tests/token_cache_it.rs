// crates.io
use httpmock::prelude::*;
use time::{Duration, OffsetDateTime, macros};
// self
use sunat_relay::{
	auth::{CachedToken, SAFETY_MARGIN, TokenSecret},
	error::{ConfigError, Error, RemoteAuthError},
	sunat::{SunatEndpoints, SunatTokenCache, SunatTokenSource},
};

const CLIENT_ID: &str = "client-123";
const CLIENT_SECRET: &str = "secret-456";
const TOKEN_PATH: &str = "/v1/clientesextranet/client-123/oauth2/token/";

fn build_cache(
	server: &MockServer,
	client_id: Option<&str>,
	secret: Option<&str>,
) -> SunatTokenCache {
	let endpoints = SunatEndpoints::parse(&server.base_url(), &server.base_url())
		.expect("Mock server URLs should parse.");

	SunatTokenCache::new(SunatTokenSource::new(
		endpoints,
		client_id.map(str::to_owned),
		secret.map(str::to_owned),
	))
}

fn token_body(token: &str, expires_in: u64) -> String {
	format!("{{\"access_token\":\"{token}\",\"token_type\":\"JWT\",\"expires_in\":{expires_in}}}")
}

#[tokio::test]
async fn empty_cache_fetches_once_then_serves_from_memory() {
	let server = MockServer::start_async().await;
	let cache = build_cache(&server, Some(CLIENT_ID), Some(CLIENT_SECRET));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path(TOKEN_PATH)
				.header("content-type", "application/x-www-form-urlencoded")
				.form_urlencoded_tuple("grant_type", "client_credentials")
				.form_urlencoded_tuple(
					"scope",
					"https://api.sunat.gob.pe/v1/contribuyente/contribuyentes",
				)
				.form_urlencoded_tuple("client_id", CLIENT_ID)
				.form_urlencoded_tuple("client_secret", CLIENT_SECRET);
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("first-token", 3600));
		})
		.await;
	let first = cache.acquire().await.expect("Initial acquisition should fetch a token.");

	assert_eq!(first.expose(), "first-token");
	assert!(cache.snapshot().is_some(), "Token should be stored before returning.");

	let second = cache.acquire().await.expect("Fresh cache should be served from memory.");

	assert_eq!(second.expose(), "first-token");

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn expiry_is_remote_lifetime_minus_margin() {
	let server = MockServer::start_async().await;
	let cache = build_cache(&server, Some(CLIENT_ID), Some(CLIENT_SECRET));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("timed-token", 3600));
		})
		.await;
	let now = macros::datetime!(2025-03-01 12:00 UTC);

	cache.acquire_at(now).await.expect("Acquisition should succeed.");

	let cached = cache.snapshot().expect("Token should be cached.");

	assert_eq!(cached.expires_at, now + Duration::seconds(3600) - SAFETY_MARGIN);
	assert_eq!(cached.expires_at, macros::datetime!(2025-03-01 12:59 UTC));

	mock.assert_async().await;
}

#[tokio::test]
async fn expired_record_is_replaced() {
	let server = MockServer::start_async().await;
	let cache = build_cache(&server, Some(CLIENT_ID), Some(CLIENT_SECRET));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("renewed-token", 3600));
		})
		.await;

	cache.store(CachedToken {
		value: TokenSecret::new("expired-token"),
		expires_at: OffsetDateTime::now_utc() - Duration::seconds(1),
	});

	let token = cache.acquire().await.expect("Expired cache should be refreshed.");

	assert_eq!(token.expose(), "renewed-token");
	assert_eq!(
		cache.snapshot().map(|record| record.value.expose().to_owned()),
		Some("renewed-token".into())
	);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn missing_client_id_fails_without_network() {
	let server = MockServer::start_async().await;
	let cache = build_cache(&server, None, Some(CLIENT_SECRET));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST);
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("never", 3600));
		})
		.await;
	let err = cache.acquire().await.expect_err("Missing client id should fail.");

	assert!(matches!(err, Error::Config(ConfigError::MissingClientId)));
	assert!(cache.snapshot().is_none());

	mock.assert_calls_async(0).await;
}

#[tokio::test]
async fn absent_secret_is_sent_empty() {
	let server = MockServer::start_async().await;
	let cache = build_cache(&server, Some(CLIENT_ID), None);
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH).form_urlencoded_tuple("client_secret", "");
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("no-secret-token", 600));
		})
		.await;
	let token = cache.acquire().await.expect("An empty secret is still sent.");

	assert_eq!(token.expose(), "no-secret-token");

	mock.assert_async().await;
}

#[tokio::test]
async fn concurrent_acquires_share_one_fetch() {
	let server = MockServer::start_async().await;
	let cache = build_cache(&server, Some(CLIENT_ID), Some(CLIENT_SECRET));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body(token_body("shared-token", 900));
		})
		.await;
	let (first, second, third) = tokio::join!(cache.acquire(), cache.acquire(), cache.acquire());

	for token in [first, second, third] {
		assert_eq!(token.expect("Concurrent caller should succeed.").expose(), "shared-token");
	}

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn failed_fetch_keeps_stale_record_and_retries() {
	let server = MockServer::start_async().await;
	let cache = build_cache(&server, Some(CLIENT_ID), Some(CLIENT_SECRET));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(500).header("content-type", "application/json").body("{\"cod\":\"500\"}");
		})
		.await;
	let stale = CachedToken {
		value: TokenSecret::new("stale-token"),
		expires_at: OffsetDateTime::now_utc() - Duration::minutes(5),
	};

	cache.store(stale.clone());
	cache.acquire().await.expect_err("Upstream failure should surface.");

	assert_eq!(cache.snapshot(), Some(stale));

	cache.acquire().await.expect_err("The next call should try again.");

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn rejection_carries_upstream_payload() {
	let server = MockServer::start_async().await;
	let cache = build_cache(&server, Some(CLIENT_ID), Some("wrong-secret"));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(401)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_client\",\"error_description\":\"Client not valid\"}");
		})
		.await;
	let err = cache.acquire().await.expect_err("Invalid client should be rejected.");

	match &err {
		Error::RemoteAuth(RemoteAuthError::Rejected { status, payload }) => {
			assert_eq!(*status, Some(401));
			assert_eq!(
				payload.as_ref().and_then(|value| value.get("error")).and_then(|v| v.as_str()),
				Some("invalid_client")
			);
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}

	assert!(err.upstream_payload().is_some());

	mock.assert_async().await;
}

#[tokio::test]
async fn malformed_success_body_is_a_decode_error() {
	let server = MockServer::start_async().await;
	let cache = build_cache(&server, Some(CLIENT_ID), Some(CLIENT_SECRET));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"token_type\":\"JWT\",\"expires_in\":3600}");
		})
		.await;
	let err = cache.acquire().await.expect_err("A body without access_token should fail.");

	assert!(matches!(err, Error::RemoteAuth(RemoteAuthError::Decode { status: Some(200), .. })));
	assert!(cache.snapshot().is_none());

	mock.assert_async().await;
}

#[tokio::test]
async fn body_without_token_type_is_accepted() {
	let server = MockServer::start_async().await;
	let cache = build_cache(&server, Some(CLIENT_ID), Some(CLIENT_SECRET));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"bare-token\",\"expires_in\":3600}");
		})
		.await;
	let token = cache.acquire().await.expect("access_token and expires_in are enough.");

	assert_eq!(token.expose(), "bare-token");

	mock.assert_async().await;
}

#[tokio::test]
async fn success_body_is_decoded_whatever_its_content_type() {
	let server = MockServer::start_async().await;
	let cache = build_cache(&server, Some(CLIENT_ID), Some(CLIENT_SECRET));
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path(TOKEN_PATH);
			then.status(200)
				.header("content-type", "text/plain")
				.body(token_body("plain-token", 3600));
		})
		.await;
	let token = cache.acquire().await.expect("A JSON body labeled text/plain should decode.");

	assert_eq!(token.expose(), "plain-token");
	assert!(cache.snapshot().is_some());

	mock.assert_async().await;
}
