//! HTTP surface of the relay.
//!
//! Defines the axum router, the shared application state, and server startup with graceful
//! shutdown.

pub mod error;
pub mod handlers;

pub use error::ApiError;

// std
use std::io;
// crates.io
use axum::{
	Router,
	routing::{get, post},
};
use tokio::{net::TcpListener, signal};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
// self
use crate::{
	_prelude::*,
	config::Config,
	error::ConfigError,
	feedback::{FeedbackStore, FirestoreFeedbackStore, MemoryFeedbackStore},
	http::ReqwestHttpClient,
	oauth::ReqwestTransportErrorMapper,
	sunat::{SunatTokenCache, SunatTokenSource, ValidationClient},
};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
	/// Token gate for the SUNAT identity.
	pub sunat_tokens: Arc<SunatTokenCache>,
	/// Comprobante validation client.
	pub validation: Arc<ValidationClient>,
	/// Feedback backend.
	pub feedback: Arc<dyn FeedbackStore>,
}
impl AppState {
	/// Builds the state from configuration, choosing Firestore when a service account is set
	/// and an in-memory store otherwise.
	pub fn from_config(config: &Config) -> Result<Self> {
		let http_client = http_client()?;
		let feedback: Arc<dyn FeedbackStore> = match &config.service_account {
			Some(key) => {
				let store = FirestoreFeedbackStore::with_base_url(
					key,
					&config.firestore_url,
					http_client.clone(),
				)?;

				tracing::info!(
					project_id = %key.project_id,
					"Firestore feedback store initialized."
				);

				Arc::new(store)
			},
			None => {
				tracing::warn!(
					"FIREBASE_SERVICE_ACCOUNT is not set; feedback is kept in memory only."
				);

				Arc::new(MemoryFeedbackStore::default())
			},
		};

		Ok(Self::with_feedback_store(config, http_client, feedback))
	}

	/// Builds the state around an explicit feedback store.
	pub fn with_feedback_store(
		config: &Config,
		http_client: ReqwestHttpClient,
		feedback: Arc<dyn FeedbackStore>,
	) -> Self {
		let source = <SunatTokenSource>::with_http_client(
			config.sunat.clone(),
			config.client_id.clone(),
			config.client_secret.clone(),
			http_client.clone(),
			ReqwestTransportErrorMapper,
		);

		if !source.has_client_id() {
			tracing::warn!("CLIENT_ID_SUNAT is not set; token requests will fail until it is.");
		}

		Self {
			sunat_tokens: Arc::new(SunatTokenCache::new(source)),
			validation: Arc::new(ValidationClient::new(config.sunat.clone(), http_client)),
			feedback,
		}
	}
}
impl Debug for AppState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("AppState")
			.field("sunat_tokens", &self.sunat_tokens)
			.field("validation", &self.validation)
			.field("feedback", &self.feedback.backend())
			.finish()
	}
}

/// Outbound HTTP client shared by every upstream call.
///
/// Redirects are disabled so credentials are never replayed to another host.
pub fn http_client() -> Result<ReqwestHttpClient, ConfigError> {
	let client = ReqwestClient::builder().redirect(reqwest::redirect::Policy::none()).build()?;

	Ok(ReqwestHttpClient::with_client(client))
}

/// Build the application routes.
///
/// - `GET /` liveness text
/// - `GET /api/test-token` token gate probe
/// - `POST /api/sunat/validar-comprobante` validation passthrough
/// - `POST /api/feedback` feedback insert
///
/// CORS is permissive and every request is traced.
pub fn build_router(state: AppState) -> Router {
	Router::new()
		.route("/", get(handlers::root))
		.route("/api/test-token", get(handlers::test_token))
		.route("/api/sunat/validar-comprobante", post(handlers::validate_comprobante))
		.route("/api/feedback", post(handlers::create_feedback))
		.with_state(state)
		.layer(CorsLayer::permissive())
		.layer(TraceLayer::new_for_http())
}

/// Serves `router` until SIGINT or SIGTERM is received.
pub async fn serve(listener: TcpListener, router: Router) -> io::Result<()> {
	serve_with_shutdown(listener, router, shutdown_signal()).await
}

/// Serves `router` until `shutdown` resolves.
pub async fn serve_with_shutdown<F>(
	listener: TcpListener,
	router: Router,
	shutdown: F,
) -> io::Result<()>
where
	F: 'static + Send + Future<Output = ()>,
{
	if let Ok(addr) = listener.local_addr() {
		tracing::info!(%addr, "Servidor corriendo.");
	}

	axum::serve(listener, router).with_graceful_shutdown(shutdown).await
}

/// Resolves once SIGINT or SIGTERM is received.
pub async fn shutdown_signal() {
	let ctrl_c = async {
		match signal::ctrl_c().await {
			Ok(()) => tracing::info!("Received SIGINT, starting graceful shutdown."),
			Err(e) => tracing::error!(error = %e, "Failed to listen for SIGINT."),
		}
	};
	#[cfg(unix)]
	let terminate = async {
		match signal::unix::signal(signal::unix::SignalKind::terminate()) {
			Ok(mut stream) => {
				stream.recv().await;
				tracing::info!("Received SIGTERM, starting graceful shutdown.");
			},
			Err(e) => {
				tracing::error!(error = %e, "Failed to listen for SIGTERM.");
				std::future::pending::<()>().await;
			},
		}
	};
	#[cfg(not(unix))]
	let terminate = std::future::pending::<()>();

	tokio::select! {
		_ = ctrl_c => {},
		_ = terminate => {},
	}
}
