//! `sunat-relay` server binary.

// std
use std::error::Error;
// crates.io
use tokio::net::TcpListener;
// self
use sunat_relay::{
	api::{self, AppState},
	config::Config,
	obs,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
	obs::init_tracing();

	let config = Config::from_env().inspect_err(|e| {
		tracing::error!(error = %e, "Invalid configuration.");
	})?;

	tracing::debug!(?config, "Configuration loaded.");

	let state = AppState::from_config(&config)?;
	let listener = TcpListener::bind(config.bind_address()).await?;

	api::serve(listener, api::build_router(state)).await?;
	tracing::info!("Server stopped.");

	Ok(())
}
