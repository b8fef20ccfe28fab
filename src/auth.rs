//! Bearer token models: redacted secrets, issued tokens, and the cached record.

pub mod token {
	//! Token value types.

	pub mod cached;
	pub mod secret;
}

pub use token::{cached::*, secret::*};
