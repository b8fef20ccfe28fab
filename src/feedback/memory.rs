//! Thread-safe in-memory [`FeedbackStore`] implementation for local development and tests.

// crates.io
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	feedback::{Feedback, FeedbackStore, StoreFuture},
};

type FeedbackLog = Arc<RwLock<Vec<(String, Feedback)>>>;

/// Storage backend that keeps records in-process, in insertion order.
///
/// Clones share the same log, so a test can keep one handle and give another to the server.
#[derive(Clone, Debug, Default)]
pub struct MemoryFeedbackStore(FeedbackLog);
impl MemoryFeedbackStore {
	/// Returns every stored record with its identifier.
	pub fn records(&self) -> Vec<(String, Feedback)> {
		self.0.read().clone()
	}

	/// Fetches a record by identifier.
	pub fn get(&self, id: &str) -> Option<Feedback> {
		self.0.read().iter().find(|(key, _)| key == id).map(|(_, feedback)| feedback.clone())
	}

	/// Number of stored records.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when nothing has been stored yet.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}

	fn insert_now(log: FeedbackLog, feedback: Feedback) -> String {
		let id = Uuid::new_v4().to_string();

		log.write().push((id.clone(), feedback));

		id
	}
}
impl FeedbackStore for MemoryFeedbackStore {
	fn backend(&self) -> &'static str {
		"memory"
	}

	fn insert(&self, feedback: Feedback) -> StoreFuture<'_, String> {
		let log = self.0.clone();

		Box::pin(async move { Ok(Self::insert_now(log, feedback)) })
	}
}
