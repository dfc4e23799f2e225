//! Requesting-context handles.
//!
//! The embedder owns a [`RequestingContext`] for every frame that may open a
//! chooser. Sessions only ever see a [`RequestingIdentity`], which refers to
//! the context weakly and has to be checked with
//! [`is_alive`](RequestingIdentity::is_alive) before the context is used.

use std::fmt;
use std::sync::{Arc, Weak};

use serial_chooser_protocol::{IdentityKey, OriginPair};

struct ContextToken {
	key: IdentityKey,
}

/// Owner side of a requesting context. Dropping it ends the context's life.
pub struct RequestingContext {
	token: Arc<ContextToken>,
	origins: OriginPair,
}

impl RequestingContext {
	pub fn new(key: IdentityKey, origins: OriginPair) -> Self {
		Self {
			token: Arc::new(ContextToken { key }),
			origins,
		}
	}

	pub fn key(&self) -> IdentityKey {
		self.token.key
	}

	pub fn origins(&self) -> &OriginPair {
		&self.origins
	}

	/// Returns a non-owning identity for this context.
	pub fn identity(&self) -> RequestingIdentity {
		RequestingIdentity {
			key: self.token.key,
			origins: self.origins.clone(),
			liveness: Some(Arc::downgrade(&self.token)),
		}
	}
}

impl fmt::Debug for RequestingContext {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RequestingContext")
			.field("key", &self.token.key)
			.field("origins", &self.origins)
			.finish()
	}
}

/// Non-owning handle to a requesting context.
#[derive(Clone)]
pub struct RequestingIdentity {
	key: IdentityKey,
	origins: OriginPair,
	liveness: Option<Weak<ContextToken>>,
}

impl RequestingIdentity {
	/// Creates an identity whose lifetime is signalled only through
	/// explicit destruction notifications.
	pub fn untracked(key: IdentityKey, origins: OriginPair) -> Self {
		Self {
			key,
			origins,
			liveness: None,
		}
	}

	pub fn key(&self) -> IdentityKey {
		self.key
	}

	/// Origins a grant for this identity is recorded against.
	pub fn origins(&self) -> &OriginPair {
		&self.origins
	}

	/// Returns false once the owning [`RequestingContext`] has been dropped.
	pub fn is_alive(&self) -> bool {
		match &self.liveness {
			Some(token) => token.strong_count() > 0,
			None => true,
		}
	}
}

impl fmt::Debug for RequestingIdentity {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_struct("RequestingIdentity")
			.field("key", &self.key)
			.field("origins", &self.origins)
			.field("alive", &self.is_alive())
			.finish()
	}
}
