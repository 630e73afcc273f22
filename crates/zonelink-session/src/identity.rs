//! Display-name lookup for authenticated user ids.
//!
//! Clients only present a numeric user id during the security exchange.
//! The server asks an [`IdentityResolver`] for the display name to show
//! everywhere else. The resolver is the seam for whatever directory holds
//! accounts; [`StaticResolver`] serves a fixed table.

use std::collections::HashMap;
use std::future::Future;

/// Why a lookup produced no name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LookupError {
    /// The directory has no entry for this id.
    #[error("no display name for user {0}")]
    Unknown(i32),

    /// The directory could not be reached or answered garbage.
    #[error("identity service unavailable: {0}")]
    Unavailable(String),
}

/// Resolves user ids to display names.
///
/// Called once per connection during the security exchange. `Send + Sync`
/// because every connection task shares one resolver.
///
/// # Example
///
/// ```rust
/// use zonelink_session::{IdentityResolver, LookupError};
///
/// /// Names every user after their id.
/// struct NumberedNames;
///
/// impl IdentityResolver for NumberedNames {
///     async fn resolve(&self, user_id: i32) -> Result<String, LookupError> {
///         Ok(format!("user{user_id}"))
///     }
/// }
/// ```
pub trait IdentityResolver: Send + Sync + 'static {
    /// Returns the display name for `user_id`.
    fn resolve(
        &self,
        user_id: i32,
    ) -> impl Future<Output = Result<String, LookupError>> + Send;
}

/// Resolves from an in-memory table.
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    names: HashMap<i32, String>,
}

impl StaticResolver {
    pub fn new(names: HashMap<i32, String>) -> Self {
        Self { names }
    }

    /// Adds or replaces one entry.
    pub fn with(mut self, user_id: i32, name: impl Into<String>) -> Self {
        self.names.insert(user_id, name.into());
        self
    }
}

impl IdentityResolver for StaticResolver {
    async fn resolve(&self, user_id: i32) -> Result<String, LookupError> {
        self.names
            .get(&user_id)
            .cloned()
            .ok_or(LookupError::Unknown(user_id))
    }
}
