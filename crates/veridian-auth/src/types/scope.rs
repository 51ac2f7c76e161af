//! Scope catalogue entries.
//!
//! A scope is an id plus a matching predicate. Exact scopes match their id;
//! dynamic scopes match a family of requested values, e.g. `payment` may
//! accept `payment:30`.

use std::fmt;
use std::sync::Arc;

/// A scope registered in the server catalogue.
#[derive(Clone)]
pub struct Scope {
    id: String,
    matcher: Arc<dyn Fn(&str) -> bool + Send + Sync>,
}

impl Scope {
    /// Creates a scope that matches its id exactly.
    #[must_use]
    pub fn simple(id: impl Into<String>) -> Self {
        let id = id.into();
        let exact = id.clone();
        Self {
            id,
            matcher: Arc::new(move |requested| requested == exact),
        }
    }

    /// Creates a scope with a custom matching predicate.
    #[must_use]
    pub fn dynamic(
        id: impl Into<String>,
        matcher: impl Fn(&str) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            matcher: Arc::new(matcher),
        }
    }

    /// The scope id as registered on clients.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Checks a requested scope string against this entry.
    #[must_use]
    pub fn matches(&self, requested: &str) -> bool {
        (self.matcher)(requested)
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope").field("id", &self.id).finish()
    }
}
