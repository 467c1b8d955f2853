//! Result wrapper carrying where an entity came from and how old it is.

use chrono::Duration;
use tollgate_core::Timestamp;

/// An entity returned by the orchestrator.
///
/// Callers see whether the value was served from the local store or fetched
/// from the provider, and when it was fetched.
#[derive(Debug, Clone)]
pub struct Fetched<E> {
    value: E,
    fetched_at: Timestamp,
    was_cache_hit: bool,
}

impl<E> Fetched<E> {
    /// A value served from the store.
    pub fn from_cache(value: E, fetched_at: Timestamp) -> Self {
        Self {
            value,
            fetched_at,
            was_cache_hit: true,
        }
    }

    /// A value just fetched from the provider.
    pub fn from_remote(value: E, fetched_at: Timestamp) -> Self {
        Self {
            value,
            fetched_at,
            was_cache_hit: false,
        }
    }

    pub fn into_value(self) -> E {
        self.value
    }

    pub fn value(&self) -> &E {
        &self.value
    }

    pub fn fetched_at(&self) -> Timestamp {
        self.fetched_at
    }

    pub fn is_cache_hit(&self) -> bool {
        self.was_cache_hit
    }

    /// Age of the value as of `now`.
    pub fn age(&self, now: Timestamp) -> Duration {
        now.signed_duration_since(self.fetched_at)
    }

    pub fn map<F, U>(self, f: F) -> Fetched<U>
    where
        F: FnOnce(E) -> U,
    {
        Fetched {
            value: f(self.value),
            fetched_at: self.fetched_at,
            was_cache_hit: self.was_cache_hit,
        }
    }
}

impl<E> std::ops::Deref for Fetched<E> {
    type Target = E;

    fn deref(&self) -> &E {
        &self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_age_and_origin() {
        let fetched_at = Utc::now();
        let read = Fetched::from_cache(7u32, fetched_at);
        assert!(read.is_cache_hit());
        assert_eq!(read.age(fetched_at + Duration::seconds(5)), Duration::seconds(5));

        let mapped = Fetched::from_remote("x", fetched_at).map(str::len);
        assert!(!mapped.is_cache_hit());
        assert_eq!(*mapped, 1);
        assert_eq!(mapped.into_value(), 1);
    }
}
