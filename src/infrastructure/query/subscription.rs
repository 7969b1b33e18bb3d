use std::fmt;
use std::sync::Weak;

use super::cache::Inner;
use crate::domain::query::QueryKey;

/// Handle keeping a key subscription alive
///
/// Dropping it revokes the callback and lets the entry become eligible for
/// garbage collection once no other subscriber remains.
#[must_use = "dropping a Subscription unsubscribes immediately"]
pub struct Subscription {
    cache: Weak<Inner>,
    key: QueryKey,
    id: u64,
}

impl Subscription {
    pub(super) fn new(cache: Weak<Inner>, key: QueryKey, id: u64) -> Self {
        Self { cache, key, id }
    }

    pub fn key(&self) -> &QueryKey {
        &self.key
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cache) = self.cache.upgrade() {
            cache.unsubscribe(&self.key, self.id);
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("key", &self.key)
            .field("id", &self.id)
            .finish()
    }
}
