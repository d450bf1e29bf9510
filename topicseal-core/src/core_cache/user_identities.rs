//! Other users' public identities, by username
//!
//! Each username maps to one slot: a pending batch lookup shared by every
//! username of that batch, or the resolved identity. Failed resolutions are
//! dropped from the map so the next request asks the server again.

use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::debounce::{Debouncer, FlushFn};
use super::error::CacheError;
use crate::core_identity::{decode_public, IdentityLookup, PublicIdentity};
use crate::metrics::{record_counter, CACHE_IDENTITY_FETCHES};

type Resolution = Result<PublicIdentity, CacheError>;
type BatchResult = Result<Arc<HashMap<String, Resolution>>, CacheError>;
type BatchFuture = Shared<BoxFuture<'static, BatchResult>>;

enum Slot {
    Pending(BatchFuture),
    Resolved(PublicIdentity),
}

struct Inner {
    lookup: Arc<dyn IdentityLookup>,
    slots: Mutex<HashMap<String, Slot>>,
}

impl Inner {
    fn slots(&self) -> MutexGuard<'_, HashMap<String, Slot>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn resolved(&self, username: &str) -> Option<PublicIdentity> {
        match self.slots().get(username) {
            Some(Slot::Resolved(identity)) => Some(identity.clone()),
            _ => None,
        }
    }

    fn remember(&self, batch: &HashMap<String, Resolution>) {
        let mut slots = self.slots();
        for (username, resolution) in batch {
            if let Ok(identity) = resolution {
                slots.insert(username.clone(), Slot::Resolved(identity.clone()));
            }
        }
    }
}

/// One remote lookup for `usernames`; names the server does not know are
/// absent from the returned map.
async fn fetch_batch(lookup: Arc<dyn IdentityLookup>, usernames: HashSet<String>) -> BatchResult {
    record_counter(CACHE_IDENTITY_FETCHES, 1);
    tracing::debug!(count = usernames.len(), "Fetching public identities");

    let found = lookup
        .fetch_identities(&usernames)
        .await
        .map_err(|e| CacheError::Lookup(e.to_string()))?;

    Ok(Arc::new(
        found
            .into_iter()
            .filter(|(username, _)| usernames.contains(username))
            .map(|(username, encoded)| {
                let resolution = decode_public(&encoded).map_err(CacheError::from);
                (username, resolution)
            })
            .collect(),
    ))
}

fn outcome_for(username: &str, batch: &BatchResult) -> Resolution {
    match batch {
        Ok(found) => found
            .get(username)
            .cloned()
            .unwrap_or_else(|| Err(CacheError::UnknownIdentity(username.to_string()))),
        Err(e) => Err(e.clone()),
    }
}

/// Memoizing resolver of other users' public identities
pub struct UserIdentityCache {
    inner: Arc<Inner>,
    debouncer: Debouncer<String, Resolution, CacheError>,
}

impl UserIdentityCache {
    pub fn new(lookup: Arc<dyn IdentityLookup>, debounce_window: Duration) -> Self {
        let inner = Arc::new(Inner {
            lookup,
            slots: Mutex::new(HashMap::new()),
        });

        let flush_inner = inner.clone();
        let flush: FlushFn<String, Resolution, CacheError> =
            Arc::new(move |usernames: HashSet<String>| {
                let inner = flush_inner.clone();
                async move {
                    let batch = fetch_batch(inner.lookup.clone(), usernames).await?;
                    inner.remember(&batch);
                    Ok(batch)
                }
                .boxed()
            });

        UserIdentityCache {
            inner,
            debouncer: Debouncer::new(debounce_window, flush),
        }
    }

    /// Resolve `usernames`, fetching every uncached name in one request.
    ///
    /// Names already resolved or already part of an in-flight batch do not
    /// trigger another request.
    pub async fn resolve(&self, usernames: &HashSet<String>) -> HashMap<String, Resolution> {
        let mut results = HashMap::new();
        let mut waiting = Vec::new();
        {
            let mut slots = self.inner.slots();

            let missing: HashSet<String> = usernames
                .iter()
                .filter(|u| !slots.contains_key(*u))
                .cloned()
                .collect();
            if !missing.is_empty() {
                let batch = fetch_batch(self.inner.lookup.clone(), missing.clone())
                    .boxed()
                    .shared();
                for username in missing {
                    slots.insert(username, Slot::Pending(batch.clone()));
                }
            }

            for username in usernames {
                match slots.get(username) {
                    Some(Slot::Resolved(identity)) => {
                        results.insert(username.clone(), Ok(identity.clone()));
                    }
                    Some(Slot::Pending(batch)) => waiting.push((username.clone(), batch.clone())),
                    None => {}
                }
            }
        }

        let settled = join_all(waiting.into_iter().map(|(username, batch)| async move {
            let result = batch.clone().await;
            (username, batch, result)
        }))
        .await;

        let mut slots = self.inner.slots();
        for (username, batch, result) in settled {
            let resolution = outcome_for(&username, &result);

            let still_ours = matches!(
                slots.get(&username),
                Some(Slot::Pending(current)) if current.ptr_eq(&batch)
            );
            if still_ours {
                match &resolution {
                    Ok(identity) => {
                        slots.insert(username.clone(), Slot::Resolved(identity.clone()));
                    }
                    Err(_) => {
                        slots.remove(&username);
                    }
                }
            }

            results.insert(username, resolution);
        }

        results
    }

    /// Resolve `usernames` through the debounced accumulator.
    ///
    /// Calls within one quiet window share a single request covering all
    /// their names. Names the server did not know stay queued and ride along
    /// with the next flush.
    pub async fn resolve_debounced(
        &self,
        usernames: &HashSet<String>,
    ) -> HashMap<String, Resolution> {
        let mut results = HashMap::new();
        let mut wanted = HashSet::new();
        for username in usernames {
            match self.inner.resolved(username) {
                Some(identity) => {
                    results.insert(username.clone(), Ok(identity));
                }
                None => {
                    wanted.insert(username.clone());
                }
            }
        }
        if wanted.is_empty() {
            return results;
        }

        let round = self.debouncer.schedule(wanted.iter().cloned());
        let batch = round.wait().await.unwrap_or_else(|| {
            Err(CacheError::Lookup("debounced lookup was abandoned".to_string()))
        });

        for username in wanted {
            let resolution = match outcome_for(&username, &batch) {
                // Resolved by a batch this call was not folded into.
                Err(CacheError::UnknownIdentity(_)) if batch.is_ok() => self
                    .inner
                    .resolved(&username)
                    .ok_or_else(|| CacheError::UnknownIdentity(username.clone())),
                other => other,
            };
            results.insert(username, resolution);
        }

        results
    }

    /// Resolved identity for `username`, without any network call
    pub fn cached(&self, username: &str) -> Option<PublicIdentity> {
        self.inner.resolved(username)
    }

    /// Usernames queued for the next debounced flush
    pub fn pending_lookups(&self) -> HashSet<String> {
        self.debouncer.pending()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_identity::{encode_public, Identity, CURRENT_IDENTITY_VERSION};
    use crate::test_utils::MockLookup;

    fn names(list: &[&str]) -> HashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    type Setup = (UserIdentityCache, Arc<MockLookup>, HashMap<String, PublicIdentity>);

    fn setup(known: &[&str]) -> Setup {
        let lookup = Arc::new(MockLookup::default());
        let mut identities = HashMap::new();
        for name in known {
            let public = Identity::generate(CURRENT_IDENTITY_VERSION).public_identity();
            lookup.insert(name, encode_public(&public));
            identities.insert(name.to_string(), public);
        }
        let cache = UserIdentityCache::new(lookup.clone(), Duration::from_millis(500));
        (cache, lookup, identities)
    }

    #[tokio::test]
    async fn test_resolve_fetches_once_for_whole_set() {
        let (cache, lookup, identities) = setup(&["alice", "bob"]);

        let results = cache.resolve(&names(&["alice", "bob"])).await;
        assert_eq!(results["alice"].as_ref().unwrap(), &identities["alice"]);
        assert_eq!(results["bob"].as_ref().unwrap(), &identities["bob"]);
        assert_eq!(lookup.calls(), vec![names(&["alice", "bob"])]);

        let again = cache.resolve(&names(&["alice"])).await;
        assert!(again["alice"].is_ok());
        assert_eq!(lookup.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_resolve_only_fetches_uncached_names() {
        let (cache, lookup, _) = setup(&["alice", "bob"]);

        cache.resolve(&names(&["alice"])).await;
        cache.resolve(&names(&["alice", "bob"])).await;

        assert_eq!(lookup.calls(), vec![names(&["alice"]), names(&["bob"])]);
    }

    #[tokio::test]
    async fn test_unknown_username_is_per_name_error() {
        let (cache, lookup, _) = setup(&["alice"]);

        let results = cache.resolve(&names(&["alice", "mallory"])).await;
        assert!(results["alice"].is_ok());
        assert_eq!(
            results["mallory"],
            Err(CacheError::UnknownIdentity("mallory".to_string()))
        );

        // Misses are not memoized.
        cache.resolve(&names(&["mallory"])).await;
        assert_eq!(lookup.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_resolves_share_batch() {
        let (cache, lookup, _) = setup(&["alice"]);
        let wanted = names(&["alice"]);

        let (a, b) = tokio::join!(cache.resolve(&wanted), cache.resolve(&wanted));
        assert_eq!(a["alice"], b["alice"]);
        assert_eq!(lookup.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_lookup_fails_batch_and_retries() {
        let (cache, lookup, _) = setup(&["alice"]);
        lookup.set_failing(true);

        let results = cache.resolve(&names(&["alice"])).await;
        assert!(matches!(results["alice"], Err(CacheError::Lookup(_))));

        lookup.set_failing(false);
        let results = cache.resolve(&names(&["alice"])).await;
        assert!(results["alice"].is_ok());
        assert_eq!(lookup.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_calls_coalesce() {
        let (cache, lookup, identities) = setup(&["alice", "bob"]);
        let alice = names(&["alice"]);
        let bob = names(&["bob"]);

        let (a, b) = tokio::join!(cache.resolve_debounced(&alice), async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            cache.resolve_debounced(&bob).await
        });

        assert_eq!(a["alice"].as_ref().unwrap(), &identities["alice"]);
        assert_eq!(b["bob"].as_ref().unwrap(), &identities["bob"]);
        assert_eq!(lookup.calls(), vec![names(&["alice", "bob"])]);
        assert_eq!(cache.cached("alice"), Some(identities["alice"].clone()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_misses_retry_on_next_call() {
        let (cache, lookup, _) = setup(&["alice", "bob"]);

        let first = cache.resolve_debounced(&names(&["alice", "ghost"])).await;
        assert_eq!(first["ghost"], Err(CacheError::UnknownIdentity("ghost".to_string())));
        assert_eq!(cache.pending_lookups(), names(&["ghost"]));

        cache.resolve_debounced(&names(&["bob"])).await;
        assert_eq!(lookup.calls()[1], names(&["ghost", "bob"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_call_during_inflight_flush_uses_its_result() {
        let (cache, lookup, identities) = setup(&["alice"]);
        lookup.set_latency(Duration::from_millis(300));
        let alice = names(&["alice"]);

        let (first, second) = tokio::join!(cache.resolve_debounced(&alice), async {
            // The first flush is in flight from 500ms to 800ms.
            tokio::time::sleep(Duration::from_millis(600)).await;
            cache.resolve_debounced(&alice).await
        });

        assert_eq!(first["alice"].as_ref().unwrap(), &identities["alice"]);
        assert_eq!(second["alice"].as_ref().unwrap(), &identities["alice"]);
        assert_eq!(lookup.calls(), vec![alice.clone()]);
        assert!(cache.pending_lookups().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_skips_cached_names() {
        let (cache, lookup, _) = setup(&["alice"]);

        cache.resolve(&names(&["alice"])).await;
        let results = cache.resolve_debounced(&names(&["alice"])).await;

        assert!(results["alice"].is_ok());
        assert_eq!(lookup.calls().len(), 1);
    }
}
