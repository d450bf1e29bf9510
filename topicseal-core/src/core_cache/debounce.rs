//! Debounced batch accumulator
//!
//! Keys scheduled within one quiet window are flushed together. Each
//! `schedule` call restarts the window; the flush covers the cumulative
//! pending set. After a successful flush only keys present in the result
//! leave the pending set, so misses ride along with the next flush.

use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::hash::Hash;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;

/// Result of one flush, shared by every caller folded into it
pub type FlushResult<K, V, E> = Result<Arc<HashMap<K, V>>, E>;

/// Batch operation run when the window closes
pub type FlushFn<K, V, E> =
    Arc<dyn Fn(HashSet<K>) -> BoxFuture<'static, FlushResult<K, V, E>> + Send + Sync>;

type RoundSender<K, V, E> = watch::Sender<Option<FlushResult<K, V, E>>>;

struct State<K, V, E> {
    pending: HashSet<K>,
    generation: u64,
    round: RoundSender<K, V, E>,
}

pub struct Debouncer<K, V, E> {
    window: Duration,
    flush: FlushFn<K, V, E>,
    state: Arc<Mutex<State<K, V, E>>>,
}

/// Handle on the flush a `schedule` call was folded into
pub struct DebounceRound<K, V, E> {
    rx: watch::Receiver<Option<FlushResult<K, V, E>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<K, V, E> Debouncer<K, V, E>
where
    K: Eq + Hash + Clone + Send + Sync + 'static,
    V: Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new(window: Duration, flush: FlushFn<K, V, E>) -> Self {
        let (round, _) = watch::channel(None);
        Debouncer {
            window,
            flush,
            state: Arc::new(Mutex::new(State {
                pending: HashSet::new(),
                generation: 0,
                round,
            })),
        }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Keys waiting for the next flush
    pub fn pending(&self) -> HashSet<K> {
        lock(&self.state).pending.clone()
    }

    /// Add `keys` to the pending set and (re)start the quiet window.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule(&self, keys: impl IntoIterator<Item = K>) -> DebounceRound<K, V, E> {
        let (generation, rx) = {
            let mut state = lock(&self.state);
            state.pending.extend(keys);
            state.generation += 1;
            (state.generation, state.round.subscribe())
        };

        let state = self.state.clone();
        let flush = self.flush.clone();
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;

            let (batch, round) = {
                let mut guard = lock(&state);
                if guard.generation != generation {
                    // A later call restarted the window.
                    return;
                }
                let (next, _) = watch::channel(None);
                (guard.pending.clone(), mem::replace(&mut guard.round, next))
            };

            if batch.is_empty() {
                // An in-flight flush already covered every key of this round.
                round.send_replace(Some(Ok(Arc::new(HashMap::new()))));
                return;
            }

            tracing::debug!(keys = batch.len(), "Flushing debounced batch");
            let result = flush(batch).await;
            if let Ok(found) = &result {
                lock(&state).pending.retain(|key| !found.contains_key(key));
            }
            round.send_replace(Some(result));
        });

        DebounceRound { rx }
    }
}

impl<K, V, E> DebounceRound<K, V, E>
where
    K: Eq + Hash,
    E: Clone,
{
    /// Wait for the flush; `None` if it was abandoned before completing
    pub async fn wait(mut self) -> Option<FlushResult<K, V, E>> {
        let outcome = self.rx.wait_for(Option::is_some).await.ok()?;
        outcome.clone()
    }
}
