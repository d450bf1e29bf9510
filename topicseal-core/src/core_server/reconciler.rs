//! Consistency reconciler
//!
//! For every encrypted topic, aligns participant records with key records:
//! keyholders without a participant record are added, participants without
//! a key are removed. Key records are never touched. A pass holds no locks
//! and can race with invite/removal traffic; re-running converges.

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::traits::{KeyStore, ParticipantStore};
use crate::metrics::{
    record_counter, Timer, RECONCILER_FAILURES, RECONCILER_PARTICIPANTS_ADDED,
    RECONCILER_PARTICIPANTS_REMOVED, RECONCILER_PASS_DURATION,
};
use crate::shutdown::{ShutdownCoordinator, ShutdownHandler};
use crate::types::{TopicId, UserId};

/// What one topic's reconciliation changed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRepair {
    pub topic: TopicId,
    /// Participant records created for existing keyholders
    pub added: BTreeSet<UserId>,
    /// Participant records removed for lacking a key
    pub removed: BTreeSet<UserId>,
    /// Storage operations that failed
    pub failures: usize,
}

impl TopicRepair {
    fn new(topic: TopicId) -> Self {
        TopicRepair {
            topic,
            added: BTreeSet::new(),
            removed: BTreeSet::new(),
            failures: 0,
        }
    }

    pub fn is_noop(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty() && self.failures == 0
    }
}

/// Totals of one pass over every encrypted topic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileSummary {
    pub topics: usize,
    pub added: usize,
    pub removed: usize,
    pub failures: usize,
}

fn record_failure(topic: TopicId, user: Option<UserId>, action: &str, e: &dyn std::fmt::Display) {
    record_counter(RECONCILER_FAILURES, 1);
    match user {
        Some(user) => error!(
            topic = %topic,
            user = %user,
            action,
            error = %e,
            "Reconciliation write failed"
        ),
        None => error!(topic = %topic, action, error = %e, "Reconciliation read failed"),
    }
}

pub struct Reconciler {
    keys: Arc<dyn KeyStore>,
    participants: Arc<dyn ParticipantStore>,
    concurrency: usize,
}

impl Reconciler {
    /// `concurrency` bounds how many topics are reconciled at once
    pub fn new(
        keys: Arc<dyn KeyStore>,
        participants: Arc<dyn ParticipantStore>,
        concurrency: usize,
    ) -> Self {
        Reconciler {
            keys,
            participants,
            concurrency: concurrency.max(1),
        }
    }

    /// Align the participant records of `topic` with its key records
    pub async fn reconcile_topic(&self, topic: TopicId) -> TopicRepair {
        let mut repair = TopicRepair::new(topic);

        let read = futures::try_join!(
            self.keys.keys_for_topic(topic),
            self.participants.participants_of(topic)
        );
        let (keyholders, participants) = match read {
            Ok(sets) => sets,
            Err(e) => {
                record_failure(topic, None, "read", &e);
                repair.failures += 1;
                return repair;
            }
        };

        // Disjoint sets, so adds and removals can run together.
        let to_add = keyholders.difference(&participants).map(|&user| async move {
            (user, self.participants.add_participant(topic, user).await)
        });
        let to_remove = participants.difference(&keyholders).map(|&user| async move {
            (user, self.participants.remove_participant(topic, user).await)
        });
        let (adds, removals) = futures::join!(join_all(to_add), join_all(to_remove));

        for (user, result) in adds {
            match result {
                Ok(true) => {
                    record_counter(RECONCILER_PARTICIPANTS_ADDED, 1);
                    repair.added.insert(user);
                }
                Ok(false) => {
                    debug!(topic = %topic, user = %user, "Participant appeared concurrently")
                }
                Err(e) => {
                    record_failure(topic, Some(user), "add", &e);
                    repair.failures += 1;
                }
            }
        }
        for (user, result) in removals {
            match result {
                Ok(true) => {
                    record_counter(RECONCILER_PARTICIPANTS_REMOVED, 1);
                    repair.removed.insert(user);
                }
                Ok(false) => {
                    debug!(topic = %topic, user = %user, "Participant vanished concurrently")
                }
                Err(e) => {
                    record_failure(topic, Some(user), "remove", &e);
                    repair.failures += 1;
                }
            }
        }

        if !repair.is_noop() {
            info!(
                topic = %topic,
                added = repair.added.len(),
                removed = repair.removed.len(),
                failures = repair.failures,
                "Reconciled topic"
            );
        }
        repair
    }

    /// Reconcile every encrypted topic once
    pub async fn pass(&self) -> ReconcileSummary {
        let timer = Timer::new(RECONCILER_PASS_DURATION);
        let mut summary = ReconcileSummary::default();

        let topics = match self.participants.encrypted_topics().await {
            Ok(topics) => topics,
            Err(e) => {
                record_counter(RECONCILER_FAILURES, 1);
                error!(error = %e, "Failed to list encrypted topics");
                summary.failures += 1;
                return summary;
            }
        };

        let repairs: Vec<TopicRepair> = stream::iter(topics)
            .map(|topic| self.reconcile_topic(topic))
            .buffer_unordered(self.concurrency)
            .collect()
            .await;

        for repair in &repairs {
            summary.topics += 1;
            summary.added += repair.added.len();
            summary.removed += repair.removed.len();
            summary.failures += repair.failures;
        }

        timer.stop();
        info!(
            topics = summary.topics,
            added = summary.added,
            removed = summary.removed,
            failures = summary.failures,
            "Reconciliation pass complete"
        );
        summary
    }

    /// Run one pass; failures are logged, never returned
    pub async fn run(&self) {
        self.pass().await;
    }

    /// Run a pass now and then every `interval` until shutdown is signalled
    pub fn spawn_periodic(
        self: Arc<Self>,
        interval: Duration,
        shutdown: Arc<ShutdownCoordinator>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let handler = ShutdownHandler::new(shutdown, "reconciler");
            handler
                .run(move || async move {
                    let mut ticker = tokio::time::interval(interval);
                    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                    loop {
                        ticker.tick().await;
                        self.run().await;
                    }
                })
                .await;
        })
    }
}
