//! Server side of topic key distribution
//!
//! Key records are the source of truth for who can read an encrypted topic.
//! The invite and removal flows keep participant records in step with them;
//! the [`Reconciler`] repairs any drift.

mod access;
mod error;
mod migrations;
mod reconciler;
mod sql_store;
mod traits;

pub use access::{AccessService, InviteRequest};
pub use error::{AccessError, StoreError};
pub use reconciler::{ReconcileSummary, Reconciler, TopicRepair};
pub use sql_store::{SqlTopicStore, Topic};
pub use traits::{AccessStore, KeyStore, ParticipantStore};
