//! Test doubles for the capability traits
//!
//! Client-side mocks record what they were asked so tests can assert on
//! call counts; the in-memory topic store supports failure injection.

mod memory_store;
mod mocks;

pub use memory_store::MemoryTopicStore;
pub use mocks::{CountingKeySource, CountingKeystore, MockKeyServer, MockLookup};
