//! Storage backends for the shrink URL shortener.
//!
//! All backends implement the [`shrink_core::UrlStore`] contract:
//! a volatile in-memory map (optionally persisted to a JSON snapshot
//! file across restarts) and a Postgres-backed relational store.

pub mod memory;
pub mod postgres;
pub mod snapshot;

pub use memory::MemoryStore;
pub use postgres::PostgresStore;
pub use snapshot::{FileSnapshot, SnapshotRecord};
