//! System-wide identity storage.
//!
//! Maps usernames to [`User`](crate::types::User) records and their single
//! authorized key fingerprint. The trait keeps the store swappable; the
//! bundled implementation is an in-memory `DashMap` with optional JSON
//! snapshots.

mod memory;
mod traits;

pub use memory::MemoryIdentityStore;
pub use traits::IdentityStore;
