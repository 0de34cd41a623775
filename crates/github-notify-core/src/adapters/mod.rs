//! # Infrastructure Adapters
//!
//! Implementations of the collaborator interfaces that ship with the core.

pub mod memory_kv;

pub use memory_kv::InMemoryKvStore;
