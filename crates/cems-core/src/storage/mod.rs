//! # Storage Backends
//!
//! Disk-backed implementations of `RegistryStore`.

mod redb_registry;

pub use redb_registry::RedbRegistry;
