//! Adapters implementing the domain ports.

pub mod fs_store;

pub use fs_store::{FsTaskStore, MemoryTaskStore};
