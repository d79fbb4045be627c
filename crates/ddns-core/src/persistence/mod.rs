//! History store implementations
//!
//! This module provides the built-in implementations of the HistoryStore trait.

mod document;
pub mod json;
pub mod memory;

pub use document::{PersistedRecord, PersistentDocument};
pub use json::JsonHistoryStore;
pub use memory::MemoryHistoryStore;
