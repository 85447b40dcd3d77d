//! quotaguard-store
//!
//! In-memory reference implementation of the `quotaguard_core::Store` contract.
#![warn(missing_docs)]

mod memory;

pub use memory::{CleanupHandle, MemoryStore};
