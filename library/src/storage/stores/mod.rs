//! Built-in implementors of [`Storage`](super::Storage).

#[cfg(feature = "in-memory")]
mod in_memory;

#[cfg(feature = "in-memory")]
pub use super::stores::in_memory::{InMemory, InMemoryStorageError};
