//! Content repository implementations.

pub mod memory;
pub mod rest;

pub use memory::{MemoryRepository, Operation};
pub use rest::{ApiError, RestRepository};
