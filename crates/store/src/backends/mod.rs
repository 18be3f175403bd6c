//! Table store backend implementations

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;

#[cfg(feature = "memory")]
pub use memory::MemoryStore;

#[cfg(feature = "dynamodb")]
pub use dynamodb::DynamoStore;
