//! Job persistence: the store contract and its implementations.

pub mod in_memory;
pub mod postgres;
mod r#trait;

pub use in_memory::InMemoryJobStore;
pub use postgres::PostgresJobStore;
pub use r#trait::{JobStore, SharedJobStore, StoreError};
