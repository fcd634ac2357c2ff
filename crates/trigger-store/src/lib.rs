//! Stateful primitives for the trigger service, behind one trait.
//!
//! [`StateStore`] is the only thing the rest of the workspace talks to;
//! [`RedisStore`] backs it with real Redis and [`InMemoryStore`] backs
//! it with a mutex-guarded in-process fake for tests.

mod error;
pub mod fake;
mod redis_store;
mod store_trait;

pub use error::{StoreError, StoreResult};
pub use fake::InMemoryStore;
pub use redis_store::RedisStore;
pub use store_trait::StateStore;
