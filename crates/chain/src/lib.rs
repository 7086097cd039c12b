//! In-memory chain store and mempool.
//!
//! The [`ChainStore`] exclusively owns the accepted chain and the pending
//! transaction pool. Access is serialized by the engine's single mutex, so
//! plain `Vec`/`HashSet` suffice; there is no interior locking here.

mod store;

pub use store::{ChainError, ChainStore, Mempool};
