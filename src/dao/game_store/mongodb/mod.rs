//! MongoDB storage backend. One collection per entity, unique indexes mirroring the store
//! constraints and integer ids drawn from a `counters` collection. Transactions run on a
//! [`mongodb::ClientSession`] and therefore need a replica set.

mod config;
mod connection;
mod documents;
mod error;
pub mod store;
mod txn;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoGameStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        StorageError::unavailable(err.to_string(), err)
    }
}
