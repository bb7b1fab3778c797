mod config;
mod connection;
mod error;
mod models;
mod store;

pub use config::MongoConfig;
pub use error::MongoDaoError;
pub use store::MongoSessionStore;

use crate::dao::storage::StorageError;

impl From<MongoDaoError> for StorageError {
    fn from(err: MongoDaoError) -> Self {
        match err {
            MongoDaoError::Duplicate { .. } | MongoDaoError::VersionMismatch { .. } => {
                StorageError::conflict(err.to_string())
            }
            other => StorageError::unavailable(other.to_string(), other),
        }
    }
}
