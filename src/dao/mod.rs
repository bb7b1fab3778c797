/// Database model definitions.
pub mod models;
/// Lobby persistence and its backends.
pub mod session_store;
/// Storage abstraction layer for database operations.
pub mod storage;
