/// Database connection and schema management
pub mod database;

/// Batch limits loaded from showlist.toml
pub mod limits;

/// Admin identities from environment variables
pub mod users;
