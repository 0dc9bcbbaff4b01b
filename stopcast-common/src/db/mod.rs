//! Database schema and queries

pub mod init;
pub mod metrics;
pub mod predictions;
pub mod stops;
pub mod users;

pub use init::{init_database, init_memory_database};
