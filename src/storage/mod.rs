//! Block-list snapshot storage

pub mod database;

pub use database::Database;
