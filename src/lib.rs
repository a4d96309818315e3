// Library interface for testing

// Declare all modules
pub mod catalog;
pub mod config;
pub mod constants;
pub mod db;
pub mod error;
pub mod queries;
pub mod schema;
pub mod seed;
pub mod serve;
pub mod streaming;
pub mod upload;
pub mod users;
pub mod views;

// Re-export the expected database version for convenience
pub use constants::EXPECTED_DB_VERSION;
