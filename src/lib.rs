pub mod auth;
pub mod comments;
pub mod config;
pub mod error;
pub mod models;
pub mod notify;
pub mod openapi;
pub mod rate_limit; // in-memory rate limiting
pub mod repo;
pub mod reports;
pub mod resolver;
pub mod routes;

// Re-export commonly used items for tests / external users
pub use routes::{config, AppState};
