pub mod api;
pub mod auth;
pub mod bus;
pub mod config;
pub mod engine;
pub mod error;
pub mod idempotency;
pub mod models;
pub mod notify;
pub mod observability;
pub mod state;
