pub mod api;
pub mod clients;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod idempotency;
pub mod models;
pub mod parser;
pub mod retry;
pub mod worker;
