pub mod api;
pub mod config;
pub mod error;
pub mod query;
pub mod server;
pub mod storage;
