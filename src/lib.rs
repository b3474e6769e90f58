pub mod config;
pub mod engine;
pub mod model;
pub mod notify;
pub mod observability;
pub mod store;
pub mod sweeper;
