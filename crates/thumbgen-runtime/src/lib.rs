pub mod bridge;
pub mod config;
pub mod error;
pub mod handler;
pub mod lifecycle;
pub mod registry;
pub mod worker;
