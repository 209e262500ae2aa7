pub mod aggregate;
pub mod command;
pub mod config;
pub mod error;
pub mod locator;
pub mod log_parser;
pub mod record;
pub mod report;
pub mod store;
