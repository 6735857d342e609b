pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod executor;
pub mod file;
pub mod report;
pub mod request;
pub mod schema;
pub mod storage;
pub mod util;
pub mod validate;
