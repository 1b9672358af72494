pub mod clean;
pub mod config;
pub mod constants;
pub mod db;
pub mod dedup;
pub mod error;
pub mod extract;
pub mod loader;
pub mod logging;
pub mod metrics;
pub mod normalize;
pub mod pipeline;
pub mod report;
pub mod resolver;
pub mod storage;
pub mod types;
