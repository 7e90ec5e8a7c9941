pub mod archive;
pub mod config;
pub mod error;
pub mod feed;
pub mod fetch;
pub mod output;
pub mod parser;
pub mod pipeline;
pub mod stats;
pub mod store;
