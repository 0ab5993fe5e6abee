pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod frontier;
pub mod partition;
pub mod pipeline;
pub mod runtime;
pub mod scope;
pub mod seeds;
pub mod sitemap;
pub mod types;
pub mod webdriver;
