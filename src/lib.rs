pub mod aggregator;
pub mod error;
pub mod fetch;
pub mod filter;
pub mod geometry;
pub mod loader;
pub mod metrics;
pub mod model;
pub mod output;
pub mod schema;
pub mod session;
pub mod stats;
