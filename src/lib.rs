pub mod aggregate;
pub mod config;
pub mod datasets;
pub mod fetch;
pub mod http_client;
pub mod links;
pub mod normalize;
pub mod pipeline;
pub mod records;
pub mod snapshot;
pub mod tables;
