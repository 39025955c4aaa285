pub mod config;
pub mod domain;
pub mod error;
pub mod fill;
pub mod output;
pub mod registry;
pub mod store;
pub mod summary;
pub mod taxon;
pub mod writer;
