pub mod config;
pub mod db;
pub mod error;
pub mod gmgn;
pub mod normalize;
pub mod observability;
pub mod store;
pub mod types;
