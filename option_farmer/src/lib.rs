//! Options chain harvester: selects an at-the-money window of strikes per
//! target expiry for a universe of underlyings and persists it to CSV files
//! and a Redis cache.

pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod farm;
pub mod harvest;
pub mod models;
pub mod pool;
pub mod providers;
pub mod scheduler;
pub mod selection;
pub mod sink;
pub mod utils;

pub use config::FarmerConfig;
pub use farm::{FarmError, Farmer, LiveFactory, RunSummary, WorkerFactory};
