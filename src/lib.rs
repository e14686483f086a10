pub mod aggregate;
pub mod classify;
pub mod clients;
pub mod config;
pub mod error;
pub mod join;
pub mod output;
pub mod points;
pub mod regions;
pub mod stats;
pub mod types;
