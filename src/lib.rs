pub mod app;
pub mod compliance;
pub mod config;
pub mod shared;
