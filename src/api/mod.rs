pub mod client;
pub mod models;
pub mod source;

pub use client::MeterClient;
pub use source::{ApiError, MeterDataSource};
