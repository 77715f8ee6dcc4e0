pub mod config;
pub mod error;
pub mod routes;
pub mod service;
pub mod streaming;
pub mod telemetry;
