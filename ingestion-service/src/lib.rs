pub mod cache;
pub mod config;
pub mod dtos;
pub mod handlers;
pub mod ingest;
pub mod middleware;
pub mod models;
pub mod queue;
pub mod services;
pub mod startup;
pub mod store;
pub mod workers;
