pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod middleware;
pub mod model;
pub mod models;
pub mod services;
