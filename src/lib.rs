//! Lighthouse audit worker
//!
//! Pulls page-audit jobs from a Redis list, runs each one through Lighthouse
//! against a private headless Chrome, and stores the report and a job status
//! record in Redis with independent expirations.

pub mod app_state;
pub mod config;
pub mod models;
pub mod routes;
pub mod services;
