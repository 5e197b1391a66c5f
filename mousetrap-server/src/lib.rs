//! # Mousetrap Server
//!
//! Worker process for the Mousetrap scan service: loads configuration,
//! builds the configured backends, gates startup on a healthy clamd, then
//! runs the queue listener, the poll scheduler, and a small status API
//! until SIGINT or SIGTERM.

pub mod errors;
pub mod handlers;
pub mod infra;
pub mod routes;
