//! Storage infrastructure: on-disk configuration for the server.

pub mod config;
