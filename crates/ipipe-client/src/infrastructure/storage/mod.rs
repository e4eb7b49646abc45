//! Storage infrastructure: on-disk configuration for the client.

pub mod config;
