//! HTTP front end
//!
//! Serves viewers with axum and hands each one to the relay engine as a
//! consumer. Every request, whatever its path, receives the relayed stream.

pub mod config;
pub mod listener;
mod viewer;

pub use config::ServerConfig;
pub use listener::RelayServer;
