//! # beam-server: screen streaming server
//!
//! Serves the local screen and system audio to one browser viewer over a
//! WebSocket. Every binary message is a one-byte stream tag (`0x01`
//! video, `0x02` audio) followed by the encoded payload.
//!
//! ## Modules
//!
//! - **config**: TOML configuration with per-section defaults.
//! - **backends**: Maps configured backend names to capture, encoder and
//!   audio implementations.
//! - **server**: axum WebSocket endpoint, single-viewer gate and
//!   per-viewer session lifecycle.

pub mod backends;
pub mod config;
pub mod server;
