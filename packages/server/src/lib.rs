// Smart Media - Server Core
//
// This crate provides the backend for smart media posts: posts whose content
// evolves with their comments, driven by pluggable templates.
// Refreshes are queued per post and run in-process with bounded concurrency.
//
// Business logic lives in domains/*/activities; infrastructure in kernel/.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::*;
