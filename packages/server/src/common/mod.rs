// Common types and utilities shared across the application

pub mod time;

pub use time::{now_unix, UnixSeconds};
