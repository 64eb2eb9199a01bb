//! Smart media - posts whose content evolves with their comments.

pub mod activities;
pub mod models;
