//! Data types for the extraction agent.

pub mod config;
pub mod history;
pub mod message;
pub mod record;
pub mod state;
