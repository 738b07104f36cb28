//! Adapters between the outside world and the application services.

pub mod commands;
pub mod csv;
pub mod response;
