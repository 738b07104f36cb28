//! Home-care booking core: order lifecycle, partner payouts and wallets.

pub mod application;
pub mod config;
pub mod domain;
pub mod error;
pub mod infrastructure;
pub mod interfaces;
