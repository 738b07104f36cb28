//! Entities, value objects and the ports the application layer depends on.

pub mod catalog;
pub mod identity;
pub mod ids;
pub mod journal;
pub mod money;
pub mod notification;
pub mod order;
pub mod ports;
pub mod wallet;
