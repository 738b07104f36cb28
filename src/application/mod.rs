//! Application services orchestrating the booking workflow.
//!
//! Each service owns a handle to the store and opens one unit of work per
//! operation. Everything an operation writes commits together; push
//! notifications are only sent once the commit has succeeded.

pub mod catalog;
mod notify;
pub mod orders;
pub mod payout;
pub mod reconciliation;
pub mod wallet;
