//! Execution across targets.
//!
//! Each target is probed by its own task; results come back in input order.

pub mod dispatch;

pub use dispatch::run_all;
