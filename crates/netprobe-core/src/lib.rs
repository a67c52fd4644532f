//! Core types, traits, and error handling for netprobe.
//!
//! This crate provides the fundamental abstractions shared by the echo and
//! hop-trace probers:
//!
//! - [`ProbeSession`], [`SessionFactory`] and [`AddressResolver`] seams
//! - [`HostReport`], [`TraceReport`] and the other report types
//! - [`ProbeError`] for error handling
//! - [`stats`] for loss and round-trip reduction
//! - [`execution::run_all`] for concurrent dispatch across targets

pub mod error;
pub mod execution;
pub mod result;
pub mod stats;
pub mod traits;
pub mod types;

pub use error::{DecodeError, EncodeError, ProbeError};
pub use result::{to_json, Hop, HostReport, ProbeOutcome, TerminalReason, TraceReport};
pub use traits::{AddressResolver, ProbeSession, SessionFactory};
pub use types::{
    AddressFamily, EchoParams, ProbeStatus, ReplyKind, Target, TraceParams, DEFAULT_PAYLOAD,
};
