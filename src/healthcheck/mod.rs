//! Probe engine data types.
//!
//! # Data Flow
//! ```text
//! engine::builder (CheckKey + Healthcheck spec)
//!     → Config { id, checker, interval, timeout, retries }
//!     → published by the healthcheck manager
//!     → probe execution engine runs it
//!     → Notification { id, status } back to the manager
//! ```
//!
//! # Design Decisions
//! - One `Checker` variant per probe protocol, each carrying its own `Target`
//! - `Id` values are never reused within a process
//! - Checkers render a human-readable description via `Display`

pub mod checker;
pub mod types;

pub use checker::{
    Checker, DnsChecker, DnsType, HttpChecker, PingChecker, RadiusChecker, Target, TcpChecker,
    UdpChecker,
};
pub use types::{Config, HealthcheckMode, Id, Notification, State, Status};
