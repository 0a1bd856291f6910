//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → config watcher and notification loggers stop
//!     → healthcheck manager shutdown handshake
//!     → marks released and IPVS services removed
//!     → exit
//! ```
//!
//! # Design Decisions
//! - The manager handshake completes before the process exits
//! - Fatal manager errors bypass the handshake and abort

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
