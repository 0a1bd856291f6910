//! Healthcheck coordination.
//!
//! # Data Flow
//! ```text
//! Configuration layer (per vserver, full replacement)
//!     → HealthcheckManager::update
//!     → manager task merges every vserver's wanted checks
//!     → dedup by (CheckKey without service fields, Healthcheck spec)
//!     → builder.rs builds a probe Config per new Id
//!         (marks.rs allocates a mark + IPVS service for DSR/TUN)
//!     → snapshot { ids, cfgs, checks } swapped in
//!     → stale marks pruned
//!
//! Probe engine
//!     → HealthcheckManager::queue_health_state(Notification)
//!     → fan out to every (vserver, backend) check sharing the Id
//! ```
//!
//! # Design Decisions
//! - A single task owns vserver checks, the mark allocator and mark bindings
//! - Readers see immutable snapshots published through `ArcSwap`
//! - Configuration errors drop one probe; resource and kernel errors are fatal

pub mod builder;
pub mod check;
pub mod error;
pub mod manager;
pub mod marks;

pub use check::{Check, CheckKey, CheckNotification, CheckNotifier, Healthcheck, HealthcheckType};
pub use error::{BuildError, FatalError, ManagerError};
pub use manager::HealthcheckManager;
pub use marks::{MarkAllocator, MarkKey};
