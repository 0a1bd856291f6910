//! Healthcheck coordination for a software load balancer.
//!
//! Deduplicates probe requests from many virtual services, keeps probe IDs
//! stable across reconfiguration, binds firewall marks and IPVS services
//! for DSR/TUN probing, and fans probe status back out to every vserver.

pub mod config;
pub mod engine;
pub mod healthcheck;
pub mod ipvs;
pub mod lifecycle;
pub mod observability;

pub use config::EngineConfig;
pub use engine::HealthcheckManager;
pub use lifecycle::Shutdown;
