//! Error taxonomy for the healthcheck manager.

use std::net::IpAddr;

use thiserror::Error;

use crate::healthcheck::HealthcheckMode;
use crate::ipvs::ForwardingError;

/// A probe specification that cannot be turned into a checker.
///
/// The affected probe is left out of the current merge.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BuildError {
    #[error("ICMP healthchecks cannot be used with {0} mode")]
    IcmpRequiresPlain(HealthcheckMode),

    #[error("RADIUS healthcheck has invalid send value")]
    InvalidRadiusSend,

    #[error("unknown DNS query type {0:?}")]
    UnknownDnsType(String),

    #[error("unknown healthcheck type")]
    UnknownType,
}

/// Failures that leave marks and kernel state out of step.
///
/// The manager task stops and returns this from its join handle; the
/// process is expected to abort.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("all {size} marks starting at {base} are allocated")]
    MarksExhausted { base: u32, size: u32 },

    #[error("failed to add IPVS service for {backend} (mark {mark}): {source}")]
    AddService {
        backend: IpAddr,
        mark: u32,
        #[source]
        source: ForwardingError,
    },

    #[error("failed to remove IPVS service for {backend} (mark {mark}): {source}")]
    DeleteService {
        backend: IpAddr,
        mark: u32,
        #[source]
        source: ForwardingError,
    },
}

/// Errors seen by callers of a `HealthcheckManager` handle.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManagerError {
    #[error("healthcheck update queue is full")]
    QueueFull,

    #[error("healthcheck manager has stopped")]
    Stopped,
}
