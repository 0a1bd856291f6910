//! Identifiers, status and configuration shared with the probe engine.

use std::fmt;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::healthcheck::checker::Checker;

/// Runtime identifier of a deduplicated probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(pub u64);

impl Id {
    /// First identifier for this process.
    ///
    /// The top 16 bits carry the low bits of the PID so that IDs observed
    /// across restarts are unlikely to collide.
    pub fn seed() -> Self {
        Self::from_pid(std::process::id())
    }

    /// First identifier for the given process ID.
    pub fn from_pid(pid: u32) -> Self {
        Id((u64::from(pid) & 0xFFFF) << 48)
    }

    /// The identifier minted after this one.
    pub fn next(self) -> Self {
        Id(self.0.wrapping_add(1))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// How a probe reaches its backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthcheckMode {
    /// Probe the backend address directly.
    #[default]
    Plain,
    /// Probe the VIP, routed to the backend via direct server return.
    Dsr,
    /// Probe the VIP, routed to the backend via an IP-in-IP tunnel.
    Tun,
}

impl HealthcheckMode {
    /// Whether probes in this mode go straight to the backend.
    pub fn is_plain(self) -> bool {
        self == HealthcheckMode::Plain
    }
}

impl fmt::Display for HealthcheckMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HealthcheckMode::Plain => "PLAIN",
            HealthcheckMode::Dsr => "DSR",
            HealthcheckMode::Tun => "TUN",
        })
    }
}

/// Health state reported by the probe engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum State {
    #[default]
    Unknown,
    Healthy,
    Unhealthy,
}

impl State {
    /// Stable lowercase name, used as a metrics label.
    pub fn as_str(self) -> &'static str {
        match self {
            State::Unknown => "unknown",
            State::Healthy => "healthy",
            State::Unhealthy => "unhealthy",
        }
    }
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of the most recent probe run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Status {
    pub state: State,
    pub message: String,
    pub last_check: Option<SystemTime>,
}

impl Status {
    pub fn new(state: State) -> Self {
        Self {
            state,
            ..Self::default()
        }
    }
}

/// Asynchronous status report for one probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub id: Id,
    pub status: Status,
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.id, self.status.state)?;
        if !self.status.message.is_empty() {
            write!(f, " ({})", self.status.message)?;
        }
        Ok(())
    }
}

/// A fully built probe, ready for the execution engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub id: Id,
    pub checker: Checker,
    pub interval: Duration,
    pub timeout: Duration,
    pub retries: u32,
}

impl Config {
    pub fn new(id: Id, checker: Checker) -> Self {
        Self {
            id,
            checker,
            interval: Duration::from_secs(5),
            timeout: Duration::from_secs(30),
            retries: 0,
        }
    }
}
