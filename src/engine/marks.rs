//! Firewall mark allocation for DSR/TUN probes.

use std::collections::VecDeque;
use std::net::IpAddr;

use crate::engine::error::FatalError;
use crate::healthcheck::HealthcheckMode;
use crate::ipvs::{ForwardingMethod, Service};

/// A backend reached through IPVS in a given mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MarkKey {
    pub backend: IpAddr,
    pub mode: HealthcheckMode,
}

impl MarkKey {
    /// The IPVS service routing packets with `mark` to this backend.
    pub fn service(&self, mark: u32) -> Service {
        let method = match self.mode {
            HealthcheckMode::Tun => ForwardingMethod::Tunnel,
            _ => ForwardingMethod::Route,
        };
        Service::for_mark(mark, self.backend, method)
    }
}

/// Hands out marks from a fixed contiguous range.
///
/// Not synchronised; owned by the healthcheck manager task.
#[derive(Debug)]
pub struct MarkAllocator {
    base: u32,
    size: u32,
    free: VecDeque<u32>,
}

impl MarkAllocator {
    /// Allocator over `base..base + size`, truncated at `u32::MAX`.
    pub fn new(base: u32, size: u32) -> Self {
        let end = base.saturating_add(size);
        Self {
            base,
            size: end - base,
            free: (base..end).collect(),
        }
    }

    /// Takes the least recently released mark.
    pub fn get(&mut self) -> Result<u32, FatalError> {
        self.free.pop_front().ok_or(FatalError::MarksExhausted {
            base: self.base,
            size: self.size,
        })
    }

    /// Returns a mark obtained from `get`.
    pub fn put(&mut self, mark: u32) {
        if mark.wrapping_sub(self.base) < self.size {
            self.free.push_back(mark);
        }
    }

    pub fn available(&self) -> usize {
        self.free.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_allocate_until_exhausted() {
        let mut alloc = MarkAllocator::new(1 << 16, 3);
        assert_eq!(alloc.get().unwrap(), 65536);
        assert_eq!(alloc.get().unwrap(), 65537);
        assert_eq!(alloc.get().unwrap(), 65538);
        assert_eq!(alloc.available(), 0);

        match alloc.get() {
            Err(FatalError::MarksExhausted { base, size }) => {
                assert_eq!(base, 65536);
                assert_eq!(size, 3);
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
    }

    #[test]
    fn test_put_recycles_mark() {
        let mut alloc = MarkAllocator::new(100, 2);
        let a = alloc.get().unwrap();
        let _b = alloc.get().unwrap();
        assert!(alloc.get().is_err());

        alloc.put(a);
        assert_eq!(alloc.available(), 1);
        assert_eq!(alloc.get().unwrap(), a);
    }

    #[test]
    fn test_put_ignores_foreign_marks() {
        let mut alloc = MarkAllocator::new(100, 2);
        alloc.put(99);
        alloc.put(102);
        assert_eq!(alloc.available(), 2);
    }

    #[test]
    fn test_range_truncated_at_u32_max() {
        let alloc = MarkAllocator::new(u32::MAX - 1, 10);
        assert_eq!(alloc.available(), 1);
    }

    #[test]
    fn test_service_flags_follow_mode() {
        let backend: IpAddr = "10.0.0.2".parse().unwrap();
        let dsr = MarkKey { backend, mode: HealthcheckMode::Dsr }.service(7);
        let tun = MarkKey { backend, mode: HealthcheckMode::Tun }.service(8);
        assert_eq!(dsr.firewall_mark, 7);
        assert_eq!(dsr.destinations[0].method, ForwardingMethod::Route);
        assert_eq!(tun.destinations[0].method, ForwardingMethod::Tunnel);
        assert_eq!(tun.destinations[0].address, backend);
    }
}
