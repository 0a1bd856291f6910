//! Shared utilities for healthcheck manager integration tests.

use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

use hc_coordinator::config::CoordinatorConfig;
use hc_coordinator::engine::{Check, CheckKey, CheckNotification, CheckNotifier, Healthcheck, HealthcheckType};
use hc_coordinator::healthcheck::HealthcheckMode;
use hc_coordinator::ipvs::{ForwardingError, ForwardingTable, IpProto, Service};

/// Forwarding table that records installed services and can inject failures.
#[derive(Debug, Default)]
pub struct RecordingTable {
    services: Mutex<HashMap<u32, Service>>,
    adds: AtomicUsize,
    deletes: AtomicUsize,
    fail_adds: AtomicBool,
}

#[allow(dead_code)]
impl RecordingTable {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_adds(&self) {
        self.fail_adds.store(true, Ordering::SeqCst);
    }

    pub fn service(&self, mark: u32) -> Option<Service> {
        self.services.lock().unwrap().get(&mark).cloned()
    }

    pub fn len(&self) -> usize {
        self.services.lock().unwrap().len()
    }

    pub fn adds(&self) -> usize {
        self.adds.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }
}

impl ForwardingTable for RecordingTable {
    fn add_service(&self, service: &Service) -> Result<(), ForwardingError> {
        if self.fail_adds.load(Ordering::SeqCst) {
            return Err(ForwardingError::Unavailable("injected failure".into()));
        }
        self.adds.fetch_add(1, Ordering::SeqCst);
        let mut services = self.services.lock().unwrap();
        if services.insert(service.firewall_mark, service.clone()).is_some() {
            return Err(ForwardingError::AlreadyExists(service.firewall_mark));
        }
        Ok(())
    }

    fn delete_service(&self, service: &Service) -> Result<(), ForwardingError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        match self.services.lock().unwrap().remove(&service.firewall_mark) {
            Some(existing) if existing == *service => Ok(()),
            _ => Err(ForwardingError::NotFound(service.firewall_mark)),
        }
    }
}

/// Coordinator settings with a small mark range.
#[allow(dead_code)]
pub fn coordinator_config(mark_size: u32) -> CoordinatorConfig {
    CoordinatorConfig {
        mark_size,
        ..CoordinatorConfig::default()
    }
}

/// A notifier and the receiver collecting what it is sent.
pub fn notifier() -> (Arc<dyn CheckNotifier>, mpsc::UnboundedReceiver<CheckNotification>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Arc::new(tx), rx)
}

/// Everything currently queued on a notification receiver.
#[allow(dead_code)]
pub fn drain(rx: &mut mpsc::UnboundedReceiver<CheckNotification>) -> Vec<CheckNotification> {
    let mut notes = Vec::new();
    while let Ok(note) = rx.try_recv() {
        notes.push(note);
    }
    notes
}

#[allow(dead_code)]
pub fn ip(s: &str) -> IpAddr {
    s.parse().unwrap()
}

#[allow(dead_code)]
pub fn key(vip: &str, backend: &str, mode: HealthcheckMode, name: &str) -> CheckKey {
    CheckKey {
        vserver_ip: ip(vip),
        service_port: 80,
        service_protocol: IpProto::Tcp,
        backend_ip: ip(backend),
        mode,
        name: name.to_string(),
    }
}

#[allow(dead_code)]
pub fn tcp(mode: HealthcheckMode) -> Healthcheck {
    let mut hc = Healthcheck::new("tcp", HealthcheckType::Tcp, 80);
    hc.mode = mode;
    hc
}

/// Builds a wanted-check map for one vserver.
pub fn wanted(
    checks: Vec<(CheckKey, Healthcheck)>,
    notifier: &Arc<dyn CheckNotifier>,
) -> HashMap<CheckKey, Check> {
    checks
        .into_iter()
        .map(|(key, hc)| (key.clone(), Check::new(key, hc, notifier.clone())))
        .collect()
}
