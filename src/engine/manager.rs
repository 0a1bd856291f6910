//! The healthcheck manager.
//!
//! # Responsibilities
//! - Merge every vserver's wanted checks into one deduplicated probe set
//! - Keep probe IDs stable across consecutive merges
//! - Bind marks and IPVS services to backends probed in DSR/TUN mode
//! - Fan probe status out to every check sharing a probe
//!
//! # Concurrency
//! `ManagerTask` is the only writer. It owns the vserver checks, the mark
//! allocator and the mark bindings, and drains a bounded update queue plus
//! a shutdown channel one message at a time. After each merge it publishes
//! an immutable `Snapshot` through `ArcSwap`; handles read snapshots without
//! blocking the task or each other.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::CoordinatorConfig;
use crate::engine::builder::build_config;
use crate::engine::check::{Check, CheckKey, CheckNotification, Healthcheck};
use crate::engine::error::{FatalError, ManagerError};
use crate::engine::marks::{MarkAllocator, MarkKey};
use crate::healthcheck::{Config, Id, Notification, State, Status};
use crate::ipvs::ForwardingTable;
use crate::observability::metrics;

/// Published probe configurations, keyed by probe ID.
pub type ConfigMap = HashMap<Id, Arc<Config>>;

/// Everything that makes two checks the same probe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CheckerKey {
    key: CheckKey,
    cfg: Healthcheck,
}

/// State published after every merge.
///
/// `cfgs` and `checks` always have the same key set.
#[derive(Debug, Default)]
struct Snapshot {
    ids: HashMap<CheckerKey, Id>,
    cfgs: Arc<ConfigMap>,
    checks: HashMap<Id, Vec<Arc<Check>>>,
}

#[derive(Debug)]
struct Shared {
    snapshot: ArcSwap<Snapshot>,
    marks: ArcSwap<HashMap<MarkKey, u32>>,
    enabled: AtomicBool,
}

struct VserverChecks {
    vserver_name: String,
    checks: Option<HashMap<CheckKey, Arc<Check>>>,
}

enum Command {
    Update(VserverChecks),
    Sync { reply: oneshot::Sender<()> },
}

/// Handle to the healthcheck manager. Cheap to clone.
#[derive(Debug, Clone)]
pub struct HealthcheckManager {
    shared: Arc<Shared>,
    commands: mpsc::Sender<Command>,
    quit: mpsc::Sender<oneshot::Sender<()>>,
}

impl HealthcheckManager {
    /// Starts the manager task on the current tokio runtime.
    ///
    /// The join handle resolves when the task stops: `Ok` after shutdown (or
    /// once every handle is dropped), `Err` on a fatal error. Callers must
    /// treat `Err` as a reason to abort the process.
    pub fn spawn(
        config: &CoordinatorConfig,
        table: Arc<dyn ForwardingTable>,
    ) -> (Self, JoinHandle<Result<(), FatalError>>) {
        let shared = Arc::new(Shared {
            snapshot: ArcSwap::from_pointee(Snapshot::default()),
            marks: ArcSwap::from_pointee(HashMap::new()),
            enabled: AtomicBool::new(config.enabled),
        });
        let (commands_tx, commands_rx) = mpsc::channel(config.queue_size.max(1));
        let (quit_tx, quit_rx) = mpsc::channel(1);

        let task = ManagerTask {
            shared: shared.clone(),
            table,
            mark_alloc: MarkAllocator::new(config.mark_base, config.mark_size),
            marks: HashMap::new(),
            next: Id::seed(),
            vserver_checks: BTreeMap::new(),
        };
        let handle = tokio::spawn(task.run(commands_rx, quit_rx));

        let manager = Self {
            shared,
            commands: commands_tx,
            quit: quit_tx,
        };
        (manager, handle)
    }

    /// Probe configurations the execution engine should be running.
    ///
    /// `None` while the manager is disabled.
    pub fn configs(&self) -> Option<Arc<ConfigMap>> {
        if !self.is_enabled() {
            return None;
        }
        Some(self.shared.snapshot.load().cfgs.clone())
    }

    /// Replaces the checks wanted by a vserver. An empty map removes them.
    ///
    /// Waits for queue space if the manager is falling behind.
    pub async fn update(
        &self,
        vserver_name: impl Into<String>,
        checks: HashMap<CheckKey, Check>,
    ) -> Result<(), ManagerError> {
        let cmd = Command::Update(VserverChecks::new(vserver_name.into(), checks));
        self.commands
            .send(cmd)
            .await
            .map_err(|_| ManagerError::Stopped)
    }

    /// Like `update`, but fails instead of waiting when the queue is full.
    pub fn try_update(
        &self,
        vserver_name: impl Into<String>,
        checks: HashMap<CheckKey, Check>,
    ) -> Result<(), ManagerError> {
        let cmd = Command::Update(VserverChecks::new(vserver_name.into(), checks));
        self.commands.try_send(cmd).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ManagerError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => ManagerError::Stopped,
        })
    }

    /// Waits until every update queued before this call has been merged.
    pub async fn settled(&self) -> Result<(), ManagerError> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::Sync { reply })
            .await
            .map_err(|_| ManagerError::Stopped)?;
        rx.await.map_err(|_| ManagerError::Stopped)
    }

    pub fn enable(&self) {
        self.shared.enabled.store(true, Ordering::Release);
    }

    /// Stops publishing configs and delivering notifications. State is kept.
    pub fn disable(&self) {
        self.shared.enabled.store(false, Ordering::Release);
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::Acquire)
    }

    /// Releases every mark and IPVS service, then stops the manager task.
    ///
    /// Returns once the task has acknowledged.
    pub async fn shutdown(&self) -> Result<(), ManagerError> {
        let (ack, stopped) = oneshot::channel();
        self.quit.send(ack).await.map_err(|_| ManagerError::Stopped)?;
        stopped.await.map_err(|_| ManagerError::Stopped)
    }

    /// Routes a probe status to every check sharing the probe.
    ///
    /// Returns the number of notifications delivered.
    pub fn queue_health_state(&self, n: &Notification) -> usize {
        debug!(notification = %n, "Received healthcheck notification");

        if !self.is_enabled() {
            warn!(notification = %n, "Healthcheck manager is disabled; ignoring healthcheck notification");
            metrics::record_dropped_notification("disabled");
            return 0;
        }

        let snapshot = self.shared.snapshot.load();
        let (Some(cfg), Some(checks)) = (snapshot.cfgs.get(&n.id), snapshot.checks.get(&n.id))
        else {
            warn!(id = %n.id, "Unknown healthcheck ID");
            metrics::record_dropped_notification("unknown_id");
            return 0;
        };

        let description = cfg.checker.to_string();
        for check in checks {
            check.notifier.queue_check_notification(CheckNotification {
                key: check.key.clone(),
                description: description.clone(),
                status: n.status.clone(),
            });
        }
        metrics::record_notifications(n.status.state, checks.len());
        checks.len()
    }

    /// Reports every known probe as `Unknown`, invalidating health state.
    ///
    /// Returns the number of notifications delivered.
    pub fn expire(&self) -> usize {
        let ids: Vec<Id> = self.shared.snapshot.load().ids.values().copied().collect();
        ids.into_iter()
            .map(|id| {
                self.queue_health_state(&Notification {
                    id,
                    status: Status::new(State::Unknown),
                })
            })
            .sum()
    }

    /// Probe ID currently serving the given check, if any.
    pub fn id_of(&self, key: &CheckKey) -> Option<Id> {
        let snapshot = self.shared.snapshot.load();
        snapshot
            .checks
            .iter()
            .find(|(_, checks)| checks.iter().any(|c| &c.key == key))
            .map(|(id, _)| *id)
    }

    /// Keys of every check sharing probe `id`.
    pub fn checks(&self, id: Id) -> Vec<CheckKey> {
        let snapshot = self.shared.snapshot.load();
        snapshot
            .checks
            .get(&id)
            .map(|checks| checks.iter().map(|c| c.key.clone()).collect())
            .unwrap_or_default()
    }

    /// Current mark bindings.
    pub fn marks(&self) -> Arc<HashMap<MarkKey, u32>> {
        self.shared.marks.load_full()
    }
}

impl VserverChecks {
    fn new(vserver_name: String, checks: HashMap<CheckKey, Check>) -> Self {
        let checks = if checks.is_empty() {
            None
        } else {
            Some(checks.into_iter().map(|(k, c)| (k, Arc::new(c))).collect())
        };
        Self {
            vserver_name,
            checks,
        }
    }
}

/// Single writer for all manager state.
struct ManagerTask {
    shared: Arc<Shared>,
    table: Arc<dyn ForwardingTable>,
    mark_alloc: MarkAllocator,
    marks: HashMap<MarkKey, u32>,
    next: Id,
    vserver_checks: BTreeMap<String, HashMap<CheckKey, Arc<Check>>>,
}

impl ManagerTask {
    async fn run(
        mut self,
        mut commands: mpsc::Receiver<Command>,
        mut quit: mpsc::Receiver<oneshot::Sender<()>>,
    ) -> Result<(), FatalError> {
        loop {
            tokio::select! {
                biased;
                ack = quit.recv() => {
                    self.unmark_all_backends()?;
                    if let Some(ack) = ack {
                        let _ = ack.send(());
                    }
                    info!("Healthcheck manager stopped");
                    return Ok(());
                }
                cmd = commands.recv() => match cmd {
                    Some(Command::Update(vc)) => self.update(vc.vserver_name, vc.checks)?,
                    Some(Command::Sync { reply }) => {
                        let _ = reply.send(());
                    }
                    None => {
                        self.unmark_all_backends()?;
                        info!("All healthcheck manager handles dropped, stopping");
                        return Ok(());
                    }
                },
            }
        }
    }

    fn update(
        &mut self,
        vserver_name: String,
        checks: Option<HashMap<CheckKey, Arc<Check>>>,
    ) -> Result<(), FatalError> {
        match checks {
            Some(checks) => {
                self.vserver_checks.insert(vserver_name, checks);
            }
            None => {
                self.vserver_checks.remove(&vserver_name);
            }
        }
        metrics::record_vservers(self.vserver_checks.len());
        self.build_maps()
    }

    /// Rebuilds ids, cfgs and checks from every vserver's wanted checks.
    ///
    /// An ID survives only if its dedup key was present in the previous
    /// merge as well.
    fn build_maps(&mut self) -> Result<(), FatalError> {
        let mut all_checks: HashMap<CheckKey, Arc<Check>> = HashMap::new();
        for (vserver, vchecks) in &self.vserver_checks {
            for (key, check) in vchecks {
                if all_checks.contains_key(key) {
                    warn!(vserver = %vserver, key = %key, "Duplicate key");
                    continue;
                }
                all_checks.insert(key.clone(), check.clone());
            }
        }

        let previous = self.shared.snapshot.load_full();
        let mut ids: HashMap<CheckerKey, Id> = HashMap::new();
        let mut cfgs: ConfigMap = HashMap::new();
        let mut checks: HashMap<Id, Vec<Arc<Check>>> = HashMap::new();

        for (key, check) in all_checks {
            let checker_key = CheckerKey {
                key: key.dedup(),
                cfg: check.healthcheck.dedup(),
            };

            let id = match ids.get(&checker_key).or_else(|| previous.ids.get(&checker_key)) {
                Some(id) => *id,
                None => {
                    let id = self.next;
                    self.next = id.next();
                    id
                }
            };

            let cfg = match cfgs.get(&id).or_else(|| previous.cfgs.get(&id)) {
                Some(cfg) => cfg.clone(),
                None => {
                    let mark = match checker_key.key.mark_key() {
                        Some(mkey) => self.mark_backend(mkey)?,
                        None => 0,
                    };
                    match build_config(id, &checker_key.key, &check.healthcheck, mark) {
                        Ok(cfg) => Arc::new(cfg),
                        Err(e) => {
                            error!(key = %key, error = %e, "Failed to build healthcheck config");
                            metrics::record_build_error();
                            continue;
                        }
                    }
                }
            };

            ids.insert(checker_key, id);
            cfgs.insert(id, cfg);
            checks.entry(id).or_default().push(check);
        }

        let wanted_marks: HashSet<MarkKey> = checks
            .values()
            .flatten()
            .filter_map(|check| check.key.mark_key())
            .collect();

        metrics::record_configs(cfgs.len());
        self.shared.snapshot.store(Arc::new(Snapshot {
            ids,
            cfgs: Arc::new(cfgs),
            checks,
        }));

        self.prune_marks(&wanted_marks)
    }

    /// Returns the mark for `key`, binding a new one and adding its IPVS
    /// service if needed.
    fn mark_backend(&mut self, key: MarkKey) -> Result<u32, FatalError> {
        if let Some(mark) = self.marks.get(&key) {
            return Ok(*mark);
        }

        let mark = self.mark_alloc.get()?;
        let service = key.service(mark);
        info!(backend = %key.backend, mode = %key.mode, mark, "Adding DSR/TUN IPVS service");
        self.table
            .add_service(&service)
            .map_err(|source| FatalError::AddService {
                backend: key.backend,
                mark,
                source,
            })?;

        self.marks.insert(key, mark);
        self.publish_marks();
        Ok(mark)
    }

    /// Removes the IPVS service for `key` and releases its mark.
    fn unmark_backend(&mut self, key: MarkKey) -> Result<(), FatalError> {
        let Some(&mark) = self.marks.get(&key) else {
            return Ok(());
        };

        let service = key.service(mark);
        info!(backend = %key.backend, mode = %key.mode, mark, "Removing DSR/TUN IPVS service");
        self.table
            .delete_service(&service)
            .map_err(|source| FatalError::DeleteService {
                backend: key.backend,
                mark,
                source,
            })?;

        self.marks.remove(&key);
        self.mark_alloc.put(mark);
        self.publish_marks();
        Ok(())
    }

    /// Unmarks backends no longer probed in DSR or TUN mode.
    fn prune_marks(&mut self, wanted: &HashSet<MarkKey>) -> Result<(), FatalError> {
        let stale: Vec<MarkKey> = self
            .marks
            .keys()
            .filter(|key| !wanted.contains(key))
            .copied()
            .collect();
        for key in stale {
            self.unmark_backend(key)?;
        }
        Ok(())
    }

    fn unmark_all_backends(&mut self) -> Result<(), FatalError> {
        let all: Vec<MarkKey> = self.marks.keys().copied().collect();
        for key in all {
            self.unmark_backend(key)?;
        }
        Ok(())
    }

    fn publish_marks(&self) {
        metrics::record_marks(self.marks.len());
        self.shared.marks.store(Arc::new(self.marks.clone()));
    }
}
