// Copyright 2025 JiangLong.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! The per-cluster controller: a single task that owns all cluster state and
//! applies lifecycle events strictly one at a time.

use crate::domain::cluster::backup::{save_snapshot, BackupArtifact};
use crate::domain::cluster::member::MemberSet;
use crate::domain::cluster::monitor::PodMonitor;
use crate::domain::config::{validate_cluster_name, ClusterSpec, OperatorConf};
use crate::infrastructure::etcd::EtcdAdmin;
use crate::infrastructure::kubernetes::Provisioner;
use crate::shared::error::{OperatorError, Result};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClusterEvent {
    NewCluster(ClusterSpec),
    /// Members currently running, by name only.
    Reconcile { running: MemberSet },
    Delete,
}

impl ClusterEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            ClusterEvent::NewCluster(_) => "NewCluster",
            ClusterEvent::Reconcile { .. } => "Reconcile",
            ClusterEvent::Delete => "Delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterPhase {
    Pending,
    Creating,
    Running,
    Failed,
    Deleting,
    Deleted,
}

impl ClusterPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClusterPhase::Pending => "Pending",
            ClusterPhase::Creating => "Creating",
            ClusterPhase::Running => "Running",
            ClusterPhase::Failed => "Failed",
            ClusterPhase::Deleting => "Deleting",
            ClusterPhase::Deleted => "Deleted",
        }
    }
}

impl fmt::Display for ClusterPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Read-only copy of controller state, republished after every event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterStatus {
    pub name: String,
    pub phase: ClusterPhase,
    pub spec: ClusterSpec,
    pub members: MemberSet,
    pub id_counter: u64,
    pub events_processed: u64,
    pub last_error: Option<String>,
}

/// Producer side of a cluster's event queue. Never blocks.
#[derive(Clone)]
pub struct EventSender {
    cluster_name: String,
    tx: mpsc::Sender<ClusterEvent>,
    stop: CancellationToken,
}

impl EventSender {
    pub fn send(&self, event: ClusterEvent) -> Result<()> {
        if self.stop.is_cancelled() {
            return Err(OperatorError::Stopped(self.cluster_name.clone()));
        }

        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(event)) => {
                tracing::warn!(
                    cluster = %self.cluster_name,
                    event = event.kind(),
                    "event queue full, rejecting event"
                );
                Err(OperatorError::QueueFull(self.cluster_name.clone()))
            }
            Err(TrySendError::Closed(_)) => Err(OperatorError::Stopped(self.cluster_name.clone())),
        }
    }
}

/// State owned exclusively by the event loop task.
pub(crate) struct Cluster {
    pub(crate) name: String,
    pub(crate) provisioner: Arc<dyn Provisioner>,
    pub(crate) admin: Arc<dyn EtcdAdmin>,
    pub(crate) spec: ClusterSpec,
    pub(crate) phase: ClusterPhase,
    pub(crate) id_counter: u64,
    pub(crate) members: MemberSet,
    events_processed: u64,
    last_error: Option<String>,
    status_tx: watch::Sender<ClusterStatus>,
    stop: CancellationToken,
}

impl Cluster {
    fn status(&self) -> ClusterStatus {
        ClusterStatus {
            name: self.name.clone(),
            phase: self.phase,
            spec: self.spec,
            members: self.members.clone(),
            id_counter: self.id_counter,
            events_processed: self.events_processed,
            last_error: self.last_error.clone(),
        }
    }

    pub(crate) fn publish(&self) {
        self.status_tx.send_replace(self.status());
    }

    async fn run(mut self, mut events: mpsc::Receiver<ClusterEvent>) {
        tracing::info!(cluster = %self.name, "cluster controller started");

        let mut deferred = None;
        loop {
            let event = match deferred.take() {
                Some(event) => event,
                None => tokio::select! {
                    biased;
                    _ = self.stop.cancelled() => {
                        tracing::info!(cluster = %self.name, "stop signal observed");
                        break;
                    }
                    event = events.recv() => match event {
                        Some(event) => event,
                        None => break,
                    },
                },
            };
            if self.stop.is_cancelled() {
                break;
            }
            let event = self.coalesce(event, &mut events, &mut deferred);

            tracing::debug!(cluster = %self.name, event = event.kind(), "processing event");
            let terminal = matches!(event, ClusterEvent::Delete);
            let result = match event {
                ClusterEvent::NewCluster(spec) => self.create(spec).await,
                ClusterEvent::Reconcile { running } => self.reconcile(&running).await,
                ClusterEvent::Delete => self.delete().await,
            };

            self.events_processed += 1;
            let fatal = matches!(result, Err(OperatorError::Invariant(_)));
            self.record(result);

            if terminal || fatal {
                break;
            }
        }

        // Anything still queued is discarded.
        events.close();
        self.stop.cancel();
        self.publish();
        tracing::info!(cluster = %self.name, phase = %self.phase, "cluster controller stopped");
    }

    /// Folds consecutive queued Reconcile events into the newest one. The
    /// first other event found is handed back through `deferred`.
    fn coalesce(
        &mut self,
        event: ClusterEvent,
        events: &mut mpsc::Receiver<ClusterEvent>,
        deferred: &mut Option<ClusterEvent>,
    ) -> ClusterEvent {
        let mut running = match event {
            ClusterEvent::Reconcile { running } => running,
            other => return other,
        };

        let mut superseded: u64 = 0;
        while let Ok(next) = events.try_recv() {
            match next {
                ClusterEvent::Reconcile { running: newer } => {
                    running = newer;
                    superseded += 1;
                }
                other => {
                    *deferred = Some(other);
                    break;
                }
            }
        }

        if superseded > 0 {
            tracing::debug!(cluster = %self.name, superseded, "dropped stale observations");
            self.events_processed += superseded;
        }
        ClusterEvent::Reconcile { running }
    }

    fn record(&mut self, result: Result<()>) {
        match result {
            Ok(()) => self.last_error = None,
            Err(e) => {
                tracing::error!(cluster = %self.name, phase = %self.phase, error = %e, "cluster operation failed");
                self.last_error = Some(e.to_string());
            }
        }
        self.publish();
    }
}

/// Owner-side handle to a running cluster controller.
pub struct ClusterHandle {
    name: String,
    events: EventSender,
    stop: CancellationToken,
    status: watch::Receiver<ClusterStatus>,
    admin: Arc<dyn EtcdAdmin>,
    backup_dir: PathBuf,
    snapshot_timeout: Duration,
    tasks: Vec<JoinHandle<()>>,
}

impl ClusterHandle {
    /// Starts the event loop and the pod monitor for cluster `name`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(
        name: impl Into<String>,
        conf: &OperatorConf,
        provisioner: Arc<dyn Provisioner>,
        admin: Arc<dyn EtcdAdmin>,
    ) -> Result<Self> {
        let name = name.into();
        validate_cluster_name(&name)?;
        conf.validate()?;

        let (tx, rx) = mpsc::channel(conf.queue_capacity);
        let stop = CancellationToken::new();
        let events = EventSender {
            cluster_name: name.clone(),
            tx,
            stop: stop.clone(),
        };

        let cluster = Cluster {
            name: name.clone(),
            provisioner: provisioner.clone(),
            admin: admin.clone(),
            spec: ClusterSpec::default(),
            phase: ClusterPhase::Pending,
            id_counter: 0,
            members: MemberSet::new(),
            events_processed: 0,
            last_error: None,
            status_tx: watch::Sender::new(ClusterStatus {
                name: name.clone(),
                phase: ClusterPhase::Pending,
                spec: ClusterSpec::default(),
                members: MemberSet::new(),
                id_counter: 0,
                events_processed: 0,
                last_error: None,
            }),
            stop: stop.clone(),
        };
        let status = cluster.status_tx.subscribe();

        let monitor = PodMonitor::new(
            name.clone(),
            provisioner,
            events.clone(),
            stop.clone(),
            conf.monitor_interval(),
        );

        let tasks = vec![
            tokio::spawn(cluster.run(rx)),
            tokio::spawn(monitor.run()),
        ];

        Ok(Self {
            name,
            events,
            stop,
            status,
            admin,
            backup_dir: conf.backup_dir.clone(),
            snapshot_timeout: conf.snapshot_timeout(),
            tasks,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues creation of the cluster described by `spec`.
    pub fn start(&self, spec: ClusterSpec) -> Result<()> {
        self.events.send(ClusterEvent::NewCluster(spec))
    }

    /// Queues deletion of every workload of this cluster. Terminal.
    pub fn delete(&self) -> Result<()> {
        self.events.send(ClusterEvent::Delete)
    }

    /// Queues a reconcile against an externally observed set of running members.
    pub fn reconcile(&self, running: MemberSet) -> Result<()> {
        self.events.send(ClusterEvent::Reconcile { running })
    }

    /// Stops the controller without touching any workload.
    pub fn shutdown(&self) {
        self.stop.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Resolves once the stop signal is set.
    pub async fn stopped(&self) {
        self.stop.cancelled().await
    }

    pub fn status(&self) -> ClusterStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClusterStatus> {
        self.status.clone()
    }

    /// Snapshots the cluster through the client URLs of its last known members.
    pub async fn backup(&self) -> Result<BackupArtifact> {
        let endpoints = self.status.borrow().members.client_urls();
        save_snapshot(
            &self.name,
            &self.backup_dir,
            self.admin.as_ref(),
            &endpoints,
            self.snapshot_timeout,
        )
        .await
    }

    /// Waits for the loop and the monitor to exit.
    pub async fn join(self) -> Result<()> {
        for task in self.tasks {
            task.await.map_err(|e| {
                OperatorError::Invariant(format!("controller task of {} panicked: {}", self.name, e))
            })?;
        }
        Ok(())
    }
}
