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

// Cluster commands

use crate::cli::display::{MemberRow, TableRenderer};
use crate::domain::cluster::monitor::running_members;
use crate::domain::cluster::{save_snapshot, ClusterHandle, ClusterStatus};
use crate::domain::config::{
    apply_to_operator_conf, parse_dynamic_configs, validate_cluster_name, ClusterSpec,
    OperatorConf,
};
use crate::infrastructure::etcd::{EtcdAdmin, EtcdGatewayClient};
use crate::infrastructure::kubernetes::resources::cluster_selector;
use crate::infrastructure::kubernetes::{KubeProvisioner, Provisioner};
use clap::{Args, Parser};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const CONF_FILE_ENV: &str = "ETCD_KUBE_CONF_FILE";

/// Options shared by every command that talks to Kubernetes.
#[derive(Args, Debug, Clone)]
pub struct ConnectArgs {
    /// Kubernetes namespace (overrides the config file)
    #[arg(long, short = 'n')]
    pub namespace: Option<String>,

    /// Path to kubeconfig file
    /// If not specified, uses default kubeconfig resolution (KUBECONFIG env or ~/.kube/config)
    #[arg(long)]
    pub kubeconfig: Option<String>,

    /// Kubernetes context to use
    #[arg(long)]
    pub context: Option<String>,

    /// Path to operator configuration file (TOML)
    /// Falls back to ETCD_KUBE_CONF_FILE, then to built-in defaults
    #[arg(long, value_name = "PATH")]
    pub config_file: Option<String>,

    /// Dynamic configuration properties (-D key=value)
    ///
    /// Keys: kubernetes.namespace, etcd.image, backup.dir, timeout.call-secs,
    /// timeout.snapshot-secs, monitor.interval-secs, queue.capacity
    #[arg(short = 'D', value_name = "KEY=VALUE")]
    pub properties: Vec<String>,
}

impl ConnectArgs {
    /// Priority: command line > -D properties > config file > defaults
    pub fn load_conf(&self) -> anyhow::Result<OperatorConf> {
        let mut conf = if let Some(ref path) = self.config_file {
            OperatorConf::from(path)?
        } else if let Ok(path) = std::env::var(CONF_FILE_ENV) {
            OperatorConf::from(&path)?
        } else {
            OperatorConf::default()
        };

        if !self.properties.is_empty() {
            let configs = parse_dynamic_configs(&self.properties)?;
            apply_to_operator_conf(&configs, &mut conf)?;
        }

        if let Some(ref namespace) = self.namespace {
            conf.namespace = namespace.clone();
        }

        conf.validate()?;
        Ok(conf)
    }

    pub async fn provisioner(&self, conf: &OperatorConf) -> anyhow::Result<KubeProvisioner> {
        let provisioner = KubeProvisioner::new_with_config(
            conf.namespace.clone(),
            conf.etcd_image.clone(),
            conf.call_timeout(),
            self.kubeconfig.clone(),
            self.context.clone(),
        )
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;
        Ok(provisioner)
    }
}

#[derive(Parser, Debug)]
pub struct RunCommand {
    /// Cluster name; members are named <cluster>-0000, <cluster>-0001, ...
    #[arg(long, short = 'c')]
    pub cluster: String,

    /// Number of members
    #[arg(long, default_value = "3")]
    pub size: u32,

    /// Never co-locate two members on one node
    #[arg(long)]
    pub anti_affinity: bool,

    /// Delete all workloads when interrupted instead of leaving them running
    #[arg(long)]
    pub delete_on_exit: bool,

    /// Take a snapshot every N seconds while running
    #[arg(long, value_name = "SECS", value_parser = clap::value_parser!(u64).range(1..))]
    pub backup_interval: Option<u64>,

    /// Backup directory (overrides the config file)
    #[arg(long)]
    pub backup_dir: Option<PathBuf>,

    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Parser, Debug)]
pub struct BackupCommand {
    /// Cluster name, used to name the snapshot file
    #[arg(long, short = 'c')]
    pub cluster: String,

    /// Client endpoints to snapshot from (comma-separated)
    /// Defaults to the client URLs of the cluster's running members
    #[arg(long, value_delimiter = ',')]
    pub endpoints: Vec<String>,

    /// Backup directory (overrides the config file)
    #[arg(long)]
    pub backup_dir: Option<PathBuf>,

    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Parser, Debug)]
pub struct DeleteCommand {
    #[arg(long, short = 'c')]
    pub cluster: String,

    #[command(flatten)]
    pub connect: ConnectArgs,
}

#[derive(Parser, Debug)]
pub struct StatusCommand {
    #[arg(long, short = 'c')]
    pub cluster: String,

    #[command(flatten)]
    pub connect: ConnectArgs,
}

impl RunCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let mut conf = self.connect.load_conf()?;
        if let Some(ref dir) = self.backup_dir {
            conf.backup_dir = dir.clone();
        }

        let provisioner = Arc::new(self.connect.provisioner(&conf).await?);
        let admin = Arc::new(EtcdGatewayClient::new(conf.call_timeout())?);

        let handle = ClusterHandle::spawn(&self.cluster, &conf, provisioner, admin)?;
        handle.start(ClusterSpec {
            size: self.size,
            anti_affinity: self.anti_affinity,
        })?;

        println!(
            "Managing etcd cluster {} ({} members) in namespace {}. Press Ctrl-C to stop.",
            self.cluster, self.size, conf.namespace
        );

        let renderer = TableRenderer::new();
        let mut status = handle.subscribe();
        let mut shown: Option<ClusterStatus> = None;
        let backup_every = self.backup_interval.map(Duration::from_secs);
        let mut backup_ticker = backup_every
            .map(|every| tokio::time::interval_at(tokio::time::Instant::now() + every, every));

        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = handle.stopped() => break,
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let current = status.borrow_and_update().clone();
                    if shown.as_ref().map_or(true, |s| s.phase != current.phase || s.members != current.members) {
                        println!("{}", renderer.render_cluster_status(&current));
                    }
                    if let Some(ref e) = current.last_error {
                        eprintln!("⚠️  {}", e);
                    }
                    shown = Some(current);
                }
                _ = tick(&mut backup_ticker) => {
                    match handle.backup().await {
                        Ok(artifact) => println!("Snapshot saved to {} ({} bytes)", artifact.path.display(), artifact.size),
                        Err(e) => eprintln!("⚠️  Snapshot failed: {}", e),
                    }
                }
            }
        }

        if self.delete_on_exit && !handle.is_stopped() {
            println!("Deleting cluster {}...", self.cluster);
            handle.delete()?;
        } else {
            handle.shutdown();
        }

        handle.stopped().await;
        let last = handle.status();
        handle.join().await?;

        println!("{}", renderer.render_cluster_status(&last));
        Ok(())
    }
}

/// Pends forever when no ticker is configured.
async fn tick(ticker: &mut Option<tokio::time::Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

impl BackupCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        validate_cluster_name(&self.cluster)?;

        let mut conf = self.connect.load_conf()?;
        if let Some(ref dir) = self.backup_dir {
            conf.backup_dir = dir.clone();
        }

        let endpoints = if self.endpoints.is_empty() {
            let provisioner = self.connect.provisioner(&conf).await?;
            let workloads = provisioner
                .list_workloads(&cluster_selector(&self.cluster))
                .await?;
            running_members(workloads).client_urls()
        } else {
            self.endpoints.clone()
        };

        if endpoints.is_empty() {
            return Err(anyhow::anyhow!(
                "No running members found for cluster {} (use --endpoints)",
                self.cluster
            ));
        }

        let admin = EtcdGatewayClient::new(conf.call_timeout())?;
        let artifact = save_snapshot(
            &self.cluster,
            &conf.backup_dir,
            &admin,
            &endpoints,
            conf.snapshot_timeout(),
        )
        .await
        .map_err(|e| anyhow::anyhow!("Failed to save snapshot: {}", e))?;

        println!(
            "Snapshot of {} saved to {} ({} bytes)",
            self.cluster,
            artifact.path.display(),
            artifact.size
        );
        Ok(())
    }
}

impl DeleteCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        let conf = self.connect.load_conf()?;
        let provisioner = Arc::new(self.connect.provisioner(&conf).await?);
        let admin = Arc::new(EtcdGatewayClient::new(conf.call_timeout())?);

        let handle = ClusterHandle::spawn(&self.cluster, &conf, provisioner, admin)?;
        handle.delete()?;
        handle.stopped().await;

        let last = handle.status();
        handle.join().await?;

        if let Some(e) = last.last_error {
            return Err(anyhow::anyhow!("Failed to delete cluster: {}", e));
        }

        println!("Cluster {} deleted successfully!", self.cluster);
        Ok(())
    }
}

impl StatusCommand {
    pub async fn execute(&self) -> anyhow::Result<()> {
        validate_cluster_name(&self.cluster)?;

        let conf = self.connect.load_conf()?;
        let provisioner = self.connect.provisioner(&conf).await?;

        let workloads = provisioner
            .list_workloads(&cluster_selector(&self.cluster))
            .await
            .map_err(|e| anyhow::anyhow!("Failed to list members: {}", e))?;

        // Member ids are best effort: the cluster may not be reachable from here.
        let endpoints = running_members(workloads.clone()).client_urls();
        let registered = if endpoints.is_empty() {
            Vec::new()
        } else {
            let admin = EtcdGatewayClient::new(conf.call_timeout())?;
            admin.list_members(&endpoints).await.unwrap_or_else(|e| {
                tracing::debug!(cluster = %self.cluster, error = %e, "member ids unavailable");
                Vec::new()
            })
        };

        let rows: Vec<MemberRow> = workloads
            .into_iter()
            .map(|w| MemberRow {
                id: registered.iter().find(|m| m.name == w.name).map(|m| m.id),
                name: w.name,
                phase: w.phase,
            })
            .collect();

        let renderer = TableRenderer::new();
        println!(
            "{}",
            renderer.render_members(&self.cluster, &conf.namespace, &rows)
        );
        Ok(())
    }
}
