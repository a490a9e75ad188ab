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

//! Create, reconcile and delete, run on the controller task only.

use crate::domain::cluster::controller::{Cluster, ClusterPhase};
use crate::domain::cluster::member::{member_name, member_ordinal, Member, MemberSet};
use crate::domain::config::ClusterSpec;
use crate::infrastructure::constants::MEMBER_REFRESH_RETRIES;
use crate::infrastructure::kubernetes::resources::{cluster_selector, JoinMode, WorkloadSpec};
use crate::shared::error::{OperatorError, Result};
use backon::{ExponentialBuilder, Retryable};
use std::collections::BTreeSet;

impl Cluster {
    /// Bootstraps `spec.size` members in "new" mode, all sharing one
    /// initial-cluster list. Any failure rolls back what was provisioned.
    pub(crate) async fn create(&mut self, spec: ClusterSpec) -> Result<()> {
        if self.phase != ClusterPhase::Pending {
            tracing::warn!(cluster = %self.name, phase = %self.phase, "cluster already created, ignoring NewCluster");
            return Ok(());
        }

        self.spec = spec;
        self.phase = ClusterPhase::Creating;
        self.publish();

        let names: Vec<String> = (0..u64::from(spec.size))
            .map(|ordinal| member_name(&self.name, ordinal))
            .collect();
        let initial = MemberSet::from_names(names.iter());
        let peers = initial.peer_url_pairs();

        tracing::info!(
            cluster = %self.name,
            size = spec.size,
            anti_affinity = spec.anti_affinity,
            "creating cluster"
        );

        let mut touched = Vec::with_capacity(names.len());
        for name in &names {
            touched.push(name.clone());
            if let Err(e) = self.provision(name, peers.clone(), JoinMode::New).await {
                tracing::error!(cluster = %self.name, member = %name, error = %e, "failed to provision member, rolling back");
                for name in &touched {
                    if let Err(cleanup) = self.remove_resources(name).await {
                        tracing::warn!(cluster = %self.name, member = %name, error = %cleanup, "rollback left resources behind");
                    }
                }
                self.members = MemberSet::new();
                self.phase = ClusterPhase::Failed;
                return Err(e);
            }
            self.id_counter += 1;
        }

        self.members = initial;
        self.phase = ClusterPhase::Running;
        tracing::info!(cluster = %self.name, members = %self.members, "cluster created");
        Ok(())
    }

    /// Drives the observed membership toward `members`: unexpected workloads
    /// are removed, missing members are replaced under fresh names.
    pub(crate) async fn reconcile(&mut self, running: &MemberSet) -> Result<()> {
        if self.phase != ClusterPhase::Running {
            tracing::debug!(cluster = %self.name, phase = %self.phase, "not running, skipping reconcile");
            return Ok(());
        }

        let unexpected = running.diff(&self.members);
        let missing = self.members.diff(running);

        if unexpected.is_empty() && missing.is_empty() {
            if self.members.iter().any(|m| !m.has_id()) {
                if let Err(e) = self.refresh_members().await {
                    tracing::debug!(cluster = %self.name, error = %e, "member ids not yet available");
                }
            }
            return Ok(());
        }

        tracing::info!(
            cluster = %self.name,
            unexpected = %unexpected,
            missing = %missing,
            "reconciling membership"
        );

        let mut failures = Vec::new();

        for member in unexpected.iter() {
            tracing::info!(cluster = %self.name, member = %member.name, "removing unexpected member");
            if let Err(e) = self.remove_resources(&member.name).await {
                failures.push((member.name.clone(), e.to_string()));
            }
        }

        for lost in missing.iter() {
            match self.replace(lost).await {
                Ok(()) => {}
                Err(e @ OperatorError::Invariant(_)) => return Err(e),
                Err(e) => failures.push((lost.name.clone(), e.to_string())),
            }
        }

        if let Err(e) = self.refresh_members().await {
            failures.push((self.name.clone(), format!("membership refresh: {}", e)));
        }

        tracing::info!(cluster = %self.name, members = %self.members, id_counter = self.id_counter, "reconcile finished");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(OperatorError::partial("reconcile", failures))
        }
    }

    /// Removes every workload and endpoint of the cluster. Keeps going past
    /// individual failures and reports them together.
    pub(crate) async fn delete(&mut self) -> Result<()> {
        self.phase = ClusterPhase::Deleting;
        self.publish();
        tracing::info!(cluster = %self.name, "deleting cluster");

        let mut failures = Vec::new();
        let mut names: BTreeSet<String> = self.members.names().into_iter().collect();

        match self
            .provisioner
            .list_workloads(&cluster_selector(&self.name))
            .await
        {
            Ok(workloads) => names.extend(workloads.into_iter().map(|w| w.name)),
            Err(e) => {
                tracing::warn!(cluster = %self.name, error = %e, "failed to list workloads, deleting known members only");
                failures.push((self.name.clone(), format!("list workloads: {}", e)));
            }
        }

        for name in &names {
            if let Err(e) = self.remove_resources(name).await {
                tracing::warn!(cluster = %self.name, member = %name, error = %e, "failed to delete member");
                failures.push((name.clone(), e.to_string()));
            }
        }

        self.members = MemberSet::new();
        self.phase = ClusterPhase::Deleted;
        tracing::info!(cluster = %self.name, deleted = names.len(), failed = failures.len(), "cluster deleted");

        if failures.is_empty() {
            Ok(())
        } else {
            Err(OperatorError::partial("delete", failures))
        }
    }

    async fn provision(
        &self,
        name: &str,
        peers: Vec<(String, String)>,
        join_mode: JoinMode,
    ) -> Result<()> {
        self.provisioner.create_endpoint(name, &self.name).await?;

        let spec = WorkloadSpec {
            member_name: name.to_string(),
            cluster_name: self.name.clone(),
            peers,
            join_mode,
            anti_affinity: self.spec.anti_affinity,
        };
        self.provisioner.create_workload(&spec).await?;

        tracing::info!(cluster = %self.name, member = %name, join_mode = %join_mode, "member provisioned");
        Ok(())
    }

    /// Endpoint first, then workload; both are attempted.
    async fn remove_resources(&self, name: &str) -> Result<()> {
        let endpoint = self.provisioner.delete_endpoint(name).await;
        let workload = self.provisioner.delete_workload(name).await;

        match (endpoint, workload) {
            (Ok(()), Ok(())) => Ok(()),
            (Err(e), Ok(())) | (Ok(()), Err(e)) => Err(e),
            (Err(endpoint), Err(workload)) => Err(OperatorError::KubeError(format!(
                "endpoint: {}; workload: {}",
                endpoint, workload
            ))),
        }
    }

    /// Withdraws `lost` and joins a replacement under the next ordinal.
    async fn replace(&mut self, lost: &Member) -> Result<()> {
        tracing::info!(cluster = %self.name, member = %lost.name, "replacing lost member");

        self.remove_resources(&lost.name).await?;

        let endpoints = self.members.client_urls();
        let id = if lost.has_id() {
            Some(lost.id)
        } else {
            self.registered_id(lost, &endpoints).await?
        };
        match id {
            Some(id) => self.admin.remove_member(&endpoints, id).await?,
            None => {
                tracing::info!(cluster = %self.name, member = %lost.name, "lost member was never registered");
            }
        }
        self.members.remove(&lost.name);

        let name = member_name(&self.name, self.id_counter);
        if self.members.contains(&name) {
            return Err(OperatorError::Invariant(format!(
                "minted name {} is already a member",
                name
            )));
        }
        self.id_counter += 1;

        let replacement = Member::new(name.clone());
        let endpoints = self.members.client_urls();
        let id = self
            .admin
            .add_member(&endpoints, &replacement.peer_url())
            .await?;

        let mut joined = self.members.clone();
        joined.add(Member::with_id(name.clone(), id));

        if let Err(e) = self
            .provision(&name, joined.peer_url_pairs(), JoinMode::Existing)
            .await
        {
            tracing::error!(cluster = %self.name, member = %name, error = %e, "failed to provision replacement, withdrawing it");
            if let Err(cleanup) = self.remove_resources(&name).await {
                tracing::warn!(cluster = %self.name, member = %name, error = %cleanup, "replacement left resources behind");
            }
            if let Err(cleanup) = self.admin.remove_member(&endpoints, id).await {
                tracing::warn!(cluster = %self.name, member = %name, error = %cleanup, "failed to deregister replacement");
            }
            return Err(e);
        }

        self.members = joined;
        Ok(())
    }

    /// Looks `member` up in etcd by name or peer URL. `None` means etcd
    /// does not list it; an unreachable etcd is an error.
    async fn registered_id(&self, member: &Member, endpoints: &[String]) -> Result<Option<u64>> {
        let infos = self.admin.list_members(endpoints).await.map_err(|e| {
            tracing::warn!(cluster = %self.name, member = %member.name, error = %e, "cannot resolve id of lost member, deferring replacement");
            e
        })?;

        let peer_url = member.peer_url();
        Ok(infos
            .into_iter()
            .find(|info| info.name == member.name || info.peer_urls.contains(&peer_url))
            .map(|info| info.id))
    }

    /// Replaces `members` with etcd's own view and pushes `id_counter` past
    /// every ordinal it reports.
    async fn refresh_members(&mut self) -> Result<()> {
        let endpoints = self.members.client_urls();
        let admin = self.admin.clone();

        let infos = (|| admin.list_members(&endpoints))
            .retry(ExponentialBuilder::default().with_max_times(MEMBER_REFRESH_RETRIES))
            .notify(|e, after| {
                tracing::debug!(cluster = %self.name, error = %e, retry_in = ?after, "member list failed, retrying");
            })
            .await?;

        let mut refreshed = MemberSet::new();
        for info in infos {
            let name = if info.name.is_empty() {
                info.peer_urls
                    .iter()
                    .find_map(|url| self.members.find_by_peer_url(url))
                    .map(|m| m.name.clone())
            } else {
                Some(info.name.clone())
            };

            let Some(name) = name else {
                tracing::warn!(cluster = %self.name, id = info.id, peer_urls = ?info.peer_urls, "skipping unresolvable member");
                continue;
            };

            if let Some(ordinal) = member_ordinal(&self.name, &name) {
                self.id_counter = self.id_counter.max(ordinal + 1);
            }
            refreshed.add(Member::with_id(name, info.id));
        }

        self.members = refreshed;
        Ok(())
    }
}
