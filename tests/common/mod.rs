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

//! In-memory stand-in for both the Kubernetes API and etcd's admin API.
//!
//! Pods created in "new" mode are registered with etcd immediately, the way
//! a bootstrapped member is. Pods created in "existing" mode only start
//! (and get their name filled in) if their peer URL was added first.

#![allow(dead_code)]

use async_trait::async_trait;
use etcd_kube::domain::cluster::ClusterStatus;
use etcd_kube::infrastructure::etcd::{EtcdAdmin, MemberInfo, SnapshotStream};
use etcd_kube::infrastructure::kubernetes::resources::{JoinMode, WorkloadSpec};
use etcd_kube::infrastructure::kubernetes::{Provisioner, WorkloadInfo};
use etcd_kube::{OperatorConf, OperatorError, Result};
use futures::stream::{self, StreamExt};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CreateEndpoint(String),
    CreateWorkload {
        name: String,
        join_mode: JoinMode,
        peers: Vec<String>,
        anti_affinity: bool,
    },
    DeleteEndpoint(String),
    DeleteWorkload(String),
    AddMember(String),
    RemoveMember(u64),
}

impl Call {
    pub fn is_provisioning(&self) -> bool {
        !matches!(self, Call::AddMember(_) | Call::RemoveMember(_))
    }
}

#[derive(Default)]
struct State {
    calls: Vec<Call>,
    pods: BTreeMap<String, String>,
    services: BTreeSet<String>,
    members: Vec<MemberInfo>,
    next_id: u64,
    fail_workloads: HashSet<String>,
    fail_deletes: HashSet<String>,
    admin_down: bool,
    snapshot: Vec<u8>,
    snapshot_fail_after: Option<usize>,
}

#[derive(Clone, Default)]
pub struct FakeKube {
    state: Arc<Mutex<State>>,
}

fn peer_url(name: &str) -> String {
    format!("http://{}:2380", name)
}

fn kube_error(message: String) -> OperatorError {
    OperatorError::KubeError(message)
}

impl FakeKube {
    pub fn new() -> Self {
        let fake = Self::default();
        fake.state.lock().unwrap().next_id = 0x100;
        fake
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn provisioning_calls(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(Call::is_provisioning)
            .collect()
    }

    pub fn clear_calls(&self) {
        self.state.lock().unwrap().calls.clear();
    }

    pub fn pods(&self) -> Vec<String> {
        self.state.lock().unwrap().pods.keys().cloned().collect()
    }

    pub fn services(&self) -> Vec<String> {
        self.state.lock().unwrap().services.iter().cloned().collect()
    }

    pub fn etcd_members(&self) -> Vec<MemberInfo> {
        self.state.lock().unwrap().members.clone()
    }

    /// Pod disappears; its etcd registration and service stay behind.
    pub fn kill(&self, name: &str) {
        self.state.lock().unwrap().pods.remove(name);
    }

    pub fn set_pod_phase(&self, name: &str, phase: &str) {
        if let Some(p) = self.state.lock().unwrap().pods.get_mut(name) {
            *p = phase.to_string();
        }
    }

    /// A pod that was not created by the controller.
    pub fn add_stray_pod(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .pods
            .insert(name.to_string(), "Running".to_string());
    }

    pub fn register_member(&self, name: &str) -> u64 {
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = state.next_id;
        state.members.push(MemberInfo {
            id,
            name: name.to_string(),
            peer_urls: vec![peer_url(name)],
            client_urls: vec![],
        });
        id
    }

    pub fn fail_workload(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_workloads
            .insert(name.to_string());
    }

    pub fn fail_delete(&self, name: &str) {
        self.state
            .lock()
            .unwrap()
            .fail_deletes
            .insert(name.to_string());
    }

    pub fn set_admin_down(&self, down: bool) {
        self.state.lock().unwrap().admin_down = down;
    }

    pub fn set_snapshot(&self, data: Vec<u8>, fail_after: Option<usize>) {
        let mut state = self.state.lock().unwrap();
        state.snapshot = data;
        state.snapshot_fail_after = fail_after;
    }

    pub fn observed(&self) -> etcd_kube::MemberSet {
        etcd_kube::MemberSet::from_names(self.pods())
    }
}

#[async_trait]
impl Provisioner for FakeKube {
    async fn create_endpoint(&self, member_name: &str, _cluster_name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::CreateEndpoint(member_name.to_string()));
        state.services.insert(member_name.to_string());
        Ok(())
    }

    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::CreateWorkload {
            name: spec.member_name.clone(),
            join_mode: spec.join_mode,
            peers: spec.peers.iter().map(|(name, _)| name.clone()).collect(),
            anti_affinity: spec.anti_affinity,
        });

        if state.fail_workloads.contains(&spec.member_name) {
            return Err(kube_error(format!("pod {} rejected", spec.member_name)));
        }

        state
            .pods
            .insert(spec.member_name.clone(), "Running".to_string());

        let url = peer_url(&spec.member_name);
        match spec.join_mode {
            JoinMode::New => {
                state.next_id += 1;
                let id = state.next_id;
                state.members.push(MemberInfo {
                    id,
                    name: spec.member_name.clone(),
                    peer_urls: vec![url],
                    client_urls: vec![],
                });
            }
            JoinMode::Existing => {
                if let Some(m) = state.members.iter_mut().find(|m| m.peer_urls.contains(&url)) {
                    m.name = spec.member_name.clone();
                }
            }
        }
        Ok(())
    }

    async fn delete_workload(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DeleteWorkload(name.to_string()));
        if state.fail_deletes.contains(name) {
            return Err(kube_error(format!("pod {} stuck", name)));
        }
        state.pods.remove(name);
        Ok(())
    }

    async fn delete_endpoint(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::DeleteEndpoint(name.to_string()));
        if state.fail_deletes.contains(name) {
            return Err(kube_error(format!("service {} stuck", name)));
        }
        state.services.remove(name);
        Ok(())
    }

    async fn list_workloads(&self, _labels: &BTreeMap<String, String>) -> Result<Vec<WorkloadInfo>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .pods
            .iter()
            .map(|(name, phase)| WorkloadInfo {
                name: name.clone(),
                phase: Some(phase.clone()),
            })
            .collect())
    }
}

#[async_trait]
impl EtcdAdmin for FakeKube {
    async fn list_members(&self, _endpoints: &[String]) -> Result<Vec<MemberInfo>> {
        let state = self.state.lock().unwrap();
        if state.admin_down {
            return Err(OperatorError::EtcdError("connection refused".to_string()));
        }
        Ok(state.members.clone())
    }

    async fn add_member(&self, _endpoints: &[String], peer_url: &str) -> Result<u64> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::AddMember(peer_url.to_string()));
        if state.admin_down {
            return Err(OperatorError::EtcdError("connection refused".to_string()));
        }
        state.next_id += 1;
        let id = state.next_id;
        state.members.push(MemberInfo {
            id,
            name: String::new(),
            peer_urls: vec![peer_url.to_string()],
            client_urls: vec![],
        });
        Ok(id)
    }

    async fn remove_member(&self, _endpoints: &[String], id: u64) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(Call::RemoveMember(id));
        if state.admin_down {
            return Err(OperatorError::EtcdError("connection refused".to_string()));
        }
        state.members.retain(|m| m.id != id);
        Ok(())
    }

    async fn snapshot(&self, _endpoints: &[String], _timeout: Duration) -> Result<SnapshotStream> {
        let state = self.state.lock().unwrap();
        if state.admin_down {
            return Err(OperatorError::EtcdError("connection refused".to_string()));
        }

        let data = state.snapshot.clone();
        let fail_after = state.snapshot_fail_after;
        let chunks: Vec<Result<Vec<u8>>> = match fail_after {
            Some(n) => vec![
                Ok(data[..n.min(data.len())].to_vec()),
                Err(OperatorError::EtcdError("snapshot stream reset".to_string())),
            ],
            None => data.chunks(1024).map(|c| Ok(c.to_vec())).collect(),
        };
        Ok(stream::iter(chunks).boxed())
    }
}

/// Operator settings that keep the pod monitor out of the way.
pub fn quiet_conf() -> OperatorConf {
    OperatorConf {
        monitor_interval_secs: 3600,
        ..OperatorConf::default()
    }
}

/// Waits until the controller has processed `n` events.
pub async fn processed(status: &mut watch::Receiver<ClusterStatus>, n: u64) -> ClusterStatus {
    let status = tokio::time::timeout(
        Duration::from_secs(30),
        status.wait_for(|s| s.events_processed >= n),
    )
    .await
    .expect("controller did not process events in time")
    .expect("controller dropped its status channel");
    status.clone()
}
