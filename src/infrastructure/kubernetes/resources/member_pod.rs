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

use crate::infrastructure::constants::*;
use crate::infrastructure::kubernetes::resources::traits::LabeledResourceBuilder;
use crate::shared::error::{OperatorError, Result};
use k8s_openapi::api::core::v1::{
    Affinity, Container, ContainerPort, EmptyDirVolumeSource, Pod, PodAffinityTerm,
    PodAntiAffinity, PodSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use std::collections::BTreeMap;
use std::fmt;

/// Whether a new member bootstraps a fresh cluster or joins a running one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinMode {
    New,
    Existing,
}

impl JoinMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            JoinMode::New => INITIAL_CLUSTER_STATE_NEW,
            JoinMode::Existing => INITIAL_CLUSTER_STATE_EXISTING,
        }
    }
}

impl fmt::Display for JoinMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to start one member's workload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadSpec {
    pub member_name: String,
    pub cluster_name: String,
    /// `(name, peerURL)` of every member, in canonical order.
    pub peers: Vec<(String, String)>,
    pub join_mode: JoinMode,
    pub anti_affinity: bool,
}

impl WorkloadSpec {
    pub fn initial_cluster(&self) -> String {
        self.peers
            .iter()
            .map(|(name, url)| format!("{}={}", name, url))
            .collect::<Vec<_>>()
            .join(",")
    }

    fn peer_url(&self) -> Option<&str> {
        self.peers
            .iter()
            .find(|(name, _)| *name == self.member_name)
            .map(|(_, url)| url.as_str())
    }
}

pub struct MemberPodBuilder<'a> {
    spec: &'a WorkloadSpec,
    namespace: String,
    image: String,
}

impl LabeledResourceBuilder for MemberPodBuilder<'_> {
    fn cluster_name(&self) -> &str {
        &self.spec.cluster_name
    }

    fn member_name(&self) -> &str {
        &self.spec.member_name
    }
}

impl<'a> MemberPodBuilder<'a> {
    pub fn new(spec: &'a WorkloadSpec, namespace: String, image: String) -> Self {
        Self {
            spec,
            namespace,
            image,
        }
    }

    pub fn build(&self) -> Result<Pod> {
        let peer_url = self.spec.peer_url().ok_or_else(|| {
            OperatorError::config_error(format!(
                "member {} is missing from its own peer list",
                self.spec.member_name
            ))
        })?;

        let container = Container {
            name: CONTAINER_NAME_ETCD.to_string(),
            image: Some(self.image.clone()),
            command: Some(self.build_command(peer_url)),
            ports: Some(vec![
                ContainerPort {
                    container_port: ETCD_CLIENT_PORT,
                    name: Some(PORT_NAME_CLIENT.to_string()),
                    ..Default::default()
                },
                ContainerPort {
                    container_port: ETCD_PEER_PORT,
                    name: Some(PORT_NAME_PEER.to_string()),
                    ..Default::default()
                },
            ]),
            volume_mounts: Some(vec![VolumeMount {
                name: VOLUME_NAME_DATA.to_string(),
                mount_path: ETCD_DATA_DIR.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        };

        let pod = Pod {
            metadata: ObjectMeta {
                name: Some(self.spec.member_name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(self.get_labels()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![container],
                volumes: Some(vec![Volume {
                    name: VOLUME_NAME_DATA.to_string(),
                    empty_dir: Some(EmptyDirVolumeSource::default()),
                    ..Default::default()
                }]),
                restart_policy: Some(RESTART_POLICY_NEVER.to_string()),
                affinity: self.build_affinity(),
                ..Default::default()
            }),
            ..Default::default()
        };

        Ok(pod)
    }

    fn build_command(&self, peer_url: &str) -> Vec<String> {
        let name = &self.spec.member_name;
        let mut command = vec![
            "/usr/local/bin/etcd".to_string(),
            format!("--data-dir={}", ETCD_DATA_DIR),
            format!("--name={}", name),
            format!("--initial-advertise-peer-urls={}", peer_url),
            format!(
                "--listen-peer-urls={}://0.0.0.0:{}",
                ETCD_URL_SCHEME, ETCD_PEER_PORT
            ),
            format!(
                "--listen-client-urls={}://0.0.0.0:{}",
                ETCD_URL_SCHEME, ETCD_CLIENT_PORT
            ),
            format!(
                "--advertise-client-urls={}://{}:{}",
                ETCD_URL_SCHEME, name, ETCD_CLIENT_PORT
            ),
            format!("--initial-cluster={}", self.spec.initial_cluster()),
            format!("--initial-cluster-state={}", self.spec.join_mode),
        ];

        if self.spec.join_mode == JoinMode::New {
            command.push(format!(
                "--initial-cluster-token={}",
                self.spec.cluster_name
            ));
        }

        command
    }

    /// No two members of one cluster may share a node.
    fn build_affinity(&self) -> Option<Affinity> {
        if !self.spec.anti_affinity {
            return None;
        }

        let mut match_labels = BTreeMap::new();
        match_labels.insert(LABEL_CLUSTER.to_string(), self.spec.cluster_name.clone());

        Some(Affinity {
            pod_anti_affinity: Some(PodAntiAffinity {
                required_during_scheduling_ignored_during_execution: Some(vec![
                    PodAffinityTerm {
                        label_selector: Some(LabelSelector {
                            match_labels: Some(match_labels),
                            ..Default::default()
                        }),
                        topology_key: TOPOLOGY_KEY_HOSTNAME.to_string(),
                        ..Default::default()
                    },
                ]),
                ..Default::default()
            }),
            ..Default::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(join_mode: JoinMode, anti_affinity: bool) -> WorkloadSpec {
        WorkloadSpec {
            member_name: "etcd-cluster-0001".to_string(),
            cluster_name: "etcd-cluster".to_string(),
            peers: vec![
                (
                    "etcd-cluster-0000".to_string(),
                    "http://etcd-cluster-0000:2380".to_string(),
                ),
                (
                    "etcd-cluster-0001".to_string(),
                    "http://etcd-cluster-0001:2380".to_string(),
                ),
            ],
            join_mode,
            anti_affinity,
        }
    }

    fn command_of(pod: &Pod) -> Vec<String> {
        pod.spec.as_ref().unwrap().containers[0]
            .command
            .clone()
            .unwrap()
    }

    #[test]
    fn test_new_member_bootstraps_with_full_peer_list() {
        let spec = spec(JoinMode::New, false);
        let pod = MemberPodBuilder::new(&spec, "default".to_string(), DEFAULT_ETCD_IMAGE.to_string())
            .build()
            .unwrap();

        let command = command_of(&pod);
        assert!(command.contains(&"--name=etcd-cluster-0001".to_string()));
        assert!(command.contains(
            &"--initial-cluster=etcd-cluster-0000=http://etcd-cluster-0000:2380,etcd-cluster-0001=http://etcd-cluster-0001:2380"
                .to_string()
        ));
        assert!(command.contains(&"--initial-cluster-state=new".to_string()));
        assert!(command.contains(&"--initial-cluster-token=etcd-cluster".to_string()));
        assert!(pod.spec.unwrap().affinity.is_none());
    }

    #[test]
    fn test_existing_member_has_no_cluster_token() {
        let spec = spec(JoinMode::Existing, false);
        let pod = MemberPodBuilder::new(&spec, "default".to_string(), DEFAULT_ETCD_IMAGE.to_string())
            .build()
            .unwrap();

        let command = command_of(&pod);
        assert!(command.contains(&"--initial-cluster-state=existing".to_string()));
        assert!(!command.iter().any(|arg| arg.starts_with("--initial-cluster-token")));
    }

    #[test]
    fn test_anti_affinity_is_required_per_host() {
        let spec = spec(JoinMode::New, true);
        let pod = MemberPodBuilder::new(&spec, "default".to_string(), DEFAULT_ETCD_IMAGE.to_string())
            .build()
            .unwrap();

        let terms = pod
            .spec
            .unwrap()
            .affinity
            .unwrap()
            .pod_anti_affinity
            .unwrap()
            .required_during_scheduling_ignored_during_execution
            .unwrap();
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].topology_key, TOPOLOGY_KEY_HOSTNAME);
        let labels = terms[0]
            .label_selector
            .as_ref()
            .unwrap()
            .match_labels
            .as_ref()
            .unwrap();
        assert_eq!(labels.get(LABEL_CLUSTER).map(String::as_str), Some("etcd-cluster"));
    }

    #[test]
    fn test_pod_labels_select_cluster() {
        let spec = spec(JoinMode::New, false);
        let pod = MemberPodBuilder::new(&spec, "ns".to_string(), DEFAULT_ETCD_IMAGE.to_string())
            .build()
            .unwrap();

        let labels = pod.metadata.labels.unwrap();
        assert_eq!(labels.get(LABEL_APP).map(String::as_str), Some("etcd"));
        assert_eq!(labels.get(LABEL_NODE).map(String::as_str), Some("etcd-cluster-0001"));
        assert_eq!(labels.get(LABEL_CLUSTER).map(String::as_str), Some("etcd-cluster"));
        assert_eq!(pod.metadata.namespace.as_deref(), Some("ns"));
    }

    #[test]
    fn test_member_missing_from_peers_is_rejected() {
        let mut spec = spec(JoinMode::New, false);
        spec.peers.truncate(1);
        let result =
            MemberPodBuilder::new(&spec, "default".to_string(), DEFAULT_ETCD_IMAGE.to_string())
                .build();
        assert!(matches!(result, Err(OperatorError::ConfigError(_))));
    }
}
