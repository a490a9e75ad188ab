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

use crate::infrastructure::constants::FIELD_MANAGER;
use crate::infrastructure::kubernetes::resources::{
    MemberPodBuilder, MemberServiceBuilder, WorkloadSpec,
};
use crate::shared::error::OperatorError;
use k8s_openapi::api::core::v1::{Pod, Service};
use kube::api::{DeleteParams, ListParams, PostParams};
use kube::{Api, Client};
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

/// A running (or pending) member workload as seen by Kubernetes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkloadInfo {
    pub name: String,
    pub phase: Option<String>,
}

/// Provisioning façade over the Kubernetes API.
///
/// Deletes are idempotent: a missing object counts as deleted.
#[async_trait::async_trait]
pub trait Provisioner: Send + Sync {
    async fn create_endpoint(&self, member_name: &str, cluster_name: &str)
        -> Result<(), OperatorError>;

    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<(), OperatorError>;

    async fn delete_workload(&self, name: &str) -> Result<(), OperatorError>;

    async fn delete_endpoint(&self, name: &str) -> Result<(), OperatorError>;

    async fn list_workloads(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<WorkloadInfo>, OperatorError>;
}

pub struct KubeProvisioner {
    client: Client,
    namespace: String,
    image: String,
    call_timeout: Duration,
}

impl KubeProvisioner {
    pub async fn new(
        namespace: String,
        image: String,
        call_timeout: Duration,
    ) -> Result<Self, OperatorError> {
        let client = Client::try_default().await.map_err(|e| {
            OperatorError::KubeError(format!("Failed to create Kubernetes client: {}", e))
        })?;

        Ok(Self {
            client,
            namespace,
            image,
            call_timeout,
        })
    }

    pub async fn new_with_config(
        namespace: String,
        image: String,
        call_timeout: Duration,
        kubeconfig_path: Option<String>,
        context: Option<String>,
    ) -> Result<Self, OperatorError> {
        use kube::config::{KubeConfigOptions, Kubeconfig};

        let kubeconfig = if let Some(path) = kubeconfig_path {
            Kubeconfig::read_from(path).map_err(|e| {
                OperatorError::KubeError(format!("Failed to load kubeconfig: {}", e))
            })?
        } else {
            Kubeconfig::read().map_err(|e| {
                OperatorError::KubeError(format!("Failed to load kubeconfig: {}", e))
            })?
        };

        let config_options = KubeConfigOptions {
            context,
            cluster: None,
            user: None,
        };

        let config = kube::Config::from_custom_kubeconfig(kubeconfig, &config_options)
            .await
            .map_err(|e| {
                OperatorError::KubeError(format!("Failed to create Kubernetes config: {}", e))
            })?;

        let client = Client::try_from(config).map_err(|e| {
            OperatorError::KubeError(format!("Failed to create Kubernetes client: {}", e))
        })?;

        Ok(Self {
            client,
            namespace,
            image,
            call_timeout,
        })
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn bounded<T, F>(&self, what: String, call: F) -> Result<T, OperatorError>
    where
        F: Future<Output = Result<T, kube::Error>>,
    {
        match tokio::time::timeout(self.call_timeout, call).await {
            Ok(result) => result.map_err(|e| self.map_api_error(&what, e)),
            Err(_) => Err(OperatorError::Timeout(format!(
                "{} did not complete within {:?}",
                what, self.call_timeout
            ))),
        }
    }

    fn map_api_error(&self, what: &str, err: kube::Error) -> OperatorError {
        match err {
            kube::Error::Api(ae) if ae.code == 404 => {
                let (resource_type, name) = what.split_once(' ').unwrap_or((what, ""));
                OperatorError::not_found(resource_type, name, &self.namespace)
            }
            e => OperatorError::KubeError(format!("{}: {}", what, e)),
        }
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(FIELD_MANAGER.to_string()),
            ..Default::default()
        }
    }
}

fn ignore_not_found(result: Result<(), OperatorError>) -> Result<(), OperatorError> {
    match result {
        Err(e) if e.is_not_found() => Ok(()),
        other => other,
    }
}

#[async_trait::async_trait]
impl Provisioner for KubeProvisioner {
    async fn create_endpoint(
        &self,
        member_name: &str,
        cluster_name: &str,
    ) -> Result<(), OperatorError> {
        let service = MemberServiceBuilder::new(
            member_name.to_string(),
            cluster_name.to_string(),
            self.namespace.clone(),
        )
        .build()?;
        let api: Api<Service> = Api::namespaced(self.client.clone(), &self.namespace);

        self.bounded(
            format!("Service {}", member_name),
            api.create(&Self::post_params(), &service),
        )
        .await?;
        Ok(())
    }

    async fn create_workload(&self, spec: &WorkloadSpec) -> Result<(), OperatorError> {
        let pod = MemberPodBuilder::new(spec, self.namespace.clone(), self.image.clone()).build()?;
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);

        self.bounded(
            format!("Pod {}", spec.member_name),
            api.create(&Self::post_params(), &pod),
        )
        .await?;
        Ok(())
    }

    async fn delete_workload(&self, name: &str) -> Result<(), OperatorError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let dp = DeleteParams::default();

        ignore_not_found(
            self.bounded(format!("Pod {}", name), api.delete(name, &dp))
                .await
                .map(|_| ()),
        )
    }

    async fn delete_endpoint(&self, name: &str) -> Result<(), OperatorError> {
        let api: Api<Service> = Api::namespaced(self.client.clone(), &self.namespace);
        let dp = DeleteParams::default();

        ignore_not_found(
            self.bounded(format!("Service {}", name), api.delete(name, &dp))
                .await
                .map(|_| ()),
        )
    }

    async fn list_workloads(
        &self,
        labels: &BTreeMap<String, String>,
    ) -> Result<Vec<WorkloadInfo>, OperatorError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), &self.namespace);
        let label_selector = labels
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join(",");
        let lp = ListParams::default().labels(&label_selector);

        let pods = self
            .bounded(format!("PodList {}", label_selector), api.list(&lp))
            .await?;

        Ok(pods
            .items
            .into_iter()
            .filter_map(|pod| {
                let name = pod.metadata.name?;
                let phase = pod.status.and_then(|s| s.phase);
                Some(WorkloadInfo { name, phase })
            })
            .collect())
    }
}
