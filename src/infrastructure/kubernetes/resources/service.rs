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
use crate::shared::error::OperatorError;
use k8s_openapi::api::core::v1::{Service, ServicePort, ServiceSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

const MEMBER_SERVICE_PORTS: &[(&str, i32)] = &[
    (PORT_NAME_CLIENT, ETCD_CLIENT_PORT),
    (PORT_NAME_PEER, ETCD_PEER_PORT),
];

/// Builds the per-member Service that gives a member its stable DNS name.
pub struct MemberServiceBuilder {
    member_name: String,
    cluster_name: String,
    namespace: String,
}

impl LabeledResourceBuilder for MemberServiceBuilder {
    fn cluster_name(&self) -> &str {
        &self.cluster_name
    }

    fn member_name(&self) -> &str {
        &self.member_name
    }
}

impl MemberServiceBuilder {
    pub fn new(member_name: String, cluster_name: String, namespace: String) -> Self {
        Self {
            member_name,
            cluster_name,
            namespace,
        }
    }

    pub fn build(&self) -> Result<Service, OperatorError> {
        let ports = MEMBER_SERVICE_PORTS
            .iter()
            .map(|(name, port)| self.create_service_port(name, *port))
            .collect();

        let service = Service {
            metadata: ObjectMeta {
                name: Some(self.member_name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: Some(self.get_labels()),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                type_: Some("ClusterIP".to_string()),
                ports: Some(ports),
                selector: Some(self.get_selector_labels()),
                // Peers must resolve each other before the member reports ready.
                publish_not_ready_addresses: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };

        Ok(service)
    }

    fn create_service_port(&self, name: &str, port: i32) -> ServicePort {
        ServicePort {
            name: Some(name.to_string()),
            port,
            target_port: Some(IntOrString::Int(port)),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_service_shape() {
        let service = MemberServiceBuilder::new(
            "etcd-cluster-0001".to_string(),
            "etcd-cluster".to_string(),
            "default".to_string(),
        )
        .build()
        .unwrap();

        assert_eq!(service.metadata.name.as_deref(), Some("etcd-cluster-0001"));
        let labels = service.metadata.labels.unwrap();
        assert_eq!(labels.get(LABEL_CLUSTER).map(String::as_str), Some("etcd-cluster"));

        let spec = service.spec.unwrap();
        let selector = spec.selector.unwrap();
        assert_eq!(selector.get(LABEL_NODE).map(String::as_str), Some("etcd-cluster-0001"));
        assert!(!selector.contains_key(LABEL_CLUSTER));

        let ports = spec.ports.unwrap();
        let port_numbers: Vec<i32> = ports.iter().map(|p| p.port).collect();
        assert_eq!(port_numbers, vec![2379, 2380]);
    }
}
