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

use crate::domain::cluster::controller::{ClusterEvent, EventSender};
use crate::domain::cluster::member::MemberSet;
use crate::infrastructure::constants::{POD_PHASE_FAILED, POD_PHASE_SUCCEEDED};
use crate::infrastructure::kubernetes::resources::cluster_selector;
use crate::infrastructure::kubernetes::{Provisioner, WorkloadInfo};
use crate::shared::error::{OperatorError, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Periodically lists a cluster's member pods and feeds the observation to
/// the controller as a `Reconcile` event.
pub struct PodMonitor {
    cluster_name: String,
    provisioner: Arc<dyn Provisioner>,
    events: EventSender,
    stop: CancellationToken,
    interval: Duration,
}

impl PodMonitor {
    pub fn new(
        cluster_name: String,
        provisioner: Arc<dyn Provisioner>,
        events: EventSender,
        stop: CancellationToken,
        interval: Duration,
    ) -> Self {
        Self {
            cluster_name,
            provisioner,
            events,
            stop,
            interval,
        }
    }

    pub async fn run(self) {
        tracing::debug!(cluster = %self.cluster_name, interval = ?self.interval, "pod monitor started");

        loop {
            tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }

            let running = match self.observe().await {
                Ok(running) => running,
                Err(e) => {
                    tracing::warn!(cluster = %self.cluster_name, error = %e, "failed to list member pods");
                    continue;
                }
            };

            match self.events.send(ClusterEvent::Reconcile { running }) {
                Ok(()) => {}
                Err(OperatorError::Stopped(_)) => break,
                Err(e) => {
                    tracing::warn!(cluster = %self.cluster_name, error = %e, "dropping observation");
                }
            }
        }

        tracing::debug!(cluster = %self.cluster_name, "pod monitor stopped");
    }

    async fn observe(&self) -> Result<MemberSet> {
        let workloads = self
            .provisioner
            .list_workloads(&cluster_selector(&self.cluster_name))
            .await?;
        Ok(running_members(workloads))
    }
}

/// Pods that terminated are treated as gone even if the object still exists.
pub fn running_members(workloads: Vec<WorkloadInfo>) -> MemberSet {
    MemberSet::from_names(
        workloads
            .into_iter()
            .filter(|w| {
                !matches!(
                    w.phase.as_deref(),
                    Some(POD_PHASE_FAILED) | Some(POD_PHASE_SUCCEEDED)
                )
            })
            .map(|w| w.name),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn workload(name: &str, phase: Option<&str>) -> WorkloadInfo {
        WorkloadInfo {
            name: name.to_string(),
            phase: phase.map(str::to_string),
        }
    }

    #[test]
    fn test_running_members_skips_terminated_pods() {
        let running = running_members(vec![
            workload("c-0000", Some("Running")),
            workload("c-0001", Some("Failed")),
            workload("c-0002", Some("Pending")),
            workload("c-0003", Some("Succeeded")),
            workload("c-0004", None),
        ]);

        assert_eq!(running.names(), vec!["c-0000", "c-0002", "c-0004"]);
    }
}
