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

/// etcd ports
pub const ETCD_CLIENT_PORT: i32 = 2379;
pub const ETCD_PEER_PORT: i32 = 2380;

/// Port names
pub const PORT_NAME_CLIENT: &str = "client";
pub const PORT_NAME_PEER: &str = "server";

/// URL scheme used for peer and client traffic
pub const ETCD_URL_SCHEME: &str = "http";

/// Resource labels
pub const LABEL_APP: &str = "app";
pub const LABEL_APP_VALUE: &str = "etcd";
pub const LABEL_CLUSTER: &str = "etcd_cluster";
pub const LABEL_NODE: &str = "etcd_node";

/// Container settings
pub const CONTAINER_NAME_ETCD: &str = "etcd";
pub const DEFAULT_ETCD_IMAGE: &str = "quay.io/coreos/etcd:v3.5.17";
pub const ETCD_DATA_DIR: &str = "/var/etcd/data";
pub const VOLUME_NAME_DATA: &str = "etcd-data";

/// Join modes passed as --initial-cluster-state
pub const INITIAL_CLUSTER_STATE_NEW: &str = "new";
pub const INITIAL_CLUSTER_STATE_EXISTING: &str = "existing";

/// Restart policy; a member that exits is replaced, never restarted in place
pub const RESTART_POLICY_NEVER: &str = "Never";

/// Affinity topology key
pub const TOPOLOGY_KEY_HOSTNAME: &str = "kubernetes.io/hostname";

/// Controller settings
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;
pub const DEFAULT_MONITOR_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SNAPSHOT_TIMEOUT_SECS: u64 = 300;
pub const MEMBER_REFRESH_RETRIES: usize = 3;

/// Pod phases that no longer count as running
pub const POD_PHASE_FAILED: &str = "Failed";
pub const POD_PHASE_SUCCEEDED: &str = "Succeeded";

/// Member names are `<cluster>-<4 digit ordinal>`
pub const MEMBER_ORDINAL_WIDTH: usize = 4;

/// Defaults
pub const DEFAULT_NAMESPACE: &str = "default";
pub const DEFAULT_BACKUP_DIR: &str = "/var/lib/etcd-kube/backups";

/// Field manager recorded on objects created by the operator
pub const FIELD_MANAGER: &str = "etcd-kube";
