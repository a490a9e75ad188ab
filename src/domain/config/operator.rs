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
use crate::shared::error::{OperatorError, Result};
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::path::PathBuf;
use std::time::Duration;

/// Longest member suffix is `-` plus the ordinal width; pod names cap at 63.
const MAX_CLUSTER_NAME_LEN: usize = 63 - 1 - MEMBER_ORDINAL_WIDTH;

/// Desired shape of one etcd cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub size: u32,
    #[serde(default)]
    pub anti_affinity: bool,
}

/// Operator-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorConf {
    pub namespace: String,
    pub etcd_image: String,
    pub backup_dir: PathBuf,
    pub call_timeout_secs: u64,
    pub snapshot_timeout_secs: u64,
    pub monitor_interval_secs: u64,
    pub queue_capacity: usize,
}

impl Default for OperatorConf {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            etcd_image: DEFAULT_ETCD_IMAGE.to_string(),
            backup_dir: PathBuf::from(DEFAULT_BACKUP_DIR),
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            snapshot_timeout_secs: DEFAULT_SNAPSHOT_TIMEOUT_SECS,
            monitor_interval_secs: DEFAULT_MONITOR_INTERVAL_SECS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl OperatorConf {
    /// Load configuration from TOML file
    pub fn from<T: AsRef<str>>(path: T) -> Result<Self> {
        let content = read_to_string(path.as_ref()).map_err(|e| {
            OperatorError::config_error(format!(
                "Failed to read config file {}: {}",
                path.as_ref(),
                e
            ))
        })?;

        Ok(toml::from_str(&content)?)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn snapshot_timeout(&self) -> Duration {
        Duration::from_secs(self.snapshot_timeout_secs)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn validate(&self) -> Result<()> {
        if !is_valid_k8s_name(&self.namespace) {
            return Err(OperatorError::ConfigError(format!(
                "Invalid namespace: {}",
                self.namespace
            )));
        }

        if self.etcd_image.trim().is_empty() {
            return Err(OperatorError::config_error("etcd_image must not be empty"));
        }

        if self.call_timeout_secs == 0 || self.snapshot_timeout_secs == 0 {
            return Err(OperatorError::config_error("timeouts must be > 0"));
        }

        if self.monitor_interval_secs == 0 {
            return Err(OperatorError::config_error(
                "monitor_interval_secs must be > 0",
            ));
        }

        if self.queue_capacity == 0 {
            return Err(OperatorError::config_error("queue_capacity must be > 0"));
        }

        Ok(())
    }
}

pub fn validate_cluster_name(name: &str) -> Result<()> {
    if !is_valid_k8s_name(name) {
        return Err(OperatorError::ConfigError(format!(
            "Invalid cluster name: {}",
            name
        )));
    }

    if name.len() > MAX_CLUSTER_NAME_LEN {
        return Err(OperatorError::ConfigError(format!(
            "cluster name too long (max {} chars): {}",
            MAX_CLUSTER_NAME_LEN, name
        )));
    }

    Ok(())
}

/// DNS-1123 label or subdomain, as Kubernetes requires for object names.
pub(crate) fn is_valid_k8s_name(name: &str) -> bool {
    use regex::Regex;

    if name.is_empty() || name.len() > 253 {
        return false;
    }

    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$")
        .map(|re| re.is_match(name))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let conf = OperatorConf::default();
        assert!(conf.validate().is_ok());
        assert_eq!(conf.queue_capacity, 100);
        assert_eq!(conf.monitor_interval(), Duration::from_secs(5));
        assert_eq!(conf.snapshot_timeout(), Duration::from_secs(300));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let conf: OperatorConf =
            toml::from_str("namespace = \"etcd\"\nqueue_capacity = 10\n").unwrap();
        assert_eq!(conf.namespace, "etcd");
        assert_eq!(conf.queue_capacity, 10);
        assert_eq!(conf.etcd_image, DEFAULT_ETCD_IMAGE);
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut conf = OperatorConf::default();
        conf.queue_capacity = 0;
        assert!(conf.validate().is_err());

        let mut conf = OperatorConf::default();
        conf.call_timeout_secs = 0;
        assert!(conf.validate().is_err());
    }

    #[test]
    fn test_cluster_name_validation() {
        assert!(validate_cluster_name("etcd-cluster").is_ok());
        assert!(validate_cluster_name("Etcd").is_err());
        assert!(validate_cluster_name("-etcd").is_err());
        assert!(validate_cluster_name(&"a".repeat(MAX_CLUSTER_NAME_LEN)).is_ok());
        assert!(validate_cluster_name(&"a".repeat(MAX_CLUSTER_NAME_LEN + 1)).is_err());
    }
}
