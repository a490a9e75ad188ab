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

//! `-D key=value` overrides applied on top of the loaded configuration.

use crate::domain::config::OperatorConf;
use crate::shared::error::{OperatorError, Result};
use std::collections::HashMap;
use std::path::PathBuf;

/// Parse dynamic configuration properties from -D key=value format
pub fn parse_dynamic_configs(configs: &[String]) -> Result<HashMap<String, String>> {
    let mut map = HashMap::new();

    for config in configs {
        let (key, value) = config.split_once('=').ok_or_else(|| {
            OperatorError::ConfigError(format!(
                "Invalid config format: '{}'. Expected 'key=value'",
                config
            ))
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(OperatorError::ConfigError(format!(
                "Empty key in config: '{}'",
                config
            )));
        }

        map.insert(key.to_string(), value.trim().to_string());
    }

    Ok(map)
}

pub fn apply_to_operator_conf(
    configs: &HashMap<String, String>,
    conf: &mut OperatorConf,
) -> Result<()> {
    for (key, value) in configs {
        match key.as_str() {
            "kubernetes.namespace" => conf.namespace = value.clone(),
            "etcd.image" => conf.etcd_image = value.clone(),
            "backup.dir" => conf.backup_dir = PathBuf::from(value),
            "timeout.call-secs" => conf.call_timeout_secs = parse_number(key, value)?,
            "timeout.snapshot-secs" => conf.snapshot_timeout_secs = parse_number(key, value)?,
            "monitor.interval-secs" => conf.monitor_interval_secs = parse_number(key, value)?,
            "queue.capacity" => conf.queue_capacity = parse_number(key, value)?,
            _ => {
                return Err(OperatorError::ConfigError(format!(
                    "Unknown config key: '{}'",
                    key
                )))
            }
        }
    }

    Ok(())
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value.parse::<T>().map_err(|_| {
        OperatorError::ConfigError(format!("'{}' expects a number, got '{}'", key, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_and_apply() {
        let configs = parse_dynamic_configs(&[
            "etcd.image=quay.io/coreos/etcd:v3.4.0".to_string(),
            "queue.capacity = 8".to_string(),
        ])
        .unwrap();

        let mut conf = OperatorConf::default();
        apply_to_operator_conf(&configs, &mut conf).unwrap();
        assert_eq!(conf.etcd_image, "quay.io/coreos/etcd:v3.4.0");
        assert_eq!(conf.queue_capacity, 8);
    }

    #[test]
    fn test_invalid_entries() {
        assert!(parse_dynamic_configs(&["novalue".to_string()]).is_err());
        assert!(parse_dynamic_configs(&["=x".to_string()]).is_err());

        let mut conf = OperatorConf::default();
        let configs = parse_dynamic_configs(&["queue.capacity=lots".to_string()]).unwrap();
        assert!(apply_to_operator_conf(&configs, &mut conf).is_err());

        let configs = parse_dynamic_configs(&["unknown.key=1".to_string()]).unwrap();
        assert!(apply_to_operator_conf(&configs, &mut conf).is_err());
    }
}
