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

use thiserror::Error;
pub type Result<T> = std::result::Result<T, OperatorError>;

#[derive(Error, Debug)]
pub enum OperatorError {
    #[error("Kubernetes API error: {0}")]
    KubeError(String),

    #[error("etcd admin error: {0}")]
    EtcdError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Resource not found: {resource_type} '{name}' in namespace '{namespace}'")]
    NotFound {
        resource_type: String,
        name: String,
        namespace: String,
    },

    #[error("Timeout error: {0}")]
    Timeout(String),

    #[error("Event queue of cluster '{0}' is full")]
    QueueFull(String),

    #[error("Controller of cluster '{0}' has stopped")]
    Stopped(String),

    #[error("Invariant violated: {0}")]
    Invariant(String),

    #[error("{operation} failed for {} member(s): {}", .failures.len(), format_failures(.failures))]
    PartialFailure {
        operation: String,
        failures: Vec<(String, String)>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("Base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
}

impl From<kube::Error> for OperatorError {
    fn from(err: kube::Error) -> Self {
        OperatorError::KubeError(err.to_string())
    }
}

fn format_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(name, cause)| format!("{}: {}", name, cause))
        .collect::<Vec<_>>()
        .join("; ")
}

impl OperatorError {
    pub fn config_error(context: impl Into<String>) -> Self {
        Self::ConfigError(context.into())
    }

    pub fn not_found(
        resource_type: impl Into<String>,
        name: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
            name: name.into(),
            namespace: namespace.into(),
        }
    }

    pub fn partial(operation: impl Into<String>, failures: Vec<(String, String)>) -> Self {
        Self::PartialFailure {
            operation: operation.into(),
            failures,
        }
    }

    /// Whether the error means the target was already absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
