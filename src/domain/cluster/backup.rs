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

//! Point-in-time snapshots written atomically into the backup directory.

use crate::infrastructure::etcd::EtcdAdmin;
use crate::shared::error::{OperatorError, Result};
use chrono::Utc;
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupArtifact {
    pub path: PathBuf,
    pub size: u64,
}

/// `<cluster>-<UTC timestamp>`, sortable and unique per millisecond.
pub fn snapshot_file_name(cluster_name: &str) -> String {
    format!(
        "{}-{}",
        cluster_name,
        Utc::now().format("%Y%m%dT%H%M%S%.3fZ")
    )
}

/// Streams a snapshot from `endpoints` into a temporary file under
/// `backup_dir` and renames it into place once fully written.
///
/// On any failure the temporary file is removed and nothing appears under
/// the final name.
pub async fn save_snapshot(
    cluster_name: &str,
    backup_dir: &Path,
    admin: &dyn EtcdAdmin,
    endpoints: &[String],
    timeout: Duration,
) -> Result<BackupArtifact> {
    if endpoints.is_empty() {
        return Err(OperatorError::EtcdError(format!(
            "no client endpoints known for cluster {}",
            cluster_name
        )));
    }

    tokio::fs::create_dir_all(backup_dir).await?;

    let tmp = tempfile::Builder::new()
        .prefix(".snapshot-")
        .suffix(".part")
        .tempfile_in(backup_dir)?;

    tracing::info!(cluster = %cluster_name, endpoints = ?endpoints, "saving snapshot");

    let copy = async {
        let mut stream = admin.snapshot(endpoints, timeout).await?;
        let mut file = tokio::fs::File::from_std(tmp.reopen()?);
        let mut size = 0u64;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
            size += chunk.len() as u64;
        }

        file.flush().await?;
        file.sync_all().await?;
        Ok::<u64, OperatorError>(size)
    };

    let size = match tokio::time::timeout(timeout, copy).await {
        Ok(Ok(size)) => size,
        Ok(Err(e)) => {
            tracing::error!(cluster = %cluster_name, error = %e, "snapshot failed");
            return Err(e);
        }
        Err(_) => {
            tracing::error!(cluster = %cluster_name, timeout = ?timeout, "snapshot timed out");
            return Err(OperatorError::Timeout(format!(
                "snapshot of {} exceeded {:?}",
                cluster_name, timeout
            )));
        }
    };

    let path = backup_dir.join(snapshot_file_name(cluster_name));
    tmp.persist(&path).map_err(|e| OperatorError::Io(e.error))?;

    tracing::info!(cluster = %cluster_name, path = %path.display(), size, "snapshot saved");
    Ok(BackupArtifact { path, size })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_file_name() {
        let name = snapshot_file_name("demo");
        let stamp = name.strip_prefix("demo-").unwrap();

        assert!(stamp.ends_with('Z'));
        assert_eq!(stamp.len(), "20250101T000000.000Z".len());
    }
}
