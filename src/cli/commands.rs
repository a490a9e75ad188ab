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

// CLI command definitions

use super::cluster::{BackupCommand, DeleteCommand, RunCommand, StatusCommand};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(
    name = "etcd-kube",
    version,
    about = "Run and maintain etcd clusters on Kubernetes",
    long_about = "A standalone operator that creates etcd clusters as bare pods, replaces lost members and takes snapshots"
)]
pub struct CliArgs {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(clap::Subcommand, Debug)]
pub enum Commands {
    /// Create a cluster and keep its membership converged until interrupted
    Run(RunCommand),

    /// Save a snapshot of a running cluster
    Backup(BackupCommand),

    /// Show member pods of a cluster
    Status(StatusCommand),

    /// Delete all member pods and services of a cluster
    Delete(DeleteCommand),
}
