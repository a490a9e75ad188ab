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

use crate::infrastructure::constants::{LABEL_APP, LABEL_APP_VALUE, LABEL_CLUSTER, LABEL_NODE};
use std::collections::BTreeMap;

pub trait LabeledResourceBuilder {
    fn cluster_name(&self) -> &str;

    fn member_name(&self) -> &str;

    fn get_labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_APP.to_string(), LABEL_APP_VALUE.to_string());
        labels.insert(LABEL_NODE.to_string(), self.member_name().to_string());
        labels.insert(LABEL_CLUSTER.to_string(), self.cluster_name().to_string());
        labels
    }

    fn get_selector_labels(&self) -> BTreeMap<String, String> {
        let mut labels = BTreeMap::new();
        labels.insert(LABEL_APP.to_string(), LABEL_APP_VALUE.to_string());
        labels.insert(LABEL_NODE.to_string(), self.member_name().to_string());
        labels
    }
}

/// Label set selecting every workload of one cluster.
pub fn cluster_selector(cluster_name: &str) -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert(LABEL_APP.to_string(), LABEL_APP_VALUE.to_string());
    labels.insert(LABEL_CLUSTER.to_string(), cluster_name.to_string());
    labels
}
