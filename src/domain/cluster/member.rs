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

//! Membership data model

use crate::infrastructure::constants::{
    ETCD_CLIENT_PORT, ETCD_PEER_PORT, ETCD_URL_SCHEME, MEMBER_ORDINAL_WIDTH,
};
use std::collections::btree_map::{BTreeMap, Entry};
use std::fmt;

/// One etcd member, backed by a pod and a service of the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Member {
    pub name: String,
    /// Assigned by etcd once the member is registered; 0 until then.
    pub id: u64,
}

impl Member {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: 0,
        }
    }

    pub fn with_id(name: impl Into<String>, id: u64) -> Self {
        Self {
            name: name.into(),
            id,
        }
    }

    pub fn has_id(&self) -> bool {
        self.id != 0
    }

    pub fn peer_url(&self) -> String {
        format!("{}://{}:{}", ETCD_URL_SCHEME, self.name, ETCD_PEER_PORT)
    }

    pub fn client_url(&self) -> String {
        format!("{}://{}:{}", ETCD_URL_SCHEME, self.name, ETCD_CLIENT_PORT)
    }
}

/// Builds `<cluster>-<zero padded ordinal>`.
pub fn member_name(cluster_name: &str, ordinal: u64) -> String {
    format!(
        "{}-{:0width$}",
        cluster_name,
        ordinal,
        width = MEMBER_ORDINAL_WIDTH
    )
}

/// Inverse of [`member_name`]. Returns `None` for names of other clusters.
pub fn member_ordinal(cluster_name: &str, name: &str) -> Option<u64> {
    name.strip_prefix(cluster_name)?
        .strip_prefix('-')?
        .parse()
        .ok()
}

/// Members keyed by name. Iteration is always in lexicographic name order,
/// which is the order used to render `--initial-cluster`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemberSet {
    members: BTreeMap<String, Member>,
}

impl MemberSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut set = Self::new();
        for name in names {
            set.add(Member::new(name));
        }
        set
    }

    /// Inserts `member`, replacing any member with the same name.
    pub fn add(&mut self, member: Member) {
        match self.members.entry(member.name.clone()) {
            Entry::Occupied(mut existing) => {
                tracing::debug!(member = %member.name, "replacing duplicate member entry");
                existing.insert(member);
            }
            Entry::Vacant(slot) => {
                slot.insert(member);
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Member> {
        self.members.remove(name)
    }

    pub fn get(&self, name: &str) -> Option<&Member> {
        self.members.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.members.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Member> {
        self.members.values()
    }

    pub fn names(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }

    pub fn find_by_peer_url(&self, peer_url: &str) -> Option<&Member> {
        self.members.values().find(|m| m.peer_url() == peer_url)
    }

    /// Members of `self` whose names are not in `other`, in name order.
    pub fn diff(&self, other: &MemberSet) -> MemberSet {
        MemberSet {
            members: self
                .members
                .iter()
                .filter(|(name, _)| !other.contains(name))
                .map(|(name, m)| (name.clone(), m.clone()))
                .collect(),
        }
    }

    /// `(name, peerURL)` pairs in canonical order.
    pub fn peer_url_pairs(&self) -> Vec<(String, String)> {
        self.members
            .values()
            .map(|m| (m.name.clone(), m.peer_url()))
            .collect()
    }

    pub fn client_urls(&self) -> Vec<String> {
        self.members.values().map(Member::client_url).collect()
    }
}

impl FromIterator<Member> for MemberSet {
    fn from_iter<T: IntoIterator<Item = Member>>(iter: T) -> Self {
        let mut set = MemberSet::new();
        for member in iter {
            set.add(member);
        }
        set
    }
}

impl fmt::Display for MemberSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.names().join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_name_is_zero_padded() {
        assert_eq!(member_name("etcd-cluster", 0), "etcd-cluster-0000");
        assert_eq!(member_name("etcd-cluster", 42), "etcd-cluster-0042");
        assert_eq!(member_name("etcd-cluster", 12345), "etcd-cluster-12345");
    }

    #[test]
    fn test_member_ordinal_only_matches_own_cluster() {
        assert_eq!(member_ordinal("etcd-cluster", "etcd-cluster-0007"), Some(7));
        assert_eq!(member_ordinal("etcd-cluster", "other-0007"), None);
        assert_eq!(member_ordinal("etcd", "etcd-cluster-0007"), None);
        assert_eq!(member_ordinal("etcd-cluster", "etcd-cluster-"), None);
    }

    #[test]
    fn test_urls() {
        let m = Member::new("a-0000");
        assert_eq!(m.peer_url(), "http://a-0000:2380");
        assert_eq!(m.client_url(), "http://a-0000:2379");
        assert!(!m.has_id());
    }

    #[test]
    fn test_peer_pairs_are_sorted_by_name() {
        let set = MemberSet::from_names(["c-0002", "c-0000", "c-0001"]);
        let names: Vec<_> = set.peer_url_pairs().into_iter().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["c-0000", "c-0001", "c-0002"]);
    }

    #[test]
    fn test_add_is_last_write_wins() {
        let mut set = MemberSet::new();
        set.add(Member::with_id("a", 1));
        set.add(Member::with_id("a", 2));
        assert_eq!(set.len(), 1);
        assert_eq!(set.get("a").map(|m| m.id), Some(2));
    }

    #[test]
    fn test_diff_by_name() {
        let desired = MemberSet::from_names(["a", "b", "c"]);
        let observed = MemberSet::from_names(["a", "c", "d"]);
        assert_eq!(desired.diff(&observed).names(), vec!["b"]);
        assert_eq!(observed.diff(&desired).names(), vec!["d"]);
        assert!(desired.diff(&desired).is_empty());
    }
}
