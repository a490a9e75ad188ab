//! Table rendering for CLI output

use super::{ColorTheme, StatusIcon};
use crate::domain::cluster::{ClusterPhase, ClusterStatus};
use colored::Colorize;
use comfy_table::{presets::UTF8_FULL, Cell, CellAlignment, ContentArrangement, Table};

/// One member pod for list display
#[derive(Debug, Clone)]
pub struct MemberRow {
    pub name: String,
    pub id: Option<u64>,
    pub phase: Option<String>,
}

/// Table renderer for formatted output
pub struct TableRenderer {
    theme: ColorTheme,
}

impl Default for TableRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TableRenderer {
    pub fn new() -> Self {
        Self {
            theme: ColorTheme::default(),
        }
    }

    /// Render member pods of one cluster as observed in Kubernetes
    pub fn render_members(&self, cluster: &str, namespace: &str, members: &[MemberRow]) -> String {
        if members.is_empty() {
            return format!("No members of etcd cluster {} found in {}", cluster, namespace);
        }

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_header(vec![
                Cell::new("MEMBER").set_alignment(CellAlignment::Left),
                Cell::new("ID").set_alignment(CellAlignment::Left),
                Cell::new("PHASE").set_alignment(CellAlignment::Center),
            ]);

        for member in members {
            let phase = member.phase.as_deref().unwrap_or("Unknown");
            table.add_row(vec![
                Cell::new(&member.name),
                Cell::new(
                    member
                        .id
                        .map(|id| format!("{:x}", id))
                        .unwrap_or_else(|| "-".to_string()),
                ),
                Cell::new(format!("{} {}", StatusIcon::get_pod_phase_icon(phase), phase))
                    .fg(self.theme.get_pod_phase_color(phase)),
            ]);
        }

        let mut output = String::new();
        output.push_str(&format!(
            "╭─ etcd cluster {} {} ─╮\n",
            cluster,
            format!("[{} members in {}]", members.len(), namespace)
                .bright_black()
                .to_string()
        ));
        output.push_str(&table.to_string());
        output.push('\n');
        output.push_str(&format!(
            "Legend: {} Running  {} Pending  {} Failed\n",
            StatusIcon::SUCCESS.green(),
            StatusIcon::PENDING.yellow(),
            StatusIcon::ERROR.red()
        ));

        output
    }

    /// Render the controller's view of a cluster
    pub fn render_cluster_status(&self, status: &ClusterStatus) -> String {
        let ready = status.members.len() as u32;
        let size = status.spec.size;

        let (phase_icon, phase_color) = match status.phase {
            ClusterPhase::Running => (StatusIcon::get_replica_icon(ready, size), self.theme.get_replica_color(ready, size)),
            ClusterPhase::Pending | ClusterPhase::Creating => (StatusIcon::PENDING, self.theme.warning),
            ClusterPhase::Deleting | ClusterPhase::Deleted => (StatusIcon::UNKNOWN, self.theme.muted),
            ClusterPhase::Failed => (StatusIcon::ERROR, self.theme.error),
        };

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic);

        table.add_row(vec![
            Cell::new(format!("📊 etcd Cluster {}", status.name)).set_alignment(CellAlignment::Center)
        ]);
        table.add_row(vec![
            Cell::new(format!("Status: {} {}", phase_icon, status.phase))
                .fg(phase_color)
                .set_alignment(CellAlignment::Left)
        ]);
        table.add_row(vec![Cell::new(format!(
            "Members: {}/{}  Next ordinal: {}",
            ready, size, status.id_counter
        ))]);

        for member in status.members.iter() {
            let id = if member.has_id() {
                format!("{:x}", member.id)
            } else {
                "unregistered".to_string()
            };
            table.add_row(vec![Cell::new(format!("  {}  {}", member.name, id)).fg(self.theme.info)]);
        }

        if let Some(ref error) = status.last_error {
            table.add_row(vec![Cell::new(format!("{} {}", StatusIcon::WARNING, error)).fg(self.theme.error)]);
        }

        table.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cluster::{Member, MemberSet};
    use crate::domain::config::ClusterSpec;

    #[test]
    fn test_render_empty_members() {
        let renderer = TableRenderer::new();
        let output = renderer.render_members("demo", "default", &[]);
        assert!(output.contains("No members of etcd cluster demo found"));
    }

    #[test]
    fn test_render_members() {
        let renderer = TableRenderer::new();
        let rows = vec![
            MemberRow {
                name: "demo-0000".to_string(),
                id: Some(0xabc),
                phase: Some("Running".to_string()),
            },
            MemberRow {
                name: "demo-0001".to_string(),
                id: None,
                phase: None,
            },
        ];

        let output = renderer.render_members("demo", "default", &rows);
        assert!(output.contains("demo-0000"));
        assert!(output.contains("abc"));
        assert!(output.contains("Unknown"));
    }

    #[test]
    fn test_render_cluster_status() {
        let renderer = TableRenderer::new();
        let members: MemberSet = vec![Member::with_id("demo-0000", 0x10), Member::new("demo-0001")]
            .into_iter()
            .collect();
        let status = ClusterStatus {
            name: "demo".to_string(),
            phase: ClusterPhase::Running,
            spec: ClusterSpec {
                size: 3,
                anti_affinity: false,
            },
            members,
            id_counter: 2,
            events_processed: 4,
            last_error: Some("reconcile failed".to_string()),
        };

        let output = renderer.render_cluster_status(&status);
        assert!(output.contains("Running"));
        assert!(output.contains("2/3"));
        assert!(output.contains("unregistered"));
        assert!(output.contains("reconcile failed"));
    }
}
