//! Status icons for CLI output

/// Status icons for different states
pub struct StatusIcon;

impl StatusIcon {
    /// Success icon (all replicas ready)
    pub const SUCCESS: &'static str = "✓";
    
    /// Warning icon (partial replicas ready)
    pub const WARNING: &'static str = "⚠";
    
    /// Error icon (no replicas ready)
    pub const ERROR: &'static str = "✗";
    
    /// Pending icon (waiting)
    pub const PENDING: &'static str = "⏳";
    
    /// Unknown icon
    pub const UNKNOWN: &'static str = "?";
    
    /// Get status icon based on ready/total replicas
    pub fn get_replica_icon(ready: u32, total: u32) -> &'static str {
        if total == 0 {
            Self::UNKNOWN
        } else if ready == total {
            Self::SUCCESS
        } else if ready > 0 {
            Self::WARNING
        } else {
            Self::ERROR
        }
    }
    
    /// Get icon for a pod phase
    pub fn get_pod_phase_icon(phase: &str) -> &'static str {
        match phase {
            "Running" => Self::SUCCESS,
            "Pending" => Self::PENDING,
            "Failed" => Self::ERROR,
            _ => Self::UNKNOWN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_replica_icon() {
        assert_eq!(StatusIcon::get_replica_icon(3, 3), StatusIcon::SUCCESS);
        assert_eq!(StatusIcon::get_replica_icon(2, 3), StatusIcon::WARNING);
        assert_eq!(StatusIcon::get_replica_icon(0, 3), StatusIcon::ERROR);
        assert_eq!(StatusIcon::get_replica_icon(0, 0), StatusIcon::UNKNOWN);
    }

    #[test]
    fn test_get_pod_phase_icon() {
        assert_eq!(StatusIcon::get_pod_phase_icon("Running"), StatusIcon::SUCCESS);
        assert_eq!(StatusIcon::get_pod_phase_icon("Pending"), StatusIcon::PENDING);
        assert_eq!(StatusIcon::get_pod_phase_icon("Succeeded"), StatusIcon::UNKNOWN);
    }
}
