// Risk classification for destructive operations

/// Case-insensitive substrings that mark a command as destructive
pub const DEFAULT_RISK_PATTERNS: &[&str] = &[
    "rm -rf",
    "dd if=",
    "mkfs",
    "format",
    "> /dev/",
    "shutdown",
    "halt",
    "poweroff",
];

/// Why an operation needs explicit acknowledgement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RiskAssessment {
    pub matched: Vec<String>,
    pub summary: String,
}

#[derive(Debug, Clone)]
pub struct RiskPolicy {
    patterns: Vec<String>,
}

impl Default for RiskPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RISK_PATTERNS.iter().map(|p| p.to_string()))
    }
}

impl RiskPolicy {
    pub fn new(patterns: impl IntoIterator<Item = String>) -> Self {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.to_lowercase())
                .filter(|p| !p.trim().is_empty())
                .collect(),
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn assess(&self, command: &str) -> Option<RiskAssessment> {
        let haystack = command.to_lowercase();
        let matched: Vec<String> = self
            .patterns
            .iter()
            .filter(|p| haystack.contains(p.as_str()))
            .cloned()
            .collect();
        if matched.is_empty() {
            return None;
        }
        let summary = format!(
            "Command contains potentially dangerous operations: {}",
            matched.join(", ")
        );
        Some(RiskAssessment { matched, summary })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_patterns_case_insensitive() {
        let policy = RiskPolicy::default();
        let risk = policy.assess("sudo SHUTDOWN -r now").unwrap();
        assert_eq!(risk.matched, vec!["shutdown".to_string()]);

        assert!(policy.assess("echo 1 > /dev/sda").is_some());
        assert!(policy.assess("uptime").is_none());
        assert!(policy.assess("df -h").is_none());
    }

    #[test]
    fn test_multiple_matches_listed() {
        let risk = RiskPolicy::default()
            .assess("rm -rf /tmp/x && halt")
            .unwrap();
        assert_eq!(risk.matched.len(), 2);
        assert!(risk.summary.contains("rm -rf"));
        assert!(risk.summary.contains("halt"));
    }

    #[test]
    fn test_custom_patterns() {
        let policy = RiskPolicy::new(vec!["Reboot".to_string(), "  ".to_string()]);
        assert_eq!(policy.patterns(), &["reboot".to_string()]);
        assert!(policy.assess("reboot").is_some());
        assert!(policy.assess("rm -rf /").is_none());
    }
}
