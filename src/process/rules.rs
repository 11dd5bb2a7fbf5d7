//! Collapse rules deciding which processes are worth reporting.
//!
//! Rules are compiled once from `RulesConfig` and shared by the tree builder
//! (self-identification) and the flattener (init and high-order collapsing).

use ahash::AHashSet as HashSet;
use regex::Regex;

use crate::config::RulesConfig;

#[derive(Debug, thiserror::Error)]
pub enum RulesError {
    #[error("invalid {field} pattern: {source}")]
    Pattern {
        field: &'static str,
        #[source]
        source: regex::Error,
    },
}

/// Compiled collapse rules.
#[derive(Debug, Clone)]
pub struct ProcessRules {
    self_pattern: Regex,
    init_pattern: Regex,
    high_order: HashSet<String>,
}

impl ProcessRules {
    pub fn from_config(cfg: &RulesConfig) -> Result<Self, RulesError> {
        let self_pattern = Regex::new(&cfg.self_pattern).map_err(|source| RulesError::Pattern {
            field: "self",
            source,
        })?;
        let init_pattern = Regex::new(&cfg.init_pattern).map_err(|source| RulesError::Pattern {
            field: "init",
            source,
        })?;
        let high_order = cfg.high_order.iter().map(|s| s.to_lowercase()).collect();

        Ok(Self {
            self_pattern,
            init_pattern,
            high_order,
        })
    }

    /// The agent's own processes, never reported.
    ///
    /// Only the executable name is matched, so a process that merely mentions
    /// the agent in its arguments (an editor on its config file) is kept.
    pub fn is_self(&self, executable: &str) -> bool {
        self.self_pattern.is_match(executable)
    }

    /// `init`, optionally followed by a bracketed runlevel such as `init [3]`.
    pub fn is_init(&self, command: &str) -> bool {
        self.init_pattern.is_match(command)
    }

    /// Shells, terminal multiplexers and privilege wrappers.
    pub fn is_high_order(&self, executable: &str) -> bool {
        self.high_order.contains(executable)
    }
}

impl Default for ProcessRules {
    fn default() -> Self {
        // The default patterns are constant and known to compile.
        Self::from_config(&RulesConfig::default()).expect("default rules compile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::record::executable_name;

    #[test]
    fn test_init_pattern() {
        let rules = ProcessRules::default();
        assert!(rules.is_init("init"));
        assert!(rules.is_init("init [3]"));
        assert!(rules.is_init("init[2]"));
        assert!(!rules.is_init("init [abc]"));
        assert!(!rules.is_init("/sbin/init splash"));
        assert!(!rules.is_init("initd"));
    }

    #[test]
    fn test_self_pattern() {
        let rules = ProcessRules::default();
        assert!(rules.is_self(&executable_name(
            "/opt/cloudstats/bin/cloudstats-agent --config /etc/cloudstats/agent.yaml"
        )));
        assert!(rules.is_self("cloudstats"));
        assert!(!rules.is_self(&executable_name("vim /etc/cloudstats/agent.yaml")));
        assert!(!rules.is_self(&executable_name("tail -f /var/log/cloudstats.log")));
        assert!(!rules.is_self("nginx"));
    }

    #[test]
    fn test_high_order_membership() {
        let rules = ProcessRules::default();
        for name in ["bash", "-zsh", "tmux", "screen", "sudo", "sh"] {
            assert!(rules.is_high_order(name), "{} should collapse", name);
        }
        assert!(!rules.is_high_order("postgres"));
        assert!(!rules.is_high_order("bash5"));
    }

    #[test]
    fn test_invalid_pattern_is_reported() {
        let cfg = RulesConfig {
            init_pattern: "[".into(),
            ..RulesConfig::default()
        };
        let err = ProcessRules::from_config(&cfg).unwrap_err();
        assert!(err.to_string().contains("init"));
    }
}
