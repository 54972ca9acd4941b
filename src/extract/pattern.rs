//! Identifier extraction — ordered regex rules with a stoplist.
//!
//! Rules are tried in priority order. Within a rule, every match is scanned in
//! text order; a candidate on the stoplist is skipped and scanning continues.
//! The first accepted candidate wins.

use regex::Regex;
use tracing::debug;

use crate::error::ConfigError;

/// Tokens that look like identifiers but come from URL plumbing.
pub const DEFAULT_STOPLIST: &[&str] = &["github", "http", "https", "www", "com", "orgs"];

/// Built-in rules as `(name, pattern)`, highest priority first.
const GITHUB_RULES: &[(&str, &str)] = &[
    ("github_url", r"(?i)github\.com/([A-Za-z0-9_-]+)(?:/|\s|$)"),
    ("github_orgs_url", r"(?i)github\.com/orgs/([A-Za-z0-9_-]+)(?:/|\s|$)"),
    ("at_mention", r"(?i)@([A-Za-z0-9_-]+)\s+on\s+GitHub"),
    ("organization_label", r"(?i)GitHub\s+organization[:\s]+([A-Za-z0-9_-]+)"),
    ("org_label", r"(?i)GitHub\s+org[:\s]+([A-Za-z0-9_-]+)"),
];

/// A single matching rule. Capture group 1 is the candidate identifier.
#[derive(Debug, Clone)]
pub struct MatchRule {
    /// Human-readable rule name (used in logs).
    pub name: String,
    /// Compiled regex for matching.
    pub regex: Regex,
}

impl MatchRule {
    /// Compile a rule. The pattern must contain at least one capture group.
    pub fn new(name: impl Into<String>, pattern: &str) -> Result<Self, ConfigError> {
        let name = name.into();
        let regex = Regex::new(pattern).map_err(|e| ConfigError::InvalidPattern {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        if regex.captures_len() < 2 {
            return Err(ConfigError::InvalidPattern {
                name,
                reason: "pattern has no capture group".to_string(),
            });
        }
        Ok(Self { name, regex })
    }
}

/// Stateless identifier extractor.
#[derive(Debug, Clone)]
pub struct PatternExtractor {
    rules: Vec<MatchRule>,
    stoplist: Vec<String>,
}

impl PatternExtractor {
    /// Build an extractor from custom rules and stoplist.
    pub fn new(rules: Vec<MatchRule>, stoplist: &[&str]) -> Self {
        Self {
            rules,
            stoplist: stoplist.iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    /// GitHub organization rules, in priority order.
    pub fn github() -> Result<Self, ConfigError> {
        let rules = GITHUB_RULES
            .iter()
            .map(|(name, pattern)| MatchRule::new(*name, pattern))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(rules, DEFAULT_STOPLIST))
    }

    /// Return the first accepted identifier in `text`, if any.
    pub fn extract(&self, text: &str) -> Option<String> {
        for rule in &self.rules {
            for caps in rule.regex.captures_iter(text) {
                let Some(candidate) = caps.get(1).map(|m| m.as_str()) else {
                    continue;
                };
                if candidate.is_empty() || self.is_stopped(candidate) {
                    debug!(rule = %rule.name, candidate, "Rejected stoplisted candidate");
                    continue;
                }
                debug!(rule = %rule.name, identifier = candidate, "Identifier matched");
                return Some(candidate.to_string());
            }
        }
        None
    }

    fn is_stopped(&self, candidate: &str) -> bool {
        let lowered = candidate.to_lowercase();
        self.stoplist.iter().any(|s| *s == lowered)
    }

    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }
}
