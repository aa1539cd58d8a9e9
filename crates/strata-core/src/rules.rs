//! Static invalidation rules.
//!
//! Rules are loaded once from configuration and never mutated afterwards.
//!
//! ```toml
//! [[cache.rules]]
//! pattern = "flights:*"
//! triggers = ["fare-update", "schedule-change"]
//! strategy = "immediate"
//! dependencies = ["itineraries:*", "search:*"]
//! ```

use serde::{Deserialize, Serialize};

use crate::error::CacheError;
use crate::pattern::GlobPattern;

/// How matched keys are invalidated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidationStrategy {
    /// Delete from every tier now.
    #[default]
    Immediate,
    /// Force near-term expiry in the remote tiers; local copies age out on their own.
    Lazy,
}

/// A pattern, the events that fire it, and the patterns it cascades into.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvalidationRule {
    /// Logical key pattern (glob syntax).
    pub pattern: String,

    /// Named change events that fire this rule.
    #[serde(default)]
    pub triggers: Vec<String>,

    /// Strategy used when the rule fires.
    #[serde(default)]
    pub strategy: InvalidationStrategy,

    /// Patterns invalidated after this one when cascading.
    #[serde(default)]
    pub dependencies: Vec<String>,
}

impl InvalidationRule {
    /// Creates an immediate rule with no triggers or dependencies.
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            triggers: Vec::new(),
            strategy: InvalidationStrategy::Immediate,
            dependencies: Vec::new(),
        }
    }

    /// Adds a trigger event.
    #[must_use]
    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.triggers.push(trigger.into());
        self
    }

    /// Sets the strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: InvalidationStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Adds a dependency pattern.
    #[must_use]
    pub fn with_dependency(mut self, pattern: impl Into<String>) -> Self {
        self.dependencies.push(pattern.into());
        self
    }

    /// Returns `true` if invalidating `pattern` fires this rule.
    ///
    /// A rule fires when the invalidated pattern is the rule's own pattern, or
    /// when the rule's pattern matches it as a key (so a rule on `flights:*`
    /// fires for an invalidation of `flights:JFK-LHR`).
    pub fn fires_for(&self, pattern: &str) -> bool {
        if self.pattern == pattern {
            return true;
        }
        GlobPattern::new(&self.pattern).is_ok_and(|own| own.matches(pattern))
    }

    /// Returns `true` if `event` is one of this rule's triggers.
    pub fn triggered_by(&self, event: &str) -> bool {
        self.triggers.iter().any(|t| t == event)
    }

    /// Checks that the rule's patterns compile.
    pub fn validate(&self) -> Result<(), CacheError> {
        GlobPattern::new(&self.pattern)?;
        for dependency in &self.dependencies {
            GlobPattern::new(dependency)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_for() {
        let rule = InvalidationRule::new("flights:*").with_dependency("search:*");
        assert!(rule.fires_for("flights:*"));
        assert!(rule.fires_for("flights:JFK-LHR"));
        assert!(!rule.fires_for("hotels:*"));
    }

    #[test]
    fn test_triggered_by() {
        let rule = InvalidationRule::new("flights:*").with_trigger("fare-update");
        assert!(rule.triggered_by("fare-update"));
        assert!(!rule.triggered_by("hotel-update"));
    }

    #[test]
    fn test_deserialize_defaults() {
        let rule: InvalidationRule =
            serde_json::from_str(r#"{"pattern": "a:*", "strategy": "lazy"}"#).unwrap();
        assert_eq!(rule.strategy, InvalidationStrategy::Lazy);
        assert!(rule.triggers.is_empty());
        assert!(rule.dependencies.is_empty());
    }

    #[test]
    fn test_validate() {
        assert!(InvalidationRule::new("a:*").validate().is_ok());
        assert!(
            InvalidationRule::new("a:*")
                .with_dependency("b:[")
                .validate()
                .is_err()
        );
    }
}
