//! Fully qualified cache key construction with tenant isolation.
//!
//! ## Key Format
//!
//! - Isolation enabled, tenant given: `{prefix}:{tenant}:{logical}`,
//!   e.g. `cache:acme:flights:JFK-LHR`
//! - Otherwise: `{logical}` unchanged
//! - Tag side-sets: the same rule applied to `__tag:{tag}`
//!
//! Callers cannot forge another tenant's key: logical keys may not start with
//! the tenant prefix segment or the reserved tag namespace, and tenant ids may
//! not contain the `:` separator.

use crate::config::CacheConfig;
use crate::error::CacheError;
use crate::pattern::{self, GlobPattern};

/// Separator between key segments.
pub const SEPARATOR: char = ':';

/// Reserved namespace for tag side-set keys.
pub const TAG_NAMESPACE: &str = "__tag:";

/// Builds fully qualified keys, patterns and tag-set keys.
///
/// Pure and cheap to clone; every tier and the invalidation engine go through
/// the same builder so they address identical entries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyBuilder {
    isolation: bool,
    prefix: String,
    max_key_length: usize,
}

impl KeyBuilder {
    /// Creates a key builder.
    pub fn new(isolation: bool, prefix: impl Into<String>, max_key_length: usize) -> Self {
        Self {
            isolation,
            prefix: prefix.into(),
            max_key_length,
        }
    }

    /// Creates a key builder from the cache configuration.
    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(
            config.tenant_isolation.enabled,
            config.tenant_isolation.key_prefix.clone(),
            config.max_key_length,
        )
    }

    /// Returns `true` if tenant isolation is active.
    pub fn isolation_enabled(&self) -> bool {
        self.isolation
    }

    /// Builds the fully qualified key for `logical` in `tenant`'s namespace.
    ///
    /// Escaped metacharacters are stored unescaped, so `promo\*:1` is the key
    /// `promo*:1` and is matched by the pattern `promo\*:*`.
    pub fn build(&self, logical: &str, tenant: Option<&str>) -> Result<String, CacheError> {
        let logical = self.validate_logical(logical)?;
        self.qualify(&logical, tenant)
    }

    /// Builds the fully qualified pattern for `pattern` in `tenant`'s namespace.
    pub fn build_pattern(
        &self,
        pattern: &str,
        tenant: Option<&str>,
    ) -> Result<GlobPattern, CacheError> {
        if pattern.is_empty() {
            return Err(CacheError::invalid_pattern(pattern, "pattern is empty"));
        }
        if pattern.len() > self.max_key_length {
            return Err(CacheError::invalid_pattern(
                pattern,
                format!("longer than {} bytes", self.max_key_length),
            ));
        }
        if let Some(c) = pattern.chars().find(|c| c.is_whitespace() || c.is_control()) {
            return Err(CacheError::invalid_pattern(
                pattern,
                format!("contains forbidden character {c:?}"),
            ));
        }
        // Validate the caller's syntax before the prefix is attached.
        GlobPattern::new(pattern)?;

        match self.tenant_segment(tenant)? {
            Some(tenant) => GlobPattern::new(&format!(
                "{}{SEPARATOR}{}{SEPARATOR}{pattern}",
                pattern::escape(&self.prefix),
                pattern::escape(tenant),
            )),
            None => GlobPattern::new(pattern),
        }
    }

    /// Builds the key of the side-set that indexes entries carrying `tag`.
    pub fn tag_key(&self, tag: &str, tenant: Option<&str>) -> Result<String, CacheError> {
        let unescaped = self
            .validate_segment(tag)
            .map_err(|reason| CacheError::invalid_key(tag, format!("invalid tag: {reason}")))?;
        self.qualify(&format!("{TAG_NAMESPACE}{unescaped}"), tenant)
    }

    /// Returns `true` if `full_key` names a tag side-set.
    pub fn is_tag_key(&self, full_key: &str) -> bool {
        let logical = if self.isolation {
            full_key
                .strip_prefix(self.prefix.as_str())
                .and_then(|rest| rest.strip_prefix(SEPARATOR))
                .and_then(|rest| rest.split_once(SEPARATOR))
                .map(|(_, logical)| logical)
                .unwrap_or(full_key)
        } else {
            full_key
        };
        logical.starts_with(TAG_NAMESPACE)
    }

    /// Returns `true` if `full_key` is a value key visible to `tenant`.
    ///
    /// Used to filter pattern scans: untenanted callers never see tenant keys,
    /// and tag side-sets are never treated as values.
    pub fn in_scope(&self, full_key: &str, tenant: Option<&str>) -> bool {
        if self.is_tag_key(full_key) {
            return false;
        }
        if !self.isolation {
            return true;
        }
        let tenant_root = format!("{}{SEPARATOR}", self.prefix);
        match tenant {
            Some(tenant) => full_key.starts_with(&format!("{tenant_root}{tenant}{SEPARATOR}")),
            None => !full_key.starts_with(&tenant_root),
        }
    }

    fn qualify(&self, logical: &str, tenant: Option<&str>) -> Result<String, CacheError> {
        Ok(match self.tenant_segment(tenant)? {
            Some(tenant) => format!("{}{SEPARATOR}{tenant}{SEPARATOR}{logical}", self.prefix),
            None => logical.to_string(),
        })
    }

    fn tenant_segment<'a>(&self, tenant: Option<&'a str>) -> Result<Option<&'a str>, CacheError> {
        match tenant {
            Some(tenant) if self.isolation => {
                if tenant.contains(SEPARATOR) {
                    return Err(CacheError::invalid_tenant(
                        tenant,
                        format!("must not contain '{SEPARATOR}'"),
                    ));
                }
                if tenant.contains('\\') {
                    return Err(CacheError::invalid_tenant(tenant, "must not contain '\\'"));
                }
                self.validate_segment(tenant)
                    .map_err(|reason| CacheError::invalid_tenant(tenant, reason))?;
                Ok(Some(tenant))
            }
            _ => Ok(None),
        }
    }

    /// Validates `logical` and returns it with escapes resolved.
    fn validate_logical(&self, logical: &str) -> Result<String, CacheError> {
        let unescaped = self
            .validate_segment(logical)
            .map_err(|reason| CacheError::invalid_key(logical, reason))?;

        if unescaped.starts_with(TAG_NAMESPACE) {
            return Err(CacheError::invalid_key(
                logical,
                format!("'{TAG_NAMESPACE}' is a reserved namespace"),
            ));
        }
        if self.isolation
            && unescaped
                .strip_prefix(self.prefix.as_str())
                .is_some_and(|rest| rest.starts_with(SEPARATOR))
        {
            return Err(CacheError::invalid_key(
                logical,
                format!("'{}{SEPARATOR}' is reserved for tenant keys", self.prefix),
            ));
        }
        Ok(unescaped)
    }

    fn validate_segment(&self, segment: &str) -> Result<String, String> {
        if segment.is_empty() {
            return Err("must not be empty".to_string());
        }
        if segment.len() > self.max_key_length {
            return Err(format!("longer than {} bytes", self.max_key_length));
        }
        if let Some(c) = segment.chars().find(|c| c.is_whitespace() || c.is_control()) {
            return Err(format!("contains forbidden character {c:?}"));
        }
        if let Some(c) = pattern::find_unescaped_metachar(segment) {
            return Err(format!("contains unescaped reserved character '{c}'"));
        }
        pattern::unescape(segment).ok_or_else(|| "ends with a dangling escape".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> KeyBuilder {
        KeyBuilder::new(true, "cache", 64)
    }

    #[test]
    fn test_build_with_tenant() {
        let keys = builder();
        assert_eq!(
            keys.build("flights:JFK-LHR", Some("acme")).unwrap(),
            "cache:acme:flights:JFK-LHR"
        );
        assert_eq!(keys.build("flights:JFK-LHR", None).unwrap(), "flights:JFK-LHR");
    }

    #[test]
    fn test_isolation_disabled_ignores_tenant() {
        let keys = KeyBuilder::new(false, "cache", 64);
        assert_eq!(keys.build("k", Some("acme")).unwrap(), "k");
        assert_eq!(keys.build("cache:other:k", None).unwrap(), "cache:other:k");
    }

    #[test]
    fn test_tenants_never_collide() {
        let keys = builder();
        let a = keys.build("k", Some("A")).unwrap();
        let b = keys.build("k", Some("B")).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_prefix_cannot_be_forged() {
        let keys = builder();
        assert!(matches!(
            keys.build("cache:B:k", None),
            Err(CacheError::InvalidKey { .. })
        ));
        assert!(matches!(
            keys.build("cache:B:k", Some("A")),
            Err(CacheError::InvalidKey { .. })
        ));
        assert!(matches!(
            keys.build("k", Some("A:B")),
            Err(CacheError::InvalidTenant { .. })
        ));
        assert!(matches!(
            keys.build("k", Some(r"A\*")),
            Err(CacheError::InvalidTenant { .. })
        ));
        // A key merely starting with the prefix text is fine.
        assert!(keys.build("cachet:k", None).is_ok());
    }

    #[test]
    fn test_rejects_malformed_keys() {
        let keys = builder();
        assert!(keys.build("", None).is_err());
        assert!(keys.build("a b", None).is_err());
        assert!(keys.build("a*b", None).is_err());
        assert!(keys.build("__tag:x", None).is_err());
        assert!(keys.build(&"x".repeat(65), None).is_err());
        assert!(keys.build(r"a\", None).is_err());
        assert!(keys.build(r"a\*b", None).is_ok());
        assert!(keys.build("x".repeat(64).as_str(), None).is_ok());
    }

    #[test]
    fn test_escaped_keys_are_stored_unescaped() {
        let keys = builder();
        let key = keys.build(r"promo\*:1", Some("acme")).unwrap();
        assert_eq!(key, "cache:acme:promo*:1");
        assert!(keys.build_pattern(r"promo\*:1", Some("acme")).unwrap().matches(&key));
        assert!(keys.build_pattern(r"promo\*:*", Some("acme")).unwrap().matches(&key));
        assert_eq!(keys.build(r"a\\b", None).unwrap(), r"a\b");
        assert!(keys.build(r"\__tag:x", None).is_err());
    }

    #[test]
    fn test_build_pattern() {
        let keys = builder();
        let p = keys.build_pattern("flights:*", Some("acme")).unwrap();
        assert_eq!(p.as_str(), "cache:acme:flights:*");
        assert!(p.matches("cache:acme:flights:JFK-LHR"));
        assert!(!p.matches("cache:other:flights:JFK-LHR"));

        assert!(keys.build_pattern("flights:[", None).is_err());
        assert!(keys.build_pattern("", None).is_err());
    }

    #[test]
    fn test_tag_keys() {
        let keys = builder();
        let tag = keys.tag_key("route:JFK", Some("acme")).unwrap();
        assert_eq!(tag, "cache:acme:__tag:route:JFK");
        assert!(keys.is_tag_key(&tag));
        assert!(keys.is_tag_key("__tag:x"));
        assert!(!keys.is_tag_key("cache:acme:flights:1"));
    }

    #[test]
    fn test_in_scope() {
        let keys = builder();
        assert!(keys.in_scope("cache:acme:k", Some("acme")));
        assert!(!keys.in_scope("cache:acme:k", Some("other")));
        assert!(!keys.in_scope("cache:acme:k", None));
        assert!(keys.in_scope("k", None));
        assert!(!keys.in_scope("cache:acme:__tag:t", Some("acme")));
    }
}
