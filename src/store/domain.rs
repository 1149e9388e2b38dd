use std::sync::Arc;

use crate::constants::DOMAIN_SEPARATOR;
use crate::KvEntry;

/// Namespace prefix applied to every external key.
///
/// A non-empty domain always ends with `/`, so `pwx/test` and `pwx/test/`
/// name the same namespace.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyDomain {
    prefix: Arc<str>,
}

impl KeyDomain {
    pub fn new(domain: &str) -> Self {
        let prefix = if domain.is_empty() || domain.ends_with(DOMAIN_SEPARATOR) {
            domain.to_string()
        } else {
            format!("{domain}{DOMAIN_SEPARATOR}")
        };
        Self {
            prefix: prefix.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.prefix
    }

    /// External key -> stored key
    pub fn qualify(
        &self,
        key: &str,
    ) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// Stored key -> external key. Keys outside the domain come back unchanged.
    pub fn strip<'a>(
        &self,
        key: &'a str,
    ) -> &'a str {
        key.strip_prefix(&*self.prefix).unwrap_or(key)
    }

    /// Detached copy of a stored entry with its key de-namespaced
    pub fn detach(
        &self,
        entry: &KvEntry,
    ) -> KvEntry {
        let mut copy = entry.clone();
        copy.key = self.strip(&entry.key).to_string();
        copy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_gets_trailing_separator() {
        assert_eq!(KeyDomain::new("pwx/test").as_str(), "pwx/test/");
        assert_eq!(KeyDomain::new("pwx/test/").as_str(), "pwx/test/");
        assert_eq!(KeyDomain::new("").as_str(), "");
    }

    #[test]
    fn test_qualify_and_strip() {
        let domain = KeyDomain::new("pwx/test");
        let stored = domain.qualify("foo/docker");
        assert_eq!(stored, "pwx/test/foo/docker");
        assert_eq!(domain.strip(&stored), "foo/docker");
        assert_eq!(domain.strip("other/foo"), "other/foo");
    }

    #[test]
    fn test_empty_domain_is_identity() {
        let domain = KeyDomain::default();
        assert_eq!(domain.qualify("a/b"), "a/b");
        assert_eq!(domain.strip("a/b"), "a/b");
    }
}
