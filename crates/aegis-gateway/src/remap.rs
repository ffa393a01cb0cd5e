//! Regex-keyed map shared by the path protector and the rate limiter.

use regex::Regex;
use std::sync::{PoisonError, RwLock};

/// Thread-safe container of `(compiled pattern, value)` pairs.
///
/// `find` matches the path against every stored pattern (partial match, not
/// anchored unless the pattern anchors itself) under a shared lock;
/// structural changes take the exclusive lock. Result ordering is
/// unspecified and consumers must not depend on it.
pub struct RegexMap<T> {
    entries: RwLock<Vec<(Regex, T)>>,
}

impl<T: Clone> RegexMap<T> {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Insert a pair, replacing the value stored for an identical pattern
    /// source.
    pub fn put(&self, pattern: Regex, value: T) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = entries.iter_mut().find(|(p, _)| p.as_str() == pattern.as_str()) {
            entry.1 = value;
        } else {
            entries.push((pattern, value));
        }
    }

    /// Every value whose pattern matches `path`.
    pub fn find(&self, path: &str) -> Vec<T> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .filter(|(pattern, _)| pattern.is_match(path))
            .map(|(_, value)| value.clone())
            .collect()
    }

    /// True if at least one stored pattern matches `path`.
    pub fn matches(&self, path: &str) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.iter().any(|(pattern, _)| pattern.is_match(path))
    }

    /// Snapshot of the stored pairs.
    pub fn entries(&self) -> Vec<(Regex, T)> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.clone()
    }

    /// Remove the pair whose pattern source equals `pattern`.
    pub fn delete(&self, pattern: &str) {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        entries.retain(|(p, _)| p.as_str() != pattern);
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> Default for RegexMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> RegexMap<&'static str> {
        let map = RegexMap::new();
        map.put(Regex::new("index.html").unwrap(), "index");
        map.put(Regex::new("^/$").unwrap(), "root");
        map.put(Regex::new("^/images/.+").unwrap(), "images");
        map.put(Regex::new("^/users/$").unwrap(), "users");
        map
    }

    #[test]
    fn put_stores_all_entries() {
        let map = sample();
        assert_eq!(map.len(), 4);
    }

    #[test]
    fn put_replaces_identical_pattern() {
        let map = RegexMap::new();
        map.put(Regex::new("^/$").unwrap(), "first");
        map.put(Regex::new("^/$").unwrap(), "second");
        assert_eq!(map.len(), 1);
        assert_eq!(map.find("/"), vec!["second"]);
    }

    #[test]
    fn delete_removes_only_the_named_pattern() {
        let map = sample();
        map.delete("^/users/$");
        assert_eq!(map.len(), 3);
        assert!(map.find("/users/").is_empty());

        // Deleting a pattern that was never stored leaves the map unchanged
        map.delete("UNDEFINED");
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn find_matches_every_and_only_matching_pattern() {
        let map = sample();

        assert!(map.find("unknown").is_empty());

        assert_eq!(map.find("/"), vec!["root"]);

        // Nested path matches one unanchored pattern
        assert_eq!(map.find("/users/index.html"), vec!["index"]);

        // Overlapping patterns both match
        let mut values = map.find("/images/index.html");
        values.sort_unstable();
        assert_eq!(values, vec!["images", "index"]);
    }

    #[test]
    fn matches_mirrors_find() {
        let map = sample();
        assert!(map.matches("/images/cat.jpg"));
        assert!(!map.matches("unknown"));
    }
}
