//! Env - 순서 보존 환경변수 매핑
//!
//! An ordered key/value mapping whose iteration and serialization order is
//! the insertion order. Steps rely on this: sorted identity variables come
//! first, user properties follow in declaration order so a property value may
//! reference an identity variable.

use serde::{Deserialize, Serialize};

/// Insertion-ordered environment mapping
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Env {
    entries: Vec<(String, String)>,
}

impl Env {
    /// Create an empty mapping
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mapping from pairs, sorted by key
    ///
    /// Used for the deterministic base blocks (build env, step identity env).
    pub fn sorted<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut entries: Vec<(String, String)> = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        Self { entries }
    }

    /// Set a key. An existing key is updated in place without moving; a new
    /// key is appended.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Look up a key
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Append all pairs from another mapping (same in-place update rule)
    pub fn extend(&mut self, other: Env) {
        for (k, v) in other.entries {
            self.set(k, v);
        }
    }

    /// Iterate pairs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize to shell export statements, one per entry, in order
    pub fn to_commands(&self) -> Vec<String> {
        self.entries
            .iter()
            .map(|(k, v)| format!("export {}=\"{}\"", k, v))
            .collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Env {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut env = Env::new();
        for (k, v) in iter {
            env.set(k, v);
        }
        env
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insertion_order_preserved() {
        let mut env = Env::new();
        env.set("ZETA", "1");
        env.set("ALPHA", "2");
        env.set("MIDDLE", "3");

        let keys: Vec<&str> = env.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["ZETA", "ALPHA", "MIDDLE"]);
    }

    #[test]
    fn test_set_existing_updates_in_place() {
        let mut env = Env::new();
        env.set("A", "1");
        env.set("B", "2");
        env.set("A", "changed");

        let pairs: Vec<(&str, &str)> = env.iter().collect();
        assert_eq!(pairs, vec![("A", "changed"), ("B", "2")]);
    }

    #[test]
    fn test_sorted_constructor() {
        let env = Env::sorted(vec![("B", "2"), ("A", "1"), ("C", "3")]);
        let keys: Vec<&str> = env.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_to_commands() {
        let mut env = Env::new();
        env.set("WERCKER_ROOT", "/pipeline/source");
        env.set("CI", "true");

        assert_eq!(
            env.to_commands(),
            vec![
                "export WERCKER_ROOT=\"/pipeline/source\"".to_string(),
                "export CI=\"true\"".to_string(),
            ]
        );
    }

    #[test]
    fn test_export_roundtrip_preserves_ordered_pairs() {
        let mut env = Env::new();
        env.set("FIRST", "one");
        env.set("SECOND", "two words");
        env.set("THIRD", "/some/path");

        let reparsed: Env = env
            .to_commands()
            .iter()
            .map(|line| {
                let rest = line.strip_prefix("export ").unwrap();
                let (key, quoted) = rest.split_once('=').unwrap();
                (key.to_string(), quoted.trim_matches('"').to_string())
            })
            .collect();

        assert_eq!(reparsed, env);
    }
}
