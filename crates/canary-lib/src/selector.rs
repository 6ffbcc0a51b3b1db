//! Equality-based label selectors
//!
//! A deployment's pod-template labels become a selector string such as
//! `app=resume,track=canary`. Keys are kept sorted so the same label set
//! always yields the same string.

use std::collections::BTreeMap;
use std::fmt;

/// Conjunction of `key=value` requirements
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: BTreeMap<String, String>,
}

impl LabelSelector {
    /// Build a selector requiring every given label
    pub fn from_labels<I, K, V>(labels: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            requirements: labels
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// An empty selector matches every pod in the namespace
    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    /// Check whether a label set satisfies every requirement
    #[cfg(test)]
    pub(crate) fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements
            .iter()
            .all(|(key, value)| labels.get(key) == Some(value))
    }
}

impl fmt::Display for LabelSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, (key, value)) in self.requirements.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{}={}", key, value)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_selector_joins_pairs_in_key_order() {
        let selector = LabelSelector::from_labels([("b", "2"), ("a", "1")]);
        assert_eq!(selector.to_string(), "a=1,b=2");
        assert!(!selector.is_empty());
    }

    #[test]
    fn test_selector_is_stable_for_unordered_input() {
        let mut source = HashMap::new();
        source.insert("tier", "web");
        source.insert("app", "blog");
        source.insert("track", "canary");

        let selector = LabelSelector::from_labels(source);
        assert_eq!(selector.to_string(), "app=blog,tier=web,track=canary");
    }

    #[test]
    fn test_empty_selector() {
        let selector = LabelSelector::from_labels(BTreeMap::<String, String>::new());
        assert!(selector.is_empty());
        assert_eq!(selector.to_string(), "");
        assert!(selector.matches(&labels(&[("app", "anything")])));
        assert!(selector.matches(&BTreeMap::new()));
    }

    #[test]
    fn test_selector_requires_all_labels() {
        let selector = LabelSelector::from_labels([("a", "1"), ("b", "2")]);

        assert!(selector.matches(&labels(&[("a", "1"), ("b", "2")])));
        assert!(selector.matches(&labels(&[("a", "1"), ("b", "2"), ("c", "3")])));
        assert!(!selector.matches(&labels(&[("a", "1")])));
        assert!(!selector.matches(&labels(&[("a", "1"), ("b", "3")])));
    }
}
