//! Test labels, the prefixes that select them, and the name-prefix rule used
//! for auto-classification.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Label applied to tests that do not name one explicitly.
pub const DEFAULT_LABEL: &str = "unit";

pub const UNIT_LABEL: &str = "unit";
pub const INTEGRATION_LABEL: &str = "integration";
pub const REGRESSION_LABEL: &str = "regression";

const UNIT_PREFIXES: &[&str] = &["test", "unit"];
const INTEGRATION_PREFIXES: &[&str] = &["int", "integration"];
const REGRESSION_PREFIXES: &[&str] = &["reg", "regression"];

/// Name prefixes that auto-classify a function as a fixture.
pub const FIXTURE_PREFIXES: &[&str] = &["fix", "fixture"];
/// Name prefixes that auto-classify a function as a before-test hook.
pub const BEFORE_TEST_PREFIXES: &[&str] = &["pre", "beforeTest"];
/// Name prefixes that auto-classify a function as an after-test hook.
pub const AFTER_TEST_PREFIXES: &[&str] = &["post", "afterTest"];

// ============================================================================
// Prefix matching
// ============================================================================

/// Returns `true` if `name` starts with `prefix` at a word boundary.
///
/// The boundary holds when the name is exactly the prefix, when the next
/// character is `_` or uppercase, or when the prefix itself ends in a
/// separator. So `testFoo`, `test_foo` and (for the prefix `black_`)
/// `black_checkSomething` match, while `testimony` does not.
pub fn prefix_match(name: &str, prefix: &str) -> bool {
    let Some(rest) = name.strip_prefix(prefix) else {
        return false;
    };
    if prefix.is_empty() {
        return false;
    }
    if prefix.ends_with(|c: char| !c.is_alphanumeric()) {
        return true;
    }
    match rest.chars().next() {
        None => true,
        Some(c) => c == '_' || c.is_uppercase(),
    }
}

/// Returns `true` if `name` matches any of `prefixes`.
pub fn matches_any<S: AsRef<str>>(name: &str, prefixes: &[S]) -> bool {
    prefixes.iter().any(|p| prefix_match(name, p.as_ref()))
}

// ============================================================================
// LabelSet
// ============================================================================

/// An ordered set of label names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LabelSet(BTreeSet<String>);

impl LabelSet {
    pub fn new() -> Self {
        LabelSet(BTreeSet::new())
    }

    /// Parse a comma-separated selector such as `"unit, integration"`.
    pub fn parse_selector(selector: &str) -> Self {
        selector
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn insert(&mut self, label: impl Into<String>) -> bool {
        self.0.insert(label.into())
    }

    pub fn contains(&self, label: &str) -> bool {
        self.0.contains(label)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn intersect(&self, other: &LabelSet) -> LabelSet {
        LabelSet(self.0.intersection(&other.0).cloned().collect())
    }

    pub fn is_disjoint(&self, other: &LabelSet) -> bool {
        self.0.is_disjoint(&other.0)
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.iter().cloned().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for LabelSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        LabelSet(iter.into_iter().map(Into::into).collect())
    }
}

impl From<&[&str]> for LabelSet {
    fn from(labels: &[&str]) -> Self {
        labels.iter().copied().collect()
    }
}

impl fmt::Display for LabelSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().collect();
        f.write_str(&names.join(", "))
    }
}

// ============================================================================
// LabelRegistry
// ============================================================================

/// Maps each known label to the name-prefixes that auto-select it.
///
/// Backed by a `BTreeMap` so iteration order is stable between runs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelRegistry {
    labels: BTreeMap<String, Vec<String>>,
}

impl LabelRegistry {
    /// A registry with no labels at all.
    pub fn empty() -> Self {
        LabelRegistry::default()
    }

    /// A registry seeded with the `unit`, `integration` and `regression` labels.
    pub fn with_builtin() -> Self {
        let mut registry = LabelRegistry::empty();
        registry.add_prefixes(UNIT_LABEL, UNIT_PREFIXES.iter().copied());
        registry.add_prefixes(INTEGRATION_LABEL, INTEGRATION_PREFIXES.iter().copied());
        registry.add_prefixes(REGRESSION_LABEL, REGRESSION_PREFIXES.iter().copied());
        registry
    }

    /// Append prefixes to `label`, creating the label if needed.
    pub fn add_prefixes<I, S>(&mut self, label: &str, prefixes: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.labels
            .entry(label.to_string())
            .or_default()
            .extend(prefixes.into_iter().map(Into::into));
    }

    /// Make sure `label` exists. Unknown labels are created with no prefixes.
    pub fn ensure(&mut self, label: &str) {
        if !self.labels.contains_key(label) {
            self.labels.insert(label.to_string(), Vec::new());
        }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.labels.contains_key(label)
    }

    pub fn prefixes(&self, label: &str) -> Option<&[String]> {
        self.labels.get(label).map(Vec::as_slice)
    }

    /// Every label with at least one prefix matching `name`.
    pub fn matching(&self, name: &str) -> LabelSet {
        self.labels
            .iter()
            .filter(|(_, prefixes)| matches_any(name, prefixes))
            .map(|(label, _)| label.clone())
            .collect()
    }

    pub fn names(&self) -> LabelSet {
        self.labels.keys().cloned().collect()
    }

    pub fn table(&self) -> &BTreeMap<String, Vec<String>> {
        &self.labels
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_match_requires_word_boundary() {
        assert!(prefix_match("test", "test"));
        assert!(prefix_match("testFoo", "test"));
        assert!(prefix_match("test_foo", "test"));
        assert!(!prefix_match("testimony", "test"));
        assert!(!prefix_match("tes", "test"));
        assert!(!prefix_match("anything", ""));
    }

    #[test]
    fn prefix_ending_in_separator_is_its_own_boundary() {
        assert!(prefix_match("black_checkSomething", "black_"));
        assert!(!prefix_match("blackbox", "black_"));
    }

    #[test]
    fn builtin_registry_matches_by_prefix() {
        let registry = LabelRegistry::with_builtin();
        assert_eq!(registry.matching("test_adds"), LabelSet::from(&["unit"][..]));
        assert_eq!(
            registry.matching("integrationDatabase"),
            LabelSet::from(&["integration"][..])
        );
        assert!(registry.matching("helper").is_empty());
        assert!(registry.matching("interesting").is_empty());
    }

    #[test]
    fn add_prefixes_appends() {
        let mut registry = LabelRegistry::empty();
        registry.add_prefixes("blackbox", ["black_"]);
        registry.add_prefixes("blackbox", ["bb"]);
        assert_eq!(
            registry.prefixes("blackbox"),
            Some(&["black_".to_string(), "bb".to_string()][..])
        );
    }

    #[test]
    fn ensure_creates_label_without_prefixes() {
        let mut registry = LabelRegistry::empty();
        registry.ensure("smoke");
        registry.ensure("smoke");
        assert_eq!(registry.prefixes("smoke"), Some(&[][..]));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn selector_parsing_trims_and_drops_empties() {
        let set = LabelSet::parse_selector(" unit, ,integration ");
        assert_eq!(set.to_vec(), vec!["integration", "unit"]);
        assert!(LabelSet::parse_selector("").is_empty());
    }

    #[test]
    fn intersection() {
        let a = LabelSet::parse_selector("unit,integration");
        let b = LabelSet::parse_selector("integration,regression");
        assert_eq!(a.intersect(&b).to_vec(), vec!["integration"]);
        assert!(!a.is_disjoint(&b));
        assert!(a.is_disjoint(&LabelSet::parse_selector("smoke")));
    }
}
