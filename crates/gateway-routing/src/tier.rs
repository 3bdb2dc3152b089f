//! Tier resolution.
//!
//! Expands an ordered list of references (tier names or model names) into
//! concrete model targets. Tier names win over model names, unknown
//! references are dropped, and nested tiers are expanded iteratively with a
//! guard against cycles. Duplicates are kept: a model listed in several tiers
//! gets proportionally more first attempts under rotation.

use gateway_config::{ConfigSnapshot, ModelTarget};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::warn;

enum Frame<'a> {
    Enter(&'a str),
    Leave(&'a str),
}

/// Resolves tier references against a configuration snapshot
#[derive(Debug, Clone)]
pub struct TierResolver {
    snapshot: Arc<ConfigSnapshot>,
}

impl TierResolver {
    /// Create a resolver over a snapshot
    #[must_use]
    pub fn new(snapshot: Arc<ConfigSnapshot>) -> Self {
        Self { snapshot }
    }

    /// Resolve references into concrete models, preserving order
    #[must_use]
    pub fn resolve(&self, entries: &[String]) -> Vec<ModelTarget> {
        let mut resolved = Vec::new();
        for entry in entries {
            self.expand_entry(entry, &mut resolved);
        }
        resolved
    }

    fn expand_entry(&self, entry: &str, out: &mut Vec<ModelTarget>) {
        let mut stack = vec![Frame::Enter(entry)];
        let mut path: HashSet<&str> = HashSet::new();

        while let Some(frame) = stack.pop() {
            let name = match frame {
                Frame::Leave(tier) => {
                    path.remove(tier);
                    continue;
                }
                Frame::Enter(name) => name,
            };

            if let Some(members) = self.snapshot.tier(name) {
                if !path.insert(name) {
                    warn!(tier = %name, root = %entry, "Cyclic tier reference skipped");
                    continue;
                }
                stack.push(Frame::Leave(name));
                stack.extend(members.iter().rev().map(|m| Frame::Enter(m.as_str())));
            } else if let Some(model) = self.snapshot.model(name) {
                out.push(model.clone());
            } else {
                warn!(reference = %name, "Unknown chain reference dropped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gateway_config::parse_yaml;
    use std::collections::BTreeMap;

    fn resolver(tiers: &str) -> TierResolver {
        let yaml = format!(
            r"
providers:
  p:
    base_url: http://localhost:1/v1
    requires_key: false
models:
  a: {{provider: p, model_id: a}}
  b: {{provider: p, model_id: b}}
  c: {{provider: p, model_id: c}}
tiers:
{tiers}
"
        );
        let config = parse_yaml(&yaml).expect("valid yaml");
        let snapshot = ConfigSnapshot::build(config, BTreeMap::new()).expect("snapshot");
        TierResolver::new(Arc::new(snapshot))
    }

    fn names(models: &[ModelTarget]) -> Vec<&str> {
        models.iter().map(|m| m.name.as_str()).collect()
    }

    fn refs(items: &[&str]) -> Vec<String> {
        items.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_tier_substituted_in_place() {
        let resolver = resolver("  fast: [b, a]");
        let resolved = resolver.resolve(&refs(&["c", "fast", "a"]));
        assert_eq!(names(&resolved), vec!["c", "b", "a", "a"]);
    }

    #[test]
    fn test_unknown_reference_dropped() {
        let resolver = resolver("  fast: [a, ghost]");
        let resolved = resolver.resolve(&refs(&["missing", "fast"]));
        assert_eq!(names(&resolved), vec!["a"]);
    }

    #[test]
    fn test_nested_tier_resolved() {
        let resolver = resolver("  inner: [b, c]\n  outer: [a, inner]");
        let resolved = resolver.resolve(&refs(&["outer"]));
        assert_eq!(names(&resolved), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_cycle_is_skipped() {
        let resolver = resolver("  x: [a, y]\n  y: [b, x]");
        let resolved = resolver.resolve(&refs(&["x"]));
        assert_eq!(names(&resolved), vec!["a", "b"]);
    }

    #[test]
    fn test_repeated_nested_tier_is_not_a_cycle() {
        let resolver = resolver("  pair: [a, b]\n  twice: [pair, pair]");
        let resolved = resolver.resolve(&refs(&["twice"]));
        assert_eq!(names(&resolved), vec!["a", "b", "a", "b"]);
    }
}
