//! Rotation manager: agent → priority chain.

use crate::chain::PriorityChain;
use crate::cursor::RotationCursor;
use crate::tier::TierResolver;
use gateway_config::{AgentDefinition, ConfigSnapshot};
use std::sync::Arc;
use tracing::debug;

/// Builds per-session priority chains with global round-robin over the main segment
#[derive(Debug, Clone)]
pub struct RotationManager {
    resolver: TierResolver,
    cursor: Arc<dyn RotationCursor>,
}

impl RotationManager {
    /// Create a rotation manager
    #[must_use]
    pub fn new(snapshot: Arc<ConfigSnapshot>, cursor: Arc<dyn RotationCursor>) -> Self {
        Self {
            resolver: TierResolver::new(snapshot),
            cursor,
        }
    }

    /// The tier resolver in use
    #[must_use]
    pub fn resolver(&self) -> &TierResolver {
        &self.resolver
    }

    /// Resolve the agent's router into a rotated chain.
    ///
    /// Main entries always precede fallbacks. The cursor is keyed by agent
    /// name and consulted only when the resolved main segment is non-empty.
    pub async fn build_chain(&self, agent: &AgentDefinition) -> PriorityChain {
        let main = self.resolver.resolve(&agent.router.main);
        let fallbacks = self.resolver.resolve(&agent.router.fallbacks);

        let offset = if main.is_empty() {
            0
        } else {
            let raw = self.cursor.next_offset(&agent.name).await;
            (raw % main.len() as u64) as usize
        };

        let chain = PriorityChain::new(main, fallbacks, offset);
        debug!(
            agent = %agent.name,
            offset = chain.offset(),
            main = chain.main_len(),
            total = chain.len(),
            "Priority chain built"
        );
        chain
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cursor::InMemoryRotationCursor;
    use gateway_config::parse_yaml;
    use std::collections::BTreeMap;

    const CONFIG: &str = r"
providers:
  pa: {base_url: 'http://a.local/v1', requires_key: false}
  pb: {base_url: 'http://b.local/v1', requires_key: false}
  pc: {base_url: 'http://c.local/v1', requires_key: false}
models:
  A: {provider: pa, model_id: a}
  B: {provider: pb, model_id: b}
  C: {provider: pc, model_id: c}
tiers:
  primary: [A, B]
agents:
  - name: standard
    router: {main: [primary], fallbacks: [C]}
  - name: single
    router: {main: [A], fallbacks: [C]}
  - name: fallback-only
    router: {main: [ghost], fallbacks: [C, B]}
";

    fn setup() -> (Arc<ConfigSnapshot>, Arc<InMemoryRotationCursor>, RotationManager) {
        let config = parse_yaml(CONFIG).expect("valid yaml");
        let snapshot = Arc::new(ConfigSnapshot::build(config, BTreeMap::new()).expect("snapshot"));
        let cursor = Arc::new(InMemoryRotationCursor::new());
        let manager = RotationManager::new(Arc::clone(&snapshot), cursor.clone());
        (snapshot, cursor, manager)
    }

    fn names(chain: &PriorityChain) -> Vec<&str> {
        chain.entries().iter().map(|m| m.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_cursor_one_rotates_main() {
        let (snapshot, cursor, manager) = setup();
        cursor.seed("standard", 1);
        let agent = snapshot.agent("standard").expect("agent");

        let chain = manager.build_chain(agent).await;
        assert_eq!(names(&chain), vec!["B", "A", "C"]);
    }

    #[tokio::test]
    async fn test_consecutive_chains_use_different_offsets() {
        let (snapshot, _cursor, manager) = setup();
        let agent = snapshot.agent("standard").expect("agent");

        let first = manager.build_chain(agent).await;
        let second = manager.build_chain(agent).await;
        let third = manager.build_chain(agent).await;
        assert_ne!(first.offset(), second.offset());
        assert_eq!(first.offset(), third.offset());
        assert_eq!(names(&second), vec!["B", "A", "C"]);
    }

    #[tokio::test]
    async fn test_single_main_entry_never_rotates() {
        let (snapshot, _cursor, manager) = setup();
        let agent = snapshot.agent("single").expect("agent");
        for _ in 0..3 {
            let chain = manager.build_chain(agent).await;
            assert_eq!(names(&chain), vec!["A", "C"]);
        }
    }

    #[tokio::test]
    async fn test_empty_main_skips_cursor() {
        let (snapshot, cursor, manager) = setup();
        let agent = snapshot.agent("fallback-only").expect("agent");
        let chain = manager.build_chain(agent).await;
        assert_eq!(names(&chain), vec!["C", "B"]);
        assert_eq!(cursor.peek("fallback-only"), 0);
    }
}
