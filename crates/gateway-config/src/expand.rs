//! Config-time agent mutation.
//!
//! Every agent that is not excluded gets one variant per available reasoning
//! pattern. Variants are ordinary agents afterwards; nothing at runtime knows
//! how their name was derived.

use crate::settings::AgentDefinition;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Suffix used in variant names for a pattern (`linear_react` → `linear`)
#[must_use]
pub fn mutation_suffix(pattern: &str) -> &str {
    pattern.strip_suffix("_react").unwrap_or(pattern)
}

/// Expand agent definitions with reasoning-mode variants.
///
/// Each base agent is kept and followed by its variants, named
/// `{agent}_{suffix}` with aliases cleared and `reasoning_mode` set to the
/// pattern. Agents listed in `exclusions` are passed through unchanged.
/// A variant whose name is already taken is skipped.
#[must_use]
pub fn expand(
    agents: &[AgentDefinition],
    available_patterns: &[String],
    exclusions: &[String],
) -> Vec<AgentDefinition> {
    let mut taken: HashSet<String> = agents
        .iter()
        .flat_map(|a| std::iter::once(a.name.clone()).chain(a.aliases.iter().cloned()))
        .collect();

    let mut expanded = Vec::with_capacity(agents.len() * (available_patterns.len() + 1));

    for agent in agents {
        expanded.push(agent.clone());

        if exclusions.iter().any(|e| e == &agent.name) {
            debug!(agent = %agent.name, "Agent excluded from mutation");
            continue;
        }

        for pattern in available_patterns {
            let name = format!("{}_{}", agent.name, mutation_suffix(pattern));
            if !taken.insert(name.clone()) {
                warn!(agent = %agent.name, variant = %name, "Variant name already in use, skipping");
                continue;
            }

            let mut variant = agent.clone();
            variant.name = name;
            variant.aliases.clear();
            variant.settings.reasoning_mode.clone_from(pattern);
            expanded.push(variant);
        }
    }

    expanded
}
