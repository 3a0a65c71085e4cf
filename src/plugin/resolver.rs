//! Dependency graph resolution
//!
//! Nodes are the registrations that survive the filter. For every
//! requirement on a type, each other enabled provider of that type gets an
//! edge to the requiring registration. The order is a topological sort of
//! that graph; among ready nodes the smallest composite key goes first, so
//! the result does not depend on registration order.

use std::collections::{BTreeMap, BTreeSet};

use super::registry::{PluginRegistry, Registration};
use super::types::{PluginKey, PluginType};
use crate::core::error::{HostError, Result};

/// Output of a resolution
#[derive(Debug)]
pub struct Resolution<'r> {
    /// Registrations in initialization order
    pub order: Vec<&'r Registration>,
    /// Registrations excluded by the filter, in key order
    pub skipped: Vec<&'r Registration>,
}

impl Resolution<'_> {
    pub fn keys(&self) -> Vec<PluginKey> {
        self.order.iter().map(|r| r.key()).collect()
    }
}

/// Resolve the initialization order of a registry
///
/// `filter` returns `true` for registrations to exclude.
///
/// # Errors
/// - `UnsatisfiedRequirement` if a mandatory requirement has no enabled
///   provider other than the requiring registration itself
/// - `CycleDetected` naming one cycle, if the graph is not acyclic
pub fn resolve<'r, F>(registry: &'r PluginRegistry, filter: F) -> Result<Resolution<'r>>
where
    F: Fn(&Registration) -> bool,
{
    let mut nodes: BTreeMap<PluginKey, &'r Registration> = BTreeMap::new();
    let mut skipped = Vec::new();

    for registration in registry.iter() {
        if filter(registration) {
            skipped.push(registration);
        } else {
            nodes.insert(registration.key(), registration);
        }
    }

    let mut providers: BTreeMap<&PluginType, Vec<&PluginKey>> = BTreeMap::new();
    for (key, registration) in &nodes {
        providers.entry(&registration.plugin_type).or_default().push(key);
    }

    // key -> keys it must come after
    let mut dependencies: BTreeMap<&PluginKey, BTreeSet<&PluginKey>> = BTreeMap::new();
    // key -> keys that must come after it
    let mut dependents: BTreeMap<&PluginKey, Vec<&PluginKey>> = BTreeMap::new();

    for (key, registration) in &nodes {
        let mut deps = BTreeSet::new();

        for requirement in &registration.requires {
            let candidates: Vec<&PluginKey> = providers
                .get(&requirement.plugin_type)
                .map(|keys| keys.iter().copied().filter(|k| *k != key).collect())
                .unwrap_or_default();

            if requirement.mandatory && candidates.is_empty() {
                return Err(HostError::UnsatisfiedRequirement {
                    key: key.clone(),
                    required: requirement.plugin_type.clone(),
                });
            }

            deps.extend(candidates);
        }

        for dep in &deps {
            dependents.entry(*dep).or_default().push(key);
        }
        dependencies.insert(key, deps);
    }

    let mut in_degree: BTreeMap<&PluginKey, usize> = dependencies
        .iter()
        .map(|(key, deps)| (*key, deps.len()))
        .collect();

    let mut ready: BTreeSet<&PluginKey> = in_degree
        .iter()
        .filter(|(_, degree)| **degree == 0)
        .map(|(key, _)| *key)
        .collect();

    let mut order = Vec::with_capacity(nodes.len());

    while let Some(key) = ready.pop_first() {
        order.push(nodes[key]);

        for dependent in dependents.get(key).into_iter().flatten() {
            if let Some(degree) = in_degree.get_mut(dependent) {
                *degree -= 1;
                if *degree == 0 {
                    ready.insert(*dependent);
                }
            }
        }
    }

    if order.len() != nodes.len() {
        let remaining: BTreeSet<&PluginKey> = in_degree
            .iter()
            .filter(|(_, degree)| **degree > 0)
            .map(|(key, _)| *key)
            .collect();

        return Err(HostError::CycleDetected {
            cycle: find_cycle(&remaining, &dependencies),
        });
    }

    Ok(Resolution { order, skipped })
}

/// Walk dependency edges among unresolved nodes until a node repeats
///
/// Every unresolved node still has an unresolved dependency, so the walk
/// always closes a cycle. The result starts and ends with the same key.
fn find_cycle(
    remaining: &BTreeSet<&PluginKey>,
    dependencies: &BTreeMap<&PluginKey, BTreeSet<&PluginKey>>,
) -> Vec<PluginKey> {
    let mut path: Vec<&PluginKey> = Vec::new();
    let mut current = remaining.first().copied();

    while let Some(key) = current {
        if let Some(start) = path.iter().position(|k| *k == key) {
            let mut cycle: Vec<PluginKey> = path[start..].iter().map(|k| (*k).clone()).collect();
            cycle.push(key.clone());
            return cycle;
        }
        path.push(key);

        current = dependencies
            .get(key)
            .and_then(|deps| deps.iter().find(|d| remaining.contains(*d)).copied());
    }

    path.into_iter().cloned().collect()
}
