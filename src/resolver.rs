//! Dependency resolution: topological sort over required-dependency edges,
//! tiebroken by priority among currently-ready modules (spec §4.5).

use std::collections::{HashMap, HashSet};

use crate::error::ResolverError;
use crate::manifest::Module;

/// Resolves `modules` into a load order satisfying spec §4.5's (a)/(b)/(c).
pub fn resolve(modules: Vec<Module>) -> Result<Vec<Module>, ResolverError> {
    let by_name: HashMap<&str, usize> = modules
        .iter()
        .enumerate()
        .map(|(i, m)| (m.name.as_str(), i))
        .collect();

    // Validate required dependencies exist before doing any graph work.
    for module in &modules {
        for dep in &module.required {
            if !by_name.contains_key(dep.as_str()) {
                return Err(ResolverError::MissingDependency {
                    module: module.name.clone(),
                    dependency: dep.clone(),
                });
            }
        }
    }

    // Reverse-dependency graph: dependents[i] = indices of modules that require i.
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); modules.len()];
    let mut in_degree: Vec<usize> = vec![0; modules.len()];

    for (i, module) in modules.iter().enumerate() {
        let mut seen = HashSet::new();
        for dep in &module.required {
            // Optional deps never contribute; required deps are deduped so a
            // manifest listing the same dependency twice doesn't inflate
            // in-degree.
            if seen.insert(dep.as_str()) {
                let dep_idx = by_name[dep.as_str()];
                dependents[dep_idx].push(i);
                in_degree[i] += 1;
            }
        }
    }

    // Ready set, keyed by (priority, input-order-index) for a local,
    // dependency-consistent tiebreak: among modules simultaneously ready,
    // lowest priority goes first; ties keep stable input order.
    let mut ready: Vec<usize> = (0..modules.len())
        .filter(|&i| in_degree[i] == 0)
        .collect();
    sort_ready(&mut ready, &modules);

    let mut order = Vec::with_capacity(modules.len());
    let mut placed = vec![false; modules.len()];

    while !ready.is_empty() {
        let next = ready.remove(0);
        placed[next] = true;
        order.push(next);

        let mut newly_ready = Vec::new();
        for &dependent in &dependents[next] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                newly_ready.push(dependent);
            }
        }
        ready.extend(newly_ready);
        sort_ready(&mut ready, &modules);
    }

    if order.len() != modules.len() {
        let cycle: Vec<String> = (0..modules.len())
            .filter(|&i| !placed[i])
            .map(|i| modules[i].name.clone())
            .collect();
        return Err(ResolverError::CircularDependency { cycle });
    }

    let mut modules = modules;
    // Take ownership in resolved order without re-allocating per element:
    // build the output by index, then drop the rest.
    let mut taken: Vec<Option<Module>> = modules.drain(..).map(Some).collect();
    let resolved = order
        .into_iter()
        .map(|i| taken[i].take().expect("each index placed exactly once"))
        .collect();
    Ok(resolved)
}

fn sort_ready(ready: &mut [usize], modules: &[Module]) {
    ready.sort_by(|&a, &b| {
        modules[a]
            .priority
            .cmp(&modules[b].priority)
            .then_with(|| a.cmp(&b))
    });
}
