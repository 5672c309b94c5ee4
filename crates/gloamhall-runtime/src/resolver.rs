//! Dependency-order resolution.
//!
//! Given the manifests of one discovery pass, produces a load order in which
//! every dependency precedes its dependents (Kahn's algorithm, edges
//! pointing dependee → dependent). Ties among simultaneously-ready plugins
//! break in input order; callers must not rely on anything stronger than
//! "some dependency-consistent order".

use crate::error::{RuntimeError, RuntimeResult};
use crate::manifest::PluginManifest;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// Sort manifests into a safe load order.
///
/// A required dependency absent from `manifests` fails the whole pass with
/// [`RuntimeError::MissingDependency`]; an optional absent dependency
/// contributes no edge. A cycle fails with
/// [`RuntimeError::CyclicDependency`] naming the unresolved plugins.
pub fn resolve_load_order(manifests: Vec<PluginManifest>) -> RuntimeResult<Vec<PluginManifest>> {
    let index_of: HashMap<&str, usize> = manifests
        .iter()
        .enumerate()
        .map(|(i, m)| (m.id(), i))
        .collect();

    // in_degree[i] counts unmet dependencies of plugin i;
    // dependents[i] lists the plugins waiting on plugin i.
    let mut in_degree = vec![0usize; manifests.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); manifests.len()];

    for (i, manifest) in manifests.iter().enumerate() {
        for dep in &manifest.dependencies {
            match index_of.get(dep.id.as_str()) {
                Some(&dep_index) => {
                    in_degree[i] += 1;
                    dependents[dep_index].push(i);
                }
                None if dep.optional => {
                    debug!(
                        plugin = manifest.id(),
                        dependency = %dep.id,
                        "ignoring absent optional dependency"
                    );
                }
                None => {
                    return Err(RuntimeError::MissingDependency {
                        plugin: manifest.id().to_string(),
                        dependency: dep.id.clone(),
                    });
                }
            }
        }
    }

    let mut ready: VecDeque<usize> = (0..manifests.len())
        .filter(|&i| in_degree[i] == 0)
        .collect();
    let mut order = Vec::with_capacity(manifests.len());

    while let Some(i) = ready.pop_front() {
        order.push(i);
        for &dependent in &dependents[i] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.push_back(dependent);
            }
        }
    }

    if order.len() < manifests.len() {
        let stuck: Vec<String> = manifests
            .iter()
            .enumerate()
            .filter(|(i, _)| in_degree[*i] > 0)
            .map(|(_, m)| m.id().to_string())
            .collect();
        return Err(RuntimeError::CyclicDependency(stuck));
    }

    // Reorder the owned manifests without cloning them.
    let mut slots: Vec<Option<PluginManifest>> = manifests.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|i| slots[i].take())
        .collect())
}
