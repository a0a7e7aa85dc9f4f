//! Installation order of addons

use std::collections::HashSet;

use tracing::debug;

use crate::types::{OlafError, Result};

/// Sort modules so that each comes after its dependencies.
///
/// `modules` is a list of `(name, depends)` pairs. Modules ready at the
/// same time keep their relative order in the input, so the result is
/// deterministic. An unknown dependency is a configuration error and a
/// cycle is reported as [`OlafError::DependencyLoop`].
pub fn toposort_modules<S: AsRef<str>>(modules: &[(S, Vec<S>)]) -> Result<Vec<String>> {
    let names: Vec<&str> = modules.iter().map(|(name, _)| name.as_ref()).collect();
    let known: HashSet<&str> = names.iter().copied().collect();

    let mut edges: Vec<(&str, &str)> = Vec::new();
    let mut ready: Vec<&str> = Vec::new();
    for (name, depends) in modules {
        let name = name.as_ref();
        if depends.is_empty() {
            ready.push(name);
        }
        for dep in depends {
            let dep = dep.as_ref();
            if !known.contains(dep) {
                return Err(OlafError::Config(format!(
                    "Module '{}' depends on unknown module '{}'",
                    name, dep
                )));
            }
            if !edges.contains(&(dep, name)) {
                edges.push((dep, name));
            }
        }
    }

    let mut sorted = Vec::with_capacity(names.len());
    let mut next = 0;
    while next < ready.len() {
        let current = ready[next];
        next += 1;
        sorted.push(current.to_string());

        for name in &names {
            let before = edges.len();
            edges.retain(|(dep, dependent)| !(*dep == current && dependent == name));
            if edges.len() < before && !edges.iter().any(|(_, dependent)| dependent == name) {
                ready.push(*name);
            }
        }
    }

    if !edges.is_empty() {
        let mut involved: Vec<String> = Vec::new();
        for (_, dependent) in &edges {
            if !involved.iter().any(|m| m == dependent) {
                involved.push(dependent.to_string());
            }
        }
        return Err(OlafError::DependencyLoop(involved));
    }

    debug!(order = ?sorted, "Modules sorted");
    Ok(sorted)
}
