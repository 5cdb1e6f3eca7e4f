use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

/// A dependency cycle inside the eligible recipe set. Fatal to the run:
/// proceeding with an arbitrary order would silently break the sequencing
/// guarantee.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("circular dependency between '{first}' and '{second}'")]
pub struct CircularDependency {
    pub first: String,
    pub second: String,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Computes a processing order for `names` that places every recipe after
/// all of its in-set dependencies.
///
/// Edges are `(recipe, depends_on)` pairs; pairs with either endpoint
/// outside `names` are ignored. Traversal is an iterative depth-first walk
/// seeded from a synthetic root over every edge-constrained name, with
/// three-color marking instead of recursion so large dependency sets
/// cannot overflow the stack. Post-order emission guarantees dependencies
/// come first. Names with no restricted edges keep their relative input
/// order and follow the constrained names.
pub fn order_recipes(
    names: &[String],
    edges: &[(String, String)],
) -> Result<Vec<String>, CircularDependency> {
    let mut dependencies: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    let mut constrained: Vec<&str> = Vec::new();

    for name in names {
        dependencies.insert(name.as_str(), Vec::new());
    }

    for (name, depends_on) in edges {
        if name == depends_on || !dependencies.contains_key(depends_on.as_str()) {
            continue;
        }
        let Some(deps) = dependencies.get_mut(name.as_str()) else {
            continue;
        };
        if !deps.contains(&depends_on.as_str()) {
            deps.push(depends_on.as_str());
        }
    }

    let mut touched: BTreeSet<&str> = BTreeSet::new();
    for (name, depends_on) in edges {
        if name == depends_on {
            continue;
        }
        if dependencies.contains_key(name.as_str()) && dependencies.contains_key(depends_on.as_str())
        {
            touched.insert(name.as_str());
            touched.insert(depends_on.as_str());
        }
    }
    for name in names {
        if touched.contains(name.as_str()) {
            constrained.push(name.as_str());
        }
    }

    let mut marks: BTreeMap<&str, Mark> = names
        .iter()
        .map(|name| (name.as_str(), Mark::Unvisited))
        .collect();
    let mut resolved: Vec<&str> = Vec::new();

    // The synthetic root depends on every constrained name; walking its
    // children in input order keeps the result deterministic.
    for &seed in &constrained {
        if marks[seed] == Mark::Done {
            continue;
        }

        let mut stack: Vec<(&str, usize)> = vec![(seed, 0)];
        marks.insert(seed, Mark::InProgress);

        while let Some((node, next_child)) = stack.last().copied() {
            let deps = &dependencies[node];
            if next_child < deps.len() {
                if let Some(frame) = stack.last_mut() {
                    frame.1 += 1;
                }
                let child = deps[next_child];
                match marks[child] {
                    Mark::Done => {}
                    Mark::InProgress => {
                        return Err(CircularDependency {
                            first: child.to_string(),
                            second: node.to_string(),
                        });
                    }
                    Mark::Unvisited => {
                        marks.insert(child, Mark::InProgress);
                        stack.push((child, 0));
                    }
                }
            } else {
                marks.insert(node, Mark::Done);
                resolved.push(node);
                stack.pop();
            }
        }
    }

    let mut ordered: Vec<String> = resolved.iter().map(|name| (*name).to_string()).collect();
    for name in names {
        if marks[name.as_str()] == Mark::Unvisited {
            ordered.push(name.clone());
        }
    }

    Ok(ordered)
}
