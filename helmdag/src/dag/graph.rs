// src/dag/graph.rs

//! The dependency graph of a chart set, keyed by [`Chart::name`].
//!
//! Edges run from dependency to dependent. Topological order and per-node
//! levels are established at build time with Kahn's algorithm (iterated
//! removal of zero-in-degree nodes); a cycle is reported the moment the
//! frontier empties with nodes remaining.

use std::collections::{HashMap, VecDeque};

use petgraph::dot::{Config, Dot};
use petgraph::graphmap::DiGraphMap;

use crate::chart::Chart;
use crate::validate::ValidationError;

/// Internal node structure: stores immediate deps and dependents.
#[derive(Debug, Clone)]
struct GraphNode {
    title: String,
    /// Direct dependencies: charts that must be ready before this one.
    deps: Vec<String>,
    /// Direct dependents: charts waiting on this one.
    dependents: Vec<String>,
    /// Length of the longest path from any root. Used for `plan` output
    /// ("Phase 1/2/3"); the walker schedules on edge readiness directly.
    level: usize,
}

/// In-memory DAG over a validated chart set.
#[derive(Debug, Clone)]
pub struct ChartGraph {
    nodes: HashMap<String, GraphNode>,
    /// Node names in one valid topological order.
    order: Vec<String>,
}

impl ChartGraph {
    /// Build the graph from a chart set.
    ///
    /// Fails with [`ValidationError::UnknownDependency`] for dangling
    /// edges and [`ValidationError::DependencyCycle`] (with a concrete
    /// cycle path) when the set is not acyclic.
    pub fn build(charts: &[Chart]) -> Result<Self, ValidationError> {
        let title_to_name: HashMap<&str, String> = charts
            .iter()
            .map(|c| (c.title.as_str(), c.name()))
            .collect();

        let mut nodes: HashMap<String, GraphNode> = HashMap::new();
        for chart in charts {
            let mut deps = Vec::with_capacity(chart.dependency_list.len());
            for dep_title in &chart.dependency_list {
                match title_to_name.get(dep_title.as_str()) {
                    Some(dep_name) => deps.push(dep_name.clone()),
                    None => {
                        return Err(ValidationError::UnknownDependency {
                            chart: chart.title.clone(),
                            dependency: dep_title.clone(),
                        })
                    }
                }
            }
            nodes.insert(
                chart.name(),
                GraphNode {
                    title: chart.title.clone(),
                    deps,
                    dependents: Vec::new(),
                    level: 0,
                },
            );
        }

        // Populate dependents from the dependency lists.
        let names: Vec<String> = nodes.keys().cloned().collect();
        for name in &names {
            let deps = nodes[name].deps.clone();
            for dep in deps {
                if let Some(dep_node) = nodes.get_mut(&dep) {
                    dep_node.dependents.push(name.clone());
                }
            }
        }

        let order = kahn_order(&mut nodes)?;
        Ok(Self { nodes, order })
    }

    /// All node names, in topological order.
    pub fn topo_order(&self) -> &[String] {
        &self.order
    }

    /// All node names, in no particular order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.nodes.keys().map(|s| s.as_str())
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The chart title behind a node name.
    pub fn title_of(&self, name: &str) -> Option<&str> {
        self.nodes.get(name).map(|n| n.title.as_str())
    }

    /// Immediate dependencies of a node.
    pub fn dependencies_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.deps.as_slice())
            .unwrap_or(&[])
    }

    /// Immediate dependents of a node.
    pub fn dependents_of(&self, name: &str) -> &[String] {
        self.nodes
            .get(name)
            .map(|n| n.dependents.as_slice())
            .unwrap_or(&[])
    }

    /// Longest distance from any root; roots are level 0.
    pub fn level_of(&self, name: &str) -> Option<usize> {
        self.nodes.get(name).map(|n| n.level)
    }

    /// Nodes with no dependencies.
    pub fn roots(&self) -> Vec<&str> {
        self.order
            .iter()
            .filter(|n| self.nodes[n.as_str()].deps.is_empty())
            .map(|s| s.as_str())
            .collect()
    }

    /// Graphviz DOT rendering of the dependency edges, for `plan -g`.
    pub fn to_dot(&self) -> String {
        let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();
        for name in self.nodes.keys() {
            graph.add_node(name.as_str());
        }
        for (name, node) in &self.nodes {
            for dep in &node.deps {
                graph.add_edge(dep.as_str(), name.as_str(), ());
            }
        }
        format!("{:?}", Dot::with_config(&graph, &[Config::EdgeNoLabel]))
    }
}

/// Kahn's algorithm over the node table: repeatedly remove zero-in-degree
/// nodes, assigning each dependent `level = max(level, removed + 1)`.
/// Nodes left over when the frontier empties form at least one cycle.
fn kahn_order(nodes: &mut HashMap<String, GraphNode>) -> Result<Vec<String>, ValidationError> {
    let mut in_degree: HashMap<&str, usize> = nodes
        .iter()
        .map(|(name, node)| (name.as_str(), node.deps.len()))
        .collect();

    let mut frontier: VecDeque<String> = nodes
        .iter()
        .filter(|(_, node)| node.deps.is_empty())
        .map(|(name, _)| name.clone())
        .collect();

    let mut levels: HashMap<String, usize> = HashMap::new();
    let mut order = Vec::with_capacity(nodes.len());

    while let Some(name) = frontier.pop_front() {
        let level = levels.get(name.as_str()).copied().unwrap_or(0);
        order.push(name.clone());
        for dependent in nodes[&name].dependents.clone() {
            let entry = levels.entry(dependent.clone()).or_insert(0);
            *entry = (*entry).max(level + 1);
            if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                *degree -= 1;
                if *degree == 0 {
                    frontier.push_back(dependent);
                }
            }
        }
    }

    if order.len() < nodes.len() {
        let remaining: Vec<&str> = in_degree
            .iter()
            .filter(|(_, d)| **d > 0)
            .map(|(n, _)| *n)
            .collect();
        return Err(ValidationError::DependencyCycle {
            path: cycle_path(nodes, &remaining),
        });
    }

    for (name, level) in levels {
        if let Some(node) = nodes.get_mut(&name) {
            node.level = level;
        }
    }
    Ok(order)
}

/// Recover one concrete cycle from the nodes Kahn's algorithm could not
/// order, by walking dependency edges inside the remainder until a node
/// repeats. Titles are reported, since that is what callers named.
fn cycle_path(nodes: &HashMap<String, GraphNode>, remaining: &[&str]) -> Vec<String> {
    let mut path: Vec<&str> = Vec::new();
    let mut current = match remaining.first() {
        Some(n) => *n,
        None => return Vec::new(),
    };
    loop {
        if let Some(pos) = path.iter().position(|n| *n == current) {
            let mut cycle: Vec<String> = path[pos..]
                .iter()
                .map(|n| nodes[*n].title.clone())
                .collect();
            cycle.push(nodes[current].title.clone());
            return cycle;
        }
        path.push(current);
        current = match nodes[current]
            .deps
            .iter()
            .find(|d| remaining.contains(&d.as_str()))
        {
            Some(next) => next.as_str(),
            // Every remaining node has an unresolved dependency inside the
            // remainder, so this is unreachable for a true cycle set.
            None => return path.iter().map(|n| nodes[*n].title.clone()).collect(),
        };
    }
}
