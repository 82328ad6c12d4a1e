// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Dependency graph for the steps of one pipeline level
//!
//! Graphs are built per level: a nested pipeline gets its own graph when it
//! runs. Every id is indexed before any edge is wired, so declaration order
//! does not matter.

use petgraph::algo::{has_path_connecting, tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::Direction;
use std::collections::HashMap;

use super::{RankedLevels, StepDefinition};
use crate::errors::{RankflowError, RankflowResult};

/// Acyclic graph of sibling steps; edges point from dependency to dependent
#[derive(Debug, Clone)]
pub struct ExecutionGraph {
    /// Node weight is the step's declaration index
    graph: DiGraph<usize, ()>,
    id_to_index: HashMap<String, NodeIndex>,
    /// Step ids in declaration order
    ids: Vec<String>,
}

impl ExecutionGraph {
    /// Build the graph of a pipeline's immediate children
    pub fn build(pipeline: &StepDefinition) -> RankflowResult<Self> {
        Self::from_steps(&pipeline.id, &pipeline.steps)
    }

    pub fn from_steps(pipeline_id: &str, steps: &[StepDefinition]) -> RankflowResult<Self> {
        let mut graph = DiGraph::new();
        let mut id_to_index = HashMap::new();
        let mut ids = Vec::with_capacity(steps.len());

        for (idx, step) in steps.iter().enumerate() {
            let node = graph.add_node(idx);
            if id_to_index.insert(step.id.clone(), node).is_some() {
                return Err(RankflowError::DuplicateStep {
                    pipeline: pipeline_id.to_string(),
                    step: step.id.clone(),
                });
            }
            ids.push(step.id.clone());
        }

        for step in steps {
            let step_node = id_to_index[&step.id];

            for dep in &step.depends {
                let dep_node = id_to_index.get(dep).ok_or_else(|| RankflowError::UnknownDependency {
                    step: step.id.clone(),
                    dependency: dep.clone(),
                })?;

                if !graph.contains_edge(*dep_node, step_node) {
                    graph.add_edge(*dep_node, step_node, ());
                }
            }
        }

        let built = Self {
            graph,
            id_to_index,
            ids,
        };
        built.validate_acyclic()?;

        Ok(built)
    }

    fn validate_acyclic(&self) -> RankflowResult<()> {
        match toposort(&self.graph, None) {
            Ok(_) => Ok(()),
            Err(cycle) => Err(RankflowError::CyclicGraph {
                steps: self.cycle_members(cycle.node_id()),
            }),
        }
    }

    /// Steps on the strongly connected component through `start`, in declaration order
    fn cycle_members(&self, start: NodeIndex) -> Vec<String> {
        let component = tarjan_scc(&self.graph)
            .into_iter()
            .find(|component| component.contains(&start))
            .unwrap_or_else(|| vec![start]);

        let mut members: Vec<usize> = component.into_iter().map(|n| self.graph[n]).collect();
        members.sort_unstable();
        members.into_iter().map(|idx| self.ids[idx].clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Step ids in declaration order
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Declaration index of a step
    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.id_to_index.get(id).map(|node| self.graph[*node])
    }

    pub(crate) fn node_weights(&self) -> impl Iterator<Item = (NodeIndex, usize)> + '_ {
        self.graph.node_indices().map(move |n| (n, self.graph[n]))
    }

    pub(crate) fn successors(&self, node: NodeIndex) -> impl Iterator<Item = NodeIndex> + '_ {
        self.graph.neighbors_directed(node, Direction::Outgoing)
    }

    pub(crate) fn in_degree(&self, node: NodeIndex) -> usize {
        self.graph.neighbors_directed(node, Direction::Incoming).count()
    }

    pub(crate) fn weight(&self, node: NodeIndex) -> usize {
        self.graph[node]
    }

    fn neighbours(&self, id: &str, direction: Direction) -> Option<Vec<String>> {
        let node = self.id_to_index.get(id)?;
        let mut found: Vec<usize> = self
            .graph
            .neighbors_directed(*node, direction)
            .map(|n| self.graph[n])
            .collect();
        found.sort_unstable();
        Some(found.into_iter().map(|idx| self.ids[idx].clone()).collect())
    }

    /// Direct dependencies of a step
    pub fn dependencies(&self, id: &str) -> Option<Vec<String>> {
        self.neighbours(id, Direction::Incoming)
    }

    /// Steps that directly depend on `id`
    pub fn dependents(&self, id: &str) -> Option<Vec<String>> {
        self.neighbours(id, Direction::Outgoing)
    }

    /// Steps without dependencies
    pub fn sources(&self) -> Vec<String> {
        self.ids
            .iter()
            .filter(|id| self.dependencies(id).map_or(false, |deps| deps.is_empty()))
            .cloned()
            .collect()
    }

    /// Check if step A depends (directly or transitively) on step B
    pub fn depends_on(&self, step_a: &str, step_b: &str) -> bool {
        let (Some(node_a), Some(node_b)) = (self.id_to_index.get(step_a), self.id_to_index.get(step_b)) else {
            return false;
        };
        node_a != node_b && has_path_connecting(&self.graph, *node_b, *node_a, None)
    }

    fn edges(&self) -> Vec<(usize, usize)> {
        let mut edges: Vec<(usize, usize)> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(from, to)| (self.graph[from], self.graph[to]))
            .collect();
        edges.sort_unstable();
        edges
    }

    /// Generate Mermaid diagram of the graph
    pub fn to_mermaid(&self) -> String {
        let mut out = String::from("graph TD\n");

        for (idx, id) in self.ids.iter().enumerate() {
            out.push_str(&format!("    s{}[\"{}\"]\n", idx, id));
        }

        for (from, to) in self.edges() {
            out.push_str(&format!("    s{} --> s{}\n", from, to));
        }

        out
    }

    /// Generate DOT diagram of the graph
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph pipeline {\n");
        out.push_str("    rankdir=TB;\n");
        out.push_str("    node [shape=box, style=rounded];\n\n");

        for id in &self.ids {
            out.push_str(&format!("    \"{}\";\n", id));
        }

        for (from, to) in self.edges() {
            out.push_str(&format!("    \"{}\" -> \"{}\";\n", self.ids[from], self.ids[to]));
        }

        out.push_str("}\n");
        out
    }

    /// Rank-by-rank listing of the steps
    pub fn to_text(&self, steps: &[StepDefinition]) -> RankflowResult<String> {
        let levels = RankedLevels::compute(self)?;
        let mut out = String::new();

        for (rank, level) in levels.iter().enumerate() {
            out.push_str(&format!("Rank {}:\n", rank));
            for idx in level {
                let step = &steps[*idx];
                out.push_str(&format!("  - {} ({})", step.id, step.kind()));
                if step.is_loop {
                    out.push_str(" [loop]");
                }
                let deps = self.dependencies(&step.id).unwrap_or_default();
                if !deps.is_empty() {
                    out.push_str(&format!(" [depends: {}]", deps.join(", ")));
                }
                out.push('\n');
            }
        }

        Ok(out)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn make_steps(steps: Vec<(&str, Vec<&str>)>) -> Vec<StepDefinition> {
        steps
            .into_iter()
            .map(|(id, deps)| StepDefinition {
                id: id.into(),
                name: id.into(),
                command: Some(format!("echo {}", id)),
                depends: deps.into_iter().map(String::from).collect(),
                ..Default::default()
            })
            .collect()
    }

    #[test]
    fn test_dependencies_declared_after_dependents() {
        let steps = make_steps(vec![("c", vec!["b"]), ("b", vec!["a"]), ("a", vec![])]);

        let graph = ExecutionGraph::from_steps("p", &steps).unwrap();
        assert_eq!(graph.dependencies("c"), Some(vec!["b".to_string()]));
        assert_eq!(graph.sources(), vec!["a"]);
    }

    #[test]
    fn test_diamond_graph() {
        let steps = make_steps(vec![
            ("a", vec![]),
            ("b", vec!["a"]),
            ("c", vec!["a"]),
            ("d", vec!["b", "c"]),
        ]);

        let graph = ExecutionGraph::from_steps("p", &steps).unwrap();
        assert_eq!(graph.dependents("a"), Some(vec!["b".to_string(), "c".to_string()]));
        assert!(graph.depends_on("d", "a"));
        assert!(!graph.depends_on("a", "d"));
        assert!(!graph.depends_on("b", "c"));
    }

    #[test]
    fn test_cycle_rejected() {
        let steps = make_steps(vec![("a", vec!["b"]), ("b", vec!["a"]), ("c", vec![])]);

        match ExecutionGraph::from_steps("p", &steps) {
            Err(RankflowError::CyclicGraph { steps }) => assert_eq!(steps, vec!["a", "b"]),
            other => panic!("expected cycle error, got {:?}", other),
        }
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let steps = make_steps(vec![("a", vec!["a"])]);
        assert!(matches!(
            ExecutionGraph::from_steps("p", &steps),
            Err(RankflowError::CyclicGraph { .. })
        ));
    }

    #[test]
    fn test_unknown_dependency_names_step() {
        let steps = make_steps(vec![("a", vec![]), ("b", vec!["ghost"])]);

        match ExecutionGraph::from_steps("p", &steps) {
            Err(RankflowError::UnknownDependency { step, dependency }) => {
                assert_eq!(step, "b");
                assert_eq!(dependency, "ghost");
            }
            other => panic!("expected unknown dependency, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let steps = make_steps(vec![("a", vec![]), ("a", vec![])]);
        assert!(matches!(
            ExecutionGraph::from_steps("p", &steps),
            Err(RankflowError::DuplicateStep { .. })
        ));
    }

    #[test]
    fn test_renderings() {
        let steps = make_steps(vec![("a", vec![]), ("b", vec!["a"])]);
        let graph = ExecutionGraph::from_steps("p", &steps).unwrap();

        assert!(graph.to_mermaid().contains("s0 --> s1"));
        assert!(graph.to_dot().contains("\"a\" -> \"b\";"));

        let text = graph.to_text(&steps).unwrap();
        assert!(text.contains("Rank 0:\n  - a (tool)"));
        assert!(text.contains("Rank 1:\n  - b (tool) [depends: a]"));
    }
}
