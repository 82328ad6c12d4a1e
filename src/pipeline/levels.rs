// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 rankflow contributors

//! Rank partitioning of an execution graph

use std::collections::HashMap;

use super::ExecutionGraph;
use crate::errors::{RankflowError, RankflowResult};

/// Ordered groups of step indices.
///
/// Group `i` holds exactly the steps whose dependencies all sit in groups
/// `0..i`. Within a group steps are listed in declaration order, which only
/// matters for logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RankedLevels {
    levels: Vec<Vec<usize>>,
}

impl RankedLevels {
    /// Kahn-style leveling
    pub fn compute(graph: &ExecutionGraph) -> RankflowResult<Self> {
        let mut remaining: HashMap<_, usize> = graph
            .node_weights()
            .map(|(node, _)| (node, graph.in_degree(node)))
            .collect();

        let mut current: Vec<_> = remaining
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(node, _)| *node)
            .collect();
        current.sort_by_key(|node| graph.weight(*node));

        let mut levels = Vec::new();
        let mut placed = 0;

        while !current.is_empty() {
            for node in &current {
                remaining.remove(node);
            }
            placed += current.len();

            let mut next = Vec::new();
            for node in &current {
                for succ in graph.successors(*node) {
                    if let Some(degree) = remaining.get_mut(&succ) {
                        *degree -= 1;
                        if *degree == 0 {
                            next.push(succ);
                        }
                    }
                }
            }
            next.sort_by_key(|node| graph.weight(*node));
            next.dedup();

            levels.push(current.iter().map(|node| graph.weight(*node)).collect());
            current = next;
        }

        if placed < graph.len() {
            let mut stuck: Vec<usize> = remaining.keys().map(|node| graph.weight(*node)).collect();
            stuck.sort_unstable();
            return Err(RankflowError::CyclicGraph {
                steps: stuck.into_iter().map(|idx| graph.ids()[idx].clone()).collect(),
            });
        }

        Ok(Self { levels })
    }

    pub fn len(&self) -> usize {
        self.levels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Vec<usize>> {
        self.levels.iter()
    }

    pub fn levels(&self) -> &[Vec<usize>] {
        &self.levels
    }

    /// Rank of the step with declaration index `idx`
    pub fn rank_of(&self, idx: usize) -> Option<usize> {
        self.levels.iter().position(|level| level.contains(&idx))
    }

    /// The levels as step ids
    pub fn ids<'a>(&self, graph: &'a ExecutionGraph) -> Vec<Vec<&'a str>> {
        self.levels
            .iter()
            .map(|level| level.iter().map(|idx| graph.ids()[*idx].as_str()).collect())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::dag::tests::make_steps;

    fn levels_of(steps: Vec<(&str, Vec<&str>)>) -> Vec<Vec<String>> {
        let steps = make_steps(steps);
        let graph = ExecutionGraph::from_steps("p", &steps).unwrap();
        RankedLevels::compute(&graph)
            .unwrap()
            .ids(&graph)
            .into_iter()
            .map(|level| level.into_iter().map(String::from).collect())
            .collect()
    }

    #[test]
    fn test_independent_steps_share_rank_zero() {
        assert_eq!(levels_of(vec![("a", vec![]), ("b", vec![])]), vec![vec!["a", "b"]]);
    }

    #[test]
    fn test_diamond_levels() {
        let levels = levels_of(vec![
            ("d", vec!["b", "c"]),
            ("c", vec!["a"]),
            ("b", vec!["a"]),
            ("a", vec![]),
        ]);
        assert_eq!(levels, vec![vec!["a"], vec!["c", "b"], vec!["d"]]);
    }

    #[test]
    fn test_step_waits_for_its_deepest_dependency() {
        let levels = levels_of(vec![
            ("a", vec![]),
            ("b", vec!["a"]),
            ("c", vec!["a", "b"]),
            ("e", vec![]),
        ]);
        assert_eq!(levels, vec![vec!["a", "e"], vec!["b"], vec!["c"]]);
    }

    #[test]
    fn test_every_dependency_is_in_an_earlier_rank() {
        let steps = make_steps(vec![
            ("fetch", vec![]),
            ("index", vec!["fetch"]),
            ("qc", vec!["fetch"]),
            ("align", vec!["index", "fetch"]),
            ("report", vec!["qc", "align"]),
            ("notify", vec![]),
        ]);
        let graph = ExecutionGraph::from_steps("p", &steps).unwrap();
        let levels = RankedLevels::compute(&graph).unwrap();

        let mut seen = 0;
        for (idx, step) in steps.iter().enumerate() {
            let rank = levels.rank_of(idx).unwrap();
            for dep in &step.depends {
                let dep_rank = levels.rank_of(graph.index_of(dep).unwrap()).unwrap();
                assert!(dep_rank < rank, "{} must run before {}", dep, step.id);
            }
            seen += 1;
        }
        let placed: usize = levels.iter().map(Vec::len).sum();
        assert_eq!(placed, seen);
    }
}
