//! Maximum-colorful-subtree solvers.
//!
//! The graph hands every solver the same problem: find the maximum-weight
//! subtree rooted at node 0 in which each color appears at most once. Two
//! implementations exist, both stateless across calls: an exact dynamic
//! program over color subsets and a greedy insertion heuristic for graphs
//! with too many colors for the DP table. `DefaultTreeBuilder` picks per
//! graph and falls back from the DP to the heuristic on budget exhaustion.

mod dp;
mod insertion;
mod kbest;

use std::time::{
    Duration,
    Instant,
};

pub use kbest::KBestSolutions;

use crate::errors::Result;
use crate::graph::FGraph;
use crate::preprocess::ProcessedInput;
use crate::tree::{
    FTree,
    Fragment,
    TreeScoring,
};

/// Per-solve resource limits.
#[derive(Debug, Clone, Copy, Default)]
pub struct SolverBudget {
    pub time_limit: Option<Duration>,
    /// Solutions whose overall score (root plus edges) falls below this are
    /// discarded.
    pub lower_bound: Option<f64>,
}

/// A chosen subtree: edge indices into the source graph plus the summed
/// edge weight. The root vertex score is not included in `score`.
#[derive(Debug, Clone)]
pub struct Solution {
    pub edges: Vec<usize>,
    pub score: f64,
    pub optimal: bool,
}

/// A maximum-colorful-subtree solver.
///
/// Implementations carry no per-solve state, so one instance may serve
/// every worker thread.
pub trait TreeBuilder: Send + Sync {
    /// Best feasible subtree avoiding `banned_edges`, or `None` when the
    /// budget's lower bound cannot be met.
    fn solve(&self, graph: &FGraph, banned_edges: &[usize], budget: &SolverBudget)
        -> Option<Solution>;
}

/// Exact DP when the color count and table size allow it, greedy insertion
/// otherwise.
#[derive(Debug, Clone)]
pub struct DefaultTreeBuilder {
    pub max_dp_colors: usize,
    /// Upper bound on `nodes * 2^colors` DP cells.
    pub max_dp_cells: usize,
}

impl Default for DefaultTreeBuilder {
    fn default() -> Self {
        Self {
            max_dp_colors: 12,
            max_dp_cells: 1 << 24,
        }
    }
}

impl TreeBuilder for DefaultTreeBuilder {
    fn solve(
        &self,
        graph: &FGraph,
        banned_edges: &[usize],
        budget: &SolverBudget,
    ) -> Option<Solution> {
        let started = Instant::now();
        let colors = graph.color_count();
        let cells = graph
            .number_of_nodes()
            .checked_shl(colors as u32)
            .unwrap_or(usize::MAX);
        let solution = if colors <= self.max_dp_colors && cells <= self.max_dp_cells {
            match dp::solve(graph, banned_edges, budget.time_limit, started) {
                Some(solution) => Some(solution),
                // the DP ran out of time; take whatever the heuristic finds
                None => insertion::solve(graph, banned_edges),
            }
        } else {
            insertion::solve(graph, banned_edges)
        };
        let solution = solution?;
        if let Some(lower_bound) = budget.lower_bound {
            if graph.root_score + solution.score < lower_bound {
                return None;
            }
        }
        Some(solution)
    }
}

/// Turn a solution into an owned tree, re-verifying its score against the
/// graph before the graph is discarded.
pub fn materialize(
    graph: &FGraph,
    input: &ProcessedInput,
    solution: &Solution,
) -> Result<FTree> {
    let mut children: Vec<Vec<usize>> = vec![Vec::new(); graph.number_of_nodes()];
    for &edge_index in &solution.edges {
        let edge = &graph.edges[edge_index];
        children[edge.source].push(edge_index);
    }

    let mut fragments: Vec<Fragment> = Vec::with_capacity(solution.edges.len() + 1);
    let root = &graph.nodes[FGraph::ROOT];
    fragments.push(Fragment {
        formula: root.formula.clone(),
        mz: input.peaks[root.color].mz,
        relative_intensity: input.peaks[root.color].relative_intensity,
        color: root.color,
        parent: None,
        incoming_loss: None,
        incoming_weight: 0.0,
    });

    // depth-first emission keeps parents ahead of their children
    let mut stack: Vec<(usize, usize)> = children[FGraph::ROOT]
        .iter()
        .rev()
        .map(|&e| (e, 0))
        .collect();
    while let Some((edge_index, parent_fragment)) = stack.pop() {
        let edge = &graph.edges[edge_index];
        let node = &graph.nodes[edge.target];
        fragments.push(Fragment {
            formula: node.formula.clone(),
            mz: input.peaks[node.color].mz,
            relative_intensity: input.peaks[node.color].relative_intensity,
            color: node.color,
            parent: Some(parent_fragment),
            incoming_loss: Some(edge.loss.clone()),
            incoming_weight: edge.weight,
        });
        let fragment_index = fragments.len() - 1;
        for &child_edge in children[edge.target].iter().rev() {
            stack.push((child_edge, fragment_index));
        }
    }

    let explained: f64 = fragments
        .iter()
        .skip(1)
        .map(|f| f.relative_intensity)
        .sum();
    let total = input.total_fragment_intensity();
    let explained_intensity = if total > 0.0 { explained / total } else { 0.0 };

    let tree = FTree {
        ion_type: input.ion_type.clone(),
        fragments,
        scoring: TreeScoring {
            root_score: graph.root_score,
            overall_score: graph.root_score + solution.score,
            additional: Default::default(),
            explained_intensity,
        },
        recalibrated: false,
        optimal: solution.optimal,
    };
    tree.verify_against_graph(graph)?;
    tree.verify()?;
    Ok(tree)
}
