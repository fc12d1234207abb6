//! Greedy insertion heuristic for graphs whose color count exceeds the DP
//! table limit, and fallback when the DP runs out of time.
//!
//! Vertices are attached one at a time by the best positive-gain edge from
//! the current tree, followed by a bounded re-parenting pass. The result is
//! feasible but not necessarily optimal.

use super::Solution;
use crate::graph::FGraph;

const IMPROVEMENT_ROUNDS: usize = 10;

pub(super) fn solve(graph: &FGraph, banned_edges: &[usize]) -> Option<Solution> {
    let n = graph.number_of_nodes();
    let mut banned = vec![false; graph.number_of_edges()];
    for &e in banned_edges {
        banned[e] = true;
    }

    let max_color = graph.nodes.iter().map(|node| node.color).max().unwrap_or(0);
    let mut color_used = vec![false; max_color + 1];
    let mut in_tree = vec![false; n];
    let mut incoming: Vec<Option<usize>> = vec![None; n];
    in_tree[FGraph::ROOT] = true;
    color_used[graph.nodes[FGraph::ROOT].color] = true;

    // grow while some attachment still pays for itself
    loop {
        let mut best: Option<(f64, usize)> = None;
        for (source, &inside) in in_tree.iter().enumerate() {
            if !inside {
                continue;
            }
            for e in graph.out_edge_indices(source) {
                if banned[e] {
                    continue;
                }
                let edge = &graph.edges[e];
                let target = &graph.nodes[edge.target];
                if in_tree[edge.target] || color_used[target.color] || edge.weight <= 0.0 {
                    continue;
                }
                // ties resolve to the smallest edge index for determinism
                if best.map_or(true, |(w, _)| edge.weight > w) {
                    best = Some((edge.weight, e));
                }
            }
        }
        let Some((_, e)) = best else { break };
        let target = graph.edges[e].target;
        in_tree[target] = true;
        color_used[graph.nodes[target].color] = true;
        incoming[target] = Some(e);
    }

    // re-parent nodes onto heavier incoming edges where possible
    for _ in 0..IMPROVEMENT_ROUNDS {
        let mut improved = false;
        for node in 0..n {
            let Some(current) = incoming[node] else {
                continue;
            };
            let below = descendants(graph, &incoming, node);
            let mut best = current;
            for (source, &inside) in in_tree.iter().enumerate() {
                if !inside || below.contains(&source) || source == node {
                    continue;
                }
                for e in graph.out_edge_indices(source) {
                    if banned[e] {
                        continue;
                    }
                    let edge = &graph.edges[e];
                    if edge.target == node && edge.weight > graph.edges[best].weight + 1e-12 {
                        best = e;
                    }
                }
            }
            if best != current {
                incoming[node] = Some(best);
                improved = true;
            }
        }
        if !improved {
            break;
        }
    }

    let mut edges: Vec<usize> = incoming.iter().flatten().copied().collect();
    edges.sort_unstable();
    let score = edges.iter().map(|&e| graph.edges[e].weight).sum();
    Some(Solution {
        edges,
        score,
        // a tree grown greedily is only provably optimal when there was
        // nothing to choose
        optimal: graph.number_of_edges() == 0,
    })
}

/// Transitive targets of `node` in the current tree.
fn descendants(graph: &FGraph, incoming: &[Option<usize>], node: usize) -> Vec<usize> {
    let mut below = vec![node];
    let mut grew = true;
    while grew {
        grew = false;
        for (candidate, edge) in incoming.iter().enumerate() {
            let Some(e) = edge else { continue };
            let source = graph.edges[*e].source;
            if below.contains(&source) && !below.contains(&candidate) {
                below.push(candidate);
                grew = true;
            }
        }
    }
    below
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use fragcore::MolecularFormula;

    use super::super::dp;
    use super::*;
    use crate::graph::{
        GraphEdge,
        GraphNode,
    };

    fn chain_graph() -> FGraph {
        let f = |s: &str| MolecularFormula::parse(s).unwrap();
        let nodes = vec![
            GraphNode {
                color: 0,
                formula: f("C6H12O6"),
                vertex_score: 2.0,
            },
            GraphNode {
                color: 1,
                formula: f("C6H10O5"),
                vertex_score: 0.0,
            },
            GraphNode {
                color: 2,
                formula: f("C4H4O2"),
                vertex_score: 0.0,
            },
        ];
        let mut edges = vec![
            GraphEdge {
                source: 0,
                target: 1,
                weight: 4.0,
                loss: f("H2O"),
            },
            GraphEdge {
                source: 0,
                target: 2,
                weight: 1.0,
                loss: f("C2H8O4"),
            },
            GraphEdge {
                source: 1,
                target: 2,
                weight: 3.0,
                loss: f("C2H6O3"),
            },
        ];
        edges.sort_by(|a, b| a.source.cmp(&b.source).then(a.target.cmp(&b.target)));
        let mut out_offsets = vec![0; nodes.len() + 1];
        for edge in &edges {
            out_offsets[edge.source + 1] += 1;
        }
        for i in 1..out_offsets.len() {
            out_offsets[i] += out_offsets[i - 1];
        }
        FGraph {
            neutral_formula: nodes[0].formula.clone(),
            root_score: nodes[0].vertex_score,
            nodes,
            edges,
            out_offsets,
        }
    }

    #[test]
    fn heuristic_matches_dp_on_a_simple_chain() {
        let graph = chain_graph();
        let greedy = solve(&graph, &[]).unwrap();
        let exact = dp::solve(&graph, &[], None, Instant::now()).unwrap();
        assert!((greedy.score - exact.score).abs() < 1e-12);
        assert!((greedy.score - 7.0).abs() < 1e-12);
    }

    #[test]
    fn heuristic_respects_colors_and_bans() {
        let graph = chain_graph();
        let direct = graph
            .edges
            .iter()
            .position(|e| e.source == 0 && e.target == 1)
            .unwrap();
        let solution = solve(&graph, &[direct]).unwrap();
        assert!(!solution.edges.contains(&direct));
        let mut used = Vec::new();
        for &e in &solution.edges {
            let color = graph.nodes[graph.edges[e].target].color;
            assert!(!used.contains(&color));
            used.push(color);
        }
    }
}
