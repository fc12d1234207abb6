//! Exact maximum colorful subtree by dynamic programming over color
//! subsets.
//!
//! `W[v][S]` is the best edge-weight sum of a colorful subtree rooted at
//! `v` whose colors are drawn from `S` (which must contain `v`'s own
//! color). Two transitions: extend `v` by a single child edge, or merge two
//! previously computed branch sets that only share `v`'s color. The table
//! is monotone in `S`, so the answer is `W[root][all colors]`.

use std::time::{
    Duration,
    Instant,
};

use super::Solution;
use crate::graph::FGraph;

#[derive(Debug, Clone, Copy)]
enum Choice {
    Leaf,
    /// Single child branch through this edge index.
    Edge(u32),
    /// Split of the descendant colors; the payload is the half assigned to
    /// the first branch.
    Split(u32),
}

/// Returns `None` only when the time limit was exhausted.
pub(super) fn solve(
    graph: &FGraph,
    banned_edges: &[usize],
    time_limit: Option<Duration>,
    started: Instant,
) -> Option<Solution> {
    let n = graph.number_of_nodes();
    let mut banned = vec![false; graph.number_of_edges()];
    for &e in banned_edges {
        banned[e] = true;
    }

    // dense color bits
    let mut colors: Vec<usize> = graph.nodes.iter().map(|node| node.color).collect();
    colors.sort_unstable();
    colors.dedup();
    let bit_of = |color: usize| -> usize {
        colors.binary_search(&color).expect("color present")
    };
    let k = colors.len();
    let full: usize = (1 << k) - 1;

    // children before parents: repeatedly peel nodes with no unprocessed
    // out-neighbors (targets always precede sources)
    let order = topological_order(graph);

    let mut table = vec![f64::NEG_INFINITY; n << k];
    let mut choices = vec![Choice::Leaf; n << k];
    let index = |v: usize, mask: usize| -> usize { (v << k) | mask };

    for &v in &order {
        if let Some(limit) = time_limit {
            if started.elapsed() > limit {
                return None;
            }
        }
        let cbit = 1 << bit_of(graph.nodes[v].color);
        for mask in 0..=full {
            if mask & cbit == 0 {
                continue;
            }
            let rest = mask & !cbit;
            let mut best = 0.0_f64;
            let mut choice = Choice::Leaf;

            for e in graph.out_edge_indices(v) {
                if banned[e] {
                    continue;
                }
                let edge = &graph.edges[e];
                let ubit = 1 << bit_of(graph.nodes[edge.target].color);
                if rest & ubit == 0 {
                    continue;
                }
                let candidate = edge.weight + table[index(edge.target, rest)];
                if candidate > best {
                    best = candidate;
                    choice = Choice::Edge(e as u32);
                }
            }

            // merge two branch sets; proper submask enumeration of `rest`
            let mut sub = rest;
            while sub > 0 {
                let other = rest & !sub;
                if other != 0 {
                    let candidate =
                        table[index(v, sub | cbit)] + table[index(v, other | cbit)];
                    if candidate > best {
                        best = candidate;
                        choice = Choice::Split(sub as u32);
                    }
                }
                sub = (sub - 1) & rest;
            }

            table[index(v, mask)] = best;
            choices[index(v, mask)] = choice;
        }
    }

    // backtrack from the root with the full color set
    let mut edges = Vec::new();
    let mut stack = vec![(FGraph::ROOT, full)];
    while let Some((v, mask)) = stack.pop() {
        let cbit = 1 << bit_of(graph.nodes[v].color);
        let rest = mask & !cbit;
        match choices[index(v, mask)] {
            Choice::Leaf => {}
            Choice::Edge(e) => {
                edges.push(e as usize);
                stack.push((graph.edges[e as usize].target, rest));
            }
            Choice::Split(sub) => {
                let sub = sub as usize;
                stack.push((v, sub | cbit));
                stack.push((v, (rest & !sub) | cbit));
            }
        }
    }
    edges.sort_unstable();

    Some(Solution {
        edges,
        score: table[index(FGraph::ROOT, full)],
        optimal: true,
    })
}

/// Kahn's algorithm with edges reversed, so every node comes after all of
/// its edge targets.
fn topological_order(graph: &FGraph) -> Vec<usize> {
    let n = graph.number_of_nodes();
    let mut unprocessed_out = vec![0usize; n];
    let mut in_sources: Vec<Vec<usize>> = vec![Vec::new(); n];
    for edge in &graph.edges {
        unprocessed_out[edge.source] += 1;
        in_sources[edge.target].push(edge.source);
    }
    let mut queue: Vec<usize> = (0..n).filter(|&v| unprocessed_out[v] == 0).collect();
    let mut order = Vec::with_capacity(n);
    while let Some(v) = queue.pop() {
        order.push(v);
        for &source in &in_sources[v] {
            unprocessed_out[source] -= 1;
            if unprocessed_out[source] == 0 {
                queue.push(source);
            }
        }
    }
    debug_assert_eq!(order.len(), n, "fragmentation graph contains a cycle");
    order
}

#[cfg(test)]
mod tests {
    use fragcore::MolecularFormula;

    use super::*;
    use crate::graph::{
        GraphEdge,
        GraphNode,
    };

    /// A small hand-made graph where greedy attachment is suboptimal: the
    /// root can reach color 1 directly (weight 3) or through color 2
    /// (weights 2 + 2).
    fn diamond() -> FGraph {
        let f = |s: &str| MolecularFormula::parse(s).unwrap();
        let nodes = vec![
            GraphNode {
                color: 0,
                formula: f("C6H12O6"),
                vertex_score: 1.0,
            },
            GraphNode {
                color: 1,
                formula: f("C2H4O2"),
                vertex_score: 0.0,
            },
            GraphNode {
                color: 2,
                formula: f("C4H8O4"),
                vertex_score: 0.0,
            },
        ];
        let edges = vec![
            GraphEdge {
                source: 0,
                target: 1,
                weight: 3.0,
                loss: f("C4H8O4"),
            },
            GraphEdge {
                source: 0,
                target: 2,
                weight: 2.0,
                loss: f("C2H4O2"),
            },
            GraphEdge {
                source: 2,
                target: 1,
                weight: 2.0,
                loss: f("C2H4O2"),
            },
        ];
        build_test_graph(nodes, edges)
    }

    fn build_test_graph(nodes: Vec<GraphNode>, mut edges: Vec<GraphEdge>) -> FGraph {
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
    fn dp_finds_the_multi_branch_optimum() {
        let graph = diamond();
        let solution = solve(&graph, &[], None, Instant::now()).unwrap();
        // best: take both branches below the root (3 + 2), not the chain
        assert!((solution.score - 5.0).abs() < 1e-12);
        assert_eq!(solution.edges.len(), 2);
        assert!(solution.optimal);
    }

    #[test]
    fn each_color_is_used_at_most_once() {
        let graph = diamond();
        let solution = solve(&graph, &[], None, Instant::now()).unwrap();
        let mut used = Vec::new();
        for &e in &solution.edges {
            let color = graph.nodes[graph.edges[e].target].color;
            assert!(!used.contains(&color));
            used.push(color);
        }
    }

    #[test]
    fn banning_an_edge_reroutes_the_tree() {
        let graph = diamond();
        // ban the direct root -> color1 edge; the chain becomes optimal
        let direct = graph
            .edges
            .iter()
            .position(|e| e.source == 0 && e.target == 1)
            .unwrap();
        let solution = solve(&graph, &[direct], None, Instant::now()).unwrap();
        assert!((solution.score - 4.0).abs() < 1e-12);
        assert!(!solution.edges.contains(&direct));
    }
}
