//! Lazy k-best enumeration over one fragmentation graph.
//!
//! Branch-and-bound over banned-edge sets: after a solution is drawn, one
//! child subproblem per chosen edge forbids that edge on top of the current
//! bans. Scores are non-increasing along the sequence; solutions are
//! deduplicated by their (fragment, loss) formula multiset so re-derivable
//! trees only appear once.

use std::cmp::Ordering;
use std::collections::{
    BinaryHeap,
    HashSet,
};

use super::{
    Solution,
    SolverBudget,
    TreeBuilder,
};
use crate::graph::FGraph;

struct Ranked {
    solution: Solution,
    banned: Vec<usize>,
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.solution.score == other.solution.score
    }
}

impl Eq for Ranked {}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        self.solution
            .score
            .total_cmp(&other.solution.score)
            .then_with(|| other.banned.len().cmp(&self.banned.len()))
    }
}

/// Iterator over up to `k` distinct solutions in non-increasing score
/// order.
pub struct KBestSolutions<'a> {
    graph: &'a FGraph,
    builder: &'a dyn TreeBuilder,
    budget: SolverBudget,
    heap: BinaryHeap<Ranked>,
    seen: HashSet<Vec<String>>,
    remaining: usize,
}

impl<'a> KBestSolutions<'a> {
    pub fn new(
        graph: &'a FGraph,
        builder: &'a dyn TreeBuilder,
        budget: SolverBudget,
        k: usize,
    ) -> Self {
        let mut heap = BinaryHeap::new();
        if let Some(solution) = builder.solve(graph, &[], &budget) {
            heap.push(Ranked {
                solution,
                banned: Vec::new(),
            });
        }
        Self {
            graph,
            builder,
            budget,
            heap,
            seen: HashSet::new(),
            remaining: k,
        }
    }

    fn signature(&self, solution: &Solution) -> Vec<String> {
        let mut parts: Vec<String> = solution
            .edges
            .iter()
            .flat_map(|&e| {
                let edge = &self.graph.edges[e];
                [
                    self.graph.nodes[edge.target].formula.to_string(),
                    format!("loss:{}", edge.loss),
                ]
            })
            .collect();
        parts.sort();
        parts
    }
}

impl Iterator for KBestSolutions<'_> {
    type Item = Solution;

    fn next(&mut self) -> Option<Solution> {
        if self.remaining == 0 {
            return None;
        }
        while let Some(top) = self.heap.pop() {
            if !self.seen.insert(self.signature(&top.solution)) {
                continue;
            }
            // every strictly different tree misses at least one edge of
            // this one, so one child subproblem per chosen edge covers the
            // rest of the solution space
            for &edge in &top.solution.edges {
                let mut banned = top.banned.clone();
                banned.push(edge);
                if let Some(solution) = self.builder.solve(self.graph, &banned, &self.budget) {
                    self.heap.push(Ranked { solution, banned });
                }
            }
            self.remaining -= 1;
            return Some(top.solution);
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use fragcore::{
        MolecularFormula,
        PrecursorIonType,
        Spectrum,
    };

    use super::super::DefaultTreeBuilder;
    use super::*;
    use crate::experiment::ExperimentBuilder;
    use crate::graph::build_graph;
    use crate::preprocess::preprocess;
    use crate::profile::Profile;
    use crate::scoring::ScorerSet;

    fn glucose_graph() -> FGraph {
        let experiment = ExperimentBuilder::new()
            .precursor_ion_type(PrecursorIonType::parse("[M+H]+").unwrap())
            .ion_mass(181.0707)
            .add_ms2(
                Spectrum::from_arrays(
                    &[71.0128, 85.0284, 97.0284, 127.0390, 163.0601, 181.0706],
                    &[0.2, 0.4, 0.3, 0.25, 0.6, 1.0],
                )
                .unwrap(),
            )
            .build()
            .unwrap();
        let profile = Profile::qtof();
        let ion = experiment.precursor_ion_type.clone();
        let input = preprocess(&experiment, &profile, &ion).unwrap();
        let scorers = ScorerSet::from_profile(&profile, 0.5);
        let glucose = MolecularFormula::parse("C6H12O6").unwrap();
        build_graph(&input, &glucose, &scorers).unwrap()
    }

    #[test]
    fn scores_are_non_increasing_and_distinct() {
        let graph = glucose_graph();
        let builder = DefaultTreeBuilder::default();
        let solutions: Vec<Solution> =
            KBestSolutions::new(&graph, &builder, SolverBudget::default(), 4).collect();
        assert!(!solutions.is_empty());
        for pair in solutions.windows(2) {
            assert!(pair[0].score >= pair[1].score - 1e-12);
        }
        let mut signatures: Vec<Vec<usize>> = solutions
            .iter()
            .map(|s| {
                let mut edges = s.edges.clone();
                edges.sort_unstable();
                edges
            })
            .collect();
        signatures.sort();
        signatures.dedup();
        assert_eq!(signatures.len(), solutions.len());
    }

    #[test]
    fn first_solution_is_the_optimum() {
        let graph = glucose_graph();
        let builder = DefaultTreeBuilder::default();
        let direct = builder
            .solve(&graph, &[], &SolverBudget::default())
            .unwrap();
        let first = KBestSolutions::new(&graph, &builder, SolverBudget::default(), 1)
            .next()
            .unwrap();
        assert!((first.score - direct.score).abs() < 1e-12);
    }

    #[test]
    fn k_limits_the_sequence() {
        let graph = glucose_graph();
        let builder = DefaultTreeBuilder::default();
        let count = KBestSolutions::new(&graph, &builder, SolverBudget::default(), 2).count();
        assert!(count <= 2);
    }
}
