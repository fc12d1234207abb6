//! Fragmentation graph construction.
//!
//! For one candidate precursor formula the graph holds a node per
//! (peak, sub-formula) pair, colored by peak index, with edges for every
//! chemically possible neutral loss. The graph lives only until a tree is
//! extracted from it.

use fragcore::MolecularFormula;

use crate::preprocess::{
    ProcessedInput,
    ScoredFormula,
};
use crate::scoring::ScorerSet;

#[derive(Debug, Clone)]
pub struct GraphNode {
    /// Peak index in the processed input; doubles as the node color.
    pub color: usize,
    pub formula: MolecularFormula,
    /// Sum of the fragment scorers for this (peak, formula) pair. Folded
    /// into the weight of every incoming edge.
    pub vertex_score: f64,
}

#[derive(Debug, Clone)]
pub struct GraphEdge {
    pub source: usize,
    pub target: usize,
    /// Loss score plus the target's vertex score.
    pub weight: f64,
    pub loss: MolecularFormula,
}

/// A rooted, colored DAG over candidate fragment formulas.
#[derive(Debug, Clone)]
pub struct FGraph {
    /// Neutral compound formula this graph was built for.
    pub neutral_formula: MolecularFormula,
    /// Node 0 is the root: the parent peak annotated with the measured
    /// precursor formula.
    pub nodes: Vec<GraphNode>,
    /// Sorted by source; `out_offsets` indexes runs per node.
    pub edges: Vec<GraphEdge>,
    pub(crate) out_offsets: Vec<usize>,
    /// Score of the root vertex, not part of any edge weight.
    pub root_score: f64,
}

impl FGraph {
    pub const ROOT: usize = 0;

    pub fn number_of_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn number_of_edges(&self) -> usize {
        self.edges.len()
    }

    pub fn out_edges(&self, node: usize) -> &[GraphEdge] {
        &self.edges[self.out_offsets[node]..self.out_offsets[node + 1]]
    }

    pub fn out_edge_indices(&self, node: usize) -> std::ops::Range<usize> {
        self.out_offsets[node]..self.out_offsets[node + 1]
    }

    /// Distinct colors present, root included.
    pub fn color_count(&self) -> usize {
        let mut colors: Vec<usize> = self.nodes.iter().map(|n| n.color).collect();
        colors.sort_unstable();
        colors.dedup();
        colors.len()
    }
}

/// Numeric guard for the "strictly below the parent" m/z ordering.
const MZ_EPSILON: f64 = 1e-9;

/// Build the fragmentation graph for one neutral candidate formula, or
/// `None` when the formula cannot explain the parent peak at all.
pub fn build_graph(
    input: &ProcessedInput,
    neutral_formula: &MolecularFormula,
    scorers: &ScorerSet,
) -> Option<FGraph> {
    let ion_type = &input.ion_type;
    let measured_root = ion_type.neutral_to_measured_formula(neutral_formula)?;
    let parent = input.parent_peak();
    let expected_mz = ion_type.neutral_mass_to_ion_mass(neutral_formula.mass());
    if !input
        .profile
        .allowed_mass_deviation
        .is_within(expected_mz, parent.mz)
    {
        return None;
    }

    // root score: the parent peak's own decomposition score when the
    // candidate is among them (recomputed from the mass error otherwise),
    // plus the prior of the ion mode carrying the charge
    let mass_score = parent
        .decompositions
        .candidates
        .iter()
        .find(|c| &c.formula == neutral_formula)
        .map(|c| c.score)
        .unwrap_or_else(|| {
            let sigma = input
                .profile
                .allowed_mass_deviation
                .tolerance(parent.mz)
                / 3.0;
            crate::scoring::gaussian_log_odds(expected_mz - parent.mz, sigma)
        });
    let root_score = mass_score + crate::scoring::ion_mode_prior(ion_type.ion_mode());

    let mut nodes = vec![GraphNode {
        color: input.parent_index,
        formula: measured_root.clone(),
        vertex_score: root_score,
    }];
    for (peak_index, peak) in input.peaks.iter().enumerate() {
        if peak.is_parent {
            continue;
        }
        for candidate in &peak.decompositions.candidates {
            if !candidate.formula.is_strict_subset_of(&measured_root)
                || candidate.formula.is_empty()
            {
                continue;
            }
            nodes.push(GraphNode {
                color: peak_index,
                formula: candidate.formula.clone(),
                vertex_score: scorers.score_fragment(peak, candidate),
            });
        }
    }

    let mut edges: Vec<GraphEdge> = Vec::new();
    for (source, u) in nodes.iter().enumerate() {
        let source_mz = input.peaks[u.color].mz;
        for (target, v) in nodes.iter().enumerate() {
            if source == target || v.color == u.color {
                continue;
            }
            // the parent peak sits above every fragment regardless of m/z
            let below = source == FGraph::ROOT
                || input.peaks[v.color].mz <= source_mz - MZ_EPSILON;
            if !below || !v.formula.is_strict_subset_of(&u.formula) {
                continue;
            }
            let loss = u
                .formula
                .checked_sub(&v.formula)
                .expect("subset implies subtractable");
            let weight = scorers.score_loss(&loss) + v.vertex_score;
            edges.push(GraphEdge {
                source,
                target,
                weight,
                loss,
            });
        }
    }
    edges.sort_by(|a, b| a.source.cmp(&b.source).then(a.target.cmp(&b.target)));

    let mut out_offsets = vec![0; nodes.len() + 1];
    for edge in &edges {
        out_offsets[edge.source + 1] += 1;
    }
    for i in 1..out_offsets.len() {
        out_offsets[i] += out_offsets[i - 1];
    }

    Some(FGraph {
        neutral_formula: neutral_formula.clone(),
        nodes,
        edges,
        out_offsets,
        root_score,
    })
}

#[cfg(test)]
mod tests {
    use fragcore::{
        PrecursorIonType,
        Spectrum,
    };

    use super::*;
    use crate::experiment::ExperimentBuilder;
    use crate::preprocess::preprocess;
    use crate::profile::Profile;

    fn glucose_input() -> ProcessedInput {
        let experiment = ExperimentBuilder::new()
            .name("glucose")
            .precursor_ion_type(PrecursorIonType::parse("[M+H]+").unwrap())
            .ion_mass(181.0707)
            .add_ms2(
                Spectrum::from_arrays(&[85.0284, 163.0601, 181.0706], &[0.4, 0.6, 1.0]).unwrap(),
            )
            .build()
            .unwrap();
        let profile = Profile::qtof();
        let ion = experiment.precursor_ion_type.clone();
        preprocess(&experiment, &profile, &ion).unwrap()
    }

    #[test]
    fn edges_connect_strict_supersets_to_subsets() {
        let input = glucose_input();
        let scorers = ScorerSet::from_profile(&input.profile, 0.0);
        let glucose = MolecularFormula::parse("C6H12O6").unwrap();
        let graph = build_graph(&input, &glucose, &scorers).unwrap();
        assert!(graph.number_of_nodes() > 1);
        for edge in &graph.edges {
            let source = &graph.nodes[edge.source];
            let target = &graph.nodes[edge.target];
            assert!(target.formula.is_strict_subset_of(&source.formula));
            assert_ne!(source.color, target.color);
            assert!(!edge.loss.is_empty());
        }
    }

    #[test]
    fn root_reaches_every_node() {
        let input = glucose_input();
        let scorers = ScorerSet::from_profile(&input.profile, 0.0);
        let glucose = MolecularFormula::parse("C6H12O6").unwrap();
        let graph = build_graph(&input, &glucose, &scorers).unwrap();
        let reached: Vec<usize> = graph
            .out_edges(FGraph::ROOT)
            .iter()
            .map(|e| e.target)
            .collect();
        for node in 1..graph.number_of_nodes() {
            assert!(reached.contains(&node), "node {} unreachable", node);
        }
    }

    #[test]
    fn wrong_parent_mass_yields_no_graph() {
        let input = glucose_input();
        let scorers = ScorerSet::from_profile(&input.profile, 0.0);
        // caffeine cannot explain a 181.07 precursor
        let caffeine = MolecularFormula::parse("C8H10N4O2").unwrap();
        assert!(build_graph(&input, &caffeine, &scorers).is_none());
    }
}
