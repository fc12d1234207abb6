//! Fragmentation trees and their scoring record.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use fragcore::{
    MolecularFormula,
    PrecursorIonType,
};
use serde::Serialize;

use crate::errors::{
    FragSeekError,
    Result,
};
use crate::graph::FGraph;

/// Tolerance for the post-construction score re-verification.
pub const SCORE_VERIFICATION_EPSILON: f64 = 1e-9;

/// One explained peak inside a tree.
#[derive(Debug, Clone, Serialize)]
pub struct Fragment {
    pub formula: MolecularFormula,
    pub mz: f64,
    pub relative_intensity: f64,
    /// Peak index (color) in the processed input.
    pub color: usize,
    /// Index of the parent fragment; `None` for the root.
    pub parent: Option<usize>,
    /// Neutral loss on the incoming edge; `None` for the root.
    pub incoming_loss: Option<MolecularFormula>,
    /// Weight of the incoming edge; zero for the root.
    pub incoming_weight: f64,
}

/// Aggregate scoring of a tree. `overall_score` is always
/// `root_score + sum of edge weights + sum of additional scores`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TreeScoring {
    pub root_score: f64,
    pub overall_score: f64,
    /// Per-category extras such as `"isotope"`.
    pub additional: BTreeMap<String, f64>,
    /// Share of the total fragment intensity explained by this tree.
    pub explained_intensity: f64,
}

/// A solved fragmentation tree. Owns all of its data; the graph it came
/// from is gone by the time callers see it.
#[derive(Debug, Clone, Serialize)]
pub struct FTree {
    pub ion_type: PrecursorIonType,
    /// Parents precede children; fragment 0 is the root.
    pub fragments: Vec<Fragment>,
    pub scoring: TreeScoring,
    pub recalibrated: bool,
    /// False when the solver hit its budget and returned a best-effort
    /// tree.
    pub optimal: bool,
}

impl FTree {
    /// Measured (ionized backbone) formula of the root.
    pub fn root_formula(&self) -> &MolecularFormula {
        &self.fragments[0].formula
    }

    /// Neutral compound formula of the root.
    pub fn neutral_root_formula(&self) -> Option<MolecularFormula> {
        self.ion_type
            .measured_to_neutral_formula(self.root_formula())
    }

    pub fn number_of_vertices(&self) -> usize {
        self.fragments.len()
    }

    pub fn overall_score(&self) -> f64 {
        self.scoring.overall_score
    }

    pub fn explained_intensity_ratio(&self) -> f64 {
        self.scoring.explained_intensity
    }

    /// Set a named additional score, keeping `overall_score` consistent.
    pub fn set_additional_score(&mut self, name: &str, value: f64) {
        let previous = self
            .scoring
            .additional
            .insert(name.to_string(), value)
            .unwrap_or(0.0);
        self.scoring.overall_score += value - previous;
    }

    pub fn additional_score(&self, name: &str) -> Option<f64> {
        self.scoring.additional.get(name).copied()
    }

    /// Recompute the overall score from the parts stored on the tree.
    pub fn recompute_overall_score(&self) -> f64 {
        self.scoring.root_score
            + self
                .fragments
                .iter()
                .map(|f| f.incoming_weight)
                .sum::<f64>()
            + self.scoring.additional.values().sum::<f64>()
    }

    /// Check that every structural invariant holds: strict-subset edges,
    /// unique colors and a consistent overall score.
    pub fn verify(&self) -> Result<()> {
        let mut colors: Vec<usize> = self.fragments.iter().map(|f| f.color).collect();
        colors.sort_unstable();
        let unique_before = colors.len();
        colors.dedup();
        if colors.len() != unique_before {
            return Err(FragSeekError::internal(
                "tree uses one peak color twice".to_string(),
            ));
        }
        for (i, fragment) in self.fragments.iter().enumerate() {
            if let Some(parent) = fragment.parent {
                if parent >= i {
                    return Err(FragSeekError::internal(
                        "tree fragments are not in parent-first order",
                    ));
                }
                let parent_formula = &self.fragments[parent].formula;
                if !fragment.formula.is_strict_subset_of(parent_formula) {
                    return Err(FragSeekError::internal(format!(
                        "fragment {} is not a strict subset of its parent {}",
                        fragment.formula, parent_formula
                    )));
                }
            }
        }
        let recomputed = self.recompute_overall_score();
        if (recomputed - self.scoring.overall_score).abs() >= SCORE_VERIFICATION_EPSILON {
            return Err(FragSeekError::internal(format!(
                "stored overall score {} disagrees with recomputed {}",
                self.scoring.overall_score, recomputed
            )));
        }
        Ok(())
    }

    /// Re-sum the tree's edges against the graph it was extracted from.
    /// Any mismatch means the solver produced an inconsistent solution.
    pub fn verify_against_graph(&self, graph: &FGraph) -> Result<()> {
        let mut score = self.scoring.root_score;
        for fragment in &self.fragments {
            let Some(parent) = fragment.parent else {
                continue;
            };
            let parent_fragment = &self.fragments[parent];
            let source = graph
                .nodes
                .iter()
                .position(|n| n.formula == parent_fragment.formula && n.color == parent_fragment.color)
                .ok_or_else(|| FragSeekError::internal("tree fragment missing from graph"))?;
            let edge = graph
                .out_edges(source)
                .iter()
                .find(|e| {
                    graph.nodes[e.target].formula == fragment.formula
                        && graph.nodes[e.target].color == fragment.color
                })
                .ok_or_else(|| FragSeekError::internal("tree edge missing from graph"))?;
            score += edge.weight;
        }
        let stored = self.scoring.overall_score
            - self.scoring.additional.values().sum::<f64>();
        if (score - stored).abs() >= SCORE_VERIFICATION_EPSILON {
            return Err(FragSeekError::internal(format!(
                "tree score {} disagrees with graph re-sum {}",
                stored, score
            )));
        }
        Ok(())
    }

    /// Canonical multiset of fragment and loss formulas; two trees are the
    /// same explanation iff their signatures match.
    pub fn signature(&self) -> Vec<String> {
        let mut parts: Vec<String> = self
            .fragments
            .iter()
            .map(|f| f.formula.to_string())
            .collect();
        parts.extend(
            self.fragments
                .iter()
                .filter_map(|f| f.incoming_loss.as_ref())
                .map(|l| format!("loss:{}", l)),
        );
        parts.sort();
        parts
    }

    /// GraphViz rendering with fragments as boxes and losses on the edges.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("strict digraph {\n");
        for (i, fragment) in self.fragments.iter().enumerate() {
            let _ = writeln!(
                out,
                "  v{} [label=\"{}\\n{:.4}\"];",
                i, fragment.formula, fragment.mz
            );
        }
        for (i, fragment) in self.fragments.iter().enumerate() {
            if let (Some(parent), Some(loss)) = (fragment.parent, &fragment.incoming_loss) {
                let _ = writeln!(out, "  v{} -> v{} [label=\"{}\"];", parent, i, loss);
            }
        }
        out.push_str("}\n");
        out
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toy_tree() -> FTree {
        let glucose = MolecularFormula::parse("C6H12O6").unwrap();
        let rest = MolecularFormula::parse("C6H10O5").unwrap();
        let water = MolecularFormula::parse("H2O").unwrap();
        FTree {
            ion_type: PrecursorIonType::parse("[M+H]+").unwrap(),
            fragments: vec![
                Fragment {
                    formula: glucose,
                    mz: 181.0707,
                    relative_intensity: 1.0,
                    color: 2,
                    parent: None,
                    incoming_loss: None,
                    incoming_weight: 0.0,
                },
                Fragment {
                    formula: rest,
                    mz: 163.0601,
                    relative_intensity: 0.6,
                    color: 1,
                    parent: Some(0),
                    incoming_loss: Some(water),
                    incoming_weight: 5.5,
                },
            ],
            scoring: TreeScoring {
                root_score: 4.0,
                overall_score: 9.5,
                additional: BTreeMap::new(),
                explained_intensity: 1.0,
            },
            recalibrated: false,
            optimal: true,
        }
    }

    #[test]
    fn verify_accepts_a_consistent_tree() {
        toy_tree().verify().unwrap();
    }

    #[test]
    fn verify_rejects_score_drift() {
        let mut tree = toy_tree();
        tree.scoring.overall_score += 1e-6;
        assert!(tree.verify().is_err());
    }

    #[test]
    fn verify_rejects_duplicate_colors() {
        let mut tree = toy_tree();
        tree.fragments[1].color = 2;
        assert!(tree.verify().is_err());
    }

    #[test]
    fn additional_scores_keep_overall_consistent() {
        let mut tree = toy_tree();
        tree.set_additional_score("isotope", 3.25);
        assert!((tree.overall_score() - 12.75).abs() < 1e-12);
        tree.set_additional_score("isotope", 1.0);
        assert!((tree.overall_score() - 10.5).abs() < 1e-12);
        tree.verify().unwrap();
    }

    #[test]
    fn signature_ignores_tree_shape_details() {
        let tree = toy_tree();
        let mut expected = vec![
            "C6H12O6".to_string(),
            "C6H10O5".to_string(),
            "loss:H2O".to_string(),
        ];
        expected.sort();
        assert_eq!(tree.signature(), expected);
    }

    #[test]
    fn dot_output_mentions_every_fragment() {
        let dot = toy_tree().to_dot();
        assert!(dot.contains("C6H12O6"));
        assert!(dot.contains("H2O"));
    }
}
