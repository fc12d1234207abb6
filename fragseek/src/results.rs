use fragcore::{
    MolecularFormula,
    PrecursorIonType,
};
use serde::Serialize;

use crate::errors::{
    FragSeekError,
    Result,
};
use crate::identify::ISOTOPE_SCORE_NAME;
use crate::tree::FTree;

/// One ranked identification: a neutral formula with the tree that explains
/// the fragmentation spectrum under it.
///
/// `tree` is `None` only for infeasible single-formula computations, which
/// report rank 0.
#[derive(Debug, Clone, Serialize)]
pub struct IdentificationResult {
    pub rank: usize,
    /// Neutral compound formula (the tree root, neutralized).
    pub formula: MolecularFormula,
    pub ion_type: PrecursorIonType,
    /// Composite overall score including any additional scores.
    pub score: f64,
    pub tree: Option<FTree>,
}

impl IdentificationResult {
    pub fn from_tree(rank: usize, tree: FTree) -> Result<Self> {
        let formula = tree.neutral_root_formula().ok_or_else(|| {
            FragSeekError::internal("tree root cannot be neutralized under its ion type")
        })?;
        Ok(Self {
            rank,
            formula,
            ion_type: tree.ion_type.clone(),
            score: tree.overall_score(),
            tree: Some(tree),
        })
    }

    /// An infeasible result: no tree could be built for the formula.
    pub fn infeasible(formula: MolecularFormula, ion_type: PrecursorIonType) -> Self {
        Self {
            rank: 0,
            formula,
            ion_type,
            score: f64::NEG_INFINITY,
            tree: None,
        }
    }

    pub fn tree_size(&self) -> usize {
        self.tree.as_ref().map_or(0, FTree::number_of_vertices)
    }

    pub fn explained_intensity(&self) -> f64 {
        self.tree
            .as_ref()
            .map_or(0.0, FTree::explained_intensity_ratio)
    }

    pub fn isotope_score(&self) -> Option<f64> {
        self.tree
            .as_ref()
            .and_then(|t| t.additional_score(ISOTOPE_SCORE_NAME))
    }
}
