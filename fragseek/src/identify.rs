//! The identification pipeline.
//!
//! `identify` drives the whole chain: MS1 isotope filtering, candidate
//! selection, parallel k-best tree computation with the adaptive tree-size
//! loop, optional recalibration and final ranking. The tree-size bonus is
//! threaded through each iteration as a plain value; the profile itself is
//! never touched, so restoration on every exit path is structural rather
//! than something a `finally` block has to guarantee.

use std::collections::BTreeMap;
use std::sync::Arc;

use fragcore::isotopes::simulate_pattern;
use fragcore::{
    FormulaConstraints,
    MassDecomposer,
    MassDeviation,
    MolecularFormula,
    PrecursorIonType,
    Spectrum,
};
use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::{
    debug,
    info,
};

use crate::errors::{
    FragSeekError,
    Result,
};
use crate::experiment::Ms2Experiment;
use crate::graph::build_graph;
use crate::ms1::{
    analyze_ms1,
    filter_candidates,
    IsotopePattern,
    MAX_ISOTOPE_PEAKS,
};
use crate::preprocess::{
    preprocess,
    ProcessedInput,
};
use crate::profile::{
    IsotopeHandling,
    Profile,
};
use crate::results::IdentificationResult;
use crate::scoring::ScorerSet;
use crate::solve::{
    materialize,
    DefaultTreeBuilder,
    SolverBudget,
    TreeBuilder,
};
use crate::tree::FTree;

/// Key of the isotope contribution in a tree's additional scores.
pub const ISOTOPE_SCORE_NAME: &str = "isotope";

const MAX_TREESIZE_INCREASE: f64 = 3.0;
const TREE_SIZE_INCREASE: f64 = 1.0;
const MIN_NUMBER_OF_EXPLAINED_PEAKS: usize = 15;
const MIN_EXPLAINED_INTENSITY: f64 = 0.7;
/// Below this best pattern score the isotope analysis is not trusted to
/// *filter* candidates (scores are still added in score mode).
const MIN_ISOTOPE_FILTER_SCORE: f64 = 10.0;

/// Callback for long-running computations.
pub trait ProgressObserver: Send + Sync {
    fn update(&self, done: usize, total: usize, label: &str);
}

/// Options for one `identify` call.
#[derive(Debug, Clone)]
pub struct IdentifyOptions {
    /// Maximum number of candidates to report.
    pub candidates: usize,
    /// Run a second tree-computation pass after mass recalibration.
    pub recalibrate: bool,
    /// Override of the profile's isotope handling.
    pub isotope_handling: Option<IsotopeHandling>,
    /// When non-empty, only these neutral formulas are considered.
    pub white_list: Vec<MolecularFormula>,
}

impl Default for IdentifyOptions {
    fn default() -> Self {
        Self {
            candidates: 5,
            recalibrate: true,
            isotope_handling: None,
            white_list: Vec::new(),
        }
    }
}

/// The pipeline orchestrator. Owns an immutable profile; every
/// identification works on local copies only.
pub struct Identifier {
    profile: Profile,
    builder: DefaultTreeBuilder,
    budget: SolverBudget,
    observer: Option<Arc<dyn ProgressObserver>>,
}

impl Identifier {
    pub fn new(profile: Profile) -> Self {
        Self {
            profile,
            builder: DefaultTreeBuilder::default(),
            budget: SolverBudget::default(),
            observer: None,
        }
    }

    pub fn with_solver_budget(mut self, budget: SolverBudget) -> Self {
        self.budget = budget;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    fn effective_profile(&self, experiment: &Ms2Experiment) -> Profile {
        experiment.profile.clone().unwrap_or_else(|| self.profile.clone())
    }

    fn worker_pool(&self, profile: &Profile) -> Result<ThreadPool> {
        rayon::ThreadPoolBuilder::new()
            .num_threads(profile.parallelism.max(1))
            .build()
            .map_err(|e| FragSeekError::internal(format!("cannot build worker pool: {}", e)))
    }

    /// Identify the molecular formula of the measured compound.
    pub fn identify(
        &self,
        experiment: &Ms2Experiment,
        options: &IdentifyOptions,
    ) -> Result<Vec<IdentificationResult>> {
        let profile = self.effective_profile(experiment);
        let isotope_mode = options
            .isotope_handling
            .unwrap_or(profile.isotope_handling);
        let mut experiment = experiment.clone();
        experiment.validate()?;
        let ion_type = experiment.precursor_ion_type.clone();
        if ion_type.is_unknown() {
            return Err(FragSeekError::invalid_input(
                "precursor ion type is unknown, use identify_precursor_and_ionization",
            ));
        }

        let patterns = self.look_at_ms1(
            &mut experiment,
            &profile,
            &ion_type,
            isotope_mode != IsotopeHandling::Omit,
        )?;
        let (iso_formulas, best_iso_score) = patterns
            .first()
            .map(filter_candidates)
            .unwrap_or_default();

        let input = preprocess(&experiment, &profile, &ion_type)?;
        let use_filter =
            !iso_formulas.is_empty() && best_iso_score > MIN_ISOTOPE_FILTER_SCORE;

        let mut candidates: Vec<MolecularFormula> = input
            .parent_decompositions()
            .candidates
            .iter()
            .map(|c| c.formula.clone())
            .collect();
        if use_filter {
            candidates.retain(|f| iso_formulas.contains_key(f));
        }
        if !options.white_list.is_empty() {
            candidates.retain(|f| options.white_list.contains(f));
        }

        let mut max_candidates = if use_filter {
            iso_formulas.len()
        } else {
            input.parent_decompositions().candidates.len()
        };
        if !options.white_list.is_empty() {
            max_candidates = max_candidates.min(options.white_list.len());
        }
        let output_size = max_candidates.min(options.candidates);
        let compute_n = output_size.max(5);
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let pool = self.worker_pool(&profile)?;
        let original_tree_size = profile.tree_size_score;
        let max_tree_size = original_tree_size + MAX_TREESIZE_INCREASE;
        let mut tree_size = original_tree_size;

        let mut kept: Vec<FTree>;
        loop {
            let scorers = ScorerSet::from_profile(&profile, tree_size);
            // compute_n bounds the tree computation effort only; the set
            // that is kept, judged for sufficiency and recalibrated stays
            // bounded by the requested output size
            let mut trees =
                self.compute_trees(&pool, &input, &candidates, &scorers, compute_n)?;
            if isotope_mode == IsotopeHandling::Score {
                for tree in &mut trees {
                    add_isotope_score(&iso_formulas, tree);
                }
            }
            sort_trees(&mut trees);
            trees.truncate(output_size);

            if tree_size >= max_tree_size - 1e-9 || trees.iter().any(is_sufficient) {
                kept = trees;
                break;
            }
            info!(
                tree_size,
                "not enough peaks were explained, repeating with a larger tree size bonus"
            );
            tree_size += TREE_SIZE_INCREASE;
        }

        if options.recalibrate {
            for tree in &mut kept {
                if let Some(mut recalibrated) =
                    self.recalibrate_tree(tree, &input, &profile, tree_size)?
                {
                    if isotope_mode == IsotopeHandling::Score {
                        add_isotope_score(&iso_formulas, &mut recalibrated);
                    }
                    *tree = recalibrated;
                }
            }
        }

        sort_trees(&mut kept);
        kept.truncate(output_size);
        let mut results = Vec::with_capacity(kept.len());
        for (index, tree) in kept.into_iter().enumerate() {
            tree.verify()?;
            results.push(IdentificationResult::from_tree(index + 1, tree)?);
        }
        Ok(results)
    }

    /// Like [`Self::identify`], but tries every known ion mode for the
    /// experiment's charge and ranks all trees together. White lists are not
    /// accepted here: a neutral candidate formula determines its own
    /// ionization.
    pub fn identify_precursor_and_ionization(
        &self,
        experiment: &Ms2Experiment,
        options: &IdentifyOptions,
    ) -> Result<Vec<IdentificationResult>> {
        if !options.white_list.is_empty() {
            return Err(FragSeekError::invalid_input(
                "identify_precursor_and_ionization does not accept a white list",
            ));
        }
        let profile = self.effective_profile(experiment);
        let isotope_mode = options
            .isotope_handling
            .unwrap_or(profile.isotope_handling);
        let mut experiment = experiment.clone();
        experiment.validate()?;

        let base_ion = experiment.precursor_ion_type.clone();
        let ion_types = if base_ion.is_unknown() {
            PrecursorIonType::known_for_charge(base_ion.charge())
        } else {
            vec![base_ion.clone()]
        };

        // the monoisotopic m/z does not depend on the adduct, so any ion
        // type serves for deriving a missing precursor mass
        self.look_at_ms1(&mut experiment, &profile, &ion_types[0], false)?;

        struct ModeContext {
            input: ProcessedInput,
            iso_formulas: BTreeMap<MolecularFormula, f64>,
            best_iso_score: f64,
        }
        let mut contexts = Vec::with_capacity(ion_types.len());
        for ion_type in &ion_types {
            let mut mode_experiment = experiment.clone();
            mode_experiment.precursor_ion_type = ion_type.clone();
            mode_experiment.neutral_formula = None;
            let patterns = if isotope_mode != IsotopeHandling::Omit {
                analyze_ms1(&mode_experiment, &profile, ion_type, mode_experiment.ion_mass)?
            } else {
                Vec::new()
            };
            let (iso_formulas, best_iso_score) = patterns
                .first()
                .map(filter_candidates)
                .unwrap_or_default();
            let input = preprocess(&mode_experiment, &profile, ion_type)?;
            contexts.push(ModeContext {
                input,
                iso_formulas,
                best_iso_score,
            });
        }

        let pool = self.worker_pool(&profile)?;
        let bound = options.candidates.max(1);
        let original_tree_size = profile.tree_size_score;
        let max_tree_size = original_tree_size + MAX_TREESIZE_INCREASE;
        let mut tree_size = original_tree_size;

        let mut kept: Vec<FTree>;
        loop {
            let scorers = ScorerSet::from_profile(&profile, tree_size);
            let mut all = Vec::new();
            for context in &contexts {
                let use_filter = !context.iso_formulas.is_empty()
                    && context.best_iso_score > MIN_ISOTOPE_FILTER_SCORE;
                let mut candidates: Vec<MolecularFormula> = context
                    .input
                    .parent_decompositions()
                    .candidates
                    .iter()
                    .map(|c| c.formula.clone())
                    .collect();
                if use_filter {
                    candidates.retain(|f| context.iso_formulas.contains_key(f));
                }
                let mut trees =
                    self.compute_trees(&pool, &context.input, &candidates, &scorers, bound)?;
                if isotope_mode == IsotopeHandling::Score {
                    for tree in &mut trees {
                        add_isotope_score(&context.iso_formulas, tree);
                    }
                }
                all.extend(trees);
            }
            sort_trees(&mut all);
            all.truncate(bound);

            if tree_size >= max_tree_size - 1e-9 || all.iter().any(is_sufficient) {
                kept = all;
                break;
            }
            info!(
                tree_size,
                "not enough peaks were explained, repeating with a larger tree size bonus"
            );
            tree_size += TREE_SIZE_INCREASE;
        }

        if options.recalibrate {
            for tree in &mut kept {
                let context = contexts
                    .iter()
                    .zip(&ion_types)
                    .find(|(_, ion_type)| **ion_type == tree.ion_type)
                    .map(|(context, _)| context);
                let Some(context) = context else { continue };
                if let Some(mut recalibrated) =
                    self.recalibrate_tree(tree, &context.input, &profile, tree_size)?
                {
                    if isotope_mode == IsotopeHandling::Score {
                        add_isotope_score(&context.iso_formulas, &mut recalibrated);
                    }
                    *tree = recalibrated;
                }
            }
        }

        sort_trees(&mut kept);
        kept.truncate(options.candidates);
        let mut results = Vec::with_capacity(kept.len());
        for (index, tree) in kept.into_iter().enumerate() {
            tree.verify()?;
            results.push(IdentificationResult::from_tree(index + 1, tree)?);
        }
        Ok(results)
    }

    /// Compute the fragmentation tree for one known neutral formula,
    /// running the same adaptive tree-size loop. Reports rank 0 and a
    /// `None` tree when no feasible tree exists.
    pub fn compute(
        &self,
        experiment: &Ms2Experiment,
        formula: &MolecularFormula,
        recalibrate: bool,
    ) -> Result<IdentificationResult> {
        let profile = self.effective_profile(experiment);
        let mut experiment = experiment.clone();
        let ion_type = experiment.precursor_ion_type.clone();
        if ion_type.is_unknown() {
            return Err(FragSeekError::invalid_input(
                "precursor ion type is unknown, use identify_precursor_and_ionization",
            ));
        }
        if experiment.ion_mass == 0.0 {
            experiment.ion_mass = ion_type.neutral_mass_to_ion_mass(formula.mass());
        }
        experiment.validate()?;
        let input = preprocess(&experiment, &profile, &ion_type)?;

        let original_tree_size = profile.tree_size_score;
        let max_tree_size = original_tree_size + MAX_TREESIZE_INCREASE;
        let mut tree_size = original_tree_size;

        let mut found: FTree;
        loop {
            let scorers = ScorerSet::from_profile(&profile, tree_size);
            let Some(graph) = build_graph(&input, formula, &scorers) else {
                return Ok(IdentificationResult::infeasible(formula.clone(), ion_type));
            };
            let Some(solution) = self.builder.solve(&graph, &[], &self.budget) else {
                return Ok(IdentificationResult::infeasible(formula.clone(), ion_type));
            };
            let tree = materialize(&graph, &input, &solution)?;
            if tree_size >= max_tree_size - 1e-9 || is_sufficient(&tree) {
                found = tree;
                break;
            }
            debug!(tree_size, "tree too small, raising the tree size bonus");
            tree_size += TREE_SIZE_INCREASE;
        }

        if recalibrate {
            if let Some(recalibrated) =
                self.recalibrate_tree(&found, &input, &profile, tree_size)?
            {
                found = recalibrated;
            }
        }
        found.verify()?;
        IdentificationResult::from_tree(0, found)
    }

    /// Formula constraints in effect for an experiment. No element
    /// prediction model is attached in the core, so this is the profile's
    /// constraint set.
    pub fn predict_elements(&self, experiment: &Ms2Experiment) -> Result<FormulaConstraints> {
        let profile = self.effective_profile(experiment);
        experiment.validate()?;
        Ok(profile.formula_constraints)
    }

    /// All neutral formulas whose ionized mass lies within the deviation of
    /// the measured ion mass.
    pub fn decompose(
        &self,
        ion_mass: f64,
        ion_type: &PrecursorIonType,
        constraints: &FormulaConstraints,
        deviation: Option<MassDeviation>,
    ) -> Vec<MolecularFormula> {
        let deviation = deviation.unwrap_or(self.profile.allowed_mass_deviation);
        MassDecomposer::new(constraints.clone())
            .decompose(ion_type.ion_mass_to_neutral_mass(ion_mass), deviation)
    }

    /// Theoretical isotope pattern of an ionized compound.
    pub fn simulate_isotope_pattern(
        &self,
        formula: &MolecularFormula,
        ion_type: &PrecursorIonType,
    ) -> Spectrum {
        simulate_pattern(formula, ion_type, MAX_ISOTOPE_PEAKS)
    }

    /// Check the MS1 spectrum, deriving the precursor mass from it when the
    /// experiment does not provide one. Exactly one positive-scoring
    /// pattern is required for derivation.
    fn look_at_ms1(
        &self,
        experiment: &mut Ms2Experiment,
        profile: &Profile,
        ion_type: &PrecursorIonType,
        deisotope: bool,
    ) -> Result<Vec<IsotopePattern>> {
        if experiment.ion_mass == 0.0 {
            let patterns = analyze_ms1(experiment, profile, ion_type, 0.0)?;
            if patterns.is_empty() {
                return Err(FragSeekError::invalid_input(format!(
                    "{}: Please provide the parentmass of the measured compound",
                    experiment.name
                )));
            }
            let chosen = if patterns.len() > 1 {
                let mut positive = patterns.iter().filter(|p| p.best_score() >= 0.0);
                match (positive.next(), positive.next()) {
                    (Some(pattern), None) => pattern.clone(),
                    _ => {
                        return Err(FragSeekError::AmbiguousIsotopePattern {
                            message: format!(
                                "{}: Please provide the parentmass of the measured compound",
                                experiment.name
                            ),
                        });
                    }
                }
            } else {
                patterns[0].clone()
            };
            experiment.ion_mass = chosen.monoisotopic_mz;
            return Ok(if deisotope { vec![chosen] } else { Vec::new() });
        }
        if deisotope {
            analyze_ms1(experiment, profile, ion_type, experiment.ion_mass)
        } else {
            Ok(Vec::new())
        }
    }

    /// One optimal tree per candidate formula, computed on the worker pool
    /// and reduced to the `max_trees` best by tree score. Candidates with
    /// no feasible graph drop out silently.
    fn compute_trees(
        &self,
        pool: &ThreadPool,
        input: &ProcessedInput,
        candidates: &[MolecularFormula],
        scorers: &ScorerSet,
        max_trees: usize,
    ) -> Result<Vec<FTree>> {
        let computed: Vec<Result<Option<FTree>>> = pool.install(|| {
            candidates
                .par_iter()
                .map(|formula| {
                    let Some(graph) = build_graph(input, formula, scorers) else {
                        return Ok(None);
                    };
                    let Some(solution) = self.builder.solve(&graph, &[], &self.budget) else {
                        return Ok(None);
                    };
                    materialize(&graph, input, &solution).map(Some)
                })
                .collect()
        });
        let total = candidates.len();
        let mut trees = Vec::new();
        for result in computed {
            if let Some(tree) = result? {
                if let Some(observer) = &self.observer {
                    observer.update(trees.len() + 1, total, &tree.root_formula().to_string());
                }
                trees.push(tree);
            }
        }
        sort_trees(&mut trees);
        trees.truncate(max_trees);
        Ok(trees)
    }

    /// Fit a recalibration from the tree's peaks and recompute the tree on
    /// the corrected experiment. `None` when no fit was possible or the
    /// corrected graph is infeasible.
    fn recalibrate_tree(
        &self,
        tree: &FTree,
        input: &ProcessedInput,
        profile: &Profile,
        tree_size: f64,
    ) -> Result<Option<FTree>> {
        let Some(recalibration) =
            crate::recalibrate::fit_recalibration(tree, input, &profile.recalibration)
        else {
            return Ok(None);
        };
        let corrected = recalibration.apply_to_experiment(&input.experiment);
        let corrected_input = preprocess(&corrected, profile, &input.ion_type)?;
        let scorers = ScorerSet::from_profile(profile, tree_size);
        let Some(neutral) = tree.neutral_root_formula() else {
            return Ok(None);
        };
        let Some(graph) = build_graph(&corrected_input, &neutral, &scorers) else {
            return Ok(None);
        };
        let Some(solution) = self.builder.solve(&graph, &[], &self.budget) else {
            return Ok(None);
        };
        let mut recalibrated = materialize(&graph, &corrected_input, &solution)?;
        recalibrated.recalibrated = true;
        Ok(Some(recalibrated))
    }
}

fn is_sufficient(tree: &FTree) -> bool {
    tree.number_of_vertices() >= MIN_NUMBER_OF_EXPLAINED_PEAKS
        || tree.explained_intensity_ratio() >= MIN_EXPLAINED_INTENSITY
}

/// Overall score descending, canonical root formula string ascending on
/// ties. Keeps the final ranking deterministic across thread counts.
fn sort_trees(trees: &mut [FTree]) {
    trees.sort_by(|a, b| {
        b.overall_score()
            .total_cmp(&a.overall_score())
            .then_with(|| a.root_formula().cmp(b.root_formula()))
    });
}

fn add_isotope_score(iso_formulas: &BTreeMap<MolecularFormula, f64>, tree: &mut FTree) {
    let Some(neutral) = tree.neutral_root_formula() else {
        return;
    };
    if let Some(&score) = iso_formulas.get(&neutral) {
        tree.set_additional_score(ISOTOPE_SCORE_NAME, score);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::{
        Fragment,
        TreeScoring,
    };

    fn tree_with_score(formula: &str, score: f64) -> FTree {
        FTree {
            ion_type: PrecursorIonType::parse("[M+H]+").unwrap(),
            fragments: vec![Fragment {
                formula: MolecularFormula::parse(formula).unwrap(),
                mz: 0.0,
                relative_intensity: 0.0,
                color: 0,
                parent: None,
                incoming_loss: None,
                incoming_weight: 0.0,
            }],
            scoring: TreeScoring {
                root_score: score,
                overall_score: score,
                additional: Default::default(),
                explained_intensity: 0.0,
            },
            recalibrated: false,
            optimal: true,
        }
    }

    #[test]
    fn ties_break_by_formula_string() {
        let mut trees = vec![
            tree_with_score("C7H14O6", 5.0),
            tree_with_score("C6H12O6", 5.0),
            tree_with_score("C5H10O5", 7.0),
        ];
        sort_trees(&mut trees);
        assert_eq!(trees[0].root_formula().to_string(), "C5H10O5");
        assert_eq!(trees[1].root_formula().to_string(), "C6H12O6");
        assert_eq!(trees[2].root_formula().to_string(), "C7H14O6");
    }

    #[test]
    fn isotope_score_only_lands_on_listed_roots() {
        let mut iso = BTreeMap::new();
        iso.insert(MolecularFormula::parse("C6H12O6").unwrap(), 12.5);
        let mut hit = tree_with_score("C6H12O6", 5.0);
        let mut miss = tree_with_score("C7H14O6", 5.0);
        add_isotope_score(&iso, &mut hit);
        add_isotope_score(&iso, &mut miss);
        assert_eq!(hit.additional_score(ISOTOPE_SCORE_NAME), Some(12.5));
        assert!((hit.overall_score() - 17.5).abs() < 1e-12);
        assert_eq!(miss.additional_score(ISOTOPE_SCORE_NAME), None);
    }
}
