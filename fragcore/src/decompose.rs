//! Mass decomposition: enumerate every molecular formula over a constrained
//! alphabet whose monoisotopic mass falls inside a deviation window.
//!
//! Uses the extended-residue-table round-robin construction (Böcker &
//! Lipták) over integer masses at a fixed discretization, then an exact
//! real-mass filter on every enumerated candidate.

use std::fmt::Display;

use serde::de::Error as _;
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};

use crate::deviation::MassDeviation;
use crate::element::{
    ElementId,
    PeriodicTable,
};
use crate::errors::ChemError;
use crate::formula::MolecularFormula;

/// Integer units per Da. Chosen so that rounding errors stay far below the
/// per-atom slack added to the query window.
const BLOWUP: f64 = 5963.337687;

/// A chemical alphabet with per-element upper bounds and an RDBE filter
/// window.
#[derive(Debug, Clone, PartialEq)]
pub struct FormulaConstraints {
    alphabet: Vec<ElementId>,
    upper_bounds: Vec<Option<u16>>,
    rdbe_min: f64,
    rdbe_max: f64,
}

impl FormulaConstraints {
    /// Parse a constraint string such as `CHNOPS[20]` or `CHNOP[5]S[20]`.
    /// A bracketed number bounds the element right before it; unbounded
    /// elements may occur any number of times.
    pub fn parse(input: &str) -> Result<Self, ChemError> {
        let table = PeriodicTable::global();
        let invalid = |message: String| ChemError::InvalidConstraints {
            input: input.to_string(),
            message,
        };
        let mut alphabet = Vec::new();
        let mut upper_bounds = Vec::new();
        let mut chars = input.chars().peekable();
        while let Some(c) = chars.next() {
            if !c.is_ascii_uppercase() {
                return Err(invalid(format!("unexpected character '{}'", c)));
            }
            let mut symbol = String::from(c);
            while let Some(&next) = chars.peek() {
                if next.is_ascii_lowercase() {
                    symbol.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            let id = table
                .by_symbol(&symbol)
                .ok_or(ChemError::UnknownElement { symbol })?;
            let mut bound = None;
            if chars.peek() == Some(&'[') {
                chars.next();
                let mut digits = String::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(d) if d.is_ascii_digit() => digits.push(d),
                        _ => return Err(invalid("unterminated upper bound".to_string())),
                    }
                }
                bound = Some(
                    digits
                        .parse::<u16>()
                        .map_err(|_| invalid(format!("bound '{}' out of range", digits)))?,
                );
            }
            if alphabet.contains(&id) {
                return Err(invalid(format!(
                    "element '{}' listed twice",
                    table.element(id).symbol
                )));
            }
            alphabet.push(id);
            upper_bounds.push(bound);
        }
        if alphabet.is_empty() {
            return Err(invalid("empty alphabet".to_string()));
        }
        Ok(Self {
            alphabet,
            upper_bounds,
            rdbe_min: -0.5,
            rdbe_max: 40.0,
        })
    }

    pub fn with_rdbe_range(mut self, min: f64, max: f64) -> Self {
        self.rdbe_min = min;
        self.rdbe_max = max;
        self
    }

    pub fn alphabet(&self) -> &[ElementId] {
        &self.alphabet
    }

    pub fn upper_bound(&self, id: ElementId) -> Option<u16> {
        self.alphabet
            .iter()
            .position(|&a| a == id)
            .and_then(|i| self.upper_bounds[i])
    }

    pub fn rdbe_range(&self) -> (f64, f64) {
        (self.rdbe_min, self.rdbe_max)
    }

    /// Whether a formula uses only alphabet elements, respects every upper
    /// bound and has an RDBE inside the filter window.
    pub fn satisfied_by(&self, formula: &MolecularFormula) -> bool {
        for (id, count) in formula.element_counts() {
            match self.alphabet.iter().position(|&a| a == id) {
                None => return false,
                Some(i) => {
                    if let Some(bound) = self.upper_bounds[i] {
                        if count > bound {
                            return false;
                        }
                    }
                }
            }
        }
        let rdbe = formula.rdbe();
        rdbe >= self.rdbe_min && rdbe <= self.rdbe_max
    }
}

impl Default for FormulaConstraints {
    /// `CHNOPS[20]`: unbounded C, H, N, O, P with at most twenty sulfur.
    fn default() -> Self {
        Self::parse("CHNOPS[20]").expect("default constraints")
    }
}

impl Display for FormulaConstraints {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = PeriodicTable::global();
        for (&id, bound) in self.alphabet.iter().zip(&self.upper_bounds) {
            write!(f, "{}", table.element(id).symbol)?;
            if let Some(bound) = bound {
                write!(f, "[{}]", bound)?;
            }
        }
        Ok(())
    }
}

impl Serialize for FormulaConstraints {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for FormulaConstraints {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(D::Error::custom)
    }
}

struct AlphabetEntry {
    element: ElementId,
    weight: i64,
    bound: Option<u16>,
}

/// Residue-table mass decomposer for one set of constraints.
///
/// Stateless after construction; reusable and shareable across threads.
pub struct MassDecomposer {
    constraints: FormulaConstraints,
    /// Alphabet sorted by integer weight ascending; entry 0 defines the
    /// residue base.
    entries: Vec<AlphabetEntry>,
    /// `ert[i][r]`: smallest integer mass congruent to `r` modulo the base
    /// weight that is decomposable over entries `0..=i`. `i64::MAX` marks
    /// unreachable residues.
    ert: Vec<Vec<i64>>,
}

impl MassDecomposer {
    pub fn new(constraints: FormulaConstraints) -> Self {
        let table = PeriodicTable::global();
        let mut entries: Vec<AlphabetEntry> = constraints
            .alphabet
            .iter()
            .zip(&constraints.upper_bounds)
            .filter(|(_, bound)| **bound != Some(0))
            .map(|(&element, &bound)| AlphabetEntry {
                element,
                weight: (table.element(element).monoisotopic_mass * BLOWUP).round() as i64,
                bound,
            })
            .collect();
        entries.sort_by_key(|e| e.weight);

        let ert = build_residue_table(&entries);
        Self {
            constraints,
            entries,
            ert,
        }
    }

    pub fn constraints(&self) -> &FormulaConstraints {
        &self.constraints
    }

    /// All formulas over the alphabet whose monoisotopic mass lies within
    /// `deviation` of `mass` (closed window), deduplicated and sorted by
    /// (mass, Hill string).
    pub fn decompose(&self, mass: f64, deviation: MassDeviation) -> Vec<MolecularFormula> {
        if self.entries.is_empty() || mass <= 0.0 {
            return Vec::new();
        }
        let (lo, hi) = deviation.window(mass);
        let lo = lo.max(0.0);
        let base = self.entries[0].weight;

        // Integer weights are rounded, so the integer query window gets half
        // a unit of slack per atom on both sides; the exact mass filter
        // below removes anything the slack lets through.
        let min_element_mass = self.entries[0].weight as f64 / BLOWUP;
        let max_atoms = (hi / min_element_mass).ceil() as i64 + 1;
        let slack = max_atoms / 2 + 1;
        let int_lo = ((lo * BLOWUP).floor() as i64 - slack).max(0);
        let int_hi = (hi * BLOWUP).ceil() as i64 + slack;

        let mut counts = vec![0u16; self.entries.len()];
        let mut results = Vec::new();
        for target in int_lo..=int_hi {
            let top = self.entries.len() - 1;
            if self.ert[top][(target % base) as usize] > target {
                continue;
            }
            self.enumerate(top, target, mass, deviation, &mut counts, &mut results);
        }
        results.sort_by(|a, b| {
            a.mass()
                .partial_cmp(&b.mass())
                .expect("finite mass")
                .then_with(|| a.cmp(b))
        });
        results.dedup();
        results
    }

    fn enumerate(
        &self,
        idx: usize,
        remaining: i64,
        query_mass: f64,
        deviation: MassDeviation,
        counts: &mut Vec<u16>,
        results: &mut Vec<MolecularFormula>,
    ) {
        let entry = &self.entries[idx];
        if idx == 0 {
            if remaining % entry.weight != 0 {
                return;
            }
            let count = remaining / entry.weight;
            if count > entry.bound.unwrap_or(u16::MAX) as i64 {
                return;
            }
            counts[0] = count as u16;
            self.emit(counts, query_mass, deviation, results);
            counts[0] = 0;
            return;
        }
        let base = self.entries[0].weight;
        let max_count = entry
            .bound
            .map(|b| b as i64)
            .unwrap_or(i64::MAX)
            .min(remaining / entry.weight);
        for count in 0..=max_count {
            let rest = remaining - count * entry.weight;
            // prune: rest must be decomposable over the smaller elements
            if self.ert[idx - 1][(rest % base) as usize] <= rest {
                counts[idx] = count as u16;
                self.enumerate(idx - 1, rest, query_mass, deviation, counts, results);
            }
        }
        counts[idx] = 0;
    }

    fn emit(
        &self,
        counts: &[u16],
        query_mass: f64,
        deviation: MassDeviation,
        results: &mut Vec<MolecularFormula>,
    ) {
        let mut formula = MolecularFormula::empty();
        for (entry, &count) in self.entries.iter().zip(counts) {
            if count > 0 {
                formula = formula.with_element(entry.element, count);
            }
        }
        if !deviation.is_within(formula.mass(), query_mass) {
            return;
        }
        let rdbe = formula.rdbe();
        if rdbe < self.constraints.rdbe_min || rdbe > self.constraints.rdbe_max {
            return;
        }
        results.push(formula);
    }
}

/// Round-robin construction of the extended residue table.
fn build_residue_table(entries: &[AlphabetEntry]) -> Vec<Vec<i64>> {
    if entries.is_empty() {
        return Vec::new();
    }
    let base = entries[0].weight as usize;
    let mut ert: Vec<Vec<i64>> = Vec::with_capacity(entries.len());
    let mut first = vec![i64::MAX; base];
    first[0] = 0;
    ert.push(first);
    for i in 1..entries.len() {
        let mut row = ert[i - 1].clone();
        let weight = entries[i].weight;
        let d = gcd(base as i64, weight);
        for class in 0..d {
            // start the cycle at the residue with the smallest known mass
            let start = ((class as usize)..base)
                .step_by(d as usize)
                .min_by_key(|&r| row[r]);
            let Some(start) = start else { continue };
            if row[start] == i64::MAX {
                continue;
            }
            let mut n = row[start];
            let mut r = start;
            for _ in 0..(base as i64 / d) {
                n += weight;
                r = (r + weight as usize) % base;
                n = n.min(row[r]);
                row[r] = n;
            }
        }
        ert.push(row);
    }
    ert
}

fn gcd(mut a: i64, mut b: i64) -> i64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chnops() -> MassDecomposer {
        MassDecomposer::new(FormulaConstraints::default())
    }

    #[test]
    fn glucose_is_found_at_its_own_mass() {
        let decomposer = chnops();
        let glucose = MolecularFormula::parse("C6H12O6").unwrap();
        let results = decomposer.decompose(glucose.mass(), MassDeviation::new(10.0, 5e-4));
        assert!(results.contains(&glucose), "results: {:?}", results);
    }

    #[test]
    fn every_result_lies_in_the_window() {
        let decomposer = chnops();
        let deviation = MassDeviation::new(10.0, 5e-4);
        let mass = 263.1318;
        for formula in decomposer.decompose(mass, deviation) {
            assert!(deviation.is_within(formula.mass(), mass), "{}", formula);
        }
    }

    #[test]
    fn constraint_round_trip_contains_every_formula() {
        // decompose(f.mass()) must contain f for formulas inside the
        // constraints
        let decomposer = chnops();
        let deviation = MassDeviation::new(5.0, 1e-4);
        for input in ["C2H5NO2", "C9H11NO3", "C6H8O7", "C5H5N5", "C10H14N5O7P"] {
            let formula = MolecularFormula::parse(input).unwrap();
            let results = decomposer.decompose(formula.mass(), deviation);
            assert!(results.contains(&formula), "{} missing", input);
        }
    }

    #[test]
    fn upper_bounds_are_respected() {
        let constraints = FormulaConstraints::parse("CHO[2]").unwrap();
        let decomposer = MassDecomposer::new(constraints);
        let glucose = MolecularFormula::parse("C6H12O6").unwrap();
        let results = decomposer.decompose(glucose.mass(), MassDeviation::new(10.0, 5e-4));
        assert!(results.iter().all(|f| {
            let oxygen = PeriodicTable::global().by_symbol("O").unwrap();
            f.count(oxygen) <= 2
        }));
        assert!(!results.contains(&glucose));
    }

    #[test]
    fn infeasible_window_yields_empty_not_error() {
        let constraints = FormulaConstraints::parse("C").unwrap();
        let decomposer = MassDecomposer::new(constraints);
        // nothing made of pure carbon weighs 13.5
        assert!(decomposer
            .decompose(13.5, MassDeviation::new(5.0, 1e-4))
            .is_empty());
    }

    #[test]
    fn output_is_deterministic_and_sorted() {
        let decomposer = chnops();
        let deviation = MassDeviation::new(20.0, 2e-3);
        let a = decomposer.decompose(180.0634, deviation);
        let b = decomposer.decompose(180.0634, deviation);
        assert_eq!(a, b);
        for pair in a.windows(2) {
            assert!(pair[0].mass() <= pair[1].mass() + 1e-9);
        }
    }

    #[test]
    fn constraint_string_round_trip() {
        for input in ["CHNOPS[20]", "CHNOP[5]S[20]", "CHO", "CHNOClBr[2]"] {
            let constraints = FormulaConstraints::parse(input).unwrap();
            assert_eq!(constraints.to_string(), input);
        }
    }

    #[test]
    fn malformed_alphabet_is_an_error() {
        assert!(FormulaConstraints::parse("").is_err());
        assert!(FormulaConstraints::parse("CHQx").is_err());
        assert!(FormulaConstraints::parse("CH[").is_err());
        assert!(FormulaConstraints::parse("CHC").is_err());
    }
}
