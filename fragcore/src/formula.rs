use std::cmp::Ordering;
use std::fmt::Display;

use serde::de::Error as _;
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};

use crate::element::{
    ElementId,
    PeriodicTable,
};
use crate::errors::ChemError;

/// An immutable molecular formula: non-negative element counts over the
/// process-wide periodic table.
///
/// The count vector always has one slot per table element, so derived
/// equality and hashing are component-wise as required. Ordering is by the
/// canonical Hill string, which is what every deterministic tie-break in the
/// pipeline uses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MolecularFormula {
    counts: Vec<u16>,
}

impl MolecularFormula {
    pub fn empty() -> Self {
        Self {
            counts: vec![0; PeriodicTable::global().len()],
        }
    }

    /// Parse a plain element-count string such as `C6H12O6`.
    ///
    /// Counts default to 1, multi-letter symbols are supported, nesting is
    /// not. The empty string parses to the empty formula.
    pub fn parse(input: &str) -> Result<Self, ChemError> {
        let table = PeriodicTable::global();
        let mut formula = Self::empty();
        let mut chars = input.chars().peekable();
        while let Some(c) = chars.next() {
            if !c.is_ascii_uppercase() {
                return Err(ChemError::InvalidFormula {
                    input: input.to_string(),
                    message: format!("unexpected character '{}'", c),
                });
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
            let mut digits = String::new();
            while let Some(&next) = chars.peek() {
                if next.is_ascii_digit() {
                    digits.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            let count: u16 = if digits.is_empty() {
                1
            } else {
                digits.parse().map_err(|_| ChemError::InvalidFormula {
                    input: input.to_string(),
                    message: format!("count '{}' out of range", digits),
                })?
            };
            let id = table
                .by_symbol(&symbol)
                .ok_or_else(|| ChemError::UnknownElement {
                    symbol: symbol.clone(),
                })?;
            let slot = &mut formula.counts[id];
            *slot = slot.checked_add(count).ok_or(ChemError::InvalidFormula {
                input: input.to_string(),
                message: format!("count overflow for '{}'", symbol),
            })?;
        }
        Ok(formula)
    }

    pub fn count(&self, id: ElementId) -> u16 {
        self.counts[id]
    }

    pub fn with_element(mut self, id: ElementId, count: u16) -> Self {
        self.counts[id] = count;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.counts.iter().all(|&c| c == 0)
    }

    pub fn atom_count(&self) -> u32 {
        self.counts.iter().map(|&c| c as u32).sum()
    }

    /// Monoisotopic mass in Da.
    pub fn mass(&self) -> f64 {
        let table = PeriodicTable::global();
        self.counts
            .iter()
            .enumerate()
            .map(|(id, &count)| table.element(id).monoisotopic_mass * count as f64)
            .sum()
    }

    /// Ring-double-bond equivalents: `1 + 1/2 * sum(count * (valence - 2))`.
    pub fn rdbe(&self) -> f64 {
        let table = PeriodicTable::global();
        let weighted: i64 = self
            .counts
            .iter()
            .enumerate()
            .map(|(id, &count)| count as i64 * (table.element(id).valence as i64 - 2))
            .sum();
        1.0 + 0.5 * weighted as f64
    }

    pub fn add(&self, other: &Self) -> Self {
        let counts = self
            .counts
            .iter()
            .zip(&other.counts)
            .map(|(a, b)| a + b)
            .collect();
        Self { counts }
    }

    /// Component-wise subtraction; `None` when any count would go negative.
    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        let mut counts = Vec::with_capacity(self.counts.len());
        for (a, b) in self.counts.iter().zip(&other.counts) {
            counts.push(a.checked_sub(*b)?);
        }
        Some(Self { counts })
    }

    /// True when every count of `self` is at most the matching count of
    /// `other`.
    pub fn is_subset_of(&self, other: &Self) -> bool {
        self.counts.iter().zip(&other.counts).all(|(a, b)| a <= b)
    }

    /// True when `self` is a subset of `other` and differs from it.
    pub fn is_strict_subset_of(&self, other: &Self) -> bool {
        self.is_subset_of(other) && self != other
    }

    pub fn element_counts(&self) -> impl Iterator<Item = (ElementId, u16)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|(_, &c)| c > 0)
            .map(|(id, &c)| (id, c))
    }
}

impl Display for MolecularFormula {
    /// Hill order: C first, H second when carbon is present, everything else
    /// (H included when there is no carbon) alphabetically.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let table = PeriodicTable::global();
        let mut entries: Vec<(&str, u16)> = self
            .element_counts()
            .map(|(id, count)| (table.element(id).symbol, count))
            .collect();
        let has_carbon = entries.iter().any(|(s, _)| *s == "C");
        fn rank(symbol: &str, has_carbon: bool) -> (u8, &str) {
            if has_carbon {
                match symbol {
                    "C" => (0, symbol),
                    "H" => (1, symbol),
                    _ => (2, symbol),
                }
            } else {
                (2, symbol)
            }
        }
        entries.sort_by(|a, b| {
            rank(a.0, has_carbon).cmp(&rank(b.0, has_carbon))
        });
        for (symbol, count) in entries {
            if count == 1 {
                write!(f, "{}", symbol)?;
            } else {
                write!(f, "{}{}", symbol, count)?;
            }
        }
        Ok(())
    }
}

impl PartialOrd for MolecularFormula {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MolecularFormula {
    fn cmp(&self, other: &Self) -> Ordering {
        self.to_string().cmp(&other.to_string())
    }
}

impl Serialize for MolecularFormula {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for MolecularFormula {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_render_round_trip() {
        for input in ["C6H12O6", "H2O", "C2H5NO2", "CHN", "C10H16N5O13P3", "ClH"] {
            let formula = MolecularFormula::parse(input).unwrap();
            let rendered = formula.to_string();
            assert_eq!(MolecularFormula::parse(&rendered).unwrap(), formula);
        }
    }

    #[test]
    fn hill_order_puts_carbon_and_hydrogen_first() {
        let formula = MolecularFormula::parse("O6C6H12").unwrap();
        assert_eq!(formula.to_string(), "C6H12O6");
        let no_carbon = MolecularFormula::parse("OH2").unwrap();
        assert_eq!(no_carbon.to_string(), "H2O");
    }

    #[test]
    fn glucose_monoisotopic_mass() {
        let glucose = MolecularFormula::parse("C6H12O6").unwrap();
        assert!((glucose.mass() - 180.063_388).abs() < 1e-4);
        assert!((glucose.rdbe() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn subtraction_saturates_to_none() {
        let glucose = MolecularFormula::parse("C6H12O6").unwrap();
        let water = MolecularFormula::parse("H2O").unwrap();
        let rest = glucose.checked_sub(&water).unwrap();
        assert_eq!(rest.to_string(), "C6H10O5");
        assert!(water.checked_sub(&glucose).is_none());
        assert!(rest.is_strict_subset_of(&glucose));
    }

    #[test]
    fn unknown_element_is_rejected() {
        assert!(matches!(
            MolecularFormula::parse("C2Xx"),
            Err(ChemError::UnknownElement { .. })
        ));
    }
}
