//! Theoretical isotope distributions by element-ladder convolution.

use crate::element::PeriodicTable;
use crate::formula::MolecularFormula;
use crate::ionization::PrecursorIonType;
use crate::spectrum::{
    Peak,
    Spectrum,
};

/// Isotopologues closer than this are folded into one centroid; distinct
/// nominal masses are ~1 Da apart, isotopologues of the same nominal mass
/// a few mDa.
const MERGE_WINDOW: f64 = 0.2;

/// Abundances below this fraction are dropped during folding.
const ABUNDANCE_FLOOR: f64 = 1e-9;

/// Convolve two (mass, abundance) distributions, merging peaks that land in
/// the same nominal-mass bin.
fn convolve(a: &[(f64, f64)], b: &[(f64, f64)], max_peaks: usize) -> Vec<(f64, f64)> {
    let mut result: Vec<(f64, f64)> = Vec::new();
    for &(mass_a, abundance_a) in a {
        for &(mass_b, abundance_b) in b {
            let mass = mass_a + mass_b;
            let abundance = abundance_a * abundance_b;
            if abundance < ABUNDANCE_FLOOR {
                continue;
            }
            match result
                .iter_mut()
                .find(|(m, _)| (*m - mass).abs() < MERGE_WINDOW)
            {
                // abundance-weighted centroid of the bin
                Some(entry) => {
                    entry.0 = (entry.0 * entry.1 + mass * abundance) / (entry.1 + abundance);
                    entry.1 += abundance;
                }
                None => result.push((mass, abundance)),
            }
        }
    }
    result.sort_by(|x, y| y.1.partial_cmp(&x.1).expect("finite abundance"));
    result.truncate(max_peaks);
    result.sort_by(|x, y| x.0.partial_cmp(&y.0).expect("finite mass"));
    result
}

/// `dist` convolved with itself `n` times, by repeated squaring.
fn convolve_pow(dist: &[(f64, f64)], n: u16, max_peaks: usize) -> Vec<(f64, f64)> {
    if n == 0 {
        return vec![(0.0, 1.0)];
    }
    let mut result = vec![(0.0, 1.0)];
    let mut base = dist.to_vec();
    let mut remaining = n;
    while remaining > 0 {
        if remaining & 1 == 1 {
            result = convolve(&result, &base, max_peaks);
        }
        remaining >>= 1;
        if remaining > 0 {
            base = convolve(&base, &base, max_peaks);
        }
    }
    result
}

/// The isotopologue distribution of a neutral formula as (mass, abundance)
/// pairs, one entry per nominal mass, abundances normalized to sum to 1,
/// sorted by mass, at most `max_peaks` entries kept (the most abundant
/// ones).
pub fn isotope_distribution(formula: &MolecularFormula, max_peaks: usize) -> Vec<(f64, f64)> {
    let table = PeriodicTable::global();
    // keep some head-room while folding, trim at the end
    let working = max_peaks.max(4) * 4;
    let mut result: Vec<(f64, f64)> = vec![(0.0, 1.0)];
    for (id, count) in formula.element_counts() {
        let ladder: Vec<(f64, f64)> = table
            .element(id)
            .isotopes
            .iter()
            .map(|i| (i.mass, i.abundance))
            .collect();
        let powered = convolve_pow(&ladder, count, working);
        result = convolve(&result, &powered, working);
    }
    result.sort_by(|x, y| y.1.partial_cmp(&x.1).expect("finite abundance"));
    result.truncate(max_peaks);
    result.sort_by(|x, y| x.0.partial_cmp(&y.0).expect("finite mass"));
    let total: f64 = result.iter().map(|(_, a)| a).sum();
    result
        .into_iter()
        .map(|(m, a)| (m, a / total))
        .collect()
}

/// Simulate the isotope pattern of an ionized compound as a spectrum of
/// (m/z, relative abundance) peaks.
pub fn simulate_pattern(
    formula: &MolecularFormula,
    ion_type: &PrecursorIonType,
    max_peaks: usize,
) -> Spectrum {
    let measured = ion_type
        .neutral_to_measured_formula(formula)
        .unwrap_or_else(|| formula.clone());
    let shift = ion_type.ion_mode().mass_shift();
    isotope_distribution(&measured, max_peaks)
        .into_iter()
        .map(|(mass, abundance)| Peak {
            mz: mass + shift,
            intensity: abundance,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glucose_m_plus_one_ratio() {
        let glucose = MolecularFormula::parse("C6H12O6").unwrap();
        let dist = isotope_distribution(&glucose, 5);
        assert!((dist[0].0 - 180.063_388).abs() < 1e-3);
        // six carbons: the M+1 peak is dominated by 13C at ~6.5% of M
        let ratio = dist[1].1 / dist[0].1;
        assert!((0.055..0.085).contains(&ratio), "ratio {}", ratio);
        // spacing close to the 13C delta
        assert!((dist[1].0 - dist[0].0 - 1.0033).abs() < 0.01);
    }

    #[test]
    fn chlorine_gives_strong_m_plus_two() {
        let formula = MolecularFormula::parse("C2H5Cl").unwrap();
        let dist = isotope_distribution(&formula, 4);
        // 37Cl sits two nominal masses up at about a third of the base peak
        let m2 = dist
            .iter()
            .find(|(m, _)| (*m - dist[0].0 - 2.0).abs() < 0.1)
            .expect("M+2 peak");
        assert!((m2.1 / dist[0].1 - 0.32).abs() < 0.03);
    }

    #[test]
    fn abundances_are_normalized() {
        let formula = MolecularFormula::parse("C10H20N2O5S").unwrap();
        let dist = isotope_distribution(&formula, 5);
        let total: f64 = dist.iter().map(|(_, a)| a).sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn simulated_pattern_is_ionized() {
        let glucose = MolecularFormula::parse("C6H12O6").unwrap();
        let ion = PrecursorIonType::parse("[M+H]+").unwrap();
        let pattern = simulate_pattern(&glucose, &ion, 3);
        assert!((pattern.peaks()[0].mz - 181.070_665).abs() < 1e-3);
    }
}
