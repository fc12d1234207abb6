use std::collections::HashMap;
use std::sync::OnceLock;

/// Dense index of an element inside the process-wide [`PeriodicTable`].
///
/// Molecular formulas are count vectors indexed by this id, so it must stay
/// stable for the lifetime of the process.
pub type ElementId = usize;

/// One naturally occurring isotope of an element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Isotope {
    /// Exact mass in Da.
    pub mass: f64,
    /// Natural abundance, all isotopes of an element sum to 1.
    pub abundance: f64,
}

/// A chemical element with its isotope ladder.
///
/// `monoisotopic_mass` is the mass of the most abundant isotope, which for
/// every element in the built-in table except B, Fe and Se is also the
/// lightest one.
#[derive(Debug, Clone, Copy)]
pub struct Element {
    pub symbol: &'static str,
    pub nominal_mass: u16,
    pub monoisotopic_mass: f64,
    /// Standard bonding valence, used for ring-double-bond-equivalent
    /// computations.
    pub valence: i8,
    pub isotopes: &'static [Isotope],
}

macro_rules! isotopes {
    ($(($mass:expr, $abundance:expr)),+ $(,)?) => {
        &[$(Isotope { mass: $mass, abundance: $abundance }),+]
    };
}

static ELEMENTS: &[Element] = &[
    Element {
        symbol: "H",
        nominal_mass: 1,
        monoisotopic_mass: 1.007_825_032_07,
        valence: 1,
        isotopes: isotopes![(1.007_825_032_07, 0.999_885), (2.014_101_777_8, 0.000_115)],
    },
    Element {
        symbol: "B",
        nominal_mass: 11,
        monoisotopic_mass: 11.009_305_4,
        valence: 3,
        isotopes: isotopes![(10.012_937_0, 0.199), (11.009_305_4, 0.801)],
    },
    Element {
        symbol: "C",
        nominal_mass: 12,
        monoisotopic_mass: 12.0,
        valence: 4,
        isotopes: isotopes![(12.0, 0.989_3), (13.003_354_837_8, 0.010_7)],
    },
    Element {
        symbol: "N",
        nominal_mass: 14,
        monoisotopic_mass: 14.003_074_004_8,
        valence: 3,
        isotopes: isotopes![(14.003_074_004_8, 0.996_36), (15.000_108_898_2, 0.003_64)],
    },
    Element {
        symbol: "O",
        nominal_mass: 16,
        monoisotopic_mass: 15.994_914_619_56,
        valence: 2,
        isotopes: isotopes![
            (15.994_914_619_56, 0.997_57),
            (16.999_131_70, 0.000_38),
            (17.999_161_0, 0.002_05),
        ],
    },
    Element {
        symbol: "F",
        nominal_mass: 19,
        monoisotopic_mass: 18.998_403_22,
        valence: 1,
        isotopes: isotopes![(18.998_403_22, 1.0)],
    },
    Element {
        symbol: "Na",
        nominal_mass: 23,
        monoisotopic_mass: 22.989_769_280_9,
        valence: 1,
        isotopes: isotopes![(22.989_769_280_9, 1.0)],
    },
    Element {
        symbol: "Mg",
        nominal_mass: 24,
        monoisotopic_mass: 23.985_041_700,
        valence: 2,
        isotopes: isotopes![
            (23.985_041_700, 0.789_9),
            (24.985_836_92, 0.100_0),
            (25.982_592_929, 0.110_1),
        ],
    },
    Element {
        symbol: "Si",
        nominal_mass: 28,
        monoisotopic_mass: 27.976_926_532_5,
        valence: 4,
        isotopes: isotopes![
            (27.976_926_532_5, 0.922_23),
            (28.976_494_700, 0.046_85),
            (29.973_770_17, 0.030_92),
        ],
    },
    Element {
        symbol: "P",
        nominal_mass: 31,
        monoisotopic_mass: 30.973_761_63,
        valence: 3,
        isotopes: isotopes![(30.973_761_63, 1.0)],
    },
    Element {
        symbol: "S",
        nominal_mass: 32,
        monoisotopic_mass: 31.972_071_00,
        valence: 2,
        isotopes: isotopes![
            (31.972_071_00, 0.949_9),
            (32.971_458_76, 0.007_5),
            (33.967_866_90, 0.042_5),
            (35.967_080_76, 0.000_1),
        ],
    },
    Element {
        symbol: "Cl",
        nominal_mass: 35,
        monoisotopic_mass: 34.968_852_68,
        valence: 1,
        isotopes: isotopes![(34.968_852_68, 0.757_6), (36.965_902_59, 0.242_4)],
    },
    Element {
        symbol: "K",
        nominal_mass: 39,
        monoisotopic_mass: 38.963_706_68,
        valence: 1,
        isotopes: isotopes![
            (38.963_706_68, 0.932_581),
            (39.963_998_48, 0.000_117),
            (40.961_825_76, 0.067_302),
        ],
    },
    Element {
        symbol: "Ca",
        nominal_mass: 40,
        monoisotopic_mass: 39.962_590_98,
        valence: 2,
        isotopes: isotopes![
            (39.962_590_98, 0.969_41),
            (41.958_618_01, 0.006_47),
            (42.958_766_6, 0.001_35),
            (43.955_481_8, 0.020_86),
        ],
    },
    Element {
        symbol: "Fe",
        nominal_mass: 56,
        monoisotopic_mass: 55.934_937_5,
        valence: 2,
        isotopes: isotopes![
            (53.939_610_5, 0.058_45),
            (55.934_937_5, 0.917_54),
            (56.935_394_0, 0.021_19),
            (57.933_275_6, 0.002_82),
        ],
    },
    Element {
        symbol: "Zn",
        nominal_mass: 64,
        monoisotopic_mass: 63.929_142_2,
        valence: 2,
        isotopes: isotopes![
            (63.929_142_2, 0.482_68),
            (65.926_033_4, 0.279_75),
            (66.927_127_3, 0.041_02),
            (67.924_844_2, 0.190_24),
            (69.925_319_3, 0.006_31),
        ],
    },
    Element {
        symbol: "Se",
        nominal_mass: 80,
        monoisotopic_mass: 79.916_521_3,
        valence: 2,
        isotopes: isotopes![
            (73.922_476_4, 0.008_9),
            (75.919_213_6, 0.093_7),
            (76.919_914_0, 0.076_3),
            (77.917_309_1, 0.237_7),
            (79.916_521_3, 0.496_1),
            (81.916_699_4, 0.087_3),
        ],
    },
    Element {
        symbol: "Br",
        nominal_mass: 79,
        monoisotopic_mass: 78.918_337_1,
        valence: 1,
        isotopes: isotopes![(78.918_337_1, 0.506_9), (80.916_290_6, 0.493_1)],
    },
    Element {
        symbol: "I",
        nominal_mass: 127,
        monoisotopic_mass: 126.904_473,
        valence: 1,
        isotopes: isotopes![(126.904_473, 1.0)],
    },
];

/// Process-wide immutable element catalog.
///
/// Interned once behind a `OnceLock`; element ids handed out by this table
/// index into every [`crate::MolecularFormula`] count vector.
pub struct PeriodicTable {
    elements: &'static [Element],
    by_symbol: HashMap<&'static str, ElementId>,
}

static TABLE: OnceLock<PeriodicTable> = OnceLock::new();

impl PeriodicTable {
    pub fn global() -> &'static PeriodicTable {
        TABLE.get_or_init(|| {
            let by_symbol = ELEMENTS
                .iter()
                .enumerate()
                .map(|(id, e)| (e.symbol, id))
                .collect();
            PeriodicTable {
                elements: ELEMENTS,
                by_symbol,
            }
        })
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn element(&self, id: ElementId) -> &'static Element {
        &self.elements[id]
    }

    pub fn by_symbol(&self, symbol: &str) -> Option<ElementId> {
        self.by_symbol.get(symbol).copied()
    }

    pub fn elements(&self) -> impl Iterator<Item = (ElementId, &'static Element)> {
        self.elements.iter().enumerate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn symbols_resolve_to_unique_ids() {
        let table = PeriodicTable::global();
        let carbon = table.by_symbol("C").unwrap();
        let hydrogen = table.by_symbol("H").unwrap();
        assert_ne!(carbon, hydrogen);
        assert_eq!(table.element(carbon).symbol, "C");
        assert!(table.by_symbol("Xx").is_none());
    }

    #[test]
    fn isotope_abundances_sum_to_one() {
        for (_, element) in PeriodicTable::global().elements() {
            let total: f64 = element.isotopes.iter().map(|i| i.abundance).sum();
            assert!(
                (total - 1.0).abs() < 1e-3,
                "{} abundances sum to {}",
                element.symbol,
                total
            );
        }
    }

    #[test]
    fn monoisotopic_mass_is_most_abundant_isotope() {
        for (_, element) in PeriodicTable::global().elements() {
            let best = element
                .isotopes
                .iter()
                .max_by(|a, b| a.abundance.partial_cmp(&b.abundance).unwrap())
                .unwrap();
            assert_eq!(best.mass, element.monoisotopic_mass, "{}", element.symbol);
        }
    }
}
