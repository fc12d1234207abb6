use std::fmt::Display;

use serde::de::Error as _;
use serde::{
    Deserialize,
    Deserializer,
    Serialize,
    Serializer,
};

use crate::constants::{
    ELECTRON_MASS,
    PROTON_MASS,
};
use crate::errors::ChemError;
use crate::formula::MolecularFormula;

/// The charge-carrying part of an ionization: a single charge plus the mass
/// shift of the attached or removed particle.
///
/// Multiply charged ions are out of scope for the whole workspace, so the
/// charge is always +1 or -1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IonMode {
    Protonation,
    Deprotonation,
    Sodiation,
    Potassiation,
    Chlorination,
    Bromination,
    /// Intrinsically charged compound, `[M]+`.
    IntrinsicPositive,
    /// Intrinsically charged compound, `[M]-`.
    IntrinsicNegative,
}

impl IonMode {
    pub fn charge(&self) -> i32 {
        match self {
            Self::Protonation | Self::Sodiation | Self::Potassiation | Self::IntrinsicPositive => 1,
            Self::Deprotonation
            | Self::Chlorination
            | Self::Bromination
            | Self::IntrinsicNegative => -1,
        }
    }

    /// Mass added to the neutral molecule when forming the ion, in Da.
    /// Electron masses are accounted for.
    pub fn mass_shift(&self) -> f64 {
        match self {
            Self::Protonation => PROTON_MASS,
            Self::Deprotonation => -PROTON_MASS,
            Self::Sodiation => 22.989_769_280_9 - ELECTRON_MASS,
            Self::Potassiation => 38.963_706_68 - ELECTRON_MASS,
            Self::Chlorination => 34.968_852_68 + ELECTRON_MASS,
            Self::Bromination => 78.918_337_1 + ELECTRON_MASS,
            Self::IntrinsicPositive => -ELECTRON_MASS,
            Self::IntrinsicNegative => ELECTRON_MASS,
        }
    }

    /// The ion modes the identification pipeline tries when the precursor
    /// ion type is unknown, best guesses first.
    pub fn known_for_charge(charge: i32) -> &'static [IonMode] {
        if charge >= 0 {
            &[
                Self::Protonation,
                Self::IntrinsicPositive,
                Self::Sodiation,
                Self::Potassiation,
            ]
        } else {
            &[
                Self::Deprotonation,
                Self::IntrinsicNegative,
                Self::Chlorination,
                Self::Bromination,
            ]
        }
    }

    /// The charged atoms this mode attaches (positive) or removes (negative)
    /// from the neutral molecule, as a formula plus a sign. Intrinsic modes
    /// attach nothing.
    fn atoms(&self) -> Option<(MolecularFormula, bool)> {
        let formula = |s: &str| MolecularFormula::parse(s).expect("built-in ion mode formula");
        match self {
            Self::Protonation => Some((formula("H"), true)),
            Self::Deprotonation => Some((formula("H"), false)),
            Self::Sodiation => Some((formula("Na"), true)),
            Self::Potassiation => Some((formula("K"), true)),
            Self::Chlorination => Some((formula("Cl"), true)),
            Self::Bromination => Some((formula("Br"), true)),
            Self::IntrinsicPositive | Self::IntrinsicNegative => None,
        }
    }
}

/// Full description of how the measured precursor ion relates to the neutral
/// compound: ion mode plus an optional neutral adduct (`[M+NH4]+` is
/// protonation with an NH3 adduct) and an optional in-source loss
/// (`[M+H-H2O]+`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PrecursorIonType {
    ion_mode: IonMode,
    adduct: MolecularFormula,
    in_source_loss: MolecularFormula,
    unknown: bool,
}

impl PrecursorIonType {
    pub fn from_ion_mode(ion_mode: IonMode) -> Self {
        Self {
            ion_mode,
            adduct: MolecularFormula::empty(),
            in_source_loss: MolecularFormula::empty(),
            unknown: false,
        }
    }

    /// A charge-only placeholder for experiments where the adduct is not
    /// known. The pipeline resolves it by trying every known ion mode.
    pub fn unknown(charge: i32) -> Self {
        let ion_mode = if charge >= 0 {
            IonMode::IntrinsicPositive
        } else {
            IonMode::IntrinsicNegative
        };
        Self {
            ion_mode,
            adduct: MolecularFormula::empty(),
            in_source_loss: MolecularFormula::empty(),
            unknown: true,
        }
    }

    pub fn with_adduct(mut self, adduct: MolecularFormula) -> Self {
        self.adduct = adduct;
        self
    }

    pub fn with_in_source_loss(mut self, loss: MolecularFormula) -> Self {
        self.in_source_loss = loss;
        self
    }

    pub fn is_unknown(&self) -> bool {
        self.unknown
    }

    pub fn ion_mode(&self) -> IonMode {
        self.ion_mode
    }

    pub fn charge(&self) -> i32 {
        self.ion_mode.charge()
    }

    pub fn adduct(&self) -> &MolecularFormula {
        &self.adduct
    }

    pub fn in_source_loss(&self) -> &MolecularFormula {
        &self.in_source_loss
    }

    /// m/z of the precursor ion of a compound with neutral mass `mass`.
    pub fn neutral_mass_to_ion_mass(&self, mass: f64) -> f64 {
        mass + self.adduct.mass() - self.in_source_loss.mass() + self.ion_mode.mass_shift()
    }

    /// Neutral compound mass for a measured precursor m/z. Inverse of
    /// [`Self::neutral_mass_to_ion_mass`] up to rounding.
    pub fn ion_mass_to_neutral_mass(&self, mz: f64) -> f64 {
        mz - self.adduct.mass() + self.in_source_loss.mass() - self.ion_mode.mass_shift()
    }

    /// The formula actually present in the ion (root of the fragmentation
    /// graph) for a neutral compound formula.
    pub fn neutral_to_measured_formula(&self, neutral: &MolecularFormula) -> Option<MolecularFormula> {
        neutral.add(&self.adduct).checked_sub(&self.in_source_loss)
    }

    /// Neutral compound formula for a measured (graph root) formula. Inverse
    /// of [`Self::neutral_to_measured_formula`].
    pub fn measured_to_neutral_formula(&self, measured: &MolecularFormula) -> Option<MolecularFormula> {
        measured.add(&self.in_source_loss).checked_sub(&self.adduct)
    }

    /// Parse names like `[M+H]+`, `[M-H]-`, `[M+NH4]+`, `[M+H-H2O]+`,
    /// `[M]+` or the unknown-adduct placeholder `[M+?]+`.
    pub fn parse(name: &str) -> Result<Self, ChemError> {
        let invalid = || ChemError::InvalidIonType {
            name: name.to_string(),
        };
        let trimmed = name.trim();
        let (body, charge) = trimmed
            .strip_prefix('[')
            .and_then(|rest| rest.split_once(']'))
            .and_then(|(body, charge)| match charge {
                "+" | "1+" => Some((body, 1)),
                "-" | "1-" => Some((body, -1)),
                _ => None,
            })
            .ok_or_else(invalid)?;
        let body = body.strip_prefix('M').ok_or_else(invalid)?;
        if body == "+?" {
            return Ok(Self::unknown(charge));
        }

        // Sum every +token and -token separately, then factor the charge
        // carrier out of the right side.
        let mut plus = MolecularFormula::empty();
        let mut minus = MolecularFormula::empty();
        let mut rest = body;
        while !rest.is_empty() {
            let positive = match rest.as_bytes()[0] {
                b'+' => true,
                b'-' => false,
                _ => return Err(invalid()),
            };
            rest = &rest[1..];
            let end = rest
                .find(['+', '-'])
                .unwrap_or(rest.len());
            let token = MolecularFormula::parse(&rest[..end])?;
            if positive {
                plus = plus.add(&token);
            } else {
                minus = minus.add(&token);
            }
            rest = &rest[end..];
        }

        let candidate_modes: &[IonMode] = if charge > 0 {
            &[
                IonMode::Protonation,
                IonMode::Sodiation,
                IonMode::Potassiation,
            ]
        } else {
            &[
                IonMode::Deprotonation,
                IonMode::Chlorination,
                IonMode::Bromination,
            ]
        };
        for &mode in candidate_modes {
            let (atoms, attached) = mode.atoms().expect("charged modes carry atoms");
            let carrier = if attached { &plus } else { &minus };
            if let Some(remaining) = carrier.checked_sub(&atoms) {
                let (adduct, in_source_loss) = if attached {
                    (remaining, minus.clone())
                } else {
                    (plus.clone(), remaining)
                };
                return Ok(Self {
                    ion_mode: mode,
                    adduct,
                    in_source_loss,
                    unknown: false,
                });
            }
        }
        // no recognizable charge carrier: intrinsically charged
        Ok(Self {
            ion_mode: if charge > 0 {
                IonMode::IntrinsicPositive
            } else {
                IonMode::IntrinsicNegative
            },
            adduct: plus,
            in_source_loss: minus,
            unknown: false,
        })
    }

    /// Every plain (adduct-free) precursor ion type for a charge.
    pub fn known_for_charge(charge: i32) -> Vec<PrecursorIonType> {
        IonMode::known_for_charge(charge)
            .iter()
            .map(|&mode| Self::from_ion_mode(mode))
            .collect()
    }
}

impl Display for PrecursorIonType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.charge() > 0 { "+" } else { "-" };
        if self.unknown {
            return write!(f, "[M+?]{}", sign);
        }
        let mut plus = self.adduct.clone();
        let mut minus = self.in_source_loss.clone();
        if let Some((atoms, attached)) = self.ion_mode.atoms() {
            if attached {
                plus = plus.add(&atoms);
            } else {
                minus = minus.add(&atoms);
            }
        }
        write!(f, "[M")?;
        if !plus.is_empty() {
            write!(f, "+{}", canonical_adduct_name(&plus))?;
        }
        if !minus.is_empty() {
            write!(f, "-{}", canonical_adduct_name(&minus))?;
        }
        write!(f, "]{}", sign)
    }
}

/// Adduct names as conventionally written, which is not always Hill order
/// (`NH4`, not `H4N`).
fn canonical_adduct_name(formula: &MolecularFormula) -> String {
    for (hill, conventional) in [("H4N", "NH4"), ("H3N", "NH3")] {
        if formula.to_string() == hill {
            return conventional.to_string();
        }
    }
    formula.to_string()
}

impl Serialize for PrecursorIonType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PrecursorIonType {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mass_round_trips_for_every_known_ion_type() {
        let names = [
            "[M+H]+", "[M-H]-", "[M+Na]+", "[M+K]+", "[M+NH4]+", "[M+H-H2O]+", "[M]+", "[M]-",
            "[M+Cl]-", "[M+Br]-",
        ];
        for name in names {
            let ion = PrecursorIonType::parse(name).unwrap();
            let neutral = 180.063_388;
            let mz = ion.neutral_mass_to_ion_mass(neutral);
            assert!(
                (ion.ion_mass_to_neutral_mass(mz) - neutral).abs() < 1e-9,
                "{}",
                name
            );
        }
    }

    #[test]
    fn names_round_trip() {
        for name in [
            "[M+H]+", "[M-H]-", "[M+Na]+", "[M+NH4]+", "[M+H-H2O]+", "[M]+", "[M+Cl]-", "[M+?]+",
        ] {
            let ion = PrecursorIonType::parse(name).unwrap();
            assert_eq!(ion.to_string(), name);
        }
    }

    #[test]
    fn ammonium_is_protonation_with_ammonia_adduct() {
        let ion = PrecursorIonType::parse("[M+NH4]+").unwrap();
        assert_eq!(ion.ion_mode(), IonMode::Protonation);
        assert_eq!(ion.adduct().to_string(), "H3N");
    }

    #[test]
    fn measured_formula_round_trip() {
        let ion = PrecursorIonType::parse("[M+H-H2O]+").unwrap();
        let neutral = MolecularFormula::parse("C6H12O6").unwrap();
        let measured = ion.neutral_to_measured_formula(&neutral).unwrap();
        assert_eq!(measured.to_string(), "C6H10O5");
        assert_eq!(ion.measured_to_neutral_formula(&measured).unwrap(), neutral);
    }

    #[test]
    fn protonated_glucose_mz() {
        let ion = PrecursorIonType::parse("[M+H]+").unwrap();
        let mz = ion.neutral_mass_to_ion_mass(180.063_388);
        assert!((mz - 181.070_665).abs() < 1e-4);
    }
}
