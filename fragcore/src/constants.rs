//! Physical constants used throughout the workspace.

/// Mass of a proton in Da.
pub const PROTON_MASS: f64 = 1.007_276_466_88;

/// Mass of an electron in Da.
pub const ELECTRON_MASS: f64 = 0.000_548_579_909_46;

/// Average spacing between adjacent isotopologue peaks in Da
/// (the 13C/12C mass difference).
pub const ISOTOPE_SPACING: f64 = 1.003_354_835_34;
