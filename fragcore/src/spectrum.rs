use serde::{
    Deserialize,
    Serialize,
};

use crate::deviation::MassDeviation;
use crate::errors::ChemError;

/// A centroided peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub mz: f64,
    pub intensity: f64,
}

/// A centroided spectrum, always sorted by m/z.
///
/// Intensities are scale-free until explicitly normalized; the pipeline
/// normalizes relative to the base peak and keeps that convention for a
/// whole run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Spectrum {
    peaks: Vec<Peak>,
}

impl Spectrum {
    pub fn new(mut peaks: Vec<Peak>) -> Self {
        peaks.sort_by(|a, b| a.mz.partial_cmp(&b.mz).expect("finite m/z"));
        Self { peaks }
    }

    /// Wrap parallel m/z and intensity arrays into a spectrum.
    pub fn from_arrays(mz: &[f64], intensity: &[f64]) -> Result<Self, ChemError> {
        if mz.len() != intensity.len() {
            return Err(ChemError::InvalidSpectrum {
                message: format!(
                    "m/z and intensity arrays differ in length ({} vs {})",
                    mz.len(),
                    intensity.len()
                ),
            });
        }
        for (&m, &i) in mz.iter().zip(intensity) {
            if !m.is_finite() || !i.is_finite() || m <= 0.0 || i < 0.0 {
                return Err(ChemError::InvalidSpectrum {
                    message: format!("invalid peak ({}, {})", m, i),
                });
            }
        }
        Ok(Self::new(
            mz.iter()
                .zip(intensity)
                .map(|(&mz, &intensity)| Peak { mz, intensity })
                .collect(),
        ))
    }

    pub fn peaks(&self) -> &[Peak] {
        &self.peaks
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Peak> {
        self.peaks.iter()
    }

    pub fn total_intensity(&self) -> f64 {
        self.peaks.iter().map(|p| p.intensity).sum()
    }

    /// The most intense peak.
    pub fn base_peak(&self) -> Option<Peak> {
        self.peaks
            .iter()
            .copied()
            .max_by(|a, b| a.intensity.partial_cmp(&b.intensity).expect("finite intensity"))
    }

    /// Intensities scaled so the base peak is 1.
    pub fn normalized_to_base_peak(&self) -> Spectrum {
        match self.base_peak() {
            Some(base) if base.intensity > 0.0 => Spectrum {
                peaks: self
                    .peaks
                    .iter()
                    .map(|p| Peak {
                        mz: p.mz,
                        intensity: p.intensity / base.intensity,
                    })
                    .collect(),
            },
            _ => self.clone(),
        }
    }

    /// Intensities scaled to sum to 1.
    pub fn normalized_to_sum(&self) -> Spectrum {
        let total = self.total_intensity();
        if total <= 0.0 {
            return self.clone();
        }
        Spectrum {
            peaks: self
                .peaks
                .iter()
                .map(|p| Peak {
                    mz: p.mz,
                    intensity: p.intensity / total,
                })
                .collect(),
        }
    }

    /// All peaks whose m/z falls inside the deviation window around `mz`.
    pub fn peaks_within(&self, mz: f64, deviation: MassDeviation) -> &[Peak] {
        let (lo, hi) = deviation.window(mz);
        let start = self.peaks.partition_point(|p| p.mz < lo);
        let end = self.peaks.partition_point(|p| p.mz <= hi);
        &self.peaks[start..end]
    }

    /// The most intense peak inside the deviation window around `mz`.
    pub fn best_peak_within(&self, mz: f64, deviation: MassDeviation) -> Option<Peak> {
        self.peaks_within(mz, deviation)
            .iter()
            .copied()
            .max_by(|a, b| a.intensity.partial_cmp(&b.intensity).expect("finite intensity"))
    }
}

impl FromIterator<Peak> for Spectrum {
    fn from_iter<T: IntoIterator<Item = Peak>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_arrays_sorts_and_validates() {
        let spectrum = Spectrum::from_arrays(&[200.0, 100.0], &[1.0, 2.0]).unwrap();
        assert_eq!(spectrum.peaks()[0].mz, 100.0);
        assert!(Spectrum::from_arrays(&[100.0], &[]).is_err());
        assert!(Spectrum::from_arrays(&[-5.0], &[1.0]).is_err());
    }

    #[test]
    fn window_lookup_is_closed() {
        let dev = MassDeviation::new(10.0, 1e-3);
        let spectrum = Spectrum::from_arrays(&[100.0, 100.001, 100.5], &[1.0, 2.0, 3.0]).unwrap();
        let hits = spectrum.peaks_within(100.0, dev);
        assert_eq!(hits.len(), 2);
        assert_eq!(
            spectrum.best_peak_within(100.0, dev).unwrap().intensity,
            2.0
        );
    }

    #[test]
    fn base_peak_normalization() {
        let spectrum = Spectrum::from_arrays(&[100.0, 150.0], &[2.0, 4.0]).unwrap();
        let normalized = spectrum.normalized_to_base_peak();
        assert_eq!(normalized.peaks()[0].intensity, 0.5);
        assert_eq!(normalized.peaks()[1].intensity, 1.0);
    }
}
