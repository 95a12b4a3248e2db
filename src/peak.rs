//! Peak records produced by wavelet peak detection, and their conversion into
//! [`mzpeaks`] peak types.
use std::fmt;

use mzpeaks::{CentroidLike, IndexType, IndexedCoordinate};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::BoundaryError;
use crate::ridge::RidgeId;

/// A ridge that failed on its own but lies next to an accepted [`MajorPeak`]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SubPeak {
    pub ridge: RidgeId,
    pub name: String,
    pub index: usize,
    pub ridge_index: usize,
    pub scale: f64,
    pub amplitude: f64,
    pub snr: f64,
}

/// A peak accepted from a ridge line
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MajorPeak {
    pub ridge: RidgeId,
    /// The name of the ridge, `"{seed_scale}_{seed_position}"`
    pub name: String,
    /// The ridge's position at the best scale
    pub index: usize,
    /// The ridge's position at the finest scale it reached
    pub ridge_index: usize,
    /// The scale with the largest coefficient along the ridge
    pub scale: f64,
    /// The coefficient at `scale`
    pub amplitude: f64,
    pub noise: f64,
    pub snr: f64,
    pub nearby: Vec<SubPeak>,
}

impl MajorPeak {
    /// Convert to a [`mzpeaks::CentroidPeak`] at `ridge_index`, looking up its m/z
    /// and intensity. Returns `None` if either array is too short.
    pub fn as_centroid(&self, mz_array: &[f64], signal: &[f64]) -> Option<mzpeaks::CentroidPeak> {
        let mz = *mz_array.get(self.ridge_index)?;
        let intensity = *signal.get(self.ridge_index)?;
        Some(mzpeaks::CentroidPeak::new(
            mz,
            intensity as f32,
            self.ridge_index as IndexType,
        ))
    }
}

impl fmt::Display for MajorPeak {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "MajorPeak({}, {}, {}, {}, {:0.3}, {:0.3})",
            self.name, self.index, self.ridge_index, self.scale, self.amplitude, self.snr
        )
    }
}

/// What happened when a [`MajorPeak`] was refined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RefinementStatus {
    Refined,
    /// No ridge was found inside the refinement window
    NoRidge,
    /// The refinement window did not fit inside the signal
    Boundary(BoundaryError),
}

/// A [`MajorPeak`] with a re-estimated center, width and area.
///
/// When `status` is not [`RefinementStatus::Refined`], `center` is the peak's
/// `ridge_index` and `width` and `area` come from its original scale.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RefinedPeak {
    pub peak: MajorPeak,
    pub center: usize,
    pub width: f64,
    pub area: f64,
    pub status: RefinementStatus,
}

impl RefinedPeak {
    pub fn is_refined(&self) -> bool {
        matches!(self.status, RefinementStatus::Refined)
    }

    /// Convert to a [`FittedPeak`] using `mz_array` to translate the center and
    /// width into m/z. Returns `None` if either array is too short.
    pub fn as_fitted(&self, mz_array: &[f64], signal: &[f64]) -> Option<FittedPeak> {
        let mz = *mz_array.get(self.center)?;
        let intensity = *signal.get(self.center)?;
        let spacing = match (mz_array.get(self.center + 1), self.center.checked_sub(1)) {
            (Some(next), _) => next - mz,
            (None, Some(prev)) => mz - mz_array[prev],
            (None, None) => 0.0,
        };
        Some(FittedPeak::new(
            mz,
            intensity as f32,
            self.center as IndexType,
            self.peak.snr as f32,
            (self.width * spacing) as f32,
        ))
    }
}

impl fmt::Display for RefinedPeak {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "RefinedPeak({}, {}, {:0.3}, {:0.3}, {:?})",
            self.peak.name, self.center, self.width, self.area, self.status
        )
    }
}

/// A [`FittedPeak`] implements the [`CentroidLike`](https://docs.rs/mzpeaks/latest/mzpeaks/peak/trait.CentroidLike.html) trait
/// with an m/z coordinate, carrying the refined width and the signal-to-noise
/// ratio of the ridge it came from.
#[derive(Debug, Clone, Copy, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FittedPeak {
    pub mz: f64,
    pub intensity: f32,
    pub index: u32,

    pub signal_to_noise: f32,
    /// The refined width, in m/z
    pub full_width_at_half_max: f32,
}

impl FittedPeak {
    pub fn new(
        mz: f64,
        intensity: f32,
        index: u32,
        signal_to_noise: f32,
        full_width_at_half_max: f32,
    ) -> Self {
        Self {
            mz,
            intensity,
            index,
            signal_to_noise,
            full_width_at_half_max,
        }
    }
}

mzpeaks::implement_mz_coord!(FittedPeak);

impl mzpeaks::IndexedCoordinate<mzpeaks::MZ> for FittedPeak {
    #[inline]
    fn get_index(&self) -> mzpeaks::IndexType {
        self.index
    }
    #[inline]
    fn set_index(&mut self, index: mzpeaks::IndexType) {
        self.index = index
    }
}

impl From<FittedPeak> for mzpeaks::CentroidPeak {
    fn from(peak: FittedPeak) -> Self {
        peak.as_centroid()
    }
}

impl fmt::Display for FittedPeak {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "FittedPeak({}, {}, {}, {}, {})",
            self.mz, self.intensity, self.get_index(), self.full_width_at_half_max, self.signal_to_noise
        )
    }
}
