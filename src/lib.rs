//! `mzwavelet` detects peaks in mass spectra and other one dimensional signals
//! by matching their shape against a Mexican hat wavelet across many scales,
//! rather than thresholding raw intensity.
//!
//! The pipeline is:
//! 1. [`cwt`](mod@cwt) computes the continuous wavelet transform of the signal.
//! 2. [`local_maxima`] finds the local maxima at each scale.
//! 3. [`ridge`] links those maxima across scales into ridge lines.
//! 4. [`identify`](mod@identify) picks out the ridges whose signal-to-noise ratio is high enough.
//! 5. [`refine`](mod@refine) optionally re-estimates each peak's center, width and area.
//!
//! [`PeakDetector`] runs all of these steps. [`peak_detection`] runs it with
//! default settings.
//!
//! # Usage
//! ```
//! use mzwavelet::{peak_detection, ScaleSet};
//!
//! let signal: Vec<f64> = (0..3000)
//!     .map(|i| {
//!         let x = i as f64;
//!         80.0 * (-(x - 1000.0).powi(2) / 128.0).exp() + 40.0 * (-(x - 2000.0).powi(2) / 50.0).exp()
//!     })
//!     .collect();
//! let result = peak_detection(&signal, &ScaleSet::default()).unwrap();
//! assert_eq!(result.major_peaks.len(), 2);
//! for peak in result.major_peaks.iter() {
//!     println!("{}", peak);
//! }
//! ```
//!
//! ## Features
//! - `parallelism` (default): compute scales and refine peaks in parallel with `rayon`
//! - `nalgebra` (default): the [`smooth::SavitzkyGolay`] baseline smoother
//! - `ndarray`: copy coefficient matrices into `ndarray::Array2`
//! - `serde`: serialize parameters, matrices, ridges and peaks
pub mod arrayops;
pub mod cwt;
pub mod error;
pub mod identify;
pub mod local_maxima;
pub mod peak;
pub mod peak_detection;
pub mod prelude;
pub mod refine;
pub mod ridge;
pub mod smooth;
pub mod statistics;
pub mod text;
pub mod wavelet;

#[cfg(test)]
mod test_data;

pub use crate::arrayops::{CoefficientMatrix, LocalMaximumMatrix, ScaleMatrix};
pub use crate::cwt::{cwt, ConvolutionMethod, CwtEngine};
pub use crate::error::{BoundaryError, ConfigurationError, PeakDetectionError};
pub use crate::identify::{identify, IdentifyParams, NoiseEstimator, NoiseFloor, ScaleRange};
pub use crate::local_maxima::{local_maximum, LocalMaximumStrategy};
pub use crate::peak::{FittedPeak, MajorPeak, RefinedPeak, RefinementStatus, SubPeak};
pub use crate::peak_detection::{
    peak_detection, PeakDetectionResult, PeakDetector, PeakDetectorBuilder, ScaleInput,
};
pub use crate::refine::{coefficient_area, refine, AreaEstimate, RefineParams};
pub use crate::ridge::{link, RidgeId, RidgeLine, RidgeParams, RidgePoint};
pub use crate::smooth::BaselineSmoother;
pub use crate::wavelet::{
    MotherKernel, MotherWavelet, PreparedKernels, ScaleSet, WaveletKernelBuilder,
};
