//! The complete wavelet peak detection pipeline.
//!
//! A [`PeakDetector`] runs the continuous wavelet transform, finds local maxima
//! at every scale, links them into ridges, identifies the major peaks and
//! optionally refines them. [`peak_detection`] runs it with default settings.
//!
//! ```
//! use mzwavelet::peak_detection::PeakDetectorBuilder;
//! use mzwavelet::wavelet::ScaleSet;
//!
//! let signal: Vec<f64> = (0..2000)
//!     .map(|i| 50.0 * (-((i as f64 - 1000.0) / 6.0).powi(2) / 2.0).exp())
//!     .collect();
//! let detector = PeakDetectorBuilder::new().snr_threshold(2.0).build();
//! let result = detector.detect(&signal, &ScaleSet::default()).unwrap();
//! assert_eq!(result.major_peaks.len(), 1);
//! ```
use num_traits::Float;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::{CoefficientMatrix, LocalMaximumMatrix};
use crate::cwt::{ConvolutionMethod, CwtEngine};
use crate::error::{ConfigurationError, PeakDetectionError};
use crate::identify::{identify, IdentifyParams, NoiseEstimator, NoiseFloor, ScaleRange};
use crate::local_maxima::{default_window_sizes, detect, LocalMaximumStrategy};
use crate::peak::{FittedPeak, MajorPeak, RefinedPeak};
use crate::refine::{refine, RefineParams};
use crate::ridge::{link, RidgeLine, RidgeParams};
use crate::smooth::{coerce_filter_length, BaselineSmoother};
use crate::wavelet::{MotherKernel, PreparedKernels, ScaleSet};

/// The scales to transform a signal over
#[derive(Debug, Clone, Copy)]
pub enum ScaleInput<'a> {
    /// Scales that have not been validated yet
    List(&'a [f64]),
    Scales(&'a ScaleSet),
    /// Kernels prepared ahead of time for the signal's length
    Prepared(&'a PreparedKernels),
}

impl<'a> From<&'a [f64]> for ScaleInput<'a> {
    fn from(value: &'a [f64]) -> Self {
        Self::List(value)
    }
}

impl<'a> From<&'a Vec<f64>> for ScaleInput<'a> {
    fn from(value: &'a Vec<f64>) -> Self {
        Self::List(value.as_slice())
    }
}

impl<'a> From<&'a ScaleSet> for ScaleInput<'a> {
    fn from(value: &'a ScaleSet) -> Self {
        Self::Scales(value)
    }
}

impl<'a> From<&'a PreparedKernels> for ScaleInput<'a> {
    fn from(value: &'a PreparedKernels) -> Self {
        Self::Prepared(value)
    }
}

/// Everything the pipeline computed along the way
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PeakDetectionResult {
    pub major_peaks: Vec<MajorPeak>,
    /// Present when refinement was requested, one per major peak
    pub refined_peaks: Option<Vec<RefinedPeak>>,
    pub ridges: Vec<RidgeLine>,
    pub local_maxima: LocalMaximumMatrix,
    pub coefficients: CoefficientMatrix,
}

impl PeakDetectionResult {
    /// The input signal, stored as the zero scale of the coefficients
    pub fn signal(&self) -> &[f64] {
        if self.coefficients.n_columns() == 0 {
            &[]
        } else {
            self.coefficients.column(0)
        }
    }

    /// Convert the detected peaks into [`mzpeaks::CentroidPeak`]s, using the
    /// refined centers when they are available
    pub fn centroids(&self, mz_array: &[f64]) -> Vec<mzpeaks::CentroidPeak> {
        let signal = self.signal();
        match &self.refined_peaks {
            Some(refined) => refined
                .iter()
                .filter_map(|p| p.as_fitted(mz_array, signal))
                .map(mzpeaks::CentroidPeak::from)
                .collect(),
            None => self
                .major_peaks
                .iter()
                .filter_map(|p| p.as_centroid(mz_array, signal))
                .collect(),
        }
    }

    /// Convert the refined peaks into [`FittedPeak`]s. Empty when refinement was not requested.
    pub fn fitted_peaks(&self, mz_array: &[f64]) -> Vec<FittedPeak> {
        let signal = self.signal();
        self.refined_peaks
            .iter()
            .flatten()
            .filter_map(|p| p.as_fitted(mz_array, signal))
            .collect()
    }
}

/// A CWT peak detector
#[derive(Debug, Clone, PartialEq)]
pub struct PeakDetector {
    pub snr_threshold: f64,
    /// Attach rejected ridges to nearby major peaks
    pub nearby_peak: bool,
    pub peak_scale_range: ScaleRange,
    /// Local maxima below this fraction of the largest coefficient are dropped
    pub amplitude_threshold: f64,
    pub min_noise_level: NoiseFloor,
    pub ridge_length_threshold: f64,
    /// Drop positions whose height above the baseline is below this value.
    /// Requires a [`BaselineSmoother`].
    pub peak_absolute_threshold: Option<f64>,
    pub refine: bool,
    /// Leave the raw signal out when finding the largest coefficient for `amplitude_threshold`
    pub exclude_zero_scale_amplitude_threshold: bool,
    pub ridge_params: RidgeParams,
    pub strategy: LocalMaximumStrategy,
    pub noise_estimator: NoiseEstimator,
    /// How far either side of a peak to look when estimating noise
    pub noise_window: usize,
    /// How far a rejected ridge may be from a major peak to be attached to it
    pub nearby_window: usize,
    /// Peaks this close to either end of the signal are dropped. Defaults to
    /// half of `nearby_window`.
    pub boundary_exclusion: Option<usize>,
    pub filter_length: usize,
    pub filter_order: usize,
    pub refine_params: RefineParams,
    pub method: ConvolutionMethod,
}

impl Default for PeakDetector {
    fn default() -> Self {
        let identify = IdentifyParams::default();
        Self {
            snr_threshold: identify.snr_threshold,
            nearby_peak: identify.include_nearby,
            peak_scale_range: identify.peak_scale_range,
            amplitude_threshold: 0.01,
            min_noise_level: identify.min_noise_level,
            ridge_length_threshold: identify.ridge_length_threshold,
            peak_absolute_threshold: None,
            refine: false,
            exclude_zero_scale_amplitude_threshold: false,
            ridge_params: RidgeParams::default(),
            strategy: LocalMaximumStrategy::default(),
            noise_estimator: identify.noise_estimator,
            noise_window: identify.noise_window,
            nearby_window: identify.nearby_window,
            boundary_exclusion: identify.boundary_exclusion,
            filter_length: 1001,
            filter_order: 2,
            refine_params: RefineParams::default(),
            method: ConvolutionMethod::default(),
        }
    }
}

/// A builder for configuring [`PeakDetector`]
#[derive(Debug, Clone, Default)]
pub struct PeakDetectorBuilder {
    detector: PeakDetector,
}

impl PeakDetectorBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snr_threshold(&mut self, snr_threshold: f64) -> &mut Self {
        self.detector.snr_threshold = snr_threshold;
        self
    }

    pub fn nearby_peak(&mut self, nearby_peak: bool) -> &mut Self {
        self.detector.nearby_peak = nearby_peak;
        self
    }

    pub fn peak_scale_range(&mut self, peak_scale_range: ScaleRange) -> &mut Self {
        self.detector.peak_scale_range = peak_scale_range;
        self
    }

    pub fn amplitude_threshold(&mut self, amplitude_threshold: f64) -> &mut Self {
        self.detector.amplitude_threshold = amplitude_threshold;
        self
    }

    pub fn min_noise_level(&mut self, min_noise_level: NoiseFloor) -> &mut Self {
        self.detector.min_noise_level = min_noise_level;
        self
    }

    pub fn ridge_length_threshold(&mut self, ridge_length_threshold: f64) -> &mut Self {
        self.detector.ridge_length_threshold = ridge_length_threshold;
        self
    }

    pub fn peak_absolute_threshold(&mut self, peak_absolute_threshold: Option<f64>) -> &mut Self {
        self.detector.peak_absolute_threshold = peak_absolute_threshold;
        self
    }

    pub fn refine(&mut self, refine: bool) -> &mut Self {
        self.detector.refine = refine;
        self
    }

    pub fn exclude_zero_scale_amplitude_threshold(&mut self, exclude: bool) -> &mut Self {
        self.detector.exclude_zero_scale_amplitude_threshold = exclude;
        self
    }

    pub fn ridge_params(&mut self, ridge_params: RidgeParams) -> &mut Self {
        self.detector.ridge_params = ridge_params;
        self
    }

    pub fn strategy(&mut self, strategy: LocalMaximumStrategy) -> &mut Self {
        self.detector.strategy = strategy;
        self
    }

    pub fn noise_estimator(&mut self, noise_estimator: NoiseEstimator) -> &mut Self {
        self.detector.noise_estimator = noise_estimator;
        self
    }

    pub fn noise_window(&mut self, noise_window: usize) -> &mut Self {
        self.detector.noise_window = noise_window;
        self
    }

    pub fn nearby_window(&mut self, nearby_window: usize) -> &mut Self {
        self.detector.nearby_window = nearby_window;
        self
    }

    pub fn boundary_exclusion(&mut self, boundary_exclusion: Option<usize>) -> &mut Self {
        self.detector.boundary_exclusion = boundary_exclusion;
        self
    }

    pub fn filter_length(&mut self, filter_length: usize) -> &mut Self {
        self.detector.filter_length = filter_length;
        self
    }

    pub fn filter_order(&mut self, filter_order: usize) -> &mut Self {
        self.detector.filter_order = filter_order;
        self
    }

    pub fn refine_params(&mut self, refine_params: RefineParams) -> &mut Self {
        self.detector.refine_params = refine_params;
        self
    }

    pub fn method(&mut self, method: ConvolutionMethod) -> &mut Self {
        self.detector.method = method;
        self
    }

    pub fn build(&self) -> PeakDetector {
        self.detector.clone()
    }
}

impl From<PeakDetectorBuilder> for PeakDetector {
    fn from(value: PeakDetectorBuilder) -> Self {
        value.detector
    }
}

impl PeakDetector {
    /// The settings used to pick major peaks out of the ridges
    pub fn identify_params(&self) -> IdentifyParams {
        IdentifyParams {
            snr_threshold: self.snr_threshold,
            peak_scale_range: self.peak_scale_range,
            min_noise_level: self.min_noise_level,
            ridge_length_threshold: self.ridge_length_threshold,
            include_nearby: self.nearby_peak,
            noise_estimator: self.noise_estimator,
            noise_window: self.noise_window,
            nearby_window: self.nearby_window,
            boundary_exclusion: self.boundary_exclusion,
        }
    }

    /// Detect peaks in `signal`.
    ///
    /// # Errors
    /// [`PeakDetectionError::MissingDependency`] if `peak_absolute_threshold` is
    /// set, since no baseline smoother is available. Use
    /// [`PeakDetector::detect_with_smoother`] instead.
    pub fn detect<'a, F: Float>(
        &self,
        signal: &[F],
        scales: impl Into<ScaleInput<'a>>,
    ) -> Result<PeakDetectionResult, PeakDetectionError> {
        self.run(signal, scales.into(), None)
    }

    /// Detect peaks in `signal`, using `smoother` to estimate the baseline for
    /// `peak_absolute_threshold`
    pub fn detect_with_smoother<'a, F: Float>(
        &self,
        signal: &[F],
        scales: impl Into<ScaleInput<'a>>,
        smoother: &dyn BaselineSmoother,
    ) -> Result<PeakDetectionResult, PeakDetectionError> {
        self.run(signal, scales.into(), Some(smoother))
    }

    fn transform(
        &self,
        signal: &[f64],
        scales: ScaleInput<'_>,
    ) -> Result<CoefficientMatrix, ConfigurationError> {
        let engine = CwtEngine::new(MotherKernel::default(), self.method);
        match scales {
            ScaleInput::List(scales) => engine.transform(signal, &ScaleSet::try_from(scales)?),
            ScaleInput::Scales(scales) => engine.transform(signal, scales),
            ScaleInput::Prepared(kernels) => engine.transform_prepared(signal, kernels),
        }
    }

    /// Zero every row of `local_maxima` where the signal does not rise at least
    /// `threshold` above its baseline
    fn apply_absolute_threshold(
        &self,
        signal: &[f64],
        threshold: f64,
        smoother: &dyn BaselineSmoother,
        local_maxima: &mut LocalMaximumMatrix,
    ) -> Result<(), PeakDetectionError> {
        let n = signal.len();
        let filter_length = coerce_filter_length(self.filter_length, n).ok_or(
            ConfigurationError::DimensionMismatch {
                what: "signal points for the baseline filter",
                expected: 1,
                received: n,
            },
        )?;
        if filter_length != self.filter_length {
            log::warn!(
                "Adjusted the baseline filter length from {} to {filter_length} for a signal of {n} points",
                self.filter_length
            );
        }
        let baseline = smoother.smooth(signal, filter_length, self.filter_order)?;
        if baseline.len() != n {
            return Err(ConfigurationError::DimensionMismatch {
                what: "baseline points",
                expected: n,
                received: baseline.len(),
            }
            .into());
        }
        let mut zeroed = 0;
        for (i, (y, b)) in signal.iter().zip(baseline.iter()).enumerate() {
            if y - b < threshold {
                local_maxima.zero_row(i);
                zeroed += 1;
            }
        }
        log::debug!("Removed {zeroed} positions less than {threshold} above the baseline");
        Ok(())
    }

    fn run<F: Float>(
        &self,
        signal: &[F],
        scales: ScaleInput<'_>,
        smoother: Option<&dyn BaselineSmoother>,
    ) -> Result<PeakDetectionResult, PeakDetectionError> {
        let absolute = match (self.peak_absolute_threshold, smoother) {
            (Some(threshold), None) => {
                return Err(PeakDetectionError::MissingDependency(threshold))
            }
            (Some(threshold), Some(smoother)) => Some((threshold, smoother)),
            (None, _) => None,
        };
        let signal: Vec<f64> = signal
            .iter()
            .map(|v| v.to_f64().unwrap_or(f64::NAN))
            .collect();

        let coefficients = self.transform(&signal, scales)?;

        let amplitude_threshold = self.amplitude_threshold
            * coefficients.max_value(self.exclude_zero_scale_amplitude_threshold);
        let windows = default_window_sizes(coefficients.scales(), self.ridge_params.min_window);
        let mut local_maxima = detect(&coefficients, &windows, amplitude_threshold, self.strategy)?;

        if let Some((threshold, smoother)) = absolute {
            self.apply_absolute_threshold(&signal, threshold, smoother, &mut local_maxima)?;
        }

        let ridges = link(&local_maxima, &self.ridge_params);
        let major_peaks = identify(&signal, &ridges, &coefficients, &self.identify_params())?;
        let refined_peaks = if self.refine {
            Some(refine(
                &signal,
                &major_peaks,
                &self.refine_params,
                self.strategy,
            )?)
        } else {
            None
        };

        log::debug!(
            "Detected {} major peaks in {} points over {} scales",
            major_peaks.len(),
            signal.len(),
            coefficients.n_columns() - 1
        );
        Ok(PeakDetectionResult {
            major_peaks,
            refined_peaks,
            ridges,
            local_maxima,
            coefficients,
        })
    }
}

/// Detect peaks in `signal` over `scales` with the default [`PeakDetector`]
pub fn peak_detection<'a, F: Float>(
    signal: &[F],
    scales: impl Into<ScaleInput<'a>>,
) -> Result<PeakDetectionResult, PeakDetectionError> {
    PeakDetector::default().detect(signal, scales)
}
