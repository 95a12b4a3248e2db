//! Re-estimate the center, width and area of major peaks.
//!
//! Each peak is re-detected inside a window around it using a dense set of
//! scales bracketing the scale it was found at. The strongest ridge in that
//! window gives the refined center and scale.
use std::collections::HashMap;

use cfg_if::cfg_if;

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::{linspace, trapz};
use crate::cwt::{ConvolutionMethod, CwtEngine};
use crate::error::{BoundaryError, ConfigurationError};
use crate::identify::{identify, IdentifyParams, NoiseFloor, ScaleRange};
use crate::local_maxima::{default_window_sizes, detect, LocalMaximumStrategy, DEFAULT_MIN_WINDOW};
use crate::peak::{MajorPeak, RefinedPeak, RefinementStatus};
use crate::ridge::{link, RidgeParams};
use crate::wavelet::{mexican_hat, MotherKernel, PreparedKernels, ScaleSet, WaveletKernelBuilder};

/// How the area of a refined peak is estimated
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum AreaEstimate {
    /// From the peak's strongest wavelet coefficient and the scale it occurs at,
    /// see [`coefficient_area`]
    #[default]
    Coefficient,
    /// The trapezoidal integral of the signal within one scale of the center
    SignalIntegral,
}

impl AreaEstimate {
    fn estimate(&self, signal: &[f64], center: usize, amplitude: f64, scale: f64) -> f64 {
        match self {
            AreaEstimate::Coefficient => coefficient_area(amplitude, scale),
            AreaEstimate::SignalIntegral => area_around(signal, center, scale),
        }
    }
}

/// The area of a Gaussian peak whose strongest Mexican hat coefficient is
/// `amplitude`, reached at `scale`.
///
/// A Gaussian of height `A` and width `σ` responds most strongly at scale
/// `s = √5·σ`, where the coefficient is `ψ(0)·A·√(2π)·√s·5/(6√6)`. Inverting
/// that gives `A·σ·√(2π)`.
pub fn coefficient_area(amplitude: f64, scale: f64) -> f64 {
    let response = mexican_hat(0.0) * 5.0 / (6.0 * 6.0f64.sqrt());
    amplitude * scale.sqrt() / (response * 5.0f64.sqrt())
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RefineParams {
    /// The number of scales tried around each peak's scale
    pub scale_count: usize,
    pub lower_factor: f64,
    pub upper_factor: f64,
    /// The window half width, as a multiple of the largest scale tried
    pub window_factor: f64,
    /// The support half width of the Mexican hat used for refinement
    pub kernel_half_width: f64,
    pub area: AreaEstimate,
}

impl Default for RefineParams {
    fn default() -> Self {
        Self {
            scale_count: 16,
            lower_factor: 0.5,
            upper_factor: 1.5,
            window_factor: 6.0,
            kernel_half_width: 5.0,
            area: AreaEstimate::default(),
        }
    }
}

impl RefineParams {
    /// The scales tried when refining a peak found at `scale`
    pub fn dense_scales(&self, scale: f64) -> Result<ScaleSet, ConfigurationError> {
        let lower = (self.lower_factor * scale).max(1.0);
        let upper = self.upper_factor * scale;
        if upper <= lower || self.scale_count < 2 {
            ScaleSet::new(vec![lower])
        } else {
            ScaleSet::new(linspace(lower, upper, self.scale_count))
        }
    }

    pub fn window_half_width(&self, scales: &ScaleSet) -> usize {
        (self.window_factor * scales.max_scale()).ceil() as usize
    }
}

/// The dense scales and kernels shared by every peak found at one scale
#[derive(Debug)]
struct RefinementLayout {
    half_width: usize,
    kernels: Option<PreparedKernels>,
}

impl RefinementLayout {
    fn new(mother: &MotherKernel, scale: f64, params: &RefineParams, signal_len: usize) -> Self {
        let scales = match params.dense_scales(scale) {
            Ok(scales) => scales,
            Err(e) => {
                log::warn!("Cannot refine peaks at scale {scale}: {e}");
                return Self {
                    half_width: 0,
                    kernels: None,
                };
            }
        };
        let half_width = params.window_half_width(&scales);
        let window_len = 2 * half_width + 1;
        let kernels = if window_len > signal_len {
            None
        } else {
            match PreparedKernels::new(mother, &scales, window_len, ConvolutionMethod::Auto) {
                Ok(kernels) => Some(kernels),
                Err(e) => {
                    log::warn!("Cannot refine peaks at scale {scale}: {e}");
                    None
                }
            }
        };
        Self {
            half_width,
            kernels,
        }
    }
}

/// The settings for identifying candidates inside a refinement window: every
/// ridge qualifies and the strongest is chosen afterwards
fn candidate_params() -> IdentifyParams {
    IdentifyParams {
        snr_threshold: f64::NEG_INFINITY,
        peak_scale_range: ScaleRange::AtLeast(0.0),
        min_noise_level: NoiseFloor::Fixed(0.0),
        ridge_length_threshold: 0.0,
        include_nearby: false,
        boundary_exclusion: Some(0),
        ..Default::default()
    }
}

/// The trapezoidal area of `signal` within `scale` points of `center`
fn area_around(signal: &[f64], center: usize, scale: f64) -> f64 {
    if signal.is_empty() {
        return 0.0;
    }
    let half = (scale.round() as usize).max(1);
    let lo = center.saturating_sub(half);
    let hi = (center + half).min(signal.len() - 1);
    if lo >= hi {
        return 0.0;
    }
    let x: Vec<f64> = (lo..=hi).map(|i| i as f64).collect();
    trapz(&x, &signal[lo..=hi])
}

fn unrefined(
    signal: &[f64],
    peak: &MajorPeak,
    area: AreaEstimate,
    status: RefinementStatus,
) -> RefinedPeak {
    RefinedPeak {
        peak: peak.clone(),
        center: peak.ridge_index,
        width: 2.0 * peak.scale,
        area: area.estimate(signal, peak.ridge_index, peak.amplitude, peak.scale),
        status,
    }
}

fn refine_peak(
    signal: &[f64],
    peak: &MajorPeak,
    layout: &RefinementLayout,
    area: AreaEstimate,
    strategy: LocalMaximumStrategy,
) -> RefinedPeak {
    let n = signal.len();
    let h = layout.half_width;
    if peak.index < h || peak.index + h >= n {
        log::debug!("Peak {} is too close to the edge to refine", peak.name);
        return unrefined(
            signal,
            peak,
            area,
            RefinementStatus::Boundary(BoundaryError {
                index: peak.index,
                half_width: h,
                len: n,
            }),
        );
    }
    let Some(kernels) = layout.kernels.as_ref() else {
        return unrefined(signal, peak, area, RefinementStatus::NoRidge);
    };

    let start = peak.index - h;
    let window = &signal[start..=peak.index + h];
    let candidates = CwtEngine::default()
        .transform_prepared(window, kernels)
        .and_then(|coefs| {
            let windows = default_window_sizes(coefs.scales(), DEFAULT_MIN_WINDOW);
            let maxima = detect(&coefs, &windows, 0.0, strategy)?;
            let ridges = link(&maxima, &RidgeParams::default());
            identify(window, &ridges, &coefs, &candidate_params())
        });
    let candidates = match candidates {
        Ok(candidates) => candidates,
        Err(e) => {
            log::warn!("Failed to refine peak {}: {e}", peak.name);
            return unrefined(signal, peak, area, RefinementStatus::NoRidge);
        }
    };

    match candidates
        .iter()
        .max_by(|a, b| a.amplitude.total_cmp(&b.amplitude))
    {
        Some(best) => {
            let center = start + best.ridge_index;
            RefinedPeak {
                peak: peak.clone(),
                center,
                width: 2.0 * best.scale,
                area: area.estimate(signal, center, best.amplitude, best.scale),
                status: RefinementStatus::Refined,
            }
        }
        None => unrefined(signal, peak, area, RefinementStatus::NoRidge),
    }
}

cfg_if! {
    if #[cfg(feature = "parallelism")] {
        fn refine_all(signal: &[f64], peaks: &[MajorPeak], layouts: &HashMap<u64, RefinementLayout>, area: AreaEstimate, strategy: LocalMaximumStrategy) -> Vec<RefinedPeak> {
            peaks
                .par_iter()
                .map(|peak| refine_peak(signal, peak, &layouts[&peak.scale.to_bits()], area, strategy))
                .collect()
        }
    } else {
        fn refine_all(signal: &[f64], peaks: &[MajorPeak], layouts: &HashMap<u64, RefinementLayout>, area: AreaEstimate, strategy: LocalMaximumStrategy) -> Vec<RefinedPeak> {
            peaks
                .iter()
                .map(|peak| refine_peak(signal, peak, &layouts[&peak.scale.to_bits()], area, strategy))
                .collect()
        }
    }
}

/// Refine every peak in `peaks`, returning one [`RefinedPeak`] per input peak
/// in the same order.
///
/// Peaks whose window does not fit in the signal, or whose window holds no
/// ridge, keep their unrefined center and say so in their status.
///
/// # Errors
/// [`ConfigurationError`] when `params.kernel_half_width` cannot support a wavelet.
pub fn refine(
    signal: &[f64],
    peaks: &[MajorPeak],
    params: &RefineParams,
    strategy: LocalMaximumStrategy,
) -> Result<Vec<RefinedPeak>, ConfigurationError> {
    let mother = WaveletKernelBuilder::new()
        .half_width(params.kernel_half_width)
        .build()?;

    let mut layouts: HashMap<u64, RefinementLayout> = HashMap::new();
    for peak in peaks {
        layouts
            .entry(peak.scale.to_bits())
            .or_insert_with(|| RefinementLayout::new(&mother, peak.scale, params, signal.len()));
    }

    let refined = refine_all(signal, peaks, &layouts, params.area, strategy);
    log::debug!(
        "Refined {} of {} peaks over {} distinct scales",
        refined.iter().filter(|p| p.is_refined()).count(),
        refined.len(),
        layouts.len()
    );
    Ok(refined)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cwt::cwt;
    use crate::ridge::RidgeId;
    use crate::test_data::{gaussian_signal, noisy_spectrum, PEAKS};
    use rstest::rstest;
    use std::f64::consts::PI;

    fn major_peaks(signal: &[f64]) -> Vec<MajorPeak> {
        let coefs = cwt(signal, &ScaleSet::default()).unwrap();
        let windows = default_window_sizes(coefs.scales(), DEFAULT_MIN_WINDOW);
        let threshold = 0.01 * coefs.max_value(true);
        let maxima = detect(&coefs, &windows, threshold, LocalMaximumStrategy::Faster).unwrap();
        let ridges = link(&maxima, &RidgeParams::default());
        identify(signal, &ridges, &coefs, &IdentifyParams::default()).unwrap()
    }

    fn peak_at(index: usize, scale: f64) -> MajorPeak {
        MajorPeak {
            ridge: RidgeId(0),
            name: format!("{scale}_{index}"),
            index,
            ridge_index: index,
            scale,
            amplitude: 10.0,
            noise: 1.0,
            snr: 10.0,
            nearby: Vec::new(),
        }
    }

    #[test]
    fn test_dense_scales() {
        let params = RefineParams::default();
        let scales = params.dense_scales(16.0).unwrap();
        assert_eq!(scales.len(), 16);
        assert_eq!(scales.as_slice()[0], 8.0);
        assert!((scales.max_scale() - 24.0).abs() < 1e-12);
        assert_eq!(params.window_half_width(&scales), 144);

        let scales = params.dense_scales(1.0).unwrap();
        assert_eq!(scales.as_slice()[0], 1.0);
        assert!((scales.max_scale() - 1.5).abs() < 1e-12);

        let scales = params.dense_scales(0.5).unwrap();
        assert_eq!(scales.as_slice(), &[1.0]);
    }

    #[test]
    fn test_area_around() {
        let signal = vec![1.0; 20];
        assert!((area_around(&signal, 10, 3.0) - 6.0).abs() < 1e-12);
        assert!((area_around(&signal, 1, 3.0) - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_coefficient_area() {
        // The continuous response of a Gaussian at its best scale
        let (height, sigma) = (10.0, 4.0);
        let scale = 5.0f64.sqrt() * sigma;
        let coefficient = mexican_hat(0.0) * height * (2.0 * PI).sqrt() * scale.sqrt() * 5.0
            / (6.0 * 6.0f64.sqrt());
        let area = coefficient_area(coefficient, scale);
        assert!((area - height * sigma * (2.0 * PI).sqrt()).abs() < 1e-9, "{area}");
        assert_eq!(coefficient_area(0.0, 8.0), 0.0);
    }

    #[test_log::test]
    fn test_refine_noiseless_area() {
        let (center, sigma, height) = (1000.0, 8.0, 100.0);
        let signal = gaussian_signal(2000, &[(center, sigma, height)]);
        let expected = height * sigma * (2.0 * PI).sqrt();
        let refined = refine(
            &signal,
            &[peak_at(1000, 18.0)],
            &RefineParams::default(),
            LocalMaximumStrategy::Faster,
        )
        .unwrap();
        let peak = &refined[0];
        assert!(peak.is_refined(), "{peak}");
        assert!(peak.center.abs_diff(1000) <= 1, "{peak}");
        assert!(
            (peak.area - expected).abs() / expected < 0.05,
            "{peak} expected area {expected}"
        );
    }

    #[rstest]
    fn test_refine_spectrum(
        #[values(AreaEstimate::Coefficient, AreaEstimate::SignalIntegral)] area: AreaEstimate,
    ) {
        let signal = noisy_spectrum();
        let peaks = major_peaks(&signal);
        assert_eq!(peaks.len(), PEAKS.len());
        let params = RefineParams {
            area,
            ..Default::default()
        };
        let refined = refine(&signal, &peaks, &params, LocalMaximumStrategy::Faster).unwrap();
        assert_eq!(refined.len(), peaks.len());

        for (peak, (center, sigma, height)) in refined.iter().zip(PEAKS) {
            assert!(peak.is_refined(), "{peak}");
            let h = params.window_half_width(&params.dense_scales(peak.peak.scale).unwrap());
            assert!(peak.center >= peak.peak.index - h && peak.center <= peak.peak.index + h);
            assert!(peak.center.abs_diff(center as usize) <= 6, "{peak}");
            assert!(peak.width > 0.0);
            let expected = height * sigma * (2.0 * PI).sqrt();
            assert!(
                (peak.area - expected).abs() / expected < 0.1,
                "{peak} expected area {expected}"
            );
        }

        let again = refine(&signal, &peaks, &params, LocalMaximumStrategy::Faster).unwrap();
        assert_eq!(refined, again);
    }

    #[test]
    fn test_boundary_and_no_ridge() {
        let signal = noisy_spectrum();
        let peaks = vec![peak_at(5, 8.0), peak_at(1995, 8.0)];
        let refined = refine(&signal, &peaks, &RefineParams::default(), LocalMaximumStrategy::New).unwrap();
        for (peak, expected) in refined.iter().zip(peaks.iter()) {
            assert_eq!(peak.center, expected.ridge_index);
            assert_eq!(
                peak.status,
                RefinementStatus::Boundary(BoundaryError {
                    index: expected.index,
                    half_width: 72,
                    len: signal.len()
                })
            );
        }

        let flat = vec![0.0; 400];
        let refined = refine(&flat, &[peak_at(200, 4.0)], &RefineParams::default(), LocalMaximumStrategy::Faster).unwrap();
        assert_eq!(refined[0].status, RefinementStatus::NoRidge);
        assert_eq!(refined[0].center, 200);
        assert_eq!(refined[0].width, 8.0);
        assert_eq!(refined[0].area, coefficient_area(10.0, 4.0));
    }

    #[test]
    fn test_invalid_kernel() {
        let params = RefineParams {
            kernel_half_width: 0.0,
            ..Default::default()
        };
        assert!(refine(&[1.0, 2.0], &[], &params, LocalMaximumStrategy::Faster).is_err());
    }
}
