//! Select major peaks from ridge lines by their signal-to-noise ratio.
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::CoefficientMatrix;
use crate::error::ConfigurationError;
use crate::peak::{MajorPeak, SubPeak};
use crate::ridge::{RidgeLine, RidgePoint};
use crate::statistics;

/// The scales a ridge's best scale may be chosen from
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ScaleRange {
    AtLeast(f64),
    /// An inclusive range
    Between(f64, f64),
}

impl Default for ScaleRange {
    fn default() -> Self {
        Self::AtLeast(5.0)
    }
}

impl ScaleRange {
    pub fn contains(&self, scale: f64) -> bool {
        match self {
            ScaleRange::AtLeast(lo) => scale >= *lo,
            ScaleRange::Between(lo, hi) => scale >= *lo && scale <= *hi,
        }
    }
}

/// How the noise level around a peak is estimated.
///
/// The coefficient-based estimators work on the finest wavelet scale, where
/// peaks contribute little and noise dominates. The `DataMean` estimators work
/// on the raw signal.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NoiseEstimator {
    /// A quantile of the absolute coefficients
    Quantile(f64),
    StandardDeviation,
    /// Median absolute deviation of the coefficients around zero
    MedianAbsoluteDeviation,
    /// The mean absolute signal
    DataMean,
    /// The mean of the signal values below a quantile of the signal
    DataMeanQuantile(f64),
}

impl Default for NoiseEstimator {
    fn default() -> Self {
        Self::Quantile(0.95)
    }
}

impl NoiseEstimator {
    fn uses_signal(&self) -> bool {
        matches!(self, Self::DataMean | Self::DataMeanQuantile(_))
    }

    /// Estimate the noise level of `values`, the coefficients or the signal in
    /// the window around a peak
    pub fn estimate(&self, values: &[f64]) -> f64 {
        match self {
            NoiseEstimator::Quantile(p) => {
                let abs: Vec<f64> = values.iter().map(|v| v.abs()).collect();
                statistics::quantile(&abs, *p)
            }
            NoiseEstimator::StandardDeviation => statistics::standard_deviation(values),
            NoiseEstimator::MedianAbsoluteDeviation => {
                statistics::median_absolute_deviation(values, 0.0)
            }
            NoiseEstimator::DataMean => {
                let abs: Vec<f64> = values.iter().map(|v| v.abs()).collect();
                statistics::mean(&abs)
            }
            NoiseEstimator::DataMeanQuantile(p) => {
                let cutoff = statistics::quantile(values, *p);
                let below: Vec<f64> = values.iter().copied().filter(|v| *v <= cutoff).collect();
                statistics::mean(&below)
            }
        }
    }
}

/// The lowest noise level a peak may be assigned
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum NoiseFloor {
    /// A fraction of the largest wavelet coefficient
    Relative(f64),
    Fixed(f64),
}

impl Default for NoiseFloor {
    fn default() -> Self {
        Self::Relative(0.01 / 3.0)
    }
}

impl NoiseFloor {
    pub fn resolve(&self, coefficients: &CoefficientMatrix) -> f64 {
        match self {
            NoiseFloor::Relative(fraction) => {
                let max = coefficients.max_value(true);
                if max.is_finite() {
                    fraction * max
                } else {
                    0.0
                }
            }
            NoiseFloor::Fixed(level) => *level,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct IdentifyParams {
    pub snr_threshold: f64,
    pub peak_scale_range: ScaleRange,
    pub min_noise_level: NoiseFloor,
    /// A ridge must reach at least this scale, or the largest scale if that is smaller
    pub ridge_length_threshold: f64,
    pub include_nearby: bool,
    /// How far a rejected ridge may be from a major peak to be attached to it
    pub nearby_window: usize,
    /// How far either side of a peak to look when estimating noise
    pub noise_window: usize,
    pub noise_estimator: NoiseEstimator,
    /// Peaks this close to either end of the signal are dropped. Defaults to
    /// half of `nearby_window`.
    pub boundary_exclusion: Option<usize>,
}

impl Default for IdentifyParams {
    fn default() -> Self {
        Self {
            snr_threshold: 3.0,
            peak_scale_range: ScaleRange::default(),
            min_noise_level: NoiseFloor::default(),
            ridge_length_threshold: 24.0,
            include_nearby: true,
            nearby_window: 150,
            noise_window: 500,
            noise_estimator: NoiseEstimator::default(),
            boundary_exclusion: None,
        }
    }
}

impl IdentifyParams {
    pub fn boundary_exclusion(&self) -> usize {
        self.boundary_exclusion.unwrap_or(self.nearby_window / 2)
    }
}

/// A ridge with its best scale and signal-to-noise ratio, before acceptance
#[derive(Debug, Clone)]
struct RidgeSummary<'a> {
    ridge: &'a RidgeLine,
    best: Option<RidgePoint>,
    amplitude: f64,
    noise: f64,
    snr: f64,
}

impl RidgeSummary<'_> {
    fn index(&self) -> usize {
        self.best
            .map(|p| p.position)
            .unwrap_or(self.ridge.last_point().position)
    }

    fn ridge_index(&self) -> usize {
        self.ridge.last_point().position
    }

    fn scale(&self) -> f64 {
        self.best.map(|p| p.scale).unwrap_or(0.0)
    }

    fn as_sub_peak(&self) -> SubPeak {
        SubPeak {
            ridge: self.ridge.id,
            name: self.ridge.name(),
            index: self.index(),
            ridge_index: self.ridge_index(),
            scale: self.scale(),
            amplitude: self.amplitude,
            snr: self.snr,
        }
    }

    fn into_major_peak(self) -> MajorPeak {
        MajorPeak {
            ridge: self.ridge.id,
            name: self.ridge.name(),
            index: self.index(),
            ridge_index: self.ridge_index(),
            scale: self.scale(),
            amplitude: self.amplitude,
            noise: self.noise,
            snr: self.snr,
            nearby: Vec::new(),
        }
    }
}

fn signal_to_noise(amplitude: f64, noise: f64) -> f64 {
    if noise > 0.0 {
        amplitude / noise
    } else if amplitude > 0.0 {
        f64::INFINITY
    } else {
        0.0
    }
}

/// The column noise is estimated from: scale 1 if present, else the finest wavelet scale
fn noise_column(coefficients: &CoefficientMatrix) -> usize {
    coefficients
        .column_of_scale(1.0)
        .unwrap_or(if coefficients.n_columns() > 1 { 1 } else { 0 })
}

/// Choose the major peaks among `ridges`.
///
/// Each ridge's best scale is the scale inside `peak_scale_range` with the
/// largest coefficient. Its noise level is estimated in a window around the
/// ridge's finest position and floored at `min_noise_level`. A ridge is
/// accepted when its seed scale reaches the ridge length threshold, its SNR
/// beats `snr_threshold` and it is clear of the signal's ends.
///
/// The peaks are returned in order of `ridge_index`.
pub fn identify(
    signal: &[f64],
    ridges: &[RidgeLine],
    coefficients: &CoefficientMatrix,
    params: &IdentifyParams,
) -> Result<Vec<MajorPeak>, ConfigurationError> {
    let n = signal.len();
    if n != coefficients.n_rows() {
        return Err(ConfigurationError::DimensionMismatch {
            what: "coefficient rows for the signal",
            expected: n,
            received: coefficients.n_rows(),
        });
    }
    if ridges.is_empty() || n == 0 {
        return Ok(Vec::new());
    }

    let max_scale = coefficients
        .scales()
        .iter()
        .copied()
        .fold(f64::NEG_INFINITY, f64::max);
    let length_threshold = params.ridge_length_threshold.min(max_scale);
    let noise_floor = params.min_noise_level.resolve(coefficients);
    let exclusion = params.boundary_exclusion();
    let noise_source = if params.noise_estimator.uses_signal() {
        signal
    } else {
        coefficients.column(noise_column(coefficients))
    };

    let summaries: Vec<RidgeSummary> = ridges
        .iter()
        .map(|ridge| {
            let best = ridge
                .iter()
                .filter(|p| p.scale > 0.0 && params.peak_scale_range.contains(p.scale))
                .copied()
                .max_by(|a, b| {
                    coefficients
                        .get(a.position, a.column)
                        .total_cmp(&coefficients.get(b.position, b.column))
                        // Prefer the coarser point on ties
                        .then(b.column.cmp(&a.column))
                });
            let amplitude = best
                .map(|p| coefficients.get(p.position, p.column))
                .unwrap_or(0.0);
            let center = ridge.last_point().position;
            let lo = center.saturating_sub(params.noise_window);
            let hi = (center + params.noise_window + 1).min(n);
            let noise = params
                .noise_estimator
                .estimate(&noise_source[lo..hi])
                .max(noise_floor);
            let snr = signal_to_noise(amplitude, noise);
            RidgeSummary {
                ridge,
                best,
                amplitude,
                noise,
                snr,
            }
        })
        .collect();

    let excluded = |s: &RidgeSummary| {
        let i = s.ridge_index();
        i < exclusion || i + exclusion >= n
    };

    let mut accepted = Vec::new();
    let mut rejected = Vec::new();
    for summary in summaries {
        let keep = summary.best.is_some()
            && summary.ridge.max_scale() >= length_threshold
            && summary.snr > params.snr_threshold
            && !excluded(&summary);
        if log::log_enabled!(log::Level::Trace) {
            log::trace!(
                "Ridge {} at {} scale {} amplitude {:0.3} noise {:0.3} SNR {:0.3}: {}",
                summary.ridge.name(),
                summary.ridge_index(),
                summary.scale(),
                summary.amplitude,
                summary.noise,
                summary.snr,
                if keep { "accepted" } else { "rejected" }
            );
        }
        if keep {
            accepted.push(summary.into_major_peak());
        } else {
            rejected.push(summary);
        }
    }
    accepted.sort_by_key(|p| (p.ridge_index, p.ridge));

    if params.include_nearby && !accepted.is_empty() {
        for summary in rejected.iter() {
            if summary.amplitude <= 0.0 || excluded(summary) {
                continue;
            }
            let position = summary.ridge_index();
            let nearest = accepted
                .iter()
                .enumerate()
                .map(|(i, p)| (i, p.ridge_index.abs_diff(position)))
                .filter(|(_, d)| *d <= params.nearby_window)
                .min_by_key(|(_, d)| *d);
            if let Some((i, _)) = nearest {
                accepted[i].nearby.push(summary.as_sub_peak());
            }
        }
    }

    log::debug!(
        "Identified {} major peaks from {} ridges, SNR > {}",
        accepted.len(),
        ridges.len(),
        params.snr_threshold
    );
    Ok(accepted)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::cwt::cwt;
    use crate::local_maxima::{default_window_sizes, detect, LocalMaximumStrategy, DEFAULT_MIN_WINDOW};
    use crate::ridge::{link, RidgeId, RidgeParams};
    use crate::test_data::{noisy_spectrum, PEAKS};
    use crate::wavelet::ScaleSet;

    const N: usize = 400;
    const SCALES: [f64; 5] = [0.0, 1.0, 2.0, 4.0, 8.0];

    fn point(column: usize, position: usize) -> RidgePoint {
        RidgePoint {
            column,
            scale: SCALES[column],
            position,
        }
    }

    /// Three ridges: a strong one at 200, a weak neighbor at 230, and a strong
    /// one too close to the start of the signal
    fn fixture() -> (Vec<f64>, Vec<RidgeLine>, CoefficientMatrix) {
        let signal = vec![0.0; N];
        let mut columns = vec![vec![0.0; N]; SCALES.len()];
        columns[1] = vec![1.0; N];
        columns[4][200] = 50.0;
        columns[3][200] = 30.0;
        columns[2][201] = 20.0;
        columns[4][230] = 2.0;
        columns[4][10] = 100.0;
        let coefs = CoefficientMatrix::from_columns(SCALES.to_vec(), N, columns);
        let ridges = vec![
            RidgeLine::from_points(
                RidgeId(0),
                vec![point(4, 10), point(0, 10)],
            ),
            RidgeLine::from_points(
                RidgeId(1),
                vec![point(4, 200), point(3, 200), point(2, 201), point(1, 201), point(0, 201)],
            ),
            RidgeLine::from_points(RidgeId(2), vec![point(4, 230), point(0, 231)]),
        ];
        (signal, ridges, coefs)
    }

    #[test]
    fn test_identify_with_nearby() {
        let (signal, ridges, coefs) = fixture();
        let peaks = identify(&signal, &ridges, &coefs, &IdentifyParams::default()).unwrap();
        assert_eq!(peaks.len(), 1);
        let peak = &peaks[0];
        assert_eq!(peak.ridge, RidgeId(1));
        assert_eq!(peak.name, "8_200");
        assert_eq!(peak.index, 200);
        assert_eq!(peak.ridge_index, 201);
        assert_eq!(peak.scale, 8.0);
        assert_eq!(peak.amplitude, 50.0);
        assert_eq!(peak.noise, 1.0);
        assert_eq!(peak.snr, 50.0);
        assert_eq!(peak.nearby.len(), 1);
        assert_eq!(peak.nearby[0].ridge, RidgeId(2));
        assert_eq!(peak.nearby[0].ridge_index, 231);
        assert_eq!(peak.nearby[0].snr, 2.0);

        let params = IdentifyParams {
            include_nearby: false,
            ..Default::default()
        };
        let peaks = identify(&signal, &ridges, &coefs, &params).unwrap();
        assert!(peaks[0].nearby.is_empty());
    }

    #[test]
    fn test_boundary_exclusion() {
        let (signal, ridges, coefs) = fixture();
        let params = IdentifyParams {
            boundary_exclusion: Some(0),
            ..Default::default()
        };
        let peaks = identify(&signal, &ridges, &coefs, &params).unwrap();
        assert_eq!(peaks.len(), 2);
        assert_eq!(peaks[0].ridge_index, 10);
        assert_eq!(peaks[1].ridge_index, 201);
    }

    #[test]
    fn test_scale_range() {
        let (signal, ridges, coefs) = fixture();
        let params = IdentifyParams {
            peak_scale_range: ScaleRange::Between(1.0, 3.0),
            boundary_exclusion: Some(0),
            ..Default::default()
        };
        let peaks = identify(&signal, &ridges, &coefs, &params).unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].scale, 2.0);
        assert_eq!(peaks[0].index, 201);
        assert_eq!(peaks[0].amplitude, 20.0);
    }

    #[test]
    fn test_ridge_length_and_floor() {
        let (signal, ridges, coefs) = fixture();
        let params = IdentifyParams {
            ridge_length_threshold: 16.0,
            ..Default::default()
        };
        // Clamped to the largest scale, 8
        assert_eq!(identify(&signal, &ridges, &coefs, &params).unwrap().len(), 1);

        let params = IdentifyParams {
            min_noise_level: NoiseFloor::Fixed(25.0),
            snr_threshold: 1.5,
            ..Default::default()
        };
        let peaks = identify(&signal, &ridges, &coefs, &params).unwrap();
        assert_eq!(peaks[0].noise, 25.0);
        assert_eq!(peaks[0].snr, 2.0);

        let params = IdentifyParams {
            min_noise_level: NoiseFloor::Fixed(25.0),
            snr_threshold: 2.0,
            ..Default::default()
        };
        assert!(identify(&signal, &ridges, &coefs, &params).unwrap().is_empty());
    }

    #[test]
    fn test_single_point_ridges() {
        let (signal, mut ridges, mut coefs) = fixture();
        coefs.column_mut(2)[300] = 500.0;
        coefs.column_mut(0)[100] = 500.0;

        // A ridge seeded at scale 2 that never links and freezes
        let mut lone = vec![vec![0.0; N]; SCALES.len()];
        lone[2][300] = 500.0;
        let lone = CoefficientMatrix::from_columns(SCALES.to_vec(), N, lone);
        let mut frozen = link(&lone, &RidgeParams::new(0, 0, 5, 2.0));
        assert_eq!(frozen.len(), 1);
        assert_eq!(frozen[0].len(), 1);
        assert!(frozen[0].is_frozen());
        frozen[0].id = RidgeId(3);
        ridges.append(&mut frozen);
        // A ridge holding only the raw signal
        ridges.push(RidgeLine::from_points(RidgeId(4), vec![point(0, 100)]));

        let peaks = identify(&signal, &ridges, &coefs, &IdentifyParams::default()).unwrap();
        assert_eq!(peaks.len(), 1);
        assert_eq!(peaks[0].ridge, RidgeId(1));
        let nearby: Vec<RidgeId> = peaks[0].nearby.iter().map(|p| p.ridge).collect();
        assert_eq!(nearby, vec![RidgeId(2), RidgeId(3)]);
        assert_eq!(peaks[0].nearby[1].scale, 2.0);
        assert_eq!(peaks[0].nearby[1].amplitude, 500.0);

        let permissive = IdentifyParams {
            snr_threshold: f64::NEG_INFINITY,
            peak_scale_range: ScaleRange::AtLeast(0.0),
            min_noise_level: NoiseFloor::Fixed(0.0),
            ridge_length_threshold: 0.0,
            include_nearby: false,
            boundary_exclusion: Some(0),
            ..Default::default()
        };
        let peaks = identify(&signal, &ridges, &coefs, &permissive).unwrap();
        let accepted: Vec<RidgeId> = peaks.iter().map(|p| p.ridge).collect();
        assert!(accepted.contains(&RidgeId(3)));
        assert!(!accepted.contains(&RidgeId(4)));
        assert!(peaks.iter().all(|p| p.scale > 0.0));
    }

    #[test]
    fn test_dimension_mismatch() {
        let (signal, ridges, coefs) = fixture();
        let err = identify(&signal[..10], &ridges, &coefs, &IdentifyParams::default()).unwrap_err();
        assert!(matches!(err, ConfigurationError::DimensionMismatch { .. }));
        assert!(identify(&signal, &[], &coefs, &IdentifyParams::default())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_noise_estimators() {
        let values = [-2.0, -1.0, 0.0, 1.0, 2.0, 4.0];
        assert!((NoiseEstimator::Quantile(0.5).estimate(&values) - 1.5).abs() < 1e-12);
        assert!((NoiseEstimator::DataMean.estimate(&values) - 10.0 / 6.0).abs() < 1e-12);
        assert!(
            (NoiseEstimator::MedianAbsoluteDeviation.estimate(&values) - 1.5 * 1.4826).abs() < 1e-12
        );
        assert!((NoiseEstimator::DataMeanQuantile(0.5).estimate(&values) + 1.0).abs() < 1e-12);
        assert!(NoiseEstimator::StandardDeviation.estimate(&values) > 0.0);
        assert_eq!(signal_to_noise(5.0, 0.0), f64::INFINITY);
        assert_eq!(signal_to_noise(0.0, 0.0), 0.0);
    }

    #[test_log::test]
    fn test_identify_spectrum() {
        let signal = noisy_spectrum();
        let coefs = cwt(&signal, &ScaleSet::default()).unwrap();
        let windows = default_window_sizes(coefs.scales(), DEFAULT_MIN_WINDOW);
        let threshold = 0.01 * coefs.max_value(true);
        let maxima = detect(&coefs, &windows, threshold, LocalMaximumStrategy::Faster).unwrap();
        let ridges = link(&maxima, &RidgeParams::default());
        let params = IdentifyParams::default();
        let peaks = identify(&signal, &ridges, &coefs, &params).unwrap();

        assert_eq!(peaks.len(), PEAKS.len(), "{peaks:?}");
        for (peak, (center, sigma, _)) in peaks.iter().zip(PEAKS) {
            assert!(peak.index.abs_diff(center as usize) <= 3, "{peak}");
            assert!(peak.ridge_index.abs_diff(center as usize) <= 6, "{peak}");
            assert!(peak.snr > params.snr_threshold);
            assert!(params.peak_scale_range.contains(peak.scale));
            let ridge = &ridges[peak.ridge.0];
            assert!(ridge.iter().any(|p| p.scale == peak.scale));
            assert!(peak.scale > sigma && peak.scale < 4.0 * sigma, "{peak}");
        }
        assert!(peaks.windows(2).all(|w| w[0].ridge_index <= w[1].ridge_index));
    }
}
