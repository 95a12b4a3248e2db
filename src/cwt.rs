//! The continuous wavelet transform of a signal over a set of scales.
//!
//! The signal is extended past both ends by symmetric reflection about the edge
//! sample, so that `x[-i] = x[i]` and `x[n - 1 + i] = x[n - 1 - i]`. This policy
//! is the same for every scale, which keeps edge peaks comparable across scales.
//!
//! Each scale is computed either by direct correlation or through the FFT. The
//! two agree to within floating point error; [`ConvolutionMethod::Auto`] picks
//! the FFT for wide kernels.
use cfg_if::cfg_if;
use rustfft::num_complex::Complex;

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::CoefficientMatrix;
use crate::error::ConfigurationError;
use crate::wavelet::{FftCorrelation, MotherKernel, PreparedKernel, PreparedKernels, ScaleSet, ScaledKernel};

/// Kernels with at least this many taps are convolved through the FFT by [`ConvolutionMethod::Auto`]
pub const FFT_KERNEL_THRESHOLD: usize = 128;

/// How each scale's kernel is applied to the signal
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum ConvolutionMethod {
    /// Direct correlation for narrow kernels, FFT for wide ones
    #[default]
    Auto,
    Direct,
    Fft,
}

impl ConvolutionMethod {
    pub fn uses_fft(&self, kernel_len: usize) -> bool {
        match self {
            ConvolutionMethod::Auto => kernel_len >= FFT_KERNEL_THRESHOLD,
            ConvolutionMethod::Direct => false,
            ConvolutionMethod::Fft => true,
        }
    }
}

/// Reflect `index` back into `0..n` about the edge samples
#[inline]
fn reflect(index: isize, n: usize) -> usize {
    let last = n as isize - 1;
    if index < 0 {
        (-index).min(last) as usize
    } else if index > last {
        (2 * last - index).max(0) as usize
    } else {
        index as usize
    }
}

/// The signal shifted by `kernel.center()` and reflected past both ends so that
/// `extended[p..p + kernel.len()]` is the neighborhood of position `p`
fn extend_signal(signal: &[f64], kernel: &ScaledKernel) -> Vec<f64> {
    let n = signal.len();
    let offset = kernel.center() as isize;
    (0..(n + kernel.len() - 1) as isize)
        .map(|t| signal[reflect(t - offset, n)])
        .collect()
}

fn correlate_direct(signal: &[f64], kernel: &ScaledKernel) -> Vec<f64> {
    let extended = extend_signal(signal, kernel);
    let norm = kernel.normalization();
    extended
        .windows(kernel.len())
        .take(signal.len())
        .map(|window| {
            window
                .iter()
                .zip(kernel.taps.iter())
                .map(|(x, f)| x * f)
                .sum::<f64>()
                * norm
        })
        .collect()
}

fn correlate_fft(signal: &[f64], kernel: &ScaledKernel, fft: &FftCorrelation) -> Vec<f64> {
    let n = signal.len();
    let size = fft.size();
    let mut buffer: Vec<Complex<f64>> = extend_signal(signal, kernel)
        .into_iter()
        .map(|x| Complex::new(x, 0.0))
        .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
        .take(size)
        .collect();

    fft.forward.process(&mut buffer);
    buffer
        .iter_mut()
        .zip(fft.spectrum.iter())
        .for_each(|(s, k)| *s *= *k);
    fft.inverse.process(&mut buffer);

    // rustfft does not normalize the inverse transform
    let norm = kernel.normalization() / size as f64;
    buffer[..n].iter().map(|c| c.re * norm).collect()
}

fn transform_column(signal: &[f64], prepared: &PreparedKernel) -> Vec<f64> {
    match prepared.fft.as_ref() {
        Some(fft) => correlate_fft(signal, &prepared.kernel, fft),
        None => correlate_direct(signal, &prepared.kernel),
    }
}

cfg_if! {
    if #[cfg(feature = "parallelism")] {
        fn transform_columns(signal: &[f64], kernels: &[PreparedKernel]) -> Vec<Vec<f64>> {
            kernels
                .par_iter()
                .map(|k| transform_column(signal, k))
                .collect()
        }
    } else {
        fn transform_columns(signal: &[f64], kernels: &[PreparedKernel]) -> Vec<Vec<f64>> {
            kernels
                .iter()
                .map(|k| transform_column(signal, k))
                .collect()
        }
    }
}

/// Computes [`CoefficientMatrix`] values for a signal with a fixed mother wavelet
#[derive(Debug, Clone, Default)]
pub struct CwtEngine {
    pub mother: MotherKernel,
    pub method: ConvolutionMethod,
}

impl CwtEngine {
    pub fn new(mother: MotherKernel, method: ConvolutionMethod) -> Self {
        Self { mother, method }
    }

    /// Transform `signal` at every scale in `scales`.
    ///
    /// Column 0 of the result holds `signal` itself.
    pub fn transform(
        &self,
        signal: &[f64],
        scales: &ScaleSet,
    ) -> Result<CoefficientMatrix, ConfigurationError> {
        let prepared = PreparedKernels::new(&self.mother, scales, signal.len(), self.method)?;
        self.transform_prepared(signal, &prepared)
    }

    /// Transform `signal` with kernels prepared ahead of time for its length.
    ///
    /// The kernels' own convolution method is used.
    pub fn transform_prepared(
        &self,
        signal: &[f64],
        prepared: &PreparedKernels,
    ) -> Result<CoefficientMatrix, ConfigurationError> {
        if prepared.signal_len() != signal.len() {
            return Err(ConfigurationError::DimensionMismatch {
                what: "signal points for the prepared kernels",
                expected: prepared.signal_len(),
                received: signal.len(),
            });
        }
        let n = signal.len();
        log::debug!(
            "Computing CWT of {n} points over {} scales",
            prepared.kernels().len()
        );

        let mut columns = Vec::with_capacity(prepared.kernels().len() + 1);
        columns.push(signal.to_vec());
        columns.extend(transform_columns(signal, prepared.kernels()));

        let mut labels = Vec::with_capacity(columns.len());
        labels.push(0.0);
        labels.extend(prepared.scales().iter().copied());
        Ok(CoefficientMatrix::from_columns(labels, n, columns))
    }
}

/// Transform `signal` at every scale in `scales` with the Mexican hat wavelet
pub fn cwt(signal: &[f64], scales: &ScaleSet) -> Result<CoefficientMatrix, ConfigurationError> {
    CwtEngine::default().transform(signal, scales)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::test_data::{gaussian_signal, noisy_spectrum};
    use rstest::rstest;

    #[test]
    fn test_reflect() {
        assert_eq!(reflect(-1, 5), 1);
        assert_eq!(reflect(-3, 5), 3);
        assert_eq!(reflect(0, 5), 0);
        assert_eq!(reflect(4, 5), 4);
        assert_eq!(reflect(5, 5), 3);
        assert_eq!(reflect(7, 5), 1);
    }

    #[test]
    fn test_zero_scale_is_signal() {
        let signal = noisy_spectrum();
        let scales = ScaleSet::new(vec![1.0, 2.0, 8.0, 32.0]).unwrap();
        let coefs = cwt(&signal, &scales).unwrap();
        assert_eq!(coefs.n_rows(), signal.len());
        assert_eq!(coefs.n_columns(), 5);
        assert_eq!(coefs.scales(), &[0.0, 1.0, 2.0, 8.0, 32.0]);
        assert_eq!(coefs.column(0), signal.as_slice());
    }

    #[rstest]
    #[case(1.0)]
    #[case(3.0)]
    #[case(10.0)]
    #[case(30.0)]
    fn test_fft_matches_direct(#[case] scale: f64) {
        let signal = noisy_spectrum();
        let scales = ScaleSet::new(vec![scale]).unwrap();
        let direct = CwtEngine::new(MotherKernel::default(), ConvolutionMethod::Direct)
            .transform(&signal, &scales)
            .unwrap();
        let fft = CwtEngine::new(MotherKernel::default(), ConvolutionMethod::Fft)
            .transform(&signal, &scales)
            .unwrap();
        let scale_max = direct.column(1).iter().fold(0.0f64, |a, b| a.max(b.abs()));
        for (a, b) in direct.column(1).iter().zip(fft.column(1).iter()) {
            assert!(
                (a - b).abs() <= 1e-9 * scale_max.max(1.0),
                "{a} != {b} at scale {scale}"
            );
        }
    }

    #[test]
    fn test_constant_signal_has_no_response() {
        let signal = vec![5.0; 300];
        let scales = ScaleSet::new(vec![1.0, 4.0, 12.0]).unwrap();
        let coefs = cwt(&signal, &scales).unwrap();
        for j in 1..coefs.n_columns() {
            assert!(coefs.column(j).iter().all(|v| v.abs() < 1e-9));
        }
    }

    #[test]
    fn test_peak_response_is_centred() {
        let signal = gaussian_signal(801, &[(400.0, 10.0, 50.0)]);
        let scales = ScaleSet::new(vec![5.0, 10.0, 20.0]).unwrap();
        let coefs = cwt(&signal, &scales).unwrap();
        for j in 1..coefs.n_columns() {
            let column = coefs.column(j);
            let (imax, _) = column
                .iter()
                .enumerate()
                .fold((0, f64::NEG_INFINITY), |acc, (i, v)| if *v > acc.1 { (i, *v) } else { acc });
            assert!((imax as i64 - 400).abs() <= 1, "scale {} peaked at {imax}", coefs.scale(j));
        }
        // The matched scale responds more strongly than a much narrower one
        assert!(coefs.get(400, 3) > coefs.get(400, 1));
    }

    #[test]
    fn test_prepared_reuse() {
        let signal = noisy_spectrum();
        let scales = ScaleSet::new(vec![2.0, 6.0, 24.0]).unwrap();
        let prepared = PreparedKernels::mexican_hat(&scales, signal.len()).unwrap();
        let engine = CwtEngine::default();
        let a = engine.transform_prepared(&signal, &prepared).unwrap();
        let b = engine.transform(&signal, &scales).unwrap();
        assert_eq!(a, b);

        let err = engine.transform_prepared(&signal[..100], &prepared).unwrap_err();
        assert!(matches!(err, ConfigurationError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_fft_plans_are_prepared() {
        let signal = noisy_spectrum();
        let scales = ScaleSet::new(vec![1.0, 2.0, 6.0]).unwrap();
        let prepared = PreparedKernels::new(
            &MotherKernel::default(),
            &scales,
            signal.len(),
            ConvolutionMethod::Fft,
        )
        .unwrap();
        assert!(prepared.kernels().iter().all(|k| k.fft.is_some()));

        let engine = CwtEngine::default();
        let a = engine.transform_prepared(&signal, &prepared).unwrap();
        let b = engine.transform_prepared(&signal, &prepared).unwrap();
        assert_eq!(a, b);
        let direct = CwtEngine::new(MotherKernel::default(), ConvolutionMethod::Direct)
            .transform(&signal, &scales)
            .unwrap();
        for j in 1..a.n_columns() {
            for (x, y) in a.column(j).iter().zip(direct.column(j)) {
                assert!((x - y).abs() < 1e-9, "{x} != {y} at scale {}", a.scale(j));
            }
        }
    }

    #[test]
    fn test_signal_too_short() {
        let signal = vec![1.0; 20];
        let scales = ScaleSet::new(vec![1.0, 2.0]).unwrap();
        let err = cwt(&signal, &scales).unwrap_err();
        assert_eq!(
            err,
            ConfigurationError::SignalTooShort {
                scale: 2.0,
                width: 33,
                len: 20
            }
        );
    }
}
