//! Sampled mother wavelets and their scaled, discretized kernels.
//!
//! A [`MotherKernel`] is sampled once and then resampled at any scale with
//! [`MotherKernel::scaled`]. When the same scales are applied to many signals of
//! the same length, [`PreparedKernels`] keeps the scaled kernels, and the spectra
//! needed by the FFT convolution path, around between calls.
use std::f64::consts::PI;
use std::fmt;
use std::sync::Arc;

use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};

use crate::cwt::ConvolutionMethod;
use crate::error::ConfigurationError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

const DEFAULT_HALF_WIDTH: f64 = 8.0;
const DEFAULT_RESOLUTION: usize = 1024;

/// The default scales: 1, the even numbers up to 30 and every fourth number from 32 to 64
pub const DEFAULT_SCALES: [f64; 25] = [
    1.0, 2.0, 4.0, 6.0, 8.0, 10.0, 12.0, 14.0, 16.0, 18.0, 20.0, 22.0, 24.0, 26.0, 28.0, 30.0,
    32.0, 36.0, 40.0, 44.0, 48.0, 52.0, 56.0, 60.0, 64.0,
];

/// The Mexican hat (Ricker) wavelet, the negative normalized second derivative of a Gaussian
#[inline]
pub fn mexican_hat(x: f64) -> f64 {
    (2.0 / 3.0f64.sqrt()) * PI.powf(-0.25) * (1.0 - x * x) * (-x * x / 2.0).exp()
}

/// The shape matched against the signal
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MotherWavelet {
    #[default]
    MexicanHat,
    /// A caller-provided shape sampled uniformly over the support
    Sampled(Vec<f64>),
}

/// An ordered set of positive, strictly increasing scales
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScaleSet(Vec<f64>);

impl ScaleSet {
    pub fn new(scales: Vec<f64>) -> Result<Self, ConfigurationError> {
        if scales.is_empty() {
            return Err(ConfigurationError::EmptyScaleSet);
        }
        if let Some(s) = scales.iter().find(|s| !s.is_finite() || **s <= 0.0) {
            return Err(ConfigurationError::InvalidScale(*s));
        }
        if let Some(w) = scales.windows(2).find(|w| w[1] <= w[0]) {
            return Err(ConfigurationError::ScalesNotIncreasing(w[0], w[1]));
        }
        Ok(Self(scales))
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, f64> {
        self.0.iter()
    }

    pub fn max_scale(&self) -> f64 {
        self.0[self.0.len() - 1]
    }
}

impl Default for ScaleSet {
    fn default() -> Self {
        Self(DEFAULT_SCALES.to_vec())
    }
}

impl TryFrom<Vec<f64>> for ScaleSet {
    type Error = ConfigurationError;

    fn try_from(value: Vec<f64>) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&[f64]> for ScaleSet {
    type Error = ConfigurationError;

    fn try_from(value: &[f64]) -> Result<Self, Self::Error> {
        Self::new(value.to_vec())
    }
}

impl AsRef<[f64]> for ScaleSet {
    fn as_ref(&self) -> &[f64] {
        &self.0
    }
}

/// A builder for configuring [`MotherKernel`]
#[derive(Debug, Clone)]
pub struct WaveletKernelBuilder {
    wavelet: MotherWavelet,
    half_width: f64,
    resolution: usize,
}

impl Default for WaveletKernelBuilder {
    fn default() -> Self {
        Self {
            wavelet: MotherWavelet::MexicanHat,
            half_width: DEFAULT_HALF_WIDTH,
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

impl WaveletKernelBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn wavelet(&mut self, wavelet: MotherWavelet) -> &mut Self {
        self.wavelet = wavelet;
        self
    }

    /// The support of the mother wavelet is `[-half_width, half_width]`
    pub fn half_width(&mut self, half_width: f64) -> &mut Self {
        self.half_width = half_width;
        self
    }

    /// The number of samples taken across the support. Ignored for
    /// [`MotherWavelet::Sampled`], whose length is used instead.
    pub fn resolution(&mut self, resolution: usize) -> &mut Self {
        self.resolution = resolution;
        self
    }

    pub fn build(&self) -> Result<MotherKernel, ConfigurationError> {
        if !(self.half_width.is_finite() && self.half_width > 0.0) {
            return Err(ConfigurationError::InvalidSupport(self.half_width));
        }
        let values = match &self.wavelet {
            MotherWavelet::MexicanHat => {
                if self.resolution < 2 {
                    return Err(ConfigurationError::InvalidDiscretization(self.resolution));
                }
                let step = 2.0 * self.half_width / (self.resolution - 1) as f64;
                (0..self.resolution)
                    .map(|i| mexican_hat(-self.half_width + i as f64 * step))
                    .collect()
            }
            MotherWavelet::Sampled(values) => {
                if values.len() < 2 {
                    return Err(ConfigurationError::InvalidDiscretization(values.len()));
                }
                values.clone()
            }
        };
        Ok(MotherKernel::new(values, self.half_width))
    }
}

/// A mother wavelet sampled uniformly over `[-half_width, half_width]`
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MotherKernel {
    values: Vec<f64>,
    half_width: f64,
}

impl Default for MotherKernel {
    fn default() -> Self {
        let step = 2.0 * DEFAULT_HALF_WIDTH / (DEFAULT_RESOLUTION - 1) as f64;
        let values = (0..DEFAULT_RESOLUTION)
            .map(|i| mexican_hat(-DEFAULT_HALF_WIDTH + i as f64 * step))
            .collect();
        Self::new(values, DEFAULT_HALF_WIDTH)
    }
}

impl MotherKernel {
    fn new(values: Vec<f64>, half_width: f64) -> Self {
        Self { values, half_width }
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn half_width(&self) -> f64 {
        self.half_width
    }

    /// The distance between adjacent samples of the mother wavelet
    pub fn step(&self) -> f64 {
        2.0 * self.half_width / (self.values.len() - 1) as f64
    }

    /// The number of taps the kernel will have at `scale`
    pub fn width_at(&self, scale: f64) -> usize {
        let width = (scale * 2.0 * self.half_width).floor() as usize + 1;
        width.max(2)
    }

    /// Resample the mother wavelet onto an integer grid dilated by `scale`.
    ///
    /// The taps are stored reversed and mean-centred so the kernel has no
    /// response to a constant baseline.
    pub fn scaled(&self, scale: f64) -> ScaledKernel {
        let dx = self.step();
        let last = self.values.len() - 1;
        let span = (scale * 2.0 * self.half_width).floor() as usize;
        let mut sampled: Vec<f64> = (0..=span)
            .map(|k| {
                let j = (k as f64 / (scale * dx)).floor() as usize;
                self.values[j.min(last)]
            })
            .collect();
        if sampled.len() == 1 {
            sampled.push(sampled[0]);
        }
        let mean = sampled.iter().sum::<f64>() / sampled.len() as f64;
        let taps = sampled.into_iter().rev().map(|v| v - mean).collect();
        ScaledKernel { scale, taps }
    }
}

/// A mother wavelet discretized at a single scale
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScaledKernel {
    pub scale: f64,
    pub taps: Vec<f64>,
}

impl ScaledKernel {
    pub fn len(&self) -> usize {
        self.taps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.taps.is_empty()
    }

    /// The offset from a kernel's first tap to the position it is centred on
    pub fn center(&self) -> usize {
        self.len() / 2
    }

    /// The amplitude normalization applied to coefficients at this scale
    pub fn normalization(&self) -> f64 {
        1.0 / self.scale.sqrt()
    }

    /// The size of the FFT needed to correlate this kernel with a signal of `signal_len` points
    pub(crate) fn fft_size(&self, signal_len: usize) -> usize {
        (signal_len + self.len() - 1).next_power_of_two()
    }

    /// Plan the transforms for correlating with a signal of `signal_len` points
    /// and compute the conjugated spectrum of the zero-padded taps
    pub(crate) fn fft_correlation(&self, signal_len: usize, planner: &mut FftPlanner<f64>) -> FftCorrelation {
        let size = self.fft_size(signal_len);
        let forward = planner.plan_fft_forward(size);
        let inverse = planner.plan_fft_inverse(size);
        let mut spectrum: Vec<Complex<f64>> = self
            .taps
            .iter()
            .map(|t| Complex::new(*t, 0.0))
            .chain(std::iter::repeat(Complex::new(0.0, 0.0)))
            .take(size)
            .collect();
        forward.process(&mut spectrum);
        spectrum.iter_mut().for_each(|c| *c = c.conj());
        FftCorrelation {
            spectrum,
            forward,
            inverse,
        }
    }
}

/// The planned transforms and conjugated kernel spectrum for one FFT size
#[derive(Clone)]
pub(crate) struct FftCorrelation {
    pub(crate) spectrum: Vec<Complex<f64>>,
    pub(crate) forward: Arc<dyn Fft<f64>>,
    pub(crate) inverse: Arc<dyn Fft<f64>>,
}

impl FftCorrelation {
    pub(crate) fn size(&self) -> usize {
        self.spectrum.len()
    }
}

impl fmt::Debug for FftCorrelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FftCorrelation")
            .field("size", &self.size())
            .finish_non_exhaustive()
    }
}

/// A scaled kernel ready for use on signals of a fixed length
#[derive(Debug, Clone)]
pub struct PreparedKernel {
    pub kernel: ScaledKernel,
    /// Present when this kernel is convolved through the FFT
    pub(crate) fft: Option<FftCorrelation>,
}

/// Kernels for a fixed signal length and scale set, computed once and reused.
#[derive(Debug, Clone)]
pub struct PreparedKernels {
    signal_len: usize,
    scales: ScaleSet,
    method: ConvolutionMethod,
    kernels: Vec<PreparedKernel>,
}

impl PreparedKernels {
    pub fn new(
        mother: &MotherKernel,
        scales: &ScaleSet,
        signal_len: usize,
        method: ConvolutionMethod,
    ) -> Result<Self, ConfigurationError> {
        if scales.is_empty() {
            return Err(ConfigurationError::EmptyScaleSet);
        }
        let mut planner = FftPlanner::new();
        let mut kernels = Vec::with_capacity(scales.len());
        for scale in scales.iter().copied() {
            let kernel = mother.scaled(scale);
            if kernel.len() > signal_len {
                return Err(ConfigurationError::SignalTooShort {
                    scale,
                    width: kernel.len(),
                    len: signal_len,
                });
            }
            let fft = if method.uses_fft(kernel.len()) {
                Some(kernel.fft_correlation(signal_len, &mut planner))
            } else {
                None
            };
            kernels.push(PreparedKernel { kernel, fft });
        }
        log::debug!(
            "Prepared {} kernels for signals of length {signal_len}",
            kernels.len()
        );
        Ok(Self {
            signal_len,
            scales: scales.clone(),
            method,
            kernels,
        })
    }

    /// Prepare the default Mexican hat kernels
    pub fn mexican_hat(scales: &ScaleSet, signal_len: usize) -> Result<Self, ConfigurationError> {
        Self::new(
            &MotherKernel::default(),
            scales,
            signal_len,
            ConvolutionMethod::default(),
        )
    }

    pub fn signal_len(&self) -> usize {
        self.signal_len
    }

    pub fn scales(&self) -> &ScaleSet {
        &self.scales
    }

    pub fn method(&self) -> ConvolutionMethod {
        self.method
    }

    pub fn kernels(&self) -> &[PreparedKernel] {
        &self.kernels
    }
}
