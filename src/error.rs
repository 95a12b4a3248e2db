//! The ways wavelet peak detection can fail.
//!
//! Configuration problems abort the whole call. Boundary problems during
//! refinement are recovered per peak and surfaced on the peak itself.
use thiserror::Error;

use crate::smooth::SmootherError;

/// Invalid scales, windows or matrix shapes. These are not recoverable within a call.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigurationError {
    #[error("The scale set is empty")]
    EmptyScaleSet,
    #[error("Scale {0} is not a positive, finite number")]
    InvalidScale(f64),
    #[error("Scales must be strictly increasing, found {1} after {0}")]
    ScalesNotIncreasing(f64, f64),
    #[error("The wavelet must be sampled at least twice, received {0} samples")]
    InvalidDiscretization(usize),
    #[error("The wavelet support half-width must be positive, received {0}")]
    InvalidSupport(f64),
    #[error("Scale {scale} needs a kernel of {width} points but the signal only has {len}")]
    SignalTooShort { scale: f64, width: usize, len: usize },
    #[error("A window of {window} points is invalid for a signal of {len} points")]
    InvalidWindow { window: usize, len: usize },
    #[error("Expected {expected} {what}, received {received}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        received: usize,
    },
}

/// A refinement window around `index` does not fit inside the signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[error("A window of +/-{half_width} around {index} leaves a signal of {len} points")]
pub struct BoundaryError {
    pub index: usize,
    pub half_width: usize,
    pub len: usize,
}

/// All the ways the full detection pipeline can fail
#[derive(Debug, Clone, Error)]
pub enum PeakDetectionError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    #[error("An absolute peak threshold of {0} requires a baseline smoother, but none was supplied")]
    MissingDependency(f64),
    #[error("Failed to estimate the signal baseline: {0}")]
    Smoothing(#[from] SmootherError),
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_messages() {
        let err = ConfigurationError::InvalidWindow { window: 12, len: 10 };
        assert_eq!(
            err.to_string(),
            "A window of 12 points is invalid for a signal of 10 points"
        );
        let err = BoundaryError {
            index: 3,
            half_width: 40,
            len: 100,
        };
        assert_eq!(
            err.to_string(),
            "A window of +/-40 around 3 leaves a signal of 100 points"
        );
        let err: PeakDetectionError = ConfigurationError::EmptyScaleSet.into();
        assert_eq!(err.to_string(), "The scale set is empty");
    }
}
