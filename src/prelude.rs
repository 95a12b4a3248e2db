//! The types and traits most callers need
pub use crate::peak_detection::{PeakDetector, PeakDetectorBuilder, ScaleInput};
pub use crate::smooth::BaselineSmoother;
pub use crate::wavelet::ScaleSet;
pub use crate::local_maxima::LocalMaximumStrategy;
