//! Baseline estimation used to gate peaks by their height above the local baseline.
//!
//! Peak detection only needs something that implements [`BaselineSmoother`]. A
//! Savitzky-Golay filter is provided when the `nalgebra` feature is enabled, and
//! any function with the right signature works too.
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SmootherError {
    #[error("The window length must be an odd number, received {0}")]
    WindowLengthNotOdd(usize),
    #[error(
        "The window length must be shorter than the data, received {0} window with {1} data points"
    )]
    WindowLengthTooLong(usize, usize),
    #[error("The polynomial order term {0} must be less than the window size {1}")]
    PolynomialOrderTooLarge(usize, usize),
    #[error("Failed to solve for coefficients: {0}")]
    FailedToSolveCoefficients(&'static str),
}

/// Estimates a smooth baseline under a signal.
///
/// `filter_length` is always odd and no longer than `signal` when called from
/// the peak detection pipeline.
pub trait BaselineSmoother: Send + Sync {
    fn smooth(
        &self,
        signal: &[f64],
        filter_length: usize,
        filter_order: usize,
    ) -> Result<Vec<f64>, SmootherError>;
}

impl<T> BaselineSmoother for T
where
    T: Fn(&[f64], usize, usize) -> Result<Vec<f64>, SmootherError> + Send + Sync,
{
    fn smooth(
        &self,
        signal: &[f64],
        filter_length: usize,
        filter_order: usize,
    ) -> Result<Vec<f64>, SmootherError> {
        self(signal, filter_length, filter_order)
    }
}

/// Make `filter_length` odd and no longer than a signal of `len` points,
/// returning `None` when no odd length fits
pub fn coerce_filter_length(filter_length: usize, len: usize) -> Option<usize> {
    let mut filter_length = filter_length.max(1);
    if filter_length % 2 == 0 {
        filter_length += 1;
    }
    if filter_length > len {
        if len == 0 {
            return None;
        }
        filter_length = if len % 2 == 0 { len - 1 } else { len };
    }
    Some(filter_length)
}

fn validate(len: usize, window_length: usize, poly_order: usize) -> Result<(), SmootherError> {
    if window_length % 2 == 0 {
        Err(SmootherError::WindowLengthNotOdd(window_length))
    } else if window_length > len {
        Err(SmootherError::WindowLengthTooLong(window_length, len))
    } else if poly_order >= window_length {
        Err(SmootherError::PolynomialOrderTooLarge(
            poly_order,
            window_length,
        ))
    } else {
        Ok(())
    }
}

#[cfg(feature = "nalgebra")]
mod nalgebra_impl {
    use nalgebra::{DMatrix, DVector};

    use super::*;

    /// A Savitzky-Golay smoothing filter. The first and last half-windows are
    /// filled in from a polynomial fit to the first and last full windows.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct SavitzkyGolay;

    impl SavitzkyGolay {
        /// The smoothing weights for a window centred on its middle point
        fn estimate_coefficients(
            window_length: usize,
            poly_order: usize,
        ) -> Result<DVector<f64>, SmootherError> {
            let pos = (window_length / 2) as f64;
            // Vandermonde matrix over the window offsets
            let vandermonde = DMatrix::from_fn(poly_order + 1, window_length, |i, j| {
                (pos - j as f64).powi(i as i32)
            });
            let mut y = DVector::from_element(poly_order + 1, 0.0);
            y[0] = 1.0;

            let svd = nalgebra::linalg::SVD::new(vandermonde, true, true);
            svd.solve(&y, 1e-12)
                .map_err(SmootherError::FailedToSolveCoefficients)
        }

        /// Least squares polynomial coefficients, lowest order first
        fn polyfit(x: &[f64], y: &[f64], poly_order: usize) -> Result<Vec<f64>, SmootherError> {
            let system = DMatrix::from_fn(x.len(), poly_order + 1, |i, j| x[i].powi(j as i32));
            let beta = DVector::from_row_slice(y);
            let decomp = nalgebra::linalg::SVD::new(system, true, true);
            let coefs = decomp
                .solve(&beta, 1e-18)
                .map_err(SmootherError::FailedToSolveCoefficients)?;
            Ok(coefs.iter().copied().collect())
        }

        fn eval(coefs: &[f64], x: f64) -> f64 {
            coefs.iter().rev().fold(0.0, |acc, c| acc * x + c)
        }

        /// Replace `out[interp_start..interp_stop]` with a polynomial fit to
        /// `data[window_start..window_start + window_length]`
        fn fit_edge(
            data: &[f64],
            window_start: usize,
            window_length: usize,
            poly_order: usize,
            interp_start: usize,
            interp_stop: usize,
            out: &mut [f64],
        ) -> Result<(), SmootherError> {
            let half = (window_length / 2) as f64;
            let x: Vec<f64> = (0..window_length).map(|i| i as f64 - half).collect();
            let coefs = Self::polyfit(
                &x,
                &data[window_start..window_start + window_length],
                poly_order,
            )?;
            for i in interp_start..interp_stop {
                out[i] = Self::eval(&coefs, (i - window_start) as f64 - half);
            }
            Ok(())
        }

        pub fn smooth_signal(
            &self,
            data: &[f64],
            window_length: usize,
            poly_order: usize,
        ) -> Result<Vec<f64>, SmootherError> {
            let n = data.len();
            validate(n, window_length, poly_order)?;
            let coefs = Self::estimate_coefficients(window_length, poly_order)?;
            let half = window_length / 2;

            let mut out = vec![0.0; n];
            for (i, window) in data.windows(window_length).enumerate() {
                out[i + half] = window
                    .iter()
                    .zip(coefs.iter())
                    .map(|(x, c)| x * c)
                    .sum();
            }
            Self::fit_edge(data, 0, window_length, poly_order, 0, half, &mut out)?;
            Self::fit_edge(
                data,
                n - window_length,
                window_length,
                poly_order,
                n - half,
                n,
                &mut out,
            )?;
            Ok(out)
        }
    }

    impl BaselineSmoother for SavitzkyGolay {
        fn smooth(
            &self,
            signal: &[f64],
            filter_length: usize,
            filter_order: usize,
        ) -> Result<Vec<f64>, SmootherError> {
            self.smooth_signal(signal, filter_length, filter_order)
        }
    }

    /// Smooth `data` with a Savitzky-Golay filter
    pub fn savitzky_golay(
        data: &[f64],
        window_length: usize,
        poly_order: usize,
    ) -> Result<Vec<f64>, SmootherError> {
        SavitzkyGolay.smooth_signal(data, window_length, poly_order)
    }
}

#[cfg(feature = "nalgebra")]
pub use nalgebra_impl::{savitzky_golay, SavitzkyGolay};

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_coerce_filter_length() {
        assert_eq!(coerce_filter_length(1001, 2000), Some(1001));
        assert_eq!(coerce_filter_length(1000, 2000), Some(1001));
        assert_eq!(coerce_filter_length(1001, 400), Some(399));
        assert_eq!(coerce_filter_length(1001, 401), Some(401));
        assert_eq!(coerce_filter_length(7, 0), None);
    }

    #[test]
    fn test_validate() {
        assert_eq!(validate(100, 10, 2), Err(SmootherError::WindowLengthNotOdd(10)));
        assert_eq!(
            validate(5, 11, 2),
            Err(SmootherError::WindowLengthTooLong(11, 5))
        );
        assert_eq!(
            validate(100, 3, 3),
            Err(SmootherError::PolynomialOrderTooLarge(3, 3))
        );
    }

    #[test]
    fn test_closure_smoother() {
        let flat = |signal: &[f64], _: usize, _: usize| Ok::<_, SmootherError>(vec![1.0; signal.len()]);
        let baseline = flat.smooth(&[3.0, 4.0, 5.0], 3, 1).unwrap();
        assert_eq!(baseline, vec![1.0; 3]);
    }

    #[cfg(feature = "nalgebra")]
    #[test]
    fn test_savitzky_golay_preserves_quadratic() {
        let data: Vec<f64> = (0..50)
            .map(|i| {
                let x = i as f64;
                0.5 * x * x - 3.0 * x + 2.0
            })
            .collect();
        let smoothed = savitzky_golay(&data, 11, 2).unwrap();
        assert_eq!(smoothed.len(), data.len());
        for (a, b) in data.iter().zip(smoothed.iter()) {
            assert!((a - b).abs() < 1e-6 * a.abs().max(1.0), "{a} != {b}");
        }
    }

    #[cfg(feature = "nalgebra")]
    #[test]
    fn test_savitzky_golay_flattens_noise() {
        let data: Vec<f64> = (0..400)
            .map(|i| 10.0 + crate::test_data::jitter(i))
            .collect();
        let smoothed = SavitzkyGolay.smooth(&data, 101, 2).unwrap();
        let interior = &smoothed[50..350];
        assert!(interior.iter().all(|v| (v - 10.0).abs() < 0.5));
        assert!(SavitzkyGolay.smooth(&data, 100, 2).is_err());
    }
}
