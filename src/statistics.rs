//! Robust summary statistics used to estimate local noise levels.
use num_traits::{Float, ToPrimitive};

/// Linearly interpolated percentile of `values`, which must already be sorted.
///
/// `percent` is a fraction in `[0, 1]`.
pub fn percentile<T: Float + ToPrimitive>(values: &[T], percent: f64) -> T {
    if values.is_empty() {
        return T::nan();
    }
    let k = (values.len() - 1) as f64 * percent.clamp(0.0, 1.0);
    let f = k.floor();
    let c = k.ceil();
    if f == c {
        return values[k as usize];
    }
    let d0 = values[f as usize] * T::from(c - k).unwrap();
    let d1 = values[c as usize] * T::from(k - f).unwrap();
    d0 + d1
}

/// Sort a copy of `values`, treating NaN as equal so the order stays total
pub fn sorted<T: Float>(values: &[T]) -> Vec<T> {
    let mut values = values.to_vec();
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    values
}

pub fn quantile<T: Float>(values: &[T], percent: f64) -> T {
    percentile(&sorted(values), percent)
}

pub fn median<T: Float>(values: &[T]) -> T {
    quantile(values, 0.5)
}

pub fn mean<T: Float>(values: &[T]) -> T {
    if values.is_empty() {
        return T::nan();
    }
    values.iter().fold(T::zero(), |acc, v| acc + *v) / T::from(values.len()).unwrap()
}

/// Sample standard deviation with an `n - 1` denominator
pub fn standard_deviation<T: Float>(values: &[T]) -> T {
    let n = values.len();
    if n < 2 {
        return T::nan();
    }
    let mu = mean(values);
    let ss = values
        .iter()
        .fold(T::zero(), |acc, v| acc + (*v - mu) * (*v - mu));
    (ss / T::from(n - 1).unwrap()).sqrt()
}

/// Median absolute deviation around `center`, scaled to be consistent with the
/// standard deviation of normally distributed data
pub fn median_absolute_deviation<T: Float>(values: &[T], center: T) -> T {
    let deviations: Vec<T> = values.iter().map(|v| (*v - center).abs()).collect();
    median(&deviations) * T::from(1.4826).unwrap()
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_percentile() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(percentile(&values, 0.5), 3.0);
        assert!((percentile(&values, 0.95) - 4.8).abs() < 1e-12);
        assert_eq!(percentile(&values, 0.0), 1.0);
        assert_eq!(percentile(&values, 1.0), 5.0);
        assert_eq!(quantile(&[5.0, 1.0, 3.0], 0.5), 3.0);
        assert!(percentile::<f64>(&[], 0.5).is_nan());
    }

    #[test]
    fn test_spread() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&values), 5.0);
        assert!((standard_deviation(&values) - 2.138089935299395).abs() < 1e-12);
        assert_eq!(median(&values), 4.5);
        assert!((median_absolute_deviation(&values, 0.0) - 4.5 * 1.4826).abs() < 1e-12);
    }
}
