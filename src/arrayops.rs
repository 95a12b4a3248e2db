//! Array helpers shared by the pipeline stages, chiefly [`ScaleMatrix`], the
//! signal-by-scale layout used for both wavelet coefficients and local maxima.
use std::iter::Sum;

use num_traits::{AsPrimitive, Float};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// A dense matrix with one row per signal position and one column per scale.
///
/// Column 0 is the "zero scale" and carries scale label `0.0`. Values are stored
/// column-major so that each scale is a contiguous slice.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ScaleMatrix {
    scales: Vec<f64>,
    n_rows: usize,
    values: Vec<f64>,
}

/// The wavelet coefficients of a signal, with the raw signal in column 0
pub type CoefficientMatrix = ScaleMatrix;

/// The coefficient value at each detected local maximum, zero elsewhere
pub type LocalMaximumMatrix = ScaleMatrix;

impl ScaleMatrix {
    /// Assemble a matrix from whole columns. Every column must have `n_rows` entries.
    pub(crate) fn from_columns(scales: Vec<f64>, n_rows: usize, columns: Vec<Vec<f64>>) -> Self {
        debug_assert_eq!(scales.len(), columns.len());
        let mut values = Vec::with_capacity(n_rows * columns.len());
        for column in columns {
            debug_assert_eq!(column.len(), n_rows);
            values.extend(column);
        }
        Self {
            scales,
            n_rows,
            values,
        }
    }

    /// A matrix of zeros with the same shape and scale labels as `other`
    pub fn zeros_like(other: &ScaleMatrix) -> Self {
        Self {
            scales: other.scales.clone(),
            n_rows: other.n_rows,
            values: vec![0.0; other.values.len()],
        }
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn n_columns(&self) -> usize {
        self.scales.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The scale label of every column, starting with the zero scale
    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    pub fn scale(&self, column: usize) -> f64 {
        self.scales[column]
    }

    /// Find the column labeled with exactly `scale`
    pub fn column_of_scale(&self, scale: f64) -> Option<usize> {
        self.scales.iter().position(|s| *s == scale)
    }

    pub fn column(&self, column: usize) -> &[f64] {
        let start = column * self.n_rows;
        &self.values[start..start + self.n_rows]
    }

    pub(crate) fn column_mut(&mut self, column: usize) -> &mut [f64] {
        let start = column * self.n_rows;
        &mut self.values[start..start + self.n_rows]
    }

    pub fn columns(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.n_columns()).map(|j| self.column(j))
    }

    #[inline]
    pub fn get(&self, row: usize, column: usize) -> f64 {
        self.values[column * self.n_rows + row]
    }

    /// The values at `row` across all columns
    pub fn row(&self, row: usize) -> impl Iterator<Item = f64> + '_ {
        (0..self.n_columns()).map(move |j| self.get(row, j))
    }

    /// Set every entry in `row` to zero
    pub(crate) fn zero_row(&mut self, row: usize) {
        for j in 0..self.n_columns() {
            self.values[j * self.n_rows + row] = 0.0;
        }
    }

    /// The rows of `column` holding a positive value, in ascending order
    pub fn positive_rows(&self, column: usize) -> impl Iterator<Item = usize> + '_ {
        self.column(column)
            .iter()
            .enumerate()
            .filter(|(_, v)| **v > 0.0)
            .map(|(i, _)| i)
    }

    /// The largest value in the matrix, optionally skipping the zero scale column
    pub fn max_value(&self, exclude_zero_scale: bool) -> f64 {
        let skip = if exclude_zero_scale { 1 } else { 0 };
        self.columns()
            .skip(skip)
            .flat_map(|c| c.iter().copied())
            .fold(f64::NEG_INFINITY, f64::max)
    }

    #[cfg(feature = "ndarray")]
    /// Copy the matrix into a row-per-position [`ndarray::Array2`]
    pub fn to_array2(&self) -> ndarray::Array2<f64> {
        ndarray::Array2::from_shape_fn((self.n_rows, self.n_columns()), |(i, j)| self.get(i, j))
    }
}

/// `count` evenly spaced values from `start` to `end`, inclusive. The last value is exactly `end`.
pub fn linspace<T: Float>(start: T, end: T, count: usize) -> Vec<T> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (end - start) / T::from(count - 1).unwrap();
            (0..count)
                .map(|i| {
                    if i == count - 1 {
                        end
                    } else {
                        start + T::from(i).unwrap() * step
                    }
                })
                .collect()
        }
    }
}

/// Integrate `y` over `x` using the trapezoid rule
pub fn trapz<
    A: Float + Clone + AsPrimitive<B> + 'static,
    B: Float + Clone + AsPrimitive<A> + 'static + Sum,
>(
    x: &[A],
    y: &[B],
) -> B {
    let n = x.len().min(y.len());
    if n < 2 {
        return B::zero();
    }
    (0..n - 1)
        .map(|i| {
            let delta = x[i + 1] - x[i];
            delta.as_() * B::from(0.5).unwrap() * (y[i + 1] + y[i])
        })
        .sum()
}
