//! Find local maxima in each scale of a coefficient matrix.
//!
//! Three strategies are available through [`LocalMaximumStrategy`]:
//!
//! - [`LocalMaximumStrategy::Classic`] partitions the signal into non-overlapping
//!   blocks of `win_size` points, keeps each block's maximum when it beats both
//!   ends of the block, then repeats with the blocks shifted by half a window.
//!   Maxima closer together than `win_size` are thinned to the taller one. A
//!   maximum that is only isolated by a window straddling both sets of block
//!   boundaries is missed.
//! - [`LocalMaximumStrategy::Faster`] makes exactly the same decisions as
//!   `Classic` in a single streaming pass without materializing padded copies of
//!   the signal. Its output is bit-identical to `Classic`.
//! - [`LocalMaximumStrategy::New`] is a true sliding window: a point is a maximum
//!   when *some* window of `win_size` points holds it strictly inside and nothing
//!   else in that window is as tall. Runs of equal values are reported once, at
//!   their centre, taking the earlier of the two central points of an even run.
//!   On signals without repeated values this finds every maximum `Classic` finds.
//!
//! ```
//! use mzwavelet::local_maxima::{local_maximum, LocalMaximumStrategy};
//!
//! let x = [0.0, 1.0, 2.0, 3.0, 1.0, 2.0, 3.0, 0.0, 0.0, 0.0, 1.0, 2.0, 3.0, 1.0, 1.0, 2.0, 3.0, 0.0];
//! let classic = local_maximum(&x, 4, LocalMaximumStrategy::Classic).unwrap();
//! let sliding = local_maximum(&x, 4, LocalMaximumStrategy::New).unwrap();
//! assert_eq!(classic, vec![6, 12, 16]);
//! assert_eq!(sliding, vec![3, 6, 12, 16]);
//! ```
use std::fmt::Display;
use std::str::FromStr;

use cfg_if::cfg_if;
use num_traits::Float;

#[cfg(feature = "parallelism")]
use rayon::prelude::*;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::{CoefficientMatrix, LocalMaximumMatrix};
use crate::error::ConfigurationError;

/// The smallest window used when deriving windows from scales
pub const DEFAULT_MIN_WINDOW: usize = 5;

/// The algorithm used to find local maxima
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LocalMaximumStrategy {
    /// Two offset block partitions, built as explicit padded copies
    Classic,
    /// The `Classic` decisions computed in one streaming pass
    #[default]
    Faster,
    /// A true sliding window with plateau collapsing
    New,
}

impl Display for LocalMaximumStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            LocalMaximumStrategy::Classic => "classic",
            LocalMaximumStrategy::Faster => "faster",
            LocalMaximumStrategy::New => "new",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Unknown local maximum strategy {0:?}, expected one of \"classic\", \"faster\" or \"new\"")]
pub struct UnknownStrategy(pub String);

impl FromStr for LocalMaximumStrategy {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "classic" => Ok(Self::Classic),
            "faster" => Ok(Self::Faster),
            "new" => Ok(Self::New),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

fn validate_window(win_size: usize, len: usize) -> Result<(), ConfigurationError> {
    if win_size < 1 || win_size >= len {
        Err(ConfigurationError::InvalidWindow {
            window: win_size,
            len,
        })
    } else {
        Ok(())
    }
}

/// The positions of the local maxima of `x`, in ascending order.
///
/// # Errors
/// [`ConfigurationError::InvalidWindow`] when `win_size` is zero or not smaller
/// than `x`.
pub fn local_maximum<F: Float>(
    x: &[F],
    win_size: usize,
    strategy: LocalMaximumStrategy,
) -> Result<Vec<usize>, ConfigurationError> {
    validate_window(win_size, x.len())?;
    Ok(local_maximum_unchecked(x, win_size, strategy))
}

fn local_maximum_unchecked<F: Float>(
    x: &[F],
    win_size: usize,
    strategy: LocalMaximumStrategy,
) -> Vec<usize> {
    match strategy {
        LocalMaximumStrategy::Classic => classic_local_maxima(x, win_size),
        LocalMaximumStrategy::Faster => faster_local_maxima(x, win_size),
        LocalMaximumStrategy::New => sliding_local_maxima(x, win_size),
    }
}

/// The first position of the largest value in `block`
fn first_argmax<F: Float>(block: &[F]) -> (usize, F) {
    let mut best = block[0];
    let mut offset = 0;
    for (i, v) in block.iter().enumerate().skip(1) {
        if *v > best {
            best = *v;
            offset = i;
        }
    }
    (offset, best)
}

fn mark_block_maxima<F: Float>(padded: &[F], win_size: usize, shift: usize, marks: &mut [bool]) {
    for (b, block) in padded.chunks(win_size).enumerate() {
        let (offset, best) = first_argmax(block);
        if best > block[0] && best > block[win_size - 1] {
            if let Some(position) = (b * win_size + offset).checked_sub(shift) {
                if position < marks.len() {
                    marks[position] = true;
                }
            }
        }
    }
}

/// Of every adjacent pair of marked positions closer than `win_size`, unmark the
/// lower one, or the left one on a tie. All pairs are judged on the marks as
/// they stood before any were removed.
fn thin_close_maxima<F: Float>(x: &[F], win_size: usize, marks: &mut [bool]) -> Vec<usize> {
    let positions: Vec<usize> = marks
        .iter()
        .enumerate()
        .filter(|(_, m)| **m)
        .map(|(i, _)| i)
        .collect();
    for pair in positions.windows(2) {
        let (left, right) = (pair[0], pair[1]);
        if right - left < win_size {
            if x[left] - x[right] <= F::zero() {
                marks[left] = false;
            } else {
                marks[right] = false;
            }
        }
    }
    marks
        .iter()
        .enumerate()
        .filter(|(_, m)| **m)
        .map(|(i, _)| i)
        .collect()
}

fn classic_local_maxima<F: Float>(x: &[F], win_size: usize) -> Vec<usize> {
    let n = x.len();
    let first = x[0];
    let last = x[n - 1];
    let mut marks = vec![false; n];

    let rows = n.div_ceil(win_size);
    let padded: Vec<F> = x
        .iter()
        .copied()
        .chain(std::iter::repeat(last).take(rows * win_size - n))
        .collect();
    mark_block_maxima(&padded, win_size, 0, &mut marks);

    let shift = win_size / 2;
    let rows = (n + shift).div_ceil(win_size);
    let padded: Vec<F> = std::iter::repeat(first)
        .take(shift)
        .chain(x.iter().copied())
        .chain(std::iter::repeat(last).take(rows * win_size - n - shift))
        .collect();
    mark_block_maxima(&padded, win_size, shift, &mut marks);

    thin_close_maxima(x, win_size, &mut marks)
}

/// One block partition of the signal, offset by `shift` padding points, scanned
/// a point at a time
struct BlockScan<F: Float> {
    shift: usize,
    extent: usize,
    first: F,
    best: F,
    best_offset: usize,
}

impl<F: Float> BlockScan<F> {
    fn new(n: usize, win_size: usize, shift: usize) -> Self {
        Self {
            shift,
            extent: (n + shift).div_ceil(win_size) * win_size,
            first: F::zero(),
            best: F::zero(),
            best_offset: 0,
        }
    }

    #[inline]
    fn value_at(&self, x: &[F], t: usize) -> F {
        if t < self.shift {
            x[0]
        } else {
            x[(t - self.shift).min(x.len() - 1)]
        }
    }

    #[inline]
    fn feed(&mut self, x: &[F], t: usize, win_size: usize, marks: &mut [bool]) {
        if t >= self.extent {
            return;
        }
        let value = self.value_at(x, t);
        let offset = t % win_size;
        if offset == 0 {
            self.first = value;
            self.best = value;
            self.best_offset = 0;
        } else if value > self.best {
            self.best = value;
            self.best_offset = offset;
        }
        if offset == win_size - 1 && self.best > self.first && self.best > value {
            if let Some(position) = (t + 1 - win_size + self.best_offset).checked_sub(self.shift) {
                if position < marks.len() {
                    marks[position] = true;
                }
            }
        }
    }
}

fn faster_local_maxima<F: Float>(x: &[F], win_size: usize) -> Vec<usize> {
    let n = x.len();
    let mut marks = vec![false; n];
    let mut aligned = BlockScan::new(n, win_size, 0);
    let mut shifted = BlockScan::new(n, win_size, win_size / 2);
    let extent = aligned.extent.max(shifted.extent);
    for t in 0..extent {
        aligned.feed(x, t, win_size, &mut marks);
        shifted.feed(x, t, win_size, &mut marks);
    }
    thin_close_maxima(x, win_size, &mut marks)
}

/// For each run, the nearest position before it holding a value at least as
/// large as the run's value
fn nearest_blockers_left<F: Float>(x: &[F], runs: &[(usize, usize)]) -> Vec<Option<usize>> {
    let mut blockers = Vec::with_capacity(runs.len());
    let mut stack: Vec<usize> = Vec::new();
    for (r, (start, _)) in runs.iter().enumerate() {
        let value = x[*start];
        while let Some(top) = stack.last() {
            if x[runs[*top].0] < value {
                stack.pop();
            } else {
                break;
            }
        }
        blockers.push(stack.last().map(|top| runs[*top].1));
        stack.push(r);
    }
    blockers
}

fn nearest_blockers_right<F: Float>(x: &[F], runs: &[(usize, usize)]) -> Vec<Option<usize>> {
    let mut blockers = vec![None; runs.len()];
    let mut stack: Vec<usize> = Vec::new();
    for (r, (start, _)) in runs.iter().enumerate().rev() {
        let value = x[*start];
        while let Some(top) = stack.last() {
            if x[runs[*top].0] < value {
                stack.pop();
            } else {
                break;
            }
        }
        blockers[r] = stack.last().map(|top| runs[*top].0);
        stack.push(r);
    }
    blockers
}

fn sliding_local_maxima<F: Float>(x: &[F], win_size: usize) -> Vec<usize> {
    let n = x.len();
    // A window needs at least three points to hold anything strictly inside it
    if win_size < 3 || n < 3 {
        return Vec::new();
    }

    let mut runs: Vec<(usize, usize)> = Vec::new();
    let mut start = 0;
    for i in 1..=n {
        if i == n || x[i] != x[start] {
            runs.push((start, i - 1));
            start = i;
        }
    }

    let left = nearest_blockers_left(x, &runs);
    let right = nearest_blockers_right(x, &runs);
    let win = win_size as isize;

    runs.iter()
        .zip(left.iter().zip(right.iter()))
        .filter_map(|((a, b), (blocker_left, blocker_right))| {
            if *a == 0 || *b == n - 1 || x[*a].is_nan() {
                return None;
            }
            let center = a + (b - a) / 2;
            let c = center as isize;
            // The window [s, s + win - 1] must hold `center` strictly inside it
            // and stay clear of anything at least as tall as the run
            let mut lowest_start = c - win + 2;
            let mut highest_start = c - 1;
            if let Some(l) = blocker_left {
                lowest_start = lowest_start.max(*l as isize + 1);
            }
            if let Some(r) = blocker_right {
                highest_start = highest_start.min(*r as isize - win);
            }
            (lowest_start <= highest_start).then_some(center)
        })
        .collect()
}

/// The window size for each scale, `2 * scale + 1`, but never less than `min_window`
pub fn default_window_sizes(scales: &[f64], min_window: usize) -> Vec<usize> {
    scales
        .iter()
        .map(|s| ((2.0 * s + 1.0).floor() as usize).max(min_window))
        .collect()
}

fn detect_column(
    column: &[f64],
    win_size: usize,
    amplitude_threshold: f64,
    strategy: LocalMaximumStrategy,
) -> Vec<f64> {
    let mut out = vec![0.0; column.len()];
    for i in local_maximum_unchecked(column, win_size, strategy) {
        let value = column[i];
        if value >= amplitude_threshold {
            out[i] = value;
        }
    }
    out
}

cfg_if! {
    if #[cfg(feature = "parallelism")] {
        fn detect_columns(coefficients: &CoefficientMatrix, window_sizes: &[usize], amplitude_threshold: f64, strategy: LocalMaximumStrategy) -> Vec<Vec<f64>> {
            (0..coefficients.n_columns())
                .into_par_iter()
                .map(|j| detect_column(coefficients.column(j), window_sizes[j], amplitude_threshold, strategy))
                .collect()
        }
    } else {
        fn detect_columns(coefficients: &CoefficientMatrix, window_sizes: &[usize], amplitude_threshold: f64, strategy: LocalMaximumStrategy) -> Vec<Vec<f64>> {
            (0..coefficients.n_columns())
                .map(|j| detect_column(coefficients.column(j), window_sizes[j], amplitude_threshold, strategy))
                .collect()
        }
    }
}

/// Find the local maxima of every column of `coefficients`.
///
/// `window_sizes` holds one window per column, including the zero scale. Maxima
/// whose coefficient is below `amplitude_threshold` are dropped.
pub fn detect(
    coefficients: &CoefficientMatrix,
    window_sizes: &[usize],
    amplitude_threshold: f64,
    strategy: LocalMaximumStrategy,
) -> Result<LocalMaximumMatrix, ConfigurationError> {
    if window_sizes.len() != coefficients.n_columns() {
        return Err(ConfigurationError::DimensionMismatch {
            what: "window sizes",
            expected: coefficients.n_columns(),
            received: window_sizes.len(),
        });
    }
    let n = coefficients.n_rows();
    for w in window_sizes {
        validate_window(*w, n)?;
    }

    let columns = detect_columns(coefficients, window_sizes, amplitude_threshold, strategy);
    let local_maxima = LocalMaximumMatrix::from_columns(coefficients.scales().to_vec(), n, columns);
    if log::log_enabled!(log::Level::Debug) {
        let counts: Vec<usize> = (0..local_maxima.n_columns())
            .map(|j| local_maxima.positive_rows(j).count())
            .collect();
        log::debug!(
            "Found local maxima per scale with the {strategy} strategy above {amplitude_threshold:0.3}: {counts:?}"
        );
    }
    Ok(local_maxima)
}
