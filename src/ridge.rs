//! Link local maxima across scales into ridge lines.
//!
//! Columns of a [`LocalMaximumMatrix`] are visited from the coarsest scale to the
//! finest. Each live ridge claims the nearest unclaimed maximum within a
//! scale-dependent tolerance of its last linked position. Ridges that find
//! nothing accumulate a gap and are frozen once the gap grows too large.
use std::cmp::Reverse;
use std::fmt::Display;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::arrayops::LocalMaximumMatrix;

/// The position of a [`RidgeLine`] in the list returned by [`link`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RidgeId(pub usize);

impl Display for RidgeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One local maximum claimed by a ridge
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RidgePoint {
    /// The column of the local maximum matrix
    pub column: usize,
    pub scale: f64,
    pub position: usize,
}

/// A chain of local maxima, from the scale it was seeded at down to the finest
/// scale it reached
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RidgeLine {
    pub id: RidgeId,
    points: Vec<RidgePoint>,
    gap: usize,
    frozen: bool,
}

impl RidgeLine {
    #[cfg(test)]
    pub(crate) fn from_points(id: RidgeId, points: Vec<RidgePoint>) -> Self {
        Self {
            id,
            points,
            gap: 0,
            frozen: false,
        }
    }

    fn seed(id: RidgeId, column: usize, scale: f64, position: usize) -> Self {
        Self {
            id,
            points: vec![RidgePoint {
                column,
                scale,
                position,
            }],
            gap: 0,
            frozen: false,
        }
    }

    /// Points ordered from the coarsest scale to the finest
    pub fn points(&self) -> &[RidgePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// The point the ridge was started from
    pub fn seed_point(&self) -> &RidgePoint {
        &self.points[0]
    }

    /// The finest point linked so far
    pub fn last_point(&self) -> &RidgePoint {
        &self.points[self.points.len() - 1]
    }

    /// The coarsest scale on the ridge
    pub fn max_scale(&self) -> f64 {
        self.seed_point().scale
    }

    pub fn gap(&self) -> usize {
        self.gap
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// A name unique within one call, `"{seed_scale}_{seed_position}"`
    pub fn name(&self) -> String {
        let seed = self.seed_point();
        format!("{}_{}", seed.scale, seed.position)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, RidgePoint> {
        self.points.iter()
    }
}

impl<'a> IntoIterator for &'a RidgeLine {
    type Item = &'a RidgePoint;
    type IntoIter = std::slice::Iter<'a, RidgePoint>;

    fn into_iter(self) -> Self::IntoIter {
        self.points.iter()
    }
}

/// Controls how ridges are grown and when they stop
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct RidgeParams {
    /// A ridge is frozen once it has missed more than this many scales in a row
    pub gap_threshold: usize,
    /// How many finer scales to look ahead before counting a miss as a gap
    pub scale_skip: usize,
    /// The smallest tolerance used when matching a ridge to a maximum
    pub min_window: usize,
    /// Unclaimed maxima at this scale or coarser start new ridges
    pub min_seed_scale: f64,
}

impl Default for RidgeParams {
    fn default() -> Self {
        Self {
            gap_threshold: 3,
            scale_skip: 2,
            min_window: 5,
            min_seed_scale: 2.0,
        }
    }
}

impl RidgeParams {
    pub fn new(gap_threshold: usize, scale_skip: usize, min_window: usize, min_seed_scale: f64) -> Self {
        Self {
            gap_threshold,
            scale_skip,
            min_window,
            min_seed_scale,
        }
    }

    /// How far from its last position a ridge may reach at `scale`
    pub fn tolerance(&self, scale: f64) -> usize {
        ((2.0 * scale + 1.0).floor() as usize).max(self.min_window)
    }
}

/// The entries of sorted `candidates` within `tolerance` of `position`
fn within(candidates: &[usize], position: usize, tolerance: usize) -> &[usize] {
    let lo = position.saturating_sub(tolerance);
    let hi = position + tolerance;
    let start = candidates.partition_point(|c| *c < lo);
    let end = candidates.partition_point(|c| *c <= hi);
    &candidates[start..end]
}

/// Grow ridge lines through every column of `local_maxima`, coarse to fine.
///
/// The result is ordered by seed scale, coarsest first, then by seed position,
/// and each ridge's [`RidgeId`] is its index in that order.
pub fn link(local_maxima: &LocalMaximumMatrix, params: &RidgeParams) -> Vec<RidgeLine> {
    let n_columns = local_maxima.n_columns();
    if n_columns == 0 || local_maxima.n_rows() == 0 {
        return Vec::new();
    }

    let candidates_of: Vec<Vec<usize>> = (0..n_columns)
        .map(|j| local_maxima.positive_rows(j).collect())
        .collect();

    let coarsest = n_columns - 1;
    let mut ridges: Vec<RidgeLine> = candidates_of[coarsest]
        .iter()
        .enumerate()
        .map(|(i, position)| {
            RidgeLine::seed(RidgeId(i), coarsest, local_maxima.scale(coarsest), *position)
        })
        .collect();

    for column in (0..coarsest).rev() {
        let scale = local_maxima.scale(column);
        let tolerance = params.tolerance(scale);
        let candidates = &candidates_of[column];

        let mut pairs: Vec<(usize, Reverse<usize>, usize, usize)> = Vec::new();
        for (r, ridge) in ridges.iter().enumerate() {
            if ridge.frozen {
                continue;
            }
            let last = ridge.last_point().position;
            for candidate in within(candidates, last, tolerance) {
                pairs.push((last.abs_diff(*candidate), Reverse(ridge.len()), r, *candidate));
            }
        }
        pairs.sort();

        let mut ridge_linked = vec![false; ridges.len()];
        let mut claimed = vec![false; local_maxima.n_rows()];
        for (_, _, r, candidate) in pairs {
            if ridge_linked[r] || claimed[candidate] {
                continue;
            }
            ridge_linked[r] = true;
            claimed[candidate] = true;
            let ridge = &mut ridges[r];
            ridge.points.push(RidgePoint {
                column,
                scale,
                position: candidate,
            });
            ridge.gap = 0;
        }

        for (r, ridge) in ridges.iter_mut().enumerate() {
            if ridge.frozen || ridge_linked[r] {
                continue;
            }
            let last = ridge.last_point().position;
            let bridged = (1..=params.scale_skip.min(column)).any(|k| {
                let ahead = column - k;
                !within(
                    &candidates_of[ahead],
                    last,
                    params.tolerance(local_maxima.scale(ahead)),
                )
                .is_empty()
            });
            if !bridged {
                ridge.gap += 1;
                if ridge.gap > params.gap_threshold {
                    ridge.frozen = true;
                    if log::log_enabled!(log::Level::Trace) {
                        log::trace!(
                            "Froze ridge {} after {} points at scale {scale}",
                            ridge.name(),
                            ridge.len()
                        );
                    }
                }
            }
        }

        if scale >= params.min_seed_scale {
            for candidate in candidates.iter() {
                if !claimed[*candidate] {
                    let id = RidgeId(ridges.len());
                    ridges.push(RidgeLine::seed(id, column, scale, *candidate));
                }
            }
        }
    }

    ridges.sort_by(|a, b| {
        b.max_scale()
            .total_cmp(&a.max_scale())
            .then_with(|| a.seed_point().position.cmp(&b.seed_point().position))
    });
    for (i, ridge) in ridges.iter_mut().enumerate() {
        ridge.id = RidgeId(i);
    }
    log::debug!(
        "Linked {} ridges across {n_columns} scales, {} frozen",
        ridges.len(),
        ridges.iter().filter(|r| r.frozen).count()
    );
    ridges
}
