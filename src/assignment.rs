use munkres::{solve_assignment, WeightMatrix};
use nalgebra as na;
use ndarray::{Array2, ArrayView2, Axis};
use serde_derive::{Deserialize, Serialize};
use tracing::warn;

use crate::geometry::Point;

/// Pairwise Euclidean distances, rows are tracks and columns are detections.
pub fn distance_matrix(tracks: &[Point], detections: &[Point]) -> Array2<f32> {
    Array2::from_shape_fn((tracks.len(), detections.len()), |(r, c)| {
        na::distance(&tracks[r], &detections[c])
    })
}

/// Resolves which detection continues which track.
///
/// Implementations get the full distance matrix and the gating threshold and
/// return `(row, column)` pairs. Every row and column appears at most once, and
/// no pair farther apart than `max_distance` is returned.
pub trait AssignmentStrategy: Send + Sync {
    fn assign(&self, distances: ArrayView2<'_, f32>, max_distance: f32) -> Vec<(usize, usize)>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentKind {
    #[default]
    Greedy,
    Hungarian,
}

impl AssignmentKind {
    pub fn build(&self) -> Box<dyn AssignmentStrategy> {
        match self {
            AssignmentKind::Greedy => Box::new(GreedyAssignment),
            AssignmentKind::Hungarian => Box::new(HungarianAssignment),
        }
    }
}

/// Nearest-neighbour matching in order of each row's best distance.
///
/// Rows are visited by ascending minimum distance (ties keep row order). Each
/// row proposes its nearest column; the proposal is dropped if that column was
/// already taken or the distance is over the gate. Not globally optimal.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedyAssignment;

impl AssignmentStrategy for GreedyAssignment {
    fn assign(&self, distances: ArrayView2<'_, f32>, max_distance: f32) -> Vec<(usize, usize)> {
        let (nrows, ncols) = distances.dim();
        if nrows == 0 || ncols == 0 {
            return Vec::new();
        }

        let nearest: Vec<(usize, f32)> = distances
            .axis_iter(Axis(0))
            .map(|row| {
                row.iter()
                    .enumerate()
                    .fold((0, f32::INFINITY), |best, (c, &d)| {
                        if d < best.1 {
                            (c, d)
                        } else {
                            best
                        }
                    })
            })
            .collect();

        let mut rows: Vec<usize> = (0..nrows).collect();
        rows.sort_by(|&a, &b| nearest[a].1.total_cmp(&nearest[b].1));

        let mut used_rows = vec![false; nrows];
        let mut used_cols = vec![false; ncols];
        let mut pairs = Vec::with_capacity(nrows.min(ncols));

        for row in rows {
            let (col, dist) = nearest[row];
            if used_rows[row] || used_cols[col] {
                continue;
            }

            if !(dist <= max_distance) {
                continue;
            }

            used_rows[row] = true;
            used_cols[col] = true;
            pairs.push((row, col));
        }

        pairs
    }
}

/// Minimum total distance matching (Kuhn-Munkres), gated afterwards.
#[derive(Debug, Clone, Copy, Default)]
pub struct HungarianAssignment;

impl AssignmentStrategy for HungarianAssignment {
    fn assign(&self, distances: ArrayView2<'_, f32>, max_distance: f32) -> Vec<(usize, usize)> {
        let (nrows, ncols) = distances.dim();
        if nrows == 0 || ncols == 0 {
            return Vec::new();
        }

        // everything beyond the gate is equally unmatchable
        let cap = max_distance.max(0.0) + 1.0;
        let n = nrows.max(ncols);
        let mut mat = WeightMatrix::from_fn(n, |(r, c)| {
            if r < nrows && c < ncols {
                let d = distances[[r, c]];
                if d.is_finite() {
                    d.min(cap)
                } else {
                    cap
                }
            } else {
                cap
            }
        });

        match solve_assignment(&mut mat) {
            Ok(positions) => positions
                .into_iter()
                .filter(|p| p.row < nrows && p.column < ncols)
                .filter(|p| distances[[p.row, p.column]] <= max_distance)
                .map(|p| (p.row, p.column))
                .collect(),
            Err(err) => {
                warn!("assignment could not be solved: {:?}", err);
                Vec::new()
            }
        }
    }
}
