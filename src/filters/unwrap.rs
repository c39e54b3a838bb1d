//! Two-dimensional phase unwrapping guided by second-difference reliability.
//!
//! Pixels are joined along edges in order of increasing second-difference magnitude, so smooth regions
//! are unwrapped first and noisy pixels last. Each join shifts the smaller of the two groups by the
//! multiple of `2 pi` that makes the phase step across the edge smaller than `pi`.
//! Border pixels have no full neighborhood and are joined after all interior edges.
//!
//! The result is only meaningful where the wrapped phase is locally smooth; under heavy noise or outside
//! the material the output can contain residual `2 pi` jumps without any error being raised.

use crate::math_tools::wrap_phase;
use ndarray::{Array2, ArrayView2};
use std::f64::consts::PI;

struct Edge {
    reliability: f64,
    a: usize,
    b: usize,
}

/// Sum of the squared wrapped second differences in horizontal, vertical and both diagonal directions.
/// Lower values are more reliable.
fn second_differences(phase: ArrayView2<f64>) -> Array2<f64> {
    let (rows, cols) = phase.dim();
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        if r == 0 || c == 0 || r + 1 == rows || c + 1 == cols {
            return f64::INFINITY;
        }
        let p = phase[[r, c]];
        let second = |before: f64, after: f64| wrap_phase(before - p) - wrap_phase(p - after);
        let h = second(phase[[r, c - 1]], phase[[r, c + 1]]);
        let v = second(phase[[r - 1, c]], phase[[r + 1, c]]);
        let d1 = second(phase[[r - 1, c - 1]], phase[[r + 1, c + 1]]);
        let d2 = second(phase[[r - 1, c + 1]], phase[[r + 1, c - 1]]);
        let d = h * h + v * v + d1 * d1 + d2 * d2;
        if d.is_nan() {
            f64::INFINITY
        } else {
            d
        }
    })
}

fn sorted_edges(reliability: &Array2<f64>) -> Vec<Edge> {
    let (rows, cols) = reliability.dim();
    let mut edges = Vec::with_capacity(2 * rows * cols);
    for r in 0..rows {
        for c in 0..cols {
            let a = r * cols + c;
            if c + 1 < cols {
                edges.push(Edge {
                    reliability: reliability[[r, c]] + reliability[[r, c + 1]],
                    a,
                    b: a + 1,
                });
            }
            if r + 1 < rows {
                edges.push(Edge {
                    reliability: reliability[[r, c]] + reliability[[r + 1, c]],
                    a,
                    b: a + cols,
                });
            }
        }
    }
    // stable, so equal reliabilities keep raster order and the result is reproducible
    edges.sort_by(|x, y| x.reliability.total_cmp(&y.reliability));
    edges
}

/// Unwraps a phase map given in `[-pi, pi]`.
///
/// The returned field differs from the input by an integer multiple of `2 pi` at every pixel.
pub fn unwrap_phase(wrapped: ArrayView2<f64>) -> Array2<f64> {
    let (rows, cols) = wrapped.dim();
    let n = rows * cols;
    if n == 0 {
        return wrapped.to_owned();
    }
    let phase: Vec<f64> = wrapped.iter().copied().collect();
    let edges = sorted_edges(&second_differences(wrapped));

    let mut group: Vec<usize> = (0..n).collect();
    let mut members: Vec<Vec<usize>> = (0..n).map(|i| vec![i]).collect();
    let mut offset = vec![0.0; n];

    for edge in edges {
        let (ga, gb) = (group[edge.a], group[edge.b]);
        if ga == gb {
            continue;
        }
        let step = (phase[edge.a] + offset[edge.a]) - (phase[edge.b] + offset[edge.b]);
        let turns = (step / (2.0 * PI)).round();
        if !turns.is_finite() {
            continue;
        }
        let (keep, moved, shift) = if members[ga].len() >= members[gb].len() {
            (ga, gb, 2.0 * PI * turns)
        } else {
            (gb, ga, -2.0 * PI * turns)
        };
        let moved_members = std::mem::take(&mut members[moved]);
        for &pixel in &moved_members {
            group[pixel] = keep;
            offset[pixel] += shift;
        }
        members[keep].extend(moved_members);
    }

    Array2::from_shape_fn((rows, cols), |(r, c)| {
        let i = r * cols + c;
        phase[i] + offset[i]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn assert_differs_by_constant(unwrapped: &Array2<f64>, truth: &Array2<f64>) {
        let shift = unwrapped[[0, 0]] - truth[[0, 0]];
        assert_abs_diff_eq!((shift / (2.0 * PI)).round() * 2.0 * PI, shift, epsilon = 1e-9);
        for (u, t) in unwrapped.iter().zip(truth.iter()) {
            assert_abs_diff_eq!(u - t, shift, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_unwraps_linear_ramp() {
        let truth = Array2::from_shape_fn((20, 30), |(r, c)| 0.5 * c as f64 + 0.3 * r as f64 - 4.0);
        let wrapped = truth.mapv(wrap_phase);
        let unwrapped = unwrap_phase(wrapped.view());
        assert_differs_by_constant(&unwrapped, &truth);
    }

    #[test]
    fn test_unwraps_curved_surface() {
        let truth = Array2::from_shape_fn((40, 40), |(r, c)| {
            let (y, x) = (r as f64 - 20.0, c as f64 - 20.0);
            0.01 * (x * x + y * y) + 0.2 * x
        });
        let wrapped = truth.mapv(wrap_phase);
        let unwrapped = unwrap_phase(wrapped.view());
        assert_differs_by_constant(&unwrapped, &truth);
    }

    #[test]
    fn test_only_adds_multiples_of_two_pi() {
        let wrapped = Array2::from_shape_fn((9, 7), |(r, c)| wrap_phase((r * 7 + c) as f64 * 1.7));
        let unwrapped = unwrap_phase(wrapped.view());
        for (u, w) in unwrapped.iter().zip(wrapped.iter()) {
            let turns = (u - w) / (2.0 * PI);
            assert_abs_diff_eq!(turns, turns.round(), epsilon = 1e-9);
        }
    }

    #[test]
    fn test_degenerate_shapes() {
        let single = Array2::from_elem((1, 1), 0.4);
        assert_eq!(unwrap_phase(single.view()), single);

        let line = Array2::from_shape_fn((1, 12), |(_, c)| wrap_phase(1.2 * c as f64));
        let unwrapped = unwrap_phase(line.view());
        let truth = Array2::from_shape_fn((1, 12), |(_, c)| 1.2 * c as f64);
        assert_differs_by_constant(&unwrapped, &truth);

        let empty = Array2::<f64>::zeros((0, 5));
        assert_eq!(unwrap_phase(empty.view()).dim(), (0, 5));
    }
}
