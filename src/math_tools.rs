//! Numeric helpers shared by the analysis stages: the raised-cosine taper used for spot masks, Gaussian
//! smoothing with reflective borders, percentiles, finite differences, phase wrapping, the 2x2
//! pseudo-inverse and the colormaps used for export.

use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, Zip};
use std::f64::consts::PI;

/// Raised-cosine roll-off between `inner` and `outer`.
///
/// Returns 1 for `r <= inner`, 0 for `r >= outer` and `0.5 * (1 + cos(pi * (r - inner) / (outer - inner)))`
/// in between. Both the value and the first derivative are continuous at the two radii.
/// The caller guarantees `outer > inner`.
pub fn raised_cosine(r: f64, inner: f64, outer: f64) -> f64 {
    if r <= inner {
        1.0
    } else if r >= outer {
        0.0
    } else {
        0.5 * (1.0 + (PI * (r - inner) / (outer - inner)).cos())
    }
}

/// Generates a normalized 1D Gaussian kernel of radius `floor(4 * sigma + 0.5)`.
pub fn gaussian_kernel1d(sigma: f64) -> Vec<f64> {
    let radius = (4.0 * sigma + 0.5) as usize;
    let size = 2 * radius + 1;
    let mut kernel = Vec::with_capacity(size);

    let sigma2 = 2.0 * sigma * sigma;
    let mut sum = 0.0;

    for i in 0..size {
        let x = i as f64 - radius as f64;
        let value = (-x * x / sigma2).exp();
        sum += value;
        kernel.push(value);
    }

    for v in &mut kernel {
        *v /= sum;
    }

    kernel
}

/// Maps any integer index onto `0..len` by half-sample symmetric reflection (`d c b a | a b c d | d c b a`).
pub(crate) fn reflect_index(i: isize, len: usize) -> usize {
    let n = len as isize;
    let period = 2 * n;
    let mut j = i.rem_euclid(period);
    if j >= n {
        j = period - 1 - j;
    }
    j as usize
}

fn convolve1d_reflect(data: ArrayView1<f64>, kernel: &[f64], mut out: ArrayViewMut1<f64>) {
    let radius = (kernel.len() / 2) as isize;
    let len = data.len();
    for (i, o) in out.iter_mut().enumerate() {
        let mut acc = 0.0;
        for (k, &coeff) in kernel.iter().enumerate() {
            let j = reflect_index(i as isize + k as isize - radius, len);
            acc += data[j] * coeff;
        }
        *o = acc;
    }
}

/// Separable Gaussian smoothing of a 2D field with reflective borders.
///
/// `sigma == 0` returns an unchanged copy. The caller validates that `sigma` is finite and non-negative.
pub fn gaussian_filter(data: ArrayView2<f64>, sigma: f64) -> Array2<f64> {
    if sigma <= 0.0 || data.is_empty() {
        return data.to_owned();
    }
    let kernel = gaussian_kernel1d(sigma);

    let mut along_cols = Array2::<f64>::zeros(data.raw_dim());
    Zip::from(along_cols.rows_mut())
        .and(data.rows())
        .par_for_each(|out, row| convolve1d_reflect(row, &kernel, out));

    let mut smoothed = Array2::<f64>::zeros(data.raw_dim());
    Zip::from(smoothed.columns_mut())
        .and(along_cols.columns())
        .par_for_each(|out, col| convolve1d_reflect(col, &kernel, out));

    smoothed
}

/// Percentile `p` (0..=100) of all values, linearly interpolated between the closest ranks.
///
/// Returns NaN for an empty input.
pub fn percentile(values: impl IntoIterator<Item = f64>, p: f64) -> f64 {
    let mut sorted: Vec<f64> = values.into_iter().collect();
    if sorted.is_empty() {
        return f64::NAN;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let rank = (sorted.len() - 1) as f64 * p.clamp(0.0, 100.0) / 100.0;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let fraction = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * fraction
}

fn gradient_1d(line: ArrayView1<f64>, mut out: ArrayViewMut1<f64>) {
    let n = line.len();
    if n < 2 {
        out.fill(0.0);
        return;
    }
    out[0] = line[1] - line[0];
    out[n - 1] = line[n - 1] - line[n - 2];
    for i in 1..n - 1 {
        out[i] = 0.5 * (line[i + 1] - line[i - 1]);
    }
}

/// Derivatives of a 2D field with unit pixel spacing, returned as `(d/drow, d/dcol)`.
///
/// Central differences in the interior, one-sided first-order differences on the borders.
/// An axis of length 1 has a zero derivative.
pub fn gradient(field: ArrayView2<f64>) -> (Array2<f64>, Array2<f64>) {
    let mut d_row = Array2::<f64>::zeros(field.raw_dim());
    let mut d_col = Array2::<f64>::zeros(field.raw_dim());

    Zip::from(d_row.columns_mut())
        .and(field.columns())
        .for_each(|out, col| gradient_1d(col, out));
    Zip::from(d_col.rows_mut())
        .and(field.rows())
        .for_each(|out, row| gradient_1d(row, out));

    (d_row, d_col)
}

/// Wraps a phase into `[-pi, pi]`.
pub fn wrap_phase(phase: f64) -> f64 {
    phase - 2.0 * PI * (phase / (2.0 * PI)).round()
}

/// Moore-Penrose pseudo-inverse of a 2x2 matrix.
///
/// Returns the pseudo-inverse and the singular values `[s_max, s_min]`. Singular values below
/// `1e-15 * s_max` are treated as zero, so rank deficient input yields a finite result.
pub fn pseudo_inverse_2x2(m: [[f64; 2]; 2]) -> ([[f64; 2]; 2], [f64; 2]) {
    // eigen decomposition of the symmetric product M^T M = [[a, b], [b, c]]
    let a = m[0][0] * m[0][0] + m[1][0] * m[1][0];
    let b = m[0][0] * m[0][1] + m[1][0] * m[1][1];
    let c = m[0][1] * m[0][1] + m[1][1] * m[1][1];

    let half_trace = 0.5 * (a + c);
    let lambda_max = half_trace + (0.25 * (a - c) * (a - c) + b * b).sqrt();
    let s_max = lambda_max.max(0.0).sqrt();
    if s_max == 0.0 {
        return ([[0.0; 2]; 2], [0.0, 0.0]);
    }
    let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
    let s_min = det.abs() / s_max;

    let v_max = if b != 0.0 {
        let first = (lambda_max - c, b);
        let second = (b, lambda_max - a);
        let pick = if first.0.hypot(first.1) >= second.0.hypot(second.1) {
            first
        } else {
            second
        };
        let norm = pick.0.hypot(pick.1);
        [pick.0 / norm, pick.1 / norm]
    } else if a >= c {
        [1.0, 0.0]
    } else {
        [0.0, 1.0]
    };
    let v_min = [-v_max[1], v_max[0]];

    let cutoff = 1e-15 * s_max;
    let mut pinv = [[0.0; 2]; 2];
    for (v, s) in [(v_max, s_max), (v_min, s_min)] {
        if s <= cutoff {
            continue;
        }
        let u = [
            (m[0][0] * v[0] + m[0][1] * v[1]) / s,
            (m[1][0] * v[0] + m[1][1] * v[1]) / s,
        ];
        for i in 0..2 {
            for j in 0..2 {
                pinv[i][j] += v[i] * u[j] / s;
            }
        }
    }

    (pinv, [s_max, s_min])
}

/// Summary of the finite values of a field; masked (NaN) pixels are skipped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FiniteStats {
    pub count: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std: f64,
}

impl FiniteStats {
    pub fn of(field: ArrayView2<f64>) -> Option<FiniteStats> {
        let finite = field.iter().copied().filter(|v| v.is_finite());
        let (count, sum, min, max) = finite.fold(
            (0usize, 0.0, f64::INFINITY, f64::NEG_INFINITY),
            |(n, s, lo, hi), v| (n + 1, s + v, lo.min(v), hi.max(v)),
        );
        if count == 0 {
            return None;
        }
        let mean = sum / count as f64;
        let var = field
            .iter()
            .filter(|v| v.is_finite())
            .map(|v| (v - mean) * (v - mean))
            .sum::<f64>()
            / count as f64;
        Some(FiniteStats {
            count,
            min,
            max,
            mean,
            std: var.sqrt(),
        })
    }
}

/// Jet colormap for a value normalized to `[0, 1]`, as 8-bit RGB.
pub fn jet_colormap(value: f64) -> [u8; 3] {
    let four_value = 4.0 * value.clamp(0.0, 1.0);
    let r = (four_value - 1.5).clamp(0.0, 1.0);
    let g = (four_value - 0.5).clamp(0.0, 1.0) - (four_value - 2.5).clamp(0.0, 1.0);
    let b = 1.0 - (four_value - 1.5).clamp(0.0, 1.0);

    [(r * 255.0) as u8, (g * 255.0) as u8, (b * 255.0) as u8]
}

pub fn gray_colormap(value: f64) -> [u8; 3] {
    let v = (value.clamp(0.0, 1.0) * 255.0) as u8;
    [v, v, v]
}
