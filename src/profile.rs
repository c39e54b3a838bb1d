//! Line scans through result maps.

use crate::error::GpaError;
use crate::math_tools::reflect_index;
use ndarray::ArrayView2;

/// Bilinear sample at the fractional position `(row, col)`, reflecting at the borders.
///
/// Only neighbors with a non-zero weight contribute, so a NaN pixel affects samples next to it but not
/// samples that land exactly on a finite pixel.
fn bilinear(field: &ArrayView2<f64>, row: f64, col: f64) -> f64 {
    let (rows, cols) = field.dim();
    let (r0, c0) = (row.floor(), col.floor());
    let (fr, fc) = (row - r0, col - c0);
    let mut value = 0.0;
    for (dr, wr) in [(0, 1.0 - fr), (1, fr)] {
        if wr == 0.0 {
            continue;
        }
        let r = reflect_index(r0 as isize + dr, rows);
        for (dc, wc) in [(0, 1.0 - fc), (1, fc)] {
            if wc == 0.0 {
                continue;
            }
            let c = reflect_index(c0 as isize + dc, cols);
            value += wr * wc * field[[r, c]];
        }
    }
    value
}

/// Number of samples taken between `src` and `dst`, both included.
pub fn sample_count(src: (f64, f64), dst: (f64, f64)) -> usize {
    ((dst.0 - src.0).hypot(dst.1 - src.1) + 1.0).ceil() as usize
}

/// Intensity profile of `field` from `src` to `dst` (both `(row, col)`, inclusive).
///
/// Samples are spaced at most one pixel apart and interpolated bilinearly. With `thickness > 1`,
/// `thickness` parallel lines one pixel apart, centered on the segment, are averaged. NaN pixels
/// propagate into the samples that touch them.
pub fn line_profile(
    field: ArrayView2<f64>,
    src: (f64, f64),
    dst: (f64, f64),
    thickness: usize,
) -> Result<Vec<f64>, GpaError> {
    if thickness == 0 {
        return Err(GpaError::parameter("thickness", thickness, "must be >= 1"));
    }
    for (name, point) in [("profile start", src), ("profile end", dst)] {
        if !point.0.is_finite() || !point.1.is_finite() {
            return Err(GpaError::parameter(
                name,
                format!("{point:?}"),
                "must be finite",
            ));
        }
    }
    if field.is_empty() {
        return Err(GpaError::parameter(
            "field shape",
            format!("{:?}", field.dim()),
            "must not be empty",
        ));
    }

    let (d_row, d_col) = (dst.0 - src.0, dst.1 - src.1);
    let length = d_row.hypot(d_col);
    let n = sample_count(src, dst);
    // unit vector perpendicular to the segment; a zero-length segment spreads along columns
    let (p_row, p_col) = if length > 0.0 {
        (-d_col / length, d_row / length)
    } else {
        (0.0, 1.0)
    };
    let half_width = (thickness as f64 - 1.0) / 2.0;

    let profile = (0..n)
        .map(|i| {
            let t = if n > 1 { i as f64 / (n - 1) as f64 } else { 0.0 };
            let (row, col) = (src.0 + t * d_row, src.1 + t * d_col);
            let sum: f64 = (0..thickness)
                .map(|k| {
                    let offset = k as f64 - half_width;
                    bilinear(&field, row + offset * p_row, col + offset * p_col)
                })
                .sum();
            sum / thickness as f64
        })
        .collect();
    Ok(profile)
}
