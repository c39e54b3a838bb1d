//! Soft circular masks isolating one Bragg spot in the centered spectrum.

use crate::config::validate_radii;
use crate::error::GpaError;
use crate::math_tools::raised_cosine;
use ndarray::Array2;

/// Builds a mask of the given `(rows, cols)` shape that is 1 inside `inner_radius` around `center`
/// (`(row, col)`), 0 beyond `outer_radius` and follows a raised cosine in between.
pub fn build_mask(
    shape: (usize, usize),
    center: (f64, f64),
    inner_radius: f64,
    outer_radius: f64,
) -> Result<Array2<f64>, GpaError> {
    validate_radii(inner_radius, outer_radius)?;
    let (cy, cx) = center;
    let mask = Array2::from_shape_fn(shape, |(r, c)| {
        let distance = (r as f64 - cy).hypot(c as f64 - cx);
        raised_cosine(distance, inner_radius, outer_radius)
    });
    if mask.iter().all(|&v| v == 0.0) {
        log::warn!(
            "spot mask at ({:.1}, {:.1}) with radius {} does not cover any spectrum pixel",
            cy,
            cx,
            outer_radius
        );
    }
    Ok(mask)
}
