//! Displacement field from the geometric phases of two spots.

use crate::config::ReferenceRegion;
use crate::data_container::{DisplacementField, ReciprocalBasis};
use crate::error::{check_shape, GpaError};
use ndarray::{s, Array2, ArrayView2, Zip};
use std::f64::consts::PI;

/// Mean of the finite values of `field` inside `region`; 0 when there are none.
fn region_mean(field: &Array2<f64>, region: &ReferenceRegion) -> f64 {
    let window = field.slice(s![
        region.row_start..region.row_end,
        region.col_start..region.col_end
    ]);
    let (sum, count) = window
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

/// Solves `[ux; uy] = -1 / (2 pi) * G^+ [phase1; phase2]` per pixel and shifts both components so that
/// their mean over `reference` is zero.
///
/// `reference` is clipped to the image first; a rectangle that is empty or lies entirely outside is an
/// [`GpaError::InvalidRegion`].
pub fn solve(
    phase1: ArrayView2<f64>,
    phase2: ArrayView2<f64>,
    basis: &ReciprocalBasis,
    reference: &ReferenceRegion,
) -> Result<DisplacementField, GpaError> {
    check_shape("phase of spot 2", phase1.dim(), phase2.dim())?;
    let region = reference.clip_to(phase1.dim())?;
    let inv = basis.inverse;
    let scale = -1.0 / (2.0 * PI);

    let mut ux = Array2::<f64>::zeros(phase1.raw_dim());
    let mut uy = Array2::<f64>::zeros(phase1.raw_dim());
    Zip::from(&mut ux)
        .and(&mut uy)
        .and(phase1)
        .and(phase2)
        .par_for_each(|x, y, &p1, &p2| {
            *x = scale * (inv[0][0] * p1 + inv[0][1] * p2);
            *y = scale * (inv[1][0] * p1 + inv[1][1] * p2);
        });

    let (mean_x, mean_y) = (region_mean(&ux, &region), region_mean(&uy, &region));
    ux.mapv_inplace(|v| v - mean_x);
    uy.mapv_inplace(|v| v - mean_y);
    log::debug!(
        "reference offset ({:.4}, {:.4}) px removed over {}",
        mean_x,
        mean_y,
        region
    );

    Ok(DisplacementField { ux, uy })
}
