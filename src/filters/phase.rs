//! Geometric phase of one Bragg spot.

use crate::data_container::{ReciprocalVector, SpotPhase};
use crate::error::{check_shape, GpaError};
use crate::filters::spectrum::inverse_transform;
use crate::filters::unwrap::unwrap_phase;
use ndarray::{Array2, ArrayView2, Zip};
use num_complex::Complex64;
use std::f64::consts::PI;

/// Subtracts the carrier `2 pi (gx x + gy y)` of a spot from a phase map, in place.
pub fn remove_carrier(phase: &mut Array2<f64>, g: ReciprocalVector) {
    Zip::indexed(phase).par_for_each(|(y, x), p| {
        *p -= 2.0 * PI * (g.gx * x as f64 + g.gy * y as f64);
    });
}

/// Filters the centered `spectrum` with `mask`, transforms back and returns the complex image, its
/// argument and the unwrapped phase relative to the carrier of the spot at `spot_center`.
pub fn extract_phase(
    spectrum: ArrayView2<Complex64>,
    mask: ArrayView2<f64>,
    spot_center: (f64, f64),
) -> Result<SpotPhase, GpaError> {
    check_shape("spot mask", spectrum.dim(), mask.dim())?;
    let g = ReciprocalVector::from_spot(spot_center, spectrum.dim());

    let filtered = Zip::from(spectrum)
        .and(mask)
        .par_map_collect(|&f, &m| f * m);
    let complex_image = inverse_transform(filtered.view());
    let raw_phase = complex_image.mapv(|c| c.arg());

    let mut corrected = raw_phase.clone();
    remove_carrier(&mut corrected, g);
    let phase = unwrap_phase(corrected.view());

    log::debug!(
        "extracted phase for g = ({:.4}, {:.4}) cycles/px",
        g.gx,
        g.gy
    );
    Ok(SpotPhase {
        g,
        complex_image,
        raw_phase,
        phase,
    })
}
