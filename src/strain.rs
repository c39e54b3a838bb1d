//! Strain and rotation from the displacement gradient.

use crate::config::RotationUnit;
use crate::data_container::StrainMaps;
use crate::error::{check_shape, check_sigma, GpaError};
use crate::math_tools::{gaussian_filter, gradient};
use ndarray::{Array2, ArrayView2, Zip};

/// Symmetric and antisymmetric parts of the displacement gradient, unsmoothed and unmasked.
///
/// Returns `(exx, eyy, exy, rotation)` as plain fractions and radians. `x` runs along columns,
/// `y` along rows.
pub fn decompose(
    ux: ArrayView2<f64>,
    uy: ArrayView2<f64>,
) -> (Array2<f64>, Array2<f64>, Array2<f64>, Array2<f64>) {
    let (dux_dy, dux_dx) = gradient(ux);
    let (duy_dy, duy_dx) = gradient(uy);

    let exy = Zip::from(&dux_dy)
        .and(&duy_dx)
        .map_collect(|&a, &b| 0.5 * (a + b));
    let rotation = Zip::from(&duy_dx)
        .and(&dux_dy)
        .map_collect(|&a, &b| 0.5 * (a - b));
    (dux_dx, duy_dy, exy, rotation)
}

fn finish(field: Array2<f64>, sigma: f64, mask: ArrayView2<bool>, scale: f64) -> Array2<f64> {
    let mut out = gaussian_filter(field.view(), sigma);
    Zip::from(&mut out).and(mask).for_each(|v, &material| {
        *v = if material { *v * scale } else { f64::NAN };
    });
    out
}

/// Computes the strain maps in percent and the rotation in `rotation_unit`.
///
/// Each map is smoothed with `smooth_sigma` independently and set to NaN where `material_mask` is false.
pub fn compute_tensors(
    ux: ArrayView2<f64>,
    uy: ArrayView2<f64>,
    material_mask: ArrayView2<bool>,
    smooth_sigma: f64,
    rotation_unit: RotationUnit,
) -> Result<StrainMaps, GpaError> {
    check_shape("uy", ux.dim(), uy.dim())?;
    check_shape("material mask", ux.dim(), material_mask.dim())?;
    check_sigma("smooth_sigma", smooth_sigma)?;

    let (exx, eyy, exy, rotation) = decompose(ux, uy);
    let rotation_scale = match rotation_unit {
        RotationUnit::Degrees => 180.0 / std::f64::consts::PI,
        RotationUnit::Radians => 1.0,
    };

    let ((exx, eyy), (exy, rotation)) = rayon::join(
        || {
            (
                finish(exx, smooth_sigma, material_mask, 100.0),
                finish(eyy, smooth_sigma, material_mask, 100.0),
            )
        },
        || {
            (
                finish(exy, smooth_sigma, material_mask, 100.0),
                finish(rotation, smooth_sigma, material_mask, rotation_scale),
            )
        },
    );

    Ok(StrainMaps {
        exx,
        eyy,
        exy,
        rotation,
        rotation_unit,
    })
}
