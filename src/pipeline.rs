//! The complete analysis: spectrum, two spot phases, displacement and strain.
//!
//! All parameters are validated before the first transform is computed. Every call recomputes the full
//! result from its inputs; nothing is cached between calls.

use crate::config::{AnalysisParams, GpaSettings, SpotSpec};
use crate::data_container::{GpaResult, Preprocessed, ReciprocalBasis, SpotPhase};
use crate::displacement::solve;
use crate::error::{check_shape, check_sigma, GpaError};
use crate::filters::phase::extract_phase;
use crate::filters::preprocess::preprocess;
use crate::filters::spectrum::{forward_transform, log_magnitude};
use crate::filters::spot_mask::build_mask;
use crate::strain::compute_tensors;
use ndarray::{Array2, ArrayView2};
use num_complex::Complex64;
use std::time::Instant;

fn check_image(image: ArrayView2<f64>) -> Result<(), GpaError> {
    let (rows, cols) = image.dim();
    if rows < 2 || cols < 2 {
        return Err(GpaError::parameter(
            "image shape",
            format!("{rows}x{cols}"),
            "must be at least 2x2",
        ));
    }
    Ok(())
}

/// Mask, filter, phase and unwrap for one spot. Used for both spots.
fn process_spot(spectrum: &Array2<Complex64>, spot: &SpotSpec) -> Result<SpotPhase, GpaError> {
    let mask = build_mask(
        spectrum.dim(),
        spot.center,
        spot.inner_radius,
        spot.outer_radius,
    )?;
    extract_phase(spectrum.view(), mask.view(), spot.center)
}

/// Runs the analysis on `image` with the given material mask.
///
/// The strain and rotation maps are NaN wherever `material_mask` is false. Near-collinear spots are
/// accepted; check [`ReciprocalBasis::is_ill_conditioned`] on the result.
pub fn analyze(
    image: ArrayView2<f64>,
    material_mask: ArrayView2<bool>,
    params: &AnalysisParams,
) -> Result<GpaResult, GpaError> {
    check_image(image)?;
    check_shape("material mask", image.dim(), material_mask.dim())?;
    params.spot1.validate(image.dim())?;
    params.spot2.validate(image.dim())?;
    params.reference.clip_to(image.dim())?;
    check_sigma("smooth_sigma", params.smooth_sigma)?;

    log::info!(
        "analyzing {}x{} image, spots at {:?} and {:?}",
        image.nrows(),
        image.ncols(),
        params.spot1.center,
        params.spot2.center
    );
    let start = Instant::now();

    let spectrum = forward_transform(image);
    let fft_log_magnitude = log_magnitude(spectrum.view());
    log::debug!("spectrum took {:?}", start.elapsed());

    let phase_start = Instant::now();
    let (spot1, spot2) = rayon::join(
        || process_spot(&spectrum, &params.spot1),
        || process_spot(&spectrum, &params.spot2),
    );
    let (spot1, spot2) = (spot1?, spot2?);
    log::debug!("spot phases took {:?}", phase_start.elapsed());

    let basis = ReciprocalBasis::new(spot1.g, spot2.g);
    if basis.is_ill_conditioned() {
        log::warn!(
            "reciprocal vectors ({:.4}, {:.4}) and ({:.4}, {:.4}) are nearly collinear \
             (condition number {:.3e}), displacements are unreliable",
            basis.g1.gx,
            basis.g1.gy,
            basis.g2.gx,
            basis.g2.gy,
            basis.condition_number()
        );
    }

    let displacement = solve(
        spot1.phase.view(),
        spot2.phase.view(),
        &basis,
        &params.reference,
    )?;
    let strain = compute_tensors(
        displacement.ux.view(),
        displacement.uy.view(),
        material_mask,
        params.smooth_sigma,
        params.rotation_unit,
    )?;

    log::info!("analysis finished in {:?}", start.elapsed());
    Ok(GpaResult {
        spot1,
        spot2,
        basis,
        displacement,
        strain,
        fft_log_magnitude,
    })
}

/// Preprocesses `image` with the thresholding settings and analyzes the smoothed image.
pub fn apply(
    image: ArrayView2<f64>,
    settings: &GpaSettings,
) -> Result<(Preprocessed, GpaResult), GpaError> {
    check_image(image)?;
    let pre = preprocess(image, settings.threshold_percent, settings.preprocess_sigma)?;
    let result = analyze(
        pre.smoothed.view(),
        pre.material_mask.view(),
        &settings.analysis,
    )?;
    Ok((pre, result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ReferenceRegion, RotationUnit};
    use crate::data_container::MapKind;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    const N: usize = 64;

    /// Square lattice with period 8 along x and 16 along y, optionally stretched along x.
    fn lattice(stretch: f64) -> Array2<f64> {
        Array2::from_shape_fn((N, N), |(y, x)| {
            let x = x as f64 / (1.0 + stretch);
            (2.0 * PI * x / 8.0).cos() + (2.0 * PI * y as f64 / 16.0).cos()
        })
    }

    fn lattice_params() -> AnalysisParams {
        AnalysisParams {
            // g1 = (1/8, 0) and g2 = (0, 1/16) in cycles per pixel
            spot1: SpotSpec::new((32.0, 40.0), 3.0, 8.0),
            spot2: SpotSpec::new((36.0, 32.0), 3.0, 8.0),
            reference: ReferenceRegion::inset((N, N), 2),
            smooth_sigma: 0.0,
            rotation_unit: RotationUnit::Degrees,
        }
    }

    fn everywhere() -> Array2<bool> {
        Array2::from_elem((N, N), true)
    }

    #[test]
    fn test_unstrained_lattice_has_no_strain() {
        let image = lattice(0.0);
        let mask = everywhere();
        let result = analyze(image.view(), mask.view(), &lattice_params()).unwrap();

        assert_abs_diff_eq!(result.basis.g1.gx, 0.125);
        assert_abs_diff_eq!(result.basis.g2.gy, 0.0625);
        assert!(!result.basis.is_ill_conditioned());
        for kind in MapKind::TENSOR {
            for v in result.map(kind).iter() {
                assert_abs_diff_eq!(*v, 0.0, epsilon = 1e-6);
            }
        }
        for v in result.displacement.ux.iter().chain(result.displacement.uy.iter()) {
            assert_abs_diff_eq!(*v, 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_result_fields_match_image_shape() {
        let image = lattice(0.0);
        let mask = everywhere();
        let result = analyze(image.view(), mask.view(), &lattice_params()).unwrap();
        assert_eq!(result.shape(), (N, N));
        assert_eq!(result.spot1.complex_image.dim(), (N, N));
        assert_eq!(result.spot2.complex_image.dim(), (N, N));
        for kind in MapKind::ALL {
            assert_eq!(result.map(kind).dim(), (N, N));
        }
    }

    #[test]
    fn test_analyze_is_idempotent() {
        let image = lattice(0.01);
        let mask = everywhere();
        let params = AnalysisParams {
            smooth_sigma: 1.0,
            ..lattice_params()
        };
        let first = analyze(image.view(), mask.view(), &params).unwrap();
        let second = analyze(image.view(), mask.view(), &params).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_mask_exclusion() {
        let image = lattice(0.0);
        let mask = Array2::from_shape_fn((N, N), |(y, x)| x >= 20 || y % 3 == 0);
        let result = analyze(image.view(), mask.view(), &lattice_params()).unwrap();
        for kind in MapKind::TENSOR {
            for (v, &m) in result.map(kind).iter().zip(mask.iter()) {
                assert_eq!(v.is_nan(), !m, "{kind}");
            }
        }
        // displacement and phases are not masked
        assert!(result.displacement.ux.iter().all(|v| v.is_finite()));
    }

    #[test]
    fn test_reference_region_is_zeroed() {
        let image = Array2::from_shape_fn((N, N), |(y, x)| {
            let shift = 0.3 * (2.0 * PI * y as f64 / N as f64).sin();
            (2.0 * PI * (x as f64 - shift) / 8.0).cos() + (2.0 * PI * y as f64 / 16.0).cos()
        });
        let params = AnalysisParams {
            reference: ReferenceRegion::new(10, 30, 5, 60),
            ..lattice_params()
        };
        let result = analyze(image.view(), everywhere().view(), &params).unwrap();
        let window = |field: &Array2<f64>| {
            field
                .slice(ndarray::s![10..30, 5..60])
                .mean()
                .unwrap_or(f64::NAN)
        };
        assert_abs_diff_eq!(window(&result.displacement.ux), 0.0, epsilon = 1e-10);
        assert_abs_diff_eq!(window(&result.displacement.uy), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_degenerate_geometry_is_finite() {
        let image = lattice(0.0);
        let params = AnalysisParams {
            // both g vectors along x
            spot2: SpotSpec::new((32.0, 48.0), 3.0, 8.0),
            ..lattice_params()
        };
        let result = analyze(image.view(), everywhere().view(), &params).unwrap();
        assert!(result.basis.is_ill_conditioned());
        assert!(result
            .displacement
            .ux
            .iter()
            .chain(result.displacement.uy.iter())
            .all(|v| v.is_finite()));
    }

    #[test]
    fn test_validation_happens_before_work() {
        let image = lattice(0.0);
        let mask = everywhere();

        let mut params = lattice_params();
        params.spot1.inner_radius = 9.0;
        assert!(matches!(
            analyze(image.view(), mask.view(), &params),
            Err(GpaError::InvalidParameter { name: "outer_radius", .. })
        ));

        let params = AnalysisParams {
            reference: ReferenceRegion::new(70, 80, 0, 10),
            ..lattice_params()
        };
        assert!(matches!(
            analyze(image.view(), mask.view(), &params),
            Err(GpaError::InvalidRegion { .. })
        ));

        let small_mask = Array2::from_elem((N, N - 1), true);
        assert!(matches!(
            analyze(image.view(), small_mask.view(), &lattice_params()),
            Err(GpaError::ShapeMismatch { .. })
        ));

        let tiny = Array2::<f64>::zeros((1, 8));
        assert!(matches!(
            analyze(tiny.view(), Array2::from_elem((1, 8), true).view(), &lattice_params()),
            Err(GpaError::InvalidParameter { name: "image shape", .. })
        ));
    }

    #[test]
    fn test_apply_thresholds_then_analyzes() {
        let image = lattice(0.0);
        let settings = GpaSettings {
            analysis: lattice_params(),
            threshold_percent: 25.0,
            ..GpaSettings::new()
        };
        let (pre, result) = apply(image.view(), &settings).unwrap();
        let selected = pre.material_mask.iter().filter(|&&m| m).count();
        assert!(selected > 0 && selected < N * N);
        let nan_count = result.strain.exx.iter().filter(|v| v.is_nan()).count();
        assert_eq!(nan_count, N * N - selected);
    }
}
