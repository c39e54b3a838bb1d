//! Smoothing and thresholding of the input image.

use crate::data_container::Preprocessed;
use crate::error::{check_sigma, GpaError};
use crate::math_tools::{gaussian_filter, percentile};
use ndarray::ArrayView2;

/// Smooths `image` with a Gaussian of `sigma` and marks every pixel brighter than the
/// `threshold_percent`-th percentile of the smoothed image as material.
pub fn preprocess(
    image: ArrayView2<f64>,
    threshold_percent: f64,
    sigma: f64,
) -> Result<Preprocessed, GpaError> {
    if !(0.0..=100.0).contains(&threshold_percent) {
        return Err(GpaError::parameter(
            "threshold_percent",
            threshold_percent,
            "must be within 0..=100",
        ));
    }
    check_sigma("preprocess_sigma", sigma)?;

    let smoothed = gaussian_filter(image, sigma);
    let threshold = percentile(smoothed.iter().copied(), threshold_percent);
    let material_mask = smoothed.mapv(|v| v > threshold);
    log::debug!(
        "material threshold {:.4} at {}th percentile, {} of {} pixels selected",
        threshold,
        threshold_percent,
        material_mask.iter().filter(|&&m| m).count(),
        material_mask.len()
    );

    Ok(Preprocessed {
        smoothed,
        material_mask,
        threshold,
    })
}
