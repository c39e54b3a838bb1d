//! Image-domain and frequency-domain processing stages of the analysis.
//!
//! The stages are applied in this order by [`crate::pipeline`]:
//!
//! * **Preprocessing**: smoothing of the raw image and selection of the material region.
//!
//! * **Spectrum**: centered 2D Fourier transform of the image.
//!
//! * **Spot mask** and **phase**: isolation of one Bragg spot and extraction of its geometric phase,
//!   once for each of the two spots.
//!
//! Every stage is a pure function of its inputs.

/// Gaussian smoothing and percentile thresholding of the input image.
pub mod preprocess;

/// Forward and inverse 2D transforms with centering shifts.
pub mod spectrum;

/// Raised-cosine masks around a selected Bragg spot.
pub mod spot_mask;

/// Masking, inverse transform, carrier removal and unwrapping for one spot.
pub mod phase;

/// Reliability-ordered 2D phase unwrapping.
pub mod unwrap;
